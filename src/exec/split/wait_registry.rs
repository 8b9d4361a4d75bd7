// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Parked split fetches of one plan node.
//!
//! Responsibilities:
//! - Keeps fetch requests that found no split, keyed by split group, in park order.
//! - Resolves the oldest live request with a split, or every request of a group with end-of-stream.
//!
//! A resolution carries `Some(split)` or `None` (no more splits). A dropped sender
//! without a value means the waiter was aborted.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::common::ids::SplitGroupId;
use crate::exec::split::Split;

pub(crate) type SplitSlot = Option<Split>;

#[derive(Debug)]
struct Waiter {
    id: u64,
    sender: oneshot::Sender<SplitSlot>,
}

#[derive(Debug, Default)]
pub(crate) struct WaitRegistry {
    next_waiter_id: u64,
    waiters: HashMap<SplitGroupId, VecDeque<Waiter>>,
}

impl WaitRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn park(&mut self, group_id: SplitGroupId) -> (u64, oneshot::Receiver<SplitSlot>) {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.waiters
            .entry(group_id)
            .or_default()
            .push_back(Waiter { id, sender });
        (id, receiver)
    }

    /// Hands `split` to the oldest live waiter of `group_id`.
    ///
    /// Waiters whose handle is already gone are discarded. Returns the split back
    /// when nobody could take it.
    pub(crate) fn resolve_with_split(
        &mut self,
        group_id: SplitGroupId,
        split: Split,
    ) -> Option<Split> {
        let Some(queue) = self.waiters.get_mut(&group_id) else {
            return Some(split);
        };
        let mut pending = Some(split);
        while let Some(split) = pending.take() {
            let Some(waiter) = queue.pop_front() else {
                pending = Some(split);
                break;
            };
            if let Err(returned) = waiter.sender.send(Some(split)) {
                pending = returned;
            }
        }
        if queue.is_empty() {
            self.waiters.remove(&group_id);
        }
        pending
    }

    /// Resolves every waiter of `group_id` with end-of-stream.
    pub(crate) fn resolve_no_more_splits(&mut self, group_id: SplitGroupId) -> usize {
        let Some(queue) = self.waiters.remove(&group_id) else {
            return 0;
        };
        queue
            .into_iter()
            .map(|w| w.sender.send(None).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    pub(crate) fn resolve_all_no_more_splits(&mut self) -> usize {
        let groups = self.waiters.keys().copied().collect::<Vec<_>>();
        groups
            .into_iter()
            .map(|g| self.resolve_no_more_splits(g))
            .sum()
    }

    /// Removes a still-parked waiter. Returns false when it was already resolved.
    pub(crate) fn cancel(&mut self, group_id: SplitGroupId, waiter_id: u64) -> bool {
        let Some(queue) = self.waiters.get_mut(&group_id) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|w| w.id == waiter_id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            self.waiters.remove(&group_id);
        }
        true
    }

    /// Drops every parked waiter without resolving it.
    pub(crate) fn abort_all(&mut self) -> usize {
        let aborted = self.waiters.values().map(VecDeque::len).sum();
        self.waiters.clear();
        aborted
    }

    pub(crate) fn num_waiting(&self) -> usize {
        self.waiters.values().map(VecDeque::len).sum()
    }
}
