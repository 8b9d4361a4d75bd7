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
//! Per-group pending split queues of one plan node.
//!
//! Responsibilities:
//! - Buffers splits by split group in arrival order.
//! - Hands each split to exactly one taker (FIFO within a group, no order across groups).
//!
//! Not synchronized on its own: always accessed under the owning plan node lock.

use std::collections::{HashMap, VecDeque};

use crate::common::ids::SplitGroupId;
use crate::exec::split::Split;

#[derive(Debug, Default)]
pub(crate) struct SplitQueue {
    groups: HashMap<SplitGroupId, VecDeque<Split>>,
    len: usize,
}

impl SplitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, group_id: SplitGroupId, split: Split) {
        self.groups.entry(group_id).or_default().push_back(split);
        self.len += 1;
    }

    pub(crate) fn try_take(&mut self, group_id: SplitGroupId) -> Option<Split> {
        let queue = self.groups.get_mut(&group_id)?;
        let split = queue.pop_front();
        if queue.is_empty() {
            self.groups.remove(&group_id);
        }
        if split.is_some() {
            self.len -= 1;
        }
        split
    }

    /// Puts a split back at the head of its group.
    pub(crate) fn unget(&mut self, group_id: SplitGroupId, split: Split) {
        self.groups.entry(group_id).or_default().push_front(split);
        self.len += 1;
    }

    pub(crate) fn group_len(&self, group_id: SplitGroupId) -> usize {
        self.groups.get(&group_id).map(VecDeque::len).unwrap_or(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}
