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
//! Split state of one source plan node.
//!
//! Responsibilities:
//! - Serializes every split mutation of the node (queue, parked fetches, ledger) under one lock.
//! - Implements the fetch protocol: queued split, then end-of-stream, then a parked `SplitFuture`.
//! - Forwards group completion to the task-level `SplitGroupCompletion` under the same lock.
//!
//! Key exported interfaces:
//! - Types: `PlanNodeSplits`, `SplitFetch`, `SplitFuture`.
//!
//! Lock order is node lock, then completion lock. Completion observers run after both
//! are released.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::common::ids::{PlanNodeId, SplitGroupId};
use crate::exec::split::group_ledger::GroupLedger;
use crate::exec::split::split_queue::SplitQueue;
use crate::exec::split::wait_registry::{SplitSlot, WaitRegistry};
use crate::exec::split::{Split, SplitError};
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::split_group_completion::{DeferCompletionNotify, SplitGroupCompletion};
use crate::splitline_logging::{debug, warn};

#[derive(Debug)]
struct PlanNodeSplitState {
    queue: SplitQueue,
    waiters: WaitRegistry,
    ledger: GroupLedger,
    max_sequence_id: i64,
}

/// Point-in-time split counts of one plan node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeSplitCounts {
    pub queued: u64,
    pub outstanding: u64,
    pub waiting_fetches: u64,
}

/// Outcome of one split fetch.
#[derive(Debug)]
pub enum SplitFetch {
    /// A queued split, now owned by the caller.
    Split(Split),
    /// End-of-stream holds for the group; no split will ever arrive.
    NoMoreSplits,
    /// Parked until the next split or end-of-stream for the group.
    Blocked(SplitFuture),
}

pub struct PlanNodeSplits {
    plan_node_id: PlanNodeId,
    state: Mutex<PlanNodeSplitState>,
    completion: Arc<SplitGroupCompletion>,
    splits_added: CounterRef,
    splits_finished: CounterRef,
    duplicate_splits: CounterRef,
    split_waits: CounterRef,
    split_wait_time: CounterRef,
    log_split_events: bool,
    wait_log_every: u64,
    wait_log_count: AtomicU64,
}

impl PlanNodeSplits {
    pub(crate) fn new(
        plan_node_id: PlanNodeId,
        completion: Arc<SplitGroupCompletion>,
        profile: &RuntimeProfile,
        log_split_events: bool,
        wait_log_every: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            plan_node_id,
            state: Mutex::new(PlanNodeSplitState {
                queue: SplitQueue::new(),
                waiters: WaitRegistry::new(),
                ledger: GroupLedger::new(plan_node_id),
                max_sequence_id: i64::MIN,
            }),
            completion,
            splits_added: profile.add_counter("SplitsAdded", CounterUnit::Unit),
            splits_finished: profile.add_counter("SplitsFinished", CounterUnit::Unit),
            duplicate_splits: profile.add_counter("DuplicateSplitsIgnored", CounterUnit::Unit),
            split_waits: profile.add_counter("SplitWaits", CounterUnit::Unit),
            split_wait_time: profile.add_counter("SplitWaitTime", CounterUnit::TimeNs),
            log_split_events,
            wait_log_every: wait_log_every.max(1),
            wait_log_count: AtomicU64::new(0),
        })
    }

    pub fn plan_node_id(&self) -> PlanNodeId {
        self.plan_node_id
    }

    fn lock_state(&self) -> MutexGuard<'_, PlanNodeSplitState> {
        self.state.lock().expect("plan node splits lock")
    }

    pub fn add_split(&self, split: Split) -> Result<(), SplitError> {
        let mut state = self.lock_state();
        self.add_split_locked(&mut state, split)
    }

    /// Adds `split` unless `sequence_id` is not above the current max sequence id.
    ///
    /// Returns false for a discarded duplicate. Does not raise the max sequence id.
    pub fn add_split_with_sequence(&self, split: Split, sequence_id: i64) -> Result<bool, SplitError> {
        let mut state = self.lock_state();
        if sequence_id <= state.max_sequence_id {
            self.duplicate_splits.add(1);
            debug!(
                "duplicate split ignored: plan_node_id={} group={} sequence_id={} max_sequence_id={}",
                self.plan_node_id,
                split.group_id(),
                sequence_id,
                state.max_sequence_id
            );
            return Ok(false);
        }
        self.add_split_locked(&mut state, split)?;
        Ok(true)
    }

    pub fn set_max_split_sequence_id(&self, max_sequence_id: i64) {
        let mut state = self.lock_state();
        state.max_sequence_id = max_sequence_id;
    }

    fn add_split_locked(
        &self,
        state: &mut PlanNodeSplitState,
        split: Split,
    ) -> Result<(), SplitError> {
        let group_id = split.group_id();
        if let Err(err) = state.ledger.record_added(group_id) {
            warn!("reject split: {}", err);
            return Err(err);
        }
        self.splits_added.add(1);
        if self.log_split_events {
            debug!(
                "split added: plan_node_id={} group={} outstanding={}",
                self.plan_node_id,
                group_id,
                state.ledger.outstanding(group_id)
            );
        }
        if let Some(split) = state.waiters.resolve_with_split(group_id, split) {
            state.queue.add(group_id, split);
        }
        Ok(())
    }

    pub fn no_more_splits_for_group(&self, group_id: SplitGroupId) -> Result<(), SplitError> {
        let mut notify = self.completion.defer_notify();
        let mut state = self.lock_state();
        let completed = match state.ledger.declare_no_more_for_group(group_id) {
            Ok(completed) => completed,
            Err(err) => {
                warn!("reject no more splits for group: {}", err);
                return Err(err);
            }
        };
        // Parked fetches exist only while the group queue is empty.
        let woken = state.waiters.resolve_no_more_splits(group_id);
        debug!(
            "no more splits for group: plan_node_id={} group={} outstanding={} woken_fetches={}",
            self.plan_node_id,
            group_id,
            state.ledger.outstanding(group_id),
            woken
        );
        if completed {
            self.complete_group_locked(group_id, &mut notify);
        }
        Ok(())
    }

    pub fn no_more_splits(&self) {
        let mut notify = self.completion.defer_notify();
        let mut state = self.lock_state();
        if state.ledger.no_more_splits() {
            return;
        }
        let completed = state.ledger.declare_no_more_overall();
        let woken = state.waiters.resolve_all_no_more_splits();
        debug!(
            "no more splits: plan_node_id={} outstanding={} queued={} woken_fetches={} completed_groups={}",
            self.plan_node_id,
            state.ledger.total_outstanding(),
            state.queue.len(),
            woken,
            completed.len()
        );
        for group_id in completed {
            self.complete_group_locked(group_id, &mut notify);
        }
        let unfinished = state.ledger.unfinished_groups();
        for group_id in self.completion.mark_no_more_splits(self.plan_node_id, unfinished) {
            notify.push(group_id);
        }
    }

    pub fn get_split_or_future(self: &Arc<Self>, group_id: SplitGroupId) -> SplitFetch {
        let mut state = self.lock_state();
        if let Some(split) = state.queue.try_take(group_id) {
            if self.log_split_events {
                debug!(
                    "split taken: plan_node_id={} group={} queued={}",
                    self.plan_node_id,
                    group_id,
                    state.queue.group_len(group_id)
                );
            }
            return SplitFetch::Split(split);
        }
        if state.ledger.is_end_of_stream(group_id) {
            return SplitFetch::NoMoreSplits;
        }
        let (waiter_id, receiver) = state.waiters.park(group_id);
        self.split_waits.add(1);
        if self.wait_log_count.fetch_add(1, Ordering::Relaxed) % self.wait_log_every == 0 {
            debug!(
                "split fetch parked: plan_node_id={} group={} waiting_fetches={}",
                self.plan_node_id,
                group_id,
                state.waiters.num_waiting()
            );
        }
        SplitFetch::Blocked(SplitFuture {
            node: Arc::downgrade(self),
            plan_node_id: self.plan_node_id,
            group_id,
            waiter_id,
            receiver: Some(receiver),
            parked_at: Instant::now(),
            wait_time: Arc::clone(&self.split_wait_time),
        })
    }

    /// Attests that one previously taken split of `group_id` finished processing.
    pub fn split_finished(&self, group_id: SplitGroupId) -> Result<(), SplitError> {
        let mut notify = self.completion.defer_notify();
        let mut state = self.lock_state();
        let completed = match state.ledger.record_finished(group_id) {
            Ok(completed) => completed,
            Err(err) => {
                warn!("reject split finish: {}", err);
                return Err(err);
            }
        };
        self.splits_finished.add(1);
        if self.log_split_events {
            debug!(
                "split finished: plan_node_id={} group={} outstanding={}",
                self.plan_node_id,
                group_id,
                state.ledger.outstanding(group_id)
            );
        }
        if completed {
            self.complete_group_locked(group_id, &mut notify);
        }
        Ok(())
    }

    fn complete_group_locked(&self, group_id: SplitGroupId, notify: &mut DeferCompletionNotify) {
        debug!(
            "split group completed on plan node: plan_node_id={} group={}",
            self.plan_node_id, group_id
        );
        if self.completion.mark_complete(self.plan_node_id, group_id) {
            notify.push(group_id);
        }
    }

    /// Drops every parked fetch; their futures resolve to `SplitError::WaitAborted`.
    pub fn abort_waiters(&self) -> usize {
        let mut state = self.lock_state();
        let aborted = state.waiters.abort_all();
        if aborted > 0 {
            debug!(
                "split waiters aborted: plan_node_id={} aborted={}",
                self.plan_node_id, aborted
            );
        }
        aborted
    }

    pub fn is_all_splits_finished(&self) -> bool {
        self.lock_state().ledger.all_finished()
    }

    pub fn is_end_of_stream(&self, group_id: SplitGroupId) -> bool {
        self.lock_state().ledger.is_end_of_stream(group_id)
    }

    pub fn outstanding_splits(&self, group_id: SplitGroupId) -> u64 {
        self.lock_state().ledger.outstanding(group_id)
    }

    pub fn split_counts(&self) -> NodeSplitCounts {
        let state = self.lock_state();
        NodeSplitCounts {
            queued: state.queue.len() as u64,
            outstanding: state.ledger.total_outstanding(),
            waiting_fetches: state.waiters.num_waiting() as u64,
        }
    }

    pub(crate) fn splits_added(&self) -> u64 {
        self.splits_added.value().max(0) as u64
    }

    pub(crate) fn splits_finished(&self) -> u64 {
        self.splits_finished.value().max(0) as u64
    }
}

/// Handle for a parked split fetch.
///
/// Resolves to `Ok(Some(split))`, `Ok(None)` for end-of-stream, or
/// `Err(SplitError::WaitAborted)` when the waiter was aborted. Dropping an
/// unresolved handle cancels it. Dropping a handle that was already handed a
/// split puts the split back at the head of its group; the caller that dropped it
/// never owned it.
#[must_use = "a parked fetch holds its place in the wait queue until resolved or dropped"]
pub struct SplitFuture {
    node: Weak<PlanNodeSplits>,
    plan_node_id: PlanNodeId,
    group_id: SplitGroupId,
    waiter_id: u64,
    receiver: Option<oneshot::Receiver<SplitSlot>>,
    parked_at: Instant,
    wait_time: CounterRef,
}

impl std::fmt::Debug for SplitFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitFuture")
            .field("plan_node_id", &self.plan_node_id)
            .field("group_id", &self.group_id)
            .field("waiter_id", &self.waiter_id)
            .field("pending", &self.receiver.is_some())
            .finish()
    }
}

impl SplitFuture {
    pub fn plan_node_id(&self) -> PlanNodeId {
        self.plan_node_id
    }

    pub fn group_id(&self) -> SplitGroupId {
        self.group_id
    }

    /// Blocks the current thread until the fetch resolves.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait(self) -> Result<Option<Split>, SplitError> {
        futures::executor::block_on(self)
    }

    /// Cancels the fetch.
    ///
    /// If a split was already handed to this fetch, cancellation loses the race and
    /// the split is returned: the caller owns it and must report it finished.
    pub fn cancel(mut self) -> Option<Split> {
        let mut receiver = self.receiver.take()?;
        let Some(node) = self.node.upgrade() else {
            return receiver.try_recv().ok().flatten();
        };
        let mut state = node.lock_state();
        if state.waiters.cancel(self.group_id, self.waiter_id) {
            return None;
        }
        receiver.try_recv().ok().flatten()
    }

    fn aborted(&self) -> SplitError {
        SplitError::WaitAborted {
            plan_node_id: self.plan_node_id,
            group_id: self.group_id,
        }
    }
}

impl Future for SplitFuture {
    type Output = Result<Option<Split>, SplitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let aborted = this.aborted();
        let polled = match this.receiver.as_mut() {
            Some(receiver) => Pin::new(receiver).poll(cx),
            None => return Poll::Ready(Err(aborted)),
        };
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.receiver = None;
                let waited_ns = this.parked_at.elapsed().as_nanos().min(i64::MAX as u128) as i64;
                this.wait_time.add(waited_ns);
                Poll::Ready(result.map_err(|_| aborted))
            }
        }
    }
}

impl Drop for SplitFuture {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let mut state = node.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.waiters.cancel(self.group_id, self.waiter_id) {
            return;
        }
        if let Ok(Some(split)) = receiver.try_recv() {
            debug!(
                "resolved split fetch dropped, split returned: plan_node_id={} group={}",
                self.plan_node_id, self.group_id
            );
            if let Some(split) = state.waiters.resolve_with_split(self.group_id, split) {
                state.queue.unget(self.group_id, split);
            }
        }
    }
}
