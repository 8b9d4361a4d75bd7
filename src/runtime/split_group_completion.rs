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
//! Task-level record of completed split groups.
//!
//! Responsibilities:
//! - Records each split group as completed exactly once, after every source plan node completed it.
//! - Counts a source node with node-wide end-of-stream as done for every group it never had
//!   unfinished splits for.
//! - Publishes the monotonically growing completed set to task statistics.
//! - Notifies registered observers once per completed group, outside of any split lock.
//!
//! Key exported interfaces:
//! - Types: `SplitGroupCompletion`, `CompletionObserver`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::common::ids::{PlanNodeId, SplitGroupId};
use crate::splitline_logging::{debug, info};

/// Callback invoked with each newly completed split group.
pub type CompletionObserver = Arc<dyn Fn(SplitGroupId) + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct CompletionState {
    // Source nodes that finished a group which is not yet complete for the task.
    node_completions: HashMap<SplitGroupId, HashSet<PlanNodeId>>,
    // Source nodes with node-wide end-of-stream, keyed to the groups still unfinished on them
    // at that moment. Those groups reach `node_completions` through their last finish.
    closed_nodes: HashMap<PlanNodeId, HashSet<SplitGroupId>>,
    completed: BTreeSet<SplitGroupId>,
}

impl CompletionState {
    fn done_nodes(&self, group_id: SplitGroupId) -> usize {
        let marked = self.node_completions.get(&group_id);
        let implicit = self
            .closed_nodes
            .iter()
            .filter(|(plan_node_id, unfinished)| {
                !unfinished.contains(&group_id)
                    && !marked.is_some_and(|nodes| nodes.contains(*plan_node_id))
            })
            .count();
        marked.map_or(0, HashSet::len) + implicit
    }

    fn publish(&mut self, group_id: SplitGroupId) {
        self.node_completions.remove(&group_id);
        self.completed.insert(group_id);
        info!(
            "split group completed: group={} completed_groups={}",
            group_id,
            self.completed.len()
        );
    }
}

pub struct SplitGroupCompletion {
    num_source_nodes: usize,
    state: Mutex<CompletionState>,
    observers: Mutex<Vec<CompletionObserver>>,
}

impl SplitGroupCompletion {
    pub fn new(num_source_nodes: usize) -> Self {
        Self {
            num_source_nodes: num_source_nodes.max(1),
            state: Mutex::new(CompletionState::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Records that `plan_node_id` completed `group_id`.
    ///
    /// Returns true only for the call that completes the group for the whole task.
    /// Repeated calls and the ungrouped id are no-ops.
    pub(crate) fn mark_complete(&self, plan_node_id: PlanNodeId, group_id: SplitGroupId) -> bool {
        if group_id.is_ungrouped() {
            return false;
        }
        let mut guard = self.state.lock().expect("split group completion lock");
        if guard.completed.contains(&group_id) {
            return false;
        }
        guard
            .node_completions
            .entry(group_id)
            .or_default()
            .insert(plan_node_id);
        let done_nodes = guard.done_nodes(group_id);
        if done_nodes < self.num_source_nodes {
            debug!(
                "split group completed on plan node, waiting for other sources: group={} plan_node_id={} completed_nodes={} source_nodes={}",
                group_id, plan_node_id, done_nodes, self.num_source_nodes
            );
            return false;
        }
        guard.publish(group_id);
        true
    }

    /// Records node-wide end-of-stream of `plan_node_id`.
    ///
    /// From now on the node counts as done for every group outside `unfinished_groups`.
    /// Returns the groups this completes for the whole task, in id order.
    pub(crate) fn mark_no_more_splits(
        &self,
        plan_node_id: PlanNodeId,
        unfinished_groups: HashSet<SplitGroupId>,
    ) -> Vec<SplitGroupId> {
        let mut guard = self.state.lock().expect("split group completion lock");
        if guard.closed_nodes.contains_key(&plan_node_id) {
            return Vec::new();
        }
        guard.closed_nodes.insert(plan_node_id, unfinished_groups);
        let mut ready = guard
            .node_completions
            .keys()
            .copied()
            .filter(|group_id| guard.done_nodes(*group_id) >= self.num_source_nodes)
            .collect::<Vec<_>>();
        ready.sort();
        for group_id in &ready {
            guard.publish(*group_id);
        }
        ready
    }

    pub fn is_completed(&self, group_id: SplitGroupId) -> bool {
        let guard = self.state.lock().expect("split group completion lock");
        guard.completed.contains(&group_id)
    }

    /// Snapshot of the completed set; later snapshots are supersets.
    pub fn completed_split_groups(&self) -> BTreeSet<SplitGroupId> {
        let guard = self.state.lock().expect("split group completion lock");
        guard.completed.clone()
    }

    pub fn num_completed(&self) -> usize {
        let guard = self.state.lock().expect("split group completion lock");
        guard.completed.len()
    }

    pub fn add_observer(&self, observer: CompletionObserver) {
        let mut guard = self.observers.lock().expect("completion observers lock");
        guard.push(observer);
    }

    // Creates a notifier that reports pushed groups to observers when dropped.
    pub(crate) fn defer_notify(self: &Arc<Self>) -> DeferCompletionNotify {
        DeferCompletionNotify {
            completion: Arc::clone(self),
            groups: Vec::new(),
        }
    }

    fn notify_observers(&self, groups: &[SplitGroupId]) {
        let observers = {
            let guard = self.observers.lock().expect("completion observers lock");
            guard.clone()
        };
        for group_id in groups {
            for observer in &observers {
                observer(*group_id);
            }
        }
    }
}

/// Delays observer callbacks until drop so they never run under a plan node lock.
/// Declare it before taking the lock it is filled under.
#[must_use]
pub(crate) struct DeferCompletionNotify {
    completion: Arc<SplitGroupCompletion>,
    groups: Vec<SplitGroupId>,
}

impl DeferCompletionNotify {
    pub(crate) fn push(&mut self, group_id: SplitGroupId) {
        self.groups.push(group_id);
    }
}

impl Drop for DeferCompletionNotify {
    fn drop(&mut self) {
        if !self.groups.is_empty() {
            self.completion.notify_observers(&self.groups);
        }
    }
}
