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
//! Split-facing surface of one task.
//!
//! Responsibilities:
//! - Owns one `PlanNodeSplits` per source plan node, created with the task and never added later.
//! - Validates plan node ids and split group ids for the task's execution strategy.
//! - Exposes task statistics, including the completed split group set, to barrier logic.
//!
//! Key exported interfaces:
//! - Types: `Task`, `ExecutionStrategy`.
//!
//! Plan nodes never share a lock: the node map is immutable after construction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::common::config::{log_split_events, split_wait_log_every};
use crate::common::ids::{PlanNodeId, SplitGroupId};
use crate::exec::split::{PlanNodeSplits, Split, SplitError, SplitFetch};
use crate::runtime::profile::{CounterRef, CounterUnit, RuntimeProfile};
use crate::runtime::split_group_completion::{CompletionObserver, SplitGroupCompletion};
use crate::runtime::task_stats::TaskStats;
use crate::splitline_logging::{info, warn};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecutionStrategy {
    /// Every split is filed under `SplitGroupId::UNGROUPED`.
    Ungrouped,
    /// Splits carry a group id in `0..num_split_groups`.
    Grouped { num_split_groups: u32 },
}

impl ExecutionStrategy {
    fn name(&self) -> &'static str {
        match self {
            ExecutionStrategy::Ungrouped => "ungrouped",
            ExecutionStrategy::Grouped { .. } => "grouped",
        }
    }
}

pub struct Task {
    task_id: String,
    strategy: ExecutionStrategy,
    splits: BTreeMap<PlanNodeId, Arc<PlanNodeSplits>>,
    completion: Arc<SplitGroupCompletion>,
    profile: RuntimeProfile,
    external_splits_finished: CounterRef,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        strategy: ExecutionStrategy,
        source_plan_nodes: impl IntoIterator<Item = PlanNodeId>,
    ) -> Self {
        let task_id = task_id.into();
        let source_plan_nodes = source_plan_nodes.into_iter().collect::<BTreeSet<_>>();
        let completion = Arc::new(SplitGroupCompletion::new(source_plan_nodes.len()));
        let profile = RuntimeProfile::new(format!("Task (id={})", task_id));
        profile.add_info_string("ExecutionStrategy", strategy.name());
        if let ExecutionStrategy::Grouped { num_split_groups } = strategy {
            profile.add_info_string("NumSplitGroups", num_split_groups.to_string());
        }
        let external_splits_finished =
            profile.add_counter("ExternalSplitsFinished", CounterUnit::Unit);

        let log_events = log_split_events();
        let wait_log_every = split_wait_log_every();
        let splits = source_plan_nodes
            .iter()
            .map(|&plan_node_id| {
                let node_profile = profile.child(format!("PlanNode (id={})", plan_node_id));
                let node = PlanNodeSplits::new(
                    plan_node_id,
                    Arc::clone(&completion),
                    &node_profile,
                    log_events,
                    wait_log_every,
                );
                (plan_node_id, node)
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            "task created: task_id={} strategy={:?} source_plan_nodes={:?}",
            task_id, strategy, source_plan_nodes
        );
        Self {
            task_id,
            strategy,
            splits,
            completion,
            profile,
            external_splits_finished,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn execution_strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn is_grouped_execution(&self) -> bool {
        matches!(self.strategy, ExecutionStrategy::Grouped { .. })
    }

    pub fn source_plan_nodes(&self) -> impl Iterator<Item = PlanNodeId> + '_ {
        self.splits.keys().copied()
    }

    pub fn profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    fn node_splits(&self, plan_node_id: PlanNodeId) -> Result<&Arc<PlanNodeSplits>, SplitError> {
        self.splits.get(&plan_node_id).ok_or_else(|| {
            warn!(
                "unknown source plan node: task_id={} plan_node_id={}",
                self.task_id, plan_node_id
            );
            SplitError::UnknownPlanNode(plan_node_id)
        })
    }

    // Maps a caller group id to the key splits are filed under.
    fn check_split_group(
        &self,
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    ) -> Result<SplitGroupId, SplitError> {
        match self.strategy {
            ExecutionStrategy::Ungrouped => Ok(SplitGroupId::UNGROUPED),
            ExecutionStrategy::Grouped { num_split_groups } => {
                let in_range = u32::try_from(group_id.as_i32())
                    .map(|id| id < num_split_groups)
                    .unwrap_or(false);
                if in_range {
                    Ok(group_id)
                } else {
                    Err(SplitError::SplitGroupOutOfRange {
                        plan_node_id,
                        group_id,
                        num_split_groups,
                    })
                }
            }
        }
    }

    fn prepare_split(&self, plan_node_id: PlanNodeId, split: Split) -> Result<Split, SplitError> {
        let group_id = self.check_split_group(plan_node_id, split.group_id())?;
        Ok(split.with_group_id(group_id))
    }

    pub fn add_split(&self, plan_node_id: PlanNodeId, split: Split) -> Result<(), SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let split = self.prepare_split(plan_node_id, split)?;
        node.add_split(split)
    }

    /// Adds a split tagged with a producer sequence id.
    ///
    /// Returns false when the split is at or below the node's max sequence id and was
    /// discarded as a duplicate.
    pub fn add_split_with_sequence(
        &self,
        plan_node_id: PlanNodeId,
        split: Split,
        sequence_id: i64,
    ) -> Result<bool, SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let split = self.prepare_split(plan_node_id, split)?;
        node.add_split_with_sequence(split, sequence_id)
    }

    pub fn set_max_split_sequence_id(
        &self,
        plan_node_id: PlanNodeId,
        max_sequence_id: i64,
    ) -> Result<(), SplitError> {
        self.node_splits(plan_node_id)?
            .set_max_split_sequence_id(max_sequence_id);
        Ok(())
    }

    pub fn no_more_splits_for_group(
        &self,
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    ) -> Result<(), SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let group_id = self.check_split_group(plan_node_id, group_id)?;
        node.no_more_splits_for_group(group_id)
    }

    pub fn no_more_splits(&self, plan_node_id: PlanNodeId) -> Result<(), SplitError> {
        self.node_splits(plan_node_id)?.no_more_splits();
        Ok(())
    }

    pub fn get_split_or_future(
        &self,
        group_id: SplitGroupId,
        plan_node_id: PlanNodeId,
    ) -> Result<SplitFetch, SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let group_id = self.check_split_group(plan_node_id, group_id)?;
        Ok(node.get_split_or_future(group_id))
    }

    pub fn split_finished(
        &self,
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    ) -> Result<(), SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let group_id = self.check_split_group(plan_node_id, group_id)?;
        node.split_finished(group_id)
    }

    /// Accounts splits consumed outside of the split queues (e.g. exchange sources).
    ///
    /// Affects statistics only; group completion is not touched.
    pub fn multiple_splits_finished(&self, num_splits: usize) {
        self.external_splits_finished
            .add(i64::try_from(num_splits).unwrap_or(i64::MAX));
    }

    /// Every source node got its node-wide end-of-stream and has no outstanding split.
    pub fn is_all_splits_finished(&self) -> bool {
        self.splits.values().all(|node| node.is_all_splits_finished())
    }

    pub fn outstanding_splits(
        &self,
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    ) -> Result<u64, SplitError> {
        let node = self.node_splits(plan_node_id)?;
        let group_id = self.check_split_group(plan_node_id, group_id)?;
        Ok(node.outstanding_splits(group_id))
    }

    /// Task teardown: every parked split fetch resolves to `SplitError::WaitAborted`.
    pub fn abort_split_waiters(&self) -> usize {
        let aborted = self
            .splits
            .values()
            .map(|node| node.abort_waiters())
            .sum::<usize>();
        if aborted > 0 {
            info!(
                "split waiters aborted: task_id={} aborted={}",
                self.task_id, aborted
            );
        }
        aborted
    }

    pub fn completed_split_groups(&self) -> BTreeSet<SplitGroupId> {
        self.completion.completed_split_groups()
    }

    pub fn is_split_group_completed(&self, group_id: SplitGroupId) -> bool {
        self.completion.is_completed(group_id)
    }

    /// Registers a callback invoked once for each split group completed after this call.
    pub fn add_split_group_completion_observer(&self, observer: CompletionObserver) {
        self.completion.add_observer(observer);
    }

    pub fn task_stats(&self) -> TaskStats {
        let mut stats = TaskStats::default();
        for node in self.splits.values() {
            let counts = node.split_counts();
            stats.num_total_splits += node.splits_added();
            stats.num_finished_splits += node.splits_finished();
            stats.num_queued_splits += counts.queued;
            stats.num_running_splits += counts.outstanding.saturating_sub(counts.queued);
            stats.num_waiting_split_fetches += counts.waiting_fetches;
        }
        stats.num_finished_splits += self.external_splits_finished.value().max(0) as u64;
        stats.completed_split_groups = self.completion.completed_split_groups();
        self.profile
            .add_counter("CompletedSplitGroups", CounterUnit::Unit)
            .set(stats.completed_split_groups.len() as i64);
        stats
    }
}
