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
//! Added/finished split accounting per split group of one plan node.
//!
//! Responsibilities:
//! - Counts outstanding splits (added minus finished) per group.
//! - Holds the two-tier end-of-stream state: per group and node-wide.
//! - Reports the single transition at which a group becomes complete.
//!
//! A group is complete iff end-of-stream holds for it and it has no outstanding split.
//! Every method that can complete a group returns it exactly once.

use std::collections::{HashMap, HashSet};

use crate::common::ids::{PlanNodeId, SplitGroupId};
use crate::exec::split::SplitError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub(crate) enum GroupState {
    #[default]
    Open,
    EndDeclared,
    Completed,
}

#[derive(Debug, Default)]
struct GroupEntry {
    outstanding: u64,
    state: GroupState,
    // Set by an explicit per-group declaration; the node-wide declaration leaves it unset.
    declared_for_group: bool,
}

impl GroupEntry {
    fn try_complete(&mut self) -> bool {
        if self.state == GroupState::EndDeclared && self.outstanding == 0 {
            self.state = GroupState::Completed;
            return true;
        }
        false
    }
}

#[derive(Debug)]
pub(crate) struct GroupLedger {
    plan_node_id: PlanNodeId,
    groups: HashMap<SplitGroupId, GroupEntry>,
    no_more_splits: bool,
}

impl GroupLedger {
    pub(crate) fn new(plan_node_id: PlanNodeId) -> Self {
        Self {
            plan_node_id,
            groups: HashMap::new(),
            no_more_splits: false,
        }
    }

    pub(crate) fn record_added(&mut self, group_id: SplitGroupId) -> Result<(), SplitError> {
        if self.no_more_splits {
            return Err(SplitError::AddAfterNoMoreSplits {
                plan_node_id: self.plan_node_id,
                group_id,
            });
        }
        let entry = self.groups.entry(group_id).or_default();
        if entry.state != GroupState::Open {
            return Err(SplitError::AddAfterNoMoreSplitsForGroup {
                plan_node_id: self.plan_node_id,
                group_id,
            });
        }
        entry.outstanding += 1;
        Ok(())
    }

    /// Returns true when this finish completed the group.
    pub(crate) fn record_finished(&mut self, group_id: SplitGroupId) -> Result<bool, SplitError> {
        let Some(entry) = self
            .groups
            .get_mut(&group_id)
            .filter(|e| e.outstanding > 0)
        else {
            return Err(SplitError::FinishWithoutOutstanding {
                plan_node_id: self.plan_node_id,
                group_id,
            });
        };
        entry.outstanding -= 1;
        Ok(entry.try_complete())
    }

    /// Returns true when the declaration completed the group.
    ///
    /// A group closed only by the node-wide declaration accepts one explicit
    /// declaration as a no-op.
    pub(crate) fn declare_no_more_for_group(
        &mut self,
        group_id: SplitGroupId,
    ) -> Result<bool, SplitError> {
        let entry = self.groups.entry(group_id).or_default();
        if entry.declared_for_group {
            return Err(SplitError::DuplicateNoMoreSplitsForGroup {
                plan_node_id: self.plan_node_id,
                group_id,
            });
        }
        entry.declared_for_group = true;
        if entry.state == GroupState::Open {
            entry.state = GroupState::EndDeclared;
        }
        Ok(entry.try_complete())
    }

    /// Closes every observed group. Returns the groups completed by this call, in id order.
    pub(crate) fn declare_no_more_overall(&mut self) -> Vec<SplitGroupId> {
        if self.no_more_splits {
            return Vec::new();
        }
        self.no_more_splits = true;
        let mut completed = self
            .groups
            .iter_mut()
            .filter_map(|(group_id, entry)| {
                if entry.state == GroupState::Open {
                    entry.state = GroupState::EndDeclared;
                }
                entry.try_complete().then_some(*group_id)
            })
            .collect::<Vec<_>>();
        completed.sort();
        completed
    }

    pub(crate) fn is_end_of_stream(&self, group_id: SplitGroupId) -> bool {
        self.no_more_splits
            || self
                .groups
                .get(&group_id)
                .is_some_and(|e| e.state != GroupState::Open)
    }

    pub(crate) fn no_more_splits(&self) -> bool {
        self.no_more_splits
    }

    pub(crate) fn outstanding(&self, group_id: SplitGroupId) -> u64 {
        self.groups.get(&group_id).map(|e| e.outstanding).unwrap_or(0)
    }

    pub(crate) fn total_outstanding(&self) -> u64 {
        self.groups.values().map(|e| e.outstanding).sum()
    }

    /// Groups seen by this node that have not completed.
    pub(crate) fn unfinished_groups(&self) -> HashSet<SplitGroupId> {
        self.groups
            .iter()
            .filter(|(_, entry)| entry.state != GroupState::Completed)
            .map(|(group_id, _)| *group_id)
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn group_state(&self, group_id: SplitGroupId) -> Option<GroupState> {
        self.groups.get(&group_id).map(|e| e.state)
    }

    /// Node-wide end-of-stream declared and every split finished.
    pub(crate) fn all_finished(&self) -> bool {
        self.no_more_splits && self.total_outstanding() == 0
    }
}
