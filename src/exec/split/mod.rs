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
//! Split supply for source plan nodes.
//!
//! Responsibilities:
//! - Buffers splits per plan node and split group, and hands them to drivers on demand.
//! - Parks fetches that find no split and resolves them on the next split or end-of-stream.
//! - Tracks added vs finished splits per group to detect split group completion exactly once.
//!
//! Key exported interfaces:
//! - Types: `Split`, `ConnectorSplit`, `SplitFetch`, `SplitFuture`, `SplitError`, `PlanNodeSplits`.

use std::fmt;

use crate::common::ids::{PlanNodeId, SplitGroupId};

pub mod group_ledger;
pub mod node_splits;
#[allow(clippy::module_inception)]
pub mod split;
pub mod split_queue;
pub mod wait_registry;

pub use node_splits::{PlanNodeSplits, SplitFetch, SplitFuture};
pub use split::{ConnectorSplit, Split};

/// Misuse of the split API by a producer or driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    UnknownPlanNode(PlanNodeId),
    SplitGroupOutOfRange {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
        num_split_groups: u32,
    },
    AddAfterNoMoreSplits {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    },
    AddAfterNoMoreSplitsForGroup {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    },
    DuplicateNoMoreSplitsForGroup {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    },
    FinishWithoutOutstanding {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    },
    WaitAborted {
        plan_node_id: PlanNodeId,
        group_id: SplitGroupId,
    },
}

impl SplitError {
    /// True for errors caused by a collaborator breaking the split protocol.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, SplitError::WaitAborted { .. })
    }
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitError::UnknownPlanNode(plan_node_id) => {
                write!(f, "plan node {} is not a source of this task", plan_node_id)
            }
            SplitError::SplitGroupOutOfRange {
                plan_node_id,
                group_id,
                num_split_groups,
            } => write!(
                f,
                "split group {} out of range for plan node {}: task has {} split groups",
                group_id, plan_node_id, num_split_groups
            ),
            SplitError::AddAfterNoMoreSplits {
                plan_node_id,
                group_id,
            } => write!(
                f,
                "split for group {} added to plan node {} after no more splits",
                group_id, plan_node_id
            ),
            SplitError::AddAfterNoMoreSplitsForGroup {
                plan_node_id,
                group_id,
            } => write!(
                f,
                "split added to plan node {} after no more splits for group {}",
                plan_node_id, group_id
            ),
            SplitError::DuplicateNoMoreSplitsForGroup {
                plan_node_id,
                group_id,
            } => write!(
                f,
                "no more splits for group {} declared twice on plan node {}",
                group_id, plan_node_id
            ),
            SplitError::FinishWithoutOutstanding {
                plan_node_id,
                group_id,
            } => write!(
                f,
                "split finished for group {} on plan node {} without an outstanding split",
                group_id, plan_node_id
            ),
            SplitError::WaitAborted {
                plan_node_id,
                group_id,
            } => write!(
                f,
                "split wait for group {} on plan node {} aborted",
                group_id, plan_node_id
            ),
        }
    }
}

impl std::error::Error for SplitError {}

impl From<SplitError> for String {
    fn from(err: SplitError) -> Self {
        err.to_string()
    }
}
