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
use std::collections::BTreeSet;

use crate::common::ids::SplitGroupId;

/// Point-in-time split statistics of a task.
///
/// `completed_split_groups` only grows between snapshots of the same task.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskStats {
    pub num_total_splits: u64,
    pub num_queued_splits: u64,
    /// Taken (or handed to a parked fetch) but not reported finished.
    pub num_running_splits: u64,
    pub num_finished_splits: u64,
    pub num_waiting_split_fetches: u64,
    pub completed_split_groups: BTreeSet<SplitGroupId>,
}

impl TaskStats {
    pub fn completed_group_ids(&self) -> Vec<i32> {
        self.completed_split_groups
            .iter()
            .map(|g| g.as_i32())
            .collect()
    }
}
