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
//! Split group completion as observed through task statistics.

use std::sync::{Arc, Mutex};

use crate::common::{file_split, groups, path_of, use_one_split};
use splitline::{
    ExecutionStrategy, PlanNodeId, SplitError, SplitFetch, SplitGroupId, Task,
};

mod common;

fn grouped_task(num_split_groups: u32, plan_node_id: PlanNodeId) -> Task {
    Task::new(
        "split_group_test",
        ExecutionStrategy::Grouped { num_split_groups },
        [plan_node_id],
    )
}

#[test]
fn test_split_group_completion_trace() {
    let plan_node_id = PlanNodeId::new(0);
    let task = grouped_task(3, plan_node_id);

    // Group 0: three splits used before the declaration.
    task.add_split(plan_node_id, file_split(0, "g0_a")).expect("add");
    task.add_split(plan_node_id, file_split(0, "g0_b")).expect("add");
    use_one_split(&task, 0, plan_node_id);
    use_one_split(&task, 0, plan_node_id);
    task.add_split(plan_node_id, file_split(0, "g0_c")).expect("add");
    use_one_split(&task, 0, plan_node_id);
    assert_eq!(task.task_stats().completed_split_groups, groups(&[]));

    task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(0))
        .expect("declare group 0");
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0]));

    // Group 1: declared while three splits are outstanding, two of them used.
    for path in ["g1_a", "g1_b", "g1_c"] {
        task.add_split(plan_node_id, file_split(1, path)).expect("add");
    }
    task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(1))
        .expect("declare group 1");
    use_one_split(&task, 1, plan_node_id);
    use_one_split(&task, 1, plan_node_id);
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0]));

    // Group 2: declared with two outstanding splits.
    task.add_split(plan_node_id, file_split(2, "g2_a")).expect("add");
    task.add_split(plan_node_id, file_split(2, "g2_b")).expect("add");
    task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(2))
        .expect("declare group 2");
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0]));

    use_one_split(&task, 1, plan_node_id);
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0, 1]));

    use_one_split(&task, 2, plan_node_id);
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0, 1]));
    use_one_split(&task, 2, plan_node_id);
    assert_eq!(task.task_stats().completed_split_groups, groups(&[0, 1, 2]));

    let stats = task.task_stats();
    assert_eq!(stats.num_total_splits, 8);
    assert_eq!(stats.num_finished_splits, 8);
    assert_eq!(stats.num_queued_splits, 0);
    assert_eq!(stats.completed_group_ids(), vec![0, 1, 2]);
}

#[test]
fn test_splits_are_fifo_within_group() {
    let plan_node_id = PlanNodeId::new(4);
    let task = grouped_task(2, plan_node_id);
    for path in ["s1", "s2", "s3"] {
        task.add_split(plan_node_id, file_split(1, path)).expect("add");
    }
    task.add_split(plan_node_id, file_split(0, "other")).expect("add");
    let taken = (0..3)
        .map(|_| path_of(&use_one_split(&task, 1, plan_node_id)))
        .collect::<Vec<_>>();
    assert_eq!(taken, vec!["s1", "s2", "s3"]);
}

#[test]
fn test_no_more_splits_completes_idle_groups() {
    let plan_node_id = PlanNodeId::new(0);
    let task = grouped_task(4, plan_node_id);
    task.add_split(plan_node_id, file_split(0, "a")).expect("add");
    task.add_split(plan_node_id, file_split(1, "b")).expect("add");
    use_one_split(&task, 0, plan_node_id);

    task.no_more_splits(plan_node_id).expect("no more splits");
    // Group 1 still has a queued split; groups 2 and 3 were never observed.
    assert_eq!(task.completed_split_groups(), groups(&[0]));
    assert!(!task.is_all_splits_finished());

    assert!(matches!(
        task.add_split(plan_node_id, file_split(3, "late")),
        Err(SplitError::AddAfterNoMoreSplits { .. })
    ));

    use_one_split(&task, 1, plan_node_id);
    assert_eq!(task.completed_split_groups(), groups(&[0, 1]));
    assert!(task.is_all_splits_finished());
    assert!(matches!(
        task.get_split_or_future(SplitGroupId::new(2), plan_node_id),
        Ok(SplitFetch::NoMoreSplits)
    ));
}

#[test]
fn test_completed_set_is_monotonic_and_observed_once() {
    let plan_node_id = PlanNodeId::new(0);
    let task = grouped_task(3, plan_node_id);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_clone = Arc::clone(&observed);
    task.add_split_group_completion_observer(Arc::new(move |group_id| {
        observed_clone
            .lock()
            .expect("observed lock")
            .push(group_id.as_i32());
    }));

    let mut previous = task.completed_split_groups();
    for group in 0..3 {
        task.add_split(plan_node_id, file_split(group, "x")).expect("add");
        task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(group))
            .expect("declare");
        use_one_split(&task, group, plan_node_id);
        let current = task.completed_split_groups();
        assert!(current.is_superset(&previous));
        previous = current;
    }
    // A late node-wide declaration must not re-trigger anything.
    task.no_more_splits(plan_node_id).expect("no more splits");
    task.no_more_splits(plan_node_id).expect("repeat is a no-op");

    assert_eq!(previous, groups(&[0, 1, 2]));
    assert_eq!(*observed.lock().expect("observed lock"), vec![0, 1, 2]);
}

#[test]
fn test_contract_violations_are_reported() {
    let plan_node_id = PlanNodeId::new(0);
    let task = grouped_task(2, plan_node_id);

    let err = task
        .split_finished(plan_node_id, SplitGroupId::new(0))
        .expect_err("finish without split");
    assert!(err.is_contract_violation());
    assert!(err.to_string().contains("without an outstanding split"));

    task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(1))
        .expect("declare");
    assert!(matches!(
        task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(1)),
        Err(SplitError::DuplicateNoMoreSplitsForGroup { .. })
    ));
    assert!(matches!(
        task.add_split(plan_node_id, file_split(1, "late")),
        Err(SplitError::AddAfterNoMoreSplitsForGroup { .. })
    ));
    // Group 1 had nothing outstanding, so the declaration alone completed it.
    assert_eq!(task.completed_split_groups(), groups(&[1]));
}
