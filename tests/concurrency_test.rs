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
//! Multi-threaded and async drivers racing producers on one task.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use crate::common::{file_split, groups, path_of};
use splitline::{ExecutionStrategy, PlanNodeId, SplitFetch, SplitGroupId, Task};

mod common;

const NUM_GROUPS: usize = 6;
const SPLITS_PER_GROUP: usize = 40;
const NUM_DRIVERS: usize = 8;

fn drive_group(task: &Task, plan_node_id: PlanNodeId, group: i32, on_split: &dyn Fn(String)) {
    let group_id = SplitGroupId::new(group);
    loop {
        let split = match task
            .get_split_or_future(group_id, plan_node_id)
            .expect("fetch split")
        {
            SplitFetch::Split(split) => split,
            SplitFetch::NoMoreSplits => return,
            SplitFetch::Blocked(future) => match future.wait().expect("split wait") {
                Some(split) => split,
                None => return,
            },
        };
        on_split(path_of(&split));
        task.split_finished(plan_node_id, group_id)
            .expect("finish split");
    }
}

#[test]
fn test_concurrent_drivers_complete_every_group_once() {
    let plan_node_id = PlanNodeId::new(0);
    let task = Arc::new(Task::new(
        "concurrency_test",
        ExecutionStrategy::Grouped {
            num_split_groups: NUM_GROUPS as u32,
        },
        [plan_node_id],
    ));

    let finished_per_group: Arc<Vec<AtomicUsize>> =
        Arc::new((0..NUM_GROUPS).map(|_| AtomicUsize::new(0)).collect());
    let completions = Arc::new(Mutex::new(Vec::new()));
    {
        let finished_per_group = Arc::clone(&finished_per_group);
        let completions = Arc::clone(&completions);
        task.add_split_group_completion_observer(Arc::new(move |group_id| {
            let finished = finished_per_group[group_id.as_i32() as usize].load(Ordering::SeqCst);
            completions
                .lock()
                .expect("completions lock")
                .push((group_id.as_i32(), finished));
        }));
    }

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let start = Arc::new(Barrier::new(NUM_DRIVERS + 1));
    let drivers = (0..NUM_DRIVERS)
        .map(|_| {
            let task = Arc::clone(&task);
            let seen = Arc::clone(&seen);
            let finished_per_group = Arc::clone(&finished_per_group);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for group in 0..NUM_GROUPS as i32 {
                    drive_group(&task, plan_node_id, group, &|path| {
                        assert!(
                            seen.lock().expect("seen lock").insert(path.clone()),
                            "split {path} handed out twice"
                        );
                        finished_per_group[group as usize].fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect::<Vec<_>>();

    let producer = {
        let task = Arc::clone(&task);
        let start = Arc::clone(&start);
        thread::spawn(move || {
            start.wait();
            for group in 0..NUM_GROUPS as i32 {
                for i in 0..SPLITS_PER_GROUP {
                    task.add_split(plan_node_id, file_split(group, &format!("g{group}_{i}")))
                        .expect("add split");
                    if i % 7 == 0 {
                        thread::yield_now();
                    }
                }
                task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(group))
                    .expect("declare group");
            }
            task.no_more_splits(plan_node_id).expect("no more splits");
        })
    };

    producer.join().expect("join producer");
    for driver in drivers {
        driver.join().expect("join driver");
    }

    let ids = (0..NUM_GROUPS as i32).collect::<Vec<_>>();
    assert_eq!(task.completed_split_groups(), groups(&ids));
    assert!(task.is_all_splits_finished());
    assert_eq!(
        seen.lock().expect("seen lock").len(),
        NUM_GROUPS * SPLITS_PER_GROUP
    );

    let mut completions = completions.lock().expect("completions lock").clone();
    completions.sort();
    assert_eq!(completions.len(), NUM_GROUPS, "each group completes once");
    for (group, finished) in completions {
        assert_eq!(
            finished, SPLITS_PER_GROUP,
            "group {group} completed before all of its splits finished"
        );
    }
    let stats = task.task_stats();
    assert_eq!(stats.num_finished_splits, (NUM_GROUPS * SPLITS_PER_GROUP) as u64);
    assert_eq!(stats.num_waiting_split_fetches, 0);
}

#[test]
fn test_declaration_racing_last_finish_completes_once() {
    for round in 0..200 {
        let plan_node_id = PlanNodeId::new(1);
        let task = Arc::new(Task::new(
            format!("race_{round}"),
            ExecutionStrategy::Grouped {
                num_split_groups: 1,
            },
            [plan_node_id],
        ));
        let completions = Arc::new(AtomicUsize::new(0));
        {
            let completions = Arc::clone(&completions);
            task.add_split_group_completion_observer(Arc::new(move |_| {
                completions.fetch_add(1, Ordering::SeqCst);
            }));
        }
        task.add_split(plan_node_id, file_split(0, "only")).expect("add");
        match task
            .get_split_or_future(SplitGroupId::new(0), plan_node_id)
            .expect("fetch")
        {
            SplitFetch::Split(_) => {}
            other => panic!("expected split, got {other:?}"),
        }

        let barrier = Arc::new(Barrier::new(2));
        let finisher = {
            let task = Arc::clone(&task);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                task.split_finished(plan_node_id, SplitGroupId::new(0))
                    .expect("finish");
            })
        };
        barrier.wait();
        task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(0))
            .expect("declare");
        finisher.join().expect("join finisher");

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(task.completed_split_groups(), groups(&[0]));
    }
}

#[test]
fn test_cancel_racing_add_never_loses_a_split() {
    for _ in 0..200 {
        let plan_node_id = PlanNodeId::new(0);
        let task = Arc::new(Task::new(
            "cancel_race",
            ExecutionStrategy::Grouped {
                num_split_groups: 1,
            },
            [plan_node_id],
        ));
        let future = match task
            .get_split_or_future(SplitGroupId::new(0), plan_node_id)
            .expect("fetch")
        {
            SplitFetch::Blocked(future) => future,
            other => panic!("expected parked fetch, got {other:?}"),
        };
        let adder = {
            let task = Arc::clone(&task);
            thread::spawn(move || {
                task.add_split(plan_node_id, file_split(0, "raced")).expect("add");
            })
        };
        let cancelled_with = future.cancel();
        adder.join().expect("join adder");

        let queued = task.task_stats().num_queued_splits;
        match cancelled_with {
            Some(split) => {
                assert_eq!(path_of(&split), "raced");
                assert_eq!(queued, 0);
            }
            None => assert_eq!(queued, 1),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_fetches_resolve_in_park_order() {
    let plan_node_id = PlanNodeId::new(2);
    let task = Arc::new(Task::new(
        "async_test",
        ExecutionStrategy::Grouped {
            num_split_groups: 2,
        },
        [plan_node_id],
    ));

    let mut futures = Vec::new();
    for _ in 0..3 {
        match task
            .get_split_or_future(SplitGroupId::new(1), plan_node_id)
            .expect("fetch")
        {
            SplitFetch::Blocked(future) => futures.push(future),
            other => panic!("expected parked fetch, got {other:?}"),
        }
    }
    let handles = futures
        .into_iter()
        .map(tokio::spawn)
        .collect::<Vec<_>>();

    task.add_split(plan_node_id, file_split(1, "first")).expect("add");
    task.add_split(plan_node_id, file_split(1, "second")).expect("add");
    task.no_more_splits_for_group(plan_node_id, SplitGroupId::new(1))
        .expect("declare");

    let mut results = Vec::new();
    for handle in handles {
        let result = handle.await.expect("join fetch").expect("split wait");
        results.push(result.as_ref().map(path_of));
    }
    assert_eq!(
        results,
        vec![Some("first".to_string()), Some("second".to_string()), None]
    );

    assert!(task.completed_split_groups().is_empty());
    task.split_finished(plan_node_id, SplitGroupId::new(1))
        .expect("finish");
    task.split_finished(plan_node_id, SplitGroupId::new(1))
        .expect("finish");
    assert_eq!(task.completed_split_groups(), groups(&[1]));
}

#[tokio::test]
async fn test_abort_releases_async_waiters() {
    let plan_node_id = PlanNodeId::new(0);
    let task = Task::new("abort_test", ExecutionStrategy::Ungrouped, [plan_node_id]);
    let future = match task
        .get_split_or_future(SplitGroupId::UNGROUPED, plan_node_id)
        .expect("fetch")
    {
        SplitFetch::Blocked(future) => future,
        other => panic!("expected parked fetch, got {other:?}"),
    };
    assert_eq!(task.abort_split_waiters(), 1);
    let err = future.await.expect_err("aborted wait");
    assert!(!err.is_contract_violation());
}
