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
use std::any::Any;
use std::env;
use std::process;
use std::sync::Arc;
use std::thread;

use splitline::splitline_config::{self, SplitlineConfig};
use splitline::splitline_logging::{self, error, info};
use splitline::{
    ConnectorSplit, ExecutionStrategy, PlanNodeId, Split, SplitFetch, SplitGroupId, Task,
};

#[derive(Debug)]
struct BucketFileSplit {
    path: String,
}

impl ConnectorSplit for BucketFileSplit {
    fn connector_id(&self) -> &str {
        "demo-bucket-file"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Ok(None) means no config file was found and built-in defaults apply.
fn load_config(config_path: Option<&str>) -> Result<Option<&'static SplitlineConfig>, String> {
    match config_path {
        Some(path) => splitline_config::init_from_path(path)
            .map(Some)
            .map_err(|e| format!("{e:#}")),
        None => match splitline_config::init_from_env_or_default() {
            Ok(cfg) => Ok(Some(cfg)),
            Err(err) => {
                eprintln!("{err:#}; using built-in defaults");
                Ok(None)
            }
        },
    }
}

fn run_driver(task: &Task, plan_node_id: PlanNodeId, num_split_groups: u32) -> Result<usize, String> {
    let mut processed = 0usize;
    for group in 0..num_split_groups {
        let group_id = SplitGroupId::try_from(group)?;
        loop {
            let split = match task.get_split_or_future(group_id, plan_node_id)? {
                SplitFetch::Split(split) => split,
                SplitFetch::NoMoreSplits => break,
                SplitFetch::Blocked(future) => match future.wait()? {
                    Some(split) => split,
                    None => break,
                },
            };
            if let Some(file) = split.downcast_ref::<BucketFileSplit>() {
                info!("processing split: group={} path={}", group_id, file.path);
            }
            processed += 1;
            task.split_finished(plan_node_id, group_id)?;
        }
    }
    Ok(processed)
}

fn run_producer(
    task: &Task,
    plan_node_id: PlanNodeId,
    num_split_groups: u32,
    splits_per_group: usize,
) -> Result<(), String> {
    for group in 0..num_split_groups {
        let group_id = SplitGroupId::try_from(group)?;
        for i in 0..splits_per_group {
            let split = Split::new(
                Arc::new(BucketFileSplit {
                    path: format!("bucket_{group:05}/part-{i:05}.parquet"),
                }),
                group_id,
            );
            task.add_split(plan_node_id, split)?;
        }
        task.no_more_splits_for_group(plan_node_id, group_id)?;
    }
    task.no_more_splits(plan_node_id)?;
    Ok(())
}

fn run(cfg: &SplitlineConfig) -> Result<(), String> {
    let plan_node_id = PlanNodeId::new(0);
    let num_split_groups = cfg.demo.num_split_groups;
    let task = Arc::new(Task::new(
        "splitline-demo",
        ExecutionStrategy::Grouped { num_split_groups },
        [plan_node_id],
    ));
    task.add_split_group_completion_observer(Arc::new(|group_id| {
        println!("split group {} completed", group_id);
    }));

    let drivers = (0..cfg.demo.drivers)
        .map(|_| {
            let task = Arc::clone(&task);
            thread::spawn(move || run_driver(&task, plan_node_id, num_split_groups))
        })
        .collect::<Vec<_>>();
    let splits_per_group = cfg.demo.splits_per_group;
    let producer_task = Arc::clone(&task);
    let producer = thread::spawn(move || {
        run_producer(&producer_task, plan_node_id, num_split_groups, splits_per_group)
    });

    producer
        .join()
        .map_err(|_| "producer thread panicked".to_string())??;
    let mut processed = 0usize;
    for driver in drivers {
        processed += driver
            .join()
            .map_err(|_| "driver thread panicked".to_string())??;
    }

    let stats = task.task_stats();
    println!(
        "processed {} splits, completed split groups: {:?}",
        processed,
        stats.completed_group_ids()
    );
    println!("{}", task.profile().pretty_print());
    if !task.is_all_splits_finished() {
        return Err("task finished with outstanding splits".to_string());
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut idx = 1usize;
    if args.get(idx).is_some_and(|s| s == "run") {
        idx += 1;
    }

    let mut config_path: Option<String> = None;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "--config" | "-c" => {
                idx += 1;
                config_path = args.get(idx).cloned();
                if config_path.is_none() {
                    eprintln!("missing value for --config/-c");
                    process::exit(1);
                }
                idx += 1;
            }
            "--help" | "-h" => {
                eprintln!("Usage: splitline [run] [--config <path>]");
                eprintln!("  run      - Replay a grouped execution with the [demo] settings (default)");
                process::exit(0);
            }
            other => {
                eprintln!("unknown arg: {other} (try --help)");
                process::exit(1);
            }
        }
    }

    let default_cfg = SplitlineConfig::default();
    let cfg = match load_config(config_path.as_deref()) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => &default_cfg,
        Err(msg) => {
            eprintln!("failed to load config: {msg}");
            process::exit(1);
        }
    };
    splitline_logging::init_from_config(cfg);

    if let Err(err) = run(cfg) {
        error!("splitline demo failed: {}", err);
        eprintln!("splitline demo failed: {err}");
        process::exit(1);
    }
}
