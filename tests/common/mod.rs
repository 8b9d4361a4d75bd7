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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use splitline::{ConnectorSplit, PlanNodeId, Split, SplitFetch, SplitGroupId, Task};

/// File-backed split payload used by the integration tests.
#[derive(Debug)]
pub struct FileSplit {
    pub path: String,
    pub start: u64,
    pub length: u64,
}

impl ConnectorSplit for FileSplit {
    fn connector_id(&self) -> &str {
        "test-file"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn file_split(group: i32, path: &str) -> Split {
    Split::new(
        Arc::new(FileSplit {
            path: path.to_string(),
            start: 0,
            length: 100,
        }),
        SplitGroupId::new(group),
    )
}

pub fn path_of(split: &Split) -> String {
    split
        .downcast_ref::<FileSplit>()
        .map(|s| s.path.clone())
        .unwrap_or_default()
}

pub fn groups(ids: &[i32]) -> BTreeSet<SplitGroupId> {
    ids.iter().copied().map(SplitGroupId::new).collect()
}

/// Fetches one queued split of `group` and reports it finished.
pub fn use_one_split(task: &Task, group: i32, plan_node_id: PlanNodeId) -> Split {
    let group_id = SplitGroupId::new(group);
    let split = match task
        .get_split_or_future(group_id, plan_node_id)
        .expect("fetch split")
    {
        SplitFetch::Split(split) => split,
        other => panic!("expected a queued split for group {group}, got {other:?}"),
    };
    task.split_finished(plan_node_id, group_id)
        .expect("finish split");
    split
}

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("test_splitline.toml");

        let config_content = r#"
log_level = "warn"

[task]
log_split_events = false
wait_log_every = 64

[demo]
num_split_groups = 3
splits_per_group = 5
drivers = 2
"#;

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }
}
