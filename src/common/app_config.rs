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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<SplitlineConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static SplitlineConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = SplitlineConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    CONFIG
        .get()
        .ok_or_else(|| anyhow!("config not initialized after set"))
}

pub fn init_from_env_or_default() -> Result<&'static SplitlineConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    init_from_path(path)
}

pub fn config() -> Result<&'static SplitlineConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("SPLITLINE_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("splitline.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $SPLITLINE_CONFIG or create ./splitline.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct SplitlineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "splitline=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub task: TaskConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

impl SplitlineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parse toml: {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: SplitlineConfig = toml::from_str(s)?;
        if cfg.demo.drivers == 0 {
            return Err(anyhow!("demo.drivers must be greater than 0"));
        }
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.log_level)
    }
}

impl Default for SplitlineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            task: TaskConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TaskConfig {
    /// Emit one debug line per split add/take/finish.
    #[serde(default)]
    pub log_split_events: bool,
    /// Log one out of every N parked split fetches.
    #[serde(default = "default_wait_log_every")]
    pub wait_log_every: u64,
}

fn default_wait_log_every() -> u64 {
    1024
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            log_split_events: false,
            wait_log_every: default_wait_log_every(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_demo_num_split_groups")]
    pub num_split_groups: u32,
    #[serde(default = "default_demo_splits_per_group")]
    pub splits_per_group: usize,
    #[serde(default = "default_demo_drivers")]
    pub drivers: usize,
}

fn default_demo_num_split_groups() -> u32 {
    4
}

fn default_demo_splits_per_group() -> usize {
    8
}

fn default_demo_drivers() -> usize {
    4
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            num_split_groups: default_demo_num_split_groups(),
            splits_per_group: default_demo_splits_per_group(),
            drivers: default_demo_drivers(),
        }
    }
}
