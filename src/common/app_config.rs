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

static CONFIG: OnceLock<NovaDeltaConfig> = OnceLock::new();

const CONFIG_ENV: &str = "NOVADELTA_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "novadelta.toml";

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static NovaDeltaConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = NovaDeltaConfig::load_from_file(path.as_ref())?;
    Ok(CONFIG.get_or_init(|| cfg))
}

/// Loads `$NOVADELTA_CONFIG` or `./novadelta.toml`; all settings default when neither exists.
pub fn init_from_env_or_default() -> Result<&'static NovaDeltaConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = match config_path_from_env_or_default()? {
        Some(path) => NovaDeltaConfig::load_from_file(&path)?,
        None => NovaDeltaConfig::default(),
    };
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static NovaDeltaConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        let trimmed = p.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if !path.exists() {
                return Err(anyhow!(
                    "config file from ${CONFIG_ENV} does not exist: {}",
                    path.display()
                ));
            }
            return Ok(Some(path));
        }
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(Some(candidate));
    }
    Ok(None)
}

#[derive(Clone, Debug, Deserialize)]
pub struct NovaDeltaConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "novadelta=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub delta: DeltaConfig,
}

impl NovaDeltaConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: NovaDeltaConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.log_level)
    }
}

impl Default for NovaDeltaConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            delta: DeltaConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeltaConfig {
    /// Initial row capacity of each per-column delta encoder.
    #[serde(default = "default_encoder_initial_capacity")]
    pub encoder_initial_capacity: usize,
    #[serde(default = "default_rows_metric_name")]
    pub rows_metric_name: String,
    #[serde(default = "default_row_buffer_rows_metric_name")]
    pub row_buffer_rows_metric_name: String,
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,
    #[serde(default = "default_ordinal_column")]
    pub ordinal_column: String,
    #[serde(default = "default_batch_id_column")]
    pub batch_id_column: String,
    #[serde(default = "default_bucket_id_column")]
    pub bucket_id_column: String,
}

fn default_encoder_initial_capacity() -> usize {
    200
}
fn default_rows_metric_name() -> String {
    "delta_update_column_batch_rows".to_string()
}
fn default_row_buffer_rows_metric_name() -> String {
    "delta_update_row_buffer_rows".to_string()
}
fn default_row_id_column() -> String {
    "__row_id".to_string()
}
fn default_ordinal_column() -> String {
    "__batch_ordinal".to_string()
}
fn default_batch_id_column() -> String {
    "__batch_id".to_string()
}
fn default_bucket_id_column() -> String {
    "__bucket_id".to_string()
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            encoder_initial_capacity: default_encoder_initial_capacity(),
            rows_metric_name: default_rows_metric_name(),
            row_buffer_rows_metric_name: default_row_buffer_rows_metric_name(),
            row_id_column: default_row_id_column(),
            ordinal_column: default_ordinal_column(),
            batch_id_column: default_batch_id_column(),
            bucket_id_column: default_bucket_id_column(),
        }
    }
}
