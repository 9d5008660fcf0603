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
#![allow(unused_imports)]

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use tempfile::TempDir;

use novadelta::common::metrics::CounterSet;
use novadelta::connector::delta::{
    DeltaUpdateExecutor, DeltaUpdatePlan, DeltaUpdateServices, MemoryColumnBatchStore,
    MemoryRowBuffer, UpdatedColumn,
};
use novadelta::novadelta_config;
use novadelta::novadelta_logging;

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    /// Writes a config that spells out the default delta settings.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("test_novadelta.toml");

        let config_content = r#"
log_level = "debug"

[delta]
encoder_initial_capacity = 200
rows_metric_name = "delta_update_column_batch_rows"
row_buffer_rows_metric_name = "delta_update_row_buffer_rows"
row_id_column = "__row_id"
ordinal_column = "__batch_ordinal"
batch_id_column = "__batch_id"
bucket_id_column = "__bucket_id"
"#;

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    /// Initialize logging for tests.
    pub fn init_logging(&self) {
        novadelta_logging::init_with_level("debug");
    }

    /// Load the test configuration.
    pub fn load_config(&self) -> anyhow::Result<&'static novadelta_config::NovaDeltaConfig> {
        novadelta_config::init_from_path(&self.config_path)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new().expect("Failed to create test config")
    }
}

/// One update row against a table with a single nullable `Int64` column `v`.
#[derive(Clone, Copy, Debug)]
pub struct TestRow {
    pub row_id: i64,
    pub batch_id: Option<i64>,
    pub bucket_id: i32,
    pub ordinal: Option<i64>,
    pub value: Option<i64>,
}

impl TestRow {
    /// Row resident in column batch `batch_id` of bucket 0.
    pub fn in_batch(batch_id: i64, ordinal: i64, value: i64) -> Self {
        Self {
            row_id: batch_id * 1_000 + ordinal,
            batch_id: Some(batch_id),
            bucket_id: 0,
            ordinal: Some(ordinal),
            value: Some(value),
        }
    }

    /// Row resident in the row buffer.
    pub fn in_row_buffer(row_id: i64, value: i64) -> Self {
        Self {
            row_id,
            batch_id: None,
            bucket_id: 0,
            ordinal: None,
            value: Some(value),
        }
    }

    pub fn with_bucket(mut self, bucket_id: i32) -> Self {
        self.bucket_id = bucket_id;
        self
    }
}

pub fn int_plan() -> DeltaUpdatePlan {
    DeltaUpdatePlan::new(
        "APP.ORDERS",
        vec![UpdatedColumn::new("v", 2, DataType::Int64, true)],
    )
}

pub fn int_rows(rows: &[TestRow]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("v", DataType::Int64, true),
        Field::new("__row_id", DataType::Int64, false),
        Field::new("__batch_ordinal", DataType::Int64, true),
        Field::new("__batch_id", DataType::Int64, true),
        Field::new("__bucket_id", DataType::Int32, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(rows.iter().map(|r| r.value).collect::<Vec<_>>())),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.row_id))),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.ordinal).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.batch_id).collect::<Vec<_>>())),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.bucket_id))),
    ];
    RecordBatch::try_new(Arc::new(schema), columns).expect("build update rows")
}

/// Executor wired to in-memory stores.
pub struct Harness {
    pub row_buffer: Arc<MemoryRowBuffer>,
    pub store: Arc<MemoryColumnBatchStore>,
    pub metrics: Arc<CounterSet>,
    pub executor: DeltaUpdateExecutor,
}

impl Harness {
    pub fn new(plan: DeltaUpdatePlan) -> Self {
        let row_buffer = Arc::new(MemoryRowBuffer::new());
        let store = Arc::new(MemoryColumnBatchStore::new());
        let metrics = Arc::new(CounterSet::new());
        let services = DeltaUpdateServices {
            row_buffer: row_buffer.clone(),
            column_store: store.clone(),
            metrics: Some(metrics.clone()),
        };
        let executor = DeltaUpdateExecutor::try_new(plan, services).expect("build executor");
        Self {
            row_buffer,
            store,
            metrics,
            executor,
        }
    }
}

/// Assert that a result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}
