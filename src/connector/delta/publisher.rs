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
use std::sync::Arc;

use crate::common::error::DeltaUpdateError;
use crate::common::ids::GroupKey;
use crate::common::metrics::MetricsSink;
use crate::connector::delta::store::{ColumnBatchStore, RowPromotion};
use crate::formats::delta::DeltaColumnBatch;
use crate::novadelta_logging::{debug, warn};

/// Hands sealed delta batches to the column-batch store.
pub struct FlushPublisher {
    table: String,
    store: Arc<dyn ColumnBatchStore>,
    metrics: Option<Arc<dyn MetricsSink>>,
    rows_metric_name: String,
}

impl FlushPublisher {
    pub fn new(
        table: impl Into<String>,
        store: Arc<dyn ColumnBatchStore>,
        metrics: Option<Arc<dyn MetricsSink>>,
        rows_metric_name: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            store,
            metrics,
            rows_metric_name: rows_metric_name.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stores `batch` for the column batch identified by `key`. The store is told never to
    /// promote these rows into the row buffer. On failure the batch is dropped.
    pub fn publish(&self, batch: DeltaColumnBatch, key: GroupKey) -> Result<(), DeltaUpdateError> {
        let rows = batch.row_count();
        let bytes = batch.total_bytes();
        self.store
            .store_delta_batch(
                &self.table,
                batch,
                key.bucket_id,
                key.batch_id,
                RowPromotion::Never,
            )
            .map_err(|message| {
                warn!(
                    "store delta batch failed: table={} {} rows={} error={}",
                    self.table, key, rows, message
                );
                DeltaUpdateError::Publish {
                    table: self.table.clone(),
                    group: key,
                    message,
                }
            })?;
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.increment(&self.rows_metric_name, rows as i64);
        }
        debug!(
            "published delta batch: table={} {} rows={} bytes={}",
            self.table, key, rows, bytes
        );
        Ok(())
    }
}
