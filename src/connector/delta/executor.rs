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
//! One update execution over an ordered stream of update chunks.
//!
//! Executors share nothing with each other. Run one per bucket or partition; the two
//! storage services are the only shared state and synchronize themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::array::RecordBatch;

use crate::common::config;
use crate::common::error::DeltaUpdateError;
use crate::common::metrics::MetricsSink;
use crate::connector::delta::chunk::UpdateChunk;
use crate::connector::delta::dispatcher::{RowBufferTarget, RowDispatcher};
use crate::connector::delta::plan::DeltaUpdatePlan;
use crate::connector::delta::publisher::FlushPublisher;
use crate::connector::delta::store::{ColumnBatchStore, RowBufferStore};
use crate::connector::delta::tracker::{BatchBoundaryTracker, FlushedGroup};
use crate::formats::delta::{DeltaColumnIndex, assign_delta_indexes};
use crate::novadelta_logging::{info, instrument, warn};

/// External services an executor writes through.
#[derive(Clone)]
pub struct DeltaUpdateServices {
    pub row_buffer: Arc<dyn RowBufferStore>,
    pub column_store: Arc<dyn ColumnBatchStore>,
    pub metrics: Option<Arc<dyn MetricsSink>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateSummary {
    pub table: String,
    /// Rows sent to the row buffer.
    pub row_buffer_rows: usize,
    /// Rows the row buffer reported as changed.
    pub row_buffer_rows_affected: u64,
    /// Rows written into delta batches.
    pub delta_rows: usize,
    /// Published groups in publish order.
    pub flushed_batches: Vec<FlushedGroup>,
}

pub struct DeltaUpdateExecutor {
    plan: DeltaUpdatePlan,
    delta_indexes: Arc<[DeltaColumnIndex]>,
    dispatcher: RowDispatcher,
    cancelled: Arc<AtomicBool>,
}

impl DeltaUpdateExecutor {
    /// Validates `plan` and computes the delta column indexes used by every batch this
    /// executor publishes.
    pub fn try_new(
        plan: DeltaUpdatePlan,
        services: DeltaUpdateServices,
    ) -> Result<Self, DeltaUpdateError> {
        plan.validate().map_err(DeltaUpdateError::Contract)?;
        let delta_indexes = assign_delta_indexes(&plan.schema_positions(), plan.hierarchy_depth)
            .map_err(|e| DeltaUpdateError::contract(format!("table {}: {}", plan.table, e)))?;

        let tracker = BatchBoundaryTracker::new(
            plan.updated_columns.clone().into(),
            Arc::clone(&delta_indexes),
            plan.encoder_initial_capacity,
        )
        .map_err(DeltaUpdateError::Contract)?;
        let publisher = FlushPublisher::new(
            plan.table.clone(),
            services.column_store,
            services.metrics.clone(),
            config::rows_metric_name(),
        );
        let row_buffer = RowBufferTarget {
            store: services.row_buffer,
            key_columns: plan.row_buffer_key_columns.clone(),
            updated_columns: plan.updated_column_names(),
            rows_metric_name: config::row_buffer_rows_metric_name(),
        };
        let dispatcher = RowDispatcher::new(row_buffer, tracker, publisher, services.metrics);

        Ok(Self {
            plan,
            delta_indexes,
            dispatcher,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shares `flag` with the caller. Setting it stops the executor before its next row.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn plan(&self) -> &DeltaUpdatePlan {
        &self.plan
    }

    pub fn delta_indexes(&self) -> &[DeltaColumnIndex] {
        &self.delta_indexes
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    pub fn process_batch(&mut self, batch: RecordBatch) -> Result<(), DeltaUpdateError> {
        self.ensure_open()?;
        match UpdateChunk::try_new(batch, &self.plan) {
            Ok(chunk) => self.process_chunk(&chunk),
            Err(e) => {
                self.dispatcher.abort();
                Err(DeltaUpdateError::contract(format!("table {}: {}", self.plan.table, e)))
            }
        }
    }

    /// Dispatches every row of `chunk` in order.
    pub fn process_chunk(&mut self, chunk: &UpdateChunk) -> Result<(), DeltaUpdateError> {
        self.ensure_open()?;
        if chunk.num_updated_columns() != self.plan.updated_columns.len() {
            self.dispatcher.abort();
            return Err(DeltaUpdateError::contract(format!(
                "chunk carries {} updated columns, plan for {} has {}",
                chunk.num_updated_columns(),
                self.plan.table,
                self.plan.updated_columns.len()
            )));
        }
        for row in chunk.rows() {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(self.cancel());
            }
            self.dispatcher.dispatch(&row)?;
        }
        Ok(())
    }

    /// Publishes the last group and ends the execution.
    #[instrument(skip_all, fields(table = %self.plan.table))]
    pub fn finish(mut self) -> Result<UpdateSummary, DeltaUpdateError> {
        self.ensure_open()?;
        if self.cancelled.load(Ordering::Acquire) {
            return Err(self.cancel());
        }
        self.dispatcher.finish()?;
        let stats = self.dispatcher.stats().clone();
        let summary = UpdateSummary {
            table: self.plan.table,
            row_buffer_rows: stats.row_buffer_rows,
            row_buffer_rows_affected: stats.row_buffer_rows_affected,
            delta_rows: stats.delta_rows,
            flushed_batches: stats.flushed,
        };
        info!(
            "delta update finished: table={} row_buffer_rows={} delta_rows={} batches={}",
            summary.table,
            summary.row_buffer_rows,
            summary.delta_rows,
            summary.flushed_batches.len()
        );
        Ok(summary)
    }

    /// Ends the execution without publishing the group in progress, which is returned.
    pub fn abort(mut self) -> Option<FlushedGroup> {
        let dropped = self.dispatcher.abort();
        if let Some(group) = dropped {
            info!(
                "delta update aborted: table={} dropped {} rows of {}",
                self.plan.table, group.row_count, group.key
            );
        }
        dropped
    }

    fn ensure_open(&self) -> Result<(), DeltaUpdateError> {
        if self.dispatcher.is_closed() {
            return Err(DeltaUpdateError::Closed);
        }
        Ok(())
    }

    fn cancel(&mut self) -> DeltaUpdateError {
        let dropped = self.dispatcher.abort();
        warn!(
            "delta update cancelled: table={} dropped_rows={}",
            self.plan.table,
            dropped.map(|g| g.row_count).unwrap_or(0)
        );
        DeltaUpdateError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use arrow::array::{Int32Array, Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::{DeltaUpdateExecutor, DeltaUpdateServices};
    use crate::common::error::DeltaUpdateError;
    use crate::connector::delta::memory::{MemoryColumnBatchStore, MemoryRowBuffer};
    use crate::connector::delta::plan::{DeltaUpdatePlan, UpdatedColumn};

    fn services(store: Arc<MemoryColumnBatchStore>) -> DeltaUpdateServices {
        DeltaUpdateServices {
            row_buffer: Arc::new(MemoryRowBuffer::new()),
            column_store: store,
            metrics: None,
        }
    }

    fn plan() -> DeltaUpdatePlan {
        DeltaUpdatePlan::new(
            "APP.T",
            vec![
                UpdatedColumn::new("a", 0, DataType::Int32, false),
                UpdatedColumn::new("b", 4, DataType::Int64, true),
            ],
        )
    }

    fn batch(batch_ids: Vec<Option<i64>>) -> RecordBatch {
        let n = batch_ids.len();
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int32, false),
            Field::new("b", DataType::Int64, true),
            Field::new("__row_id", DataType::Int64, false),
            Field::new("__batch_ordinal", DataType::Int32, true),
            Field::new("__batch_id", DataType::Int64, true),
            Field::new("__bucket_id", DataType::Int32, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from_iter_values(0..n as i32)),
                Arc::new(Int64Array::from(vec![None::<i64>; n])),
                Arc::new(Int64Array::from_iter_values(0..n as i64)),
                Arc::new(Int32Array::from_iter_values(0..n as i32)),
                Arc::new(Int64Array::from(batch_ids)),
                Arc::new(Int32Array::from(vec![1; n])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn indexes_are_computed_once_at_build() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let executor = DeltaUpdateExecutor::try_new(plan(), services(store)).unwrap();
        let indexes = executor
            .delta_indexes()
            .iter()
            .map(|i| i.as_i32())
            .collect::<Vec<_>>();
        assert_eq!(indexes, vec![-4, -16]);
    }

    #[test]
    fn rejects_generation_outside_assigned_range() {
        let mut plan = plan();
        plan.hierarchy_depth = 3;
        let store = Arc::new(MemoryColumnBatchStore::new());
        let err = DeltaUpdateExecutor::try_new(plan, services(store))
            .err()
            .unwrap();
        assert!(err.is_contract_violation(), "{err}");
    }

    #[test]
    fn position_regression_across_chunks_closes_executor() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let mut executor = DeltaUpdateExecutor::try_new(plan(), services(store.clone())).unwrap();
        executor
            .process_batch(batch(vec![Some(1), Some(1), None, Some(2)]))
            .unwrap();
        // batch 2 restarts at ordinal 0 after ordinal 3
        let err = executor.process_batch(batch(vec![Some(2)])).unwrap_err();
        assert!(err.is_contract_violation(), "{err}");
        assert!(executor.is_closed());
        assert_eq!(store.stored().len(), 1);
    }

    #[test]
    fn summary_counts_both_paths() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let mut executor = DeltaUpdateExecutor::try_new(plan(), services(store.clone())).unwrap();
        executor
            .process_batch(batch(vec![Some(1), Some(1), None, Some(2)]))
            .unwrap();
        let summary = executor.finish().unwrap();
        assert_eq!(summary.row_buffer_rows, 1);
        assert_eq!(summary.row_buffer_rows_affected, 1);
        assert_eq!(summary.delta_rows, 3);
        assert_eq!(
            summary
                .flushed_batches
                .iter()
                .map(|g| g.row_count)
                .collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(store.stored()[1].batch.delta_indexes().len(), 2);
    }

    #[test]
    fn cancellation_drops_unflushed_group() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let mut executor = DeltaUpdateExecutor::try_new(plan(), services(store.clone())).unwrap();
        executor.process_batch(batch(vec![Some(9), Some(9)])).unwrap();
        executor.cancel_flag().store(true, Ordering::Release);

        let err = executor.process_batch(batch(vec![Some(9)])).unwrap_err();
        assert!(matches!(err, DeltaUpdateError::Cancelled));
        assert!(executor.is_closed());
        assert!(matches!(executor.finish(), Err(DeltaUpdateError::Closed)));
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn abort_returns_dropped_group() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let mut executor = DeltaUpdateExecutor::try_new(plan(), services(store.clone())).unwrap();
        executor.process_batch(batch(vec![Some(3)])).unwrap();
        let dropped = executor.abort().unwrap();
        assert_eq!(dropped.row_count, 1);
        assert_eq!(store.calls(), 0);
    }
}
