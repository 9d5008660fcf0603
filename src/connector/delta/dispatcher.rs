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
use crate::connector::delta::chunk::UpdatedRow;
use crate::connector::delta::publisher::FlushPublisher;
use crate::connector::delta::store::RowBufferStore;
use crate::connector::delta::tracker::{BatchBoundaryTracker, FlushedGroup};
use crate::novadelta_logging::warn;

/// Where one updated row is written.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RowRoute {
    /// Keyed update against the row buffer.
    RowBuffer,
    /// Delta write at `position` of the column batch `key`.
    ColumnBatch { key: GroupKey, position: u32 },
}

/// A null batch id means the row lives in the row buffer; bucket and ordinal are not
/// read in that case.
pub fn route_row(row: &UpdatedRow<'_>) -> Result<RowRoute, String> {
    let Some(batch_id) = row.batch_id() else {
        return Ok(RowRoute::RowBuffer);
    };
    Ok(RowRoute::ColumnBatch {
        key: GroupKey::new(batch_id, row.bucket_id()?),
        position: row.ordinal()?,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub row_buffer_rows: usize,
    pub row_buffer_rows_affected: u64,
    pub delta_rows: usize,
    pub flushed: Vec<FlushedGroup>,
}

pub struct RowBufferTarget {
    pub store: Arc<dyn RowBufferStore>,
    pub key_columns: Vec<String>,
    pub updated_columns: Vec<String>,
    pub rows_metric_name: String,
}

pub struct RowDispatcher {
    table: String,
    row_buffer: RowBufferTarget,
    tracker: BatchBoundaryTracker,
    publisher: FlushPublisher,
    metrics: Option<Arc<dyn MetricsSink>>,
    stats: DispatchStats,
}

impl RowDispatcher {
    pub fn new(
        row_buffer: RowBufferTarget,
        tracker: BatchBoundaryTracker,
        publisher: FlushPublisher,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            table: publisher.table().to_string(),
            row_buffer,
            tracker,
            publisher,
            metrics,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    pub fn active_group(&self) -> Option<(GroupKey, usize)> {
        self.tracker.active_group()
    }

    /// Sends `row` down its route. Any failure drops the group in progress and closes the
    /// dispatcher.
    pub fn dispatch(&mut self, row: &UpdatedRow<'_>) -> Result<(), DeltaUpdateError> {
        if self.tracker.is_closed() {
            return Err(DeltaUpdateError::Closed);
        }
        let result = self.dispatch_row(row);
        if result.is_err() {
            self.tracker.abort();
        }
        result
    }

    /// Flushes the last group. The dispatcher accepts no rows afterwards.
    pub fn finish(&mut self) -> Result<(), DeltaUpdateError> {
        if let Some(flushed) = self.tracker.finish(&self.publisher)? {
            self.stats.flushed.push(flushed);
        }
        Ok(())
    }

    pub fn abort(&mut self) -> Option<FlushedGroup> {
        self.tracker.abort()
    }

    fn dispatch_row(&mut self, row: &UpdatedRow<'_>) -> Result<(), DeltaUpdateError> {
        match route_row(row).map_err(DeltaUpdateError::Contract)? {
            RowRoute::RowBuffer => self.update_row_buffer(row),
            RowRoute::ColumnBatch { key, position } => {
                if let Some(flushed) = self.tracker.accept(key, position, row, &self.publisher)? {
                    self.stats.flushed.push(flushed);
                }
                self.stats.delta_rows += 1;
                Ok(())
            }
        }
    }

    fn update_row_buffer(&mut self, row: &UpdatedRow<'_>) -> Result<(), DeltaUpdateError> {
        let key_values = row
            .row_buffer_key_values()
            .map_err(DeltaUpdateError::Contract)?;
        let updated_values = row.updated_values().map_err(DeltaUpdateError::Contract)?;
        let target = &self.row_buffer;
        let affected = match target.store.update(
            &self.table,
            &target.key_columns,
            &key_values,
            &target.updated_columns,
            &updated_values,
        ) {
            Ok(affected) => affected,
            Err(message) => {
                warn!(
                    "row buffer update failed: table={} row={} error={}",
                    self.table,
                    row.index(),
                    message
                );
                return Err(DeltaUpdateError::RowBuffer {
                    table: self.table.clone(),
                    message,
                });
            }
        };
        self.stats.row_buffer_rows += 1;
        self.stats.row_buffer_rows_affected += affected;
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.increment(&target.rows_metric_name, affected as i64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int32Array, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::{RowBufferTarget, RowDispatcher, RowRoute, route_row};
    use crate::common::error::DeltaUpdateError;
    use crate::common::ids::{BatchId, BucketId, GroupKey};
    use crate::common::metrics::CounterSet;
    use crate::common::types::Datum;
    use crate::connector::delta::chunk::UpdateChunk;
    use crate::connector::delta::memory::{MemoryColumnBatchStore, MemoryRowBuffer};
    use crate::connector::delta::plan::{DeltaUpdatePlan, UpdatedColumn};
    use crate::connector::delta::publisher::FlushPublisher;
    use crate::connector::delta::tracker::BatchBoundaryTracker;
    use crate::formats::delta::assign_delta_indexes;

    fn plan() -> DeltaUpdatePlan {
        DeltaUpdatePlan::new(
            "APP.T",
            vec![UpdatedColumn::new("name", 3, DataType::Utf8, true)],
        )
    }

    /// Rows of `(row id, batch id, ordinal, name)` in bucket 2.
    fn chunk(rows: &[(i64, Option<i64>, Option<i64>, &str)]) -> UpdateChunk {
        let schema = Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("__row_id", DataType::Int64, false),
            Field::new("__batch_ordinal", DataType::Int64, true),
            Field::new("__batch_id", DataType::Int64, true),
            Field::new("__bucket_id", DataType::Int32, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.3))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(Int64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
                Arc::new(Int32Array::from(vec![2; rows.len()])),
            ],
        )
        .unwrap();
        UpdateChunk::try_new(batch, &plan()).unwrap()
    }

    struct Fixture {
        row_buffer: Arc<MemoryRowBuffer>,
        store: Arc<MemoryColumnBatchStore>,
        metrics: Arc<CounterSet>,
        dispatcher: RowDispatcher,
    }

    fn fixture() -> Fixture {
        let plan = plan();
        let row_buffer = Arc::new(MemoryRowBuffer::new());
        let store = Arc::new(MemoryColumnBatchStore::new());
        let metrics = Arc::new(CounterSet::new());
        let indexes = assign_delta_indexes(&plan.schema_positions(), 0).unwrap();
        let tracker = BatchBoundaryTracker::new(plan.updated_columns.clone().into(), indexes, 8)
            .unwrap();
        let publisher =
            FlushPublisher::new("APP.T", store.clone(), Some(metrics.clone()), "delta_rows");
        let target = RowBufferTarget {
            store: row_buffer.clone(),
            key_columns: plan.row_buffer_key_columns.clone(),
            updated_columns: plan.updated_column_names(),
            rows_metric_name: "row_buffer_rows".to_string(),
        };
        let dispatcher = RowDispatcher::new(target, tracker, publisher, Some(metrics.clone()));
        Fixture {
            row_buffer,
            store,
            metrics,
            dispatcher,
        }
    }

    #[test]
    fn routes_on_batch_id() {
        let rows = chunk(&[(10, None, None, "a"), (11, Some(5), Some(3), "b")]);
        assert_eq!(route_row(&rows.row(0)).unwrap(), RowRoute::RowBuffer);
        assert_eq!(
            route_row(&rows.row(1)).unwrap(),
            RowRoute::ColumnBatch {
                key: GroupKey::new(BatchId::new(5), BucketId::new(2)),
                position: 3
            }
        );

        let missing_ordinal = chunk(&[(12, Some(5), None, "c")]);
        assert!(route_row(&missing_ordinal.row(0)).is_err());
    }

    #[test]
    fn row_buffer_rows_bypass_the_tracker() {
        let mut f = fixture();
        let rows = chunk(&[(10, None, None, "a"), (11, None, None, "b")]);
        for row in rows.rows() {
            f.dispatcher.dispatch(&row).unwrap();
        }
        f.dispatcher.finish().unwrap();

        let updates = f.row_buffer.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].key_columns, vec!["__row_id".to_string()]);
        assert_eq!(updates[0].key_values, vec![Datum::Int(10)]);
        assert_eq!(updates[1].updated_columns, vec!["name".to_string()]);
        assert_eq!(updates[1].updated_values, vec![Datum::String("b".to_string())]);
        assert_eq!(f.store.calls(), 0);
        assert_eq!(f.dispatcher.stats().row_buffer_rows, 2);
        assert_eq!(f.dispatcher.stats().delta_rows, 0);
        assert_eq!(f.metrics.value("row_buffer_rows"), 2);
        assert_eq!(f.metrics.value("delta_rows"), 0);
    }

    #[test]
    fn interleaved_row_buffer_rows_do_not_split_groups() {
        let mut f = fixture();
        let rows = chunk(&[
            (1, Some(7), Some(0), "a"),
            (2, None, None, "b"),
            (3, Some(7), Some(4), "c"),
        ]);
        for row in rows.rows() {
            f.dispatcher.dispatch(&row).unwrap();
        }
        f.dispatcher.finish().unwrap();

        let stored = f.store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].batch.row_count(), 2);
        assert_eq!(f.row_buffer.updates().len(), 1);
        assert_eq!(f.metrics.value("delta_rows"), 2);
    }

    #[test]
    fn row_buffer_failure_discards_group_and_closes() {
        let mut f = fixture();
        f.row_buffer.fail_at_call(1, "lock timeout");
        let rows = chunk(&[(1, Some(7), Some(0), "a"), (2, None, None, "b")]);

        f.dispatcher.dispatch(&rows.row(0)).unwrap();
        let err = f.dispatcher.dispatch(&rows.row(1)).unwrap_err();
        assert!(matches!(err, DeltaUpdateError::RowBuffer { .. }), "{err}");
        assert!(f.dispatcher.is_closed());
        assert_eq!(f.dispatcher.active_group(), None);
        assert!(matches!(
            f.dispatcher.dispatch(&rows.row(0)),
            Err(DeltaUpdateError::Closed)
        ));
        assert!(matches!(f.dispatcher.finish(), Err(DeltaUpdateError::Closed)));
        assert_eq!(f.store.calls(), 0);
    }

    #[test]
    fn contract_failure_closes_dispatcher() {
        let mut f = fixture();
        let rows = chunk(&[(1, Some(7), None, "a")]);
        let err = f.dispatcher.dispatch(&rows.row(0)).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(f.dispatcher.is_closed());
    }
}
