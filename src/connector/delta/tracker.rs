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
//! Group boundary detection for rows that live in column batches.
//!
//! Rows arrive ordered by column batch. Consecutive rows with the same
//! `(batch id, bucket id)` accumulate into one active group; the group is sealed and
//! published when a row of another batch shows up, and once more by [`finish`] for the
//! last group of the stream.
//!
//! ```text
//!   Unset --row--> Accumulating(g) --row, same key--> Accumulating(g)
//!                  Accumulating(g) --row, new key---> publish g, Accumulating(g')
//!                  Accumulating(g) --finish---------> publish g, Closed
//!   any error, abort or finish -----------------------> Closed
//! ```
//!
//! [`finish`]: BatchBoundaryTracker::finish

use std::sync::Arc;

use crate::common::error::DeltaUpdateError;
use crate::common::ids::GroupKey;
use crate::connector::delta::chunk::UpdatedRow;
use crate::connector::delta::plan::UpdatedColumn;
use crate::connector::delta::publisher::FlushPublisher;
use crate::formats::delta::{
    DeltaColumnBatch, DeltaColumnIndex, DeltaCursor, DeltaEncoder, DeltaValueType,
    write_column_value,
};
use crate::novadelta_logging::debug;

/// Result of one published group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlushedGroup {
    pub key: GroupKey,
    pub row_count: usize,
}

struct ColumnDelta {
    encoder: DeltaEncoder,
    cursor: DeltaCursor,
}

/// Rows accumulated for one column batch. Replaced wholesale at every boundary.
struct ActiveGroup {
    key: GroupKey,
    row_count: usize,
    columns: Vec<ColumnDelta>,
}

impl ActiveGroup {
    fn new(
        key: GroupKey,
        columns: &[UpdatedColumn],
        initial_capacity: usize,
    ) -> Result<Self, String> {
        let columns = columns
            .iter()
            .map(|column| {
                let value_type = DeltaValueType::from_arrow(&column.data_type)?;
                let (encoder, cursor) =
                    DeltaEncoder::initialize(value_type, column.nullable, initial_capacity);
                Ok(ColumnDelta { encoder, cursor })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self {
            key,
            row_count: 0,
            columns,
        })
    }

    fn write_row(
        &mut self,
        row: &UpdatedRow<'_>,
        position: u32,
        updated: &[UpdatedColumn],
    ) -> Result<(), String> {
        for (i, (delta, column)) in self.columns.iter_mut().zip(updated).enumerate() {
            let array = row.updated_array(i)?;
            delta.cursor = write_column_value(
                &mut delta.encoder,
                delta.cursor,
                &column.data_type,
                column.nullable,
                position,
                array,
                row.index(),
            )
            .map_err(|e| format!("column {} at {}: {}", column.name, self.key, e))?;
        }
        self.row_count += 1;
        Ok(())
    }

    fn seal(self, delta_indexes: Arc<[DeltaColumnIndex]>) -> Result<DeltaColumnBatch, String> {
        let buffers = self
            .columns
            .into_iter()
            .map(|delta| delta.encoder.finish(delta.cursor))
            .collect::<Result<Vec<_>, String>>()?;
        DeltaColumnBatch::try_new(self.row_count, buffers, delta_indexes)
    }
}

enum TrackerState {
    Unset,
    Accumulating(ActiveGroup),
    Closed,
}

pub struct BatchBoundaryTracker {
    columns: Arc<[UpdatedColumn]>,
    delta_indexes: Arc<[DeltaColumnIndex]>,
    initial_capacity: usize,
    state: TrackerState,
}

impl BatchBoundaryTracker {
    pub fn new(
        columns: Arc<[UpdatedColumn]>,
        delta_indexes: Arc<[DeltaColumnIndex]>,
        initial_capacity: usize,
    ) -> Result<Self, String> {
        if columns.len() != delta_indexes.len() {
            return Err(format!(
                "{} updated columns but {} delta column indexes",
                columns.len(),
                delta_indexes.len()
            ));
        }
        Ok(Self {
            columns,
            delta_indexes,
            initial_capacity,
            state: TrackerState::Unset,
        })
    }

    /// Key and row count of the group being accumulated.
    pub fn active_group(&self) -> Option<(GroupKey, usize)> {
        match &self.state {
            TrackerState::Accumulating(group) => Some((group.key, group.row_count)),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, TrackerState::Closed)
    }

    /// Adds one column-batch row at `position`, publishing the previous group first when
    /// `key` starts a new one.
    ///
    /// On error the tracker is closed and the group in progress is dropped.
    pub fn accept(
        &mut self,
        key: GroupKey,
        position: u32,
        row: &UpdatedRow<'_>,
        publisher: &FlushPublisher,
    ) -> Result<Option<FlushedGroup>, DeltaUpdateError> {
        let state = std::mem::replace(&mut self.state, TrackerState::Closed);
        let (mut group, flushed) = match state {
            TrackerState::Closed => return Err(DeltaUpdateError::Closed),
            TrackerState::Unset => {
                debug!("delta group started: table={} {}", publisher.table(), key);
                (self.new_group(key)?, None)
            }
            TrackerState::Accumulating(group) if group.key == key => (group, None),
            TrackerState::Accumulating(group) => {
                let flushed = self.flush(group, publisher)?;
                debug!("delta group started: table={} {}", publisher.table(), key);
                (self.new_group(key)?, flushed)
            }
        };
        group
            .write_row(row, position, &self.columns)
            .map_err(DeltaUpdateError::Contract)?;
        self.state = TrackerState::Accumulating(group);
        Ok(flushed)
    }

    /// Publishes the last group of the stream, if it holds rows, and closes the tracker.
    pub fn finish(
        &mut self,
        publisher: &FlushPublisher,
    ) -> Result<Option<FlushedGroup>, DeltaUpdateError> {
        match std::mem::replace(&mut self.state, TrackerState::Closed) {
            TrackerState::Closed => Err(DeltaUpdateError::Closed),
            TrackerState::Unset => Ok(None),
            TrackerState::Accumulating(group) => self.flush(group, publisher),
        }
    }

    /// Closes the tracker without publishing. Returns the group that was dropped.
    pub fn abort(&mut self) -> Option<FlushedGroup> {
        match std::mem::replace(&mut self.state, TrackerState::Closed) {
            TrackerState::Accumulating(group) if group.row_count > 0 => Some(FlushedGroup {
                key: group.key,
                row_count: group.row_count,
            }),
            _ => None,
        }
    }

    fn new_group(&self, key: GroupKey) -> Result<ActiveGroup, DeltaUpdateError> {
        ActiveGroup::new(key, &self.columns, self.initial_capacity)
            .map_err(DeltaUpdateError::Contract)
    }

    fn flush(
        &self,
        group: ActiveGroup,
        publisher: &FlushPublisher,
    ) -> Result<Option<FlushedGroup>, DeltaUpdateError> {
        if group.row_count == 0 {
            return Ok(None);
        }
        let flushed = FlushedGroup {
            key: group.key,
            row_count: group.row_count,
        };
        let batch = group
            .seal(Arc::clone(&self.delta_indexes))
            .map_err(DeltaUpdateError::Contract)?;
        publisher.publish(batch, flushed.key)?;
        Ok(Some(flushed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, Int32Array, Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::{BatchBoundaryTracker, FlushedGroup};
    use crate::common::error::DeltaUpdateError;
    use crate::common::ids::{BatchId, BucketId, GroupKey};
    use crate::connector::delta::chunk::UpdateChunk;
    use crate::connector::delta::memory::MemoryColumnBatchStore;
    use crate::connector::delta::plan::{DeltaUpdatePlan, UpdatedColumn};
    use crate::connector::delta::publisher::FlushPublisher;
    use crate::formats::delta::assign_delta_indexes;

    fn plan() -> DeltaUpdatePlan {
        DeltaUpdatePlan::new(
            "APP.T",
            vec![UpdatedColumn::new("v", 1, DataType::Int64, false)],
        )
    }

    /// Rows of `(batch, ordinal, value)` all in bucket 0.
    fn chunk(rows: &[(i64, i64, i64)]) -> UpdateChunk {
        let schema = Schema::new(vec![
            Field::new("v", DataType::Int64, false),
            Field::new("__row_id", DataType::Int64, false),
            Field::new("__batch_ordinal", DataType::Int64, true),
            Field::new("__batch_id", DataType::Int64, true),
            Field::new("__bucket_id", DataType::Int32, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
                Arc::new(Int64Array::from_iter_values(0..rows.len() as i64)),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(Int32Array::from(vec![0; rows.len()])),
            ],
        )
        .unwrap();
        UpdateChunk::try_new(batch, &plan()).unwrap()
    }

    fn tracker() -> BatchBoundaryTracker {
        let plan = plan();
        let indexes = assign_delta_indexes(&plan.schema_positions(), 0).unwrap();
        BatchBoundaryTracker::new(plan.updated_columns.into(), indexes, 4).unwrap()
    }

    fn key(batch: i64) -> GroupKey {
        GroupKey::new(BatchId::new(batch), BucketId::new(0))
    }

    fn feed(
        tracker: &mut BatchBoundaryTracker,
        chunk: &UpdateChunk,
        publisher: &FlushPublisher,
    ) -> Result<Vec<FlushedGroup>, DeltaUpdateError> {
        let mut flushed = Vec::new();
        for row in chunk.rows() {
            let key = GroupKey::new(row.batch_id().unwrap(), row.bucket_id().unwrap());
            if let Some(group) = tracker.accept(key, row.ordinal().unwrap(), &row, publisher)? {
                flushed.push(group);
            }
        }
        Ok(flushed)
    }

    #[test]
    fn first_group_never_flushes_on_arrival() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();

        let flushed = feed(&mut tracker, &chunk(&[(1, 0, 10), (1, 1, 11)]), &publisher).unwrap();
        assert!(flushed.is_empty());
        assert_eq!(store.calls(), 0);
        assert_eq!(tracker.active_group(), Some((key(1), 2)));
    }

    #[test]
    fn boundary_flushes_previous_group_then_finish_flushes_last() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();

        let rows = chunk(&[(1, 0, 1), (1, 1, 2), (2, 0, 3)]);
        let flushed = feed(&mut tracker, &rows, &publisher).unwrap();
        assert_eq!(
            flushed,
            vec![FlushedGroup {
                key: key(1),
                row_count: 2
            }]
        );
        assert_eq!(tracker.active_group(), Some((key(2), 1)));

        let last = tracker.finish(&publisher).unwrap();
        assert_eq!(
            last,
            Some(FlushedGroup {
                key: key(2),
                row_count: 1
            })
        );
        assert!(tracker.is_closed());

        let stored = store.stored();
        assert_eq!(stored.len(), 2);
        let decoded = stored[0].batch.buffers()[0].decode().unwrap();
        let values = decoded.values.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(decoded.positions, vec![0, 1]);
        assert_eq!(values.values().to_vec(), vec![1, 2]);
        assert_eq!(stored[1].batch.row_count(), 1);
    }

    #[test]
    fn returning_batch_starts_a_new_generation() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();

        let rows = chunk(&[(1, 0, 1), (2, 0, 2), (1, 3, 3)]);
        let flushed = feed(&mut tracker, &rows, &publisher).unwrap();
        assert_eq!(flushed.len(), 2);
        tracker.finish(&publisher).unwrap();
        let keys = store.stored().iter().map(|s| s.key).collect::<Vec<_>>();
        assert_eq!(keys, vec![key(1), key(2), key(1)]);
    }

    #[test]
    fn finish_without_rows_publishes_nothing() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();
        assert_eq!(tracker.finish(&publisher).unwrap(), None);
        assert_eq!(store.calls(), 0);
        assert!(matches!(
            tracker.finish(&publisher),
            Err(DeltaUpdateError::Closed)
        ));
    }

    #[test]
    fn publish_failure_closes_tracker_before_next_write() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        store.fail_at_call(1, "store unavailable");
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();

        let err = feed(&mut tracker, &chunk(&[(1, 0, 1), (2, 0, 2), (2, 1, 3)]), &publisher)
            .unwrap_err();
        assert!(matches!(err, DeltaUpdateError::Publish { .. }));
        assert!(tracker.is_closed());
        assert_eq!(tracker.active_group(), None);
        assert_eq!(store.calls(), 1);
        assert!(store.stored().is_empty());
    }

    #[test]
    fn position_regression_is_a_contract_violation() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();

        let err = feed(&mut tracker, &chunk(&[(1, 5, 1), (1, 2, 2)]), &publisher).unwrap_err();
        assert!(err.is_contract_violation(), "{err}");
        assert!(tracker.is_closed());
    }

    #[test]
    fn abort_drops_group_without_publishing() {
        let store = Arc::new(MemoryColumnBatchStore::new());
        let publisher = FlushPublisher::new("APP.T", store.clone(), None, "rows");
        let mut tracker = tracker();
        feed(&mut tracker, &chunk(&[(4, 0, 1)]), &publisher).unwrap();
        assert_eq!(
            tracker.abort(),
            Some(FlushedGroup {
                key: key(4),
                row_count: 1
            })
        );
        assert_eq!(store.calls(), 0);
        assert!(tracker.is_closed());
    }

    #[test]
    fn rejects_index_arity_mismatch() {
        let plan = plan();
        let indexes = assign_delta_indexes(&[1, 2], 0).unwrap();
        assert!(BatchBoundaryTracker::new(plan.updated_columns.into(), indexes, 1).is_err());
    }
}
