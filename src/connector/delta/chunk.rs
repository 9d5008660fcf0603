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
//! Update rows as produced by the evaluation layer.
//!
//! An update chunk is an arrow batch holding the new values of the updated columns plus
//! the key columns: ordinal inside the column batch, batch id (null for rows resident in
//! the row buffer), bucket id, and the row buffer keys.

use arrow::array::{Array, ArrayRef, Int32Array, Int64Array, RecordBatch};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::DataType;

use crate::common::ids::{BatchId, BucketId};
use crate::common::types::Datum;
use crate::connector::delta::plan::DeltaUpdatePlan;

#[derive(Debug, Clone)]
pub struct UpdateChunk {
    batch: RecordBatch,
    updated: Vec<ArrayRef>,
    row_buffer_keys: Vec<ArrayRef>,
    ordinals: Int64Array,
    batch_ids: Int64Array,
    bucket_ids: Int32Array,
}

impl UpdateChunk {
    pub fn try_new(batch: RecordBatch, plan: &DeltaUpdatePlan) -> Result<Self, String> {
        let mut updated = Vec::with_capacity(plan.updated_columns.len());
        for column in &plan.updated_columns {
            let array = column_by_name(&batch, &column.name)?;
            if array.data_type() != &column.data_type {
                return Err(format!(
                    "updated column {} declared as {:?} but chunk carries {:?}",
                    column.name,
                    column.data_type,
                    array.data_type()
                ));
            }
            updated.push(array);
        }
        let row_buffer_keys = plan
            .row_buffer_key_columns
            .iter()
            .map(|name| column_by_name(&batch, name))
            .collect::<Result<Vec<_>, _>>()?;

        let keys = &plan.key_columns;
        let ordinals = int_key_column::<Int64Array>(&batch, &keys.ordinal, &DataType::Int64)?;
        let batch_ids = int_key_column::<Int64Array>(&batch, &keys.batch_id, &DataType::Int64)?;
        let bucket_ids = int_key_column::<Int32Array>(&batch, &keys.bucket_id, &DataType::Int32)?;

        Ok(Self {
            batch,
            updated,
            row_buffer_keys,
            ordinals,
            batch_ids,
            bucket_ids,
        })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn num_updated_columns(&self) -> usize {
        self.updated.len()
    }

    pub fn row(&self, row: usize) -> UpdatedRow<'_> {
        UpdatedRow { chunk: self, row }
    }

    pub fn rows(&self) -> impl Iterator<Item = UpdatedRow<'_>> {
        (0..self.len()).map(move |row| self.row(row))
    }
}

fn column_by_name(batch: &RecordBatch, name: &str) -> Result<ArrayRef, String> {
    batch.column_by_name(name).cloned().ok_or_else(|| {
        format!(
            "update chunk is missing column {} (columns={:?})",
            name,
            batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect::<Vec<_>>()
        )
    })
}

fn int_key_column<T: Array + Clone + 'static>(
    batch: &RecordBatch,
    name: &str,
    target: &DataType,
) -> Result<T, String> {
    let array = column_by_name(batch, name)?;
    if !array.data_type().is_integer() && !array.data_type().is_null() {
        return Err(format!(
            "key column {} must be an integer column, got {:?}",
            name,
            array.data_type()
        ));
    }
    // out-of-range keys must fail instead of becoming null, which would reroute the row
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let casted = cast_with_options(&array, target, &options)
        .map_err(|e| format!("cast key column {} to {:?} failed: {}", name, target, e))?;
    casted
        .as_any()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| format!("key column {} did not cast to {:?}", name, target))
}

/// One row of an [`UpdateChunk`].
#[derive(Clone, Copy)]
pub struct UpdatedRow<'a> {
    chunk: &'a UpdateChunk,
    row: usize,
}

impl<'a> UpdatedRow<'a> {
    pub fn index(&self) -> usize {
        self.row
    }

    /// `None` when the row lives in the row buffer.
    pub fn batch_id(&self) -> Option<BatchId> {
        let ids = &self.chunk.batch_ids;
        ids.is_valid(self.row).then(|| BatchId::new(ids.value(self.row)))
    }

    pub fn bucket_id(&self) -> Result<BucketId, String> {
        let ids = &self.chunk.bucket_ids;
        if ids.is_null(self.row) {
            return Err(format!("row {} has a null bucket id", self.row));
        }
        Ok(BucketId::new(ids.value(self.row)))
    }

    /// Position of the row inside its column batch.
    pub fn ordinal(&self) -> Result<u32, String> {
        let ordinals = &self.chunk.ordinals;
        if ordinals.is_null(self.row) {
            return Err(format!("row {} has a null batch ordinal", self.row));
        }
        let value = ordinals.value(self.row);
        u32::try_from(value)
            .map_err(|_| format!("row {} has out of range batch ordinal {}", self.row, value))
    }

    pub fn updated_array(&self, column: usize) -> Result<&'a dyn Array, String> {
        self.chunk
            .updated
            .get(column)
            .map(|a| a.as_ref())
            .ok_or_else(|| {
                format!(
                    "updated column {} out of range ({} columns)",
                    column,
                    self.chunk.updated.len()
                )
            })
    }

    pub fn updated_values(&self) -> Result<Vec<Datum>, String> {
        self.chunk
            .updated
            .iter()
            .map(|a| Datum::from_array(a.as_ref(), self.row))
            .collect()
    }

    pub fn row_buffer_key_values(&self) -> Result<Vec<Datum>, String> {
        self.chunk
            .row_buffer_keys
            .iter()
            .map(|a| Datum::from_array(a.as_ref(), self.row))
            .collect()
    }
}
