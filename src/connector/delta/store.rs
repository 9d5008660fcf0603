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
//! Storage services the update path writes through. Both are assumed to synchronize
//! internally; an executor makes at most one call at a time.

use crate::common::ids::{BatchId, BucketId};
use crate::common::types::Datum;
use crate::formats::delta::DeltaColumnBatch;

/// Keyed update against the mutable row buffer.
pub trait RowBufferStore: Send + Sync {
    /// Returns the number of rows affected.
    fn update(
        &self,
        table: &str,
        key_columns: &[String],
        key_values: &[Datum],
        updated_columns: &[String],
        updated_values: &[Datum],
    ) -> Result<u64, String>;
}

/// Whether the store may move rows of a stored batch back into the row buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RowPromotion {
    Allowed,
    Never,
}

/// Persists delta batches next to the base column batch they amend.
pub trait ColumnBatchStore: Send + Sync {
    fn store_delta_batch(
        &self,
        table: &str,
        batch: DeltaColumnBatch,
        bucket_id: BucketId,
        batch_id: BatchId,
        promotion: RowPromotion,
    ) -> Result<(), String>;
}
