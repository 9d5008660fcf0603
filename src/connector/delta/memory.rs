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
//! In-memory stores that keep every call they receive.

use std::sync::Mutex;

use crate::common::ids::{BatchId, BucketId, GroupKey};
use crate::common::types::Datum;
use crate::connector::delta::store::{ColumnBatchStore, RowBufferStore, RowPromotion};
use crate::formats::delta::DeltaColumnBatch;

#[derive(Clone, Debug)]
pub struct StoredDeltaBatch {
    pub table: String,
    pub key: GroupKey,
    pub promotion: RowPromotion,
    pub batch: DeltaColumnBatch,
}

#[derive(Default)]
struct FailurePlan {
    calls: usize,
    fail_at_call: Option<(usize, String)>,
}

impl FailurePlan {
    /// Counts a call and returns the injected error when it is the failing one.
    fn next_call(&mut self) -> Result<(), String> {
        self.calls += 1;
        match &self.fail_at_call {
            Some((at, message)) if *at == self.calls => Err(message.clone()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryColumnBatchStore {
    stored: Mutex<Vec<StoredDeltaBatch>>,
    failures: Mutex<FailurePlan>,
}

impl MemoryColumnBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `call`-th store call (1-based) fail with `message`.
    pub fn fail_at_call(&self, call: usize, message: impl Into<String>) {
        let mut guard = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        guard.fail_at_call = Some((call, message.into()));
    }

    pub fn calls(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
    }

    pub fn stored(&self) -> Vec<StoredDeltaBatch> {
        self.stored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ColumnBatchStore for MemoryColumnBatchStore {
    fn store_delta_batch(
        &self,
        table: &str,
        batch: DeltaColumnBatch,
        bucket_id: BucketId,
        batch_id: BatchId,
        promotion: RowPromotion,
    ) -> Result<(), String> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_call()?;
        self.stored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StoredDeltaBatch {
                table: table.to_string(),
                key: GroupKey::new(batch_id, bucket_id),
                promotion,
                batch,
            });
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RowBufferUpdate {
    pub table: String,
    pub key_columns: Vec<String>,
    pub key_values: Vec<Datum>,
    pub updated_columns: Vec<String>,
    pub updated_values: Vec<Datum>,
}

#[derive(Default)]
pub struct MemoryRowBuffer {
    updates: Mutex<Vec<RowBufferUpdate>>,
    failures: Mutex<FailurePlan>,
}

impl MemoryRowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at_call(&self, call: usize, message: impl Into<String>) {
        let mut guard = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        guard.fail_at_call = Some((call, message.into()));
    }

    pub fn updates(&self) -> Vec<RowBufferUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RowBufferStore for MemoryRowBuffer {
    fn update(
        &self,
        table: &str,
        key_columns: &[String],
        key_values: &[Datum],
        updated_columns: &[String],
        updated_values: &[Datum],
    ) -> Result<u64, String> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_call()?;
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RowBufferUpdate {
                table: table.to_string(),
                key_columns: key_columns.to_vec(),
                key_values: key_values.to_vec(),
                updated_columns: updated_columns.to_vec(),
                updated_values: updated_values.to_vec(),
            });
        Ok(1)
    }
}
