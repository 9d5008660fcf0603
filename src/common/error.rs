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
//! Error type surfaced by a delta update execution.
//!
//! Internal helpers report failures as `String`; they are classified into
//! [`DeltaUpdateError`] where they leave the encoding layer. Every variant aborts the
//! update operation. None of them is retried here: a retry of a failed publish is a
//! concern of the column-batch store.

use crate::common::ids::GroupKey;

#[derive(Debug, thiserror::Error)]
pub enum DeltaUpdateError {
    /// The row-buffer keyed update failed.
    #[error("row buffer update on {table} failed: {message}")]
    RowBuffer { table: String, message: String },

    /// The column-batch store rejected a sealed delta batch.
    #[error("publish delta batch for {group} on {table} failed: {message}")]
    Publish {
        table: String,
        group: GroupKey,
        message: String,
    },

    /// Arity or type disagreement between the update plan and the incoming rows.
    #[error("delta update contract violation: {0}")]
    Contract(String),

    #[error("delta update cancelled")]
    Cancelled,

    /// A previous call failed or the stream was already finished.
    #[error("delta update executor is closed")]
    Closed,
}

impl DeltaUpdateError {
    pub fn contract(message: impl Into<String>) -> Self {
        DeltaUpdateError::Contract(message.into())
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, DeltaUpdateError::Contract(_))
    }

    /// Always false: sealed buffers of a failed publish are dropped, never resubmitted.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
