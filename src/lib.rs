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
pub mod common;
pub mod connector;
pub mod formats;

// `novadelta_*` convenience aliases.
pub use common::app_config as novadelta_config;
pub use common::logging as novadelta_logging;
pub use connector::delta as novadelta_update;
pub use formats::delta as novadelta_format_delta;

pub use common::error::DeltaUpdateError;
pub use common::ids::{BatchId, BucketId, GroupKey};
pub use common::types::Datum;
pub use connector::delta::{
    ColumnBatchStore, DeltaUpdateExecutor, DeltaUpdatePlan, DeltaUpdateServices, RowBufferStore,
    UpdateChunk, UpdateSummary, UpdatedColumn,
};
pub use formats::delta::{DeltaColumnBatch, DeltaColumnIndex, assign_delta_index};
