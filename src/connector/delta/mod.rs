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
//! Update capture for rows stored in column batches, and routing for rows still in the
//! row buffer.

pub mod chunk;
pub mod dispatcher;
pub mod executor;
pub mod memory;
pub mod plan;
pub mod publisher;
pub mod store;
pub mod tracker;

pub use chunk::{UpdateChunk, UpdatedRow};
pub use dispatcher::{DispatchStats, RowBufferTarget, RowDispatcher, RowRoute, route_row};
pub use executor::{DeltaUpdateExecutor, DeltaUpdateServices, UpdateSummary};
pub use memory::{MemoryColumnBatchStore, MemoryRowBuffer, RowBufferUpdate, StoredDeltaBatch};
pub use plan::{DeltaUpdatePlan, KeyColumnNames, UpdatedColumn};
pub use publisher::FlushPublisher;
pub use store::{ColumnBatchStore, RowBufferStore, RowPromotion};
pub use tracker::{BatchBoundaryTracker, FlushedGroup};
