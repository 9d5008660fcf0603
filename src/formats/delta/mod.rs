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
//! Write-side format of column batch deltas.

pub mod batch;
pub mod column_writer;
pub mod encoder;
pub mod index;

pub use batch::DeltaColumnBatch;
pub use column_writer::write_column_value;
pub use encoder::{DecodedDelta, DeltaCursor, DeltaEncoder, DeltaValueType, SealedDeltaBuffer};
pub use index::{
    ColumnSlot, DELETE_MASK_INDEX, DELTA_SLOTS_PER_COLUMN, DELTA_STATS_ROW_INDEX,
    DeltaColumnIndex, RESERVED_SENTINEL_SLOTS, STATS_ROW_INDEX, assign_delta_index,
    assign_delta_indexes,
};
