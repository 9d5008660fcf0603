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
//! Positional addressing of the buffers stored for one column batch.
//!
//! Base column buffers use their schema position (`>= 0`). Negative indexes are split into
//! a reserved sentinel block and, below it, one fixed-width block per schema column that
//! holds that column's delta generations:
//!
//! ```text
//!   p >= 0        base column p
//!   -1            whole-batch statistics row
//!   -2            delta statistics row
//!   -3            delete mask
//!   -4, -5, -6    column 0, depth 0..3
//!   -7, -8, -9    column 1, depth 0..3
//!   ...
//! ```
//!
//! Adding a depth never renumbers existing slots because a column's block is addressed
//! only by its schema position.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub const STATS_ROW_INDEX: i32 = -1;
pub const DELTA_STATS_ROW_INDEX: i32 = -2;
pub const DELETE_MASK_INDEX: i32 = -3;
pub const RESERVED_SENTINEL_SLOTS: i32 = 3;
/// Slots reserved per column; also the number of delta depths addressable by this scheme.
pub const DELTA_SLOTS_PER_COLUMN: i32 = 3;

const FIRST_DELTA_INDEX: i32 = -(RESERVED_SENTINEL_SLOTS + 1);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DeltaColumnIndex(i32);

impl DeltaColumnIndex {
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    pub fn slot(self) -> ColumnSlot {
        ColumnSlot::from_index(self.0)
    }
}

impl fmt::Display for DeltaColumnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DeltaColumnIndex> for i32 {
    fn from(value: DeltaColumnIndex) -> Self {
        value.0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ColumnSlot {
    Base(u32),
    StatsRow,
    DeltaStatsRow,
    DeleteMask,
    Delta { position: u32, depth: u32 },
}

impl ColumnSlot {
    pub fn to_index(self) -> Result<i32, String> {
        match self {
            ColumnSlot::Base(position) => i32::try_from(position)
                .map_err(|_| format!("column position {} exceeds index range", position)),
            ColumnSlot::StatsRow => Ok(STATS_ROW_INDEX),
            ColumnSlot::DeltaStatsRow => Ok(DELTA_STATS_ROW_INDEX),
            ColumnSlot::DeleteMask => Ok(DELETE_MASK_INDEX),
            ColumnSlot::Delta { position, depth } => {
                let depth = i32::try_from(depth)
                    .ok()
                    .filter(|d| *d < DELTA_SLOTS_PER_COLUMN)
                    .ok_or_else(|| {
                        format!(
                            "delta depth {} outside the {} depths addressable per column",
                            depth, DELTA_SLOTS_PER_COLUMN
                        )
                    })?;
                i32::try_from(position)
                    .ok()
                    .and_then(|p| p.checked_mul(DELTA_SLOTS_PER_COLUMN))
                    .and_then(|block| FIRST_DELTA_INDEX.checked_sub(block))
                    .and_then(|start| start.checked_sub(depth))
                    .ok_or_else(|| {
                        format!("column position {} exceeds delta index range", position)
                    })
            }
        }
    }

    pub fn from_index(index: i32) -> Self {
        match index {
            i if i >= 0 => ColumnSlot::Base(i as u32),
            STATS_ROW_INDEX => ColumnSlot::StatsRow,
            DELTA_STATS_ROW_INDEX => ColumnSlot::DeltaStatsRow,
            DELETE_MASK_INDEX => ColumnSlot::DeleteMask,
            i => {
                // i <= FIRST_DELTA_INDEX here, so the offset is non-negative.
                let offset = (FIRST_DELTA_INDEX as i64 - i as i64) as u64;
                let width = DELTA_SLOTS_PER_COLUMN as u64;
                ColumnSlot::Delta {
                    position: (offset / width) as u32,
                    depth: (offset % width) as u32,
                }
            }
        }
    }
}

/// Slot of the column at `schema_position` for the delta generation at `depth`.
pub fn assign_delta_index(schema_position: usize, depth: u32) -> Result<DeltaColumnIndex, String> {
    let position = u32::try_from(schema_position)
        .map_err(|_| format!("column position {} exceeds index range", schema_position))?;
    ColumnSlot::Delta { position, depth }
        .to_index()
        .map(DeltaColumnIndex)
}

/// Assigns slots for every updated column, in update order.
///
/// Two updated columns sharing a schema position would share a slot, so that is rejected.
pub fn assign_delta_indexes(
    schema_positions: &[usize],
    depth: u32,
) -> Result<Arc<[DeltaColumnIndex]>, String> {
    let mut seen = HashSet::with_capacity(schema_positions.len());
    let mut out = Vec::with_capacity(schema_positions.len());
    for &position in schema_positions {
        if !seen.insert(position) {
            return Err(format!(
                "column position {} is updated more than once",
                position
            ));
        }
        out.push(assign_delta_index(position, depth)?);
    }
    Ok(out.into())
}
