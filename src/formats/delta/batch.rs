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

use bytes::Bytes;

use crate::formats::delta::encoder::SealedDeltaBuffer;
use crate::formats::delta::index::DeltaColumnIndex;

/// Statistics stored for a delta batch until real delta statistics are computed.
const STATS_PLACEHOLDER: [u8; 4] = [0; 4];

/// One sealed delta generation for a column batch.
#[derive(Clone, Debug)]
pub struct DeltaColumnBatch {
    row_count: usize,
    buffers: Vec<SealedDeltaBuffer>,
    stats: Bytes,
    delta_indexes: Arc<[DeltaColumnIndex]>,
}

impl DeltaColumnBatch {
    pub fn try_new(
        row_count: usize,
        buffers: Vec<SealedDeltaBuffer>,
        delta_indexes: Arc<[DeltaColumnIndex]>,
    ) -> Result<Self, String> {
        if buffers.len() != delta_indexes.len() {
            return Err(format!(
                "delta batch has {} buffers but {} column indexes",
                buffers.len(),
                delta_indexes.len()
            ));
        }
        if let Some(buffer) = buffers.iter().find(|b| b.row_count() != row_count) {
            return Err(format!(
                "delta buffer holds {} rows, batch expects {}",
                buffer.row_count(),
                row_count
            ));
        }
        Ok(Self {
            row_count,
            buffers,
            stats: Bytes::from_static(&STATS_PLACEHOLDER),
            delta_indexes,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn buffers(&self) -> &[SealedDeltaBuffer] {
        &self.buffers
    }

    pub fn stats(&self) -> &Bytes {
        &self.stats
    }

    pub fn delta_indexes(&self) -> &[DeltaColumnIndex] {
        &self.delta_indexes
    }

    /// Buffers paired with the slot each one is stored under.
    pub fn columns(&self) -> impl Iterator<Item = (DeltaColumnIndex, &SealedDeltaBuffer)> {
        self.delta_indexes.iter().copied().zip(self.buffers.iter())
    }

    pub fn total_bytes(&self) -> usize {
        self.stats.len() + self.buffers.iter().map(|b| b.as_bytes().len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::DeltaColumnBatch;
    use crate::formats::delta::encoder::{DeltaEncoder, DeltaValueType, SealedDeltaBuffer};
    use crate::formats::delta::index::assign_delta_indexes;

    fn sealed_ints(values: &[i32]) -> SealedDeltaBuffer {
        let (mut encoder, mut cursor) =
            DeltaEncoder::initialize(DeltaValueType::Int32, false, values.len());
        for (pos, v) in values.iter().enumerate() {
            cursor = encoder.write_i32(cursor, pos as u32, *v).unwrap();
        }
        encoder.finish(cursor).unwrap()
    }

    #[test]
    fn pairs_buffers_with_indexes() {
        let indexes = assign_delta_indexes(&[0, 2], 0).unwrap();
        let batch =
            DeltaColumnBatch::try_new(2, vec![sealed_ints(&[1, 2]), sealed_ints(&[3, 4])], indexes)
                .unwrap();
        let slots = batch.columns().map(|(i, _)| i.as_i32()).collect::<Vec<_>>();
        assert_eq!(slots, vec![-4, -10]);
        assert_eq!(batch.stats().as_ref(), &[0, 0, 0, 0]);
        assert!(batch.total_bytes() > 4);
    }

    #[test]
    fn rejects_arity_and_row_count_mismatch() {
        let indexes = assign_delta_indexes(&[0, 1], 0).unwrap();
        assert!(DeltaColumnBatch::try_new(1, vec![sealed_ints(&[1])], indexes.clone()).is_err());
        assert!(
            DeltaColumnBatch::try_new(1, vec![sealed_ints(&[1]), sealed_ints(&[1, 2])], indexes)
                .is_err()
        );
    }
}
