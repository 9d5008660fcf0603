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
use std::fmt;
use std::str::FromStr;

/// Identifier of one immutable column batch inside a bucket.
///
/// Rows that still live in the row buffer carry no batch id at all, so this type only ever
/// appears wrapped in `Option` at the row level.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BatchId(pub i64);

impl BatchId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BatchId> for i64 {
    fn from(value: BatchId) -> Self {
        value.0
    }
}

impl FromStr for BatchId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s
            .parse::<i64>()
            .map_err(|e| format!("invalid batch id string '{}': {}", s, e))?;
        Ok(Self(v))
    }
}

/// Bucket (partition/shard) number of a table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BucketId(pub i32);

impl BucketId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BucketId> for i32 {
    fn from(value: BucketId) -> Self {
        value.0
    }
}

impl TryFrom<i64> for BucketId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let v = i32::try_from(value).map_err(|_| format!("invalid bucket id: {}", value))?;
        Ok(Self(v))
    }
}

/// The pair that identifies the column batch a delta generation amends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct GroupKey {
    pub batch_id: BatchId,
    pub bucket_id: BucketId,
}

impl GroupKey {
    pub const fn new(batch_id: BatchId, bucket_id: BucketId) -> Self {
        Self {
            batch_id,
            bucket_id,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch={} bucket={}", self.batch_id, self.bucket_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchId, BucketId, GroupKey};

    #[test]
    fn bucket_id_rejects_out_of_range() {
        assert_eq!(BucketId::try_from(7_i64).unwrap(), BucketId::new(7));
        assert!(BucketId::try_from(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn group_key_display() {
        let key = GroupKey::new(BatchId::new(42), BucketId::new(3));
        assert_eq!(key.to_string(), "batch=42 bucket=3");
        assert_eq!("42".parse::<BatchId>().unwrap(), BatchId::new(42));
        assert!("x".parse::<BatchId>().is_err());
    }
}
