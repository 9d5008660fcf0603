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
//! Per-column delta encoder and its sealed byte layout.
//!
//! A delta buffer records `(position, value)` pairs for the rows of one column batch that
//! were updated. Layout (little endian):
//!
//! ```text
//! magic "DLT1" | type tag u8 | precision u8 | scale i8 | nullable u8 | rows u32
//! positions u32 * rows
//! null bitmap ceil(rows / 8) bytes, LSB first (nullable columns only)
//! values: fixed width * rows, or offsets u32 * (rows + 1) followed by data
//! crc32c u32 over all preceding bytes
//! ```

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int8Array, Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow_buffer::BooleanBufferBuilder;
use arrow_buffer::bit_util;
use bytes::{BufMut, Bytes, BytesMut};
use crc32c::crc32c;

const DELTA_BUFFER_MAGIC: &[u8; 4] = b"DLT1";
const HEADER_LEN: usize = 4 + 1 + 1 + 1 + 1 + 4;
const CHECKSUM_LEN: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeltaValueType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    LargeUtf8,
    Binary,
    Date32,
    TimestampMicros,
    Decimal128 { precision: u8, scale: i8 },
}

impl DeltaValueType {
    pub fn from_arrow(data_type: &DataType) -> Result<Self, String> {
        let value_type = match data_type {
            DataType::Boolean => Self::Boolean,
            DataType::Int8 => Self::Int8,
            DataType::Int16 => Self::Int16,
            DataType::Int32 => Self::Int32,
            DataType::Int64 => Self::Int64,
            DataType::Float32 => Self::Float32,
            DataType::Float64 => Self::Float64,
            DataType::Utf8 => Self::Utf8,
            DataType::LargeUtf8 => Self::LargeUtf8,
            DataType::Binary => Self::Binary,
            DataType::Date32 => Self::Date32,
            DataType::Timestamp(TimeUnit::Microsecond, _) => Self::TimestampMicros,
            DataType::Decimal128(precision, scale) => Self::Decimal128 {
                precision: *precision,
                scale: *scale,
            },
            other => return Err(format!("unsupported delta column type {:?}", other)),
        };
        Ok(value_type)
    }

    /// Arrow type of decoded values. Timestamp timezones are not carried by the buffer.
    pub fn to_arrow(self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Utf8 => DataType::Utf8,
            Self::LargeUtf8 => DataType::LargeUtf8,
            Self::Binary => DataType::Binary,
            Self::Date32 => DataType::Date32,
            Self::TimestampMicros => DataType::Timestamp(TimeUnit::Microsecond, None),
            Self::Decimal128 { precision, scale } => DataType::Decimal128(precision, scale),
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::Int8 => 2,
            Self::Int16 => 3,
            Self::Int32 => 4,
            Self::Int64 => 5,
            Self::Float32 => 6,
            Self::Float64 => 7,
            Self::Utf8 => 8,
            Self::LargeUtf8 => 9,
            Self::Binary => 10,
            Self::Date32 => 11,
            Self::TimestampMicros => 12,
            Self::Decimal128 { .. } => 13,
        }
    }

    fn from_tag(tag: u8, precision: u8, scale: i8) -> Result<Self, String> {
        let value_type = match tag {
            1 => Self::Boolean,
            2 => Self::Int8,
            3 => Self::Int16,
            4 => Self::Int32,
            5 => Self::Int64,
            6 => Self::Float32,
            7 => Self::Float64,
            8 => Self::Utf8,
            9 => Self::LargeUtf8,
            10 => Self::Binary,
            11 => Self::Date32,
            12 => Self::TimestampMicros,
            13 => Self::Decimal128 { precision, scale },
            other => return Err(format!("unknown delta value type tag {}", other)),
        };
        Ok(value_type)
    }

    /// Byte width of one value, `None` for variable length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Float32 | Self::Date32 => Some(4),
            Self::Int64 | Self::Float64 | Self::TimestampMicros => Some(8),
            Self::Decimal128 { .. } => Some(16),
            Self::Utf8 | Self::LargeUtf8 | Self::Binary => None,
        }
    }

    fn precision_scale(self) -> (u8, i8) {
        match self {
            Self::Decimal128 { precision, scale } => (precision, scale),
            _ => (0, 0),
        }
    }
}

/// Write position inside an in-progress delta buffer.
///
/// Every write consumes the current cursor and returns the next one. A cursor left behind
/// by an earlier write is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeltaCursor {
    row: usize,
}

impl DeltaCursor {
    pub fn rows_written(self) -> usize {
        self.row
    }
}

pub struct DeltaEncoder {
    value_type: DeltaValueType,
    nullable: bool,
    positions: Vec<u32>,
    validity: BooleanBufferBuilder,
    values: Vec<u8>,
    offsets: Vec<u32>,
}

impl DeltaEncoder {
    pub fn initialize(
        value_type: DeltaValueType,
        nullable: bool,
        initial_capacity: usize,
    ) -> (Self, DeltaCursor) {
        let (values, offsets) = match value_type.fixed_width() {
            Some(width) => (Vec::with_capacity(initial_capacity * width), Vec::new()),
            None => {
                let mut offsets = Vec::with_capacity(initial_capacity + 1);
                offsets.push(0);
                (Vec::new(), offsets)
            }
        };
        let encoder = Self {
            value_type,
            nullable,
            positions: Vec::with_capacity(initial_capacity),
            validity: BooleanBufferBuilder::new(initial_capacity),
            values,
            offsets,
        };
        (encoder, DeltaCursor { row: 0 })
    }

    pub fn value_type(&self) -> DeltaValueType {
        self.value_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn write_null(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
    ) -> Result<DeltaCursor, String> {
        if !self.nullable {
            return Err(format!(
                "null written at position {} of non-nullable {:?} delta column",
                position, self.value_type
            ));
        }
        self.check_slot(cursor, position)?;
        match self.value_type.fixed_width() {
            Some(width) => self.values.resize(self.values.len() + width, 0),
            None => {
                let end = self.offsets.last().copied().unwrap_or(0);
                self.offsets.push(end);
            }
        }
        Ok(self.commit(position, false))
    }

    pub fn write_bool(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: bool,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &[u8::from(value)], "bool", |t| {
            t == DeltaValueType::Boolean
        })
    }

    pub fn write_i8(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: i8,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "i8", |t| {
            t == DeltaValueType::Int8
        })
    }

    pub fn write_i16(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: i16,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "i16", |t| {
            t == DeltaValueType::Int16
        })
    }

    pub fn write_i32(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: i32,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "i32", |t| {
            matches!(t, DeltaValueType::Int32 | DeltaValueType::Date32)
        })
    }

    pub fn write_i64(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: i64,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "i64", |t| {
            matches!(t, DeltaValueType::Int64 | DeltaValueType::TimestampMicros)
        })
    }

    pub fn write_f32(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: f32,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "f32", |t| {
            t == DeltaValueType::Float32
        })
    }

    pub fn write_f64(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: f64,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "f64", |t| {
            t == DeltaValueType::Float64
        })
    }

    pub fn write_i128(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: i128,
    ) -> Result<DeltaCursor, String> {
        self.write_fixed(cursor, position, &value.to_le_bytes(), "i128", |t| {
            matches!(t, DeltaValueType::Decimal128 { .. })
        })
    }

    pub fn write_str(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: &str,
    ) -> Result<DeltaCursor, String> {
        self.write_variable(cursor, position, value.as_bytes(), "str", |t| {
            matches!(t, DeltaValueType::Utf8 | DeltaValueType::LargeUtf8)
        })
    }

    pub fn write_binary(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        value: &[u8],
    ) -> Result<DeltaCursor, String> {
        self.write_variable(cursor, position, value, "binary", |t| {
            t == DeltaValueType::Binary
        })
    }

    /// Seals the buffer. The encoder is consumed; the result is immutable.
    pub fn finish(mut self, cursor: DeltaCursor) -> Result<SealedDeltaBuffer, String> {
        self.check_cursor(cursor)?;
        let rows = self.positions.len();
        let rows_u32 = u32::try_from(rows)
            .map_err(|_| format!("delta buffer with {} rows exceeds u32 row count", rows))?;
        let bitmap_len = if self.nullable { rows.div_ceil(8) } else { 0 };
        let mut buf = BytesMut::with_capacity(
            HEADER_LEN
                + rows * 4
                + bitmap_len
                + self.values.len()
                + self.offsets.len() * 4
                + CHECKSUM_LEN,
        );

        let (precision, scale) = self.value_type.precision_scale();
        buf.put_slice(DELTA_BUFFER_MAGIC);
        buf.put_u8(self.value_type.tag());
        buf.put_u8(precision);
        buf.put_i8(scale);
        buf.put_u8(u8::from(self.nullable));
        buf.put_u32_le(rows_u32);
        for position in &self.positions {
            buf.put_u32_le(*position);
        }
        if self.nullable {
            let validity = self.validity.finish();
            let bitmap = validity.values().get(..bitmap_len).ok_or_else(|| {
                format!(
                    "null bitmap shorter than {} bytes for {} rows",
                    bitmap_len, rows
                )
            })?;
            buf.put_slice(bitmap);
        }
        if self.value_type.fixed_width().is_none() {
            for offset in &self.offsets {
                buf.put_u32_le(*offset);
            }
        }
        buf.put_slice(&self.values);
        let checksum = crc32c(&buf);
        buf.put_u32_le(checksum);

        Ok(SealedDeltaBuffer {
            value_type: self.value_type,
            nullable: self.nullable,
            row_count: rows,
            bytes: buf.freeze(),
        })
    }

    fn write_fixed(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        bytes: &[u8],
        written: &str,
        accepts: impl Fn(DeltaValueType) -> bool,
    ) -> Result<DeltaCursor, String> {
        self.check_type(written, accepts)?;
        self.check_slot(cursor, position)?;
        self.values.extend_from_slice(bytes);
        Ok(self.commit(position, true))
    }

    fn write_variable(
        &mut self,
        cursor: DeltaCursor,
        position: u32,
        bytes: &[u8],
        written: &str,
        accepts: impl Fn(DeltaValueType) -> bool,
    ) -> Result<DeltaCursor, String> {
        self.check_type(written, accepts)?;
        self.check_slot(cursor, position)?;
        let end = u32::try_from(self.values.len() + bytes.len()).map_err(|_| {
            format!(
                "delta buffer data exceeds {} bytes at position {}",
                u32::MAX,
                position
            )
        })?;
        self.values.extend_from_slice(bytes);
        self.offsets.push(end);
        Ok(self.commit(position, true))
    }

    fn check_type(
        &self,
        written: &str,
        accepts: impl Fn(DeltaValueType) -> bool,
    ) -> Result<(), String> {
        if accepts(self.value_type) {
            Ok(())
        } else {
            Err(format!(
                "{} value written to {:?} delta column",
                written, self.value_type
            ))
        }
    }

    fn check_cursor(&self, cursor: DeltaCursor) -> Result<(), String> {
        if cursor.row != self.positions.len() {
            return Err(format!(
                "stale delta cursor at row {} (encoder holds {} rows)",
                cursor.row,
                self.positions.len()
            ));
        }
        Ok(())
    }

    fn check_slot(&self, cursor: DeltaCursor, position: u32) -> Result<(), String> {
        self.check_cursor(cursor)?;
        if let Some(last) = self.positions.last()
            && position < *last
        {
            return Err(format!(
                "delta position {} written after position {}",
                position, last
            ));
        }
        Ok(())
    }

    fn commit(&mut self, position: u32, valid: bool) -> DeltaCursor {
        self.positions.push(position);
        self.validity.append(valid);
        DeltaCursor {
            row: self.positions.len(),
        }
    }
}

/// Immutable output of [`DeltaEncoder::finish`].
#[derive(Clone, Debug, PartialEq)]
pub struct SealedDeltaBuffer {
    value_type: DeltaValueType,
    nullable: bool,
    row_count: usize,
    bytes: Bytes,
}

#[derive(Clone, Debug)]
pub struct DecodedDelta {
    pub positions: Vec<u32>,
    pub values: ArrayRef,
}

impl SealedDeltaBuffer {
    /// Validates the header and checksum of bytes read back from a store.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, String> {
        let mut reader = ByteReader::new(&bytes)?;
        let header = reader.header()?;
        Ok(Self {
            value_type: header.value_type,
            nullable: header.nullable,
            row_count: header.rows,
            bytes,
        })
    }

    pub fn value_type(&self) -> DeltaValueType {
        self.value_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn decode(&self) -> Result<DecodedDelta, String> {
        let mut reader = ByteReader::new(&self.bytes)?;
        let header = reader.header()?;
        let rows = header.rows;

        let mut positions = Vec::with_capacity(rows);
        for _ in 0..rows {
            positions.push(reader.u32()?);
        }
        let bitmap = if header.nullable {
            Some(reader.take(rows.div_ceil(8))?)
        } else {
            None
        };
        let valid = |i: usize| bitmap.is_none_or(|b| bit_util::get_bit(b, i));

        let values = match header.value_type.fixed_width() {
            Some(width) => {
                let data = reader.take(rows * width)?;
                decode_fixed(header.value_type, data, rows, width, valid)?
            }
            None => {
                let mut offsets = Vec::with_capacity(rows + 1);
                for _ in 0..=rows {
                    offsets.push(reader.u32()? as usize);
                }
                if offsets.windows(2).any(|w| w[0] > w[1]) {
                    return Err("delta buffer offsets are not monotonic".to_string());
                }
                let data = reader.take(offsets[rows])?;
                decode_variable(header.value_type, data, &offsets, valid)?
            }
        };
        reader.finish()?;
        Ok(DecodedDelta { positions, values })
    }
}

fn le_bytes<const W: usize>(bytes: &[u8]) -> [u8; W] {
    let mut out = [0_u8; W];
    out.copy_from_slice(bytes);
    out
}

macro_rules! decode_primitive {
    ($array:ty, $native:ty, $data:expr, $rows:expr, $width:expr, $valid:expr) => {{
        let values: Vec<Option<$native>> = (0..$rows)
            .map(|i| {
                $valid(i).then(|| {
                    <$native>::from_le_bytes(le_bytes(&$data[i * $width..(i + 1) * $width]))
                })
            })
            .collect();
        Arc::new(<$array>::from(values)) as ArrayRef
    }};
}

fn decode_fixed(
    value_type: DeltaValueType,
    data: &[u8],
    rows: usize,
    width: usize,
    valid: impl Fn(usize) -> bool,
) -> Result<ArrayRef, String> {
    let array = match value_type {
        DeltaValueType::Boolean => {
            let values: Vec<Option<bool>> =
                (0..rows).map(|i| valid(i).then(|| data[i] != 0)).collect();
            Arc::new(BooleanArray::from(values)) as ArrayRef
        }
        DeltaValueType::Int8 => decode_primitive!(Int8Array, i8, data, rows, width, valid),
        DeltaValueType::Int16 => decode_primitive!(Int16Array, i16, data, rows, width, valid),
        DeltaValueType::Int32 => decode_primitive!(Int32Array, i32, data, rows, width, valid),
        DeltaValueType::Int64 => decode_primitive!(Int64Array, i64, data, rows, width, valid),
        DeltaValueType::Float32 => decode_primitive!(Float32Array, f32, data, rows, width, valid),
        DeltaValueType::Float64 => decode_primitive!(Float64Array, f64, data, rows, width, valid),
        DeltaValueType::Date32 => decode_primitive!(Date32Array, i32, data, rows, width, valid),
        DeltaValueType::TimestampMicros => {
            decode_primitive!(TimestampMicrosecondArray, i64, data, rows, width, valid)
        }
        DeltaValueType::Decimal128 { precision, scale } => {
            let values: Vec<Option<i128>> = (0..rows)
                .map(|i| {
                    valid(i)
                        .then(|| i128::from_le_bytes(le_bytes(&data[i * width..(i + 1) * width])))
                })
                .collect();
            let array = Decimal128Array::from(values)
                .with_precision_and_scale(precision, scale)
                .map_err(|e| format!("invalid decimal delta buffer: {}", e))?;
            Arc::new(array) as ArrayRef
        }
        other => return Err(format!("{:?} is not a fixed width delta type", other)),
    };
    Ok(array)
}

fn decode_variable(
    value_type: DeltaValueType,
    data: &[u8],
    offsets: &[usize],
    valid: impl Fn(usize) -> bool,
) -> Result<ArrayRef, String> {
    let slices: Vec<Option<&[u8]>> = offsets
        .windows(2)
        .enumerate()
        .map(|(i, w)| valid(i).then(|| &data[w[0]..w[1]]))
        .collect();
    let array = match value_type {
        DeltaValueType::Binary => Arc::new(BinaryArray::from(slices)) as ArrayRef,
        DeltaValueType::Utf8 | DeltaValueType::LargeUtf8 => {
            let strs = slices
                .into_iter()
                .map(|s| {
                    s.map(|bytes| {
                        std::str::from_utf8(bytes)
                            .map_err(|e| format!("invalid utf8 in delta buffer: {}", e))
                    })
                    .transpose()
                })
                .collect::<Result<Vec<Option<&str>>, String>>()?;
            if value_type == DeltaValueType::Utf8 {
                Arc::new(StringArray::from(strs)) as ArrayRef
            } else {
                Arc::new(LargeStringArray::from(strs)) as ArrayRef
            }
        }
        other => return Err(format!("{:?} is not a variable length delta type", other)),
    };
    Ok(array)
}

struct BufferHeader {
    value_type: DeltaValueType,
    nullable: bool,
    rows: usize,
}

/// Reads the checksummed body of a sealed buffer.
struct ByteReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(format!("delta buffer too short: {} bytes", bytes.len()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let expected = u32::from_le_bytes(le_bytes(trailer));
        let actual = crc32c(body);
        if expected != actual {
            return Err(format!(
                "delta buffer checksum mismatch: expected {:#010x}, actual {:#010x}",
                expected, actual
            ));
        }
        Ok(Self { body, pos: 0 })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.body.len())
            .ok_or_else(|| {
                format!(
                    "delta buffer truncated: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.body.len()
                )
            })?;
        let out = &self.body[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_le_bytes(le_bytes(self.take(4)?)))
    }

    fn header(&mut self) -> Result<BufferHeader, String> {
        if self.take(4)? != DELTA_BUFFER_MAGIC {
            return Err("delta buffer magic mismatch".to_string());
        }
        let tag = self.u8()?;
        let precision = self.u8()?;
        let scale = self.u8()? as i8;
        let nullable = match self.u8()? {
            0 => false,
            1 => true,
            other => return Err(format!("invalid nullable flag {}", other)),
        };
        let rows = self.u32()? as usize;
        Ok(BufferHeader {
            value_type: DeltaValueType::from_tag(tag, precision, scale)?,
            nullable,
            rows,
        })
    }

    fn finish(&self) -> Result<(), String> {
        if self.pos != self.body.len() {
            return Err(format!(
                "delta buffer has {} trailing bytes",
                self.body.len() - self.pos
            ));
        }
        Ok(())
    }
}
