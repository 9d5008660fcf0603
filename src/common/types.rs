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

use arrow::array::{
    Array, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate};

/// Owned scalar handed to the row-buffer keyed update path.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Days since 1970-01-01.
    Date(i32),
    /// Microseconds since the unix epoch.
    Timestamp(i64),
    Decimal {
        value: i128,
        precision: u8,
        scale: i8,
    },
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn from_array(array: &dyn Array, row: usize) -> Result<Self, String> {
        if row >= array.len() {
            return Err(format!(
                "row {} out of bounds for array of length {}",
                row,
                array.len()
            ));
        }
        if array.is_null(row) {
            return Ok(Datum::Null);
        }
        let datum = match array.data_type() {
            DataType::Boolean => Datum::Boolean(downcast::<BooleanArray>(array)?.value(row)),
            DataType::Int8 => Datum::Int(i64::from(downcast::<Int8Array>(array)?.value(row))),
            DataType::Int16 => Datum::Int(i64::from(downcast::<Int16Array>(array)?.value(row))),
            DataType::Int32 => Datum::Int(i64::from(downcast::<Int32Array>(array)?.value(row))),
            DataType::Int64 => Datum::Int(downcast::<Int64Array>(array)?.value(row)),
            DataType::Float32 => {
                Datum::Float(f64::from(downcast::<Float32Array>(array)?.value(row)))
            }
            DataType::Float64 => Datum::Float(downcast::<Float64Array>(array)?.value(row)),
            DataType::Utf8 => Datum::String(downcast::<StringArray>(array)?.value(row).to_string()),
            DataType::LargeUtf8 => {
                Datum::String(downcast::<LargeStringArray>(array)?.value(row).to_string())
            }
            DataType::Binary => Datum::Bytes(downcast::<BinaryArray>(array)?.value(row).to_vec()),
            DataType::Date32 => Datum::Date(downcast::<Date32Array>(array)?.value(row)),
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                Datum::Timestamp(downcast::<TimestampMicrosecondArray>(array)?.value(row))
            }
            DataType::Decimal128(precision, scale) => Datum::Decimal {
                value: downcast::<Decimal128Array>(array)?.value(row),
                precision: *precision,
                scale: *scale,
            },
            other => return Err(format!("unsupported datum type {:?}", other)),
        };
        Ok(datum)
    }
}

fn downcast<T: 'static>(array: &dyn Array) -> Result<&T, String> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        format!(
            "failed to downcast {:?} array to {}",
            array.data_type(),
            std::any::type_name::<T>()
        )
    })
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(v) => write!(f, "{}", v),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::String(v) => write!(f, "'{}'", v),
            Datum::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Datum::Date(days) => match NaiveDate::from_num_days_from_ce_opt(days + 719_163) {
                Some(date) => write!(f, "{}", date),
                None => write!(f, "date({})", days),
            },
            Datum::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(ts) => write!(f, "{}", ts.naive_utc()),
                None => write!(f, "timestamp({})", micros),
            },
            Datum::Decimal { value, scale, .. } => {
                if *scale <= 0 {
                    return write!(f, "{}", value);
                }
                let divisor = 10_i128.pow(u32::from(scale.unsigned_abs()));
                let sign = if *value < 0 { "-" } else { "" };
                write!(
                    f,
                    "{}{}.{:0width$}",
                    sign,
                    (value / divisor).abs(),
                    (value % divisor).abs(),
                    width = scale.unsigned_abs() as usize
                )
            }
        }
    }
}
