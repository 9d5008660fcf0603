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
use arrow::array::{
    Array, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};

use crate::formats::delta::encoder::{DeltaCursor, DeltaEncoder, DeltaValueType};

/// Encodes `array[row]` into `encoder` at `position`, dispatching on the declared column type.
pub fn write_column_value(
    encoder: &mut DeltaEncoder,
    cursor: DeltaCursor,
    data_type: &DataType,
    nullable: bool,
    position: u32,
    array: &dyn Array,
    row: usize,
) -> Result<DeltaCursor, String> {
    let declared = DeltaValueType::from_arrow(data_type)?;
    if encoder.value_type() != declared {
        return Err(format!(
            "encoder for {:?} used to write declared type {:?}",
            encoder.value_type(),
            data_type
        ));
    }
    if row >= array.len() {
        return Err(format!(
            "row {} out of bounds for delta source array of length {}",
            row,
            array.len()
        ));
    }
    if array.is_null(row) {
        if !nullable {
            return Err(format!(
                "null value for non-nullable {:?} column at position {}",
                data_type, position
            ));
        }
        return encoder.write_null(cursor, position);
    }

    match data_type {
        DataType::Boolean => {
            let values = downcast::<BooleanArray>(array, data_type)?;
            encoder.write_bool(cursor, position, values.value(row))
        }
        DataType::Int8 => {
            let values = downcast::<Int8Array>(array, data_type)?;
            encoder.write_i8(cursor, position, values.value(row))
        }
        DataType::Int16 => {
            let values = downcast::<Int16Array>(array, data_type)?;
            encoder.write_i16(cursor, position, values.value(row))
        }
        DataType::Int32 => {
            let values = downcast::<Int32Array>(array, data_type)?;
            encoder.write_i32(cursor, position, values.value(row))
        }
        DataType::Date32 => {
            let values = downcast::<Date32Array>(array, data_type)?;
            encoder.write_i32(cursor, position, values.value(row))
        }
        DataType::Int64 => {
            let values = downcast::<Int64Array>(array, data_type)?;
            encoder.write_i64(cursor, position, values.value(row))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let values = downcast::<TimestampMicrosecondArray>(array, data_type)?;
            encoder.write_i64(cursor, position, values.value(row))
        }
        DataType::Float32 => {
            let values = downcast::<Float32Array>(array, data_type)?;
            encoder.write_f32(cursor, position, values.value(row))
        }
        DataType::Float64 => {
            let values = downcast::<Float64Array>(array, data_type)?;
            encoder.write_f64(cursor, position, values.value(row))
        }
        DataType::Decimal128(_, _) => {
            let values = downcast::<Decimal128Array>(array, data_type)?;
            encoder.write_i128(cursor, position, values.value(row))
        }
        DataType::Utf8 => {
            let values = downcast::<StringArray>(array, data_type)?;
            encoder.write_str(cursor, position, values.value(row))
        }
        DataType::LargeUtf8 => {
            let values = downcast::<LargeStringArray>(array, data_type)?;
            encoder.write_str(cursor, position, values.value(row))
        }
        DataType::Binary => {
            let values = downcast::<BinaryArray>(array, data_type)?;
            encoder.write_binary(cursor, position, values.value(row))
        }
        other => Err(format!("unsupported delta column type {:?}", other)),
    }
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, declared: &DataType) -> Result<&'a T, String> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        format!(
            "delta column declared as {:?} received {:?} values",
            declared,
            array.data_type()
        )
    })
}
