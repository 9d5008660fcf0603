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
use std::collections::HashSet;

use arrow::datatypes::DataType;

use crate::common::config;
use crate::formats::delta::DeltaValueType;

/// A column assigned by the update statement.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdatedColumn {
    pub name: String,
    /// Position of the column in the full table schema.
    pub schema_position: usize,
    pub data_type: DataType,
    pub nullable: bool,
}

impl UpdatedColumn {
    pub fn new(
        name: impl Into<String>,
        schema_position: usize,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            schema_position,
            data_type,
            nullable,
        }
    }
}

/// Names of the key columns appended to every update chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyColumnNames {
    pub ordinal: String,
    pub batch_id: String,
    pub bucket_id: String,
}

impl KeyColumnNames {
    pub fn from_config() -> Self {
        Self {
            ordinal: config::ordinal_column(),
            batch_id: config::batch_id_column(),
            bucket_id: config::bucket_id_column(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeltaUpdatePlan {
    pub table: String,
    pub updated_columns: Vec<UpdatedColumn>,
    /// Columns identifying a row in the row buffer: the internal row id plus any
    /// partitioning columns the row buffer requires.
    pub row_buffer_key_columns: Vec<String>,
    pub key_columns: KeyColumnNames,
    pub hierarchy_depth: u32,
    pub encoder_initial_capacity: usize,
}

impl DeltaUpdatePlan {
    pub fn new(table: impl Into<String>, updated_columns: Vec<UpdatedColumn>) -> Self {
        Self {
            table: table.into(),
            updated_columns,
            row_buffer_key_columns: vec![config::row_id_column()],
            key_columns: KeyColumnNames::from_config(),
            hierarchy_depth: 0,
            encoder_initial_capacity: config::encoder_initial_capacity(),
        }
    }

    pub fn with_row_buffer_key_columns(mut self, columns: Vec<String>) -> Self {
        self.row_buffer_key_columns = columns;
        self
    }

    pub fn with_key_columns(mut self, key_columns: KeyColumnNames) -> Self {
        self.key_columns = key_columns;
        self
    }

    pub fn with_encoder_initial_capacity(mut self, capacity: usize) -> Self {
        self.encoder_initial_capacity = capacity;
        self
    }

    pub fn updated_column_names(&self) -> Vec<String> {
        self.updated_columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn schema_positions(&self) -> Vec<usize> {
        self.updated_columns
            .iter()
            .map(|c| c.schema_position)
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.table.trim().is_empty() {
            return Err("delta update plan has an empty table name".to_string());
        }
        if self.updated_columns.is_empty() {
            return Err(format!("delta update plan for {} updates no columns", self.table));
        }
        if self.row_buffer_key_columns.is_empty() {
            return Err(format!(
                "delta update plan for {} has no row buffer key columns",
                self.table
            ));
        }

        let mut names = HashSet::new();
        for column in &self.updated_columns {
            DeltaValueType::from_arrow(&column.data_type)
                .map_err(|e| format!("column {} of {}: {}", column.name, self.table, e))?;
            if !names.insert(column.name.as_str()) {
                return Err(format!(
                    "column {} of {} is updated more than once",
                    column.name, self.table
                ));
            }
        }

        let keys = [
            &self.key_columns.ordinal,
            &self.key_columns.batch_id,
            &self.key_columns.bucket_id,
        ];
        for key in keys {
            if names.contains(key.as_str()) {
                return Err(format!(
                    "key column {} of {} is also an updated column",
                    key, self.table
                ));
            }
        }
        if keys.iter().collect::<HashSet<_>>().len() != keys.len() {
            return Err(format!(
                "key columns of {} must have distinct names: {:?}",
                self.table, self.key_columns
            ));
        }
        Ok(())
    }
}
