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
use crate::common::app_config::DeltaConfig;
use crate::novadelta_config::config as novadelta_app_config;

fn delta_setting<T>(f: impl FnOnce(&DeltaConfig) -> T, default: impl FnOnce() -> T) -> T {
    novadelta_app_config()
        .ok()
        .map(|c| f(&c.delta))
        .unwrap_or_else(default)
}

pub(crate) fn encoder_initial_capacity() -> usize {
    delta_setting(|d| d.encoder_initial_capacity, || 200)
}

pub(crate) fn rows_metric_name() -> String {
    delta_setting(
        |d| d.rows_metric_name.clone(),
        || "delta_update_column_batch_rows".to_string(),
    )
}

pub(crate) fn row_buffer_rows_metric_name() -> String {
    delta_setting(
        |d| d.row_buffer_rows_metric_name.clone(),
        || "delta_update_row_buffer_rows".to_string(),
    )
}

pub(crate) fn row_id_column() -> String {
    delta_setting(|d| d.row_id_column.clone(), || "__row_id".to_string())
}

pub(crate) fn ordinal_column() -> String {
    delta_setting(|d| d.ordinal_column.clone(), || "__batch_ordinal".to_string())
}

pub(crate) fn batch_id_column() -> String {
    delta_setting(|d| d.batch_id_column.clone(), || "__batch_id".to_string())
}

pub(crate) fn bucket_id_column() -> String {
    delta_setting(|d| d.bucket_id_column.clone(), || "__bucket_id".to_string())
}
