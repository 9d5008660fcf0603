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
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Counter sink the update path reports row counts to. Optional for callers.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, amount: i64);
}

pub type CounterRef = Arc<Counter>;

#[derive(Debug)]
pub struct Counter {
    name: String,
    value: AtomicI64,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AtomicI64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Named counters created on first use.
#[derive(Debug, Default)]
pub struct CounterSet {
    counters: Mutex<BTreeMap<String, CounterRef>>,
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> CounterRef {
        let mut guard = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            guard
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Counter::new(name))),
        )
    }

    pub fn value(&self, name: &str) -> i64 {
        let guard = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(name).map(|c| c.value()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let guard = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .map(|(name, counter)| (name.clone(), counter.value()))
            .collect()
    }
}

impl MetricsSink for CounterSet {
    fn increment(&self, name: &str, amount: i64) {
        self.counter(name).add(amount);
    }
}
