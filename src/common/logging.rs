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
//! glog-style `tracing` output.
//!
//! ```text
//! I20260115 10:02:03.123456 7 src/connector/delta/executor.rs:176 novadelta::...] finish: ...
//! ```
//!
//! Lines go to `$NOVADELTA_LOG_FILE`, else `$NOVADELTA_LOG_DIR/novadelta.log`, else stderr.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Local;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

const LOG_FILE_ENV: &str = "NOVADELTA_LOG_FILE";
const LOG_DIR_ENV: &str = "NOVADELTA_LOG_DIR";
const LOG_FILE_NAME: &str = "novadelta.log";

static INIT: OnceLock<()> = OnceLock::new();

/// Appending log file shared by every event writer.
#[derive(Clone)]
struct LogFile(Arc<Mutex<File>>);

impl LogFile {
    fn open_from_env() -> Option<Self> {
        let path = log_file_path()?;
        if let Some(parent) = path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            eprintln!("cannot create log dir {}: {}, using stderr", parent.display(), err);
            return None;
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Self(Arc::new(Mutex::new(file)))),
            Err(err) => {
                eprintln!("cannot open log file {}: {}, using stderr", path.display(), err);
                None
            }
        }
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        f(&mut file)
    }
}

impl io::Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| io::Write::write(file, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| io::Write::flush(file))
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_value(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn log_file_path() -> Option<PathBuf> {
    env_value(LOG_FILE_ENV)
        .map(PathBuf::from)
        .or_else(|| env_value(LOG_DIR_ENV).map(|dir| PathBuf::from(dir).join(LOG_FILE_NAME)))
}

fn level_char(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'T',
    }
}

/// Numeric part of `ThreadId(N)`; 0 if the debug format ever changes.
fn thread_number(id: std::thread::ThreadId) -> u64 {
    format!("{:?}", id)
        .trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .parse::<u64>()
        .unwrap_or(0)
}

struct GlogFormatter;

impl<S, N> FormatEvent<S, N> for GlogFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{}{} {} {}:{} {}] ",
            level_char(metadata.level()),
            Local::now().format("%Y%m%d %H:%M:%S%.6f"),
            thread_number(std::thread::current().id()),
            metadata.file().unwrap_or("unknown"),
            metadata.line().unwrap_or(0),
            metadata.target()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}: ", span.name())?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber once. `filter` uses `EnvFilter` syntax, e.g.
/// `info,novadelta::connector=debug`. Later calls are ignored.
pub fn init_with_level(filter: &str) {
    INIT.get_or_init(|| {
        let builder = tracing_fmt().with_env_filter(EnvFilter::new(filter));
        let _ = match LogFile::open_from_env() {
            Some(file) => builder
                .with_writer(file)
                .with_ansi(false)
                .event_format(GlogFormatter)
                .try_init(),
            None => builder
                .with_writer(io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr))
                .event_format(GlogFormatter)
                .try_init(),
        };
    });
}

pub fn init() {
    init_with_level("info");
}

/// Initializes logging from the loaded config, falling back to `info`.
pub fn init_from_config() {
    match crate::novadelta_config::config() {
        Ok(cfg) => init_with_level(cfg.effective_log_filter()),
        Err(err) => {
            init();
            warn!("failed to load config, logging at info: {:#}", err);
        }
    }
}

pub use tracing::instrument;
pub use tracing::{debug, error, info, trace, warn};
