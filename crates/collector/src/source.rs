// Copyright (C) 2025-present The tripstream Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CSV record source.
//!
//! Rows are read with the `csv` crate into header keyed maps, converted into
//! [`CsvRecord`]s holding the timestamp and the numeric columns used by the
//! engine, ordered by timestamp and grouped into batches by
//! [`BatchingExt::batch_by`]. [`paced`] then replays the batches as a stream,
//! one batch per interval tick.

use crate::config::SourceConfig;
use chrono::NaiveDateTime;
use either::Either;
use futures::{stream, Stream, StreamExt};
use indexmap::IndexMap;
use std::{collections::HashMap, fs::File, io, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, warn};
use tripstream_analytics::{
    batch::{ColumnarBatch, TimeSeriesRecord},
    bucket::BatchingExt,
    error::BatchError,
    Timestamp,
};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("opening source failed: {0}")]
    Io(#[from] io::Error),

    #[error("reading CSV failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("column \"{0}\" is not present in the CSV header")]
    MissingColumn(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// A single CSV row reduced to its timestamp and numeric columns
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    ts: Timestamp,
    values: IndexMap<String, f64>,
}

impl CsvRecord {
    pub fn new(ts: Timestamp, values: IndexMap<String, f64>) -> Self {
        Self { ts, values }
    }
}

impl TimeSeriesRecord for CsvRecord {
    fn get_ts(&self) -> Timestamp {
        self.ts
    }

    fn get_value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

/// Converts one row, `Err` carries the reason the row is skipped
fn parse_row(
    row: &HashMap<String, String>,
    config: &SourceConfig,
    columns: &[String],
) -> Result<CsvRecord, String> {
    let raw_ts = row
        .get(&config.timestamp_column)
        .map(String::as_str)
        .unwrap_or_default();
    let ts = NaiveDateTime::parse_from_str(raw_ts.trim(), &config.timestamp_format)
        .map_err(|err| format!("invalid timestamp \"{raw_ts}\": {err}"))?
        .and_utc();
    let mut values = IndexMap::with_capacity(columns.len());
    for column in columns {
        let raw = row.get(column).map(|v| v.trim()).unwrap_or_default();
        // Blank cells are missing values
        let value = if raw.is_empty() {
            f64::NAN
        } else {
            raw.parse::<f64>()
                .map_err(|err| format!("invalid value \"{raw}\" for \"{column}\": {err}"))?
        };
        values.insert(column.clone(), value);
    }
    Ok(CsvRecord::new(ts, values))
}

/// Reads every valid row of `reader`, sorted by timestamp.
///
/// Rows that cannot be decoded or converted are logged and skipped. A missing
/// timestamp or value column in the header fails the whole read.
pub fn read_records<R: io::Read>(
    reader: R,
    config: &SourceConfig,
    columns: &[String],
) -> Result<Vec<CsvRecord>, SourceError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    for column in std::iter::once(&config.timestamp_column).chain(columns) {
        if !headers.iter().any(|header| header == column) {
            return Err(SourceError::MissingColumn(column.clone()));
        }
    }

    let mut records = vec![];
    for (line, row) in reader.deserialize::<HashMap<String, String>>().enumerate() {
        // Line 1 is the header
        let line = line + 2;
        match row {
            Ok(row) => match parse_row(&row, config, columns) {
                Ok(record) => records.push(record),
                Err(reason) => warn!("Skipping CSV line {line}: {reason}"),
            },
            Err(err) => warn!("Skipping CSV line {line}: {err}"),
        }
    }
    records.sort_by_key(|record| record.ts);
    Ok(records)
}

/// Reads and batches the CSV file named in `config`
pub fn load_batches(
    config: &SourceConfig,
    columns: &[String],
) -> Result<Vec<ColumnarBatch>, SourceError> {
    let file = File::open(&config.path)?;
    let records = read_records(file, config, columns)?;
    debug!(
        "Read {} records from {}",
        records.len(),
        config.path.display()
    );
    let batches = records
        .into_iter()
        .batch_by(config.frequency, columns)
        .with_gaps(config.gaps)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}

/// Replays `batches` one per `interval` tick, the first batch is yielded
/// immediately.
///
/// With `cycle` the batches are replayed forever; an empty list ends the
/// stream right away either way.
pub fn paced(
    batches: Vec<ColumnarBatch>,
    interval: Duration,
    cycle: bool,
) -> impl Stream<Item = ColumnarBatch> {
    let batches = if cycle {
        Either::Left(batches.into_iter().cycle())
    } else {
        Either::Right(batches.into_iter())
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    IntervalStream::new(ticker)
        .zip(stream::iter(batches))
        .map(|(_, batch)| batch)
}
