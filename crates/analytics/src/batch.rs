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

//! Record batches: the unit of ingestion of the engine.
//!
//! - `RecordBatch`: the read-only view every reducer works against
//! - `ColumnarBatch`: a concrete batch storing one `f64` vector per column
//! - `TimeSeriesRecord`: a single timestamped record that can be appended to a
//!   `BatchBuilder`
//!
//! Missing and non-numeric values are stored as `NaN` and are skipped by every
//! reduction, matching the behaviour of column sums over sparse tabular data.

use crate::{
    error::{BatchError, ReductionError},
    Timestamp,
};
use indexmap::IndexMap;

/// A bounded, immutable group of timestamped records
pub trait RecordBatch {
    /// Earliest timestamp in the batch, `None` iff the batch is empty
    fn min_ts(&self) -> Option<Timestamp>;

    /// Latest timestamp in the batch, `None` iff the batch is empty
    fn max_ts(&self) -> Option<Timestamp>;

    /// Number of records in the batch
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of a named numeric column, one per record
    fn column(&self, name: &str) -> Option<&[f64]>;

    /// Sum of the non-NaN values of a column.
    ///
    /// An empty batch sums to `0.0` regardless of its columns.
    fn column_sum(&self, name: &str) -> Result<f64, ReductionError> {
        if self.is_empty() {
            return Ok(0.0);
        }
        self.column(name)
            .map(|values| values.iter().filter(|v| !v.is_nan()).sum())
            .ok_or_else(|| ReductionError::MissingColumn(name.to_string()))
    }

    /// Number of non-NaN values of a column
    fn column_count(&self, name: &str) -> Result<usize, ReductionError> {
        if self.is_empty() {
            return Ok(0);
        }
        self.column(name)
            .map(|values| values.iter().filter(|v| !v.is_nan()).count())
            .ok_or_else(|| ReductionError::MissingColumn(name.to_string()))
    }
}

/// A single record that can be appended to a batch
pub trait TimeSeriesRecord {
    fn get_ts(&self) -> Timestamp;

    /// Numeric value of the named field, `None` when the record lacks it
    fn get_value(&self, column: &str) -> Option<f64>;
}

/// Column oriented batch.
///
/// Every column holds exactly one value per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnarBatch {
    timestamps: Vec<Timestamp>,
    columns: IndexMap<String, Vec<f64>>,
    min_ts: Option<Timestamp>,
    max_ts: Option<Timestamp>,
}

impl ColumnarBatch {
    pub fn new(
        timestamps: Vec<Timestamp>,
        columns: IndexMap<String, Vec<f64>>,
    ) -> Result<Self, BatchError> {
        for (name, values) in &columns {
            if values.len() != timestamps.len() {
                return Err(BatchError::ColumnLength {
                    column: name.clone(),
                    expected: timestamps.len(),
                    actual: values.len(),
                });
            }
        }
        let min_ts = timestamps.iter().min().copied();
        let max_ts = timestamps.iter().max().copied();
        Ok(Self {
            timestamps,
            columns,
            min_ts,
            max_ts,
        })
    }

    /// A batch without records nor columns
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

impl RecordBatch for ColumnarBatch {
    fn min_ts(&self) -> Option<Timestamp> {
        self.min_ts
    }

    fn max_ts(&self) -> Option<Timestamp> {
        self.max_ts
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Accumulates time-ordered records into a [`ColumnarBatch`] with a fixed set
/// of columns
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    timestamps: Vec<Timestamp>,
    columns: IndexMap<String, Vec<f64>>,
}

impl BatchBuilder {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamps: Vec::new(),
            columns: columns
                .into_iter()
                .map(|name| (name.into(), Vec::new()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp of the last pushed record
    pub fn last_ts(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    pub fn push<R: TimeSeriesRecord>(&mut self, record: &R) -> Result<(), BatchError> {
        let ts = record.get_ts();
        if self.last_ts().is_some_and(|last| ts < last) {
            return Err(BatchError::UnorderedTimestamps);
        }
        self.timestamps.push(ts);
        for (name, values) in self.columns.iter_mut() {
            values.push(record.get_value(name).unwrap_or(f64::NAN));
        }
        Ok(())
    }

    /// Builds the batch accumulated so far and resets the builder, keeping its
    /// columns
    pub fn finish(&mut self) -> ColumnarBatch {
        let timestamps = std::mem::take(&mut self.timestamps);
        let columns = self
            .columns
            .iter_mut()
            .map(|(name, values)| (name.clone(), std::mem::take(values)))
            .collect();
        let min_ts = timestamps.first().copied();
        let max_ts = timestamps.last().copied();
        ColumnarBatch {
            timestamps,
            columns,
            min_ts,
            max_ts,
        }
    }
}
