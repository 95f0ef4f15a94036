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

//! Merges the partial aggregates of a window into one reportable value.

use crate::{
    error::{CombineError, ConfigError},
    reduce::{PartialAggregate, Payload, Raster, ReduceOp},
    Timestamp,
};
use chrono::format::{Item, StrftimeItems};
use std::fmt::Write;

pub const DEFAULT_LABEL_FORMAT: &str = "%Y-%m-%d";

/// Checks that `label_format` only holds strftime specifiers chrono knows
pub fn validate_label_format(label_format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(label_format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidLabelFormat(label_format.to_string()));
    }
    Ok(())
}

/// Combined result of a window
#[derive(Debug, Clone, PartialEq)]
pub struct FinalAggregate {
    range_start: Option<Timestamp>,
    range_end: Option<Timestamp>,
    label: String,
    op: ReduceOp,
    payload: Payload,
    len: usize,
}

impl FinalAggregate {
    pub fn range_start(&self) -> Option<Timestamp> {
        self.range_start
    }

    pub fn range_end(&self) -> Option<Timestamp> {
        self.range_end
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Number of partial aggregates merged into this result
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finalized value of a scalar payload
    pub fn scalar(&self) -> Option<f64> {
        match &self.payload {
            Payload::Scalar(cell) => cell.value(self.op),
            Payload::Raster(_) => None,
        }
    }

    pub fn raster(&self) -> Option<&Raster> {
        match &self.payload {
            Payload::Raster(raster) => Some(raster),
            Payload::Scalar(_) => None,
        }
    }

    /// Finalized bins of a raster payload
    pub fn raster_values(&self) -> Option<Vec<Option<f64>>> {
        self.raster().map(|raster| raster.values(self.op))
    }
}

/// Pure merge of a window of partial aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combiner {
    op: ReduceOp,
    label_format: String,
}

impl Combiner {
    pub fn new(op: ReduceOp) -> Self {
        Self::with_label_format(op, DEFAULT_LABEL_FORMAT)
    }

    /// `label_format` is a chrono strftime pattern applied to both ends of the
    /// window range, see [`validate_label_format`]
    pub fn with_label_format(op: ReduceOp, label_format: impl Into<String>) -> Self {
        Self {
            op,
            label_format: label_format.into(),
        }
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }

    pub fn combine<'a, I>(&self, window: I) -> Result<FinalAggregate, CombineError>
    where
        I: IntoIterator<Item = &'a PartialAggregate>,
    {
        let mut iter = window.into_iter();
        let first = iter.next().ok_or(CombineError::EmptyWindow)?;
        let mut range_start = first.min_ts();
        let mut range_end = first.max_ts();
        let mut payload = first.payload().clone();
        let mut len = 1;
        for partial in iter {
            range_start = min_present(range_start, partial.min_ts());
            range_end = max_present(range_end, partial.max_ts());
            payload.merge(partial.payload())?;
            len += 1;
        }
        Ok(FinalAggregate {
            range_start,
            range_end,
            label: self.label(range_start, range_end),
            op: self.op,
            payload,
            len,
        })
    }

    pub fn label(&self, start: Option<Timestamp>, end: Option<Timestamp>) -> String {
        // An unknown specifier fails the write, fall back to RFC 3339
        let fmt = |ts: Timestamp| {
            let mut out = String::new();
            match write!(out, "{}", ts.format(&self.label_format)) {
                Ok(()) => out,
                Err(_) => ts.to_rfc3339(),
            }
        };
        match (start.map(fmt), end.map(fmt)) {
            (Some(start), Some(end)) if start == end => start,
            (Some(start), Some(end)) => format!("{start} to {end}"),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => "empty".to_string(),
        }
    }
}

fn min_present(lhs: Option<Timestamp>, rhs: Option<Timestamp>) -> Option<Timestamp> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Some(lhs.min(rhs)),
        (lhs, rhs) => lhs.or(rhs),
    }
}

fn max_present(lhs: Option<Timestamp>, rhs: Option<Timestamp>) -> Option<Timestamp> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Some(lhs.max(rhs)),
        (lhs, rhs) => lhs.or(rhs),
    }
}
