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

//! Error types shared by the aggregation components.
//!
//! Errors are never retried or swallowed inside the engine; they propagate
//! synchronously to the caller of `update`/`push`.

use crate::reduce::ReduceOp;
use thiserror::Error;

/// Raised while building a component from invalid parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retention capacity must be greater than 0")]
    ZeroCapacity,

    #[error("window size must be greater than 0")]
    ZeroWindow,

    #[error("unknown reduction operator \"{0}\"")]
    UnknownOperator(String),

    #[error("invalid grid: {reason}")]
    InvalidGrid { reason: String },

    #[error("reduction operator \"{0}\" requires a value column")]
    MissingValueColumn(ReduceOp),

    #[error("aggregator \"{0}\" is already registered")]
    DuplicateAggregator(String),

    #[error("invalid label format \"{0}\"")]
    InvalidLabelFormat(String),

    #[error("combiner operator \"{combiner}\" does not match reducer operator \"{reducer}\"")]
    OperatorMismatch {
        reducer: ReduceOp,
        combiner: ReduceOp,
    },
}

/// Raised while building a batch from inconsistent columns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("column \"{column}\" has {actual} values, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("records must be pushed in non-decreasing timestamp order")]
    UnorderedTimestamps,
}

/// Raised by a reducer that cannot read the configured keys or values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReductionError {
    #[error("column \"{0}\" is not present in the batch")]
    MissingColumn(String),
}

/// Raised by a combiner asked to merge an invalid window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombineError {
    #[error("cannot combine an empty window")]
    EmptyWindow,

    #[error("window contains payloads that cannot be merged: {reason}")]
    IncompatiblePayload { reason: String },
}

/// Any failure of a single aggregator update
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Reduction(#[from] ReductionError),

    #[error(transparent)]
    Combine(#[from] CombineError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("aggregator \"{name}\" failed: {source}")]
    Aggregation {
        name: String,
        #[source]
        source: AggregationError,
    },
}

impl EngineError {
    /// Name of the aggregator that aborted the push
    pub fn aggregator(&self) -> &str {
        match self {
            Self::Aggregation { name, .. } => name,
        }
    }
}
