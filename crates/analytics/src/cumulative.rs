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

//! Running aggregation over every batch seen so far.
//!
//! Each update adds the batch's column sum to a running total and counts the
//! batch once, so the reported mean is the average per-batch sum since the
//! first update.

use crate::{
    batch::RecordBatch,
    engine::{Aggregator, AggregatorKind, Emission},
    error::AggregationError,
    retention::RetentionBuffer,
    Timestamp,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq)]
struct CumulativeState {
    count: u64,
    total: f64,
    /// Earliest timestamp seen, set by the first non-empty batch
    oldest: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeResult {
    oldest: Option<Timestamp>,
    latest: Option<Timestamp>,
    count: u64,
    mean: f64,
}

impl CumulativeResult {
    pub fn oldest(&self) -> Option<Timestamp> {
        self.oldest
    }

    /// Max timestamp of the batch that produced this result
    pub fn latest(&self) -> Option<Timestamp> {
        self.latest
    }

    /// Number of batches folded in, always at least 1
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

#[derive(Debug, Clone)]
pub struct CumulativeAggregator {
    column: String,
    state: CumulativeState,
    history: RetentionBuffer<CumulativeResult>,
}

impl CumulativeAggregator {
    pub fn new(column: impl Into<String>, history: RetentionBuffer<CumulativeResult>) -> Self {
        Self {
            column: column.into(),
            state: CumulativeState::default(),
            history,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn history(&self) -> &RetentionBuffer<CumulativeResult> {
        &self.history
    }

    /// Number of batches folded in so far
    pub fn count(&self) -> u64 {
        self.state.count
    }

    pub fn total(&self) -> f64 {
        self.state.total
    }

    pub fn update<B: RecordBatch + ?Sized>(
        &mut self,
        batch: &B,
    ) -> Result<Arc<CumulativeResult>, AggregationError> {
        // Read the batch before touching the state, a failing batch leaves it as is
        let sum = batch.column_sum(&self.column)?;
        if self.state.oldest.is_none() {
            self.state.oldest = batch.min_ts();
        }
        self.state.count += 1;
        self.state.total += sum;
        let result = Arc::new(CumulativeResult {
            oldest: self.state.oldest,
            latest: batch.max_ts(),
            count: self.state.count,
            mean: self.state.total / self.state.count as f64,
        });
        trace!(
            "Cumulative '{}' count={} total={}",
            self.column,
            self.state.count,
            self.state.total
        );
        self.history.push_shared(result.clone());
        Ok(result)
    }
}

impl<B: RecordBatch + ?Sized> Aggregator<B> for CumulativeAggregator {
    fn kind(&self) -> AggregatorKind {
        AggregatorKind::Cumulative
    }

    fn update(&mut self, batch: &B) -> Result<Emission, AggregationError> {
        CumulativeAggregator::update(self, batch).map(Emission::Cumulative)
    }

    fn history(&self) -> Vec<Emission> {
        self.history
            .iter()
            .cloned()
            .map(Emission::Cumulative)
            .collect()
    }
}
