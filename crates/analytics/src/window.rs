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

//! Sliding window over the most recent batches.
//!
//! The aggregator keeps the partial aggregates of the last `W` batches. Every
//! update reduces the incoming batch, appends it to the window, evicts the
//! oldest partial aggregate once the window holds more than `W` of them and
//! emits the combination of the whole window. Emissions happen from the first
//! update on, so the first `W - 1` results cover a partial window.

use crate::{
    batch::RecordBatch,
    combine::{Combiner, FinalAggregate},
    engine::{Aggregator, AggregatorKind, Emission},
    error::{AggregationError, ConfigError},
    reduce::{PartialAggregate, Reducer},
    retention::RetentionBuffer,
};
use std::{collections::VecDeque, sync::Arc};
use strum_macros::Display;
use tracing::trace;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Fewer than `W` partial aggregates buffered
    Filling,
    /// Exactly `W` partial aggregates buffered
    Full,
}

#[derive(Debug, Clone)]
pub struct SlidingWindowAggregator<R> {
    reducer: R,
    combiner: Combiner,
    window: VecDeque<PartialAggregate>,
    size: usize,
    history: RetentionBuffer<FinalAggregate>,
}

impl<R: Reducer> SlidingWindowAggregator<R> {
    pub fn new(
        reducer: R,
        size: usize,
        history: RetentionBuffer<FinalAggregate>,
    ) -> Result<Self, ConfigError> {
        let combiner = Combiner::new(reducer.op());
        Self::with_combiner(reducer, combiner, size, history)
    }

    /// Uses `combiner` to finalize the window, its operator must match the
    /// reducer's
    pub fn with_combiner(
        reducer: R,
        combiner: Combiner,
        size: usize,
        history: RetentionBuffer<FinalAggregate>,
    ) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if combiner.op() != reducer.op() {
            return Err(ConfigError::OperatorMismatch {
                reducer: reducer.op(),
                combiner: combiner.op(),
            });
        }
        Ok(Self {
            reducer,
            combiner,
            window: VecDeque::new(),
            size,
            history,
        })
    }

    pub fn state(&self) -> WindowState {
        if self.window.len() < self.size {
            WindowState::Filling
        } else {
            WindowState::Full
        }
    }

    /// Configured window size `W`
    pub fn size(&self) -> usize {
        self.size
    }

    /// Partial aggregates currently in the window, oldest first
    pub fn window(&self) -> impl Iterator<Item = &PartialAggregate> {
        self.window.iter()
    }

    pub fn history(&self) -> &RetentionBuffer<FinalAggregate> {
        &self.history
    }

    pub fn update<B: RecordBatch + ?Sized>(
        &mut self,
        batch: &B,
    ) -> Result<Arc<FinalAggregate>, AggregationError> {
        let partial = self.reducer.reduce(batch)?;
        self.window.push_back(partial);
        if self.window.len() > self.size {
            if let Some(evicted) = self.window.pop_front() {
                trace!(
                    "Evicted partial aggregate [{:?} - {:?}] from window",
                    evicted.min_ts(),
                    evicted.max_ts()
                );
            }
        }
        let result = Arc::new(self.combiner.combine(&self.window)?);
        self.history.push_shared(result.clone());
        Ok(result)
    }
}

impl<B, R> Aggregator<B> for SlidingWindowAggregator<R>
where
    B: RecordBatch + ?Sized,
    R: Reducer,
{
    fn kind(&self) -> AggregatorKind {
        AggregatorKind::SlidingWindow
    }

    fn update(&mut self, batch: &B) -> Result<Emission, AggregationError> {
        SlidingWindowAggregator::update(self, batch).map(Emission::Window)
    }

    fn history(&self) -> Vec<Emission> {
        self.history.iter().cloned().map(Emission::Window).collect()
    }
}
