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

//! Dispatcher fanning every batch out to a set of named aggregators.
//!
//! The main components are:
//! - `Aggregator`: the capability shared by every stateful aggregator
//! - `Emission`: the result of a single aggregator update
//! - `StreamEngine`: an ordered registry of aggregators
//!
//! `StreamEngine::push` is synchronous: each call runs every aggregator, in
//! registration order, to completion before returning. The first failing
//! aggregator aborts the push, the aggregators registered after it do not see
//! that batch.

use crate::{
    batch::RecordBatch,
    combine::FinalAggregate,
    cumulative::CumulativeResult,
    error::{AggregationError, ConfigError, EngineError},
    Timestamp,
};
use indexmap::{map::Entry, IndexMap};
use std::{fmt, sync::Arc};
use strum_macros::Display;
use tracing::{debug, trace};

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum AggregatorKind {
    SlidingWindow,
    Cumulative,
}

/// A result emitted by an aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Window(Arc<FinalAggregate>),
    Cumulative(Arc<CumulativeResult>),
}

impl Emission {
    pub fn as_window(&self) -> Option<&FinalAggregate> {
        match self {
            Self::Window(result) => Some(result.as_ref()),
            Self::Cumulative(_) => None,
        }
    }

    pub fn as_cumulative(&self) -> Option<&CumulativeResult> {
        match self {
            Self::Cumulative(result) => Some(result.as_ref()),
            Self::Window(_) => None,
        }
    }

    /// Time range covered by the emission
    pub fn range(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        match self {
            Self::Window(result) => (result.range_start(), result.range_end()),
            Self::Cumulative(result) => (result.oldest(), result.latest()),
        }
    }

    /// Scalar value of the emission, `None` for raster windows
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Window(result) => result.scalar(),
            Self::Cumulative(result) => Some(result.mean()),
        }
    }
}

/// A stateful aggregator updated once per batch
pub trait Aggregator<B: RecordBatch + ?Sized> {
    fn kind(&self) -> AggregatorKind;

    /// Folds the batch into the aggregator and returns the emitted result,
    /// which is also retained in the aggregator's history
    fn update(&mut self, batch: &B) -> Result<Emission, AggregationError>;

    /// Retained results, oldest first
    fn history(&self) -> Vec<Emission>;
}

type BoxedAggregator<B> = Box<dyn Aggregator<B> + Send>;

pub struct StreamEngine<B: RecordBatch + ?Sized> {
    aggregators: IndexMap<String, BoxedAggregator<B>>,
    pushed: u64,
}

impl<B: RecordBatch + ?Sized> Default for StreamEngine<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RecordBatch + ?Sized> fmt::Debug for StreamEngine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEngine")
            .field(
                "aggregators",
                &self
                    .aggregators
                    .iter()
                    .map(|(name, agg)| (name.as_str(), agg.kind()))
                    .collect::<Vec<_>>(),
            )
            .field("pushed", &self.pushed)
            .finish()
    }
}

impl<B: RecordBatch + ?Sized> StreamEngine<B> {
    pub fn new() -> Self {
        Self {
            aggregators: IndexMap::new(),
            pushed: 0,
        }
    }

    /// Appends an aggregator to the registry; it runs after every aggregator
    /// registered before it
    pub fn register<A>(&mut self, name: impl Into<String>, aggregator: A) -> Result<(), ConfigError>
    where
        A: Aggregator<B> + Send + 'static,
    {
        match self.aggregators.entry(name.into()) {
            Entry::Occupied(entry) => Err(ConfigError::DuplicateAggregator(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(
                    "Registering {} aggregator '{}'",
                    aggregator.kind(),
                    entry.key()
                );
                entry.insert(Box::new(aggregator));
                Ok(())
            }
        }
    }

    pub fn with<A>(mut self, name: impl Into<String>, aggregator: A) -> Result<Self, ConfigError>
    where
        A: Aggregator<B> + Send + 'static,
    {
        self.register(name, aggregator)?;
        Ok(self)
    }

    /// Feeds the batch to every aggregator in registration order and returns
    /// their emissions in the same order
    pub fn push(&mut self, batch: &B) -> Result<Vec<(String, Emission)>, EngineError> {
        debug!(
            "Pushing batch [{:?} - {:?}] of {} records to {} aggregators",
            batch.min_ts(),
            batch.max_ts(),
            batch.len(),
            self.aggregators.len()
        );
        let mut emissions = Vec::with_capacity(self.aggregators.len());
        for (name, aggregator) in self.aggregators.iter_mut() {
            let emission = aggregator
                .update(batch)
                .map_err(|source| EngineError::Aggregation {
                    name: name.clone(),
                    source,
                })?;
            trace!("Aggregator '{name}' emitted {:?}", emission.range());
            emissions.push((name.clone(), emission));
        }
        self.pushed += 1;
        Ok(emissions)
    }

    /// Retained results of the named aggregator, oldest first
    pub fn history(&self, name: &str) -> Option<Vec<Emission>> {
        self.aggregators.get(name).map(|agg| agg.history())
    }

    pub fn kind(&self, name: &str) -> Option<AggregatorKind> {
        self.aggregators.get(name).map(|agg| agg.kind())
    }

    /// Names of the registered aggregators in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aggregators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }

    /// Number of batches successfully pushed
    pub fn pushed(&self) -> u64 {
        self.pushed
    }
}
