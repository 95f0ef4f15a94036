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

//! Incremental aggregation over a stream of time-bucketed record batches.
//!
//! A [`engine::StreamEngine`] receives one [`batch::RecordBatch`] at a time
//! and fans it out to its registered aggregators:
//! - [`window::SlidingWindowAggregator`] reduces every batch into a
//!   [`reduce::PartialAggregate`], keeps the `W` most recent ones and combines
//!   them into a [`combine::FinalAggregate`] on every update.
//! - [`cumulative::CumulativeAggregator`] folds every batch into a running
//!   count/sum and reports the running mean.
//!
//! Every result is pushed into a bounded [`retention::RetentionBuffer`] owned
//! by the aggregator that produced it, so consumers can inspect a trailing
//! history of results without unbounded memory growth.
//!
//! The remaining modules are collaborators around the core. [`bucket`] groups
//! records into batches and [`stream`] drives an engine from an iterator or a
//! stream. [`config`] builds an engine from a declarative description.
//! Downstream of the engine, [`render`] turns raster payloads into images and
//! [`report`] formats retained history as a table.

pub mod batch;
pub mod bucket;
pub mod combine;
pub mod config;
pub mod cumulative;
pub mod engine;
pub mod error;
pub mod reduce;
pub mod render;
pub mod report;
pub mod retention;
pub mod stream;
pub mod window;

/// Timestamps carried by records and aggregates
pub type Timestamp = chrono::DateTime<chrono::Utc>;
