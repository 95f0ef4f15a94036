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

//! Adaptors driving a [`StreamEngine`] from an iterator or a stream of
//! batches.
//!
//! Each batch pulled from the source is pushed into the engine before the next
//! one is requested, and the adaptor yields the emissions of that push. The
//! adaptors hold no queue: the source's pace is the engine's pace.
//!
//! The first failed push is yielded as an error and ends the adaptor.
//!
//! Example usage:
//! ```text
//! use tripstream_analytics::stream::EngineIteratorExt;
//!
//! let mut engine = build_engine();
//! for emissions in daily_batches().aggregate(&mut engine) {
//!     report(emissions?);
//! }
//! let history = engine.history("pickups");
//! ```

use crate::{
    batch::RecordBatch,
    engine::{Emission, StreamEngine},
    error::EngineError,
};
use futures_core::Stream;
use pin_project::pin_project;
use std::{
    borrow::BorrowMut,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

/// Emissions of one push, in aggregator registration order
pub type Emissions = Vec<(String, Emission)>;

/// An iterator adaptor pushing every batch of `source` into an engine
pub struct EngineIterator<I, B, E> {
    source: I,
    engine: E,
    done: bool,
    _batch: PhantomData<fn(B)>,
}

impl<I, B, E> EngineIterator<I, B, E> {
    pub fn new(source: I, engine: E) -> Self {
        Self {
            source,
            engine,
            done: false,
            _batch: PhantomData,
        }
    }

    /// Returns the engine, e.g. to inspect its history once the source is
    /// exhausted
    pub fn into_engine(self) -> E {
        self.engine
    }
}

impl<I, B, E> Iterator for EngineIterator<I, B, E>
where
    I: Iterator<Item = B>,
    B: RecordBatch,
    E: BorrowMut<StreamEngine<B>>,
{
    type Item = Result<Emissions, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let batch = self.source.next()?;
        let result = self.engine.borrow_mut().push(&batch);
        self.done = result.is_err();
        Some(result)
    }
}

pub trait EngineIteratorExt<B: RecordBatch>: Iterator<Item = B> + Sized {
    fn aggregate<E>(self, engine: E) -> EngineIterator<Self, B, E>
    where
        E: BorrowMut<StreamEngine<B>>,
    {
        EngineIterator::new(self, engine)
    }
}

impl<B: RecordBatch, I: Iterator<Item = B>> EngineIteratorExt<B> for I {}

/// A stream adaptor pushing every batch of `source` into an engine
#[pin_project]
pub struct EngineStream<S, B, E> {
    #[pin]
    source: S,
    engine: E,
    done: bool,
    _batch: PhantomData<fn(B)>,
}

impl<S, B, E> EngineStream<S, B, E> {
    pub fn new(source: S, engine: E) -> Self {
        Self {
            source,
            engine,
            done: false,
            _batch: PhantomData,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<S, B, E> Stream for EngineStream<S, B, E>
where
    S: Stream<Item = B>,
    B: RecordBatch,
    E: BorrowMut<StreamEngine<B>>,
{
    type Item = Result<Emissions, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match this.source.poll_next(cx) {
            Poll::Ready(Some(batch)) => {
                let result = this.engine.borrow_mut().push(&batch);
                *this.done = result.is_err();
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

pub trait EngineStreamExt<B: RecordBatch>: Stream<Item = B> {
    fn aggregate<E>(self, engine: E) -> EngineStream<Self, B, E>
    where
        Self: Sized,
        E: BorrowMut<StreamEngine<B>>,
    {
        EngineStream::new(self, engine)
    }
}

impl<B: RecordBatch, S: Stream<Item = B>> EngineStreamExt<B> for S {}
