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

//! Reduction of a single batch into a mergeable partial aggregate.
//!
//! The main components are:
//! - `ReduceOp`: the closed set of reduction operators
//! - `Cell`: a per-key accumulator that keeps enough state (count, sum, min,
//!   max) to be merged with other cells and finalized under any `ReduceOp`
//! - `Raster`: a 2D grid of cells keyed by two coordinate columns
//! - `Reducer`: the trait turning a `RecordBatch` into a `PartialAggregate`,
//!   implemented by `ScalarReducer` and `RasterReducer`
//!
//! Reducers are pure: the same batch always produces the same partial
//! aggregate, and an empty batch produces the identity payload.

use crate::{
    batch::RecordBatch,
    error::{CombineError, ConfigError, ReductionError},
    Timestamp,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// A trait for defining accumulation logic over the records of one batch
pub trait Accumulator<Init, Input, Output> {
    fn init(init: Init) -> Self;
    fn push(&mut self, item: Input);
    fn flush(self) -> Output;
}

#[derive(
    Display, EnumString, Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum ReduceOp {
    Min,
    Max,
    Mean,
    Sum,
    Count,
}

impl ReduceOp {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        name.parse()
            .map_err(|_| ConfigError::UnknownOperator(name.to_string()))
    }

    /// Whether the operator needs a value column, `count` only counts rows
    pub fn needs_value(&self) -> bool {
        !matches!(self, Self::Count)
    }
}

impl TryFrom<String> for ReduceOp {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReduceOp> for String {
    fn from(value: ReduceOp) -> Self {
        value.to_string()
    }
}

/// Mergeable accumulator for a single key
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Cell {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn merge(&mut self, other: &Cell) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Finalizes the cell under the given operator.
    ///
    /// An empty cell yields `0` for `count` and `sum`, and `None` for the
    /// operators without an identity value.
    pub fn value(&self, op: ReduceOp) -> Option<f64> {
        match op {
            ReduceOp::Count => Some(self.count as f64),
            ReduceOp::Sum => Some(self.sum),
            _ if self.is_empty() => None,
            ReduceOp::Mean => Some(self.sum / self.count as f64),
            ReduceOp::Min => Some(self.min),
            ReduceOp::Max => Some(self.max),
        }
    }
}

impl Accumulator<(), f64, Cell> for Cell {
    fn init(_: ()) -> Self {
        Self::default()
    }

    fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn flush(self) -> Cell {
        self
    }
}

/// Extent and resolution of a raster.
///
/// Bins are half-open `[min, max)` along each axis, except that points lying
/// exactly on the max edge fall into the last bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidGrid {
                reason: "width and height must be greater than 0".to_string(),
            });
        }
        // The cell vector must stay addressable
        let cells_fit = self
            .width
            .checked_mul(self.height)
            .and_then(|cells| cells.checked_mul(std::mem::size_of::<Cell>()))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !cells_fit {
            return Err(ConfigError::InvalidGrid {
                reason: "grid too large".to_string(),
            });
        }
        let bounds = [self.x_min, self.x_max, self.y_min, self.y_max];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(ConfigError::InvalidGrid {
                reason: "bounds must be finite".to_string(),
            });
        }
        if self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(ConfigError::InvalidGrid {
                reason: "min bounds must be lower than max bounds".to_string(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the bin containing `(x, y)`, row-major with row 0 at `y_min`
    pub fn bin(&self, x: f64, y: f64) -> Option<usize> {
        let col = Self::axis_bin(x, self.x_min, self.x_max, self.width)?;
        let row = Self::axis_bin(y, self.y_min, self.y_max, self.height)?;
        Some(row * self.width + col)
    }

    fn axis_bin(v: f64, min: f64, max: f64, bins: usize) -> Option<usize> {
        if !v.is_finite() || v < min || v > max {
            return None;
        }
        let bin = ((v - min) / (max - min) * bins as f64) as usize;
        Some(bin.min(bins - 1))
    }
}

/// Grid of cells covering a `GridSpec`
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: GridSpec,
    cells: Vec<Cell>,
}

impl Raster {
    /// The identity raster: every bin empty
    pub fn empty(grid: GridSpec) -> Self {
        Self {
            grid,
            cells: vec![Cell::default(); grid.len()],
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.cells.get(row * self.grid.width + col)
    }

    pub fn merge(&mut self, other: &Raster) -> Result<(), CombineError> {
        if self.grid != other.grid {
            return Err(CombineError::IncompatiblePayload {
                reason: "rasters cover different grids".to_string(),
            });
        }
        self.cells
            .iter_mut()
            .zip(other.cells.iter())
            .for_each(|(lhs, rhs)| lhs.merge(rhs));
        Ok(())
    }

    /// Finalized value of every bin, row-major with row 0 at `y_min`
    pub fn values(&self, op: ReduceOp) -> Vec<Option<f64>> {
        self.cells.iter().map(|cell| cell.value(op)).collect()
    }
}

impl Accumulator<GridSpec, (f64, f64, f64), Raster> for Raster {
    fn init(grid: GridSpec) -> Self {
        Self::empty(grid)
    }

    fn push(&mut self, (x, y, value): (f64, f64, f64)) {
        if let Some(idx) = self.grid.bin(x, y) {
            self.cells[idx].push(value);
        }
    }

    fn flush(self) -> Raster {
        self
    }
}

/// Reduced value of one batch
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Cell),
    Raster(Raster),
}

impl Payload {
    /// Merges `other` into `self`; associative and commutative
    pub fn merge(&mut self, other: &Payload) -> Result<(), CombineError> {
        match (self, other) {
            (Payload::Scalar(lhs), Payload::Scalar(rhs)) => {
                lhs.merge(rhs);
                Ok(())
            }
            (Payload::Raster(lhs), Payload::Raster(rhs)) => lhs.merge(rhs),
            _ => Err(CombineError::IncompatiblePayload {
                reason: "cannot merge scalar and raster payloads".to_string(),
            }),
        }
    }
}

/// Result of reducing one batch
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAggregate {
    min_ts: Option<Timestamp>,
    max_ts: Option<Timestamp>,
    payload: Payload,
}

impl PartialAggregate {
    pub fn new(min_ts: Option<Timestamp>, max_ts: Option<Timestamp>, payload: Payload) -> Self {
        Self {
            min_ts,
            max_ts,
            payload,
        }
    }

    pub fn min_ts(&self) -> Option<Timestamp> {
        self.min_ts
    }

    pub fn max_ts(&self) -> Option<Timestamp> {
        self.max_ts
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Turns a batch into a partial aggregate
pub trait Reducer {
    fn op(&self) -> ReduceOp;

    fn reduce<B: RecordBatch + ?Sized>(&self, batch: &B)
        -> Result<PartialAggregate, ReductionError>;
}

fn column<'a, B: RecordBatch + ?Sized>(
    batch: &'a B,
    name: &str,
) -> Result<&'a [f64], ReductionError> {
    batch
        .column(name)
        .ok_or_else(|| ReductionError::MissingColumn(name.to_string()))
}

/// Reduces a whole batch into a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarReducer {
    column: Option<String>,
    op: ReduceOp,
}

impl ScalarReducer {
    /// `column` may only be omitted for `ReduceOp::Count`, which then counts
    /// rows
    pub fn new(column: Option<String>, op: ReduceOp) -> Result<Self, ConfigError> {
        if column.is_none() && op.needs_value() {
            return Err(ConfigError::MissingValueColumn(op));
        }
        Ok(Self { column, op })
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }
}

impl Reducer for ScalarReducer {
    fn op(&self) -> ReduceOp {
        self.op
    }

    fn reduce<B: RecordBatch + ?Sized>(
        &self,
        batch: &B,
    ) -> Result<PartialAggregate, ReductionError> {
        let mut cell = Cell::init(());
        if !batch.is_empty() {
            match &self.column {
                Some(name) => column(batch, name)?
                    .iter()
                    .for_each(|value| cell.push(*value)),
                None => (0..batch.len()).for_each(|_| cell.push(1.0)),
            }
        }
        Ok(PartialAggregate::new(
            batch.min_ts(),
            batch.max_ts(),
            Payload::Scalar(cell.flush()),
        ))
    }
}

/// Reduces a batch into a raster keyed by two coordinate columns
#[derive(Debug, Clone, PartialEq)]
pub struct RasterReducer {
    x: String,
    y: String,
    value: Option<String>,
    op: ReduceOp,
    grid: GridSpec,
}

impl RasterReducer {
    pub fn new(
        x: impl Into<String>,
        y: impl Into<String>,
        value: Option<String>,
        op: ReduceOp,
        grid: GridSpec,
    ) -> Result<Self, ConfigError> {
        grid.validate()?;
        if value.is_none() && op.needs_value() {
            return Err(ConfigError::MissingValueColumn(op));
        }
        Ok(Self {
            x: x.into(),
            y: y.into(),
            value,
            op,
            grid,
        })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

impl Reducer for RasterReducer {
    fn op(&self) -> ReduceOp {
        self.op
    }

    fn reduce<B: RecordBatch + ?Sized>(
        &self,
        batch: &B,
    ) -> Result<PartialAggregate, ReductionError> {
        let mut raster = Raster::init(self.grid);
        if !batch.is_empty() {
            let xs = column(batch, &self.x)?;
            let ys = column(batch, &self.y)?;
            match &self.value {
                Some(name) => {
                    let values = column(batch, name)?;
                    for ((x, y), value) in xs.iter().zip(ys).zip(values) {
                        raster.push((*x, *y, *value));
                    }
                }
                None => {
                    for (x, y) in xs.iter().zip(ys) {
                        raster.push((*x, *y, 1.0));
                    }
                }
            }
        }
        Ok(PartialAggregate::new(
            batch.min_ts(),
            batch.max_ts(),
            Payload::Raster(raster.flush()),
        ))
    }
}

/// Reducer selected at runtime, e.g. from configuration
#[derive(Debug, Clone, PartialEq)]
pub enum AnyReducer {
    Scalar(ScalarReducer),
    Raster(RasterReducer),
}

impl Reducer for AnyReducer {
    fn op(&self) -> ReduceOp {
        match self {
            Self::Scalar(reducer) => reducer.op(),
            Self::Raster(reducer) => reducer.op(),
        }
    }

    fn reduce<B: RecordBatch + ?Sized>(
        &self,
        batch: &B,
    ) -> Result<PartialAggregate, ReductionError> {
        match self {
            Self::Scalar(reducer) => reducer.reduce(batch),
            Self::Raster(reducer) => reducer.reduce(batch),
        }
    }
}

impl From<ScalarReducer> for AnyReducer {
    fn from(value: ScalarReducer) -> Self {
        Self::Scalar(value)
    }
}

impl From<RasterReducer> for AnyReducer {
    fn from(value: RasterReducer) -> Self {
        Self::Raster(value)
    }
}
