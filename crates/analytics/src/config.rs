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

//! Declarative engine configuration.
//!
//! An `EngineConfig` names every aggregator, in registration order, together
//! with its reducer and retention. It is validated before any aggregator is
//! built and converted into a [`StreamEngine`] with `TryFrom`.
//!
//! ```yaml
//! history: 3
//! label_format: "%Y-%m-%d"
//! aggregators:
//!   pickups:
//!     type: sliding_window
//!     window: 7
//!     reducer:
//!       type: raster
//!       x: pickup_x
//!       y: pickup_y
//!       op: count
//!       grid: { x_min: 0, x_max: 1, y_min: 0, y_max: 1, width: 64, height: 64 }
//!   mean_fare:
//!     type: cumulative
//!     column: fare_amount
//!     history: 1
//! ```

use crate::{
    batch::RecordBatch,
    combine::{validate_label_format, Combiner, DEFAULT_LABEL_FORMAT},
    cumulative::CumulativeAggregator,
    engine::StreamEngine,
    error::ConfigError,
    reduce::{AnyReducer, GridSpec, RasterReducer, ReduceOp, ScalarReducer},
    retention::RetentionBuffer,
    window::SlidingWindowAggregator,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_history() -> usize {
    1
}

fn default_label_format() -> String {
    DEFAULT_LABEL_FORMAT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retention capacity used by aggregators that do not set their own
    #[serde(default = "default_history")]
    pub history: usize,

    #[serde(default = "default_label_format")]
    pub label_format: String,

    #[serde(default)]
    pub aggregators: IndexMap<String, AggregatorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history: default_history(),
            label_format: default_label_format(),
            aggregators: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregatorConfig {
    SlidingWindow {
        window: usize,
        reducer: ReducerConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<usize>,
    },
    Cumulative {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<usize>,
    },
}

impl AggregatorConfig {
    fn history(&self) -> Option<usize> {
        match self {
            Self::SlidingWindow { history, .. } | Self::Cumulative { history, .. } => *history,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReducerConfig {
    Scalar {
        /// Omitted for `count`, which then counts rows
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
        op: ReduceOp,
    },
    Raster {
        x: String,
        y: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        op: ReduceOp,
        grid: GridSpec,
    },
}

impl ReducerConfig {
    fn columns(&self) -> Vec<&str> {
        match self {
            Self::Scalar { column, .. } => column.iter().map(String::as_str).collect(),
            Self::Raster { x, y, value, .. } => [Some(x), Some(y), value.as_ref()]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect(),
        }
    }

    pub fn op(&self) -> ReduceOp {
        match self {
            Self::Scalar { op, .. } | Self::Raster { op, .. } => *op,
        }
    }

    pub fn build(&self) -> Result<AnyReducer, ConfigError> {
        match self {
            Self::Scalar { column, op } => Ok(ScalarReducer::new(column.clone(), *op)?.into()),
            Self::Raster {
                x,
                y,
                value,
                op,
                grid,
            } => Ok(RasterReducer::new(x.as_str(), y.as_str(), value.clone(), *op, *grid)?.into()),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        validate_label_format(&self.label_format)?;
        for aggregator in self.aggregators.values() {
            if aggregator.history() == Some(0) {
                return Err(ConfigError::ZeroCapacity);
            }
            if let AggregatorConfig::SlidingWindow {
                window, reducer, ..
            } = aggregator
            {
                if *window == 0 {
                    return Err(ConfigError::ZeroWindow);
                }
                reducer.build()?;
            }
        }
        Ok(())
    }

    /// Numeric columns read by any aggregator, in first use order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = vec![];
        for aggregator in self.aggregators.values() {
            let used = match aggregator {
                AggregatorConfig::SlidingWindow { reducer, .. } => reducer.columns(),
                AggregatorConfig::Cumulative { column, .. } => vec![column.as_str()],
            };
            for column in used {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        columns
    }

    fn retention<T>(&self, aggregator: &AggregatorConfig) -> Result<RetentionBuffer<T>, ConfigError> {
        RetentionBuffer::new(aggregator.history().unwrap_or(self.history))
    }

    /// Builds the engine, registering aggregators in configuration order
    pub fn build<B: RecordBatch + ?Sized>(&self) -> Result<StreamEngine<B>, ConfigError> {
        self.validate()?;
        let mut engine = StreamEngine::new();
        for (name, aggregator) in &self.aggregators {
            match aggregator {
                AggregatorConfig::SlidingWindow {
                    window, reducer, ..
                } => {
                    let combiner = Combiner::with_label_format(reducer.op(), &self.label_format);
                    let sliding = SlidingWindowAggregator::with_combiner(
                        reducer.build()?,
                        combiner,
                        *window,
                        self.retention(aggregator)?,
                    )?;
                    engine.register(name.as_str(), sliding)?;
                }
                AggregatorConfig::Cumulative { column, .. } => {
                    let cumulative =
                        CumulativeAggregator::new(column.as_str(), self.retention(aggregator)?);
                    engine.register(name.as_str(), cumulative)?;
                }
            }
        }
        Ok(engine)
    }
}

impl<B: RecordBatch + ?Sized> TryFrom<&EngineConfig> for StreamEngine<B> {
    type Error = ConfigError;

    fn try_from(config: &EngineConfig) -> Result<Self, Self::Error> {
        config.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{batch::ColumnarBatch, engine::AggregatorKind};
    use chrono::{TimeZone, Utc};

    const CONFIG: &str = r#"
history: 2
label_format: "%d/%m"
aggregators:
  pickups:
    type: sliding_window
    window: 3
    reducer:
      type: raster
      x: pickup_x
      y: pickup_y
      op: count
      grid: { x_min: 0.0, x_max: 2.0, y_min: 0.0, y_max: 2.0, width: 2, height: 2 }
  max_fare:
    type: sliding_window
    window: 2
    history: 5
    reducer:
      type: scalar
      column: fare_amount
      op: MAX
  mean_fare:
    type: cumulative
    column: fare_amount
"#;

    fn config() -> EngineConfig {
        serde_yaml::from_str(CONFIG).unwrap()
    }

    fn batch(d: u32, fares: &[f64]) -> ColumnarBatch {
        let n = fares.len();
        ColumnarBatch::new(
            vec![Utc.with_ymd_and_hms(2015, 1, d, 0, 0, 0).unwrap(); n],
            IndexMap::from([
                ("fare_amount".to_string(), fares.to_vec()),
                ("pickup_x".to_string(), vec![0.5; n]),
                ("pickup_y".to_string(), vec![1.5; n]),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize() {
        let config = config();
        assert_eq!(config.history, 2);
        assert_eq!(
            config.aggregators.keys().collect::<Vec<_>>(),
            vec!["pickups", "max_fare", "mean_fare"]
        );
        assert_eq!(
            config.aggregators["max_fare"],
            AggregatorConfig::SlidingWindow {
                window: 2,
                history: Some(5),
                reducer: ReducerConfig::Scalar {
                    column: Some("fare_amount".to_string()),
                    op: ReduceOp::Max,
                },
            }
        );
        assert_eq!(
            config.aggregators["mean_fare"],
            AggregatorConfig::Cumulative {
                column: "fare_amount".to_string(),
                history: None,
            }
        );
    }

    #[test]
    fn test_columns() {
        assert_eq!(
            config().columns(),
            vec!["pickup_x", "pickup_y", "fare_amount"]
        );
        assert!(EngineConfig::default().columns().is_empty());
    }

    #[test]
    fn test_defaults() {
        let config: EngineConfig = serde_yaml::from_str("aggregators: {}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.history, 1);
        assert_eq!(config.label_format, "%Y-%m-%d");
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let yaml = r#"
aggregators:
  bad:
    type: sliding_window
    window: 1
    reducer: { type: scalar, column: fare, op: median }
"#;
        let err = serde_yaml::from_str::<EngineConfig>(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown reduction operator"));
    }

    #[test]
    fn test_validate() {
        let mut config = config();
        assert_eq!(config.validate(), Ok(()));

        config.history = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
        config.history = 1;

        config.label_format = "%Y-%Q".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLabelFormat("%Y-%Q".to_string()))
        );
        config.label_format = DEFAULT_LABEL_FORMAT.to_string();

        config.aggregators.insert(
            "zero".to_string(),
            AggregatorConfig::SlidingWindow {
                window: 0,
                history: None,
                reducer: ReducerConfig::Scalar {
                    column: None,
                    op: ReduceOp::Count,
                },
            },
        );
        assert_eq!(config.validate(), Err(ConfigError::ZeroWindow));

        config.aggregators.insert(
            "zero".to_string(),
            AggregatorConfig::SlidingWindow {
                window: 1,
                history: None,
                reducer: ReducerConfig::Scalar {
                    column: None,
                    op: ReduceOp::Sum,
                },
            },
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingValueColumn(ReduceOp::Sum))
        );

        config.aggregators.insert(
            "zero".to_string(),
            AggregatorConfig::Cumulative {
                column: "fare".to_string(),
                history: Some(0),
            },
        );
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_invalid_grid() {
        let mut config = config();
        if let Some(AggregatorConfig::SlidingWindow {
            reducer: ReducerConfig::Raster { grid, .. },
            ..
        }) = config.aggregators.get_mut("pickups")
        {
            grid.width = 0;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGrid { .. })
        ));
    }

    #[test]
    fn test_build_engine() {
        let mut engine = StreamEngine::<ColumnarBatch>::try_from(&config()).unwrap();
        assert_eq!(
            engine.names().collect::<Vec<_>>(),
            vec!["pickups", "max_fare", "mean_fare"]
        );
        assert_eq!(engine.kind("pickups"), Some(AggregatorKind::SlidingWindow));
        assert_eq!(engine.kind("mean_fare"), Some(AggregatorKind::Cumulative));

        for d in 1..=6 {
            engine.push(&batch(d, &[d as f64, 1.0])).unwrap();
        }
        // Per aggregator retention overrides the engine default
        assert_eq!(engine.history("max_fare").map(|h| h.len()), Some(5));
        assert_eq!(engine.history("mean_fare").map(|h| h.len()), Some(2));

        let pickups = engine.history("pickups").unwrap();
        assert_eq!(pickups.len(), 2);
        let window = pickups[1].as_window().unwrap();
        assert_eq!(window.label(), "04/01 to 06/01");
        // Top left bin only
        assert_eq!(
            window.raster_values(),
            Some(vec![Some(0.0), Some(0.0), Some(6.0), Some(0.0)])
        );

        let max_fare = engine.history("max_fare").unwrap();
        assert_eq!(max_fare.last().and_then(|e| e.value()), Some(6.0));
    }

    #[test]
    fn test_build_with_unbounded_sizes() {
        let yaml = r#"
history: 18446744073709551615
aggregators:
  sum_fare:
    type: sliding_window
    window: 18446744073709551615
    reducer: { type: scalar, column: fare_amount, op: sum }
  mean_fare:
    type: cumulative
    column: fare_amount
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.history, usize::MAX);
        assert_eq!(config.validate(), Ok(()));

        let mut engine = config.build::<ColumnarBatch>().unwrap();
        engine.push(&batch(1, &[3.0, 4.0])).unwrap();
        engine.push(&batch(2, &[5.0])).unwrap();
        let sums: Vec<_> = engine
            .history("sum_fare")
            .unwrap()
            .iter()
            .map(|e| e.value())
            .collect();
        assert_eq!(sums, vec![Some(7.0), Some(12.0)]);
        assert_eq!(engine.history("mean_fare").map(|h| h.len()), Some(2));
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
