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

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde_with::serde_as;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tripstream_analytics::{
    bucket::Frequency,
    config::EngineConfig,
    error::ConfigError,
    render::{Palette, Rgb, Shading, BLACK},
};

/// Prefix of the environment variables overriding the configuration file,
/// nested keys are separated by `__`, e.g. `TS_LOGGING__LEVEL=debug`
pub const ENV_PREFIX: &str = "TS_";

const INTERVAL_DEFAULT: Duration = Duration::from_millis(1_000);

pub(crate) const fn default_interval() -> Duration {
    INTERVAL_DEFAULT
}

pub(crate) fn default_timestamp_column() -> String {
    "tpep_pickup_datetime".to_string()
}

pub(crate) fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

pub(crate) const fn default_frequency() -> Frequency {
    Frequency::Daily
}

pub(crate) const fn default_background() -> Rgb {
    BLACK
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectorConfigError {
    #[error(transparent)]
    Engine(#[from] ConfigError),

    #[error("invalid logging level \"{0}\"")]
    InvalidLoggingLevel(String),

    #[error("source interval must be greater than 0")]
    ZeroInterval,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl CollectorConfig {
    /// Reads the YAML file at `path`, then applies the `TS_` environment
    /// overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    pub fn validate(&self) -> Result<(), CollectorConfigError> {
        if tracing::Level::from_str(&self.logging.level).is_err() {
            return Err(CollectorConfigError::InvalidLoggingLevel(
                self.logging.level.clone(),
            ));
        }
        if self.source.interval.is_zero() {
            return Err(CollectorConfigError::ZeroInterval);
        }
        self.engine.validate()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceConfig {
    /// CSV file with a header row
    pub path: PathBuf,

    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// chrono strftime pattern, timestamps are read as UTC
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    #[serde(default = "default_frequency")]
    pub frequency: Frequency,

    /// Emit empty batches for buckets without any record
    #[serde(default)]
    pub gaps: bool,

    /// Replay the batches forever
    #[serde(default)]
    pub cycle: bool,

    /// Delay between two batches
    #[serde(default = "default_interval")]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub interval: Duration,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one PPM image per raster window emission
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub images: Option<PathBuf>,

    #[serde(default = "default_palette")]
    pub colormap: Palette,

    #[serde(default)]
    pub shading: Shading,

    #[serde(default = "default_background")]
    pub background: Rgb,
}

pub(crate) const fn default_palette() -> Palette {
    Palette::Fire
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            images: None,
            colormap: default_palette(),
            shading: Shading::default(),
            background: default_background(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tripstream_analytics::config::AggregatorConfig;

    const CONFIG: &str = r#"
logging:
  level: info
source:
  path: trips.csv
  frequency: weekly
  interval: 250
engine:
  history: 3
  aggregators:
    pickups:
      type: sliding_window
      window: 7
      reducer:
        type: raster
        x: pickup_x
        y: pickup_y
        op: count
        grid: { x_min: -74.05, x_max: -73.75, y_min: 40.6, y_max: 40.9, width: 64, height: 64 }
    mean_fare:
      type: cumulative
      column: fare_amount
output:
  images: ./out
  colormap: viridis
  shading: linear
"#;

    #[test]
    fn test_load_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("collector.yaml", CONFIG)?;
            let config = CollectorConfig::load("collector.yaml")?;
            assert_eq!(config.logging.level, "info");
            assert_eq!(config.source.path, PathBuf::from("trips.csv"));
            assert_eq!(config.source.frequency, Frequency::Weekly);
            assert_eq!(config.source.interval, Duration::from_millis(250));
            assert!(!config.source.cycle);
            assert_eq!(config.source.timestamp_column, "tpep_pickup_datetime");
            assert_eq!(config.engine.history, 3);
            assert!(matches!(
                config.engine.aggregators["pickups"],
                AggregatorConfig::SlidingWindow { window: 7, .. }
            ));
            assert_eq!(config.output.images, Some(PathBuf::from("./out")));
            assert_eq!(config.output.colormap, Palette::Viridis);
            assert_eq!(config.output.shading, Shading::Linear);
            assert_eq!(config.output.background, BLACK);
            assert_eq!(config.runtime.threads, None);
            assert_eq!(config.validate(), Ok(()));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file("collector.yaml", CONFIG)?;
            jail.set_env("TS_LOGGING__LEVEL", "debug");
            jail.set_env("TS_SOURCE__CYCLE", "true");
            jail.set_env("TS_RUNTIME__THREADS", "2");
            let config = CollectorConfig::load("collector.yaml")?;
            assert_eq!(config.logging.level, "debug");
            assert!(config.source.cycle);
            assert_eq!(config.runtime.threads, Some(2));
            Ok(())
        });
    }

    #[test]
    fn test_defaults() {
        let yaml = "source: { path: trips.csv }\nengine: {}\n";
        let config: CollectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.source.frequency, Frequency::Daily);
        assert_eq!(config.source.interval, Duration::from_secs(1));
        assert_eq!(config.source.timestamp_format, "%Y-%m-%d %H:%M:%S");
        assert_eq!(config.output.images, None);
        assert_eq!(config.output.colormap, Palette::Fire);
        assert_eq!(config.output.shading, Shading::Log);
        assert_eq!(config.engine.history, 1);
    }

    #[test]
    fn test_validate() {
        let mut config: CollectorConfig =
            serde_yaml::from_str("source: { path: trips.csv }\nengine: {}\n").unwrap();
        assert_eq!(config.validate(), Ok(()));

        config.logging.level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(CollectorConfigError::InvalidLoggingLevel("loud".to_string()))
        );
        config.logging.level = "warn".to_string();

        config.source.interval = Duration::ZERO;
        assert_eq!(config.validate(), Err(CollectorConfigError::ZeroInterval));
        config.source.interval = Duration::from_millis(10);

        config.engine.history = 0;
        assert_eq!(
            config.validate(),
            Err(CollectorConfigError::Engine(ConfigError::ZeroCapacity))
        );
    }
}
