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

use crate::{config::CollectorConfig, output::ImageWriter};
use futures::StreamExt;
use std::{future::Future, pin::pin};
use tracing::{error, info};
use tripstream_analytics::{
    batch::ColumnarBatch,
    engine::StreamEngine,
    report::{Report, ReportRow},
    stream::{EngineStreamExt, Emissions},
};

pub mod config;
pub mod output;
pub mod source;

fn log_emissions(seq: u64, emissions: &Emissions) {
    for (name, emission) in emissions {
        let row = ReportRow::from(emission);
        match row.value {
            Some(value) => info!("[{seq}] {name} {}: {value:.2}", row.label),
            None => info!("[{seq}] {name} {}: raster", row.label),
        }
    }
}

/// Replays the configured source through the engine until the source is
/// exhausted or `shutdown` completes.
///
/// Returns the engine so that its history can be inspected; the history of
/// every aggregator is also logged as a table before returning.
pub async fn run<F>(config: CollectorConfig, shutdown: F) -> anyhow::Result<StreamEngine<ColumnarBatch>>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let mut engine = StreamEngine::<ColumnarBatch>::try_from(&config.engine)?;
    info!(
        "Registered aggregators: {}",
        engine.names().collect::<Vec<_>>().join(", ")
    );

    let source_config = config.source.clone();
    let columns = config.engine.columns();
    let batches =
        tokio::task::spawn_blocking(move || source::load_batches(&source_config, &columns))
            .await??;
    info!(
        "Loaded {} {} batches from {}",
        batches.len(),
        config.source.frequency,
        config.source.path.display()
    );

    let images = match &config.output.images {
        Some(dir) => Some(ImageWriter::new(dir, &config.output).await?),
        None => None,
    };

    {
        let mut aggregated = pin!(source::paced(
            batches,
            config.source.interval,
            config.source.cycle
        )
        .aggregate(&mut engine));
        let mut shutdown = pin!(shutdown);
        let mut seq = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested after {seq} batches");
                    break;
                }
                next = aggregated.next() => match next {
                    Some(Ok(emissions)) => {
                        log_emissions(seq, &emissions);
                        if let Some(images) = &images {
                            for (name, emission) in &emissions {
                                if let Some(window) = emission.as_window() {
                                    images.write(name, seq, window).await?;
                                }
                            }
                        }
                        seq += 1;
                    }
                    Some(Err(err)) => {
                        error!("Aggregation failed at batch {seq}: {err}");
                        return Err(err.into());
                    }
                    None => {
                        info!("Source exhausted after {seq} batches");
                        break;
                    }
                }
            }
        }
    }

    for name in engine.names() {
        let history = engine.history(name).unwrap_or_default();
        info!("\n{}", Report::from_history(name, &history).to_table());
    }
    Ok(engine)
}
