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

use anyhow::Context;
use std::{env, path::PathBuf, str::FromStr};
use tracing::{error, info, Level};
use tripstream_collector::{config::CollectorConfig, run};

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::from_str(level)?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

async fn termination_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Termination signal received, stopping the replay"),
        Err(err) => {
            error!("Listening for the termination signal failed: {err}");
            std::future::pending::<()>().await;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        anyhow::bail!("Usage: {} <config-file>", args[0]);
    }
    let config_file = PathBuf::from(&args[1]);
    let config = CollectorConfig::load(&config_file).context("Parsing config file failed")?;
    init_tracing(&config.logging.level)?;
    info!("Loaded configuration from {}", config_file.display());

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    // If num threads is not configured then the default use all CPU cores is used
    if let Some(num_threads) = config.runtime.threads {
        runtime_builder.worker_threads(num_threads);
    }
    runtime_builder.enable_all();
    let runtime = runtime_builder.build()?;
    runtime.block_on(async move {
        let engine = run(config, termination_signal()).await?;
        info!("Aggregated {} batches, shutting down", engine.pushed());
        Ok(())
    })
}
