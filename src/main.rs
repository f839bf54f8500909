// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thin binary entrypoint: load config, init tracing, run migrations,
//! wire `Services`, idle. No listening socket — the HTTP router that
//! would expose the four controllers is out of scope.

use anyhow::Context;
use migration_agent::bootstrap::Services;
use migration_agent::config::{make_config_loader, DbConfig, TracingFormat};
use migration_agent::safe_display::SafeDisplay;
use migration_agent::vcenter::UnconfiguredVCenterClient;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = make_config_loader()
        .load()
        .context("loading migration-agent configuration")?;

    init_tracing(&config.tracing);
    info!(config = %config.to_safe_string(), "starting migration-agent");

    let DbConfig::Sqlite(sqlite_config) = &config.db;
    let db = migration_agent::store::Db::connect(sqlite_config)
        .await
        .context("connecting to the embedded database")?;
    db.migrate().await.context("running database migrations")?;

    // The concrete vCenter client library is out of scope; deployments
    // wire in their own `VCenterClient` by replacing this.
    let vcenter = Arc::new(UnconfiguredVCenterClient);

    let services = Services::new(&config, db, vcenter)
        .await
        .context("wiring services")?;

    info!(
        collector_state = ?services.collector.get_status().state,
        inspector_state = ?services.inspector.get_status().state,
        console_status = ?services.console.status(),
        "migration-agent is running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping migration-agent");

    services.collector.stop().await;
    let _ = services.inspector.stop().await;
    services.scheduler.close().await;

    Ok(())
}

fn init_tracing(config: &migration_agent::config::TracingConfig) {
    let env_filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    match config.format {
        TracingFormat::Pretty => subscriber.pretty().init(),
        TracingFormat::Json => subscriber.json().init(),
    }
}
