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

//! The Console reporter (spec.md §4.E): a ticking control loop that
//! pushes status and (change-detected) inventory, persists mode intent,
//! and distinguishes transient errors (retry with backoff) from fatal
//! ones (terminate the loop for the rest of the process lifetime).

pub mod client;

use crate::collector::CollectorController;
use crate::config::{ConsoleConfig, RetryConfig};
use crate::console::client::{AgentStatusPush, ConsoleClient, ConsoleClientError, SourceInventoryPush};
use crate::error::AgentError;
use crate::model::collector::CollectorState;
use crate::model::configuration::{AgentMode, Configuration};
use crate::model::console::ConsoleStatus;
use crate::model::inventory::ContentHash;
use crate::retry::Backoff;
use crate::scheduler::Scheduler;
use crate::store::configuration::ConfigurationRepo;
use crate::store::inventory::InventoryRepo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct RunHandle {
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConsoleReporter {
    status: Arc<Mutex<ConsoleStatus>>,
    run: AsyncMutex<Option<RunHandle>>,
    /// Set once, by a fatal error, and never cleared: restarting the
    /// process is the only way out (spec.md §4.E).
    fatal: Arc<AtomicBool>,
    config_repo: Arc<dyn ConfigurationRepo>,
    inventory_repo: Arc<dyn InventoryRepo>,
    client: Arc<dyn ConsoleClient>,
    collector: Arc<CollectorController>,
    scheduler: Arc<Scheduler>,
    update_interval: Duration,
    retry_config: RetryConfig,
    agent_id: String,
    source_id: String,
    version: String,
}

impl ConsoleReporter {
    /// Reads `Configuration` and, if it says `Connected`, starts the run
    /// loop immediately (spec.md §4.E: "On construction, the reporter
    /// reads Configuration; if Connected, it starts its run loop
    /// immediately").
    pub async fn new(
        config: &ConsoleConfig,
        config_repo: Arc<dyn ConfigurationRepo>,
        inventory_repo: Arc<dyn InventoryRepo>,
        client: Arc<dyn ConsoleClient>,
        collector: Arc<CollectorController>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self, AgentError> {
        let agent_mode = config_repo
            .get()
            .await
            .map_err(AgentError::from)?
            .map(|c| c.agent_mode)
            .unwrap_or(AgentMode::Disconnected);

        let reporter = Self {
            status: Arc::new(Mutex::new(ConsoleStatus::settled(AgentMode::Disconnected))),
            run: AsyncMutex::new(None),
            fatal: Arc::new(AtomicBool::new(false)),
            config_repo,
            inventory_repo,
            client,
            collector,
            scheduler,
            update_interval: config.update_interval,
            retry_config: config.retries.clone(),
            agent_id: config.agent_id.clone(),
            source_id: config.source_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        if agent_mode == AgentMode::Connected {
            reporter.spawn_loop(AgentMode::Connected).await;
        }

        Ok(reporter)
    }

    pub fn status(&self) -> ConsoleStatus {
        self.status.lock().expect("console status mutex poisoned").clone()
    }

    /// No-op if `new == target`. Fails with `ModeConflict` once the
    /// reporter has fatally terminated (spec.md §4.E). Safe to call
    /// from any thread.
    pub async fn set_mode(&self, new: AgentMode) -> Result<(), AgentError> {
        {
            let status = self.status.lock().expect("console status mutex poisoned");
            if status.target == new {
                return Ok(());
            }
        }
        if self.fatal.load(Ordering::SeqCst) {
            return Err(AgentError::ModeConflict);
        }

        self.config_repo
            .upsert(&Configuration { agent_mode: new })
            .await
            .map_err(AgentError::from)?;

        {
            let mut status = self.status.lock().expect("console status mutex poisoned");
            status.target = new;
        }

        match new {
            AgentMode::Connected => self.spawn_loop(new).await,
            AgentMode::Disconnected => self.stop_loop().await,
        }
        Ok(())
    }

    async fn spawn_loop(&self, mode: AgentMode) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return;
        }

        let cancellation = CancellationToken::new();
        let status = self.status.clone();
        let fatal = self.fatal.clone();
        let client = self.client.clone();
        let collector = self.collector.clone();
        let inventory_repo = self.inventory_repo.clone();
        let scheduler = self.scheduler.clone();
        let update_interval = self.update_interval;
        let retry_config = self.retry_config.clone();
        let agent_id = self.agent_id.clone();
        let source_id = self.source_id.clone();
        let version = self.version.clone();
        let loop_cancellation = cancellation.clone();

        {
            let mut guard = status.lock().expect("console status mutex poisoned");
            guard.target = mode;
        }

        let task = tokio::spawn(async move {
            run_loop(
                status,
                fatal,
                client,
                collector,
                inventory_repo,
                scheduler,
                update_interval,
                retry_config,
                agent_id,
                source_id,
                version,
                loop_cancellation,
            )
            .await;
        });

        *run = Some(RunHandle { cancellation, task });
    }

    async fn stop_loop(&self) {
        let mut run = self.run.lock().await;
        let Some(handle) = run.take() else {
            return;
        };
        handle.cancellation.cancel();
        if let Err(err) = handle.task.await {
            warn!(error = %err, "console reporter loop task panicked during stop");
        }
        let mut guard = self.status.lock().expect("console status mutex poisoned");
        guard.current = AgentMode::Disconnected;
    }
}

fn set_error(status: &Arc<Mutex<ConsoleStatus>>, error: impl Into<String>) {
    let mut guard = status.lock().expect("console status mutex poisoned");
    guard.error = Some(error.into());
}

fn clear_error_and_settle(status: &Arc<Mutex<ConsoleStatus>>, mode: AgentMode) {
    let mut guard = status.lock().expect("console status mutex poisoned");
    guard.error = None;
    guard.current = mode;
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    status: Arc<Mutex<ConsoleStatus>>,
    fatal: Arc<AtomicBool>,
    client: Arc<dyn ConsoleClient>,
    collector: Arc<CollectorController>,
    inventory_repo: Arc<dyn InventoryRepo>,
    scheduler: Arc<Scheduler>,
    update_interval: Duration,
    retry_config: RetryConfig,
    agent_id: String,
    source_id: String,
    version: String,
    cancellation: CancellationToken,
) {
    let mut backoff = Backoff::new(retry_config);
    let mut last_hash: Option<ContentHash> = None;
    let mut ticker = tokio::time::interval(update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        if backoff.is_in_backoff(now) {
            continue;
        }

        let status_result = match push_status(&client, &scheduler, &agent_id, &source_id, &version, &cancellation).await {
            Some(result) => result,
            None => return,
        };

        match status_result {
            Ok(()) => {
                clear_error_and_settle(&status, AgentMode::Connected);
                backoff.reset();
            }
            Err(ConsoleClientError::Unauthorized) => {
                set_error(&status, ConsoleClientError::Unauthorized.to_string());
                fatal.store(true, Ordering::SeqCst);
                info!("console reporter terminating: agent unauthorized");
                return;
            }
            Err(ConsoleClientError::SourceGone) => {
                set_error(&status, ConsoleClientError::SourceGone.to_string());
                fatal.store(true, Ordering::SeqCst);
                info!("console reporter terminating: source gone");
                return;
            }
            Err(err) if err.is_transient() => {
                set_error(&status, err.to_string());
                backoff.record_failure(now);
                continue;
            }
            Err(err) => {
                // any other 4xx from the console is fatal per spec.md §7.
                set_error(&status, err.to_string());
                fatal.store(true, Ordering::SeqCst);
                warn!(error = %err, "console reporter terminating: client error");
                return;
            }
        }

        if cancellation.is_cancelled() {
            return;
        }

        if collector.get_status().state != CollectorState::Collected {
            continue;
        }

        let inventory = match inventory_repo.get().await {
            Ok(Some(inventory)) => inventory,
            Ok(None) => continue,
            Err(err) => {
                set_error(&status, err.to_string());
                continue;
            }
        };

        let hash = inventory.content_hash();
        if Some(hash) == last_hash {
            continue;
        }

        let push_result = match push_inventory(&client, &scheduler, &agent_id, inventory.data.clone(), &cancellation).await {
            Some(result) => result,
            None => return,
        };

        match push_result {
            Ok(()) => {
                last_hash = Some(hash);
                let mut guard = status.lock().expect("console status mutex poisoned");
                guard.error = None;
            }
            Err(ConsoleClientError::Unauthorized) | Err(ConsoleClientError::SourceGone) => {
                set_error(&status, "console rejected inventory push");
                fatal.store(true, Ordering::SeqCst);
                return;
            }
            Err(err) => {
                // inventory push failures never terminate the loop unless
                // fatal (spec.md §4.E): the next tick retries.
                set_error(&status, err.to_string());
            }
        }
    }
}

async fn push_status(
    client: &Arc<dyn ConsoleClient>,
    scheduler: &Arc<Scheduler>,
    agent_id: &str,
    source_id: &str,
    version: &str,
    cancellation: &CancellationToken,
) -> Option<Result<(), ConsoleClientError>> {
    let (tx, rx) = oneshot::channel();
    let client = client.clone();
    let agent_id = agent_id.to_string();
    let source_id = source_id.to_string();
    let version = version.to_string();

    let submitted = scheduler
        .submit(Box::pin(async move {
            let result = client
                .push_status(AgentStatusPush {
                    status: "connected",
                    status_info: None,
                    source_id: &source_id,
                    version: &version,
                    credential_url: None,
                })
                .await;
            let _ = (agent_id, tx.send(result));
        }))
        .await;

    if submitted.is_err() {
        return None;
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => None,
        result = rx => result.ok(),
    }
}

async fn push_inventory(
    client: &Arc<dyn ConsoleClient>,
    scheduler: &Arc<Scheduler>,
    agent_id: &str,
    data: Vec<u8>,
    cancellation: &CancellationToken,
) -> Option<Result<(), ConsoleClientError>> {
    let (tx, rx) = oneshot::channel();
    let client = client.clone();
    let agent_id = agent_id.to_string();

    let submitted = scheduler
        .submit(Box::pin(async move {
            let result = match serde_json::value::RawValue::from_string(
                String::from_utf8_lossy(&data).into_owned(),
            ) {
                Ok(raw) => {
                    client
                        .push_inventory(SourceInventoryPush {
                            agent_id: &agent_id,
                            inventory: raw.as_ref(),
                        })
                        .await
                }
                Err(err) => Err(ConsoleClientError::Client(format!("invalid inventory json: {err}"))),
            };
            let _ = tx.send(result);
        }))
        .await;

    if submitted.is_err() {
        return None;
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => None,
        result = rx => result.ok(),
    }
}
