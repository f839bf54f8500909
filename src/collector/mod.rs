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

//! The collector controller (spec.md §4.C): a sequenced connect → collect
//! → parse pipeline with single-run discipline and a clean stop path.

pub mod work_builder;

use crate::collector::work_builder::WorkBuilder;
use crate::error::AgentError;
use crate::model::collector::{CollectorState, CollectorStatus};
use crate::model::credentials::Credentials;
use crate::scheduler::Scheduler;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct RunHandle {
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns its own status mutex and the handle of whatever run is
/// currently in flight, per spec.md §5 ("each controller has one mutex
/// protecting its mutable status struct and context-cancel handles").
pub struct CollectorController {
    status: Arc<std::sync::Mutex<CollectorStatus>>,
    run: AsyncMutex<Option<RunHandle>>,
    scheduler: Arc<Scheduler>,
    builder: Arc<dyn WorkBuilder>,
}

impl CollectorController {
    pub fn new(scheduler: Arc<Scheduler>, builder: Arc<dyn WorkBuilder>) -> Self {
        Self {
            status: Arc::new(std::sync::Mutex::new(CollectorStatus::ready())),
            run: AsyncMutex::new(None),
            scheduler,
            builder,
        }
    }

    pub fn get_status(&self) -> CollectorStatus {
        self.status.lock().expect("collector status mutex poisoned").clone()
    }

    /// Permitted only while the controller is restartable
    /// (spec.md §4.C); otherwise fails with `CollectionInProgress`.
    pub async fn start(&self, credentials: Credentials) -> Result<(), AgentError> {
        let mut run = self.run.lock().await;
        {
            let status = self.status.lock().expect("collector status mutex poisoned");
            if status.state.is_busy() {
                return Err(AgentError::CollectionInProgress);
            }
        }

        let cancellation = CancellationToken::new();
        self.set_state(CollectorState::Connecting);

        let status = self.status.clone();
        let scheduler = self.scheduler.clone();
        let builder = self.builder.clone();
        let run_cancellation = cancellation.clone();

        let task = tokio::spawn(async move {
            run_pipeline(status, scheduler, builder, credentials, run_cancellation).await;
        });

        *run = Some(RunHandle { cancellation, task });
        Ok(())
    }

    /// No-op from the idle states; otherwise cancels the in-flight run
    /// and blocks until it has unwound back to `Ready`.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(handle) = run.take() else {
            return;
        };
        handle.cancellation.cancel();
        if let Err(err) = handle.task.await {
            warn!(error = %err, "collector run task panicked during stop");
        }
        self.set_state(CollectorState::Ready);
    }

    fn set_state(&self, state: CollectorState) {
        let mut status = self.status.lock().expect("collector status mutex poisoned");
        *status = CollectorStatus::with_state(state);
    }
}

async fn run_pipeline(
    status: Arc<std::sync::Mutex<CollectorStatus>>,
    scheduler: Arc<Scheduler>,
    builder: Arc<dyn WorkBuilder>,
    credentials: Credentials,
    cancellation: CancellationToken,
) {
    let units = builder.build(credentials).await;

    for unit in units {
        {
            let mut guard = status.lock().expect("collector status mutex poisoned");
            *guard = CollectorStatus::with_state(unit.state);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let run_cancellation = cancellation.clone();
        let submitted = scheduler
            .submit(Box::pin(async move {
                let result = (unit.run)(run_cancellation).await;
                let _ = tx.send(result);
            }))
            .await;

        if submitted.is_err() {
            let mut guard = status.lock().expect("collector status mutex poisoned");
            *guard = CollectorStatus::with_error("scheduler closed");
            return;
        }

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                info!("collector run canceled");
                return;
            }
            result = rx => {
                match result {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => {
                        let mut guard = status.lock().expect("collector status mutex poisoned");
                        *guard = CollectorStatus::with_error(err);
                        return;
                    }
                    Err(_) => {
                        let mut guard = status.lock().expect("collector status mutex poisoned");
                        *guard = CollectorStatus::with_error("work unit dropped without a result");
                        return;
                    }
                }
            }
        }
    }

    let mut guard = status.lock().expect("collector status mutex poisoned");
    *guard = CollectorStatus::with_state(CollectorState::Collected);
}
