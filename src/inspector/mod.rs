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

//! The inspector controller (spec.md §4.D): a persisted per-VM queue,
//! drained serially, with per-VM and whole-job cancellation.

pub mod work_builder;

use crate::error::AgentError;
use crate::inspector::work_builder::InspectorWorkBuilder;
use crate::model::credentials::Credentials;
use crate::model::inspection::{InspectionRow, InspectionState, InspectorState, InspectorStatus};
use crate::scheduler::Scheduler;
use crate::store::inspection::InspectionRepo;
use crate::vcenter::{VCenterClient, VCenterSession};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct RunHandle {
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

pub struct InspectorController {
    status: Arc<std::sync::Mutex<InspectorStatus>>,
    run: AsyncMutex<Option<RunHandle>>,
    scheduler: Arc<Scheduler>,
    builder: Arc<dyn InspectorWorkBuilder>,
    repo: Arc<dyn InspectionRepo>,
    vcenter: Arc<dyn VCenterClient>,
}

impl InspectorController {
    pub fn new(
        scheduler: Arc<Scheduler>,
        builder: Arc<dyn InspectorWorkBuilder>,
        repo: Arc<dyn InspectionRepo>,
        vcenter: Arc<dyn VCenterClient>,
    ) -> Self {
        Self {
            status: Arc::new(std::sync::Mutex::new(InspectorStatus::ready())),
            run: AsyncMutex::new(None),
            scheduler,
            builder,
            repo,
            vcenter,
        }
    }

    pub fn get_status(&self) -> InspectorStatus {
        self.status.lock().expect("inspector status mutex poisoned").clone()
    }

    pub async fn get_vm_status(&self, vm_id: &str) -> Result<InspectionRow, AgentError> {
        self.repo.get(vm_id).await.map_err(AgentError::from)
    }

    fn set_state(&self, state: InspectorState) {
        let mut status = self.status.lock().expect("inspector status mutex poisoned");
        *status = InspectorStatus::with_state(state);
    }

    /// Fails with `InspectorInProgress` if busy (spec.md §4.D).
    pub async fn start(
        &self,
        vm_ids: Vec<String>,
        credentials: Credentials,
    ) -> Result<(), AgentError> {
        let mut run = self.run.lock().await;
        {
            let status = self.status.lock().expect("inspector status mutex poisoned");
            if status.state.is_busy() {
                return Err(AgentError::InspectorInProgress);
            }
        }

        self.set_state(InspectorState::Initiating);

        let session = match self.vcenter.connect(credentials).await {
            Ok(session) => session,
            Err(err) => {
                let mut status = self.status.lock().expect("inspector status mutex poisoned");
                *status = InspectorStatus::with_error(err);
                return Ok(());
            }
        };
        let session: Arc<dyn VCenterSession> = Arc::from(session);

        self.repo.delete_all().await.map_err(AgentError::from)?;
        self.repo.add(&vm_ids).await.map_err(AgentError::from)?;

        self.set_state(InspectorState::Running);

        let cancellation = CancellationToken::new();
        let status = self.status.clone();
        let scheduler = self.scheduler.clone();
        let builder = self.builder.clone();
        let repo = self.repo.clone();
        let run_cancellation = cancellation.clone();
        let drain_session = session.clone();

        let task = tokio::spawn(async move {
            drain_loop(status, scheduler, builder, repo, drain_session, run_cancellation).await;
        });

        *run = Some(RunHandle { cancellation, task });
        Ok(())
    }

    /// Valid only while busy and not canceling; empty list is rejected
    /// (spec.md §4.D, §8 boundary behaviors).
    pub async fn add(&self, vm_ids: Vec<String>) -> Result<(), AgentError> {
        if vm_ids.is_empty() {
            return Err(AgentError::internal("Add requires at least one VM id"));
        }
        {
            let status = self.status.lock().expect("inspector status mutex poisoned");
            if status.state != InspectorState::Running {
                return Err(AgentError::InspectorNotRunning);
            }
        }
        self.repo.add(&vm_ids).await.map_err(AgentError::from)
    }

    /// Empty `vm_ids` cancels every row still `Pending`.
    pub async fn cancel_vms_inspection(&self, vm_ids: Vec<String>) -> Result<(), AgentError> {
        {
            let status = self.status.lock().expect("inspector status mutex poisoned");
            if !status.state.is_busy() {
                return Err(AgentError::InspectorNotRunning);
            }
        }

        let targets = if vm_ids.is_empty() {
            self.repo
                .list()
                .await
                .map_err(AgentError::from)?
                .into_values()
                .filter(|row| row.state == InspectionState::Pending)
                .map(|row| row.vm_id)
                .collect()
        } else {
            vm_ids
        };

        for vm_id in targets {
            let row = self.repo.get(&vm_id).await.map_err(AgentError::from)?;
            if row.state == InspectionState::Pending {
                self.repo
                    .update(&vm_id, InspectionState::Canceled, None)
                    .await
                    .map_err(AgentError::from)?;
            }
        }
        Ok(())
    }

    /// Valid only while busy: cancels all pending rows, then cancels the
    /// run context and waits for the drain loop to exit.
    pub async fn stop(&self) -> Result<(), AgentError> {
        let mut run = self.run.lock().await;
        let Some(handle) = run.take() else {
            return Err(AgentError::InspectorNotRunning);
        };

        self.set_state(InspectorState::Canceling);
        let _ = self.cancel_vms_inspection(Vec::new()).await;

        handle.cancellation.cancel();
        if let Err(err) = handle.task.await {
            warn!(error = %err, "inspector run task panicked during stop");
        }
        self.set_state(InspectorState::Canceled);
        Ok(())
    }
}

enum DrainOutcome {
    Completed,
    Canceled,
    Error(String),
}

/// Drives the queue to exhaustion or cancellation, then always closes
/// the vCenter session as its last act — regardless of which exit path
/// was taken, so callers never have to reason about leaked sessions
/// (spec.md §5: session teardown decoupled from the run context).
async fn drain_loop(
    status: Arc<std::sync::Mutex<InspectorStatus>>,
    scheduler: Arc<Scheduler>,
    builder: Arc<dyn InspectorWorkBuilder>,
    repo: Arc<dyn InspectionRepo>,
    session: Arc<dyn VCenterSession>,
    cancellation: CancellationToken,
) {
    let outcome = drain(&status, &scheduler, &builder, &repo, &session, &cancellation).await;
    session.close().await;

    let mut guard = status.lock().expect("inspector status mutex poisoned");
    match outcome {
        DrainOutcome::Completed if guard.state == InspectorState::Running => {
            *guard = InspectorStatus::with_state(InspectorState::Completed);
        }
        DrainOutcome::Error(err) => {
            *guard = InspectorStatus::with_error(err);
        }
        _ => {}
    }
}

async fn drain(
    _status: &Arc<std::sync::Mutex<InspectorStatus>>,
    scheduler: &Arc<Scheduler>,
    builder: &Arc<dyn InspectorWorkBuilder>,
    repo: &Arc<dyn InspectionRepo>,
    session: &Arc<dyn VCenterSession>,
    cancellation: &CancellationToken,
) -> DrainOutcome {
    loop {
        if cancellation.is_cancelled() {
            return DrainOutcome::Canceled;
        }

        let next = match repo.first_pending().await {
            Ok(next) => next,
            Err(err) => return DrainOutcome::Error(err.to_string()),
        };

        let Some(row) = next else {
            return DrainOutcome::Completed;
        };

        if let Err(err) = repo.update(&row.vm_id, InspectionState::Running, None).await {
            return DrainOutcome::Error(err.to_string());
        }

        let units = builder.build(&row.vm_id, session.clone()).await;
        let mut per_vm_error = None;
        let mut run_canceled = false;

        for unit in units {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let run_cancellation = cancellation.clone();
            let submitted = scheduler
                .submit(Box::pin(async move {
                    let result = (unit.run)(run_cancellation).await;
                    let _ = tx.send(result);
                }))
                .await;

            if submitted.is_err() {
                return DrainOutcome::Error("scheduler closed".to_string());
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!(vm_id = %row.vm_id, "inspector run canceled mid-unit");
                    run_canceled = true;
                    break;
                }
                result = rx => {
                    match result {
                        Ok(Ok(())) => continue,
                        Ok(Err(err)) => {
                            per_vm_error = Some(err.0);
                            break;
                        }
                        Err(_) => {
                            per_vm_error = Some("work unit dropped without a result".to_string());
                            break;
                        }
                    }
                }
            }
        }

        if run_canceled {
            return DrainOutcome::Canceled;
        }

        let outcome = match per_vm_error {
            Some(err) => repo.update(&row.vm_id, InspectionState::Error, Some(&err)).await,
            None => repo.update(&row.vm_id, InspectionState::Completed, None).await,
        };
        if let Err(err) = outcome {
            return DrainOutcome::Error(err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::work_builder::{InspectionUnit, WorkError};
    use crate::model::vm::VmDetail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as SyncMutex;
    use test_r::test;

    struct InMemoryInspectionRepo {
        rows: SyncMutex<HashMap<String, InspectionRow>>,
        next_sequence: AtomicI64,
    }

    impl InMemoryInspectionRepo {
        fn new() -> Self {
            Self {
                rows: SyncMutex::new(HashMap::new()),
                next_sequence: AtomicI64::new(0),
            }
        }
    }

    #[async_trait]
    impl InspectionRepo for InMemoryInspectionRepo {
        async fn add(&self, vm_ids: &[String]) -> Result<(), crate::store::error::RepoError> {
            let mut rows = self.rows.lock().unwrap();
            for vm_id in vm_ids {
                if rows.contains_key(vm_id) {
                    continue;
                }
                let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
                rows.insert(vm_id.clone(), InspectionRow::pending(vm_id.clone(), sequence));
            }
            Ok(())
        }

        async fn get(&self, vm_id: &str) -> Result<InspectionRow, crate::store::error::RepoError> {
            self.rows
                .lock()
                .unwrap()
                .get(vm_id)
                .cloned()
                .ok_or_else(|| crate::store::error::RepoError::not_found(vm_id.to_string()))
        }

        async fn list(&self) -> Result<HashMap<String, InspectionRow>, crate::store::error::RepoError> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn first_pending(
            &self,
        ) -> Result<Option<InspectionRow>, crate::store::error::RepoError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|row| row.state == InspectionState::Pending)
                .min_by_key(|row| row.sequence)
                .cloned())
        }

        async fn update(
            &self,
            vm_id: &str,
            state: InspectionState,
            error: Option<&str>,
        ) -> Result<(), crate::store::error::RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(vm_id)
                .ok_or_else(|| crate::store::error::RepoError::not_found(vm_id.to_string()))?;
            row.state = state;
            row.error = error.map(|e| e.to_string());
            Ok(())
        }

        async fn delete_all(&self) -> Result<(), crate::store::error::RepoError> {
            self.rows.lock().unwrap().clear();
            Ok(())
        }
    }

    struct TestSession;

    #[async_trait]
    impl VCenterSession for TestSession {
        async fn collect_raw_inventory(&self) -> Result<Vec<u8>, String> {
            Ok(Vec::new())
        }

        async fn create_snapshot(&self, _vm_id: &str) -> Result<String, String> {
            Ok("snap".to_string())
        }

        async fn remove_snapshot(&self, _vm_id: &str, _snapshot_id: &str) -> Result<(), String> {
            Ok(())
        }

        async fn inspect_vm(&self, vm_id: &str) -> Result<VmDetail, String> {
            Ok(VmDetail {
                id: vm_id.to_string(),
                name: vm_id.to_string(),
                uuid: None,
                firmware: None,
                power_state: "poweredOn".to_string(),
                connection_state: "connected".to_string(),
                host: None,
                datacenter: None,
                cluster: Some("cluster-0".to_string()),
                folder: None,
                cpu_count: 1,
                cores_per_socket: 1,
                memory_mb: 1024,
                guest_name: None,
                guest_id: None,
                host_name: None,
                ip_address: None,
                storage_used: None,
                tools_status: None,
                tools_running_status: None,
                is_template: false,
                fault_tolerance_enabled: false,
                nested_hv_enabled: false,
                disks: Vec::new(),
                nics: Vec::new(),
                issues: Vec::new(),
            })
        }

        async fn validate_privileges(&self, _vm_id: &str) -> Result<(), String> {
            Ok(())
        }

        async fn close(&self) {}
    }

    struct TestVCenterClient;

    #[async_trait]
    impl VCenterClient for TestVCenterClient {
        async fn connect(
            &self,
            _credentials: Credentials,
        ) -> Result<Box<dyn VCenterSession>, String> {
            Ok(Box::new(TestSession))
        }
    }

    enum Script {
        Ok,
        Slow(std::time::Duration),
        Fail,
    }

    /// Scripts each VM's single-unit pipeline by id so tests can drive
    /// failure and timing deterministically instead of the production
    /// five-step pipeline.
    struct ScriptedBuilder {
        scripts: HashMap<String, Script>,
    }

    #[async_trait]
    impl InspectorWorkBuilder for ScriptedBuilder {
        async fn build(
            &self,
            vm_id: &str,
            _session: Arc<dyn VCenterSession>,
        ) -> Vec<InspectionUnit> {
            let script = match self.scripts.get(vm_id) {
                Some(Script::Fail) => Script::Fail,
                Some(Script::Slow(d)) => Script::Slow(*d),
                _ => Script::Ok,
            };
            vec![InspectionUnit::new(move |_cancellation| async move {
                match script {
                    Script::Ok => Ok(()),
                    Script::Slow(d) => {
                        tokio::time::sleep(d).await;
                        Ok(())
                    }
                    Script::Fail => Err(WorkError("inspection failed".to_string())),
                }
            })]
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("https://vc.example.com", "u", "p").unwrap()
    }

    async fn wait_for_completion(controller: &InspectorController) {
        for _ in 0..200 {
            let state = controller.get_status().state;
            if matches!(
                state,
                InspectorState::Completed | InspectorState::Error | InspectorState::Canceled
            ) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("inspector run did not reach a terminal state in time");
    }

    #[test]
    async fn per_vm_failure_does_not_abort_the_run() {
        let scheduler = Arc::new(Scheduler::new(2, 8));
        let repo = Arc::new(InMemoryInspectionRepo::new());
        let mut scripts = HashMap::new();
        scripts.insert("vm-a".to_string(), Script::Fail);
        let builder = Arc::new(ScriptedBuilder { scripts });
        let controller = InspectorController::new(
            scheduler,
            builder,
            repo.clone(),
            Arc::new(TestVCenterClient),
        );

        controller
            .start(vec!["vm-a".to_string(), "vm-b".to_string()], credentials())
            .await
            .unwrap();
        wait_for_completion(&controller).await;

        assert_eq!(controller.get_status().state, InspectorState::Completed);
        let vm_a = repo.get("vm-a").await.unwrap();
        assert_eq!(vm_a.state, InspectionState::Error);
        assert!(vm_a.error.is_some());
        let vm_b = repo.get("vm-b").await.unwrap();
        assert_eq!(vm_b.state, InspectionState::Completed);
    }

    #[test]
    async fn canceling_one_pending_vm_lets_the_rest_complete() {
        let scheduler = Arc::new(Scheduler::new(2, 8));
        let repo = Arc::new(InMemoryInspectionRepo::new());
        let mut scripts = HashMap::new();
        scripts.insert(
            "vm-a".to_string(),
            Script::Slow(std::time::Duration::from_millis(150)),
        );
        let builder = Arc::new(ScriptedBuilder { scripts });
        let controller = InspectorController::new(
            scheduler,
            builder,
            repo.clone(),
            Arc::new(TestVCenterClient),
        );

        controller
            .start(
                vec!["vm-a".to_string(), "vm-b".to_string(), "vm-c".to_string()],
                credentials(),
            )
            .await
            .unwrap();

        // vm-a is slow, so while it is running vm-b and vm-c are still
        // Pending; cancel only vm-c and let the rest of the run finish.
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        controller
            .cancel_vms_inspection(vec!["vm-c".to_string()])
            .await
            .unwrap();
        wait_for_completion(&controller).await;

        assert_eq!(controller.get_status().state, InspectorState::Completed);
        assert_eq!(repo.get("vm-a").await.unwrap().state, InspectionState::Completed);
        assert_eq!(repo.get("vm-b").await.unwrap().state, InspectionState::Completed);
        assert_eq!(repo.get("vm-c").await.unwrap().state, InspectionState::Canceled);
    }

    #[test]
    async fn start_while_busy_is_rejected() {
        let scheduler = Arc::new(Scheduler::new(1, 8));
        let repo = Arc::new(InMemoryInspectionRepo::new());
        let mut scripts = HashMap::new();
        scripts.insert(
            "vm-a".to_string(),
            Script::Slow(std::time::Duration::from_millis(200)),
        );
        let builder = Arc::new(ScriptedBuilder { scripts });
        let controller = InspectorController::new(
            scheduler,
            builder,
            repo,
            Arc::new(TestVCenterClient),
        );

        controller
            .start(vec!["vm-a".to_string()], credentials())
            .await
            .unwrap();
        let second = controller.start(vec!["vm-a".to_string()], credentials()).await;
        assert!(matches!(second, Err(AgentError::InspectorInProgress)));
    }

    #[test]
    async fn stop_cancels_remaining_pending_vms() {
        let scheduler = Arc::new(Scheduler::new(1, 8));
        let repo = Arc::new(InMemoryInspectionRepo::new());
        let mut scripts = HashMap::new();
        scripts.insert(
            "vm-a".to_string(),
            Script::Slow(std::time::Duration::from_millis(200)),
        );
        let builder = Arc::new(ScriptedBuilder { scripts });
        let controller = InspectorController::new(
            scheduler,
            builder,
            repo.clone(),
            Arc::new(TestVCenterClient),
        );

        controller
            .start(vec!["vm-a".to_string(), "vm-b".to_string()], credentials())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        controller.stop().await.unwrap();

        assert_eq!(controller.get_status().state, InspectorState::Canceled);
        assert_eq!(repo.get("vm-b").await.unwrap().state, InspectionState::Canceled);
    }
}
