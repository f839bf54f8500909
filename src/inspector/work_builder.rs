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

//! The collaborator that turns a VM id into the five-step inspection
//! pipeline (spec.md §4.D): validate privileges, create snapshot,
//! inspect, save results, remove snapshot.

use crate::model::vm::VmDetail;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A per-VM work error (spec.md §7): marks only that VM's row, never
/// the whole run.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct WorkError(pub String);

pub struct InspectionUnit {
    pub run: Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send>>
            + Send,
    >,
}

impl InspectionUnit {
    pub fn new<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        Self {
            run: Box::new(move |token| Box::pin(run(token))),
        }
    }
}

/// Where an inspected `VmDetail` goes once the `inspect` unit has it.
/// The out-of-scope inventory-ingestion collaborator (spec.md §1) is
/// the production implementer; this is the seam the save unit calls
/// through rather than dropping the detail after a debug log.
#[async_trait]
pub trait InspectionResultSink: Send + Sync {
    async fn save(&self, vm_id: &str, detail: VmDetail) -> Result<(), String>;
}

/// A placeholder sink for deployments that have not wired in a real
/// ingestion collaborator. `save` always succeeds after logging, so the
/// pipeline's save boundary is explicit rather than a disguised no-op —
/// mirrors `vcenter::UnconfiguredVCenterClient`'s placeholder shape.
pub struct DiscardingResultSink;

#[async_trait]
impl InspectionResultSink for DiscardingResultSink {
    async fn save(&self, vm_id: &str, detail: VmDetail) -> Result<(), String> {
        debug!(vm_id = %vm_id, name = %detail.name, "no inspection result sink configured, discarding detail");
        Ok(())
    }
}

#[async_trait]
pub trait InspectorWorkBuilder: Send + Sync {
    /// Builds the ordered per-VM pipeline: validate, create snapshot,
    /// inspect, save, remove snapshot, in that order (spec.md §4.D).
    /// An implementer may vary the unit set as long as ordering and
    /// cancellation semantics are preserved. `session` is the single
    /// vCenter session the Inspector holds for the whole run (spec.md
    /// §5); the builder never opens or closes it.
    async fn build(
        &self,
        vm_id: &str,
        session: std::sync::Arc<dyn crate::vcenter::VCenterSession>,
    ) -> Vec<InspectionUnit>;
}

/// The production per-VM pipeline, built against the session the
/// Inspector already holds: validate privileges, create a snapshot,
/// inspect the snapshot, save the result, remove the snapshot. Mirrors
/// `crate::collector::work_builder::VCenterWorkBuilder`'s use of a
/// shared slot to carry state between units. Projecting the inspected
/// `VmDetail` into the `vm_info`/`vm_disk`/`vm_nic`/`vm_issue` tables is
/// the same out-of-scope inventory-ingestion collaborator the Collector
/// hands its raw payload to (spec.md §1); `VmRepo` exposed by this
/// core is read-only, so the save unit's only job here is to hand the
/// detail across that boundary.
pub struct VCenterInspectorWorkBuilder {
    sink: Arc<dyn InspectionResultSink>,
}

impl VCenterInspectorWorkBuilder {
    pub fn new(sink: Arc<dyn InspectionResultSink>) -> Self {
        Self { sink }
    }
}

impl Default for VCenterInspectorWorkBuilder {
    fn default() -> Self {
        Self::new(Arc::new(DiscardingResultSink))
    }
}

#[async_trait]
impl InspectorWorkBuilder for VCenterInspectorWorkBuilder {
    async fn build(
        &self,
        vm_id: &str,
        session: std::sync::Arc<dyn crate::vcenter::VCenterSession>,
    ) -> Vec<InspectionUnit> {
        let snapshot_slot: std::sync::Arc<tokio::sync::Mutex<Option<String>>> =
            std::sync::Arc::new(tokio::sync::Mutex::new(None));

        let vm = vm_id.to_string();
        let validate_session = session.clone();
        let validate = InspectionUnit::new(move |_cancellation| {
            let session = validate_session.clone();
            let vm_id = vm.clone();
            async move {
                session
                    .validate_privileges(&vm_id)
                    .await
                    .map_err(WorkError)
            }
        });

        let vm = vm_id.to_string();
        let snapshot_session = session.clone();
        let snapshot_out = snapshot_slot.clone();
        let snapshot = InspectionUnit::new(move |_cancellation| {
            let session = snapshot_session.clone();
            let vm_id = vm.clone();
            let out = snapshot_out.clone();
            async move {
                let snapshot_id = session.create_snapshot(&vm_id).await.map_err(WorkError)?;
                *out.lock().await = Some(snapshot_id);
                Ok(())
            }
        });

        let detail_slot: std::sync::Arc<tokio::sync::Mutex<Option<VmDetail>>> =
            std::sync::Arc::new(tokio::sync::Mutex::new(None));

        let vm = vm_id.to_string();
        let inspect_session = session.clone();
        let detail_out = detail_slot.clone();
        let inspect = InspectionUnit::new(move |_cancellation| {
            let session = inspect_session.clone();
            let vm_id = vm.clone();
            let out = detail_out.clone();
            async move {
                let detail = session.inspect_vm(&vm_id).await.map_err(WorkError)?;
                debug!(vm_id = %vm_id, name = %detail.name, "inspected vm, handing detail to save unit");
                *out.lock().await = Some(detail);
                Ok(())
            }
        });

        let vm = vm_id.to_string();
        let detail_in = detail_slot.clone();
        let sink = self.sink.clone();
        let save = InspectionUnit::new(move |_cancellation| {
            let vm_id = vm.clone();
            let slot = detail_in.clone();
            let sink = sink.clone();
            async move {
                if let Some(detail) = slot.lock().await.take() {
                    sink.save(&vm_id, detail).await.map_err(WorkError)?;
                }
                Ok(())
            }
        });

        let vm = vm_id.to_string();
        let remove_session = session.clone();
        let remove_slot = snapshot_slot.clone();
        let remove = InspectionUnit::new(move |_cancellation| {
            let session = remove_session.clone();
            let vm_id = vm.clone();
            let slot = remove_slot.clone();
            async move {
                if let Some(snapshot_id) = slot.lock().await.take() {
                    session
                        .remove_snapshot(&vm_id, &snapshot_id)
                        .await
                        .map_err(WorkError)?;
                }
                Ok(())
            }
        });

        vec![validate, snapshot, inspect, save, remove]
    }
}
