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

//! The collaborator that turns credentials into an ordered pipeline
//! (spec.md §4.C). Production code supplies an implementation backed by
//! the vCenter client; tests supply a scripted one.

use crate::model::collector::CollectorState;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A single step of the collector pipeline: the status it represents
/// while running, and the cancellable work itself.
pub struct WorkUnit {
    pub state: CollectorState,
    pub run: Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>>
            + Send,
    >,
}

impl WorkUnit {
    pub fn new<F, Fut>(state: CollectorState, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            state,
            run: Box::new(move |token| Box::pin(run(token))),
        }
    }
}

#[async_trait]
pub trait WorkBuilder: Send + Sync {
    /// Builds the ordered pipeline for a single collector run. Typically
    /// `[Connecting, Collecting, Parsing, Collected]`, in that order.
    async fn build(&self, credentials: crate::model::credentials::Credentials) -> Vec<WorkUnit>;
}

/// The production pipeline: open a session, pull the raw inventory
/// payload, persist it opaquely (spec.md §3: the core never interprets
/// `Inventory.data`, only hashes and stores it). The actual parsing of
/// that payload into the `vm_info`/`vm_disk`/`vm_nic`/`vm_issue`
/// projection tables is the out-of-scope inventory-ingestion
/// collaborator (spec.md §1) — this builder's `Parsing` unit only
/// covers what the core itself owns: the opaque upsert.
pub struct VCenterWorkBuilder {
    vcenter: std::sync::Arc<dyn crate::vcenter::VCenterClient>,
    inventory_repo: std::sync::Arc<dyn crate::store::inventory::InventoryRepo>,
}

impl VCenterWorkBuilder {
    pub fn new(
        vcenter: std::sync::Arc<dyn crate::vcenter::VCenterClient>,
        inventory_repo: std::sync::Arc<dyn crate::store::inventory::InventoryRepo>,
    ) -> Self {
        Self {
            vcenter,
            inventory_repo,
        }
    }
}

#[async_trait]
impl WorkBuilder for VCenterWorkBuilder {
    async fn build(&self, credentials: crate::model::credentials::Credentials) -> Vec<WorkUnit> {
        let slot: std::sync::Arc<tokio::sync::Mutex<Option<Box<dyn crate::vcenter::VCenterSession>>>> =
            std::sync::Arc::new(tokio::sync::Mutex::new(None));
        let raw: std::sync::Arc<tokio::sync::Mutex<Option<Vec<u8>>>> =
            std::sync::Arc::new(tokio::sync::Mutex::new(None));

        let vcenter = self.vcenter.clone();
        let connect_slot = slot.clone();
        let connecting = WorkUnit::new(CollectorState::Connecting, move |_cancellation| {
            let vcenter = vcenter.clone();
            let slot = connect_slot.clone();
            async move {
                let session = vcenter.connect(credentials).await?;
                *slot.lock().await = Some(session);
                Ok(())
            }
        });

        let collect_slot = slot.clone();
        let collect_raw = raw.clone();
        let collecting = WorkUnit::new(CollectorState::Collecting, move |_cancellation| {
            let slot = collect_slot.clone();
            let raw = collect_raw.clone();
            async move {
                let guard = slot.lock().await;
                let session = guard.as_ref().ok_or("no vCenter session open")?;
                let data = session.collect_raw_inventory().await?;
                *raw.lock().await = Some(data);
                Ok(())
            }
        });

        let parse_raw = raw.clone();
        let parse_slot = slot.clone();
        let inventory_repo = self.inventory_repo.clone();
        let parsing = WorkUnit::new(CollectorState::Parsing, move |_cancellation| {
            let raw = parse_raw.clone();
            let slot = parse_slot.clone();
            let inventory_repo = inventory_repo.clone();
            async move {
                let data = raw.lock().await.take().ok_or("no inventory payload collected")?;
                inventory_repo
                    .upsert(&data)
                    .await
                    .map_err(|e| e.to_string())?;
                if let Some(session) = slot.lock().await.take() {
                    session.close().await;
                }
                Ok(())
            }
        });

        vec![connecting, collecting, parsing]
    }
}
