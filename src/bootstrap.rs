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

//! Wires the four controllers on top of the store and scheduler: a
//! single struct of `Arc<dyn Trait>` handles built once at startup and
//! cloned into whatever surface consumes them (here, nothing does yet —
//! the HTTP router is out of scope).

use crate::collector::work_builder::VCenterWorkBuilder;
use crate::collector::CollectorController;
use crate::config::AgentConfig;
use crate::console::client::{ConsoleClient, HttpConsoleClient};
use crate::console::ConsoleReporter;
use crate::error::AgentError;
use crate::inspector::work_builder::{DiscardingResultSink, VCenterInspectorWorkBuilder};
use crate::inspector::InspectorController;
use crate::scheduler::Scheduler;
use crate::store::configuration::{ConfigurationRepo, DbConfigurationRepo};
use crate::store::inspection::{DbInspectionRepo, InspectionRepo};
use crate::store::inventory::{DbInventoryRepo, InventoryRepo};
use crate::store::vm::{DbVmRepo, VmRepo};
use crate::store::Db;
use crate::vcenter::VCenterClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub scheduler: Arc<Scheduler>,
    pub vm_repo: Arc<dyn VmRepo>,
    pub inventory_repo: Arc<dyn InventoryRepo>,
    pub configuration_repo: Arc<dyn ConfigurationRepo>,
    pub inspection_repo: Arc<dyn InspectionRepo>,
    pub collector: Arc<CollectorController>,
    pub inspector: Arc<InspectorController>,
    pub console: Arc<ConsoleReporter>,
}

impl Services {
    /// `vcenter` is the only collaborator a caller still has to supply
    /// since the concrete vCenter client library is out of scope; the
    /// Collector's and Inspector's production pipelines are built
    /// internally from it.
    pub async fn new(
        config: &AgentConfig,
        db: Db,
        vcenter: Arc<dyn VCenterClient>,
    ) -> Result<Self, AgentError> {
        let scheduler = Arc::new(Scheduler::new(config.scheduler.workers, 256));

        let vm_repo: Arc<dyn VmRepo> = Arc::new(DbVmRepo::new(db.clone()));
        let inventory_repo: Arc<dyn InventoryRepo> = Arc::new(DbInventoryRepo::new(db.clone()));
        let configuration_repo: Arc<dyn ConfigurationRepo> =
            Arc::new(DbConfigurationRepo::new(db.clone()));
        let inspection_repo: Arc<dyn InspectionRepo> = Arc::new(DbInspectionRepo::new(db.clone()));

        let collector_builder = Arc::new(VCenterWorkBuilder::new(
            vcenter.clone(),
            inventory_repo.clone(),
        ));
        let collector = Arc::new(CollectorController::new(scheduler.clone(), collector_builder));

        // No inventory-ingestion collaborator is wired in yet (out of
        // scope per spec.md §1); `DiscardingResultSink` makes the save
        // boundary explicit until a caller supplies a real one.
        let inspector_builder = Arc::new(VCenterInspectorWorkBuilder::new(Arc::new(DiscardingResultSink)));
        let inspector = Arc::new(InspectorController::new(
            scheduler.clone(),
            inspector_builder,
            inspection_repo.clone(),
            vcenter,
        ));

        let console_client: Arc<dyn ConsoleClient> = Arc::new(
            HttpConsoleClient::new(config.console.clone())
                .map_err(|e| AgentError::internal(e.to_string()))?,
        );

        let console = Arc::new(
            ConsoleReporter::new(
                &config.console,
                configuration_repo.clone(),
                inventory_repo.clone(),
                console_client,
                collector.clone(),
                scheduler.clone(),
            )
            .await?,
        );

        Ok(Self {
            scheduler,
            vm_repo,
            inventory_repo,
            configuration_repo,
            inspection_repo,
            collector,
            inspector,
            console,
        })
    }
}
