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

//! VM read-model repository: a composable list-option builder over the
//! `vm_summary` projection, plus detail lookups joining the per-disk/
//! per-NIC/per-issue tables maintained by the (out of scope) inventory-
//! ingestion collaborator.

use crate::model::inspection::InspectionState;
use crate::model::vm::{Disk, Issue, Nic, SortDirection, SortKey, VmDetail, VmSummary};
use crate::store::error::RepoError;
use crate::store::Db;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// One conjunct of a `VmListOptions` filter set. `ByClusters` and
/// `ByPowerStates` each expand to a disjunction (`IN (...)`) internally;
/// composing several filters is a conjunction.
pub struct VmFilter {
    apply: Box<dyn for<'a> Fn(&mut QueryBuilder<'a, Sqlite>) + Send + Sync>,
}

impl VmFilter {
    pub fn by_clusters(clusters: Vec<String>) -> Self {
        Self {
            apply: Box::new(move |qb| {
                if clusters.is_empty() {
                    return;
                }
                qb.push(" AND cluster IN (");
                let mut sep = qb.separated(", ");
                for cluster in &clusters {
                    sep.push_bind(cluster.clone());
                }
                qb.push(")");
            }),
        }
    }

    pub fn by_power_states(states: Vec<String>) -> Self {
        Self {
            apply: Box::new(move |qb| {
                if states.is_empty() {
                    return;
                }
                qb.push(" AND power_state IN (");
                let mut sep = qb.separated(", ");
                for state in &states {
                    sep.push_bind(state.clone());
                }
                qb.push(")");
            }),
        }
    }

    pub fn min_issue_count(min: i32) -> Self {
        Self {
            apply: Box::new(move |qb| {
                qb.push(" AND issue_count >= ");
                qb.push_bind(min);
            }),
        }
    }

    /// Closed-open range: `diskSize == min` matches, `diskSize == max`
    /// does not.
    pub fn disk_size_range(min: i64, max: i64) -> Self {
        Self {
            apply: Box::new(move |qb| {
                qb.push(" AND total_disk_mib >= ");
                qb.push_bind(min);
                qb.push(" AND total_disk_mib < ");
                qb.push_bind(max);
            }),
        }
    }

    pub fn memory_range(min: i32, max: i32) -> Self {
        Self {
            apply: Box::new(move |qb| {
                qb.push(" AND memory_mb >= ");
                qb.push_bind(min);
                qb.push(" AND memory_mb < ");
                qb.push_bind(max);
            }),
        }
    }

    fn apply_to<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        (self.apply)(qb)
    }
}

fn sort_column(key: SortKey) -> &'static str {
    match key {
        SortKey::Name => "name",
        SortKey::PowerState => "power_state",
        SortKey::Cluster => "cluster",
        SortKey::DiskSize => "total_disk_mib",
        SortKey::Memory => "memory_mb",
        SortKey::Issues => "issue_count",
    }
}

/// Filters, multi-key sort, and pagination for [`VmRepo::list`]. Counts
/// (via [`VmRepo::count`]) respect `filters` only, ignoring sort order
/// and pagination.
#[derive(Default)]
pub struct VmListOptions {
    filters: Vec<VmFilter>,
    sort: Vec<(SortKey, SortDirection)>,
    page: u32,
    page_size: u32,
}

impl VmListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: VmFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort.push((key, direction));
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// `page=0` is treated as `page=1`; `pageSize` is capped at 100 and
    /// defaults to 20 when unset.
    fn normalized(&self) -> (u32, u32) {
        let page = if self.page == 0 { 1 } else { self.page };
        let page_size = if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        };
        (page, page_size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub page_count: i64,
}

impl Pagination {
    fn compute(page: u32, page_size: u32, total: i64) -> Self {
        // round up, and a result of zero rows still reports a page count
        // of at least one.
        let page_count = ((total as f64) / (page_size as f64)).ceil() as i64;
        Self {
            page,
            page_size,
            total,
            page_count: page_count.max(1),
        }
    }
}

#[async_trait]
pub trait VmRepo: Send + Sync {
    async fn list(&self, options: &VmListOptions) -> Result<(Vec<VmSummary>, Pagination), RepoError>;

    async fn count(&self, options: &VmListOptions) -> Result<i64, RepoError>;

    async fn get_detail(&self, vm_id: &str) -> Result<VmDetail, RepoError>;

    async fn exists(&self, vm_id: &str) -> Result<bool, RepoError>;
}

pub struct DbVmRepo {
    db: Db,
}

impl DbVmRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn where_clause<'a>(&self, options: &'a VmListOptions, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE 1=1");
        for filter in &options.filters {
            filter.apply_to(qb);
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    name: String,
    power_state: String,
    cluster: Option<String>,
    memory_mb: i32,
    total_disk_mib: i64,
    issue_count: i32,
    is_migratable: bool,
    is_template: bool,
    inspection_state: Option<String>,
}

fn parse_inspection_state(s: &str) -> InspectionState {
    match s {
        "running" => InspectionState::Running,
        "completed" => InspectionState::Completed,
        "canceled" => InspectionState::Canceled,
        "error" => InspectionState::Error,
        "not_found" => InspectionState::NotFound,
        _ => InspectionState::Pending,
    }
}

impl From<SummaryRow> for VmSummary {
    fn from(row: SummaryRow) -> Self {
        VmSummary {
            id: row.id,
            name: row.name,
            power_state: row.power_state,
            cluster: row.cluster,
            memory_mb: row.memory_mb,
            total_disk_mib: row.total_disk_mib,
            issue_count: row.issue_count,
            is_migratable: row.is_migratable,
            is_template: row.is_template,
            inspection_state: row.inspection_state.as_deref().map(parse_inspection_state),
        }
    }
}

#[async_trait]
impl VmRepo for DbVmRepo {
    async fn list(
        &self,
        options: &VmListOptions,
    ) -> Result<(Vec<VmSummary>, Pagination), RepoError> {
        let total = self.count(options).await?;
        let (page, page_size) = options.normalized();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT vm_summary.id, vm_summary.name, vm_summary.power_state, vm_summary.cluster,
                   vm_summary.memory_mb, vm_summary.total_disk_mib, vm_summary.issue_count,
                   vm_summary.is_migratable, vm_summary.is_template,
                   vm_inspection_status.state AS inspection_state
            FROM vm_summary
            LEFT JOIN vm_inspection_status ON vm_inspection_status.vm_id = vm_summary.id
            "#,
        );
        self.where_clause(options, &mut qb);

        qb.push(" ORDER BY ");
        let mut sep = qb.separated(", ");
        for (key, direction) in &options.sort {
            let dir = match direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            sep.push(format!("vm_summary.{} {}", sort_column(*key), dir));
        }
        // id always breaks ties, even with no explicit sort keys.
        sep.push("vm_summary.id ASC");

        qb.push(" LIMIT ");
        qb.push_bind(page_size as i64);
        qb.push(" OFFSET ");
        qb.push_bind(((page - 1) as i64) * page_size as i64);

        let rows = qb
            .build_query_as::<SummaryRow>()
            .fetch_all(self.db.pool())
            .await?;

        let summaries = rows.into_iter().map(Into::into).collect();
        Ok((summaries, Pagination::compute(page, page_size, total)))
    }

    async fn count(&self, options: &VmListOptions) -> Result<i64, RepoError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM vm_summary");
        self.where_clause(options, &mut qb);
        let total: i64 = qb.build_query_scalar().fetch_one(self.db.pool()).await?;
        Ok(total)
    }

    async fn exists(&self, vm_id: &str) -> Result<bool, RepoError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM vm_info WHERE id = ?1")
            .bind(vm_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(found.is_some())
    }

    async fn get_detail(&self, vm_id: &str) -> Result<VmDetail, RepoError> {
        let info = sqlx::query_as::<_, VmInfoRow>(
            r#"
            SELECT id, name, uuid, firmware, power_state, connection_state,
                   host, datacenter, cluster, folder, cpu_count, cores_per_socket,
                   memory_mb, guest_name, guest_id, host_name, ip_address,
                   storage_used, tools_status, tools_running_status, is_template,
                   fault_tolerance_enabled, nested_hv_enabled
            FROM vm_info WHERE id = ?1
            "#,
        )
        .bind(vm_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| RepoError::not_found(format!("vm {vm_id}")))?;

        let disks = sqlx::query_as::<_, DiskRow>(
            "SELECT disk_key, file, capacity_mib, shared, rdm, bus, mode FROM vm_disk WHERE vm_id = ?1",
        )
        .bind(vm_id)
        .fetch_all(self.db.pool())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        let nics = sqlx::query_as::<_, NicRow>(
            "SELECT mac, network, nic_index FROM vm_nic WHERE vm_id = ?1",
        )
        .bind(vm_id)
        .fetch_all(self.db.pool())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        let issues = sqlx::query_as::<_, IssueRow>(
            "SELECT category, message FROM vm_issue WHERE vm_id = ?1",
        )
        .bind(vm_id)
        .fetch_all(self.db.pool())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        Ok(info.into_detail(disks, nics, issues))
    }
}

#[derive(sqlx::FromRow)]
struct VmInfoRow {
    id: String,
    name: String,
    uuid: Option<String>,
    firmware: Option<String>,
    power_state: String,
    connection_state: String,
    host: Option<String>,
    datacenter: Option<String>,
    cluster: Option<String>,
    folder: Option<String>,
    cpu_count: i32,
    cores_per_socket: i32,
    memory_mb: i32,
    guest_name: Option<String>,
    guest_id: Option<String>,
    host_name: Option<String>,
    ip_address: Option<String>,
    storage_used: Option<i64>,
    tools_status: Option<String>,
    tools_running_status: Option<String>,
    is_template: bool,
    fault_tolerance_enabled: bool,
    nested_hv_enabled: bool,
}

impl VmInfoRow {
    fn into_detail(self, disks: Vec<Disk>, nics: Vec<Nic>, issues: Vec<Issue>) -> VmDetail {
        VmDetail {
            id: self.id,
            name: self.name,
            uuid: self.uuid,
            firmware: self.firmware,
            power_state: self.power_state,
            connection_state: self.connection_state,
            host: self.host,
            datacenter: self.datacenter,
            cluster: self.cluster,
            folder: self.folder,
            cpu_count: self.cpu_count,
            cores_per_socket: self.cores_per_socket,
            memory_mb: self.memory_mb,
            guest_name: self.guest_name,
            guest_id: self.guest_id,
            host_name: self.host_name,
            ip_address: self.ip_address,
            storage_used: self.storage_used,
            tools_status: self.tools_status,
            tools_running_status: self.tools_running_status,
            is_template: self.is_template,
            fault_tolerance_enabled: self.fault_tolerance_enabled,
            nested_hv_enabled: self.nested_hv_enabled,
            disks,
            nics,
            issues,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DiskRow {
    disk_key: Option<i32>,
    file: String,
    capacity_mib: i64,
    shared: bool,
    rdm: bool,
    bus: Option<String>,
    mode: Option<String>,
}

impl From<DiskRow> for Disk {
    fn from(row: DiskRow) -> Self {
        Disk {
            key: row.disk_key,
            file: row.file,
            capacity_mib: row.capacity_mib,
            shared: row.shared,
            rdm: row.rdm,
            bus: row.bus,
            mode: row.mode,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NicRow {
    mac: String,
    network: Option<String>,
    nic_index: i32,
}

impl From<NicRow> for Nic {
    fn from(row: NicRow) -> Self {
        Nic {
            mac: row.mac,
            network: row.network,
            index: row.nic_index,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IssueRow {
    category: String,
    message: String,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Issue {
            category: row.category,
            message: row.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn pagination_rounds_up_and_floors_page_count_at_one() {
        assert_eq!(Pagination::compute(1, 20, 0).page_count, 1);
        assert_eq!(Pagination::compute(1, 20, 1).page_count, 1);
        assert_eq!(Pagination::compute(1, 20, 21).page_count, 2);
        assert_eq!(Pagination::compute(1, 20, 40).page_count, 2);
        assert_eq!(Pagination::compute(1, 20, 41).page_count, 3);
    }

    #[test]
    fn page_zero_and_oversized_page_size_are_normalized() {
        let options = VmListOptions::new().page(0).page_size(500);
        assert_eq!(options.normalized(), (1, MAX_PAGE_SIZE));
    }

    #[test]
    fn unset_page_size_defaults_to_twenty() {
        let options = VmListOptions::new();
        assert_eq!(options.normalized(), (1, DEFAULT_PAGE_SIZE));
    }
}
