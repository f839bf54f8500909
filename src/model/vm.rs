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

use crate::model::inspection::InspectionState;
use serde::{Deserialize, Serialize};

/// Read model projected from the collected inventory tables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VmSummary {
    pub id: String,
    pub name: String,
    pub power_state: String,
    pub cluster: Option<String>,
    pub memory_mb: i32,
    /// Stored in MiB, kept labeled `diskSize` at the wire boundary for
    /// compatibility — see DESIGN.md.
    pub total_disk_mib: i64,
    pub issue_count: i32,
    pub is_migratable: bool,
    pub is_template: bool,
    /// `None` when the VM has never been submitted for inspection.
    pub inspection_state: Option<InspectionState>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Disk {
    pub key: Option<i32>,
    pub file: String,
    pub capacity_mib: i64,
    pub shared: bool,
    pub rdm: bool,
    pub bus: Option<String>,
    pub mode: Option<String>,
}

impl Disk {
    /// `capacityBytes = capacityMiB × 1024 × 1024` exactly.
    pub fn capacity_bytes(&self) -> i64 {
        self.capacity_mib * 1024 * 1024
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Nic {
    pub mac: String,
    pub network: Option<String>,
    pub index: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub category: String,
    pub message: String,
}

impl Issue {
    pub fn is_critical(&self) -> bool {
        self.category == "Critical"
    }
}

/// Superset of [`VmSummary`] with per-disk/per-NIC arrays and ancillary
/// fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VmDetail {
    pub id: String,
    pub name: String,
    pub uuid: Option<String>,
    pub firmware: Option<String>,
    pub power_state: String,
    pub connection_state: String,
    pub host: Option<String>,
    pub datacenter: Option<String>,
    pub cluster: Option<String>,
    pub folder: Option<String>,
    pub cpu_count: i32,
    pub cores_per_socket: i32,
    pub memory_mb: i32,
    pub guest_name: Option<String>,
    pub guest_id: Option<String>,
    pub host_name: Option<String>,
    pub ip_address: Option<String>,
    pub storage_used: Option<i64>,
    pub tools_status: Option<String>,
    pub tools_running_status: Option<String>,
    pub is_template: bool,
    pub fault_tolerance_enabled: bool,
    pub nested_hv_enabled: bool,
    pub disks: Vec<Disk>,
    pub nics: Vec<Nic>,
    pub issues: Vec<Issue>,
}

impl VmDetail {
    /// "Migratable" iff the VM has zero issues whose category is
    /// "Critical".
    pub fn is_migratable(&self) -> bool {
        !self.issues.iter().any(Issue::is_critical)
    }

    pub fn total_disk_mib(&self) -> i64 {
        self.disks.iter().map(|d| d.capacity_mib).sum()
    }

    pub fn to_summary(&self) -> VmSummary {
        VmSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            power_state: self.power_state.clone(),
            cluster: self.cluster.clone(),
            memory_mb: self.memory_mb,
            total_disk_mib: self.total_disk_mib(),
            issue_count: self.issues.len() as i32,
            is_migratable: self.is_migratable(),
            is_template: self.is_template,
            inspection_state: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    PowerState,
    Cluster,
    DiskSize,
    Memory,
    Issues,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    fn vm(issues: Vec<Issue>) -> VmDetail {
        VmDetail {
            id: "vm-1".into(),
            name: "vm-1".into(),
            uuid: None,
            firmware: None,
            power_state: "poweredOn".into(),
            connection_state: "connected".into(),
            host: None,
            datacenter: None,
            cluster: None,
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
            disks: vec![Disk {
                key: Some(0),
                file: "disk0.vmdk".into(),
                capacity_mib: 10,
                shared: false,
                rdm: false,
                bus: None,
                mode: None,
            }],
            nics: vec![],
            issues,
        }
    }

    #[test]
    fn no_issues_is_migratable() {
        assert!(vm(vec![]).is_migratable());
    }

    #[test]
    fn non_critical_issue_is_still_migratable() {
        let v = vm(vec![Issue {
            category: "Warning".into(),
            message: "m".into(),
        }]);
        assert!(v.is_migratable());
    }

    #[test]
    fn critical_issue_is_not_migratable() {
        let v = vm(vec![Issue {
            category: "Critical".into(),
            message: "m".into(),
        }]);
        assert!(!v.is_migratable());
    }

    #[test]
    fn disk_capacity_bytes_is_exact() {
        let d = Disk {
            key: None,
            file: "f".into(),
            capacity_mib: 2,
            shared: false,
            rdm: false,
            bus: None,
            mode: None,
        };
        assert_eq!(d.capacity_bytes(), 2 * 1024 * 1024);
    }
}
