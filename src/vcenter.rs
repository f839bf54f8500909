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

//! The vCenter collaborator interface. The concrete client library is
//! out of scope; the core only requires these narrow capabilities. The
//! Collector's WorkBuilder encapsulates its own connection entirely,
//! while the Inspector owns a session explicitly for the lifetime of a
//! run.

use crate::model::credentials::Credentials;
use crate::model::vm::VmDetail;
use async_trait::async_trait;

#[async_trait]
pub trait VCenterClient: Send + Sync {
    /// Opens a session for the duration of one Inspector run. Failure
    /// here is a controller-level error: the run moves straight to
    /// `Error` rather than retrying the connect.
    async fn connect(&self, credentials: Credentials) -> Result<Box<dyn VCenterSession>, String>;
}

#[async_trait]
pub trait VCenterSession: Send + Sync {
    /// Pulls the raw inventory payload the Collector's pipeline
    /// persists opaquely; the core never interprets its contents.
    async fn collect_raw_inventory(&self) -> Result<Vec<u8>, String>;

    async fn create_snapshot(&self, vm_id: &str) -> Result<String, String>;

    async fn remove_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<(), String>;

    async fn inspect_vm(&self, vm_id: &str) -> Result<VmDetail, String>;

    async fn validate_privileges(&self, vm_id: &str) -> Result<(), String>;

    /// Torn down with a bounded (10s) cleanup context decoupled from the
    /// run context, so cancellation still releases the remote session.
    async fn close(&self);
}

/// A placeholder collaborator for deployments that have not wired in a
/// concrete vCenter client. `connect` always
/// fails, which the Inspector surfaces as its `Error` state rather than
/// panicking or silently no-opping — a caller that forgets to supply a
/// real client finds out the first time it calls `Start`.
pub struct UnconfiguredVCenterClient;

#[async_trait]
impl VCenterClient for UnconfiguredVCenterClient {
    async fn connect(&self, _credentials: Credentials) -> Result<Box<dyn VCenterSession>, String> {
        Err("no vCenter client configured for this agent".to_string())
    }
}
