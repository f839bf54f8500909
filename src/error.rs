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

//! The crate-wide error taxonomy (spec §6/§7). Each variant is a distinct
//! kind with a predicate method so callers (ultimately the out-of-scope
//! HTTP layer) can branch on "what kind of failure" without string
//! matching, and maps 1:1 to an HTTP status there.

use crate::safe_display::SafeDisplay;
use crate::store::error::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("collection already in progress")]
    CollectionInProgress,

    #[error("inspection already in progress")]
    InspectorInProgress,

    #[error("inspector is not running")]
    InspectorNotRunning,

    #[error("reporter mode cannot change: reporter has terminated fatally")]
    ModeConflict,

    #[error("vCenter error: {0}")]
    VCenter(String),

    #[error("the source has been removed from the console")]
    SourceGone,

    #[error("agent is not authorized with the console")]
    AgentUnauthorized,

    #[error("console client error: {0}")]
    ConsoleClient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AgentError::ResourceNotFound(_))
    }

    pub fn is_collection_in_progress(&self) -> bool {
        matches!(self, AgentError::CollectionInProgress)
    }

    pub fn is_inspector_in_progress(&self) -> bool {
        matches!(self, AgentError::InspectorInProgress)
    }

    pub fn is_inspector_not_running(&self) -> bool {
        matches!(self, AgentError::InspectorNotRunning)
    }

    pub fn is_mode_conflict(&self) -> bool {
        matches!(self, AgentError::ModeConflict)
    }

    pub fn is_source_gone(&self) -> bool {
        matches!(self, AgentError::SourceGone)
    }

    pub fn is_agent_unauthorized(&self) -> bool {
        matches!(self, AgentError::AgentUnauthorized)
    }

    pub fn internal(msg: impl AsRef<str>) -> Self {
        AgentError::Internal(msg.as_ref().to_string())
    }

    pub fn vcenter(msg: impl AsRef<str>) -> Self {
        AgentError::VCenter(msg.as_ref().to_string())
    }
}

impl SafeDisplay for AgentError {
    fn to_safe_string(&self) -> String {
        // None of these variants carry credentials; the string is safe as-is.
        self.to_string()
    }
}

impl From<RepoError> for AgentError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(what) => AgentError::ResourceNotFound(what),
            RepoError::Database(err) => AgentError::Internal(err.to_string()),
        }
    }
}
