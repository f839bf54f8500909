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

use serde::{Deserialize, Serialize};

/// Per-VM inspection outcome, keyed uniquely by `vm_id`: re-inspecting
/// a VM overwrites its prior row rather than appending.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectionState {
    Pending,
    Running,
    Completed,
    Canceled,
    Error,
    NotFound,
}

/// One row of the inspection run's per-VM ledger. `sequence` is a
/// strictly increasing counter assigned when the row is first added,
/// used to recover submission order independent of `vm_id` ordering.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InspectionRow {
    pub vm_id: String,
    pub state: InspectionState,
    pub error: Option<String>,
    pub sequence: i64,
}

impl InspectionRow {
    pub fn pending(vm_id: impl Into<String>, sequence: i64) -> Self {
        Self {
            vm_id: vm_id.into(),
            state: InspectionState::Pending,
            error: None,
            sequence,
        }
    }
}

/// The whole-job state exposed by `Status()`. Distinct from
/// [`InspectionState`], which tracks a single VM within the job.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectorState {
    Ready,
    Initiating,
    Running,
    Canceling,
    Canceled,
    Completed,
    Error,
}

impl InspectorState {
    /// Anything other than the four terminal/idle states implies a job
    /// in flight and rejects a concurrent `Start()`.
    pub fn is_busy(self) -> bool {
        !matches!(
            self,
            InspectorState::Ready
                | InspectorState::Completed
                | InspectorState::Canceled
                | InspectorState::Error
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InspectorStatus {
    pub state: InspectorState,
    pub error: Option<String>,
}

impl InspectorStatus {
    pub fn ready() -> Self {
        Self {
            state: InspectorState::Ready,
            error: None,
        }
    }

    pub fn with_state(state: InspectorState) -> Self {
        Self { state, error: None }
    }

    pub fn with_error(error: impl AsRef<str>) -> Self {
        Self {
            state: InspectorState::Error,
            error: Some(error.as_ref().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn ready_completed_canceled_error_are_not_busy() {
        for s in [
            InspectorState::Ready,
            InspectorState::Completed,
            InspectorState::Canceled,
            InspectorState::Error,
        ] {
            assert!(!s.is_busy(), "{s:?} should not be busy");
        }
    }

    #[test]
    fn initiating_running_canceling_are_busy() {
        for s in [
            InspectorState::Initiating,
            InspectorState::Running,
            InspectorState::Canceling,
        ] {
            assert!(s.is_busy(), "{s:?} should be busy");
        }
    }
}
