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

/// Strict progression: only the controller transitions this. `Ready`,
/// `Collected`, `Error` are restartable; every other state implies a
/// run in flight.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    Ready,
    Connecting,
    Connected,
    Collecting,
    Parsing,
    Collected,
    Error,
}

impl CollectorState {
    /// A `Start()` call is permitted only while the controller is in one
    /// of these states.
    pub fn is_restartable(self) -> bool {
        matches!(
            self,
            CollectorState::Ready | CollectorState::Collected | CollectorState::Error
        )
    }

    pub fn is_busy(self) -> bool {
        !self.is_restartable()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub error: Option<String>,
}

impl CollectorStatus {
    pub fn ready() -> Self {
        Self {
            state: CollectorState::Ready,
            error: None,
        }
    }

    pub fn with_state(state: CollectorState) -> Self {
        Self { state, error: None }
    }

    pub fn with_error(error: impl AsRef<str>) -> Self {
        Self {
            state: CollectorState::Error,
            error: Some(error.as_ref().to_string()),
        }
    }
}
