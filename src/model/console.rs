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

use crate::model::configuration::AgentMode;
use serde::{Deserialize, Serialize};

/// Status surface for the console reporter: `current` is the mode the
/// reporter has last successfully pushed (or observed at startup),
/// `target` is the mode `SetMode()` most recently requested.
/// The two diverge exactly while a push is pending or backing off.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleStatus {
    pub current: AgentMode,
    pub target: AgentMode,
    pub error: Option<String>,
}

impl ConsoleStatus {
    pub fn settled(mode: AgentMode) -> Self {
        Self {
            current: mode,
            target: mode,
            error: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target && self.error.is_none()
    }
}
