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

//! A `Display`-like trait for values that may carry secrets (passwords,
//! tokens, private keys). `to_safe_string` must never leak them; use it
//! anywhere a value is about to be logged or dumped into a config echo.

/// Renders a value for logs/diagnostics with secret fields redacted.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    /// Same as [`to_safe_string`](SafeDisplay::to_safe_string) but indented
    /// two spaces per line, for nesting under a parent section header.
    fn to_safe_string_indented(&self) -> String {
        self.to_safe_string()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
