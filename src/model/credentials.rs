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

use crate::safe_display::SafeDisplay;
use url::Url;

/// vCenter credentials. Deliberately does not derive `Debug` or `Display`
/// — the password must never end up in a log line. Use [`SafeDisplay`]
/// when a caller needs to show *something*.
#[derive(Clone)]
pub struct Credentials {
    pub url: Url,
    pub username: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credential URL must have a scheme and a host: {0}")]
    InvalidUrl(String),
}

impl Credentials {
    pub fn new(
        url: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let raw = url.as_ref();
        let parsed =
            Url::parse(raw).map_err(|_| CredentialsError::InvalidUrl(raw.to_string()))?;
        if parsed.host_str().is_none() {
            return Err(CredentialsError::InvalidUrl(raw.to_string()));
        }
        Ok(Self {
            url: parsed,
            username: username.into(),
            password: password.into(),
        })
    }
}

impl SafeDisplay for Credentials {
    fn to_safe_string(&self) -> String {
        format!(
            "{}://{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or("<unknown>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn rejects_url_without_host() {
        assert!(Credentials::new("not-a-url", "u", "p").is_err());
    }

    #[test]
    fn rejects_relative_path() {
        assert!(Credentials::new("/just/a/path", "u", "p").is_err());
    }

    #[test]
    fn accepts_scheme_and_host() {
        let creds = Credentials::new("https://vc.example.com", "u", "p").unwrap();
        assert_eq!(creds.to_safe_string(), "https://vc.example.com");
    }

    #[test]
    fn safe_display_never_contains_password() {
        let creds = Credentials::new("https://vc.example.com", "root", "hunter2").unwrap();
        assert!(!creds.to_safe_string().contains("hunter2"));
    }
}
