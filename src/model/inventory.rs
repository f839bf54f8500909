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

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// The singleton inventory row (id = 1). `data` is an opaque JSON payload
/// produced by the collector pipeline; the core never interprets it,
/// only hashes and stores it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inventory {
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fixed-size SHA-256 digest, used to detect inventory changes without
/// repeatedly comparing the full byte buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl Inventory {
    pub fn content_hash(&self) -> ContentHash {
        ContentHash(Sha256::digest(&self.data).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;

    #[test]
    fn identical_bytes_hash_identically() {
        let now = Utc::now();
        let a = Inventory {
            data: b"{\"vms\":[]}".to_vec(),
            created_at: now,
            updated_at: now,
        };
        let b = Inventory {
            data: b"{\"vms\":[]}".to_vec(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn different_bytes_hash_differently() {
        let now = Utc::now();
        let a = Inventory {
            data: b"{\"vms\":[]}".to_vec(),
            created_at: now,
            updated_at: now,
        };
        let b = Inventory {
            data: b"{\"vms\":[{\"name\":\"vm1\"}]}".to_vec(),
            created_at: now,
            updated_at: now,
        };
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
