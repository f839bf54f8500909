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

use crate::model::inventory::Inventory;
use crate::store::error::RepoError;
use crate::store::Db;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait InventoryRepo: Send + Sync {
    /// Replaces the singleton inventory row, refreshing `updated_at`.
    async fn upsert(&self, data: &[u8]) -> Result<(), RepoError>;

    async fn get(&self) -> Result<Option<Inventory>, RepoError>;
}

pub struct DbInventoryRepo {
    db: Db,
}

impl DbInventoryRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    data: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for Inventory {
    fn from(row: InventoryRow) -> Self {
        Inventory {
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl InventoryRepo for DbInventoryRepo {
    async fn upsert(&self, data: &[u8]) -> Result<(), RepoError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO inventory (id, data, created_at, updated_at)
            VALUES (1, ?1, ?2, ?2)
            ON CONFLICT (id) DO UPDATE SET data = ?1, updated_at = ?2
            "#,
        )
        .bind(data)
        .bind(now)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self) -> Result<Option<Inventory>, RepoError> {
        let row = sqlx::query_as::<_, InventoryRow>(
            "SELECT data, created_at, updated_at FROM inventory WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Inventory::from))
    }
}
