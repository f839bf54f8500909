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

use crate::model::inspection::{InspectionRow, InspectionState};
use crate::store::error::RepoError;
use crate::store::Db;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait InspectionRepo: Send + Sync {
    /// Inserts a `Pending` row per id in `vm_ids`, assigning each the
    /// next sequence number in submission order. Ignores ids that
    /// already have a row rather than erroring.
    async fn add(&self, vm_ids: &[String]) -> Result<(), RepoError>;

    async fn get(&self, vm_id: &str) -> Result<InspectionRow, RepoError>;

    /// All rows for the current job, keyed by VM id.
    async fn list(&self) -> Result<HashMap<String, InspectionRow>, RepoError>;

    /// The `Pending` row with the smallest sequence, or `None` (the
    /// `NoRows` sentinel) once none remain.
    async fn first_pending(&self) -> Result<Option<InspectionRow>, RepoError>;

    async fn update(
        &self,
        vm_id: &str,
        state: InspectionState,
        error: Option<&str>,
    ) -> Result<(), RepoError>;

    async fn delete_all(&self) -> Result<(), RepoError>;
}

pub struct DbInspectionRepo {
    db: Db,
}

impl DbInspectionRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    vm_id: String,
    state: String,
    error: Option<String>,
    sequence: i64,
}

impl From<Row> for InspectionRow {
    fn from(row: Row) -> Self {
        InspectionRow {
            vm_id: row.vm_id,
            state: parse_state(&row.state),
            error: row.error,
            sequence: row.sequence,
        }
    }
}

fn state_str(state: InspectionState) -> &'static str {
    match state {
        InspectionState::Pending => "pending",
        InspectionState::Running => "running",
        InspectionState::Completed => "completed",
        InspectionState::Canceled => "canceled",
        InspectionState::Error => "error",
        InspectionState::NotFound => "not_found",
    }
}

fn parse_state(s: &str) -> InspectionState {
    match s {
        "running" => InspectionState::Running,
        "completed" => InspectionState::Completed,
        "canceled" => InspectionState::Canceled,
        "error" => InspectionState::Error,
        "not_found" => InspectionState::NotFound,
        _ => InspectionState::Pending,
    }
}

#[async_trait]
impl InspectionRepo for DbInspectionRepo {
    async fn add(&self, vm_ids: &[String]) -> Result<(), RepoError> {
        // sequence is strictly increasing and never reused; a single
        // writer connection means this read-then-insert is safe from
        // interleaving.
        let mut next: i64 = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(sequence) FROM vm_inspection_status",
        )
        .fetch_one(self.db.pool())
        .await?
        .unwrap_or(0);

        for vm_id in vm_ids {
            next += 1;
            sqlx::query(
                r#"
                INSERT INTO vm_inspection_status (vm_id, state, error, sequence)
                VALUES (?1, 'pending', NULL, ?2)
                ON CONFLICT (vm_id) DO NOTHING
                "#,
            )
            .bind(vm_id)
            .bind(next)
            .execute(self.db.pool())
            .await?;
        }
        Ok(())
    }

    async fn get(&self, vm_id: &str) -> Result<InspectionRow, RepoError> {
        sqlx::query_as::<_, Row>(
            "SELECT vm_id, state, error, sequence FROM vm_inspection_status WHERE vm_id = ?1",
        )
        .bind(vm_id)
        .fetch_optional(self.db.pool())
        .await?
        .map(Into::into)
        .ok_or_else(|| RepoError::not_found(format!("inspection row for {vm_id}")))
    }

    async fn list(&self) -> Result<HashMap<String, InspectionRow>, RepoError> {
        let rows = sqlx::query_as::<_, Row>(
            "SELECT vm_id, state, error, sequence FROM vm_inspection_status ORDER BY sequence ASC",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.vm_id.clone(), row.into()))
            .collect())
    }

    async fn first_pending(&self) -> Result<Option<InspectionRow>, RepoError> {
        let row = sqlx::query_as::<_, Row>(
            r#"
            SELECT vm_id, state, error, sequence FROM vm_inspection_status
            WHERE state = 'pending'
            ORDER BY sequence ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    async fn update(
        &self,
        vm_id: &str,
        state: InspectionState,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        let affected =
            sqlx::query("UPDATE vm_inspection_status SET state = ?1, error = ?2 WHERE vm_id = ?3")
                .bind(state_str(state))
                .bind(error)
                .bind(vm_id)
                .execute(self.db.pool())
                .await?
                .rows_affected();
        if affected == 0 {
            return Err(RepoError::not_found(format!("inspection row for {vm_id}")));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM vm_inspection_status")
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
