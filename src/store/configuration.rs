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

use crate::model::configuration::{AgentMode, Configuration};
use crate::store::error::RepoError;
use crate::store::Db;
use async_trait::async_trait;

#[async_trait]
pub trait ConfigurationRepo: Send + Sync {
    async fn upsert(&self, config: &Configuration) -> Result<(), RepoError>;

    /// `None` when the singleton has never been written — distinct from
    /// a written `Disconnected`, per spec.md §4.B.
    async fn get(&self) -> Result<Option<Configuration>, RepoError>;
}

pub struct DbConfigurationRepo {
    db: Db,
}

impl DbConfigurationRepo {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct ConfigurationRow {
    agent_mode: String,
}

impl From<ConfigurationRow> for Configuration {
    fn from(row: ConfigurationRow) -> Self {
        Configuration {
            agent_mode: if row.agent_mode == "connected" {
                AgentMode::Connected
            } else {
                AgentMode::Disconnected
            },
        }
    }
}

fn mode_str(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Connected => "connected",
        AgentMode::Disconnected => "disconnected",
    }
}

#[async_trait]
impl ConfigurationRepo for DbConfigurationRepo {
    async fn upsert(&self, config: &Configuration) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO configuration (id, agent_mode)
            VALUES (1, ?1)
            ON CONFLICT (id) DO UPDATE SET agent_mode = ?1
            "#,
        )
        .bind(mode_str(config.agent_mode))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self) -> Result<Option<Configuration>, RepoError> {
        let row = sqlx::query_as::<_, ConfigurationRow>(
            "SELECT agent_mode FROM configuration WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Configuration::from))
    }
}
