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

//! Exercises the Store façade (spec.md §4.B) against a real, migrated
//! SQLite file instead of mocking the pool, since the repositories'
//! own unit tests only cover pure query-builder logic.

use migration_agent::config::SqliteConfig;
use migration_agent::model::configuration::{AgentMode, Configuration};
use migration_agent::model::inspection::InspectionState;
use migration_agent::model::vm::{SortDirection, SortKey};
use migration_agent::store::configuration::{ConfigurationRepo, DbConfigurationRepo};
use migration_agent::store::inspection::{DbInspectionRepo, InspectionRepo};
use migration_agent::store::inventory::{DbInventoryRepo, InventoryRepo};
use migration_agent::store::vm::{DbVmRepo, VmFilter, VmListOptions, VmRepo};
use migration_agent::store::Db;
use test_r::test;

test_r::enable!();

async fn migrated_db() -> (Db, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SqliteConfig {
        database_path: dir.path().join("agent.db"),
        max_connections: 1,
    };
    let db = Db::connect(&config).await.expect("connect");
    db.migrate().await.expect("migrate");
    (db, dir)
}

async fn seed_vm(db: &Db, id: &str, cluster: &str, critical_issue: bool) {
    sqlx::query(
        r#"
        INSERT INTO vm_info (
            id, name, power_state, connection_state, cluster,
            cpu_count, cores_per_socket, memory_mb
        ) VALUES (?1, ?1, 'poweredOn', 'connected', ?2, 2, 1, 4096)
        "#,
    )
    .bind(id)
    .bind(cluster)
    .execute(db.pool())
    .await
    .unwrap();

    sqlx::query("INSERT INTO vm_disk (vm_id, file, capacity_mib) VALUES (?1, 'disk-0.vmdk', 1024)")
        .bind(id)
        .execute(db.pool())
        .await
        .unwrap();

    if critical_issue {
        sqlx::query("INSERT INTO vm_issue (vm_id, category, message) VALUES (?1, 'Critical', 'no tools')")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }
}

#[test]
async fn configuration_get_distinguishes_unwritten_from_written() {
    let (db, _dir) = migrated_db().await;
    let repo = DbConfigurationRepo::new(db);

    assert!(repo.get().await.unwrap().is_none());

    repo.upsert(&Configuration {
        agent_mode: AgentMode::Connected,
    })
    .await
    .unwrap();
    assert_eq!(repo.get().await.unwrap().unwrap().agent_mode, AgentMode::Connected);

    // Upserting again overwrites the singleton row rather than erroring.
    repo.upsert(&Configuration {
        agent_mode: AgentMode::Disconnected,
    })
    .await
    .unwrap();
    assert_eq!(repo.get().await.unwrap().unwrap().agent_mode, AgentMode::Disconnected);
}

#[test]
async fn inventory_save_and_get_tracks_a_monotonic_updated_at() {
    let (db, _dir) = migrated_db().await;
    let repo = DbInventoryRepo::new(db);

    assert!(repo.get().await.unwrap().is_none());

    repo.upsert(b"{\"vms\":[]}").await.unwrap();
    let first = repo.get().await.unwrap().unwrap();
    assert_eq!(first.data, b"{\"vms\":[]}");

    repo.upsert(b"{\"vms\":[{\"name\":\"vm1\"}]}").await.unwrap();
    let second = repo.get().await.unwrap().unwrap();
    assert_eq!(second.data, b"{\"vms\":[{\"name\":\"vm1\"}]}");
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(second.created_at, first.created_at);
}

#[test]
async fn inspection_rows_are_drained_in_sequence_order() {
    let (db, _dir) = migrated_db().await;
    let repo = DbInspectionRepo::new(db);

    repo.add(&["vm-b".to_string(), "vm-a".to_string(), "vm-c".to_string()])
        .await
        .unwrap();

    // re-adding an id that already has a row is a no-op, not an error.
    repo.add(&["vm-a".to_string()]).await.unwrap();

    let first = repo.first_pending().await.unwrap().unwrap();
    assert_eq!(first.vm_id, "vm-b");
    repo.update(&first.vm_id, InspectionState::Running, None)
        .await
        .unwrap();

    // vm-b is no longer Pending, so the next pending row is vm-a.
    let next = repo.first_pending().await.unwrap().unwrap();
    assert_eq!(next.vm_id, "vm-a");

    repo.update("vm-b", InspectionState::Completed, None)
        .await
        .unwrap();
    let vm_b = repo.get("vm-b").await.unwrap();
    assert_eq!(vm_b.state, InspectionState::Completed);

    repo.delete_all().await.unwrap();
    assert!(repo.first_pending().await.unwrap().is_none());
    assert!(repo.get("vm-a").await.is_err());
}

#[test]
async fn updating_an_unknown_vm_is_not_found() {
    let (db, _dir) = migrated_db().await;
    let repo = DbInspectionRepo::new(db);
    let result = repo
        .update("does-not-exist", InspectionState::Completed, None)
        .await;
    assert!(result.is_err());
}

#[test]
async fn vm_listing_filters_sorts_and_paginates_over_the_summary_view() {
    let (db, _dir) = migrated_db().await;
    seed_vm(&db, "vm-1", "cluster-a", false).await;
    seed_vm(&db, "vm-2", "cluster-a", true).await;
    seed_vm(&db, "vm-3", "cluster-b", false).await;

    let repo = DbVmRepo::new(db);

    let options = VmListOptions::new()
        .filter(VmFilter::by_clusters(vec!["cluster-a".to_string()]))
        .sort_by(SortKey::Name, SortDirection::Ascending);
    let (page, pagination) = repo.list(&options).await.unwrap();
    assert_eq!(page.iter().map(|vm| vm.id.as_str()).collect::<Vec<_>>(), vec!["vm-1", "vm-2"]);
    assert_eq!(pagination.total, 2);

    let migratable_only = VmListOptions::new().filter(VmFilter::min_issue_count(0));
    let count = repo.count(&migratable_only).await.unwrap();
    assert_eq!(count, 3);

    let vm_2 = repo.get_detail("vm-2").await.unwrap();
    assert!(!vm_2.is_migratable());
    assert_eq!(vm_2.disks.len(), 1);

    assert!(repo.exists("vm-1").await.unwrap());
    assert!(!repo.exists("vm-unknown").await.unwrap());
    assert!(repo.get_detail("vm-unknown").await.is_err());
}
