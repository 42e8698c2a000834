use std::future::Future;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;

use crate::error::{Error, Result};

use super::{Database, OPERATION_TIMEOUT};

/// Mapping from one ADO project to one Asana project. Managed by the
/// admin path; the sync engine reads the set on every reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProjectMapping {
    pub id: i64,
    pub ado_project_name: String,
    pub asana_workspace_name: String,
    pub asana_project_name: String,
}

/// Durable binding between an ADO work item and an Asana task.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TaskMapping {
    pub id: i64,
    pub ado_project_id: String,
    pub ado_task_id: i64,
    pub ado_last_updated: DateTime<Utc>,
    pub asana_project_gid: String,
    pub asana_task_gid: String,
    pub asana_last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached property value identified by a unique key. Freshness is decided
/// by the reader from `updated_at`.
#[derive(Debug, Clone)]
pub struct CacheItem {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Synced-tag record for one Asana workspace.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct WorkspaceTag {
    pub id: i64,
    pub workspace_name: String,
    pub tag_gid: String,
    pub tag_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Watermark value used when no sync has ever completed.
pub fn sentinel_last_sync() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap()
}

/// Bound a repository operation by the standard operation timeout.
async fn bounded<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(OPERATION_TIMEOUT, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Database("operation timed out".into())),
    }
}

// ── Project mappings ───────────────────────────────────────────────

pub async fn project_mappings(db: &Database) -> Result<Vec<ProjectMapping>> {
    bounded(async {
        let rows = sqlx::query_as::<_, ProjectMapping>(
            "SELECT id, ado_project_name, asana_workspace_name, asana_project_name
             FROM project_mappings ORDER BY ado_project_name",
        )
        .fetch_all(db.pool())
        .await?;
        Ok(rows)
    })
    .await
}

pub async fn add_project_mapping(db: &Database, mapping: &ProjectMapping) -> Result<i64> {
    bounded(async {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM project_mappings WHERE ado_project_name = ?")
                .bind(&mapping.ado_project_name)
                .fetch_optional(db.pool())
                .await?;
        if existing.is_some() {
            return Err(Error::ProjectAlreadyMapped);
        }

        let result = sqlx::query(
            "INSERT INTO project_mappings (ado_project_name, asana_workspace_name, asana_project_name)
             VALUES (?, ?, ?)",
        )
        .bind(&mapping.ado_project_name)
        .bind(&mapping.asana_workspace_name)
        .bind(&mapping.asana_project_name)
        .execute(db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    })
    .await
}

pub async fn update_project_mapping(db: &Database, mapping: &ProjectMapping) -> Result<()> {
    bounded(async {
        let conflict: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM project_mappings WHERE ado_project_name = ? AND id != ?",
        )
        .bind(&mapping.ado_project_name)
        .bind(mapping.id)
        .fetch_optional(db.pool())
        .await?;
        if conflict.is_some() {
            return Err(Error::ProjectAlreadyMapped);
        }

        sqlx::query(
            "UPDATE project_mappings
             SET ado_project_name = ?, asana_workspace_name = ?, asana_project_name = ?
             WHERE id = ?",
        )
        .bind(&mapping.ado_project_name)
        .bind(&mapping.asana_workspace_name)
        .bind(&mapping.asana_project_name)
        .bind(mapping.id)
        .execute(db.pool())
        .await?;
        Ok(())
    })
    .await
}

pub async fn remove_project_mapping(db: &Database, id: i64) -> Result<()> {
    bounded(async {
        let result = sqlx::query("DELETE FROM project_mappings WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        Ok(())
    })
    .await
}

// ── Task mappings ──────────────────────────────────────────────────

/// Look up the task mapping for an ADO work item id. `None` means no
/// mapping exists; errors are transport problems.
pub async fn find_task_by_ado_id(db: &Database, ado_task_id: i64) -> Result<Option<TaskMapping>> {
    bounded(async {
        let row = sqlx::query_as::<_, TaskMapping>(
            "SELECT id, ado_project_id, ado_task_id, ado_last_updated,
                    asana_project_gid, asana_task_gid, asana_last_updated,
                    created_at, updated_at
             FROM task_mappings WHERE ado_task_id = ?",
        )
        .bind(ado_task_id)
        .fetch_optional(db.pool())
        .await?;
        Ok(row)
    })
    .await
}

/// Insert a new task mapping, stamping `created_at`/`updated_at`. Fails
/// with [`Error::DuplicateMapping`] when the same mapping tuple exists.
pub async fn add_task_mapping(db: &Database, mapping: &TaskMapping) -> Result<i64> {
    bounded(async {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_mappings
             WHERE ado_project_id = ? AND ado_task_id = ?
               AND asana_project_gid = ? AND asana_task_gid = ?",
        )
        .bind(&mapping.ado_project_id)
        .bind(mapping.ado_task_id)
        .bind(&mapping.asana_project_gid)
        .bind(&mapping.asana_task_gid)
        .fetch_one(db.pool())
        .await?;
        if count > 0 {
            return Err(Error::DuplicateMapping);
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO task_mappings
                 (ado_project_id, ado_task_id, ado_last_updated,
                  asana_project_gid, asana_task_gid, asana_last_updated,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&mapping.ado_project_id)
        .bind(mapping.ado_task_id)
        .bind(mapping.ado_last_updated)
        .bind(&mapping.asana_project_gid)
        .bind(&mapping.asana_task_gid)
        .bind(mapping.asana_last_updated)
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    })
    .await
}

pub async fn update_task_mapping(db: &Database, mapping: &TaskMapping) -> Result<()> {
    bounded(async {
        sqlx::query(
            "UPDATE task_mappings
             SET ado_project_id = ?, ado_task_id = ?, ado_last_updated = ?,
                 asana_project_gid = ?, asana_task_gid = ?, asana_last_updated = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&mapping.ado_project_id)
        .bind(mapping.ado_task_id)
        .bind(mapping.ado_last_updated)
        .bind(&mapping.asana_project_gid)
        .bind(&mapping.asana_task_gid)
        .bind(mapping.asana_last_updated)
        .bind(Utc::now())
        .bind(mapping.id)
        .execute(db.pool())
        .await?;
        Ok(())
    })
    .await
}

// ── Cache ──────────────────────────────────────────────────────────

pub async fn get_cache_item(db: &Database, key: &str) -> Result<Option<CacheItem>> {
    bounded(async {
        let row: Option<(String, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT key, value, updated_at FROM cache WHERE key = ?")
                .bind(key)
                .fetch_optional(db.pool())
                .await?;

        match row {
            Some((key, value, updated_at)) => {
                let value = serde_json::from_str(&value)
                    .map_err(|e| Error::Database(format!("corrupt cache value for {key}: {e}")))?;
                Ok(Some(CacheItem {
                    key,
                    value,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    })
    .await
}

/// Store a cache value, replacing the whole value and stamping
/// `updated_at = now()`.
pub async fn upsert_cache_item(db: &Database, key: &str, value: &serde_json::Value) -> Result<()> {
    bounded(async {
        sqlx::query(
            "INSERT INTO cache (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value,
                                             updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
        Ok(())
    })
    .await
}

// ── Workspace tags ─────────────────────────────────────────────────

pub async fn workspace_tag(db: &Database, workspace_name: &str) -> Result<Option<WorkspaceTag>> {
    bounded(async {
        let row = sqlx::query_as::<_, WorkspaceTag>(
            "SELECT id, workspace_name, tag_gid, tag_name, updated_at
             FROM tags WHERE workspace_name = ?",
        )
        .bind(workspace_name)
        .fetch_optional(db.pool())
        .await?;
        Ok(row)
    })
    .await
}

pub async fn upsert_workspace_tag(
    db: &Database,
    workspace_name: &str,
    tag_gid: &str,
    tag_name: &str,
) -> Result<()> {
    bounded(async {
        sqlx::query(
            "INSERT INTO tags (workspace_name, tag_gid, tag_name, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (workspace_name) DO UPDATE SET tag_gid = excluded.tag_gid,
                                                        tag_name = excluded.tag_name,
                                                        updated_at = excluded.updated_at",
        )
        .bind(workspace_name)
        .bind(tag_gid)
        .bind(tag_name)
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
        Ok(())
    })
    .await
}

// ── Watermark ──────────────────────────────────────────────────────

/// Read the last successful sync time. Absent record means the engine has
/// never completed a cycle and yields the sentinel epoch.
pub async fn last_sync(db: &Database) -> Result<DateTime<Utc>> {
    bounded(async {
        let row: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT time FROM last_sync WHERE id = 1")
                .fetch_optional(db.pool())
                .await?;
        Ok(row.unwrap_or_else(sentinel_last_sync))
    })
    .await
}

pub async fn write_last_sync(db: &Database, timestamp: DateTime<Utc>) -> Result<()> {
    bounded(async {
        sqlx::query(
            "INSERT INTO last_sync (id, time) VALUES (1, ?)
             ON CONFLICT (id) DO UPDATE SET time = excluded.time",
        )
        .bind(timestamp)
        .execute(db.pool())
        .await?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_db() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.ensure_indexes().await.unwrap();
        db
    }

    fn mapping(ado_task_id: i64) -> TaskMapping {
        let now = Utc::now();
        TaskMapping {
            id: 0,
            ado_project_id: "ProjectA".into(),
            ado_task_id,
            ado_last_updated: now,
            asana_project_gid: "proj-1".into(),
            asana_task_gid: format!("task-{ado_task_id}"),
            asana_last_updated: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_project_mapping_crud() {
        let db = test_db().await;

        let pm = ProjectMapping {
            id: 0,
            ado_project_name: "ProjectA".into(),
            asana_workspace_name: "workspace1".into(),
            asana_project_name: "AsanaProjectA".into(),
        };
        let id = add_project_mapping(&db, &pm).await.unwrap();

        let all = project_mappings(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ado_project_name, "ProjectA");

        let updated = ProjectMapping {
            id,
            asana_project_name: "Renamed".into(),
            ..pm.clone()
        };
        update_project_mapping(&db, &updated).await.unwrap();
        let all = project_mappings(&db).await.unwrap();
        assert_eq!(all[0].asana_project_name, "Renamed");

        remove_project_mapping(&db, id).await.unwrap();
        assert!(project_mappings(&db).await.unwrap().is_empty());
        assert!(remove_project_mapping(&db, id).await.is_err());
    }

    #[tokio::test]
    async fn test_project_mapping_rejects_remapping() {
        let db = test_db().await;

        let pm = ProjectMapping {
            id: 0,
            ado_project_name: "ProjectA".into(),
            asana_workspace_name: "workspace1".into(),
            asana_project_name: "AsanaProjectA".into(),
        };
        add_project_mapping(&db, &pm).await.unwrap();

        let other = ProjectMapping {
            asana_project_name: "Different".into(),
            ..pm.clone()
        };
        assert!(matches!(
            add_project_mapping(&db, &other).await,
            Err(Error::ProjectAlreadyMapped)
        ));
    }

    #[tokio::test]
    async fn test_find_task_by_ado_id_not_found() {
        let db = test_db().await;
        assert!(find_task_by_ado_id(&db, 123).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_mapping_add_find_update() {
        let db = test_db().await;

        add_task_mapping(&db, &mapping(123)).await.unwrap();
        let found = find_task_by_ado_id(&db, 123).await.unwrap().unwrap();
        assert_eq!(found.asana_task_gid, "task-123");

        let mut changed = found.clone();
        changed.ado_last_updated = Utc::now() + Duration::hours(1);
        changed.asana_last_updated = Utc::now() + Duration::hours(1);
        update_task_mapping(&db, &changed).await.unwrap();

        let reread = find_task_by_ado_id(&db, 123).await.unwrap().unwrap();
        assert_eq!(reread.ado_last_updated, changed.ado_last_updated);
        assert!(reread.updated_at >= found.updated_at);
    }

    #[tokio::test]
    async fn test_add_task_mapping_duplicate_tuple_rejected() {
        let db = test_db().await;

        add_task_mapping(&db, &mapping(123)).await.unwrap();
        assert!(matches!(
            add_task_mapping(&db, &mapping(123)).await,
            Err(Error::DuplicateMapping)
        ));
    }

    #[tokio::test]
    async fn test_one_mapping_per_ado_task_id() {
        let db = test_db().await;

        add_task_mapping(&db, &mapping(123)).await.unwrap();

        // Same work item bound to a different Asana task violates the
        // unique index on ado_task_id.
        let mut other = mapping(123);
        other.asana_task_gid = "task-999".into();
        assert!(add_task_mapping(&db, &other).await.is_err());

        add_task_mapping(&db, &mapping(124)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_upsert_and_get() {
        let db = test_db().await;
        let key = "project:proj-1:link_field";

        assert!(get_cache_item(&db, key).await.unwrap().is_none());

        let before = Utc::now();
        let value = serde_json::json!({"gid": "cf-1", "name": "link"});
        upsert_cache_item(&db, key, &value).await.unwrap();

        let item = get_cache_item(&db, key).await.unwrap().unwrap();
        assert_eq!(item.value, value);
        assert!(item.updated_at >= before);

        let replacement = serde_json::json!({"gid": "cf-2", "name": "link"});
        upsert_cache_item(&db, key, &replacement).await.unwrap();
        let item = get_cache_item(&db, key).await.unwrap().unwrap();
        assert_eq!(item.value["gid"], "cf-2");
    }

    #[tokio::test]
    async fn test_workspace_tag_upsert_and_get() {
        let db = test_db().await;

        assert!(workspace_tag(&db, "workspace1").await.unwrap().is_none());

        upsert_workspace_tag(&db, "workspace1", "tag-123", "synced")
            .await
            .unwrap();
        let tag = workspace_tag(&db, "workspace1").await.unwrap().unwrap();
        assert_eq!(tag.tag_gid, "tag-123");
        assert_eq!(tag.tag_name, "synced");

        upsert_workspace_tag(&db, "workspace1", "tag-456", "synced")
            .await
            .unwrap();
        let tag = workspace_tag(&db, "workspace1").await.unwrap().unwrap();
        assert_eq!(tag.tag_gid, "tag-456");
    }

    #[tokio::test]
    async fn test_last_sync_sentinel_and_upsert() {
        let db = test_db().await;

        let initial = last_sync(&db).await.unwrap();
        assert_eq!(initial, sentinel_last_sync());

        let first = Utc::now();
        write_last_sync(&db, first).await.unwrap();
        assert_eq!(last_sync(&db).await.unwrap(), first);

        let second = first + Duration::minutes(5);
        write_last_sync(&db, second).await.unwrap();
        assert_eq!(last_sync(&db).await.unwrap(), second);
    }
}
