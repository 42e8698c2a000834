use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::asana::{AsanaApi, CustomField, Tag};
use crate::error::Error;
use crate::storage::{repository, Database};

/// Name of the Asana custom field holding the work item URL.
const LINK_FIELD: &str = "link";

/// Memoized destination metadata: the per-project "link" custom field and
/// the per-workspace synced tag.
///
/// The custom-field cache is serialized through the repository with a TTL;
/// misses are never cached, so a plan upgrade is picked up on the next
/// lookup. Synced tags live in a process-local map preloaded at startup
/// and lazily filled from the repository or Asana afterwards.
pub struct MetadataCache {
    db: Database,
    asana: Arc<dyn AsanaApi>,
    ttl: Duration,
    tag_name: String,
    synced_tags: RwLock<HashMap<String, Tag>>,
}

impl MetadataCache {
    pub fn new(
        db: Database,
        asana: Arc<dyn AsanaApi>,
        ttl: std::time::Duration,
        tag_name: &str,
    ) -> Self {
        Self {
            db,
            asana,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(24)),
            tag_name: tag_name.to_string(),
            synced_tags: RwLock::new(HashMap::new()),
        }
    }

    /// Retrieve the "link" custom field for the project, using a cached
    /// value when fresh. `None` means the field is unavailable and the
    /// caller should proceed without custom fields.
    pub async fn link_custom_field(&self, project_gid: &str) -> Option<CustomField> {
        let key = format!("project:{project_gid}:link_field");

        match repository::get_cache_item(&self.db, &key).await {
            Ok(Some(item)) if Utc::now() - item.updated_at < self.ttl => {
                let gid = item.value.get("gid").and_then(|v| v.as_str()).unwrap_or("");
                if !gid.is_empty() {
                    let name = item.value.get("name").and_then(|v| v.as_str()).unwrap_or("");
                    return Some(CustomField {
                        gid: gid.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("cache read failed for {key}: {e}"),
        }

        let field = match self
            .asana
            .project_custom_field_by_name(project_gid, LINK_FIELD)
            .await
        {
            Ok(field) => field,
            Err(Error::CustomFieldsUnavailable) => {
                log::debug!("custom fields unavailable for project {project_gid}");
                return None;
            }
            Err(e) => {
                log::debug!("no link custom field for project {project_gid}: {e}");
                return None;
            }
        };

        let value = serde_json::json!({ "gid": field.gid, "name": field.name });
        if let Err(e) = repository::upsert_cache_item(&self.db, &key, &value).await {
            log::warn!("failed to cache link field for {project_gid}: {e}");
        }
        Some(field)
    }

    /// Populate the process-local synced-tag map from the repository for
    /// every workspace referenced by a project mapping. Failures are
    /// logged; the map is lazily filled at runtime instead.
    pub async fn preload_synced_tags(&self) {
        let projects = match repository::project_mappings(&self.db).await {
            Ok(projects) => projects,
            Err(e) => {
                log::warn!("unable to load projects for tag lookup: {e}");
                return;
            }
        };

        let mut map = self.synced_tags.write().await;
        for project in projects {
            let workspace = project.asana_workspace_name;
            if map.contains_key(&workspace) {
                continue;
            }
            match repository::workspace_tag(&self.db, &workspace).await {
                Ok(Some(rec)) if !rec.tag_gid.is_empty() => {
                    map.insert(
                        workspace,
                        Tag {
                            gid: rec.tag_gid,
                            name: rec.tag_name,
                        },
                    );
                }
                Ok(_) => {}
                Err(e) => log::warn!("unable to load synced tag for {workspace}: {e}"),
            }
        }
    }

    /// Resolve the synced tag for a workspace: process-local map first,
    /// then the repository, then Asana (written through on success).
    /// `None` means tagging is skipped.
    pub async fn synced_tag(&self, workspace_name: &str) -> Option<Tag> {
        if let Some(tag) = self.synced_tags.read().await.get(workspace_name) {
            return Some(tag.clone());
        }

        match repository::workspace_tag(&self.db, workspace_name).await {
            Ok(Some(rec)) if !rec.tag_gid.is_empty() => {
                let tag = Tag {
                    gid: rec.tag_gid,
                    name: rec.tag_name,
                };
                self.synced_tags
                    .write()
                    .await
                    .insert(workspace_name.to_string(), tag.clone());
                return Some(tag);
            }
            Ok(_) => {}
            Err(e) => log::warn!("synced tag lookup failed for {workspace_name}: {e}"),
        }

        let tag = match self
            .asana
            .workspace_tag_by_name(workspace_name, &self.tag_name)
            .await
        {
            Ok(tag) => tag,
            Err(e) => {
                log::debug!("synced tag not resolved for {workspace_name}: {e}");
                return None;
            }
        };

        if let Err(e) =
            repository::upsert_workspace_tag(&self.db, workspace_name, &tag.gid, &tag.name).await
        {
            log::warn!("failed to store synced tag for {workspace_name}: {e}");
        }
        self.synced_tags
            .write()
            .await
            .insert(workspace_name.to_string(), tag.clone());
        Some(tag)
    }
}
