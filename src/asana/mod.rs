pub mod client;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub use client::AsanaClient;

/// Minimal information about an Asana workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct Workspace {
    pub gid: String,
    pub name: String,
}

/// Minimal information about an Asana project.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub gid: String,
    pub name: String,
}

/// Minimal information about an Asana task.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub gid: String,
    pub name: String,
}

/// Minimal information about an Asana custom field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomField {
    pub gid: String,
    pub name: String,
}

/// Minimal information about an Asana tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub gid: String,
    pub name: String,
}

/// Custom-field values keyed by field gid, attached to create/update
/// payloads when non-empty.
pub type CustomFieldValues = HashMap<String, String>;

/// Capabilities the sync engine needs from Asana.
#[async_trait]
pub trait AsanaApi: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;

    async fn list_projects(&self, workspace_gid: &str) -> Result<Vec<Project>>;

    /// Resolve a project gid from workspace and project names. Both
    /// lookups are exact-name matches.
    async fn project_gid_by_name(&self, workspace_name: &str, project_name: &str)
        -> Result<String>;

    async fn list_project_tasks(&self, project_gid: &str) -> Result<Vec<Task>>;

    /// Create a task in the given project. `notes` is HTML and is wrapped
    /// in a `<body>` element before submission if not already.
    async fn create_task(
        &self,
        project_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<Task>;

    /// Update an existing task, same payload rules as [`create_task`].
    async fn update_task(
        &self,
        task_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<()>;

    /// Find the custom field matching `field_name` on the project. The
    /// comparison is case-insensitive. Fails with
    /// [`crate::Error::CustomFieldsUnavailable`] when the workspace plan
    /// does not include custom fields.
    async fn project_custom_field_by_name(
        &self,
        project_gid: &str,
        field_name: &str,
    ) -> Result<CustomField>;

    /// Find the tag named `tag_name` in the workspace. Ties are broken by
    /// the smallest numeric gid.
    async fn workspace_tag_by_name(&self, workspace_name: &str, tag_name: &str) -> Result<Tag>;

    async fn add_tag_to_task(&self, task_gid: &str, tag_gid: &str) -> Result<()>;
}

/// Wrap notes in a `<body>` element if one is not already present.
pub(crate) fn ensure_html_body(notes: &str) -> String {
    if notes.to_lowercase().contains("<body") {
        notes.to_string()
    } else {
        format!("<body>{notes}</body>")
    }
}

/// Pick the tag matching `name`, breaking ties by smallest numeric gid.
/// Non-numeric gids sort after all numeric ones.
pub(crate) fn pick_tag_by_name(tags: &[Tag], name: &str) -> Option<Tag> {
    tags.iter()
        .filter(|t| t.name == name)
        .min_by_key(|t| t.gid.parse::<i64>().unwrap_or(i64::MAX))
        .cloned()
}
