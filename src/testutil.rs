//! Shared test doubles for the adapter traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ado::{AdoApi, WorkItem, WorkItemRef};
use crate::asana::{
    pick_tag_by_name, AsanaApi, CustomField, CustomFieldValues, Project, Tag, Task, Workspace,
};
use crate::error::{Error, Result};

/// Recorded create_task invocation.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub project_gid: String,
    pub name: String,
    pub notes: String,
    pub custom_fields: CustomFieldValues,
}

/// Recorded update_task invocation.
#[derive(Debug, Clone)]
pub struct UpdatedTask {
    pub task_gid: String,
    pub name: String,
    pub notes: String,
    pub custom_fields: CustomFieldValues,
}

/// In-memory Asana double. State maps are keyed the way the engine looks
/// things up; mutations are recorded for assertions.
#[derive(Default)]
pub struct MockAsana {
    /// (workspace name, project name) -> project gid.
    pub project_gids: Mutex<HashMap<(String, String), String>>,
    /// project gid -> tasks.
    pub project_tasks: Mutex<HashMap<String, Vec<Task>>>,
    /// project gid -> link custom field.
    pub custom_fields: Mutex<HashMap<String, CustomField>>,
    pub custom_fields_unavailable: AtomicBool,
    pub custom_field_calls: AtomicU64,
    /// workspace name -> tags.
    pub tags: Mutex<HashMap<String, Vec<Tag>>>,
    pub created: Mutex<Vec<CreatedTask>>,
    pub updated: Mutex<Vec<UpdatedTask>>,
    /// (task gid, tag gid) pairs.
    pub tags_added: Mutex<Vec<(String, String)>>,
    /// method name -> injected error message.
    pub errors: Mutex<HashMap<&'static str, String>>,
    next_gid: AtomicU64,
}

impl MockAsana {
    pub fn set_project_gid(&self, workspace: &str, project: &str, gid: &str) {
        self.project_gids
            .lock()
            .unwrap()
            .insert((workspace.to_string(), project.to_string()), gid.to_string());
    }

    pub fn set_project_tasks(&self, project_gid: &str, tasks: Vec<Task>) {
        self.project_tasks
            .lock()
            .unwrap()
            .insert(project_gid.to_string(), tasks);
    }

    pub fn set_custom_field(&self, project_gid: &str, field: CustomField) {
        self.custom_fields
            .lock()
            .unwrap()
            .insert(project_gid.to_string(), field);
    }

    pub fn set_tags(&self, workspace: &str, tags: Vec<Tag>) {
        self.tags.lock().unwrap().insert(workspace.to_string(), tags);
    }

    pub fn set_error(&self, method: &'static str, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(method, message.to_string());
    }

    fn check_error(&self, method: &'static str) -> Result<()> {
        match self.errors.lock().unwrap().get(method) {
            Some(message) => Err(Error::Asana(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AsanaApi for MockAsana {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.check_error("list_workspaces")?;
        let names: std::collections::BTreeSet<String> = self
            .project_gids
            .lock()
            .unwrap()
            .keys()
            .map(|(ws, _)| ws.clone())
            .collect();
        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Workspace {
                gid: format!("ws-{i}"),
                name,
            })
            .collect())
    }

    async fn list_projects(&self, _workspace_gid: &str) -> Result<Vec<Project>> {
        self.check_error("list_projects")?;
        Ok(self
            .project_gids
            .lock()
            .unwrap()
            .iter()
            .map(|((_, name), gid)| Project {
                gid: gid.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn project_gid_by_name(
        &self,
        workspace_name: &str,
        project_name: &str,
    ) -> Result<String> {
        self.check_error("project_gid_by_name")?;
        self.project_gids
            .lock()
            .unwrap()
            .get(&(workspace_name.to_string(), project_name.to_string()))
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(project_name.to_string()))
    }

    async fn list_project_tasks(&self, project_gid: &str) -> Result<Vec<Task>> {
        self.check_error("list_project_tasks")?;
        Ok(self
            .project_tasks
            .lock()
            .unwrap()
            .get(project_gid)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_task(
        &self,
        project_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<Task> {
        self.check_error("create_task")?;
        let n = self.next_gid.fetch_add(1, Ordering::SeqCst) + 1;
        let task = Task {
            gid: format!("new-task-{n}"),
            name: name.to_string(),
        };
        self.created.lock().unwrap().push(CreatedTask {
            project_gid: project_gid.to_string(),
            name: name.to_string(),
            notes: notes.to_string(),
            custom_fields,
        });
        self.project_tasks
            .lock()
            .unwrap()
            .entry(project_gid.to_string())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        task_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<()> {
        self.check_error("update_task")?;
        self.updated.lock().unwrap().push(UpdatedTask {
            task_gid: task_gid.to_string(),
            name: name.to_string(),
            notes: notes.to_string(),
            custom_fields,
        });
        Ok(())
    }

    async fn project_custom_field_by_name(
        &self,
        project_gid: &str,
        field_name: &str,
    ) -> Result<CustomField> {
        self.custom_field_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error("project_custom_field_by_name")?;
        if self.custom_fields_unavailable.load(Ordering::SeqCst) {
            return Err(Error::CustomFieldsUnavailable);
        }
        self.custom_fields
            .lock()
            .unwrap()
            .get(project_gid)
            .filter(|f| f.name.to_lowercase() == field_name.to_lowercase())
            .cloned()
            .ok_or(Error::CustomFieldNotFound)
    }

    async fn workspace_tag_by_name(&self, workspace_name: &str, tag_name: &str) -> Result<Tag> {
        self.check_error("workspace_tag_by_name")?;
        let tags = self.tags.lock().unwrap();
        let workspace_tags = tags
            .get(workspace_name)
            .ok_or_else(|| Error::WorkspaceNotFound(workspace_name.to_string()))?;
        pick_tag_by_name(workspace_tags, tag_name)
            .ok_or_else(|| Error::TagNotFound(tag_name.to_string()))
    }

    async fn add_tag_to_task(&self, task_gid: &str, tag_gid: &str) -> Result<()> {
        self.check_error("add_tag_to_task")?;
        self.tags_added
            .lock()
            .unwrap()
            .push((task_gid.to_string(), tag_gid.to_string()));
        Ok(())
    }
}

/// In-memory Azure DevOps double. Work items absent from the map fail to
/// fetch, which doubles as per-item error injection.
#[derive(Default)]
pub struct MockAdo {
    pub work_items: Mutex<HashMap<i64, WorkItem>>,
    pub changed: Mutex<Vec<i64>>,
    pub errors: Mutex<HashMap<&'static str, String>>,
    pub list_calls: AtomicU64,
}

impl MockAdo {
    pub fn add_work_item(&self, wi: WorkItem) {
        self.changed.lock().unwrap().push(wi.id);
        self.work_items.lock().unwrap().insert(wi.id, wi);
    }

    pub fn set_changed(&self, ids: Vec<i64>) {
        *self.changed.lock().unwrap() = ids;
    }

    pub fn set_error(&self, method: &'static str, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(method, message.to_string());
    }

    fn check_error(&self, method: &'static str) -> Result<()> {
        match self.errors.lock().unwrap().get(method) {
            Some(message) => Err(Error::Ado(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AdoApi for MockAdo {
    async fn list_changed(&self, _since: DateTime<Utc>) -> Result<Vec<WorkItemRef>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error("list_changed")?;
        Ok(self
            .changed
            .lock()
            .unwrap()
            .iter()
            .map(|&id| WorkItemRef { id })
            .collect())
    }

    async fn get_work_item(&self, id: i64) -> Result<WorkItem> {
        self.check_error("get_work_item")?;
        self.work_items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Ado(format!("work item {id} not found")))
    }
}

/// Build a work item with the fields the sync paths require.
pub fn work_item(id: i64, title: &str, project: &str, url: &str) -> WorkItem {
    WorkItem {
        id,
        title: title.to_string(),
        work_item_type: "User Story".to_string(),
        state: "Active".to_string(),
        assigned_to: "bob@example.com".to_string(),
        created_date: Some(Utc::now()),
        changed_date: Utc::now(),
        url: url.to_string(),
        team_project: project.to_string(),
    }
}
