use std::sync::Arc;

use chrono::Utc;

use crate::ado::{AdoApi, WorkItem};
use crate::asana::{AsanaApi, CustomFieldValues};
use crate::error::Result;
use crate::storage::repository::{self, ProjectMapping, TaskMapping};
use crate::storage::Database;

use super::metadata::MetadataCache;

/// Reconciliation decision for one work item. Classification is pure
/// routing; `execute` applies the single destination mutation followed by
/// the repository write and best-effort tagging.
#[derive(Debug)]
enum Action {
    /// A task mapping exists; update the mapped Asana task.
    UpdateMapped { mapping: TaskMapping },
    /// No mapping, but the destination project already has a task with the
    /// same name; update it and bind it.
    AdoptByName {
        project_gid: String,
        workspace: String,
        task_gid: String,
    },
    /// No mapping and no name collision; create the task and bind it.
    Create {
        project_gid: String,
        workspace: String,
    },
    /// The work item's project is not mapped; nothing to do.
    Skip,
}

pub struct Reconciler {
    db: Database,
    ado: Arc<dyn AdoApi>,
    asana: Arc<dyn AsanaApi>,
    metadata: Arc<MetadataCache>,
}

impl Reconciler {
    pub fn new(
        db: Database,
        ado: Arc<dyn AdoApi>,
        asana: Arc<dyn AsanaApi>,
        metadata: Arc<MetadataCache>,
    ) -> Self {
        Self {
            db,
            ado,
            asana,
            metadata,
        }
    }

    /// Bring one ADO work item in sync with Asana. Exactly one of
    /// update / adopt / create / skip happens per invocation.
    pub async fn sync_work_item(&self, id: i64) -> Result<()> {
        let mapping = repository::find_task_by_ado_id(&self.db, id).await?;
        let wi = self.ado.get_work_item(id).await?;

        let title = wi.format_title()?;
        let notes = wi.format_title_with_link()?;

        let action = self.classify(mapping, &wi, &title).await?;
        self.execute(action, &wi, &title, &notes).await
    }

    async fn classify(
        &self,
        mapping: Option<TaskMapping>,
        wi: &WorkItem,
        title: &str,
    ) -> Result<Action> {
        if let Some(mapping) = mapping {
            return Ok(Action::UpdateMapped { mapping });
        }

        let Some(project) = self.project_mapping_for(&wi.team_project).await? else {
            log::debug!(
                "project {} not mapped to Asana, skipping work item {}",
                wi.team_project,
                wi.id
            );
            return Ok(Action::Skip);
        };

        let project_gid = self
            .asana
            .project_gid_by_name(&project.asana_workspace_name, &project.asana_project_name)
            .await?;

        let tasks = self.asana.list_project_tasks(&project_gid).await?;
        if let Some(existing) = tasks.iter().find(|t| t.name == title) {
            return Ok(Action::AdoptByName {
                project_gid,
                workspace: project.asana_workspace_name,
                task_gid: existing.gid.clone(),
            });
        }

        Ok(Action::Create {
            project_gid,
            workspace: project.asana_workspace_name,
        })
    }

    async fn execute(&self, action: Action, wi: &WorkItem, title: &str, notes: &str) -> Result<()> {
        match action {
            Action::UpdateMapped { mut mapping } => {
                let custom_fields = self.link_field_values(&mapping.asana_project_gid, wi).await;
                self.asana
                    .update_task(&mapping.asana_task_gid, title, notes, custom_fields)
                    .await?;

                mapping.ado_last_updated = wi.changed_date;
                mapping.asana_last_updated = Utc::now();
                repository::update_task_mapping(&self.db, &mapping).await?;

                if let Some(workspace) = self.workspace_for(&wi.team_project).await {
                    self.add_synced_tag(&workspace, &mapping.asana_task_gid).await;
                }
                Ok(())
            }
            Action::AdoptByName {
                project_gid,
                workspace,
                task_gid,
            } => {
                let custom_fields = self.link_field_values(&project_gid, wi).await;
                self.asana
                    .update_task(&task_gid, title, notes, custom_fields)
                    .await?;

                let mapping = new_mapping(wi, &project_gid, &task_gid);
                repository::add_task_mapping(&self.db, &mapping).await?;

                self.add_synced_tag(&workspace, &task_gid).await;
                Ok(())
            }
            Action::Create {
                project_gid,
                workspace,
            } => {
                let custom_fields = self.link_field_values(&project_gid, wi).await;
                let task = self
                    .asana
                    .create_task(&project_gid, title, notes, custom_fields)
                    .await?;

                let mapping = new_mapping(wi, &project_gid, &task.gid);
                repository::add_task_mapping(&self.db, &mapping).await?;

                self.add_synced_tag(&workspace, &task.gid).await;
                Ok(())
            }
            Action::Skip => Ok(()),
        }
    }

    async fn project_mapping_for(&self, team_project: &str) -> Result<Option<ProjectMapping>> {
        let mappings = repository::project_mappings(&self.db).await?;
        Ok(mappings
            .into_iter()
            .find(|m| m.ado_project_name == team_project))
    }

    /// Workspace name for a work item's project mapping, for tagging.
    async fn workspace_for(&self, team_project: &str) -> Option<String> {
        match self.project_mapping_for(team_project).await {
            Ok(Some(mapping)) => Some(mapping.asana_workspace_name),
            Ok(None) => None,
            Err(e) => {
                log::warn!("workspace lookup failed for {team_project}: {e}");
                None
            }
        }
    }

    async fn link_field_values(&self, project_gid: &str, wi: &WorkItem) -> CustomFieldValues {
        let mut values = CustomFieldValues::new();
        if let Some(field) = self.metadata.link_custom_field(project_gid).await {
            values.insert(field.gid, wi.url.clone());
        }
        values
    }

    /// Attach the synced tag to the task. A failure here never fails the
    /// reconciliation.
    async fn add_synced_tag(&self, workspace: &str, task_gid: &str) {
        let Some(tag) = self.metadata.synced_tag(workspace).await else {
            return;
        };
        if let Err(e) = self.asana.add_tag_to_task(task_gid, &tag.gid).await {
            log::warn!("failed to add synced tag to task {task_gid}: {e}");
        }
    }
}

fn new_mapping(wi: &WorkItem, project_gid: &str, task_gid: &str) -> TaskMapping {
    let now = Utc::now();
    TaskMapping {
        id: 0,
        ado_project_id: wi.team_project.clone(),
        ado_task_id: wi.id,
        ado_last_updated: wi.changed_date,
        asana_project_gid: project_gid.to_string(),
        asana_task_gid: task_gid.to_string(),
        asana_last_updated: now,
        created_at: now,
        updated_at: now,
    }
}
