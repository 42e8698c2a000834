use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::{
    ensure_html_body, pick_tag_by_name, AsanaApi, CustomField, CustomFieldValues, Project, Tag,
    Task, Workspace,
};

const BASE_URL: &str = "https://app.asana.com/api/1.0";
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Asana REST client authenticated with a personal access token.
pub struct AsanaClient {
    http: reqwest::Client,
    base_url: String,
}

/// Standard Asana response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PagedEnvelope<T> {
    data: Vec<T>,
    next_page: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomFieldSetting {
    custom_field: CustomField,
}

impl AsanaClient {
    pub fn new(pat: &str) -> Result<Self> {
        Self::with_base_url(pat, BASE_URL)
    }

    pub fn with_base_url(pat: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {pat}"))
            .map_err(|e| Error::Config(format!("invalid Asana token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("building Asana client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET a collection endpoint, following `next_page.offset` until all
    /// pages are concatenated.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        let mut items = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut req = self
                .http
                .get(&url)
                .query(&[("limit", PAGE_SIZE.to_string())]);
            if let Some(ref o) = offset {
                req = req.query(&[("offset", o.as_str())]);
            }

            let resp = req.send().await.map_err(|e| Error::Asana(e.to_string()))?;
            let page: PagedEnvelope<T> = Self::decode(resp).await?;
            items.extend(page.data);

            match page.next_page.and_then(|p| p.offset) {
                Some(o) => offset = Some(o),
                None => return Ok(items),
            }
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Asana(format!("request failed ({status}): {body}")));
        }
        resp.json().await.map_err(|e| Error::Asana(e.to_string()))
    }

    fn task_payload(
        name: &str,
        notes: &str,
        custom_fields: &CustomFieldValues,
        project_gid: Option<&str>,
    ) -> serde_json::Value {
        let mut data = serde_json::json!({
            "name": name,
            "html_notes": ensure_html_body(notes),
        });
        if let Some(gid) = project_gid {
            data["projects"] = serde_json::json!([gid]);
        }
        if !custom_fields.is_empty() {
            data["custom_fields"] = serde_json::json!(custom_fields);
        }
        serde_json::json!({ "data": data })
    }

    async fn workspace_by_name(&self, workspace_name: &str) -> Result<Workspace> {
        let workspaces = self.list_workspaces().await?;
        workspaces
            .into_iter()
            .find(|w| w.name == workspace_name)
            .ok_or_else(|| Error::WorkspaceNotFound(workspace_name.to_string()))
    }
}

#[async_trait]
impl AsanaApi for AsanaClient {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.get_all("/workspaces").await
    }

    async fn list_projects(&self, workspace_gid: &str) -> Result<Vec<Project>> {
        self.get_all(&format!("/workspaces/{workspace_gid}/projects"))
            .await
    }

    async fn project_gid_by_name(
        &self,
        workspace_name: &str,
        project_name: &str,
    ) -> Result<String> {
        let workspace = self.workspace_by_name(workspace_name).await?;
        let projects = self.list_projects(&workspace.gid).await?;
        projects
            .into_iter()
            .find(|p| p.name == project_name)
            .map(|p| p.gid)
            .ok_or_else(|| Error::ProjectNotFound(project_name.to_string()))
    }

    async fn list_project_tasks(&self, project_gid: &str) -> Result<Vec<Task>> {
        self.get_all(&format!("/projects/{project_gid}/tasks"))
            .await
    }

    async fn create_task(
        &self,
        project_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<Task> {
        let payload = Self::task_payload(name, notes, &custom_fields, Some(project_gid));
        let resp = self
            .http
            .post(format!("{}/tasks", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Asana(e.to_string()))?;
        let envelope: Envelope<Task> = Self::decode(resp).await?;
        Ok(envelope.data)
    }

    async fn update_task(
        &self,
        task_gid: &str,
        name: &str,
        notes: &str,
        custom_fields: CustomFieldValues,
    ) -> Result<()> {
        let payload = Self::task_payload(name, notes, &custom_fields, None);
        let resp = self
            .http
            .put(format!("{}/tasks/{task_gid}", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Asana(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Asana(format!("task update failed ({status}): {body}")));
        }
        Ok(())
    }

    async fn project_custom_field_by_name(
        &self,
        project_gid: &str,
        field_name: &str,
    ) -> Result<CustomField> {
        let url = format!(
            "{}/projects/{project_gid}/custom_field_settings",
            self.base_url
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Asana(e.to_string()))?;

        // Custom fields are a premium feature; 402 means the plan lacks
        // them, which callers treat as a soft miss.
        if resp.status() == StatusCode::PAYMENT_REQUIRED {
            return Err(Error::CustomFieldsUnavailable);
        }

        let settings: PagedEnvelope<CustomFieldSetting> = {
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Asana(format!("request failed ({status}): {body}")));
            }
            resp.json().await.map_err(|e| Error::Asana(e.to_string()))?
        };

        let needle = field_name.to_lowercase();
        settings
            .data
            .into_iter()
            .map(|s| s.custom_field)
            .find(|f| f.name.to_lowercase() == needle)
            .ok_or(Error::CustomFieldNotFound)
    }

    async fn workspace_tag_by_name(&self, workspace_name: &str, tag_name: &str) -> Result<Tag> {
        let workspace = self.workspace_by_name(workspace_name).await?;
        let tags: Vec<Tag> = self
            .get_all(&format!("/workspaces/{}/tags", workspace.gid))
            .await?;
        pick_tag_by_name(&tags, tag_name).ok_or_else(|| Error::TagNotFound(tag_name.to_string()))
    }

    async fn add_tag_to_task(&self, task_gid: &str, tag_gid: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/tasks/{task_gid}/addTag", self.base_url))
            .json(&serde_json::json!({ "data": { "tag": tag_gid } }))
            .send()
            .await
            .map_err(|e| Error::Asana(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Asana(format!("add tag failed ({status}): {body}")));
        }
        Ok(())
    }
}
