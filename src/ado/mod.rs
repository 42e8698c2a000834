pub mod work_item;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

pub use work_item::WorkItem;

const API_VERSION: &str = "7.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Reference to a changed work item, as returned by a WIQL query.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemRef {
    pub id: i64,
}

/// Capabilities the sync engine needs from Azure DevOps.
#[async_trait]
pub trait AdoApi: Send + Sync {
    /// List references to work items changed after `since`, most recent
    /// first.
    async fn list_changed(&self, since: DateTime<Utc>) -> Result<Vec<WorkItemRef>>;

    /// Fetch one work item by id.
    async fn get_work_item(&self, id: i64) -> Result<WorkItem>;
}

/// Azure DevOps REST client authenticated with a personal access token.
pub struct AdoClient {
    http: reqwest::Client,
    org_url: String,
    pat: String,
}

impl AdoClient {
    pub fn new(org_url: &str, pat: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("building ADO client: {e}")))?;
        Ok(Self {
            http,
            org_url: org_url.trim_end_matches('/').to_string(),
            pat: pat.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    work_items: Vec<WorkItemRef>,
}

#[derive(Debug, Deserialize)]
struct WorkItemResponse {
    id: i64,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
    url: Option<String>,
    #[serde(rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    html: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

impl WorkItemResponse {
    fn field_str(&self, name: &str) -> String {
        match self.fields.get(name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            // Identity fields come back as an object with a display name.
            Some(serde_json::Value::Object(o)) => o
                .get("displayName")
                .or_else(|| o.get("uniqueName"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    fn field_time(&self, name: &str) -> Option<DateTime<Utc>> {
        let raw = self.field_str(name);
        if raw.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Prefer the human-facing edit URL over the REST resource URL.
    fn item_url(&self) -> String {
        if let Some(links) = &self.links {
            if let Some(html) = &links.html {
                return html.href.clone();
            }
        }
        self.url.clone().unwrap_or_default()
    }
}

#[async_trait]
impl AdoApi for AdoClient {
    async fn list_changed(&self, since: DateTime<Utc>) -> Result<Vec<WorkItemRef>> {
        let query = format!(
            "SELECT [System.Id], [System.Title], [System.State] FROM workitems \
             WHERE [System.ChangedDate] > '{}' ORDER BY [System.ChangedDate] DESC",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let url = format!("{}/_apis/wit/wiql?api-version={API_VERSION}", self.org_url);

        let resp = self
            .http
            .post(&url)
            .basic_auth("", Some(&self.pat))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| Error::Ado(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Ado(format!("wiql query failed ({status}): {body}")));
        }

        let result: WiqlResponse = resp.json().await.map_err(|e| Error::Ado(e.to_string()))?;
        Ok(result.work_items)
    }

    async fn get_work_item(&self, id: i64) -> Result<WorkItem> {
        let url = format!(
            "{}/_apis/wit/workitems/{id}?api-version={API_VERSION}",
            self.org_url
        );

        let resp = self
            .http
            .get(&url)
            .basic_auth("", Some(&self.pat))
            .send()
            .await
            .map_err(|e| Error::Ado(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Ado(format!(
                "get work item {id} failed ({status}): {body}"
            )));
        }

        let raw: WorkItemResponse = resp.json().await.map_err(|e| Error::Ado(e.to_string()))?;

        let title = raw.field_str("System.Title");
        if title.is_empty() {
            return Err(Error::MissingField("Title"));
        }
        let work_item_type = raw.field_str("System.WorkItemType");
        if work_item_type.is_empty() {
            return Err(Error::MissingField("WorkItemType"));
        }
        let state = raw.field_str("System.State");
        if state.is_empty() {
            return Err(Error::MissingField("State"));
        }
        let changed_date = raw
            .field_time("System.ChangedDate")
            .ok_or(Error::MissingField("ChangedDate"))?;

        Ok(WorkItem {
            id: raw.id,
            title,
            work_item_type,
            state,
            assigned_to: raw.field_str("System.AssignedTo"),
            created_date: raw.field_time("System.CreatedDate"),
            changed_date,
            url: raw.item_url(),
            team_project: raw.field_str("System.TeamProject"),
        })
    }
}
