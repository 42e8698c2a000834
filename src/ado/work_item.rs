use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// The fields we care about on an Azure DevOps work item.
#[derive(Debug, Clone, Default)]
pub struct WorkItem {
    pub id: i64,
    pub title: String,
    pub work_item_type: String,
    pub state: String,
    pub assigned_to: String,
    pub created_date: Option<DateTime<Utc>>,
    pub changed_date: DateTime<Utc>,
    pub url: String,
    pub team_project: String,
}

impl WorkItem {
    /// Formatted work item title: `<Type> <Number>: <Title>`.
    pub fn format_title(&self) -> Result<String> {
        if self.title.is_empty() {
            return Err(Error::MissingField("Title"));
        }
        if self.work_item_type.is_empty() {
            return Err(Error::MissingField("WorkItemType"));
        }
        if self.id == 0 {
            return Err(Error::MissingField("ID"));
        }
        Ok(format!("{} {}: {}", self.work_item_type, self.id, self.title))
    }

    /// Formatted title with the type/number prefix wrapped in a link back
    /// to the work item: `<a href="URL"><Type> <Number>:</a> <Title>`.
    pub fn format_title_with_link(&self) -> Result<String> {
        self.format_title()?;
        if self.url.is_empty() {
            return Err(Error::MissingField("URL"));
        }
        let prefix = format!("{} {}:", self.work_item_type, self.id);
        Ok(format!(
            r#"<a href="{}">{}</a> {}"#,
            self.url, prefix, self.title
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_title() {
        let wi = WorkItem {
            id: 123,
            title: "Crash on launch".into(),
            work_item_type: "Bug".into(),
            ..Default::default()
        };
        assert_eq!(wi.format_title().unwrap(), "Bug 123: Crash on launch");
    }

    #[test]
    fn test_format_title_feature() {
        let wi = WorkItem {
            id: 456,
            title: "Add login support".into(),
            work_item_type: "Feature".into(),
            ..Default::default()
        };
        assert_eq!(wi.format_title().unwrap(), "Feature 456: Add login support");
    }

    #[test]
    fn test_format_title_missing_fields() {
        let wi = WorkItem {
            id: 789,
            work_item_type: "Task".into(),
            ..Default::default()
        };
        assert!(matches!(
            wi.format_title(),
            Err(Error::MissingField("Title"))
        ));

        let wi = WorkItem {
            id: 101,
            title: "Untyped work item".into(),
            ..Default::default()
        };
        assert!(matches!(
            wi.format_title(),
            Err(Error::MissingField("WorkItemType"))
        ));

        let wi = WorkItem {
            title: "No number".into(),
            work_item_type: "Bug".into(),
            ..Default::default()
        };
        assert!(matches!(wi.format_title(), Err(Error::MissingField("ID"))));
    }

    #[test]
    fn test_format_title_with_link() {
        let wi = WorkItem {
            id: 123,
            title: "Crash on launch".into(),
            work_item_type: "Bug".into(),
            url: "https://dev.azure.com/org/project/_workitems/edit/123".into(),
            ..Default::default()
        };
        assert_eq!(
            wi.format_title_with_link().unwrap(),
            r#"<a href="https://dev.azure.com/org/project/_workitems/edit/123">Bug 123:</a> Crash on launch"#
        );
    }

    #[test]
    fn test_format_title_with_link_missing_url() {
        let wi = WorkItem {
            id: 123,
            title: "Crash on launch".into(),
            work_item_type: "Bug".into(),
            ..Default::default()
        };
        assert!(matches!(
            wi.format_title_with_link(),
            Err(Error::MissingField("URL"))
        ));
    }
}
