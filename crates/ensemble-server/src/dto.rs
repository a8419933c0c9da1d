//! Request and response shapes of the HTTP surface.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ensemble_core::types::{
    LoadStatus, PluginRegistration, PluginService, SortField, SortOrder, SortSpec, TaskQuery,
    TaskStatus,
};
use ensemble_planner::ProviderStatus;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub user_input: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Query-string form of a task listing request.
///
/// `sort` is a comma-separated list of `field` or `field:order` entries,
/// e.g. `sort=priority:desc,created_at:asc`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

impl TaskListParams {
    pub fn into_query(self) -> Result<TaskQuery, ApiError> {
        let mut query = TaskQuery::default();
        if let Some(page) = self.page {
            query.page = page;
        }
        if let Some(size) = self.size {
            query.size = size;
        }
        query.task_id = self.task_id;
        query.description = self.description;
        if let Some(status) = &self.status {
            query.status = Some(
                TaskStatus::from_str(status)
                    .map_err(|e| ApiError::InvalidArgument(e.to_string()))?,
            );
        }
        if let Some(sort) = &self.sort {
            query.sorts = parse_sorts(sort)?;
        }
        Ok(query.normalized())
    }
}

fn parse_sorts(raw: &str) -> Result<Vec<SortSpec>, ApiError> {
    let mut sorts = Vec::new();
    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let (field, order) = match entry.trim().split_once(':') {
            Some((field, order)) => (field.trim(), order.trim()),
            None => (entry.trim(), "asc"),
        };
        let field = match field {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "priority" => SortField::Priority,
            "task_id" => SortField::TaskId,
            "description" => SortField::Description,
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "unknown sort field: {other}"
                )))
            }
        };
        let order = match order {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "unknown sort order: {other}"
                )))
            }
        };
        sorts.push(SortSpec { field, order });
    }
    Ok(sorts)
}

/// External view of one plugin registration.
#[derive(Debug, Serialize)]
pub struct PluginDto {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub load_status: LoadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_enabled: bool,
    pub registered_at: DateTime<Utc>,
    pub services: Vec<PluginService>,
}

impl From<&PluginRegistration> for PluginDto {
    fn from(registration: &PluginRegistration) -> Self {
        Self {
            id: registration.id.clone(),
            name: registration.name(),
            version: registration.version(),
            description: registration.description(),
            tags: registration.tags(),
            load_status: registration.load_status,
            error: registration.error.clone(),
            is_enabled: registration.is_enabled,
            registered_at: registration.registered_at,
            services: registration.services.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: usize,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    /// Provider names in fallback order.
    pub chain: Vec<String>,
    pub providers: Vec<ProviderStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_map_to_normalized_query() {
        let params = TaskListParams {
            page: Some(0),
            size: Some(500),
            status: Some("pending".to_string()),
            sort: Some("priority:desc, created_at".to_string()),
            ..TaskListParams::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.size, 100);
        assert_eq!(query.status, Some(TaskStatus::Pending));
        assert_eq!(
            query.sorts,
            vec![
                SortSpec::desc(SortField::Priority),
                SortSpec::asc(SortField::CreatedAt),
            ]
        );
    }

    #[test]
    fn test_invalid_status_and_sort_are_rejected() {
        let params = TaskListParams {
            status: Some("sleeping".to_string()),
            ..TaskListParams::default()
        };
        assert!(matches!(
            params.into_query(),
            Err(ApiError::InvalidArgument(_))
        ));

        let params = TaskListParams {
            sort: Some("mood:desc".to_string()),
            ..TaskListParams::default()
        };
        assert!(matches!(
            params.into_query(),
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
