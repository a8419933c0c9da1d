//! Task query, sorting and paging types.

use serde::{Deserialize, Serialize};

use super::{Task, TaskStatus};

/// Smallest accepted page number.
pub const MIN_PAGE: u32 = 1;
/// Page size bounds.
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Sortable task columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Priority,
    TaskId,
    Description,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Priority => "priority",
            SortField::TaskId => "task_id",
            SortField::Description => "description",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort criterion; criteria are applied in list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }
}

fn default_page() -> u32 {
    MIN_PAGE
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_sorts() -> Vec<SortSpec> {
    vec![
        SortSpec::desc(SortField::CreatedAt),
        SortSpec::desc(SortField::Priority),
    ]
}

/// Filtered, sorted, paged task listing request.
///
/// Filters: `task_id` and `status` match by equality, `description` by
/// substring containment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_sorts")]
    pub sorts: Vec<SortSpec>,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            task_id: None,
            description: None,
            status: None,
            page: default_page(),
            size: default_size(),
            sorts: default_sorts(),
        }
    }
}

impl TaskQuery {
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_description(mut self, fragment: impl Into<String>) -> Self {
        self.description = Some(fragment.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_page(mut self, page: u32, size: u32) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<SortSpec>) -> Self {
        self.sorts = sorts;
        self
    }

    /// Copy with page, size and sorts forced into their accepted ranges.
    pub fn normalized(&self) -> Self {
        let mut query = self.clone();
        query.page = query.page.max(MIN_PAGE);
        query.size = query.size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        if query.sorts.is_empty() {
            query.sorts = default_sorts();
        }
        query
    }

    /// Row offset of the requested page. Call on a normalized query.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

/// One page of a task listing plus the total row count under the same filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPage {
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub items: Vec<Task>,
}
