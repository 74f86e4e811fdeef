use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::model::{
    attendance::Attendance, leave_request::LeaveRequest, message::Message, project::Project,
    task::Task, user::UserProfile, worksheet::Worksheet,
};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams, ToSchema)]
pub struct PageQuery {
    /// Page number, starting at 1
    #[schema(example = 1)]
    pub page: Option<u32>,
    /// Items per page (1..=100)
    #[schema(example = 20)]
    pub per_page: Option<u32>,
}

/// Resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn from_parts(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Page::from_parts(q.page, q.per_page)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    PaginatedUsers = Paginated<UserProfile>,
    PaginatedAttendance = Paginated<Attendance>,
    PaginatedLeaves = Paginated<LeaveRequest>,
    PaginatedProjects = Paginated<Project>,
    PaginatedTasks = Paginated<Task>,
    PaginatedMessages = Paginated<Message>,
    PaginatedWorksheets = Paginated<Worksheet>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, page: Page, total: i64) -> Self {
        Self {
            data,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let p = Page::from_parts(None, None);
        assert_eq!((p.page, p.per_page), (1, DEFAULT_PER_PAGE));

        let p = Page::from_parts(Some(0), Some(1000));
        assert_eq!((p.page, p.per_page), (1, MAX_PER_PAGE));

        let p = Page::from_parts(Some(3), Some(0));
        assert_eq!(p.per_page, 1);
    }

    #[test]
    fn offset_is_zero_based() {
        let p = Page::from_parts(Some(3), Some(10));
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }
}
