pub mod attendance;
pub mod batch;
pub mod chat;
pub mod employee;
pub mod export;
pub mod leave_request;
pub mod project;
pub mod report;
pub mod task;
pub mod worksheet;
