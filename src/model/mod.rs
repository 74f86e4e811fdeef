pub mod attendance;
pub mod batch;
pub mod leave_request;
pub mod message;
pub mod project;
pub mod role;
pub mod task;
pub mod user;
pub mod worksheet;
