pub mod attendance;
pub mod export;
pub mod leave;
pub mod reports;
pub mod task;
pub mod worksheet;
