pub mod minutes;
pub mod models;
pub mod recurrence;
pub mod resize;
