pub mod attendance;
pub mod backup;
pub mod core;
pub mod grades;
pub mod reports;
pub mod setup;
pub mod students;
pub mod subjects;
