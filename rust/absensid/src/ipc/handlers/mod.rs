pub mod attendance;
pub mod auth;
pub mod classes;
pub mod core;
pub mod import;
pub mod reports;
pub mod setup;
pub mod students;
