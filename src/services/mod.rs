pub mod file_access;
pub mod host;
pub mod log_dirs;
pub mod session;
pub mod tracing_setup;
