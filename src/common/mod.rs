pub mod config;
pub mod error;
pub mod paths;

pub use config::{BackendKind, Config};
pub use error::{AttendanceError, Result};
pub use paths::DataDirs;
