pub mod app;
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod notify;
pub mod remote;
pub mod storage;

pub use app::App;
pub use camera::{Camera, FrameSource};
pub use common::{AttendanceError, BackendKind, Config, DataDirs, Result};
pub use core::{AttendanceSession, FaceDetector, FaceRecognizer, LbphModel};
pub use notify::{Notifier, TelegramNotifier};
pub use remote::{RemoteStore, SupabaseClient};
pub use storage::{Backend, LocalStore};
