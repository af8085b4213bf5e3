pub mod attendance;
pub mod classes;
pub mod detector;
pub mod lbph;
pub mod operator;
pub mod quality;
pub mod register;
pub mod train;

#[cfg(test)]
pub(crate) mod testing;

pub use attendance::AttendanceSession;
pub use detector::{FaceBox, FaceDetector, OnnxFaceDetector};
pub use lbph::{FaceRecognizer, LbphModel, LbphParams, Prediction};
pub use operator::{Operator, OperatorKey, Overlay, OverlayKind};
pub use quality::CaptureQuality;
pub use register::{PendingRegistration, RegistrationRequest};
pub use train::{train_model, TrainingReport};
