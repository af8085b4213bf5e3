use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Reg Number {0} already exists!")]
    DuplicateRegistration(String),

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Class not found: {0}")]
    ClassNotFound(u64),

    #[error("No students registered to train!")]
    NoStudents,

    #[error("Model has already been trained for all students.")]
    AlreadyTrained,

    #[error("No faces found in photos!")]
    NoFacesFound,

    #[error("Train the model first!")]
    ModelNotTrained,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
