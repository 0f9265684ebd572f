use thiserror::Error;

pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("type error: {0}")]
    Type(String),
    #[error("compile error in {filename}: {message}")]
    Compile { filename: String, message: String },
    #[error("script error: {0}")]
    Execution(String),
    #[error("illegal access violation: {caller} cannot access {origin}::{property}")]
    AccessDenied {
        caller: String,
        origin: String,
        property: String,
    },
    #[error("value is not callable")]
    NotCallable,
    #[error("value is not an object")]
    NotAnObject,
    #[error("object is frozen: cannot redefine '{0}'")]
    Frozen(String),
    #[error("property '{0}' is already defined")]
    AlreadyDefined(String),
}

impl SandboxError {
    pub fn type_error(message: impl Into<String>) -> Self {
        SandboxError::Type(message.into())
    }
}
