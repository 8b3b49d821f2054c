use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    /// Bad caller input: empty identity, nothing to stage
    #[error("{0}")]
    Validation(String),

    #[error("No identity is associated with this authorization callback")]
    MissingIdentity,

    #[error("This authorization callback was not started from this session")]
    SessionMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Per-file failure; only ever recorded inside an `UploadOutcome`
    #[error("Upload of {file_name} failed: {message}")]
    Upload { file_name: String, message: String },

    /// A collaborator failed outside the per-file loop
    #[error("Orchestration failed: {0}")]
    Orchestration(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

pub type Result<T> = std::result::Result<T, UploadError>;
