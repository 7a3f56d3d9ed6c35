use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResticError {
    #[error("restic command failed: {0}")]
    CommandFailed(String),

    #[error("failed to parse restic JSON output: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("backup repository does not exist")]
    RepositoryNotFound,

    #[error("invalid repository password")]
    InvalidPassword,

    #[error("failed to lock backup repository")]
    RepositoryLocked,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ResticError {
    /// Map restic's documented exit codes to typed errors.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            10 => ResticError::RepositoryNotFound,
            11 => ResticError::RepositoryLocked,
            12 => ResticError::InvalidPassword,
            _ => ResticError::CommandFailed(format!("restic exited with status {code}")),
        }
    }
}
