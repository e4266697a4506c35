use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemedyError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("environment variable '{0}' is not set")]
    MissingToken(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("batch verification failed:\n{0}")]
    Verification(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("no re-run operation configured for label '{0}'")]
    UnknownOperation(String),

    #[error("command not found on PATH: {0}")]
    CommandNotFound(String),

    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{program} exited with {status}\n{output}")]
    CommandFailed {
        program: String,
        status: String,
        output: String,
    },

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("record store error: {0}")]
    RecordStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RemedyError>;
