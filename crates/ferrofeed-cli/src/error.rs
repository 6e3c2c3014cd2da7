use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ferrofeed_core::ValidationError),

    #[error(transparent)]
    Config(#[from] ferrofeed_core::ConfigError),

    #[error("command error: {0}")]
    Command(String),

    #[error("all {failed} keys failed")]
    AllKeysFailed { failed: usize },

    #[error("cursor file {path}: {source}")]
    CursorFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::AllKeysFailed { .. } => 3,
            Self::CursorFile { .. } => 4,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
