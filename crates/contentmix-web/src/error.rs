use thiserror::Error;

/// Startup and serving failures of the `contentmix` binary, mapped to exit codes.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Configuration(#[from] contentmix_core::ConfigurationError),

    #[error("failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Bind { .. } => 3,
            Self::Io(_) => 10,
        }
    }
}
