pub use log::{debug, error, info, trace, warn};
use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Parse,
    InvalidIdentifier,
    KeyNotFound,
    Unlock,
    SourceNotFound,
    InvalidOutputDir,
    Signing,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing required configuration: {0}")]
    Configuration(String),
    #[error("Failed to read secret keyring from {path:?}")]
    KeyringRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not parse secret keyring")]
    Parse(#[source] anyhow::Error),
    #[error("Secret keyring does not contain any secret keys")]
    NoSecretKeys,
    #[error("Key id is not a valid hex string: {identifier:?}")]
    InvalidIdentifier { identifier: String },
    #[error("No secret key in keyring matches key id {identifier:?}")]
    KeyNotFound { identifier: String },
    #[error("Failed to unlock secret key {key_id}")]
    Unlock {
        key_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("File to sign not found: {path:?}")]
    SourceNotFound { path: PathBuf },
    #[error("Output directory is not a directory: {path:?}")]
    OutputDirNotDirectory { path: PathBuf },
    #[error("Failed to create output directory {path:?}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to sign {path:?}")]
    Signing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to read from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write signature to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to prepare the batch")]
    Prepare(#[source] tokio::task::JoinError),
    #[error("Signing worker for {path:?} did not complete")]
    Worker {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::KeyringRead { .. } | Error::Parse(_) | Error::NoSecretKeys => ErrorKind::Parse,
            Error::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Error::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            Error::Unlock { .. } => ErrorKind::Unlock,
            Error::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            Error::OutputDirNotDirectory { .. } | Error::CreateOutputDir { .. } => {
                ErrorKind::InvalidOutputDir
            }
            Error::Signing { .. } => ErrorKind::Signing,
            Error::Read { .. }
            | Error::Write { .. }
            | Error::Prepare(_)
            | Error::Worker { .. } => ErrorKind::Io,
        }
    }
}
