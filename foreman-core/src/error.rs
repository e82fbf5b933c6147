use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cyclic dependencies detected at service {0}")]
    CyclicDependency(String),

    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Service {0} not found")]
    ServiceNotFound(String),

    #[error("Service {0} already has a running process")]
    AlreadyRunning(String),

    #[error("Supervisor is shutting down")]
    ShuttingDown,

    #[error("Signal handling error: {0}")]
    Signal(String),

    #[cfg(unix)]
    #[error("Unix error: {0}")]
    Unix(#[from] nix::errno::Errno),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
