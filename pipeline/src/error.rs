use derive_more::{Display, From};

use crate::append::AppendError;
use crate::config::ConfigError;
use crate::downloads::DownloadError;
use crate::host::HostError;
use crate::process::ProcessError;

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    Cache(hana3d_cache::CacheError),

    #[from]
    Download(DownloadError),

    #[from]
    Append(AppendError),

    #[from]
    Process(ProcessError),

    #[from]
    Config(ConfigError),

    #[from]
    Host(HostError),

    /// The async runtime could not be started
    #[from]
    Runtime(std::io::Error),
}

impl std::error::Error for Error {}

impl Error {
    /// Report text suitable for the artist-facing status line
    pub fn user_message(&self) -> String {
        match self {
            Error::Cache(e) => format!("Asset cache error: {}", e),
            Error::Download(e) => e.user_message(),
            Error::Append(e) => e.user_message(),
            Error::Process(e) => e.user_message(),
            Error::Config(e) => format!("Configuration error: {}", e),
            Error::Host(e) => e.to_string(),
            Error::Runtime(e) => format!("Failed to start the scheduler: {}", e),
        }
    }
}
