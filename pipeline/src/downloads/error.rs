#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Failed to start download: {0}")]
    Request(String),
    #[error("Download failed with status: {0}")]
    Status(u16),
    #[error("Download error: {0}")]
    Transfer(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Cache(#[from] hana3d_cache::CacheError),
    #[error("No download location for asset '{0}'")]
    NoDestination(String),
    #[error("Failed to spawn download thread: {0}")]
    Spawn(String),
}

impl DownloadError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::Request(msg) | DownloadError::Transfer(msg) => {
                format!("Network error: {}", msg)
            }
            DownloadError::Status(404) => "Asset file not found on the server.".to_string(),
            DownloadError::Status(401) | DownloadError::Status(403) => {
                "Not authorized to download this asset. Please log in again.".to_string()
            }
            DownloadError::Status(code) => format!("Server returned status {}.", code),
            DownloadError::Io(e) => format!("Failed to write asset file: {}", e),
            DownloadError::Cache(e) => format!("Asset cache error: {}", e),
            DownloadError::NoDestination(name) => {
                format!("No download directory configured for '{}'.", name)
            }
            DownloadError::Spawn(msg) => format!("Could not start download: {}", msg),
        }
    }
}
