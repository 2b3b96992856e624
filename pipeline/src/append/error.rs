use crate::host::HostError;

#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("Could not find file for asset {asset}")]
    FileNotFound { asset: String },
    #[error("Material '{asset}' has no target object")]
    MissingTarget { asset: String },
    #[error("Scene mutation failed: {0}")]
    Host(#[from] HostError),
}

impl AppendError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            AppendError::FileNotFound { asset } => {
                format!("The downloaded file for '{}' is missing.", asset)
            }
            AppendError::MissingTarget { asset } => {
                format!("Select an object to apply '{}' to.", asset)
            }
            AppendError::Host(e) => e.to_string(),
        }
    }
}
