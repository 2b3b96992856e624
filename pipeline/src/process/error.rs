use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write render data: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProcessError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            ProcessError::Spawn { program, .. } => format!(
                "Could not start the renderer ({}). Check the renderer path in preferences.",
                program.display()
            ),
            ProcessError::Io(e) => format!("Error in thumbnailer: {}", e),
            ProcessError::Encode(e) => format!("Error in thumbnailer: {}", e),
        }
    }
}
