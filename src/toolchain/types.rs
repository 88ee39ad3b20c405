/// Error type for toolchain operations
#[derive(Debug)]
pub enum ToolchainError {
    /// No usable compiler could be located
    NotFound(String),
    /// The tool ran and reported failure; `output` is its stderr
    Failed { status: Option<i32>, output: String },
    /// IO error (usually the executable could not be spawned)
    IoError(std::io::Error),
}

impl ToolchainError {
    /// Text shown to the user for a failed step.
    pub fn output(&self) -> String {
        match self {
            ToolchainError::Failed { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ToolchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainError::NotFound(msg) => write!(f, "Toolchain not found: {}", msg),
            ToolchainError::Failed {
                status: Some(code),
                ..
            } => write!(f, "exited with status {}", code),
            ToolchainError::Failed { status: None, .. } => write!(f, "terminated by signal"),
            ToolchainError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ToolchainError {}

impl From<std::io::Error> for ToolchainError {
    fn from(e: std::io::Error) -> Self {
        ToolchainError::IoError(e)
    }
}
