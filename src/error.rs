use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// No task in the remaining set can ever become ready. Raised for cycles
    /// and for dependencies on tasks that are never defined.
    #[error("Cycle detected in task DAG (unresolvable: {})", .pending.join(", "))]
    CycleDetected { pending: Vec<String> },

    #[error("Task {task} depends on undefined task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Tool {name} failed: {message}")]
    Tool { name: String, message: String },
}

impl Error {
    /// Structural errors abort an orchestration run before or between waves,
    /// independently of what any task callback returned.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::CycleDetected { .. } | Error::UnknownDependency { .. }
        )
    }

    /// Name of the task whose callback failed, if this is a task failure.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Error::TaskFailed { task, .. } => Some(task),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
