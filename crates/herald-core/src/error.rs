use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeraldError {
    // Collaborator errors
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Collaborator timeout after {timeout_ms}ms: {collaborator}")]
    CollaboratorTimeout {
        collaborator: String,
        timeout_ms: u64,
    },

    // Workflow errors
    #[error("Invalid resume input: {0}")]
    InvalidResumeInput(String),

    #[error("Campaign goal must not be empty")]
    EmptyGoal,

    #[error("No route from stage {stage} on decision {decision}")]
    UnknownTransition { stage: String, decision: String },

    #[error("Invalid campaign state: {0}")]
    InvalidState(String),

    #[error("No handler registered for stage {0}")]
    MissingStage(String),

    #[error("Workflow exceeded {0} transitions without suspending or finishing")]
    TransitionLimit(usize),

    #[error("Campaign cancelled")]
    Cancelled,

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeraldError {
    /// Whether this error came from an external collaborator call.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            HeraldError::GenerationUnavailable(_)
                | HeraldError::RetrievalUnavailable(_)
                | HeraldError::ClassificationUnavailable(_)
                | HeraldError::PublishFailed(_)
                | HeraldError::CollaboratorTimeout { .. }
        )
    }

    /// Whether a collaborator failure is worth retrying at the stage level.
    ///
    /// Publishing is never retried: a half-created document is not idempotent.
    pub fn is_transient(&self) -> bool {
        match self {
            HeraldError::CollaboratorTimeout { .. } => true,
            HeraldError::GenerationUnavailable(msg)
            | HeraldError::RetrievalUnavailable(msg)
            | HeraldError::ClassificationUnavailable(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("429")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;
