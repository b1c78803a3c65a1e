use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrrError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("convergence failed: {0}")]
    Convergence(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{service} {operation} failed: {message}")]
    Service {
        service: &'static str,
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrrError {
    pub fn service(service: &'static str, operation: &'static str, message: impl ToString) -> Self {
        Self::Service {
            service,
            operation,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Discovery(_) => "DiscoveryError",
            Self::Convergence(_) => "ConvergenceError",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Service { .. } => "ServiceError",
            Self::Json(_) => "InvalidArgument",
            Self::Io(_) => "InternalError",
        }
    }

    /// Re-labels a collaborator failure as a discovery failure, keeping
    /// already classified errors as they are.
    pub fn into_discovery(self, context: &str) -> Self {
        match self {
            Self::Service { .. } | Self::Io(_) => Self::Discovery(format!("{context}: {self}")),
            other => other,
        }
    }

    pub fn into_convergence(self, context: &str) -> Self {
        match self {
            Self::Service { .. } | Self::Io(_) => Self::Convergence(format!("{context}: {self}")),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrrError>;
