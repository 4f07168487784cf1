use chorus_api::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("invalid argument {0}")]
    InvalidArgument(String),
    #[error("store unavailable {0}")]
    StoreUnavailable(String),
    #[error("mirror {0}")]
    MirrorFailed(String),
    #[error("push undeliverable")]
    PushUndeliverable,
    #[error("fanout failed")]
    FanoutFailed,
    #[error("not a member")]
    NotAMember,
    #[error("group has no members")]
    GroupEmpty,
    #[error("transport {0}")]
    Transport(String),
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::InvalidArgument(err.to_string())
    }
}

impl CoreError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            CoreError::StoreUnavailable(_) | CoreError::MirrorFailed(_) | CoreError::Transport(_)
        )
    }
}
