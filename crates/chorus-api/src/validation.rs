use crate::types::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty field {0}")]
    Empty(&'static str),
    #[error("too long {0}")]
    TooLong(&'static str),
    #[error("out of range {0}")]
    OutOfRange(&'static str),
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("self-addressed message")]
    SelfAddressed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationLimits {
    pub max_content_bytes: usize,
    pub max_pull_limit: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_content_bytes: 64 * 1024,
            max_pull_limit: 100,
        }
    }
}

pub fn validate_user_id(user: &UserId) -> Result<(), ValidationError> {
    if user.value.trim().is_empty() {
        return Err(ValidationError::Empty("user_id"));
    }
    Ok(())
}

pub fn validate_group_id(group: &GroupId) -> Result<(), ValidationError> {
    if group.value.trim().is_empty() {
        return Err(ValidationError::Empty("group_id"));
    }
    Ok(())
}

fn validate_content(content: &str, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::Empty("content"));
    }
    if content.len() > limits.max_content_bytes {
        return Err(ValidationError::TooLong("content"));
    }
    Ok(())
}

pub fn validate_send_private(
    req: &SendPrivateRequest,
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    validate_user_id(&req.from_user)?;
    validate_user_id(&req.to_user)?;
    if req.from_user == req.to_user {
        return Err(ValidationError::SelfAddressed);
    }
    validate_content(&req.content, limits)
}

pub fn validate_send_group(
    req: &SendGroupRequest,
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    validate_user_id(&req.from_user)?;
    validate_group_id(&req.group_id)?;
    validate_content(&req.content, limits)
}

pub fn validate_pull(req: &PullRequest, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if let Some(limit) = req.limit_per_conversation {
        if limit == 0 || limit > limits.max_pull_limit {
            return Err(ValidationError::OutOfRange("limit_per_conversation"));
        }
    }
    Ok(())
}

pub fn validate_update_cursor(req: &UpdateCursorRequest) -> Result<(), ValidationError> {
    validate_user_id(&req.user)?;
    if req.last_seen_stream_id.is_zero() {
        return Err(ValidationError::OutOfRange("last_seen_stream_id"));
    }
    if matches!(req.conversation_type, CursorConversationType::Group)
        && req
            .peer_id
            .as_ref()
            .map(|p| p.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ValidationError::Missing("peer_id"));
    }
    Ok(())
}
