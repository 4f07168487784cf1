pub mod types;
pub mod validation;

pub use types::{
    ConversationBatch, ConversationKey, ConversationSummary, CursorConversationType, GroupId,
    MessageId, MessageKind, Notification, PeerProfile, PullRequest, PullResponse, PulledMessage,
    SendGroupRequest, SendPrivateRequest, SendReceipt, StreamId, UpdateCursorRequest, UserId,
};
pub use validation::{ValidationError, ValidationLimits};
