use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId {
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId {
    pub value: Uuid,
}

/// Position of an entry within one user log. Assigned by the log store on
/// append, strictly increasing per log. Distinct from [`MessageId`], which is
/// global and client-visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
    System,
}

/// A private pair or a group, addressed as `private:<uid>` / `group:<gid>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Private(UserId),
    Group(GroupId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendPrivateRequest {
    pub client_message_id: Option<MessageId>,
    pub from_user: UserId,
    pub to_user: UserId,
    pub content: String,
    pub kind: MessageKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGroupRequest {
    pub client_message_id: Option<MessageId>,
    pub from_user: UserId,
    pub group_id: GroupId,
    pub content: String,
    pub kind: MessageKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub created_at_ms: u64,
    pub stream_id: Option<StreamId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequest {
    pub from_stream_id: Option<StreamId>,
    pub limit_per_conversation: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PulledMessage {
    pub id: MessageId,
    pub kind: MessageKind,
    pub from_user: UserId,
    pub content: String,
    pub created_at_ms: u64,
    pub stream_id: StreamId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerProfile {
    pub title: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationBatch {
    pub conversation: ConversationKey,
    pub peer: PeerProfile,
    pub messages: Vec<PulledMessage>,
    pub unread_count: u32,
    pub last_activity_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullResponse {
    pub conversations: Vec<ConversationBatch>,
    pub total_unread: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorConversationType {
    Private,
    Group,
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCursorRequest {
    pub user: UserId,
    pub last_seen_stream_id: StreamId,
    pub conversation_type: CursorConversationType,
    pub peer_id: Option<String>,
    pub last_read_message_id: Option<MessageId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationSummary {
    pub conversation: ConversationKey,
    pub is_pinned: bool,
    pub last_activity_ms: u64,
}

/// In-flight announcement of a new message, published on the
/// `message_notifications` topic and consumed by push hosts. Not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    Private {
        msg_id: MessageId,
        to_user_id: UserId,
        from_user_id: UserId,
        content: String,
        created_at: u64,
    },
    Group {
        msg_id: MessageId,
        to_user_id: UserId,
        from_user_id: UserId,
        group_id: GroupId,
        content: String,
        created_at: u64,
    },
}

impl Notification {
    pub fn to_user(&self) -> &UserId {
        match self {
            Notification::Private { to_user_id, .. } => to_user_id,
            Notification::Group { to_user_id, .. } => to_user_id,
        }
    }

    pub fn msg_id(&self) -> &MessageId {
        match self {
            Notification::Private { msg_id, .. } => msg_id,
            Notification::Group { msg_id, .. } => msg_id,
        }
    }
}

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl GroupId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl MessageId {
    pub fn random() -> Self {
        Self {
            value: Uuid::new_v4(),
        }
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid stream id")]
pub struct ParseStreamIdError;

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s.split_once('-').ok_or(ParseStreamIdError)?;
        Ok(StreamId {
            ms: ms.parse().map_err(|_| ParseStreamIdError)?,
            seq: seq.parse().map_err(|_| ParseStreamIdError)?,
        })
    }
}

impl Serialize for StreamId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl ConversationKey {
    pub fn private(peer: impl Into<String>) -> Self {
        ConversationKey::Private(UserId::new(peer))
    }

    pub fn group(group: impl Into<String>) -> Self {
        ConversationKey::Group(GroupId::new(group))
    }
}

impl Display for ConversationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKey::Private(peer) => write!(f, "private:{}", peer.value),
            ConversationKey::Group(group) => write!(f, "group:{}", group.value),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid conversation key")]
pub struct ParseConversationKeyError;

impl FromStr for ConversationKey {
    type Err = ParseConversationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("private", peer)) if !peer.is_empty() => Ok(ConversationKey::private(peer)),
            Some(("group", group)) if !group.is_empty() => Ok(ConversationKey::group(group)),
            _ => Err(ParseConversationKeyError),
        }
    }
}

impl Serialize for ConversationKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConversationKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
