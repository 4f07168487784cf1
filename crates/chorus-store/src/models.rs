use chorus_api::MessageKind;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateMessageRecord {
    pub id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub content: String,
    pub msg_type: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMessageRecord {
    pub id: Uuid,
    pub group_id: String,
    pub from_user_id: String,
    pub content: String,
    pub msg_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupReadState {
    pub group_id: String,
    pub user_id: String,
    pub last_read_msg_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

pub fn kind_as_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::File => "file",
        MessageKind::Voice => "voice",
        MessageKind::System => "system",
    }
}

pub fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64).unwrap_or_else(Utc::now)
}
