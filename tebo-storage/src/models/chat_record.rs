//! Chat record model for persistence.
//!
//! Maps to the `chats` table and converts to and from the wire [`Chat`].

use tebo_core::Chat;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRecord {
    pub id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&Chat> for ChatRecord {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id,
            kind: chat.kind.clone(),
            title: chat.title.clone(),
            username: chat.username.clone(),
            first_name: chat.first_name.clone(),
            last_name: chat.last_name.clone(),
        }
    }
}

impl From<ChatRecord> for Chat {
    fn from(r: ChatRecord) -> Self {
        Chat {
            id: r.id,
            kind: r.kind,
            title: r.title,
            username: r.username,
            first_name: r.first_name,
            last_name: r.last_name,
        }
    }
}
