use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ItemView, MessageView};
use crate::models::{Channel, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// The item feed changed (item created/updated/soft-deleted, or an
    /// item's status moved as part of a request transition). Carries the
    /// full current list; consumers replace, not patch.
    ItemsUpdate { items: Vec<ItemView> },

    /// One of the caller's sent or received requests changed state.
    /// Bare signal: consumers re-fetch their request lists.
    RequestsUpdate,

    /// A chat message was posted to a channel the client is subscribed to
    MessageCreate { message: MessageView },

    /// A notification was created for this user
    NotificationCreate { notification: Notification },

    /// Acknowledges a successful JoinChat
    ChatJoined { channel: Channel },

    /// The other chat participant started typing
    TypingStart { item_id: Uuid, user_id: Uuid },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join an item's chat channel. Silently ignored when the caller is
    /// not a participant of the currently accepted request.
    JoinChat { item_id: Uuid },

    /// Send a chat message (socket path; REST fallback exists too)
    SendChat { item_id: Uuid, content: String },

    /// Indicate typing in an item's chat
    TypingStart { item_id: Uuid },
}
