use serde::{Deserialize, Serialize};

/// Incoming message from a push client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "callbackIds", alias = "callback_ids")]
        callback_ids: Vec<String>,
    },
    Unsubscribe {
        #[serde(rename = "callbackIds", alias = "callback_ids")]
        callback_ids: Vec<String>,
    },
}

/// Outgoing message to a push client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Items the client should re-fetch.
    Updated {
        #[serde(rename = "callbackIds")]
        callback_ids: Vec<String>,
    },
    Subscribed {
        #[serde(rename = "callbackIds")]
        callback_ids: Vec<String>,
    },
    Unsubscribed {
        #[serde(rename = "callbackIds")]
        callback_ids: Vec<String>,
    },
    Error { error: String },
}

impl PushMessage {
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}
