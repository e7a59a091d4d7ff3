//! Wire frames exchanged between chat clients and the relay.
//!
//! Every frame is a JSON object tagged by `type`. Field names are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, server-assigned identity of one live connection.
pub type ConnectionId = String;

/// A participant as tracked by the relay's presence registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub preferred_language: String,
    pub joined_at: DateTime<Utc>,
}

/// A message after the relay stamped it, as seen by every receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Canonical id assigned by the relay
    pub id: String,

    /// The composer's provisional id, echoed back for reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_id: Option<String>,

    pub sender_id: ConnectionId,
    pub sender_name: String,
    pub original_text: String,
    pub source_language: String,
    pub timestamp: DateTime<Utc>,
}

/// Join handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default, alias = "name", alias = "username")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

/// Language change payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageChange {
    #[serde(alias = "language")]
    pub preferred_language: String,
}

/// Message send payload, before the relay stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Provisional id generated by the composing client
    pub id: String,
    #[serde(alias = "message")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Client → relay frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    UserJoin(JoinRequest),
    LanguageChange(LanguageChange),
    SendMessage(OutboundMessage),
}

/// Relay → client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// First frame on every connection, carrying its server-assigned identity
    Welcome { connection_id: ConnectionId },

    /// Full presence snapshot, sent to everyone after any registry change
    UserList { participants: Vec<Participant> },

    /// A stamped message, sent to every connection including the sender
    ReceiveMessage(ChatMessage),

    /// Transmission acknowledgment, sent only to the composer
    Ack { id: String },

    /// Non-fatal problem on this connection (e.g. `lagged`, `bad_frame`)
    Error { code: String, message: String },
}

impl ServerFrame {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_accepts_legacy_name_field() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "user_join",
            "name": "Asha",
            "preferredLanguage": "hi"
        }))
        .unwrap();

        assert_eq!(
            frame,
            ClientFrame::UserJoin(JoinRequest {
                display_name: Some("Asha".to_string()),
                preferred_language: Some("hi".to_string()),
            })
        );
    }

    #[test]
    fn test_join_with_no_fields() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"user_join"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::UserJoin(JoinRequest {
                display_name: None,
                preferred_language: None
            })
        );
    }

    #[test]
    fn test_language_change_accepts_language_alias() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"language_change","language":"ta"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::LanguageChange(LanguageChange {
                preferred_language: "ta".to_string()
            })
        );
    }

    #[test]
    fn test_send_message_accepts_message_alias_and_optional_fields() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"send_message","id":"p1","message":"Hello"}"#)
                .unwrap();
        match frame {
            ClientFrame::SendMessage(msg) => {
                assert_eq!(msg.id, "p1");
                assert_eq!(msg.text, "Hello");
                assert!(msg.source_language.is_none());
                assert!(msg.timestamp.is_none());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_server_frames_use_snake_case_tags_and_camel_case_fields() {
        let welcome = serde_json::to_value(ServerFrame::Welcome {
            connection_id: "c1".to_string(),
        })
        .unwrap();
        assert_eq!(welcome, json!({"type": "welcome", "connectionId": "c1"}));

        let ack = serde_json::to_value(ServerFrame::Ack { id: "p1".to_string() }).unwrap();
        assert_eq!(ack, json!({"type": "ack", "id": "p1"}));
    }

    #[test]
    fn test_receive_message_is_flattened() {
        let msg = ChatMessage {
            id: "m1".to_string(),
            provisional_id: None,
            sender_id: "c1".to_string(),
            sender_name: "Asha".to_string(),
            original_text: "Hello".to_string(),
            source_language: "en".to_string(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(ServerFrame::ReceiveMessage(msg)).unwrap();

        assert_eq!(json["type"], "receive_message");
        assert_eq!(json["originalText"], "Hello");
        assert_eq!(json["senderId"], "c1");
        assert!(json.get("provisionalId").is_none());
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"typing"}"#).is_err());
    }
}
