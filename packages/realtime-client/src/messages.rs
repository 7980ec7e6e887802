//! Wire protocol types for the realtime channel
//!
//! This module defines the frame protocol spoken between the dashboard and
//! the realtime endpoint. Frames are serialized as JSON with a `type` tag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single wire frame, tagged by `type`
///
/// Client-originated frames are `auth`, `subscribe` and `unsubscribe`;
/// the server responds with `auth_success`, `subscribed`, `unsubscribed`,
/// `update` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Authenticate the connection with an access token
    Auth { data: AuthData },

    /// Server acknowledgement of a successful `auth`
    AuthSuccess,

    /// Request updates for one topic
    Subscribe {
        resource: ResourceKind,
        id: ResourceId,
    },

    /// Server acknowledgement of a `subscribe`
    Subscribed {
        resource: ResourceKind,
        id: ResourceId,
    },

    /// Stop updates for one topic
    Unsubscribe {
        resource: ResourceKind,
        id: ResourceId,
    },

    /// Server acknowledgement of an `unsubscribe`
    Unsubscribed {
        resource: ResourceKind,
        id: ResourceId,
    },

    /// New value or event for a subscribed topic
    Update {
        resource: ResourceKind,
        id: ResourceId,
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    /// Server-side error report; does not change connection state
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
}

impl Frame {
    /// Build an `auth` frame for the given token
    pub fn auth(token: impl Into<String>) -> Self {
        Frame::Auth {
            data: AuthData {
                token: token.into(),
            },
        }
    }

    /// Build a `subscribe` frame for a topic
    pub fn subscribe(resource: ResourceKind, id: ResourceId) -> Self {
        Frame::Subscribe { resource, id }
    }

    /// Build an `unsubscribe` frame for a topic
    pub fn unsubscribe(resource: ResourceKind, id: ResourceId) -> Self {
        Frame::Unsubscribe { resource, id }
    }
}

/// Payload of an `auth` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthData {
    pub token: String,
}

/// The kinds of server-side resources that can be subscribed to by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Task,
    TaskLogs,
    TaskStatus,
    Project,
}

impl ResourceKind {
    /// Wire name of this resource kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Task => "task",
            ResourceKind::TaskLogs => "task_logs",
            ResourceKind::TaskStatus => "task_status",
            ResourceKind::Project => "project",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(ResourceKind::Task),
            "task_logs" => Ok(ResourceKind::TaskLogs),
            "task_status" => Ok(ResourceKind::TaskStatus),
            "project" => Ok(ResourceKind::Project),
            _ => Err(()),
        }
    }
}

/// A resource identifier, numeric or string on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Num(i64),
    Str(String),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Num(n) => write!(f, "{}", n),
            ResourceId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(n: i64) -> Self {
        ResourceId::Num(n)
    }
}

impl From<i32> for ResourceId {
    fn from(n: i32) -> Self {
        ResourceId::Num(n as i64)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId::Str(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId::Str(s)
    }
}

/// Identity of one subscribable topic: a resource kind plus an id
///
/// Rendered as `resource:id` (e.g. `task:42`) in logs and registry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub resource: ResourceKind,
    pub id: ResourceId,
}

impl TopicKey {
    pub fn new(resource: ResourceKind, id: impl Into<ResourceId>) -> Self {
        Self {
            resource,
            id: id.into(),
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_frame_wire_shape() {
        let frame = Frame::auth("secret-token");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            json!({"type": "auth", "data": {"token": "secret-token"}})
        );
    }

    #[test]
    fn test_subscribe_frame_wire_shape() {
        let frame = Frame::subscribe(ResourceKind::Task, ResourceId::Num(7));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, json!({"type": "subscribe", "resource": "task", "id": 7}));
    }

    #[test]
    fn test_unsubscribe_frame_wire_shape() {
        let frame = Frame::unsubscribe(ResourceKind::Project, ResourceId::Str("p-3".into()));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            json!({"type": "unsubscribe", "resource": "project", "id": "p-3"})
        );
    }

    #[test]
    fn test_update_frame_parsing() {
        let text = r#"{"type":"update","resource":"task","id":42,"data":{"state":"running"},"timestamp":1717000000123}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        match frame {
            Frame::Update {
                resource,
                id,
                data,
                timestamp,
            } => {
                assert_eq!(resource, ResourceKind::Task);
                assert_eq!(id, ResourceId::Num(42));
                assert_eq!(data["state"], "running");
                assert_eq!(timestamp, Some(1717000000123));
            }
            other => panic!("expected update frame, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_success_parsing() {
        let frame: Frame = serde_json::from_str(r#"{"type":"auth_success"}"#).unwrap();
        assert_eq!(frame, Frame::AuthSuccess);
    }

    #[test]
    fn test_error_frame_parsing() {
        let frame: Frame =
            serde_json::from_str(r#"{"type":"error","data":{"message":"nope"}}"#).unwrap();
        match frame {
            Frame::Error { data } => assert_eq!(data.unwrap()["message"], "nope"),
            other => panic!("expected error frame, got {:?}", other),
        }

        let bare: Frame = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        assert_eq!(bare, Frame::Error { data: None });
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<Frame>(r#"{"type":"presence"}"#).is_err());
    }

    #[test]
    fn test_resource_kind_names() {
        assert_eq!(ResourceKind::Task.to_string(), "task");
        assert_eq!(ResourceKind::TaskLogs.to_string(), "task_logs");
        assert_eq!(ResourceKind::TaskStatus.to_string(), "task_status");
        assert_eq!(ResourceKind::Project.to_string(), "project");
        assert_eq!("task_logs".parse::<ResourceKind>(), Ok(ResourceKind::TaskLogs));
        assert!("playlist".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_string_resource_id_round_trip() {
        let text = r#"{"type":"subscribe","resource":"task_logs","id":"run-88"}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        assert_eq!(
            frame,
            Frame::subscribe(ResourceKind::TaskLogs, ResourceId::Str("run-88".into()))
        );
        assert_eq!(serde_json::to_string(&frame).unwrap(), text);
    }

    #[test]
    fn test_topic_key_display() {
        let key = TopicKey::new(ResourceKind::Task, 42);
        assert_eq!(key.to_string(), "task:42");

        let key = TopicKey::new(ResourceKind::Project, "p-3");
        assert_eq!(key.to_string(), "project:p-3");
    }
}
