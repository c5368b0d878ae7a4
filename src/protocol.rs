//! Wire model: one JSON object per TCP connection, request then response.
//! Requests are a tagged sum type keyed by the `command` field; every
//! command has its own response shape. Unknown or malformed requests are
//! answered with an Invalid command error.

use serde::{Deserialize, Serialize};

use crate::utils::types::{Address, HashPos};

pub use crate::utils::constants::MAX_FRAME_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StoreKey { key: String, value: String },
    RetrieveKey { key: String },
    DeleteKey { key: String },
    FindSuccessor { id: HashPos },
    GetPredecessor,
    GetSuccessorList,
    Notify { predecessor: Address },
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Success,
    Error,
}

/// Response to store_key and delete_key, and the catch-all error shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResponse {
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OpResponse {
    pub fn success(message: impl Into<String>) -> Self {
        OpResponse {
            status: OpStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OpResponse {
            status: OpStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn invalid_command() -> Self {
        Self::error("Invalid command")
    }

    pub fn is_success(&self) -> bool {
        self.status == OpStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RetrieveResponse {
    pub fn found(value: impl Into<String>) -> Self {
        RetrieveResponse {
            status: OpStatus::Success,
            value: Some(value.into()),
            message: None,
        }
    }

    pub fn not_found() -> Self {
        RetrieveResponse {
            status: OpStatus::Error,
            value: None,
            message: Some("Key not found".into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RetrieveResponse {
            status: OpStatus::Error,
            value: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OpStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessorResponse {
    pub successor: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredecessorResponse {
    pub predecessor: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessorListResponse {
    pub successor_list: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NotifyResponse {
    Notified { old_predecessor: Option<Address> },
    Rejected,
}

pub const STATUS_ALIVE: &str = "alive";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

impl PingResponse {
    pub fn alive() -> Self {
        PingResponse {
            status: STATUS_ALIVE.into(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == STATUS_ALIVE
    }
}

/// Everything a handler can answer with. Untagged: each variant serializes
/// as its bare response object, the caller knows which shape to expect
/// from the command it sent.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Op(OpResponse),
    Retrieve(RetrieveResponse),
    FindSuccessor(FindSuccessorResponse),
    Predecessor(PredecessorResponse),
    SuccessorList(SuccessorListResponse),
    Notify(NotifyResponse),
    Ping(PingResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_encode_with_command_tag() {
        let cmd = Command::StoreKey {
            key: "foo".into(),
            value: "1".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "store_key", "key": "foo", "value": "1"})
        );

        let ping = serde_json::to_value(Command::Ping).unwrap();
        assert_eq!(ping, serde_json::json!({"command": "ping"}));
    }

    #[test]
    fn notify_carries_address_as_array() {
        let cmd = Command::Notify {
            predecessor: Address::new("127.0.0.1", 8002),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "notify", "predecessor": ["127.0.0.1", 8002]})
        );

        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn find_successor_takes_a_numeric_id() {
        let cmd: Command = serde_json::from_str(r#"{"command":"find_successor","id":854}"#).unwrap();
        assert_eq!(cmd, Command::FindSuccessor { id: 854 });
    }

    #[test]
    fn unknown_commands_fail_to_decode() {
        assert!(serde_json::from_str::<Command>(r#"{"command":"drop_table"}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"key":"foo"}"#).is_err());
    }

    #[test]
    fn notify_response_shapes() {
        let notified = NotifyResponse::Notified {
            old_predecessor: None,
        };
        assert_eq!(
            serde_json::to_value(&notified).unwrap(),
            serde_json::json!({"status": "notified", "old_predecessor": null})
        );

        let rejected = serde_json::to_value(NotifyResponse::Rejected).unwrap();
        assert_eq!(rejected, serde_json::json!({"status": "rejected"}));
    }

    #[test]
    fn op_response_omits_absent_message() {
        let response = OpResponse {
            status: OpStatus::Success,
            message: None,
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"status":"success"}"#
        );

        let error = OpResponse::invalid_command();
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"status": "error", "message": "Invalid command"})
        );
    }

    #[test]
    fn untagged_response_serializes_bare() {
        let response = Response::FindSuccessor(FindSuccessorResponse {
            successor: Address::new("127.0.0.1", 8001),
        });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"successor": ["127.0.0.1", 8001]})
        );

        let ping = Response::Ping(PingResponse::alive());
        assert_eq!(
            serde_json::to_value(&ping).unwrap(),
            serde_json::json!({"status": "alive"})
        );
    }

    #[test]
    fn predecessor_round_trips_none_as_null() {
        let response = PredecessorResponse { predecessor: None };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"predecessor":null}"#);
        let back: PredecessorResponse = serde_json::from_str(&json).unwrap();
        assert!(back.predecessor.is_none());
    }
}
