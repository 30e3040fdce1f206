//! JSON-RPC 线缆协议
//!
//! 一条逻辑帧承载一条 UTF-8 JSON 消息：请求、应答或通知。
//! 业务错误在这里被折叠成对外不透明的错误负载，只保留稳定的
//! 类别标识和一个固定的通用错误码，不泄漏内部细节。

use domain::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// 业务错误统一折叠到这个错误码
pub const GENERIC_ERROR_CODE: i64 = 0xDEAD;

pub const METHOD_NOT_FOUND_CODE: i64 = -32601;
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// 线缆上的一条 RPC 消息
///
/// untagged 解码依赖字段组合区分变体：请求有 id + method，
/// 通知只有 method，应答有 id + result/error。顺序不能调换。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request {
        jsonrpc: String,
        id: Value,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Notification {
        jsonrpc: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Response {
        jsonrpc: String,
        id: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
}

/// RPC 错误负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcMessage {
    pub fn request(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    pub fn result(id: Value, result: Value) -> Self {
        Self::Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self::Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn encode(&self) -> ChatResult<String> {
        serde_json::to_string(self)
            .map_err(|err| ChatError::protocol(format!("message encode failed: {err}")))
    }

    pub fn decode(text: &str) -> ChatResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| ChatError::protocol(format!("message decode failed: {err}")))
    }
}

impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND_CODE,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS_CODE,
            message: message.into(),
            data: None,
        }
    }

    /// 业务错误的对外形态：固定错误码 + 固定文案，只携带稳定的类别标识
    pub fn opaque(err: &ChatError) -> Self {
        Self {
            code: GENERIC_ERROR_CODE,
            message: "request failed, contact your server-side developers".to_string(),
            data: Some(serde_json::json!({ "kind": err.kind() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrip() {
        let msg = RpcMessage::request(json!(7), "SendMessage", Some(json!({"chatId": "c1"})));
        let text = msg.encode().unwrap();
        assert_eq!(RpcMessage::decode(&text).unwrap(), msg);
    }

    #[test]
    fn notification_has_no_id() {
        let text = r#"{"jsonrpc":"2.0","method":"messageNew","params":{"chatId":"c1"}}"#;
        match RpcMessage::decode(text).unwrap() {
            RpcMessage::Notification { method, .. } => assert_eq!(method, "messageNew"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn response_decodes_as_response() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        match RpcMessage::decode(text).unwrap() {
            RpcMessage::Response { id, result, error, .. } => {
                assert_eq!(id, json!(1));
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn request_without_params_decodes() {
        let text = r#"{"jsonrpc":"2.0","id":"abc","method":"Ping"}"#;
        match RpcMessage::decode(text).unwrap() {
            RpcMessage::Request { method, params, .. } => {
                assert_eq!(method, "Ping");
                assert!(params.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let err = RpcMessage::decode("not a json").unwrap_err();
        assert!(matches!(err, domain::ChatError::Protocol { .. }));
    }

    #[test]
    fn opaque_error_hides_detail_keeps_kind() {
        let err = ChatError::concurrency("participant u1 raced on chat c1");
        let payload = RpcError::opaque(&err);
        assert_eq!(payload.code, GENERIC_ERROR_CODE);
        assert!(!payload.message.contains("u1"));
        assert_eq!(payload.data, Some(json!({ "kind": "concurrency" })));
    }
}
