//! Outbound OneBot action contract consumed by the reciprocation pipeline.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::identity::{GroupId, UserId};

pub const ACTION_GET_FRIEND_LIST: &str = "get_friend_list";
pub const ACTION_GET_STRANGER_INFO: &str = "get_stranger_info";
pub const ACTION_GET_LOGIN_INFO: &str = "get_login_info";
pub const ACTION_FRIEND_POKE: &str = "friend_poke";
pub const ACTION_GROUP_POKE: &str = "group_poke";
pub const ACTION_SEND_LIKE: &str = "send_like";

/// Errors raised by an outbound action call.
#[derive(Debug, Error)]
pub enum OneBotApiError {
    #[error("onebot action '{action}' transport failure: {message}")]
    Transport { action: String, message: String },
    #[error("onebot action '{action}' returned http status {status}: {body}")]
    HttpStatus {
        action: String,
        status: u16,
        body: String,
    },
    #[error("onebot action '{action}' failed with retcode {retcode}: {message}")]
    ActionFailed {
        action: String,
        retcode: i64,
        message: String,
    },
    #[error("onebot action '{action}' returned an invalid response: {message}")]
    InvalidResponse { action: String, message: String },
}

impl OneBotApiError {
    pub fn action(&self) -> &str {
        match self {
            Self::Transport { action, .. }
            | Self::HttpStatus { action, .. }
            | Self::ActionFailed { action, .. }
            | Self::InvalidResponse { action, .. } => action,
        }
    }
}

#[async_trait]
/// Request/response action call against the bot account's OneBot endpoint.
pub trait OneBotApi: Send + Sync {
    async fn call_api(&self, action: &str, params: Value) -> Result<Value, OneBotApiError>;
}

pub fn friend_poke_params(user_id: UserId) -> Value {
    json!({ "user_id": user_id.get() })
}

pub fn group_poke_params(group_id: GroupId, user_id: UserId) -> Value {
    json!({ "group_id": group_id.get(), "user_id": user_id.get() })
}

pub fn send_like_params(user_id: UserId, times: u32) -> Value {
    json!({ "user_id": user_id.get(), "times": times })
}

pub fn stranger_info_params(user_id: UserId) -> Value {
    json!({ "user_id": user_id.get() })
}

/// Reads the bot's own account id from a `get_login_info` response.
pub fn login_user_id_from_response(response: &Value) -> Option<UserId> {
    let body = match response.get("data") {
        Some(data) if data.is_object() => data,
        _ => response,
    };
    body.get("user_id").and_then(UserId::from_value)
}

/// Resolves the bot's own identity through `get_login_info`.
pub async fn resolve_self_identity(api: &dyn OneBotApi) -> Result<UserId, OneBotApiError> {
    let response = api.call_api(ACTION_GET_LOGIN_INFO, json!({})).await?;
    login_user_id_from_response(&response).ok_or_else(|| OneBotApiError::InvalidResponse {
        action: ACTION_GET_LOGIN_INFO.to_string(),
        message: "response did not contain a numeric user_id".to_string(),
    })
}
