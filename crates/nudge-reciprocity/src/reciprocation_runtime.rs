//! Appreciation reciprocation pipeline.
//!
//! Each notice runs classify → target check → policy gate → friend check →
//! VIP limit → reciprocate → record, in that order, exactly once. The handler
//! never returns an error: every abort is reported as a
//! [`ReciprocationOutcome`] with a stable reason code and logged through
//! `tracing`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::appreciation_event::{classify_appreciation_event, AppreciationEvent, AppreciationKind};
use crate::friend_directory::{lookup_friend, vip_flag_from_stranger_info, FriendLookup};
use crate::identity::{GroupId, UserId};
use crate::onebot_api::{
    friend_poke_params, group_poke_params, send_like_params, stranger_info_params, OneBotApi,
    ACTION_FRIEND_POKE, ACTION_GET_FRIEND_LIST, ACTION_GET_STRANGER_INFO, ACTION_GROUP_POKE,
    ACTION_SEND_LIKE,
};
use crate::reciprocation_config::ReciprocationStrategy;
use crate::reciprocation_state::ReciprocationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
/// Outbound action chosen to answer an appreciation event.
pub enum ReciprocationAction {
    FriendPoke { user_id: UserId },
    GroupPoke { group_id: GroupId, user_id: UserId },
    SendLike { user_id: UserId, times: u32 },
}

impl ReciprocationAction {
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::FriendPoke { .. } => ACTION_FRIEND_POKE,
            Self::GroupPoke { .. } => ACTION_GROUP_POKE,
            Self::SendLike { .. } => ACTION_SEND_LIKE,
        }
    }

    pub fn params(&self) -> Value {
        match *self {
            Self::FriendPoke { user_id } => friend_poke_params(user_id),
            Self::GroupPoke { group_id, user_id } => group_poke_params(group_id, user_id),
            Self::SendLike { user_id, times } => send_like_params(user_id, times),
        }
    }
}

/// Picks the reciprocation for `event` under `strategy`.
pub fn select_reciprocation_action(
    event: &AppreciationEvent,
    strategy: ReciprocationStrategy,
) -> ReciprocationAction {
    let user_id = event.actor_id;
    match event.kind {
        AppreciationKind::Poke => match event.group_id {
            Some(group_id) => ReciprocationAction::GroupPoke { group_id, user_id },
            None => ReciprocationAction::FriendPoke { user_id },
        },
        AppreciationKind::ThumbUp | AppreciationKind::ProfileLike => match strategy {
            ReciprocationStrategy::PokeOnly => ReciprocationAction::FriendPoke { user_id },
            ReciprocationStrategy::SendLike => ReciprocationAction::SendLike {
                user_id,
                times: event.magnitude,
            },
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason_code", rename_all = "snake_case")]
/// Enumerates why an appreciation event was not reciprocated.
pub enum ReciprocationSkipReason {
    SelfIdentityUninitialized,
    TargetMismatch,
    AutoReplyDisabled,
    Blacklisted,
    FriendListUnavailable,
    FriendListMalformed,
    NotFriend,
    VipLimitReached { count: u32, limit: u32 },
    ReciprocationFailed,
}

impl ReciprocationSkipReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::SelfIdentityUninitialized => "self_identity_uninitialized",
            Self::TargetMismatch => "target_mismatch",
            Self::AutoReplyDisabled => "auto_reply_disabled",
            Self::Blacklisted => "blacklisted",
            Self::FriendListUnavailable => "friend_list_unavailable",
            Self::FriendListMalformed => "friend_list_malformed",
            Self::NotFriend => "not_friend",
            Self::VipLimitReached { .. } => "vip_limit_reached",
            Self::ReciprocationFailed => "reciprocation_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Terminal result of one pipeline invocation.
pub enum ReciprocationOutcome {
    NotApplicable,
    Skipped {
        kind: AppreciationKind,
        actor_id: UserId,
        reason: ReciprocationSkipReason,
    },
    Reciprocated {
        kind: AppreciationKind,
        actor_id: UserId,
        action: ReciprocationAction,
        vip: Option<bool>,
        ledger_count: u32,
    },
}

impl ReciprocationOutcome {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Skipped { reason, .. } => reason.reason_code(),
            Self::Reciprocated { .. } => "reciprocated",
        }
    }

    pub fn is_reciprocated(&self) -> bool {
        matches!(self, Self::Reciprocated { .. })
    }

    pub fn skip_reason(&self) -> Option<&ReciprocationSkipReason> {
        match self {
            Self::Skipped { reason, .. } => Some(reason),
            Self::NotApplicable | Self::Reciprocated { .. } => None,
        }
    }
}

fn skipped(event: &AppreciationEvent, reason: ReciprocationSkipReason) -> ReciprocationOutcome {
    ReciprocationOutcome::Skipped {
        kind: event.kind,
        actor_id: event.actor_id,
        reason,
    }
}

/// Runs one raw notice through the pipeline against the shared `state`.
pub async fn handle_appreciation_event(
    state: &ReciprocationState,
    api: &dyn OneBotApi,
    raw: &Value,
) -> ReciprocationOutcome {
    tracing::debug!(event = %raw, "appreciation handler received event");

    let Some(event) = classify_appreciation_event(raw) else {
        return ReciprocationOutcome::NotApplicable;
    };
    let actor_id = event.actor_id;

    if event.kind.requires_target_check() {
        match state.self_id() {
            None => {
                tracing::warn!(
                    kind = event.kind.as_str(),
                    actor_id = %actor_id,
                    reason_code = "self_identity_uninitialized",
                    "bot self identity is not initialized yet, skipping appreciation event"
                );
                return skipped(&event, ReciprocationSkipReason::SelfIdentityUninitialized);
            }
            Some(self_id) if event.target_id != Some(self_id) => {
                return skipped(&event, ReciprocationSkipReason::TargetMismatch);
            }
            Some(_) => {}
        }
    }

    let config = state.config();
    if !config.auto_reply_enabled {
        return skipped(&event, ReciprocationSkipReason::AutoReplyDisabled);
    }

    tracing::info!(
        kind = event.kind.as_str(),
        actor_id = %actor_id,
        magnitude = event.magnitude,
        "received appreciation"
    );

    if config.is_blacklisted(actor_id) {
        tracing::info!(
            actor_id = %actor_id,
            reason_code = "blacklisted",
            "actor is blacklisted, not reciprocating"
        );
        return skipped(&event, ReciprocationSkipReason::Blacklisted);
    }

    if let Err(reason) = verify_friendship(api, actor_id).await {
        return skipped(&event, reason);
    }

    let vip = lookup_vip_status(api, actor_id).await;

    let _actor_guard = state.actor_locks().acquire(actor_id).await;
    let ledger = state.ledger();
    // A rollover during the call opens a window this reciprocation was never checked against.
    let checked_window = ledger.window_key();
    if vip == Some(true) {
        let count = ledger.count(actor_id);
        if count >= config.daily_vip_limit {
            tracing::info!(
                actor_id = %actor_id,
                count,
                limit = config.daily_vip_limit,
                reason_code = "vip_limit_reached",
                "vip actor reached the daily reciprocation limit"
            );
            return skipped(
                &event,
                ReciprocationSkipReason::VipLimitReached {
                    count,
                    limit: config.daily_vip_limit,
                },
            );
        }
    }

    let action = select_reciprocation_action(&event, config.strategy);
    match api.call_api(action.action_name(), action.params()).await {
        Ok(_) => {
            let ledger_count = ledger.increment_in_window(actor_id, checked_window.as_deref());
            tracing::info!(
                kind = event.kind.as_str(),
                actor_id = %actor_id,
                action = action.action_name(),
                ledger_count,
                "reciprocated appreciation"
            );
            ReciprocationOutcome::Reciprocated {
                kind: event.kind,
                actor_id,
                action,
                vip,
                ledger_count,
            }
        }
        Err(error) => {
            tracing::error!(
                actor_id = %actor_id,
                action = action.action_name(),
                error = %error,
                reason_code = "reciprocation_failed",
                "failed to reciprocate appreciation"
            );
            skipped(&event, ReciprocationSkipReason::ReciprocationFailed)
        }
    }
}

async fn verify_friendship(
    api: &dyn OneBotApi,
    actor_id: UserId,
) -> Result<(), ReciprocationSkipReason> {
    let response = match api.call_api(ACTION_GET_FRIEND_LIST, json!({})).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(
                actor_id = %actor_id,
                error = %error,
                reason_code = "friend_list_unavailable",
                "failed to fetch friend list"
            );
            return Err(ReciprocationSkipReason::FriendListUnavailable);
        }
    };
    match lookup_friend(&response, actor_id) {
        FriendLookup::Friend => Ok(()),
        FriendLookup::NotFriend => {
            tracing::info!(
                actor_id = %actor_id,
                reason_code = "not_friend",
                "actor is not a friend, not reciprocating"
            );
            Err(ReciprocationSkipReason::NotFriend)
        }
        FriendLookup::Malformed => {
            tracing::warn!(
                actor_id = %actor_id,
                response = %response,
                reason_code = "friend_list_malformed",
                "friend list response has an unexpected shape"
            );
            Err(ReciprocationSkipReason::FriendListMalformed)
        }
    }
}

/// `None` when the lookup failed; the limit check is then skipped.
async fn lookup_vip_status(api: &dyn OneBotApi, actor_id: UserId) -> Option<bool> {
    match api
        .call_api(ACTION_GET_STRANGER_INFO, stranger_info_params(actor_id))
        .await
    {
        Ok(response) => Some(vip_flag_from_stranger_info(&response)),
        Err(error) => {
            tracing::warn!(
                actor_id = %actor_id,
                error = %error,
                "failed to fetch user info, vip limit not checked"
            );
            None
        }
    }
}

#[derive(Clone)]
/// Cloneable pairing of shared state and the outbound API for spawned handlers.
pub struct AppreciationRuntime {
    state: Arc<ReciprocationState>,
    api: Arc<dyn OneBotApi>,
}

impl AppreciationRuntime {
    pub fn new(state: Arc<ReciprocationState>, api: Arc<dyn OneBotApi>) -> Self {
        Self { state, api }
    }

    pub fn state(&self) -> &Arc<ReciprocationState> {
        &self.state
    }

    pub async fn handle_event(&self, raw: &Value) -> ReciprocationOutcome {
        handle_appreciation_event(&self.state, self.api.as_ref(), raw).await
    }
}
