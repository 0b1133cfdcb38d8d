use std::sync::Arc;

use httpmock::prelude::*;
use nudge_onebot::OneBotHttpClient;
use nudge_reciprocity::{
    AppreciationRuntime, ReciprocationConfig, ReciprocationState, UserId, VipRateLedger,
};
use serde_json::json;

const SELF_ID: u64 = 100;

fn ok(data: serde_json::Value) -> serde_json::Value {
    json!({"status": "ok", "retcode": 0, "data": data})
}

fn runtime_for(server: &MockServer, config: ReciprocationConfig) -> AppreciationRuntime {
    let client = OneBotHttpClient::new(&server.base_url(), None, 2_000).expect("client");
    let state = Arc::new(ReciprocationState::new(
        config,
        Arc::new(VipRateLedger::for_window("2024-05-01T00:00:00+08:00")),
    ));
    state.set_self_id(Some(UserId::new(SELF_ID)));
    AppreciationRuntime::new(state, Arc::new(client))
}

#[tokio::test]
async fn integration_thumb_up_round_trip_pokes_back_over_http() {
    let server = MockServer::start();
    let friends = server.mock(|when, then| {
        when.method(POST).path("/get_friend_list");
        then.status(200)
            .json_body(ok(json!([{"user_id": 55, "nickname": "a"}])));
    });
    let info = server.mock(|when, then| {
        when.method(POST)
            .path("/get_stranger_info")
            .json_body(json!({"user_id": 55}));
        then.status(200)
            .json_body(ok(json!({"user_id": 55, "vip": false})));
    });
    let poke = server.mock(|when, then| {
        when.method(POST)
            .path("/friend_poke")
            .json_body(json!({"user_id": 55}));
        then.status(200).json_body(ok(json!(null)));
    });

    let runtime = runtime_for(&server, ReciprocationConfig::default());
    let outcome = runtime
        .handle_event(&json!({
            "post_type": "notice",
            "notice_type": "thumb_up",
            "user_id": "55",
            "target_id": SELF_ID,
            "count": 3
        }))
        .await;

    assert!(outcome.is_reciprocated());
    friends.assert_calls(1);
    info.assert_calls(1);
    poke.assert_calls(1);
    assert_eq!(runtime.state().ledger().count(UserId::new(55)), 1);
}

#[tokio::test]
async fn integration_vip_profile_likes_stop_at_the_daily_limit() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/get_friend_list");
        then.status(200).json_body(ok(json!([{"user_id": 77}])));
    });
    server.mock(|when, then| {
        when.method(POST).path("/get_stranger_info");
        then.status(200).json_body(ok(json!({"user_id": 77, "vip": true})));
    });
    let poke = server.mock(|when, then| {
        when.method(POST)
            .path("/friend_poke")
            .json_body(json!({"user_id": 77}));
        then.status(200).json_body(ok(json!(null)));
    });

    let runtime = runtime_for(
        &server,
        ReciprocationConfig {
            daily_vip_limit: 2,
            ..ReciprocationConfig::default()
        },
    );
    let like = json!({
        "post_type": "notice",
        "notice_type": "notify",
        "sub_type": "profile_like",
        "operator_id": 77,
        "times": 2
    });
    let mut codes = Vec::new();
    for _ in 0..3 {
        codes.push(runtime.handle_event(&like).await.reason_code());
    }

    assert_eq!(codes, vec!["reciprocated", "reciprocated", "vip_limit_reached"]);
    poke.assert_calls(2);
    assert_eq!(runtime.state().ledger().count(UserId::new(77)), 2);
}

#[tokio::test]
async fn integration_group_poke_survives_stranger_info_outage() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/get_friend_list");
        then.status(200).json_body(json!([{"user_id": 55}]));
    });
    server.mock(|when, then| {
        when.method(POST).path("/get_stranger_info");
        then.status(503).body("maintenance");
    });
    let group_poke = server.mock(|when, then| {
        when.method(POST)
            .path("/group_poke")
            .json_body(json!({"group_id": 9000, "user_id": 55}));
        then.status(200).json_body(ok(json!(null)));
    });

    let runtime = runtime_for(&server, ReciprocationConfig::default());
    let outcome = runtime
        .handle_event(&json!({
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "group_id": "9000",
            "user_id": 55,
            "target_id": "100"
        }))
        .await;

    assert!(outcome.is_reciprocated());
    group_poke.assert_calls(1);
}

#[tokio::test]
async fn integration_friend_list_outage_blocks_reciprocation() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/get_friend_list");
        then.status(200)
            .json_body(json!({"status": "failed", "retcode": 1, "wording": "busy"}));
    });
    let poke = server.mock(|when, then| {
        when.method(POST).path("/friend_poke");
        then.status(200).json_body(ok(json!(null)));
    });

    let runtime = runtime_for(&server, ReciprocationConfig::default());
    let outcome = runtime
        .handle_event(&json!({
            "notice_type": "thumb_up",
            "user_id": 55,
            "target_id": SELF_ID
        }))
        .await;

    assert_eq!(outcome.reason_code(), "friend_list_unavailable");
    poke.assert_calls(0);
    assert!(runtime.state().ledger().snapshot().is_empty());
}
