//! Classification of raw notice events into appreciation events.

use serde::Serialize;
use serde_json::Value;

use crate::identity::{GroupId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AppreciationKind` values.
pub enum AppreciationKind {
    ThumbUp,
    Poke,
    ProfileLike,
}

impl AppreciationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThumbUp => "thumb_up",
            Self::Poke => "poke",
            Self::ProfileLike => "profile_like",
        }
    }

    /// Profile likes are delivered only to the liked account, so they carry no target.
    pub fn requires_target_check(self) -> bool {
        !matches!(self, Self::ProfileLike)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Canonical appreciation event produced by [`classify_appreciation_event`].
pub struct AppreciationEvent {
    pub kind: AppreciationKind,
    pub actor_id: UserId,
    pub target_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub magnitude: u32,
}

/// Returns `None` when `raw` is not a thumb-up, poke or profile-like notice.
///
/// Notices that match a kind but carry no usable actor id are also treated as
/// not applicable since there is nobody to reciprocate to.
pub fn classify_appreciation_event(raw: &Value) -> Option<AppreciationEvent> {
    let notice_type = raw.get("notice_type").and_then(Value::as_str)?;
    let sub_type = raw.get("sub_type").and_then(Value::as_str);
    let kind = match (notice_type, sub_type) {
        ("thumb_up", _) => AppreciationKind::ThumbUp,
        ("notify", Some("poke")) => AppreciationKind::Poke,
        ("notify", Some("profile_like")) => AppreciationKind::ProfileLike,
        _ => return None,
    };

    let (actor_field, magnitude_field) = match kind {
        AppreciationKind::ProfileLike => ("operator_id", "times"),
        AppreciationKind::ThumbUp | AppreciationKind::Poke => ("user_id", "count"),
    };
    let actor_id = raw.get(actor_field).and_then(UserId::from_value)?;
    let target_id = if kind.requires_target_check() {
        raw.get("target_id").and_then(UserId::from_value)
    } else {
        None
    };
    let group_id = match kind {
        AppreciationKind::Poke => raw.get("group_id").and_then(GroupId::from_value),
        AppreciationKind::ThumbUp | AppreciationKind::ProfileLike => None,
    };

    Some(AppreciationEvent {
        kind,
        actor_id,
        target_id,
        group_id,
        magnitude: parse_magnitude(raw.get(magnitude_field)),
    })
}

fn parse_magnitude(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(count) if count > 0 => u32::try_from(count).unwrap_or(u32::MAX),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{classify_appreciation_event, AppreciationKind};
    use crate::identity::{GroupId, UserId};

    #[test]
    fn unit_thumb_up_notice_classifies_with_count() {
        let event = classify_appreciation_event(&json!({
            "post_type": "notice",
            "notice_type": "thumb_up",
            "user_id": 55,
            "target_id": "100",
            "count": 3
        }))
        .expect("thumb up");
        assert_eq!(event.kind, AppreciationKind::ThumbUp);
        assert_eq!(event.actor_id, UserId::new(55));
        assert_eq!(event.target_id, Some(UserId::new(100)));
        assert_eq!(event.group_id, None);
        assert_eq!(event.magnitude, 3);
    }

    #[test]
    fn unit_group_poke_keeps_group_id() {
        let event = classify_appreciation_event(&json!({
            "notice_type": "notify",
            "sub_type": "poke",
            "user_id": "55",
            "target_id": 100,
            "group_id": 9000
        }))
        .expect("poke");
        assert_eq!(event.kind, AppreciationKind::Poke);
        assert_eq!(event.group_id, Some(GroupId::new(9000)));
        assert_eq!(event.magnitude, 1);
    }

    #[test]
    fn unit_profile_like_uses_operator_and_times_without_target() {
        let event = classify_appreciation_event(&json!({
            "notice_type": "notify",
            "sub_type": "profile_like",
            "operator_id": 77,
            "operator_nick": "someone",
            "times": 2,
            "target_id": 999
        }))
        .expect("profile like");
        assert_eq!(event.kind, AppreciationKind::ProfileLike);
        assert_eq!(event.actor_id, UserId::new(77));
        assert_eq!(event.target_id, None);
        assert_eq!(event.magnitude, 2);
    }

    #[test]
    fn regression_magnitude_defaults_to_one_when_missing_or_non_positive() {
        for count in [json!(null), json!(0), json!(-4), json!("zero")] {
            let event = classify_appreciation_event(&json!({
                "notice_type": "thumb_up",
                "user_id": 55,
                "target_id": 100,
                "count": count
            }))
            .expect("thumb up");
            assert_eq!(event.magnitude, 1);
        }
        let without_times = classify_appreciation_event(&json!({
            "notice_type": "notify",
            "sub_type": "profile_like",
            "operator_id": 77
        }))
        .expect("profile like");
        assert_eq!(without_times.magnitude, 1);
    }

    #[test]
    fn unit_other_notices_are_not_applicable() {
        for raw in [
            json!({"post_type": "message", "message": "hi"}),
            json!({"notice_type": "notify", "sub_type": "honor"}),
            json!({"notice_type": "notify"}),
            json!({"notice_type": "group_increase", "user_id": 55}),
            json!("thumb_up"),
        ] {
            assert!(classify_appreciation_event(&raw).is_none(), "raw {raw}");
        }
    }

    #[test]
    fn regression_notice_without_actor_is_not_applicable() {
        assert!(classify_appreciation_event(&json!({
            "notice_type": "notify",
            "sub_type": "profile_like",
            "times": 3
        }))
        .is_none());
    }
}
