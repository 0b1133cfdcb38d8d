#![no_main]

use libfuzzer_sys::fuzz_target;
use nudge_reciprocity::{classify_appreciation_event, lookup_friend, UserId};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    if let Some(event) = classify_appreciation_event(&raw) {
        assert!(event.magnitude >= 1);
        assert!(event.actor_id.get() > 0);
        if !event.kind.requires_target_check() {
            assert!(event.target_id.is_none());
        }
    }
    let _ = lookup_friend(&raw, UserId::new(1));
});
