//! Property-based tests for record patching and mode transitions.

use std::collections::BTreeMap;

use carevault_failover::{ModeState, Record, ServiceMode};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn any_fields() -> impl Strategy<Value = BTreeMap<String, i64>> {
    proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
}

fn to_object(fields: &BTreeMap<String, i64>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect::<Map<String, Value>>(),
    )
}

proptest! {
    /// Test: an object patch overwrites exactly the patched fields and keeps
    /// the rest.
    #[test]
    fn test_patch_merges_fields(base in any_fields(), patch in any_fields(), now in 0i64..1_000_000) {
        let mut record = Record::new("patients", to_object(&base), 0);
        record.apply_patch(to_object(&patch), now);

        let mut expected = base.clone();
        expected.extend(patch.clone());
        prop_assert_eq!(&record.data, &to_object(&expected));
        prop_assert_eq!(record.updated_at, now);
        prop_assert_eq!(record.created_at, 0);
    }

    /// Test: any number of fallback transitions leaves the state in
    /// fallback, and only the first reports the switch.
    #[test]
    fn test_mode_transition_is_one_way(attempts in 1usize..16) {
        let state = ModeState::new();
        let switched: Vec<bool> = (0..attempts).map(|_| state.enter_fallback()).collect();
        prop_assert!(switched[0]);
        prop_assert!(switched[1..].iter().all(|s| !s));
        prop_assert_eq!(state.current(), ServiceMode::Fallback);
    }
}
