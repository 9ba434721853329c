#[cfg(test)]
mod proptests {
    use crate::hash::ConfigHashable;
    use crate::merge::{OrphanPolicy, plan_merge};
    use gw_core::{EnvVar, Key};
    use proptest::prelude::*;

    fn key(name: &str, var: &str, models: Vec<String>, weight: f64) -> Key {
        Key {
            name: name.to_string(),
            value: EnvVar::from_env(var),
            models,
            weight: Some(weight),
            ..Key::default()
        }
    }

    proptest! {
        #[test]
        fn test_key_hash_ignores_model_order(
            name in "[a-z]{1,12}",
            var in "[A-Z_]{1,16}",
            mut models in proptest::collection::vec("[a-z0-9-]{1,10}", 0..6),
            weight in 0.0f64..10.0
        ) {
            let forward = key(&name, &var, models.clone(), weight).compute_hash().unwrap();
            models.reverse();
            let reversed = key(&name, &var, models, weight).compute_hash().unwrap();
            prop_assert_eq!(forward, reversed);
        }

        #[test]
        fn test_second_merge_is_noop(
            names in proptest::collection::btree_set("[a-z]{1,8}", 0..8)
        ) {
            let file: Vec<Key> = names
                .iter()
                .map(|n| key(n, "SHARED_KEY", Vec::new(), 1.0))
                .collect();

            let first = plan_merge(&file, &[], OrphanPolicy::Preserve);
            prop_assert_eq!(first.creates.len(), names.len());

            let second = plan_merge(&file, &first.merged, OrphanPolicy::Preserve);
            prop_assert!(second.is_noop());
            prop_assert_eq!(second.unchanged, names.len());
            prop_assert_eq!(second.merged, first.merged);
        }
    }
}
