use loomflow::config::ChainConfig;
use loomflow::patterns::Chain;
use loomflow::state::WorkflowState;
use proptest::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

proptest! {
    /// Setting any key on any derived state never mutates the original.
    #[test]
    fn state_set_is_copy_on_write(
        keys in proptest::collection::vec("[a-z]{1,8}", 1..8),
        value in any::<i64>(),
    ) {
        let mut state = WorkflowState::new(None);
        for key in &keys {
            state = state.set(key.clone(), json!(value));
        }
        let before: Vec<_> = keys.iter().map(|k| state.get(k).cloned()).collect();

        let _ = state.set("extra", json!("later"));
        let _ = state.merge(&WorkflowState::new(None));

        let after: Vec<_> = keys.iter().map(|k| state.get(k).cloned()).collect();
        prop_assert_eq!(before, after);
        prop_assert!(state.get("extra").is_none());
    }

    /// A non-erroring chain is exactly a left fold, with one step per item.
    #[test]
    fn chain_equals_foldl(items in proptest::collection::vec(any::<i32>(), 0..32)) {
        let expected = items.iter().fold(0_i64, |acc, n| acc + i64::from(*n));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let outcome = runtime.block_on(async {
            Chain::new(&ChainConfig::default())
                .unwrap()
                .run(
                    &CancellationToken::new(),
                    &items,
                    0_i64,
                    |_token, n, acc| async move { Ok(acc + i64::from(n)) },
                    None,
                )
                .await
                .unwrap()
        });

        prop_assert_eq!(outcome.result, expected);
        prop_assert_eq!(outcome.steps, items.len());
    }

    /// Intermediate capture always yields one snapshot per step plus the seed.
    #[test]
    fn capture_length_tracks_steps(items in proptest::collection::vec(any::<u8>(), 0..16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let outcome = runtime.block_on(async {
            Chain::new(&ChainConfig {
                capture_intermediates: true,
                ..ChainConfig::default()
            })
            .unwrap()
            .run(
                &CancellationToken::new(),
                &items,
                Vec::<u8>::new(),
                |_token, n, mut acc: Vec<u8>| async move {
                    acc.push(n);
                    Ok(acc)
                },
                None,
            )
            .await
            .unwrap()
        });

        let expected = if items.is_empty() { 0 } else { items.len() + 1 };
        prop_assert_eq!(outcome.intermediates.len(), expected);
        prop_assert_eq!(outcome.result, items);
    }
}
