//! Pacing invariants under arbitrary score sequences.

use std::sync::Arc;

use proptest::prelude::*;

use mathtutor_core::config::PacingConfig;
use mathtutor_core::progression::Pacer;
use mathtutor_core::store::{MemoryStore, ProgressionStore};

proptest! {
    #[test]
    fn velocity_and_streaks_stay_lawful(scores in prop::collection::vec(0.0f64..=100.0, 0..40)) {
        let store = Arc::new(MemoryStore::new());
        let config = PacingConfig::default();
        let pacer = Pacer::new(Arc::clone(&store), config.clone());

        for score in scores {
            pacer.update_velocity("amy", "subject", score);

            let progress = store.subject_progress("amy", "subject").unwrap();
            prop_assert!(
                progress.velocity_score >= config.velocity_min
                    && progress.velocity_score <= config.velocity_max
            );
            prop_assert!(
                progress.consecutive_perfect == 0 || progress.consecutive_struggles == 0,
                "streaks must never both be nonzero"
            );

            let count = pacer.problem_count("amy", "subject");
            prop_assert!(
                count == config.min_problems
                    || count == config.base_problems
                    || count == config.max_problems
            );
        }
    }

    #[test]
    fn perfect_scores_only_ever_grow_the_perfect_streak(runs in 1u32..10) {
        let store = Arc::new(MemoryStore::new());
        let pacer = Pacer::new(Arc::clone(&store), PacingConfig::default());

        for _ in 0..runs {
            pacer.update_velocity("amy", "subject", 100.0);
        }
        let progress = store.subject_progress("amy", "subject").unwrap();
        prop_assert_eq!(progress.consecutive_perfect, runs);
        prop_assert_eq!(progress.consecutive_struggles, 0);
    }

    #[test]
    fn sub_struggle_scores_only_ever_grow_the_struggle_streak(runs in 1u32..10) {
        let store = Arc::new(MemoryStore::new());
        let pacer = Pacer::new(Arc::clone(&store), PacingConfig::default());

        for _ in 0..runs {
            pacer.update_velocity("amy", "subject", 50.0);
        }
        let progress = store.subject_progress("amy", "subject").unwrap();
        prop_assert_eq!(progress.consecutive_struggles, runs);
        prop_assert_eq!(progress.consecutive_perfect, 0);
    }
}
