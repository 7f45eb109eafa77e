use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Load `.env` and install the global tracing subscriber. Call once at
/// startup, before [`EngineConfig::from_env`].
pub fn init_env() {
    let _ = dotenvy::dotenv();
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Thresholds driving the pacing engine and planner.
///
/// Injected at construction so tests can vary them without touching shared
/// state. Mastery is strict 100% by design: partial credit never advances
/// the student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Graded score required for mastery.
    pub mastery_threshold: f64,
    /// Per-module diagnostic score required to bulk-grant mastery.
    pub diagnostic_mastery_threshold: f64,
    /// Scores below this count as a struggle.
    pub struggle_threshold: f64,
    /// Consecutive perfect scores before reducing problem counts.
    pub speedup_streak: u32,
    /// Consecutive struggles before increasing support.
    pub slowdown_streak: u32,
    /// Consecutive perfect scores before offering a lesson skip.
    pub skip_offer_streak: u32,
    pub min_problems: u32,
    pub base_problems: u32,
    pub max_problems: u32,
    pub velocity_step: f64,
    pub velocity_min: f64,
    pub velocity_max: f64,
    /// How many weak-concept tags feed the remediation generator.
    pub weak_concept_limit: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: 100.0,
            diagnostic_mastery_threshold: 100.0,
            struggle_threshold: 70.0,
            speedup_streak: 3,
            slowdown_streak: 2,
            skip_offer_streak: 5,
            min_problems: 15,
            base_problems: 25,
            max_problems: 35,
            velocity_step: 0.1,
            velocity_min: 0.5,
            velocity_max: 2.0,
            weak_concept_limit: 5,
        }
    }
}

/// Sizing for generated materials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub questions_per_quiz: u32,
    pub questions_per_test: u32,
    pub diagnostic_questions_per_module: u32,
    pub remediation_problems: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            questions_per_quiz: 12,
            questions_per_test: 25,
            diagnostic_questions_per_module: 4,
            remediation_problems: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pacing: PacingConfig,
    pub content: ContentConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PACING_BASE_PROBLEMS") {
            config.pacing.base_problems = val.parse().unwrap_or(config.pacing.base_problems);
        }
        if let Ok(val) = std::env::var("PACING_MIN_PROBLEMS") {
            config.pacing.min_problems = val.parse().unwrap_or(config.pacing.min_problems);
        }
        if let Ok(val) = std::env::var("PACING_MAX_PROBLEMS") {
            config.pacing.max_problems = val.parse().unwrap_or(config.pacing.max_problems);
        }
        if let Ok(val) = std::env::var("DIAGNOSTIC_QUESTIONS_PER_MODULE") {
            config.content.diagnostic_questions_per_module =
                val.parse().unwrap_or(config.content.diagnostic_questions_per_module);
        }

        config
    }
}
