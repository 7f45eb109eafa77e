use thiserror::Error;

/// Crate-level error taxonomy.
///
/// The pacing engine and planner never fail for missing data; they degrade to
/// safe defaults. Only truly fatal conditions (missing credentials, an empty
/// curriculum) or external-I/O failures at the controller boundary surface
/// through this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Required credential or setting is missing. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Curriculum document has no modules, or a module has no lessons.
    #[error("curriculum is empty: {0}")]
    EmptyCurriculum(String),

    /// Generator returned empty or unparsable output, or exhausted its
    /// retries. Nothing was persisted; the same assignment stays in its
    /// "generate" state and the call is safe to repeat.
    #[error("content generation failed: {0}")]
    Generation(String),

    /// Renderer could not produce an output file for a generated material.
    #[error("render failed: {0}")]
    Render(String),

    /// A referenced record does not exist (bad submission or dispute id).
    #[error("not found: {0}")]
    NotFound(String),
}
