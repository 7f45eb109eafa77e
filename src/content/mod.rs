//! Content generation and rendering seams.
//!
//! The engine never talks to a model or a printer directly; it hands a
//! [`GenerationRequest`] to a [`ContentGenerator`] and the resulting
//! [`crate::models::Material`] to a [`Renderer`]. Production wires in the
//! LLM-backed generator; tests wire in stubs.

pub mod llm;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::models::{DifficultyTier, Lesson, Material, MaterialKind, Module, Subject};

pub use llm::LlmGenerator;

/// Everything a generator needs to produce one sheet. Curriculum context is
/// carried by value so the generator stays free of store access.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: MaterialKind,
    pub subject: Subject,
    pub module: Option<Module>,
    pub lesson: Option<Lesson>,
    /// Diagnostics cover the whole subject.
    pub all_modules: Vec<Module>,
    pub problem_count: u32,
    pub difficulty: DifficultyTier,
    pub weak_concepts: Vec<String>,
    pub questions_per_module: u32,
}

/// Parsed generator output, not yet persisted.
#[derive(Debug, Clone)]
pub struct GeneratedMaterial {
    pub title: String,
    pub content: serde_json::Value,
    pub answer_key: HashMap<String, String>,
    /// Diagnostics only: global question number -> module number.
    pub question_modules: Option<HashMap<String, u32>>,
}

/// `Ok(None)` means the model answered but produced nothing usable; the
/// caller persists nothing and the request is safe to repeat.
pub trait ContentGenerator: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = Result<Option<GeneratedMaterial>, EngineError>> + Send;
}

/// Turns a persisted material into a printable artifact. `Ok(None)` means
/// this renderer does not handle the material's kind.
pub trait Renderer: Send + Sync {
    fn render(&self, material: &Material) -> Result<Option<PathBuf>, EngineError>;
}

/// Plain-text sheet renderer. One file per material under a base directory,
/// named by scan code so a rescan can be traced back to the sheet.
pub struct TextRenderer {
    base_dir: PathBuf,
}

impl TextRenderer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn render_body(material: &Material) -> String {
        let mut out = String::new();
        out.push_str(&material.title);
        out.push_str("\n");
        out.push_str(&"=".repeat(material.title.chars().count().max(8)));
        out.push_str("\n\n");
        out.push_str(&format!(
            "Type: {}    Scan code: {}\n\n",
            material.kind.as_str(),
            material.scan_code
        ));

        if let Some(instructions) = material.content.get("instructions").and_then(|v| v.as_str()) {
            out.push_str(instructions);
            out.push_str("\n\n");
        }

        // Practice-style sheets carry "problems"; quizzes and tests carry
        // "questions"; diagnostics nest questions under "modules".
        let items = material
            .content
            .get("problems")
            .or_else(|| material.content.get("questions"))
            .and_then(|v| v.as_array());
        if let Some(items) = items {
            for item in items {
                let number = item.get("number").and_then(|v| v.as_u64()).unwrap_or(0);
                let text = item
                    .get("problem")
                    .or_else(|| item.get("question"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                out.push_str(&format!("{number}. {text}\n\n    Answer: __________\n\n"));
            }
        }

        if let Some(modules) = material.content.get("modules").and_then(|v| v.as_array()) {
            for section in modules {
                if let Some(title) = section.get("moduleTitle").and_then(|v| v.as_str()) {
                    out.push_str(&format!("--- {title} ---\n\n"));
                }
                if let Some(questions) = section.get("questions").and_then(|v| v.as_array()) {
                    for q in questions {
                        let number = q
                            .get("globalNumber")
                            .or_else(|| q.get("number"))
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0);
                        let text = q.get("question").and_then(|v| v.as_str()).unwrap_or("");
                        out.push_str(&format!(
                            "{number}. {text}\n\n    Answer: __________\n\n"
                        ));
                    }
                }
            }
        }

        if let Some(sections) = material.content.get("sections").and_then(|v| v.as_array()) {
            for section in sections {
                if let Some(heading) = section.get("heading").and_then(|v| v.as_str()) {
                    out.push_str(&format!("## {heading}\n\n"));
                }
                if let Some(explanation) = section.get("explanation").and_then(|v| v.as_str()) {
                    out.push_str(explanation);
                    out.push_str("\n\n");
                }
            }
        }

        out
    }
}

impl Renderer for TextRenderer {
    fn render(&self, material: &Material) -> Result<Option<PathBuf>, EngineError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| EngineError::Render(format!("cannot create output dir: {e}")))?;

        let path = self
            .base_dir
            .join(format!("{}-{}.txt", material.kind.as_str(), material.scan_code));
        std::fs::write(&path, Self::render_body(material))
            .map_err(|e| EngineError::Render(format!("cannot write {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), kind = material.kind.as_str(), "rendered sheet");
        Ok(Some(path))
    }
}
