//! Curriculum documents and traversal.
//!
//! Reference data is authored as a JSON document (one subject, ordered
//! modules, ordered lessons with named concepts), seeded into a store once,
//! and treated as immutable afterwards. Re-seeding the same document updates
//! titles and descriptions in place without duplicating records.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Lesson, Module, Subject};
use crate::store::ProgressionStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumDoc {
    pub subject: SubjectDoc,
    pub modules: Vec<ModuleDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDoc {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub grade_level: Option<u32>,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDoc {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<LessonDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDoc {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub concepts: Vec<String>,
}

pub fn load_from_path(path: &Path) -> Result<CurriculumDoc, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Configuration(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::Configuration(format!("invalid curriculum JSON: {e}")))
}

/// Seed a subject and its modules/lessons into the store. Idempotent:
/// modules and lessons are matched by number, so existing ids (and any
/// progress hanging off them) survive a re-seed.
pub fn seed_subject<S: ProgressionStore>(
    store: &S,
    doc: &CurriculumDoc,
) -> Result<Subject, EngineError> {
    if doc.modules.is_empty() {
        return Err(EngineError::EmptyCurriculum(format!(
            "subject {} has no modules",
            doc.subject.code
        )));
    }
    for module in &doc.modules {
        if module.lessons.is_empty() {
            return Err(EngineError::EmptyCurriculum(format!(
                "module {} of {} has no lessons",
                module.number, doc.subject.code
            )));
        }
    }

    let subject = match store.subject_by_code(&doc.subject.code) {
        Some(mut existing) => {
            existing.name = doc.subject.name.clone();
            existing.description = doc.subject.description.clone();
            existing.grade_level = doc.subject.grade_level;
            existing.order = doc.subject.order;
            existing
        }
        None => Subject {
            id: Uuid::new_v4().to_string(),
            code: doc.subject.code.clone(),
            name: doc.subject.name.clone(),
            description: doc.subject.description.clone(),
            grade_level: doc.subject.grade_level,
            order: doc.subject.order,
        },
    };
    store.upsert_subject(subject.clone());

    let existing_modules = store.modules(&subject.id);

    for module_doc in &doc.modules {
        let existing = existing_modules.iter().find(|m| m.number == module_doc.number);
        let module_id = existing
            .map(|m| m.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lessons = module_doc
            .lessons
            .iter()
            .map(|lesson_doc| {
                let lesson_id = existing
                    .and_then(|m| m.lessons.iter().find(|l| l.number == lesson_doc.number))
                    .map(|l| l.id.clone())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                Lesson {
                    id: lesson_id,
                    module_id: module_id.clone(),
                    number: lesson_doc.number,
                    title: lesson_doc.title.clone(),
                    description: lesson_doc.description.clone(),
                    concepts: lesson_doc.concepts.clone(),
                }
            })
            .collect();

        store.upsert_module(Module {
            id: module_id,
            subject_id: subject.id.clone(),
            number: module_doc.number,
            title: module_doc.title.clone(),
            description: module_doc.description.clone(),
            lessons,
        });
    }

    tracing::info!(
        subject = %subject.code,
        modules = doc.modules.len(),
        "seeded curriculum"
    );
    Ok(subject)
}

// ---- Traversal helpers over an ordered module list ----

pub fn find_lesson<'a>(modules: &'a [Module], lesson_id: &str) -> Option<(&'a Module, &'a Lesson)> {
    modules.iter().find_map(|m| {
        m.lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .map(|l| (m, l))
    })
}

pub fn first_lesson(modules: &[Module]) -> Option<(&Module, &Lesson)> {
    modules
        .first()
        .and_then(|m| m.lessons.first().map(|l| (m, l)))
}

pub fn last_lesson(modules: &[Module]) -> Option<(&Module, &Lesson)> {
    modules
        .last()
        .and_then(|m| m.lessons.last().map(|l| (m, l)))
}

/// Successor in curriculum order, crossing a module boundary into the next
/// module's first lesson. Returns None past the last lesson of the subject.
pub fn next_lesson<'a>(modules: &'a [Module], lesson_id: &str) -> Option<(&'a Module, &'a Lesson)> {
    let module_idx = modules
        .iter()
        .position(|m| m.lessons.iter().any(|l| l.id == lesson_id))?;
    let module = &modules[module_idx];
    let lesson_idx = module.lessons.iter().position(|l| l.id == lesson_id)?;

    if let Some(next) = module.lessons.get(lesson_idx + 1) {
        return Some((module, next));
    }
    modules
        .get(module_idx + 1)
        .and_then(|m| m.lessons.first().map(|l| (m, l)))
}

pub fn is_last_in_module(modules: &[Module], lesson_id: &str) -> bool {
    modules
        .iter()
        .any(|m| m.lessons.last().is_some_and(|l| l.id == lesson_id))
}

pub fn total_lessons(modules: &[Module]) -> usize {
    modules.iter().map(|m| m.lessons.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn two_module_doc() -> CurriculumDoc {
        serde_json::from_value(serde_json::json!({
            "subject": { "code": "PREALG", "name": "Pre-Algebra" },
            "modules": [
                {
                    "number": 1,
                    "title": "Integers",
                    "lessons": [
                        { "number": 1, "title": "Number line", "concepts": ["number line"] },
                        { "number": 2, "title": "Adding integers", "concepts": ["addition"] }
                    ]
                },
                {
                    "number": 2,
                    "title": "Fractions",
                    "lessons": [
                        { "number": 1, "title": "Equivalent fractions", "concepts": ["fractions"] }
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        let doc = two_module_doc();

        let subject = seed_subject(&store, &doc).unwrap();
        let first_ids: Vec<String> = store
            .modules(&subject.id)
            .iter()
            .flat_map(|m| m.lessons.iter().map(|l| l.id.clone()))
            .collect();

        let subject_again = seed_subject(&store, &doc).unwrap();
        assert_eq!(subject.id, subject_again.id);

        let second_ids: Vec<String> = store
            .modules(&subject.id)
            .iter()
            .flat_map(|m| m.lessons.iter().map(|l| l.id.clone()))
            .collect();
        assert_eq!(first_ids, second_ids, "lesson ids must survive a re-seed");
        assert_eq!(store.modules(&subject.id).len(), 2);
    }

    #[test]
    fn empty_module_is_fatal() {
        let store = MemoryStore::new();
        let doc: CurriculumDoc = serde_json::from_value(serde_json::json!({
            "subject": { "code": "EMPTY", "name": "Empty" },
            "modules": [ { "number": 1, "title": "Nothing", "lessons": [] } ]
        }))
        .unwrap();

        assert!(matches!(
            seed_subject(&store, &doc),
            Err(EngineError::EmptyCurriculum(_))
        ));
    }

    #[test]
    fn next_lesson_crosses_module_boundary() {
        let store = MemoryStore::new();
        let subject = seed_subject(&store, &two_module_doc()).unwrap();
        let modules = store.modules(&subject.id);

        let (_, l1) = first_lesson(&modules).unwrap();
        let (m, l2) = next_lesson(&modules, &l1.id).unwrap();
        assert_eq!(m.number, 1);
        assert_eq!(l2.number, 2);
        assert!(is_last_in_module(&modules, &l2.id));

        let (m2, l3) = next_lesson(&modules, &l2.id).unwrap();
        assert_eq!(m2.number, 2);
        assert_eq!(l3.number, 1);
        assert!(next_lesson(&modules, &l3.id).is_none());
        assert_eq!(total_lessons(&modules), 3);
    }
}
