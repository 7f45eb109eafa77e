//! Scoring helpers over already-read answers.
//!
//! How marks get off the paper (OCR, a vision model, a parent with a red
//! pen) is someone else's problem; this module turns a list of read answers
//! into a score and per-module breakdowns, and applies human overrides.

use std::collections::HashMap;

use crate::models::{GradedItem, ReadingConfidence};

/// Answers that mean the student left the item blank.
const BLANK_ANSWERS: &[&str] = &[
    "(no answer)", "no answer", "", "blank", "n/a", "none", "-",
];

/// Answers that are a request for help, not an attempt.
const HELP_ANSWERS: &[&str] = &[
    "?", "??", "???", "help", "please help", "help me", "i need help",
    "i don't know", "idk", "(asked for help)",
];

/// Percentage score: earned partial credit over item count, capped at 100.
/// No items means 0, never a division error.
pub fn score_items(items: &[GradedItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let earned: f64 = items.iter().map(|i| i.partial_credit).sum();
    (earned / items.len() as f64 * 100.0).min(100.0)
}

/// Enforce the grading ground rules on freshly read items:
/// blank and help-seeking answers are never correct and earn no credit,
/// and anything read with low or medium confidence is flagged for review.
pub fn normalize_items(items: &mut [GradedItem]) {
    for item in items.iter_mut() {
        let answer = item.student_answer.trim().to_lowercase();
        if BLANK_ANSWERS.contains(&answer.as_str()) {
            item.is_correct = false;
            item.partial_credit = 0.0;
            item.student_answer = "(no answer)".to_string();
        } else if HELP_ANSWERS.contains(&answer.as_str()) {
            item.is_correct = false;
            item.partial_credit = 0.0;
            item.student_answer = "(asked for help)".to_string();
        }
        if item.confidence.needs_review() {
            item.needs_review = true;
        }
    }
}

/// Per-module percentage scores for a diagnostic, from the material's
/// question-number to module-number mapping. Questions missing from the
/// mapping are ignored.
pub fn module_scores(
    items: &[GradedItem],
    question_modules: &HashMap<String, u32>,
) -> HashMap<u32, f64> {
    let mut counts: HashMap<u32, (u32, u32)> = HashMap::new();
    for item in items {
        let Some(&module) = question_modules.get(&item.number.to_string()) else {
            continue;
        };
        let entry = counts.entry(module).or_insert((0, 0));
        entry.1 += 1;
        if item.is_correct {
            entry.0 += 1;
        }
    }
    counts
        .into_iter()
        .map(|(module, (correct, total))| (module, correct as f64 / total as f64 * 100.0))
        .collect()
}

/// Concept tag -> miss count across the incorrect items, keyed by each
/// item's recorded concept note.
pub fn aggregate_error_patterns(items: &[GradedItem]) -> HashMap<String, u32> {
    let mut patterns: HashMap<String, u32> = HashMap::new();
    for item in items {
        if item.is_correct || item.notes.trim().is_empty() {
            continue;
        }
        *patterns.entry(item.notes.trim().to_string()).or_insert(0) += 1;
    }
    patterns
}

/// Apply an approved dispute: the named item becomes correct with full
/// credit and the submission score is recomputed from all items, never
/// patched in place.
pub fn apply_dispute_override(items: &mut [GradedItem], item_number: u32) -> f64 {
    if let Some(item) = items.iter_mut().find(|i| i.number == item_number) {
        item.is_correct = true;
        item.partial_credit = 1.0;
        item.needs_review = false;
    }
    score_items(items)
}

pub fn confidence_from_str(s: &str) -> ReadingConfidence {
    match s.to_lowercase().as_str() {
        "low" => ReadingConfidence::Low,
        "medium" => ReadingConfidence::Medium,
        _ => ReadingConfidence::High,
    }
}

/// Parse the reader's raw item list into graded items. The reader is an
/// external tool, so missing fields get safe defaults: an unreadable
/// confidence reads as high, and partial credit defaults to all-or-nothing.
/// Entries without an item number are dropped.
pub fn items_from_reader(value: &serde_json::Value) -> Vec<GradedItem> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let number = entry.get("number").and_then(|v| v.as_u64())? as u32;
            let is_correct = entry
                .get("isCorrect")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let partial_credit = entry
                .get("partialCredit")
                .and_then(|v| v.as_f64())
                .unwrap_or(if is_correct { 1.0 } else { 0.0 });
            Some(GradedItem {
                number,
                student_answer: string_field(entry, "studentAnswer"),
                correct_answer: string_field(entry, "correctAnswer"),
                is_correct,
                partial_credit,
                confidence: confidence_from_str(
                    entry.get("confidence").and_then(|v| v.as_str()).unwrap_or(""),
                ),
                needs_review: false,
                notes: string_field(entry, "notes"),
            })
        })
        .collect()
}

fn string_field(entry: &serde_json::Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(number: u32, answer: &str, correct: bool, credit: f64) -> GradedItem {
        GradedItem {
            number,
            student_answer: answer.to_string(),
            correct_answer: "4".to_string(),
            is_correct: correct,
            partial_credit: credit,
            confidence: ReadingConfidence::High,
            needs_review: false,
            notes: String::new(),
        }
    }

    #[test]
    fn partial_credit_sums_and_caps() {
        let items = vec![item(1, "4", true, 1.0), item(2, "3", false, 0.5)];
        assert!((score_items(&items) - 75.0).abs() < 1e-9);
        assert_eq!(score_items(&[]), 0.0);

        let over = vec![item(1, "4", true, 1.5), item(2, "4", true, 1.0)];
        assert_eq!(score_items(&over), 100.0);
    }

    #[test]
    fn near_perfect_is_not_perfect() {
        let mut items: Vec<GradedItem> = (1..=10).map(|n| item(n, "4", true, 1.0)).collect();
        items[9].partial_credit = 0.99;
        let score = score_items(&items);
        assert!(score < 100.0, "99.9 must stay below the mastery bar");
    }

    #[test]
    fn blank_and_help_answers_are_forced_incorrect() {
        let mut items = vec![
            item(1, "IDK", true, 1.0),
            item(2, "  ", true, 1.0),
            item(3, "7", true, 1.0),
        ];
        normalize_items(&mut items);

        assert!(!items[0].is_correct);
        assert_eq!(items[0].student_answer, "(asked for help)");
        assert!(!items[1].is_correct);
        assert_eq!(items[1].student_answer, "(no answer)");
        assert!(items[2].is_correct);
    }

    #[test]
    fn low_confidence_flags_review_but_keeps_credit() {
        let mut items = vec![item(1, "4", true, 1.0)];
        items[0].confidence = ReadingConfidence::Low;
        normalize_items(&mut items);

        assert!(items[0].needs_review);
        assert!(items[0].is_correct);
        assert_eq!(score_items(&items), 100.0);
    }

    #[test]
    fn module_scores_split_by_mapping() {
        let items = vec![
            item(1, "4", true, 1.0),
            item(2, "3", false, 0.0),
            item(3, "4", true, 1.0),
        ];
        let mapping: HashMap<String, u32> =
            [("1".to_string(), 1), ("2".to_string(), 1), ("3".to_string(), 2)]
                .into_iter()
                .collect();

        let scores = module_scores(&items, &mapping);
        assert!((scores[&1] - 50.0).abs() < 1e-9);
        assert!((scores[&2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn dispute_override_recomputes_from_all_items() {
        let mut items = vec![
            item(1, "4", true, 1.0),
            item(2, "3", false, 0.0),
            item(3, "4", true, 1.0),
            item(4, "4", true, 1.0),
        ];
        let score = apply_dispute_override(&mut items, 2);
        assert_eq!(score, 100.0);
        assert!(items[1].is_correct);

        // Overriding one item while another is still wrong stays below 100.
        let mut items = vec![item(1, "4", false, 0.0), item(2, "3", false, 0.0)];
        let score = apply_dispute_override(&mut items, 1);
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn reader_items_parse_with_confidence_and_defaults() {
        let raw = serde_json::json!([
            {
                "number": 1,
                "studentAnswer": "4",
                "correctAnswer": "4",
                "isCorrect": true,
                "confidence": "LOW"
            },
            {
                "number": 2,
                "studentAnswer": "3",
                "correctAnswer": "4",
                "isCorrect": false,
                "partialCredit": 0.5,
                "notes": "sign errors"
            },
            { "studentAnswer": "dropped, no number" }
        ]);

        let items = items_from_reader(&raw);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].confidence, ReadingConfidence::Low);
        assert_eq!(items[0].partial_credit, 1.0, "correct defaults to full credit");
        assert_eq!(items[1].confidence, ReadingConfidence::High);
        assert_eq!(items[1].partial_credit, 0.5);
        assert_eq!(items[1].notes, "sign errors");
    }

    #[test]
    fn error_patterns_count_only_misses() {
        let mut a = item(1, "3", false, 0.0);
        a.notes = "fractions".to_string();
        let mut b = item(2, "3", false, 0.0);
        b.notes = "fractions".to_string();
        let mut c = item(3, "4", true, 1.0);
        c.notes = "fractions".to_string();

        let patterns = aggregate_error_patterns(&[a, b, c]);
        assert_eq!(patterns.get("fractions"), Some(&2));
    }
}
