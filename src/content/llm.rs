//! LLM-backed sheet generation against an OpenAI-compatible chat endpoint.
//!
//! Transport errors retry with exponential backoff; a model reply that does
//! not contain usable JSON is reported as `Ok(None)` so the caller can simply
//! ask again later.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::content::{ContentGenerator, GeneratedMaterial, GenerationRequest};
use crate::error::EngineError;
use crate::models::{DifficultyTier, MaterialKind};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Reads `LLM_API_KEY` (required), `LLM_MODEL`, `LLM_API_ENDPOINT` /
    /// `LLM_BASE_URL`, and `LLM_TIMEOUT` (milliseconds).
    pub fn from_env() -> Result<Self, EngineError> {
        let api_key = env_string("LLM_API_KEY")
            .ok_or_else(|| EngineError::Configuration("LLM_API_KEY is not set".to_string()))?;
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT")
                .or_else(|| env_string("LLM_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));
        Ok(Self { api_key, model, api_endpoint, timeout })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Error)]
enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

pub struct LlmGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmGenerator {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Result<Self, EngineError> {
        Ok(Self::new(LlmConfig::from_env()?))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_endpoint.trim_end_matches('/')
        );
        let messages = [ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false
        });

        let response = self.post_with_retry(&url, &payload).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for retry in 0..=MAX_RETRIES {
            match self
                .client
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(LlmError::Json);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LlmError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "generation request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = LlmError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "generation request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(LlmError::EmptyChoices))
    }

    fn build_prompt(&self, request: &GenerationRequest) -> String {
        match request.kind {
            MaterialKind::Lesson => lesson_prompt(request),
            MaterialKind::Practice => practice_prompt(request),
            MaterialKind::Quiz => quiz_prompt(request, false),
            MaterialKind::Test => quiz_prompt(request, true),
            MaterialKind::Diagnostic => diagnostic_prompt(request),
            MaterialKind::Remediation => remediation_prompt(request),
        }
    }
}

impl ContentGenerator for LlmGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GeneratedMaterial>, EngineError> {
        let prompt = self.build_prompt(request);
        let text = self
            .complete(&prompt)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let Some(mut content) = extract_json(&text) else {
            warn!(kind = request.kind.as_str(), "model reply contained no JSON object");
            return Ok(None);
        };

        let material = match request.kind {
            MaterialKind::Diagnostic => {
                let Some((answer_key, question_modules)) = index_diagnostic(&mut content) else {
                    warn!("diagnostic reply had no module sections");
                    return Ok(None);
                };
                GeneratedMaterial {
                    title: title_of(&content, "Diagnostic Assessment"),
                    content,
                    answer_key,
                    question_modules: Some(question_modules),
                }
            }
            MaterialKind::Lesson => GeneratedMaterial {
                title: title_of(&content, "Lesson"),
                content,
                answer_key: HashMap::new(),
                question_modules: None,
            },
            kind => {
                let list_key = match kind {
                    MaterialKind::Quiz | MaterialKind::Test => "questions",
                    _ => "problems",
                };
                let answer_key = extract_answer_key(&content, list_key);
                if answer_key.is_empty() {
                    warn!(kind = kind.as_str(), "model reply had no answerable items");
                    return Ok(None);
                }
                GeneratedMaterial {
                    title: title_of(&content, kind.as_str()),
                    content,
                    answer_key,
                    question_modules: None,
                }
            }
        };
        Ok(Some(material))
    }
}

// ---- prompt builders ----

fn concepts_of(request: &GenerationRequest) -> String {
    request
        .lesson
        .as_ref()
        .map(|l| l.concepts.join(", "))
        .unwrap_or_default()
}

fn module_line(request: &GenerationRequest) -> String {
    request
        .module
        .as_ref()
        .map(|m| format!("{}. {}", m.number, m.title))
        .unwrap_or_default()
}

fn lesson_line(request: &GenerationRequest) -> String {
    request
        .lesson
        .as_ref()
        .map(|l| format!("{}. {}", l.number, l.title))
        .unwrap_or_default()
}

fn lesson_prompt(request: &GenerationRequest) -> String {
    format!(
        r#"Generate a comprehensive {subject} lesson for a young student.

MODULE: {module}
LESSON: {lesson}
CONCEPTS TO COVER: {concepts}

Generate the lesson content in JSON format with this structure:
{{
    "title": "Lesson title",
    "introduction": "2-3 sentences introducing the topic and why it matters",
    "sections": [
        {{
            "heading": "Section heading",
            "explanation": "Clear explanation of the concept",
            "examples": [
                {{ "problem": "Example problem", "solution": "Step-by-step solution" }}
            ],
            "keyPoints": ["Important point 1", "Important point 2"]
        }}
    ],
    "summary": "Brief summary of what was learned"
}}

Make the content clear and age-appropriate, with 2-3 worked examples per
section, building on concepts progressively."#,
        subject = request.subject.name,
        module = module_line(request),
        lesson = lesson_line(request),
        concepts = concepts_of(request),
    )
}

fn difficulty_instruction(tier: DifficultyTier) -> &'static str {
    match tier {
        DifficultyTier::Easier => {
            "Requirements:\n\
             - Difficulty mix: 60% easy, 30% medium, 10% hard\n\
             - Start with simpler versions of each concept\n\
             - Include extra hints and scaffolding\n\
             - Word problems should be straightforward\n\
             - Focus on building confidence"
        }
        DifficultyTier::Harder => {
            "Requirements:\n\
             - Difficulty mix: 20% easy, 40% medium, 40% hard\n\
             - Include challenging extension problems\n\
             - Word problems should require multi-step reasoning\n\
             - Add some problems that combine multiple concepts"
        }
        DifficultyTier::Standard => {
            "Requirements:\n\
             - Mix of difficulty levels (40% easy, 40% medium, 20% hard)\n\
             - Include 3-4 word problems that apply concepts to real situations\n\
             - Clear, unambiguous problems with specific answers\n\
             - Progress from easier to harder"
        }
    }
}

fn practice_prompt(request: &GenerationRequest) -> String {
    format!(
        r#"Generate {count} practice problems for a {subject} lesson.

MODULE: {module}
LESSON: {lesson}
CONCEPTS: {concepts}

Generate problems in JSON format:
{{
    "title": "Practice: {lesson_title}",
    "instructions": "Clear instructions for the student",
    "problems": [
        {{
            "number": 1,
            "problem": "The problem text (use clear mathematical notation)",
            "answer": "The correct answer",
            "concept": "Which concept this tests",
            "difficulty": "easy|medium|hard",
            "hint": "A hint if they're stuck (optional)"
        }}
    ]
}}
{difficulty}"#,
        count = request.problem_count,
        subject = request.subject.name,
        module = module_line(request),
        lesson = lesson_line(request),
        concepts = concepts_of(request),
        lesson_title = request.lesson.as_ref().map(|l| l.title.as_str()).unwrap_or(""),
        difficulty = difficulty_instruction(request.difficulty),
    )
}

fn quiz_prompt(request: &GenerationRequest, comprehensive: bool) -> String {
    let module = request.module.as_ref();
    let lessons = module.map(|m| m.lessons.as_slice()).unwrap_or_default();
    let lesson_titles: Vec<&str> = lessons.iter().map(|l| l.title.as_str()).collect();
    let concepts: Vec<&str> = lessons
        .iter()
        .flat_map(|l| l.concepts.iter().map(String::as_str))
        .collect();
    let (label, requirements) = if comprehensive {
        (
            "Test",
            "Requirements:\n\
             - Comprehensive coverage of ALL concepts\n\
             - 30% easy, 50% medium, 20% challenging\n\
             - Include multi-step problems\n\
             - Test deep understanding, not just procedures",
        )
    } else {
        (
            "Quiz",
            "Requirements:\n\
             - Cover all lessons proportionally\n\
             - Mix of question types (calculation, word problem, conceptual)\n\
             - Clear, specific answers",
        )
    };

    format!(
        r#"Generate a {count}-question {kind} for {subject}.

MODULE: {module}
COVERING LESSONS: {lessons}
CONCEPTS: {concepts}

Generate the {kind} in JSON format:
{{
    "title": "{label}: {module_title}",
    "instructions": "Answer each question. Show your work where applicable.",
    "questions": [
        {{
            "number": 1,
            "question": "The question text",
            "answer": "The correct answer",
            "concept": "Which concept this tests",
            "points": 1
        }}
    ],
    "totalPoints": {count}
}}

{requirements}"#,
        count = request.problem_count,
        kind = label.to_lowercase(),
        subject = request.subject.name,
        module = module_line(request),
        lessons = lesson_titles.join(", "),
        concepts = concepts.join(", "),
        label = label,
        module_title = module.map(|m| m.title.as_str()).unwrap_or(""),
        requirements = requirements,
    )
}

fn remediation_prompt(request: &GenerationRequest) -> String {
    format!(
        r#"Generate {count} remediation practice problems targeting specific weak areas.

LESSON: {lesson}
WEAK CONCEPTS IDENTIFIED: {weak}

Generate problems in JSON format:
{{
    "title": "Extra Practice: {lesson_title}",
    "instructions": "These problems focus on concepts that need more practice. Take your time!",
    "problems": [
        {{
            "number": 1,
            "problem": "The problem text",
            "answer": "The correct answer",
            "concept": "Which weak concept this addresses",
            "hint": "A helpful hint"
        }}
    ]
}}

Requirements:
- Focus exclusively on the weak concepts listed
- Start with simpler versions, build up
- Include extra hints and teaching notes"#,
        count = request.problem_count,
        lesson = lesson_line(request),
        weak = request.weak_concepts.join(", "),
        lesson_title = request.lesson.as_ref().map(|l| l.title.as_str()).unwrap_or(""),
    )
}

fn diagnostic_prompt(request: &GenerationRequest) -> String {
    let per_module = request.questions_per_module;
    let modules_text = request
        .all_modules
        .iter()
        .map(|m| {
            let concepts: Vec<&str> = m
                .lessons
                .iter()
                .flat_map(|l| l.concepts.iter().map(String::as_str))
                .take(8)
                .collect();
            format!("Module {}: {}\n  Concepts: {}", m.number, m.title, concepts.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n");
    let total = per_module * request.all_modules.len() as u32;

    format!(
        r#"Generate a diagnostic assessment for {subject} with {per_module} questions per module.

MODULES TO COVER:
{modules_text}

Generate the diagnostic in JSON format:
{{
    "title": "{subject} Diagnostic Assessment",
    "instructions": "Complete all questions to determine your starting point. Show your work where helpful.",
    "modules": [
        {{
            "moduleNumber": 1,
            "moduleTitle": "Module title",
            "questions": [
                {{
                    "number": 1,
                    "question": "The question text",
                    "answer": "The correct answer",
                    "concept": "Which concept this tests"
                }}
            ]
        }}
    ],
    "totalQuestions": {total}
}}

Requirements:
- {per_module} questions per module, totaling {total} questions
- Questions should be at medium difficulty, representative of mastery
- Include a mix of calculation and word problems
- Questions should be answerable without a calculator
- Clear, unambiguous answers"#,
        subject = request.subject.name,
    )
}

// ---- env helpers ----

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

// ---- reply parsing ----

/// Everything between the first `{` and the last `}`, parsed as JSON.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn title_of(content: &serde_json::Value, fallback: &str) -> String {
    content
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback)
        .to_string()
}

fn extract_answer_key(content: &serde_json::Value, list_key: &str) -> HashMap<String, String> {
    content
        .get(list_key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let number = item.get("number").and_then(|v| v.as_u64())?;
                    let answer = item.get("answer")?;
                    let answer = match answer {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some((number.to_string(), answer))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Renumber diagnostic questions globally across module sections. Returns the
/// answer key plus the global-number to module-number mapping, and writes
/// `globalNumber` back into each question for printing.
fn index_diagnostic(
    content: &mut serde_json::Value,
) -> Option<(HashMap<String, String>, HashMap<String, u32>)> {
    let sections = content.get_mut("modules")?.as_array_mut()?;
    let mut answer_key = HashMap::new();
    let mut question_modules = HashMap::new();
    let mut global = 1u64;

    for section in sections.iter_mut() {
        let module_number = section.get("moduleNumber").and_then(|v| v.as_u64())? as u32;
        let questions = section.get_mut("questions")?.as_array_mut()?;
        for question in questions.iter_mut() {
            let answer = match question.get("answer") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            answer_key.insert(global.to_string(), answer);
            question_modules.insert(global.to_string(), module_number);
            question["globalNumber"] = serde_json::json!(global);
            global += 1;
        }
    }

    if answer_key.is_empty() {
        return None;
    }
    Some((answer_key, question_modules))
}
