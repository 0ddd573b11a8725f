//! xAI (Grok) question generation over the OpenAI-compatible chat API
//!
//! The model is asked for a JSON object of the form
//! `{"questions": [{"question", "options": {"A".."D"}, "answer", "explanation"}]}`.
//! Each item is validated before it becomes a [`Question`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::generator::QuestionGenerator;
use super::types::{Difficulty, GenerationRequest, Question, LETTERS};
use crate::config::GeneratorConfig;
use crate::error::{PrepError, Result};

pub const XAI_SOURCE: &str = "xai";

pub struct XaiGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    /// Delay before the first retry; doubles on each attempt
    retry_base: Duration,
}

impl XaiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PrepError::Config("generator.api_key is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries.max(1),
            retry_base: Duration::from_secs(1),
        })
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    async fn complete(&self, system_prompt: String, user_prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut attempt = 0;
        loop {
            match self.send(&request).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt + 1 < self.max_retries => {
                    let wait = self.retry_base * 2u32.pow(attempt);
                    warn!(
                        "xAI attempt {} failed: {}; retrying in {:?}",
                        attempt + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("All {} xAI attempts failed", self.max_retries);
                    return Err(e);
                }
            }
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!("Sending chat completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PrepError::Generation(format!(
                "xAI request failed: {} - {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PrepError::Generation("xAI response had no content".to_string()))
    }
}

#[async_trait]
impl QuestionGenerator for XaiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>> {
        info!(
            exam_type = %request.exam_type,
            topic = %request.topic,
            difficulty = %request.difficulty,
            score = request.user_score,
            "Generating {} questions with {}",
            request.count,
            self.model
        );

        let content = self
            .complete(system_prompt(request), user_prompt(request))
            .await?;
        parse_questions(&content, request)
    }

    fn name(&self) -> &'static str {
        XAI_SOURCE
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

fn difficulty_guidance(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "Focus on fundamental concepts. Use straightforward language and basic applications. Avoid complex multi-step problems.",
        Difficulty::Medium => "Include moderate complexity with some multi-step reasoning. Test understanding of core concepts with practical applications.",
        Difficulty::Hard => "Use complex scenarios, advanced applications and careful reasoning. Include edge cases and nuanced concepts.",
    }
}

fn learner_context(score: f64) -> &'static str {
    if score < 40.0 {
        "The learner is struggling with this topic. Build confidence and reinforce basic understanding."
    } else if score <= 70.0 {
        "The learner has moderate understanding. Ask them to apply concepts in new ways."
    } else {
        "The learner has strong understanding. Test advanced applications and edge cases."
    }
}

pub(crate) fn system_prompt(request: &GenerationRequest) -> String {
    let exam = request.exam_type.as_str();
    let topic = &request.topic;

    format!(
        r#"You are an expert {exam} adaptive question writer.

LEARNER CONTEXT:
- Current score in {topic}: {score:.1}%
- Target difficulty: {difficulty}
- Guidance: {context}

DIFFICULTY ({difficulty_upper}):
{guidance}

REQUIREMENTS:
1. Write original multiple-choice questions
2. Each question has exactly 4 options labelled A, B, C and D
3. Exactly one option is correct; the others are plausible distractors
4. Match authentic {exam} style
5. Explain why the correct option is right

OUTPUT FORMAT (JSON only):
{{
  "questions": [
    {{
      "question": "Question text",
      "options": {{"A": "...", "B": "...", "C": "...", "D": "..."}},
      "answer": "A",
      "explanation": "Why A is correct"
    }}
  ]
}}

All questions must test {topic} within {exam} at {difficulty} level."#,
        score = request.user_score,
        difficulty = request.difficulty,
        difficulty_upper = request.difficulty.as_str().to_ascii_uppercase(),
        context = learner_context(request.user_score),
        guidance = difficulty_guidance(request.difficulty),
    )
}

pub(crate) fn user_prompt(request: &GenerationRequest) -> String {
    format!(
        "Generate {} {}-level {} multiple-choice question{} focused on {}. Respond with valid JSON only.",
        request.count,
        request.difficulty,
        request.exam_type,
        if request.count == 1 { "" } else { "s" },
        request.topic
    )
}

fn text_field(item: &Value, field: &str, index: usize) -> Result<String> {
    let value = item.get(field).ok_or_else(|| {
        PrepError::Generation(format!("Question {} missing required field: {}", index + 1, field))
    })?;

    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(text)
}

/// Validate a model response and turn it into questions
pub(crate) fn parse_questions(content: &str, request: &GenerationRequest) -> Result<Vec<Question>> {
    let data: Value = serde_json::from_str(content)
        .map_err(|e| PrepError::Generation(format!("Invalid JSON from xAI: {}", e)))?;

    let items = data
        .get("questions")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PrepError::Generation("Invalid response format: missing 'questions' array".to_string())
        })?;

    let batch = uuid::Uuid::new_v4().simple().to_string();
    let mut questions = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let question_text = text_field(item, "question", index)?;
        let explanation = text_field(item, "explanation", index)?;
        let answer = text_field(item, "answer", index)?.to_ascii_uppercase();

        let options = item.get("options").and_then(Value::as_object).ok_or_else(|| {
            PrepError::Generation(format!("Question {} options must be an object", index + 1))
        })?;

        let mut choices = Vec::with_capacity(LETTERS.len());
        for letter in LETTERS {
            let key = letter.to_string();
            let choice = options.get(&key).ok_or_else(|| {
                PrepError::Generation(format!("Question {} missing option: {}", index + 1, key))
            })?;
            choices.push(match choice {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            });
        }

        if !LETTERS.iter().any(|l| answer.len() == 1 && answer.starts_with(*l)) {
            return Err(PrepError::Generation(format!(
                "Question {} invalid answer: {}",
                index + 1,
                answer
            )));
        }

        questions.push(Question {
            id: format!("xai_{}_{}_{}", request.exam_type, &batch[..8], index),
            exam_type: request.exam_type.to_string(),
            topic: request.topic.clone(),
            difficulty: request.difficulty,
            question_text,
            choices,
            correct_answer: answer,
            explanation,
            source: XAI_SOURCE.to_string(),
        });
    }

    debug!("Validated {} questions from xAI", questions.len());
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorProvider;
    use crate::quota::ExamType;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(count: u32) -> GenerationRequest {
        GenerationRequest {
            exam_type: ExamType::parse(Some("GRE")).unwrap(),
            topic: "algebra".to_string(),
            difficulty: Difficulty::Medium,
            user_score: 55.0,
            count,
        }
    }

    fn valid_content() -> String {
        serde_json::json!({
            "questions": [{
                "question": "If 2x = 8, what is x?",
                "options": {"A": "2", "B": "4", "C": "6", "D": "8"},
                "answer": "b",
                "explanation": "Divide both sides by 2."
            }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_valid_response() {
        let questions = parse_questions(&valid_content(), &request(1)).unwrap();
        assert_eq!(questions.len(), 1);

        let q = &questions[0];
        assert_eq!(q.correct_answer, "B");
        assert_eq!(q.choices, vec!["2", "4", "6", "8"]);
        assert_eq!(q.source, XAI_SOURCE);
        assert!(q.id.starts_with("xai_GRE_"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_questions("not json", &request(1)).is_err());
        assert!(parse_questions(r#"{"items": []}"#, &request(1)).is_err());

        let missing_option = serde_json::json!({
            "questions": [{
                "question": "Q", "options": {"A": "1", "B": "2", "C": "3"},
                "answer": "A", "explanation": "E"
            }]
        });
        assert!(parse_questions(&missing_option.to_string(), &request(1)).is_err());

        let bad_answer = serde_json::json!({
            "questions": [{
                "question": "Q", "options": {"A": "1", "B": "2", "C": "3", "D": "4"},
                "answer": "E", "explanation": "E"
            }]
        });
        assert!(parse_questions(&bad_answer.to_string(), &request(1)).is_err());
    }

    #[test]
    fn test_prompts_carry_context() {
        let req = request(3);
        let system = system_prompt(&req);
        assert!(system.contains("55.0%"));
        assert!(system.contains("MEDIUM"));
        assert!(system.contains("moderate understanding"));

        let user = user_prompt(&req);
        assert!(user.contains("3 medium-level GRE multiple-choice questions"));
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = GeneratorConfig {
            provider: GeneratorProvider::Xai,
            api_key: None,
            ..GeneratorConfig::default()
        };
        assert!(XaiGenerator::new(&config).is_err());
    }

    async fn spawn_provider(failures_before_success: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));

        async fn handler(
            State((calls, failures)): State<(Arc<AtomicUsize>, usize)>,
        ) -> std::result::Result<Json<Value>, axum::http::StatusCode> {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < failures {
                return Err(axum::http::StatusCode::SERVICE_UNAVAILABLE);
            }
            Ok(Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": valid_content()}}]
            })))
        }

        let app = Router::new()
            .route("/chat/completions", post(handler))
            .with_state((calls.clone(), failures_before_success));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), calls)
    }

    fn generator(api_base: String, max_retries: u32) -> XaiGenerator {
        let config = GeneratorConfig {
            api_base,
            api_key: Some("test-key".to_string()),
            max_retries,
            ..GeneratorConfig::default()
        };
        XaiGenerator::new(&config)
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_generate_retries_then_succeeds() {
        let (base, calls) = spawn_provider(2).await;
        let questions = generator(base, 3).generate(&request(1)).await.unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_max_retries() {
        let (base, calls) = spawn_provider(10).await;
        let result = generator(base, 3).generate(&request(1)).await;

        assert!(matches!(result, Err(PrepError::Generation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
