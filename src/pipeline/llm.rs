//! Model interaction: build the audit request, call the provider, parse the
//! findings array out of the answer.
//!
//! Prompt wording lives in [`crate::prompts`]; this module only handles
//! message layout, retries and output cleanup.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are transient and frequent on large-context calls.
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) with 500 ms base and
//! 3 retries waits 500 ms → 1 s → 2 s. Each attempt is bounded by
//! `api_timeout_secs`; a timed-out attempt is retried like any other failure.
//!
//! ## Output cleanup
//!
//! Models wrap JSON in Markdown fences or stray quotes despite being told
//! not to. Fences are stripped anywhere in the text, surrounding whitespace
//! and single quotes are trimmed, and if the result still does not parse the
//! outermost `[...]` span is tried before giving up.

use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::finding::RawFinding;
use crate::output::ModelRun;
use crate::prompts;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?").unwrap());

/// Extracted inputs for one audit request.
#[derive(Debug, Clone, Default)]
pub struct AuditRequest {
    /// `(display name, full text)` per reference document.
    pub references: Vec<(String, String)>,
    pub target_name: String,
    /// Target text, one entry per page.
    pub target_pages: Vec<String>,
    /// Rendered target pages, in page order.
    pub page_images: Vec<ImageData>,
}

/// Lay out the request: system prompt, references, then the target.
///
/// ## Message Layout
///
/// 1. **System message**: base audit prompt plus any user instructions
/// 2. **User message**: every reference document, delimited by name
/// 3. **User message**: the target's text with page markers, carrying the
///    rendered pages as image attachments when there are any
pub fn build_messages(request: &AuditRequest, user_instructions: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(prompts::build_final_prompt(user_instructions))];

    let references = request
        .references
        .iter()
        .map(|(name, text)| prompts::reference_block(name, text))
        .collect::<Vec<_>>()
        .join("\n\n");
    messages.push(ChatMessage::user(references));

    let target = prompts::target_block(&request.target_name, &request.target_pages);
    if request.page_images.is_empty() {
        messages.push(ChatMessage::user(target));
    } else {
        let text = format!(
            "{target}\n\n{}",
            prompts::page_images_note(request.page_images.len())
        );
        messages.push(ChatMessage::user_with_images(text, request.page_images.clone()));
    }

    messages
}

/// A parsed model answer.
#[derive(Debug, Clone)]
pub struct ModelAnswer {
    pub findings: Vec<RawFinding>,
    pub run: ModelRun,
}

/// Call `model` through `provider`, retrying transient failures, and parse
/// the findings array.
pub async fn query_model(
    provider: &Arc<dyn LLMProvider>,
    tag: &str,
    model: &str,
    messages: &[ChatMessage],
    config: &AuditConfig,
) -> Result<ModelAnswer, AuditError> {
    let start = Instant::now();
    let options = build_options(config);
    let per_attempt = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<AuditError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{} ({}): retry {}/{} after {}ms",
                tag, model, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_attempt, provider.chat(messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "{} ({}): {} input tokens, {} output tokens, {:?}",
                    tag,
                    model,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );

                let findings = parse_model_output(&response.content).map_err(|detail| {
                    AuditError::ModelOutputInvalid {
                        model: model.to_string(),
                        detail,
                    }
                })?;
                info!("{} ({}) reported {} findings", tag, model, findings.len());

                return Ok(ModelAnswer {
                    run: ModelRun {
                        tag: tag.to_string(),
                        model: model.to_string(),
                        findings: findings.len(),
                        input_tokens: response.prompt_tokens as usize,
                        output_tokens: response.completion_tokens as usize,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries: attempt,
                    },
                    findings,
                });
            }
            Ok(Err(e)) => {
                warn!("{} ({}): attempt {} failed: {}", tag, model, attempt + 1, e);
                last_err = Some(AuditError::LlmApiError {
                    model: model.to_string(),
                    retries: config.max_retries,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "{} ({}): attempt {} timed out after {}s",
                    tag,
                    model,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(AuditError::ApiTimeout {
                    model: model.to_string(),
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AuditError::LlmApiError {
        model: model.to_string(),
        retries: config.max_retries,
        message: "Unknown error".to_string(),
    }))
}

/// Strip fences and quotes, then parse a JSON array of finding objects.
pub fn parse_model_output(text: &str) -> Result<Vec<RawFinding>, String> {
    let stripped = CODE_FENCE.replace_all(text, "");
    let clean = stripped.trim().trim_matches('\'').trim();

    match serde_json::from_str::<Vec<RawFinding>>(clean) {
        Ok(findings) => Ok(findings),
        Err(first) => {
            let span = clean
                .find('[')
                .zip(clean.rfind(']'))
                .filter(|(open, close)| open < close)
                .map(|(open, close)| &clean[open..=close]);
            match span {
                Some(inner) if inner.len() < clean.len() => {
                    serde_json::from_str(inner).map_err(|_| first.to_string())
                }
                _ => Err(first.to_string()),
            }
        }
    }
}

/// Build `CompletionOptions` from the audit config.
fn build_options(config: &AuditConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = AuditConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n[{\"page_number\": 1, \"word/phrase_highlighted\": \"LTV Ratio\"}]\n```";
        let findings = parse_model_output(text).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].phrase(), Some("LTV Ratio"));
    }

    #[test]
    fn strips_stray_single_quotes() {
        let findings = parse_model_output("'[]'").unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn recovers_array_from_surrounding_prose() {
        let text = "Here are the findings:\n[{\"page_number\": 2}]\nLet me know if you need more.";
        assert_eq!(parse_model_output(text).unwrap().len(), 1);
    }

    #[test]
    fn rejects_non_array_output() {
        assert!(parse_model_output("I could not read the document.").is_err());
        assert!(parse_model_output("{\"page_number\": 1}").is_err());
    }

    #[test]
    fn messages_put_references_before_target() {
        let request = AuditRequest {
            references: vec![("rbi.pdf".into(), "LTV must not exceed 75%".into())],
            target_name: "policy.pdf".into(),
            target_pages: vec!["Gold Loan LTV Ratio 90%".into()],
            page_images: vec![ImageData::new("AAAA".to_string(), "image/png")],
        };
        let messages = build_messages(&request, Some("Focus on LTV."));
        assert_eq!(messages.len(), 3);
        assert!(messages[0].content.contains("### ADDITIONAL USER INSTRUCTIONS"));
        assert!(messages[1].content.contains("REFERENCE DOCUMENT: rbi.pdf"));
        assert!(messages[2].content.contains("--- PAGE 1 ---"));
        assert!(messages[2].content.contains("1 attached images"));
        assert!(!messages[1].content.contains("attached images"));
    }
}
