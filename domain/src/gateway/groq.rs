//! Groq chat completions client used to summarize lecture transcripts.
//!
//! Groq answers synchronously, so [`GroqSummarizer`] runs each completion as a background
//! task and exposes it through the same submit/poll interface as the remote providers.

use super::{check_status, request_error};
use crate::error::{DomainErrorKind, Error, InternalErrorKind};
use async_trait::async_trait;
use dashmap::DashMap;
use job_client::{JobClient, Payload, PollStatus};
use log::*;
use serde::{Deserialize, Serialize};
use service::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const PROVIDER_ID: &str = "groq";

const MAX_TOKENS: u32 = 1500;
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn system_prompt(language: &str) -> String {
    format!(
        "You are a professional academic assistant creating structured lecture summaries. \
         Write the summary in the language with code \"{language}\" and use HTML <b> tags \
         for the main headings. Follow this structure:\n\
         Title: a concise descriptive title\n\
         Introduction: a brief overview of the topic and its significance\n\
         Key Points: the core ideas in a logical order, with examples where helpful\n\
         Conclusion: the main takeaways and their implications\n\
         Multiple-Choice Questions: clear questions with options a) to d), the correct \
         answer and a brief explanation\n\
         Practical Applications: two real-world use cases"
    )
}

/// Groq API client
pub struct GroqClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let mut headers = reqwest::header::HeaderMap::new();

        let mut header_value = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| {
                warn!("Failed to create auth header: {:?}", e);
                Error {
                    source: Some(Box::new(e)),
                    error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                        "Invalid API key format".to_string(),
                    )),
                }
            })?;
        header_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let api_key = config.groq_api_key().ok_or_else(|| {
            warn!("No Groq API key configured");
            Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
            }
        })?;

        Self::new(
            &api_key,
            config.groq_base_url(),
            config.groq_model(),
            config.http_request_timeout(),
        )
    }

    /// Summarizes `text` in `language` and returns the summary.
    pub async fn summarize(&self, text: &str, language: &str) -> Result<String, job_client::Error> {
        let system = system_prompt(language);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!(
            "Requesting a {language} summary of {} characters from Groq",
            text.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let completion: ChatCompletionResponse = check_status(PROVIDER_ID, response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                job_client::Error::Deserialization("Groq returned no completion".to_owned())
            })
    }
}

type SummaryTask = JoinHandle<Result<String, job_client::Error>>;

/// Runs Groq summaries in the background behind the submit/poll interface.
pub struct GroqSummarizer {
    client: Arc<GroqClient>,
    tasks: DashMap<String, SummaryTask>,
}

impl GroqSummarizer {
    pub fn new(client: GroqClient) -> Self {
        Self {
            client: Arc::new(client),
            tasks: DashMap::new(),
        }
    }
}

#[async_trait]
impl JobClient for GroqSummarizer {
    async fn submit(&self, payload: Payload) -> Result<String, job_client::Error> {
        let Payload::Text { text, language } = payload else {
            return Err(job_client::Error::Configuration(
                "Groq only summarizes text".to_owned(),
            ));
        };

        let remote_job_id = format!("groq-{}", uuid::Uuid::new_v4());
        let client = Arc::clone(&self.client);
        let task = tokio::spawn(async move { client.summarize(&text, &language).await });

        self.tasks.insert(remote_job_id.clone(), task);
        Ok(remote_job_id)
    }

    async fn poll(&self, remote_job_id: &str) -> Result<PollStatus, job_client::Error> {
        let finished = match self.tasks.get(remote_job_id) {
            Some(task) => task.is_finished(),
            None => {
                return Err(job_client::Error::NotFound(format!(
                    "no summary task {remote_job_id}"
                )))
            }
        };

        if !finished {
            return Ok(PollStatus::processing());
        }

        let Some((_, task)) = self.tasks.remove(remote_job_id) else {
            return Err(job_client::Error::NotFound(format!(
                "no summary task {remote_job_id}"
            )));
        };

        match task.await {
            Ok(Ok(summary)) => Ok(PollStatus::completed(summary)),
            Ok(Err(err)) => {
                warn!("Summary task {remote_job_id} failed: {err}");
                Ok(PollStatus::failed(err.to_string()))
            }
            Err(err) => Ok(PollStatus::failed(format!("summary task aborted: {err}"))),
        }
    }

    fn abandon(&self, remote_job_id: &str) {
        if let Some((_, task)) = self.tasks.remove(remote_job_id) {
            task.abort();
            debug!("Dropped summary task {remote_job_id}");
        }
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

impl Drop for GroqSummarizer {
    fn drop(&mut self) {
        for task in self.tasks.iter() {
            task.abort();
        }
    }
}
