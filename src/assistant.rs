//! Voice assistant backed by an OpenAI-compatible chat completion endpoint.

use crate::config::AppConfig;
use crate::utf8_safe::ellipsize;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Answers a free-form question.
pub trait Assistant: Send + Sync {
    fn answer(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatAssistant {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl ChatAssistant {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.ai_timeout_ms))
            .build()
            .context("failed to build assistant http client")?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.api_base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.ai_model.clone(),
            system_prompt: config.ai_system_prompt.clone(),
            max_tokens: config.ai_max_tokens,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatReq<'a> {
        ChatReq {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &self.system_prompt,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
        }
    }
}

impl Assistant for ChatAssistant {
    fn answer(&self, prompt: &str) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("assistant unavailable: OPENAI_API_KEY is not set");
        };
        if prompt.trim().is_empty() {
            bail!("question is empty");
        }
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&self.request(prompt))
            .send()
            .context("assistant request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed to read assistant response")?;
        if !status.is_success() {
            bail!("assistant http {status}: {}", ellipsize(body.trim(), 200));
        }
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<String> {
    let resp: ChatResp = serde_json::from_str(body).context("assistant response parse failed")?;
    let content = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("assistant response missing choices[0]"))?
        .message
        .content
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        bail!("assistant returned empty content");
    }
    Ok(content.to_string())
}
