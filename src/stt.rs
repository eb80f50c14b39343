//! Speech-to-text for dictated audio.
//!
//! The phone records compressed audio (webm/opus) in the browser, so transcription is
//! delegated to an OpenAI-compatible `/audio/transcriptions` endpoint. The client is
//! built once per server and shared by every connection.

use crate::config::AppConfig;
use crate::utf8_safe::ellipsize;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

/// Turns one recorded clip into text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResp {
    text: Option<String>,
}

/// Calls an OpenAI-compatible transcription endpoint.
pub struct RemoteTranscriber {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    language: Option<String>,
}

impl RemoteTranscriber {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.stt_timeout_ms))
            .build()
            .context("failed to build transcription http client")?;
        let language = Some(config.stt_lang.trim().to_string())
            .filter(|lang| !lang.eq_ignore_ascii_case("auto"));
        Ok(Self {
            client,
            url: transcriptions_url(&config.api_base_url),
            api_key: config.api_key.clone(),
            model: config.stt_model.clone(),
            language,
        })
    }
}

impl Transcriber for RemoteTranscriber {
    fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("transcription unavailable: OPENAI_API_KEY is not set");
        };
        if audio.is_empty() {
            bail!("audio clip is empty");
        }
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name("audio.webm")
            .mime_str("audio/webm")
            .context("invalid audio mime type")?;
        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(lang) = &self.language {
            form = form.text("language", lang.clone());
        }

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .context("transcription request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed to read transcription response")?;
        if !status.is_success() {
            bail!("transcription http {status}: {}", ellipsize(body.trim(), 200));
        }
        parse_transcription(&body)
    }
}

pub(crate) fn transcriptions_url(base_url: &str) -> String {
    format!("{}/audio/transcriptions", base_url.trim_end_matches('/'))
}

pub(crate) fn parse_transcription(body: &str) -> Result<String> {
    let resp: TranscriptionResp =
        serde_json::from_str(body).context("transcription response parse failed")?;
    let text = resp
        .text
        .ok_or_else(|| anyhow!("transcription response missing text"))?;
    Ok(text.trim().to_string())
}
