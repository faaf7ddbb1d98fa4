use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;

use super::{SpeechAnalysis, SpeechAnalyzer, match_templates};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(Debug, Clone)]
pub struct OpenAiSpeechAnalyzer {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiSpeechAnalyzer {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl SpeechAnalyzer for OpenAiSpeechAnalyzer {
    async fn analyze(&self, audio: Vec<u8>, templates: &[String]) -> anyhow::Result<SpeechAnalysis> {
        if audio.is_empty() {
            anyhow::bail!("voice note is empty");
        }

        let audio_part = Part::bytes(audio)
            .file_name("voice.ogg")
            .mime_str("audio/ogg")?;
        let form = Form::new()
            .part("file", audio_part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()
            .context("transcription request rejected")?
            .json::<TranscriptionResponse>()
            .await?;

        let text = response.text.trim().to_owned();
        Ok(SpeechAnalysis {
            tags: match_templates(&text, templates),
            text,
        })
    }
}
