use async_trait::async_trait;

use super::{SpeechAnalysis, SpeechAnalyzer, match_templates};

#[derive(Debug, Default)]
pub struct MockSpeechAnalyzer {
    pub transcript: String,
}

#[async_trait]
impl SpeechAnalyzer for MockSpeechAnalyzer {
    async fn analyze(&self, _audio: Vec<u8>, templates: &[String]) -> anyhow::Result<SpeechAnalysis> {
        Ok(SpeechAnalysis {
            text: self.transcript.clone(),
            tags: match_templates(&self.transcript, templates),
        })
    }
}

#[derive(Debug, Default)]
pub struct DisabledSpeechAnalyzer;

#[async_trait]
impl SpeechAnalyzer for DisabledSpeechAnalyzer {
    async fn analyze(&self, _audio: Vec<u8>, _templates: &[String]) -> anyhow::Result<SpeechAnalysis> {
        anyhow::bail!("speech analysis is not configured")
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
