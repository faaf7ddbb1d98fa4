mod mock;
mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use mock::{DisabledSpeechAnalyzer, MockSpeechAnalyzer};
pub use openai::OpenAiSpeechAnalyzer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechAnalysis {
    pub text: String,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait SpeechAnalyzer: Send + Sync {
    async fn analyze(&self, audio: Vec<u8>, templates: &[String]) -> anyhow::Result<SpeechAnalysis>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Tags whose phrases occur in `text`.
///
/// A template is either a bare phrase (`"happy birthday"`, tagged with the
/// phrase itself) or `tag: phrase, phrase`.
pub fn match_templates(text: &str, templates: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    let mut tags = Vec::new();

    for template in templates {
        let (tag, phrases) = match template.split_once(':') {
            Some((tag, phrases)) => (tag.trim(), phrases),
            None => (template.trim(), template.as_str()),
        };
        if tag.is_empty() {
            continue;
        }

        let hit = phrases
            .split(',')
            .map(|phrase| phrase.trim().to_lowercase())
            .any(|phrase| !phrase.is_empty() && haystack.contains(&phrase));
        if hit && !tags.iter().any(|known: &String| known == tag) {
            tags.push(tag.to_owned());
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::match_templates;

    #[test]
    fn matches_bare_and_tagged_templates() {
        let templates = vec![
            "Happy birthday".to_owned(),
            "promo: discount, акция".to_owned(),
            "duet: sing together".to_owned(),
        ];

        let tags = match_templates("Сегодня АКЦИЯ и happy birthday to Anna!", &templates);
        assert_eq!(tags, vec!["Happy birthday".to_owned(), "promo".to_owned()]);
        assert!(match_templates("nothing here", &templates).is_empty());
    }
}
