#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordIntent {
    Break,
    Return,
}

#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    break_terms: Vec<String>,
    return_terms: Vec<String>,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self {
            break_terms: ["перерыв", "перекур", "отойду", "break", "brb"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            return_terms: ["вернулся", "вернулась", "на месте", "i'm back", "back"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl KeywordPolicy {
    pub fn new(break_terms: Vec<String>, return_terms: Vec<String>) -> Self {
        Self {
            break_terms,
            return_terms,
        }
    }

    pub fn break_terms(&self) -> &[String] {
        &self.break_terms
    }

    pub fn return_terms(&self) -> &[String] {
        &self.return_terms
    }

    pub fn classify(&self, input: &str) -> Option<KeywordIntent> {
        let lowercase = input.to_lowercase();
        let mentions = |terms: &[String]| terms.iter().any(|term| contains_word(&lowercase, term));

        if mentions(&self.return_terms) {
            Some(KeywordIntent::Return)
        } else if mentions(&self.break_terms) {
            Some(KeywordIntent::Break)
        } else {
            None
        }
    }
}

// `term` must sit between word boundaries, so "back" does not match "feedback".
fn contains_word(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::{KeywordIntent, KeywordPolicy};

    #[test]
    fn classifies_break_and_return_phrases() {
        let policy = KeywordPolicy::default();
        assert_eq!(policy.classify("Ушла на ПЕРЕРЫВ"), Some(KeywordIntent::Break));
        assert_eq!(policy.classify("вернулась с перерыва"), Some(KeywordIntent::Return));
        assert_eq!(policy.classify("Back from break"), Some(KeywordIntent::Return));
        assert_eq!(policy.classify("next song please"), None);
    }

    #[test]
    fn terms_only_match_whole_words() {
        let policy = KeywordPolicy::default();
        assert_eq!(policy.classify("thanks for the feedback"), None);
        assert_eq!(policy.classify("turn the background music down"), None);
        assert_eq!(policy.classify("ok, back!"), Some(KeywordIntent::Return));
        assert_eq!(policy.classify("breakfast time"), None);
    }

    #[test]
    fn custom_terms_replace_defaults() {
        let policy = KeywordPolicy::new(vec!["pause me".to_owned()], vec!["resume".to_owned()]);
        assert_eq!(policy.classify("pause me now"), Some(KeywordIntent::Break));
        assert_eq!(policy.classify("перерыв"), None);
    }
}
