//! Deciding when a consultation has run its course

use expert_panel_core::config::ConsultationConfig;

/// Judges from the coordinator's reply whether the consultation is done
pub trait CompletionDetector: Send + Sync {
    fn should_complete(&self, reply: &str) -> bool;
}

/// Matches closing phrases anywhere in the reply, ignoring case.
///
/// This is a heuristic: a reply that wraps up without a known phrase keeps
/// the session open until the round limit.
#[derive(Debug, Clone)]
pub struct KeywordCompletionDetector {
    phrases: Vec<String>,
}

impl KeywordCompletionDetector {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ConsultationConfig) -> Self {
        Self::new(&config.completion_phrases)
    }
}

impl Default for KeywordCompletionDetector {
    fn default() -> Self {
        Self::new(expert_panel_core::config::default_completion_phrases())
    }
}

impl CompletionDetector for KeywordCompletionDetector {
    fn should_complete(&self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        self.phrases.iter().any(|phrase| reply.contains(phrase.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phrases_match_case_insensitively() {
        let detector = KeywordCompletionDetector::default();
        assert!(detector.should_complete("Here is the plan. I Hope This Helps!"));
        assert!(detector.should_complete("That concludes our advice for the open day."));
        assert!(!detector.should_complete("Could you tell me more about your budget?"));
    }

    #[test]
    fn test_custom_phrases_ignore_blanks() {
        let detector = KeywordCompletionDetector::new(["  咨询结束 ", "", "wrap up"]);
        assert!(!detector.should_complete("Tell me about your budget."));
        assert!(detector.should_complete("本次咨询结束，祝顺利"));
        assert!(detector.should_complete("Let's WRAP UP here."));
        assert!(!detector.should_complete(""));
    }

    #[test]
    fn test_from_config() {
        let config = ConsultationConfig {
            completion_phrases: vec!["all set".to_string()],
            ..ConsultationConfig::default()
        };
        let detector = KeywordCompletionDetector::from_config(&config);
        assert!(detector.should_complete("You are all set."));
        assert!(!detector.should_complete("I hope this helps"));
    }
}
