//! Structured reading of an expert's reply

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static KEY_POINTS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)(?:\[Key Points\]|【关键要点】)\s*(.*?)(?:\[|【|$)").ok());

static RECOMMENDATIONS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)(?:\[Recommendations\]|【具体建议】)\s*(.*?)(?:\[|【|$)").ok());

/// An expert reply split into the sections the personas are asked to use.
///
/// Parsing never fails: a reply without the sections yields empty lists and
/// the full text stays available in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertOpinion {
    pub expert_type: String,
    pub expert_name: String,
    pub content: String,
    pub key_points: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ExpertOpinion {
    pub fn parse(
        expert_type: impl Into<String>,
        expert_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            key_points: bullets(&KEY_POINTS, &content),
            recommendations: bullets(&RECOMMENDATIONS, &content),
            expert_type: expert_type.into(),
            expert_name: expert_name.into(),
            content,
        }
    }

    /// Whether the reply followed the structured format at all
    pub fn is_structured(&self) -> bool {
        !self.key_points.is_empty() || !self.recommendations.is_empty()
    }
}

fn bullets(section: &Option<Regex>, content: &str) -> Vec<String> {
    let Some(body) = section
        .as_ref()
        .and_then(|re| re.captures(content))
        .and_then(|c| c.get(1))
    else {
        return Vec::new();
    };

    body.as_str()
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('*'))
                .or_else(|| line.strip_prefix('•'))
        })
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "[Analysis]\nEnrollment dips in spring.\n\n\
        [Key Points]\n- Visibility is low\n- Word of mouth matters\n  - Tours convert well\n\n\
        [Recommendations]\n* Host an open day\n- Offer trial classes\n-\n";

    #[test]
    fn test_parse_sections() {
        let opinion = ExpertOpinion::parse("planner", "Recruitment Planner", REPLY);

        assert_eq!(
            opinion.key_points,
            vec!["Visibility is low", "Word of mouth matters", "Tours convert well"]
        );
        assert_eq!(
            opinion.recommendations,
            vec!["Host an open day", "Offer trial classes"]
        );
        assert!(opinion.is_structured());
        assert_eq!(opinion.content, REPLY);
    }

    #[test]
    fn test_parse_unstructured_reply() {
        let opinion = ExpertOpinion::parse("teacher", "Lead Teacher", "Just keep it simple.");
        assert!(opinion.key_points.is_empty());
        assert!(opinion.recommendations.is_empty());
        assert!(!opinion.is_structured());
    }

    #[test]
    fn test_parse_bracketed_sections() {
        let reply = "【关键要点】\n- 提升品牌\n\n【具体建议】\n- 举办开放日";
        let opinion = ExpertOpinion::parse("planner", "Recruitment Planner", reply);
        assert_eq!(opinion.key_points, vec!["提升品牌"]);
        assert_eq!(opinion.recommendations, vec!["举办开放日"]);
    }
}
