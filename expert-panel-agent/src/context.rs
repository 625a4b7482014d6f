//! Context builder for coordinator prompts

use expert_panel_core::session::Session;
use expert_panel_experts::ExpertCatalog;
use expert_panel_providers::Message;
use std::fmt::Write;
use std::sync::Arc;

/// Builds the messages sent to the coordinator for one round
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    catalog: Arc<ExpertCatalog>,
}

impl ContextBuilder {
    pub fn new(catalog: Arc<ExpertCatalog>) -> Self {
        Self { catalog }
    }

    /// System prompt describing the panel and how to use it
    pub fn build_system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are a kindergarten enrollment consultation assistant. You lead a panel of \
             experts and can consult them through function calls.\n\n## Expert panel\n",
        );

        for (index, expert) in self.catalog.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "{}. **{}** ({}) - {}",
                index + 1,
                expert.name,
                expert.function.name,
                expert.expertise.join(", ")
            );
        }

        prompt.push_str(
            r#"
## Workflow
1. Understand the user's situation and what they actually need.
2. Pick the one to three experts most relevant to the question.
3. Call their functions to collect professional opinions.
4. Integrate the opinions into one complete, practical plan.

## Rules
- For any concrete consultation question, consult the relevant experts rather than answering alone.
- If the question is only a greeting or needs clarification, reply directly without calling experts.
- When the user's needs are fully addressed, close with "I hope this helps"."#,
        );

        prompt
    }

    /// Transcript of the consultation so far
    pub fn build_history(&self, session: &Session) -> String {
        if session.rounds.is_empty() {
            return format!("Original question: {}", session.original_query);
        }

        let mut history = format!("Original question: {}\n\n", session.original_query);
        for round in &session.rounds {
            let _ = writeln!(history, "Round {}:", round.round_number);
            let _ = writeln!(history, "User: {}", round.user_query);
            if !round.expert_responses.is_empty() {
                history.push_str("Expert results:\n");
                for result in &round.expert_responses {
                    let _ = writeln!(history, "- {}: {}", result.expert_name, result.response);
                }
            }
            let _ = write!(history, "AI reply: {}\n\n", round.ai_response);
        }
        history
    }

    /// System prompt plus one user message carrying history and the new input
    pub fn build_messages(&self, session: &Session, user_input: &str) -> Vec<Message> {
        let history = self.build_history(session);
        vec![
            Message::system(self.build_system_prompt()),
            Message::user(format!("{}\n\nCurrent question: {}", history, user_input)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use expert_panel_core::session::{ExpertResult, Round, TokenUsage};

    fn builder() -> ContextBuilder {
        ContextBuilder::new(Arc::new(ExpertCatalog::builtin()))
    }

    #[test]
    fn test_system_prompt_lists_every_function() {
        let prompt = builder().build_system_prompt();
        for expert in ExpertCatalog::builtin().iter() {
            assert!(prompt.contains(&expert.function.name));
        }
    }

    #[test]
    fn test_history_without_rounds() {
        let session = Session::new(1, "How do we fill the autumn intake?", 12);
        assert_eq!(
            builder().build_history(&session),
            "Original question: How do we fill the autumn intake?"
        );
    }

    #[test]
    fn test_history_includes_rounds_in_order() {
        let mut session = Session::new(1, "Open day plan", 12);
        session.push_round(Round {
            round_number: 1,
            user_query: "Open day plan".to_string(),
            ai_response: "Here is a draft".to_string(),
            experts_called: vec!["consult_teacher".to_string()],
            expert_responses: vec![ExpertResult::success("teacher", "Lead Teacher", "Use stations")],
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        });
        session.push_round(Round {
            round_number: 2,
            user_query: "What about budget?".to_string(),
            ai_response: "Keep it lean".to_string(),
            experts_called: vec![],
            expert_responses: vec![],
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        });

        let history = builder().build_history(&session);
        let expected = "Original question: Open day plan\n\n\
            Round 1:\nUser: Open day plan\nExpert results:\n- Lead Teacher: Use stations\nAI reply: Here is a draft\n\n\
            Round 2:\nUser: What about budget?\nAI reply: Keep it lean\n\n";
        assert_eq!(history, expected);
    }

    #[test]
    fn test_build_messages_appends_current_question() {
        let session = Session::new(1, "Original", 12);
        let messages = builder().build_messages(&session, "Follow-up");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(
            messages[1].content,
            "Original question: Original\n\nCurrent question: Follow-up"
        );
    }
}
