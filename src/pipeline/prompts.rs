//! Prompt construction
//!
//! Builds the single system message (identity, optional representative
//! instructions, citation instructions, merged context) and the bounded
//! message list sent to the LLM.

use crate::models::ChatMessage;
use crate::models::CompanyContext;
use crate::models::Role;

/// Mandatory citation instruction, embedded verbatim in every grounded prompt
pub const CITATION_INSTRUCTIONS: &str = "When you use information from the numbered context \
sources below, cite it with a bracketed marker like [1] that matches the source's index. Every \
factual claim drawn from the context must carry its marker. Never invent citation numbers and \
never cite a source that is not listed.";

const IDENTITY: &str = "You are a knowledgeable assistant that answers questions accurately and \
concisely using the context provided.";

const NO_CONTEXT_INSTRUCTIONS: &str = "No supporting context was found for this question. Answer \
from general knowledge, say so when you are unsure, and do not fabricate citations.";

/// Builder for the per-turn message list
pub struct PromptBuilder {
    history_window: usize,
}

impl PromptBuilder {
    pub const fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Build the message list: exactly one system message, always first,
    /// then the trailing history window, then the new user message.
    pub fn build(
        &self,
        query: &str,
        history: &[ChatMessage],
        company: Option<&CompanyContext>,
        context_block: &str,
    ) -> Vec<ChatMessage> {
        let mut system = String::from(IDENTITY);

        if let Some(company) = company {
            system.push_str("\n\n");
            system.push_str(&representative_instructions(company));
        }

        system.push_str("\n\n");
        if context_block.is_empty() {
            system.push_str(NO_CONTEXT_INSTRUCTIONS);
        } else {
            system.push_str(CITATION_INSTRUCTIONS);
            system.push_str("\n\nContext:\n");
            system.push_str(context_block);
        }

        let mut messages = vec![ChatMessage::system(system)];

        // Trailing window only; stray system messages in client history are
        // dropped so exactly one system message exists per request
        let tail = history
            .iter()
            .filter(|m| m.role != Role::System)
            .rev()
            .take(self.history_window * 2)
            .cloned()
            .collect::<Vec<_>>();
        messages.extend(tail.into_iter().rev());

        messages.push(ChatMessage::user(query));
        messages
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Representative mode: the assistant speaks as the company
fn representative_instructions(company: &CompanyContext) -> String {
    let mut text = format!(
        "You are the official assistant of {}. Speak as a company representative, using \"we\" \
         and \"our\" when referring to the company.",
        company.name
    );
    if let Some(industry) = &company.industry {
        text.push_str(&format!(" The company operates in the {industry} industry."));
    }
    if let Some(domain) = &company.domain {
        text.push_str(&format!(" Its website is {domain}."));
    }
    if let Some(description) = &company.description {
        text.push_str(&format!(" About the company: {description}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> CompanyContext {
        CompanyContext {
            name: "Acme".to_string(),
            industry: Some("anvils".to_string()),
            ..CompanyContext::default()
        }
    }

    #[test]
    fn system_message_is_single_and_first() {
        let history = vec![
            ChatMessage::system("stray system message"),
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let messages = PromptBuilder::default().build("new question", &history, None, "[1] a / b / c");
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(messages.last().unwrap().content, "new question");
    }

    #[test]
    fn citation_instructions_embedded_verbatim() {
        let messages = PromptBuilder::default().build("q", &[], None, "[1] t / u / s");
        assert!(messages[0].content.contains(CITATION_INSTRUCTIONS));
        assert!(messages[0].content.contains("[1] t / u / s"));
    }

    #[test]
    fn empty_context_switches_to_general_knowledge() {
        let messages = PromptBuilder::default().build("q", &[], None, "");
        assert!(messages[0].content.contains("do not fabricate citations"));
        assert!(!messages[0].content.contains(CITATION_INSTRUCTIONS));
    }

    #[test]
    fn company_context_enables_representative_mode() {
        let messages = PromptBuilder::default().build("q", &[], Some(&company()), "");
        let system = &messages[0].content;
        assert!(system.contains("official assistant of Acme"));
        assert!(system.contains("\"we\""));
        assert!(system.contains("anvils"));
    }

    #[test]
    fn history_is_bounded_to_trailing_window() {
        let mut history = Vec::new();
        for i in 0..20 {
            history.push(ChatMessage::user(format!("q{i}")));
            history.push(ChatMessage::assistant(format!("a{i}")));
        }
        let messages = PromptBuilder::new(5).build("latest", &history, None, "");
        // 1 system + 10 history (5 exchanges) + 1 new user message
        assert_eq!(messages.len(), 12);
        // The kept history is the most recent, in original order
        assert_eq!(messages[1].content, "q15");
        assert_eq!(messages[10].content, "a19");
    }
}
