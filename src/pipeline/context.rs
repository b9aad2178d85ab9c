//! Context assembly from fan-out results
//!
//! Merges adapter results in fixed priority order (documents, then web, then
//! memory — the tenant's own knowledge outranks generic web results, which
//! outrank memory), truncates per-source content, and assigns the citation
//! indices 1..N that the prompt and the final answer both refer to.

use crate::models::Source;
use crate::models::SourceKind;
use crate::pipeline::orchestrator::SourceBundle;

/// Assembled context block plus the sources in citation order
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub block: String,
    pub sources: Vec<Source>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Assembler for creating the grounded context block
pub struct ContextAssembler {
    snippet_limit: usize,
    document_limit: usize,
}

impl ContextAssembler {
    pub const fn new(snippet_limit: usize, document_limit: usize) -> Self {
        Self {
            snippet_limit,
            document_limit,
        }
    }

    /// Merge a bundle into a cited context block.
    ///
    /// Citation index = position + 1 in the returned source list; indices
    /// are assigned here and never reused or reordered within one turn.
    pub fn assemble(&self, bundle: SourceBundle) -> AssembledContext {
        let SourceBundle {
            documents,
            web,
            memory,
        } = bundle;

        let mut sources: Vec<Source> = Vec::new();
        for mut source in documents.into_iter().chain(web).chain(memory) {
            // Placeholder URLs like #memory are not real locations and never
            // count as duplicates
            if !source.url.starts_with('#') && sources.iter().any(|s| s.url == source.url) {
                continue;
            }
            let limit = if source.kind == SourceKind::Document {
                self.document_limit
            } else {
                self.snippet_limit
            };
            source.snippet = truncate_on_word(&source.snippet, limit);
            sources.push(source);
        }

        if sources.is_empty() {
            return AssembledContext {
                block: String::new(),
                sources,
            };
        }

        let mut block = String::new();
        let mut current_section = "";
        for (idx, source) in sources.iter().enumerate() {
            let section = section_title(source.kind);
            if section != current_section {
                if !block.is_empty() {
                    block.push('\n');
                }
                block.push_str(&format!("## {section}\n"));
                current_section = section;
            }
            block.push_str(&format!(
                "[{}] {} / {} / {}\n",
                idx + 1,
                source.title,
                source.url,
                source.snippet
            ));
        }

        AssembledContext { block, sources }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(200, 1500)
    }
}

fn section_title(kind: SourceKind) -> &'static str {
    if kind.is_web() {
        "Web results"
    } else if kind == SourceKind::Document {
        "Company documents"
    } else {
        "Conversation memory"
    }
}

/// Truncate to at most `limit` characters, backing up to the last word
/// boundary when one exists in the kept range.
pub fn truncate_on_word(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let kept: String = text.chars().take(limit).collect();
    match kept.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => format!("{}...", kept[..pos].trim_end()),
        _ => format!("{kept}..."),
    }
}

/// Citation indices appearing as `[n]` markers in an answer
pub fn citation_indices(answer: &str) -> Vec<usize> {
    let mut indices = Vec::new();
    let bytes = answer.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(close) = answer[i + 1..].find(']') {
                let inner = &answer[i + 1..i + 1 + close];
                if let Ok(n) = inner.parse::<usize>() {
                    indices.push(n);
                }
                i += close + 2;
                continue;
            }
        }
        i += 1;
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    fn source(title: &str, kind: SourceKind) -> Source {
        Source::new(title, format!("https://example.com/{title}"), "content here", kind)
    }

    #[test]
    fn priority_order_is_documents_web_memory() {
        let bundle = SourceBundle {
            documents: vec![source("doc", SourceKind::Document)],
            web: vec![source("web", SourceKind::Web), source("li", SourceKind::Linkedin)],
            memory: vec![source("mem", SourceKind::Memory)],
        };
        let assembled = ContextAssembler::default().assemble(bundle);
        let kinds: Vec<SourceKind> = assembled.sources.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::Document,
                SourceKind::Web,
                SourceKind::Linkedin,
                SourceKind::Memory
            ]
        );
        // Citation indices follow final position
        assert!(assembled.block.contains("[1] doc"));
        assert!(assembled.block.contains("[4] mem"));
    }

    #[test]
    fn sections_are_titled_by_kind() {
        let bundle = SourceBundle {
            documents: vec![source("doc", SourceKind::Document)],
            web: vec![source("web", SourceKind::Web)],
            memory: vec![source("mem", SourceKind::Memory)],
        };
        let assembled = ContextAssembler::default().assemble(bundle);
        assert!(assembled.block.contains("## Company documents"));
        assert!(assembled.block.contains("## Web results"));
        assert!(assembled.block.contains("## Conversation memory"));
    }

    #[test]
    fn duplicate_urls_keep_the_higher_priority_copy() {
        let bundle = SourceBundle {
            documents: vec![source("doc", SourceKind::Document)],
            web: vec![Source::new(
                "same page",
                "https://example.com/doc",
                "content",
                SourceKind::Web,
            )],
            memory: vec![],
        };
        let assembled = ContextAssembler::default().assemble(bundle);
        assert_eq!(assembled.sources.len(), 1);
        assert_eq!(assembled.sources[0].kind, SourceKind::Document);
    }

    #[test]
    fn zero_sources_yield_empty_block() {
        let assembled = ContextAssembler::default().assemble(SourceBundle::default());
        assert!(assembled.is_empty());
        assert!(assembled.block.is_empty());
    }

    #[test]
    fn snippets_truncate_at_word_boundaries() {
        let long = "alpha beta gamma delta epsilon zeta";
        let truncated = truncate_on_word(long, 18);
        assert!(truncated.len() <= 21); // limit + ellipsis
        assert!(truncated.ends_with("..."));
        assert!(!truncated.contains("gam")); // no mid-word cut
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_on_word("short", 200), "short");
    }

    #[test]
    fn document_content_gets_larger_budget() {
        let text = "word ".repeat(100);
        let bundle = SourceBundle {
            documents: vec![Source::new("d", "#d", text.clone(), SourceKind::Document)],
            web: vec![Source::new("w", "#w", text, SourceKind::Web)],
            memory: vec![],
        };
        let assembled = ContextAssembler::default().assemble(bundle);
        assert!(assembled.sources[0].snippet.len() > assembled.sources[1].snippet.len());
        assert!(assembled.sources[1].snippet.len() <= 203);
    }

    #[test]
    fn citation_indices_parse_markers() {
        assert_eq!(citation_indices("Refunds take 30 days [1], see also [2]."), vec![1, 2]);
        assert_eq!(citation_indices("no citations"), Vec::<usize>::new());
        assert_eq!(citation_indices("[not a number] but [3]"), vec![3]);
    }
}
