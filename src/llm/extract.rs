//! Best-effort structured extraction from free-form LLM or user text
//!
//! The boundary between free-text generation and structured data is fragile;
//! all JSON-out-of-text parsing goes through this one utility with an
//! explicit outcome type so a malformed payload can never throw uncaught.

use serde_json::Value;

use crate::models::CompanyContext;

/// Outcome of a structured extraction attempt. `Failed` keeps the raw text
/// so callers can fall back to treating it as prose.
#[derive(Debug, Clone)]
pub enum ParseResult {
    Ok(Value),
    Failed(String),
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Extract a JSON object from text that may wrap it in prose or a fenced
/// code block. Tried in order: the whole text, a ```json fence, the first
/// `{` to the last `}`.
pub fn extract_json(text: &str) -> ParseResult {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return ParseResult::Ok(value);
        }
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return ParseResult::Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return ParseResult::Ok(value);
            }
        }
    }

    ParseResult::Failed(text.to_string())
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag on the fence line
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Lift a company context out of free-form company data. Structured fields
/// are used when extraction succeeds; otherwise the raw text becomes the
/// description.
pub fn company_from_text(name: &str, raw: &str) -> CompanyContext {
    match extract_json(raw) {
        ParseResult::Ok(value) => {
            let field = |key: &str| {
                value
                    .get(key)
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            };
            CompanyContext {
                name: field("name").unwrap_or_else(|| name.to_string()),
                domain: field("domain"),
                industry: field("industry"),
                description: field("description"),
                namespace: field("namespace"),
            }
        }
        ParseResult::Failed(text) => CompanyContext {
            name: name.to_string(),
            domain: None,
            industry: None,
            description: if text.trim().is_empty() {
                None
            } else {
                Some(text.trim().to_string())
            },
            namespace: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_parses() {
        let result = extract_json(r#"{"name": "Acme", "industry": "tools"}"#);
        assert!(result.is_ok());
    }

    #[test]
    fn fenced_json_parses() {
        let text = "Here you go:\n```json\n{\"name\": \"Acme\"}\n```\nDone.";
        let ParseResult::Ok(value) = extract_json(text) else {
            panic!("expected extraction to succeed");
        };
        assert_eq!(value["name"], "Acme");
    }

    #[test]
    fn embedded_object_parses() {
        let text = "The answer is {\"a\": 1} as requested.";
        assert!(extract_json(text).is_ok());
    }

    #[test]
    fn garbage_fails_with_raw_text() {
        let ParseResult::Failed(raw) = extract_json("not { valid json }") else {
            panic!("expected extraction to fail");
        };
        assert!(raw.contains("valid json"));
    }

    #[test]
    fn bare_scalar_is_not_structured() {
        assert!(!extract_json("42").is_ok());
    }

    #[test]
    fn company_from_structured_text() {
        let ctx = company_from_text(
            "Acme",
            r#"{"name": "Acme Corp", "domain": "acme.test", "namespace": "acme-123"}"#,
        );
        assert_eq!(ctx.name, "Acme Corp");
        assert_eq!(ctx.domain.as_deref(), Some("acme.test"));
        assert_eq!(ctx.namespace.as_deref(), Some("acme-123"));
    }

    #[test]
    fn company_from_prose_falls_back_to_description() {
        let ctx = company_from_text("Acme", "Acme sells anvils to coyotes.");
        assert_eq!(ctx.name, "Acme");
        assert_eq!(ctx.description.as_deref(), Some("Acme sells anvils to coyotes."));
        assert!(ctx.namespace.is_none());
    }
}
