//! Query intent classification
//!
//! A pure, total function over the query text: lower-case the query, test
//! ordered keyword groups via substring containment, first matching group
//! wins. The declaration order below is a deliberate priority cascade and is
//! the tie-break; it must stay stable for reproducible behavior.

use serde::Deserialize;
use serde::Serialize;

use crate::models::CompanyContext;

/// Intent category of a company-related query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    People,
    Reviews,
    Technical,
    News,
    Culture,
    Products,
    Competition,
    General,
}

/// Platform targeted by company-scoped web searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Crunchbase,
    Glassdoor,
    Indeed,
    Github,
    Stackoverflow,
    Reddit,
    News,
    Producthunt,
}

impl Platform {
    /// Search-query hint for this platform
    pub const fn hint(self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Crunchbase => "crunchbase",
            Self::Glassdoor => "glassdoor",
            Self::Indeed => "indeed",
            Self::Github => "github",
            Self::Stackoverflow => "stackoverflow",
            Self::Reddit => "reddit",
            Self::News => "news",
            Self::Producthunt => "product hunt",
        }
    }
}

/// Derived per query; never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    pub kind: IntentKind,
    pub keywords: Vec<String>,
    pub target_platforms: Vec<Platform>,
    /// True iff a company context, namespace, or chatbot id is present;
    /// decides whether company-scoped searches run at all
    pub company_specific: bool,
}

/// Keyword groups in cascade priority order. First group containing a
/// matching substring wins.
const KEYWORD_GROUPS: &[(IntentKind, &[&str])] = &[
    (
        IntentKind::People,
        &[
            "founder", "ceo", "cto", "who is", "who founded", "team", "employee", "leadership",
            "executive", "staff",
        ],
    ),
    (
        IntentKind::Reviews,
        &["review", "rating", "testimonial", "opinion", "complaint", "satisfied"],
    ),
    (
        IntentKind::Technical,
        &[
            "api", "sdk", "tech stack", "technology", "github", "programming", "integration",
            "documentation", "engineering",
        ],
    ),
    (
        IntentKind::News,
        &["news", "announcement", "funding", "raised", "acquisition", "launch", "press"],
    ),
    (
        IntentKind::Culture,
        &["culture", "work-life", "work life", "benefits", "values", "diversity", "remote"],
    ),
    (
        IntentKind::Products,
        &["product", "feature", "pricing", "plan", "service", "offering", "refund"],
    ),
    (
        IntentKind::Competition,
        &["competitor", "alternative", "versus", " vs ", "compare", "better than"],
    ),
];

/// Fixed intent-to-platform mapping
const fn platforms_for(kind: IntentKind) -> &'static [Platform] {
    match kind {
        IntentKind::People => &[Platform::Linkedin, Platform::Crunchbase],
        IntentKind::Reviews => &[Platform::Glassdoor, Platform::Indeed, Platform::Reddit],
        IntentKind::Technical => &[Platform::Github, Platform::Stackoverflow],
        IntentKind::News => &[Platform::News, Platform::Crunchbase],
        IntentKind::Culture => &[Platform::Glassdoor, Platform::Linkedin],
        IntentKind::Products => &[Platform::Producthunt, Platform::Reddit],
        IntentKind::Competition => &[Platform::News, Platform::Producthunt],
        IntentKind::General => &[],
    }
}

/// Classify a query against an optional company context.
///
/// Pure and total: never errors, `general` when no group matches.
pub fn classify(
    query: &str,
    company: Option<&CompanyContext>,
    namespace: Option<&str>,
    chatbot_id: Option<&str>,
) -> QueryIntent {
    let lowered = query.to_lowercase();

    let mut kind = IntentKind::General;
    let mut keywords = Vec::new();
    'groups: for (candidate, group) in KEYWORD_GROUPS {
        for keyword in *group {
            if lowered.contains(keyword) {
                kind = *candidate;
                keywords = group
                    .iter()
                    .filter(|k| lowered.contains(*k))
                    .map(|k| (*k).trim().to_string())
                    .collect();
                break 'groups;
            }
        }
    }

    QueryIntent {
        kind,
        keywords,
        target_platforms: platforms_for(kind).to_vec(),
        company_specific: company.is_some() || namespace.is_some() || chatbot_id.is_some(),
    }
}
