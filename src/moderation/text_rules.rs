//! Stateless text rules: banned keywords and links.

use tracing::debug;
use url::Url;

use crate::config::ModerationPolicy;

use super::types::ViolationCategory;

/// Result of evaluating a message's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    Clean,

    /// At least one URL and none of them whitelisted. The sender's privilege
    /// decides whether this becomes a verdict.
    LinkPresent,

    KeywordViolation {
        keyword: String,
        category: ViolationCategory,
    },
}

/// Keyword and link checks over `(text, url_spans)`.
#[derive(Debug, Clone)]
pub struct TextRuleEngine {
    /// Lowercased keyword to category, in match priority order.
    keywords: Vec<(String, ViolationCategory)>,
    /// Lowercased whitelisted hosts.
    whitelist: Vec<String>,
}

impl TextRuleEngine {
    pub fn new<K, W>(keywords: K, whitelist: W) -> Self
    where
        K: IntoIterator<Item = (String, ViolationCategory)>,
        W: IntoIterator<Item = String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|(k, c)| (k.trim().to_lowercase(), c))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
            whitelist: whitelist
                .into_iter()
                .map(|d| d.trim().trim_start_matches('.').to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_policy(policy: &ModerationPolicy) -> Self {
        Self::new(
            policy.keywords.iter().map(|(k, c)| (k.clone(), *c)),
            policy.link_whitelist.iter().cloned(),
        )
    }

    /// Keyword check first, then links.
    pub fn evaluate(&self, text: Option<&str>, url_spans: &[String]) -> TextOutcome {
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            let lower = text.to_lowercase();
            if let Some((keyword, category)) =
                self.keywords.iter().find(|(k, _)| lower.contains(k.as_str()))
            {
                debug!("Keyword '{}' matched ({})", keyword, category);
                return TextOutcome::KeywordViolation {
                    keyword: keyword.clone(),
                    category: *category,
                };
            }
        }

        if url_spans.is_empty() {
            return TextOutcome::Clean;
        }

        let any_whitelisted = url_spans
            .iter()
            .filter_map(|span| host_of(span))
            .any(|host| self.is_whitelisted(&host));

        if any_whitelisted {
            TextOutcome::Clean
        } else {
            TextOutcome::LinkPresent
        }
    }

    /// Exact or subdomain match against the whitelist.
    pub fn is_whitelisted(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.whitelist.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .map(|prefix| prefix.ends_with('.'))
                    .unwrap_or(false)
        })
    }
}

/// Host of a URL span. Spans without a scheme are read as `http://`.
pub fn host_of(span: &str) -> Option<String> {
    let span = span.trim();
    if span.is_empty() {
        return None;
    }

    let parsed = if span.contains("://") {
        Url::parse(span)
    } else {
        Url::parse(&format!("http://{}", span))
    };

    parsed
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .filter(|h| !h.is_empty())
}
