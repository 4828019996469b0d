// src/services/matcher.rs

//! E-invoicing relevance classification.
//!
//! Two stages:
//!
//! 1. [`ContentMatcher::is_relevant`]: whole-word keyword match over a
//!    multilingual vocabulary. A negative here is final.
//! 2. [`ContentMatcher::verify`]: precision filter for items that passed
//!    stage 1. Cheap local rules reject generic invoicing-tool pages and
//!    title-only hits on near-empty bodies, then the oracle decides. When
//!    the oracle is absent or fails, strong indicators are counted locally.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::error::{AppError, Result};
use crate::models::MatcherConfig;
use crate::services::oracle::RelevanceOracle;

/// Term variants that make a text a candidate.
const KEYWORD_PATTERNS: &[&str] = &[
    // English
    r"e[-\s]?invoic(?:e|es|ing)",
    r"electronic\s+invoic(?:e|es|ing)",
    // Dutch
    r"e[-\s]?factur(?:atie|ering|en)",
    r"elektronische\s+factu(?:ur|ren|ratie|rering)",
    // French
    r"e[-\s]?factur(?:e|es|ation)",
    r"factur(?:e|es|ation)\s+[ée]lectroniques?",
    // German
    r"e[-\s]?rechnung(?:en)?",
    r"elektronische[n]?\s+rechnung(?:en)?",
    // Network
    r"peppol",
];

/// Indicators counted by the local fallback classifier.
const STRONG_INDICATORS: &[&str] = &[
    r"e[-\s]?invoices?",
    r"e[-\s]?invoicing",
    r"electronic\s+invoic(?:e|es|ing)",
    r"e[-\s]?facturatie",
    r"elektronische\s+factu(?:ur|rering)",
    r"factur(?:e|ation)\s+[ée]lectronique",
    r"e[-\s]?rechnung",
    r"peppol",
    r"ubl\s+invoices?",
    r"xml\s+invoices?",
];

/// Vocabulary that outweighs generic invoicing-tool terms.
const STRONG_CONTEXT: &str = r"e[-\s]?invoicing|electronic\s+invoicing|e[-\s]?facturatie|facturation\s+[ée]lectronique|peppol";

/// Generic invoicing-tool vocabulary.
const GENERIC_TOOL: &str = r"invoice\s+(?:software|templates?|generators?|apps?|management)|create\s+(?:an?\s+|your\s+)?invoices?";

/// How a verification verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethod {
    /// Local precision rules decided without the oracle
    Rules,
    /// The oracle answered
    Oracle,
    /// Strong-indicator counting stood in for the oracle
    KeywordFallback,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Rules => "rules",
            VerificationMethod::Oracle => "oracle",
            VerificationMethod::KeywordFallback => "keyword_fallback",
        }
    }
}

/// Verdict of [`ContentMatcher::verify_detailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    pub method: VerificationMethod,
}

impl Verification {
    fn rules(verified: bool) -> Self {
        Self {
            verified,
            method: VerificationMethod::Rules,
        }
    }
}

/// Keyword matcher with optional oracle-backed verification.
pub struct ContentMatcher {
    keywords: Regex,
    strong_indicators: Vec<Regex>,
    strong_context: Regex,
    generic_tool: Regex,
    oracle: Option<Arc<dyn RelevanceOracle>>,
    min_body_length: usize,
    min_strong_indicators: usize,
}

impl ContentMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        Ok(Self {
            keywords: word_regex(&KEYWORD_PATTERNS.join("|"))?,
            strong_indicators: STRONG_INDICATORS
                .iter()
                .map(|p| word_regex(p))
                .collect::<Result<_>>()?,
            strong_context: word_regex(STRONG_CONTEXT)?,
            generic_tool: word_regex(GENERIC_TOOL)?,
            oracle: None,
            min_body_length: config.min_body_length,
            min_strong_indicators: config.min_strong_indicators.max(1),
        })
    }

    /// Attach an oracle consulted by [`verify`](Self::verify).
    pub fn with_oracle(mut self, oracle: Arc<dyn RelevanceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Whether `text` mentions e-invoicing as a whole word or phrase.
    pub fn is_relevant(&self, text: &str) -> bool {
        self.keywords.is_match(text)
    }

    /// Precision check for an item that may be about e-invoicing.
    pub async fn verify(&self, title: &str, excerpt: &str) -> bool {
        self.verify_detailed(title, excerpt).await.verified
    }

    /// [`verify`](Self::verify) with the method that produced the verdict.
    pub async fn verify_detailed(&self, title: &str, excerpt: &str) -> Verification {
        let combined = format!("{title} {excerpt}");
        if !self.is_relevant(&combined) {
            return Verification::rules(false);
        }
        if self.generic_tool.is_match(&combined) && !self.strong_context.is_match(&combined) {
            log::debug!("Rejected generic invoicing tool: {}", title);
            return Verification::rules(false);
        }
        if !self.is_relevant(excerpt) && excerpt.trim().chars().count() < self.min_body_length {
            log::debug!("Rejected title-only match with thin body: {}", title);
            return Verification::rules(false);
        }

        if let Some(oracle) = &self.oracle {
            match oracle.verify(title, excerpt).await {
                Ok(verified) => {
                    return Verification {
                        verified,
                        method: VerificationMethod::Oracle,
                    };
                }
                Err(e) => log::warn!("Oracle unavailable, using keyword fallback: {}", e),
            }
        }

        Verification {
            verified: self.strong_indicator_count(&combined) >= self.min_strong_indicators,
            method: VerificationMethod::KeywordFallback,
        }
    }

    /// Number of distinct strong indicators present in `text`.
    pub fn strong_indicator_count(&self, text: &str) -> usize {
        self.strong_indicators
            .iter()
            .filter(|re| re.is_match(text))
            .count()
    }
}

fn word_regex(alternatives: &str) -> Result<Regex> {
    let pattern = format!(r"\b(?:{alternatives})\b");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| AppError::config(format!("invalid matcher pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedOracle(Option<bool>);

    #[async_trait]
    impl RelevanceOracle for FixedOracle {
        async fn verify(&self, _title: &str, _excerpt: &str) -> Result<bool> {
            self.0.ok_or_else(|| AppError::oracle("connection refused"))
        }
    }

    fn matcher() -> ContentMatcher {
        ContentMatcher::new(&MatcherConfig::default()).unwrap()
    }

    const BODY: &str = "From 1 January 2026 all Belgian VAT-registered companies must \
        exchange structured electronic invoicing documents over the Peppol network.";

    #[test]
    fn test_keyword_variants() {
        let m = matcher();
        assert!(m.is_relevant("Electronic Invoicing Directive 2025"));
        assert!(m.is_relevant("Mandatory e-invoicing for B2B"));
        assert!(m.is_relevant("EINVOICING roadmap"));
        assert!(m.is_relevant("what is an e invoice?"));
        assert!(m.is_relevant("Verplichte e-facturatie vanaf 2026"));
        assert!(m.is_relevant("elektronische facturen"));
        assert!(m.is_relevant("La facturation électronique obligatoire"));
        assert!(m.is_relevant("Einführung der E-Rechnung"));
        assert!(m.is_relevant("Peppol access points"));
    }

    #[test]
    fn test_generic_text_not_relevant() {
        let m = matcher();
        assert!(!m.is_relevant("Create your invoice template online"));
        assert!(!m.is_relevant("Pay your invoice before the due date"));
        assert!(!m.is_relevant(""));
    }

    #[test]
    fn test_whole_word_matching() {
        let m = matcher();
        assert!(!m.is_relevant("pre-invoicing arrangements"));
        assert!(!m.is_relevant("the invoice was sent"));
        assert!(!m.is_relevant("peppolish"));
        assert!(!m.is_relevant("ReInvoicing fees"));
    }

    #[tokio::test]
    async fn test_verify_never_rescues_primary_negative() {
        let m = matcher().with_oracle(Arc::new(FixedOracle(Some(true))));
        let v = m.verify_detailed("Tax calendar", "Deadlines for 2026").await;
        assert_eq!(v, Verification::rules(false));
    }

    #[tokio::test]
    async fn test_verify_rejects_generic_tool() {
        let m = matcher();
        let v = m
            .verify_detailed("Free e-invoice template", "Use our invoice template to bill clients.")
            .await;
        assert_eq!(v, Verification::rules(false));

        // Strong vocabulary keeps the item.
        assert!(
            m.verify(
                "E-invoicing and invoice software",
                "Which invoice software supports e-invoicing over Peppol?"
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_title_only_thin_body() {
        let m = matcher();
        assert!(!m.verify("E-invoicing", "Read more").await);
        // Same title with a substantial but keyword-free body passes.
        let long_body = "All companies established in the country must comply with the new \
            reporting rules that enter into force next year, as announced by the minister.";
        assert!(m.verify("E-invoicing", long_body).await);
    }

    #[tokio::test]
    async fn test_oracle_verdict_wins() {
        let m = matcher().with_oracle(Arc::new(FixedOracle(Some(false))));
        let v = m.verify_detailed("E-invoicing obligation", BODY).await;
        assert_eq!(
            v,
            Verification {
                verified: false,
                method: VerificationMethod::Oracle
            }
        );
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let m = matcher().with_oracle(Arc::new(FixedOracle(None)));
        let v = m.verify_detailed("E-invoicing obligation", BODY).await;
        assert_eq!(
            v,
            Verification {
                verified: true,
                method: VerificationMethod::KeywordFallback
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_threshold() {
        let config = MatcherConfig {
            min_strong_indicators: 3,
            ..MatcherConfig::default()
        };
        let m = ContentMatcher::new(&config).unwrap();
        assert_eq!(m.strong_indicator_count(BODY), 2);
        assert!(!m.verify("Electronic invoicing", BODY).await);
        assert!(m.verify("E-invoicing", &format!("{BODY} Send UBL invoices.")).await);
    }
}
