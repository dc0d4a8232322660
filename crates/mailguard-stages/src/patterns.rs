//! Pattern stage: signature and reputation lookup
//!
//! The cheapest stage in the escalation pipeline. All matching is indexed:
//! content fingerprints and denylisted domains live in hash sets, phrase
//! indicators in Aho-Corasick automatons, so cost is independent of the
//! rule-set size. Every lookup feeds the bounded sender-reputation cache as
//! a side effect.

use crate::reputation::SenderReputationCache;
use aho_corasick::AhoCorasick;
use mailguard_core::{EmailRecord, Error, Result};
use std::collections::HashSet;
use tracing::debug;

/// Default capacity of the sender-reputation cache
pub const DEFAULT_REPUTATION_CAPACITY: usize = 1024;

/// Outcome of a pattern-stage lookup
#[derive(Debug, Clone, PartialEq)]
pub enum PatternOutcome {
    /// No signature or indicator matched
    NoMatch,
    /// A threat rule matched
    ThreatMatch {
        /// Rule confidence in [0, 1]
        confidence: f32,
        /// Identifier of the triggering rule
        rule_id: String,
    },
}

/// Fast rule/signature matcher over normalized email records
pub struct PatternStage {
    signature_hashes: HashSet<String>,
    denylisted_domains: HashSet<String>,
    suspicious_tlds: Vec<&'static str>,
    urgency: AhoCorasick,
    identity_requests: AhoCorasick,
    impersonation: AhoCorasick,
    shorteners: AhoCorasick,
    reputation: SenderReputationCache,
}

impl PatternStage {
    /// Create a stage with the built-in indicator sets
    pub fn new() -> Result<Self> {
        let build = |phrases: &[&str]| {
            AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(phrases)
                .map_err(|e| Error::internal(format!("failed to build pattern index: {}", e)))
        };

        Ok(Self {
            signature_hashes: HashSet::new(),
            denylisted_domains: [
                "suspicious-bank.com",
                "phishing-test.com",
                "fake-amazon.net",
                "secure-paypal.org",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            suspicious_tlds: vec![".tk", ".ml", ".ga", ".cf"],
            urgency: build(&[
                "urgent",
                "immediately",
                "within 24 hours",
                "expires today",
                "act now",
                "immediate action",
                "account suspended",
                "account locked",
            ])?,
            identity_requests: build(&[
                "social security number",
                "social security",
                "ssn",
                "tax id",
                "taxpayer id",
                "verify your identity",
                "confirm your identity",
                "account number",
                "routing number",
                "card number",
                "pin number",
            ])?,
            impersonation: build(&[
                "internal revenue service",
                "irs agent",
                "social security administration",
                "medicare office",
                "bank of america official",
                "security department",
            ])?,
            shorteners: build(&["bit.ly", "tinyurl.com", "short.link"])?,
            reputation: SenderReputationCache::new(DEFAULT_REPUTATION_CAPACITY),
        })
    }

    /// Add a known-threat content fingerprint
    pub fn add_signature(&mut self, fingerprint: impl Into<String>) {
        self.signature_hashes.insert(fingerprint.into());
    }

    /// Add a sender domain to the denylist
    pub fn deny_domain(&mut self, domain: impl Into<String>) {
        self.denylisted_domains.insert(domain.into().to_lowercase());
    }

    /// Match a record against the rule index
    ///
    /// Returns the highest-confidence matching rule, or `NoMatch`. Also
    /// updates the sender-reputation cache for the record's domain.
    pub fn match_record(&self, record: &EmailRecord) -> Result<PatternOutcome> {
        let mut best: Option<(f32, String)> = None;
        let mut consider = |confidence: f32, rule_id: &str| {
            if best.as_ref().map_or(true, |(c, _)| confidence > *c) {
                best = Some((confidence, rule_id.to_string()));
            }
        };

        if self.signature_hashes.contains(&record.fingerprint) {
            consider(0.98, "signature-hash");
        }

        if let Some(domain) = record.sender_domain() {
            if self.denylisted_domains.contains(domain) {
                consider(0.95, "sender-denylist");
            }
            if self.suspicious_tlds.iter().any(|tld| domain.ends_with(tld)) {
                consider(0.7, "suspicious-tld");
            }
        } else {
            // No parseable domain at all is its own weak signal
            consider(0.6, "malformed-sender");
        }

        let text = record.indicator_text();
        let has_urgency = self.urgency.is_match(&text);
        let has_identity_request = self.identity_requests.is_match(&text);

        if has_urgency && has_identity_request {
            consider(0.95, "urgency-identity-request");
        } else if has_urgency {
            consider(0.55, "urgency-language");
        }

        if self.impersonation.is_match(&text) {
            consider(0.75, "authority-impersonation");
        }

        if record.urls.iter().any(|url| self.shorteners.is_match(url)) {
            consider(0.8, "link-shortener");
        }

        let outcome = match best {
            Some((confidence, rule_id)) => {
                debug!(rule = %rule_id, confidence, "pattern rule matched");
                PatternOutcome::ThreatMatch {
                    confidence,
                    rule_id,
                }
            }
            None => PatternOutcome::NoMatch,
        };

        if let Some(domain) = record.sender_domain() {
            let suspicious = matches!(outcome, PatternOutcome::ThreatMatch { .. });
            self.reputation.observe(domain, suspicious);
        }

        Ok(outcome)
    }

    /// Reputation cache view, for stats and tests
    pub fn reputation(&self) -> &SenderReputationCache {
        &self.reputation
    }
}
