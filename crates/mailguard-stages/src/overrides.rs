//! Deterministic override layer for the classifier stage
//!
//! An ordered list of predicate rules evaluated after the model score is
//! obtained, never interleaved with the model call. Any match forces a
//! threat verdict at fixed confidence regardless of the score. Evaluation
//! is deterministic and side-effect-free: two identical records always
//! produce the same decision.

use mailguard_core::{EmailRecord, Error, Result};
use regex::Regex;
use tracing::warn;

/// A matched override rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideMatch {
    /// Identifier of the rule that fired
    pub rule_id: String,

    /// What the rule detects
    pub description: String,
}

struct OverrideRule {
    id: &'static str,
    description: &'static str,
    primary: Regex,
    // When present, both patterns must match (co-occurrence rules)
    secondary: Option<Regex>,
}

/// Ordered override predicates, first match wins
pub struct OverrideSet {
    rules: Vec<OverrideRule>,
    government_mentions: Regex,
    official_domains: Vec<&'static str>,
}

impl OverrideSet {
    /// Build the default rule set
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::internal(format!("failed to compile override rule: {}", e)))
        };

        let mut rules = Vec::new();
        let mut rule = |id: &'static str,
                        description: &'static str,
                        primary: &str,
                        secondary: Option<&str>|
         -> Result<()> {
            rules.push(OverrideRule {
                id,
                description,
                primary: compile(primary)?,
                secondary: secondary.map(compile).transpose()?,
            });
            Ok(())
        };

        rule(
            "ssn-request",
            "requests SSN or social security number",
            r"\bssn\b|\bsocial security number\b|\bsocial security\b",
            None,
        )?;
        rule(
            "tax-id-request",
            "requests tax identification details",
            r"\btax id\b|\btaxpayer id\b|\btax identification\b",
            None,
        )?;
        rule(
            "banking-request",
            "requests bank account or routing details",
            r"\bbank account number\b|\baccount number\b|\brouting number\b",
            None,
        )?;
        rule(
            "card-number-request",
            "requests credit or debit card details",
            r"\bcredit card number\b|\bdebit card\b|\bcard number\b",
            None,
        )?;
        rule(
            "pin-request",
            "requests PIN or access codes",
            r"\bpin number\b|\bpin code\b|\baccess code\b",
            None,
        )?;
        rule(
            "password-verification",
            "requests password verification",
            r"\bpassword\b.*\bconfirm\b|\bverify.*password\b",
            None,
        )?;
        rule(
            "urgent-personal-info",
            "urgency combined with a personal information request",
            r"\b24 hours?\b.*\bpersonal\b|\bimmediate.*verification\b",
            None,
        )?;
        rule(
            "suspension-verification",
            "account suspension threat combined with a verification demand",
            r"\baccount.*suspended\b.*\bverify\b|\bsuspended.*account\b.*\bconfirm\b",
            None,
        )?;
        rule(
            "verification-link-threat",
            "verification link paired with an account threat",
            r"\bclick here\b.*\bverify\b",
            Some(r"\bsuspended\b|\blocked\b|\bexpir"),
        )?;

        Ok(Self {
            rules,
            government_mentions: compile(r"\birs\b|\bsocial security\b|\bmedicare\b")?,
            official_domains: vec!["irs.gov", "ssa.gov", "medicare.gov"],
        })
    }

    /// Evaluate the rules in order against a record
    ///
    /// Pure with respect to the record: no state is read or written.
    pub fn evaluate(&self, record: &EmailRecord) -> Option<OverrideMatch> {
        let text = record.indicator_text();

        for rule in &self.rules {
            if rule.primary.is_match(&text)
                && rule.secondary.as_ref().map_or(true, |s| s.is_match(&text))
            {
                warn!(rule = rule.id, "manual override triggered");
                return Some(OverrideMatch {
                    rule_id: rule.id.to_string(),
                    description: rule.description.to_string(),
                });
            }
        }

        // Government-agency language from a sender outside the official
        // domains is an impersonation attempt
        if self.government_mentions.is_match(&text) {
            let official = record
                .sender_domain()
                .map_or(false, |d| self.official_domains.iter().any(|o| d.ends_with(o)));
            if !official {
                warn!(rule = "government-impersonation", "manual override triggered");
                return Some(OverrideMatch {
                    rule_id: "government-impersonation".to_string(),
                    description: "government impersonation from unofficial domain".to_string(),
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn record(sender: &str, subject: &str, body: &str) -> EmailRecord {
        EmailRecord {
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            urls: Vec::new(),
            addresses: Vec::new(),
            phone_numbers: Vec::new(),
            fingerprint: "fp".to_string(),
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_ssn_request_triggers() {
        let set = OverrideSet::new().unwrap();
        let r = record(
            "hr@company.example",
            "Payroll update",
            "Please reply with your social security number to continue.",
        );
        let m = set.evaluate(&r).unwrap();
        assert_eq!(m.rule_id, "ssn-request");
    }

    #[test]
    fn test_verification_link_threat_needs_both_halves() {
        let set = OverrideSet::new().unwrap();

        let only_link = record(
            "a@b.example",
            "newsletter",
            "click here to verify your subscription preferences",
        );
        assert!(set.evaluate(&only_link).is_none());

        let both = record(
            "a@b.example",
            "warning",
            "Your profile is suspended. Click here to verify and restore access.",
        );
        let m = set.evaluate(&both).unwrap();
        assert_eq!(m.rule_id, "verification-link-threat");
    }

    #[test]
    fn test_government_impersonation_from_unofficial_domain() {
        let set = OverrideSet::new().unwrap();
        let r = record(
            "agent@totally-real.example",
            "IRS notice",
            "The IRS has flagged your filing. Respond today.",
        );
        let m = set.evaluate(&r).unwrap();
        assert_eq!(m.rule_id, "government-impersonation");
    }

    #[test]
    fn test_official_domain_is_not_impersonation() {
        let set = OverrideSet::new().unwrap();
        let r = record(
            "notices@irs.gov",
            "IRS filing reminder",
            "Your IRS filing window opens next month.",
        );
        assert!(set.evaluate(&r).is_none());
    }

    #[test]
    fn test_clean_email_no_override() {
        let set = OverrideSet::new().unwrap();
        let r = record(
            "friend@example.com",
            "dinner",
            "Are we still on for Thursday?",
        );
        assert!(set.evaluate(&r).is_none());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let set = OverrideSet::new().unwrap();
        let r = record(
            "x@y.example",
            "action needed",
            "Confirm your pin code and card number today.",
        );
        let first = set.evaluate(&r).unwrap();
        let second = set.evaluate(&r).unwrap();
        assert_eq!(first, second);
    }
}
