//! Email normalization
//!
//! Canonicalizes a raw [`ScanRequest`] into an immutable [`EmailRecord`]:
//! sender parsing, HTML stripping, entity decoding, whitespace collapsing,
//! URL/address/phone extraction, and content fingerprinting.

use crate::error::{Error, Result};
use crate::types::{EmailRecord, ScanRequest};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::time::SystemTime;
use tracing::debug;

/// Default maximum normalized body length in chars
pub const DEFAULT_MAX_BODY_CHARS: usize = 50_000;

/// Default maximum number of URLs extracted per email
pub const DEFAULT_MAX_URLS: usize = 10;

/// Email normalizer; leaf component with no dependencies on other stages
pub struct Normalizer {
    url_regex: Regex,
    address_regex: Regex,
    phone_regex: Regex,
    tag_regex: Regex,
    angle_addr_regex: Regex,
    max_body_chars: usize,
    max_urls: usize,
}

impl Normalizer {
    /// Create a normalizer with default limits
    pub fn new() -> Result<Self> {
        Self::with_limits(DEFAULT_MAX_BODY_CHARS, DEFAULT_MAX_URLS)
    }

    /// Create a normalizer with explicit body-length and URL-count limits
    pub fn with_limits(max_body_chars: usize, max_urls: usize) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::internal(format!("failed to compile regex: {}", e)))
        };

        Ok(Self {
            url_regex: compile(r"https?://[A-Za-z0-9$\-_@.&+!*(),%/?=#~;:]+")?,
            address_regex: compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phone_regex: compile(r"(\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")?,
            tag_regex: compile(r"<[^>]*>")?,
            angle_addr_regex: compile(r"<([^<>\s]+@[^<>\s]+)>")?,
            max_body_chars,
            max_urls,
        })
    }

    /// Normalize a raw request into an immutable [`EmailRecord`]
    ///
    /// Returns [`Error::InvalidInput`] when the request has no plausible
    /// sender or is entirely empty. That error is surfaced to the caller;
    /// it is never retried internally.
    pub fn normalize(&self, request: &ScanRequest) -> Result<EmailRecord> {
        let sender = self.normalize_sender(&request.sender)?;

        if request.subject.trim().is_empty() && request.body.trim().is_empty() {
            return Err(Error::invalid_input("email has no subject and no body"));
        }

        let subject = self.normalize_text(&request.subject);
        let mut body = self.normalize_body(&request.body);

        if body.chars().count() > self.max_body_chars {
            body = body.chars().take(self.max_body_chars).collect();
        }

        let urls = self.extract_urls(&body);
        let addresses = self.extract_addresses(&body);
        let phone_numbers = self.extract_phone_numbers(&body);

        let fingerprint = fingerprint(&subject, &body);

        debug!(
            sender = %sender,
            urls = urls.len(),
            fingerprint = %&fingerprint[..8],
            "normalized email record"
        );

        Ok(EmailRecord {
            sender,
            subject,
            body,
            urls,
            addresses,
            phone_numbers,
            fingerprint,
            received_at: SystemTime::now(),
        })
    }

    /// Normalize a sender field, handling `"Name <addr@host>"` forms
    fn normalize_sender(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input("missing sender address"));
        }

        if let Some(caps) = self.angle_addr_regex.captures(trimmed) {
            return Ok(caps[1].to_lowercase());
        }

        if let Some(m) = self.address_regex.find(trimmed) {
            return Ok(m.as_str().to_lowercase());
        }

        // Bare token without an address shape is still accepted (the pattern
        // stage treats missing domains as their own signal), but it must at
        // least contain something other than punctuation.
        if trimmed.chars().any(|c| c.is_alphanumeric()) {
            Ok(trimmed.to_lowercase())
        } else {
            Err(Error::invalid_input("sender is not a plausible address"))
        }
    }

    /// Decode entities, drop control characters, collapse whitespace
    fn normalize_text(&self, raw: &str) -> String {
        let decoded = decode_entities(raw);
        let cleaned: String = decoded
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Strip HTML tags, then apply text normalization
    fn normalize_body(&self, raw: &str) -> String {
        let stripped = self.tag_regex.replace_all(raw, " ");
        self.normalize_text(&stripped)
    }

    fn extract_urls(&self, body: &str) -> Vec<String> {
        self.url_regex
            .find_iter(body)
            .take(self.max_urls)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string())
            .collect()
    }

    fn extract_addresses(&self, body: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for m in self.address_regex.find_iter(body) {
            let addr = m.as_str().to_lowercase();
            if !seen.contains(&addr) {
                seen.push(addr);
            }
        }
        seen
    }

    fn extract_phone_numbers(&self, body: &str) -> Vec<String> {
        self.phone_regex
            .find_iter(body)
            .map(|m| m.as_str().trim().to_string())
            .collect()
    }
}

/// Stable content fingerprint over normalized subject and body
pub fn fingerprint(subject: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Decode the small set of HTML entities that survive mail scraping
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sender: &str, subject: &str, body: &str) -> ScanRequest {
        ScanRequest {
            sender: sender.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            thread_id: "t1".to_string(),
            user_id: "u1".to_string(),
        }
    }

    #[test]
    fn test_sender_angle_form() {
        let n = Normalizer::new().unwrap();
        let r = n
            .normalize(&request("Alice Example <Alice@Example.COM>", "hi", "text"))
            .unwrap();
        assert_eq!(r.sender, "alice@example.com");
    }

    #[test]
    fn test_missing_sender_is_invalid_input() {
        let n = Normalizer::new().unwrap();
        let err = n.normalize(&request("", "hi", "text")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_email_is_invalid_input() {
        let n = Normalizer::new().unwrap();
        let err = n.normalize(&request("a@b.com", "  ", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_html_stripped_and_entities_decoded() {
        let n = Normalizer::new().unwrap();
        let r = n
            .normalize(&request(
                "a@b.com",
                "Offer &amp; deal",
                "<p>Click <b>here</b>&nbsp;now</p>",
            ))
            .unwrap();
        assert_eq!(r.subject, "Offer & deal");
        assert_eq!(r.body, "Click here now");
    }

    #[test]
    fn test_url_and_phone_extraction() {
        let n = Normalizer::new().unwrap();
        let r = n
            .normalize(&request(
                "a@b.com",
                "hi",
                "Visit https://bit.ly/x2f or call 555-123-4567, reply to bob@corp.example.",
            ))
            .unwrap();
        assert_eq!(r.urls, vec!["https://bit.ly/x2f"]);
        assert_eq!(r.addresses, vec!["bob@corp.example"]);
        assert_eq!(r.phone_numbers.len(), 1);
    }

    #[test]
    fn test_url_cap() {
        let n = Normalizer::with_limits(DEFAULT_MAX_BODY_CHARS, 2).unwrap();
        let body = "https://a.example/1 https://a.example/2 https://a.example/3";
        let r = n.normalize(&request("a@b.com", "hi", body)).unwrap();
        assert_eq!(r.urls.len(), 2);
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let n = Normalizer::new().unwrap();
        let a = n.normalize(&request("a@b.com", "hi", "same body")).unwrap();
        let b = n.normalize(&request("a@b.com", "hi", "same body")).unwrap();
        let c = n.normalize(&request("a@b.com", "hi", "other body")).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_body_truncation() {
        let n = Normalizer::with_limits(100, DEFAULT_MAX_URLS).unwrap();
        let r = n
            .normalize(&request("a@b.com", "hi", &"word ".repeat(200)))
            .unwrap();
        assert_eq!(r.body.chars().count(), 100);
    }
}
