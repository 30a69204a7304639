//! Best-effort PII scrubbing for exports.
//!
//! These are heuristics, not a compliance control: missed PII is expected,
//! and over-redaction is preferred to under-redaction. Every rule is matched
//! against the original text and overlapping matches are merged, so the
//! result does not depend on rule order.

use crate::error::{CryptoError, CryptoResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const CARD_PLACEHOLDER: &str = "[REDACTED-CARD]";
pub const SSN_PLACEHOLDER: &str = "[REDACTED-SSN]";
pub const EMAIL_PLACEHOLDER: &str = "[REDACTED-EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[REDACTED-PHONE]";
pub const IP_PLACEHOLDER: &str = "[REDACTED-IP]";

/// Largest supported decimal precision for [`anonymize_location`].
pub const MAX_LOCATION_PRECISION: u32 = 10;

const STANDARD_RULES: [(&str, &str, &str); 5] = [
    (
        "card",
        r"\b(?:[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{1,7}|[0-9]{4}[- ][0-9]{6}[- ][0-9]{5})\b",
        CARD_PLACEHOLDER,
    ),
    ("ssn", r"\b[0-9]{3}-[0-9]{2}-[0-9]{4}\b", SSN_PLACEHOLDER),
    (
        "email",
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        EMAIL_PLACEHOLDER,
    ),
    (
        "phone",
        r"(?:\+?1[-. ]?)?\(?\b[0-9]{3}\)?[-. ]?[0-9]{3}[-. ]?[0-9]{4}\b",
        PHONE_PLACEHOLDER,
    ),
    ("ip", r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", IP_PLACEHOLDER),
];

static STANDARD: LazyLock<CryptoResult<Redactor>> = LazyLock::new(Redactor::standard);

/// One named pattern and the placeholder that replaces its matches.
#[derive(Clone, Debug)]
pub struct RedactionRule {
    name: String,
    pattern: Regex,
    placeholder: String,
}

impl RedactionRule {
    pub fn new(name: &str, pattern: &str, placeholder: &str) -> CryptoResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| CryptoError::InvalidPattern(format!("{name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            pattern,
            placeholder: placeholder.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

/// An ordered, extensible set of redaction rules.
#[derive(Clone, Debug)]
pub struct Redactor {
    rules: Vec<RedactionRule>,
}

impl Redactor {
    /// A redactor with no rules; returns input unchanged.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Cards, SSNs, emails, phone numbers and IPv4 addresses.
    pub fn standard() -> CryptoResult<Self> {
        let rules = STANDARD_RULES
            .iter()
            .map(|(name, pattern, placeholder)| RedactionRule::new(name, pattern, placeholder))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Appends a rule, replacing any existing rule with the same name.
    pub fn with_rule(mut self, rule: RedactionRule) -> Self {
        self.rules.retain(|r| r.name != rule.name);
        self.rules.push(rule);
        self
    }

    /// Drops the rule called `name`, if present.
    pub fn without_rule(mut self, name: &str) -> Self {
        self.rules.retain(|r| r.name != name);
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Replaces every match of every rule with its placeholder.
    pub fn redact(&self, text: &str) -> String {
        let mut spans: Vec<(usize, usize, &str)> = self
            .rules
            .iter()
            .flat_map(|rule| {
                rule.pattern
                    .find_iter(text)
                    .filter(|m| !m.is_empty())
                    .map(move |m| (m.start(), m.end(), rule.placeholder.as_str()))
            })
            .collect();
        if spans.is_empty() {
            return text.to_string();
        }

        // Longest first on equal starts so merging keeps the widest rule's
        // placeholder; exact ties resolve by placeholder text, not rule order.
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));

        let mut merged: Vec<(usize, usize, &str)> = Vec::with_capacity(spans.len());
        for (start, end, placeholder) in spans {
            match merged.last_mut() {
                Some(last) if start < last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end, placeholder)),
            }
        }

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end, placeholder) in merged {
            out.push_str(&text[cursor..start]);
            out.push_str(placeholder);
            cursor = end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

/// Redacts `text` with the standard rule set.
pub fn redact_pii(text: &str) -> CryptoResult<String> {
    STANDARD
        .as_ref()
        .map(|redactor| redactor.redact(text))
        .map_err(Clone::clone)
}

/// A latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Rounds coordinates to `precision` decimal places (half away from zero).
///
/// Precision is clamped to [`MAX_LOCATION_PRECISION`]; non-finite values are
/// returned as given.
pub fn anonymize_location(lat: f64, lng: f64, precision: u32) -> Coordinates {
    let factor = 10f64.powi(precision.min(MAX_LOCATION_PRECISION) as i32);
    Coordinates {
        lat: round_to(lat, factor),
        lng: round_to(lng, factor),
    }
}

fn round_to(value: f64, factor: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn standard_rules_all_compile() {
        assert_eq!(
            Redactor::standard().unwrap().rule_names(),
            vec!["card", "ssn", "email", "phone", "ip"]
        );
    }

    #[test]
    fn card_number_redacted() {
        let out = redact_pii("Card 4111-1111-1111-1111").unwrap();
        assert_eq!(out, "Card [REDACTED-CARD]");
    }

    #[test]
    fn unbroken_card_number_redacted() {
        let out = redact_pii("paid with 4111111111111111 today").unwrap();
        assert_eq!(out, "paid with [REDACTED-CARD] today");
    }

    #[test]
    fn amex_grouping_redacted() {
        assert_eq!(redact_pii("amex 3782 822463 10005").unwrap(), "amex [REDACTED-CARD]");
        assert_eq!(redact_pii("amex 3782-822463-10005.").unwrap(), "amex [REDACTED-CARD].");
    }

    #[test]
    fn email_redacted() {
        assert_eq!(redact_pii("contact me at a@b.com").unwrap(), "contact me at [REDACTED-EMAIL]");
    }

    #[test]
    fn ssn_redacted() {
        assert_eq!(redact_pii("ssn 123-45-6789.").unwrap(), "ssn [REDACTED-SSN].");
    }

    #[test]
    fn phone_redacted() {
        assert_eq!(redact_pii("call 555-867-5309").unwrap(), "call [REDACTED-PHONE]");
        assert_eq!(redact_pii("call (555) 867-5309").unwrap(), "call [REDACTED-PHONE]");
    }

    #[test]
    fn ip_redacted() {
        assert_eq!(redact_pii("from 192.168.0.12 ok").unwrap(), "from [REDACTED-IP] ok");
    }

    #[test]
    fn several_kinds_in_one_text() {
        let out = redact_pii("mail x@y.org, ssn 078-05-1120, host 10.0.0.1").unwrap();
        assert_eq!(
            out,
            "mail [REDACTED-EMAIL], ssn [REDACTED-SSN], host [REDACTED-IP]"
        );
    }

    #[test]
    fn clean_text_unchanged() {
        let text = "Shipped the beta. Team morale is high.";
        assert_eq!(redact_pii(text).unwrap(), text);
    }

    #[test]
    fn rule_order_does_not_matter() {
        let text = "a@b.com 4111 1111 1111 1111 555-867-5309 123-45-6789 8.8.8.8";
        let forward = Redactor::standard().unwrap();
        let mut reversed = Redactor::empty();
        for (name, pattern, placeholder) in STANDARD_RULES.iter().rev() {
            reversed = reversed.with_rule(RedactionRule::new(name, pattern, placeholder).unwrap());
        }
        assert_eq!(forward.redact(text), reversed.redact(text));
    }

    #[test]
    fn custom_rule_extends_standard_set() {
        let redactor = Redactor::standard().unwrap()
            .with_rule(RedactionRule::new("ticket", r"\bTKT-[0-9]+\b", "[REDACTED-TICKET]").unwrap());
        assert_eq!(
            redactor.redact("see TKT-4411 or a@b.com"),
            "see [REDACTED-TICKET] or [REDACTED-EMAIL]"
        );
    }

    #[test]
    fn without_rule_disables_it() {
        let redactor = Redactor::standard().unwrap().without_rule("email");
        assert_eq!(redactor.redact("a@b.com"), "a@b.com");
    }

    #[test]
    fn invalid_custom_pattern_errors() {
        let err = RedactionRule::new("broken", "(", "[X]").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPattern(_)));
    }

    #[test]
    fn location_rounding() {
        assert_eq!(
            anonymize_location(40.712776, -74.005974, 2),
            Coordinates { lat: 40.71, lng: -74.01 }
        );
    }

    #[test]
    fn location_zero_precision_and_clamp() {
        assert_eq!(
            anonymize_location(51.5, -0.4, 0),
            Coordinates { lat: 52.0, lng: -0.0 }
        );
        let precise = anonymize_location(1.123456789012, 2.0, 30);
        assert_eq!(precise.lat, 1.123456789);
    }

    #[test]
    fn non_finite_location_passes_through() {
        let c = anonymize_location(f64::NAN, f64::INFINITY, 2);
        assert!(c.lat.is_nan());
        assert_eq!(c.lng, f64::INFINITY);
    }
}
