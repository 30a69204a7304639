//! Vault password strength scoring.
//!
//! Eight points are available: two for length, four for character classes,
//! one for having no run of three identical characters and one for avoiding
//! common sequences. A password is accepted at [`MIN_VALID_SCORE`] or above.

use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};

/// Highest possible score.
pub const MAX_SCORE: u8 = 8;

/// Minimum score for `is_valid`.
pub const MIN_VALID_SCORE: u8 = 6;

const COMMON_SEQUENCES: [&str; 3] = ["123", "abc", "qwe"];

/// Outcome of a strength check. Recomputed on every call, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrengthResult {
    pub is_valid: bool,
    pub score: u8,
    pub feedback: Vec<String>,
}

/// Scores `password` with the default acceptance threshold.
pub fn validate_key_strength(password: &str) -> PasswordStrengthResult {
    validate_key_strength_with(password, MIN_VALID_SCORE)
}

/// Scores `password`, accepting it at `min_score` or above.
pub fn validate_key_strength_with(password: &str, min_score: u8) -> PasswordStrengthResult {
    let mut score = 0u8;
    let mut feedback = Vec::new();

    let length = password.chars().count();
    if length >= 8 {
        score += 1;
    } else {
        feedback.push("Use at least 8 characters".to_string());
    }
    if length >= 12 {
        score += 1;
    } else {
        feedback.push("Use 12 or more characters for a stronger password".to_string());
    }

    let classes = [
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Add lowercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Add uppercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Add numbers",
        ),
        (
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
            "Add special characters",
        ),
    ];
    for (present, hint) in classes {
        if present {
            score += 1;
        } else {
            feedback.push(hint.to_string());
        }
    }

    if has_repeated_run(password) {
        feedback.push("Avoid repeating the same character three times in a row".to_string());
    } else {
        score += 1;
    }

    if has_common_sequence(password) {
        feedback.push("Avoid common sequences like 123, abc or qwe".to_string());
    } else {
        score += 1;
    }

    PasswordStrengthResult {
        is_valid: score >= min_score,
        score,
        feedback,
    }
}

/// Scores `password` and fails with [`CryptoError::InvalidPassword`] when it
/// falls below `min_score`.
pub fn require_strength(password: &str, min_score: u8) -> CryptoResult<PasswordStrengthResult> {
    let result = validate_key_strength_with(password, min_score);
    if !result.is_valid {
        return Err(CryptoError::InvalidPassword {
            score: result.score,
            feedback: result.feedback,
        });
    }
    Ok(result)
}

fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

fn has_common_sequence(password: &str) -> bool {
    let lowered = password.to_ascii_lowercase();
    COMMON_SEQUENCES.iter().any(|seq| lowered.contains(seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strong_password_scores_full_marks() {
        let result = validate_key_strength("Str0ng!Passw0rd");
        assert_eq!(
            result,
            PasswordStrengthResult {
                is_valid: true,
                score: MAX_SCORE,
                feedback: vec![],
            }
        );
    }

    #[test]
    fn short_lowercase_password_is_rejected_with_feedback() {
        let result = validate_key_strength("hello");
        assert!(!result.is_valid);
        assert_eq!(result.score, 3);
        assert_eq!(
            result.feedback,
            vec![
                "Use at least 8 characters",
                "Use 12 or more characters for a stronger password",
                "Add uppercase letters",
                "Add numbers",
                "Add special characters",
            ]
        );
    }

    #[test]
    fn common_sequences_are_case_insensitive() {
        let result = validate_key_strength("xQWErty!9Zk#");
        assert!(result.feedback.iter().any(|f| f.contains("common sequences")));
        assert_eq!(result.score, 7);
    }

    #[test]
    fn repeated_runs_cost_a_point() {
        let with_run = validate_key_strength("Paaa55word!x");
        let without = validate_key_strength("Pa5a5word!xy");
        assert_eq!(with_run.score + 1, without.score);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let result = validate_key_strength("ééééééé");
        assert!(result.feedback.iter().any(|f| f == "Use at least 8 characters"));
    }

    #[test]
    fn threshold_is_six() {
        // length 8 (1) + lower + upper + digit (3) + no run + no sequence (2) = 6
        let result = validate_key_strength("Passw0rd");
        assert_eq!(result.score, 6);
        assert!(result.is_valid);

        // length 8 (1) + lower + upper (2) + no run + no sequence (2) = 5
        let result = validate_key_strength("Password");
        assert_eq!(result.score, 5);
        assert!(!result.is_valid);
    }

    #[test]
    fn custom_threshold() {
        assert!(!validate_key_strength_with("Passw0rd", 7).is_valid);
    }

    #[test]
    fn require_strength_carries_feedback() {
        match require_strength("hello", MIN_VALID_SCORE) {
            Err(CryptoError::InvalidPassword { score, feedback }) => {
                assert_eq!(score, 3);
                assert!(feedback.contains(&"Add numbers".to_string()));
            }
            other => panic!("expected InvalidPassword, got {other:?}"),
        }
        assert!(require_strength("Str0ng!Passw0rd", MIN_VALID_SCORE).is_ok());
    }

    #[test]
    fn serializes_in_camel_case() {
        let json = serde_json::to_value(validate_key_strength("x")).unwrap();
        assert!(json.get("isValid").is_some());
        assert!(json.get("score").is_some());
        assert!(json.get("feedback").is_some());
    }
}
