//! Guardrails Module
//!
//! Provides the keyword-blocklist check the Quality Scorer's toxicity
//! dimension runs over every response:
//! - `Guardrail` - synchronous guardrail trait
//! - `GuardrailResult` - result of a guardrail check
//! - `BlocklistGuardrail` - keyword blocklist implementation
//!
//! # Example
//!
//! ```ignore
//! use ensemble_core::guardrails::{Guardrail, GuardrailResult};
//!
//! struct ContentFilter;
//!
//! impl Guardrail for ContentFilter {
//!     fn validate(&self, output: &str) -> GuardrailResult {
//!         if output.contains("unsafe") {
//!             GuardrailResult::failure("Content contains unsafe material")
//!         } else {
//!             GuardrailResult::success(output.to_string())
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// GUARDRAIL RESULT
// =============================================================================

/// Result of a guardrail validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// Whether the guardrail check passed
    pub success: bool,
    /// The result if modified, or original if unchanged
    pub result: Option<String>,
    /// Error message if validation failed
    pub error: String,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl Default for GuardrailResult {
    fn default() -> Self {
        Self {
            success: true,
            result: None,
            error: String::new(),
            metadata: HashMap::new(),
        }
    }
}

impl GuardrailResult {
    /// Create a successful result
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a successful result without modification
    pub fn pass() -> Self {
        Self {
            success: true,
            result: None,
            error: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: error.into(),
            metadata: HashMap::new(),
        }
    }

    /// Create from a tuple (success, result_or_error)
    pub fn from_tuple(success: bool, data: impl Into<String>) -> Self {
        let data = data.into();
        if success {
            Self::success(data)
        } else {
            Self::failure(data)
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if passed
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Check if failed
    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Get the result or original content
    pub fn get_result_or(&self, original: &str) -> String {
        self.result.clone().unwrap_or_else(|| original.to_string())
    }
}

// =============================================================================
// GUARDRAIL TRAIT
// =============================================================================

/// Trait for synchronous guardrail validation.
pub trait Guardrail: Send + Sync {
    /// Validate the output
    fn validate(&self, output: &str) -> GuardrailResult;

    /// Get guardrail name
    fn name(&self) -> &str {
        "guardrail"
    }

    /// Get guardrail description
    fn description(&self) -> &str {
        "A guardrail for validating agent output"
    }
}

// =============================================================================
// BUILT-IN GUARDRAILS
// =============================================================================

/// Keyword blocklist guardrail.
#[derive(Debug, Clone)]
pub struct BlocklistGuardrail {
    /// Blocked keywords
    pub keywords: Vec<String>,
    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl BlocklistGuardrail {
    /// Create a new blocklist guardrail
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            case_sensitive: false,
        }
    }

    /// Set case sensitivity
    pub fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.case_sensitive = sensitive;
        self
    }

    /// Add a keyword
    pub fn add_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }
}

impl Guardrail for BlocklistGuardrail {
    fn validate(&self, output: &str) -> GuardrailResult {
        let check_output = if self.case_sensitive {
            output.to_string()
        } else {
            output.to_lowercase()
        };

        for keyword in &self.keywords {
            let check_keyword = if self.case_sensitive {
                keyword.clone()
            } else {
                keyword.to_lowercase()
            };

            if check_output.contains(&check_keyword) {
                return GuardrailResult::failure(format!(
                    "Output contains blocked keyword: '{}'",
                    keyword
                ));
            }
        }

        GuardrailResult::pass()
    }

    fn name(&self) -> &str {
        "blocklist_guardrail"
    }

    fn description(&self) -> &str {
        "Blocks output containing specified keywords"
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardrail_result_success() {
        let result = GuardrailResult::success("output");
        assert!(result.is_success());
        assert!(!result.is_failure());
        assert_eq!(result.result, Some("output".to_string()));
        assert!(result.error.is_empty());
    }

    #[test]
    fn test_guardrail_result_failure() {
        let result = GuardrailResult::failure("error message");
        assert!(result.is_failure());
        assert!(!result.is_success());
        assert_eq!(result.error, "error message");
    }

    #[test]
    fn test_guardrail_result_pass() {
        let result = GuardrailResult::pass();
        assert!(result.is_success());
        assert!(result.result.is_none());
    }

    #[test]
    fn test_guardrail_result_from_tuple() {
        let success = GuardrailResult::from_tuple(true, "result");
        assert!(success.is_success());
        assert_eq!(success.result, Some("result".to_string()));

        let failure = GuardrailResult::from_tuple(false, "error");
        assert!(failure.is_failure());
        assert_eq!(failure.error, "error");
    }

    #[test]
    fn test_guardrail_result_get_result_or() {
        let with_result = GuardrailResult::success("modified");
        assert_eq!(with_result.get_result_or("original"), "modified");

        let without_result = GuardrailResult::pass();
        assert_eq!(without_result.get_result_or("original"), "original");
    }

    #[test]
    fn test_blocklist_guardrail() {
        let guardrail = BlocklistGuardrail::new(vec!["bad".to_string(), "unsafe".to_string()]);

        let clean = guardrail.validate("This is good content");
        assert!(clean.is_success());

        let blocked = guardrail.validate("This contains bad words");
        assert!(blocked.is_failure());
        assert!(blocked.error.contains("bad"));
    }

    #[test]
    fn test_blocklist_case_insensitive() {
        let guardrail = BlocklistGuardrail::new(vec!["bad".to_string()]);

        let result = guardrail.validate("This is BAD");
        assert!(result.is_failure());
    }

    #[test]
    fn test_blocklist_case_sensitive() {
        let guardrail = BlocklistGuardrail::new(vec!["bad".to_string()]).case_sensitive(true);

        let result = guardrail.validate("This is BAD");
        assert!(result.is_success()); // "BAD" != "bad"

        let result2 = guardrail.validate("This is bad");
        assert!(result2.is_failure());
    }
}
