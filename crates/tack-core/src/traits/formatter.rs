//! Result formatting trait.

use crate::Result;
use crate::manifest::CheckResult;
use serde_json::Value;

/// Renders a plugin result for display.
///
/// `output_schema` is the operation's declared output schema; formatters
/// that lay data out in columns use its property names.
pub trait OutputFormatter: std::fmt::Debug {
    /// Renders `result`. An empty string means nothing is printed.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be serialized.
    fn format(&self, result: &CheckResult, output_schema: &Value) -> Result<String>;
}
