//! Output formatters.
//!
//! Two entry points share the same formats:
//!
//! - [`formatter_for`] returns an [`OutputFormatter`] for plugin results
//! - [`format_output`] renders the serializable reports of built-in commands
//!
//! JSON and YAML print only `data` for successful results so output pipes
//! cleanly into `jq` or `yq`; any other result is printed whole.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tack_core::cli::OutputFormat;
use tack_core::manifest::CheckResult;
use tack_core::traits::OutputFormatter;

/// Returns the formatter for `format`.
///
/// # Examples
///
/// ```
/// use tack_cli::formatters::formatter_for;
/// use tack_core::cli::OutputFormat;
/// use tack_core::manifest::CheckResult;
///
/// let result = CheckResult::default();
/// let out = formatter_for(OutputFormat::Quiet).format(&result, &serde_json::Value::Null)?;
/// assert!(out.is_empty());
/// # Ok::<(), tack_core::Error>(())
/// ```
#[must_use]
pub fn formatter_for(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Table => Box::new(table::TableFormatter),
        OutputFormat::Json => Box::new(json::JsonFormatter),
        OutputFormat::Yaml => Box::new(yaml::YamlFormatter),
        OutputFormat::Quiet => Box::new(quiet::QuietFormatter),
    }
}

/// Formats a built-in command's report.
///
/// # Errors
///
/// Returns an error if serialization fails.
///
/// # Examples
///
/// ```
/// use tack_cli::formatters::format_output;
/// use tack_core::cli::OutputFormat;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Removed {
///     name: String,
/// }
///
/// let out = format_output(&Removed { name: "dns".to_string() }, OutputFormat::Json)?;
/// assert!(out.contains("\"dns\""));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    let value = serde_json::to_value(data)?;
    match format {
        OutputFormat::Table => Ok(table::render_report(&value)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&value)?),
        OutputFormat::Yaml => Ok(yaml::to_string(&value)?),
        OutputFormat::Quiet => Ok(String::new()),
    }
}

/// The part of a result that JSON and YAML print.
fn printable(result: &CheckResult) -> tack_core::Result<Value> {
    if result.is_success() {
        Ok(Value::Object(result.data.clone()))
    } else {
        Ok(serde_json::to_value(result)?)
    }
}

/// JSON output.
pub mod json {
    use super::{CheckResult, OutputFormatter, Value, printable};

    /// Pretty-printed JSON with two-space indentation.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct JsonFormatter;

    impl OutputFormatter for JsonFormatter {
        fn format(&self, result: &CheckResult, _output_schema: &Value) -> tack_core::Result<String> {
            Ok(serde_json::to_string_pretty(&printable(result)?)?)
        }
    }
}

/// YAML output.
pub mod yaml {
    use super::{CheckResult, OutputFormatter, Value, printable};

    /// YAML document.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct YamlFormatter;

    impl OutputFormatter for YamlFormatter {
        fn format(&self, result: &CheckResult, _output_schema: &Value) -> tack_core::Result<String> {
            to_string(&printable(result)?).map_err(|e| tack_core::Error::SerializationError {
                message: format!("failed to render YAML: {e}"),
                source: None,
            })
        }
    }

    /// Serializes a JSON value as YAML without a trailing newline.
    pub(crate) fn to_string(value: &Value) -> Result<String, serde_yaml::Error> {
        Ok(serde_yaml::to_string(value)?.trim_end().to_string())
    }
}

/// No output; only the exit code carries the outcome.
pub mod quiet {
    use super::{CheckResult, OutputFormatter, Value};

    /// Prints nothing.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct QuietFormatter;

    impl OutputFormatter for QuietFormatter {
        fn format(&self, _result: &CheckResult, _output_schema: &Value) -> tack_core::Result<String> {
            Ok(String::new())
        }
    }
}

/// Bordered tables for humans.
pub mod table {
    use super::{CheckResult, OutputFormatter, Value};
    use colored::Colorize;

    /// Renders result data as a one-row table.
    ///
    /// Columns follow the output schema's properties, or the data keys when
    /// the schema declares none. Non-success results print status, message
    /// and error lines instead.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TableFormatter;

    impl OutputFormatter for TableFormatter {
        fn format(&self, result: &CheckResult, output_schema: &Value) -> tack_core::Result<String> {
            if !result.is_success() {
                let mut out = format!("Status: {}", result.status.as_str());
                if !result.message.is_empty() {
                    out.push_str(&format!("\nMessage: {}", result.message));
                }
                if let Some(error) = &result.error {
                    out.push_str(&format!("\nError: [{}] {}", error.kind, error.message));
                }
                return Ok(out);
            }

            if result.data.is_empty() {
                return Ok("(no data)".to_string());
            }

            let mut columns = schema_columns(output_schema);
            if columns.is_empty() {
                columns = result.data.keys().cloned().collect();
            }

            let headers: Vec<String> = columns.iter().map(|c| snake_to_title(c)).collect();
            let row: Vec<String> = columns
                .iter()
                .map(|c| result.data.get(c).map(cell).unwrap_or_default())
                .collect();
            Ok(render(&headers, &[row]))
        }
    }

    /// Property names of an output schema, sorted.
    #[must_use]
    pub fn schema_columns(schema: &Value) -> Vec<String> {
        schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `record_type` to `Record Type`.
    #[must_use]
    pub fn snake_to_title(s: &str) -> String {
        s.split('_')
            .map(|part| {
                let mut chars = part.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Display form of one value.
    #[must_use]
    pub fn cell(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => i.to_string(),
                (None, Some(f)) if f.fract().abs() < f64::EPSILON && f.abs() < 1e15 => format!("{f:.0}"),
                (None, Some(f)) => format!("{f:.2}"),
                _ => n.to_string(),
            },
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
            Value::Object(_) => value.to_string(),
        }
    }

    /// Draws a bordered table. Headers are bold.
    #[must_use]
    pub fn render(headers: &[String], rows: &[Vec<String>]) -> String {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(value.chars().count());
                }
            }
        }

        let border = widths
            .iter()
            .fold(String::from("+"), |mut line, w| {
                line.push_str(&"-".repeat(w + 2));
                line.push('+');
                line
            });

        let line = |cells: &[String], bold: bool| {
            let mut out = String::from("|");
            for (i, w) in widths.iter().enumerate() {
                let text = cells.get(i).map_or("", String::as_str);
                let pad = " ".repeat(w - text.chars().count());
                if bold {
                    out.push_str(&format!(" {}{pad} |", text.bold()));
                } else {
                    out.push_str(&format!(" {text}{pad} |"));
                }
            }
            out
        };

        let mut out = vec![border.clone(), line(headers, true), border.clone()];
        out.extend(rows.iter().map(|row| line(row, false)));
        out.push(border);
        out.join("\n")
    }

    /// Renders a built-in report.
    ///
    /// A list of objects becomes a table; an object prints one `Key: value`
    /// line per field, with nested lists of objects drawn as tables.
    #[must_use]
    pub fn render_report(value: &Value) -> String {
        match value {
            Value::Array(items) if items.iter().all(Value::is_object) => list_table(items),
            Value::Object(fields) => {
                let mut out = Vec::new();
                for (key, field) in fields {
                    match field {
                        Value::Array(items) if items.is_empty() => {
                            out.push(format!("{}: (none)", snake_to_title(key).bold()));
                        }
                        Value::Array(items) if items.iter().all(Value::is_object) => {
                            out.push(format!("{}:", snake_to_title(key).bold()));
                            out.push(list_table(items));
                        }
                        _ => out.push(format!("{}: {}", snake_to_title(key).bold(), cell(field))),
                    }
                }
                out.join("\n")
            }
            other => cell(other),
        }
    }

    fn list_table(items: &[Value]) -> String {
        if items.is_empty() {
            return "(none)".to_string();
        }
        let mut columns: Vec<String> = Vec::new();
        for item in items {
            if let Value::Object(map) = item {
                for key in map.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        let headers: Vec<String> = columns.iter().map(|c| snake_to_title(c)).collect();
        let rows: Vec<Vec<String>> = items
            .iter()
            .map(|item| {
                columns
                    .iter()
                    .map(|c| item.get(c).map(cell).unwrap_or_default())
                    .collect()
            })
            .collect();
        render(&headers, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tack_core::manifest::{CheckStatus, ResultError};

    fn no_color() {
        colored::control::set_override(false);
    }

    fn success(data: Value) -> CheckResult {
        CheckResult {
            data: data.as_object().cloned().unwrap_or_default(),
            ..CheckResult::default()
        }
    }

    fn failed() -> CheckResult {
        CheckResult {
            status: CheckStatus::Error,
            message: "lookup failed".to_string(),
            error: Some(ResultError {
                message: "no such host".to_string(),
                kind: "network".to_string(),
                code: "NXDOMAIN".to_string(),
            }),
            ..CheckResult::default()
        }
    }

    #[test]
    fn test_json_prints_data_only_on_success() {
        let out = json::JsonFormatter
            .format(&success(json!({"address": "93.184.216.34"})), &Value::Null)
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"address": "93.184.216.34"}));
    }

    #[test]
    fn test_json_prints_full_result_on_error() {
        let out = json::JsonFormatter.format(&failed(), &Value::Null).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["error"]["type"], "network");
    }

    #[test]
    fn test_yaml_output() {
        let out = yaml::YamlFormatter
            .format(&success(json!({"address": "1.2.3.4", "ttl": 300})), &Value::Null)
            .unwrap();
        assert!(out.contains("address: 1.2.3.4"));
        assert!(out.contains("ttl: 300"));
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn test_quiet_is_empty() {
        assert!(quiet::QuietFormatter.format(&failed(), &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_table_uses_schema_columns() {
        no_color();
        let schema = json!({"properties": {"record_type": {}, "address": {}}});
        let out = table::TableFormatter
            .format(
                &success(json!({"address": "1.2.3.4", "record_type": "A", "extra": 1})),
                &schema,
            )
            .unwrap();

        assert!(out.contains("| Address | Record Type |"));
        assert!(out.contains("| 1.2.3.4 | A           |"));
        assert!(!out.contains("Extra"));
    }

    #[test]
    fn test_table_falls_back_to_data_keys() {
        no_color();
        let out = table::TableFormatter
            .format(&success(json!({"b": [1, 2], "a": true})), &Value::Null)
            .unwrap();
        assert!(out.contains("| A    | B    |"));
        assert!(out.contains("| true | 1, 2 |"));
    }

    #[test]
    fn test_table_non_success() {
        let out = table::TableFormatter.format(&failed(), &Value::Null).unwrap();
        assert_eq!(
            out,
            "Status: error\nMessage: lookup failed\nError: [network] no such host"
        );
    }

    #[test]
    fn test_table_no_data() {
        let out = table::TableFormatter.format(&success(json!({})), &Value::Null).unwrap();
        assert_eq!(out, "(no data)");
    }

    #[test]
    fn test_cell_numbers() {
        assert_eq!(table::cell(&json!(42)), "42");
        assert_eq!(table::cell(&json!(2.0)), "2");
        assert_eq!(table::cell(&json!(1.234)), "1.23");
        assert_eq!(table::cell(&json!({"k": "v"})), r#"{"k":"v"}"#);
    }

    #[test]
    fn test_report_list_is_tabulated() {
        no_color();
        let out = format_output(
            &json!([{"name": "dns", "version": "1.0.0"}, {"name": "tls", "version": "0.2.0"}]),
            OutputFormat::Table,
        )
        .unwrap();
        assert!(out.contains("| Name | Version |"));
        assert!(out.contains("| tls  | 0.2.0   |"));
    }

    #[test]
    fn test_report_object_lines() {
        no_color();
        let out = format_output(&json!({"name": "dns", "removed": 2}), OutputFormat::Table).unwrap();
        assert_eq!(out, "Name: dns\nRemoved: 2");
    }

    #[test]
    fn test_report_quiet_and_yaml() {
        assert!(format_output(&json!({"a": 1}), OutputFormat::Quiet).unwrap().is_empty());
        assert_eq!(format_output(&json!({"a": 1}), OutputFormat::Yaml).unwrap(), "a: 1");
    }
}
