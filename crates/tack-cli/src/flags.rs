//! Schema-to-flag mapping.
//!
//! A plugin's `config_schema` is a JSON Schema object. Each property an
//! operation accepts becomes one long flag on the operation's command:
//!
//! | schema type | flag                                   | config value        |
//! |-------------|----------------------------------------|---------------------|
//! | `string`    | `--name <STRING>` (enum values listed) | string              |
//! | `integer`   | `--name <INT>`                         | number              |
//! | `boolean`   | `--name [true\|false]`                 | bool                |
//! | `array`     | `--name a,b --name c`                  | array of strings    |
//! | `object`    | `--name k=v,k2=v2`                     | object of strings   |
//!
//! Field `record_type` becomes flag `--record-type`; the reverse mapping is
//! applied when the input config is rebuilt from parsed arguments.

use clap::builder::PossibleValuesParser;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, value_parser};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tack_core::{Error, Result};

/// Fields derived from the command path, never exposed as flags.
pub const PATH_FIELDS: &[&str] = &["service", "operation"];

/// Flags owned by the root command.
pub const RESERVED_FLAGS: &[&str] = &["help", "output", "quiet", "verbose", "trust-plugins", "version"];

/// One property of a config schema.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaProperty {
    /// JSON Schema `type`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Allowed values, if enumerated.
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<Value>,
    /// Schema-declared default.
    #[serde(default)]
    pub default: Option<Value>,
    /// Help text.
    #[serde(default)]
    pub description: String,
}

/// The parts of a config schema that drive flag generation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParsedSchema {
    /// Properties by field name.
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaProperty>,
    /// Names of mandatory fields.
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParsedSchema {
    /// Parses a plugin's config schema. A missing schema has no properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaError`] if the schema is not an object of the
    /// expected shape.
    pub fn parse(plugin: &str, schema: &Value) -> Result<Self> {
        if schema.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(schema.clone()).map_err(|e| Error::SchemaError {
            plugin: plugin.to_string(),
            message: format!("failed to parse config schema: {e}"),
        })
    }
}

/// Value shape of a generated flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKind {
    /// Free text, optionally limited to `choices`.
    String {
        /// Enumerated values offered for completion and validation.
        choices: Vec<String>,
    },
    /// Signed integer.
    Integer,
    /// `true` or `false`; the bare flag means `true`.
    Boolean,
    /// Repeatable, comma-delimited list of strings.
    StringArray,
    /// Repeatable, comma-delimited `key=value` pairs.
    StringMap,
}

impl FlagKind {
    /// Maps a schema property to a flag kind; unknown types yield `None`.
    #[must_use]
    pub fn from_property(property: &SchemaProperty) -> Option<Self> {
        match property.kind.as_str() {
            "string" => Some(Self::String {
                choices: property.enum_values.iter().map(display_value).collect(),
            }),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::StringArray),
            "object" => Some(Self::StringMap),
            _ => None,
        }
    }
}

/// Where a flag's default value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSource {
    /// No default; the flag starts at its zero value.
    None,
    /// The plugin's schema.
    Schema,
    /// The user's per-plugin configuration.
    User,
}

/// A flag generated for one schema property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    /// Original schema field name.
    pub field: String,
    /// Long flag name.
    pub flag: String,
    /// Value shape.
    pub kind: FlagKind,
    /// Help text.
    pub description: String,
    /// Whether the flag must be supplied.
    pub required: bool,
    /// Default values in command-line form; empty means the zero value.
    pub defaults: Vec<String>,
    /// Origin of `defaults`.
    pub default_source: DefaultSource,
}

impl FlagSpec {
    /// Builds the clap argument for this flag.
    #[must_use]
    pub fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.flag.clone())
            .long(self.flag.clone())
            .help(self.description.clone())
            .required(self.required);

        arg = match &self.kind {
            FlagKind::String { choices } if !choices.is_empty() => arg
                .value_name("STRING")
                .action(ArgAction::Set)
                .value_parser(PossibleValuesParser::new(choices.clone())),
            FlagKind::String { .. } => arg.value_name("STRING").action(ArgAction::Set),
            FlagKind::Integer => arg
                .value_name("INT")
                .action(ArgAction::Set)
                .value_parser(value_parser!(i64)),
            FlagKind::Boolean => arg
                .action(ArgAction::Set)
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true")
                .value_parser(value_parser!(bool)),
            FlagKind::StringArray => arg
                .value_name("VALUE")
                .action(ArgAction::Append)
                .value_delimiter(','),
            FlagKind::StringMap => arg
                .value_name("KEY=VALUE")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .value_parser(parse_key_value),
        };

        if !self.required && !self.defaults.is_empty() {
            arg = arg.default_values(self.defaults.clone());
        }
        arg
    }

    /// Reads this flag's value from parsed arguments.
    ///
    /// Returns `None` unless the user supplied the flag on the command line
    /// or the value is a default from the user's own configuration.
    #[must_use]
    pub fn value(&self, matches: &ArgMatches) -> Option<Value> {
        let supplied = match matches.value_source(&self.flag) {
            Some(ValueSource::CommandLine) => true,
            Some(ValueSource::DefaultValue) => self.default_source == DefaultSource::User,
            _ => false,
        };
        if !supplied {
            return None;
        }

        match &self.kind {
            FlagKind::String { .. } => matches
                .get_one::<String>(&self.flag)
                .map(|s| Value::String(s.clone())),
            FlagKind::Integer => matches.get_one::<i64>(&self.flag).map(|n| Value::from(*n)),
            FlagKind::Boolean => matches.get_one::<bool>(&self.flag).map(|b| Value::Bool(*b)),
            FlagKind::StringArray => matches.get_many::<String>(&self.flag).map(|values| {
                Value::Array(values.map(|s| Value::String(s.clone())).collect())
            }),
            FlagKind::StringMap => matches
                .get_many::<(String, String)>(&self.flag)
                .map(|pairs| {
                    Value::Object(
                        pairs
                            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                            .collect(),
                    )
                }),
        }
    }
}

/// Converts a schema field name to its flag name.
///
/// # Examples
///
/// ```
/// use tack_cli::flags::{field_to_flag, flag_to_field};
///
/// assert_eq!(field_to_flag("record_type"), "record-type");
/// assert_eq!(flag_to_field("record-type"), "record_type");
/// ```
#[must_use]
pub fn field_to_flag(field: &str) -> String {
    field.replace('_', "-")
}

/// Converts a flag name back to its schema field name.
#[must_use]
pub fn flag_to_field(flag: &str) -> String {
    flag.replace('-', "_")
}

/// Generates flag specs for one operation.
///
/// Skips `service` and `operation`, properties outside a non-empty
/// `allowlist`, properties of unknown type, and properties whose flag name
/// would shadow a root flag or an earlier property. `user_defaults` is keyed
/// by flag name and takes precedence over schema defaults; a required flag
/// stays mandatory whatever its default.
#[must_use]
pub fn flag_specs(
    schema: &ParsedSchema,
    allowlist: &[String],
    user_defaults: Option<&BTreeMap<String, String>>,
) -> Vec<FlagSpec> {
    let allowed: BTreeSet<&str> = allowlist.iter().map(String::as_str).collect();
    let required: BTreeSet<&str> = schema.required.iter().map(String::as_str).collect();

    let mut emitted = BTreeSet::new();
    let mut specs = Vec::new();
    for (field, property) in &schema.properties {
        if PATH_FIELDS.contains(&field.as_str()) {
            continue;
        }
        if !allowed.is_empty() && !allowed.contains(field.as_str()) {
            continue;
        }

        let flag = field_to_flag(field);
        if flag.is_empty() || RESERVED_FLAGS.contains(&flag.as_str()) {
            tracing::debug!("Skipping schema field '{}': --{} is reserved", field, flag);
            continue;
        }
        if emitted.contains(&flag) {
            tracing::warn!("Skipping schema field '{}': --{} is already taken", field, flag);
            continue;
        }

        let Some(kind) = FlagKind::from_property(property) else {
            tracing::debug!(
                "Skipping schema field '{}': unsupported type '{}'",
                field,
                property.kind
            );
            continue;
        };

        let user_default = user_defaults.and_then(|d| d.get(&flag));
        let (defaults, default_source) = match user_default {
            Some(raw) => match user_default_values(&kind, raw) {
                Some(values) => (values, DefaultSource::User),
                None => {
                    tracing::warn!(
                        "Ignoring configured default for --{}: '{}' is not a valid value",
                        flag,
                        raw
                    );
                    schema_default(&kind, property.default.as_ref())
                }
            },
            None => schema_default(&kind, property.default.as_ref()),
        };

        emitted.insert(flag.clone());
        specs.push(FlagSpec {
            field: field.clone(),
            flag,
            kind,
            description: property.description.clone(),
            required: required.contains(field.as_str()),
            defaults,
            default_source,
        });
    }
    specs
}

/// Builds a plugin input config from parsed operation arguments.
///
/// Starts from `{"service", "operation"}` and adds every supplied flag under
/// its original field name.
///
/// # Examples
///
/// ```
/// use clap::Command;
/// use tack_cli::flags::{build_input_config, flag_specs, ParsedSchema};
///
/// let schema = ParsedSchema::parse("dns", &serde_json::json!({
///     "properties": { "record_type": { "type": "string" } }
/// }))?;
/// let specs = flag_specs(&schema, &[], None);
/// let cmd = Command::new("resolve").args(specs.iter().map(|s| s.to_arg()));
/// let matches = cmd.try_get_matches_from(["resolve", "--record-type", "MX"])?;
///
/// let config = build_input_config(&matches, &specs, "dns", "resolve");
/// assert_eq!(config["record_type"], "MX");
/// assert_eq!(config["service"], "dns");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[must_use]
pub fn build_input_config(
    matches: &ArgMatches,
    specs: &[FlagSpec],
    service: &str,
    operation: &str,
) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("service".to_string(), Value::String(service.to_string()));
    config.insert("operation".to_string(), Value::String(operation.to_string()));

    for spec in specs {
        if let Some(value) = spec.value(matches) {
            config.insert(flag_to_field(&spec.flag), value);
        }
    }
    config
}

fn user_default_values(kind: &FlagKind, raw: &str) -> Option<Vec<String>> {
    match kind {
        FlagKind::String { choices } => {
            (choices.is_empty() || choices.iter().any(|c| c == raw)).then(|| vec![raw.to_string()])
        }
        FlagKind::Integer => raw.trim().parse::<i64>().ok().map(|n| vec![n.to_string()]),
        FlagKind::Boolean => Some(vec![raw.eq_ignore_ascii_case("true").to_string()]),
        FlagKind::StringArray => Some(split_list(raw)),
        FlagKind::StringMap => {
            let pairs = split_list(raw);
            pairs
                .iter()
                .all(|p| parse_key_value(p).is_ok())
                .then_some(pairs)
        }
    }
}

fn schema_default(kind: &FlagKind, default: Option<&Value>) -> (Vec<String>, DefaultSource) {
    let values = match (kind, default) {
        (_, None | Some(Value::Null)) => Vec::new(),
        (FlagKind::String { choices }, Some(v)) => {
            let s = display_value(v);
            if s.is_empty() || (!choices.is_empty() && !choices.contains(&s)) {
                Vec::new()
            } else {
                vec![s]
            }
        }
        (FlagKind::Integer, Some(v)) => v
            .as_i64()
            .filter(|n| *n != 0)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
        (FlagKind::Boolean, Some(v)) => {
            if v.as_bool() == Some(true) {
                vec!["true".to_string()]
            } else {
                Vec::new()
            }
        }
        (FlagKind::StringArray, Some(Value::Array(items))) => {
            items.iter().map(display_value).collect()
        }
        (FlagKind::StringMap, Some(Value::Object(map))) => map
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| format!("{k}={}", display_value(v)))
            .collect(),
        _ => Vec::new(),
    };

    if values.is_empty() {
        (values, DefaultSource::None)
    } else {
        (values, DefaultSource::Schema)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Renders a JSON scalar the way a user would type it.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
