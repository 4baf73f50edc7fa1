//! Per-call write options.
//!
//! A [`WriteConfig`] is a loose bag of named values.  The options the
//! remote store understands are picked out through [`META_OPTIONS`] and
//! applied to a [`CreateFileOptions`].

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::client::CreateFileOptions;

/// Setter for one option.  Values of the wrong shape are ignored.
type OptionSetter = fn(&mut CreateFileOptions, &Value);

/// Option name -> setter.
pub const META_OPTIONS: &[(&str, OptionSetter)] = &[
    ("CacheControl", set_cache_control),
    ("ContentType", set_content_type),
    ("Metadata", set_metadata),
    ("ContentLanguage", set_content_language),
    ("ContentEncoding", set_content_encoding),
];

/// Overrides `ContentType` when present.
pub const MIMETYPE_OPTION: &str = "mimetype";

/// Named option values passed to write calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteConfig {
    values: Map<String, Value>,
}

impl WriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// The value for `name`, treating JSON `null` as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for WriteConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn set_cache_control(options: &mut CreateFileOptions, value: &Value) {
    options.cache_control = as_string(value);
}

fn set_content_type(options: &mut CreateFileOptions, value: &Value) {
    options.content_type = as_string(value);
}

fn set_content_language(options: &mut CreateFileOptions, value: &Value) {
    options.content_language = as_string(value);
}

fn set_content_encoding(options: &mut CreateFileOptions, value: &Value) {
    options.content_encoding = as_string(value);
}

fn set_metadata(options: &mut CreateFileOptions, value: &Value) {
    if let Value::Object(map) = value {
        options.metadata = map
            .iter()
            .filter_map(|(k, v)| as_string(v).map(|v| (k.clone(), v)))
            .collect::<BTreeMap<_, _>>();
    }
}

/// Translate a [`WriteConfig`] into upload options.
pub fn options_from_config(config: &WriteConfig) -> CreateFileOptions {
    let mut options = CreateFileOptions::default();

    for (name, setter) in META_OPTIONS {
        if let Some(value) = config.get(name) {
            setter(&mut options, value);
        }
    }

    if let Some(mimetype) = config.get(MIMETYPE_OPTION).and_then(as_string) {
        if !mimetype.is_empty() {
            options.content_type = Some(mimetype);
        }
    }

    options
}
