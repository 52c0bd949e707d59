//! Session configuration
//!
//! A `ProfilerConfig` is handed to `Profiler::start`. It can be built in code
//! or deserialized from TOML/JSON using the same option names the profiler
//! has always accepted (`ignored_functions`, `functions`,
//! `argument_functions`, `layers`).

use crate::error::{ProfilerError, Result};
use crate::symbol::ROOT_SYMBOL;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;

/// Default sampling interval for sampled mode (microseconds)
pub const DEFAULT_SAMPLING_INTERVAL_US: u64 = 100_000;

/// Per-session measurement flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfilerFlags {
    /// Track builtin (host-native) calls as well as user calls
    pub include_builtins: bool,
    /// Gather CPU time per call edge
    pub measure_cpu: bool,
    /// Gather memory and peak-memory deltas per call edge
    pub measure_memory: bool,
}

impl Default for ProfilerFlags {
    fn default() -> Self {
        ProfilerFlags {
            include_builtins: true,
            measure_cpu: false,
            measure_memory: false,
        }
    }
}

impl ProfilerFlags {
    /// Do not profile builtins
    pub const NO_BUILTINS: u32 = 0x0001;
    /// Gather CPU times
    pub const CPU: u32 = 0x0002;
    /// Gather memory usage
    pub const MEMORY: u32 = 0x0004;

    /// Decode the classic bit-flag form
    pub fn from_bits(bits: u32) -> Self {
        ProfilerFlags {
            include_builtins: bits & Self::NO_BUILTINS == 0,
            measure_cpu: bits & Self::CPU != 0,
            measure_memory: bits & Self::MEMORY != 0,
        }
    }

    /// Encode back into the bit-flag form
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if !self.include_builtins {
            bits |= Self::NO_BUILTINS;
        }
        if self.measure_cpu {
            bits |= Self::CPU;
        }
        if self.measure_memory {
            bits |= Self::MEMORY;
        }
        bits
    }
}

/// How the call filter interprets its name list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Track every call except the listed names
    Ignore,
    /// Track only the listed names (plus the root symbol)
    Only,
}

/// Configuration recognized at session start
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub flags: ProfilerFlags,
    /// Names excluded from tracking. Takes precedence over `functions`.
    #[serde(deserialize_with = "string_list")]
    pub ignored_functions: Option<Vec<String>>,
    /// Names to track exclusively
    #[serde(deserialize_with = "string_list")]
    pub functions: Option<Vec<String>>,
    /// Names whose argument summary is appended to their symbol
    #[serde(deserialize_with = "string_list")]
    pub argument_functions: Option<Vec<String>>,
    /// Symbol to layer label
    pub layers: Option<HashMap<String, String>>,
    /// Sampled mode interval in microseconds
    pub sampling_interval_us: u64,
    /// Cap on the number of frames rendered per sample
    pub max_sample_depth: Option<usize>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        ProfilerConfig {
            flags: ProfilerFlags::default(),
            ignored_functions: None,
            functions: None,
            argument_functions: None,
            layers: None,
            sampling_interval_us: DEFAULT_SAMPLING_INTERVAL_US,
            max_sample_depth: None,
        }
    }
}

impl ProfilerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ProfilerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ProfilerConfig = serde_json::from_str(text)
            .map_err(|e| ProfilerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; `.json` files are parsed as JSON,
    /// anything else as TOML
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    /// Check values that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_us == 0 {
            return Err(ProfilerError::Config(
                "sampling_interval_us must be greater than zero".to_string(),
            ));
        }
        if self.max_sample_depth == Some(0) {
            return Err(ProfilerError::Config(
                "max_sample_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_flags(mut self, flags: ProfilerFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_ignored_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_functions = Some(owned_names(names));
        self
    }

    pub fn with_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions = Some(owned_names(names));
        self
    }

    pub fn with_argument_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_functions = Some(owned_names(names));
        self
    }

    pub fn with_layers<I, K, V>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.layers = Some(
            layers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn with_sampling_interval_us(mut self, interval_us: u64) -> Self {
        self.sampling_interval_us = interval_us;
        self
    }

    pub fn with_max_sample_depth(mut self, depth: usize) -> Self {
        self.max_sample_depth = Some(depth);
        self
    }

    /// The call-filter list and its interpretation, if any
    ///
    /// `ignored_functions` wins when both lists are present.
    pub fn call_filter(&self) -> Option<(FilterMode, &[String])> {
        if let Some(names) = &self.ignored_functions {
            Some((FilterMode::Ignore, names.as_slice()))
        } else {
            self.functions
                .as_ref()
                .map(|names| (FilterMode::Only, names.as_slice()))
        }
    }
}

fn owned_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(Into::into)
        .filter(|name: &String| name != ROOT_SYMBOL)
        .collect()
}

/// Accept a single string or a list; non-string list entries are skipped
/// and the root symbol is never kept
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(vec![s]),
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) if s != ROOT_SYMBOL => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Some(_) => None,
    })
}
