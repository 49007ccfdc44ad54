use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scorpion::etl::error::{EtlError, Result};

/// Open mapping of option name to value, as written in the config document.
pub type OptionMap = Map<String, Value>;

/// Bookkeeping keys consumed by the resolver and never handed to loaders.
const KEYS_FOR_REMOVAL: &[&str] = &["priority"];

/// Which layer wins when both define the same option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Default,
    Source,
}

impl Priority {
    fn parse(source_name: &str, value: &Value) -> Result<Self> {
        match value.as_str() {
            Some("default") => Ok(Priority::Default),
            Some("source") => Ok(Priority::Source),
            _ => Err(EtlError::InvalidConfig(format!(
                "source \"{source_name}\" declares priority {value}; expected \"default\" or \"source\""
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Default => write!(f, "default"),
            Priority::Source => write!(f, "source"),
        }
    }
}

/// Layered configuration of one named source.
///
/// Combines the shared `defaults` layer with the source's own override
/// layer. The source layer only wins ties when both the source itself and
/// the caller ask for [`Priority::Source`].
#[derive(Debug, Clone)]
pub struct SourceConfig<'a> {
    source_name: &'a str,
    default_priority: Priority,
    config_default: &'a OptionMap,
    config_source: &'a OptionMap,
    required_config_items_in_source: &'a [String],
}

impl<'a> SourceConfig<'a> {
    pub fn new(
        source_name: &'a str,
        default_priority: Priority,
        config_default: &'a OptionMap,
        config_source: &'a OptionMap,
        required_config_items_in_source: &'a [String],
    ) -> Self {
        Self {
            source_name,
            default_priority,
            config_default,
            config_source,
            required_config_items_in_source,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source_name
    }

    /// Priority declared by the source layer itself.
    pub fn source_priority(&self) -> Result<Priority> {
        let value = self.config_source.get("priority").ok_or_else(|| {
            EtlError::InvalidConfig(format!(
                "source \"{}\" does not declare a priority",
                self.source_name
            ))
        })?;
        Priority::parse(self.source_name, value)
    }

    /// Effective priority after applying the caller's default stance.
    pub fn priority(&self) -> Result<Priority> {
        let source_priority = self.source_priority()?;
        Ok(
            if source_priority == Priority::Source && self.default_priority == Priority::Source {
                Priority::Source
            } else {
                Priority::Default
            },
        )
    }

    /// Validates the source layer and returns the merged, cleaned mapping.
    ///
    /// Every option from either layer appears in the result; for options in
    /// both, the winning layer's value is taken. Bookkeeping keys are
    /// stripped. Calling this repeatedly yields equal mappings.
    pub fn resolve(&self) -> Result<OptionMap> {
        self.check_required_items()?;

        let (winner, fallback) = match self.priority()? {
            Priority::Source => (self.config_source, self.config_default),
            Priority::Default => (self.config_default, self.config_source),
        };

        let mut merged = fallback.clone();
        for (key, value) in winner {
            merged.insert(key.clone(), value.clone());
        }
        for key in KEYS_FOR_REMOVAL {
            merged.remove(*key);
        }
        Ok(merged)
    }

    fn check_required_items(&self) -> Result<()> {
        let missing: Vec<String> = self
            .required_config_items_in_source
            .iter()
            .filter(|item| !self.config_source.contains_key(item.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(EtlError::SourceConfiguration {
            source_name: self.source_name.to_string(),
            present: self.config_source.keys().cloned().collect(),
            required: self.required_config_items_in_source.to_vec(),
            missing,
        })
    }
}
