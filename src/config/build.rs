//! Build configuration (`<name>.b.json`)
//!
//! A build config is an ordered map of step definitions plus a pool of
//! shared resources. A step field may hold the reserved marker value
//! `"kiln_lookup"` instead of an inline value, meaning "resolve the shared
//! resource with this field's key against the active step". Step execution
//! order is the JSON insertion order of the `steps` object.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::project::BUILD_FILE_SUFFIX;
use super::ConfigError;

/// Reserved step-field value that triggers a shared-resource lookup
pub const LOOKUP_MARKER: &str = "kiln_lookup";

/// Reserved `appliesTo` value meaning "every step"
const APPLIES_TO_ALL: &str = "all";

mod keys {
    pub const SHARED: &str = "shared";
    pub const STEPS: &str = "steps";

    pub const TARGET_NAME: &str = "targetName";
    pub const TARGET_TYPE: &str = "targetType";
    pub const SOURCE_EXTENSION: &str = "sourceExtension";
    pub const HEADER_EXTENSION: &str = "headerExtension";
    pub const INCLUDE_DIRECTORIES: &str = "includeDirectories";
    pub const SOURCE_DIRECTORIES: &str = "sourceDirectories";
    pub const DEFINES: &str = "defines";
    pub const STATIC_LIBRARIES: &str = "staticLibraries";
    pub const DYNAMIC_LIBRARIES: &str = "dynamicLibraries";
    pub const ADDITIONAL_ARGUMENTS: &str = "additionalArguments";
}

/// Which steps a shared resource applies to
#[derive(Debug, Clone, PartialEq)]
pub enum AppliesTo {
    /// The `"all"` sentinel
    All,
    /// A finite set of step names
    Steps(Vec<String>),
}

impl AppliesTo {
    fn covers(&self, step_name: &str) -> bool {
        match self {
            AppliesTo::All => true,
            AppliesTo::Steps(names) => names.iter().any(|n| n == step_name),
        }
    }
}

impl<'de> Deserialize<'de> for AppliesTo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) if s == APPLIES_TO_ALL => Ok(AppliesTo::All),
            Value::String(s) => Err(de::Error::custom(format!(
                "appliesTo must be \"{APPLIES_TO_ALL}\" or an array of step names, got \"{s}\""
            ))),
            Value::Array(items) => {
                let names = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(de::Error::custom(format!(
                            "appliesTo entries must be step names, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AppliesTo::Steps(names))
            }
            other => Err(de::Error::custom(format!(
                "appliesTo must be \"{APPLIES_TO_ALL}\" or an array of step names, got {other}"
            ))),
        }
    }
}

/// A named value reusable by multiple steps
#[derive(Debug, Clone, Deserialize)]
pub struct SharedResource {
    #[serde(rename = "appliesTo")]
    pub applies_to: AppliesTo,
    pub value: Value,
}

/// What a step produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    Library,
    #[default]
    Standalone,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Library => "library",
            TargetType::Standalone => "standalone",
        }
    }
}

/// Immutable resolved view of one build step
///
/// Built fresh on each step activation and discarded afterwards; no state
/// about the "active step" lives anywhere else.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step_name: String,
    pub target_name: String,
    pub target_type: TargetType,
    pub source_extension: String,
    pub header_extension: Option<String>,
    pub include_directories: Vec<PathBuf>,
    pub source_directories: Vec<PathBuf>,
    /// Preprocessor defines in declaration order; `None` means a bare define
    pub defines: Vec<(String, Option<Value>)>,
    pub static_libraries: Vec<String>,
    pub dynamic_libraries: Vec<String>,
    pub additional_arguments: Vec<String>,
}

/// A named build configuration: ordered steps plus shared resources
#[derive(Debug)]
pub struct BuildConfig {
    name: String,
    shared: HashMap<String, SharedResource>,
    steps: Map<String, Value>,
}

impl BuildConfig {
    /// Loads and validates `<name>.b.json` from the configuration directory
    pub fn load(config_dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = config_dir.join(format!("{name}{BUILD_FILE_SUFFIX}"));
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }

        let content = fs::read_to_string(&path)?;
        let raw: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let object = raw.as_object().ok_or_else(|| {
            ConfigError::Invalid("build config must be a JSON object".to_string())
        })?;

        for section in [keys::SHARED, keys::STEPS] {
            if !object.contains_key(section) {
                return Err(ConfigError::Invalid(format!(
                    "missing required section '{section}'"
                )));
            }
        }

        let shared = serde_json::from_value(object[keys::SHARED].clone())
            .map_err(|e| ConfigError::Parse(format!("shared resources: {e}")))?;

        let steps = object[keys::STEPS]
            .as_object()
            .cloned()
            .ok_or_else(|| ConfigError::Invalid("'steps' must be a JSON object".to_string()))?;

        Ok(Self {
            name: name.to_string(),
            shared,
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in declared (execution) order
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn has_step(&self, step_name: &str) -> bool {
        self.steps.contains_key(step_name)
    }

    /// Resolves one step field, following the shared-resource marker
    ///
    /// Returns the step's inline value when present and not the lookup
    /// marker. For a marker, looks up the shared resource named `key` and
    /// returns its value when `appliesTo` covers the active step. `None`
    /// means "legitimately absent" — callers apply a default or skip the
    /// argument; it is never an error.
    pub fn resolve_value(&self, step_name: &str, key: &str) -> Option<&Value> {
        let step = self.steps.get(step_name)?.as_object()?;
        let value = step.get(key)?;

        if value.as_str() != Some(LOOKUP_MARKER) {
            return Some(value);
        }

        let resource = self.shared.get(key)?;
        if resource.applies_to.covers(step_name) {
            Some(&resource.value)
        } else {
            None
        }
    }

    /// Builds the immutable resolved context for one step
    ///
    /// `platform` selects the per-platform library lists. Fails only when a
    /// required field is missing or a present field has the wrong shape;
    /// optional fields degrade to empty defaults.
    pub fn resolve_step(
        &self,
        step_name: &str,
        platform: &str,
    ) -> Result<StepContext, ConfigError> {
        if !self.has_step(step_name) {
            return Err(ConfigError::Invalid(format!(
                "build '{}' has no step named '{step_name}'",
                self.name
            )));
        }

        Ok(StepContext {
            step_name: step_name.to_string(),
            target_name: self.required_string(step_name, keys::TARGET_NAME)?,
            target_type: self.target_type(step_name)?,
            source_extension: self.required_string(step_name, keys::SOURCE_EXTENSION)?,
            header_extension: self.optional_string(step_name, keys::HEADER_EXTENSION)?,
            include_directories: self.path_list(step_name, keys::INCLUDE_DIRECTORIES)?,
            source_directories: self.path_list(step_name, keys::SOURCE_DIRECTORIES)?,
            defines: self.defines(step_name)?,
            static_libraries: self.platform_libraries(step_name, keys::STATIC_LIBRARIES, platform)?,
            dynamic_libraries: self.platform_libraries(
                step_name,
                keys::DYNAMIC_LIBRARIES,
                platform,
            )?,
            additional_arguments: self.string_list(step_name, keys::ADDITIONAL_ARGUMENTS)?,
        })
    }

    fn required_string(&self, step_name: &str, key: &str) -> Result<String, ConfigError> {
        self.optional_string(step_name, key)?.ok_or_else(|| {
            ConfigError::Invalid(format!(
                "step '{step_name}' is missing required field '{key}'"
            ))
        })
    }

    fn optional_string(&self, step_name: &str, key: &str) -> Result<Option<String>, ConfigError> {
        match self.resolve_value(step_name, key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ConfigError::Invalid(format!(
                "step '{step_name}' field '{key}' must be a string, got {other}"
            ))),
        }
    }

    fn target_type(&self, step_name: &str) -> Result<TargetType, ConfigError> {
        match self.optional_string(step_name, keys::TARGET_TYPE)?.as_deref() {
            None => Ok(TargetType::default()),
            Some("library") => Ok(TargetType::Library),
            Some("standalone") => Ok(TargetType::Standalone),
            Some(other) => Err(ConfigError::Invalid(format!(
                "step '{step_name}' has unknown target type '{other}'"
            ))),
        }
    }

    fn string_list(&self, step_name: &str, key: &str) -> Result<Vec<String>, ConfigError> {
        let value = match self.resolve_value(step_name, key) {
            None => return Ok(vec![]),
            Some(value) => value,
        };

        let items = value.as_array().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "step '{step_name}' field '{key}' must be an array of strings"
            ))
        })?;

        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "step '{step_name}' field '{key}' must contain only strings, got {item}"
                    ))
                })
            })
            .collect()
    }

    fn path_list(&self, step_name: &str, key: &str) -> Result<Vec<PathBuf>, ConfigError> {
        Ok(self
            .string_list(step_name, key)?
            .into_iter()
            .map(PathBuf::from)
            .collect())
    }

    fn defines(&self, step_name: &str) -> Result<Vec<(String, Option<Value>)>, ConfigError> {
        let value = match self.resolve_value(step_name, keys::DEFINES) {
            None => return Ok(vec![]),
            Some(value) => value,
        };

        let object = value.as_object().ok_or_else(|| {
            ConfigError::Invalid(format!("step '{step_name}' field 'defines' must be an object"))
        })?;

        object
            .iter()
            .map(|(name, value)| match value {
                Value::Null => Ok((name.clone(), None)),
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    Ok((name.clone(), Some(value.clone())))
                }
                other => Err(ConfigError::Invalid(format!(
                    "step '{step_name}' define '{name}' must be a scalar, got {other}"
                ))),
            })
            .collect()
    }

    /// Per-platform library list; an absent platform key degrades to empty
    fn platform_libraries(
        &self,
        step_name: &str,
        key: &str,
        platform: &str,
    ) -> Result<Vec<String>, ConfigError> {
        let value = match self.resolve_value(step_name, key) {
            None => return Ok(vec![]),
            Some(value) => value,
        };

        let by_platform = value.as_object().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "step '{step_name}' field '{key}' must map platforms to library lists"
            ))
        })?;

        let libs = match by_platform.get(platform) {
            None => return Ok(vec![]),
            Some(libs) => libs,
        };

        let items = libs.as_array().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "step '{step_name}' field '{key}.{platform}' must be an array of strings"
            ))
        })?;

        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "step '{step_name}' field '{key}.{platform}' must contain only strings"
                    ))
                })
            })
            .collect()
    }
}
