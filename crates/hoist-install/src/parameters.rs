//! Parameter files and parameter checks.

use std::collections::BTreeMap;
use std::path::Path;

use hoist_registry::{Bundle, ParameterDefinition};
use serde_json::Value;
use tokio::fs;
use tracing::warn;

use crate::error::{InstallError, InstallResult};

/// Parameter values by name.
pub type Parameters = BTreeMap<String, Value>;

/// Supported parameter file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Pick the decoder from the file extension.
    pub fn from_path(path: &Path) -> InstallResult<Self> {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        match ext.as_str() {
            ".toml" => Ok(Self::Toml),
            ".json" => Ok(Self::Json),
            _ => Err(InstallError::NoDecoder { ext }),
        }
    }

    pub fn decode(self, data: &str) -> InstallResult<Parameters> {
        let decoded: Result<Parameters, String> = match self {
            Self::Toml => toml::from_str(data).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(data).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| InstallError::Parameters { message })
    }
}

/// Decode a parameter file. The format comes from the extension alone.
pub async fn load_parameters(path: &Path) -> InstallResult<Parameters> {
    let format = Format::from_path(path)?;
    let data = fs::read_to_string(path)
        .await
        .map_err(|e| InstallError::io("read parameters", path, e))?;
    format.decode(&data)
}

/// Fill in defaults and check values against the bundle's definitions.
///
/// Values for parameters the bundle does not declare are kept.
pub fn apply_definitions(bundle: &Bundle, mut values: Parameters) -> InstallResult<Parameters> {
    for (name, definition) in &bundle.parameters {
        match values.get(name) {
            Some(value) => check_value(name, definition, value)?,
            None => {
                if let Some(default) = &definition.default_value {
                    values.insert(name.clone(), default.clone());
                }
            }
        }
    }

    for name in values.keys() {
        if !bundle.parameters.contains_key(name) {
            warn!(parameter = %name, bundle = %bundle.name, "parameter is not declared by the bundle");
        }
    }
    Ok(values)
}

fn check_value(name: &str, definition: &ParameterDefinition, value: &Value) -> InstallResult<()> {
    let fail = |message: String| InstallError::Parameters {
        message: format!("{name}: {message}"),
    };

    let type_ok = match definition.data_type.as_str() {
        "string" => value.is_string(),
        "int" | "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "bool" | "boolean" => value.is_boolean(),
        _ => true,
    };
    if !type_ok {
        return Err(fail(format!("expected a {} value, got {value}", definition.data_type)));
    }

    if let Some(allowed) = &definition.allowed_values {
        if !allowed.contains(value) {
            return Err(fail(format!("{value} is not one of the allowed values")));
        }
    }

    // Floats are range-checked too, so compare in f64.
    if let Some(n) = value.as_f64() {
        if definition.min_value.is_some_and(|min| n < min as f64) {
            return Err(fail(format!("{value} is below the minimum")));
        }
        if definition.max_value.is_some_and(|max| n > max as f64) {
            return Err(fail(format!("{value} is above the maximum")));
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if definition.min_length.is_some_and(|min| len < min) {
            return Err(fail(format!("length {len} is below the minimum")));
        }
        if definition.max_length.is_some_and(|max| len > max) {
            return Err(fail(format!("length {len} is above the maximum")));
        }
    }
    Ok(())
}
