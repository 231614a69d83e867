//! Bundle manifest (`bundle.json`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{RegistryError, RegistryResult};

/// A bundle manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub name: String,

    /// Semantic version of the bundle.
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    pub invocation_image: InvocationImage,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDefinition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, CredentialLocation>,
}

/// Image type and location of the installer image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationImage {
    /// e.g. `docker`, `oci`, `qcow`.
    pub image_type: String,

    /// Image reference, e.g. `registry.example.org/app-installer:1.0.0`.
    pub image: String,
}

/// A container image the bundle deploys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<LocationRef>,
}

/// A location within the invocation package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub path: String,
    pub field: String,
}

/// Where the invocation image expects a credential.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CredentialLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, rename = "env", skip_serializing_if = "Option::is_none")]
    pub environment_variable: Option<String>,
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub data_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParameterMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Bundle or index maintainer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Maintainer {
    /// User or organization name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Bundle {
    /// Parse a manifest. `origin` names the source in error messages.
    pub fn from_slice(data: &[u8], origin: &str) -> RegistryResult<Self> {
        let bundle: Self =
            serde_json::from_slice(data).map_err(|e| RegistryError::InvalidManifest {
                origin: origin.to_string(),
                reason: e.to_string(),
            })?;
        bundle.validate(origin)?;
        Ok(bundle)
    }

    /// Read and parse a manifest file.
    pub async fn load(path: &Path) -> RegistryResult<Self> {
        let data = fs::read(path)
            .await
            .map_err(|e| RegistryError::io("read bundle", path, e))?;
        Self::from_slice(&data, &path.display().to_string())
    }

    pub fn to_json_vec(&self) -> RegistryResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub async fn write_file(&self, path: &Path) -> RegistryResult<()> {
        let data = self.to_json_vec()?;
        fs::write(path, data)
            .await
            .map_err(|e| RegistryError::io("write bundle", path, e))
    }

    /// `<name>-<version>.json`, the cache file name for this bundle.
    pub fn cache_file_name(&self) -> String {
        format!("{}-{}.json", self.name, self.version)
    }

    /// Name and version end up in filesystem paths, so they must not escape them.
    fn validate(&self, origin: &str) -> RegistryResult<()> {
        let invalid = |reason: &str| RegistryError::InvalidManifest {
            origin: origin.to_string(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is required"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version is required"));
        }
        if self.name.starts_with('/')
            || self.name.contains('\\')
            || self.name.split('/').any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(invalid("name must be a relative path without '.' or '..' components"));
        }
        if self.version.contains('/') || self.version.contains('\\') || self.version == ".." {
            return Err(invalid("version must not contain path separators"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = r#"{
        "name": "helloworld",
        "version": "0.1.2",
        "invocationImage": {"imageType": "docker", "image": "technosophos/helloworld:0.1.2"},
        "images": [{"name": "web", "uri": "nginx:1.25", "refs": [{"path": "values.yaml", "field": "image"}]}],
        "parameters": {
            "port": {"type": "int", "defaultValue": 8080, "minValue": 1, "maxValue": 65535,
                     "metadata": {"description": "listen port"}}
        },
        "credentials": {
            "kubeconfig": {"path": "/root/.kube/config"},
            "token": {"env": "API_TOKEN"}
        }
    }"#;

    #[test]
    fn test_parse_manifest() {
        let bundle = Bundle::from_slice(HELLO.as_bytes(), "test").unwrap();
        assert_eq!(bundle.name, "helloworld");
        assert_eq!(bundle.invocation_image.image_type, "docker");
        assert_eq!(bundle.images[0].refs[0].field, "image");
        assert_eq!(bundle.parameters["port"].data_type, "int");
        assert_eq!(
            bundle.parameters["port"].default_value,
            Some(serde_json::json!(8080))
        );
        assert_eq!(
            bundle.credentials["token"].environment_variable.as_deref(),
            Some("API_TOKEN")
        );
        assert_eq!(bundle.cache_file_name(), "helloworld-0.1.2.json");
    }

    #[test]
    fn test_serialized_field_names() {
        let bundle = Bundle::from_slice(HELLO.as_bytes(), "test").unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&bundle.to_json_vec().unwrap()).unwrap();
        assert_eq!(value["invocationImage"]["imageType"], "docker");
        assert_eq!(value["credentials"]["token"]["env"], "API_TOKEN");
        assert_eq!(value["parameters"]["port"]["type"], "int");
    }

    #[test]
    fn test_invalid_json() {
        let err = Bundle::from_slice(b"{not json", "broken.json").unwrap_err();
        match err {
            RegistryError::InvalidManifest { origin, .. } => assert_eq!(origin, "broken.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_invocation_image() {
        let err = Bundle::from_slice(br#"{"name":"a","version":"1.0.0"}"#, "t").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest { .. }));
    }

    #[test]
    fn test_path_escaping_names_rejected() {
        for (name, version) in [("../evil", "1.0.0"), ("ok", "../1"), ("", "1.0.0"), ("a//b", "1")] {
            let doc = serde_json::json!({
                "name": name,
                "version": version,
                "invocationImage": {"imageType": "docker", "image": "x:1"}
            });
            let data = serde_json::to_vec(&doc).unwrap();
            assert!(
                Bundle::from_slice(&data, "t").is_err(),
                "{name}/{version} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_write_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bundle.json");
        let bundle = Bundle::from_slice(HELLO.as_bytes(), "test").unwrap();
        bundle.write_file(&path).await.unwrap();
        assert_eq!(Bundle::load(&path).await.unwrap(), bundle);
    }
}
