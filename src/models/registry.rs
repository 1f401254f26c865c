//! Model registry lookup against an MLflow tracking server

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Which version of a registered model a URI points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// `models:/<name>/<number>`
    Version(String),
    /// `models:/<name>/<stage>`
    Stage(String),
    /// `models:/<name>@<alias>`
    Alias(String),
    /// `models:/<name>/latest`
    Latest,
}

/// Parsed model URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    /// Registered model, resolved through the registry
    Registered {
        name: String,
        selector: VersionSelector,
    },
    /// Run artifact or any other scheme, used as is
    Direct(String),
}

impl ModelUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let Some(rest) = uri.strip_prefix("models:/") else {
            return Ok(ModelUri::Direct(uri.to_string()));
        };
        let rest = rest.trim_end_matches('/');

        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || alias.is_empty() {
                bail!("invalid model URI '{}'", uri);
            }
            return Ok(ModelUri::Registered {
                name: name.to_string(),
                selector: VersionSelector::Alias(alias.to_string()),
            });
        }

        let Some((name, suffix)) = rest.split_once('/') else {
            bail!("model URI '{}' has no version, stage or alias", uri);
        };
        if name.is_empty() || suffix.is_empty() {
            bail!("invalid model URI '{}'", uri);
        }

        let selector = if suffix.eq_ignore_ascii_case("latest") {
            VersionSelector::Latest
        } else if suffix.chars().all(|c| c.is_ascii_digit()) {
            VersionSelector::Version(suffix.to_string())
        } else {
            VersionSelector::Stage(suffix.to_string())
        };

        Ok(ModelUri::Registered {
            name: name.to_string(),
            selector,
        })
    }
}

/// Resolved model identity
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    /// Registered model name, or the URI for direct models
    pub name: String,
    pub version: Option<String>,
    /// Artifact location reported by the registry
    pub source: Option<String>,
    pub uri: String,
}

#[derive(Debug, Deserialize)]
struct RegistryVersion {
    name: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SingleVersionResponse {
    model_version: RegistryVersion,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<RegistryVersion>,
}

/// Client for the MLflow model registry REST API
pub struct ModelRegistry {
    client: Client,
    tracking_uri: String,
}

impl ModelRegistry {
    pub fn new(client: Client, tracking_uri: &str) -> Self {
        Self {
            client,
            tracking_uri: tracking_uri.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a model URI to a concrete registered version
    pub async fn resolve(&self, model_uri: &str) -> Result<ModelHandle> {
        info!(
            tracking_uri = %self.tracking_uri,
            model_uri = %model_uri,
            "Resolving model from registry"
        );

        let (name, selector) = match ModelUri::parse(model_uri)? {
            ModelUri::Direct(uri) => {
                info!(model_uri = %uri, "Model URI is not registry-backed, using as is");
                return Ok(ModelHandle {
                    name: uri.clone(),
                    version: None,
                    source: Some(uri.clone()),
                    uri,
                });
            }
            ModelUri::Registered { name, selector } => (name, selector),
        };

        let version = match &selector {
            VersionSelector::Version(v) => {
                let url = format!("{}/api/2.0/mlflow/model-versions/get", self.tracking_uri);
                self.get_single(self.client.get(url).query(&[("name", name.as_str()), ("version", v.as_str())]))
                    .await?
            }
            VersionSelector::Alias(alias) => {
                let url = format!("{}/api/2.0/mlflow/registered-models/alias", self.tracking_uri);
                self.get_single(self.client.get(url).query(&[("name", name.as_str()), ("alias", alias.as_str())]))
                    .await?
            }
            VersionSelector::Stage(stage) => self.latest(&name, Some(stage)).await?,
            VersionSelector::Latest => self.latest(&name, None).await?,
        };

        info!(
            model = %version.name,
            version = %version.version,
            source = version.source.as_deref().unwrap_or("-"),
            "Model resolved successfully"
        );

        Ok(ModelHandle {
            name: version.name,
            version: Some(version.version),
            source: version.source,
            uri: model_uri.to_string(),
        })
    }

    async fn get_single(&self, request: reqwest::RequestBuilder) -> Result<RegistryVersion> {
        let response = request.send().await.context("Registry request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("registry returned HTTP {}: {}", status.as_u16(), body);
        }
        let parsed: SingleVersionResponse = response
            .json()
            .await
            .context("Failed to decode registry response")?;
        Ok(parsed.model_version)
    }

    async fn latest(&self, name: &str, stage: Option<&str>) -> Result<RegistryVersion> {
        let url = format!(
            "{}/api/2.0/mlflow/registered-models/get-latest-versions",
            self.tracking_uri
        );
        let mut body = json!({ "name": name });
        if let Some(stage) = stage {
            body["stages"] = json!([stage]);
        }

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Registry request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("registry returned HTTP {}: {}", status.as_u16(), text);
        }
        let parsed: LatestVersionsResponse = response
            .json()
            .await
            .context("Failed to decode registry response")?;

        parsed
            .model_versions
            .into_iter()
            .max_by_key(|v| v.version.parse::<u64>().unwrap_or(0))
            .with_context(|| match stage {
                Some(stage) => format!("No version of '{}' in stage '{}'", name, stage),
                None => format!("No versions registered for '{}'", name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_uris() {
        assert_eq!(
            ModelUri::parse("models:/fraud_detector_RFC/3").unwrap(),
            ModelUri::Registered {
                name: "fraud_detector_RFC".into(),
                selector: VersionSelector::Version("3".into()),
            }
        );
        assert_eq!(
            ModelUri::parse("models:/fraud_detector_RFC/Production").unwrap(),
            ModelUri::Registered {
                name: "fraud_detector_RFC".into(),
                selector: VersionSelector::Stage("Production".into()),
            }
        );
        assert_eq!(
            ModelUri::parse("models:/fraud_detector_RFC@champion").unwrap(),
            ModelUri::Registered {
                name: "fraud_detector_RFC".into(),
                selector: VersionSelector::Alias("champion".into()),
            }
        );
        assert_eq!(
            ModelUri::parse("models:/fraud_detector_RFC/latest").unwrap(),
            ModelUri::Registered {
                name: "fraud_detector_RFC".into(),
                selector: VersionSelector::Latest,
            }
        );
        assert_eq!(
            ModelUri::parse("runs:/abc123/model").unwrap(),
            ModelUri::Direct("runs:/abc123/model".into())
        );
    }

    #[test]
    fn test_parse_rejects_incomplete_uris() {
        assert!(ModelUri::parse("models:/fraud_detector_RFC").is_err());
        assert!(ModelUri::parse("models:/@champion").is_err());
        assert!(ModelUri::parse("models://3").is_err());
    }
}
