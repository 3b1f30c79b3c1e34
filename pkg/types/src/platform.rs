use serde::{Deserialize, Serialize};

/// The orchestration platform flavor; it changes the shape of generated pods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Kubernetes,
    Openshift,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Kubernetes => write!(f, "kubernetes"),
            Platform::Openshift => write!(f, "openshift"),
        }
    }
}

/// Detected platform flavor plus the merged payloads of the version endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub platform: Platform,
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl ServerVersion {
    /// `gitVersion` reported by the server, if any.
    pub fn git_version(&self) -> Option<&str> {
        self.info.get("gitVersion").and_then(|v| v.as_str())
    }
}
