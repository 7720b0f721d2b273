//! Docker volume plugin wire types.
//!
//! Requests and responses are JSON objects with capitalized field names.
//! An empty `Err` means success.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Content type Docker expects from plugins.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Body of every `/VolumeDriver.*` request. Fields a given endpoint does
/// not use are absent and default to empty.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeRequest {
    pub name: String,
    pub opts: Option<HashMap<String, String>>,
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

impl VolumeRequest {
    /// Decodes a request body. An empty body is an empty request.
    pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub name: String,
    pub mountpoint: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: &'static str,
}

/// Response to any plugin endpoint.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl PluginResponse {
    pub fn ok() -> Self {
        Self {
            err: Some(String::new()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn activate() -> Self {
        Self {
            implements: Some(vec!["VolumeDriver"]),
            ..Self::default()
        }
    }

    pub fn mountpoint(mountpoint: PathBuf) -> Self {
        Self {
            mountpoint: Some(mountpoint),
            ..Self::ok()
        }
    }

    pub fn volume(volume: Volume) -> Self {
        Self {
            volume: Some(volume),
            ..Self::ok()
        }
    }

    pub fn volumes(volumes: Vec<Volume>) -> Self {
        Self {
            volumes: Some(volumes),
            ..Self::ok()
        }
    }

    pub fn capabilities() -> Self {
        Self {
            capabilities: Some(Capabilities { scope: "local" }),
            ..Self::default()
        }
    }

    /// True when the response carries a non-empty error.
    pub fn is_error(&self) -> bool {
        self.err.as_deref().is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_mount_request() {
        let request =
            VolumeRequest::from_body(br#"{"Name": "db", "ID": "abc123"}"#).unwrap();
        assert_eq!(request.name, "db");
        assert_eq!(request.id.as_deref(), Some("abc123"));
        assert!(request.opts.is_none());
    }

    #[test]
    fn test_decode_create_with_opts() {
        let request =
            VolumeRequest::from_body(br#"{"Name": "db", "Opts": {"ttl": "1h"}}"#).unwrap();
        assert_eq!(request.opts.unwrap()["ttl"], "1h");
    }

    #[test]
    fn test_empty_body_is_empty_request() {
        assert_eq!(VolumeRequest::from_body(b"").unwrap(), VolumeRequest::default());
        assert_eq!(VolumeRequest::from_body(b" \n").unwrap(), VolumeRequest::default());
        assert_eq!(VolumeRequest::from_body(b"{}").unwrap(), VolumeRequest::default());
    }

    #[test]
    fn test_garbage_body_fails() {
        assert!(VolumeRequest::from_body(b"{\"Name\":").is_err());
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(PluginResponse::activate()).unwrap(),
            json!({"Implements": ["VolumeDriver"]})
        );
        assert_eq!(
            serde_json::to_value(PluginResponse::mountpoint("/mnt/db".into())).unwrap(),
            json!({"Mountpoint": "/mnt/db", "Err": ""})
        );
        assert_eq!(
            serde_json::to_value(PluginResponse::capabilities()).unwrap(),
            json!({"Capabilities": {"Scope": "local"}})
        );
        assert_eq!(
            serde_json::to_value(PluginResponse::volumes(Vec::new())).unwrap(),
            json!({"Volumes": [], "Err": ""})
        );
        assert_eq!(
            serde_json::to_value(PluginResponse::volume(Volume {
                name: "db".into(),
                mountpoint: "/mnt/db".into(),
            }))
            .unwrap(),
            json!({"Volume": {"Name": "db", "Mountpoint": "/mnt/db"}, "Err": ""})
        );
    }

    #[test]
    fn test_is_error() {
        assert!(!PluginResponse::ok().is_error());
        assert!(!PluginResponse::activate().is_error());
        assert!(PluginResponse::error("boom").is_error());
    }
}
