//! Wire types for the volume-plugin protocol.
//!
//! One JSON object per line in each direction. Requests are tagged by
//! `method`; responses carry an `err` string that is empty (and omitted)
//! on success, following the volume-plugin convention of reporting
//! failures in-band rather than through transport status.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(tag = "method")]
pub enum Request {
    Create {
        name: String,
        #[serde(default)]
        opts: HashMap<String, String>,
    },
    Get {
        name: String,
    },
    List,
    Path {
        name: String,
    },
    Remove {
        name: String,
    },
    Mount {
        name: String,
        #[serde(default)]
        id: String,
    },
    Unmount {
        name: String,
        #[serde(default)]
        id: String,
    },
    Capabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub scope: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl Response {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(err: impl std::fmt::Display) -> Self {
        Self {
            err: err.to_string(),
            ..Self::default()
        }
    }

    pub fn mountpoint(path: impl Into<String>) -> Self {
        Self {
            mountpoint: Some(path.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_decode_by_method_tag() {
        let req: Request =
            serde_json::from_str(r#"{"method":"Create","name":"v","opts":{"size":"10M"}}"#)
                .unwrap();
        match req {
            Request::Create { name, opts } => {
                assert_eq!(name, "v");
                assert_eq!(opts.get("size").map(String::as_str), Some("10M"));
            }
            other => panic!("wrong variant: {other:?}"),
        }

        assert!(matches!(
            serde_json::from_str(r#"{"method":"List"}"#).unwrap(),
            Request::List
        ));
        assert!(matches!(
            serde_json::from_str(r#"{"method":"Mount","name":"v"}"#).unwrap(),
            Request::Mount { .. }
        ));
    }

    #[test]
    fn unknown_methods_fail_to_decode() {
        assert!(serde_json::from_str::<Request>(r#"{"method":"Snapshot","name":"v"}"#).is_err());
    }

    #[test]
    fn success_responses_omit_the_err_field() {
        let json = serde_json::to_string(&Response::mountpoint("/mnt/xfs/vols/v")).unwrap();
        assert_eq!(json, r#"{"mountpoint":"/mnt/xfs/vols/v"}"#);
        assert_eq!(serde_json::to_string(&Response::ok()).unwrap(), "{}");
    }

    #[test]
    fn error_responses_carry_only_err() {
        let json = serde_json::to_string(&Response::error("boom")).unwrap();
        assert_eq!(json, r#"{"err":"boom"}"#);
    }
}
