use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{api::CAPABILITIES_PATH, RequestContext, StratusError};

/// The document served at `/ocs/v1.php/cloud/capabilities`: a `version`
/// section and a `capabilities` section whose shape is up to the server and
/// its installed apps.
#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityDocument(Value);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub string: String,
    #[serde(default)]
    pub extended_support: bool,
}

impl CapabilityDocument {
    pub fn new(document: Value) -> Self {
        CapabilityDocument(document)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The `capabilities` section, or `null` when the server sent none
    pub fn capabilities(&self) -> &Value {
        self.0.get("capabilities").unwrap_or(&Value::Null)
    }

    pub fn server_version(&self) -> Option<ServerVersion> {
        self.0
            .get("version")
            .cloned()
            .and_then(|version| serde_json::from_value(version).ok())
    }

    /// Like [CapabilityDocument::server_version], but a missing or malformed
    /// `version` section is an error
    pub fn require_server_version(&self) -> Result<ServerVersion, StratusError> {
        self.server_version()
            .ok_or_else(|| StratusError::UnexpectedResponse {
                reason: "capability document has no valid version section".into(),
                context: RequestContext::new("GET", CAPABILITIES_PATH),
            })
    }

    pub fn has(&self, capability: &str) -> bool {
        check_capability(self.capabilities(), capability)
    }

    /// The subset of `capabilities` that are absent or disabled, in the order
    /// given
    pub fn missing<I, S>(&self, capabilities: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        capabilities
            .into_iter()
            .filter(|capability| !self.has(capability.as_ref()))
            .map(|capability| capability.as_ref().to_string())
            .collect()
    }

    pub fn require<I, S>(&self, capabilities: I) -> Result<(), StratusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let missing = self.missing(capabilities);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StratusError::MissingCapability(missing))
        }
    }
}

/// The capability document a session has most recently fetched, shared by
/// its clones. Writes replace the whole document, so readers never see a
/// partial one.
#[derive(Clone, Default)]
pub(crate) struct CapabilityCache(Arc<RwLock<Option<Arc<CapabilityDocument>>>>);

impl CapabilityCache {
    pub fn get(&self) -> Option<Arc<CapabilityDocument>> {
        self.0.read().clone()
    }

    pub fn replace(&self, data: Value) -> Arc<CapabilityDocument> {
        let document = Arc::new(CapabilityDocument::new(data));
        *self.0.write() = Some(document.clone());
        document
    }
}

/// Walk a dotted path through `capabilities`. A single segment only has to
/// be present. For longer paths the last segment must be truthy when its
/// parent is an object, or a member when its parent is an array. A missing
/// intermediate key means the capability is absent.
pub fn check_capability(capabilities: &Value, dotted_path: &str) -> bool {
    let segments: Vec<&str> = dotted_path.split('.').collect();
    let last = segments.len() - 1;
    let mut current = capabilities;

    for (index, segment) in segments.into_iter().enumerate() {
        if index != 0 && index == last {
            return match current {
                Value::Object(map) => map.get(segment).map(is_truthy).unwrap_or(false),
                Value::Array(items) => items
                    .iter()
                    .any(|item| item.as_str() == Some(segment)),
                _ => false,
            };
        }

        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }

    true
}

/// `false`, `null`, zero and empty strings, arrays and objects are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(string) => !string.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
