use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use shipyard_core::Resource;

use super::{Filter, FilterStage};

/// Secret holding the API token signing key
pub const JWT_SECRET: &str = "shipyard-jwt";
/// Secret holding object store credentials for platform services
pub const OBJECT_STORE_SECRET: &str = "shipyard-object-store";
/// Secret holding the cache password for platform services
pub const CACHE_SECRET: &str = "shipyard-cache";

/// Writes known values into a named `Secret`
///
/// Values land base64-encoded under `data`; a `stringData` entry with the
/// same key is removed so the two never disagree.
#[derive(Debug, Clone)]
pub struct SecretValueFilter {
    secret_name: String,
    entries: IndexMap<String, String>,
}

impl SecretValueFilter {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Token signing key for the core API
    pub fn jwt(secret: impl Into<String>) -> Self {
        Self::new(JWT_SECRET).with_entry("secret", secret)
    }

    /// Object store access credentials
    pub fn object_store(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::new(OBJECT_STORE_SECRET)
            .with_entry("accessKey", access_key)
            .with_entry("secretKey", secret_key)
    }

    /// Cache password
    pub fn cache(password: impl Into<String>) -> Self {
        Self::new(CACHE_SECRET).with_entry("password", password)
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    fn inject(&self, resource: &mut Resource) {
        let Some(doc) = resource.body_mut().as_object_mut() else {
            return;
        };

        if let Some(string_data) = doc.get_mut("stringData").and_then(JsonValue::as_object_mut) {
            for key in self.entries.keys() {
                string_data.remove(key);
            }
        }

        let data = doc
            .entry("data")
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !data.is_object() {
            *data = JsonValue::Object(Map::new());
        }
        if let Some(data) = data.as_object_mut() {
            for (key, value) in &self.entries {
                let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
                data.insert(key.clone(), JsonValue::String(encoded));
            }
        }
    }
}

impl Filter for SecretValueFilter {
    fn name(&self) -> &'static str {
        "secret-value"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::Secret
    }

    fn apply(&self, mut resources: Vec<Resource>) -> Vec<Resource> {
        for resource in &mut resources {
            if resource.kind() == "Secret" && resource.name() == self.secret_name {
                self.inject(resource);
            }
        }
        resources
    }
}
