//! Collection / request data model (component C8).
//!
//! Mirrors the teacher's config types (`config/mod.rs`) in spirit — plain
//! serde structs, `camelCase` on the wire, validated after parse — but shaped
//! for a Postman-like collection tree instead of a proxy rule file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub pre_request_script: Option<String>,
    #[serde(default)]
    pub post_response_script: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            version: default_version(),
            variables: HashMap::new(),
            auth: None,
            items: Vec::new(),
            pre_request_script: None,
            post_response_script: None,
        }
    }

    /// Pre-order walk over every request in the tree: at each node, all of
    /// that node's own direct requests come before any of its subfolders'
    /// (recursively), yielding the folder-path leading to each request
    /// alongside the request itself.
    pub fn walk(&self) -> Vec<(Vec<&Folder>, &RequestDefinition)> {
        let mut out = Vec::new();
        walk_items(&self.items, &mut Vec::new(), &mut out);
        out
    }
}

fn walk_items<'a>(
    items: &'a [Item],
    path: &mut Vec<&'a Folder>,
    out: &mut Vec<(Vec<&'a Folder>, &'a RequestDefinition)>,
) {
    // Direct requests of this node first, regardless of where they fall in
    // the raw `items` list relative to sibling folders.
    for item in items {
        if let Item::Request(req) = item {
            out.push((path.clone(), req));
        }
    }
    for item in items {
        if let Item::Folder(folder) = item {
            path.push(folder);
            walk_items(&folder.items, path, out);
            path.pop();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Item {
    Request(RequestDefinition),
    Folder(Folder),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub pre_request_script: Option<String>,
    #[serde(default)]
    pub post_response_script: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<BodyConfig>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub pre_request_script: Option<String>,
    #[serde(default)]
    pub post_response_script: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestDefinition>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub verify_tls: Option<bool>,
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    10
}

/// A declarative `{name, expr}` assertion attached to a request, evaluated
/// against the response the same way a `pm.test()` call in a post-response
/// script is: alongside any script-recorded `TestResult`s, never in place of
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub name: String,
    pub expr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum BodyConfig {
    Raw { content: String, content_type: String },
    FormUrlEncoded { fields: Vec<(String, String)> },
    Json { value: serde_json::Value },
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AuthConfig {
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { key: String, value: String, location: ApiKeyLocation },
    OAuth2 { access_token: String },
    AwsV4 { access_key: String, secret_key: String, region: String, service: String },
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// At most one environment in a store is active at a time; see
    /// `FileStore::set_active_environment`.
    #[serde(default)]
    pub active: bool,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            variables: HashMap::new(),
            active: false,
        }
    }
}

/// Lightweight metadata record used by `FileStore::list` so listing a
/// directory of collections never has to parse nested scripts or bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_visits_direct_requests_before_subfolders() {
        let mut collection = Collection::new("demo");
        let leaf = RequestDefinition {
            id: Uuid::new_v4(),
            name: "leaf".into(),
            protocol: default_protocol(),
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: vec![],
            query: vec![],
            body: None,
            auth: None,
            pre_request_script: None,
            post_response_script: None,
            tests: vec![],
            timeout_ms: None,
            verify_tls: None,
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
        };
        let folder = Folder {
            id: Uuid::new_v4(),
            name: "nested".into(),
            description: None,
            auth: None,
            pre_request_script: None,
            post_response_script: None,
            items: vec![Item::Request(leaf.clone())],
        };
        // Folder pushed before the root-level request, but the root's own
        // direct request must still be visited first.
        collection.items.push(Item::Folder(folder));
        collection.items.push(Item::Request(leaf));

        let visited = collection.walk();
        assert_eq!(visited.len(), 2);
        assert!(visited[0].0.is_empty()); // root-level request visited first
        assert_eq!(visited[1].0.len(), 1); // nested leaf visited after
    }

    #[test]
    fn round_trips_through_yaml() {
        let collection = Collection::new("demo");
        let yaml = serde_yaml::to_string(&collection).unwrap();
        let back: Collection = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.name, "demo");
    }
}
