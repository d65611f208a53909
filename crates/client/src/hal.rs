//! HAL resource model.
//!
//! A relation present in `_links` is the only signal that the server
//! currently allows that operation on the resource. The client never infers
//! availability from the operator's permissions.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// HTTP verbs a link may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ApiError::validation(format!("unsupported link method '{other}'"))),
        }
    }
}

impl core::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-advertised operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,

    /// Raw verb as sent by the server; `None` means GET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            method: None,
            media_type: None,
            title: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method.as_str().to_string());
        self
    }

    /// The declared verb. Unknown verbs are a validation failure.
    pub fn http_method(&self) -> Result<HttpMethod, ApiError> {
        match self.method.as_deref() {
            None => Ok(HttpMethod::Get),
            Some(m) => m.parse(),
        }
    }
}

pub type Links = BTreeMap<String, Link>;

/// Stable names for the state-changing relations the UI knows how to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Deny,
    Edit,
    Delete,
    Update,
    Create,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Approve,
        Action::Deny,
        Action::Edit,
        Action::Delete,
        Action::Update,
        Action::Create,
    ];

    /// Map a link relation to an action. Unknown relations map to `None`.
    pub fn from_relation(relation: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.relation() == relation)
    }

    pub fn relation(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Deny => "deny",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Update => "update",
            Action::Create => "create",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.relation())
    }
}

/// Embedded value: HAL allows either one resource or a list per relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embedded {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

impl Embedded {
    pub fn as_slice(&self) -> &[Resource] {
        match self {
            Embedded::Many(items) => items,
            Embedded::One(item) => std::slice::from_ref(item.as_ref()),
        }
    }
}

/// A HAL document: links, embedded resources and arbitrary domain fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(
        rename = "_links",
        default,
        deserialize_with = "deserialize_links",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub links: Links,

    #[serde(rename = "_embedded", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub embedded: BTreeMap<String, Embedded>,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Resource {
    /// All links, possibly empty.
    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn has_link(&self, relation: &str) -> bool {
        self.links.contains_key(relation)
    }

    pub fn link(&self, relation: &str) -> Option<&Link> {
        self.links.get(relation)
    }

    /// Actions the server currently offers on this resource.
    pub fn available_actions(&self) -> BTreeSet<Action> {
        self.links
            .keys()
            .filter_map(|rel| Action::from_relation(rel))
            .collect()
    }

    pub fn embedded(&self, relation: &str) -> &[Resource] {
        self.embedded
            .get(relation)
            .map(Embedded::as_slice)
            .unwrap_or(&[])
    }

    /// Typed read of one domain field; `None` if absent or of another shape.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.fields
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the domain fields into `T`.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.fields))
            .map_err(|e| ApiError::network(format!("malformed response: {e}")))
    }

    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Null => Ok(Resource::default()),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| ApiError::network(format!("malformed response: {e}"))),
            other => Err(ApiError::network(format!(
                "malformed response: expected an object, got {}",
                json_type(&other)
            ))),
        }
    }
}

/// `_links` never fails to parse: `null` is empty, a relation given as an
/// array keeps its last entry, and entries without an `href` are dropped.
fn deserialize_links<'de, D>(deserializer: D) -> Result<Links, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let mut links = Links::new();

    for (rel, value) in raw {
        let candidate = match value {
            Value::Array(mut entries) => entries.pop(),
            other => Some(other),
        };
        match candidate.map(serde_json::from_value::<Link>) {
            Some(Ok(link)) => {
                links.insert(rel, link);
            }
            _ => tracing::debug!(relation = %rel, "ignoring unreadable link"),
        }
    }

    Ok(links)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One page of a collection (`_embedded.items` plus paging fields).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Resource>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub links: Links,
}

impl Page {
    pub fn from_resource(resource: Resource) -> Self {
        let items = resource.embedded("items").to_vec();
        let count = items.len() as u64;

        Self {
            total: resource.field("total").unwrap_or(count),
            page: resource.field("page").unwrap_or(1),
            page_size: resource.field("pageSize").unwrap_or(count),
            items,
            links: resource.links,
        }
    }

    pub fn has_next(&self) -> bool {
        self.links.contains_key("next")
    }
}
