//! Store-namespace-qualified references
//!
//! A [`Reference`] stands in for a related document until a
//! `ReadByReference` operation fetches it. References travel through the
//! deferred-result graph as plain JSON, using the DBRef shape
//! `{"$ref": <namespace>, "$id": <id>}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{GraphexError, Result};

/// Field added to every document substituted for a reference
pub const NAMESPACE_TAG_FIELD: &str = "mmCollectionName";

const REF_KEY: &str = "$ref";
const ID_KEY: &str = "$id";

/// A (namespace, id) pair pointing at one document in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "$ref")]
    pub namespace: String,
    #[serde(rename = "$id")]
    pub id: Value,
}

impl Reference {
    pub fn new(namespace: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// JSON form used inside the deferred-result graph
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(REF_KEY.to_string(), Value::String(self.namespace.clone()));
        map.insert(ID_KEY.to_string(), self.id.clone());
        Value::Object(map)
    }

    /// Parse the DBRef shape back into a reference
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let namespace = obj.get(REF_KEY)?.as_str()?;
        let id = obj.get(ID_KEY)?;
        Some(Self::new(namespace, id.clone()))
    }

    /// Whether a JSON value has the reference shape
    pub fn is_reference(value: &Value) -> bool {
        Self::from_value(value).is_some()
    }

    /// Key under which the referenced document is stored in a lookup map
    pub fn id_key(&self) -> String {
        id_key(&self.id)
    }
}

/// Stable string key for an identifier value
///
/// Strings are used verbatim so that `"A"` and the lookup key `A` agree;
/// every other JSON value uses its compact serialization.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a JSON array (or single value) of references
pub fn references_from_value(value: &Value) -> Result<Vec<Reference>> {
    let items: Vec<&Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    items
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| {
            Reference::from_value(item).ok_or_else(|| GraphexError::InvalidReference {
                message: format!("expected {{\"$ref\", \"$id\"}}, got {}", item),
            })
        })
        .collect()
}
