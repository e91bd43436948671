use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{EsError, Result};

pub const DEFAULT_ID_FIELD: &str = "ID";

/// A record that can be written through the bulk API.
///
/// The returned id becomes the `_id` of the action line. An empty id is
/// treated as missing and rejected when the body is built.
pub trait Document: Serialize {
    fn document_id(&self) -> &str;
}

impl<D: Document + ?Sized> Document for &D {
    fn document_id(&self) -> &str {
        (**self).document_id()
    }
}

/// Untyped JSON record whose id is read from one of its own fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    id: String,
    value: Value,
}

impl RawDocument {
    /// Wraps `value`, taking the id from `id_field`. The field must exist
    /// and hold a string.
    pub fn from_value(value: Value, id_field: &str) -> Result<Self> {
        let id = match value.get(id_field) {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(EsError::InvalidArgument(format!(
                    "field {:?} must be a string, found {}",
                    id_field, other
                )))
            }
            None => {
                return Err(EsError::InvalidArgument(format!(
                    "field {:?} is missing",
                    id_field
                )))
            }
        };
        Ok(Self { id, value })
    }

    pub fn get_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Serialize for RawDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl Document for RawDocument {
    fn document_id(&self) -> &str {
        &self.id
    }
}
