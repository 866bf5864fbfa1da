use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DocumentError;

/// Schema tag of documents that carry no typed payload
pub const GENERIC_SCHEMA: &str = "generic";

/// Opaque, schema tagged payload of a document
///
/// The core never interprets field values; it only commits to them as leaves
/// of the data tree under `<schema>.<field>`. Typed document kinds translate
/// to and from this representation through [`DocumentSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedData {
    schema: String,
    fields: BTreeMap<String, Vec<u8>>,
}

impl EmbeddedData {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn generic() -> Self {
        Self::new(GENERIC_SCHEMA)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Path prefix of the schema's data leaves, e.g. `invoice.`
    pub fn prefix(&self) -> String {
        format!("{}.", self.schema)
    }

    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// Like [`EmbeddedData::field`] but failing with `FieldNotFound`
    pub fn require(&self, name: &str) -> Result<&[u8], DocumentError> {
        self.field(name)
            .ok_or_else(|| DocumentError::FieldNotFound(format!("{}{}", self.prefix(), name)))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.fields.iter()
    }
}

/// Adapter between a typed document kind and [`EmbeddedData`]
pub trait DocumentSchema: Sized {
    /// Schema tag, also the path prefix of the kind's data leaves
    const SCHEMA: &'static str;

    fn to_embedded(&self) -> EmbeddedData;

    fn from_embedded(data: &EmbeddedData) -> Result<Self, DocumentError>;

    /// Check the schema tag before decoding
    fn decode(data: &EmbeddedData) -> Result<Self, DocumentError> {
        if data.schema() != Self::SCHEMA {
            return Err(DocumentError::SchemaMismatch {
                expected: Self::SCHEMA.to_string(),
                found: data.schema().to_string(),
            });
        }
        Self::from_embedded(data)
    }
}

/// Document kind without a typed payload; everything lives in attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generic;

impl DocumentSchema for Generic {
    const SCHEMA: &'static str = GENERIC_SCHEMA;

    fn to_embedded(&self) -> EmbeddedData {
        EmbeddedData::generic()
    }

    fn from_embedded(_data: &EmbeddedData) -> Result<Self, DocumentError> {
        Ok(Generic)
    }
}
