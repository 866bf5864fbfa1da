//! Indexed record sets stored as attributes.
//!
//! A logical list such as "transfer details" lives under labels
//! `prefix[i].field`, and the attribute labelled `prefix` holds the latest
//! index handed out. Deleting a record leaves a hole: indices are never
//! reused or compacted, so a proof over `prefix[3].amount` anchored in an
//! earlier version keeps pointing at the same record.

use super::{AttrKey, Attribute, AttributeValue, Document, DocumentError};

/// Label of a single field of a record
pub fn record_label(prefix: &str, index: u64, field: &str) -> String {
    format!("{}[{}].{}", prefix, index, field)
}

fn record_label_prefix(prefix: &str, index: u64) -> String {
    format!("{}[{}].", prefix, index)
}

/// Index of `label` if it names `field` of a record in `prefix`
fn parse_record_label(label: &str, prefix: &str, field: &str) -> Option<u64> {
    let index = label
        .strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(field)?
        .strip_suffix("].")?
        .parse()
        .ok()?;
    (record_label(prefix, index, field) == label).then_some(index)
}

impl Document {
    /// Latest index of a record set, `None` if the set was never written
    pub fn latest_record_index(&self, prefix: &str) -> Result<Option<u64>, DocumentError> {
        let key = AttrKey::from_label(prefix)?;
        let Some(sentinel) = self.attributes.get(&key) else {
            return Ok(None);
        };

        let index = sentinel
            .value
            .as_integer()
            .ok_or_else(|| DocumentError::InvalidRecordIndex(prefix.to_string()))?;
        u64::try_from(index)
            .map(Some)
            .map_err(|_| DocumentError::InvalidRecordIndex(prefix.to_string()))
    }

    /// Append a record to a set, returning the new document and the index used
    pub fn add_record(
        &self,
        prefix: &str,
        fields: Vec<(String, AttributeValue)>,
    ) -> Result<(Document, u64), DocumentError> {
        if fields.is_empty() {
            return Err(DocumentError::InvalidInput("record has no fields".to_string()));
        }

        let index = match self.latest_record_index(prefix)? {
            Some(latest) => latest
                .checked_add(1)
                .ok_or_else(|| DocumentError::InvalidRecordIndex(prefix.to_string()))?,
            None => 0,
        };

        let mut attributes = Vec::with_capacity(fields.len() + 1);
        for (field, value) in fields {
            attributes.push(Attribute::new(record_label(prefix, index, &field), value)?);
        }
        attributes.push(Attribute::new(
            prefix,
            AttributeValue::Integer(i128::from(index)),
        )?);

        tracing::debug!("adding record {}[{}]", prefix, index);
        Ok((self.add_attributes(attributes)?, index))
    }

    /// Read one field of a record
    pub fn record_value(&self, prefix: &str, index: u64, field: &str) -> Result<&Attribute, DocumentError> {
        let key = AttrKey::from_label(&record_label(prefix, index, field))?;
        self.get_attribute(&key)
    }

    /// Find the first record whose `id_field` equals `value`.
    ///
    /// Only looks at stored attributes, so deleted records and a huge
    /// latest index cost nothing.
    pub fn find_record_index(
        &self,
        prefix: &str,
        id_field: &str,
        value: &AttributeValue,
    ) -> Result<u64, DocumentError> {
        let not_found = || DocumentError::RecordNotFound(format!("{}.{} = {}", prefix, id_field, value));
        let latest = self.latest_record_index(prefix)?.ok_or_else(not_found)?;

        self.attributes
            .values()
            .filter(|attr| &attr.value == value)
            .filter_map(|attr| parse_record_label(&attr.label, prefix, id_field))
            .filter(|index| *index <= latest)
            .min()
            .ok_or_else(not_found)
    }

    /// Remove every attribute of a record; the index is not reused
    pub fn delete_record(&self, prefix: &str, index: u64) -> Result<Document, DocumentError> {
        let label_prefix = record_label_prefix(prefix, index);
        let keys: Vec<AttrKey> = self
            .attributes
            .values()
            .filter(|attr| attr.label.starts_with(&label_prefix))
            .map(|attr| attr.key)
            .collect();

        if keys.is_empty() {
            return Err(DocumentError::RecordNotFound(format!("{}[{}]", prefix, index)));
        }

        let mut next = self.mutable_copy()?;
        for key in keys {
            next.attributes.remove(&key);
        }
        tracing::debug!("deleted record {}[{}]", prefix, index);
        Ok(next.touched())
    }
}
