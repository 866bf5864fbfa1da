use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::rules::{rules_fingerprint, CORE_PREFIX, DEFAULT_RULE_FIELDS};
use super::{
    AttrKey, Attribute, AttributeType, CollaboratorsAccess, Did, DocumentError, DocumentSchema,
    DocumentSignature, EmbeddedData, FieldMatchType, Nft, Role, RoleKey, RuleKey,
    TransitionAction, TransitionRule, VersionId,
};
use crate::proofs::{Hash, Salt};

/// Local commit status of a document version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Being authored, may still change
    Pending,
    /// Handed to the anchoring job
    Committing,
    /// Anchored on the ledger, immutable
    Committed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Committing => write!(f, "committing"),
            DocumentStatus::Committed => write!(f, "committed"),
        }
    }
}

/// A single version of a collaboratively authored document
///
/// Content operations (`add_*`, `delete_*`, `set_*` and version preparation)
/// never mutate in place: they return a new `Document`, so readers holding a
/// prior value are unaffected. Every content change clears the computed roots
/// and collected signatures since those commit to the old content.
///
/// The protocol specific state (roots, signatures, status) is advanced through
/// the `&mut self` methods by whoever owns the version until it is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub(super) identifier: VersionId,
    pub(super) current_version: VersionId,
    pub(super) previous_version: Option<VersionId>,
    pub(super) next_version: Option<VersionId>,
    pub(super) collaborators: CollaboratorsAccess,
    pub(super) roles: Vec<Role>,
    pub(super) transition_rules: Vec<TransitionRule>,
    pub(super) attributes: BTreeMap<AttrKey, Attribute>,
    pub(super) embedded: EmbeddedData,
    pub(super) author: Option<Did>,
    pub(super) timestamp: Option<OffsetDateTime>,
    pub(super) nfts: Vec<Nft>,
    pub(super) data_root: Option<Hash>,
    pub(super) signing_root: Option<Hash>,
    pub(super) document_root: Option<Hash>,
    pub(super) signatures: Vec<DocumentSignature>,
    pub(super) status: DocumentStatus,
    pub(super) salts: BTreeMap<String, Salt>,
}

impl Document {
    /// Create the first version of a new document.
    ///
    /// The identifier doubles as the current version. When read-write
    /// collaborators are given they receive a default role allowed to edit the
    /// whole core metadata and the schema's data fields.
    pub fn new(
        collaborators: CollaboratorsAccess,
        attributes: Vec<Attribute>,
        embedded: EmbeddedData,
    ) -> Result<Self, DocumentError> {
        let mut map = BTreeMap::new();
        for attr in attributes {
            let label = attr.label.clone();
            if map.insert(attr.key, attr).is_some() {
                return Err(DocumentError::InvalidInput(format!(
                    "duplicate attribute key for label {}",
                    label
                )));
            }
        }

        let identifier = VersionId::random();
        let mut document = Self {
            identifier,
            current_version: identifier,
            previous_version: None,
            next_version: Some(VersionId::random()),
            collaborators: CollaboratorsAccess::default(),
            roles: Vec::new(),
            transition_rules: Vec::new(),
            attributes: map,
            embedded,
            author: None,
            timestamp: None,
            nfts: Vec::new(),
            data_root: None,
            signing_root: None,
            document_root: None,
            signatures: Vec::new(),
            status: DocumentStatus::Pending,
            salts: BTreeMap::new(),
        };
        document.grant_collaborators(collaborators);
        document.fill_salts();

        tracing::debug!(
            "new document {} with {} collaborators",
            document.identifier,
            document.collaborators.all().len()
        );
        Ok(document)
    }

    /// Derive the next version of this document.
    ///
    /// Collaborators and attributes are carried forward and merged with the
    /// optional overrides. The new version gets fresh salts and a fresh next
    /// version id, and starts without roots or signatures.
    pub fn prepare_next_version(
        &self,
        collaborators: Option<CollaboratorsAccess>,
        attributes: Option<Vec<Attribute>>,
    ) -> Result<Document, DocumentError> {
        let next_version = self.next_version.ok_or(DocumentError::StaleVersion)?;

        let mut next = self.clone();
        next.previous_version = Some(self.current_version);
        next.current_version = next_version;
        next.next_version = Some(VersionId::random());
        next.status = DocumentStatus::Pending;
        next.salts.clear();
        if let Some(collaborators) = collaborators {
            next.grant_collaborators(collaborators);
        }
        for attr in attributes.unwrap_or_default() {
            next.attributes.insert(attr.key, attr);
        }

        tracing::debug!(
            "prepared version {} of document {}",
            next.current_version,
            next.identifier
        );
        Ok(next.touched())
    }

    /// Merge collaborators in, giving newly added writers a default role
    fn grant_collaborators(&mut self, collaborators: CollaboratorsAccess) {
        let new_writers: Vec<Did> = collaborators
            .read_write()
            .iter()
            .filter(|did| !self.collaborators.can_write(did))
            .copied()
            .collect();
        self.collaborators = self.collaborators.merge(&collaborators);

        if new_writers.is_empty() {
            return;
        }

        let role = Role::random(new_writers);
        let data_prefix = self.embedded.prefix();
        self.transition_rules.push(TransitionRule::new(
            role.key,
            FieldMatchType::Prefix,
            CORE_PREFIX,
            TransitionAction::Edit,
        ));
        self.transition_rules.push(TransitionRule::new(
            role.key,
            FieldMatchType::Prefix,
            data_prefix,
            TransitionAction::Edit,
        ));
        self.roles.push(role);
    }

    /// Copy for a content change, refused once committed
    pub(super) fn mutable_copy(&self) -> Result<Document, DocumentError> {
        self.ensure_mutable()?;
        Ok(self.clone())
    }

    fn ensure_mutable(&self) -> Result<(), DocumentError> {
        match self.status {
            DocumentStatus::Committed => Err(DocumentError::Committed),
            _ => Ok(()),
        }
    }

    /// Drop everything that committed to the previous content
    pub(super) fn touched(mut self) -> Self {
        self.data_root = None;
        self.signing_root = None;
        self.document_root = None;
        self.signatures.clear();
        self.fill_salts();
        self
    }

    pub fn identifier(&self) -> VersionId {
        self.identifier
    }

    pub fn current_version(&self) -> VersionId {
        self.current_version
    }

    pub fn previous_version(&self) -> Option<VersionId> {
        self.previous_version
    }

    pub fn next_version(&self) -> Option<VersionId> {
        self.next_version
    }

    pub fn collaborators(&self) -> &CollaboratorsAccess {
        &self.collaborators
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn transition_rules(&self) -> &[TransitionRule] {
        &self.transition_rules
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn embedded(&self) -> &EmbeddedData {
        &self.embedded
    }

    pub fn schema(&self) -> &str {
        self.embedded.schema()
    }

    /// Decode the typed payload of the document
    pub fn decode<S: DocumentSchema>(&self) -> Result<S, DocumentError> {
        S::decode(&self.embedded)
    }

    pub fn author(&self) -> Option<Did> {
        self.author
    }

    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        self.timestamp
    }

    pub fn nfts(&self) -> &[Nft] {
        &self.nfts
    }

    pub fn data_root(&self) -> Option<Hash> {
        self.data_root
    }

    pub fn signing_root(&self) -> Option<Hash> {
        self.signing_root
    }

    pub fn document_root(&self) -> Option<Hash> {
        self.document_root
    }

    pub fn signatures(&self) -> &[DocumentSignature] {
        &self.signatures
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Whether the participant is listed as a collaborator at all
    pub fn account_can_read(&self, did: &Did) -> bool {
        self.collaborators.contains(did)
    }

    pub fn is_collaborator(&self, did: &Did) -> bool {
        self.collaborators.contains(did)
    }

    /// Read-write collaborators that must sign, excluding `except`
    pub fn signer_collaborators(&self, except: &Did) -> Vec<Did> {
        self.collaborators
            .read_write()
            .iter()
            .filter(|did| *did != except)
            .copied()
            .collect()
    }

    /// Replace the typed payload. The schema of a document never changes.
    pub fn with_embedded(&self, embedded: EmbeddedData) -> Result<Document, DocumentError> {
        if embedded.schema() != self.embedded.schema() {
            return Err(DocumentError::SchemaMismatch {
                expected: self.embedded.schema().to_string(),
                found: embedded.schema().to_string(),
            });
        }
        let mut next = self.mutable_copy()?;
        next.embedded = embedded;
        Ok(next.touched())
    }

    // roles and transition rules

    /// Add a role, returning the new document and the derived role key
    pub fn add_role(&self, key: &str, collaborators: Vec<Did>) -> Result<(Document, RoleKey), DocumentError> {
        if collaborators.is_empty() {
            return Err(DocumentError::EmptyCollaborators);
        }
        let key = RoleKey::derive(key)?;
        if self.roles.iter().any(|role| role.key == key) {
            return Err(DocumentError::RoleExists(key));
        }

        let mut next = self.mutable_copy()?;
        next.roles.push(Role::new(key, collaborators));
        Ok((next.touched(), key))
    }

    pub fn get_role(&self, key: &RoleKey) -> Result<&Role, DocumentError> {
        self.roles
            .iter()
            .find(|role| &role.key == key)
            .ok_or(DocumentError::RoleNotFound(*key))
    }

    /// Replace the participants of an existing role
    pub fn update_role(&self, key: &RoleKey, collaborators: Vec<Did>) -> Result<Document, DocumentError> {
        if collaborators.is_empty() {
            return Err(DocumentError::EmptyCollaborators);
        }
        self.get_role(key)?;

        let mut next = self.mutable_copy()?;
        if let Some(role) = next.roles.iter_mut().find(|role| &role.key == key) {
            role.collaborators = collaborators;
        }
        Ok(next.touched())
    }

    /// Add a rule for an existing role
    pub fn add_transition_rule(
        &self,
        role: &RoleKey,
        match_type: FieldMatchType,
        field: impl Into<String>,
        action: TransitionAction,
    ) -> Result<(Document, RuleKey), DocumentError> {
        self.get_role(role)?;
        let mut next = self.mutable_copy()?;
        let rule = TransitionRule::new(*role, match_type, field, action);
        let rule_key = rule.rule_key;
        next.transition_rules.push(rule);
        Ok((next.touched(), rule_key))
    }

    /// Allow a role to edit a single attribute.
    ///
    /// The role also receives the default rules over the version fields,
    /// author and timestamp, without which it could not produce a new version.
    pub fn add_transition_rule_for_attribute(
        &self,
        role: &RoleKey,
        key: &AttrKey,
    ) -> Result<(Document, RuleKey), DocumentError> {
        self.get_role(role)?;
        let mut next = self.mutable_copy()?;
        next.add_default_rules(role);
        let rule = TransitionRule::new(
            *role,
            FieldMatchType::Prefix,
            attribute_field_prefix(key),
            TransitionAction::Edit,
        );
        let rule_key = rule.rule_key;
        next.transition_rules.push(rule);
        Ok((next.touched(), rule_key))
    }

    fn add_default_rules(&mut self, role: &RoleKey) {
        for field in DEFAULT_RULE_FIELDS {
            let existing = self.transition_rules.iter_mut().find(|rule| {
                rule.match_type == FieldMatchType::Exact
                    && rule.action == TransitionAction::Edit
                    && rule.field == field
            });
            match existing {
                Some(rule) if rule.roles.contains(role) => {}
                Some(rule) => rule.roles.push(*role),
                None => self.transition_rules.push(TransitionRule::new(
                    *role,
                    FieldMatchType::Exact,
                    field,
                    TransitionAction::Edit,
                )),
            }
        }
    }

    pub fn delete_transition_rule(&self, rule_key: &RuleKey) -> Result<Document, DocumentError> {
        let position = self
            .transition_rules
            .iter()
            .position(|rule| &rule.rule_key == rule_key)
            .ok_or(DocumentError::RuleNotFound(*rule_key))?;

        let mut next = self.mutable_copy()?;
        next.transition_rules.remove(position);
        Ok(next.touched())
    }

    /// Rules that apply to a participant through any of its roles
    pub fn transition_rules_for(&self, did: &Did) -> Vec<TransitionRule> {
        self.transition_rules
            .iter()
            .filter(|rule| {
                rule.roles.iter().any(|key| {
                    self.roles
                        .iter()
                        .any(|role| &role.key == key && role.contains(did))
                })
            })
            .cloned()
            .collect()
    }

    /// Fingerprint of the rule set governing this version
    pub fn rules_fingerprint(&self) -> [u8; 32] {
        rules_fingerprint(&self.transition_rules, &self.roles)
    }

    // attributes

    /// Insert or overwrite attributes
    pub fn add_attributes(&self, attributes: Vec<Attribute>) -> Result<Document, DocumentError> {
        let mut next = self.mutable_copy()?;
        for attr in attributes {
            next.attributes.insert(attr.key, attr);
        }
        Ok(next.touched())
    }

    /// Type checked insert of an attribute given in textual form
    pub fn set_attribute(&self, label: &str, attr_type: AttributeType, raw: &str) -> Result<Document, DocumentError> {
        let attr = Attribute::parse(label, attr_type, raw)?;
        self.add_attributes(vec![attr])
    }

    pub fn get_attribute(&self, key: &AttrKey) -> Result<&Attribute, DocumentError> {
        self.attributes
            .get(key)
            .ok_or(DocumentError::AttributeNotFound(*key))
    }

    pub fn attribute_exists(&self, key: &AttrKey) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn delete_attribute(&self, key: &AttrKey) -> Result<Document, DocumentError> {
        if !self.attribute_exists(key) {
            return Err(DocumentError::AttributeNotFound(*key));
        }
        let mut next = self.mutable_copy()?;
        next.attributes.remove(key);
        Ok(next.touched())
    }

    pub fn add_nft(&self, nft: Nft) -> Result<Document, DocumentError> {
        let mut next = self.mutable_copy()?;
        next.nfts.push(nft);
        Ok(next.touched())
    }

    /// Record who authored this version and when
    pub fn add_update_log(&self, author: Did, timestamp: OffsetDateTime) -> Result<Document, DocumentError> {
        let mut next = self.mutable_copy()?;
        next.author = Some(author);
        next.timestamp = Some(timestamp);
        Ok(next.touched())
    }

    // protocol state

    /// Move the local commit status forward. A committed document stays committed.
    pub fn set_status(&mut self, status: DocumentStatus) -> Result<(), DocumentError> {
        if self.status == DocumentStatus::Committed && status != DocumentStatus::Committed {
            return Err(DocumentError::StatusTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        Ok(())
    }

    /// Add collected signatures over the current signing root.
    ///
    /// Signatures are kept sorted by signer so every node derives the same
    /// signatures tree; a repeated `(signer, key)` pair replaces the old entry.
    pub fn append_signatures(&mut self, signatures: Vec<DocumentSignature>) -> Result<(), DocumentError> {
        self.ensure_mutable()?;
        if self.signing_root.is_none() {
            return Err(DocumentError::InvalidDocument(
                "signing root not computed".to_string(),
            ));
        }

        for signature in signatures {
            self.signatures.retain(|existing| {
                existing.signer != signature.signer || existing.public_key != signature.public_key
            });
            self.signatures.push(signature);
        }
        self.signatures
            .sort_by(|a, b| (a.signer, a.public_key).cmp(&(b.signer, b.public_key)));
        self.document_root = None;
        self.fill_salts();
        Ok(())
    }

    /// Serialize to the storage blob format
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        bincode::serialize(self).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        bincode::deserialize(bytes).map_err(|e| DocumentError::Serialization(e.to_string()))
    }
}

/// Path prefix of every leaf of an attribute
pub fn attribute_field_prefix(key: &AttrKey) -> String {
    format!("{}attributes[{}]", CORE_PREFIX, key.to_hex())
}
