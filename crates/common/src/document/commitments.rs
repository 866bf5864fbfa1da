//! Flattening of a document into salted leaves, and the roots built on them.
//!
//! Three trees are built per version:
//!
//! - the data tree over the embedded payload, paths `<schema>.<field>`
//! - the core metadata tree over `cd.*` paths
//! - the signatures tree over `signatures[i].*` paths
//!
//! Proofs created here are lifted through the root composition so they
//! validate against the document root alone.

use std::collections::BTreeSet;

use super::model::attribute_field_prefix;
use super::rules::CORE_PREFIX;
use super::{Document, DocumentError};
use crate::proofs::{empty_root, hash_node, new_salt, Hash, Leaf, Proof, Side, Tree};

type Fields = Vec<(String, Vec<u8>)>;

impl Document {
    fn data_fields(&self) -> Fields {
        let prefix = self.embedded.prefix();
        self.embedded
            .fields()
            .map(|(name, value)| (format!("{}{}", prefix, name), value.clone()))
            .collect()
    }

    fn core_fields(&self) -> Fields {
        let cd = |name: &str| format!("{}{}", CORE_PREFIX, name);
        let mut fields = vec![
            (cd("identifier"), self.identifier.as_bytes().to_vec()),
            (cd("current_version"), self.current_version.as_bytes().to_vec()),
        ];
        if let Some(previous) = &self.previous_version {
            fields.push((cd("previous_version"), previous.as_bytes().to_vec()));
        }
        if let Some(next) = &self.next_version {
            fields.push((cd("next_version"), next.as_bytes().to_vec()));
        }

        for (i, did) in self.collaborators.read().iter().enumerate() {
            fields.push((cd(&format!("collaborators.read[{}]", i)), did.as_bytes().to_vec()));
        }
        for (i, did) in self.collaborators.read_write().iter().enumerate() {
            fields.push((
                cd(&format!("collaborators.read_write[{}]", i)),
                did.as_bytes().to_vec(),
            ));
        }

        for role in &self.roles {
            let base = cd(&format!("roles[{}]", role.key.to_hex()));
            fields.push((format!("{}.key", base), role.key.as_bytes().to_vec()));
            for (i, did) in role.collaborators.iter().enumerate() {
                fields.push((format!("{}.collaborators[{}]", base, i), did.as_bytes().to_vec()));
            }
        }

        for rule in &self.transition_rules {
            let base = cd(&format!("transition_rules[{}]", rule.rule_key.to_hex()));
            for (i, role) in rule.roles.iter().enumerate() {
                fields.push((format!("{}.roles[{}]", base, i), role.as_bytes().to_vec()));
            }
            fields.push((format!("{}.match_type", base), rule.match_type.to_string().into_bytes()));
            fields.push((format!("{}.field", base), rule.field.clone().into_bytes()));
            fields.push((format!("{}.action", base), rule.action.to_string().into_bytes()));
        }

        for attr in self.attributes.values() {
            let base = attribute_field_prefix(&attr.key);
            fields.push((format!("{}.label", base), attr.label.clone().into_bytes()));
            fields.push((format!("{}.type", base), attr.attr_type().to_string().into_bytes()));
            fields.push((format!("{}.value", base), attr.value.encode()));
        }

        if let Some(author) = &self.author {
            fields.push((cd("author"), author.as_bytes().to_vec()));
        }
        if let Some(timestamp) = &self.timestamp {
            fields.push((cd("timestamp"), timestamp.unix_timestamp_nanos().to_be_bytes().to_vec()));
        }

        for (i, nft) in self.nfts.iter().enumerate() {
            fields.push((cd(&format!("nfts[{}].registry", i)), nft.registry.to_vec()));
            fields.push((cd(&format!("nfts[{}].token_id", i)), nft.token_id.to_vec()));
        }

        fields
    }

    fn signature_fields(&self) -> Fields {
        let mut fields = Vec::with_capacity(self.signatures.len() * 4);
        for (i, signature) in self.signatures.iter().enumerate() {
            let base = format!("signatures[{}]", i);
            fields.push((format!("{}.signer", base), signature.signer.as_bytes().to_vec()));
            fields.push((
                format!("{}.public_key", base),
                signature.public_key.to_bytes().to_vec(),
            ));
            fields.push((
                format!("{}.signature", base),
                signature.signature.to_bytes().to_vec(),
            ));
            fields.push((
                format!("{}.transition_validated", base),
                vec![u8::from(signature.transition_validated)],
            ));
        }
        fields
    }

    /// Draw salts for new leaves and forget salts of leaves that are gone
    pub(super) fn fill_salts(&mut self) {
        let paths: BTreeSet<String> = self
            .data_fields()
            .into_iter()
            .chain(self.core_fields())
            .chain(self.signature_fields())
            .map(|(path, _)| path)
            .collect();

        self.salts.retain(|path, _| paths.contains(path));
        for path in paths {
            self.salts.entry(path).or_insert_with(new_salt);
        }
    }

    fn salted(&self, fields: Fields) -> Result<Vec<Leaf>, DocumentError> {
        fields
            .into_iter()
            .map(|(path, value)| {
                let salt = self
                    .salts
                    .get(&path)
                    .copied()
                    .ok_or_else(|| DocumentError::InvalidDocument(format!("missing salt for {}", path)))?;
                Ok(Leaf::new(path, value, salt))
            })
            .collect()
    }

    pub fn data_tree(&self) -> Result<Tree, DocumentError> {
        Ok(Tree::build(self.salted(self.data_fields())?)?)
    }

    pub fn core_tree(&self) -> Result<Tree, DocumentError> {
        Ok(Tree::build(self.salted(self.core_fields())?)?)
    }

    pub fn signatures_tree(&self) -> Result<Tree, DocumentError> {
        Ok(Tree::build(self.salted(self.signature_fields())?)?)
    }

    /// Single tree over data and core leaves, compared between versions when
    /// checking transitions
    pub fn transition_tree(&self) -> Result<Tree, DocumentError> {
        let mut fields = self.data_fields();
        fields.extend(self.core_fields());
        Ok(Tree::build(self.salted(fields)?)?)
    }

    pub fn calculate_data_root(&self) -> Result<Hash, DocumentError> {
        Ok(self.data_tree()?.root_hash()?)
    }

    pub fn calculate_signing_root(&self) -> Result<Hash, DocumentError> {
        let core_root = self.core_tree()?.root_hash()?;
        Ok(hash_node(&self.calculate_data_root()?, &core_root))
    }

    pub fn calculate_signatures_root(&self) -> Result<Hash, DocumentError> {
        if self.signatures.is_empty() {
            return Ok(empty_root());
        }
        Ok(self.signatures_tree()?.root_hash()?)
    }

    pub fn calculate_document_root(&self) -> Result<Hash, DocumentError> {
        Ok(hash_node(
            &self.calculate_signing_root()?,
            &self.calculate_signatures_root()?,
        ))
    }

    /// Compute and record the data root
    pub fn compute_data_root(&mut self) -> Result<Hash, DocumentError> {
        let root = self.calculate_data_root()?;
        self.data_root = Some(root);
        Ok(root)
    }

    /// Compute and record the signing root; the data root must be computed first
    pub fn compute_signing_root(&mut self) -> Result<Hash, DocumentError> {
        let data_root = self
            .data_root
            .ok_or_else(|| DocumentError::InvalidDocument("data root not computed".to_string()))?;
        if self.next_version.is_none() {
            return Err(DocumentError::InvalidDocument("next version not set".to_string()));
        }

        let core_root = self.core_tree()?.root_hash()?;
        let root = hash_node(&data_root, &core_root);
        self.signing_root = Some(root);
        Ok(root)
    }

    /// Fold collected signatures into the document root.
    ///
    /// Only checks that some signature is present. Callers gate on quorum
    /// first; the anchoring processor refuses this step until its session
    /// reached [`SignaturesSatisfied`](crate::anchor::AnchorState::SignaturesSatisfied).
    pub fn compute_document_root(&mut self) -> Result<Hash, DocumentError> {
        let signing_root = self
            .signing_root
            .ok_or_else(|| DocumentError::InvalidDocument("signing root not computed".to_string()))?;
        if self.signatures.is_empty() {
            return Err(DocumentError::InvalidDocument("no signatures collected".to_string()));
        }

        let root = hash_node(&signing_root, &self.calculate_signatures_root()?);
        self.document_root = Some(root);
        Ok(root)
    }

    /// Create proofs for the requested fields against the document root
    pub fn create_proofs<S: AsRef<str>>(&self, fields: &[S]) -> Result<Vec<Proof>, DocumentError> {
        let document_root = self
            .document_root
            .ok_or_else(|| DocumentError::InvalidDocument("document root not computed".to_string()))?;

        let data_tree = self.data_tree()?;
        let core_tree = self.core_tree()?;
        let signatures_tree = self.signatures_tree()?;
        let data_root = data_tree.root_hash()?;
        let core_root = core_tree.root_hash()?;
        let signing_root = hash_node(&data_root, &core_root);
        let signatures_root = self.calculate_signatures_root()?;

        if hash_node(&signing_root, &signatures_root) != document_root {
            return Err(DocumentError::InvalidDocument(
                "document changed since the document root was computed".to_string(),
            ));
        }

        fields
            .iter()
            .map(|field| {
                let field = field.as_ref();
                let proof = if data_tree.leaf(field).is_some() {
                    let mut proof = data_tree.create_proofs(&[field])?.remove(0);
                    proof.push_step(core_root, Side::Right);
                    proof.push_step(signatures_root, Side::Right);
                    proof
                } else if core_tree.leaf(field).is_some() {
                    let mut proof = core_tree.create_proofs(&[field])?.remove(0);
                    proof.push_step(data_root, Side::Left);
                    proof.push_step(signatures_root, Side::Right);
                    proof
                } else if signatures_tree.leaf(field).is_some() {
                    let mut proof = signatures_tree.create_proofs(&[field])?.remove(0);
                    proof.push_step(signing_root, Side::Left);
                    proof
                } else {
                    return Err(DocumentError::FieldNotFound(field.to_string()));
                };
                Ok(proof)
            })
            .collect()
    }
}
