//! Composable checks run on document versions before they are signed,
//! anchored or accepted from a peer
//!
//! Validators report every problem they find rather than stopping at the
//! first one; a [`ValidatorGroup`] concatenates the reports of its members.

use super::{AnchorError, AnchorLedger, LedgerError};
use crate::document::Document;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

pub trait Validator: Send + Sync {
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<(), ValidationError>;
}

/// Adapts a closure returning the list of problems found
pub struct ValidatorFn<F>(pub F);

impl<F> Validator for ValidatorFn<F>
where
    F: Fn(Option<&Document>, &Document) -> Vec<String> + Send + Sync,
{
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<(), ValidationError> {
        let errors = (self.0)(old, new);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}

#[derive(Default)]
pub struct ValidatorGroup {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

impl Validator for ValidatorGroup {
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<(), ValidationError> {
        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v.validate(old, new).err())
            .flat_map(|e| e.errors)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}

/// Structural sanity of a single version
pub fn base_validator() -> impl Validator {
    ValidatorFn(|_: Option<&Document>, doc: &Document| {
        let mut errors = Vec::new();
        match doc.next_version() {
            None => errors.push("next version not set".to_string()),
            Some(next) if next == doc.current_version() || next == doc.identifier() => {
                errors.push("next version repeats a known version".to_string())
            }
            Some(_) => {}
        }
        if doc.previous_version() == Some(doc.current_version()) {
            errors.push("previous version equals current version".to_string());
        }
        if doc.previous_version().is_none() && doc.identifier() != doc.current_version() {
            errors.push("first version must use the identifier as version".to_string());
        }
        if doc.collaborators().read_write().is_empty() {
            errors.push("no read-write collaborators".to_string());
        }
        errors
    })
}

/// Version chaining between an old version and its successor
pub fn version_ids_validator() -> impl Validator {
    ValidatorFn(|old: Option<&Document>, new: &Document| {
        let Some(old) = old else {
            return vec!["previous version required".to_string()];
        };
        let mut errors = Vec::new();
        if new.identifier() != old.identifier() {
            errors.push("identifier changed between versions".to_string());
        }
        if new.previous_version() != Some(old.current_version()) {
            errors.push("previous version does not point at the old version".to_string());
        }
        if Some(new.current_version()) != old.next_version() {
            errors.push("current version is not the announced next version".to_string());
        }
        if new.next_version() == old.next_version() || new.next_version() == Some(old.current_version()) {
            errors.push("next version reuses an old version".to_string());
        }
        errors
    })
}

/// The recorded signing root matches the content
pub fn signing_root_validator() -> impl Validator {
    ValidatorFn(|_: Option<&Document>, doc: &Document| {
        match (doc.signing_root(), doc.calculate_signing_root()) {
            (None, _) => vec!["signing root not computed".to_string()],
            (Some(_), Err(e)) => vec![format!("signing root not computable: {}", e)],
            (Some(recorded), Ok(calculated)) if recorded != calculated => {
                vec!["signing root does not match content".to_string()]
            }
            _ => Vec::new(),
        }
    })
}

/// Author signed, every signer is a writer and every signature verifies
pub fn signatures_validator() -> impl Validator {
    ValidatorFn(|_: Option<&Document>, doc: &Document| {
        let mut errors = Vec::new();
        let Some(signing_root) = doc.signing_root() else {
            return vec!["signing root not computed".to_string()];
        };
        if doc.signatures().is_empty() {
            errors.push("no signatures".to_string());
        }
        match doc.author() {
            None => errors.push("author not set".to_string()),
            Some(author) if !doc.signatures().iter().any(|s| s.signer == author) => {
                errors.push(format!("author {} did not sign", author))
            }
            Some(_) => {}
        }
        for signature in doc.signatures() {
            if !doc.collaborators().can_write(&signature.signer) {
                errors.push(format!("signer {} is not a read-write collaborator", signature.signer));
            }
            if !signature.verify(&signing_root) {
                errors.push(format!("signature of {} does not verify", signature.signer));
            }
        }
        errors
    })
}

/// The recorded document root matches the signing root and signatures
pub fn document_root_validator() -> impl Validator {
    ValidatorFn(|_: Option<&Document>, doc: &Document| {
        match (doc.document_root(), doc.calculate_document_root()) {
            (None, _) => vec!["document root not computed".to_string()],
            (Some(_), Err(e)) => vec![format!("document root not computable: {}", e)],
            (Some(recorded), Ok(calculated)) if recorded != calculated => {
                vec!["document root does not match content".to_string()]
            }
            _ => Vec::new(),
        }
    })
}

/// Checks for a version about to be anchored for the first time
pub fn create_version_validator() -> ValidatorGroup {
    ValidatorGroup::new().with(base_validator())
}

/// Checks for a version succeeding a stored one
pub fn update_version_validator() -> ValidatorGroup {
    ValidatorGroup::new()
        .with(base_validator())
        .with(version_ids_validator())
}

/// Checks a peer runs before signing a requested version
pub fn signature_request_validator() -> ValidatorGroup {
    ValidatorGroup::new()
        .with(base_validator())
        .with(signing_root_validator())
}

/// Checks on a version received after anchoring, minus the ledger lookup
pub fn post_anchor_validator() -> ValidatorGroup {
    ValidatorGroup::new()
        .with(base_validator())
        .with(signing_root_validator())
        .with(signatures_validator())
        .with(document_root_validator())
}

/// Confirm the ledger holds this version's document root
pub async fn validate_anchored(ledger: &dyn AnchorLedger, doc: &Document) -> Result<(), AnchorError> {
    let document_root = doc
        .document_root()
        .ok_or_else(|| AnchorError::InvalidDocument("document root not computed".to_string()))?;
    let anchor_id = doc.current_version();
    match ledger.get_anchor_data(&anchor_id).await {
        Ok(data) if data.document_root == document_root => Ok(()),
        Ok(_) => Err(AnchorError::InvalidDocument(format!(
            "anchor {} holds a different document root",
            anchor_id
        ))),
        Err(LedgerError::NotFound(_)) => Err(AnchorError::InvalidDocument(format!(
            "version {} is not anchored",
            anchor_id
        ))),
        Err(LedgerError::Unavailable(e)) => Err(AnchorError::AnchorSubmissionFailed(e)),
        Err(LedgerError::Rejected(e)) => Err(AnchorError::LedgerRejected(e)),
    }
}
