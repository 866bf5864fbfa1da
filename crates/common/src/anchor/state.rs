use serde::{Deserialize, Serialize};

use super::{AnchorError, TxRef};
use crate::document::Document;

/// Progress of a single version through anchoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorState {
    Draft,
    DataRootComputed,
    SigningRootComputed,
    SignaturesRequested,
    SignaturesSatisfied,
    DocumentRootComputed,
    Submitted,
    Anchored,
    Rejected { reason: String },
}

impl AnchorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnchorState::Anchored | AnchorState::Rejected { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            AnchorState::Draft => 0,
            AnchorState::DataRootComputed => 1,
            AnchorState::SigningRootComputed => 2,
            AnchorState::SignaturesRequested => 3,
            AnchorState::SignaturesSatisfied => 4,
            AnchorState::DocumentRootComputed => 5,
            AnchorState::Submitted => 6,
            AnchorState::Anchored => 7,
            AnchorState::Rejected { .. } => u8::MAX,
        }
    }

    /// Whether this state lies past `other` on the happy path
    pub fn is_past(&self, other: &AnchorState) -> bool {
        !matches!(self, AnchorState::Rejected { .. }) && self.rank() > other.rank()
    }
}

impl std::fmt::Display for AnchorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnchorState::Draft => write!(f, "draft"),
            AnchorState::DataRootComputed => write!(f, "data root computed"),
            AnchorState::SigningRootComputed => write!(f, "signing root computed"),
            AnchorState::SignaturesRequested => write!(f, "signatures requested"),
            AnchorState::SignaturesSatisfied => write!(f, "signatures satisfied"),
            AnchorState::DocumentRootComputed => write!(f, "document root computed"),
            AnchorState::Submitted => write!(f, "submitted"),
            AnchorState::Anchored => write!(f, "anchored"),
            AnchorState::Rejected { reason } => write!(f, "rejected: {}", reason),
        }
    }
}

/// A document version together with its anchoring progress
///
/// Owned by whoever drives the protocol; the processor advances it one
/// step at a time and refuses steps taken out of order.
#[derive(Debug, Clone)]
pub struct AnchorSession {
    document: Document,
    state: AnchorState,
    tx: Option<TxRef>,
}

impl AnchorSession {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            state: AnchorState::Draft,
            tx: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> &AnchorState {
        &self.state
    }

    pub fn tx(&self) -> Option<&TxRef> {
        self.tx.as_ref()
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub(super) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub(super) fn replace_document(&mut self, document: Document) {
        self.document = document;
    }

    pub(super) fn set_tx(&mut self, tx: TxRef) {
        self.tx = Some(tx);
    }

    pub(super) fn expect(&self, expected: AnchorState) -> Result<(), AnchorError> {
        if self.state != expected {
            return Err(AnchorError::InvalidState {
                expected,
                found: self.state.clone(),
            });
        }
        Ok(())
    }

    pub(super) fn advance(&mut self, next: AnchorState) {
        tracing::debug!(
            "document {} anchoring: {} -> {}",
            self.document.current_version(),
            self.state,
            next
        );
        self.state = next;
    }

    pub(super) fn reject(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            "document {} anchoring rejected: {}",
            self.document.current_version(),
            reason
        );
        self.state = AnchorState::Rejected { reason };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(AnchorState::Submitted.is_past(&AnchorState::DocumentRootComputed));
        assert!(!AnchorState::Draft.is_past(&AnchorState::Draft));
        let rejected = AnchorState::Rejected {
            reason: "no".to_string(),
        };
        assert!(!rejected.is_past(&AnchorState::Draft));
        assert!(rejected.is_terminal());
        assert!(AnchorState::Anchored.is_terminal());
        assert!(!AnchorState::Submitted.is_terminal());
    }
}
