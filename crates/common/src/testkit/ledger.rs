use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::anchor::{AnchorData, AnchorId, AnchorLedger, LedgerError, TxRef};
use crate::proofs::{hash_node, Hash};

/// In-memory ledger
///
/// Resubmitting the same root for an anchor id returns the original
/// transaction; a different root for a used id is rejected. Failures and
/// confirmation delays can be injected.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    anchors: HashMap<AnchorId, Anchored>,
    submissions: usize,
    fail_next: u32,
    confirmation_delay: u32,
}

#[derive(Debug)]
struct Anchored {
    data: AnchorData,
    tx: TxRef,
    // reads that still report the anchor as missing
    hidden_reads: u32,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions that reached the ledger, repeated ones included
    pub fn submissions(&self) -> usize {
        self.inner.lock().submissions
    }

    /// Make the next `count` submissions fail as unavailable
    pub fn fail_next_submissions(&self, count: u32) {
        self.inner.lock().fail_next = count;
    }

    /// Hide new anchors from the next `reads` lookups
    pub fn set_confirmation_delay(&self, reads: u32) {
        self.inner.lock().confirmation_delay = reads;
    }

    pub fn anchor(&self, anchor_id: &AnchorId) -> Option<AnchorData> {
        self.inner
            .lock()
            .anchors
            .get(anchor_id)
            .map(|anchored| anchored.data.clone())
    }

    /// Record an anchor directly, bypassing submission
    pub fn insert_anchor(&self, anchor_id: AnchorId, document_root: Hash) {
        let tx = tx_ref(&document_root, &anchor_id);
        self.inner.lock().anchors.insert(
            anchor_id,
            Anchored {
                data: AnchorData {
                    document_root,
                    anchored_at: OffsetDateTime::now_utc(),
                },
                tx,
                hidden_reads: 0,
            },
        );
    }
}

fn tx_ref(document_root: &Hash, anchor_id: &AnchorId) -> TxRef {
    TxRef(format!("0x{}", hex::encode(hash_node(document_root, anchor_id.as_bytes()))))
}

#[async_trait]
impl AnchorLedger for MemoryLedger {
    async fn submit(&self, document_root: Hash, anchor_id: AnchorId) -> Result<TxRef, LedgerError> {
        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }
        inner.submissions += 1;

        if let Some(existing) = inner.anchors.get(&anchor_id) {
            if existing.data.document_root == document_root {
                return Ok(existing.tx.clone());
            }
            return Err(LedgerError::Rejected(format!(
                "anchor {} already holds a different root",
                anchor_id
            )));
        }

        let tx = tx_ref(&document_root, &anchor_id);
        let hidden_reads = inner.confirmation_delay;
        inner.anchors.insert(
            anchor_id,
            Anchored {
                data: AnchorData {
                    document_root,
                    anchored_at: OffsetDateTime::now_utc(),
                },
                tx: tx.clone(),
                hidden_reads,
            },
        );
        Ok(tx)
    }

    async fn get_anchor_data(&self, anchor_id: &AnchorId) -> Result<AnchorData, LedgerError> {
        let mut inner = self.inner.lock();
        match inner.anchors.get_mut(anchor_id) {
            Some(anchored) if anchored.hidden_reads > 0 => {
                anchored.hidden_reads -= 1;
                Err(LedgerError::NotFound(*anchor_id))
            }
            Some(anchored) => Ok(anchored.data.clone()),
            None => Err(LedgerError::NotFound(*anchor_id)),
        }
    }
}
