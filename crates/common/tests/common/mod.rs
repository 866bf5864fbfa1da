//! Shared test utilities for integration tests
#![allow(dead_code)]

use std::time::Duration;

use common::anchor::AnchorConfig;
use common::document::{
    CollaboratorsAccess, Did, Document, DocumentError, DocumentSchema, EmbeddedData,
};
use common::jobs::{OrchestratorConfig, RetryPolicy};
use common::testkit::TestNetwork;

/// Typed payload used by the tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub number: String,
    pub amount: u64,
}

impl DocumentSchema for Invoice {
    const SCHEMA: &'static str = "invoice";

    fn to_embedded(&self) -> EmbeddedData {
        EmbeddedData::new(Self::SCHEMA)
            .with_field("number", self.number.as_bytes().to_vec())
            .with_field("amount", self.amount.to_be_bytes().to_vec())
    }

    fn from_embedded(data: &EmbeddedData) -> Result<Self, DocumentError> {
        let number = String::from_utf8(data.require("number")?.to_vec())
            .map_err(|e| DocumentError::InvalidInput(e.to_string()))?;
        let amount: [u8; 8] = data
            .require("amount")?
            .try_into()
            .map_err(|_| DocumentError::InvalidInput("amount is not a u64".to_string()))?;
        Ok(Self {
            number,
            amount: u64::from_be_bytes(amount),
        })
    }
}

pub fn invoice(amount: u64) -> Invoice {
    Invoice {
        number: "INV-001".to_string(),
        amount,
    }
}

/// Anchoring settings with short timeouts
pub fn fast_anchor_config() -> AnchorConfig {
    AnchorConfig {
        quorum: None,
        peer_timeout: Duration::from_millis(500),
        peer_attempts: 2,
        peer_retry_delay: Duration::from_millis(10),
        round_timeout: Duration::from_secs(3),
        confirmation_polls: 5,
        confirmation_interval: Duration::from_millis(10),
    }
}

pub fn fast_job_config() -> OrchestratorConfig {
    OrchestratorConfig {
        worker_count: 2,
        max_queue_size: 16,
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        },
    }
}

/// Log to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A network with one peer per name
pub fn setup_network(names: &[&str]) -> (TestNetwork, Vec<Did>) {
    setup_network_with(names, fast_anchor_config())
}

pub fn setup_network_with(names: &[&str], anchor: AnchorConfig) -> (TestNetwork, Vec<Did>) {
    init_tracing();
    let mut net = TestNetwork::with_config(anchor, fast_job_config());
    let dids = names
        .iter()
        .map(|name| net.add_peer(*name).unwrap())
        .collect();
    (net, dids)
}

/// First version of an invoice shared by `writers`
pub fn invoice_document(writers: Vec<Did>, amount: u64) -> Document {
    Document::new(
        CollaboratorsAccess::new(Vec::new(), writers),
        Vec::new(),
        invoice(amount).to_embedded(),
    )
    .unwrap()
}
