use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::peer::TestPeer;
use super::{MemoryIdentityService, MemoryLedger, MemoryTransport, PeerBehavior};
use crate::anchor::AnchorConfig;
use crate::document::Did;
use crate::jobs::OrchestratorConfig;

/// A set of collaborators sharing one ledger, identity registry and
/// transport
pub struct TestNetwork {
    /// All peers in the network, indexed by name
    peers: HashMap<String, TestPeer>,
    ledger: MemoryLedger,
    identities: MemoryIdentityService,
    transport: MemoryTransport,
    anchor: AnchorConfig,
    jobs: OrchestratorConfig,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::with_config(AnchorConfig::default(), OrchestratorConfig::default())
    }

    /// Settings used by every peer added afterwards
    pub fn with_config(anchor: AnchorConfig, jobs: OrchestratorConfig) -> Self {
        Self {
            peers: HashMap::new(),
            ledger: MemoryLedger::new(),
            identities: MemoryIdentityService::new(),
            transport: MemoryTransport::new(),
            anchor,
            jobs,
        }
    }

    /// Add a new peer to the network
    ///
    /// # Arguments
    /// * `name` - Unique name for this peer
    pub fn add_peer(&mut self, name: impl Into<String>) -> Result<Did> {
        let name = name.into();
        if self.peers.contains_key(&name) {
            return Err(anyhow!("Peer '{}' already exists", name));
        }

        let peer = TestPeer::new(
            name.clone(),
            None,
            self.anchor.clone(),
            self.jobs.clone(),
            &self.ledger,
            &self.identities,
            &self.transport,
        );
        let did = peer.did();
        self.peers.insert(name, peer);
        Ok(did)
    }

    pub fn peer(&self, name: &str) -> Result<&TestPeer> {
        self.peers
            .get(name)
            .ok_or_else(|| anyhow!("Peer '{}' not found", name))
    }

    pub fn did(&self, name: &str) -> Result<Did> {
        Ok(self.peer(name)?.did())
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn set_behavior(&self, name: &str, behavior: PeerBehavior) -> Result<()> {
        let did = self.did(name)?;
        self.transport.set_behavior(&did, behavior);
        Ok(())
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn identities(&self) -> &MemoryIdentityService {
        &self.identities
    }

    pub fn transport(&self) -> &MemoryTransport {
        &self.transport
    }

    /// Stop the job workers of every peer
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down test network with {} peers", self.peers.len());
        for (name, peer) in self.peers.iter() {
            tracing::debug!("Stopping peer: {}", name);
            peer.stop().await;
        }
        self.peers.clear();
    }
}
