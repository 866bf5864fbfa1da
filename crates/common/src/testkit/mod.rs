/// In-process doubles and a multi-peer harness for integration tests
///
/// The ledger, identity registry and transport are in-memory stand-ins for
/// the external systems. A [`TestNetwork`] wires any number of
/// [`TestPeer`]s to a shared set of them.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_anchor() -> anyhow::Result<()> {
///     let mut net = TestNetwork::new();
///     let alice = net.add_peer("alice")?;
///     let bob = net.add_peer("bob")?;
///
///     let doc = Document::new(
///         CollaboratorsAccess::new(vec![], vec![alice, bob]),
///         vec![],
///         EmbeddedData::generic(),
///     )?;
///     let status = net.peer("alice")?.commit(doc).await?.wait().await;
///     assert_eq!(status, JobStatus::Success);
///
///     net.shutdown().await;
///     Ok(())
/// }
/// ```
mod identity;
mod ledger;
mod network;
mod peer;
mod transport;

pub use identity::MemoryIdentityService;
pub use ledger::MemoryLedger;
pub use network::TestNetwork;
pub use peer::TestPeer;
pub use transport::{MemoryTransport, PeerBehavior};
