mod common;

use ::common::anchor::{AnchorService, AnchorState};
use ::common::document::{DocumentSchema, DocumentStatus};
use ::common::jobs::{JobStatus, TaskStatus};
use ::common::proofs::validate_proof;
use ::common::testkit::PeerBehavior;
use ::common::transition::TransitionError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_three_party_anchoring() {
    let (mut net, dids) = common::setup_network(&["alice", "bob", "carol"]);
    let doc = common::invoice_document(dids.clone(), 100);
    let schema = doc.schema().to_string();
    let version = doc.current_version();

    let alice = net.peer("alice").unwrap();
    let handle = alice.commit(doc).await.unwrap();
    let job_id = handle.id();
    assert_eq!(handle.wait().await, JobStatus::Success);

    let job = alice.service().jobs().status(&dids[0], &job_id).await.unwrap();
    assert!(job.tasks.iter().all(|t| t.status == TaskStatus::Success));
    assert!(job.values.contains_key("tx_ref"));

    // every collaborator holds the same committed version
    let anchored = alice.stored(&schema, &version).await.unwrap();
    assert_eq!(anchored.status(), DocumentStatus::Committed);
    assert_eq!(anchored.signatures().len(), 3);
    let root = anchored.document_root().unwrap();
    assert_eq!(net.ledger().anchor(&version).unwrap().document_root, root);

    for name in ["bob", "carol"] {
        let copy = net.peer(name).unwrap().stored(&schema, &version).await.unwrap();
        assert_eq!(copy.status(), DocumentStatus::Committed);
        assert_eq!(copy.document_root(), Some(root));
        assert_eq!(copy.decode::<common::Invoice>().unwrap(), common::invoice(100));
    }

    // a field proof from bob's copy checks out against the ledger
    let copy = net.peer("bob").unwrap().stored(&schema, &version).await.unwrap();
    let proof = copy.create_proofs(&["invoice.amount"]).unwrap().remove(0);
    assert_eq!(proof.value, 100u64.to_be_bytes().to_vec());
    assert!(validate_proof(&root, &proof));

    net.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_commits_share_one_job() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    // hold confirmation back so the first job is still running
    net.ledger().set_confirmation_delay(3);
    let doc = common::invoice_document(dids, 5);

    let alice = net.peer("alice").unwrap();
    let service = alice.service();
    let (first, second) = tokio::join!(
        service.commit(doc.clone(), CancellationToken::new()),
        service.commit(doc.clone(), CancellationToken::new())
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.id(), second.id());
    assert!(first.deduplicated() != second.deduplicated());
    assert_eq!(AnchorService::dedupe_key(&doc), format!("anchor:{}", doc.current_version().to_hex()));

    assert_eq!(first.wait().await, JobStatus::Success);
    assert_eq!(second.wait().await, JobStatus::Success);
    assert_eq!(net.ledger().submissions(), 1);

    net.shutdown().await;
}

#[tokio::test]
async fn test_transient_ledger_failure_is_retried() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    net.ledger().fail_next_submissions(2);
    let doc = common::invoice_document(dids.clone(), 7);

    let alice = net.peer("alice").unwrap();
    let handle = alice.commit(doc).await.unwrap();
    let job_id = handle.id();
    assert_eq!(handle.wait().await, JobStatus::Success);

    let job = alice.service().jobs().status(&dids[0], &job_id).await.unwrap();
    assert_eq!(job.task("submit transaction").unwrap().attempts, 3);
    assert_eq!(net.ledger().submissions(), 1);

    net.shutdown().await;
}

#[tokio::test]
async fn test_quorum_tolerates_unresponsive_peer() {
    let anchor = ::common::anchor::AnchorConfig {
        quorum: Some(2),
        ..common::fast_anchor_config()
    };
    let (mut net, dids) = common::setup_network_with(&["alice", "bob", "carol"], anchor);
    net.set_behavior("carol", PeerBehavior::Unresponsive).unwrap();
    let doc = common::invoice_document(dids, 9);
    let schema = doc.schema().to_string();
    let version = doc.current_version();

    let alice = net.peer("alice").unwrap();
    assert_eq!(alice.commit(doc).await.unwrap().wait().await, JobStatus::Success);

    let anchored = alice.stored(&schema, &version).await.unwrap();
    assert_eq!(anchored.signatures().len(), 2);
    assert!(net.ledger().anchor(&version).is_some());

    net.shutdown().await;
}

#[tokio::test]
async fn test_missing_signature_fails_job() {
    let (mut net, dids) = common::setup_network(&["alice", "bob", "carol"]);
    net.set_behavior("carol", PeerBehavior::Offline).unwrap();
    let doc = common::invoice_document(dids.clone(), 11);
    let version = doc.current_version();

    let alice = net.peer("alice").unwrap();
    let handle = alice.commit(doc).await.unwrap();
    let job_id = handle.id();
    assert_eq!(handle.wait().await, JobStatus::Failed);

    let job = alice.service().jobs().status(&dids[0], &job_id).await.unwrap();
    assert_eq!(job.task("collect signatures").unwrap().status, TaskStatus::Failed);
    // rejected rounds are not retried
    assert_eq!(job.task("collect signatures").unwrap().attempts, 1);
    assert!(job.last_error.unwrap().contains("2 of 3"));
    assert_eq!(net.ledger().submissions(), 0);
    assert!(net.ledger().anchor(&version).is_none());

    net.shutdown().await;
}

#[tokio::test]
async fn test_second_version_is_transition_validated() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    let first = common::invoice_document(dids.clone(), 100);
    let schema = first.schema().to_string();

    let alice = net.peer("alice").unwrap();
    assert_eq!(alice.commit(first.clone()).await.unwrap().wait().await, JobStatus::Success);

    // bob continues from his copy of the anchored version
    let bob = net.peer("bob").unwrap();
    let stored = bob.stored(&schema, &first.current_version()).await.unwrap();
    let second = stored
        .prepare_next_version(None, None)
        .unwrap()
        .with_embedded(common::invoice(150).to_embedded())
        .unwrap();
    let version = second.current_version();
    assert_eq!(bob.commit(second).await.unwrap().wait().await, JobStatus::Success);

    let anchored = alice.stored(&schema, &version).await.unwrap();
    assert_eq!(anchored.previous_version(), Some(first.current_version()));
    assert_eq!(anchored.author(), Some(dids[1]));
    let alice_signature = anchored
        .signatures()
        .iter()
        .find(|s| s.signer == dids[0])
        .unwrap();
    assert!(alice_signature.transition_validated);
    assert_eq!(anchored.decode::<common::Invoice>().unwrap().amount, 150);

    net.shutdown().await;
}

#[tokio::test]
async fn test_restricted_collaborator() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    let (alice_did, bob_did) = (dids[0], dids[1]);

    // bob may only touch the status attribute
    let doc = common::invoice_document(dids.clone(), 100)
        .set_attribute("status", ::common::document::AttributeType::String, "draft")
        .unwrap();
    let default_role = doc.roles()[0].key;
    let doc = doc.update_role(&default_role, vec![alice_did]).unwrap();
    let (doc, editor) = doc.add_role("status-editor", vec![bob_did]).unwrap();
    let status_key = ::common::document::AttrKey::from_label("status").unwrap();
    let (doc, _) = doc.add_transition_rule_for_attribute(&editor, &status_key).unwrap();
    let schema = doc.schema().to_string();

    let alice = net.peer("alice").unwrap();
    assert_eq!(alice.commit(doc.clone()).await.unwrap().wait().await, JobStatus::Success);

    let bob = net.peer("bob").unwrap();
    let stored = bob.stored(&schema, &doc.current_version()).await.unwrap();

    // allowed: the status attribute
    let allowed = stored
        .prepare_next_version(None, None)
        .unwrap()
        .set_attribute("status", ::common::document::AttributeType::String, "sent")
        .unwrap();
    assert_eq!(bob.commit(allowed).await.unwrap().wait().await, JobStatus::Success);

    // denied: the invoice amount
    let denied = stored
        .prepare_next_version(None, None)
        .unwrap()
        .with_embedded(common::invoice(1_000_000).to_embedded())
        .unwrap();
    match bob.commit(denied.clone()).await {
        Err(e) => {
            let e = e.downcast::<::common::anchor::AnchorError>().unwrap();
            match e {
                ::common::anchor::AnchorError::Transition(TransitionError::NotAllowed { fields }) => {
                    assert_eq!(fields, vec!["invoice.amount".to_string()]);
                }
                other => panic!("unexpected error {}", other),
            }
        }
        Ok(_) => panic!("restricted change was accepted"),
    }

    // alice refuses to sign it even when asked directly
    let mut session = ::common::anchor::AnchorSession::new(denied);
    let root = bob.processor().prepare_for_signature_requests(&mut session).unwrap();
    assert_eq!(session.state(), &AnchorState::SigningRootComputed);
    let refused = alice
        .handler()
        .request_document_signature(session.document().clone(), root)
        .await;
    assert!(matches!(
        refused,
        Err(::common::anchor::AnchorError::Transition(TransitionError::NotAllowed { .. }))
    ));

    net.shutdown().await;
}

#[tokio::test]
async fn test_committed_version_cannot_be_recommitted() {
    let (mut net, dids) = common::setup_network(&["alice"]);
    let doc = common::invoice_document(dids, 1);
    let schema = doc.schema().to_string();

    let alice = net.peer("alice").unwrap();
    assert_eq!(alice.commit(doc.clone()).await.unwrap().wait().await, JobStatus::Success);

    let stored = alice.stored(&schema, &doc.current_version()).await.unwrap();
    assert!(alice.commit(stored.clone()).await.is_err());
    // content changes on a committed version are refused too
    assert!(stored.with_embedded(common::invoice(2).to_embedded()).is_err());

    net.shutdown().await;
}
