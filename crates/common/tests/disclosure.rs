mod common;

use ::common::document::{
    attribute_field_prefix, record_label, AttrKey, AttributeValue, DocumentStatus,
};
use ::common::proofs::validate_proof;

fn value_path(label: &str) -> String {
    format!("{}.value", attribute_field_prefix(&AttrKey::from_label(label).unwrap()))
}

#[tokio::test]
async fn test_record_proof_checks_against_ledger() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    let (doc, first) = common::invoice_document(dids.clone(), 40)
        .add_record(
            "transfers",
            vec![
                ("id".to_string(), AttributeValue::String("tx-1".to_string())),
                ("amount".to_string(), AttributeValue::Integer(25)),
            ],
        )
        .unwrap();
    let (doc, second) = doc
        .add_record(
            "transfers",
            vec![
                ("id".to_string(), AttributeValue::String("tx-2".to_string())),
                ("amount".to_string(), AttributeValue::Integer(15)),
            ],
        )
        .unwrap();
    assert_eq!((first, second), (0, 1));
    let schema = doc.schema().to_string();
    let version = doc.current_version();

    let alice = net.peer("alice").unwrap();
    let handle = alice.commit(doc).await.unwrap();
    assert_eq!(handle.wait().await, ::common::jobs::JobStatus::Success);

    // bob discloses a single transfer amount to an outside party
    let anchored = net.peer("bob").unwrap().stored(&schema, &version).await.unwrap();
    let field = value_path(&record_label("transfers", 1, "amount"));
    let proof = anchored.create_proofs(&[field.as_str()]).unwrap().remove(0);
    assert_eq!(proof.value, AttributeValue::Integer(15).encode());

    // the outside party only trusts the ledger
    let root = net.ledger().anchor(&version).unwrap().document_root;
    assert!(validate_proof(&root, &proof));

    let mut forged = proof.clone();
    forged.value = AttributeValue::Integer(1500).encode();
    assert!(!validate_proof(&root, &forged));

    net.shutdown().await;
}

#[tokio::test]
async fn test_deleted_record_keeps_earlier_proofs() {
    let (mut net, dids) = common::setup_network(&["alice", "bob"]);
    let (doc, _) = common::invoice_document(dids.clone(), 40)
        .add_record(
            "transfers",
            vec![("amount".to_string(), AttributeValue::Integer(25))],
        )
        .unwrap();
    let schema = doc.schema().to_string();
    let v1 = doc.current_version();

    let alice = net.peer("alice").unwrap();
    assert_eq!(
        alice.commit(doc).await.unwrap().wait().await,
        ::common::jobs::JobStatus::Success
    );
    let anchored_v1 = alice.stored(&schema, &v1).await.unwrap();
    let field = value_path(&record_label("transfers", 0, "amount"));
    let old_proof = anchored_v1.create_proofs(&[field.as_str()]).unwrap().remove(0);

    // drop the record in the next version and append a new one
    let next = anchored_v1
        .prepare_next_version(None, None)
        .unwrap()
        .delete_record("transfers", 0)
        .unwrap();
    let (next, index) = next
        .add_record(
            "transfers",
            vec![("amount".to_string(), AttributeValue::Integer(30))],
        )
        .unwrap();
    assert_eq!(index, 1);
    let v2 = next.current_version();

    assert_eq!(
        alice.commit(next).await.unwrap().wait().await,
        ::common::jobs::JobStatus::Success
    );
    let anchored_v2 = alice.stored(&schema, &v2).await.unwrap();
    assert_eq!(anchored_v2.status(), DocumentStatus::Committed);
    assert!(anchored_v2.create_proofs(&[field.as_str()]).is_err());

    // the first anchor still backs the old disclosure
    let root_v1 = net.ledger().anchor(&v1).unwrap().document_root;
    let root_v2 = net.ledger().anchor(&v2).unwrap().document_root;
    assert!(validate_proof(&root_v1, &old_proof));
    assert!(!validate_proof(&root_v2, &old_proof));

    net.shutdown().await;
}
