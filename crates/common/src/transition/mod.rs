//! # Transition validation
//!
//! Decides whether a collaborator may produce a new version from an old one.
//!
//! The old and new versions are flattened into their transition trees (data
//! and core leaves) and compared leaf by leaf. Each changed path must be
//! covered by the most specific rule that applies to the acting
//! collaborator:
//!
//! - the longest matching field pattern wins, exact beats prefix on a tie
//! - no matching rule means the change is denied
//! - a matching [`TransitionAction::Deny`] rule denies the change
//!
//! A transition is accepted or rejected as a whole, and a rejection names
//! every offending field at once.

use crate::document::{Did, Document, DocumentError, TransitionAction, TransitionRule};
use crate::proofs::Tree;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("transition not allowed for fields: {}", .fields.join(", "))]
    NotAllowed { fields: Vec<String> },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A leaf that was added, removed or changed between two versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedField {
    pub path: String,
    /// `None` when the field was added
    pub old: Option<Vec<u8>>,
    /// `None` when the field was removed
    pub new: Option<Vec<u8>>,
}

/// Compare two trees by path and value; salts are ignored.
///
/// The result is sorted by path.
pub fn changed_fields(old: &Tree, new: &Tree) -> Vec<ChangedField> {
    let old_leaves = old.leaves();
    let new_leaves = new.leaves();
    let (mut i, mut j) = (0, 0);
    let mut changed = Vec::new();

    // both leaf lists are sorted by path, so a merge walk finds every difference
    while i < old_leaves.len() || j < new_leaves.len() {
        match (old_leaves.get(i), new_leaves.get(j)) {
            (Some(o), Some(n)) if o.path == n.path => {
                if o.value != n.value {
                    changed.push(ChangedField {
                        path: o.path.clone(),
                        old: Some(o.value.clone()),
                        new: Some(n.value.clone()),
                    });
                }
                i += 1;
                j += 1;
            }
            (Some(o), Some(n)) if o.path < n.path => {
                changed.push(removed(o.path.clone(), o.value.clone()));
                i += 1;
            }
            (Some(_), Some(n)) => {
                changed.push(added(n.path.clone(), n.value.clone()));
                j += 1;
            }
            (Some(o), None) => {
                changed.push(removed(o.path.clone(), o.value.clone()));
                i += 1;
            }
            (None, Some(n)) => {
                changed.push(added(n.path.clone(), n.value.clone()));
                j += 1;
            }
            (None, None) => break,
        }
    }

    changed
}

fn added(path: String, value: Vec<u8>) -> ChangedField {
    ChangedField {
        path,
        old: None,
        new: Some(value),
    }
}

fn removed(path: String, value: Vec<u8>) -> ChangedField {
    ChangedField {
        path,
        old: Some(value),
        new: None,
    }
}

/// The rule that governs a path: the most specific matching one
pub fn governing_rule<'a>(rules: &'a [TransitionRule], path: &str) -> Option<&'a TransitionRule> {
    rules
        .iter()
        .filter(|rule| rule.matches(path))
        .max_by_key(|rule| rule.specificity())
}

/// Check every changed field against the rules of the acting role(s)
pub fn validate_transitions(
    rules: &[TransitionRule],
    changed: &[ChangedField],
) -> Result<(), TransitionError> {
    let denied: Vec<String> = changed
        .iter()
        .filter(|field| {
            !matches!(
                governing_rule(rules, &field.path).map(|rule| rule.action),
                Some(TransitionAction::Edit)
            )
        })
        .map(|field| field.path.clone())
        .collect();

    if denied.is_empty() {
        return Ok(());
    }

    tracing::debug!("transition denied for {} fields", denied.len());
    Err(TransitionError::NotAllowed { fields: denied })
}

impl Document {
    /// Check that `collaborator` was allowed to turn this version into `new`.
    ///
    /// The rules of this (old) version apply, so a collaborator cannot grant
    /// itself rights in the same version it uses them.
    pub fn collaborator_can_update(&self, new: &Document, collaborator: &Did) -> Result<(), TransitionError> {
        let old_tree = self.transition_tree()?;
        let new_tree = new.transition_tree()?;
        let changed = changed_fields(&old_tree, &new_tree);
        let rules = self.transition_rules_for(collaborator);
        validate_transitions(&rules, &changed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::{
        Attribute, AttributeValue, CollaboratorsAccess, EmbeddedData, FieldMatchType,
        RoleKey,
    };
    use crate::proofs::Leaf;

    fn tree(entries: &[(&str, &[u8])]) -> Tree {
        Tree::build(
            entries
                .iter()
                .map(|(path, value)| Leaf::new(*path, value.to_vec(), crate::proofs::new_salt()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_changed_fields() {
        let old = tree(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let new = tree(&[("a", b"1"), ("b", b"9"), ("d", b"4")]);
        let changed = changed_fields(&old, &new);
        let paths: Vec<&str> = changed.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["b", "c", "d"]);
        assert_eq!(changed[1].new, None);
        assert_eq!(changed[2].old, None);
    }

    #[test]
    fn test_salts_do_not_count_as_changes() {
        let old = tree(&[("a", b"1")]);
        let new = tree(&[("a", b"1")]);
        assert!(changed_fields(&old, &new).is_empty());
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let role = RoleKey::random();
        let rules = vec![
            TransitionRule::new(role, FieldMatchType::Prefix, "invoice.", TransitionAction::Edit),
            TransitionRule::new(role, FieldMatchType::Exact, "invoice.number", TransitionAction::Deny),
        ];
        let field = |path: &str| ChangedField {
            path: path.to_string(),
            old: None,
            new: Some(vec![1]),
        };

        assert!(validate_transitions(&rules, &[field("invoice.amount")]).is_ok());
        match validate_transitions(&rules, &[field("invoice.number"), field("invoice.amount"), field("po.number")]) {
            Err(TransitionError::NotAllowed { fields }) => {
                assert_eq!(fields, vec!["invoice.number".to_string(), "po.number".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_changes_pass_without_rules() {
        assert!(validate_transitions(&[], &[]).is_ok());
    }

    #[test]
    fn test_collaborator_can_update() {
        let alice = Did::random();
        let bob = Did::random();
        let doc = Document::new(
            CollaboratorsAccess::new(vec![bob], vec![alice]),
            vec![Attribute::new("amount", AttributeValue::Integer(1)).unwrap()],
            EmbeddedData::new("invoice").with_field("number", b"1".to_vec()),
        )
        .unwrap();

        let next = doc
            .prepare_next_version(None, None)
            .unwrap()
            .with_embedded(EmbeddedData::new("invoice").with_field("number", b"2".to_vec()))
            .unwrap();

        // alice holds the default role
        doc.collaborator_can_update(&next, &alice).unwrap();
        // bob only reads, so even the version fields are denied
        let err = doc.collaborator_can_update(&next, &bob).unwrap_err();
        match err {
            TransitionError::NotAllowed { fields } => {
                assert!(fields.contains(&"invoice.number".to_string()));
                assert!(fields.contains(&"cd.current_version".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
