use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Role, RoleKey, RuleKey};

/// Path prefix of every core metadata leaf
pub const CORE_PREFIX: &str = "cd.";

/// Fields every role allowed to edit attributes must also be allowed to edit,
/// otherwise it could never produce a new version.
pub const DEFAULT_RULE_FIELDS: [&str; 5] = [
    "cd.current_version",
    "cd.next_version",
    "cd.previous_version",
    "cd.author",
    "cd.timestamp",
];

/// How a rule's field pattern is compared with a changed field path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldMatchType {
    Prefix,
    Exact,
}

/// What a matching rule permits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionAction {
    /// The field may be set, updated or removed
    Edit,
    /// The field is immutable for the role
    Deny,
}

impl std::fmt::Display for FieldMatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldMatchType::Prefix => write!(f, "prefix"),
            FieldMatchType::Exact => write!(f, "exact"),
        }
    }
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionAction::Edit => write!(f, "edit"),
            TransitionAction::Deny => write!(f, "deny"),
        }
    }
}

/// Field level permission granted to one or more roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub rule_key: RuleKey,
    pub roles: Vec<RoleKey>,
    pub match_type: FieldMatchType,
    pub field: String,
    pub action: TransitionAction,
}

impl TransitionRule {
    pub fn new(
        role: RoleKey,
        match_type: FieldMatchType,
        field: impl Into<String>,
        action: TransitionAction,
    ) -> Self {
        Self {
            rule_key: RuleKey::random(),
            roles: vec![role],
            match_type,
            field: field.into(),
            action,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.match_type {
            FieldMatchType::Exact => path == self.field,
            FieldMatchType::Prefix => path.starts_with(&self.field),
        }
    }

    /// Ordering key used to pick the most specific matching rule.
    ///
    /// Longer patterns win; on equal length an exact rule beats a prefix rule.
    pub fn specificity(&self) -> (usize, bool) {
        (self.field.len(), self.match_type == FieldMatchType::Exact)
    }
}

/// Fingerprint of an ordered rule set and the roles it references.
///
/// External auditors use the fingerprint to prove which rules governed a
/// transition without carrying the whole rule table. Referenced roles are
/// hashed in key order with their collaborators sorted, so the fingerprint
/// does not depend on how the role list happens to be ordered.
pub fn rules_fingerprint(rules: &[TransitionRule], roles: &[Role]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    let mut referenced: Vec<&RoleKey> = Vec::new();

    hasher.update((rules.len() as u64).to_be_bytes());
    for rule in rules {
        hasher.update(rule.rule_key.as_bytes());
        hasher.update((rule.roles.len() as u64).to_be_bytes());
        for role in &rule.roles {
            hasher.update(role.as_bytes());
            if !referenced.contains(&role) {
                referenced.push(role);
            }
        }
        hasher.update([match rule.match_type {
            FieldMatchType::Prefix => 0u8,
            FieldMatchType::Exact => 1u8,
        }]);
        hasher.update((rule.field.len() as u64).to_be_bytes());
        hasher.update(rule.field.as_bytes());
        hasher.update([match rule.action {
            TransitionAction::Edit => 0u8,
            TransitionAction::Deny => 1u8,
        }]);
    }

    referenced.sort();
    for key in referenced {
        hasher.update(key.as_bytes());
        let mut collaborators = roles
            .iter()
            .find(|role| &role.key == key)
            .map(|role| role.collaborators.clone())
            .unwrap_or_default();
        collaborators.sort();
        hasher.update((collaborators.len() as u64).to_be_bytes());
        for did in collaborators {
            hasher.update(did.as_bytes());
        }
    }

    hasher.finalize().into()
}
