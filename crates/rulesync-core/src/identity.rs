//! Entity identity hashing and rule-group naming.
//!
//! An entity is identified by its name plus the values of a fixed
//! [`IdentityLabelSet`]. The [`ServiceHash`] is an xxHash64 digest folded over
//! `(label, value)` pairs: the entity label first, then every other label of
//! the set in lexicographic order. Labels outside the set are ignored and
//! missing labels hash as empty, so the digest depends only on the values of
//! the set and never on the order the row wrote them in.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::config::IdentityLabelSet;
use crate::error::{ReconcileError, Result};
use crate::types::IdentityLabels;

/// Value treated the same as an absent label.
pub const UNKNOWN_SENTINEL: &str = "UNKNOWN";

/// Opaque, fixed-width identity token of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceHash(String);

impl ServiceHash {
    /// Width of the hex-encoded digest.
    pub const WIDTH: usize = 16;

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The derived identity of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdentity {
    /// The entity name.
    pub entity: String,
    /// The entity hash.
    pub hash: ServiceHash,
    /// `(label, value)` pairs in hashing order; absent labels carry `""`.
    pub labels: Vec<(String, String)>,
}

/// Derives entity identities from an [`IdentityLabelSet`].
#[derive(Debug, Clone)]
pub struct IdentityEngine {
    labels: IdentityLabelSet,
}

impl IdentityEngine {
    /// Creates an engine over the given label set.
    #[must_use]
    pub const fn new(labels: IdentityLabelSet) -> Self {
        Self { labels }
    }

    /// Derives the identity of `entity` scoped by `identity_labels`.
    ///
    /// The entity name always overrides any `service_name`-style label in
    /// `identity_labels`.
    pub fn derive(&self, entity: &str, identity_labels: &IdentityLabels) -> Result<EntityIdentity> {
        let sorted = self.labels.sorted_labels();
        let entity_label = self.labels.entity_label();
        let entity_idx = sorted
            .iter()
            .position(|l| *l == entity_label)
            .ok_or_else(|| {
                ReconcileError::configuration(format!(
                    "entity label '{entity_label}' missing from identity label set"
                ))
            })?;

        let value_of = |label: &str| -> String {
            if label == entity_label {
                return entity.to_string();
            }
            match identity_labels.get(label).unwrap_or_default() {
                UNKNOWN_SENTINEL => String::new(),
                raw => raw.to_string(),
            }
        };

        let mut hasher = Xxh64::new(0);
        let mut labels = Vec::with_capacity(sorted.len());

        let entity_value = value_of(entity_label);
        hasher.update(entity_label.as_bytes());
        hasher.update(entity_value.as_bytes());
        labels.push((entity_label.to_string(), entity_value));

        for (idx, label) in sorted.iter().enumerate() {
            if idx == entity_idx {
                continue;
            }
            let value = value_of(*label);
            hasher.update(label.as_bytes());
            hasher.update(value.as_bytes());
            labels.push(((*label).to_string(), value));
        }

        Ok(EntityIdentity {
            entity: entity.to_string(),
            hash: ServiceHash(format!("{:016x}", hasher.digest())),
            labels,
        })
    }
}

/// Key of a rule group: `{entity}_{hash}_group_{window}_{shard}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Builds the key of an entity's group.
    #[must_use]
    pub fn new(identity: &EntityIdentity, window: &str, shard: u32) -> Self {
        Self(format!(
            "{}_{}_group_{window}_{shard}",
            identity.entity, identity.hash
        ))
    }

    /// Wraps a group name read back from the remote service.
    #[must_use]
    pub fn from_remote(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for GroupKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> IdentityEngine {
        IdentityEngine::new(IdentityLabelSet::v1())
    }

    fn labels(raw: &str) -> IdentityLabels {
        IdentityLabels::parse(raw).expect("valid labels")
    }

    #[test]
    fn hash_is_fixed_width_hex() {
        let id = engine()
            .derive("checkout", &labels("region=us-east;kube_namespace=prod"))
            .expect("derive");
        assert_eq!(id.hash.as_str().len(), ServiceHash::WIDTH);
        assert!(id.hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_matches_manual_fold() {
        let id = engine()
            .derive("checkout", &labels("region=us-east;kube_namespace=prod"))
            .expect("derive");

        let mut h = Xxh64::new(0);
        for (k, v) in [
            ("service_name", "checkout"),
            ("availability_zone", ""),
            ("cloud_account_id", ""),
            ("kf_platform", ""),
            ("kube_cluster_name", ""),
            ("kube_namespace", "prod"),
            ("project", ""),
            ("region", "us-east"),
        ] {
            h.update(k.as_bytes());
            h.update(v.as_bytes());
        }
        assert_eq!(id.hash.as_str(), format!("{:016x}", h.digest()));
    }

    #[test]
    fn label_order_does_not_matter() {
        let a = engine()
            .derive("checkout", &labels("region=us-east;kube_namespace=prod"))
            .expect("derive");
        let b = engine()
            .derive("checkout", &labels("kube_namespace=prod;region=us-east"))
            .expect("derive");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let a = engine()
            .derive("checkout", &labels("region=us-east"))
            .expect("derive");
        let b = engine()
            .derive("checkout", &labels("region=us-east;team=payments"))
            .expect("derive");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn unknown_sentinel_hashes_as_missing() {
        let a = engine()
            .derive("checkout", &labels("region=UNKNOWN"))
            .expect("derive");
        let b = engine().derive("checkout", &labels("")).expect("derive");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn unknown_sentinel_does_not_apply_to_entity() {
        let named = engine().derive("UNKNOWN", &labels("")).expect("derive");
        let empty = engine().derive("", &labels("")).expect("derive");
        assert_ne!(named.hash, empty.hash);
        assert_eq!(named.labels[0], ("service_name".to_string(), "UNKNOWN".to_string()));
    }

    #[test]
    fn changing_a_value_changes_the_hash() {
        let a = engine()
            .derive("checkout", &labels("region=us-east"))
            .expect("derive");
        let b = engine()
            .derive("checkout", &labels("region=us-west"))
            .expect("derive");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn entity_name_overrides_label() {
        let a = engine()
            .derive("checkout", &labels("service_name=other"))
            .expect("derive");
        let b = engine().derive("checkout", &labels("")).expect("derive");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn identity_labels_list_entity_first() {
        let id = engine()
            .derive("checkout", &labels("region=us-east"))
            .expect("derive");
        assert_eq!(id.labels[0], ("service_name".to_string(), "checkout".to_string()));
        assert_eq!(id.labels[1], ("availability_zone".to_string(), String::new()));
        assert!(id.labels.contains(&("region".to_string(), "us-east".to_string())));
        assert_eq!(id.labels.len(), 8);
    }

    #[test]
    fn group_key_format() {
        let id = engine()
            .derive("checkout", &labels("region=us-east"))
            .expect("derive");
        let key = GroupKey::new(&id, "1m", 1);
        assert_eq!(key.as_str(), format!("checkout_{}_group_1m_1", id.hash));
    }

    #[test]
    fn group_key_preserves_underscored_entity_names() {
        let id = engine().derive("my_svc", &labels("")).expect("derive");
        let key = GroupKey::new(&id, "1m", 1);
        assert!(key.as_str().starts_with("my_svc_"));
        assert!(key.as_str().contains(id.hash.as_str()));
    }

    proptest! {
        #[test]
        fn prop_hash_independent_of_label_order(
            mut pairs in proptest::collection::vec(
                (prop::sample::select(vec![
                    "availability_zone", "cloud_account_id", "kf_platform",
                    "kube_cluster_name", "kube_namespace", "project", "region",
                ]), "[a-z0-9-]{1,12}"),
                0..7,
            ),
            seed in any::<u64>(),
        ) {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs.dedup_by(|a, b| a.0 == b.0);
            let forward = IdentityLabels::new(
                pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect(),
            );
            let mut shuffled = pairs.clone();
            let len = shuffled.len().max(1);
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
            let backward = IdentityLabels::new(
                shuffled.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect(),
            );
            let a = engine().derive("svc", &forward).expect("derive");
            let b = engine().derive("svc", &backward).expect("derive");
            prop_assert_eq!(a.hash, b.hash);
        }

        #[test]
        fn prop_changing_region_changes_hash(
            a in "[a-z]{1,10}",
            b in "[a-z]{1,10}",
        ) {
            prop_assume!(a != b);
            let ha = engine().derive("svc", &labels(&format!("region={a}"))).expect("derive");
            let hb = engine().derive("svc", &labels(&format!("region={b}"))).expect("derive");
            prop_assert_ne!(ha.hash, hb.hash);
        }
    }
}
