//! Storage validation and reversion of unsafe storage changes.
//!
//! Once nodes have been provisioned, a storage change that would need data to
//! be thrown away (a different storage kind, a new storage class, a smaller
//! volume) is not applied. The previously applied storage is kept and a
//! warning condition is returned so the status can tell the user why.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::crds::{Condition, PersistentClaimStorage, Storage};
use crate::error::{ModelError, Result};
use crate::topology::NodeRole;

/// Outcome of [`reconcile_storage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageReconciliation {
    /// Storage to deploy. Either the requested one or the previous one.
    pub storage: Storage,
    pub warnings: Vec<Condition>,
}

impl StorageReconciliation {
    pub fn reverted(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Decide which storage to deploy for `role`.
///
/// `replicas` is the number of nodes already provisioned with `previous`.
/// When `nodes_already_exist` is false the requested storage is always used.
pub fn reconcile_storage(
    role: NodeRole,
    requested: &Storage,
    previous: Option<&Storage>,
    replicas: i32,
    nodes_already_exist: bool,
) -> Result<StorageReconciliation> {
    validate_storage(role, requested)?;

    let previous = match previous {
        Some(previous) if nodes_already_exist => previous,
        _ => {
            return Ok(StorageReconciliation {
                storage: requested.clone(),
                warnings: Vec::new(),
            })
        }
    };

    let diff = StorageDiff::new(previous, requested, replicas);
    if diff.is_empty() {
        return Ok(StorageReconciliation {
            storage: requested.clone(),
            warnings: Vec::new(),
        });
    }

    for issue in diff.issues() {
        debug!(role = role.display_name(), "Disallowed storage change: {issue}");
    }
    warn!(
        role = role.display_name(),
        "Storage changes are not allowed for existing nodes, keeping the previous storage"
    );

    Ok(StorageReconciliation {
        storage: previous.clone(),
        warnings: vec![Condition::warning(
            format!("{}Storage", role.display_name()),
            format!(
                "The desired {} storage configuration contains changes which are not allowed. \
                 As a result, all storage changes will be ignored. Use DEBUG level logging for \
                 more information about the detected changes.",
                role.display_name()
            ),
        )],
    })
}

/// Structural checks of one storage definition.
pub fn validate_storage(role: NodeRole, storage: &Storage) -> Result<()> {
    let path = format!("{}.storage", role.spec_path());
    match storage {
        Storage::Ephemeral(ephemeral) => {
            if let Some(limit) = &ephemeral.size_limit {
                if parse_quantity_bytes(limit).is_none() {
                    return Err(ModelError::invalid(format!(
                        "{path}.sizeLimit '{limit}' is not a valid quantity"
                    )));
                }
            }
            Ok(())
        }
        Storage::PersistentClaim(volume) => validate_volume(&path, volume),
        Storage::Jbod(jbod) => {
            if role == NodeRole::Zookeeper {
                return Err(ModelError::invalid(format!(
                    "{} does not support storage of type jbod ({path}.type)",
                    role.display_name()
                )));
            }
            if jbod.volumes.is_empty() {
                return Err(ModelError::invalid(format!(
                    "{} storage of type jbod must contain at least one volume ({path}.volumes)",
                    role.display_name()
                )));
            }

            let mut ids = BTreeSet::new();
            for (index, volume) in jbod.volumes.iter().enumerate() {
                let id = volume.id.ok_or_else(|| {
                    ModelError::invalid(format!("{path}.volumes[{index}].id is required"))
                })?;
                if id < 0 {
                    return Err(ModelError::invalid(format!(
                        "{path}.volumes[{index}].id must not be negative"
                    )));
                }
                if !ids.insert(id) {
                    return Err(ModelError::invalid(format!(
                        "Volume id {id} is used more than once in {path}.volumes"
                    )));
                }
                validate_volume(&format!("{path}.volumes[id={id}]"), volume)?;
            }
            Ok(())
        }
    }
}

fn validate_volume(path: &str, volume: &PersistentClaimStorage) -> Result<()> {
    let size = volume
        .size
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            ModelError::invalid(format!("{path}.size is required for persistent-claim storage"))
        })?;
    if parse_quantity_bytes(size).is_none() {
        return Err(ModelError::invalid(format!(
            "{path}.size '{size}' is not a valid quantity"
        )));
    }
    if let Some(o) = volume.overrides.iter().find(|o| o.broker < 0) {
        return Err(ModelError::invalid(format!(
            "{path}.overrides[broker={}] must not be negative",
            o.broker
        )));
    }
    Ok(())
}

/// Differences between two storage definitions that cannot be applied to
/// existing nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageDiff {
    issues: Vec<String>,
}

impl StorageDiff {
    pub fn new(previous: &Storage, requested: &Storage, replicas: i32) -> Self {
        let mut diff = Self::default();
        match (previous, requested) {
            (Storage::Ephemeral(_), Storage::Ephemeral(_)) => {}
            (Storage::PersistentClaim(prev), Storage::PersistentClaim(req)) => {
                diff.compare_volume("storage", prev, req, replicas);
            }
            (Storage::Jbod(prev), Storage::Jbod(req)) => {
                let requested_by_id: BTreeMap<Option<i32>, &PersistentClaimStorage> =
                    req.volumes.iter().map(|v| (v.id, v)).collect();
                // Volumes only on one side are added or removed, which is allowed.
                for prev_volume in &prev.volumes {
                    if let Some(req_volume) = requested_by_id.get(&prev_volume.id) {
                        let label = match prev_volume.id {
                            Some(id) => format!("volume {id}"),
                            None => "volume".to_string(),
                        };
                        diff.compare_volume(&label, prev_volume, req_volume, replicas);
                    }
                }
            }
            (prev, req) => diff.issues.push(format!(
                "storage type changed from {} to {}",
                prev.kind(),
                req.kind()
            )),
        }
        diff
    }

    fn compare_volume(
        &mut self,
        label: &str,
        prev: &PersistentClaimStorage,
        req: &PersistentClaimStorage,
        replicas: i32,
    ) {
        if prev.storage_class != req.storage_class {
            self.issues.push(format!(
                "{label}: storage class changed from {:?} to {:?}",
                prev.storage_class, req.storage_class
            ));
        }
        if prev.selector != req.selector {
            self.issues.push(format!("{label}: selector changed"));
        }

        let prev_size = prev.size.as_deref().and_then(parse_quantity_bytes);
        let req_size = req.size.as_deref().and_then(parse_quantity_bytes);
        match (prev_size, req_size) {
            (Some(p), Some(r)) if r < p => self.issues.push(format!(
                "{label}: size decreased from {} to {}",
                prev.size.as_deref().unwrap_or_default(),
                req.size.as_deref().unwrap_or_default()
            )),
            (Some(_), Some(_)) => {}
            _ if prev.size != req.size => {
                self.issues.push(format!("{label}: size cannot be compared"))
            }
            _ => {}
        }

        for broker in 0..replicas.max(0) {
            if prev.storage_class_for(broker) != req.storage_class_for(broker) {
                self.issues.push(format!(
                    "{label}: storage class of broker {broker} changed from {:?} to {:?}",
                    prev.storage_class_for(broker),
                    req.storage_class_for(broker)
                ));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

/// Encode the applied storage for the `chronik.io/storage` annotation.
pub fn encode_storage_annotation(storage: &Storage) -> Result<String> {
    Ok(serde_json::to_string(storage)?)
}

/// Decode storage previously written by [`encode_storage_annotation`].
pub fn decode_storage_annotation(value: &str) -> Result<Storage> {
    Ok(serde_json::from_str(value)?)
}

/// Parse a Kubernetes quantity string (memory/storage) into bytes.
///
/// Supports binary suffixes (Ki, Mi, Gi, Ti, Pi, Ei) and SI suffixes
/// (k, K, M, G, T, P, E). Returns `None` for anything else.
pub fn parse_quantity_bytes(s: &str) -> Option<u128> {
    const SUFFIXES: &[(&str, u128)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("Ei", 1 << 60),
        ("k", 1_000),
        ("K", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
        ("E", 1_000_000_000_000_000_000),
    ];

    let s = s.trim();
    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| s.strip_suffix(suffix).map(|d| (d, *multiplier)))
        .unwrap_or((s, 1));
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u128>().ok()?.checked_mul(multiplier)
}
