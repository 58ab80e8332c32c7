use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};

use crate::constants::annotations;
use crate::crds::{PersistentClaimStorage, ResourceTemplate, Storage};
use crate::resources::object_meta;
use crate::topology::ClusterTopology;

/// Build every claim `storage` needs: one per persistent volume and node,
/// volume by volume. Ephemeral storage needs none.
///
/// Only claims of volumes with `deleteClaim` set carry `owner_ref`, so the
/// others outlive the cluster resource.
pub fn build_persistent_volume_claims(
    topology: &ClusterTopology,
    storage: &Storage,
    template: Option<&ResourceTemplate>,
    owner_ref: &OwnerReference,
) -> Vec<PersistentVolumeClaim> {
    let jbod = matches!(storage, Storage::Jbod(_));
    storage
        .persistent_volumes()
        .iter()
        .flat_map(|volume| {
            let volume_id = if jbod { volume.id } else { None };
            topology
                .node_ids()
                .map(move |node_id| build_claim(topology, volume, volume_id, node_id, template, owner_ref))
        })
        .collect()
}

fn build_claim(
    topology: &ClusterTopology,
    volume: &PersistentClaimStorage,
    volume_id: Option<i32>,
    node_id: i32,
    template: Option<&ResourceTemplate>,
    owner_ref: &OwnerReference,
) -> PersistentVolumeClaim {
    let mut metadata = object_meta(
        topology.claim_name(volume_id, node_id),
        topology.namespace(),
        topology.labels(),
        template,
        volume.delete_claim.then_some(owner_ref),
    );
    metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(annotations::DELETE_CLAIM.into(), volume.delete_claim.to_string());

    PersistentVolumeClaim {
        metadata,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".into()]),
            storage_class_name: volume.storage_class_for(node_id).map(str::to_string),
            selector: (!volume.selector.is_empty()).then(|| LabelSelector {
                match_labels: Some(volume.selector.clone()),
                ..Default::default()
            }),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".into(),
                    Quantity(volume.size.clone().unwrap_or_default()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
