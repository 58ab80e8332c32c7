use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::constants::config_keys;
use crate::resources::object_meta;
use crate::topology::ClusterTopology;

/// Build a ConfigMap named `name` carrying the role labels.
pub fn build_config_map(
    topology: &ClusterTopology,
    name: String,
    data: BTreeMap<String, String>,
    owner_ref: &OwnerReference,
) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(name, topology.namespace(), topology.labels(), None, Some(owner_ref)),
        data: Some(data),
        ..Default::default()
    }
}

/// Build the ConfigMap holding one broker's resolved `server.config`.
///
/// Named after the broker pod so the pod can mount it by its own name.
pub fn build_broker_config_map(
    topology: &ClusterTopology,
    broker_id: i32,
    server_config: String,
    owner_ref: &OwnerReference,
) -> ConfigMap {
    build_config_map(
        topology,
        topology.pod_name(broker_id),
        BTreeMap::from([(config_keys::SERVER_CONFIG.to_string(), server_config)]),
        owner_ref,
    )
}
