use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::constants::ports;
use crate::listeners::ListenerTable;
use crate::resources::object_meta;
use crate::topology::ClusterTopology;

fn port_rule(port: i32, from: Option<Vec<NetworkPolicyPeer>>) -> NetworkPolicyIngressRule {
    NetworkPolicyIngressRule {
        ports: Some(vec![NetworkPolicyPort {
            port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        from,
    }
}

fn pods_of(topology: &ClusterTopology) -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        pod_selector: Some(LabelSelector {
            match_labels: Some(topology.selector_labels()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn policy(
    topology: &ClusterTopology,
    rules: Vec<NetworkPolicyIngressRule>,
    owner_ref: &OwnerReference,
) -> NetworkPolicy {
    NetworkPolicy {
        metadata: object_meta(
            format!("{}-network-policy", topology.component_name()),
            topology.namespace(),
            topology.labels(),
            None,
            Some(owner_ref),
        ),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(topology.selector_labels()),
                ..Default::default()
            },
            ingress: Some(rules),
            policy_types: Some(vec!["Ingress".into()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the broker NetworkPolicy: control plane and replication only
/// between brokers, metrics open when enabled, then one rule per listener.
pub fn build_kafka_network_policy(
    topology: &ClusterTopology,
    listeners: &ListenerTable,
    metrics_enabled: bool,
    owner_ref: &OwnerReference,
) -> NetworkPolicy {
    let brokers = pods_of(topology);
    let mut rules = vec![
        port_rule(ports::CONTROLPLANE, Some(vec![brokers.clone()])),
        port_rule(ports::REPLICATION, Some(vec![brokers])),
    ];
    if metrics_enabled {
        rules.push(port_rule(ports::METRICS, None));
    }
    rules.extend(listeners.network_policy_ingress_rules());
    policy(topology, rules, owner_ref)
}

/// Build the ZooKeeper NetworkPolicy: clients port for brokers and the
/// ensemble, quorum ports only within the ensemble.
pub fn build_zookeeper_network_policy(
    topology: &ClusterTopology,
    metrics_enabled: bool,
    owner_ref: &OwnerReference,
) -> NetworkPolicy {
    let ensemble = pods_of(topology);
    let brokers = pods_of(&ClusterTopology::kafka(
        topology.cluster(),
        topology.namespace(),
        0,
    ));
    let mut rules = vec![
        port_rule(ports::ZOOKEEPER_CLIENT, Some(vec![brokers, ensemble.clone()])),
        port_rule(ports::ZOOKEEPER_CLUSTER, Some(vec![ensemble.clone()])),
        port_rule(ports::ZOOKEEPER_ELECTION, Some(vec![ensemble])),
    ];
    if metrics_enabled {
        rules.push(port_rule(ports::METRICS, None));
    }
    policy(topology, rules, owner_ref)
}
