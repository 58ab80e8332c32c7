//! Names and DNS names of the nodes of one role.
//!
//! Every other component derives its resource names from a [`ClusterTopology`]
//! so a broker is always `<cluster>-kafka-<id>` behind the headless service
//! `<cluster>-kafka-brokers`, whichever component asks.

use std::collections::BTreeMap;

use crate::constants::{self, defaults};

/// Node role a topology describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Kafka,
    Zookeeper,
}

impl NodeRole {
    /// Component segment used in resource names.
    pub fn component(&self) -> &'static str {
        match self {
            NodeRole::Kafka => "kafka",
            NodeRole::Zookeeper => "zookeeper",
        }
    }

    /// Human readable role name, used for condition reasons and messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeRole::Kafka => "Kafka",
            NodeRole::Zookeeper => "ZooKeeper",
        }
    }

    /// Field path of the role in the custom resource.
    pub fn spec_path(&self) -> &'static str {
        match self {
            NodeRole::Kafka => "spec.kafka",
            NodeRole::Zookeeper => "spec.zookeeper",
        }
    }
}

/// Immutable per-reconciliation view of the nodes of one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterTopology {
    cluster: String,
    namespace: String,
    replicas: i32,
    role: NodeRole,
    dns_domain: String,
}

impl ClusterTopology {
    pub fn new(cluster: impl Into<String>, namespace: impl Into<String>, replicas: i32, role: NodeRole) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.into(),
            replicas,
            role,
            dns_domain: defaults::DNS_DOMAIN.to_string(),
        }
    }

    pub fn kafka(cluster: impl Into<String>, namespace: impl Into<String>, replicas: i32) -> Self {
        Self::new(cluster, namespace, replicas, NodeRole::Kafka)
    }

    pub fn zookeeper(cluster: impl Into<String>, namespace: impl Into<String>, replicas: i32) -> Self {
        Self::new(cluster, namespace, replicas, NodeRole::Zookeeper)
    }

    /// Use a cluster DNS domain other than `cluster.local`.
    pub fn with_dns_domain(mut self, dns_domain: impl Into<String>) -> Self {
        self.dns_domain = dns_domain.into();
        self
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn replicas(&self) -> i32 {
        self.replicas
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn dns_domain(&self) -> &str {
        &self.dns_domain
    }

    /// Node ids `0..replicas`.
    pub fn node_ids(&self) -> impl Iterator<Item = i32> {
        0..self.replicas.max(0)
    }

    /// `<cluster>-kafka` or `<cluster>-zookeeper`.
    pub fn component_name(&self) -> String {
        format!("{}-{}", self.cluster, self.role.component())
    }

    pub fn pod_name(&self, node_id: i32) -> String {
        format!("{}-{node_id}", self.component_name())
    }

    /// Headless service giving every pod a stable DNS record.
    pub fn headless_service_name(&self) -> String {
        match self.role {
            NodeRole::Kafka => format!("{}-brokers", self.component_name()),
            NodeRole::Zookeeper => format!("{}-nodes", self.component_name()),
        }
    }

    /// Cluster-internal entry point: the Kafka bootstrap or ZooKeeper client service.
    pub fn bootstrap_service_name(&self) -> String {
        match self.role {
            NodeRole::Kafka => format!("{}-bootstrap", self.component_name()),
            NodeRole::Zookeeper => format!("{}-client", self.component_name()),
        }
    }

    /// Shared config map of the role.
    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.component_name())
    }

    /// Bootstrap service of an external listener.
    pub fn external_bootstrap_service_name(&self, listener: &str) -> String {
        format!("{}-{listener}-bootstrap", self.component_name())
    }

    /// Per-broker service of an external listener. The listener called
    /// `external` keeps the name older clusters were created with.
    pub fn external_broker_service_name(&self, listener: &str, node_id: i32) -> String {
        if listener == "external" {
            self.pod_name(node_id)
        } else {
            format!("{}-{listener}-{node_id}", self.component_name())
        }
    }

    /// Claim name of a volume. `volume_id` is only set for JBOD volumes.
    pub fn claim_name(&self, volume_id: Option<i32>, node_id: i32) -> String {
        match volume_id {
            Some(id) => format!("data-{id}-{}", self.pod_name(node_id)),
            None => format!("data-{}", self.pod_name(node_id)),
        }
    }

    /// `<pod>.<headless>.<ns>.svc`
    pub fn pod_dns_name(&self, node_id: i32) -> String {
        format!(
            "{}.{}.{}.svc",
            self.pod_name(node_id),
            self.headless_service_name(),
            self.namespace
        )
    }

    /// `<pod>.<headless>.<ns>.svc.<dns-domain>`
    pub fn pod_dns_name_fq(&self, node_id: i32) -> String {
        format!("{}.{}", self.pod_dns_name(node_id), self.dns_domain)
    }

    /// `<svc>.<ns>.svc`
    pub fn service_dns_name(&self, service: &str) -> String {
        format!("{service}.{}.svc", self.namespace)
    }

    /// The four names a service answers to inside the cluster.
    pub fn service_dns_names(&self, service: &str) -> [String; 4] {
        [
            service.to_string(),
            format!("{service}.{}", self.namespace),
            self.service_dns_name(service),
            format!("{}.{}", self.service_dns_name(service), self.dns_domain),
        ]
    }

    /// `*.<svc>.<ns>.svc` and its fully-qualified form.
    pub fn wildcard_dns_names(&self, service: &str) -> [String; 2] {
        [
            format!("*.{}", self.service_dns_name(service)),
            format!("*.{}.{}", self.service_dns_name(service), self.dns_domain),
        ]
    }

    /// Labels every resource of the role carries.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(
            constants::labels::MANAGED_BY.into(),
            constants::values::MANAGED_BY.into(),
        );
        labels.insert(constants::labels::INSTANCE.into(), self.cluster.clone());
        labels.insert(constants::labels::COMPONENT.into(), self.role.component().into());
        labels
    }

    /// Labels selecting all pods of the role.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (constants::labels::CLUSTER.into(), self.cluster.clone()),
            (constants::labels::KIND.into(), constants::values::KIND.into()),
            (constants::labels::NAME.into(), self.component_name()),
        ])
    }

    /// Labels selecting exactly one pod.
    pub fn pod_selector_labels(&self, node_id: i32) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(constants::labels::POD_NAME.into(), self.pod_name(node_id));
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_names() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        assert_eq!(topology.pod_name(0), "foo-kafka-0");
        assert_eq!(topology.headless_service_name(), "foo-kafka-brokers");
        assert_eq!(topology.bootstrap_service_name(), "foo-kafka-bootstrap");
        assert_eq!(topology.config_map_name(), "foo-kafka-config");
        assert_eq!(
            topology.pod_dns_name_fq(2),
            "foo-kafka-2.foo-kafka-brokers.test.svc.cluster.local"
        );
        assert_eq!(topology.node_ids().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_zookeeper_names() {
        let topology = ClusterTopology::zookeeper("foo", "test", 3);
        assert_eq!(topology.pod_name(1), "foo-zookeeper-1");
        assert_eq!(topology.headless_service_name(), "foo-zookeeper-nodes");
        assert_eq!(topology.bootstrap_service_name(), "foo-zookeeper-client");
        assert_eq!(
            topology.wildcard_dns_names("foo-zookeeper-nodes"),
            [
                "*.foo-zookeeper-nodes.test.svc".to_string(),
                "*.foo-zookeeper-nodes.test.svc.cluster.local".to_string()
            ]
        );
    }

    #[test]
    fn test_external_service_names() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        assert_eq!(
            topology.external_bootstrap_service_name("external"),
            "foo-kafka-external-bootstrap"
        );
        assert_eq!(topology.external_broker_service_name("external", 1), "foo-kafka-1");
        assert_eq!(
            topology.external_bootstrap_service_name("lb"),
            "foo-kafka-lb-bootstrap"
        );
        assert_eq!(topology.external_broker_service_name("lb", 1), "foo-kafka-lb-1");
    }

    #[test]
    fn test_claim_names() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        assert_eq!(topology.claim_name(None, 0), "data-foo-kafka-0");
        assert_eq!(topology.claim_name(Some(1), 2), "data-1-foo-kafka-2");
    }

    #[test]
    fn test_custom_dns_domain() {
        let topology = ClusterTopology::kafka("foo", "test", 1).with_dns_domain("example.org");
        assert_eq!(
            topology.service_dns_names("foo-kafka-bootstrap")[3],
            "foo-kafka-bootstrap.test.svc.example.org"
        );
    }

    #[test]
    fn test_pod_selector_narrows_role_selector() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        let role = topology.selector_labels();
        let pod = topology.pod_selector_labels(1);
        assert!(role.iter().all(|(k, v)| pod.get(k) == Some(v)));
        assert_eq!(pod.get(constants::labels::POD_NAME).map(String::as_str), Some("foo-kafka-1"));
    }
}
