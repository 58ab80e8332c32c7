//! Identities node certificates must carry.
//!
//! Nothing here signs anything. The functions compute, per node, the subject
//! alternative names a certificate needs so the signing side can issue or
//! reissue it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use crate::constants::defaults;
use crate::crds::{CertificateAuthoritySpec, CertificateExpirationPolicy};
use crate::listeners::{ExternalAddresses, ListenerTable};
use crate::topology::{ClusterTopology, NodeRole};

/// A subject alternative name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectAltName {
    /// IP literals become IP entries, anything else a DNS entry.
    pub fn classify(address: &str) -> Self {
        address
            .parse::<IpAddr>()
            .map(SubjectAltName::Ip)
            .unwrap_or_else(|_| SubjectAltName::Dns(address.to_string()))
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltName::Dns(name) => write!(f, "DNS:{name}"),
            SubjectAltName::Ip(ip) => write!(f, "IP:{ip}"),
        }
    }
}

pub type SanSet = BTreeSet<SubjectAltName>;

fn dns<I, S>(names: I) -> impl Iterator<Item = SubjectAltName>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(|n| SubjectAltName::Dns(n.into()))
}

/// SAN sets of every node of a topology plus the shared bootstrap set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeSans {
    pub nodes: BTreeMap<i32, SanSet>,
    pub bootstrap: SanSet,
}

/// Build the SAN set of every node of `topology`.
///
/// Names declared on `listeners` are always included. `external_bootstrap`
/// addresses go to every node, `external_brokers` only to the matching node.
pub fn build_sans(
    topology: &ClusterTopology,
    listeners: &ListenerTable,
    external_bootstrap: Option<&BTreeSet<String>>,
    external_brokers: Option<&BTreeMap<i32, BTreeSet<String>>>,
) -> NodeSans {
    let mut external = listeners.declared_external_addresses();
    if let Some(bootstrap) = external_bootstrap {
        external.bootstrap.extend(bootstrap.iter().cloned());
    }
    if let Some(brokers) = external_brokers {
        for (id, hosts) in brokers {
            external.brokers.entry(*id).or_default().extend(hosts.iter().cloned());
        }
    }

    let nodes = topology
        .node_ids()
        .map(|id| {
            let sans = match topology.role() {
                NodeRole::Kafka => kafka_broker_sans(topology, id, &external),
                NodeRole::Zookeeper => zookeeper_node_sans(topology, id),
            };
            (id, sans)
        })
        .collect();

    NodeSans {
        nodes,
        bootstrap: bootstrap_sans(topology, &external),
    }
}

/// Names shared by all nodes: the bootstrap (or client) service and the
/// headless service in all their in-cluster forms, plus external bootstrap
/// addresses.
pub fn bootstrap_sans(topology: &ClusterTopology, external: &ExternalAddresses) -> SanSet {
    let mut sans: SanSet = dns(topology.service_dns_names(&topology.bootstrap_service_name()))
        .chain(dns(topology.service_dns_names(&topology.headless_service_name())))
        .collect();
    sans.extend(external.bootstrap.iter().map(|a| SubjectAltName::classify(a)));
    sans
}

pub fn kafka_broker_sans(
    topology: &ClusterTopology,
    broker_id: i32,
    external: &ExternalAddresses,
) -> SanSet {
    let mut sans = bootstrap_sans(topology, external);
    sans.insert(SubjectAltName::Dns(topology.pod_dns_name(broker_id)));
    sans.insert(SubjectAltName::Dns(topology.pod_dns_name_fq(broker_id)));
    if let Some(addresses) = external.brokers.get(&broker_id) {
        sans.extend(addresses.iter().map(|a| SubjectAltName::classify(a)));
    }
    sans
}

/// ZooKeeper nodes also answer for any name under their two services.
pub fn zookeeper_node_sans(topology: &ClusterTopology, node_id: i32) -> SanSet {
    let mut sans = bootstrap_sans(topology, &ExternalAddresses::default());
    sans.insert(SubjectAltName::Dns(topology.pod_dns_name(node_id)));
    sans.insert(SubjectAltName::Dns(topology.pod_dns_name_fq(node_id)));
    sans.extend(dns(topology.wildcard_dns_names(&topology.bootstrap_service_name())));
    sans.extend(dns(topology.wildcard_dns_names(&topology.headless_service_name())));
    sans
}

/// Opaque CA material. Only carried, never inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaMaterial {
    pub certificate: String,
    pub key: String,
}

/// A certificate authority as seen by the model: its validity settings and
/// the material currently in use and, during a key replacement, the next one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateAuthority {
    pub common_name: String,
    pub generation: u32,
    pub validity_days: u32,
    pub renewal_days: u32,
    pub policy: CertificateExpirationPolicy,
    current: Option<CaMaterial>,
    next: Option<CaMaterial>,
}

impl CertificateAuthority {
    pub fn cluster_ca(cluster: &str, spec: &CertificateAuthoritySpec) -> Self {
        Self {
            common_name: format!("{cluster}-cluster-ca"),
            generation: 0,
            validity_days: spec.validity_days,
            renewal_days: spec.renewal_days,
            policy: spec.certificate_expiration_policy,
            current: None,
            next: None,
        }
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_material(mut self, current: CaMaterial, next: Option<CaMaterial>) -> Self {
        self.current = Some(current);
        self.next = next;
        self
    }

    pub fn current(&self) -> Option<&CaMaterial> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&CaMaterial> {
        self.next.as_ref()
    }

    /// A replacement key has been generated and not yet promoted.
    pub fn key_replacement_in_progress(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_in_renewal_window(&self, days_remaining: i64) -> bool {
        days_remaining <= i64::from(self.renewal_days)
    }

    /// Subject of the certificates issued to nodes of `topology`.
    pub fn node_subject(&self, topology: &ClusterTopology) -> String {
        format!(
            "CN={}, O={}",
            topology.component_name(),
            defaults::CERTIFICATE_ORGANIZATION
        )
    }

    /// What the signer must issue for every node of `topology`.
    pub fn node_certificate_requests(
        &self,
        topology: &ClusterTopology,
        sans: &NodeSans,
    ) -> BTreeMap<i32, NodeCertificateRequest> {
        sans.nodes
            .iter()
            .map(|(id, node_sans)| {
                (
                    *id,
                    NodeCertificateRequest {
                        pod_name: topology.pod_name(*id),
                        subject: self.node_subject(topology),
                        sans: node_sans.clone(),
                        validity_days: self.validity_days,
                        ca_generation: self.generation,
                    },
                )
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeCertificateRequest {
    pub pod_name: String,
    pub subject: String,
    pub sans: SanSet,
    pub validity_days: u32,
    pub ca_generation: u32,
}

impl NodeCertificateRequest {
    /// Whether an existing certificate no longer satisfies this request.
    pub fn requires_reissue(
        &self,
        existing_sans: &SanSet,
        existing_ca_generation: u32,
        days_remaining: i64,
        ca: &CertificateAuthority,
    ) -> bool {
        existing_sans != &self.sans
            || existing_ca_generation != self.ca_generation
            || ca.is_in_renewal_window(days_remaining)
    }
}
