//! Listener resolution.
//!
//! Declared listeners carry cluster-wide defaults plus optional per-broker
//! overrides. [`ListenerTable::resolve`] folds both layers into one
//! read-only table per reconciliation. Everything that needs a node port,
//! an advertised address or a load balancer IP asks the table.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::networking::v1::{NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::constants::{self, ports};
use crate::crds::listener::NodeAddressType;
use crate::crds::{
    BrokerListenerOverride, ExternalTrafficPolicy, GenericListener, IpFamily, IpFamilyPolicy,
    ListenerAuthentication, ListenerConfiguration, ListenerStatus, ListenerType,
};
use crate::error::{ModelError, Result};
use crate::topology::ClusterTopology;

/// Exposure mechanism of a resolved listener with its listener-level settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerKind {
    Internal,
    NodePort(NodePortExposure),
    LoadBalancer(LoadBalancerExposure),
    Ingress(IngressExposure),
    Route(RouteExposure),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePortExposure {
    pub external_traffic_policy: Option<ExternalTrafficPolicy>,
    pub preferred_address_type: Option<NodeAddressType>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerExposure {
    pub external_traffic_policy: ExternalTrafficPolicy,
    pub source_ranges: Vec<String>,
    pub finalizers: Vec<String>,
    pub create_bootstrap_service: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressExposure {
    pub class: Option<String>,
    pub bootstrap_host: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteExposure {
    pub bootstrap_host: String,
}

/// Bootstrap side of a listener.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapAddress {
    pub node_port: Option<i32>,
    pub load_balancer_ip: Option<String>,
    pub alternative_names: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// `host:port` clients bootstrap from.
    pub address: String,
}

/// Per-broker side of a listener. Optional fields are the explicit
/// per-broker overrides; `None` means the broker has none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub broker_id: i32,
    pub advertised_host: Option<String>,
    pub advertised_port: Option<i32>,
    pub host: Option<String>,
    pub node_port: Option<i32>,
    pub load_balancer_ip: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// `host:port` of the broker's own service or pod.
    pub service_address: String,
    /// `host:port` of the listener bootstrap.
    pub bootstrap_address: String,
}

/// A listener with both override layers folded in.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedListener {
    pub name: String,
    pub port: i32,
    pub tls: bool,
    pub authentication: Option<ListenerAuthentication>,
    pub network_policy_peers: Vec<NetworkPolicyPeer>,
    pub ip_family_policy: Option<IpFamilyPolicy>,
    pub ip_families: Vec<IpFamily>,
    pub kind: ListenerKind,
    pub bootstrap: BootstrapAddress,
    brokers: BTreeMap<i32, ResolvedAddress>,
}

impl ResolvedListener {
    pub fn listener_type(&self) -> ListenerType {
        match self.kind {
            ListenerKind::Internal => ListenerType::Internal,
            ListenerKind::NodePort(_) => ListenerType::NodePort,
            ListenerKind::LoadBalancer(_) => ListenerType::LoadBalancer,
            ListenerKind::Ingress(_) => ListenerType::Ingress,
            ListenerKind::Route(_) => ListenerType::Route,
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self.kind, ListenerKind::Internal)
    }

    /// Listener name used in broker configuration, e.g. `PLAIN-9092`.
    pub fn identifier(&self) -> String {
        format!("{}-{}", self.name.to_uppercase(), self.port)
    }

    /// Listener name used in env vars and auxiliary blocks, e.g. `PLAIN_9092`.
    pub fn env_name(&self) -> String {
        format!("{}_{}", self.name.to_uppercase(), self.port)
    }

    pub fn advertised_hostname_placeholder(&self) -> String {
        format!("${{CHRONIK_{}_ADVERTISED_HOSTNAME}}", self.env_name())
    }

    pub fn advertised_port_placeholder(&self) -> String {
        format!("${{CHRONIK_{}_ADVERTISED_PORT}}", self.env_name())
    }

    pub fn security_protocol(&self) -> &'static str {
        let sasl = matches!(
            self.authentication,
            Some(ListenerAuthentication::ScramSha512 | ListenerAuthentication::Oauth(_))
        );
        match (self.tls, sasl) {
            (true, true) => "SASL_SSL",
            (false, true) => "SASL_PLAINTEXT",
            (true, false) => "SSL",
            (false, false) => "PLAINTEXT",
        }
    }

    pub fn brokers(&self) -> impl Iterator<Item = &ResolvedAddress> {
        self.brokers.values()
    }

    pub fn broker(&self, broker_id: i32) -> Option<&ResolvedAddress> {
        self.brokers.get(&broker_id)
    }

    /// Advertised host of `broker_id`: its explicit override, else `fallback`.
    /// An override of `""` is returned as is.
    pub fn advertised_host(&self, broker_id: i32, fallback: &str) -> String {
        self.broker(broker_id)
            .and_then(|b| b.advertised_host.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Advertised port of `broker_id`: its explicit override, else `fallback`.
    pub fn advertised_port(&self, broker_id: i32, fallback: i32) -> String {
        self.broker(broker_id)
            .and_then(|b| b.advertised_port)
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn bootstrap_node_port(&self) -> Option<i32> {
        self.bootstrap.node_port
    }

    /// Explicit node port of `broker_id`. Never inherits the bootstrap port.
    pub fn broker_node_port(&self, broker_id: i32) -> Option<i32> {
        self.broker(broker_id).and_then(|b| b.node_port)
    }

    pub fn bootstrap_load_balancer_ip(&self) -> Option<&str> {
        self.bootstrap.load_balancer_ip.as_deref()
    }

    pub fn broker_load_balancer_ip(&self, broker_id: i32) -> Option<&str> {
        self.broker(broker_id).and_then(|b| b.load_balancer_ip.as_deref())
    }

    /// Traffic policy for the listener services. Load balancers default to
    /// `Cluster`, node ports only carry one when configured.
    pub fn external_traffic_policy(&self) -> Option<ExternalTrafficPolicy> {
        match &self.kind {
            ListenerKind::NodePort(np) => np.external_traffic_policy,
            ListenerKind::LoadBalancer(lb) => Some(lb.external_traffic_policy),
            ListenerKind::Internal | ListenerKind::Ingress(_) | ListenerKind::Route(_) => None,
        }
    }

    pub fn load_balancer_source_ranges(&self) -> &[String] {
        match &self.kind {
            ListenerKind::LoadBalancer(lb) => &lb.source_ranges,
            _ => &[],
        }
    }

    pub fn finalizers(&self) -> &[String] {
        match &self.kind {
            ListenerKind::LoadBalancer(lb) => &lb.finalizers,
            _ => &[],
        }
    }

    /// Whether the listener gets its own external bootstrap service.
    pub fn has_external_bootstrap_service(&self) -> bool {
        match &self.kind {
            ListenerKind::Internal => false,
            ListenerKind::LoadBalancer(lb) => lb.create_bootstrap_service,
            ListenerKind::NodePort(_) | ListenerKind::Ingress(_) | ListenerKind::Route(_) => true,
        }
    }

    /// Port clients use from outside for the given mechanism when nothing
    /// more specific is known.
    fn default_external_port(&self, broker_id: i32) -> i32 {
        match &self.kind {
            ListenerKind::Internal | ListenerKind::LoadBalancer(_) => self.port,
            ListenerKind::NodePort(_) => self.broker_node_port(broker_id).unwrap_or(self.port),
            ListenerKind::Ingress(_) => ports::INGRESS,
            ListenerKind::Route(_) => ports::ROUTE,
        }
    }

    /// Admits only the declared peers on this listener's port, or everyone
    /// when none are declared.
    pub fn network_policy_rule(&self) -> NetworkPolicyIngressRule {
        NetworkPolicyIngressRule {
            ports: Some(vec![NetworkPolicyPort {
                port: Some(IntOrString::Int(self.port)),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            from: if self.network_policy_peers.is_empty() {
                None
            } else {
                Some(self.network_policy_peers.clone())
            },
        }
    }
}

/// Addresses observed on the platform (load balancer ingress, node external
/// addresses, allocated node ports), keyed by listener name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedAddresses {
    bootstrap: BTreeMap<String, BTreeSet<String>>,
    brokers: BTreeMap<(String, i32), ObservedBrokerAddress>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedBrokerAddress {
    pub host: Option<String>,
    pub port: Option<i32>,
}

impl ObservedAddresses {
    pub fn add_bootstrap(&mut self, listener: &str, address: impl Into<String>) -> &mut Self {
        self.bootstrap
            .entry(listener.to_string())
            .or_default()
            .insert(address.into());
        self
    }

    pub fn set_broker(
        &mut self,
        listener: &str,
        broker_id: i32,
        host: Option<String>,
        port: Option<i32>,
    ) -> &mut Self {
        self.brokers
            .insert((listener.to_string(), broker_id), ObservedBrokerAddress { host, port });
        self
    }

    pub fn broker(&self, listener: &str, broker_id: i32) -> Option<&ObservedBrokerAddress> {
        self.brokers.get(&(listener.to_string(), broker_id))
    }

    pub fn bootstrap(&self, listener: &str) -> impl Iterator<Item = &String> {
        self.bootstrap.get(listener).into_iter().flatten()
    }
}

/// External names and IPs that certificates must cover.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalAddresses {
    pub bootstrap: BTreeSet<String>,
    pub brokers: BTreeMap<i32, BTreeSet<String>>,
}

/// Advertised value per broker, per listener env name.
pub type AdvertisedMap = BTreeMap<i32, BTreeMap<String, String>>;

/// All listeners of a cluster, resolved for one reconciliation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenerTable {
    listeners: Vec<ResolvedListener>,
}

impl ListenerTable {
    /// Validate `listeners` and resolve them against `topology`.
    pub fn resolve(listeners: &[GenericListener], topology: &ClusterTopology) -> Result<Self> {
        let mut names = BTreeSet::new();
        let mut used_ports = BTreeSet::new();
        let mut resolved = Vec::with_capacity(listeners.len());

        for listener in listeners {
            validate_listener(listener)?;
            if !names.insert(listener.name.as_str()) {
                return Err(ModelError::invalid(format!(
                    "Listener name '{}' is used more than once in spec.kafka.listeners",
                    listener.name
                )));
            }
            if !used_ports.insert(listener.port) {
                return Err(ModelError::invalid(format!(
                    "Listener port {} is used more than once in spec.kafka.listeners",
                    listener.port
                )));
            }
            resolved.push(resolve_listener(listener, topology)?);
        }

        Ok(Self { listeners: resolved })
    }

    /// Listeners in declaration order.
    pub fn listeners(&self) -> &[ResolvedListener] {
        &self.listeners
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedListener> {
        self.listeners.iter().find(|l| l.name == name)
    }

    pub fn external(&self) -> impl Iterator<Item = &ResolvedListener> {
        self.listeners.iter().filter(|l| l.is_external())
    }

    pub fn internal(&self) -> impl Iterator<Item = &ResolvedListener> {
        self.listeners.iter().filter(|l| !l.is_external())
    }

    pub fn has_oauth_listener(&self) -> bool {
        self.listeners
            .iter()
            .any(|l| matches!(l.authentication, Some(ListenerAuthentication::Oauth(_))))
    }

    /// One ingress rule per listener.
    pub fn network_policy_ingress_rules(&self) -> Vec<NetworkPolicyIngressRule> {
        self.listeners.iter().map(ResolvedListener::network_policy_rule).collect()
    }

    /// Advertised host per broker and listener: explicit override, then the
    /// observed or configured external address, then the broker's own
    /// cluster-internal address.
    pub fn advertised_hostnames(
        &self,
        topology: &ClusterTopology,
        observed: &ObservedAddresses,
    ) -> AdvertisedMap {
        self.advertised_map(topology, |listener, broker| {
            let mechanism = match &listener.kind {
                ListenerKind::Internal => None,
                ListenerKind::NodePort(_) | ListenerKind::LoadBalancer(_) => observed
                    .broker(&listener.name, broker.broker_id)
                    .and_then(|o| o.host.clone()),
                ListenerKind::Ingress(_) | ListenerKind::Route(_) => broker.host.clone().or_else(|| {
                    observed
                        .broker(&listener.name, broker.broker_id)
                        .and_then(|o| o.host.clone())
                }),
            };
            let fallback = mechanism.unwrap_or_else(|| host_of(&broker.service_address));
            listener.advertised_host(broker.broker_id, &fallback)
        })
    }

    /// Advertised port per broker and listener, with the same precedence as
    /// [`ListenerTable::advertised_hostnames`].
    pub fn advertised_ports(
        &self,
        topology: &ClusterTopology,
        observed: &ObservedAddresses,
    ) -> AdvertisedMap {
        self.advertised_map(topology, |listener, broker| {
            let observed_port = match listener.kind {
                ListenerKind::NodePort(_) | ListenerKind::LoadBalancer(_) => observed
                    .broker(&listener.name, broker.broker_id)
                    .and_then(|o| o.port),
                _ => None,
            };
            let fallback =
                observed_port.unwrap_or_else(|| listener.default_external_port(broker.broker_id));
            listener.advertised_port(broker.broker_id, fallback)
        })
    }

    fn advertised_map<F>(&self, topology: &ClusterTopology, value: F) -> AdvertisedMap
    where
        F: Fn(&ResolvedListener, &ResolvedAddress) -> String,
    {
        topology
            .node_ids()
            .map(|broker_id| {
                let row = self
                    .listeners
                    .iter()
                    .filter_map(|listener| {
                        listener
                            .broker(broker_id)
                            .map(|broker| (listener.env_name(), value(listener, broker)))
                    })
                    .collect();
                (broker_id, row)
            })
            .collect()
    }

    /// External names and IPs declared on listeners plus those observed on
    /// the platform. Internal listeners contribute nothing.
    pub fn external_addresses(&self, observed: &ObservedAddresses) -> ExternalAddresses {
        let mut addresses = ExternalAddresses::default();

        for listener in self.external() {
            if let ListenerKind::Ingress(IngressExposure { bootstrap_host, .. })
            | ListenerKind::Route(RouteExposure { bootstrap_host }) = &listener.kind
            {
                addresses.bootstrap.insert(bootstrap_host.clone());
            }
            addresses
                .bootstrap
                .extend(listener.bootstrap.alternative_names.iter().cloned());
            addresses.bootstrap.extend(observed.bootstrap(&listener.name).cloned());

            for broker in listener.brokers() {
                let entry = addresses.brokers.entry(broker.broker_id).or_default();
                entry.extend(broker.host.iter().cloned());
                entry.extend(
                    broker
                        .advertised_host
                        .iter()
                        .filter(|h| !h.is_empty())
                        .cloned(),
                );
                if let Some(host) = observed
                    .broker(&listener.name, broker.broker_id)
                    .and_then(|o| o.host.clone())
                {
                    entry.insert(host);
                }
            }
        }

        addresses.brokers.retain(|_, hosts| !hosts.is_empty());
        addresses
    }

    /// Only the addresses declared in the resource itself.
    pub fn declared_external_addresses(&self) -> ExternalAddresses {
        self.external_addresses(&ObservedAddresses::default())
    }

    /// Bootstrap servers per listener for the resource status.
    pub fn listener_statuses(&self) -> Vec<ListenerStatus> {
        self.listeners
            .iter()
            .map(|l| ListenerStatus {
                name: l.name.clone(),
                bootstrap_servers: l.bootstrap.address.clone(),
            })
            .collect()
    }
}

fn host_of(address: &str) -> String {
    address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address)
        .to_string()
}

fn listener_path(listener: &GenericListener) -> String {
    format!("spec.kafka.listeners[name={}]", listener.name)
}

fn validate_listener(listener: &GenericListener) -> Result<()> {
    let name = &listener.name;
    if name.is_empty()
        || name.len() > 11
        || !name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return Err(ModelError::invalid(format!(
            "Listener name '{name}' must consist of 1 to 11 lowercase letters or digits \
             (spec.kafka.listeners[].name)"
        )));
    }

    let port = listener.port;
    if port < ports::MIN_LISTENER || port > 65535 || port == ports::METRICS || port == ports::JMX {
        return Err(ModelError::invalid(format!(
            "Port {port} of {} is forbidden, listener ports must be between {} and 65535 \
             and must not be {} or {}",
            listener_path(listener),
            ports::MIN_LISTENER,
            ports::METRICS,
            ports::JMX
        )));
    }

    if matches!(listener.type_, ListenerType::Ingress | ListenerType::Route) && !listener.tls {
        return Err(ModelError::invalid(format!(
            "Listener '{name}' of type {} requires tls to be enabled ({}.tls)",
            listener.type_.as_str(),
            listener_path(listener)
        )));
    }
    Ok(())
}

fn resolve_listener(listener: &GenericListener, topology: &ClusterTopology) -> Result<ResolvedListener> {
    let config = listener.configuration.clone().unwrap_or_default();
    let path = listener_path(listener);

    let overrides: BTreeMap<i32, &BrokerListenerOverride> =
        config.brokers.iter().rev().map(|o| (o.broker, o)).collect();
    for id in overrides.keys().filter(|id| **id < 0 || **id >= topology.replicas()) {
        debug!(listener = %listener.name, broker = id, "Ignoring override for a broker outside the cluster");
    }

    let kind = resolve_kind(listener, &config, &overrides, topology)?;
    let bootstrap_config = config.bootstrap.clone().unwrap_or_default();

    let bootstrap_address = match &kind {
        ListenerKind::Internal => format!(
            "{}:{}",
            topology.service_dns_name(&topology.bootstrap_service_name()),
            listener.port
        ),
        ListenerKind::LoadBalancer(lb) if !lb.create_bootstrap_service => format!(
            "{}:{}",
            topology.service_dns_name(&topology.bootstrap_service_name()),
            listener.port
        ),
        ListenerKind::NodePort(_) | ListenerKind::LoadBalancer(_) => format!(
            "{}:{}",
            topology.service_dns_name(&topology.external_bootstrap_service_name(&listener.name)),
            listener.port
        ),
        ListenerKind::Ingress(IngressExposure { bootstrap_host, .. }) => {
            format!("{bootstrap_host}:{}", ports::INGRESS)
        }
        ListenerKind::Route(RouteExposure { bootstrap_host }) => {
            format!("{bootstrap_host}:{}", ports::ROUTE)
        }
    };

    let brokers = topology
        .node_ids()
        .map(|broker_id| {
            let o = overrides.get(&broker_id).copied();
            let service_address = match &kind {
                ListenerKind::Internal => {
                    format!("{}:{}", topology.pod_dns_name(broker_id), listener.port)
                }
                _ => format!(
                    "{}:{}",
                    topology.service_dns_name(
                        &topology.external_broker_service_name(&listener.name, broker_id)
                    ),
                    listener.port
                ),
            };
            let address = ResolvedAddress {
                broker_id,
                advertised_host: o.and_then(|o| o.advertised_host.clone()),
                advertised_port: o.and_then(|o| o.advertised_port),
                host: o.and_then(|o| o.host.clone()),
                node_port: o.and_then(|o| o.node_port),
                load_balancer_ip: o.and_then(|o| o.load_balancer_ip.clone()),
                labels: o.map(|o| o.labels.clone()).unwrap_or_default(),
                annotations: o.map(|o| o.annotations.clone()).unwrap_or_default(),
                service_address,
                bootstrap_address: bootstrap_address.clone(),
            };
            (broker_id, address)
        })
        .collect();

    debug!(listener = %listener.name, path = %path, "Resolved listener");

    Ok(ResolvedListener {
        name: listener.name.clone(),
        port: listener.port,
        tls: listener.tls,
        authentication: listener.authentication.clone(),
        network_policy_peers: listener.network_policy_peers.clone(),
        ip_family_policy: config.ip_family_policy,
        ip_families: config.ip_families.clone(),
        kind,
        bootstrap: BootstrapAddress {
            node_port: bootstrap_config.node_port,
            load_balancer_ip: bootstrap_config.load_balancer_ip,
            alternative_names: bootstrap_config.alternative_names,
            labels: bootstrap_config.labels,
            annotations: bootstrap_config.annotations,
            address: bootstrap_address,
        },
        brokers,
    })
}

fn resolve_kind(
    listener: &GenericListener,
    config: &ListenerConfiguration,
    overrides: &BTreeMap<i32, &BrokerListenerOverride>,
    topology: &ClusterTopology,
) -> Result<ListenerKind> {
    let kind = match listener.type_ {
        ListenerType::Internal => ListenerKind::Internal,
        ListenerType::NodePort => ListenerKind::NodePort(NodePortExposure {
            external_traffic_policy: config.external_traffic_policy,
            preferred_address_type: config.preferred_node_port_address_type,
        }),
        ListenerType::LoadBalancer => ListenerKind::LoadBalancer(LoadBalancerExposure {
            external_traffic_policy: config
                .external_traffic_policy
                .unwrap_or(ExternalTrafficPolicy::Cluster),
            source_ranges: config.load_balancer_source_ranges.clone(),
            finalizers: config.finalizers.clone(),
            create_bootstrap_service: config.create_bootstrap_service,
        }),
        ListenerType::Ingress => ListenerKind::Ingress(IngressExposure {
            class: config.ingress_class.clone(),
            bootstrap_host: required_hosts(listener, config, overrides, topology)?,
        }),
        ListenerType::Route => ListenerKind::Route(RouteExposure {
            bootstrap_host: required_hosts(listener, config, overrides, topology)?,
        }),
    };
    Ok(kind)
}

/// Ingress and route listeners are reached by host name only, so every
/// broker and the bootstrap need one. Returns the bootstrap host.
fn required_hosts(
    listener: &GenericListener,
    config: &ListenerConfiguration,
    overrides: &BTreeMap<i32, &BrokerListenerOverride>,
    topology: &ClusterTopology,
) -> Result<String> {
    let path = listener_path(listener);
    for broker_id in topology.node_ids() {
        let host = overrides
            .get(&broker_id)
            .and_then(|o| o.host.as_deref())
            .filter(|h| !h.trim().is_empty());
        if host.is_none() {
            return Err(ModelError::invalid(format!(
                "Listener '{}' of type {} requires a host for broker {broker_id} \
                 ({path}.configuration.brokers[broker={broker_id}].host)",
                listener.name,
                listener.type_.as_str()
            )));
        }
    }

    config
        .bootstrap
        .as_ref()
        .and_then(|b| b.host.clone())
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| {
            ModelError::invalid(format!(
                "Listener '{}' of type {} requires a bootstrap host ({path}.configuration.bootstrap.host)",
                listener.name,
                listener.type_.as_str()
            ))
        })
}

/// Convenience for the label a broker-facing resource of `listener` carries.
pub fn listener_label(listener: &ResolvedListener) -> (String, String) {
    (
        format!("{}/listener", constants::API_GROUP),
        listener.name.clone(),
    )
}
