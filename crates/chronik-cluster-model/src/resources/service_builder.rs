use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::constants::ports;
use crate::crds::{NodeTemplate, ResourceTemplate};
use crate::listeners::{listener_label, ListenerKind, ListenerTable, ResolvedListener};
use crate::resources::object_meta;
use crate::topology::{ClusterTopology, NodeRole};

fn tcp_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(format!("tcp-{name}")),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

/// Ports every node of the role listens on besides client listeners.
fn role_ports(role: NodeRole) -> Vec<ServicePort> {
    match role {
        NodeRole::Kafka => vec![
            tcp_port("ctrlplane", ports::CONTROLPLANE),
            tcp_port("replication", ports::REPLICATION),
        ],
        NodeRole::Zookeeper => vec![
            tcp_port("clients", ports::ZOOKEEPER_CLIENT),
            tcp_port("clustering", ports::ZOOKEEPER_CLUSTER),
            tcp_port("election", ports::ZOOKEEPER_ELECTION),
        ],
    }
}

/// Build the headless Service giving every pod of the role a stable DNS name.
pub fn build_headless_service(
    topology: &ClusterTopology,
    listeners: &ListenerTable,
    template: Option<&NodeTemplate>,
    owner_ref: &OwnerReference,
) -> Service {
    let mut service_ports = role_ports(topology.role());
    service_ports.extend(listeners.internal().map(|l| tcp_port(&l.name, l.port)));

    Service {
        metadata: object_meta(
            topology.headless_service_name(),
            topology.namespace(),
            topology.labels(),
            template.and_then(|t| t.headless_service.as_ref()),
            Some(owner_ref),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            cluster_ip: Some("None".into()),
            selector: Some(topology.selector_labels()),
            ports: Some(service_ports),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the in-cluster bootstrap Service (the client Service for ZooKeeper).
pub fn build_bootstrap_service(
    topology: &ClusterTopology,
    listeners: &ListenerTable,
    template: Option<&NodeTemplate>,
    owner_ref: &OwnerReference,
) -> Service {
    let service_ports = match topology.role() {
        NodeRole::Kafka => std::iter::once(tcp_port("replication", ports::REPLICATION))
            .chain(listeners.internal().map(|l| tcp_port(&l.name, l.port)))
            .collect(),
        NodeRole::Zookeeper => vec![tcp_port("clients", ports::ZOOKEEPER_CLIENT)],
    };

    Service {
        metadata: object_meta(
            topology.bootstrap_service_name(),
            topology.namespace(),
            topology.labels(),
            template.and_then(|t| t.bootstrap_service.as_ref()),
            Some(owner_ref),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            selector: Some(topology.selector_labels()),
            ports: Some(service_ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_type(listener: &ResolvedListener) -> &'static str {
    match listener.kind {
        ListenerKind::NodePort(_) => "NodePort",
        ListenerKind::LoadBalancer(_) => "LoadBalancer",
        ListenerKind::Internal | ListenerKind::Ingress(_) | ListenerKind::Route(_) => "ClusterIP",
    }
}

/// Spec fields shared by the bootstrap and per-broker services of an
/// external listener.
fn external_spec(
    listener: &ResolvedListener,
    selector: BTreeMap<String, String>,
    node_port: Option<i32>,
    load_balancer_ip: Option<&str>,
) -> ServiceSpec {
    let is_load_balancer = matches!(listener.kind, ListenerKind::LoadBalancer(_));
    let is_node_port = matches!(listener.kind, ListenerKind::NodePort(_));
    let source_ranges = listener.load_balancer_source_ranges();

    ServiceSpec {
        type_: Some(service_type(listener).into()),
        selector: Some(selector),
        ports: Some(vec![ServicePort {
            node_port: if is_node_port { node_port } else { None },
            ..tcp_port(&listener.name, listener.port)
        }]),
        external_traffic_policy: listener.external_traffic_policy().map(|p| p.as_str().into()),
        load_balancer_ip: load_balancer_ip.filter(|_| is_load_balancer).map(str::to_string),
        load_balancer_source_ranges: (!source_ranges.is_empty()).then(|| source_ranges.to_vec()),
        ip_family_policy: listener.ip_family_policy.map(|p| p.as_str().into()),
        ip_families: (!listener.ip_families.is_empty())
            .then(|| listener.ip_families.iter().map(|f| f.as_str().to_string()).collect()),
        ..Default::default()
    }
}

fn listener_labels(topology: &ClusterTopology, listener: &ResolvedListener) -> BTreeMap<String, String> {
    let mut labels = topology.labels();
    let (key, value) = listener_label(listener);
    labels.insert(key, value);
    labels
}

/// Build the bootstrap Service of an external listener, if it has one.
pub fn build_external_bootstrap_service(
    topology: &ClusterTopology,
    listener: &ResolvedListener,
    owner_ref: &OwnerReference,
) -> Option<Service> {
    if !listener.has_external_bootstrap_service() {
        return None;
    }
    let template = ResourceTemplate {
        labels: listener.bootstrap.labels.clone(),
        annotations: listener.bootstrap.annotations.clone(),
    };
    let mut metadata = object_meta(
        topology.external_bootstrap_service_name(&listener.name),
        topology.namespace(),
        listener_labels(topology, listener),
        Some(&template),
        Some(owner_ref),
    );
    let finalizers = listener.finalizers();
    metadata.finalizers = (!finalizers.is_empty()).then(|| finalizers.to_vec());

    Some(Service {
        metadata,
        spec: Some(external_spec(
            listener,
            topology.selector_labels(),
            listener.bootstrap_node_port(),
            listener.bootstrap_load_balancer_ip(),
        )),
        ..Default::default()
    })
}

/// Build one Service per broker for an external listener, each selecting
/// exactly that broker's pod.
pub fn build_external_broker_services(
    topology: &ClusterTopology,
    listener: &ResolvedListener,
    owner_ref: &OwnerReference,
) -> Vec<Service> {
    if !listener.is_external() {
        return Vec::new();
    }
    let finalizers = listener.finalizers();

    listener
        .brokers()
        .map(|broker| {
            let template = ResourceTemplate {
                labels: broker.labels.clone(),
                annotations: broker.annotations.clone(),
            };
            let mut metadata = object_meta(
                topology.external_broker_service_name(&listener.name, broker.broker_id),
                topology.namespace(),
                listener_labels(topology, listener),
                Some(&template),
                Some(owner_ref),
            );
            metadata.finalizers = (!finalizers.is_empty()).then(|| finalizers.to_vec());

            Service {
                metadata,
                spec: Some(external_spec(
                    listener,
                    topology.pod_selector_labels(broker.broker_id),
                    listener.broker_node_port(broker.broker_id),
                    listener.broker_load_balancer_ip(broker.broker_id),
                )),
                ..Default::default()
            }
        })
        .collect()
}

/// All Services of a role: headless, bootstrap, and for Kafka the external
/// listener services.
pub fn build_services(
    topology: &ClusterTopology,
    listeners: &ListenerTable,
    template: Option<&NodeTemplate>,
    owner_ref: &OwnerReference,
) -> Vec<Service> {
    let mut services = vec![
        build_headless_service(topology, listeners, template, owner_ref),
        build_bootstrap_service(topology, listeners, template, owner_ref),
    ];
    for listener in listeners.external() {
        services.extend(build_external_bootstrap_service(topology, listener, owner_ref));
        services.extend(build_external_broker_services(topology, listener, owner_ref));
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::labels as lbl;
    use crate::crds::{
        BootstrapConfiguration, BrokerListenerOverride, ExternalTrafficPolicy, GenericListener, IpFamily,
        IpFamilyPolicy, ListenerConfiguration, ListenerType,
    };
    use crate::listeners::tests::{broker_override, ingress_listener, listener};
    use crate::resources::tests::test_owner_ref;

    fn topology() -> ClusterTopology {
        ClusterTopology::kafka("foo", "test", 3)
    }

    fn spec(service: &Service) -> &ServiceSpec {
        service.spec.as_ref().unwrap()
    }

    fn port_names(service: &Service) -> Vec<String> {
        spec(service)
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .filter_map(|p| p.name.clone())
            .collect()
    }

    fn node_port_listener() -> GenericListener {
        GenericListener {
            configuration: Some(ListenerConfiguration {
                bootstrap: Some(BootstrapConfiguration {
                    node_port: Some(32001),
                    ..Default::default()
                }),
                brokers: vec![BrokerListenerOverride {
                    node_port: Some(32101),
                    annotations: BTreeMap::from([(
                        "dns".to_string(),
                        "broker-1.example.com".to_string(),
                    )]),
                    ..broker_override(1)
                }],
                external_traffic_policy: Some(ExternalTrafficPolicy::Local),
                ip_family_policy: Some(IpFamilyPolicy::PreferDualStack),
                ip_families: vec![IpFamily::IPv4, IpFamily::IPv6],
                ..Default::default()
            }),
            ..listener("external", 9094, ListenerType::NodePort, true)
        }
    }

    #[test]
    fn test_headless_and_bootstrap_services() {
        let topology = topology();
        let table = ListenerTable::resolve(
            &[
                listener("plain", 9092, ListenerType::Internal, false),
                listener("external", 9094, ListenerType::NodePort, true),
            ],
            &topology,
        )
        .unwrap();

        let headless = build_headless_service(&topology, &table, None, &test_owner_ref());
        assert_eq!(headless.metadata.name.as_deref(), Some("foo-kafka-brokers"));
        assert_eq!(spec(&headless).cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec(&headless).publish_not_ready_addresses, Some(true));
        assert_eq!(port_names(&headless), vec!["tcp-ctrlplane", "tcp-replication", "tcp-plain"]);

        let bootstrap = build_bootstrap_service(&topology, &table, None, &test_owner_ref());
        assert_eq!(bootstrap.metadata.name.as_deref(), Some("foo-kafka-bootstrap"));
        assert_eq!(port_names(&bootstrap), vec!["tcp-replication", "tcp-plain"]);
        assert_eq!(spec(&bootstrap).selector.as_ref().unwrap()[lbl::NAME], "foo-kafka");
    }

    #[test]
    fn test_zookeeper_services() {
        let topology = ClusterTopology::zookeeper("foo", "test", 3);
        let services = build_services(&topology, &ListenerTable::default(), None, &test_owner_ref());
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].metadata.name.as_deref(), Some("foo-zookeeper-nodes"));
        assert_eq!(
            port_names(&services[0]),
            vec!["tcp-clients", "tcp-clustering", "tcp-election"]
        );
        assert_eq!(services[1].metadata.name.as_deref(), Some("foo-zookeeper-client"));
        assert_eq!(port_names(&services[1]), vec!["tcp-clients"]);
    }

    #[test]
    fn test_node_port_services_keep_ports_independent() {
        let topology = topology();
        let nodeport = node_port_listener();
        let table = ListenerTable::resolve(&[nodeport], &topology).unwrap();
        let resolved = table.get("external").unwrap();

        let bootstrap =
            build_external_bootstrap_service(&topology, resolved, &test_owner_ref()).unwrap();
        assert_eq!(bootstrap.metadata.name.as_deref(), Some("foo-kafka-external-bootstrap"));
        assert_eq!(spec(&bootstrap).type_.as_deref(), Some("NodePort"));
        assert_eq!(spec(&bootstrap).ports.as_ref().unwrap()[0].node_port, Some(32001));
        assert_eq!(spec(&bootstrap).external_traffic_policy.as_deref(), Some("Local"));
        assert_eq!(
            spec(&bootstrap).ip_families.as_ref().unwrap(),
            &vec!["IPv4".to_string(), "IPv6".to_string()]
        );
        assert_eq!(spec(&bootstrap).ip_family_policy.as_deref(), Some("PreferDualStack"));

        let brokers = build_external_broker_services(&topology, resolved, &test_owner_ref());
        assert_eq!(brokers.len(), 3);
        assert_eq!(brokers[0].metadata.name.as_deref(), Some("foo-kafka-0"));
        assert_eq!(spec(&brokers[0]).ports.as_ref().unwrap()[0].node_port, None);
        assert_eq!(spec(&brokers[1]).ports.as_ref().unwrap()[0].node_port, Some(32101));
        assert_eq!(
            spec(&brokers[1]).selector.as_ref().unwrap()[lbl::POD_NAME],
            "foo-kafka-1"
        );
        assert_eq!(
            brokers[1].metadata.labels.as_ref().unwrap()["chronik.io/listener"],
            "external"
        );
        assert_eq!(
            brokers[1].metadata.annotations.as_ref().unwrap()["dns"],
            "broker-1.example.com"
        );
    }

    #[test]
    fn test_load_balancer_services() {
        let topology = topology();
        let lb = GenericListener {
            configuration: Some(ListenerConfiguration {
                bootstrap: Some(BootstrapConfiguration {
                    load_balancer_ip: Some("10.0.0.10".into()),
                    ..Default::default()
                }),
                brokers: vec![BrokerListenerOverride {
                    load_balancer_ip: Some("10.0.0.11".into()),
                    ..broker_override(0)
                }],
                load_balancer_source_ranges: vec!["10.0.0.0/8".into()],
                finalizers: vec!["service.kubernetes.io/load-balancer-cleanup".into()],
                ..Default::default()
            }),
            ..listener("lb", 9095, ListenerType::LoadBalancer, true)
        };
        let table = ListenerTable::resolve(&[lb], &topology).unwrap();
        let services = build_services(&topology, &table, None, &test_owner_ref());
        assert_eq!(services.len(), 6);

        let bootstrap = &services[2];
        assert_eq!(bootstrap.metadata.name.as_deref(), Some("foo-kafka-lb-bootstrap"));
        assert_eq!(spec(bootstrap).type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(spec(bootstrap).load_balancer_ip.as_deref(), Some("10.0.0.10"));
        assert_eq!(spec(bootstrap).external_traffic_policy.as_deref(), Some("Cluster"));
        assert_eq!(
            spec(bootstrap).load_balancer_source_ranges.as_ref().unwrap(),
            &vec!["10.0.0.0/8".to_string()]
        );
        assert_eq!(
            bootstrap.metadata.finalizers.as_ref().unwrap(),
            &vec!["service.kubernetes.io/load-balancer-cleanup".to_string()]
        );

        assert_eq!(services[3].metadata.name.as_deref(), Some("foo-kafka-lb-0"));
        assert_eq!(spec(&services[3]).load_balancer_ip.as_deref(), Some("10.0.0.11"));
        assert_eq!(spec(&services[4]).load_balancer_ip, None);
    }

    #[test]
    fn test_load_balancer_without_bootstrap_service() {
        let topology = topology();
        let lb = GenericListener {
            configuration: Some(ListenerConfiguration {
                create_bootstrap_service: false,
                ..Default::default()
            }),
            ..listener("lb", 9095, ListenerType::LoadBalancer, true)
        };
        let table = ListenerTable::resolve(&[lb], &topology).unwrap();
        assert!(build_external_bootstrap_service(&topology, table.get("lb").unwrap(), &test_owner_ref()).is_none());
        assert_eq!(build_services(&topology, &table, None, &test_owner_ref()).len(), 5);
    }

    #[test]
    fn test_ingress_services_are_cluster_ip() {
        let topology = topology();
        let table = ListenerTable::resolve(&[ingress_listener(3)], &topology).unwrap();
        let services = build_services(&topology, &table, None, &test_owner_ref());
        assert_eq!(services.len(), 6);
        for service in &services[2..] {
            assert_eq!(spec(service).type_.as_deref(), Some("ClusterIP"));
            assert!(spec(service).external_traffic_policy.is_none());
        }
    }
}
