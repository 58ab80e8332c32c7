use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::crds::ResourceTemplate;
use crate::listeners::{listener_label, IngressExposure, ListenerKind, ResolvedListener};
use crate::resources::{merged, object_meta};
use crate::topology::ClusterTopology;

/// TLS passthrough annotations for the NGINX ingress controller.
fn passthrough_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("ingress.kubernetes.io/ssl-passthrough".to_string(), "true".to_string()),
        ("nginx.ingress.kubernetes.io/ssl-passthrough".to_string(), "true".to_string()),
        ("nginx.ingress.kubernetes.io/backend-protocol".to_string(), "HTTPS".to_string()),
    ])
}

fn ingress(
    topology: &ClusterTopology,
    listener: &ResolvedListener,
    class: Option<&str>,
    name: String,
    host: &str,
    template: ResourceTemplate,
    owner_ref: &OwnerReference,
) -> Ingress {
    let mut labels = topology.labels();
    let (key, value) = listener_label(listener);
    labels.insert(key, value);
    let template = ResourceTemplate {
        annotations: merged(passthrough_annotations(), &template.annotations),
        ..template
    };

    Ingress {
        metadata: object_meta(name.clone(), topology.namespace(), labels, Some(&template), Some(owner_ref)),
        spec: Some(IngressSpec {
            ingress_class_name: class.map(str::to_string),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".into()),
                        path_type: "Prefix".into(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name,
                                port: Some(ServiceBackendPort {
                                    number: Some(listener.port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.to_string()]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the bootstrap and per-broker Ingresses of an ingress listener.
/// Each Ingress routes to the Service of the same name. Other listener
/// kinds get none.
pub fn build_ingresses(
    topology: &ClusterTopology,
    listener: &ResolvedListener,
    owner_ref: &OwnerReference,
) -> Vec<Ingress> {
    let ListenerKind::Ingress(IngressExposure { class, bootstrap_host }) = &listener.kind else {
        return Vec::new();
    };

    let bootstrap = ingress(
        topology,
        listener,
        class.as_deref(),
        topology.external_bootstrap_service_name(&listener.name),
        bootstrap_host,
        ResourceTemplate {
            labels: listener.bootstrap.labels.clone(),
            annotations: listener.bootstrap.annotations.clone(),
        },
        owner_ref,
    );

    std::iter::once(bootstrap)
        .chain(listener.brokers().filter_map(|broker| {
            let host = broker.host.as_deref()?;
            Some(ingress(
                topology,
                listener,
                class.as_deref(),
                topology.external_broker_service_name(&listener.name, broker.broker_id),
                host,
                ResourceTemplate {
                    labels: broker.labels.clone(),
                    annotations: broker.annotations.clone(),
                },
                owner_ref,
            ))
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::ListenerType;
    use crate::listeners::tests::{ingress_listener, listener};
    use crate::listeners::ListenerTable;
    use crate::resources::tests::test_owner_ref;

    fn rule_host(ingress: &Ingress) -> &str {
        ingress.spec.as_ref().unwrap().rules.as_ref().unwrap()[0]
            .host
            .as_deref()
            .unwrap()
    }

    fn backend_service(ingress: &Ingress) -> &str {
        let rule = &ingress.spec.as_ref().unwrap().rules.as_ref().unwrap()[0];
        &rule.http.as_ref().unwrap().paths[0]
            .backend
            .service
            .as_ref()
            .unwrap()
            .name
    }

    #[test]
    fn test_ingress_per_broker_and_bootstrap() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        let table = ListenerTable::resolve(&[ingress_listener(3)], &topology).unwrap();
        let ingresses = build_ingresses(&topology, table.get("external").unwrap(), &test_owner_ref());

        assert_eq!(ingresses.len(), 4);
        assert_eq!(rule_host(&ingresses[0]), "bootstrap.my-domain.org");
        assert_eq!(backend_service(&ingresses[0]), "foo-kafka-external-bootstrap");
        assert_eq!(rule_host(&ingresses[2]), "broker-1.my-domain.org");
        assert_eq!(backend_service(&ingresses[2]), "foo-kafka-1");

        let spec = ingresses[1].spec.as_ref().unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        assert_eq!(
            spec.tls.as_ref().unwrap()[0].hosts.as_ref().unwrap(),
            &vec!["broker-0.my-domain.org".to_string()]
        );
        assert_eq!(
            ingresses[1].metadata.annotations.as_ref().unwrap()["nginx.ingress.kubernetes.io/ssl-passthrough"],
            "true"
        );
    }

    #[test]
    fn test_non_ingress_listener_has_no_ingresses() {
        let topology = ClusterTopology::kafka("foo", "test", 3);
        let table = ListenerTable::resolve(
            &[listener("external", 9094, ListenerType::NodePort, true)],
            &topology,
        )
        .unwrap();
        assert!(build_ingresses(&topology, table.get("external").unwrap(), &test_owner_ref()).is_empty());
    }
}
