//! Cluster models assembled from a `ChronikKafka` resource.
//!
//! [`KafkaCluster::from_crd`] and [`ZookeeperCluster::from_crd`] validate the
//! resource, reconcile storage against the previously applied state and
//! resolve listeners, in that order. The resulting model is read-only and
//! generates every object the control loop applies.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, EnvVar, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::certificates::{build_sans, CertificateAuthority, NodeCertificateRequest, NodeSans};
use crate::config_generator::{
    self, render_per_broker, render_shared, render_zookeeper_config, BrokerConfigParams,
    CoordinationMode, MetricsAndLogging,
};
use crate::constants::{annotations, config_keys};
use crate::crds::{
    ChronikKafka, Condition, KafkaAuthorization, ListenerStatus, NodeTemplate, Storage,
};
use crate::environment::{kafka_env_vars, merge_env_vars, zookeeper_env_vars, ReservedNames};
use crate::error::{ModelError, Result};
use crate::listeners::{AdvertisedMap, ListenerTable, ObservedAddresses};
use crate::resources::{
    configmap_builder, ingress_builder, network_policy_builder, owner_reference, pvc_builder,
    service_builder,
};
use crate::storage::{decode_storage_annotation, encode_storage_annotation, reconcile_storage};
use crate::topology::{ClusterTopology, NodeRole};

/// What is known about the nodes already deployed for one role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreviousState {
    /// Storage the nodes were provisioned with, if recorded.
    pub storage: Option<Storage>,
    /// Number of nodes currently provisioned.
    pub replicas: i32,
}

impl PreviousState {
    /// Read the previous state from the annotations of the deployed
    /// workload. A missing storage annotation is not an error.
    pub fn from_annotations(workload_annotations: &BTreeMap<String, String>, replicas: i32) -> Result<Self> {
        let storage = workload_annotations
            .get(annotations::STORAGE)
            .map(|value| decode_storage_annotation(value))
            .transpose()?;
        Ok(Self { storage, replicas })
    }

    fn nodes_exist(&self) -> bool {
        self.replicas > 0
    }
}

fn cluster_identity(kafka: &ChronikKafka) -> Result<(String, String)> {
    let namespace = kafka
        .namespace()
        .ok_or_else(|| ModelError::invalid("metadata.namespace is missing on the ChronikKafka resource"))?;
    Ok((kafka.name_any(), namespace))
}

fn validate_replicas(role: NodeRole, replicas: i32) -> Result<()> {
    if replicas < 1 {
        return Err(ModelError::invalid(format!(
            "{}.replicas must be at least 1, got {replicas}",
            role.spec_path()
        )));
    }
    Ok(())
}

fn reconcile_role_storage(
    role: NodeRole,
    requested: &Storage,
    previous: Option<&PreviousState>,
) -> Result<(Storage, Vec<Condition>)> {
    let reconciliation = reconcile_storage(
        role,
        requested,
        previous.and_then(|p| p.storage.as_ref()),
        previous.map(|p| p.replicas).unwrap_or_default(),
        previous.is_some_and(PreviousState::nodes_exist),
    )?;
    Ok((reconciliation.storage, reconciliation.warnings))
}

/// The broker side of a cluster.
#[derive(Clone, Debug)]
pub struct KafkaCluster {
    topology: ClusterTopology,
    owner_ref: OwnerReference,
    listeners: ListenerTable,
    storage: Storage,
    warnings: Vec<Condition>,
    mode: CoordinationMode,
    authorization: Option<KafkaAuthorization>,
    config: BTreeMap<String, serde_json::Value>,
    metrics_enabled: bool,
    jmx_enabled: bool,
    gc_logging_enabled: bool,
    template: Option<NodeTemplate>,
    cluster_ca: CertificateAuthority,
}

impl KafkaCluster {
    pub fn from_crd(kafka: &ChronikKafka, previous: Option<&PreviousState>) -> Result<Self> {
        let (name, namespace) = cluster_identity(kafka)?;
        let spec = &kafka.spec.kafka;

        validate_replicas(NodeRole::Kafka, spec.replicas)?;
        config_generator::validate_broker_config(&spec.config, spec.replicas)?;

        let topology = ClusterTopology::kafka(name.as_str(), namespace, spec.replicas);
        let (storage, warnings) = reconcile_role_storage(NodeRole::Kafka, &spec.storage, previous)?;
        let listeners = ListenerTable::resolve(&spec.listeners, &topology)?;

        if matches!(spec.authorization, Some(KafkaAuthorization::Keycloak(_)))
            && !listeners.has_oauth_listener()
        {
            return Err(ModelError::invalid(
                "Authorization type 'keycloak' requires at least one listener with 'oauth' \
                 authentication (spec.kafka.authorization)",
            ));
        }

        let mode = if spec.kraft {
            let cluster_id = kafka
                .status
                .as_ref()
                .and_then(|s| s.cluster_id.clone())
                .or_else(|| kafka.uid())
                .ok_or_else(|| {
                    ModelError::invalid("KRaft clusters need status.clusterId or metadata.uid")
                })?;
            CoordinationMode::KRaft { cluster_id }
        } else {
            if kafka.spec.zookeeper.is_none() {
                return Err(ModelError::invalid(
                    "spec.zookeeper is required unless spec.kafka.kraft is enabled",
                ));
            }
            CoordinationMode::ZooKeeper
        };

        let cluster_ca =
            CertificateAuthority::cluster_ca(&name, &kafka.spec.cluster_ca.clone().unwrap_or_default());

        Ok(Self {
            topology,
            owner_ref: owner_reference(kafka)?,
            listeners,
            storage,
            warnings,
            mode,
            authorization: spec.authorization.clone(),
            config: spec.config.clone(),
            metrics_enabled: spec.metrics_enabled,
            jmx_enabled: spec.jmx_enabled,
            gc_logging_enabled: spec.gc_logging_enabled,
            template: spec.template.clone(),
            cluster_ca,
        })
    }

    /// Use an existing cluster CA instead of the one described by `spec.clusterCa`.
    pub fn with_cluster_ca(mut self, cluster_ca: CertificateAuthority) -> Self {
        self.cluster_ca = cluster_ca;
        self
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Storage to deploy, possibly the previous one.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn mode(&self) -> &CoordinationMode {
        &self.mode
    }

    pub fn cluster_ca(&self) -> &CertificateAuthority {
        &self.cluster_ca
    }

    /// Conditions to report in the resource status.
    pub fn warnings(&self) -> &[Condition] {
        &self.warnings
    }

    pub fn listener_statuses(&self) -> Vec<ListenerStatus> {
        self.listeners.listener_statuses()
    }

    /// Value of the `chronik.io/storage` annotation recording the applied storage.
    pub fn storage_annotation(&self) -> Result<String> {
        encode_storage_annotation(&self.storage)
    }

    pub fn generate_persistent_volume_claims(&self) -> Vec<PersistentVolumeClaim> {
        pvc_builder::build_persistent_volume_claims(
            &self.topology,
            &self.storage,
            self.template.as_ref().and_then(|t| t.persistent_volume_claim.as_ref()),
            &self.owner_ref,
        )
    }

    pub fn generate_services(&self) -> Vec<Service> {
        service_builder::build_services(
            &self.topology,
            &self.listeners,
            self.template.as_ref(),
            &self.owner_ref,
        )
    }

    pub fn generate_ingresses(&self) -> Vec<Ingress> {
        self.listeners
            .external()
            .flat_map(|l| ingress_builder::build_ingresses(&self.topology, l, &self.owner_ref))
            .collect()
    }

    pub fn generate_network_policy(&self) -> NetworkPolicy {
        network_policy_builder::build_kafka_network_policy(
            &self.topology,
            &self.listeners,
            self.metrics_enabled,
            &self.owner_ref,
        )
    }

    pub fn advertised_hostnames(&self, observed: &ObservedAddresses) -> AdvertisedMap {
        self.listeners.advertised_hostnames(&self.topology, observed)
    }

    pub fn advertised_ports(&self, observed: &ObservedAddresses) -> AdvertisedMap {
        self.listeners.advertised_ports(&self.topology, observed)
    }

    fn config_params(&self) -> BrokerConfigParams<'_> {
        BrokerConfigParams {
            topology: &self.topology,
            listeners: &self.listeners,
            storage: &self.storage,
            mode: &self.mode,
            authorization: self.authorization.as_ref(),
            user_config: &self.config,
        }
    }

    /// The config map every broker mounts.
    pub fn generate_shared_config_map(
        &self,
        metrics_and_logging: &MetricsAndLogging,
        observed: &ObservedAddresses,
    ) -> ConfigMap {
        let shared = render_shared(
            &self.config_params(),
            metrics_and_logging,
            &self.advertised_hostnames(observed),
            &self.advertised_ports(observed),
        );
        configmap_builder::build_config_map(
            &self.topology,
            self.topology.config_map_name(),
            shared.into_data(),
            &self.owner_ref,
        )
    }

    /// One config map per broker with its addresses resolved.
    pub fn generate_per_broker_config_maps(&self, observed: &ObservedAddresses) -> Vec<ConfigMap> {
        let hostnames = self.advertised_hostnames(observed);
        let ports = self.advertised_ports(observed);
        let params = self.config_params();

        self.topology
            .node_ids()
            .map(|broker_id| {
                configmap_builder::build_broker_config_map(
                    &self.topology,
                    broker_id,
                    render_per_broker(&params, broker_id, &hostnames, &ports),
                    &self.owner_ref,
                )
            })
            .collect()
    }

    /// Broker container environment: operator variables, then user
    /// variables that do not collide with them.
    pub fn generate_env_vars(&self) -> Vec<EnvVar> {
        merge_env_vars(
            &ReservedNames::kafka(),
            kafka_env_vars(
                self.metrics_enabled,
                self.gc_logging_enabled,
                self.jmx_enabled,
                &self.mode,
            ),
            self.template.as_ref().map(NodeTemplate::container_env).unwrap_or_default(),
        )
    }

    /// SANs of every broker, including addresses observed on the platform.
    pub fn san_sets(&self, observed: &ObservedAddresses) -> NodeSans {
        let external = self.listeners.external_addresses(observed);
        build_sans(
            &self.topology,
            &self.listeners,
            Some(&external.bootstrap),
            Some(&external.brokers),
        )
    }

    pub fn node_certificate_requests(
        &self,
        observed: &ObservedAddresses,
    ) -> BTreeMap<i32, NodeCertificateRequest> {
        self.cluster_ca
            .node_certificate_requests(&self.topology, &self.san_sets(observed))
    }
}

/// The ZooKeeper ensemble of a cluster running in ZooKeeper mode.
#[derive(Clone, Debug)]
pub struct ZookeeperCluster {
    topology: ClusterTopology,
    owner_ref: OwnerReference,
    storage: Storage,
    warnings: Vec<Condition>,
    config: BTreeMap<String, serde_json::Value>,
    metrics_enabled: bool,
    gc_logging_enabled: bool,
    template: Option<NodeTemplate>,
    cluster_ca: CertificateAuthority,
}

impl ZookeeperCluster {
    pub fn from_crd(kafka: &ChronikKafka, previous: Option<&PreviousState>) -> Result<Self> {
        let (name, namespace) = cluster_identity(kafka)?;
        let spec = kafka.spec.zookeeper.as_ref().ok_or_else(|| {
            ModelError::invalid("spec.zookeeper is required unless spec.kafka.kraft is enabled")
        })?;

        validate_replicas(NodeRole::Zookeeper, spec.replicas)?;
        let topology = ClusterTopology::zookeeper(name.as_str(), namespace, spec.replicas);
        let (storage, warnings) = reconcile_role_storage(NodeRole::Zookeeper, &spec.storage, previous)?;

        let cluster_ca =
            CertificateAuthority::cluster_ca(&name, &kafka.spec.cluster_ca.clone().unwrap_or_default());

        Ok(Self {
            topology,
            owner_ref: owner_reference(kafka)?,
            storage,
            warnings,
            config: spec.config.clone(),
            metrics_enabled: spec.metrics_enabled,
            gc_logging_enabled: spec.gc_logging_enabled,
            template: spec.template.clone(),
            cluster_ca,
        })
    }

    pub fn with_cluster_ca(mut self, cluster_ca: CertificateAuthority) -> Self {
        self.cluster_ca = cluster_ca;
        self
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn warnings(&self) -> &[Condition] {
        &self.warnings
    }

    pub fn storage_annotation(&self) -> Result<String> {
        encode_storage_annotation(&self.storage)
    }

    pub fn generate_persistent_volume_claims(&self) -> Vec<PersistentVolumeClaim> {
        pvc_builder::build_persistent_volume_claims(
            &self.topology,
            &self.storage,
            self.template.as_ref().and_then(|t| t.persistent_volume_claim.as_ref()),
            &self.owner_ref,
        )
    }

    pub fn generate_services(&self) -> Vec<Service> {
        service_builder::build_services(
            &self.topology,
            &ListenerTable::default(),
            self.template.as_ref(),
            &self.owner_ref,
        )
    }

    pub fn generate_network_policy(&self) -> NetworkPolicy {
        network_policy_builder::build_zookeeper_network_policy(
            &self.topology,
            self.metrics_enabled,
            &self.owner_ref,
        )
    }

    pub fn generate_config_map(&self, metrics_and_logging: &MetricsAndLogging) -> ConfigMap {
        let mut data = BTreeMap::from([(
            config_keys::ZOOKEEPER_CONFIG.to_string(),
            render_zookeeper_config(&self.topology, &self.config),
        )]);
        if let Some(metrics) = &metrics_and_logging.metrics {
            data.insert(config_keys::METRICS.to_string(), metrics.clone());
        }
        if let Some(logging) = &metrics_and_logging.logging {
            data.insert(config_keys::LOGGING.to_string(), logging.clone());
        }
        configmap_builder::build_config_map(
            &self.topology,
            self.topology.config_map_name(),
            data,
            &self.owner_ref,
        )
    }

    pub fn generate_env_vars(&self) -> Vec<EnvVar> {
        merge_env_vars(
            &ReservedNames::zookeeper(),
            zookeeper_env_vars(
                self.topology.replicas(),
                self.metrics_enabled,
                self.gc_logging_enabled,
            ),
            self.template.as_ref().map(NodeTemplate::container_env).unwrap_or_default(),
        )
    }

    pub fn san_sets(&self) -> NodeSans {
        build_sans(&self.topology, &ListenerTable::default(), None, None)
    }

    pub fn node_certificate_requests(&self) -> BTreeMap<i32, NodeCertificateRequest> {
        self.cluster_ca
            .node_certificate_requests(&self.topology, &self.san_sets())
    }
}
