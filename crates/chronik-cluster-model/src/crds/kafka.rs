use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Condition, ListenerStatus, NodeTemplate};
use super::listener::GenericListener;
use super::storage::Storage;

/// A Kafka cluster with its coordination layer.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chronik.io",
    version = "v1alpha1",
    kind = "ChronikKafka",
    namespaced,
    status = "ChronikKafkaStatus",
    shortname = "ck",
    printcolumn = r#"{"name":"Brokers","type":"integer","jsonPath":".spec.kafka.replicas"}"#,
    printcolumn = r#"{"name":"KRaft","type":"boolean","jsonPath":".spec.kafka.kraft"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChronikKafkaSpec {
    pub kafka: KafkaSpec,

    /// ZooKeeper ensemble. Ignored when `kafka.kraft` is set.
    #[serde(default)]
    pub zookeeper: Option<ZookeeperSpec>,

    /// Cluster CA settings.
    #[serde(default)]
    pub cluster_ca: Option<CertificateAuthoritySpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    /// Number of brokers.
    #[serde(default = "super::defaults::replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub listeners: Vec<GenericListener>,

    pub storage: Storage,

    /// Broker configuration passed through to `server.config`.
    #[serde(default)]
    #[schemars(schema_with = "super::common::preserve_unknown_fields")]
    pub config: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub authorization: Option<KafkaAuthorization>,

    /// Run brokers as combined broker/controller nodes without ZooKeeper.
    #[serde(default)]
    pub kraft: bool,

    #[serde(default)]
    pub metrics_enabled: bool,

    #[serde(default)]
    pub jmx_enabled: bool,

    #[serde(default = "super::defaults::gc_logging_enabled")]
    pub gc_logging_enabled: bool,

    #[serde(default)]
    pub template: Option<NodeTemplate>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperSpec {
    #[serde(default = "super::defaults::replicas")]
    pub replicas: i32,

    pub storage: Storage,

    #[serde(default)]
    #[schemars(schema_with = "super::common::preserve_unknown_fields")]
    pub config: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub metrics_enabled: bool,

    #[serde(default = "super::defaults::gc_logging_enabled")]
    pub gc_logging_enabled: bool,

    #[serde(default)]
    pub template: Option<NodeTemplate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KafkaAuthorization {
    Simple(SimpleAuthorization),
    /// Delegates to Keycloak Authorization Services. Needs an `oauth` listener.
    Keycloak(KeycloakAuthorization),
}

impl JsonSchema for KafkaAuthorization {
    fn schema_name() -> String {
        "KafkaAuthorization".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        super::common::tagged_object_schema(
            &["simple", "keycloak"],
            vec![
                ("superUsers", gen.subschema_for::<Vec<String>>()),
                ("clientId", gen.subschema_for::<String>()),
                ("tokenEndpointUri", gen.subschema_for::<String>()),
                ("delegateToKafkaAcls", gen.subschema_for::<bool>()),
            ],
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimpleAuthorization {
    #[serde(default)]
    pub super_users: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakAuthorization {
    pub client_id: String,

    pub token_endpoint_uri: String,

    #[serde(default)]
    pub super_users: Vec<String>,

    #[serde(default)]
    pub delegate_to_kafka_acls: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthoritySpec {
    #[serde(default = "super::defaults::ca_validity_days")]
    pub validity_days: u32,

    #[serde(default = "super::defaults::ca_renewal_days")]
    pub renewal_days: u32,

    #[serde(default)]
    pub certificate_expiration_policy: CertificateExpirationPolicy,
}

impl Default for CertificateAuthoritySpec {
    fn default() -> Self {
        Self {
            validity_days: super::defaults::ca_validity_days(),
            renewal_days: super::defaults::ca_renewal_days(),
            certificate_expiration_policy: CertificateExpirationPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateExpirationPolicy {
    #[default]
    RenewCertificate,
    ReplaceKey,
}

/// Status of a ChronikKafka cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChronikKafkaStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub listeners: Vec<ListenerStatus>,

    /// KRaft cluster id, fixed once the cluster has been created.
    #[serde(default)]
    pub cluster_id: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}
