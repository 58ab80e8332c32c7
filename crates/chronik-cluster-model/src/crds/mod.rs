pub mod common;
pub mod defaults;
pub mod kafka;
pub mod listener;
pub mod storage;

pub use common::{Condition, ContainerTemplate, EnvVar, ListenerStatus, NodeTemplate, ResourceTemplate};
pub use kafka::{
    CertificateAuthoritySpec, CertificateExpirationPolicy, ChronikKafka, ChronikKafkaSpec,
    ChronikKafkaStatus, KafkaAuthorization, KafkaSpec, ZookeeperSpec,
};
pub use listener::{
    BootstrapConfiguration, BrokerListenerOverride, ExternalTrafficPolicy, GenericListener,
    IpFamily, IpFamilyPolicy, ListenerAuthentication, ListenerConfiguration, ListenerType,
};
pub use storage::{EphemeralStorage, JbodStorage, PersistentClaimStorage, Storage, StorageClassOverride};

/// The `ChronikKafka` CustomResourceDefinition as YAML.
pub fn crd_yaml() -> crate::Result<String> {
    use kube::CustomResourceExt;

    Ok(serde_yaml::to_string(&ChronikKafka::crd())?)
}
