//! Broker and ZooKeeper configuration rendering.
//!
//! The shared broker configuration is the same file for every broker: values
//! only known inside the container (the broker id, advertised addresses) stay
//! `${...}` placeholders that the container start script substitutes. The
//! per-broker variant resolves them for one broker.

use std::collections::BTreeMap;

use tracing::debug;

use crate::constants::{config_keys, defaults, env, listeners as operator_listeners, ports};
use crate::crds::listener::OAuthAuthentication;
use crate::crds::{KafkaAuthorization, ListenerAuthentication, Storage};
use crate::error::{ModelError, Result};
use crate::listeners::{AdvertisedMap, ListenerTable, ResolvedListener};
use crate::topology::ClusterTopology;

/// How brokers coordinate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinationMode {
    /// Brokers connect to a ZooKeeper ensemble.
    ZooKeeper,
    /// Brokers form their own controller quorum.
    KRaft { cluster_id: String },
}

impl CoordinationMode {
    pub fn is_kraft(&self) -> bool {
        matches!(self, CoordinationMode::KRaft { .. })
    }
}

/// Metrics and logging configuration, already loaded by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsAndLogging {
    pub metrics: Option<String>,
    pub logging: Option<String>,
}

/// Inputs of the broker configuration.
#[derive(Clone, Copy, Debug)]
pub struct BrokerConfigParams<'a> {
    pub topology: &'a ClusterTopology,
    pub listeners: &'a ListenerTable,
    pub storage: &'a Storage,
    pub mode: &'a CoordinationMode,
    pub authorization: Option<&'a KafkaAuthorization>,
    pub user_config: &'a BTreeMap<String, serde_json::Value>,
}

/// Content of the shared broker config map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedConfiguration {
    pub server_config: String,
    /// Space separated listener env names, e.g. `PLAIN_9092 TLS_9093`.
    pub listeners: String,
    pub advertised_hostnames: String,
    pub advertised_ports: String,
    pub metrics_and_logging: MetricsAndLogging,
}

impl SharedConfiguration {
    pub fn into_data(self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::from([
            (config_keys::SERVER_CONFIG.to_string(), self.server_config),
            (config_keys::LISTENERS.to_string(), self.listeners),
            (config_keys::ADVERTISED_HOSTNAMES.to_string(), self.advertised_hostnames),
            (config_keys::ADVERTISED_PORTS.to_string(), self.advertised_ports),
        ]);
        if let Some(metrics) = self.metrics_and_logging.metrics {
            data.insert(config_keys::METRICS.to_string(), metrics);
        }
        if let Some(logging) = self.metrics_and_logging.logging {
            data.insert(config_keys::LOGGING.to_string(), logging);
        }
        data
    }
}

/// Render the broker configuration shared by all brokers.
pub fn render_shared(
    params: &BrokerConfigParams<'_>,
    metrics_and_logging: &MetricsAndLogging,
    advertised_hostnames: &AdvertisedMap,
    advertised_ports: &AdvertisedMap,
) -> SharedConfiguration {
    SharedConfiguration {
        server_config: render_server_config(params, &NodeIdentity::Placeholder),
        listeners: params
            .listeners
            .listeners()
            .iter()
            .map(ResolvedListener::env_name)
            .collect::<Vec<_>>()
            .join(" "),
        advertised_hostnames: render_advertised_block(params.listeners, advertised_hostnames),
        advertised_ports: render_advertised_block(params.listeners, advertised_ports),
        metrics_and_logging: metrics_and_logging.clone(),
    }
}

/// Render the configuration of one broker with its addresses resolved from
/// the advertised maps. Listeners missing from the maps keep placeholders.
pub fn render_per_broker(
    params: &BrokerConfigParams<'_>,
    broker_id: i32,
    advertised_hostnames: &AdvertisedMap,
    advertised_ports: &AdvertisedMap,
) -> String {
    render_server_config(
        params,
        &NodeIdentity::Broker {
            id: broker_id,
            hostnames: advertised_hostnames,
            ports: advertised_ports,
        },
    )
}

enum NodeIdentity<'a> {
    Placeholder,
    Broker {
        id: i32,
        hostnames: &'a AdvertisedMap,
        ports: &'a AdvertisedMap,
    },
}

impl NodeIdentity<'_> {
    fn id(&self) -> String {
        match self {
            NodeIdentity::Placeholder => format!("${{{}}}", env::BROKER_ID),
            NodeIdentity::Broker { id, .. } => id.to_string(),
        }
    }

    fn advertised_host(&self, listener: &ResolvedListener) -> String {
        match self {
            NodeIdentity::Placeholder => listener.advertised_hostname_placeholder(),
            NodeIdentity::Broker { id, hostnames, .. } => hostnames
                .get(id)
                .and_then(|row| row.get(&listener.env_name()))
                .cloned()
                .unwrap_or_else(|| listener.advertised_hostname_placeholder()),
        }
    }

    fn advertised_port(&self, listener: &ResolvedListener) -> String {
        match self {
            NodeIdentity::Placeholder => listener.advertised_port_placeholder(),
            NodeIdentity::Broker { id, ports, .. } => ports
                .get(id)
                .and_then(|row| row.get(&listener.env_name()))
                .cloned()
                .unwrap_or_else(|| listener.advertised_port_placeholder()),
        }
    }
}

/// Line-oriented `key=value` writer with comment banners between sections.
#[derive(Default)]
struct ConfigWriter {
    out: String,
}

impl ConfigWriter {
    fn section(&mut self, title: &str) {
        self.out.push_str("##########\n# ");
        self.out.push_str(title);
        self.out.push_str("\n##########\n");
    }

    fn line(&mut self, key: &str, value: impl AsRef<str>) {
        self.out.push_str(key);
        self.out.push('=');
        self.out.push_str(value.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

fn render_server_config(params: &BrokerConfigParams<'_>, identity: &NodeIdentity<'_>) -> String {
    let topology = params.topology;
    let node_id = identity.id();
    let pod_host = format!(
        "{}-{node_id}.{}.{}.svc",
        topology.component_name(),
        topology.headless_service_name(),
        topology.namespace()
    );
    let controlplane = format!("{}-{}", operator_listeners::CONTROLPLANE, ports::CONTROLPLANE);
    let replication = format!("{}-{}", operator_listeners::REPLICATION, ports::REPLICATION);

    let mut w = ConfigWriter::default();

    w.section("Node identity");
    w.line("broker.id", &node_id);
    w.line("node.id", &node_id);
    w.blank();

    w.section("Storage");
    w.line("log.dirs", log_dirs(params.storage, &node_id));
    w.blank();

    w.section("Listeners");
    let mut bind = vec![
        format!("{controlplane}://0.0.0.0:{}", ports::CONTROLPLANE),
        format!("{replication}://0.0.0.0:{}", ports::REPLICATION),
    ];
    let mut advertised = Vec::new();
    if !params.mode.is_kraft() {
        advertised.push(format!("{controlplane}://{pod_host}:{}", ports::CONTROLPLANE));
    }
    advertised.push(format!("{replication}://{pod_host}:{}", ports::REPLICATION));
    let mut protocols = vec![format!("{controlplane}:SSL"), format!("{replication}:SSL")];

    for listener in params.listeners.listeners() {
        let id = listener.identifier();
        bind.push(format!("{id}://0.0.0.0:{}", listener.port));
        advertised.push(format!(
            "{id}://{}:{}",
            identity.advertised_host(listener),
            identity.advertised_port(listener)
        ));
        protocols.push(format!("{id}:{}", listener.security_protocol()));
    }
    w.line("listeners", bind.join(","));
    w.line("advertised.listeners", advertised.join(","));
    w.line("listener.security.protocol.map", protocols.join(","));
    w.line("inter.broker.listener.name", &replication);
    if !params.mode.is_kraft() {
        w.line("control.plane.listener.name", &controlplane);
    }
    w.line("sasl.enabled.mechanisms", "");
    w.line("ssl.endpoint.identification.algorithm", "HTTPS");
    w.blank();

    w.section("Control plane and replication listeners");
    for name in [&controlplane, &replication] {
        let prefix = format!("listener.name.{}", name.to_lowercase());
        keystore_lines(&mut w, &prefix);
        w.line(&format!("{prefix}.ssl.client.auth"), "required");
        truststore_lines(&mut w, &prefix, defaults::TRUSTSTORE_PATH);
    }
    w.blank();

    for listener in params.listeners.listeners() {
        w.section(&format!("Listener {}", listener.identifier()));
        listener_lines(&mut w, listener);
        w.blank();
    }

    w.section("Coordination");
    match params.mode {
        CoordinationMode::ZooKeeper => {
            w.line(
                "zookeeper.connect",
                format!(
                    "{}-zookeeper-client:{}",
                    topology.cluster(),
                    ports::ZOOKEEPER_CLIENT
                ),
            );
            w.line(
                "zookeeper.clientCnxnSocket",
                "org.apache.zookeeper.ClientCnxnSocketNetty",
            );
            w.line("zookeeper.ssl.client.enable", "true");
            w.line("zookeeper.ssl.keystore.location", defaults::KEYSTORE_PATH);
            w.line(
                "zookeeper.ssl.keystore.password",
                format!("${{{}}}", env::CERTS_STORE_PASSWORD),
            );
            w.line("zookeeper.ssl.keystore.type", "PKCS12");
            w.line("zookeeper.ssl.truststore.location", defaults::TRUSTSTORE_PATH);
            w.line(
                "zookeeper.ssl.truststore.password",
                format!("${{{}}}", env::CERTS_STORE_PASSWORD),
            );
            w.line("zookeeper.ssl.truststore.type", "PKCS12");
        }
        CoordinationMode::KRaft { .. } => {
            w.line("process.roles", "broker,controller");
            w.line("controller.listener.names", &controlplane);
            w.line("controller.quorum.voters", quorum_voters(topology));
        }
    }
    w.blank();

    if let Some(authorization) = params.authorization {
        w.section("Authorization");
        authorization_lines(&mut w, authorization, params);
        w.blank();
    }

    let user_config = filter_user_config(params.user_config);
    if !user_config.is_empty() {
        w.section("User provided configuration");
        for (key, value) in &user_config {
            w.line(key, value);
        }
    }

    w.finish()
}

fn keystore_lines(w: &mut ConfigWriter, prefix: &str) {
    w.line(&format!("{prefix}.ssl.keystore.location"), defaults::KEYSTORE_PATH);
    w.line(
        &format!("{prefix}.ssl.keystore.password"),
        format!("${{{}}}", env::CERTS_STORE_PASSWORD),
    );
    w.line(&format!("{prefix}.ssl.keystore.type"), "PKCS12");
}

fn truststore_lines(w: &mut ConfigWriter, prefix: &str, path: &str) {
    w.line(&format!("{prefix}.ssl.truststore.location"), path);
    w.line(
        &format!("{prefix}.ssl.truststore.password"),
        format!("${{{}}}", env::CERTS_STORE_PASSWORD),
    );
    w.line(&format!("{prefix}.ssl.truststore.type"), "PKCS12");
}

fn listener_lines(w: &mut ConfigWriter, listener: &ResolvedListener) {
    let prefix = format!("listener.name.{}", listener.identifier().to_lowercase());
    if listener.tls {
        keystore_lines(w, &prefix);
    }

    match &listener.authentication {
        None => {}
        Some(ListenerAuthentication::Tls) => {
            w.line(&format!("{prefix}.ssl.client.auth"), "required");
            truststore_lines(w, &prefix, defaults::CLIENTS_CA_TRUSTSTORE_PATH);
        }
        Some(ListenerAuthentication::ScramSha512) => {
            w.line(
                &format!("{prefix}.scram-sha-512.sasl.jaas.config"),
                "org.apache.kafka.common.security.scram.ScramLoginModule required;",
            );
            w.line(&format!("{prefix}.sasl.enabled.mechanisms"), "SCRAM-SHA-512");
        }
        Some(ListenerAuthentication::Oauth(oauth)) => {
            w.line(
                &format!("{prefix}.oauthbearer.sasl.server.callback.handler.class"),
                "io.strimzi.kafka.oauth.server.JaasServerOauthValidatorCallbackHandler",
            );
            w.line(
                &format!("{prefix}.oauthbearer.sasl.jaas.config"),
                oauth_jaas_config(oauth),
            );
            w.line(&format!("{prefix}.sasl.enabled.mechanisms"), "OAUTHBEARER");
        }
    }
}

fn oauth_jaas_config(oauth: &OAuthAuthentication) -> String {
    let options = [
        ("oauth.valid.issuer.uri", &oauth.valid_issuer_uri),
        ("oauth.jwks.endpoint.uri", &oauth.jwks_endpoint_uri),
        ("oauth.introspection.endpoint.uri", &oauth.introspection_endpoint_uri),
        ("oauth.client.id", &oauth.client_id),
        ("oauth.username.claim", &oauth.user_name_claim),
    ];
    let mut config =
        "org.apache.kafka.common.security.oauthbearer.OAuthBearerLoginModule required".to_string();
    for (key, value) in options {
        if let Some(value) = value {
            config.push_str(&format!(" {key}=\"{value}\""));
        }
    }
    config.push(';');
    config
}

fn authorization_lines(
    w: &mut ConfigWriter,
    authorization: &KafkaAuthorization,
    params: &BrokerConfigParams<'_>,
) {
    let own_user = format!(
        "User:CN={},O={}",
        params.topology.component_name(),
        defaults::CERTIFICATE_ORGANIZATION
    );
    let super_users = |extra: &[String]| {
        std::iter::once(own_user.clone())
            .chain(extra.iter().map(|u| format!("User:{u}")))
            .collect::<Vec<_>>()
            .join(";")
    };

    match authorization {
        KafkaAuthorization::Simple(simple) => {
            let class = if params.mode.is_kraft() {
                "org.apache.kafka.metadata.authorizer.StandardAuthorizer"
            } else {
                "kafka.security.authorizer.AclAuthorizer"
            };
            w.line("authorizer.class.name", class);
            w.line("super.users", super_users(&simple.super_users));
        }
        KafkaAuthorization::Keycloak(keycloak) => {
            w.line(
                "authorizer.class.name",
                "io.strimzi.kafka.oauth.server.authorizer.KeycloakAuthorizer",
            );
            w.line("strimzi.authorization.client.id", &keycloak.client_id);
            w.line(
                "strimzi.authorization.token.endpoint.uri",
                &keycloak.token_endpoint_uri,
            );
            w.line(
                "strimzi.authorization.delegate.to.kafka.acl",
                keycloak.delegate_to_kafka_acls.to_string(),
            );
            w.line("super.users", super_users(&keycloak.super_users));
        }
    }
}

/// `log.dirs` value: one directory per persistent volume, or the single
/// data directory for ephemeral storage.
pub fn log_dirs(storage: &Storage, node_id: &str) -> String {
    match storage {
        Storage::Jbod(jbod) => jbod
            .volumes
            .iter()
            .filter_map(|v| {
                debug_assert!(v.id.is_some(), "JBOD volume without id reached log.dirs");
                v.id
            })
            .map(|id| format!("{}/data-{id}/kafka-log{node_id}", defaults::KAFKA_DATA_PATH))
            .collect::<Vec<_>>()
            .join(","),
        Storage::Ephemeral(_) | Storage::PersistentClaim(_) => {
            format!("{}/data/kafka-log{node_id}", defaults::KAFKA_DATA_PATH)
        }
    }
}

/// `controller.quorum.voters` for combined broker/controller nodes.
pub fn quorum_voters(topology: &ClusterTopology) -> String {
    topology
        .node_ids()
        .map(|id| format!("{id}@{}:{}", topology.pod_dns_name(id), ports::CONTROLPLANE))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render one advertised map as `<LISTENER>_<broker>://<value>` tokens,
/// ordered by broker id then listener declaration order.
pub fn render_advertised_block(listeners: &ListenerTable, values: &AdvertisedMap) -> String {
    let mut tokens = Vec::new();
    for (broker_id, row) in values {
        for listener in listeners.listeners() {
            let env_name = listener.env_name();
            if let Some(value) = row.get(&env_name) {
                tokens.push(format!("{env_name}_{broker_id}://{value}"));
            }
        }
    }
    tokens.join(" ")
}

/// Inverse of [`render_advertised_block`]. Malformed tokens are skipped.
pub fn parse_advertised_block(block: &str) -> AdvertisedMap {
    let mut values = AdvertisedMap::new();
    for token in block.split_whitespace() {
        let parsed = token.split_once("://").and_then(|(key, value)| {
            let (listener, broker) = key.rsplit_once('_')?;
            Some((broker.parse::<i32>().ok()?, listener, value))
        });
        match parsed {
            Some((broker, listener, value)) => {
                values
                    .entry(broker)
                    .or_default()
                    .insert(listener.to_string(), value.to_string());
            }
            None => debug!(token, "Skipping malformed advertised address token"),
        }
    }
    values
}

/// The row of one broker, as its start script reads it.
pub fn advertised_row(block: &str, broker_id: i32) -> BTreeMap<String, String> {
    parse_advertised_block(block)
        .remove(&broker_id)
        .unwrap_or_default()
}

/// Options the operator manages itself. User values for them are dropped.
const FORBIDDEN_PREFIXES: &[&str] = &[
    "listeners",
    "advertised.",
    "broker.",
    "listener.",
    "host.name",
    "port",
    "inter.broker.listener.name",
    "sasl.",
    "ssl.",
    "security.",
    "password.",
    "log.dir",
    "zookeeper.connect",
    "zookeeper.set.acl",
    "zookeeper.ssl",
    "zookeeper.clientCnxnSocket",
    "authorizer.",
    "super.user",
    "node.id",
    "process.roles",
    "controller.",
];

/// Exceptions to [`FORBIDDEN_PREFIXES`].
const ALLOWED_OPTIONS: &[&str] = &[
    "zookeeper.connection.timeout.ms",
    "sasl.server.max.receive.size",
    "ssl.cipher.suites",
    "ssl.protocol",
    "ssl.enabled.protocols",
    "ssl.secure.random.implementation",
    "controller.quorum.election.backoff.max.ms",
    "controller.quorum.election.timeout.ms",
    "controller.quorum.fetch.timeout.ms",
];

/// ZooKeeper options the operator manages itself.
const ZOOKEEPER_FORBIDDEN_PREFIXES: &[&str] = &[
    "server.",
    "dataDir",
    "dataLogDir",
    "clientPort",
    "secureClientPort",
    "authProvider",
    "quorum.auth",
    "requireClientAuthScheme",
    "snapshot.trust.empty",
    "standaloneEnabled",
    "reconfigEnabled",
    "4lw.commands.whitelist",
    "ssl.",
    "serverCnxnFactory",
    "sslQuorum",
];

/// Exceptions to [`ZOOKEEPER_FORBIDDEN_PREFIXES`].
const ZOOKEEPER_ALLOWED_OPTIONS: &[&str] = &[
    "ssl.protocol",
    "ssl.quorum.protocol",
    "ssl.enabledProtocols",
    "ssl.quorum.enabledProtocols",
    "ssl.ciphersuites",
    "ssl.quorum.ciphersuites",
    "ssl.hostnameVerification",
    "ssl.quorum.hostnameVerification",
];

/// Kafka user options that may be passed through, rendered as strings.
pub fn filter_user_config(config: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
    filter_config(config, FORBIDDEN_PREFIXES, ALLOWED_OPTIONS)
}

/// ZooKeeper user options that may be passed through, rendered as strings.
pub fn filter_zookeeper_config(
    config: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    filter_config(config, ZOOKEEPER_FORBIDDEN_PREFIXES, ZOOKEEPER_ALLOWED_OPTIONS)
}

fn filter_config(
    config: &BTreeMap<String, serde_json::Value>,
    forbidden: &[&str],
    allowed: &[&str],
) -> BTreeMap<String, String> {
    config
        .iter()
        .filter(|(key, _)| {
            let passed = allowed.contains(&key.as_str())
                || !forbidden.iter().any(|p| key.starts_with(p));
            if !passed {
                debug!(key = %key, "Ignoring forbidden configuration option");
            }
            passed
        })
        .map(|(key, value)| (key.clone(), config_value(value)))
        .collect()
}

fn config_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Options whose value may not exceed the number of brokers.
const REPLICA_BOUNDED_OPTIONS: &[&str] = &[
    "default.replication.factor",
    "offsets.topic.replication.factor",
    "transaction.state.log.replication.factor",
    "transaction.state.log.min.isr",
    "min.insync.replicas",
];

/// Reject replication settings the cluster cannot satisfy.
pub fn validate_broker_config(
    config: &BTreeMap<String, serde_json::Value>,
    replicas: i32,
) -> Result<()> {
    for key in REPLICA_BOUNDED_OPTIONS {
        let Some(value) = config.get(*key) else {
            continue;
        };
        let parsed = match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(parsed) = parsed else {
            return Err(ModelError::invalid(format!(
                "Kafka configuration option '{key}' should be an integer (spec.kafka.config)"
            )));
        };
        if parsed > i64::from(replicas) {
            return Err(ModelError::invalid(format!(
                "Kafka configuration option '{key}' should be set to {replicas} or less because \
                 'spec.kafka.replicas' is {replicas}"
            )));
        }
    }
    Ok(())
}

/// ZooKeeper configuration for an ensemble of `topology.replicas()` nodes.
pub fn render_zookeeper_config(
    topology: &ClusterTopology,
    user_config: &BTreeMap<String, serde_json::Value>,
) -> String {
    let mut config: BTreeMap<String, String> = [
        ("tickTime", "2000"),
        ("initLimit", "5"),
        ("syncLimit", "2"),
        ("autopurge.purgeInterval", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    config.extend(filter_zookeeper_config(user_config));

    let mut w = ConfigWriter::default();
    w.section("ZooKeeper");
    w.line("dataDir", defaults::ZOOKEEPER_DATA_DIR);
    w.line("secureClientPort", ports::ZOOKEEPER_CLIENT.to_string());
    w.line(
        "serverCnxnFactory",
        "org.apache.zookeeper.server.NettyServerCnxnFactory",
    );
    w.line("sslQuorum", "true");
    w.line("ssl.clientAuth", "need");
    w.line("reconfigEnabled", "true");
    w.line("standaloneEnabled", "false");
    w.line("admin.enableServer", "false");
    w.blank();

    w.section("Ensemble");
    for id in topology.node_ids() {
        w.line(
            &format!("server.{}", id + 1),
            format!(
                "{}:{}:{}:participant;127.0.0.1:{}",
                topology.pod_dns_name(id),
                ports::ZOOKEEPER_CLUSTER,
                ports::ZOOKEEPER_ELECTION,
                ports::ZOOKEEPER_LOCAL_CLIENT
            ),
        );
    }
    w.blank();

    w.section("User provided configuration");
    for (key, value) in &config {
        w.line(key, value);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::kafka::{KeycloakAuthorization, SimpleAuthorization};
    use crate::crds::{EphemeralStorage, JbodStorage, ListenerType, PersistentClaimStorage};
    use crate::listeners::tests::listener;
    use crate::listeners::ObservedAddresses;

    fn topology() -> ClusterTopology {
        ClusterTopology::kafka("foo", "test", 3)
    }

    fn plain_and_tls() -> ListenerTable {
        ListenerTable::resolve(
            &[
                listener("plain", 9092, ListenerType::Internal, false),
                listener("tls", 9093, ListenerType::Internal, true),
            ],
            &topology(),
        )
        .unwrap()
    }

    fn ephemeral() -> Storage {
        Storage::Ephemeral(EphemeralStorage::default())
    }

    fn params<'a>(
        topology: &'a ClusterTopology,
        listeners: &'a ListenerTable,
        storage: &'a Storage,
        mode: &'a CoordinationMode,
        user_config: &'a BTreeMap<String, serde_json::Value>,
    ) -> BrokerConfigParams<'a> {
        BrokerConfigParams {
            topology,
            listeners,
            storage,
            mode,
            authorization: None,
            user_config,
        }
    }

    fn broker_map(value: impl Fn(i32) -> String) -> AdvertisedMap {
        (0..3)
            .map(|b| {
                (
                    b,
                    BTreeMap::from([
                        ("PLAIN_9092".to_string(), value(b)),
                        ("TLS_9093".to_string(), value(b)),
                    ]),
                )
            })
            .collect()
    }

    fn lines(config: &str) -> Vec<&str> {
        config.lines().collect()
    }

    #[test]
    fn test_shared_config_uses_placeholders() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let shared = render_shared(&p, &MetricsAndLogging::default(), &AdvertisedMap::new(), &AdvertisedMap::new());
        let server = lines(&shared.server_config);

        assert!(server.contains(&"broker.id=${CHRONIK_BROKER_ID}"));
        assert!(server.contains(&"node.id=${CHRONIK_BROKER_ID}"));
        assert!(server.contains(&"log.dirs=/var/lib/kafka/data/kafka-log${CHRONIK_BROKER_ID}"));
        assert!(server.contains(&"advertised.listeners=\
            CONTROLPLANE-9090://foo-kafka-${CHRONIK_BROKER_ID}.foo-kafka-brokers.test.svc:9090,\
            REPLICATION-9091://foo-kafka-${CHRONIK_BROKER_ID}.foo-kafka-brokers.test.svc:9091,\
            PLAIN-9092://${CHRONIK_PLAIN_9092_ADVERTISED_HOSTNAME}:${CHRONIK_PLAIN_9092_ADVERTISED_PORT},\
            TLS-9093://${CHRONIK_TLS_9093_ADVERTISED_HOSTNAME}:${CHRONIK_TLS_9093_ADVERTISED_PORT}"));
        assert!(server.contains(&"listener.security.protocol.map=\
            CONTROLPLANE-9090:SSL,REPLICATION-9091:SSL,PLAIN-9092:PLAINTEXT,TLS-9093:SSL"));
        assert!(server.contains(&"inter.broker.listener.name=REPLICATION-9091"));
        assert!(server.contains(&"control.plane.listener.name=CONTROLPLANE-9090"));
        assert!(server.contains(&"zookeeper.connect=foo-zookeeper-client:2181"));
        assert!(server.contains(&"listener.name.tls-9093.ssl.keystore.type=PKCS12"));
        assert!(!shared.server_config.contains("process.roles"));
        assert!(!shared.server_config.contains("controller.quorum.voters"));
    }

    #[test]
    fn test_kraft_mode_adds_quorum_configuration() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let mode = CoordinationMode::KRaft {
            cluster_id: "cluster-id".into(),
        };
        let p = params(&topology, &listeners, &storage, &mode, &config);
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());
        let server_lines = lines(&server);

        assert!(server_lines.contains(&"process.roles=broker,controller"));
        assert!(server_lines.contains(&"controller.listener.names=CONTROLPLANE-9090"));
        assert!(server_lines.contains(&"controller.quorum.voters=\
            0@foo-kafka-0.foo-kafka-brokers.test.svc:9090,\
            1@foo-kafka-1.foo-kafka-brokers.test.svc:9090,\
            2@foo-kafka-2.foo-kafka-brokers.test.svc:9090"));
        assert!(!server.contains("zookeeper.connect"));
        assert!(!server.contains("control.plane.listener.name"));
        let advertised = server_lines
            .iter()
            .find(|l| l.starts_with("advertised.listeners="))
            .unwrap();
        assert!(!advertised.contains("CONTROLPLANE"));
    }

    #[test]
    fn test_jbod_log_dirs() {
        let storage = Storage::Jbod(JbodStorage {
            volumes: vec![
                PersistentClaimStorage {
                    id: Some(0),
                    size: Some("100Gi".into()),
                    ..Default::default()
                },
                PersistentClaimStorage {
                    id: Some(1),
                    size: Some("1000Gi".into()),
                    ..Default::default()
                },
            ],
        });
        assert_eq!(
            log_dirs(&storage, "${CHRONIK_BROKER_ID}"),
            "/var/lib/kafka/data-0/kafka-log${CHRONIK_BROKER_ID},\
             /var/lib/kafka/data-1/kafka-log${CHRONIK_BROKER_ID}"
        );
        assert_eq!(log_dirs(&ephemeral(), "2"), "/var/lib/kafka/data/kafka-log2");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "JBOD volume without id")]
    fn test_log_dirs_rejects_volume_without_id() {
        let storage = Storage::Jbod(JbodStorage {
            volumes: vec![PersistentClaimStorage {
                size: Some("100Gi".into()),
                ..Default::default()
            }],
        });
        log_dirs(&storage, "0");
    }

    #[test]
    fn test_per_broker_config_resolves_addresses() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let hostnames = broker_map(|b| format!("broker-{b}"));
        let ports = broker_map(|b| (10000 + b).to_string());

        let server = render_per_broker(&p, 1, &hostnames, &ports);
        let server_lines = lines(&server);
        assert!(server_lines.contains(&"broker.id=1"));
        assert!(server_lines.contains(&"node.id=1"));
        assert!(server_lines.contains(&"log.dirs=/var/lib/kafka/data/kafka-log1"));
        assert!(server_lines.contains(&"advertised.listeners=\
            CONTROLPLANE-9090://foo-kafka-1.foo-kafka-brokers.test.svc:9090,\
            REPLICATION-9091://foo-kafka-1.foo-kafka-brokers.test.svc:9091,\
            PLAIN-9092://broker-1:10001,TLS-9093://broker-1:10001"));
    }

    #[test]
    fn test_per_broker_config_keeps_placeholders_for_unknown_listeners() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let hostnames = AdvertisedMap::from([(
            0,
            BTreeMap::from([("PLAIN_9092".to_string(), "broker-0".to_string())]),
        )]);

        let server = render_per_broker(&p, 0, &hostnames, &AdvertisedMap::new());
        assert!(server.contains("PLAIN-9092://broker-0:${CHRONIK_PLAIN_9092_ADVERTISED_PORT}"));
        assert!(server.contains("TLS-9093://${CHRONIK_TLS_9093_ADVERTISED_HOSTNAME}"));
    }

    #[test]
    fn test_shared_config_map_blocks() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let hostnames = broker_map(|b| format!("broker-{b}"));
        let ports = broker_map(|b| (10000 + b).to_string());
        let metrics_and_logging = MetricsAndLogging {
            metrics: Some("{}".into()),
            logging: Some("log4j.rootLogger=INFO".into()),
        };

        let shared = render_shared(&p, &metrics_and_logging, &hostnames, &ports);
        assert_eq!(shared.listeners, "PLAIN_9092 TLS_9093");
        assert_eq!(
            shared.advertised_hostnames,
            "PLAIN_9092_0://broker-0 TLS_9093_0://broker-0 \
             PLAIN_9092_1://broker-1 TLS_9093_1://broker-1 \
             PLAIN_9092_2://broker-2 TLS_9093_2://broker-2"
        );
        assert_eq!(
            shared.advertised_ports,
            "PLAIN_9092_0://10000 TLS_9093_0://10000 \
             PLAIN_9092_1://10001 TLS_9093_1://10001 \
             PLAIN_9092_2://10002 TLS_9093_2://10002"
        );

        let data = shared.into_data();
        assert_eq!(
            data.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![
                "advertised-hostnames.config",
                "advertised-ports.config",
                "listeners.config",
                "log4j.properties",
                "metrics-config.json",
                "server.config",
            ]
        );
    }

    #[test]
    fn test_advertised_block_round_trip() {
        let listeners = plain_and_tls();
        let hostnames = listeners.advertised_hostnames(&topology(), &ObservedAddresses::default());
        let block = render_advertised_block(&listeners, &hostnames);
        assert_eq!(parse_advertised_block(&block), hostnames);
        assert_eq!(
            advertised_row(&block, 2)["TLS_9093"],
            "foo-kafka-2.foo-kafka-brokers.test.svc"
        );
        assert!(advertised_row(&block, 7).is_empty());
    }

    #[test]
    fn test_parse_skips_malformed_tokens() {
        let parsed = parse_advertised_block("PLAIN_9092_0://a garbage NOBROKER://b PLAIN_9092_x://c");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[&0]["PLAIN_9092"], "a");
    }

    #[test]
    fn test_empty_advertised_host_survives_round_trip() {
        let listeners = plain_and_tls();
        let hostnames = AdvertisedMap::from([(
            0,
            BTreeMap::from([("PLAIN_9092".to_string(), String::new())]),
        )]);
        let block = render_advertised_block(&listeners, &hostnames);
        assert_eq!(block, "PLAIN_9092_0://");
        assert_eq!(parse_advertised_block(&block), hostnames);
    }

    #[test]
    fn test_user_config_filtering() {
        let config = BTreeMap::from([
            ("auto.create.topics.enable".to_string(), serde_json::json!(false)),
            ("num.partitions".to_string(), serde_json::json!(6)),
            ("listeners".to_string(), serde_json::json!("PLAINTEXT://:9092")),
            ("ssl.keystore.location".to_string(), serde_json::json!("/tmp/ks")),
            ("ssl.cipher.suites".to_string(), serde_json::json!("TLS_AES_256_GCM_SHA384")),
            ("process.roles".to_string(), serde_json::json!("broker")),
        ]);
        let filtered = filter_user_config(&config);
        assert_eq!(
            filtered,
            BTreeMap::from([
                ("auto.create.topics.enable".to_string(), "false".to_string()),
                ("num.partitions".to_string(), "6".to_string()),
                ("ssl.cipher.suites".to_string(), "TLS_AES_256_GCM_SHA384".to_string()),
            ])
        );

        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());
        assert!(server.contains("\nnum.partitions=6\n"));
        assert!(!server.contains("PLAINTEXT://:9092"));
    }

    #[test]
    fn test_replication_factor_validation() {
        let config = BTreeMap::from([(
            "offsets.topic.replication.factor".to_string(),
            serde_json::json!(4),
        )]);
        let err = validate_broker_config(&config, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Kafka configuration option 'offsets.topic.replication.factor' \
             should be set to 3 or less because 'spec.kafka.replicas' is 3"
        );

        let config = BTreeMap::from([
            ("default.replication.factor".to_string(), serde_json::json!("3")),
            ("min.insync.replicas".to_string(), serde_json::json!(2)),
        ]);
        assert!(validate_broker_config(&config, 3).is_ok());

        let config = BTreeMap::from([(
            "min.insync.replicas".to_string(),
            serde_json::json!("two"),
        )]);
        assert!(validate_broker_config(&config, 3).is_err());
    }

    #[test]
    fn test_authentication_lines() {
        let mut scram = listener("scram", 9094, ListenerType::Internal, true);
        scram.authentication = Some(ListenerAuthentication::ScramSha512);
        let mut mtls = listener("mtls", 9095, ListenerType::Internal, true);
        mtls.authentication = Some(ListenerAuthentication::Tls);
        let mut oauth = listener("oauth", 9096, ListenerType::Internal, true);
        oauth.authentication = Some(ListenerAuthentication::Oauth(OAuthAuthentication {
            valid_issuer_uri: Some("https://sso/realms/kafka".into()),
            jwks_endpoint_uri: Some("https://sso/certs".into()),
            ..Default::default()
        }));
        let topology = topology();
        let listeners = ListenerTable::resolve(&[scram, mtls, oauth], &topology).unwrap();
        let (storage, config) = (ephemeral(), BTreeMap::new());
        let p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());

        assert!(server.contains("listener.name.scram-9094.sasl.enabled.mechanisms=SCRAM-SHA-512\n"));
        assert!(server.contains("listener.name.mtls-9095.ssl.client.auth=required\n"));
        assert!(server.contains(
            "listener.name.mtls-9095.ssl.truststore.location=/tmp/kafka/clients.truststore.p12\n"
        ));
        assert!(server.contains("listener.name.oauth-9096.sasl.enabled.mechanisms=OAUTHBEARER\n"));
        assert!(server.contains(
            "OAuthBearerLoginModule required oauth.valid.issuer.uri=\"https://sso/realms/kafka\" \
             oauth.jwks.endpoint.uri=\"https://sso/certs\";"
        ));
        assert!(server.contains("SCRAM-9094:SASL_SSL,MTLS-9095:SSL,OAUTH-9096:SASL_SSL"));
    }

    #[test]
    fn test_authorization_lines() {
        let (topology, listeners, storage) = (topology(), plain_and_tls(), ephemeral());
        let config = BTreeMap::new();
        let simple = KafkaAuthorization::Simple(SimpleAuthorization {
            super_users: vec!["CN=admin".into()],
        });
        let mut p = params(&topology, &listeners, &storage, &CoordinationMode::ZooKeeper, &config);
        p.authorization = Some(&simple);
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());
        assert!(server.contains("authorizer.class.name=kafka.security.authorizer.AclAuthorizer\n"));
        assert!(server.contains("super.users=User:CN=foo-kafka,O=io.chronik;User:CN=admin\n"));

        let kraft = CoordinationMode::KRaft {
            cluster_id: "id".into(),
        };
        p.mode = &kraft;
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());
        assert!(server.contains(
            "authorizer.class.name=org.apache.kafka.metadata.authorizer.StandardAuthorizer\n"
        ));

        let keycloak = KafkaAuthorization::Keycloak(KeycloakAuthorization {
            client_id: "kafka".into(),
            token_endpoint_uri: "https://sso/token".into(),
            ..Default::default()
        });
        p.authorization = Some(&keycloak);
        let server = render_per_broker(&p, 0, &AdvertisedMap::new(), &AdvertisedMap::new());
        assert!(server.contains("strimzi.authorization.client.id=kafka\n"));
        assert!(server.contains("super.users=User:CN=foo-kafka,O=io.chronik\n"));
    }

    #[test]
    fn test_zookeeper_config() {
        let topology = ClusterTopology::zookeeper("foo", "test", 3);
        let user = BTreeMap::from([("tickTime".to_string(), serde_json::json!(3000))]);
        let config = render_zookeeper_config(&topology, &user);
        let config_lines = lines(&config);

        assert!(config_lines.contains(&"dataDir=/var/lib/zookeeper/data"));
        assert!(config_lines.contains(&"tickTime=3000"));
        assert!(config_lines.contains(&"initLimit=5"));
        assert!(config_lines.contains(
            &"server.1=foo-zookeeper-0.foo-zookeeper-nodes.test.svc:2888:3888:participant;127.0.0.1:12181"
        ));
        assert!(config_lines.contains(
            &"server.3=foo-zookeeper-2.foo-zookeeper-nodes.test.svc:2888:3888:participant;127.0.0.1:12181"
        ));
        assert!(!config.contains("server.4="));
    }

    #[test]
    fn test_zookeeper_config_drops_reserved_options() {
        let topology = ClusterTopology::zookeeper("foo", "test", 3);
        let user = BTreeMap::from([
            ("dataDir".to_string(), serde_json::json!("/tmp/evil")),
            ("server.1".to_string(), serde_json::json!("attacker:2888:3888")),
            ("sslQuorum".to_string(), serde_json::json!(false)),
            ("ssl.quorum.protocol".to_string(), serde_json::json!("TLSv1.3")),
            ("maxClientCnxns".to_string(), serde_json::json!(120)),
        ]);
        let config = render_zookeeper_config(&topology, &user);
        let config_lines = lines(&config);

        assert!(!config.contains("/tmp/evil"));
        assert!(!config.contains("attacker"));
        assert!(!config_lines.contains(&"sslQuorum=false"));
        assert_eq!(config.matches("dataDir=").count(), 1);
        assert!(config_lines.contains(&"sslQuorum=true"));
        assert!(config_lines.contains(&"ssl.quorum.protocol=TLSv1.3"));
        assert!(config_lines.contains(&"maxClientCnxns=120"));
    }

    #[test]
    fn test_filter_zookeeper_config_keeps_ssl_exceptions() {
        let config = BTreeMap::from([
            ("ssl.keyStore.location".to_string(), serde_json::json!("/tmp/ks")),
            ("ssl.protocol".to_string(), serde_json::json!("TLSv1.2")),
            ("4lw.commands.whitelist".to_string(), serde_json::json!("*")),
            ("autopurge.snapRetainCount".to_string(), serde_json::json!(5)),
        ]);
        let filtered = filter_zookeeper_config(&config);
        assert_eq!(
            filtered.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["autopurge.snapRetainCount", "ssl.protocol"]
        );
    }
}
