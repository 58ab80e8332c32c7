/// Kubernetes label keys following the app.kubernetes.io convention.
pub mod labels {
    pub const NAME: &str = "app.kubernetes.io/name";
    pub const INSTANCE: &str = "app.kubernetes.io/instance";
    pub const COMPONENT: &str = "app.kubernetes.io/component";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

    /// Chronik-specific labels.
    pub const CLUSTER: &str = "chronik.io/cluster";
    pub const KIND: &str = "chronik.io/kind";
    pub const POD_NAME: &str = "statefulset.kubernetes.io/pod-name";
}

/// Label values.
pub mod values {
    pub const MANAGED_BY: &str = "chronik-operator";
    pub const KIND: &str = "ChronikKafka";
}

/// Annotation keys.
pub mod annotations {
    /// Applied storage, JSON encoded, kept on the node set so the next
    /// reconciliation can compare against it.
    pub const STORAGE: &str = "chronik.io/storage";
    pub const DELETE_CLAIM: &str = "chronik.io/delete-claim";
}

/// Well-known ports.
pub mod ports {
    pub const CONTROLPLANE: i32 = 9090;
    pub const REPLICATION: i32 = 9091;
    pub const METRICS: i32 = 9404;
    pub const JMX: i32 = 9999;
    /// Lowest port a user listener may use.
    pub const MIN_LISTENER: i32 = 9092;
    pub const INGRESS: i32 = 443;
    pub const ROUTE: i32 = 443;

    pub const ZOOKEEPER_CLIENT: i32 = 2181;
    pub const ZOOKEEPER_CLUSTER: i32 = 2888;
    pub const ZOOKEEPER_ELECTION: i32 = 3888;
    pub const ZOOKEEPER_LOCAL_CLIENT: i32 = 12181;
}

/// Names of the two operator-owned broker listeners.
pub mod listeners {
    pub const CONTROLPLANE: &str = "CONTROLPLANE";
    pub const REPLICATION: &str = "REPLICATION";
}

/// Environment variables set on broker and ZooKeeper containers.
pub mod env {
    pub const BROKER_ID: &str = "CHRONIK_BROKER_ID";
    pub const CLUSTER_ID: &str = "CHRONIK_CLUSTER_ID";
    pub const KRAFT_ENABLED: &str = "CHRONIK_KRAFT_ENABLED";
    pub const KAFKA_METRICS_ENABLED: &str = "CHRONIK_KAFKA_METRICS_ENABLED";
    pub const KAFKA_GC_LOG_ENABLED: &str = "CHRONIK_KAFKA_GC_LOG_ENABLED";
    pub const KAFKA_JMX_ENABLED: &str = "CHRONIK_KAFKA_JMX_ENABLED";
    pub const KAFKA_HEAP_OPTS: &str = "KAFKA_HEAP_OPTS";
    pub const JAVA_SYSTEM_PROPERTIES: &str = "CHRONIK_JAVA_SYSTEM_PROPERTIES";
    pub const CERTS_STORE_PASSWORD: &str = "CERTS_STORE_PASSWORD";

    pub const ZOOKEEPER_NODE_COUNT: &str = "ZOOKEEPER_NODE_COUNT";
    pub const ZOOKEEPER_METRICS_ENABLED: &str = "ZOOKEEPER_METRICS_ENABLED";
    pub const ZOOKEEPER_SNAPSHOT_CHECK_ENABLED: &str = "ZOOKEEPER_SNAPSHOT_CHECK_ENABLED";
}

/// Keys of the shared broker config map.
pub mod config_keys {
    pub const SERVER_CONFIG: &str = "server.config";
    pub const LISTENERS: &str = "listeners.config";
    pub const ADVERTISED_HOSTNAMES: &str = "advertised-hostnames.config";
    pub const ADVERTISED_PORTS: &str = "advertised-ports.config";
    pub const METRICS: &str = "metrics-config.json";
    pub const LOGGING: &str = "log4j.properties";
    pub const ZOOKEEPER_CONFIG: &str = "zookeeper.config";
}

/// Default values.
pub mod defaults {
    pub const DNS_DOMAIN: &str = "cluster.local";
    pub const KAFKA_DATA_PATH: &str = "/var/lib/kafka";
    pub const ZOOKEEPER_DATA_DIR: &str = "/var/lib/zookeeper/data";
    pub const KEYSTORE_PATH: &str = "/tmp/kafka/cluster.keystore.p12";
    pub const TRUSTSTORE_PATH: &str = "/tmp/kafka/cluster.truststore.p12";
    pub const CLIENTS_CA_TRUSTSTORE_PATH: &str = "/tmp/kafka/clients.truststore.p12";
    pub const REPLICAS: i32 = 3;
    pub const CA_VALIDITY_DAYS: u32 = 365;
    pub const CA_RENEWAL_DAYS: u32 = 30;
    pub const CERTIFICATE_ORGANIZATION: &str = "io.chronik";
}

/// CRD API group.
pub const API_GROUP: &str = "chronik.io";
