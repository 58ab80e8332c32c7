//! Container environment and the names users cannot override.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use tracing::debug;

use crate::config_generator::CoordinationMode;
use crate::constants::env;
use crate::crds;

/// Environment variable names owned by the operator for one node role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservedNames {
    names: BTreeSet<&'static str>,
}

impl ReservedNames {
    pub fn kafka() -> Self {
        Self::from_names([
            env::BROKER_ID,
            env::CLUSTER_ID,
            env::KRAFT_ENABLED,
            env::KAFKA_METRICS_ENABLED,
            env::KAFKA_GC_LOG_ENABLED,
            env::KAFKA_JMX_ENABLED,
            env::KAFKA_HEAP_OPTS,
            env::JAVA_SYSTEM_PROPERTIES,
            env::CERTS_STORE_PASSWORD,
        ])
    }

    pub fn zookeeper() -> Self {
        Self::from_names([
            env::ZOOKEEPER_NODE_COUNT,
            env::ZOOKEEPER_METRICS_ENABLED,
            env::ZOOKEEPER_SNAPSHOT_CHECK_ENABLED,
            env::KAFKA_GC_LOG_ENABLED,
            env::KAFKA_HEAP_OPTS,
            env::JAVA_SYSTEM_PROPERTIES,
        ])
    }

    pub fn from_names(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.iter().copied()
    }
}

/// Operator variables first, then user variables whose names are neither
/// reserved nor already set by the operator. Dropped user variables are
/// only logged.
pub fn merge_env_vars(
    reserved: &ReservedNames,
    operator: Vec<EnvVar>,
    user: &[crds::EnvVar],
) -> Vec<EnvVar> {
    let mut taken: BTreeSet<String> = operator.iter().map(|e| e.name.clone()).collect();
    let mut merged = operator;

    for user_env in user {
        if reserved.contains(&user_env.name) || taken.contains(&user_env.name) {
            debug!(name = %user_env.name, "Dropping user environment variable with a reserved name");
            continue;
        }
        if let Some(env_var) = to_k8s_env_var(user_env) {
            taken.insert(user_env.name.clone());
            merged.push(env_var);
        }
    }
    merged
}

fn to_k8s_env_var(user_env: &crds::EnvVar) -> Option<EnvVar> {
    if let Some(ref val) = user_env.value {
        Some(EnvVar {
            name: user_env.name.clone(),
            value: Some(val.clone()),
            ..Default::default()
        })
    } else {
        user_env.value_from_secret.as_ref().map(|secret_ref| EnvVar {
            name: user_env.name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(secret_ref.name.clone()),
                    key: secret_ref.key.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

fn plain(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Variables the broker container needs from the operator.
pub fn kafka_env_vars(
    metrics_enabled: bool,
    gc_logging_enabled: bool,
    jmx_enabled: bool,
    mode: &CoordinationMode,
) -> Vec<EnvVar> {
    let mut vars = vec![
        plain(env::KAFKA_METRICS_ENABLED, metrics_enabled.to_string()),
        plain(env::KAFKA_GC_LOG_ENABLED, gc_logging_enabled.to_string()),
    ];
    if jmx_enabled {
        vars.push(plain(env::KAFKA_JMX_ENABLED, "true"));
    }
    if let CoordinationMode::KRaft { cluster_id } = mode {
        vars.push(plain(env::CLUSTER_ID, cluster_id.clone()));
        vars.push(plain(env::KRAFT_ENABLED, "true"));
    }
    vars
}

/// Variables the ZooKeeper container needs from the operator.
pub fn zookeeper_env_vars(replicas: i32, metrics_enabled: bool, gc_logging_enabled: bool) -> Vec<EnvVar> {
    vec![
        plain(env::ZOOKEEPER_NODE_COUNT, replicas.to_string()),
        plain(env::ZOOKEEPER_METRICS_ENABLED, metrics_enabled.to_string()),
        plain(env::ZOOKEEPER_SNAPSHOT_CHECK_ENABLED, "true"),
        plain(env::KAFKA_GC_LOG_ENABLED, gc_logging_enabled.to_string()),
    ]
}
