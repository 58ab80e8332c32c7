use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named, ported entry point into the brokers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericListener {
    /// Listener name. Lowercase letters and digits, at most 11 characters.
    pub name: String,

    /// Container port of the listener.
    pub port: i32,

    /// Exposure mechanism.
    #[serde(rename = "type")]
    pub type_: ListenerType,

    /// Enable TLS encryption.
    #[serde(default)]
    pub tls: bool,

    /// Client authentication.
    #[serde(default)]
    pub authentication: Option<ListenerAuthentication>,

    /// Peers allowed to connect. Empty means everyone.
    #[serde(default)]
    pub network_policy_peers: Vec<NetworkPolicyPeer>,

    /// Cluster-wide defaults and per-broker overrides.
    #[serde(default)]
    pub configuration: Option<ListenerConfiguration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListenerType {
    Internal,
    #[serde(rename = "nodeport")]
    NodePort,
    #[serde(rename = "loadbalancer")]
    LoadBalancer,
    Ingress,
    Route,
}

impl ListenerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerType::Internal => "internal",
            ListenerType::NodePort => "nodeport",
            ListenerType::LoadBalancer => "loadbalancer",
            ListenerType::Ingress => "ingress",
            ListenerType::Route => "route",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ListenerAuthentication {
    /// Mutual TLS.
    Tls,
    #[serde(rename = "scram-sha-512")]
    ScramSha512,
    Oauth(OAuthAuthentication),
}

impl JsonSchema for ListenerAuthentication {
    fn schema_name() -> String {
        "ListenerAuthentication".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        super::common::tagged_object_schema(
            &["tls", "scram-sha-512", "oauth"],
            vec![
                ("validIssuerUri", gen.subschema_for::<String>()),
                ("jwksEndpointUri", gen.subschema_for::<String>()),
                ("introspectionEndpointUri", gen.subschema_for::<String>()),
                ("clientId", gen.subschema_for::<String>()),
                ("userNameClaim", gen.subschema_for::<String>()),
            ],
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAuthentication {
    #[serde(default)]
    pub valid_issuer_uri: Option<String>,

    #[serde(default)]
    pub jwks_endpoint_uri: Option<String>,

    #[serde(default)]
    pub introspection_endpoint_uri: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub user_name_claim: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfiguration {
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfiguration>,

    #[serde(default)]
    pub brokers: Vec<BrokerListenerOverride>,

    /// Ingress class for `ingress` listeners.
    #[serde(default)]
    pub ingress_class: Option<String>,

    /// `nodeport` and `loadbalancer` only.
    #[serde(default)]
    pub external_traffic_policy: Option<ExternalTrafficPolicy>,

    /// `loadbalancer` only.
    #[serde(default)]
    pub load_balancer_source_ranges: Vec<String>,

    /// `loadbalancer` only.
    #[serde(default)]
    pub finalizers: Vec<String>,

    #[serde(default)]
    pub ip_family_policy: Option<IpFamilyPolicy>,

    #[serde(default)]
    pub ip_families: Vec<IpFamily>,

    /// Node address used as advertised host for `nodeport` listeners.
    #[serde(default)]
    pub preferred_node_port_address_type: Option<NodeAddressType>,

    /// Create the per-listener bootstrap service (`loadbalancer` only).
    #[serde(default = "super::defaults::create_bootstrap_service")]
    pub create_bootstrap_service: bool,
}

impl Default for ListenerConfiguration {
    fn default() -> Self {
        Self {
            bootstrap: None,
            brokers: Vec::new(),
            ingress_class: None,
            external_traffic_policy: None,
            load_balancer_source_ranges: Vec::new(),
            finalizers: Vec::new(),
            ip_family_policy: None,
            ip_families: Vec::new(),
            preferred_node_port_address_type: None,
            create_bootstrap_service: super::defaults::create_bootstrap_service(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfiguration {
    /// Host for `ingress` and `route` bootstrap.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub node_port: Option<i32>,

    #[serde(default, rename = "loadBalancerIP")]
    pub load_balancer_ip: Option<String>,

    /// Extra names added to the broker certificates.
    #[serde(default)]
    pub alternative_names: Vec<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerListenerOverride {
    pub broker: i32,

    #[serde(default)]
    pub advertised_host: Option<String>,

    #[serde(default)]
    pub advertised_port: Option<i32>,

    /// Host for `ingress` and `route` per-broker access.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub node_port: Option<i32>,

    #[serde(default, rename = "loadBalancerIP")]
    pub load_balancer_ip: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ExternalTrafficPolicy {
    Local,
    Cluster,
}

impl ExternalTrafficPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalTrafficPolicy::Local => "Local",
            ExternalTrafficPolicy::Cluster => "Cluster",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum IpFamilyPolicy {
    SingleStack,
    PreferDualStack,
    RequireDualStack,
}

impl IpFamilyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamilyPolicy::SingleStack => "SingleStack",
            IpFamilyPolicy::PreferDualStack => "PreferDualStack",
            IpFamilyPolicy::RequireDualStack => "RequireDualStack",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum IpFamily {
    #[serde(rename = "IPv4")]
    IPv4,
    #[serde(rename = "IPv6")]
    IPv6,
}

impl IpFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::IPv4 => "IPv4",
            IpFamily::IPv6 => "IPv6",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NodeAddressType {
    ExternalIP,
    ExternalDNS,
    InternalIP,
    InternalDNS,
    Hostname,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_deserializes_overrides() {
        let listener: GenericListener = serde_json::from_str(
            r#"{
                "name": "external",
                "port": 9094,
                "type": "nodeport",
                "tls": true,
                "authentication": {"type": "scram-sha-512"},
                "configuration": {
                    "bootstrap": {"nodePort": 32001},
                    "brokers": [{"broker": 1, "nodePort": 32101, "advertisedHost": ""}],
                    "ipFamilies": ["IPv4", "IPv6"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(listener.type_, ListenerType::NodePort);
        assert_eq!(
            listener.authentication,
            Some(ListenerAuthentication::ScramSha512)
        );
        let config = listener.configuration.unwrap();
        assert!(config.create_bootstrap_service);
        assert_eq!(config.bootstrap.unwrap().node_port, Some(32001));
        assert_eq!(config.brokers[0].advertised_host.as_deref(), Some(""));
        assert_eq!(config.ip_families, vec![IpFamily::IPv4, IpFamily::IPv6]);
    }

    #[test]
    fn test_scram_authentication_type_name() {
        let auth: ListenerAuthentication =
            serde_json::from_str(r#"{"type":"scram-sha-512"}"#).unwrap();
        assert_eq!(auth, ListenerAuthentication::ScramSha512);
        assert_eq!(
            serde_json::to_value(&auth).unwrap(),
            serde_json::json!({"type": "scram-sha-512"})
        );
        let legacy = serde_json::from_str::<ListenerAuthentication>(r#"{"type":"scram-sha512"}"#);
        assert!(legacy.is_err());
    }

    #[test]
    fn test_oauth_authentication_fields() {
        let auth: ListenerAuthentication = serde_json::from_str(
            r#"{"type":"oauth","validIssuerUri":"https://sso/realms/kafka","userNameClaim":"preferred_username"}"#,
        )
        .unwrap();
        let ListenerAuthentication::Oauth(oauth) = auth else {
            panic!("expected oauth authentication");
        };
        assert_eq!(oauth.valid_issuer_uri.as_deref(), Some("https://sso/realms/kafka"));
        assert_eq!(oauth.user_name_claim.as_deref(), Some("preferred_username"));
        assert!(oauth.client_id.is_none());
    }

    #[test]
    fn test_load_balancer_ip_field_name() {
        let config: BootstrapConfiguration =
            serde_json::from_str(r#"{"loadBalancerIP": "10.0.0.1"}"#).unwrap();
        assert_eq!(config.load_balancer_ip.as_deref(), Some("10.0.0.1"));
    }
}
