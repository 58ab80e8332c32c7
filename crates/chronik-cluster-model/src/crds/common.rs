use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a key within a Kubernetes Secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeyRef {
    /// Secret name.
    pub name: String,

    /// Key within the Secret.
    pub key: String,
}

/// Kubernetes-style condition for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Ready", "Warning").
    #[serde(rename = "type")]
    pub type_: String,

    /// Status: "True", "False", or "Unknown".
    pub status: String,

    /// Machine-readable reason (e.g., "KafkaStorage").
    #[serde(default)]
    pub reason: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,

    /// Last transition time (ISO 8601 string). Left empty by the model;
    /// the status writer stamps it.
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: "Warning".into(),
            status: "True".into(),
            reason: Some(reason.into()),
            message: Some(message.into()),
            last_transition_time: None,
        }
    }
}

/// Environment variable definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name.
    pub name: String,

    /// Variable value (plain text).
    #[serde(default)]
    pub value: Option<String>,

    /// Value from a Secret key reference.
    #[serde(default)]
    pub value_from_secret: Option<SecretKeyRef>,
}

/// Extra metadata merged into a generated resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Container customisation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerTemplate {
    /// Additional environment variables. Names the operator sets itself are
    /// ignored.
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Templates for resources generated for one node role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    #[serde(default)]
    pub persistent_volume_claim: Option<ResourceTemplate>,

    #[serde(default)]
    pub container: Option<ContainerTemplate>,

    #[serde(default)]
    pub bootstrap_service: Option<ResourceTemplate>,

    #[serde(default)]
    pub headless_service: Option<ResourceTemplate>,
}

impl NodeTemplate {
    pub fn container_env(&self) -> &[EnvVar] {
        self.container.as_ref().map(|c| c.env.as_slice()).unwrap_or_default()
    }
}

/// Listener status, reported in CR status so users know how to connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    /// Listener name.
    pub name: String,

    /// Bootstrap servers string (e.g., "foo-kafka-bootstrap.ns.svc:9092").
    pub bootstrap_servers: String,
}

/// Schema for free-form maps such as broker `config`, which the API server
/// must store as given.
pub(crate) fn preserve_unknown_fields(
    _: &mut schemars::gen::SchemaGenerator,
) -> schemars::schema::Schema {
    schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    }
    .into()
}

/// Structural schema for an enum tagged by `type`.
///
/// The API server rejects variants that declare `type` with different enums,
/// so all variant fields are flattened into one object and `type` becomes a
/// required string restricted to `tags`.
pub(crate) fn tagged_object_schema(
    tags: &[&str],
    properties: Vec<(&str, schemars::schema::Schema)>,
) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, ObjectValidation, SchemaObject};

    let tag = SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        enum_values: Some(tags.iter().map(|t| serde_json::Value::from(*t)).collect()),
        ..Default::default()
    };

    let mut object = ObjectValidation::default();
    object.required.insert("type".to_string());
    object.properties.insert("type".to_string(), tag.into());
    for (name, schema) in properties {
        object.properties.insert(name.to_string(), schema);
    }

    SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        object: Some(Box::new(object)),
        ..Default::default()
    }
    .into()
}
