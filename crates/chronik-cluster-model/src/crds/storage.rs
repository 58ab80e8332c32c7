use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Storage for one node role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Storage {
    Ephemeral(EphemeralStorage),
    PersistentClaim(PersistentClaimStorage),
    Jbod(JbodStorage),
}

impl Storage {
    /// Stable name of the storage kind, used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Storage::Ephemeral(_) => "ephemeral",
            Storage::PersistentClaim(_) => "persistent-claim",
            Storage::Jbod(_) => "jbod",
        }
    }

    /// Persistent volumes backing this storage, in declaration order.
    pub fn persistent_volumes(&self) -> &[PersistentClaimStorage] {
        match self {
            Storage::Ephemeral(_) => &[],
            Storage::PersistentClaim(volume) => std::slice::from_ref(volume),
            Storage::Jbod(jbod) => &jbod.volumes,
        }
    }
}

impl JsonSchema for Storage {
    fn schema_name() -> String {
        "Storage".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        super::common::tagged_object_schema(
            &["ephemeral", "persistent-claim", "jbod"],
            vec![
                ("sizeLimit", gen.subschema_for::<String>()),
                ("id", gen.subschema_for::<i32>()),
                ("size", gen.subschema_for::<String>()),
                ("storageClass", gen.subschema_for::<String>()),
                ("deleteClaim", gen.subschema_for::<bool>()),
                ("selector", gen.subschema_for::<BTreeMap<String, String>>()),
                ("overrides", gen.subschema_for::<Vec<StorageClassOverride>>()),
                ("volumes", gen.subschema_for::<Vec<PersistentClaimStorage>>()),
            ],
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralStorage {
    /// Size limit of the emptyDir volume (e.g., "2Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentClaimStorage {
    /// Volume id. Required inside `jbod`, names the claim and the log dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,

    /// Requested size (e.g., "100Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Kubernetes StorageClass name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Delete the claim when the cluster is deleted.
    #[serde(default)]
    pub delete_claim: bool,

    /// Label selector for binding a specific persistent volume.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    /// Per-broker storage class overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<StorageClassOverride>,
}

impl PersistentClaimStorage {
    /// Storage class used for the claim of `broker_id`.
    pub fn storage_class_for(&self, broker_id: i32) -> Option<&str> {
        self.overrides
            .iter()
            .find(|o| o.broker == broker_id)
            .and_then(|o| o.storage_class.as_deref())
            .or(self.storage_class.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassOverride {
    pub broker: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JbodStorage {
    #[serde(default)]
    pub volumes: Vec<PersistentClaimStorage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_deserializes_by_type_tag() {
        let storage: Storage = serde_json::from_str(
            r#"{"type":"jbod","volumes":[{"id":0,"size":"100Gi","storageClass":"gp2-ssd"}]}"#,
        )
        .unwrap();
        let volumes = storage.persistent_volumes();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].id, Some(0));
        assert_eq!(volumes[0].storage_class.as_deref(), Some("gp2-ssd"));
        assert!(!volumes[0].delete_claim);

        let storage: Storage = serde_json::from_str(r#"{"type":"ephemeral"}"#).unwrap();
        assert_eq!(storage.kind(), "ephemeral");
        assert!(storage.persistent_volumes().is_empty());
    }

    #[test]
    fn test_storage_class_override_only_for_matching_broker() {
        let volume = PersistentClaimStorage {
            size: Some("100Gi".into()),
            storage_class: Some("gp2".into()),
            overrides: vec![StorageClassOverride {
                broker: 1,
                storage_class: Some("gp2-st1".into()),
            }],
            ..Default::default()
        };
        assert_eq!(volume.storage_class_for(0), Some("gp2"));
        assert_eq!(volume.storage_class_for(1), Some("gp2-st1"));
        assert_eq!(volume.storage_class_for(2), Some("gp2"));
    }

    #[test]
    fn test_storage_schema_is_a_single_object() {
        let schema = serde_json::to_value(schemars::schema_for!(Storage)).unwrap();
        assert!(schema.get("oneOf").is_none());
        assert_eq!(
            schema["properties"]["type"]["enum"],
            serde_json::json!(["ephemeral", "persistent-claim", "jbod"])
        );
        assert_eq!(schema["required"], serde_json::json!(["type"]));
        assert!(schema["properties"]["volumes"].is_object());
        assert!(schema["properties"]["deleteClaim"].is_object());
    }
}
