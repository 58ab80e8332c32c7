//! Kubernetes objects materializing the cluster model.
//!
//! Builders take resolved model parts (topology, listener table, storage)
//! and never look at the custom resource directly.

pub mod configmap_builder;
pub mod ingress_builder;
pub mod network_policy_builder;
pub mod pvc_builder;
pub mod service_builder;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crds::{ChronikKafka, ResourceTemplate};
use crate::error::{ModelError, Result};

/// Owner reference pointing at the `ChronikKafka` resource.
pub fn owner_reference(kafka: &ChronikKafka) -> Result<OwnerReference> {
    let uid = kafka
        .uid()
        .ok_or_else(|| ModelError::invalid("metadata.uid is missing on the ChronikKafka resource"))?;
    Ok(OwnerReference {
        api_version: ChronikKafka::api_version(&()).to_string(),
        kind: ChronikKafka::kind(&()).to_string(),
        name: kafka.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// `base` with `extra` layered on top.
pub(crate) fn merged(
    base: BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = base;
    out.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Metadata shared by every generated object.
pub(crate) fn object_meta(
    name: String,
    namespace: &str,
    labels: BTreeMap<String, String>,
    template: Option<&ResourceTemplate>,
    owner_ref: Option<&OwnerReference>,
) -> ObjectMeta {
    let (labels, annotations) = match template {
        Some(t) => (merged(labels, &t.labels), t.annotations.clone()),
        None => (labels, BTreeMap::new()),
    };
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.into()),
        labels: Some(labels),
        annotations: (!annotations.is_empty()).then_some(annotations),
        owner_references: owner_ref.map(|r| vec![r.clone()]),
        ..Default::default()
    }
}
