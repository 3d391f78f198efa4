//! Manifest parsing
//!
//! Turns YAML manifest files into typed desired-state objects:
//! - Multi-document files, one object per document
//! - Every document needs a `kind` and a `metadata.name`
//! - `metadata.namespace` and `metadata.labels` are carried when present;
//!   the reconciler defaults missing namespaces to the application's
//!   destination later
//! - Everything outside `kind`/`metadata` becomes the object's spec payload,
//!   canonicalized as JSON so equal sources render byte-identically

use capstan_core::domain::object::{ManifestObject, ObjectKey};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::RenderError;

/// Optional per-path render configuration file
pub const CONFIG_FILE: &str = "capstan.yaml";

/// Render configuration for one application path.
///
/// `resources` lists base manifest files in apply declaration order;
/// `overlays` lists patch files applied afterwards in declaration order.
/// Without a config file every `*.yaml`/`*.yml` in the tree is a base
/// manifest, taken in lexical order, and no overlays apply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
}

impl RenderConfig {
    /// Builds the implicit configuration for a tree without a config file
    pub fn discover(tree: &crate::source::SourceTree) -> Self {
        let resources = tree
            .file_names()
            .filter(|name| {
                *name != CONFIG_FILE
                    && (name.ends_with(".yaml") || name.ends_with(".yml"))
            })
            .map(String::from)
            .collect();
        Self {
            resources,
            overlays: Vec::new(),
        }
    }
}

/// Parses the render configuration file
pub fn parse_config(content: &str) -> Result<RenderConfig, RenderError> {
    serde_yaml::from_str(content)
        .map_err(|e| RenderError::parse(CONFIG_FILE, e.to_string()))
}

/// Parses one manifest file into desired-state objects.
///
/// # Arguments
/// * `file` - File name, used for error reporting only
/// * `content` - Multi-document YAML source
pub fn parse_documents(
    file: &str,
    content: &str,
) -> Result<Vec<ManifestObject>, RenderError> {
    let mut objects = Vec::new();

    for (index, document) in
        serde_yaml::Deserializer::from_str(content).enumerate()
    {
        let yaml = serde_yaml::Value::deserialize(document).map_err(|e| {
            RenderError::parse(file, format!("document {}: {e}", index + 1))
        })?;
        if yaml.is_null() {
            continue;
        }

        let json = serde_json::to_value(&yaml).map_err(|e| {
            RenderError::parse(file, format!("document {}: {e}", index + 1))
        })?;
        let object = object_from_document(json).map_err(|message| {
            RenderError::parse(file, format!("document {}: {message}", index + 1))
        })?;
        objects.push(object);
    }

    Ok(objects)
}

/// Builds a ManifestObject out of one parsed document
fn object_from_document(document: Value) -> Result<ManifestObject, String> {
    let Value::Object(mut doc) = document else {
        return Err("manifest document must be a mapping".to_string());
    };

    let kind = match doc.remove("kind") {
        Some(Value::String(kind)) if !kind.is_empty() => kind,
        Some(_) => return Err("'kind' must be a non-empty string".to_string()),
        None => return Err("missing required field 'kind'".to_string()),
    };

    let metadata = match doc.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        Some(_) => return Err("'metadata' must be a mapping".to_string()),
        None => return Err("missing required field 'metadata'".to_string()),
    };

    let name = match metadata.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(_) => {
            return Err("'metadata.name' must be a non-empty string".to_string());
        }
        None => return Err("missing required field 'metadata.name'".to_string()),
    };

    let namespace = match metadata.get("namespace") {
        Some(Value::String(namespace)) => namespace.clone(),
        Some(_) => {
            return Err("'metadata.namespace' must be a string".to_string());
        }
        None => String::new(),
    };

    let labels = parse_labels(metadata.get("labels"))?;

    Ok(ManifestObject {
        key: ObjectKey::new(kind, namespace, name),
        labels,
        spec: Value::Object(doc),
    })
}

fn parse_labels(
    value: Option<&Value>,
) -> Result<BTreeMap<String, String>, String> {
    let mut labels = BTreeMap::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                match value {
                    Value::String(value) => {
                        labels.insert(key.clone(), value.clone());
                    }
                    _ => {
                        return Err(format!(
                            "label '{key}' must be a string value"
                        ));
                    }
                }
            }
        }
        Some(_) => return Err("'metadata.labels' must be a mapping".to_string()),
    }
    Ok(labels)
}
