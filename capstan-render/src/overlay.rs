//! Overlay patches
//!
//! Overlays are YAML files of partial objects. Each document targets one
//! base object by `kind` + `metadata.name` and deep-merges into it with
//! merge-patch semantics: mappings merge recursively, scalars and
//! sequences replace, `null` deletes a key. Two departures from plain
//! merge-patch keep mistakes loud instead of silent:
//! - A patch whose target object does not exist is a conflict
//! - Replacing a mapping with a non-mapping (or vice versa) is a conflict

use capstan_core::domain::object::ManifestObject;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RenderError;

/// Applies every patch document in one overlay file to the base objects.
///
/// Patches apply in declaration order; the first failure aborts with
/// nothing to roll back because callers only keep fully rendered output.
pub fn apply_overlay_file(
    objects: &mut [ManifestObject],
    file: &str,
    content: &str,
) -> Result<(), RenderError> {
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
        apply_patch(objects, file, json)?;
    }
    Ok(())
}

/// Applies a single parsed patch document
fn apply_patch(
    objects: &mut [ManifestObject],
    file: &str,
    patch: Value,
) -> Result<(), RenderError> {
    let Value::Object(mut patch) = patch else {
        return Err(RenderError::parse(
            file,
            "overlay document must be a mapping",
        ));
    };

    let kind = match patch.remove("kind") {
        Some(Value::String(kind)) => kind,
        _ => {
            return Err(RenderError::parse(
                file,
                "overlay document must name a 'kind' to target",
            ));
        }
    };
    let metadata = match patch.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => {
            return Err(RenderError::parse(
                file,
                "overlay document must carry 'metadata.name' to target",
            ));
        }
    };
    let name = match metadata.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => {
            return Err(RenderError::parse(
                file,
                "overlay document must carry 'metadata.name' to target",
            ));
        }
    };

    let target = objects
        .iter_mut()
        .find(|o| o.key.kind == kind && o.key.name == name)
        .ok_or_else(|| {
            RenderError::PatchConflict(format!(
                "overlay {file} targets {kind}/{name}, which no base manifest defines"
            ))
        })?;

    if let Some(Value::String(namespace)) = metadata.get("namespace") {
        target.key.namespace = namespace.clone();
    }
    merge_labels(target, metadata.get("labels"))
        .map_err(|message| RenderError::parse(file, message))?;

    merge_value(&mut target.spec, &Value::Object(patch), "")
}

/// Upserts patch labels into the target; a null label value deletes it
fn merge_labels(
    target: &mut ManifestObject,
    labels: Option<&Value>,
) -> Result<(), String> {
    let Some(Value::Object(map)) = labels else {
        return Ok(());
    };
    for (key, value) in map {
        match value {
            Value::Null => {
                target.labels.remove(key);
            }
            Value::String(value) => {
                target.labels.insert(key.clone(), value.clone());
            }
            _ => return Err(format!("label '{key}' must be a string value")),
        }
    }
    Ok(())
}

/// Recursive merge-patch step
fn merge_value(
    base: &mut Value,
    patch: &Value,
    path: &str,
) -> Result<(), RenderError> {
    let patch_map = match patch {
        Value::Object(map) => map,
        other => {
            if base.is_object() {
                return Err(RenderError::PatchConflict(format!(
                    "cannot replace mapping at '{path}' with {}",
                    shape_of(other)
                )));
            }
            *base = other.clone();
            return Ok(());
        }
    };

    if base.is_null() {
        *base = Value::Object(serde_json::Map::new());
    }
    let base_map = match base {
        Value::Object(map) => map,
        other => {
            return Err(RenderError::PatchConflict(format!(
                "cannot merge mapping into {} at '{path}'",
                shape_of(other)
            )));
        }
    };

    for (key, value) in patch_map {
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        if value.is_null() {
            base_map.remove(key);
        } else {
            let slot = base_map.entry(key.clone()).or_insert(Value::Null);
            merge_value(slot, value, &child)?;
        }
    }
    Ok(())
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
