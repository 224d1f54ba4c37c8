// ABOUTME: Reader for the dbt manifest.json artifact
// ABOUTME: Extracts model nodes and their dependencies to derive a build order

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::PipelineError;

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    nodes: BTreeMap<String, RawNode>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    dbt_version: Option<String>,
    #[serde(default)]
    project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    resource_type: String,
    name: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    depends_on: RawDependsOn,
}

#[derive(Debug, Default, Deserialize)]
struct RawDependsOn {
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub unique_id: String,
    pub name: String,
    pub schema: Option<String>,
    /// Unique ids of the models this one selects from.
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub dbt_version: Option<String>,
    pub project_name: Option<String>,
    models: BTreeMap<String, Model>,
}

impl Manifest {
    /// Load the manifest at exactly `path`. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::Manifest(format!(
                "manifest not found at {}; run `compile` to generate it",
                path.display()
            ))
            .into());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to load manifest {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(contents)
            .map_err(|e| PipelineError::Manifest(format!("invalid manifest json: {}", e)))?;

        let model_ids: BTreeSet<&str> = raw
            .nodes
            .iter()
            .filter(|(_, node)| node.resource_type == "model")
            .map(|(id, _)| id.as_str())
            .collect();

        let models = raw
            .nodes
            .iter()
            .filter(|(id, _)| model_ids.contains(id.as_str()))
            .map(|(id, node)| {
                let mut depends_on: Vec<String> = node
                    .depends_on
                    .nodes
                    .iter()
                    .filter(|dep| model_ids.contains(dep.as_str()))
                    .cloned()
                    .collect();
                depends_on.sort();
                depends_on.dedup();

                let model = Model {
                    unique_id: id.clone(),
                    name: node.name.clone(),
                    schema: node.schema.clone(),
                    depends_on,
                };
                (id.clone(), model)
            })
            .collect();

        Ok(Self {
            dbt_version: raw.metadata.dbt_version,
            project_name: raw.metadata.project_name,
            models,
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Models ordered so that every model follows its dependencies. Ties are
    /// broken by unique id.
    pub fn build_order(&self) -> Result<Vec<&Model>> {
        let mut pending: BTreeMap<&str, usize> = self
            .models
            .values()
            .map(|m| (m.unique_id.as_str(), m.depends_on.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for model in self.models.values() {
            for dep in &model.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(model.unique_id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.models.len());
        while let Some(id) = ready.pop_first() {
            pending.remove(id);
            order.push(&self.models[id]);

            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let cycle: Vec<&str> = pending.keys().copied().collect();
            return Err(PipelineError::Manifest(format!(
                "dependency cycle between models: {}",
                cycle.join(", ")
            ))
            .into());
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> String {
        json!({
            "metadata": { "dbt_version": "1.9.1", "project_name": "weather_project" },
            "nodes": {
                "model.weather_project.weather_daily_summary": {
                    "resource_type": "model",
                    "name": "weather_daily_summary",
                    "depends_on": { "nodes": [
                        "model.weather_project.stg_weather_forecast_daily",
                        "model.weather_project.stg_weather_current"
                    ] }
                },
                "model.weather_project.stg_weather_forecast_daily": {
                    "resource_type": "model",
                    "name": "stg_weather_forecast_daily",
                    "depends_on": { "nodes": [] }
                },
                "model.weather_project.stg_weather_current": {
                    "resource_type": "model",
                    "name": "stg_weather_current",
                    "schema": "staging",
                    "depends_on": { "nodes": ["source.weather_project.airbyte.current"] }
                },
                "test.weather_project.not_null_current_id": {
                    "resource_type": "test",
                    "name": "not_null_current_id",
                    "depends_on": { "nodes": ["model.weather_project.stg_weather_current"] }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn keeps_only_models_and_model_edges() {
        let manifest = Manifest::from_json(&manifest()).unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.project_name.as_deref(), Some("weather_project"));

        let current = manifest
            .models()
            .find(|m| m.name == "stg_weather_current")
            .unwrap();
        assert!(current.depends_on.is_empty());
        assert_eq!(current.schema.as_deref(), Some("staging"));
    }

    #[test]
    fn build_order_respects_dependencies() {
        let manifest = Manifest::from_json(&manifest()).unwrap();
        let order: Vec<&str> = manifest
            .build_order()
            .unwrap()
            .into_iter()
            .map(|m| m.name.as_str())
            .collect();

        assert_eq!(
            order,
            vec![
                "stg_weather_current",
                "stg_weather_forecast_daily",
                "weather_daily_summary"
            ]
        );
    }

    #[test]
    fn cycle_is_an_error() {
        let contents = json!({
            "nodes": {
                "model.p.a": { "resource_type": "model", "name": "a", "depends_on": { "nodes": ["model.p.b"] } },
                "model.p.b": { "resource_type": "model", "name": "b", "depends_on": { "nodes": ["model.p.a"] } },
                "model.p.c": { "resource_type": "model", "name": "c" }
            }
        })
        .to_string();

        let manifest = Manifest::from_json(&contents).unwrap();
        let err = manifest.build_order().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("model.p.a") && msg.contains("model.p.b"), "got: {msg}");
        assert!(!msg.contains("model.p.c"));
    }

    #[test]
    fn missing_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("manifest.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Manifest(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, manifest()).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.dbt_version.as_deref(), Some("1.9.1"));
        assert!(!manifest.is_empty());
    }

    #[test]
    fn invalid_json_is_a_manifest_error() {
        let err = Manifest::from_json("not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Manifest(_))
        ));
    }
}
