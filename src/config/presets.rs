//! Custom pass presets
//!
//! A preset is a JSON descriptor that names a material to bake with, the
//! renderer bake type and a typed parameter schema. The `CustomPass` node
//! validates its parameter overrides against this schema at compile time
//! and the worker receives the resolved descriptor with each bake unit.
//!
//! ```json
//! {
//!     "Name": "ElementID",
//!     "Material": "ElementID",
//!     "Run": "run.py",
//!     "BakeType": "EMIT",
//!     "Params": {
//!         "Seed": {"type": "INT", "node": "Hash", "name": "seed", "data_path": "...", "min": 0, "max": 100}
//!     },
//!     "Description": "Random color per mesh island"
//! }
//! ```
//!
//! Presets are keyed by file stem.

use crate::error::{BakeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Typed schema of one preset parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ParamKind {
    #[serde(alias = "VALUE")]
    Float {
        #[serde(default)]
        min: f64,
        #[serde(default = "one_f64")]
        max: f64,
        #[serde(default = "one_f64")]
        step: f64,
        #[serde(default)]
        default: f64,
    },
    Int {
        #[serde(default)]
        min: i64,
        #[serde(default = "one_i64")]
        max: i64,
        #[serde(default = "one_i64")]
        step: i64,
        #[serde(default)]
        default: i64,
    },
    Vector {
        #[serde(default)]
        default: [f64; 3],
    },
    #[serde(rename = "RGBA")]
    Color {
        #[serde(default = "opaque_black")]
        default: [f64; 4],
    },
    #[serde(rename = "BOOLEAN")]
    Bool {
        #[serde(default)]
        default: bool,
    },
}

fn one_f64() -> f64 {
    1.0
}

fn one_i64() -> i64 {
    1
}

fn opaque_black() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// One named parameter of a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Key in the preset's `Params` map; what overrides are keyed by.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Material node the parameter lives on.
    #[serde(default)]
    pub node: String,
    /// Input or property name on that node.
    #[serde(default)]
    pub name: String,
    /// Property path the worker assigns the value to.
    #[serde(default)]
    pub data_path: String,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamDescriptor {
    /// Value used when a node does not override the parameter.
    pub fn default_value(&self) -> Value {
        match &self.kind {
            ParamKind::Float { default, .. } => Value::from(*default),
            ParamKind::Int { default, .. } => Value::from(*default),
            ParamKind::Vector { default } => Value::from(default.to_vec()),
            ParamKind::Color { default } => Value::from(default.to_vec()),
            ParamKind::Bool { default } => Value::from(*default),
        }
    }

    /// Check an override against the schema, clamping numbers into range.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let invalid = |expected: &str| {
            BakeError::Preset(format!(
                "parameter {} expects {}, got {}",
                self.key, expected, value
            ))
        };
        match &self.kind {
            ParamKind::Float { min, max, .. } => {
                let v = value.as_f64().ok_or_else(|| invalid("a number"))?;
                Ok(Value::from(v.clamp(*min, *max)))
            }
            ParamKind::Int { min, max, .. } => {
                let v = match value.as_i64() {
                    Some(v) => v,
                    None => match value.as_f64() {
                        Some(f) if f.fract() == 0.0 => f as i64,
                        _ => return Err(invalid("an integer")),
                    },
                };
                Ok(Value::from(v.clamp(*min, *max)))
            }
            ParamKind::Vector { .. } => {
                let v = number_array(value, 3, 3).ok_or_else(|| invalid("3 numbers"))?;
                Ok(Value::from(v))
            }
            ParamKind::Color { .. } => {
                let mut v = number_array(value, 3, 4).ok_or_else(|| invalid("3 or 4 numbers"))?;
                if v.len() == 3 {
                    v.push(1.0);
                }
                Ok(Value::from(v))
            }
            ParamKind::Bool { .. } => value
                .as_bool()
                .map(Value::from)
                .ok_or_else(|| invalid("a boolean")),
        }
    }

    fn validate(&self) -> Result<()> {
        let bad = |msg: &str| BakeError::Preset(format!("parameter {}: {}", self.key, msg));
        match &self.kind {
            ParamKind::Float {
                min,
                max,
                step,
                default,
            } => {
                if min > max {
                    return Err(bad("min greater than max"));
                }
                if *step <= 0.0 {
                    return Err(bad("step must be positive"));
                }
                if default < min || default > max {
                    return Err(bad("default out of range"));
                }
            }
            ParamKind::Int {
                min,
                max,
                step,
                default,
            } => {
                if min > max {
                    return Err(bad("min greater than max"));
                }
                if *step <= 0 {
                    return Err(bad("step must be positive"));
                }
                if default < min || default > max {
                    return Err(bad("default out of range"));
                }
            }
            ParamKind::Vector { .. } | ParamKind::Color { .. } | ParamKind::Bool { .. } => {}
        }
        Ok(())
    }
}

fn number_array(value: &Value, min_len: usize, max_len: usize) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    if items.len() < min_len || items.len() > max_len {
        return None;
    }
    items.iter().map(Value::as_f64).collect()
}

/// A loaded custom pass preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDescriptor {
    /// File stem; the name `CustomPass` nodes refer to.
    pub id: String,
    pub name: String,
    /// Material the worker bakes with.
    pub material: String,
    /// Optional preparation script run before baking.
    #[serde(default)]
    pub run: Option<String>,
    /// Renderer bake type used for the pass.
    pub bake_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
}

/// On-disk preset layout.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PresetFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    material: Option<String>,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    bake_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    params: Map<String, Value>,
}

impl PresetDescriptor {
    /// Parse a preset file body. `id` is the file stem.
    pub fn from_json_str(id: &str, json: &str) -> Result<Self> {
        let file: PresetFile = serde_json::from_str(json)
            .map_err(|e| BakeError::Preset(format!("{}: {}", id, e)))?;

        let mut params = Vec::with_capacity(file.params.len());
        for (key, raw) in file.params {
            let mut param: ParamDescriptor = serde_json::from_value(raw)
                .map_err(|e| BakeError::Preset(format!("{}: parameter {}: {}", id, key, e)))?;
            param.key = key;
            params.push(param);
        }

        let name = file.name.unwrap_or_else(|| id.to_string());
        let descriptor = Self {
            id: id.to_string(),
            material: file.material.unwrap_or_else(|| name.clone()),
            name,
            run: file.run.filter(|r| !r.is_empty()),
            bake_type: file.bake_type.unwrap_or_else(|| "EMIT".to_string()),
            description: file.description,
            params,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn param(&self, key: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.key == key)
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BakeError::Preset("preset without a name".to_string()));
        }
        for param in &self.params {
            param
                .validate()
                .map_err(|e| e.with_context(format!("Preset {}", self.id)))?;
        }
        Ok(())
    }
}

/// Every preset available to `CustomPass` nodes, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    presets: BTreeMap<String, PresetDescriptor>,
}

impl PresetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file of a directory.
    ///
    /// Any malformed preset fails the whole load.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            BakeError::Preset(format!("Failed to read preset directory {:?}: {}", dir, e))
        })?;

        let mut table = Self::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            table.insert(PresetDescriptor::from_json_str(id, &content)?);
        }

        tracing::debug!("Loaded {} presets from {:?}", table.len(), dir);
        Ok(table)
    }

    pub fn insert(&mut self, preset: PresetDescriptor) -> Option<PresetDescriptor> {
        self.presets.insert(preset.id.clone(), preset)
    }

    pub fn get(&self, id: &str) -> Option<&PresetDescriptor> {
        self.presets.get(id)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresetDescriptor> {
        self.presets.values()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
