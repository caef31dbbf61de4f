//! Declared output contracts for structured extraction.
//!
//! An [`ExtractionSchema`] is derived from the Rust type a completion must decode into. It is
//! sent to the completion service as a tool/function definition, and the typed serde decode is
//! what enforces it when the reply comes back.

use rig::completion::ToolDefinition;
use schemars::{JsonSchema, generate::SchemaSettings};
use serde::{
    Deserialize, Deserializer,
    de::{DeserializeOwned, Error as _},
};
use serde_json::{Map, Value};

use crate::error::StageError;

/// A named, versioned tool contract a completion must fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    name: String,
    version: u32,
    description: String,
    parameters: Value,
}

impl ExtractionSchema {
    /// Derive the tool parameters from `T`'s `JsonSchema`, with nested types inlined.
    pub fn of<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let generator = SchemaSettings::draft07()
            .with(|settings| {
                settings.inline_subschemas = true;
                settings.meta_schema = None;
            })
            .into_generator();
        let mut parameters = generator.into_root_schema_for::<T>().to_value();
        if let Some(root) = parameters.as_object_mut() {
            root.remove("title");
        }

        Self {
            name: name.into(),
            version: 1,
            description: description.into(),
            parameters,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name@vN`, used in logs and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }

    /// JSON Schema for the tool parameters.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Strictly decode a reply into `T`.
    ///
    /// A bare array is accepted when the schema has exactly one required property and it is a
    /// list; it is wrapped into that property first.
    pub fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, StageError> {
        let value = match value {
            Value::Array(items) => match self.sole_list_property() {
                Some(property) => {
                    let mut object = Map::new();
                    object.insert(property.to_string(), Value::Array(items));
                    Value::Object(object)
                }
                None => return Err(self.violation("expected a JSON object, got an array")),
            },
            object @ Value::Object(_) => object,
            other => {
                return Err(self.violation(format!(
                    "expected a JSON object, got {}",
                    type_name(&other)
                )));
            }
        };

        serde_json::from_value(value).map_err(|e| self.violation(e.to_string()))
    }

    fn sole_list_property(&self) -> Option<&str> {
        let required = self.parameters.get("required")?.as_array()?;
        let [only] = required.as_slice() else {
            return None;
        };
        let name = only.as_str()?;
        let kind = self.parameters.get("properties")?.get(name)?.get("type")?;
        (kind == "array").then_some(name)
    }

    fn violation(&self, detail: impl Into<String>) -> StageError {
        StageError::violation(self.qualified_name(), detail)
    }
}

/// Accept `21` or `21.0` for an integer field; reject `14.5`.
pub fn whole_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let value = Value::deserialize(deserializer)?;
    let n = as_whole(&value).ok_or_else(|| {
        D::Error::custom(format!("expected a whole number, got {}", describe(&value)))
    })?;
    T::try_from(n).map_err(|_| D::Error::custom(format!("{n} is out of range")))
}

/// A display label that may arrive as a string or a number; numbers become their text.
pub fn label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        number @ Value::Number(_) => Ok(as_whole(&number)
            .map(|n| n.to_string())
            .unwrap_or_else(|| number.to_string())),
        other => Err(D::Error::custom(format!(
            "expected a string or number label, got {}",
            type_name(&other)
        ))),
    }
}

fn as_whole(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => type_name(other).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
