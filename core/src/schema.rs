//! Parameter descriptors and schema-driven argument binding.
//!
//! A capability's arguments are described once, from the [`JsonSchema`] of its
//! argument type, as a flat list of [`Param`]s over a closed set of
//! [`Shape`]s. The same descriptor drives two things:
//!
//! - the JSON schema advertised to callers ([`InputSchema::to_json`]);
//! - [`InputSchema::bind`], which coerces an untyped argument bag into values
//!   the argument type can deserialize, filling gaps permissively.
//!
//! Binding never rejects a missing argument. Absent parameters that carry a
//! default are reported as [`ArgumentSource::Default`]; absent parameters
//! with no default are zero-filled and reported as [`ArgumentSource::Zero`],
//! so a caller can tell "omitted" apart from "explicitly empty". Rejecting
//! missing required arguments is the dispatch layer's job, see
//! [`InputSchema::missing_required`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

const MAX_DEPTH: usize = 16;

/// Declared type shape of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// UTF-8 string.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// String restricted to a fixed set of values.
    Enum(Vec<String>),
    /// Homogeneous array of the element shape.
    Array(Box<Shape>),
    /// Structured record with its own parameters.
    Object(Vec<Param>),
    /// Anything; passed through untouched.
    Any,
}

impl Shape {
    /// JSON schema `type` name of this shape.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Any => "any",
        }
    }

    /// The zero value used when a required argument is absent.
    #[must_use]
    pub fn zero(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => json!(0),
            Self::Number => json!(0.0),
            Self::Boolean => Value::Bool(false),
            Self::Enum(variants) => variants
                .first()
                .map_or(Value::Null, |first| Value::String(first.clone())),
            Self::Array(_) => Value::Array(Vec::new()),
            Self::Object(params) => Value::Object(
                params
                    .iter()
                    .filter(|param| !param.has_default)
                    .map(|param| (param.name.clone(), param.zero()))
                    .collect(),
            ),
            Self::Any => Value::Null,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Enum(variants) => json!({ "type": "string", "enum": variants }),
            Self::Array(items) => json!({ "type": "array", "items": items.to_json() }),
            Self::Object(params) => object_schema(params),
            Self::Any => json!({}),
            primitive => json!({ "type": primitive.type_name() }),
        }
    }
}

/// Describes one parameter of a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name as it appears in the argument bag.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Declared type shape.
    pub shape: Shape,
    /// Whether callers must supply this parameter.
    pub required: bool,
    /// Default value advertised in the schema, if any.
    pub default: Option<Value>,
    /// Whether `null` is an accepted value.
    pub nullable: bool,
    /// Whether the argument type copes with this parameter being absent.
    pub has_default: bool,
}

impl Param {
    /// Creates a required parameter with no description.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            description: None,
            shape,
            required: true,
            default: None,
            nullable: false,
            has_default: false,
        }
    }

    fn zero(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.shape.zero()
        }
    }

    fn to_json(&self) -> Value {
        let mut schema = self.shape.to_json();
        if let Value::Object(map) = &mut schema {
            if self.nullable {
                if let Some(Value::String(ty)) = map.get("type").cloned() {
                    map.insert("type".into(), json!([ty, "null"]));
                }
            }
            if let Some(description) = &self.description {
                map.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(default) = &self.default {
                map.insert("default".into(), default.clone());
            }
        }
        schema
    }
}

/// A per-parameter adjustment applied on top of the derived schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamOverride {
    /// Parameter the override applies to.
    pub name: &'static str,
    /// Forces required-ness when set.
    pub required: Option<bool>,
    /// Replaces the description when set.
    pub description: Option<&'static str>,
}

impl ParamOverride {
    /// Creates an override that changes nothing yet.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            required: None,
            description: None,
        }
    }

    /// Forces the parameter's required flag.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Replaces the parameter's description.
    #[must_use]
    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }
}

/// Where a bound argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentSource {
    /// The caller supplied it.
    Supplied,
    /// Absent; the parameter's default applies.
    Default,
    /// Absent with no default; the shape's zero value was substituted.
    Zero,
}

/// Errors raised while coercing a supplied argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The value cannot be converted into the declared shape.
    #[error("argument `{param}` expected {expected}, got {found}")]
    TypeMismatch {
        /// Dotted path of the offending parameter.
        param: String,
        /// Expected shape.
        expected: &'static str,
        /// JSON kind actually supplied.
        found: &'static str,
    },
    /// The value is not one of the allowed variants.
    #[error("argument `{param}` must be one of [{allowed}], got `{value}`")]
    NotAllowed {
        /// Dotted path of the offending parameter.
        param: String,
        /// The supplied value.
        value: String,
        /// Comma-separated allowed values.
        allowed: String,
    },
}

/// Arguments after binding, plus where each declared parameter came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    arguments: Map<String, Value>,
    sources: BTreeMap<String, ArgumentSource>,
}

impl Binding {
    /// The bound argument object.
    #[must_use]
    pub const fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Consumes the binding, returning the argument object.
    #[must_use]
    pub fn into_arguments(self) -> Map<String, Value> {
        self.arguments
    }

    /// Where the named parameter's value came from.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<ArgumentSource> {
        self.sources.get(name).copied()
    }

    /// Names of parameters that were not supplied by the caller.
    pub fn omitted(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .filter(|(_, source)| **source != ArgumentSource::Supplied)
            .map(|(name, _)| name.as_str())
    }
}

/// Parameter list of a capability, derived from its argument type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    params: Vec<Param>,
}

impl InputSchema {
    /// Creates a schema from explicit parameters.
    #[must_use]
    pub const fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Derives the parameter list of `T`.
    ///
    /// Types that are not objects (such as `()`) have no parameters.
    #[must_use]
    pub fn of<T: JsonSchema>() -> Self {
        let schema = schema_for!(T);
        Self::from_schema(schema.as_value())
    }

    /// Reads a parameter list from a JSON schema document.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Self {
        let resolver = Resolver {
            defs: schema
                .get("$defs")
                .or_else(|| schema.get("definitions"))
                .and_then(Value::as_object),
        };
        match resolver.shape(schema, 0).0 {
            Shape::Object(params) => Self { params },
            _ => Self::default(),
        }
    }

    /// Applies per-parameter overrides. Unknown names are ignored.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &[ParamOverride]) -> Self {
        for item in overrides {
            if let Some(param) = self.params.iter_mut().find(|p| p.name == item.name) {
                if let Some(required) = item.required {
                    param.required = required;
                }
                if let Some(description) = item.description {
                    param.description = Some(description.to_string());
                }
            }
        }
        self
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name == name)
    }

    /// Names of required parameters.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
    }

    /// Required parameters absent (or `null`) in `arguments`.
    #[must_use]
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.required()
            .filter(|name| arguments.get(*name).is_none_or(Value::is_null))
            .map(ToString::to_string)
            .collect()
    }

    /// JSON schema advertised to callers.
    #[must_use]
    pub fn to_json(&self) -> Value {
        object_schema(&self.params)
    }

    /// Coerces `arguments` into the declared shapes.
    ///
    /// Keys that match no parameter are kept as-is.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when a supplied value cannot be coerced.
    pub fn bind(&self, mut arguments: Map<String, Value>) -> Result<Binding, BindError> {
        let mut sources = BTreeMap::new();
        for param in &self.params {
            let supplied = arguments
                .remove(&param.name)
                .filter(|value| !value.is_null() || param.nullable);
            let (value, source) = match supplied {
                Some(value) => (
                    Some(coerce(&param.name, param, value)?),
                    ArgumentSource::Supplied,
                ),
                None => fill(param),
            };
            if source != ArgumentSource::Supplied {
                debug!("Argument `{}` omitted, using {source:?}", param.name);
            }
            if let Some(value) = value {
                arguments.insert(param.name.clone(), value);
            }
            sources.insert(param.name.clone(), source);
        }
        Ok(Binding { arguments, sources })
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InputSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_schema(&value))
    }
}

impl fmt::Display for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn object_schema(params: &[Param]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|param| (param.name.clone(), param.to_json()))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name.as_str())
        .collect();
    json!({ "type": "object", "properties": properties, "required": required })
}

/// Value for an absent parameter. `None` leaves it to the argument type.
fn fill(param: &Param) -> (Option<Value>, ArgumentSource) {
    if let Some(default) = &param.default {
        (Some(default.clone()), ArgumentSource::Default)
    } else if param.has_default {
        (None, ArgumentSource::Default)
    } else {
        (Some(param.zero()), ArgumentSource::Zero)
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(path: &str, param: &Param, value: Value) -> Result<Value, BindError> {
    if value.is_null() && param.nullable {
        return Ok(value);
    }
    coerce_shape(path, &param.shape, value)
}

fn coerce_shape(path: &str, shape: &Shape, value: Value) -> Result<Value, BindError> {
    let mismatch = |value: &Value| BindError::TypeMismatch {
        param: path.to_string(),
        expected: shape.type_name(),
        found: kind(value),
    };

    match (shape, value) {
        (Shape::Any, value) => Ok(value),
        (Shape::String, Value::String(text)) => Ok(Value::String(text)),
        (Shape::String, value @ (Value::Number(_) | Value::Bool(_))) => {
            Ok(Value::String(value.to_string()))
        }
        (Shape::Integer, Value::Number(number)) => {
            if number.is_i64() || number.is_u64() {
                Ok(Value::Number(number))
            } else {
                match number.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(float) if float.fract() == 0.0 => Ok(json!(float as i64)),
                    _ => Err(mismatch(&Value::Number(number))),
                }
            }
        }
        (Shape::Integer, Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map(|int| json!(int))
            .map_err(|_| mismatch(&Value::String(text))),
        (Shape::Number, Value::Number(number)) => Ok(Value::Number(number)),
        (Shape::Number, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch(&Value::String(text))),
        (Shape::Boolean, Value::Bool(flag)) => Ok(Value::Bool(flag)),
        (Shape::Boolean, Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&Value::String(text))),
        },
        (Shape::Enum(variants), Value::String(text)) => {
            if variants.iter().any(|variant| *variant == text) {
                Ok(Value::String(text))
            } else {
                Err(BindError::NotAllowed {
                    param: path.to_string(),
                    value: text,
                    allowed: variants.join(", "),
                })
            }
        }
        (Shape::Array(items), Value::Array(values)) => values
            .into_iter()
            .enumerate()
            .map(|(index, value)| coerce_shape(&format!("{path}[{index}]"), items, value))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Shape::Object(params), Value::Object(map)) => {
            let mut map = map;
            for param in params {
                let nested = format!("{path}.{}", param.name);
                let supplied = map
                    .remove(&param.name)
                    .filter(|value| !value.is_null() || param.nullable);
                let value = match supplied {
                    Some(value) => Some(coerce(&nested, param, value)?),
                    None => fill(param).0,
                };
                if let Some(value) = value {
                    map.insert(param.name.clone(), value);
                }
            }
            Ok(Value::Object(map))
        }
        // Structured values sometimes arrive JSON-encoded inside a string.
        (Shape::Array(_) | Shape::Object(_), Value::String(text)) => {
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ (Value::Array(_) | Value::Object(_))) => {
                    coerce_shape(path, shape, parsed)
                }
                _ => Err(mismatch(&Value::String(text))),
            }
        }
        (_, value) => Err(mismatch(&value)),
    }
}

struct Resolver<'a> {
    defs: Option<&'a Map<String, Value>>,
}

impl Resolver<'_> {
    /// Returns the shape of `schema` and whether it admits `null`.
    fn shape(&self, schema: &Value, depth: usize) -> (Shape, bool) {
        if depth > MAX_DEPTH {
            return (Shape::Any, false);
        }
        let Some(object) = schema.as_object() else {
            return (Shape::Any, false);
        };

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            return self
                .lookup(reference)
                .map_or((Shape::Any, false), |target| self.shape(target, depth + 1));
        }

        if let Some([single]) = object.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return self.shape(single, depth + 1);
        }

        if let Some(variants) = object
            .get("anyOf")
            .or_else(|| object.get("oneOf"))
            .and_then(Value::as_array)
        {
            return self.union(variants, depth);
        }

        if let Some(values) = object.get("enum").and_then(Value::as_array) {
            let nullable = values.iter().any(Value::is_null);
            let variants: Option<Vec<String>> = values
                .iter()
                .filter(|value| !value.is_null())
                .map(|value| value.as_str().map(ToString::to_string))
                .collect();
            return variants.map_or((Shape::Any, nullable), |v| (Shape::Enum(v), nullable));
        }

        if let Some(constant) = object.get("const").and_then(Value::as_str) {
            return (Shape::Enum(vec![constant.to_string()]), false);
        }

        let (ty, nullable) = match object.get("type") {
            Some(Value::String(ty)) => (Some(ty.as_str()), ty == "null"),
            Some(Value::Array(types)) => (
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|ty| *ty != "null"),
                types.iter().any(|ty| ty == "null"),
            ),
            _ => (None, false),
        };

        let shape = match ty {
            Some("string") => Shape::String,
            Some("integer") => Shape::Integer,
            Some("number") => Shape::Number,
            Some("boolean") => Shape::Boolean,
            Some("array") => {
                let items = object
                    .get("items")
                    .map_or(Shape::Any, |items| self.shape(items, depth + 1).0);
                Shape::Array(Box::new(items))
            }
            Some("object") => Shape::Object(self.params(object, depth)),
            None if object.contains_key("properties") => {
                Shape::Object(self.params(object, depth))
            }
            _ => Shape::Any,
        };
        (shape, nullable)
    }

    fn union(&self, variants: &[Value], depth: usize) -> (Shape, bool) {
        let is_null = |v: &Value| v.get("type").and_then(Value::as_str) == Some("null");
        let nullable = variants.iter().any(is_null);
        let rest: Vec<&Value> = variants.iter().filter(|v| !is_null(v)).collect();

        if let [single] = rest.as_slice() {
            let (shape, inner_nullable) = self.shape(single, depth + 1);
            return (shape, nullable || inner_nullable);
        }

        // Unit-variant enums documented per variant come out as `oneOf` of consts.
        let mut names = Vec::with_capacity(rest.len());
        for variant in &rest {
            match self.shape(variant, depth + 1).0 {
                Shape::Enum(values) => names.extend(values),
                _ => return (Shape::Any, nullable),
            }
        }
        (Shape::Enum(names), nullable)
    }

    fn params(&self, object: &Map<String, Value>, depth: usize) -> Vec<Param> {
        let required: BTreeSet<&str> = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = object.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };

        properties
            .iter()
            .map(|(name, schema)| {
                let (shape, nullable) = self.shape(schema, depth + 1);
                let has_default = !required.contains(name.as_str());
                Param {
                    name: name.clone(),
                    description: schema
                        .get("description")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    shape,
                    required: !has_default,
                    default: schema.get("default").cloned(),
                    nullable,
                    has_default,
                }
            })
            .collect()
    }

    fn lookup(&self, reference: &str) -> Option<&Value> {
        let name = reference
            .strip_prefix("#/$defs/")
            .or_else(|| reference.strip_prefix("#/definitions/"))?;
        self.defs?.get(name)
    }
}
