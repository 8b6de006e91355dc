//! Parameter declarations.
//!
//! A declaration is read from a JSON/YAML object with the elements `id`
//! (required), `name`, `description`, `datatype`, `index`, `required`,
//! `defaultValue`, `as`, `parent` and `values`. Missing elements receive
//! defaults: the name falls back to the identifier, the description to the
//! name, the data type to `string`, the index to 0 and the required flag to
//! `true`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};

/// Marker constant for file parameters whose target path is supplied together
/// with the argument.
pub const AS_INPUT: &str = "$input";

/// Supported parameter data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Decimal,
    String,
    File,
    List,
    Record,
}

impl DataType {
    /// Parse a data type identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "decimal" => Some(Self::Decimal),
            "string" => Some(Self::String),
            "file" => Some(Self::File),
            "list" => Some(Self::List),
            "record" => Some(Self::Record),
            _ => None,
        }
    }

    /// True for `list` and `record`.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List | Self::Record)
    }

    /// Check whether a scalar JSON value matches this type. File values are
    /// paths and therefore strings. Containers never match a scalar.
    pub fn accepts_scalar(&self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Decimal => value.is_number(),
            Self::String | Self::File => value.is_string(),
            Self::List | Self::Record => false,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::File => "file",
            Self::List => "list",
            Self::Record => "record",
        };
        write!(f, "{}", s)
    }
}

/// One entry in the enumeration of allowed parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValue {
    pub value: Value,

    /// Display text, defaults to the string form of the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub is_default: bool,
}

impl EnumValue {
    /// Display text for the value.
    pub fn display_name(&self) -> String {
        match (&self.name, &self.value) {
            (Some(name), _) => name.clone(),
            (None, Value::String(s)) => s.clone(),
            (None, v) => v.to_string(),
        }
    }
}

/// Declaration as it appears in a template document, before defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeclaration {
    id: String,
    name: Option<String>,
    description: Option<String>,
    datatype: Option<DataType>,
    index: Option<i64>,
    required: Option<bool>,
    default_value: Option<Value>,
    #[serde(rename = "as")]
    as_constant: Option<String>,
    parent: Option<String>,
    values: Option<Vec<EnumValue>>,
}

/// Declaration of a single template parameter with all defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDeclaration {
    pub id: String,
    pub name: String,
    pub description: String,
    pub datatype: DataType,
    pub index: i64,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_constant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<EnumValue>>,
}

impl ParameterDeclaration {
    /// Create a required string parameter with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            description: id.clone(),
            id,
            datatype: DataType::String,
            index: 0,
            required: true,
            default_value: None,
            as_constant: None,
            parent: None,
            values: None,
        }
    }

    /// Set the data type.
    pub fn with_datatype(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }

    /// Set the sort index.
    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }

    /// Set the required flag.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the constant override.
    pub fn with_constant(mut self, value: impl Into<String>) -> Self {
        self.as_constant = Some(value.into());
        self
    }

    /// Set the parent identifier.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Parse a raw declaration. If `validate` is set the raw object is first
    /// checked against the declaration schema and the parsed values are
    /// checked against the declared data type.
    pub fn from_value(value: &Value, validate: bool) -> TemplateResult<Self> {
        if validate {
            validate_parameter(value)?;
        }
        let raw: RawDeclaration = serde_json::from_value(value.clone()).map_err(|e| {
            TemplateError::InvalidParameter(format!(
                "failed to read parameter declaration: {}",
                e
            ))
        })?;

        let name = raw.name.unwrap_or_else(|| raw.id.clone());
        let decl = Self {
            description: raw.description.unwrap_or_else(|| name.clone()),
            name,
            id: raw.id,
            datatype: raw.datatype.unwrap_or(DataType::String),
            index: raw.index.unwrap_or(0),
            required: raw.required.unwrap_or(true),
            default_value: raw.default_value,
            as_constant: raw.as_constant,
            parent: raw.parent,
            values: raw.values,
        };

        if validate {
            decl.check_values()?;
        }
        Ok(decl)
    }

    /// Default value for the parameter. An explicit default wins over the
    /// designated default of the value enumeration.
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref().or_else(|| {
            self.values
                .as_ref()
                .and_then(|values| values.iter().find(|v| v.is_default))
                .map(|v| &v.value)
        })
    }

    /// Constant override unless it is the `$input` marker.
    pub fn constant(&self) -> Option<&str> {
        self.as_constant.as_deref().filter(|c| *c != AS_INPUT)
    }

    /// True if the target path of a file argument comes from the caller.
    pub fn as_input(&self) -> bool {
        self.as_constant.as_deref() == Some(AS_INPUT)
    }

    /// Check default and enumeration values against the data type.
    fn check_values(&self) -> TemplateResult<()> {
        if let Some(default) = &self.default_value {
            if !self.datatype.accepts_scalar(default) {
                return Err(TemplateError::InvalidParameter(format!(
                    "default value for '{}' is not of type {}",
                    self.id, self.datatype
                )));
            }
        }
        if let Some(values) = &self.values {
            if let Some(v) = values.iter().find(|v| !self.datatype.accepts_scalar(&v.value)) {
                return Err(TemplateError::InvalidParameter(format!(
                    "value {} for '{}' is not of type {}",
                    v.value, self.id, self.datatype
                )));
            }
            if values.iter().filter(|v| v.is_default).count() > 1 {
                return Err(TemplateError::InvalidParameter(format!(
                    "multiple default values for '{}'",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Validate a raw declaration against the parameter schema.
pub fn validate_parameter(value: &Value) -> TemplateResult<()> {
    let obj = value.as_object().ok_or_else(|| {
        TemplateError::InvalidParameter("parameter declaration is not an object".to_string())
    })?;

    let id = match obj.get("id") {
        Some(Value::String(id)) => id.as_str(),
        Some(_) => return Err(invalid("<unknown>", "id", "string")),
        None => {
            return Err(TemplateError::InvalidParameter(
                "missing parameter identifier".to_string(),
            ))
        }
    };

    for key in ["name", "description", "datatype", "parent", "as"] {
        if let Some(v) = obj.get(key) {
            if !v.is_string() {
                return Err(invalid(id, key, "string"));
            }
        }
    }
    if let Some(v) = obj.get("index") {
        if !(v.is_i64() || v.is_u64()) {
            return Err(invalid(id, "index", "integer"));
        }
    }
    if let Some(v) = obj.get("required") {
        if !v.is_boolean() {
            return Err(invalid(id, "required", "boolean"));
        }
    }
    if let Some(v) = obj.get("defaultValue") {
        if !is_scalar(v) {
            return Err(invalid(id, "defaultValue", "scalar"));
        }
    }
    if let Some(v) = obj.get("values") {
        let items = v.as_array().ok_or_else(|| invalid(id, "values", "array"))?;
        for item in items {
            let entry = item.as_object().ok_or_else(|| invalid(id, "values", "array of objects"))?;
            match entry.get("value") {
                Some(v) if is_scalar(v) => {}
                _ => return Err(invalid(id, "values.value", "scalar")),
            }
            if entry.get("name").is_some_and(|n| !n.is_string()) {
                return Err(invalid(id, "values.name", "string"));
            }
            if entry.get("isDefault").is_some_and(|d| !d.is_boolean()) {
                return Err(invalid(id, "values.isDefault", "boolean"));
            }
        }
    }

    if let Some(dt) = obj.get("datatype").and_then(|v| v.as_str()) {
        if DataType::parse(dt).is_none() {
            return Err(TemplateError::InvalidParameter(format!(
                "invalid data type '{}'",
                dt
            )));
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn invalid(id: &str, key: &str, expected: &str) -> TemplateError {
    TemplateError::InvalidParameter(format!(
        "element '{}' of parameter '{}' must be of type {}",
        key, id, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let decl = ParameterDeclaration::from_value(&json!({"id": "A"}), true).unwrap();
        assert_eq!(decl.name, "A");
        assert_eq!(decl.description, "A");
        assert_eq!(decl.datatype, DataType::String);
        assert_eq!(decl.index, 0);
        assert!(decl.required);
        assert!(decl.default_value().is_none());
    }

    #[test]
    fn test_full_declaration() {
        let decl = ParameterDeclaration::from_value(
            &json!({
                "id": "sleeptime",
                "name": "Sleep",
                "datatype": "int",
                "index": 2,
                "required": false,
                "defaultValue": 10
            }),
            true,
        )
        .unwrap();
        assert_eq!(decl.name, "Sleep");
        assert_eq!(decl.description, "Sleep");
        assert_eq!(decl.datatype, DataType::Int);
        assert_eq!(decl.index, 2);
        assert!(!decl.required);
        assert_eq!(decl.default_value(), Some(&json!(10)));
    }

    #[test]
    fn test_invalid_datatype() {
        let result = ParameterDeclaration::from_value(&json!({"id": "A", "datatype": "float"}), true);
        assert!(matches!(result, Err(TemplateError::InvalidParameter(_))));
    }

    #[test]
    fn test_missing_identifier() {
        let result = ParameterDeclaration::from_value(&json!({"name": "A"}), true);
        assert!(matches!(result, Err(TemplateError::InvalidParameter(_))));

        let result = ParameterDeclaration::from_value(&json!({"name": "A"}), false);
        assert!(matches!(result, Err(TemplateError::InvalidParameter(_))));
    }

    #[test]
    fn test_schema_types() {
        for doc in [
            json!({"id": 1}),
            json!({"id": "A", "name": 1}),
            json!({"id": "A", "index": "1"}),
            json!({"id": "A", "required": "yes"}),
            json!({"id": "A", "defaultValue": [1]}),
            json!({"id": "A", "values": [{"name": "x"}]}),
        ] {
            assert!(
                matches!(validate_parameter(&doc), Err(TemplateError::InvalidParameter(_))),
                "expected failure for {}",
                doc
            );
        }
    }

    #[test]
    fn test_default_type_mismatch() {
        let doc = json!({"id": "A", "datatype": "int", "defaultValue": "ten"});
        assert!(ParameterDeclaration::from_value(&doc, true).is_err());
        // Type checks are skipped without validation
        assert!(ParameterDeclaration::from_value(&doc, false).is_ok());
    }

    #[test]
    fn test_enum_default() {
        let decl = ParameterDeclaration::from_value(
            &json!({
                "id": "mode",
                "values": [
                    {"value": "fast"},
                    {"value": "slow", "name": "Slow mode", "isDefault": true}
                ]
            }),
            true,
        )
        .unwrap();
        assert_eq!(decl.default_value(), Some(&json!("slow")));
        let values = decl.values.as_ref().unwrap();
        assert_eq!(values[0].display_name(), "fast");
        assert_eq!(values[1].display_name(), "Slow mode");
    }

    #[test]
    fn test_multiple_enum_defaults() {
        let doc = json!({
            "id": "mode",
            "values": [
                {"value": "a", "isDefault": true},
                {"value": "b", "isDefault": true}
            ]
        });
        assert!(ParameterDeclaration::from_value(&doc, true).is_err());
    }

    #[test]
    fn test_constant_and_input_marker() {
        let decl = ParameterDeclaration::new("f")
            .with_datatype(DataType::File)
            .with_constant("data/names.txt");
        assert_eq!(decl.constant(), Some("data/names.txt"));
        assert!(!decl.as_input());

        let decl = ParameterDeclaration::new("f")
            .with_datatype(DataType::File)
            .with_constant(AS_INPUT);
        assert_eq!(decl.constant(), None);
        assert!(decl.as_input());
    }

    #[test]
    fn test_serialization() {
        let decl = ParameterDeclaration::new("names")
            .with_datatype(DataType::File)
            .with_constant("data/names.txt");
        let json = serde_json::to_value(&decl).unwrap();
        assert_eq!(json["datatype"], "file");
        assert_eq!(json["as"], "data/names.txt");
        assert!(json.get("defaultValue").is_none());

        let parsed = ParameterDeclaration::from_value(&json, true).unwrap();
        assert_eq!(parsed, decl);
    }
}
