//! Arguments bound to template parameters.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use super::declaration::{DataType, ParameterDeclaration};
use super::{mandatory_arguments, ParameterIndex, TemplateParameter};
use crate::error::{TemplateError, TemplateResult};

/// Arguments keyed by parameter identifier.
pub type Arguments = HashMap<String, TemplateArgument>;

/// A file supplied as argument for a `file` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Location of the file on the caller side.
    pub source: PathBuf,
    /// Relative path of the file inside the run directory.
    pub target: String,
}

impl InputFile {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Create a file argument for the given parameter. The target path is
    /// the constant of the parameter if one is declared, the caller supplied
    /// target for `$input` parameters and the source file name otherwise.
    /// Targets have to stay inside the run directory.
    pub fn for_parameter(
        para: &ParameterDeclaration,
        source: impl Into<PathBuf>,
        target: Option<String>,
    ) -> TemplateResult<Self> {
        let source = source.into();
        let target = if let Some(constant) = para.constant() {
            constant.to_string()
        } else if para.as_input() {
            target.ok_or_else(|| {
                TemplateError::InvalidArgument(format!("missing target path for '{}'", para.id))
            })?
        } else {
            match target {
                Some(target) => target,
                None => file_name(&source).ok_or_else(|| {
                    TemplateError::InvalidArgument(format!(
                        "invalid file path '{}' for '{}'",
                        source.display(),
                        para.id
                    ))
                })?,
            }
        };
        if !is_relative_path(&target) {
            return Err(TemplateError::InvalidArgument(format!(
                "target path '{}' for '{}' is outside the run directory",
                target, para.id
            )));
        }
        Ok(Self { source, target })
    }

    fn from_value(para: &ParameterDeclaration, value: &Value) -> TemplateResult<Self> {
        match value {
            Value::String(path) => Self::for_parameter(para, path, None),
            Value::Object(obj) => {
                let path = obj.get("path").and_then(Value::as_str).ok_or_else(|| {
                    TemplateError::InvalidArgument(format!("missing file path for '{}'", para.id))
                })?;
                let target = match obj.get("target") {
                    Some(Value::String(t)) => Some(t.clone()),
                    Some(_) => {
                        return Err(TemplateError::InvalidArgument(format!(
                            "invalid target path for '{}'",
                            para.id
                        )))
                    }
                    None => None,
                };
                Self::for_parameter(para, path, target)
            }
            _ => Err(TemplateError::InvalidArgument(format!(
                "expected file for '{}'",
                para.id
            ))),
        }
    }
}

/// True for a relative path that names an entry below the directory it is
/// joined to, i.e. one without root, prefix or `..` components.
pub fn is_relative_path(path: &str) -> bool {
    let components: Vec<Component> = Path::new(path).components().collect();
    components.iter().any(|c| matches!(c, Component::Normal(_)))
        && components
            .iter()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Value of a template argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Scalar(Value),
    File(InputFile),
    Record(Arguments),
    List(Vec<Arguments>),
}

/// A concrete value bound to a declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateArgument {
    pub parameter: ParameterDeclaration,
    pub value: ArgumentValue,
}

impl TemplateArgument {
    pub fn new(parameter: &ParameterDeclaration, value: ArgumentValue, validate: bool) -> TemplateResult<Self> {
        let arg = Self {
            parameter: parameter.clone(),
            value,
        };
        if validate {
            arg.validate()?;
        }
        Ok(arg)
    }

    pub fn id(&self) -> &str {
        &self.parameter.id
    }

    /// Check that the value matches the declared data type. Records and
    /// lists are validated recursively.
    pub fn validate(&self) -> TemplateResult<()> {
        let para = &self.parameter;
        match (para.datatype, &self.value) {
            (DataType::File, ArgumentValue::File(_)) => Ok(()),
            (DataType::Record, ArgumentValue::Record(members)) => {
                members.values().try_for_each(TemplateArgument::validate)
            }
            (DataType::List, ArgumentValue::List(items)) => items
                .iter()
                .flat_map(|item| item.values())
                .try_for_each(TemplateArgument::validate),
            (dt, ArgumentValue::Scalar(value)) if dt.accepts_scalar(value) => {
                if let Some(values) = &para.values {
                    if !values.iter().any(|v| &v.value == value) {
                        return Err(TemplateError::InvalidArgument(format!(
                            "value {} not allowed for '{}'",
                            value, para.id
                        )));
                    }
                }
                Ok(())
            }
            (dt, _) => Err(TemplateError::InvalidArgument(format!(
                "expected {} for '{}'",
                dt, para.id
            ))),
        }
    }

    /// Plain JSON form of the value. Files are represented by their target
    /// path.
    pub fn to_value(&self) -> Value {
        argument_value(&self.value)
    }
}

fn argument_value(value: &ArgumentValue) -> Value {
    match value {
        ArgumentValue::Scalar(v) => v.clone(),
        ArgumentValue::File(file) => Value::String(file.target.clone()),
        ArgumentValue::Record(members) => Value::Object(arguments_value(members)),
        ArgumentValue::List(items) => {
            Value::Array(items.iter().map(|m| Value::Object(arguments_value(m))).collect())
        }
    }
}

fn arguments_value(args: &Arguments) -> Map<String, Value> {
    args.iter().map(|(k, v)| (k.clone(), v.to_value())).collect()
}

/// Convert raw argument values into template arguments.
///
/// `parent` names the container whose members are parsed; `None` parses the
/// top-level parameters. After parsing, every required parameter of that
/// level must have a value, either from the raw arguments or from its
/// constant or default.
pub fn parse_arguments(
    raw: &Map<String, Value>,
    parameters: &ParameterIndex,
    validate: bool,
    parent: Option<&str>,
) -> TemplateResult<Arguments> {
    let mut args = Arguments::new();
    for (key, value) in raw {
        let para = parameters
            .get(key)
            .ok_or_else(|| TemplateError::InvalidArgument(format!("unknown parameter '{}'", key)))?;
        if para.parent() != parent {
            return Err(TemplateError::InvalidArgument(format!(
                "parameter '{}' is not a member of {}",
                key,
                parent.map(|p| format!("'{}'", p)).unwrap_or_else(|| "the template".to_string())
            )));
        }
        let arg_value = parse_value(para, value, parameters, validate)?;
        args.insert(key.clone(), TemplateArgument::new(&para.declaration, arg_value, validate)?);
    }

    for id in mandatory_arguments(parameters, parent) {
        let has_fallback = parameters.get(&id).is_some_and(TemplateParameter::has_fallback);
        if !args.contains_key(&id) && !has_fallback {
            return Err(TemplateError::MissingArgument(id));
        }
    }
    Ok(args)
}

fn parse_value(
    para: &TemplateParameter,
    value: &Value,
    parameters: &ParameterIndex,
    validate: bool,
) -> TemplateResult<ArgumentValue> {
    match para.datatype() {
        DataType::Record => {
            let obj = value.as_object().ok_or_else(|| {
                TemplateError::InvalidArgument(format!("expected record for '{}'", para.id()))
            })?;
            Ok(ArgumentValue::Record(parse_arguments(obj, parameters, validate, Some(para.id()))?))
        }
        DataType::List => {
            let items = value.as_array().ok_or_else(|| {
                TemplateError::InvalidArgument(format!("expected list for '{}'", para.id()))
            })?;
            let mut parsed = Vec::with_capacity(items.len());
            for item in items {
                let obj = item.as_object().ok_or_else(|| {
                    TemplateError::InvalidArgument(format!(
                        "expected list of records for '{}'",
                        para.id()
                    ))
                })?;
                parsed.push(parse_arguments(obj, parameters, validate, Some(para.id()))?);
            }
            Ok(ArgumentValue::List(parsed))
        }
        DataType::File => Ok(ArgumentValue::File(InputFile::from_value(&para.declaration, value)?)),
        _ => Ok(ArgumentValue::Scalar(value.clone())),
    }
}
