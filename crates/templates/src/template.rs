//! Workflow templates.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{TemplateError, TemplateResult};
use crate::parameter::{
    create_parameter_index, parse_arguments, sort_parameters, Arguments, ParameterIndex, TemplateParameter,
};
use crate::reference::get_parameter_references;

const DOC_ID: &str = "id";
const DOC_PARAMETERS: &str = "parameters";
const DOC_WORKFLOW: &str = "workflow";

/// A workflow specification together with the declarations of the
/// parameters it references. Templates are immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    identifier: String,
    workflow_spec: Value,
    parameters: ParameterIndex,
    base_dir: Option<PathBuf>,
}

impl WorkflowTemplate {
    /// Create a template. Every parameter referenced in the specification
    /// has to be declared.
    pub fn new(
        identifier: impl Into<String>,
        workflow_spec: Value,
        parameters: ParameterIndex,
        base_dir: Option<PathBuf>,
    ) -> TemplateResult<Self> {
        for name in get_parameter_references(&workflow_spec)? {
            if !parameters.contains_key(&name) {
                return Err(TemplateError::UnknownParameter(name));
            }
        }
        Ok(Self {
            identifier: identifier.into(),
            workflow_spec,
            parameters,
            base_dir,
        })
    }

    /// Create a template from a document with the elements `workflow`,
    /// `id` and `parameters`. A missing identifier is replaced by a fresh
    /// unique one.
    pub fn from_document(doc: &Value, base_dir: Option<PathBuf>, validate: bool) -> TemplateResult<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| TemplateError::InvalidTemplate("template document is not an object".to_string()))?;
        if let Some(key) = obj
            .keys()
            .find(|k| ![DOC_ID, DOC_PARAMETERS, DOC_WORKFLOW].contains(&k.as_str()))
        {
            return Err(TemplateError::InvalidTemplate(format!("invalid element '{}'", key)));
        }

        let workflow_spec = obj
            .get(DOC_WORKFLOW)
            .cloned()
            .ok_or_else(|| TemplateError::InvalidTemplate("missing element 'workflow'".to_string()))?;
        let identifier = match obj.get(DOC_ID) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(TemplateError::InvalidTemplate(
                    "element 'id' must be a string".to_string(),
                ))
            }
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let parameters = match obj.get(DOC_PARAMETERS) {
            Some(Value::Array(decls)) => create_parameter_index(decls, validate)?,
            Some(_) => {
                return Err(TemplateError::InvalidTemplate(
                    "element 'parameters' must be a list".to_string(),
                ))
            }
            None => ParameterIndex::new(),
        };

        Self::new(identifier, workflow_spec, parameters, base_dir)
    }

    /// Load a template document from a JSON or YAML file. The directory
    /// containing the file becomes the base directory of the template.
    pub fn load(path: impl AsRef<Path>, validate: bool) -> TemplateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TemplateError::InvalidTemplate(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let doc: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        tracing::debug!(path = %path.display(), "Loaded template document");
        let base_dir = path.parent().map(Path::to_path_buf);
        Self::from_document(&doc, base_dir, validate)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn workflow_spec(&self) -> &Value {
        &self.workflow_spec
    }

    pub fn parameters(&self) -> &ParameterIndex {
        &self.parameters
    }

    /// Directory containing static files referenced by the specification.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn get_parameter(&self, id: &str) -> Option<&TemplateParameter> {
        self.parameters.get(id)
    }

    /// Top-level parameters ordered by (index, id).
    pub fn list_parameters(&self) -> Vec<&TemplateParameter> {
        sort_parameters(self.parameters.values().filter(|p| p.parent().is_none()))
    }

    /// Convert raw argument values into arguments for this template.
    pub fn parse_arguments(&self, raw: &Map<String, Value>, validate: bool) -> TemplateResult<Arguments> {
        parse_arguments(raw, &self.parameters, validate, None)
    }

    /// Ensure that every required top-level parameter has an argument, a
    /// constant or a default value.
    pub fn validate_arguments(&self, arguments: &Arguments) -> TemplateResult<()> {
        let mut required: Vec<&TemplateParameter> = self
            .parameters
            .values()
            .filter(|p| p.parent().is_none() && p.is_required())
            .collect();
        required.sort_by(|a, b| a.id().cmp(b.id()));
        for para in required {
            if !arguments.contains_key(para.id()) && !para.has_fallback() {
                return Err(TemplateError::MissingArgument(para.id().to_string()));
            }
        }
        Ok(())
    }
}
