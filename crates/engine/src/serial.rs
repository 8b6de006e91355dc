//! Serial workflow specifications.
//!
//! Templates executed by the engine follow the serial workflow layout:
//!
//! ```yaml
//! inputs:
//!   files: [code/helloworld.py, $[[names]]]
//!   parameters:
//!     inputfile: $[[names]]
//!     sleeptime: $[[sleeptime]]
//! workflow:
//!   type: serial
//!   specification:
//!     steps:
//!       - commands:
//!           - python code/helloworld.py --inputfile ${inputfile} --sleeptime ${sleeptime}
//! outputs:
//!   files: [results/greetings.txt]
//! ```
//!
//! Command strings use `$name` or `${name}` placeholders for the entries of
//! `inputs.parameters`. `$$` is a literal dollar sign.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rob_templates::reference::{is_parameter, parameter_name};
use rob_templates::{
    is_relative_path, replace_args, ArgumentValue, Arguments, DataType, TemplateError, TemplateResult,
    WorkflowTemplate,
};
use serde_json::Value;

use crate::error::EngineResult;
use crate::resource::{Resource, ResourceSet};
use crate::uploader::FileUploader;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$(?:(?P<escaped>\$)|(?P<named>[_a-z][_a-z0-9]*)|\{(?P<braced>[_a-z][_a-z0-9]*)\}|(?P<invalid>))")
        .expect("valid placeholder pattern")
});

/// A workflow template bound to the arguments of one run.
pub struct SerialWorkflow<'a> {
    template: &'a WorkflowTemplate,
    arguments: &'a Arguments,
}

impl<'a> SerialWorkflow<'a> {
    pub fn new(template: &'a WorkflowTemplate, arguments: &'a Arguments) -> Self {
        Self { template, arguments }
    }

    fn section(&self, path: &[&str]) -> Option<&'a Value> {
        path.iter()
            .try_fold(self.template.workflow_spec(), |value, key| value.get(*key))
    }

    /// Expanded commands of all workflow steps in order.
    pub fn get_commands(&self) -> TemplateResult<Vec<String>> {
        let empty = Value::Object(Default::default());
        let parameters = replace_args(
            self.section(&["inputs", "parameters"]).unwrap_or(&empty),
            self.arguments,
            self.template.parameters(),
        )?;
        let variables: HashMap<String, String> = match parameters {
            Value::Object(obj) => obj.into_iter().map(|(k, v)| (k, to_text(&v))).collect(),
            _ => {
                return Err(TemplateError::InvalidTemplate(
                    "element 'inputs.parameters' must be a map".to_string(),
                ))
            }
        };

        let mut commands = Vec::new();
        let steps = self.section(&["workflow", "specification", "steps"]);
        for step in steps.and_then(Value::as_array).into_iter().flatten() {
            for cmd in step.get("commands").and_then(Value::as_array).into_iter().flatten() {
                let cmd = cmd.as_str().ok_or_else(|| {
                    TemplateError::InvalidTemplate(format!("invalid command {}", cmd))
                })?;
                commands.push(substitute(cmd, &variables)?);
            }
        }
        Ok(commands)
    }

    /// Relative paths of the files a successful run produces.
    pub fn output_files(&self) -> TemplateResult<Vec<String>> {
        let Some(files) = self.section(&["outputs", "files"]) else {
            return Ok(Vec::new());
        };
        let files = replace_args(files, self.arguments, self.template.parameters())?;
        string_list(&files, "outputs.files")
    }

    /// Stage the entries of `inputs.files` through the uploader. Static
    /// entries are paths relative to `source_dir`. Parameter references
    /// resolve to the file argument or to the default file in `source_dir`.
    pub async fn upload_files(&self, source_dir: &Path, uploader: &dyn FileUploader) -> EngineResult<()> {
        let Some(files) = self.section(&["inputs", "files"]) else {
            return Ok(());
        };
        for entry in string_list(files, "inputs.files")? {
            let (source, target) = self.input_file(&entry, source_dir)?;
            uploader.upload(&source, &target).await?;
        }
        Ok(())
    }

    fn input_file(&self, entry: &str, source_dir: &Path) -> TemplateResult<(PathBuf, String)> {
        if !is_parameter(entry) {
            return Ok((source_dir.join(entry), local_target(entry, "inputs.files")?));
        }
        let name = parameter_name(entry);
        let para = self
            .template
            .get_parameter(name)
            .ok_or_else(|| TemplateError::UnknownParameter(name.to_string()))?;
        if para.datatype() != DataType::File {
            return Err(TemplateError::InvalidTemplate(format!(
                "expected file parameter for '{}'",
                name
            )));
        }
        if let Some(arg) = self.arguments.get(name) {
            return match &arg.value {
                ArgumentValue::File(file) => Ok((file.source.clone(), file.target.clone())),
                _ => Err(TemplateError::InvalidArgument(format!("expected file for '{}'", name))),
            };
        }
        let default = para
            .default_value()
            .and_then(Value::as_str)
            .ok_or_else(|| TemplateError::MissingArgument(name.to_string()))?;
        let target = para.constant().unwrap_or(default);
        Ok((source_dir.join(default), local_target(target, name)?))
    }
}

fn local_target(path: &str, element: &str) -> TemplateResult<String> {
    if !is_relative_path(path) {
        return Err(TemplateError::InvalidTemplate(format!(
            "path '{}' in '{}' is outside the run directory",
            path, element
        )));
    }
    Ok(path.to_string())
}

/// Resources for the declared output files that exist as regular files in
/// the run directory.
pub async fn collect_resources(run_dir: &Path, output_files: &[String]) -> ResourceSet {
    let mut resources = ResourceSet::new();
    for file in output_files {
        let path = run_dir.join(file);
        if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            resources.insert(Resource::file(file.clone(), path));
        } else {
            tracing::debug!(file = %file, "Declared output file not found");
        }
    }
    resources
}

/// Expand `$name` and `${name}` placeholders.
fn substitute(template: &str, variables: &HashMap<String, String>) -> TemplateResult<String> {
    let mut error = None;
    let result = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        if caps.name("escaped").is_some() {
            return "$".to_string();
        }
        let name = caps.name("named").or_else(|| caps.name("braced"));
        match name.map(|n| n.as_str()) {
            Some(key) => match variables.get(key) {
                Some(value) => value.clone(),
                None => {
                    error.get_or_insert_with(|| {
                        TemplateError::InvalidTemplate(format!("undefined variable '{}' in '{}'", key, template))
                    });
                    String::new()
                }
            },
            None => {
                error.get_or_insert_with(|| {
                    TemplateError::InvalidTemplate(format!(
                        "invalid placeholder at position {} in '{}'",
                        caps.get(0).map(|m| m.start()).unwrap_or_default(),
                        template
                    ))
                });
                String::new()
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(result.into_owned()),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_list(value: &Value, element: &str) -> TemplateResult<Vec<String>> {
    let invalid = || TemplateError::InvalidTemplate(format!("element '{}' must be a list of strings", element));
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}
