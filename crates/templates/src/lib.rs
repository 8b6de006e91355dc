//! Parameterized workflow templates.
//!
//! This crate provides the template side of the run engine:
//! - Parameter declarations, nested parameters and the parameter index
//! - Arguments bound to parameters, validated against the declared types
//! - Resolution of `$[[name]]` references inside workflow specifications
//! - Template documents loaded from JSON or YAML files

pub mod error;
pub mod parameter;
pub mod reference;
pub mod template;

pub use error::{TemplateError, TemplateResult};
pub use parameter::{
    create_parameter_index, is_relative_path, mandatory_arguments, parse_arguments, sort_parameters, ArgumentValue,
    Arguments, DataType, InputFile, ParameterDeclaration, ParameterIndex, TemplateArgument, TemplateParameter,
};
pub use reference::{get_parameter_references, replace_args};
pub use template::WorkflowTemplate;
