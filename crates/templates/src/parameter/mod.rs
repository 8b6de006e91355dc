//! Template parameters.
//!
//! Parameters are declared in a flat list. Members of `list` and `record`
//! parameters reference their container through the `parent` element. The
//! index built by [`create_parameter_index`] attaches every member to its
//! container after all declarations are known, so a member may be declared
//! before its parent. One level of nesting is supported.

pub mod argument;
pub mod declaration;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};

pub use argument::{
    is_relative_path, parse_arguments, ArgumentValue, Arguments, InputFile, TemplateArgument,
};
pub use declaration::{validate_parameter, DataType, EnumValue, ParameterDeclaration, AS_INPUT};

/// A declared parameter together with its nested members.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParameter {
    pub declaration: ParameterDeclaration,
    children: Vec<TemplateParameter>,
}

impl TemplateParameter {
    pub fn new(declaration: ParameterDeclaration) -> Self {
        Self {
            declaration,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.declaration.id
    }

    pub fn datatype(&self) -> DataType {
        self.declaration.datatype
    }

    pub fn is_required(&self) -> bool {
        self.declaration.required
    }

    pub fn parent(&self) -> Option<&str> {
        self.declaration.parent.as_deref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.declaration.default_value()
    }

    pub fn constant(&self) -> Option<&str> {
        self.declaration.constant()
    }

    pub fn as_input(&self) -> bool {
        self.declaration.as_input()
    }

    /// True if references to the parameter resolve without an argument.
    pub fn has_fallback(&self) -> bool {
        self.constant().is_some() || self.default_value().is_some()
    }

    /// Nested members ordered by (index, id).
    pub fn children(&self) -> &[TemplateParameter] {
        &self.children
    }

    fn add_child(&mut self, child: TemplateParameter) {
        self.children.push(child);
        self.children.sort_by(compare);
    }
}

/// Parameters of a template keyed by their identifier.
pub type ParameterIndex = HashMap<String, TemplateParameter>;

/// Build the parameter index from a list of raw declarations.
///
/// Raises `InvalidTemplate` for duplicate identifiers and, when `validate` is
/// set, `InvalidParameter` for declarations that violate the schema or the
/// nesting rules.
pub fn create_parameter_index(declarations: &[Value], validate: bool) -> TemplateResult<ParameterIndex> {
    let mut index = ParameterIndex::new();
    for raw in declarations {
        let decl = ParameterDeclaration::from_value(raw, validate)?;
        if index.contains_key(&decl.id) {
            return Err(TemplateError::InvalidTemplate(format!(
                "parameter '{}' not unique",
                decl.id
            )));
        }
        index.insert(decl.id.clone(), TemplateParameter::new(decl));
    }

    if validate {
        check_nesting(&index)?;
    }

    let members: Vec<TemplateParameter> = index
        .values()
        .filter(|p| p.parent().is_some())
        .cloned()
        .collect();
    for member in members {
        if let Some(parent) = member.parent().and_then(|id| index.get_mut(id)) {
            parent.add_child(member);
        }
    }
    Ok(index)
}

fn check_nesting(index: &ParameterIndex) -> TemplateResult<()> {
    for para in index.values() {
        let Some(parent_id) = para.parent() else {
            continue;
        };
        let parent = index.get(parent_id).ok_or_else(|| {
            TemplateError::InvalidParameter(format!(
                "parent '{}' of '{}' is not declared",
                parent_id,
                para.id()
            ))
        })?;
        if !parent.datatype().is_container() {
            return Err(TemplateError::InvalidParameter(format!(
                "parent '{}' of '{}' is not a list or record",
                parent_id,
                para.id()
            )));
        }
        if parent.parent().is_some() {
            return Err(TemplateError::InvalidParameter(format!(
                "parameter '{}' exceeds the supported nesting depth",
                para.id()
            )));
        }
    }
    Ok(())
}

/// Identifiers of the required parameters at the given nesting level.
pub fn mandatory_arguments(parameters: &ParameterIndex, parent: Option<&str>) -> Vec<String> {
    let mut ids: Vec<String> = parameters
        .values()
        .filter(|p| p.is_required() && p.parent() == parent)
        .map(|p| p.id().to_string())
        .collect();
    ids.sort();
    ids
}

/// Order parameters by (index, id) ascending.
pub fn sort_parameters<'a, I>(parameters: I) -> Vec<&'a TemplateParameter>
where
    I: IntoIterator<Item = &'a TemplateParameter>,
{
    let mut sorted: Vec<&TemplateParameter> = parameters.into_iter().collect();
    sorted.sort_by(|a, b| compare(a, b));
    sorted
}

fn compare(a: &TemplateParameter, b: &TemplateParameter) -> std::cmp::Ordering {
    (a.declaration.index, a.id()).cmp(&(b.declaration.index, b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_with_forward_reference() {
        let index = create_parameter_index(
            &[
                json!({"id": "x", "parent": "point", "datatype": "int", "index": 1}),
                json!({"id": "y", "parent": "point", "datatype": "int", "index": 0}),
                json!({"id": "point", "datatype": "record"}),
                json!({"id": "name"}),
            ],
            true,
        )
        .unwrap();

        assert_eq!(index.len(), 4);
        let point = &index["point"];
        let children: Vec<&str> = point.children().iter().map(|c| c.id()).collect();
        assert_eq!(children, vec!["y", "x"]);
        assert!(index["name"].children().is_empty());
    }

    #[test]
    fn test_duplicate_identifier() {
        let result = create_parameter_index(&[json!({"id": "A"}), json!({"id": "A"})], false);
        assert!(matches!(result, Err(TemplateError::InvalidTemplate(_))));
    }

    #[test]
    fn test_nesting_rules() {
        let undeclared = vec![json!({"id": "x", "parent": "p"})];
        let not_container = vec![json!({"id": "p"}), json!({"id": "x", "parent": "p"})];
        let too_deep = vec![
            json!({"id": "a", "datatype": "list"}),
            json!({"id": "b", "datatype": "record", "parent": "a"}),
            json!({"id": "c", "parent": "b"}),
        ];
        for decls in [undeclared, not_container, too_deep] {
            let result = create_parameter_index(&decls, true);
            assert!(matches!(result, Err(TemplateError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_mandatory_arguments() {
        let index = create_parameter_index(
            &[
                json!({"id": "b"}),
                json!({"id": "a"}),
                json!({"id": "opt", "required": false}),
                json!({"id": "rec", "datatype": "record", "required": false}),
                json!({"id": "m", "parent": "rec"}),
            ],
            true,
        )
        .unwrap();
        assert_eq!(mandatory_arguments(&index, None), vec!["a", "b"]);
        assert_eq!(mandatory_arguments(&index, Some("rec")), vec!["m"]);
    }

    #[test]
    fn test_sort_parameters() {
        let index = create_parameter_index(
            &[
                json!({"id": "c", "index": 0}),
                json!({"id": "a", "index": 1}),
                json!({"id": "b", "index": 0}),
            ],
            true,
        )
        .unwrap();
        let sorted: Vec<&str> = sort_parameters(index.values()).iter().map(|p| p.id()).collect();
        assert_eq!(sorted, vec!["b", "c", "a"]);
    }
}
