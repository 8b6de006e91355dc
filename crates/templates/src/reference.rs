//! Parameter references inside workflow specifications.
//!
//! A workflow specification is an arbitrary tree of maps, sequences and
//! scalars. Any string of the form `$[[name]]` references the template
//! parameter `name`. Sequences of sequences are not supported.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};
use crate::parameter::{ArgumentValue, Arguments, ParameterIndex};

const REF_PREFIX: &str = "$[[";
const REF_SUFFIX: &str = "]]";

/// Test whether a string is a parameter reference.
pub fn is_parameter(value: &str) -> bool {
    value.len() > REF_PREFIX.len() + REF_SUFFIX.len()
        && value.starts_with(REF_PREFIX)
        && value.ends_with(REF_SUFFIX)
}

/// Name of the referenced parameter. The caller is expected to have checked
/// the value with [`is_parameter`].
pub fn parameter_name(value: &str) -> &str {
    &value[REF_PREFIX.len()..value.len() - REF_SUFFIX.len()]
}

/// Collect the names of all parameters referenced in the specification.
pub fn get_parameter_references(spec: &Value) -> TemplateResult<BTreeSet<String>> {
    let mut refs = BTreeSet::new();
    collect_references(spec, &mut refs)?;
    Ok(refs)
}

fn collect_references(value: &Value, refs: &mut BTreeSet<String>) -> TemplateResult<()> {
    match value {
        Value::Object(obj) => obj.values().try_for_each(|v| collect_references(v, refs)),
        Value::Array(items) => items.iter().try_for_each(|item| {
            if item.is_array() {
                return Err(nested_lists());
            }
            collect_references(item, refs)
        }),
        Value::String(s) if is_parameter(s) => {
            refs.insert(parameter_name(s).to_string());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Replace parameter references with argument values.
///
/// A reference resolves to the constant of the parameter, then to the
/// supplied argument (file arguments by their target path), then to the
/// default value. Returns a new tree; the input is not modified.
pub fn replace_args(spec: &Value, arguments: &Arguments, parameters: &ParameterIndex) -> TemplateResult<Value> {
    match spec {
        Value::Object(obj) => {
            let mut result = serde_json::Map::with_capacity(obj.len());
            for (key, value) in obj {
                result.insert(key.clone(), replace_args(value, arguments, parameters)?);
            }
            Ok(Value::Object(result))
        }
        Value::Array(items) => {
            let mut result = Vec::with_capacity(items.len());
            for item in items {
                if item.is_array() {
                    return Err(nested_lists());
                }
                result.push(replace_args(item, arguments, parameters)?);
            }
            Ok(Value::Array(result))
        }
        Value::String(s) if is_parameter(s) => resolve(parameter_name(s), arguments, parameters),
        other => Ok(other.clone()),
    }
}

fn resolve(name: &str, arguments: &Arguments, parameters: &ParameterIndex) -> TemplateResult<Value> {
    let para = parameters
        .get(name)
        .ok_or_else(|| TemplateError::UnknownParameter(name.to_string()))?;
    if let Some(constant) = para.constant() {
        return Ok(Value::String(constant.to_string()));
    }
    if let Some(arg) = arguments.get(name) {
        return Ok(match &arg.value {
            ArgumentValue::File(file) => Value::String(file.target.clone()),
            _ => arg.to_value(),
        });
    }
    para.default_value()
        .cloned()
        .ok_or_else(|| TemplateError::MissingArgument(name.to_string()))
}

fn nested_lists() -> TemplateError {
    TemplateError::InvalidTemplate("nested lists not supported".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{create_parameter_index, parse_arguments};
    use serde_json::json;

    fn workflow() -> Value {
        json!({
            "inputs": {
                "files": ["code/helloworld.py", "$[[names]]"],
                "parameters": {
                    "helloworld": "code/helloworld.py",
                    "inputfile": "$[[names]]",
                    "sleeptime": "$[[sleeptime]]",
                    "greeting": "$[[greeting]]"
                }
            },
            "workflow": {"type": "serial", "steps": [{"commands": ["echo"]}]},
            "outputs": {"files": ["results/greetings.txt"]},
            "version": 1
        })
    }

    fn params() -> ParameterIndex {
        create_parameter_index(
            &[
                json!({"id": "sleeptime", "datatype": "int", "defaultValue": 10}),
                json!({"id": "names", "datatype": "file"}),
                json!({"id": "greeting", "as": "Hello"}),
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_reference_syntax() {
        assert!(is_parameter("$[[names]]"));
        assert!(!is_parameter("$[[]]"));
        assert!(!is_parameter("names"));
        assert!(!is_parameter("x $[[names]]"));
        assert_eq!(parameter_name("$[[names]]"), "names");
    }

    #[test]
    fn test_get_parameter_references() {
        let refs = get_parameter_references(&workflow()).unwrap();
        let expected: BTreeSet<String> = ["greeting", "names", "sleeptime"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_nested_lists_rejected() {
        for doc in [
            json!([[1]]),
            json!({"a": {"b": [1, ["$[[x]]"]]}}),
            json!({"a": [{"b": [[]]}]}),
        ] {
            let expected = TemplateError::InvalidTemplate("nested lists not supported".to_string());
            assert_eq!(get_parameter_references(&doc), Err(expected.clone()));
            assert_eq!(
                replace_args(&doc, &Arguments::new(), &ParameterIndex::new()),
                Err(expected)
            );
        }
    }

    #[test]
    fn test_replace_args() {
        let params = params();
        let raw = json!({"names": "/data/names.txt"});
        let args = parse_arguments(raw.as_object().unwrap(), &params, true, None).unwrap();
        let original = workflow();
        let resolved = replace_args(&original, &args, &params).unwrap();

        assert_eq!(resolved["inputs"]["files"], json!(["code/helloworld.py", "names.txt"]));
        assert_eq!(resolved["inputs"]["parameters"]["inputfile"], "names.txt");
        assert_eq!(resolved["inputs"]["parameters"]["sleeptime"], 10);
        assert_eq!(resolved["inputs"]["parameters"]["greeting"], "Hello");
        assert_eq!(resolved["version"], 1);
        // Input is left untouched
        assert_eq!(original, workflow());
        // Resolution is idempotent
        assert_eq!(replace_args(&resolved, &args, &params).unwrap(), resolved);
        // All references are declared
        let refs = get_parameter_references(&original).unwrap();
        assert!(refs.iter().all(|r| params.contains_key(r)));
    }

    #[test]
    fn test_constant_wins_over_argument() {
        let params = params();
        let raw = json!({"names": "n.txt", "greeting": "Hi"});
        let args = parse_arguments(raw.as_object().unwrap(), &params, false, None).unwrap();
        let resolved = replace_args(&json!("$[[greeting]]"), &args, &params).unwrap();
        assert_eq!(resolved, json!("Hello"));
    }

    #[test]
    fn test_argument_wins_over_default() {
        let params = params();
        let raw = json!({"names": "n.txt", "sleeptime": 3});
        let args = parse_arguments(raw.as_object().unwrap(), &params, true, None).unwrap();
        let resolved = replace_args(&json!(["$[[sleeptime]]"]), &args, &params).unwrap();
        assert_eq!(resolved, json!([3]));
    }

    #[test]
    fn test_missing_and_unknown() {
        let params = params();
        assert_eq!(
            replace_args(&json!({"a": "$[[names]]"}), &Arguments::new(), &params),
            Err(TemplateError::MissingArgument("names".to_string()))
        );
        assert_eq!(
            replace_args(&json!({"a": "$[[other]]"}), &Arguments::new(), &params),
            Err(TemplateError::UnknownParameter("other".to_string()))
        );
    }
}
