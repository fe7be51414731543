//! Property access on values.

use std::rc::Rc;

use pagelet_transpile::number_to_string;

use crate::value::{Callable, ObjectKind, Value};

use super::{type_error, Abrupt, Interp};

/// Canonical property key of a computed member.
pub(crate) fn property_key(value: &Value) -> Rc<str> {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => Rc::from(number_to_string(*n)),
        other => other.to_js_string(),
    }
}

/// `Some(i)` when `key` is a canonical array index.
fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

impl Interp {
    /// `target[key]`
    pub fn get(&mut self, target: &Value, key: &str) -> Result<Value, Abrupt> {
        let table = match target {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    target.to_js_string()
                )));
            }
            Value::Bool(_) => return Ok(Value::Undefined),
            Value::Number(_) => "number",
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(crate::builtins::string::unit_at(s, index)
                        .map(Value::from)
                        .unwrap_or_default());
                }
                "string"
            }
            Value::Object(obj) => {
                let object = obj.borrow();
                if let Some(value) = object.get(key) {
                    return Ok(value.clone());
                }
                match &object.kind {
                    ObjectKind::Array(items) => {
                        if key == "length" {
                            return Ok(Value::Number(items.len() as f64));
                        }
                        if let Some(index) = array_index(key) {
                            return Ok(items.get(index).cloned().unwrap_or_default());
                        }
                        "array"
                    }
                    ObjectKind::Function(callable) => {
                        match key {
                            "name" => return Ok(Value::from(function_name(callable))),
                            "length" => {
                                let arity = match callable {
                                    Callable::Closure(c) => c.func.params.len(),
                                    _ => 0,
                                };
                                return Ok(Value::Number(arity as f64));
                            }
                            _ => {}
                        }
                        "function"
                    }
                    ObjectKind::Promise(_) => "promise",
                    ObjectKind::RegExp(re) => {
                        let field = match key {
                            "source" => Some(Value::String(re.source.clone())),
                            "flags" => Some(Value::String(re.flags.clone())),
                            "global" => Some(Value::Bool(re.global())),
                            "lastIndex" => Some(Value::Number(re.last_index as f64)),
                            _ => None,
                        };
                        match field {
                            Some(value) => return Ok(value),
                            None => "regexp",
                        }
                    }
                    ObjectKind::Element(element) => {
                        return Ok(match key {
                            "type" => element.element_type.clone(),
                            "props" => element.props.clone(),
                            "key" => element.key.clone().map(Value::String).unwrap_or(Value::Null),
                            _ => Value::Undefined,
                        });
                    }
                    ObjectKind::AnimatedValue(_) | ObjectKind::Interpolation(_) => "animated",
                    ObjectKind::Animation(_) => "animation",
                    ObjectKind::Date(_) => "date",
                    ObjectKind::Map(entries) => {
                        if key == "size" {
                            return Ok(Value::Number(entries.len() as f64));
                        }
                        "map"
                    }
                    ObjectKind::Set(items) => {
                        if key == "size" {
                            return Ok(Value::Number(items.len() as f64));
                        }
                        "set"
                    }
                    ObjectKind::Plain | ObjectKind::Error | ObjectKind::Host(_) => "object",
                }
            }
        };
        Ok(self.method(table, key).unwrap_or_default())
    }

    /// `target[key] = value`
    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Result<(), Abrupt> {
        let obj = match target {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot set properties of {} (setting '{key}')",
                    target.to_js_string()
                )));
            }
            Value::Object(obj) => obj,
            // Writes to primitives are discarded
            _ => return Ok(()),
        };

        let mut object = obj.borrow_mut();
        match &mut object.kind {
            ObjectKind::Array(items) => {
                if let Some(index) = array_index(key) {
                    if index >= items.len() {
                        let len = self.array_length(index as f64 + 1.0)?;
                        items.resize(len, Value::Undefined);
                    }
                    items[index] = value;
                    return Ok(());
                }
                if key == "length" {
                    let len = self.array_length(value.to_number())?;
                    items.resize(len, Value::Undefined);
                    return Ok(());
                }
            }
            ObjectKind::RegExp(re) if key == "lastIndex" => {
                re.last_index = value.to_number().max(0.0) as usize;
                return Ok(());
            }
            ObjectKind::Element(_) => {
                return Err(type_error(format!("Cannot assign to read only property '{key}' of element")));
            }
            _ => {}
        }
        object.set(key, value);
        Ok(())
    }

    /// `delete target[key]`
    pub(crate) fn delete(&mut self, target: &Value, key: &str) -> Result<bool, Abrupt> {
        match target {
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot convert undefined or null to object (deleting '{key}')"
            ))),
            Value::Object(obj) => {
                let mut object = obj.borrow_mut();
                if let ObjectKind::Array(items) = &mut object.kind {
                    if let Some(index) = array_index(key) {
                        if let Some(slot) = items.get_mut(index) {
                            *slot = Value::Undefined;
                        }
                        return Ok(true);
                    }
                }
                object.remove(key);
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// `key in target`
    pub(crate) fn has_property(&mut self, target: &Value, key: &str) -> Result<bool, Abrupt> {
        let Value::Object(obj) = target else {
            return Err(type_error(format!(
                "Cannot use 'in' operator to search for '{key}' in {}",
                target.to_js_string()
            )));
        };
        {
            let object = obj.borrow();
            if object.get(key).is_some() {
                return Ok(true);
            }
            if let ObjectKind::Array(items) = &object.kind {
                if key == "length" || array_index(key).is_some_and(|i| i < items.len()) {
                    return Ok(true);
                }
            }
        }
        Ok(!matches!(self.get(target, key)?, Value::Undefined))
    }
}

/// Own enumerable keys in insertion order (indices first for arrays).
pub(crate) fn own_keys(target: &Value) -> Vec<Rc<str>> {
    own_entries(target).into_iter().map(|(key, _)| key).collect()
}

/// Own enumerable `[key, value]` pairs.
pub(crate) fn own_entries(target: &Value) -> Vec<(Rc<str>, Value)> {
    match target {
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (Rc::from(i.to_string()), Value::from(c.to_string())))
            .collect(),
        Value::Object(obj) => {
            let object = obj.borrow();
            let mut entries: Vec<(Rc<str>, Value)> = match &object.kind {
                ObjectKind::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Rc::from(i.to_string()), v.clone()))
                    .collect(),
                ObjectKind::Element(element) => {
                    return vec![
                        (Rc::from("type"), element.element_type.clone()),
                        (Rc::from("props"), element.props.clone()),
                        (
                            Rc::from("key"),
                            element.key.clone().map(Value::String).unwrap_or(Value::Null),
                        ),
                    ];
                }
                _ => Vec::new(),
            };
            entries.extend(object.props.iter().cloned());
            entries
        }
        _ => Vec::new(),
    }
}

/// Display name of a function.
pub(crate) fn function_name(callable: &Callable) -> String {
    match callable {
        Callable::Closure(closure) => closure.func.name.as_deref().unwrap_or("").to_string(),
        Callable::Native(native) => native.name.to_string(),
        Callable::Bound { target, .. } => match target {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function(inner) => format!("bound {}", function_name(inner)),
                _ => "bound".to_string(),
            },
            _ => "bound".to_string(),
        },
    }
}
