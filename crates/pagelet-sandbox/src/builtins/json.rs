//! `JSON` and conversions between sandbox values and `serde_json`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value as Json;

use crate::interp::{throw_error, type_error, Abrupt, Interp};
use crate::value::{Object, ObjectKind, Value};

use super::{arg, namespace as native_namespace, to_integer};

pub(crate) fn namespace() -> Value {
    native_namespace(&[("stringify", json_stringify), ("parse", json_parse)])
}

fn json_stringify(_: &mut Interp, _: &Value, args: &[Value]) -> Result<Value, Abrupt> {
    let indent = match arg(args, 2) {
        Value::Number(_) => Some(to_integer(&arg(args, 2)).clamp(0.0, 10.0) as usize),
        Value::String(s) => Some(s.chars().count().min(10)),
        _ => None,
    }
    .filter(|n| *n > 0);

    match to_json(&arg(args, 0))? {
        Some(json) => Ok(Value::from(write_json(&json, indent)?)),
        None => Ok(Value::Undefined),
    }
}

fn json_parse(_: &mut Interp, _: &Value, args: &[Value]) -> Result<Value, Abrupt> {
    let text = arg(args, 0).to_js_string();
    let json: Json = serde_json::from_str(&text)
        .map_err(|e| throw_error("SyntaxError", format!("JSON.parse: {e}")))?;
    Ok(from_json(&json))
}

/// `JSON.stringify` without a replacer. `None` for values JSON omits.
pub(crate) fn stringify(value: &Value, indent: Option<usize>) -> Option<String> {
    let json = to_json(value).ok()??;
    write_json(&json, indent).ok()
}

fn write_json(json: &Json, indent: Option<usize>) -> Result<String, Abrupt> {
    let bytes = match indent {
        None => serde_json::to_vec(json).map_err(|e| type_error(e.to_string()))?,
        Some(width) => {
            let spaces = " ".repeat(width);
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            json.serialize(&mut serializer).map_err(|e| type_error(e.to_string()))?;
            buf
        }
    };
    String::from_utf8(bytes).map_err(|e| type_error(e.to_string()))
}

/// Number as JSON: integers without a fraction, non-finite as `null`.
pub(crate) fn number_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::from(n as i64);
    }
    serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

/// Convert a value the way `JSON.stringify` does.
pub(crate) fn to_json(value: &Value) -> Result<Option<Json>, Abrupt> {
    let mut stack = Vec::new();
    convert(value, &mut stack)
}

fn convert(value: &Value, stack: &mut Vec<*const RefCell<Object>>) -> Result<Option<Json>, Abrupt> {
    let obj = match value {
        Value::Undefined => return Ok(None),
        Value::Null => return Ok(Some(Json::Null)),
        Value::Bool(b) => return Ok(Some(Json::Bool(*b))),
        Value::Number(n) => return Ok(Some(number_json(*n))),
        Value::String(s) => return Ok(Some(Json::String(s.to_string()))),
        Value::Object(obj) => obj,
    };

    let ptr = Rc::as_ptr(obj);
    if stack.contains(&ptr) {
        return Err(type_error("Converting circular structure to JSON"));
    }
    stack.push(ptr);

    let object = obj.borrow();
    let json = match &object.kind {
        ObjectKind::Function(_) | ObjectKind::Animation(_) => None,
        ObjectKind::AnimatedValue(n) => Some(number_json(*n)),
        ObjectKind::Date(time) => Some(super::date::iso_string(*time).map_or(Json::Null, Json::String)),
        ObjectKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(convert(item, stack)?.unwrap_or(Json::Null));
            }
            Some(Json::Array(out))
        }
        ObjectKind::Element(element) => {
            let mut map = serde_json::Map::new();
            if let Some(kind) = convert(&element.element_type, stack)? {
                map.insert("type".to_string(), kind);
            }
            if let Some(props) = convert(&element.props, stack)? {
                map.insert("props".to_string(), props);
            }
            Some(Json::Object(map))
        }
        _ => {
            let mut map = serde_json::Map::new();
            for (key, item) in &object.props {
                if let Some(json) = convert(item, stack)? {
                    map.insert(key.to_string(), json);
                }
            }
            Some(Json::Object(map))
        }
    };
    drop(object);
    stack.pop();
    Ok(json)
}

/// Convert parsed JSON into sandbox values.
pub(crate) fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::array(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let mut object = Object::new(ObjectKind::Plain);
            for (key, item) in map {
                object.set(key.as_str(), from_json(item));
            }
            Value::Object(Rc::new(RefCell::new(object)))
        }
    }
}
