//! The ambient built-ins of the global scope.
//!
//! This is the complete list of names sandboxed code can reach without a
//! capability: language values (`undefined`, `NaN`, `Infinity`), standard
//! objects (`Math`, `JSON`, `Object`, `Array`, `String`, `Number`, `Boolean`,
//! `Date`, `Map`, `Set`, `Promise`, the error constructors, `console`), the
//! numeric parsing and URI coding functions, virtual timers and the
//! `__helpers` lowering intrinsic. None of them touch the host filesystem,
//! network, process or environment.

pub(crate) mod array;
pub(crate) mod collections;
pub(crate) mod date;
pub(crate) mod globals;
pub(crate) mod json;
pub(crate) mod object;
pub(crate) mod promise;
pub(crate) mod string;

use std::rc::Rc;

use crate::interp::{to_numeric, Interp};
use crate::value::{NativeFnPtr, Object, ObjectKind, Value};

/// Install every global built-in into the interpreter's root scope.
pub(crate) fn install(interp: &mut Interp) {
    let globals = interp.globals.clone();
    let define = |name: &str, value: Value| globals.declare(Rc::from(name), Some(value), false);

    define("undefined", Value::Undefined);
    define("NaN", Value::Number(f64::NAN));
    define("Infinity", Value::Number(f64::INFINITY));

    define("Object", object::object_constructor());
    define("Array", array::constructor());
    define("String", string::constructor());
    define("Number", object::number_constructor());
    define("Boolean", globals::boolean_constructor());
    define("Math", globals::math());
    define("JSON", json::namespace());
    define("Date", date::constructor());
    define("Map", collections::map_constructor());
    define("Set", collections::set_constructor());
    define("Promise", promise::constructor());
    define("console", globals::console());
    for name in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError", "URIError"] {
        define(name, globals::error_constructor(name));
    }

    define("parseInt", Value::native("parseInt", globals::parse_int));
    define("parseFloat", Value::native("parseFloat", globals::parse_float));
    define("isNaN", Value::native("isNaN", globals::is_nan));
    define("isFinite", Value::native("isFinite", globals::is_finite));
    define("encodeURIComponent", Value::native("encodeURIComponent", globals::encode_uri_component));
    define("decodeURIComponent", Value::native("decodeURIComponent", globals::decode_uri_component));
    define("setTimeout", Value::native("setTimeout", globals::set_timeout));
    define("setInterval", Value::native("setInterval", globals::set_interval));
    define("clearTimeout", Value::native("clearTimeout", globals::clear_timer));
    define("clearInterval", Value::native("clearInterval", globals::clear_timer));
    define("__helpers", globals::helpers());
}

/// Builtin method for a receiver category.
pub(crate) fn method(table: &str, key: &str) -> Option<NativeFnPtr> {
    let specific = match table {
        "array" => array::method(key),
        "string" => string::method(key),
        "regexp" => string::regexp_method(key),
        "number" => object::number_method(key),
        "function" => object::function_method(key),
        "promise" => promise::method(key),
        "date" => date::method(key),
        "map" => collections::map_method(key),
        "set" => collections::set_method(key),
        "animated" => crate::capabilities::native::animated_method(key),
        "animation" => crate::capabilities::native::animation_method(key),
        _ => None,
    };
    specific.or_else(|| object::object_method(key))
}

/// Argument `i`, or `undefined`.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// ToIntegerOrInfinity.
pub(crate) fn to_integer(value: &Value) -> f64 {
    let n = to_numeric(value);
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative, possibly missing index against `len`.
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = to_integer(value);
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// A native function that also carries static properties.
pub(crate) fn native_with_statics(name: &str, func: NativeFnPtr, statics: Vec<(&str, Value)>) -> Value {
    let value = Value::native(name, func);
    if let Value::Object(obj) = &value {
        let mut object = obj.borrow_mut();
        for (key, item) in statics {
            object.set(key, item);
        }
    }
    value
}

/// A plain object whose properties are native functions.
pub(crate) fn namespace(methods: &[(&str, NativeFnPtr)]) -> Value {
    let mut object = Object::new(ObjectKind::Plain);
    for (name, func) in methods {
        object.set(*name, Value::native(name, *func));
    }
    Value::Object(Rc::new(std::cell::RefCell::new(object)))
}
