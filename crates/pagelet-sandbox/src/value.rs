//! Runtime values of the sandbox interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use pagelet_transpile::ast::Function;
use pagelet_transpile::number_to_string;

use crate::capabilities::native::AnimationPlan;
use crate::interp::{Abrupt, Interp, ScopeRef};

/// Shared, mutable heap object.
pub type ObjRef = Rc<RefCell<Object>>;

/// Signature of host-implemented functions: `(interp, this, args)`.
pub type NativeFn = dyn Fn(&mut Interp, &Value, &[Value]) -> Result<Value, Abrupt>;

/// Plain function pointer form of [`NativeFn`], used by builtin tables.
pub type NativeFnPtr = fn(&mut Interp, &Value, &[Value]) -> Result<Value, Abrupt>;

/// A JavaScript value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjRef),
}

/// A heap object: its kind plus ordered own properties.
pub struct Object {
    pub kind: ObjectKind,
    pub props: Vec<(Rc<str>, Value)>,
    /// Constructor used with `new`, for `instanceof`
    pub constructor: Option<ObjRef>,
}

/// What a heap object is.
pub enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    Function(Callable),
    Error,
    Promise(PromiseState),
    RegExp(RegExpData),
    /// Time value in milliseconds since the epoch; `NaN` when invalid
    Date(f64),
    /// Entries in insertion order
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Element(ElementData),
    /// A host component such as `View`, or the `Fragment` marker
    Host(&'static str),
    AnimatedValue(f64),
    Interpolation(Interpolation),
    /// Result of `Animated.timing` and friends, started with `.start()`
    Animation(Rc<AnimationPlan>),
}

/// The callable part of a function object.
#[derive(Clone)]
pub enum Callable {
    Closure(Rc<Closure>),
    Native(NativeFunction),
    Bound {
        target: Value,
        this: Value,
        args: Vec<Value>,
    },
}

/// An author-defined function closed over its scope.
pub struct Closure {
    pub func: Rc<Function>,
    pub env: ScopeRef,
}

/// A host-implemented function.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub func: Rc<NativeFn>,
}

/// Settlement state of a promise.
pub enum PromiseState {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

/// A `then` registration waiting on a pending promise.
#[derive(Clone)]
pub struct Reaction {
    pub on_fulfilled: Option<Value>,
    pub on_rejected: Option<Value>,
    /// Promise returned by `then`, settled with the handler's outcome
    pub derived: Option<ObjRef>,
}

/// A compiled regular expression literal.
pub struct RegExpData {
    pub regex: Rc<regex::Regex>,
    pub source: Rc<str>,
    pub flags: Rc<str>,
    pub last_index: usize,
}

impl RegExpData {
    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }
}

/// `React.createElement(type, props)` result.
pub struct ElementData {
    pub element_type: Value,
    /// Props object, `children` included
    pub props: Value,
    pub key: Option<Rc<str>>,
}

/// `animatedValue.interpolate({ inputRange, outputRange })`
pub struct Interpolation {
    pub source: ObjRef,
    pub input: Vec<f64>,
    pub output: Vec<InterpolationStop>,
}

/// One `outputRange` entry.
#[derive(Clone, PartialEq)]
pub enum InterpolationStop {
    Number(f64),
    /// Numeric output with a unit suffix, such as "45deg" or "50%"
    Unit(f64, Rc<str>),
}

impl Object {
    /// A new object of the given kind without properties.
    pub fn new(kind: ObjectKind) -> Self {
        Self { kind, props: Vec::new(), constructor: None }
    }

    /// Own property lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
    }

    /// Insert or replace an own property, preserving insertion order.
    pub fn set(&mut self, key: impl Into<Rc<str>>, value: Value) {
        let key = key.into();
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
    }

    /// Remove an own property.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.props.len();
        self.props.retain(|(k, _)| &**k != key);
        before != self.props.len()
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }
}

impl Value {
    pub fn object(kind: ObjectKind) -> Self {
        Value::Object(Rc::new(RefCell::new(Object::new(kind))))
    }

    /// A plain object with the given properties.
    pub fn plain(props: Vec<(&str, Value)>) -> Self {
        let mut object = Object::new(ObjectKind::Plain);
        for (key, value) in props {
            object.set(key, value);
        }
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::object(ObjectKind::Array(items))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Wrap a host closure as a function value.
    pub fn native(
        name: &str,
        func: impl Fn(&mut Interp, &Value, &[Value]) -> Result<Value, Abrupt> + 'static,
    ) -> Self {
        Self::object(ObjectKind::Function(Callable::Native(NativeFunction {
            name: Rc::from(name),
            func: Rc::new(func),
        })))
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(obj) if obj.borrow().is_callable())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)))
    }

    /// Elements of an array value, if it is one.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(items) => Some(items.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// ToBoolean.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// The `typeof` string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.borrow().is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    /// ToNumber for primitives; objects convert through their string form.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::AnimatedValue(v) | ObjectKind::Date(v) => *v,
                ObjectKind::Array(items) if items.is_empty() => 0.0,
                ObjectKind::Array(items) if items.len() == 1 => items[0].to_number(),
                _ => f64::NAN,
            },
        }
    }

    /// ToString.
    pub fn to_js_string(&self) -> Rc<str> {
        match self {
            Value::String(s) => s.clone(),
            other => Rc::from(other.display()),
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(obj) => object_to_string(obj, 0),
        }
    }

    /// Pointer identity for objects.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        matches!((self, other), (Value::Object(a), Value::Object(b)) if Rc::ptr_eq(a, b))
    }

    /// `Object.is` semantics.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan())
                    || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            _ => self.strict_equals(other),
        }
    }

    /// SameValueZero, the key equality of `Map` and `Set`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self.strict_equals(other),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Object(_), Value::Object(_)) => self.strict_equals(other),
            (Value::Object(_), prim) | (prim, Value::Object(_)) => {
                let converted = Value::String(match self {
                    Value::Object(_) => self.to_js_string(),
                    _ => other.to_js_string(),
                });
                converted.loose_equals(prim)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Number(_), _) | (_, Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }
}

fn object_to_string(obj: &ObjRef, depth: usize) -> String {
    let object = obj.borrow();
    match &object.kind {
        ObjectKind::Array(items) => {
            if depth > 8 {
                return String::new();
            }
            items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    Value::Object(inner) => object_to_string(inner, depth + 1),
                    other => other.display(),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        ObjectKind::Error => {
            let name = object.get("name").map(|v| v.display()).unwrap_or_else(|| "Error".into());
            match object.get("message").map(|v| v.display()) {
                Some(message) if !message.is_empty() => format!("{name}: {message}"),
                _ => name,
            }
        }
        ObjectKind::Function(callable) => {
            let name = match callable {
                Callable::Closure(c) => c.func.name.as_deref().unwrap_or("").to_string(),
                Callable::Native(n) => n.name.to_string(),
                Callable::Bound { .. } => "bound".to_string(),
            };
            format!("function {name}() {{ [code] }}")
        }
        ObjectKind::Promise(_) => "[object Promise]".to_string(),
        ObjectKind::RegExp(re) => format!("/{}/{}", re.source, re.flags),
        ObjectKind::AnimatedValue(v) => number_to_string(*v),
        ObjectKind::Date(time) => crate::builtins::date::to_display_string(*time),
        ObjectKind::Map(_) => "[object Map]".to_string(),
        ObjectKind::Set(_) => "[object Set]".to_string(),
        _ => "[object Object]".to_string(),
    }
}

/// ToNumber for strings.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let lower = trimmed.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map(|n| n as f64).unwrap_or(f64::NAN);
        }
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function(_) => f.write_str("[Function]"),
                ObjectKind::Array(items) => write!(f, "[Array({})]", items.len()),
                ObjectKind::Element(_) => f.write_str("[Element]"),
                ObjectKind::Host(name) => write!(f, "[Host {name}]"),
                _ => f.write_str("[Object]"),
            },
            other => f.write_str(&other.display()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn string_conversion() {
        assert_eq!(&*Value::Number(3.0).to_js_string(), "3");
        let arr = Value::array(vec![Value::from(1.0), Value::Null, Value::from("x")]);
        assert_eq!(&*arr.to_js_string(), "1,,x");
        assert_eq!(&*Value::plain(vec![]).to_js_string(), "[object Object]");
    }

    #[test]
    fn number_conversion() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from("0x1F").to_number(), 31.0);
    }

    #[test]
    fn equality() {
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
        let obj = Value::plain(vec![]);
        assert!(obj.strict_equals(&obj.clone()));
        assert!(!obj.strict_equals(&Value::plain(vec![])));
    }
}
