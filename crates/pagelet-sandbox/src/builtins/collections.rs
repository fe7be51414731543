//! `Map` and `Set`.
//!
//! Keys compare with SameValueZero and iterate in insertion order. Entries
//! live in a vector, so lookups are linear; both collections count against
//! `max_array_length`.

use crate::interp::{type_error, Abrupt, Interp};
use crate::value::{NativeFnPtr, ObjRef, ObjectKind, Value};

use super::{arg, native_with_statics};

type NativeResult = Result<Value, Abrupt>;

pub(crate) fn map_constructor() -> Value {
    native_with_statics("Map", new_map, Vec::new())
}

pub(crate) fn set_constructor() -> Value {
    native_with_statics("Set", new_set, Vec::new())
}

/// Whether `value` is a `Map` or a `Set`.
pub(crate) fn is_collection(value: &Value) -> bool {
    match value {
        Value::Object(obj) => matches!(obj.borrow().kind, ObjectKind::Map(_) | ObjectKind::Set(_)),
        _ => false,
    }
}

fn new_map(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let map = Value::object(ObjectKind::Map(Vec::new()));
    let source = arg(args, 0);
    if !source.is_nullish() {
        for entry in interp.iterate_values(&source)? {
            if !matches!(entry, Value::Object(_)) {
                return Err(type_error(format!(
                    "Iterator value {} is not an entry object",
                    entry.to_js_string()
                )));
            }
            let key = interp.get(&entry, "0")?;
            let value = interp.get(&entry, "1")?;
            map_set(interp, &map, &[key, value])?;
        }
    }
    Ok(map)
}

fn new_set(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let set = Value::object(ObjectKind::Set(Vec::new()));
    let source = arg(args, 0);
    if !source.is_nullish() {
        for item in interp.iterate_values(&source)? {
            set_add(interp, &set, &[item])?;
        }
    }
    Ok(set)
}

pub(crate) fn map_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "get" => map_get,
        "set" => map_set,
        "has" => map_has,
        "delete" => map_delete,
        "clear" => clear,
        "forEach" => map_for_each,
        "keys" => map_keys,
        "values" => map_values,
        "entries" => map_entries,
        _ => return None,
    })
}

pub(crate) fn set_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "add" => set_add,
        "has" => set_has,
        "delete" => set_delete,
        "clear" => clear,
        "forEach" => set_for_each,
        "values" | "keys" => set_values,
        "entries" => set_entries,
        _ => return None,
    })
}

fn receiver(this: &Value, name: &str) -> Result<ObjRef, Abrupt> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Map(_) | ObjectKind::Set(_)) => {
            Ok(obj.clone())
        }
        _ => Err(type_error(format!("Method {name} called on incompatible receiver"))),
    }
}

fn with_entries<T>(this: &Value, f: impl FnOnce(&mut Vec<(Value, Value)>) -> T) -> Result<T, Abrupt> {
    let obj = receiver(this, "Map.prototype method")?;
    let mut object = obj.borrow_mut();
    match &mut object.kind {
        ObjectKind::Map(entries) => Ok(f(entries)),
        _ => Err(type_error("Method Map.prototype method called on incompatible receiver")),
    }
}

fn with_items<T>(this: &Value, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T, Abrupt> {
    let obj = receiver(this, "Set.prototype method")?;
    let mut object = obj.borrow_mut();
    match &mut object.kind {
        ObjectKind::Set(items) => Ok(f(items)),
        _ => Err(type_error("Method Set.prototype method called on incompatible receiver")),
    }
}

/// `-0` keys are stored as `+0`.
fn normalize(key: Value) -> Value {
    match key {
        Value::Number(n) if n == 0.0 => Value::Number(0.0),
        other => other,
    }
}

fn map_get(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let key = arg(args, 0);
    with_entries(this, |entries| {
        entries
            .iter()
            .find(|(k, _)| k.same_value_zero(&key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    })
}

fn map_set(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let (key, value) = (normalize(arg(args, 0)), arg(args, 1));
    let len = with_entries(this, |entries| entries.len())?;
    let grow = with_entries(this, |entries| match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
        Some(slot) => {
            slot.1 = value.clone();
            false
        }
        None => true,
    })?;
    if grow {
        interp.array_length(len as f64 + 1.0)?;
        with_entries(this, |entries| entries.push((key, value)))?;
    }
    Ok(this.clone())
}

fn map_has(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let key = arg(args, 0);
    with_entries(this, |entries| Value::Bool(entries.iter().any(|(k, _)| k.same_value_zero(&key))))
}

fn map_delete(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let key = arg(args, 0);
    with_entries(this, |entries| {
        let before = entries.len();
        entries.retain(|(k, _)| !k.same_value_zero(&key));
        Value::Bool(entries.len() != before)
    })
}

fn clear(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let obj = receiver(this, "clear")?;
    match &mut obj.borrow_mut().kind {
        ObjectKind::Map(entries) => entries.clear(),
        ObjectKind::Set(items) => items.clear(),
        _ => {}
    }
    Ok(Value::Undefined)
}

fn map_for_each(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let callback = callback(args)?;
    // Entries added by the callback are not visited
    let snapshot = with_entries(this, |entries| entries.clone())?;
    for (key, value) in snapshot {
        interp.call(&callback, &arg(args, 1), &[value, key, this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn map_keys(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_entries(this, |entries| Value::array(entries.iter().map(|(k, _)| k.clone()).collect()))
}

fn map_values(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_entries(this, |entries| Value::array(entries.iter().map(|(_, v)| v.clone()).collect()))
}

fn map_entries(interp: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    receiver(this, "Map.prototype.entries")?;
    Ok(Value::array(interp.iterate_values(this)?))
}

fn set_add(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let item = normalize(arg(args, 0));
    let (len, present) = with_items(this, |items| (items.len(), items.iter().any(|i| i.same_value_zero(&item))))?;
    if !present {
        interp.array_length(len as f64 + 1.0)?;
        with_items(this, |items| items.push(item))?;
    }
    Ok(this.clone())
}

fn set_has(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let item = arg(args, 0);
    with_items(this, |items| Value::Bool(items.iter().any(|i| i.same_value_zero(&item))))
}

fn set_delete(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let item = arg(args, 0);
    with_items(this, |items| {
        let before = items.len();
        items.retain(|i| !i.same_value_zero(&item));
        Value::Bool(items.len() != before)
    })
}

fn set_for_each(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let callback = callback(args)?;
    let snapshot = with_items(this, |items| items.clone())?;
    for item in snapshot {
        interp.call(&callback, &arg(args, 1), &[item.clone(), item, this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn set_values(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_items(this, |items| Value::array(items.clone()))
}

fn set_entries(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_items(this, |items| {
        Value::array(items.iter().map(|i| Value::array(vec![i.clone(), i.clone()])).collect())
    })
}

fn callback(args: &[Value]) -> Result<Value, Abrupt> {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(type_error(format!("{} is not a function", callback.to_js_string())));
    }
    Ok(callback)
}

#[cfg(test)]
mod tests {
    use crate::executor::SandboxExecutor;
    use pretty_assertions::assert_eq;

    fn run(code: &str) -> String {
        let execution = SandboxExecutor::default().invoke(code, &[], Vec::new()).unwrap();
        execution.element().to_js_string().to_string()
    }

    #[test]
    fn map_keys_use_same_value_zero() {
        let code = r#"
            const key = {};
            const m = new Map([["a", 1], [NaN, 2]]);
            m.set(key, 3).set(-0, 4).set("a", 5);
            return [m.size, m.get("a"), m.get(NaN), m.get(key), m.get(0), m.get({}), m.has(+0)].join();
        "#;
        assert_eq!(run(code), "4,5,2,3,4,,true");
    }

    #[test]
    fn map_iterates_in_insertion_order() {
        let code = r#"
            const m = new Map();
            m.set("b", 2);
            m.set("a", 1);
            m.set("b", 3);
            const seen = [];
            m.forEach((value, key) => seen.push(key + "=" + value));
            for (const [key, value] of m) seen.push(key + value);
            m.delete("b");
            return [seen.join(" "), [...m.keys()].join(), Array.from(m.values()).join(), m.size].join("|");
        "#;
        assert_eq!(run(code), "b=3 a=1 b3 a1|a|1|1");
    }

    #[test]
    fn set_deduplicates_and_spreads() {
        let code = r#"
            const s = new Set([3, 1, 3, "3", NaN, NaN]);
            s.add(1).add(2);
            const removed = s.delete("3");
            return [[...s].join(), s.size, s.has(NaN), removed, s instanceof Set, typeof s].join("|");
        "#;
        assert_eq!(run(code), "3,1,NaN,2|4|true|true|true|object");
    }

    #[test]
    fn collections_respect_the_length_limit() {
        use crate::config::{ExecuteOptions, SandboxLimits};
        let limits = SandboxLimits { max_array_length: 3, ..SandboxLimits::default() };
        let executor = SandboxExecutor::new(limits, ExecuteOptions::default());
        let err = executor
            .invoke("const s = new Set(); for (let i = 0; i < 10; i++) s.add(i); return s;", &[], Vec::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "RangeError: Invalid array length");
    }

    #[test]
    fn methods_reject_foreign_receivers() {
        let code = r#"
            try {
              new Map().get.call({}, "a");
              return "no error";
            } catch (e) {
              return e.name;
            }
        "#;
        assert_eq!(run(code), "TypeError");
    }
}
