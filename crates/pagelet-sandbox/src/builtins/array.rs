//! `Array` and array methods.

use std::cmp::Ordering;

use crate::interp::{to_numeric, type_error, Abrupt, Interp};
use crate::value::{NativeFnPtr, ObjRef, ObjectKind, Value};

use super::collections::is_collection;
use super::{arg, native_with_statics, relative_index, to_integer};

type NativeResult = Result<Value, Abrupt>;

/// The `Array` global.
pub(crate) fn constructor() -> Value {
    native_with_statics(
        "Array",
        array_constructor,
        vec![
            ("isArray", Value::native("isArray", |_, _, args| Ok(Value::Bool(arg(args, 0).is_array())))),
            ("from", Value::native("from", array_from)),
            ("of", Value::native("of", |_, _, args| Ok(Value::array(args.to_vec())))),
        ],
    )
}

fn array_constructor(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    match args {
        [Value::Number(n)] => {
            let len = interp.array_length(*n)?;
            Ok(Value::array(vec![Value::Undefined; len]))
        }
        _ => Ok(Value::array(args.to_vec())),
    }
}

fn array_from(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let source = arg(args, 0);
    let items = match &source {
        Value::String(_) => interp.iterate_values(&source)?,
        Value::Object(_) if source.is_array() || is_collection(&source) => interp.iterate_values(&source)?,
        Value::Object(_) => {
            // Array-likes such as `{ length: 3 }`
            let len = to_integer(&interp.get(&source, "length")?).max(0.0);
            let len = interp.array_length(len)?;
            let mut items = Vec::with_capacity(len.min(1 << 16));
            for i in 0..len {
                interp.tick()?;
                items.push(interp.get(&source, &i.to_string())?);
            }
            items
        }
        _ => Vec::new(),
    };

    let mapper = arg(args, 1);
    if !mapper.is_callable() {
        return Ok(Value::array(items));
    }
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        out.push(interp.call(&mapper, &Value::Undefined, &[item, Value::from(i as f64)])?);
    }
    Ok(Value::array(out))
}

pub(crate) fn method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "push" => push,
        "pop" => pop,
        "shift" => shift,
        "unshift" => unshift,
        "slice" => slice,
        "splice" => splice,
        "concat" => concat,
        "join" => join,
        "reverse" => reverse,
        "indexOf" => index_of,
        "lastIndexOf" => last_index_of,
        "includes" => includes,
        "find" => find,
        "findIndex" => find_index,
        "findLast" => find_last,
        "filter" => filter,
        "map" => map,
        "forEach" => for_each,
        "reduce" => reduce,
        "reduceRight" => reduce_right,
        "some" => some,
        "every" => every,
        "sort" => sort,
        "flat" => flat,
        "flatMap" => flat_map,
        "fill" => fill,
        "at" => at,
        "keys" => keys,
        "entries" => entries,
        "toString" => join,
        _ => return None,
    })
}

fn array_ref(this: &Value) -> Result<ObjRef, Abrupt> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)) => Ok(obj.clone()),
        _ => Err(type_error("Array method called on a non-array")),
    }
}

fn items_len(this: &Value) -> Result<usize, Abrupt> {
    with_items(this, |items| items.len())
}

/// Snapshot of the receiver's items; callbacks run against the snapshot.
fn items(this: &Value) -> Result<Vec<Value>, Abrupt> {
    this.array_items().ok_or_else(|| type_error("Array method called on a non-array"))
}

fn with_items<T>(this: &Value, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T, Abrupt> {
    let obj = array_ref(this)?;
    let mut object = obj.borrow_mut();
    match &mut object.kind {
        ObjectKind::Array(items) => Ok(f(items)),
        _ => Err(type_error("Array method called on a non-array")),
    }
}

fn push(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    interp.array_length((items_len(this)? + args.len()) as f64)?;
    let len = with_items(this, |items| {
        items.extend_from_slice(args);
        items.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn pop(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_items(this, |items| items.pop().unwrap_or_default())
}

fn shift(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_items(this, |items| if items.is_empty() { Value::Undefined } else { items.remove(0) })
}

fn unshift(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    interp.array_length((items_len(this)? + args.len()) as f64)?;
    let len = with_items(this, |items| {
        items.splice(0..0, args.iter().cloned());
        items.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn slice(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let items = items(this)?;
    let start = relative_index(&arg(args, 0), items.len(), 0);
    let end = relative_index(&arg(args, 1), items.len(), items.len());
    Ok(Value::array(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
}

fn splice(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let removed = with_items(this, |items| {
        let len = items.len();
        let start = relative_index(&arg(args, 0), len, 0);
        let count = match args.len() {
            0 => 0,
            1 => len - start,
            _ => (to_integer(&args[1]).max(0.0) as usize).min(len - start),
        };
        let inserted = args.get(2..).unwrap_or_default().iter().cloned();
        items.splice(start..start + count, inserted).collect::<Vec<_>>()
    })?;
    Ok(Value::array(removed))
}

fn concat(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut out = items(this)?;
    for value in args {
        match value.array_items() {
            Some(more) => {
                interp.array_length((out.len() + more.len()) as f64)?;
                out.extend(more);
            }
            None => out.push(value.clone()),
        }
    }
    interp.array_length(out.len() as f64)?;
    Ok(Value::array(out))
}

fn join(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let separator = match arg(args, 0) {
        Value::Undefined => ",".into(),
        other => other.to_js_string(),
    };
    let parts: Vec<String> = items(this)?
        .iter()
        .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string().to_string() })
        .collect();
    Ok(Value::from(parts.join(&*separator)))
}

fn reverse(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    with_items(this, |items| items.reverse())?;
    Ok(this.clone())
}

fn index_of(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let items = items(this)?;
    let needle = arg(args, 0);
    let from = relative_index(&arg(args, 1), items.len(), 0);
    let found = items.iter().enumerate().skip(from).find(|(_, item)| item.strict_equals(&needle));
    Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
}

fn last_index_of(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let items = items(this)?;
    let needle = arg(args, 0);
    let found = items.iter().rposition(|item| item.strict_equals(&needle));
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let needle = arg(args, 0);
    let found = items(this)?.iter().any(|item| match (item, &needle) {
        (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => item.strict_equals(&needle),
    });
    Ok(Value::Bool(found))
}

/// Call `callback(item, index, array)` for each snapshot item.
fn each(
    interp: &mut Interp,
    this: &Value,
    args: &[Value],
    mut visit: impl FnMut(usize, &Value, Value) -> Option<Value>,
) -> Result<Option<Value>, Abrupt> {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(type_error(format!("{} is not a function", callback.type_of())));
    }
    let this_arg = arg(args, 1);
    for (i, item) in items(this)?.into_iter().enumerate() {
        let result = interp.call(&callback, &this_arg, &[item.clone(), Value::from(i as f64), this.clone()])?;
        if let Some(done) = visit(i, &item, result) {
            return Ok(Some(done));
        }
    }
    Ok(None)
}

fn find(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let found = each(interp, this, args, |_, item, result| result.truthy().then(|| item.clone()))?;
    Ok(found.unwrap_or_default())
}

fn find_index(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let found = each(interp, this, args, |i, _, result| result.truthy().then(|| Value::from(i as f64)))?;
    Ok(found.unwrap_or(Value::Number(-1.0)))
}

fn find_last(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut last = Value::Undefined;
    each(interp, this, args, |_, item, result| {
        if result.truthy() {
            last = item.clone();
        }
        None
    })?;
    Ok(last)
}

fn filter(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut out = Vec::new();
    each(interp, this, args, |_, item, result| {
        if result.truthy() {
            out.push(item.clone());
        }
        None
    })?;
    Ok(Value::array(out))
}

fn map(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut out = Vec::new();
    each(interp, this, args, |_, _, result| {
        out.push(result);
        None
    })?;
    Ok(Value::array(out))
}

fn for_each(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    each(interp, this, args, |_, _, _| None)?;
    Ok(Value::Undefined)
}

fn some(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let found = each(interp, this, args, |_, _, result| result.truthy().then_some(Value::Bool(true)))?;
    Ok(Value::Bool(found.is_some()))
}

fn every(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let failed = each(interp, this, args, |_, _, result| (!result.truthy()).then_some(Value::Bool(false)))?;
    Ok(Value::Bool(failed.is_none()))
}

fn fold(interp: &mut Interp, this: &Value, args: &[Value], rev: bool) -> NativeResult {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(type_error(format!("{} is not a function", callback.type_of())));
    }
    let mut indexed: Vec<(usize, Value)> = items(this)?.into_iter().enumerate().collect();
    if rev {
        indexed.reverse();
    }
    let mut iter = indexed.into_iter();
    let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match iter.next() {
            Some((_, first)) => first,
            None => return Err(type_error("Reduce of empty array with no initial value")),
        },
    };
    for (i, item) in iter {
        acc = interp.call(&callback, &Value::Undefined, &[acc, item, Value::from(i as f64), this.clone()])?;
    }
    Ok(acc)
}

fn reduce(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    fold(interp, this, args, false)
}

fn reduce_right(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    fold(interp, this, args, true)
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        _ => a.to_js_string().cmp(&b.to_js_string()),
    }
}

/// Stable merge sort with a comparator that may throw.
fn merge_sort(
    items: Vec<Value>,
    compare: &mut dyn FnMut(&Value, &Value) -> Result<Ordering, Abrupt>,
) -> Result<Vec<Value>, Abrupt> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, compare)?;
    let right = merge_sort(right, compare)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if compare(a, b)? == Ordering::Greater {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn sort(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let comparator = arg(args, 0);
    let snapshot = items(this)?;
    let sorted = if comparator.is_callable() {
        let mut compare = |a: &Value, b: &Value| -> Result<Ordering, Abrupt> {
            if matches!(a, Value::Undefined) || matches!(b, Value::Undefined) {
                return Ok(default_order(a, b));
            }
            let result = to_numeric(&interp.call(&comparator, &Value::Undefined, &[a.clone(), b.clone()])?);
            Ok(result.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
        };
        merge_sort(snapshot, &mut compare)?
    } else {
        merge_sort(snapshot, &mut |a, b| Ok(default_order(a, b)))?
    };
    with_items(this, |items| *items = sorted)?;
    Ok(this.clone())
}

fn flatten_into(interp: &Interp, out: &mut Vec<Value>, items: Vec<Value>, depth: f64) -> Result<(), Abrupt> {
    for item in items {
        match item.array_items() {
            Some(inner) if depth >= 1.0 => {
                interp.array_length((out.len() + inner.len()) as f64)?;
                flatten_into(interp, out, inner, depth - 1.0)?;
            }
            _ => out.push(item),
        }
    }
    interp.array_length(out.len() as f64)?;
    Ok(())
}

fn flat(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let depth = match arg(args, 0) {
        Value::Undefined => 1.0,
        other => to_integer(&other),
    };
    // Self-containing arrays would otherwise recurse without bound
    let depth = depth.min(interp.limits().max_call_depth as f64);
    let mut out = Vec::new();
    flatten_into(interp, &mut out, items(this)?, depth)?;
    Ok(Value::array(out))
}

fn flat_map(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mapped = map(interp, this, args)?;
    let mut out = Vec::new();
    flatten_into(interp, &mut out, mapped.array_items().unwrap_or_default(), 1.0)?;
    Ok(Value::array(out))
}

fn fill(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let value = arg(args, 0);
    with_items(this, |items| {
        let len = items.len();
        let start = relative_index(&arg(args, 1), len, 0);
        let end = relative_index(&arg(args, 2), len, len);
        for item in items.iter_mut().take(end).skip(start) {
            *item = value.clone();
        }
    })?;
    Ok(this.clone())
}

fn at(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let items = items(this)?;
    let n = to_integer(&arg(args, 0));
    let index = if n < 0.0 { items.len() as f64 + n } else { n };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(items.get(index as usize).cloned().unwrap_or_default())
}

fn keys(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let len = items(this)?.len();
    Ok(Value::array((0..len).map(|i| Value::from(i as f64)).collect()))
}

fn entries(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let pairs = items(this)?
        .into_iter()
        .enumerate()
        .map(|(i, item)| Value::array(vec![Value::from(i as f64), item]))
        .collect();
    Ok(Value::array(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use pretty_assertions::assert_eq;

    fn numbers(values: &[f64]) -> Value {
        Value::array(values.iter().map(|n| Value::from(*n)).collect())
    }

    fn to_vec(value: &Value) -> Vec<f64> {
        value.array_items().unwrap().iter().map(Value::to_number).collect()
    }

    #[test]
    fn splice_removes_and_inserts() {
        let mut interp = Interp::new(SandboxLimits::default());
        let list = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let removed = splice(&mut interp, &list, &[Value::from(1.0), Value::from(2.0), Value::from(9.0)]).unwrap();
        assert_eq!(to_vec(&removed), vec![2.0, 3.0]);
        assert_eq!(to_vec(&list), vec![1.0, 9.0, 4.0]);
    }

    #[test]
    fn default_sort_compares_strings() {
        let mut interp = Interp::new(SandboxLimits::default());
        let list = numbers(&[10.0, 9.0, 1.0]);
        sort(&mut interp, &list, &[]).unwrap();
        assert_eq!(to_vec(&list), vec![1.0, 10.0, 9.0]);
    }

    #[test]
    fn comparator_sort_is_stable_and_fallible() {
        let mut interp = Interp::new(SandboxLimits::default());
        let list = numbers(&[3.0, 1.0, 2.0]);
        let by_value = Value::native("cmp", |_, _, args| {
            Ok(Value::from(args[0].to_number() - args[1].to_number()))
        });
        sort(&mut interp, &list, &[by_value]).unwrap();
        assert_eq!(to_vec(&list), vec![1.0, 2.0, 3.0]);

        let throwing = Value::native("cmp", |_, _, _| Err(Abrupt::Throw(Value::from("no"))));
        assert!(sort(&mut interp, &list, &[throwing]).is_err());
        assert_eq!(to_vec(&list), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn flat_respects_depth() {
        let mut interp = Interp::new(SandboxLimits::default());
        let nested = Value::array(vec![
            Value::from(1.0),
            Value::array(vec![Value::from(2.0), Value::array(vec![Value::from(3.0)])]),
        ]);
        let once = flat(&mut interp, &nested, &[]).unwrap();
        assert_eq!(once.array_items().unwrap().len(), 3);
        let deep = flat(&mut interp, &nested, &[Value::from(f64::INFINITY)]).unwrap();
        assert_eq!(to_vec(&deep), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn oversized_arrays_are_range_errors() {
        let mut interp = Interp::new(SandboxLimits { max_array_length: 100, ..SandboxLimits::default() });
        let huge = array_constructor(&mut interp, &Value::Undefined, &[Value::from(4_294_967_295.0)]).unwrap_err();
        assert_eq!(interp.describe_abrupt(&huge), "RangeError: Invalid array length");
        let like = Value::plain(vec![("length", Value::from(1e12))]);
        let huge = array_from(&mut interp, &Value::Undefined, &[like]).unwrap_err();
        assert_eq!(interp.describe_abrupt(&huge), "RangeError: Invalid array length");

        let list = Value::array(vec![Value::Undefined; 60]);
        assert!(concat(&mut interp, &list, &[list.clone()]).is_err());
        assert!(interp.set(&list, "length", Value::from(101.0)).is_err());
        assert!(interp.set(&list, "500", Value::from(1.0)).is_err());
        assert_eq!(array_constructor(&mut interp, &Value::Undefined, &[Value::from(100.0)]).unwrap().array_items().unwrap().len(), 100);
    }

    #[test]
    fn flattening_a_cycle_terminates() {
        let mut interp = Interp::new(SandboxLimits::default());
        let list = Value::array(Vec::new());
        push(&mut interp, &list, &[list.clone()]).unwrap();
        let flattened = flat(&mut interp, &list, &[Value::from(f64::INFINITY)]).unwrap();
        assert_eq!(flattened.array_items().unwrap().len(), 1);
    }

    #[test]
    fn includes_finds_nan() {
        let mut interp = Interp::new(SandboxLimits::default());
        let list = numbers(&[f64::NAN]);
        assert!(includes(&mut interp, &list, &[Value::from(f64::NAN)]).unwrap().truthy());
        assert_eq!(index_of(&mut interp, &list, &[Value::from(f64::NAN)]).unwrap().to_number(), -1.0);
    }
}
