//! `Object`, `Number` and the methods shared by every object.

use pagelet_transpile::number_to_string;

use crate::interp::{callable_of, own_entries, own_keys, throw_error, type_error, Abrupt, Interp};
use crate::value::{Callable, NativeFnPtr, ObjectKind, Value};

use super::globals::{is_finite, parse_float, parse_int};
use super::{arg, native_with_statics, to_integer};

type NativeResult = Result<Value, Abrupt>;

/// The `Object` global.
pub(crate) fn object_constructor() -> Value {
    native_with_statics(
        "Object",
        |_, _, args| {
            Ok(match arg(args, 0) {
                value @ Value::Object(_) => value,
                _ => Value::plain(Vec::new()),
            })
        },
        vec![
            ("keys", Value::native("keys", object_keys)),
            ("values", Value::native("values", object_values)),
            ("entries", Value::native("entries", object_entries)),
            ("assign", Value::native("assign", object_assign)),
            ("freeze", Value::native("freeze", identity)),
            ("seal", Value::native("seal", identity)),
            ("fromEntries", Value::native("fromEntries", object_from_entries)),
            ("is", Value::native("is", |_, _, args| Ok(Value::Bool(arg(args, 0).same_value(&arg(args, 1)))))),
        ],
    )
}

fn non_nullish(value: &Value, what: &str) -> Result<(), Abrupt> {
    if value.is_nullish() {
        return Err(type_error(format!("Cannot convert undefined or null to object ({what})")));
    }
    Ok(())
}

fn object_keys(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let target = arg(args, 0);
    non_nullish(&target, "Object.keys")?;
    Ok(Value::array(own_keys(&target).into_iter().map(Value::String).collect()))
}

fn object_values(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let target = arg(args, 0);
    non_nullish(&target, "Object.values")?;
    Ok(Value::array(own_entries(&target).into_iter().map(|(_, value)| value).collect()))
}

fn object_entries(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let target = arg(args, 0);
    non_nullish(&target, "Object.entries")?;
    let pairs = own_entries(&target)
        .into_iter()
        .map(|(key, value)| Value::array(vec![Value::String(key), value]))
        .collect();
    Ok(Value::array(pairs))
}

fn object_assign(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let target = arg(args, 0);
    non_nullish(&target, "Object.assign")?;
    for source in args.iter().skip(1) {
        for (key, value) in own_entries(source) {
            interp.set(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn identity(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    Ok(arg(args, 0))
}

fn object_from_entries(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let pairs = arg(args, 0)
        .array_items()
        .ok_or_else(|| type_error("Object.fromEntries expects an array of entries"))?;
    let out = Value::plain(Vec::new());
    for pair in pairs {
        let key = interp.get(&pair, "0")?;
        let value = interp.get(&pair, "1")?;
        interp.set(&out, &crate::interp::property_key(&key), value)?;
    }
    Ok(out)
}

/// Methods every object answers.
pub(crate) fn object_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "hasOwnProperty" => has_own_property,
        "toString" => to_string,
        "valueOf" => value_of,
        _ => return None,
    })
}

fn has_own_property(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let key = crate::interp::property_key(&arg(args, 0));
    Ok(Value::Bool(own_keys(this).iter().any(|own| *own == key)))
}

fn to_string(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::String(this.to_js_string()))
}

fn value_of(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(this.clone())
}

/// `fn.call`, `fn.apply` and `fn.bind`.
pub(crate) fn function_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "call" => function_call,
        "apply" => function_apply,
        "bind" => function_bind,
        _ => return None,
    })
}

fn function_call(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let rest = args.get(1..).unwrap_or_default();
    interp.call(this, &arg(args, 0), rest)
}

fn function_apply(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        other => other
            .array_items()
            .ok_or_else(|| type_error("CreateListFromArrayLike called on non-object"))?,
    };
    interp.call(this, &arg(args, 0), &list)
}

fn function_bind(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    if callable_of(this).is_none() {
        return Err(type_error("Bind must be called on a function"));
    }
    Ok(Value::object(ObjectKind::Function(Callable::Bound {
        target: this.clone(),
        this: arg(args, 0),
        args: args.get(1..).unwrap_or_default().to_vec(),
    })))
}

/// The `Number` global.
pub(crate) fn number_constructor() -> Value {
    native_with_statics(
        "Number",
        |_, _, args| {
            Ok(Value::Number(match args.first() {
                None => 0.0,
                Some(value) => crate::interp::to_numeric(value),
            }))
        },
        vec![
            ("isInteger", Value::native("isInteger", |_, _, args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
            })),
            ("isFinite", Value::native("isFinite", |interp, this, args| match arg(args, 0) {
                Value::Number(_) => is_finite(interp, this, args),
                _ => Ok(Value::Bool(false)),
            })),
            ("isNaN", Value::native("isNaN", |_, _, args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
            })),
            ("parseFloat", Value::native("parseFloat", parse_float)),
            ("parseInt", Value::native("parseInt", parse_int)),
            ("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0)),
            ("MIN_SAFE_INTEGER", Value::Number(-9_007_199_254_740_991.0)),
            ("EPSILON", Value::Number(f64::EPSILON)),
            ("MAX_VALUE", Value::Number(f64::MAX)),
            ("POSITIVE_INFINITY", Value::Number(f64::INFINITY)),
            ("NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY)),
            ("NaN", Value::Number(f64::NAN)),
        ],
    )
}

pub(crate) fn number_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "toFixed" => to_fixed,
        "toString" => number_to_string_radix,
        "toLocaleString" => to_locale_string,
        "valueOf" => value_of,
        _ => return None,
    })
}

fn this_number(this: &Value) -> Result<f64, Abrupt> {
    match this {
        Value::Number(n) => Ok(*n),
        _ => Err(type_error("Number method called on incompatible receiver")),
    }
}

fn to_fixed(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let n = this_number(this)?;
    let digits = to_integer(&arg(args, 0));
    if !(0.0..=100.0).contains(&digits) {
        return Err(throw_error("RangeError", "toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::from(number_to_string(n)));
    }
    let digits = digits as usize;
    let scale = 10f64.powi(digits as i32);
    // Ties round away from zero
    let rounded = (n * scale).round() / scale;
    let text = format!("{rounded:.digits$}");
    Ok(Value::from(if text.starts_with('-') && rounded == 0.0 { text[1..].to_string() } else { text }))
}

fn number_to_string_radix(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let n = this_number(this)?;
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        other => to_integer(&other) as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(throw_error("RangeError", "toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() {
        return Ok(Value::from(number_to_string(n)));
    }
    Ok(Value::from(to_radix(n, radix)))
}

fn to_radix(n: f64, radix: u32) -> String {
    let negative = n < 0.0;
    let n = n.abs();
    let mut int = n.trunc();
    let mut frac = n - int;

    let mut digits = Vec::new();
    if int == 0.0 {
        digits.push('0');
    }
    while int >= 1.0 {
        let d = (int % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        int = (int / f64::from(radix)).trunc();
    }
    digits.reverse();
    let mut out: String = digits.into_iter().collect();

    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= f64::from(radix);
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix).unwrap_or('0'));
            frac -= frac.trunc();
            if frac == 0.0 {
                break;
            }
        }
    }
    if negative {
        out.insert(0, '-');
    }
    out
}

/// en-US grouping with up to three fraction digits.
fn to_locale_string(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let n = this_number(this)?;
    if !n.is_finite() {
        return Ok(Value::from(number_to_string(n)));
    }
    let rounded = (n.abs() * 1000.0).round() / 1000.0;
    let text = format!("{rounded}");
    let (int, frac) = text.split_once('.').unwrap_or((&text, ""));

    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if !frac.is_empty() {
        grouped.push('.');
        grouped.push_str(frac);
    }
    if n < 0.0 && rounded != 0.0 {
        grouped.insert(0, '-');
    }
    Ok(Value::from(grouped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn number(func: NativeFnPtr, n: f64, args: &[Value]) -> String {
        let mut interp = Interp::new(SandboxLimits::default());
        func(&mut interp, &Value::from(n), args).unwrap().to_js_string().to_string()
    }

    #[test]
    fn to_fixed_rounds_half_away_from_zero() {
        assert_eq!(number(to_fixed, 2.5, &[]), "3");
        assert_eq!(number(to_fixed, 1.25, &[Value::from(1.0)]), "1.3");
        assert_eq!(number(to_fixed, -0.0001, &[Value::from(2.0)]), "0.00");
    }

    #[test]
    fn radix_and_locale_formatting() {
        assert_eq!(number(number_to_string_radix, 255.0, &[Value::from(16.0)]), "ff");
        assert_eq!(number(number_to_string_radix, -5.0, &[Value::from(2.0)]), "-101");
        assert_eq!(number(to_locale_string, 1234567.891, &[]), "1,234,567.891");
        assert_eq!(number(to_locale_string, 999.0, &[]), "999");
    }

    #[test]
    fn assign_copies_in_order() {
        let mut interp = Interp::new(SandboxLimits::default());
        let target = Value::plain(vec![("a", Value::from(1.0))]);
        let source = Value::plain(vec![("b", Value::from(2.0)), ("a", Value::from(3.0))]);
        object_assign(&mut interp, &Value::Undefined, &[target.clone(), source]).unwrap();
        assert_eq!(own_keys(&target), vec![Rc::from("a"), Rc::from("b")]);
        assert_eq!(interp.get(&target, "a").unwrap().to_number(), 3.0);
    }

    #[test]
    fn bind_prepends_arguments() {
        let mut interp = Interp::new(SandboxLimits::default());
        let add = Value::native("add", |_, _, args| Ok(Value::from(args[0].to_number() + args[1].to_number())));
        let bound = function_bind(&mut interp, &add, &[Value::Null, Value::from(40.0)]).unwrap();
        let result = interp.call(&bound, &Value::Undefined, &[Value::from(2.0)]).unwrap();
        assert_eq!(result.to_number(), 42.0);
    }
}
