//! `String`, string methods and regular expression methods.
//!
//! Indices follow JavaScript: they count UTF-16 code units, not bytes.

use std::rc::Rc;

use regex::{Captures, Regex};

use crate::interp::{throw_error, type_error, Abrupt, Interp};
use crate::value::{NativeFnPtr, ObjRef, Object, ObjectKind, Value};

use super::{arg, native_with_statics, relative_index, to_integer};

type NativeResult = Result<Value, Abrupt>;

/// The `String` global.
pub(crate) fn constructor() -> Value {
    native_with_statics(
        "String",
        |_, _, args| {
            Ok(match args.first() {
                None => Value::from(""),
                Some(value) => Value::String(value.to_js_string()),
            })
        },
        vec![("fromCharCode", Value::native("fromCharCode", from_char_code))],
    )
}

fn from_char_code(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let units: Vec<u16> = args.iter().map(|v| crate::interp::to_uint32(v.to_number()) as u16).collect();
    Ok(Value::from(String::from_utf16_lossy(&units)))
}

/// The UTF-16 code unit at `index` as a one-unit string.
pub(crate) fn unit_at(s: &str, index: usize) -> Option<String> {
    s.encode_utf16().nth(index).map(|unit| String::from_utf16_lossy(&[unit]))
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> Value {
    Value::from(String::from_utf16_lossy(units))
}

fn unit_to_byte(s: &str, unit: usize) -> usize {
    let mut count = 0;
    for (byte, c) in s.char_indices() {
        if count >= unit {
            return byte;
        }
        count += c.len_utf16();
    }
    s.len()
}

fn byte_to_unit(s: &str, byte: usize) -> usize {
    s[..byte].encode_utf16().count()
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&i| haystack.get(i..i + needle.len()) == Some(needle))
}

fn this_string(this: &Value) -> Result<Rc<str>, Abrupt> {
    match this {
        Value::String(s) => Ok(s.clone()),
        Value::Undefined | Value::Null => Err(type_error("String method called on null or undefined")),
        other => Ok(other.to_js_string()),
    }
}

pub(crate) fn method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "charAt" => char_at,
        "charCodeAt" => char_code_at,
        "indexOf" => index_of,
        "lastIndexOf" => last_index_of,
        "includes" => includes,
        "startsWith" => starts_with,
        "endsWith" => ends_with,
        "slice" => slice,
        "substring" => substring,
        "substr" => substr,
        "toUpperCase" | "toLocaleUpperCase" => to_upper_case,
        "toLowerCase" | "toLocaleLowerCase" => to_lower_case,
        "trim" => trim,
        "trimStart" => trim_start,
        "trimEnd" => trim_end,
        "padStart" => pad_start,
        "padEnd" => pad_end,
        "split" => split,
        "replace" => replace,
        "replaceAll" => replace_all,
        "match" => match_,
        "repeat" => repeat,
        "concat" => concat,
        "at" => at,
        "localeCompare" => locale_compare,
        "toString" | "valueOf" => value_of,
        _ => return None,
    })
}

fn value_of(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::String(this_string(this)?))
}

fn char_at(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let index = to_integer(&arg(args, 0));
    if index < 0.0 {
        return Ok(Value::from(""));
    }
    Ok(Value::from(unit_at(&s, index as usize).unwrap_or_default()))
}

fn char_code_at(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let index = to_integer(&arg(args, 0));
    let unit = (index >= 0.0).then(|| s.encode_utf16().nth(index as usize)).flatten();
    Ok(Value::Number(unit.map_or(f64::NAN, f64::from)))
}

fn index_of(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let haystack = units(&this_string(this)?);
    let needle = units(&arg(args, 0).to_js_string());
    let from = to_integer(&arg(args, 1)).max(0.0) as usize;
    Ok(Value::Number(find_units(&haystack, &needle, from).map_or(-1.0, |i| i as f64)))
}

fn last_index_of(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let haystack = units(&this_string(this)?);
    let needle = units(&arg(args, 0).to_js_string());
    if needle.len() > haystack.len() {
        return Ok(Value::Number(-1.0));
    }
    let found = (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == needle[..]);
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    Ok(Value::Bool(index_of(interp, this, args)?.to_number() >= 0.0))
}

fn starts_with(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let prefix = units(&arg(args, 0).to_js_string());
    let at = relative_index(&arg(args, 1), s.len(), 0);
    Ok(Value::Bool(s[at..].starts_with(&prefix)))
}

fn ends_with(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let suffix = units(&arg(args, 0).to_js_string());
    let end = relative_index(&arg(args, 1), s.len(), s.len());
    Ok(Value::Bool(s[..end].ends_with(&suffix)))
}

fn slice(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let start = relative_index(&arg(args, 0), s.len(), 0);
    let end = relative_index(&arg(args, 1), s.len(), s.len());
    Ok(from_units(s.get(start..end.max(start)).unwrap_or_default()))
}

fn substring(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let clamp = |value: Value, default: usize| match value {
        Value::Undefined => default,
        other => to_integer(&other).clamp(0.0, s.len() as f64) as usize,
    };
    let a = clamp(arg(args, 0), 0);
    let b = clamp(arg(args, 1), s.len());
    Ok(from_units(&s[a.min(b)..a.max(b)]))
}

fn substr(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let start = relative_index(&arg(args, 0), s.len(), 0);
    let len = match arg(args, 1) {
        Value::Undefined => s.len() - start,
        other => (to_integer(&other).max(0.0) as usize).min(s.len() - start),
    };
    Ok(from_units(&s[start..start + len]))
}

fn to_upper_case(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from(this_string(this)?.to_uppercase()))
}

fn to_lower_case(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from(this_string(this)?.to_lowercase()))
}

fn trim(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from(this_string(this)?.trim()))
}

fn trim_start(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from(this_string(this)?.trim_start()))
}

fn trim_end(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from(this_string(this)?.trim_end()))
}

fn padding(interp: &Interp, args: &[Value], current: usize) -> Result<Vec<u16>, Abrupt> {
    let target = to_integer(&arg(args, 0)).max(0.0) as usize;
    let filler = match arg(args, 1) {
        Value::Undefined => vec![u16::from(b' ')],
        other => units(&other.to_js_string()),
    };
    if target <= current || filler.is_empty() {
        return Ok(Vec::new());
    }
    interp.string_length(target)?;
    Ok(filler.iter().copied().cycle().take(target - current).collect())
}

fn pad_start(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let mut out = padding(interp, args, s.len())?;
    out.extend(s);
    Ok(from_units(&out))
}

fn pad_end(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut s = units(&this_string(this)?);
    let pad = padding(interp, args, s.len())?;
    s.extend(pad);
    Ok(from_units(&s))
}

fn regexp_of(value: &Value) -> Option<(Rc<Regex>, bool)> {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::RegExp(re) => Some((re.regex.clone(), re.global())),
            _ => None,
        },
        _ => None,
    }
}

fn split(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        other => crate::interp::to_uint32(other.to_number()) as usize,
    };
    let separator = arg(args, 0);
    let parts: Vec<Value> = if let Some((regex, _)) = regexp_of(&separator) {
        regex.split(&s).map(Value::from).collect()
    } else {
        match separator {
            Value::Undefined => vec![Value::String(s.clone())],
            other => {
                let sep = other.to_js_string();
                if sep.is_empty() {
                    s.encode_utf16().map(|unit| from_units(&[unit])).collect()
                } else {
                    s.split(&*sep).map(Value::from).collect()
                }
            }
        }
    };
    Ok(Value::array(parts.into_iter().take(limit).collect()))
}

/// Expand `$&`, `$1`..`$99` and `$$` in a replacement template.
fn expand_template(template: &str, caps: &Captures<'_>) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(caps.get(0).map_or("", |m| m.as_str()));
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::from(d);
                chars.next();
                if let Some(next) = chars.peek().copied().filter(char::is_ascii_digit) {
                    let two: usize = format!("{digits}{next}").parse().unwrap_or(0);
                    if two > 0 && two < caps.len() {
                        digits.push(next);
                        chars.next();
                    }
                }
                let group: usize = digits.parse().unwrap_or(0);
                if group > 0 && group < caps.len() {
                    out.push_str(caps.get(group).map_or("", |m| m.as_str()));
                } else {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn replacement(
    interp: &mut Interp,
    replacer: &Value,
    s: &str,
    caps: &Captures<'_>,
) -> Result<String, Abrupt> {
    if !replacer.is_callable() {
        return Ok(expand_template(&replacer.to_js_string(), caps));
    }
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let mut call_args: Vec<Value> = caps
        .iter()
        .map(|m| m.map_or(Value::Undefined, |m| Value::from(m.as_str())))
        .collect();
    call_args.push(Value::from(byte_to_unit(s, whole.start) as f64));
    call_args.push(Value::from(s));
    Ok(interp.call(replacer, &Value::Undefined, &call_args)?.to_js_string().to_string())
}

fn replace_with(interp: &mut Interp, this: &Value, args: &[Value], all: bool) -> NativeResult {
    let s = this_string(this)?;
    let pattern = arg(args, 0);
    let replacer = arg(args, 1);

    let (regex, global) = match regexp_of(&pattern) {
        Some((regex, global)) => {
            if all && !global {
                return Err(type_error("replaceAll must be called with a global RegExp"));
            }
            (regex, global)
        }
        None => {
            let literal = regex::escape(&pattern.to_js_string());
            let regex = Regex::new(&literal)
                .map_err(|e| throw_error("SyntaxError", e.to_string()))?;
            (Rc::new(regex), all)
        }
    };

    let mut out = String::new();
    let mut last = 0;
    for caps in regex.captures_iter(&s) {
        interp.tick()?;
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        out.push_str(&replacement(interp, &replacer, &s, &caps)?);
        last = whole.end();
        if !global {
            break;
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::from(out))
}

fn replace(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    replace_with(interp, this, args, false)
}

fn replace_all(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    replace_with(interp, this, args, true)
}

/// Match array for one capture set: groups plus `index` and `input`.
fn match_array(s: &str, caps: &Captures<'_>) -> Value {
    let groups = caps
        .iter()
        .map(|m| m.map_or(Value::Undefined, |m| Value::from(m.as_str())))
        .collect();
    let mut object = Object::new(ObjectKind::Array(groups));
    let start = caps.get(0).map_or(0, |m| m.start());
    object.set("index", Value::from(byte_to_unit(s, start) as f64));
    object.set("input", Value::from(s));
    Value::Object(Rc::new(std::cell::RefCell::new(object)))
}

fn match_(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let pattern = arg(args, 0);
    let (regex, global) = match regexp_of(&pattern) {
        Some(found) => found,
        None => {
            let source = pattern.to_js_string();
            (interp.regex(&source, &Rc::from(""))?, false)
        }
    };

    if global {
        let all: Vec<Value> = regex.find_iter(&s).map(|m| Value::from(m.as_str())).collect();
        return Ok(if all.is_empty() { Value::Null } else { Value::array(all) });
    }
    Ok(regex.captures(&s).map_or(Value::Null, |caps| match_array(&s, &caps)))
}

fn repeat(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let count = to_integer(&arg(args, 0));
    if count < 0.0 || count.is_infinite() {
        return Err(throw_error("RangeError", format!("Invalid count value: {count}")));
    }
    if !s.is_empty() {
        interp.string_length(((s.len() as f64) * count).min(usize::MAX as f64) as usize)?;
    }
    Ok(Value::from(s.repeat(count as usize)))
}

fn concat(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let mut out = this_string(this)?.to_string();
    for value in args {
        out.push_str(&value.to_js_string());
        interp.string_length(out.len())?;
    }
    Ok(Value::from(out))
}

fn at(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = units(&this_string(this)?);
    let n = to_integer(&arg(args, 0));
    let index = if n < 0.0 { s.len() as f64 + n } else { n };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(s.get(index as usize).map_or(Value::Undefined, |unit| from_units(&[*unit])))
}

fn locale_compare(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let other = arg(args, 0).to_js_string();
    Ok(Value::Number(match s.cmp(&other) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

pub(crate) fn regexp_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "test" => regexp_test,
        "exec" => regexp_exec,
        "toString" => regexp_to_string,
        _ => return None,
    })
}

fn regexp_ref(this: &Value) -> Result<ObjRef, Abrupt> {
    match this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::RegExp(_)) => Ok(obj.clone()),
        _ => Err(type_error("RegExp method called on incompatible receiver")),
    }
}

fn regexp_to_string(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let obj = regexp_ref(this)?;
    let object = obj.borrow();
    match &object.kind {
        ObjectKind::RegExp(re) => Ok(Value::from(format!("/{}/{}", re.source, re.flags))),
        _ => Ok(Value::Undefined),
    }
}

/// Shared `exec` step; advances `lastIndex` for global expressions.
fn exec(this: &Value, input: &str) -> Result<Option<Value>, Abrupt> {
    let obj = regexp_ref(this)?;
    let mut object = obj.borrow_mut();
    let ObjectKind::RegExp(re) = &mut object.kind else {
        return Ok(None);
    };

    let start = if re.global() { unit_to_byte(input, re.last_index) } else { 0 };
    if re.global() && re.last_index > input.encode_utf16().count() {
        re.last_index = 0;
        return Ok(None);
    }
    match re.regex.captures_at(input, start) {
        Some(caps) => {
            if re.global() {
                let end = caps.get(0).map_or(start, |m| m.end());
                let unit = byte_to_unit(input, end);
                // Empty matches must still make progress
                let empty = caps.get(0).is_some_and(|m| m.is_empty());
                re.last_index = if empty { unit + 1 } else { unit };
            }
            Ok(Some(match_array(input, &caps)))
        }
        None => {
            re.last_index = 0;
            Ok(None)
        }
    }
}

fn regexp_test(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let input = arg(args, 0).to_js_string();
    Ok(Value::Bool(exec(this, &input)?.is_some()))
}

fn regexp_exec(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let input = arg(args, 0).to_js_string();
    Ok(exec(this, &input)?.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use pretty_assertions::assert_eq;

    fn call(func: NativeFnPtr, this: &str, args: &[Value]) -> Value {
        let mut interp = Interp::new(SandboxLimits::default());
        func(&mut interp, &Value::from(this), args).unwrap()
    }

    fn regexp(pattern: &str, flags: &str) -> Value {
        let mut interp = Interp::new(SandboxLimits::default());
        let (pattern, flags): (Rc<str>, Rc<str>) = (Rc::from(pattern), Rc::from(flags));
        let regex = interp.regex(&pattern, &flags).unwrap();
        Value::object(ObjectKind::RegExp(crate::value::RegExpData {
            regex,
            source: pattern,
            flags,
            last_index: 0,
        }))
    }

    #[test]
    fn indices_count_utf16_units() {
        assert_eq!(unit_at("a😀b", 3).as_deref(), Some("b"));
        assert_eq!(call(index_of, "a😀b", &[Value::from("b")]).to_number(), 3.0);
        assert_eq!(call(slice, "hello", &[Value::from(-3.0)]).to_js_string().as_ref(), "llo");
    }

    #[test]
    fn padding_and_substrings() {
        assert_eq!(call(pad_start, "7", &[Value::from(3.0), Value::from("0")]).to_js_string().as_ref(), "007");
        assert_eq!(call(substring, "hello", &[Value::from(4.0), Value::from(1.0)]).to_js_string().as_ref(), "ell");
        assert_eq!(call(substr, "hello", &[Value::from(1.0), Value::from(2.0)]).to_js_string().as_ref(), "el");
    }

    #[test]
    fn oversized_strings_are_range_errors() {
        let mut interp = Interp::new(SandboxLimits::default());
        let huge = pad_start(&mut interp, &Value::from("a"), &[Value::from(1e12)]).unwrap_err();
        assert_eq!(interp.describe_abrupt(&huge), "RangeError: Invalid string length");
        let huge = repeat(&mut interp, &Value::from("ab"), &[Value::from(1e9)]).unwrap_err();
        assert_eq!(interp.describe_abrupt(&huge), "RangeError: Invalid string length");
        assert_eq!(call(repeat, "", &[Value::from(1e9)]).to_js_string().as_ref(), "");
    }

    #[test]
    fn replace_string_pattern_replaces_first_only() {
        let out = call(replace, "a-b-c", &[Value::from("-"), Value::from("+")]);
        assert_eq!(out.to_js_string().as_ref(), "a+b-c");
        let out = call(replace_all, "a-b-c", &[Value::from("-"), Value::from("+")]);
        assert_eq!(out.to_js_string().as_ref(), "a+b+c");
    }

    #[test]
    fn replace_expands_groups() {
        let pattern = regexp(r"(\w+)@(\w+)", "g");
        let out = call(replace, "me@host you@there", &[pattern, Value::from("$2:$1")]);
        assert_eq!(out.to_js_string().as_ref(), "host:me there:you");
    }

    #[test]
    fn split_by_string_and_regex() {
        let parts = call(split, "a, b,c", &[regexp(r",\s*", "")]);
        assert_eq!(parts.to_js_string().as_ref(), "a,b,c");
        let parts = call(split, "abc", &[Value::from("")]);
        assert_eq!(parts.array_items().unwrap().len(), 3);
    }

    #[test]
    fn global_exec_advances_last_index() {
        let mut interp = Interp::new(SandboxLimits::default());
        let re = regexp(r"\d", "g");
        let first = regexp_exec(&mut interp, &re, &[Value::from("a1b2")]).unwrap();
        assert_eq!(first.to_js_string().as_ref(), "1");
        let second = regexp_exec(&mut interp, &re, &[Value::from("a1b2")]).unwrap();
        assert_eq!(second.to_js_string().as_ref(), "2");
        let done = regexp_exec(&mut interp, &re, &[Value::from("a1b2")]).unwrap();
        assert!(matches!(done, Value::Null));
    }
}
