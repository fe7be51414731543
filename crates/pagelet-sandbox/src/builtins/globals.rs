//! Global functions and namespaces: `Math`, `console`, timers, errors.

use tracing::{debug, error, info, warn};

use crate::host::{HostEvent, LogLevel};
use crate::interp::{error_value, throw_error, to_numeric, type_error, Abrupt, Interp, TimerCallback};
use crate::value::Value;

use super::{arg, namespace, to_integer};

type NativeResult = Result<Value, Abrupt>;

pub(crate) fn boolean_constructor() -> Value {
    Value::native("Boolean", |_, _, args| Ok(Value::Bool(arg(args, 0).truthy())))
}

/// `Error`, `TypeError` and friends, callable with or without `new`.
pub(crate) fn error_constructor(name: &'static str) -> Value {
    Value::native(name, move |_, _, args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            other => other.to_js_string().to_string(),
        };
        Ok(error_value(name, message))
    })
}

pub(crate) fn console() -> Value {
    namespace(&[
        ("log", console_log),
        ("info", console_info),
        ("debug", console_debug),
        ("warn", console_warn),
        ("error", console_error),
    ])
}

fn console_log(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    log(interp, LogLevel::Info, args)
}

fn console_info(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    log(interp, LogLevel::Info, args)
}

fn console_debug(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    log(interp, LogLevel::Debug, args)
}

fn console_warn(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    log(interp, LogLevel::Warn, args)
}

fn console_error(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    log(interp, LogLevel::Error, args)
}

fn log(interp: &mut Interp, level: LogLevel, args: &[Value]) -> NativeResult {
    let message = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.to_string(),
            other => interp.describe_thrown(other),
        })
        .collect::<Vec<_>>()
        .join(" ");

    match level {
        LogLevel::Debug => debug!(target: "pagelet::console", "{}", message),
        LogLevel::Info => info!(target: "pagelet::console", "{}", message),
        LogLevel::Warn => warn!(target: "pagelet::console", "{}", message),
        LogLevel::Error => error!(target: "pagelet::console", "{}", message),
    }
    interp.record(HostEvent::Log { level, message });
    Ok(Value::Undefined)
}

pub(crate) fn parse_int(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let text = arg(args, 0).to_js_string();
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if s.starts_with(['-', '+']) {
        s = &s[1..];
    }

    let mut radix = match arg(args, 1) {
        Value::Undefined => 10,
        other => to_integer(&other) as u32,
    };
    if radix == 0 {
        radix = 10;
    }
    if (radix == 16 || matches!(arg(args, 1), Value::Undefined))
        && (s.starts_with("0x") || s.starts_with("0X"))
    {
        s = &s[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    Ok(Value::Number(if negative { -value } else { value }))
}

pub(crate) fn parse_float(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let text = arg(args, 0).to_js_string();
    let s = text.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return Ok(Value::Number(f64::INFINITY));
        }
    }
    if s.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }

    // Longest prefix that parses as a decimal literal
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'0'..=b'9' => {
                seen_digit = true;
                end = i + 1;
            }
            b'+' | b'-' if i == 0 || matches!(bytes[i - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        i += 1;
    }
    if !seen_digit {
        return Ok(Value::Number(f64::NAN));
    }
    let mut candidate = &s[..end];
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return Ok(Value::Number(n));
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    Ok(Value::Number(f64::NAN))
}

pub(crate) fn is_nan(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    Ok(Value::Bool(to_numeric(&arg(args, 0)).is_nan()))
}

pub(crate) fn is_finite(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    Ok(Value::Bool(to_numeric(&arg(args, 0)).is_finite()))
}

/// `encodeURIComponent`: UTF-8 percent-encoding of everything but the unreserved marks.
pub(crate) fn encode_uri_component(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let text = arg(args, 0).to_js_string();
    let mut out = String::with_capacity(text.len());
    let mut buf = [0; 4];
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    interp.string_length(out.len())?;
    Ok(Value::from(out))
}

/// `decodeURIComponent`; a stray `%` or invalid UTF-8 is a `URIError`.
pub(crate) fn decode_uri_component(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let text = arg(args, 0).to_js_string();
    let bytes = text.as_bytes();
    let escapes_valid = bytes.iter().enumerate().filter(|(_, b)| **b == b'%').all(|(i, _)| {
        bytes.get(i + 1..i + 3).is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    let malformed = || throw_error("URIError", "URI malformed");
    if !escapes_valid {
        return Err(malformed());
    }
    let decoded = urlencoding::decode(&text).map_err(|_| malformed())?;
    Ok(Value::from(decoded.into_owned()))
}

fn timer(interp: &mut Interp, args: &[Value], repeat: bool) -> NativeResult {
    let func = arg(args, 0);
    if !func.is_callable() {
        return Err(type_error("Timer callback must be a function"));
    }
    let delay = to_integer(&arg(args, 1)).max(0.0) as u64;
    let extra = args.get(2..).unwrap_or_default().to_vec();
    let id = interp.schedule(
        delay,
        TimerCallback::Script { func, args: extra },
        repeat.then_some(delay),
    );
    Ok(Value::Number(id as f64))
}

pub(crate) fn set_timeout(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    timer(interp, args, false)
}

pub(crate) fn set_interval(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    timer(interp, args, true)
}

pub(crate) fn clear_timer(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    if let Value::Number(id) = arg(args, 0) {
        interp.cancel_timer(id as u64);
    }
    Ok(Value::Undefined)
}

/// `__helpers`, the intrinsic the async lowering targets.
pub(crate) fn helpers() -> Value {
    namespace(&[("asyncToGenerator", async_to_generator)])
}

/// Wrap a lowered async body; calling the result starts it and returns its promise.
fn async_to_generator(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let generator = arg(args, 0);
    Ok(Value::native("async", move |interp: &mut Interp, this: &Value, _: &[Value]| {
        interp.spawn_async(&generator, this)
    }))
}

pub(crate) fn math() -> Value {
    let math = namespace(&[
        ("abs", |_, _, a| unary(a, f64::abs)),
        ("floor", |_, _, a| unary(a, f64::floor)),
        ("ceil", |_, _, a| unary(a, f64::ceil)),
        ("round", |_, _, a| unary(a, |x| (x + 0.5).floor())),
        ("trunc", |_, _, a| unary(a, f64::trunc)),
        ("sign", |_, _, a| {
            unary(a, |x| if x.is_nan() || x == 0.0 { x } else { x.signum() })
        }),
        ("sqrt", |_, _, a| unary(a, f64::sqrt)),
        ("cbrt", |_, _, a| unary(a, f64::cbrt)),
        ("sin", |_, _, a| unary(a, f64::sin)),
        ("cos", |_, _, a| unary(a, f64::cos)),
        ("tan", |_, _, a| unary(a, f64::tan)),
        ("asin", |_, _, a| unary(a, f64::asin)),
        ("acos", |_, _, a| unary(a, f64::acos)),
        ("atan", |_, _, a| unary(a, f64::atan)),
        ("exp", |_, _, a| unary(a, f64::exp)),
        ("log", |_, _, a| unary(a, f64::ln)),
        ("log2", |_, _, a| unary(a, f64::log2)),
        ("log10", |_, _, a| unary(a, f64::log10)),
        ("atan2", |_, _, a| {
            Ok(Value::Number(to_numeric(&arg(a, 0)).atan2(to_numeric(&arg(a, 1)))))
        }),
        ("pow", |_, _, a| {
            Ok(Value::Number(to_numeric(&arg(a, 0)).powf(to_numeric(&arg(a, 1)))))
        }),
        ("max", |_, _, a| Ok(Value::Number(fold(a, f64::NEG_INFINITY, f64::max)))),
        ("min", |_, _, a| Ok(Value::Number(fold(a, f64::INFINITY, f64::min)))),
        ("hypot", |_, _, a| {
            Ok(Value::Number(a.iter().map(|v| to_numeric(v).powi(2)).sum::<f64>().sqrt()))
        }),
        ("random", |interp, _, _| Ok(Value::Number(interp.random()))),
    ]);
    if let Value::Object(obj) = &math {
        let mut object = obj.borrow_mut();
        object.set("PI", Value::Number(std::f64::consts::PI));
        object.set("E", Value::Number(std::f64::consts::E));
        object.set("LN2", Value::Number(std::f64::consts::LN_2));
        object.set("LN10", Value::Number(std::f64::consts::LN_10));
        object.set("SQRT2", Value::Number(std::f64::consts::SQRT_2));
    }
    math
}

fn unary(args: &[Value], f: fn(f64) -> f64) -> NativeResult {
    Ok(Value::Number(f(to_numeric(&arg(args, 0)))))
}

/// `Math.max`/`Math.min`: any NaN argument makes the result NaN.
fn fold(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for value in args {
        let n = to_numeric(value);
        if n.is_nan() {
            return f64::NAN;
        }
        acc = f(acc, n);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;

    fn call(func: fn(&mut Interp, &Value, &[Value]) -> NativeResult, args: &[Value]) -> Value {
        let mut interp = Interp::new(SandboxLimits::default());
        func(&mut interp, &Value::Undefined, args).unwrap()
    }

    #[test]
    fn parse_int_handles_prefixes_and_radix() {
        assert_eq!(call(parse_int, &[Value::from("42px")]).to_number(), 42.0);
        assert_eq!(call(parse_int, &[Value::from("  -0x1f")]).to_number(), -31.0);
        assert_eq!(call(parse_int, &[Value::from("101"), Value::from(2.0)]).to_number(), 5.0);
        assert!(call(parse_int, &[Value::from("px")]).to_number().is_nan());
    }

    #[test]
    fn parse_float_takes_longest_prefix() {
        assert_eq!(call(parse_float, &[Value::from("3.25rem")]).to_number(), 3.25);
        assert_eq!(call(parse_float, &[Value::from("1e3x")]).to_number(), 1000.0);
        assert_eq!(call(parse_float, &[Value::from("-.5")]).to_number(), -0.5);
        assert!(call(parse_float, &[Value::from(".")]).to_number().is_nan());
    }

    #[test]
    fn uri_components_round_trip() {
        let encoded = call(encode_uri_component, &[Value::from("a b&c=ü/€!'()*")]);
        assert_eq!(&*encoded.to_js_string(), "a%20b%26c%3D%C3%BC%2F%E2%82%AC!'()*");
        let decoded = call(decode_uri_component, &[encoded]);
        assert_eq!(&*decoded.to_js_string(), "a b&c=ü/€!'()*");
        assert_eq!(&*call(decode_uri_component, &[Value::from("a+b%2B")]).to_js_string(), "a+b+");
    }

    #[test]
    fn malformed_escapes_are_uri_errors() {
        let mut interp = Interp::new(SandboxLimits::default());
        for input in ["%", "%E0%A4%A", "%zz", "%C3"] {
            let err = decode_uri_component(&mut interp, &Value::Undefined, &[Value::from(input)]).unwrap_err();
            assert_eq!(interp.describe_abrupt(&err), "URIError: URI malformed", "{input}");
        }
    }

    #[test]
    fn console_records_log_events() {
        let mut interp = Interp::new(SandboxLimits::default());
        console_warn(&mut interp, &Value::Undefined, &[Value::from("low"), Value::from(3.0)]).unwrap();
        assert_eq!(
            interp.take_host_events(),
            vec![HostEvent::Log { level: LogLevel::Warn, message: "low 3".to_string() }]
        );
    }

    #[test]
    fn math_max_of_nothing_is_negative_infinity() {
        assert_eq!(fold(&[], f64::NEG_INFINITY, f64::max), f64::NEG_INFINITY);
        assert!(fold(&[Value::from("x")], f64::NEG_INFINITY, f64::max).is_nan());
    }
}
