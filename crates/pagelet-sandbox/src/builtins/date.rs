//! `Date`.
//!
//! A date is a time value in milliseconds since the epoch. The sandbox has no
//! host time zone: local time is UTC, so `getHours` and `getUTCHours` agree
//! and `getTimezoneOffset` is 0. `new Date()` reads the virtual clock.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::interp::{throw_error, to_numeric, type_error, Abrupt, Interp};
use crate::value::{NativeFnPtr, ObjectKind, Value};

use super::{arg, native_with_statics};

type NativeResult = Result<Value, Abrupt>;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Largest time value a date can hold, in either direction.
const MAX_TIME: f64 = 8.64e15;

pub(crate) fn constructor() -> Value {
    native_with_statics(
        "Date",
        date_constructor,
        vec![
            ("now", Value::native("now", |interp, _, _| Ok(Value::Number(interp.date_now().floor())))),
            ("parse", Value::native("parse", |_, _, args| Ok(Value::Number(parse(&arg(args, 0).to_js_string()))))),
            ("UTC", Value::native("UTC", |_, _, args| Ok(Value::Number(from_fields(args))))),
        ],
    )
}

fn date_constructor(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let time = match args {
        [] => interp.date_now().floor(),
        [Value::String(s)] => parse(s),
        [Value::Object(obj)] => match &obj.borrow().kind {
            ObjectKind::Date(time) => *time,
            _ => time_clip(to_numeric(&args[0])),
        },
        [value] => time_clip(to_numeric(value)),
        fields => from_fields(fields),
    };
    Ok(Value::object(ObjectKind::Date(time)))
}

pub(crate) fn method(key: &str) -> Option<NativeFnPtr> {
    let method: NativeFnPtr = match key {
        "getTime" | "valueOf" => get_time,
        "getFullYear" | "getUTCFullYear" => |_, this, _| component(this, |dt| f64::from(dt.year())),
        "getMonth" | "getUTCMonth" => |_, this, _| component(this, |dt| f64::from(dt.month0())),
        "getDate" | "getUTCDate" => |_, this, _| component(this, |dt| f64::from(dt.day())),
        "getDay" | "getUTCDay" => |_, this, _| component(this, |dt| f64::from(dt.weekday().num_days_from_sunday())),
        "getHours" | "getUTCHours" => |_, this, _| component(this, |dt| f64::from(dt.hour())),
        "getMinutes" | "getUTCMinutes" => |_, this, _| component(this, |dt| f64::from(dt.minute())),
        "getSeconds" | "getUTCSeconds" => |_, this, _| component(this, |dt| f64::from(dt.second())),
        "getMilliseconds" | "getUTCMilliseconds" => {
            |_, this, _| component(this, |dt| f64::from(dt.timestamp_subsec_millis()))
        }
        "getTimezoneOffset" => |_, this, _| component(this, |_| 0.0),
        "setTime" => set_time,
        "setFullYear" | "setUTCFullYear" => |_, this, args| set_fields(this, args, 0, 3),
        "setMonth" | "setUTCMonth" => |_, this, args| set_fields(this, args, 1, 2),
        "setDate" | "setUTCDate" => |_, this, args| set_fields(this, args, 2, 1),
        "setHours" | "setUTCHours" => |_, this, args| set_fields(this, args, 3, 4),
        "setMinutes" | "setUTCMinutes" => |_, this, args| set_fields(this, args, 4, 3),
        "setSeconds" | "setUTCSeconds" => |_, this, args| set_fields(this, args, 5, 2),
        "setMilliseconds" | "setUTCMilliseconds" => |_, this, args| set_fields(this, args, 6, 1),
        "toISOString" => to_iso_string,
        "toJSON" => |_, this, _| Ok(iso_string(time_of(this)?).map_or(Value::Null, Value::from)),
        "toString" => |_, this, _| format(this, "%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)"),
        "toDateString" => |_, this, _| format(this, "%a %b %d %Y"),
        "toTimeString" => |_, this, _| format(this, "%H:%M:%S GMT+0000 (Coordinated Universal Time)"),
        "toUTCString" | "toGMTString" => |_, this, _| format(this, "%a, %d %b %Y %H:%M:%S GMT"),
        "toLocaleDateString" => |_, this, _| format(this, "%-m/%-d/%Y"),
        "toLocaleTimeString" => |_, this, _| format(this, "%-I:%M:%S %p"),
        "toLocaleString" => |_, this, _| format(this, "%-m/%-d/%Y, %-I:%M:%S %p"),
        _ => return None,
    };
    Some(method)
}

fn time_of(this: &Value) -> Result<f64, Abrupt> {
    match this {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Date(time) => Ok(*time),
            _ => Err(type_error("this is not a Date object.")),
        },
        _ => Err(type_error("this is not a Date object.")),
    }
}

fn store(this: &Value, time: f64) -> NativeResult {
    if let Value::Object(obj) = this {
        if let ObjectKind::Date(slot) = &mut obj.borrow_mut().kind {
            *slot = time;
        }
    }
    Ok(Value::Number(time))
}

fn date_time(time: f64) -> Option<DateTime<Utc>> {
    if time.is_nan() {
        return None;
    }
    DateTime::from_timestamp_millis(time as i64)
}

fn get_time(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::Number(time_of(this)?))
}

fn component(this: &Value, f: impl FnOnce(&DateTime<Utc>) -> f64) -> NativeResult {
    Ok(Value::Number(date_time(time_of(this)?).map_or(f64::NAN, |dt| f(&dt))))
}

fn set_time(_: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    time_of(this)?;
    store(this, time_clip(to_numeric(&arg(args, 0))))
}

/// Overwrite up to `count` of the seven date fields starting at `first`.
fn set_fields(this: &Value, args: &[Value], first: usize, count: usize) -> NativeResult {
    let time = time_of(this)?;
    let base = match date_time(time) {
        Some(dt) => dt,
        // Only `setFullYear` revives an invalid date, from +0
        None if first == 0 => DateTime::default(),
        None => return Ok(Value::Number(f64::NAN)),
    };
    if args.is_empty() {
        return store(this, f64::NAN);
    }
    let mut fields = [
        f64::from(base.year()),
        f64::from(base.month0()),
        f64::from(base.day()),
        f64::from(base.hour()),
        f64::from(base.minute()),
        f64::from(base.second()),
        f64::from(base.timestamp_subsec_millis()),
    ];
    for (slot, value) in fields[first..].iter_mut().zip(args.iter().take(count)) {
        *slot = to_numeric(value);
    }
    store(this, make_date(&fields))
}

/// `Date.UTC` and the multi-argument constructor: year, month, then optional fields.
fn from_fields(args: &[Value]) -> f64 {
    let mut fields = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (slot, value) in fields.iter_mut().zip(args) {
        *slot = to_numeric(value);
    }
    let year = fields[0].trunc();
    if (0.0..=99.0).contains(&year) {
        fields[0] = 1900.0 + year;
    }
    make_date(&fields)
}

/// MakeDate(MakeDay(year, month, day), MakeTime(h, m, s, ms)), clipped.
fn make_date(fields: &[f64; 7]) -> f64 {
    if fields.iter().any(|f| !f.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = fields.map(f64::trunc);
    let year = year + (month / 12.0).floor();
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let month = month.rem_euclid(12.0) as u32 + 1;
    let Some(first) = NaiveDate::from_ymd_opt(year as i32, month, 1) else {
        return f64::NAN;
    };
    let first_ms = first.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis() as f64;
    let time = hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1000.0 + millis;
    time_clip(first_ms + (day - 1.0) * MS_PER_DAY + time)
}

fn time_clip(time: f64) -> f64 {
    if !time.is_finite() || time.abs() > MAX_TIME {
        f64::NAN
    } else {
        time.trunc() + 0.0
    }
}

/// Parse the formats `Date` itself produces, plus common ISO variants.
/// Date-only ISO forms are UTC midnight, matching browsers.
fn parse(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    let naive = text.strip_suffix('Z').unwrap_or(text);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return time_clip(dt.and_utc().timestamp_millis() as f64);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return time_clip(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis() as f64);
    }
    // `toString` output: "Tue Mar 05 2024 14:30:00 GMT+0000 (...)"
    let display = text.split(" (").next().unwrap_or(text);
    if let Ok(dt) = DateTime::parse_from_str(display, "%a %b %d %Y %H:%M:%S GMT%z") {
        return time_clip(dt.timestamp_millis() as f64);
    }
    f64::NAN
}

/// `toISOString`, or `None` for an invalid date.
pub(crate) fn iso_string(time: f64) -> Option<String> {
    let dt = date_time(time)?;
    Some(if (0..=9999).contains(&dt.year()) {
        dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    } else {
        format!("{:+07}{}", dt.year(), dt.format("-%m-%dT%H:%M:%S%.3fZ"))
    })
}

/// `String(date)`
pub(crate) fn to_display_string(time: f64) -> String {
    match date_time(time) {
        Some(dt) => dt.format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)").to_string(),
        None => "Invalid Date".to_string(),
    }
}

fn to_iso_string(_: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    iso_string(time_of(this)?)
        .map(Value::from)
        .ok_or_else(|| throw_error("RangeError", "Invalid time value"))
}

fn format(this: &Value, pattern: &str) -> NativeResult {
    Ok(Value::from(match date_time(time_of(this)?) {
        Some(dt) => dt.format(pattern).to_string(),
        None => "Invalid Date".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecuteOptions, SandboxLimits};
    use crate::executor::SandboxExecutor;
    use pretty_assertions::assert_eq;

    fn run(code: &str) -> String {
        let execution = SandboxExecutor::default().invoke(code, &[], Vec::new()).unwrap();
        execution.element().to_js_string().to_string()
    }

    #[test]
    fn fields_overflow_into_the_next_unit() {
        assert_eq!(from_fields(&[Value::from(2024.0), Value::from(0.0), Value::from(32.0)]), 1_706_745_600_000.0);
        assert_eq!(from_fields(&[Value::from(2023.0), Value::from(12.0)]), 1_704_067_200_000.0);
        assert_eq!(from_fields(&[Value::from(99.0), Value::from(0.0)]), 915_148_800_000.0);
        assert!(from_fields(&[Value::from(f64::NAN), Value::from(0.0)]).is_nan());
    }

    #[test]
    fn parses_its_own_output() {
        assert_eq!(parse("2024-03-05"), 1_709_596_800_000.0);
        assert_eq!(parse("2024-03-05T14:30:00.250Z"), 1_709_649_000_250.0);
        assert_eq!(parse("2024-03-05T16:30:00+02:00"), 1_709_649_000_000.0);
        assert_eq!(parse("Tue, 05 Mar 2024 14:30:00 GMT"), 1_709_649_000_000.0);
        assert_eq!(parse(&to_display_string(1_709_649_000_000.0)), 1_709_649_000_000.0);
        assert!(parse("next tuesday").is_nan());
    }

    #[test]
    fn getters_and_formatting() {
        let code = r#"
            const d = new Date(2024, 2, 5, 14, 30, 15, 250);
            return [
              d.getFullYear(), d.getMonth(), d.getDate(), d.getDay(),
              d.getHours(), d.getMinutes(), d.getSeconds(), d.getMilliseconds(),
              d.toISOString(), d.toDateString(), d.toLocaleDateString(), d.toLocaleTimeString(),
              JSON.stringify({ at: d }),
            ].join("|");
        "#;
        assert_eq!(
            run(code),
            "2024|2|5|2|14|30|15|250|2024-03-05T14:30:15.250Z|Tue Mar 05 2024|3/5/2024|2:30:15 PM|{\"at\":\"2024-03-05T14:30:15.250Z\"}"
        );
    }

    #[test]
    fn setters_normalize_and_return_the_time() {
        let code = r#"
            const d = new Date(Date.UTC(2024, 0, 31));
            d.setMonth(1);
            const march = d.getMonth();
            d.setDate(0);
            const lastOfFeb = d.getDate();
            const time = d.setHours(25);
            return [march, lastOfFeb, time === d.getTime(), d.getDate(), d.getHours()].join();
        "#;
        assert_eq!(run(code), "2,29,true,1,1");
    }

    #[test]
    fn arithmetic_and_comparison_use_the_time_value() {
        let code = r#"
            const a = new Date("2024-01-01T00:00:00Z");
            const b = new Date(a.getTime() + 90 * 60 * 1000);
            return [b - a, a < b, +a === a.valueOf(), typeof (a + ""), b instanceof Date].join();
        "#;
        assert_eq!(run(code), "5400000,true,true,string,true");
    }

    #[test]
    fn invalid_dates() {
        let code = r#"
            const d = new Date("garbage");
            let error = "";
            try { d.toISOString(); } catch (e) { error = e.name; }
            return [String(d), isNaN(d.getTime()), d.getFullYear(), error, JSON.stringify(d)].join();
        "#;
        assert_eq!(run(code), "Invalid Date,true,NaN,RangeError,null");
    }

    #[test]
    fn new_date_reads_the_virtual_clock() {
        let executor = SandboxExecutor::new(SandboxLimits::default(), ExecuteOptions::default());
        let mut execution = executor
            .invoke(
                "const start = new Date(); const box = {}; setTimeout(() => { box.elapsed = new Date() - start; }, 1500); return box;",
                &[],
                Vec::new(),
            )
            .unwrap();
        execution.advance_time(1500).unwrap();
        let element = execution.element().clone();
        let elapsed = execution.interp.get(&element, "elapsed").unwrap();
        assert_eq!(elapsed.to_number(), 1500.0);
    }
}
