//! Native modules: `StyleSheet`, `Alert`, `Keyboard`, `Platform`,
//! `Dimensions`, `Linking`, `Animated` and `Easing`.
//!
//! Animations run on the interpreter's virtual clock. Starting one schedules
//! a frame timer every [`FRAME_MS`] that writes the animated value and marks
//! the mount dirty.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::builtins::json::number_json;
use crate::builtins::{arg, namespace, promise};
use crate::config::ExecuteOptions;
use crate::host::HostEvent;
use crate::interp::{own_entries, to_numeric, type_error, Abrupt, Interp, TimerCallback};
use crate::value::{Interpolation, InterpolationStop, NativeFnPtr, ObjRef, ObjectKind, Value};

type NativeResult = Result<Value, Abrupt>;

/// Virtual milliseconds between animation frames.
pub(crate) const FRAME_MS: f64 = 16.0;

/// Default `Animated.timing` duration.
const DEFAULT_DURATION: f64 = 500.0;

/// Fixed duration of a simulated spring.
const SPRING_MS: f64 = 600.0;

/// A host component such as `View`.
pub(crate) fn host_component(name: &'static str) -> Value {
    Value::object(ObjectKind::Host(name))
}

// StyleSheet

pub(crate) fn style_sheet() -> Value {
    let sheet = namespace(&[
        ("create", |_, _, args| Ok(arg(args, 0))),
        ("flatten", |_, _, args| Ok(flatten_style(&arg(args, 0)))),
        ("compose", |_, _, args| Ok(Value::array(vec![arg(args, 0), arg(args, 1)]))),
    ]);
    if let Value::Object(obj) = &sheet {
        let mut object = obj.borrow_mut();
        object.set("hairlineWidth", Value::Number(1.0));
        object.set("absoluteFill", absolute_fill());
        object.set("absoluteFillObject", absolute_fill());
    }
    sheet
}

fn absolute_fill() -> Value {
    Value::plain(vec![
        ("position", Value::from("absolute")),
        ("left", Value::Number(0.0)),
        ("right", Value::Number(0.0)),
        ("top", Value::Number(0.0)),
        ("bottom", Value::Number(0.0)),
    ])
}

/// Merge a style or nested style arrays into one object; later wins.
pub(crate) fn flatten_style(style: &Value) -> Value {
    let out = Value::plain(Vec::new());
    merge_style(&out, style);
    out
}

fn merge_style(out: &Value, style: &Value) {
    if let Some(items) = style.array_items() {
        for item in &items {
            merge_style(out, item);
        }
        return;
    }
    if !matches!(style, Value::Object(_)) {
        return;
    }
    if let Value::Object(target) = out {
        let mut object = target.borrow_mut();
        for (key, value) in own_entries(style) {
            object.set(key, value);
        }
    }
}

// Alert, Keyboard, Linking

pub(crate) fn alert() -> Value {
    namespace(&[("alert", alert_alert)])
}

fn alert_alert(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let text = |value: Value| if value.is_nullish() { String::new() } else { value.to_js_string().to_string() };
    let mut buttons = Vec::new();
    for button in arg(args, 2).array_items().unwrap_or_default() {
        buttons.push(text(interp.get(&button, "text")?));
    }
    interp.record(HostEvent::Alert {
        title: text(arg(args, 0)),
        message: text(arg(args, 1)),
        buttons,
    });
    Ok(Value::Undefined)
}

/// `{ remove() {} }`, returned by listener registrations.
fn subscription() -> Value {
    namespace(&[("remove", |_, _, _| Ok(Value::Undefined))])
}

pub(crate) fn keyboard() -> Value {
    namespace(&[
        ("dismiss", |interp, _, _| {
            interp.record(HostEvent::KeyboardDismiss);
            Ok(Value::Undefined)
        }),
        ("addListener", |_, _, _| Ok(subscription())),
    ])
}

pub(crate) fn linking() -> Value {
    namespace(&[
        ("openURL", |interp, _, args| {
            let url = arg(args, 0).to_js_string().to_string();
            interp.record(HostEvent::OpenUrl { url });
            Ok(Value::Object(promise::to_promise(interp, Value::Bool(true))?))
        }),
        ("canOpenURL", |interp, _, _| Ok(Value::Object(promise::to_promise(interp, Value::Bool(true))?))),
    ])
}

// Platform, Dimensions

pub(crate) fn platform() -> Value {
    let platform = namespace(&[("select", platform_select)]);
    if let Value::Object(obj) = &platform {
        let mut object = obj.borrow_mut();
        object.set("OS", Value::from("web"));
        object.set("Version", Value::Number(0.0));
    }
    platform
}

fn platform_select(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let options = arg(args, 0);
    if options.is_nullish() {
        return Ok(Value::Undefined);
    }
    for key in ["web", "default"] {
        let value = interp.get(&options, key)?;
        if !matches!(value, Value::Undefined) {
            return Ok(value);
        }
    }
    Ok(Value::Undefined)
}

pub(crate) fn dimensions(options: &ExecuteOptions) -> Value {
    let window = options.window;
    let size = move || {
        Value::plain(vec![
            ("width", Value::Number(window.width)),
            ("height", Value::Number(window.height)),
            ("scale", Value::Number(1.0)),
            ("fontScale", Value::Number(1.0)),
        ])
    };
    Value::plain(vec![
        ("get", Value::native("get", move |_, _, _| Ok(size()))),
        ("addEventListener", Value::native("addEventListener", |_, _, _| Ok(subscription()))),
    ])
}

// Easing

pub(crate) fn easing() -> Value {
    namespace(&[
        ("linear", |_, _, a| unit(a, |t| t)),
        ("ease", |_, _, a| unit(a, ease)),
        ("quad", |_, _, a| unit(a, |t| t * t)),
        ("cubic", |_, _, a| unit(a, |t| t * t * t)),
        ("sin", |_, _, a| unit(a, |t| 1.0 - (t * std::f64::consts::FRAC_PI_2).cos())),
        ("circle", |_, _, a| unit(a, |t| 1.0 - (1.0 - t * t).max(0.0).sqrt())),
        ("exp", |_, _, a| unit(a, |t| 2f64.powf(10.0 * (t - 1.0)))),
        ("bounce", |_, _, a| unit(a, bounce)),
        ("bezier", |_, _, _| Ok(Value::native("ease", |_, _, a| unit(a, ease)))),
        ("poly", easing_poly),
        ("in", |_, _, args| Ok(arg(args, 0))),
        ("out", easing_out),
        ("inOut", easing_in_out),
    ])
}

fn unit(args: &[Value], f: fn(f64) -> f64) -> NativeResult {
    Ok(Value::Number(f(to_numeric(&arg(args, 0)))))
}

/// Cubic approximation of CSS `ease`.
fn ease(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn bounce(t: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;
    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984375
    }
}

fn easing_poly(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let n = to_numeric(&arg(args, 0));
    Ok(Value::native("poly", move |_, _, a| Ok(Value::Number(to_numeric(&arg(a, 0)).powf(n)))))
}

fn easing_out(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let f = arg(args, 0);
    Ok(Value::native("out", move |interp: &mut Interp, _: &Value, a: &[Value]| {
        let t = to_numeric(&arg(a, 0));
        let y = to_numeric(&interp.call(&f, &Value::Undefined, &[Value::Number(1.0 - t)])?);
        Ok(Value::Number(1.0 - y))
    }))
}

fn easing_in_out(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let f = arg(args, 0);
    Ok(Value::native("inOut", move |interp: &mut Interp, _: &Value, a: &[Value]| {
        let t = to_numeric(&arg(a, 0));
        if t < 0.5 {
            let y = to_numeric(&interp.call(&f, &Value::Undefined, &[Value::Number(t * 2.0)])?);
            Ok(Value::Number(y / 2.0))
        } else {
            let y = to_numeric(&interp.call(&f, &Value::Undefined, &[Value::Number((1.0 - t) * 2.0)])?);
            Ok(Value::Number(1.0 - y / 2.0))
        }
    }))
}

// Animated

/// A composed animation, started with `.start()`.
pub struct AnimationPlan {
    kind: PlanKind,
    /// Timers scheduled by the latest `start`, for `stop`
    timers: RefCell<Vec<u64>>,
    /// Values as they were when the latest `start` ran, for `reset`
    initial: RefCell<Vec<(ObjRef, f64)>>,
}

enum PlanKind {
    Timing {
        value: ObjRef,
        to: f64,
        duration: f64,
        delay: f64,
        easing: Option<Value>,
    },
    Spring { value: ObjRef, to: f64 },
    Delay(f64),
    Sequence(Vec<Rc<AnimationPlan>>),
    Parallel(Vec<Rc<AnimationPlan>>),
    /// `iterations: None` repeats forever
    Loop { body: Rc<AnimationPlan>, iterations: Option<u32> },
}

impl AnimationPlan {
    fn new(kind: PlanKind) -> Value {
        Value::object(ObjectKind::Animation(Self::shared(kind)))
    }

    fn shared(kind: PlanKind) -> Rc<Self> {
        Rc::new(Self {
            kind,
            timers: RefCell::new(Vec::new()),
            initial: RefCell::new(Vec::new()),
        })
    }
}

/// Values each animated value will hold once already-scheduled steps finish.
#[derive(Clone, Default)]
struct Projection(Vec<(ObjRef, f64)>);

impl Projection {
    fn get(&self, value: &ObjRef) -> f64 {
        self.0
            .iter()
            .rev()
            .find(|(obj, _)| Rc::ptr_eq(obj, value))
            .map(|(_, n)| *n)
            .unwrap_or_else(|| animated_number(value))
    }

    fn set(&mut self, value: &ObjRef, n: f64) {
        self.0.push((value.clone(), n));
    }
}

fn animated_number(value: &ObjRef) -> f64 {
    match value.borrow().kind {
        ObjectKind::AnimatedValue(n) => n,
        _ => f64::NAN,
    }
}

/// Write an animated value and mark the mount for re-render.
fn write_animated(interp: &mut Interp, value: &ObjRef, n: f64) {
    if let ObjectKind::AnimatedValue(current) = &mut value.borrow_mut().kind {
        *current = n;
    }
    interp.dirty.set(true);
}

pub(crate) fn animated() -> Value {
    Value::plain(vec![
        ("Value", Value::native("Value", animated_value)),
        ("timing", Value::native("timing", animated_timing)),
        ("spring", Value::native("spring", animated_spring)),
        ("delay", Value::native("delay", |_, _, args| {
            Ok(AnimationPlan::new(PlanKind::Delay(to_numeric(&arg(args, 0)).max(0.0))))
        })),
        ("sequence", Value::native("sequence", |_, _, args| {
            Ok(AnimationPlan::new(PlanKind::Sequence(plans(&arg(args, 0))?)))
        })),
        ("parallel", Value::native("parallel", |_, _, args| {
            Ok(AnimationPlan::new(PlanKind::Parallel(plans(&arg(args, 0))?)))
        })),
        ("stagger", Value::native("stagger", animated_stagger)),
        ("loop", Value::native("loop", animated_loop)),
        ("event", Value::native("event", |_, _, _| Ok(Value::native("event", |_, _, _| Ok(Value::Undefined))))),
        ("View", host_component("Animated.View")),
        ("Text", host_component("Animated.Text")),
        ("Image", host_component("Animated.Image")),
        ("ScrollView", host_component("Animated.ScrollView")),
    ])
}

fn animated_value(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let initial = match arg(args, 0) {
        Value::Undefined => 0.0,
        other => to_numeric(&other),
    };
    Ok(Value::object(ObjectKind::AnimatedValue(initial)))
}

fn expect_animated(value: &Value, what: &str) -> Result<ObjRef, Abrupt> {
    match value {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::AnimatedValue(_)) => Ok(obj.clone()),
        _ => Err(type_error(format!("{what} expects an Animated.Value"))),
    }
}

fn plan_of(value: &Value) -> Result<Rc<AnimationPlan>, Abrupt> {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Animation(plan) => Ok(plan.clone()),
            _ => Err(type_error("Expected an animation")),
        },
        _ => Err(type_error("Expected an animation")),
    }
}

fn plans(list: &Value) -> Result<Vec<Rc<AnimationPlan>>, Abrupt> {
    list.array_items()
        .ok_or_else(|| type_error("Expected an array of animations"))?
        .iter()
        .map(plan_of)
        .collect()
}

fn config_number(interp: &mut Interp, config: &Value, key: &str, default: f64) -> Result<f64, Abrupt> {
    if config.is_nullish() {
        return Ok(default);
    }
    Ok(match interp.get(config, key)? {
        Value::Undefined => default,
        other => to_numeric(&other),
    })
}

fn animated_timing(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let value = expect_animated(&arg(args, 0), "Animated.timing")?;
    let config = arg(args, 1);
    let to = config_number(interp, &config, "toValue", 0.0)?;
    let duration = config_number(interp, &config, "duration", DEFAULT_DURATION)?.max(0.0);
    let delay = config_number(interp, &config, "delay", 0.0)?.max(0.0);
    let easing = if config.is_nullish() {
        None
    } else {
        Some(interp.get(&config, "easing")?).filter(Value::is_callable)
    };
    Ok(AnimationPlan::new(PlanKind::Timing { value, to, duration, delay, easing }))
}

fn animated_spring(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let value = expect_animated(&arg(args, 0), "Animated.spring")?;
    let to = config_number(interp, &arg(args, 1), "toValue", 0.0)?;
    Ok(AnimationPlan::new(PlanKind::Spring { value, to }))
}

fn animated_stagger(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let gap = to_numeric(&arg(args, 0)).max(0.0);
    let staggered = plans(&arg(args, 1))?
        .into_iter()
        .enumerate()
        .map(|(i, plan)| {
            let delay = AnimationPlan::shared(PlanKind::Delay(gap * i as f64));
            AnimationPlan::shared(PlanKind::Sequence(vec![delay, plan]))
        })
        .collect();
    Ok(AnimationPlan::new(PlanKind::Parallel(staggered)))
}

fn animated_loop(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let body = plan_of(&arg(args, 0))?;
    let iterations = config_number(interp, &arg(args, 1), "iterations", -1.0)?;
    let iterations = (iterations >= 0.0).then_some(iterations as u32);
    Ok(AnimationPlan::new(PlanKind::Loop { body, iterations }))
}

/// Methods of animated values and interpolations.
pub(crate) fn animated_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "setValue" => set_value,
        "interpolate" => interpolate,
        "stopAnimation" => stop_animation,
        "addListener" => add_listener,
        "removeListener" | "removeAllListeners" => remove_listener,
        _ => return None,
    })
}

fn set_value(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let value = expect_animated(this, "setValue")?;
    write_animated(interp, &value, to_numeric(&arg(args, 0)));
    Ok(Value::Undefined)
}

fn stop_animation(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let current = animated_json(this).map(|json| crate::builtins::json::from_json(&json));
    let callback = arg(args, 0);
    if callback.is_callable() {
        interp.call(&callback, &Value::Undefined, &[current.unwrap_or_default()])?;
    }
    Ok(Value::Undefined)
}

fn add_listener(_: &mut Interp, _: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::from("0"))
}

fn remove_listener(_: &mut Interp, _: &Value, _: &[Value]) -> NativeResult {
    Ok(Value::Undefined)
}

fn parse_stop(value: &Value) -> Result<InterpolationStop, Abrupt> {
    match value {
        Value::Number(n) => Ok(InterpolationStop::Number(*n)),
        Value::String(s) => {
            let split = s
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
                .unwrap_or(s.len());
            let number: f64 = s[..split]
                .parse()
                .map_err(|_| type_error(format!("Unsupported outputRange value \"{s}\"")))?;
            Ok(InterpolationStop::Unit(number, Rc::from(&s[split..])))
        }
        other => Err(type_error(format!("Unsupported outputRange value {}", other.to_js_string()))),
    }
}

fn interpolate(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let source = match this {
        Value::Object(obj)
            if matches!(obj.borrow().kind, ObjectKind::AnimatedValue(_) | ObjectKind::Interpolation(_)) =>
        {
            obj.clone()
        }
        _ => return Err(type_error("interpolate called on a non-animated value")),
    };
    let config = arg(args, 0);
    let input: Vec<f64> = interp
        .get(&config, "inputRange")?
        .array_items()
        .ok_or_else(|| type_error("inputRange must be an array"))?
        .iter()
        .map(to_numeric)
        .collect();
    let output = interp
        .get(&config, "outputRange")?
        .array_items()
        .ok_or_else(|| type_error("outputRange must be an array"))?
        .iter()
        .map(parse_stop)
        .collect::<Result<Vec<_>, _>>()?;
    if input.len() < 2 || input.len() != output.len() {
        return Err(type_error("inputRange and outputRange must have the same length of at least 2"));
    }
    if input.windows(2).any(|w| w[1] < w[0]) {
        return Err(type_error("inputRange must be monotonically non-decreasing"));
    }
    Ok(Value::object(ObjectKind::Interpolation(Interpolation { source, input, output })))
}

/// Numeric value of an animated node; `None` for other values.
fn node_number(obj: &ObjRef) -> Option<f64> {
    match &obj.borrow().kind {
        ObjectKind::AnimatedValue(n) => Some(*n),
        ObjectKind::Interpolation(interpolation) => match evaluate(interpolation)? {
            InterpolationStop::Number(n) | InterpolationStop::Unit(n, _) => Some(n),
        },
        _ => None,
    }
}

/// Piecewise-linear interpolation, extrapolating past both ends.
fn evaluate(interpolation: &Interpolation) -> Option<InterpolationStop> {
    let x = node_number(&interpolation.source)?;
    let input = &interpolation.input;
    let last = input.len() - 1;
    let segment = (0..last).find(|&i| x <= input[i + 1]).unwrap_or(last - 1);
    let (x0, x1) = (input[segment], input[segment + 1]);
    let t = if x1 == x0 { 0.0 } else { (x - x0) / (x1 - x0) };

    let (a, b) = (&interpolation.output[segment], &interpolation.output[segment + 1]);
    let number = |stop: &InterpolationStop| match stop {
        InterpolationStop::Number(n) | InterpolationStop::Unit(n, _) => *n,
    };
    let y = number(a) + (number(b) - number(a)) * t;
    Some(match (a, b) {
        (InterpolationStop::Unit(_, unit), _) | (_, InterpolationStop::Unit(_, unit)) => {
            InterpolationStop::Unit(y, unit.clone())
        }
        _ => InterpolationStop::Number(y),
    })
}

/// Current value of an animated value or interpolation as JSON.
pub(crate) fn animated_json(value: &Value) -> Option<Json> {
    let Value::Object(obj) = value else {
        return None;
    };
    match &obj.borrow().kind {
        ObjectKind::AnimatedValue(n) => Some(number_json(*n)),
        ObjectKind::Interpolation(interpolation) => Some(match evaluate(interpolation)? {
            InterpolationStop::Number(n) => number_json(n),
            InterpolationStop::Unit(n, unit) => {
                Json::String(format!("{}{unit}", pagelet_transpile::number_to_string(n)))
            }
        }),
        _ => None,
    }
}

/// Methods of composed animations.
pub(crate) fn animation_method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "start" => animation_start,
        "stop" => animation_stop,
        "reset" => animation_reset,
        _ => return None,
    })
}

fn animation_start(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let plan = plan_of(this)?;
    stop(interp, &plan);
    let mut values = Vec::new();
    collect_values(&plan, &mut values);
    *plan.initial.borrow_mut() = values.into_iter().map(|value| {
        let n = animated_number(&value);
        (value, n)
    }).collect();
    let mut projection = Projection::default();
    let total = schedule(interp, &plan, &plan, 0.0, &mut projection);

    let callback = arg(args, 0);
    if let (Some(total), true) = (total, callback.is_callable()) {
        let id = interp.schedule(
            total.ceil() as u64,
            TimerCallback::Script {
                func: callback,
                args: vec![Value::plain(vec![("finished", Value::Bool(true))])],
            },
            None,
        );
        plan.timers.borrow_mut().push(id);
    }
    Ok(Value::Undefined)
}

fn animation_stop(interp: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let plan = plan_of(this)?;
    stop(interp, &plan);
    Ok(Value::Undefined)
}

fn animation_reset(interp: &mut Interp, this: &Value, _: &[Value]) -> NativeResult {
    let plan = plan_of(this)?;
    stop(interp, &plan);
    let initial = plan.initial.borrow().clone();
    for (value, n) in initial {
        write_animated(interp, &value, n);
    }
    Ok(Value::Undefined)
}

fn collect_values(plan: &AnimationPlan, out: &mut Vec<ObjRef>) {
    match &plan.kind {
        PlanKind::Timing { value, .. } | PlanKind::Spring { value, .. } => out.push(value.clone()),
        PlanKind::Delay(_) => {}
        PlanKind::Sequence(items) | PlanKind::Parallel(items) => {
            items.iter().for_each(|item| collect_values(item, out));
        }
        PlanKind::Loop { body, .. } => collect_values(body, out),
    }
}

fn stop(interp: &mut Interp, plan: &AnimationPlan) {
    for id in plan.timers.borrow_mut().drain(..) {
        interp.cancel_timer(id);
    }
}

/// Schedule a native timer `delay` virtual ms from now, tracked by `root`.
fn schedule_frame(
    interp: &mut Interp,
    root: &Rc<AnimationPlan>,
    delay: f64,
    f: impl Fn(&mut Interp) -> Result<(), Abrupt> + 'static,
) {
    let id = interp.schedule(delay.max(0.0).round() as u64, TimerCallback::Native(Rc::new(f)), None);
    let mut timers = root.timers.borrow_mut();
    if timers.len() > 256 {
        timers.retain(|id| interp.timers.keys().any(|(_, live)| live == id));
    }
    timers.push(id);
}

/// Frames of one tween from `from` to `to`.
fn tween(
    interp: &mut Interp,
    root: &Rc<AnimationPlan>,
    value: &ObjRef,
    (from, to): (f64, f64),
    start: f64,
    duration: f64,
    easing: Option<Value>,
) {
    let frames = (duration / FRAME_MS).ceil().max(1.0) as u32;
    for frame in 1..=frames {
        let t = f64::from(frame) / f64::from(frames);
        let value = value.clone();
        let easing = easing.clone();
        schedule_frame(interp, root, start + duration * t, move |interp| {
            let progress = match &easing {
                Some(f) => to_numeric(&interp.call(f, &Value::Undefined, &[Value::Number(t)])?),
                None => t,
            };
            write_animated(interp, &value, from + (to - from) * progress);
            Ok(())
        });
    }
}

/// Schedule `plan` starting `offset` ms from now. Returns its duration, or
/// `None` when it never finishes.
fn schedule(
    interp: &mut Interp,
    plan: &Rc<AnimationPlan>,
    root: &Rc<AnimationPlan>,
    offset: f64,
    projection: &mut Projection,
) -> Option<f64> {
    match &plan.kind {
        PlanKind::Timing { value, to, duration, delay, easing } => {
            let from = projection.get(value);
            projection.set(value, *to);
            tween(interp, root, value, (from, *to), offset + delay, *duration, easing.clone());
            Some(delay + duration)
        }
        PlanKind::Spring { value, to } => {
            let from = projection.get(value);
            projection.set(value, *to);
            let ease_out = Value::native("spring", |_, _, a| unit(a, |t| 1.0 - (1.0 - t).powi(3)));
            tween(interp, root, value, (from, *to), offset, SPRING_MS, Some(ease_out));
            Some(SPRING_MS)
        }
        PlanKind::Delay(ms) => Some(*ms),
        PlanKind::Sequence(items) => {
            let mut elapsed = 0.0;
            for item in items {
                elapsed += schedule(interp, item, root, offset + elapsed, projection)?;
            }
            Some(elapsed)
        }
        PlanKind::Parallel(items) => {
            let mut longest = Some(0.0_f64);
            for item in items {
                let duration = schedule(interp, item, root, offset, projection);
                longest = longest.zip(duration).map(|(a, b)| a.max(b));
            }
            longest
        }
        PlanKind::Loop { body, iterations: Some(count) } => {
            let start = projection.clone();
            let mut elapsed = 0.0;
            for _ in 0..*count {
                *projection = start.clone();
                elapsed += schedule(interp, body, root, offset + elapsed, projection)?.max(FRAME_MS);
            }
            Some(elapsed)
        }
        PlanKind::Loop { body, iterations: None } => {
            let start = projection.clone();
            repeat_forever(interp, body.clone(), root.clone(), offset, start);
            None
        }
    }
}

/// Schedule one pass of `body`, then re-arm at its end.
fn repeat_forever(interp: &mut Interp, body: Rc<AnimationPlan>, root: Rc<AnimationPlan>, offset: f64, start: Projection) {
    let mut projection = start.clone();
    let Some(duration) = schedule(interp, &body, &root, offset, &mut projection) else {
        return;
    };
    let next = offset + duration.max(FRAME_MS);
    let (again_body, again_root) = (body.clone(), root.clone());
    schedule_frame(interp, &root, next, move |interp| {
        repeat_forever(interp, again_body.clone(), again_root.clone(), 0.0, start.clone());
        Ok(())
    });
}

/// Native modules keyed by registry name.
pub(crate) fn module(name: &str, options: &ExecuteOptions) -> Option<Value> {
    Some(match name {
        "StyleSheet" => style_sheet(),
        "Alert" => alert(),
        "Keyboard" => keyboard(),
        "Platform" => platform(),
        "Dimensions" => dimensions(options),
        "Linking" => linking(),
        "Animated" => animated(),
        "Easing" => easing(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use pretty_assertions::assert_eq;

    fn number(value: &Value) -> f64 {
        animated_json(value).and_then(|json| json.as_f64()).unwrap()
    }

    #[test]
    fn flatten_merges_nested_styles() {
        let style = Value::array(vec![
            Value::plain(vec![("color", Value::from("red")), ("flex", Value::from(1.0))]),
            Value::Bool(false),
            Value::array(vec![Value::plain(vec![("color", Value::from("blue"))])]),
        ]);
        let flat = flatten_style(&style);
        assert_eq!(crate::builtins::json::stringify(&flat, None).unwrap(), r#"{"color":"blue","flex":1}"#);
    }

    #[test]
    fn timing_reaches_target_on_virtual_clock() {
        let mut interp = Interp::new(SandboxLimits::default());
        let value = animated_value(&mut interp, &Value::Undefined, &[Value::from(0.0)]).unwrap();
        let config = Value::plain(vec![("toValue", Value::from(100.0)), ("duration", Value::from(160.0))]);
        let animation = animated_timing(&mut interp, &Value::Undefined, &[value.clone(), config]).unwrap();
        animation_start(&mut interp, &animation, &[]).unwrap();

        interp.advance_time(80).unwrap();
        assert_eq!(number(&value), 50.0);
        interp.advance_time(100).unwrap();
        assert_eq!(number(&value), 100.0);
        assert!(!interp.has_pending_timers());
    }

    #[test]
    fn interpolation_maps_and_keeps_units() {
        let mut interp = Interp::new(SandboxLimits::default());
        let value = animated_value(&mut interp, &Value::Undefined, &[Value::from(0.5)]).unwrap();
        let config = Value::plain(vec![
            ("inputRange", Value::array(vec![Value::from(0.0), Value::from(1.0)])),
            ("outputRange", Value::array(vec![Value::from("0deg"), Value::from("360deg")])),
        ]);
        let rotation = interpolate(&mut interp, &value, &[config]).unwrap();
        assert_eq!(animated_json(&rotation), Some(Json::String("180deg".to_string())));
    }

    #[test]
    fn sequence_runs_steps_back_to_back() {
        let mut interp = Interp::new(SandboxLimits::default());
        let value = animated_value(&mut interp, &Value::Undefined, &[]).unwrap();
        let step = |to: f64, interp: &mut Interp| {
            let config = Value::plain(vec![("toValue", Value::from(to)), ("duration", Value::from(100.0))]);
            animated_timing(interp, &Value::Undefined, &[value.clone(), config]).unwrap()
        };
        let up = step(10.0, &mut interp);
        let down = step(0.0, &mut interp);
        let sequence = AnimationPlan::new(PlanKind::Sequence(vec![plan_of(&up).unwrap(), plan_of(&down).unwrap()]));
        animation_start(&mut interp, &sequence, &[]).unwrap();

        interp.advance_time(100).unwrap();
        assert_eq!(number(&value), 10.0);
        interp.advance_time(100).unwrap();
        assert_eq!(number(&value), 0.0);
    }

    #[test]
    fn stop_cancels_remaining_frames() {
        let mut interp = Interp::new(SandboxLimits::default());
        let value = animated_value(&mut interp, &Value::Undefined, &[]).unwrap();
        let config = Value::plain(vec![("toValue", Value::from(1.0))]);
        let animation = animated_timing(&mut interp, &Value::Undefined, &[value, config]).unwrap();
        animation_start(&mut interp, &animation, &[]).unwrap();
        assert!(interp.has_pending_timers());
        animation_stop(&mut interp, &animation, &[]).unwrap();
        assert!(!interp.has_pending_timers());
    }
}
