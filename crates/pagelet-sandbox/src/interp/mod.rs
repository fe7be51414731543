//! Tree-walking interpreter over the transpiler's IR.
//!
//! The interpreter is the sandbox boundary: sandboxed code can only reach the
//! bindings placed in its scope chain. The global scope holds a fixed set of
//! language built-ins (see [`crate::builtins`]); everything else arrives as a
//! registry capability bound to a function parameter.
//!
//! Every host-to-sandbox entry (the initial evaluation, a render pass, an
//! event handler, a timer) runs under a step budget and a call-depth limit.
//! Exceeding either produces [`Abrupt::Fatal`], which `try`/`catch` cannot
//! intercept.

mod eval;
mod generator;
mod jobs;
mod property;
mod scope;

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use pagelet_transpile::ast::{Function, FunctionKind};
use regex::Regex;

use crate::builtins;
use crate::capabilities::react::RenderFrame;
use crate::config::SandboxLimits;
use crate::host::HostEvent;
use crate::value::{Callable, Closure, Object, ObjectKind, Value};

pub(crate) use eval::{to_numeric, to_uint32};
pub(crate) use jobs::{Job, Settled, Timer, TimerCallback};
pub(crate) use property::{function_name, own_entries, own_keys, property_key};
pub use scope::{Lookup, Scope, ScopeRef};

/// Non-normal completion of an evaluation.
#[derive(Debug, Clone)]
pub enum Abrupt {
    /// A thrown value, catchable by sandboxed code
    Throw(Value),
    /// Budget or depth exhaustion; unwinds to the host
    Fatal(String),
    /// An optional chain hit `null`/`undefined`
    ShortCircuit,
}

/// Statement completion.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
}

/// A single sandbox instance. Not `Send`: values are reference counted.
pub struct Interp {
    limits: SandboxLimits,
    steps: u64,
    depth: usize,
    pub(crate) globals: ScopeRef,
    pub(crate) microtasks: VecDeque<Job>,
    pub(crate) timers: BTreeMap<(u64, u64), Timer>,
    next_timer_id: u64,
    now: u64,
    epoch_ms: f64,
    rng: u64,
    pub(crate) host_events: Vec<HostEvent>,
    /// Component currently rendering, if any; hooks read it
    pub(crate) render: Option<RenderFrame>,
    /// Set by state setters and animations; the renderer clears it
    pub(crate) dirty: Rc<Cell<bool>>,
    methods: HashMap<(&'static str, String), Value>,
    regexes: HashMap<(Rc<str>, Rc<str>), Rc<Regex>>,
    /// Compiled async bodies, keyed by function identity
    generators: HashMap<*const Function, (Rc<Function>, Rc<generator::Program>)>,
}

impl Interp {
    /// Create an interpreter with the ambient built-ins installed.
    pub fn new(limits: SandboxLimits) -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);

        let mut interp = Self {
            limits,
            steps: 0,
            depth: 0,
            globals: Scope::root(),
            microtasks: VecDeque::new(),
            timers: BTreeMap::new(),
            next_timer_id: 1,
            now: 0,
            epoch_ms,
            rng: 0x2545_f491_4f6c_dd1d,
            host_events: Vec::new(),
            render: None,
            dirty: Rc::new(Cell::new(false)),
            methods: HashMap::new(),
            regexes: HashMap::new(),
            generators: HashMap::new(),
        };
        builtins::install(&mut interp);
        interp
    }

    /// The limits this interpreter enforces.
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Start a new host-to-sandbox entry with a fresh step budget.
    pub fn begin_entry(&mut self) {
        self.steps = 0;
        self.depth = 0;
    }

    /// Steps consumed by the current entry.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn tick(&mut self) -> Result<(), Abrupt> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Abrupt::Fatal(format!(
                "RangeError: Execution budget of {} steps exceeded",
                self.limits.max_steps
            )));
        }
        Ok(())
    }

    /// Validate a requested array length against the limits.
    pub(crate) fn array_length(&self, len: f64) -> Result<usize, Abrupt> {
        if len < 0.0 || len.fract() != 0.0 || len > self.limits.max_array_length as f64 {
            return Err(throw_error("RangeError", "Invalid array length"));
        }
        Ok(len as usize)
    }

    /// Validate the length of a string about to be built.
    pub(crate) fn string_length(&self, len: usize) -> Result<(), Abrupt> {
        if len > self.limits.max_string_length {
            return Err(throw_error("RangeError", "Invalid string length"));
        }
        Ok(())
    }

    /// Look up a global built-in by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        match self.globals.lookup(name) {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Call a function value.
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> Result<Value, Abrupt> {
        let Some(callable) = callable_of(callee) else {
            return Err(type_error(format!("{} is not a function", callee.type_of())));
        };
        if let Callable::Closure(closure) = &callable {
            if closure.func.kind == FunctionKind::Generator {
                return Err(type_error("Generator functions cannot be called directly"));
            }
        }
        self.call_callable(callee, callable, this, args)
    }

    fn call_callable(
        &mut self,
        callee: &Value,
        callable: Callable,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, Abrupt> {
        self.tick()?;
        if self.depth >= self.limits.max_call_depth {
            return Err(Abrupt::Fatal("RangeError: Maximum call stack size exceeded".to_string()));
        }
        self.depth += 1;
        let result = match callable {
            Callable::Native(native) => (native.func)(self, this, args),
            Callable::Bound { target, this: bound_this, args: bound_args } => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                self.call(&target, &bound_this, &all)
            }
            Callable::Closure(closure) => self.call_closure(callee, &closure, this, args),
        };
        self.depth -= 1;
        result
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> Result<Value, Abrupt> {
        match callable_of(callee) {
            Some(Callable::Native(_)) => self.call(callee, &Value::Undefined, args),
            Some(Callable::Bound { target, args: bound_args, .. }) => {
                let mut all = bound_args;
                all.extend_from_slice(args);
                self.construct(&target, &all)
            }
            Some(Callable::Closure(closure)) if closure.func.kind == FunctionKind::Normal => {
                let mut object = Object::new(ObjectKind::Plain);
                object.constructor = callee.as_object().cloned();
                let instance = Value::Object(Rc::new(std::cell::RefCell::new(object)));
                let result = self.call_callable(callee, Callable::Closure(closure), &instance, args)?;
                Ok(match result {
                    Value::Object(_) => result,
                    _ => instance,
                })
            }
            _ => Err(type_error(format!("{} is not a constructor", callee.type_of()))),
        }
    }

    /// Create a closure over `env`.
    pub(crate) fn closure(&self, func: Rc<Function>, env: &ScopeRef) -> Value {
        Value::object(ObjectKind::Function(Callable::Closure(Rc::new(Closure {
            func,
            env: env.clone(),
        }))))
    }

    /// Human-readable message for a thrown value.
    pub fn describe_thrown(&self, thrown: &Value) -> String {
        match thrown {
            Value::Object(obj) => {
                let is_error = matches!(obj.borrow().kind, ObjectKind::Error);
                if is_error || thrown.is_callable() {
                    thrown.to_js_string().to_string()
                } else {
                    builtins::json::stringify(thrown, None)
                        .unwrap_or_else(|| thrown.to_js_string().to_string())
                }
            }
            other => other.to_js_string().to_string(),
        }
    }

    /// Message for any abrupt completion that reached the host.
    pub fn describe_abrupt(&self, abrupt: &Abrupt) -> String {
        match abrupt {
            Abrupt::Throw(value) => self.describe_thrown(value),
            Abrupt::Fatal(message) => message.clone(),
            Abrupt::ShortCircuit => "TypeError: Optional chain escaped its expression".to_string(),
        }
    }

    /// Virtual time in milliseconds since this interpreter started.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// `Date.now()` value: wall clock at creation plus virtual time.
    pub(crate) fn date_now(&self) -> f64 {
        self.epoch_ms + self.now as f64
    }

    /// Deterministic `Math.random()`.
    pub(crate) fn random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Host events recorded since the last call.
    pub fn take_host_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.host_events)
    }

    pub(crate) fn record(&mut self, event: HostEvent) {
        self.host_events.push(event);
    }

    /// Compile (or reuse) a regular expression literal.
    pub(crate) fn regex(&mut self, pattern: &Rc<str>, flags: &Rc<str>) -> Result<Rc<Regex>, Abrupt> {
        let key = (pattern.clone(), flags.clone());
        if let Some(regex) = self.regexes.get(&key) {
            return Ok(regex.clone());
        }
        let inline: String = flags.chars().filter(|c| matches!(c, 'i' | 'm' | 's')).collect();
        let source = if inline.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{inline}){pattern}")
        };
        let regex = Regex::new(&source).map(Rc::new).map_err(|e| {
            throw_error("SyntaxError", format!("Invalid regular expression: /{pattern}/: {e}"))
        })?;
        self.regexes.insert(key, regex.clone());
        Ok(regex)
    }

    /// Cached function value for a builtin method.
    pub(crate) fn method(&mut self, table: &'static str, key: &str) -> Option<Value> {
        if let Some(value) = self.methods.get(&(table, key.to_string())) {
            return Some(value.clone());
        }
        let func = builtins::method(table, key)?;
        let value = Value::native(key, func);
        self.methods.insert((table, key.to_string()), value.clone());
        Some(value)
    }
}

/// The callable part of a value, if it is a function.
pub(crate) fn callable_of(value: &Value) -> Option<Callable> {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// A new error object such as `TypeError: message`.
pub(crate) fn error_value(name: &str, message: impl Into<String>) -> Value {
    let mut object = Object::new(ObjectKind::Error);
    object.set("name", Value::from(name));
    object.set("message", Value::from(message.into()));
    Value::Object(Rc::new(std::cell::RefCell::new(object)))
}

/// Throw a new error object.
pub(crate) fn throw_error(name: &str, message: impl Into<String>) -> Abrupt {
    Abrupt::Throw(error_value(name, message))
}

pub(crate) fn type_error(message: impl Into<String>) -> Abrupt {
    throw_error("TypeError", message)
}

pub(crate) fn reference_error(message: impl Into<String>) -> Abrupt {
    throw_error("ReferenceError", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagelet_transpile::parse_artifact;

    fn run(code: &str) -> Result<Value, String> {
        let mut interp = Interp::new(SandboxLimits::default());
        let program = parse_artifact(code).map_err(|e| e.to_string())?;
        let func = Rc::new(pagelet_transpile::ast::Function {
            name: None,
            params: Vec::new(),
            rest: None,
            body: pagelet_transpile::ast::FunctionBody::Block(program.body),
            kind: FunctionKind::Normal,
        });
        let globals = interp.globals.clone();
        let closure = interp.closure(func, &globals);
        interp.begin_entry();
        let result = interp.call(&closure, &Value::Undefined, &[]);
        result.map_err(|e| interp.describe_abrupt(&e))
    }

    fn run_str(code: &str) -> String {
        match run(code) {
            Ok(value) => value.to_js_string().to_string(),
            Err(message) => format!("error: {message}"),
        }
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(run_str("return 1 + 2 * 3;"), "7");
        assert_eq!(run_str("return '1' + 2;"), "12");
        assert_eq!(run_str("return `a${1 + 1}b`;"), "a2b");
        assert_eq!(run_str("return 2 ** 10 % 1000;"), "24");
        assert_eq!(run_str("return 7 / 2 | 0;"), "3");
    }

    #[test]
    fn closures_and_hoisting() {
        let code = "
            function counter() {
              let n = 0;
              return () => ++n;
            }
            const c = counter();
            c(); c();
            return c() + twice(2);
            function twice(x) { return x * 2; }
        ";
        assert_eq!(run_str(code), "7");
    }

    #[test]
    fn loop_bindings_are_per_iteration() {
        let code = "
            const fns = [];
            for (let i = 0; i < 3; i++) { fns.push(() => i); }
            return fns.map((f) => f()).join(',');
        ";
        assert_eq!(run_str(code), "0,1,2");
    }

    #[test]
    fn destructuring_and_spread() {
        let code = "
            const { a, b: [x, , y = 9], ...rest } = { a: 1, b: [2, 3], c: 4, d: 5 };
            const merged = { ...rest, e: [...[a, x], y] };
            return JSON.stringify(merged);
        ";
        assert_eq!(run_str(code), r#"{"c":4,"d":5,"e":[1,2,9]}"#);
    }

    #[test]
    fn exceptions_are_catchable() {
        let code = "
            let log = '';
            try { null.x; } catch (e) { log += e instanceof TypeError; }
            finally { log += '!'; }
            return log;
        ";
        assert_eq!(run_str(code), "true!");
    }

    #[test]
    fn undeclared_names_are_reference_errors() {
        assert_eq!(run_str("return missing;"), "error: ReferenceError: missing is not defined");
        assert_eq!(run_str("return typeof missing;"), "undefined");
        assert_eq!(
            run_str("x = 1;"),
            "error: ReferenceError: x is not defined"
        );
    }

    #[test]
    fn host_globals_are_unreachable() {
        for name in ["require", "process", "globalThis", "window", "fetch", "eval", "Function"] {
            let out = run_str(&format!("return {name};"));
            assert_eq!(out, format!("error: ReferenceError: {name} is not defined"));
        }
    }

    #[test]
    fn const_reassignment_throws() {
        assert_eq!(
            run_str("const a = 1; a = 2;"),
            "error: TypeError: Assignment to constant variable."
        );
    }

    #[test]
    fn infinite_loop_hits_budget() {
        let mut interp = Interp::new(SandboxLimits { max_steps: 10_000, ..SandboxLimits::default() });
        let program = parse_artifact("while (true) {}").unwrap();
        let func = Rc::new(pagelet_transpile::ast::Function {
            name: None,
            params: Vec::new(),
            rest: None,
            body: pagelet_transpile::ast::FunctionBody::Block(program.body),
            kind: FunctionKind::Normal,
        });
        let globals = interp.globals.clone();
        let closure = interp.closure(func, &globals);
        interp.begin_entry();
        let err = interp.call(&closure, &Value::Undefined, &[]).unwrap_err();
        assert!(matches!(err, Abrupt::Fatal(ref m) if m.contains("budget")));
    }

    #[test]
    fn budget_fault_is_not_catchable() {
        let mut interp = Interp::new(SandboxLimits { max_steps: 5_000, ..SandboxLimits::default() });
        let program = parse_artifact("try { for (;;) {} } catch (e) { return 'caught'; }").unwrap();
        let func = Rc::new(pagelet_transpile::ast::Function {
            name: None,
            params: Vec::new(),
            rest: None,
            body: pagelet_transpile::ast::FunctionBody::Block(program.body),
            kind: FunctionKind::Normal,
        });
        let globals = interp.globals.clone();
        let closure = interp.closure(func, &globals);
        interp.begin_entry();
        assert!(matches!(interp.call(&closure, &Value::Undefined, &[]), Err(Abrupt::Fatal(_))));
    }

    #[test]
    fn thrown_values_are_described() {
        assert_eq!(run_str("throw new Error('boom');"), "error: Error: boom");
        assert_eq!(run_str("throw 'plain';"), "error: plain");
        assert_eq!(run_str("throw { code: 7 };"), r#"error: {"code":7}"#);
    }

    #[test]
    fn switch_and_labels() {
        let code = "
            let out = [];
            outer: for (const i of [1, 2, 3]) {
              switch (i) {
                case 1: out.push('one'); break;
                case 2: continue outer;
                default: out.push('many');
              }
            }
            return out.join(' ');
        ";
        assert_eq!(run_str(code), "one many");
    }

    #[test]
    fn optional_chaining() {
        assert_eq!(run_str("const a = null; return a?.b.c;"), "undefined");
        assert_eq!(run_str("const a = { f: null }; return a.f?.();"), "undefined");
        assert_eq!(run_str("const a = { b: { c: 3 } }; return a?.b?.c ?? 0;"), "3");
    }
}
