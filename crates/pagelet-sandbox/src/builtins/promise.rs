//! Promises and their microtask reactions.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::interp::{type_error, Abrupt, Interp, Job, Settled};
use crate::value::{NativeFnPtr, ObjRef, Object, ObjectKind, PromiseState, Reaction, Value};

use super::{arg, native_with_statics};

type NativeResult = Result<Value, Abrupt>;

/// A new pending promise.
pub(crate) fn new_promise() -> ObjRef {
    Rc::new(RefCell::new(Object::new(ObjectKind::Promise(PromiseState::Pending(Vec::new())))))
}

/// Settled state, `None` while pending or for non-promises.
pub(crate) fn state_of(promise: &ObjRef) -> Option<Settled> {
    match &promise.borrow().kind {
        ObjectKind::Promise(PromiseState::Fulfilled(value)) => Some(Settled::Fulfilled(value.clone())),
        ObjectKind::Promise(PromiseState::Rejected(reason)) => Some(Settled::Rejected(reason.clone())),
        _ => None,
    }
}

fn as_promise(value: &Value) -> Option<ObjRef> {
    match value {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Promise(_)) => Some(obj.clone()),
        _ => None,
    }
}

/// Resolve `promise` with `value`, adopting promises and thenables.
pub(crate) fn resolve(interp: &mut Interp, promise: &ObjRef, value: Value) -> Result<(), Abrupt> {
    if let Value::Object(obj) = &value {
        if Rc::ptr_eq(obj, promise) {
            reject(interp, promise, crate::interp::error_value("TypeError", "Chaining cycle detected for promise"));
            return Ok(());
        }
    }

    if let Some(inner) = as_promise(&value) {
        subscribe(
            interp,
            &inner,
            Reaction { on_fulfilled: None, on_rejected: None, derived: Some(promise.clone()) },
        );
        return Ok(());
    }

    if let Value::Object(obj) = &value {
        let then = match &obj.borrow().kind {
            ObjectKind::Plain => obj.borrow().get("then").cloned(),
            _ => None,
        };
        if let Some(then) = then.filter(Value::is_callable) {
            interp.enqueue(Job::Thenable { promise: promise.clone(), thenable: value, then });
            return Ok(());
        }
    }

    settle(interp, promise, Settled::Fulfilled(value));
    Ok(())
}

pub(crate) fn reject(interp: &mut Interp, promise: &ObjRef, reason: Value) {
    settle(interp, promise, Settled::Rejected(reason));
}

/// Move a pending promise to its final state and queue its reactions.
fn settle(interp: &mut Interp, promise: &ObjRef, outcome: Settled) {
    let reactions = {
        let mut object = promise.borrow_mut();
        let ObjectKind::Promise(state) = &mut object.kind else {
            return;
        };
        let PromiseState::Pending(reactions) = state else {
            return;
        };
        let reactions = std::mem::take(reactions);
        *state = match &outcome {
            Settled::Fulfilled(value) => PromiseState::Fulfilled(value.clone()),
            Settled::Rejected(reason) => PromiseState::Rejected(reason.clone()),
        };
        reactions
    };
    for reaction in reactions {
        interp.enqueue(Job::Reaction { reaction, outcome: outcome.clone() });
    }
}

fn subscribe(interp: &mut Interp, promise: &ObjRef, reaction: Reaction) {
    match state_of(promise) {
        Some(outcome) => interp.enqueue(Job::Reaction { reaction, outcome }),
        None => {
            if let ObjectKind::Promise(PromiseState::Pending(reactions)) = &mut promise.borrow_mut().kind {
                reactions.push(reaction);
            }
        }
    }
}

/// `promise.then(on_fulfilled, on_rejected)`, returning the derived promise.
pub(crate) fn then(
    interp: &mut Interp,
    promise: &ObjRef,
    on_fulfilled: Option<Value>,
    on_rejected: Option<Value>,
) -> ObjRef {
    let derived = new_promise();
    subscribe(
        interp,
        promise,
        Reaction {
            on_fulfilled: on_fulfilled.filter(Value::is_callable),
            on_rejected: on_rejected.filter(Value::is_callable),
            derived: Some(derived.clone()),
        },
    );
    derived
}

/// `Promise.resolve(value)`
pub(crate) fn to_promise(interp: &mut Interp, value: Value) -> Result<ObjRef, Abrupt> {
    if let Some(promise) = as_promise(&value) {
        return Ok(promise);
    }
    let promise = new_promise();
    resolve(interp, &promise, value)?;
    Ok(promise)
}

/// Run one queued microtask.
pub(crate) fn run_job(interp: &mut Interp, job: Job) -> Result<(), Abrupt> {
    match job {
        Job::Reaction { reaction, outcome } => {
            let (handler, argument) = match &outcome {
                Settled::Fulfilled(value) => (reaction.on_fulfilled, value.clone()),
                Settled::Rejected(reason) => (reaction.on_rejected, reason.clone()),
            };
            let result = match handler {
                Some(handler) => match interp.call(&handler, &Value::Undefined, &[argument]) {
                    Ok(value) => Settled::Fulfilled(value),
                    Err(Abrupt::Throw(reason)) => Settled::Rejected(reason),
                    Err(other) => return Err(other),
                },
                None => outcome,
            };
            if let Some(derived) = reaction.derived {
                match result {
                    Settled::Fulfilled(value) => resolve(interp, &derived, value)?,
                    Settled::Rejected(reason) => reject(interp, &derived, reason),
                }
            }
            Ok(())
        }
        Job::Thenable { promise, thenable, then } => {
            let (resolve_fn, reject_fn) = resolving_functions(&promise);
            match interp.call(&then, &thenable, &[resolve_fn, reject_fn.clone()]) {
                Ok(_) => Ok(()),
                Err(Abrupt::Throw(reason)) => {
                    interp.call(&reject_fn, &Value::Undefined, &[reason])?;
                    Ok(())
                }
                Err(other) => Err(other),
            }
        }
    }
}

/// `resolve`/`reject` pair for `promise`; only the first call has effect.
fn resolving_functions(promise: &ObjRef) -> (Value, Value) {
    let done = Rc::new(Cell::new(false));

    let target = promise.clone();
    let once = done.clone();
    let resolve_fn = Value::native("resolve", move |interp: &mut Interp, _: &Value, args: &[Value]| {
        if !once.replace(true) {
            resolve(interp, &target, arg(args, 0))?;
        }
        Ok(Value::Undefined)
    });

    let target = promise.clone();
    let reject_fn = Value::native("reject", move |interp: &mut Interp, _: &Value, args: &[Value]| {
        if !done.replace(true) {
            reject(interp, &target, arg(args, 0));
        }
        Ok(Value::Undefined)
    });

    (resolve_fn, reject_fn)
}

pub(crate) fn method(key: &str) -> Option<NativeFnPtr> {
    Some(match key {
        "then" => promise_then,
        "catch" => promise_catch,
        "finally" => promise_finally,
        _ => return None,
    })
}

fn receiver(this: &Value, what: &str) -> Result<ObjRef, Abrupt> {
    as_promise(this).ok_or_else(|| type_error(format!("Promise.prototype.{what} called on a non-promise")))
}

fn promise_then(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let promise = receiver(this, "then")?;
    Ok(Value::Object(then(interp, &promise, Some(arg(args, 0)), Some(arg(args, 1)))))
}

fn promise_catch(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let promise = receiver(this, "catch")?;
    Ok(Value::Object(then(interp, &promise, None, Some(arg(args, 0)))))
}

fn promise_finally(interp: &mut Interp, this: &Value, args: &[Value]) -> NativeResult {
    let promise = receiver(this, "finally")?;
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Ok(Value::Object(then(interp, &promise, None, None)));
    }

    let on_fulfilled = {
        let callback = callback.clone();
        Value::native("finally", move |interp: &mut Interp, _: &Value, args: &[Value]| {
            interp.call(&callback, &Value::Undefined, &[])?;
            Ok(arg(args, 0))
        })
    };
    let on_rejected = Value::native("finally", move |interp: &mut Interp, _: &Value, args: &[Value]| {
        interp.call(&callback, &Value::Undefined, &[])?;
        Err(Abrupt::Throw(arg(args, 0)))
    });
    Ok(Value::Object(then(interp, &promise, Some(on_fulfilled), Some(on_rejected))))
}

/// The `Promise` global.
pub(crate) fn constructor() -> Value {
    native_with_statics(
        "Promise",
        promise_constructor,
        vec![
            ("resolve", Value::native("resolve", promise_resolve)),
            ("reject", Value::native("reject", promise_reject)),
            ("all", Value::native("all", promise_all)),
            ("allSettled", Value::native("allSettled", promise_all_settled)),
            ("race", Value::native("race", promise_race)),
        ],
    )
}

fn promise_constructor(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let executor = arg(args, 0);
    if !executor.is_callable() {
        return Err(type_error("Promise resolver is not a function"));
    }
    let promise = new_promise();
    let (resolve_fn, reject_fn) = resolving_functions(&promise);
    match interp.call(&executor, &Value::Undefined, &[resolve_fn, reject_fn.clone()]) {
        Ok(_) => {}
        Err(Abrupt::Throw(reason)) => {
            interp.call(&reject_fn, &Value::Undefined, &[reason])?;
        }
        Err(other) => return Err(other),
    }
    Ok(Value::Object(promise))
}

fn promise_resolve(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    Ok(Value::Object(to_promise(interp, arg(args, 0))?))
}

fn promise_reject(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let promise = new_promise();
    reject(interp, &promise, arg(args, 0));
    Ok(Value::Object(promise))
}

fn iterable_items(value: &Value, what: &str) -> Result<Vec<Value>, Abrupt> {
    value
        .array_items()
        .ok_or_else(|| type_error(format!("Promise.{what} expects an array")))
}

/// Shared machinery of `Promise.all` and `Promise.allSettled`.
fn combine(
    interp: &mut Interp,
    items: Vec<Value>,
    on_fulfilled: fn(Value) -> Value,
    on_rejected: Option<fn(Value) -> Value>,
) -> NativeResult {
    let result = new_promise();
    if items.is_empty() {
        resolve(interp, &result, Value::array(Vec::new()))?;
        return Ok(Value::Object(result));
    }

    let values = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
    let remaining = Rc::new(Cell::new(items.len()));
    for (index, item) in items.into_iter().enumerate() {
        let source = to_promise(interp, item)?;

        let store = |wrap: fn(Value) -> Value| {
            let values = values.clone();
            let remaining = remaining.clone();
            let result = result.clone();
            Value::native("settle", move |interp: &mut Interp, _: &Value, args: &[Value]| {
                values.borrow_mut()[index] = wrap(arg(args, 0));
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let all = values.borrow().clone();
                    resolve(interp, &result, Value::array(all))?;
                }
                Ok(Value::Undefined)
            })
        };

        let fulfilled = store(on_fulfilled);
        let rejected = match on_rejected {
            Some(wrap) => store(wrap),
            None => {
                let result = result.clone();
                Value::native("reject", move |interp: &mut Interp, _: &Value, args: &[Value]| {
                    reject(interp, &result, arg(args, 0));
                    Ok(Value::Undefined)
                })
            }
        };
        then(interp, &source, Some(fulfilled), Some(rejected));
    }
    Ok(Value::Object(result))
}

fn promise_all(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let items = iterable_items(&arg(args, 0), "all")?;
    combine(interp, items, |value| value, None)
}

fn promise_all_settled(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let items = iterable_items(&arg(args, 0), "allSettled")?;
    combine(
        interp,
        items,
        |value| Value::plain(vec![("status", Value::from("fulfilled")), ("value", value)]),
        Some(|reason| Value::plain(vec![("status", Value::from("rejected")), ("reason", reason)])),
    )
}

fn promise_race(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let items = iterable_items(&arg(args, 0), "race")?;
    let result = new_promise();
    let (resolve_fn, reject_fn) = resolving_functions(&result);
    for item in items {
        let source = to_promise(interp, item)?;
        then(interp, &source, Some(resolve_fn.clone()), Some(reject_fn.clone()));
    }
    Ok(Value::Object(result))
}
