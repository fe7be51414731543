//! The `React` capability: element factory and hooks.
//!
//! Hooks read the [`RenderFrame`] the renderer installs on the interpreter
//! while a function component runs. Each call claims the next hook slot of
//! the rendering instance; slots persist across renders of that instance.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::builtins::{arg, namespace};
use crate::interp::{own_entries, type_error, Abrupt, Interp};
use crate::value::{ElementData, ObjectKind, Value};

type NativeResult = Result<Value, Abrupt>;

/// Hook state of one mounted component instance.
#[derive(Default)]
pub(crate) struct Instance {
    pub hooks: Vec<Hook>,
}

/// One hook slot.
pub(crate) enum Hook {
    State { value: Value, setter: Value },
    Effect {
        deps: Option<Vec<Value>>,
        cleanup: Option<Value>,
        /// Effect to run after the current commit
        pending: Option<Value>,
    },
    Memo { deps: Option<Vec<Value>>, value: Value },
    Ref(Value),
}

/// The component currently rendering.
pub(crate) struct RenderFrame {
    pub instance: Rc<RefCell<Instance>>,
    pub cursor: usize,
}

/// The `React` object.
pub(crate) fn react() -> Value {
    let react = namespace(&[
        ("createElement", create_element),
        ("useState", use_state),
        ("useEffect", use_effect),
        ("useLayoutEffect", use_effect),
        ("useMemo", use_memo),
        ("useCallback", use_callback),
        ("useRef", use_ref),
    ]);
    if let Value::Object(obj) = &react {
        obj.borrow_mut().set("Fragment", Value::object(ObjectKind::Host("Fragment")));
    }
    react
}

/// `React.createElement(type, props, ...children)`
fn create_element(_: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let element_type = arg(args, 0);
    if !element_type.is_callable()
        && !matches!(element_type, Value::String(_))
        && !matches!(&element_type, Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Host(_)))
    {
        return Err(type_error(format!(
            "Element type is invalid: expected a string or a function but got: {}",
            element_type.type_of()
        )));
    }

    let mut key = None;
    let mut props = Vec::new();
    for (name, value) in own_entries(&arg(args, 1)) {
        match &*name {
            "key" => {
                if !value.is_nullish() {
                    key = Some(value.to_js_string());
                }
            }
            "ref" => {}
            _ => props.push((name, value)),
        }
    }

    let children = args.get(2..).unwrap_or_default();
    let children = match children {
        [] => None,
        [only] => Some(only.clone()),
        many => Some(Value::array(many.to_vec())),
    };
    let props_value = Value::plain(Vec::new());
    if let Value::Object(obj) = &props_value {
        let mut object = obj.borrow_mut();
        for (name, value) in props {
            object.set(name, value);
        }
        if let Some(children) = children {
            object.set("children", children);
        }
    }

    Ok(Value::object(ObjectKind::Element(ElementData {
        element_type,
        props: props_value,
        key,
    })))
}

/// Claim the next hook slot of the rendering component.
fn next_slot(interp: &mut Interp, hook: &str) -> Result<(Rc<RefCell<Instance>>, usize), Abrupt> {
    let Some(frame) = interp.render.as_mut() else {
        return Err(type_error(format!(
            "Invalid hook call: {hook} can only be called inside the body of a function component"
        )));
    };
    let index = frame.cursor;
    frame.cursor += 1;
    Ok((frame.instance.clone(), index))
}

fn order_error(hook: &str) -> Abrupt {
    type_error(format!("Rendered {hook} in a different order than the previous render"))
}

fn deps_of(value: &Value) -> Option<Vec<Value>> {
    value.array_items()
}

fn deps_changed(old: &Option<Vec<Value>>, new: &Option<Vec<Value>>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => {
            old.len() != new.len() || old.iter().zip(new).any(|(a, b)| !a.same_value(b))
        }
        _ => true,
    }
}

fn use_state(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let (instance, index) = next_slot(interp, "useState")?;
    {
        let inst = instance.borrow();
        match inst.hooks.get(index) {
            Some(Hook::State { value, setter }) => {
                return Ok(Value::array(vec![value.clone(), setter.clone()]));
            }
            Some(_) => return Err(order_error("useState")),
            None => {}
        }
    }

    let initial = arg(args, 0);
    let value = if initial.is_callable() {
        interp.call(&initial, &Value::Undefined, &[])?
    } else {
        initial
    };
    let setter = state_setter(Rc::downgrade(&instance), index, interp.dirty.clone());
    instance.borrow_mut().hooks.push(Hook::State { value: value.clone(), setter: setter.clone() });
    Ok(Value::array(vec![value, setter]))
}

/// The setter returned by `useState`; a no-op once the instance unmounts.
fn state_setter(instance: Weak<RefCell<Instance>>, index: usize, dirty: Rc<std::cell::Cell<bool>>) -> Value {
    Value::native("setState", move |interp: &mut Interp, _: &Value, args: &[Value]| {
        let Some(instance) = instance.upgrade() else {
            return Ok(Value::Undefined);
        };
        let current = match instance.borrow().hooks.get(index) {
            Some(Hook::State { value, .. }) => value.clone(),
            _ => return Ok(Value::Undefined),
        };
        let update = arg(args, 0);
        let next = if update.is_callable() {
            interp.call(&update, &Value::Undefined, &[current.clone()])?
        } else {
            update
        };
        if next.same_value(&current) {
            return Ok(Value::Undefined);
        }
        if let Some(Hook::State { value, .. }) = instance.borrow_mut().hooks.get_mut(index) {
            *value = next;
        }
        dirty.set(true);
        Ok(Value::Undefined)
    })
}

fn use_effect(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let (instance, index) = next_slot(interp, "useEffect")?;
    let effect = arg(args, 0);
    if !effect.is_callable() {
        return Err(type_error("useEffect expects a function"));
    }
    let deps = deps_of(&arg(args, 1));

    let mut inst = instance.borrow_mut();
    match inst.hooks.get_mut(index) {
        Some(Hook::Effect { deps: old, pending, .. }) => {
            if deps_changed(old, &deps) {
                *old = deps;
                *pending = Some(effect);
            }
        }
        Some(_) => return Err(order_error("useEffect")),
        None => inst.hooks.push(Hook::Effect { deps, cleanup: None, pending: Some(effect) }),
    }
    Ok(Value::Undefined)
}

fn memo(interp: &mut Interp, hook: &str, deps: Option<Vec<Value>>, compute: impl FnOnce(&mut Interp) -> NativeResult) -> NativeResult {
    let (instance, index) = next_slot(interp, hook)?;
    {
        let inst = instance.borrow();
        match inst.hooks.get(index) {
            Some(Hook::Memo { deps: old, value }) => {
                if !deps_changed(old, &deps) {
                    return Ok(value.clone());
                }
            }
            Some(_) => return Err(order_error(hook)),
            None => {}
        }
    }

    let value = compute(interp)?;
    let mut inst = instance.borrow_mut();
    let slot = Hook::Memo { deps, value: value.clone() };
    if index < inst.hooks.len() {
        inst.hooks[index] = slot;
    } else {
        inst.hooks.push(slot);
    }
    Ok(value)
}

fn use_memo(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let factory = arg(args, 0);
    memo(interp, "useMemo", deps_of(&arg(args, 1)), |interp| {
        interp.call(&factory, &Value::Undefined, &[])
    })
}

fn use_callback(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let callback = arg(args, 0);
    memo(interp, "useCallback", deps_of(&arg(args, 1)), |_| Ok(callback))
}

fn use_ref(interp: &mut Interp, _: &Value, args: &[Value]) -> NativeResult {
    let (instance, index) = next_slot(interp, "useRef")?;
    let mut inst = instance.borrow_mut();
    match inst.hooks.get(index) {
        Some(Hook::Ref(current)) => Ok(current.clone()),
        Some(_) => Err(order_error("useRef")),
        None => {
            let reference = Value::plain(vec![("current", arg(args, 0))]);
            inst.hooks.push(Hook::Ref(reference.clone()));
            Ok(reference)
        }
    }
}
