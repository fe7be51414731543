//! Statement and expression evaluation.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use pagelet_transpile::ast::{
    Arg, ArrayItem, AssignmentOperator, BinaryOperator, CatchClause, Declarator, Expr, ForHead,
    ForInit, FunctionBody, FunctionKind, LogicalOperator, MemberProp, Name, ObjectItem, Pattern,
    PropKey, Stmt, SwitchCase, UnaryOperator, UpdateOperator, VarKind,
};

use crate::value::{Callable, Closure, Object, ObjectKind, RegExpData, Value};

use super::scope::{AssignError, Lookup, Scope, ScopeRef};
use super::{
    own_entries, own_keys, property_key, reference_error, throw_error, type_error, Abrupt, Flow,
    Interp,
};

#[derive(Debug, Clone, Copy)]
pub(super) enum BindMode {
    Declare(VarKind),
    Assign,
}

/// A resolved assignment target.
enum Reference {
    Binding(Name),
    Property(Value, Rc<str>),
}

enum LoopControl {
    Next,
    Exit,
    Propagate(Flow),
}

type Result<T> = std::result::Result<T, Abrupt>;

impl Interp {
    /// Invoke an author-defined function.
    pub(crate) fn call_closure(
        &mut self,
        callee: &Value,
        closure: &Closure,
        this: &Value,
        args: &[Value],
    ) -> Result<Value> {
        let scope = self.enter_function(callee, closure, this, args)?;
        match &closure.func.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                hoist_vars(body, &scope);
                self.hoist_block(body, &scope);
                match self.exec_statements(body, &scope)? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// Function scope with `this`, `arguments` and the parameters bound.
    pub(super) fn enter_function(
        &mut self,
        callee: &Value,
        closure: &Closure,
        this: &Value,
        args: &[Value],
    ) -> Result<ScopeRef> {
        let func = &closure.func;
        let is_arrow = func.kind == FunctionKind::Arrow;
        let scope = Scope::function(&closure.env, (!is_arrow).then(|| this.clone()));

        if !is_arrow {
            if let Some(name) = &func.name {
                scope.declare(name.clone(), Some(callee.clone()), true);
            }
            scope.declare(Rc::from("arguments"), Some(Value::array(args.to_vec())), true);
        }

        let declare = BindMode::Declare(VarKind::Let);
        for (i, param) in func.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_default();
            self.bind_pattern(param, value, &scope, declare)?;
        }
        if let Some(rest) = &func.rest {
            let tail = args.get(func.params.len()..).unwrap_or_default().to_vec();
            self.bind_pattern(rest, Value::array(tail), &scope, declare)?;
        }
        Ok(scope)
    }

    /// Declare the block-scoped names of `body` in `scope`.
    pub(super) fn hoist_block(&mut self, body: &[Stmt], scope: &ScopeRef) {
        for stmt in body {
            match stmt {
                Stmt::Var(kind @ (VarKind::Let | VarKind::Const), decls) => {
                    let mut names = Vec::new();
                    for decl in decls {
                        bound_names(&decl.target, &mut names);
                    }
                    for name in names {
                        scope.declare(name, None, *kind == VarKind::Let);
                    }
                }
                Stmt::Function(func) => {
                    if let Some(name) = &func.name {
                        let value = self.closure(func.clone(), scope);
                        scope.declare(name.clone(), Some(value), true);
                    }
                }
                _ => {}
            }
        }
    }

    fn exec_statements(&mut self, body: &[Stmt], scope: &ScopeRef) -> Result<Flow> {
        for stmt in body {
            self.tick()?;
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &ScopeRef) -> Result<Flow> {
        let inner = Scope::child(scope);
        self.hoist_block(body, &inner);
        self.exec_statements(body, &inner)
    }

    pub(super) fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Var(kind, decls) => {
                self.declare_vars(*kind, decls, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return(arg) => {
                let value = match arg {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If { test, consequent, alternate } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec_stmt(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(body) => self.exec_block(body, scope),
            Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. }
            | Stmt::While { .. }
            | Stmt::DoWhile { .. } => self.exec_loop(stmt, scope, None),
            Stmt::Break(label) => Ok(Flow::Break(label.clone())),
            Stmt::Continue(label) => Ok(Flow::Continue(label.clone())),
            Stmt::Throw(arg) => Err(Abrupt::Throw(self.eval(arg, scope)?)),
            Stmt::Try { block, handler, finalizer } => {
                self.exec_try(block, handler.as_ref(), finalizer.as_deref(), scope)
            }
            Stmt::Switch { discriminant, cases } => self.exec_switch(discriminant, cases, scope),
            Stmt::Labeled { label, body } => {
                let flow = match &**body {
                    loop_stmt @ (Stmt::For { .. }
                    | Stmt::ForIn { .. }
                    | Stmt::ForOf { .. }
                    | Stmt::While { .. }
                    | Stmt::DoWhile { .. }) => self.exec_loop(loop_stmt, scope, Some(label))?,
                    other => self.exec_stmt(other, scope)?,
                };
                match flow {
                    Flow::Break(Some(target)) if target == *label => Ok(Flow::Normal),
                    other => Ok(other),
                }
            }
        }
    }

    fn declare_vars(&mut self, kind: VarKind, decls: &[Declarator], scope: &ScopeRef) -> Result<()> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval(init, scope)?,
                // `var x;` leaves an existing value alone
                None if kind == VarKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&decl.target, value, scope, BindMode::Declare(kind))?;
        }
        Ok(())
    }

    fn exec_loop(&mut self, stmt: &Stmt, scope: &ScopeRef, label: Option<&Name>) -> Result<Flow> {
        match stmt {
            Stmt::While { test, body } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                    let flow = self.exec_stmt(body, scope)?;
                    match loop_control(flow, label) {
                        LoopControl::Next => {}
                        LoopControl::Exit => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    let flow = self.exec_stmt(body, scope)?;
                    match loop_control(flow, label) {
                        LoopControl::Next => {}
                        LoopControl::Exit => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { init, test, update, body } => {
                let loop_scope = Scope::child(scope);
                let mut per_iteration = Vec::new();
                match init {
                    Some(ForInit::Var(kind, decls)) => {
                        if *kind != VarKind::Var {
                            for decl in decls {
                                bound_names(&decl.target, &mut per_iteration);
                            }
                            for name in &per_iteration {
                                loop_scope.declare(name.clone(), None, *kind == VarKind::Let);
                            }
                        }
                        self.declare_vars(*kind, decls, &loop_scope)?;
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.eval(expr, &loop_scope)?;
                    }
                    None => {}
                }

                let mut iteration = copy_iteration(&loop_scope, &per_iteration, scope);
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &iteration)?.truthy() {
                            break;
                        }
                    }
                    let flow = self.exec_stmt(body, &iteration)?;
                    match loop_control(flow, label) {
                        LoopControl::Next => {}
                        LoopControl::Exit => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                    iteration = copy_iteration(&iteration, &per_iteration, scope);
                    if let Some(update) = update {
                        self.eval(update, &iteration)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForIn { left, right, body } => {
                let object = self.eval(right, scope)?;
                let keys = own_keys(&object).into_iter().map(Value::String).collect();
                self.iterate(left, keys, body, scope, label)
            }
            Stmt::ForOf { left, right, body } => {
                let iterable = self.eval(right, scope)?;
                let items = self.iterate_values(&iterable)?;
                self.iterate(left, items, body, scope, label)
            }
            other => self.exec_stmt(other, scope),
        }
    }

    fn iterate(
        &mut self,
        left: &ForHead,
        items: Vec<Value>,
        body: &Stmt,
        scope: &ScopeRef,
        label: Option<&Name>,
    ) -> Result<Flow> {
        for item in items {
            self.tick()?;
            let iteration = Scope::child(scope);
            match left {
                ForHead::Var(kind, pattern) => {
                    self.bind_pattern(pattern, item, &iteration, BindMode::Declare(*kind))?
                }
                ForHead::Target(pattern) => {
                    self.bind_pattern(pattern, item, &iteration, BindMode::Assign)?
                }
            }
            let flow = self.exec_stmt(body, &iteration)?;
            match loop_control(flow, label) {
                LoopControl::Next => {}
                LoopControl::Exit => break,
                LoopControl::Propagate(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        scope: &ScopeRef,
    ) -> Result<Flow> {
        let mut result = self.exec_block(block, scope);
        if let Some(handler) = handler {
            result = match result {
                Err(Abrupt::Throw(thrown)) => {
                    let catch_scope = Scope::child(scope);
                    match &handler.param {
                        Some(param) => self
                            .bind_pattern(param, thrown, &catch_scope, BindMode::Declare(VarKind::Let))
                            .and_then(|()| self.exec_block(&handler.body, &catch_scope)),
                        None => self.exec_block(&handler.body, &catch_scope),
                    }
                }
                other => other,
            };
        }
        if matches!(result, Err(Abrupt::Fatal(_))) {
            return result;
        }
        if let Some(finalizer) = finalizer {
            let flow = self.exec_block(finalizer, scope)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        result
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], scope: &ScopeRef) -> Result<Flow> {
        let value = self.eval(discriminant, scope)?;
        let inner = Scope::child(scope);
        for case in cases {
            self.hoist_block(&case.body, &inner);
        }

        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, &inner)?.strict_equals(&value) {
                    start = Some(i);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|c| c.test.is_none())) else {
            return Ok(Flow::Normal);
        };

        for case in &cases[start..] {
            match self.exec_statements(&case.body, &inner)? {
                Flow::Normal => {}
                Flow::Break(None) => break,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    pub(super) fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &ScopeRef,
        mode: BindMode,
    ) -> Result<()> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, scope, mode),
            Pattern::Member(_) => {
                let reference = self.reference(pattern, scope)?;
                self.write(reference, value, scope)
            }
            Pattern::Default { target, default } => {
                let value = match value {
                    Value::Undefined => self.eval(default, scope)?,
                    other => other,
                };
                self.bind_pattern(target, value, scope, mode)
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_js_string(),
                        value.to_js_string()
                    )));
                }
                let mut used = Vec::with_capacity(props.len());
                for prop in props {
                    let key = self.prop_key(&prop.key, scope)?;
                    let item = self.get(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(&prop.value, item, scope, mode)?;
                }
                if let Some(rest) = rest {
                    let mut object = Object::new(ObjectKind::Plain);
                    for (key, item) in own_entries(&value) {
                        if !used.contains(&key) {
                            object.set(key, item);
                        }
                    }
                    let remaining = Value::Object(Rc::new(RefCell::new(object)));
                    self.bind_pattern(rest, remaining, scope, mode)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate_values(&value)?;
                for (i, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(i).cloned().unwrap_or_default();
                        self.bind_pattern(element, item, scope, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::array(tail), scope, mode)?;
                }
                Ok(())
            }
        }
    }

    fn bind_name(&mut self, name: &Name, value: Value, scope: &ScopeRef, mode: BindMode) -> Result<()> {
        match mode {
            BindMode::Declare(VarKind::Var) => {
                if scope.assign(name, value.clone()).is_err() {
                    scope.declare(name.clone(), Some(value), true);
                }
                Ok(())
            }
            BindMode::Declare(kind) => {
                scope.declare(name.clone(), Some(value), kind == VarKind::Let);
                Ok(())
            }
            BindMode::Assign => assign_name(scope, name, value),
        }
    }

    fn reference(&mut self, target: &Pattern, scope: &ScopeRef) -> Result<Reference> {
        match target {
            Pattern::Ident(name) => Ok(Reference::Binding(name.clone())),
            Pattern::Member(expr) => match &**expr {
                Expr::Member { object, property, .. } => {
                    let object = self.eval(object, scope)?;
                    let key = self.member_key(property, scope)?;
                    Ok(Reference::Property(object, key))
                }
                _ => Err(throw_error("SyntaxError", "Invalid assignment target")),
            },
            _ => Err(throw_error("SyntaxError", "Invalid assignment target")),
        }
    }

    fn read(&mut self, reference: &Reference, scope: &ScopeRef) -> Result<Value> {
        match reference {
            Reference::Binding(name) => lookup_name(scope, name),
            Reference::Property(object, key) => self.get(object, key),
        }
    }

    fn write(&mut self, reference: Reference, value: Value, scope: &ScopeRef) -> Result<()> {
        match reference {
            Reference::Binding(name) => assign_name(scope, &name, value),
            Reference::Property(object, key) => self.set(&object, &key, value),
        }
    }

    fn member_key(&mut self, property: &MemberProp, scope: &ScopeRef) -> Result<Rc<str>> {
        match property {
            MemberProp::Static(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => Ok(property_key(&self.eval(expr, scope)?)),
        }
    }

    fn prop_key(&mut self, key: &PropKey, scope: &ScopeRef) -> Result<Rc<str>> {
        match key {
            PropKey::Static(name) => Ok(name.clone()),
            PropKey::Computed(expr) => Ok(property_key(&self.eval(expr, scope)?)),
        }
    }

    /// Evaluate an expression.
    pub(crate) fn eval(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(i) {
                        out.push_str(&self.eval(expr, scope)?.to_js_string());
                        self.string_length(out.len())?;
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Regex { pattern, flags } => {
                let regex = self.regex(pattern, flags)?;
                Ok(Value::object(ObjectKind::RegExp(RegExpData {
                    regex,
                    source: pattern.clone(),
                    flags: flags.clone(),
                    last_index: 0,
                })))
            }
            Expr::Ident(name) => lookup_name(scope, name),
            Expr::This => Ok(scope.this()),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Expr(expr) => out.push(self.eval(expr, scope)?),
                        ArrayItem::Spread(expr) => {
                            let value = self.eval(expr, scope)?;
                            out.extend(self.iterate_values(&value)?);
                            self.array_length(out.len() as f64)?;
                        }
                        ArrayItem::Hole => out.push(Value::Undefined),
                    }
                }
                Ok(Value::array(out))
            }
            Expr::Object(items) => {
                let mut object = Object::new(ObjectKind::Plain);
                for item in items {
                    match item {
                        ObjectItem::Prop { key, value, .. } => {
                            let key = self.prop_key(key, scope)?;
                            let value = self.eval(value, scope)?;
                            object.set(key, value);
                        }
                        ObjectItem::Spread(expr) => {
                            let source = self.eval(expr, scope)?;
                            for (key, value) in own_entries(&source) {
                                object.set(key, value);
                            }
                        }
                    }
                }
                Ok(Value::Object(Rc::new(RefCell::new(object))))
            }
            Expr::Function(func) => Ok(self.closure(func.clone(), scope)),
            Expr::Unary(op, arg) => self.eval_unary(*op, arg, scope),
            Expr::Update { op, prefix, target } => {
                let reference = self.reference(target, scope)?;
                let old = to_numeric(&self.read(&reference, scope)?);
                let new = match op {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.write(reference, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                if short_circuits(*op, &left) {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional { test, consequent, alternate } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, scope)?;
                }
                Ok(last)
            }
            Expr::Call { callee, args, optional } => self.eval_call(callee, args, *optional, scope),
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                if !constructor.is_callable() {
                    return Err(type_error(format!("{} is not a constructor", describe(callee))));
                }
                self.construct(&constructor, &args)
            }
            Expr::Member { object, property, optional } => {
                let object = self.eval(object, scope)?;
                if *optional && object.is_nullish() {
                    return Err(Abrupt::ShortCircuit);
                }
                let key = self.member_key(property, scope)?;
                self.get(&object, &key)
            }
            Expr::Chain(inner) => match self.eval(inner, scope) {
                Err(Abrupt::ShortCircuit) => Ok(Value::Undefined),
                other => other,
            },
            // Suspension points only run inside a compiled async body
            Expr::Yield(_) => Err(throw_error("SyntaxError", "await is only valid in async functions")),
        }
    }

    fn eval_unary(&mut self, op: UnaryOperator, arg: &Expr, scope: &ScopeRef) -> Result<Value> {
        match op {
            UnaryOperator::Typeof => {
                if let Expr::Ident(name) = arg {
                    if let Lookup::Missing = scope.lookup(name) {
                        return Ok(Value::from("undefined"));
                    }
                }
                Ok(Value::from(self.eval(arg, scope)?.type_of()))
            }
            UnaryOperator::Delete => match arg {
                Expr::Member { object, property, .. } => {
                    let object = self.eval(object, scope)?;
                    let key = self.member_key(property, scope)?;
                    Ok(Value::Bool(self.delete(&object, &key)?))
                }
                other => {
                    self.eval(other, scope)?;
                    Ok(Value::Bool(true))
                }
            },
            _ => {
                let value = self.eval(arg, scope)?;
                Ok(match op {
                    UnaryOperator::Void | UnaryOperator::Typeof | UnaryOperator::Delete => Value::Undefined,
                    UnaryOperator::LogicalNot => Value::Bool(!value.truthy()),
                    UnaryOperator::UnaryNegation => Value::Number(-to_numeric(&value)),
                    UnaryOperator::UnaryPlus => Value::Number(to_numeric(&value)),
                    UnaryOperator::BitwiseNot => Value::Number(f64::from(!to_int32(to_numeric(&value)))),
                })
            }
        }
    }

    fn eval_assign(&mut self, op: AssignmentOperator, target: &Pattern, value: &Expr, scope: &ScopeRef) -> Result<Value> {
        if op == AssignmentOperator::Assign {
            if let Pattern::Member(_) = target {
                let reference = self.reference(target, scope)?;
                let value = self.eval(value, scope)?;
                self.write(reference, value.clone(), scope)?;
                return Ok(value);
            }
            let value = self.eval(value, scope)?;
            self.bind_pattern(target, value.clone(), scope, BindMode::Assign)?;
            return Ok(value);
        }

        let reference = self.reference(target, scope)?;
        let current = self.read(&reference, scope)?;
        if let Some(logical) = op.to_logical_operator() {
            if short_circuits(logical, &current) {
                return Ok(current);
            }
            let value = self.eval(value, scope)?;
            self.write(reference, value.clone(), scope)?;
            return Ok(value);
        }

        let operand = self.eval(value, scope)?;
        let binary = op
            .to_binary_operator()
            .ok_or_else(|| throw_error("SyntaxError", "Invalid assignment operator"))?;
        let result = self.binary(binary, &current, &operand)?;
        self.write(reference, result.clone(), scope)?;
        Ok(result)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], optional: bool, scope: &ScopeRef) -> Result<Value> {
        let (func, this) = match callee {
            Expr::Member { object, property, optional: member_optional } => {
                let object = self.eval(object, scope)?;
                if *member_optional && object.is_nullish() {
                    return Err(Abrupt::ShortCircuit);
                }
                let key = self.member_key(property, scope)?;
                let func = self.get(&object, &key)?;
                (func, object)
            }
            other => (self.eval(other, scope)?, Value::Undefined),
        };
        if optional && func.is_nullish() {
            return Err(Abrupt::ShortCircuit);
        }
        let args = self.eval_args(args, scope)?;
        if !func.is_callable() {
            return Err(type_error(format!("{} is not a function", describe(callee))));
        }
        self.call(&func, &this, &args)
    }

    fn eval_args(&mut self, args: &[Arg], scope: &ScopeRef) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Expr(expr) => out.push(self.eval(expr, scope)?),
                Arg::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.extend(self.iterate_values(&value)?);
                    self.array_length(out.len() as f64)?;
                }
            }
        }
        Ok(out)
    }

    /// Items produced by iterating `value` (arrays and strings).
    pub(crate) fn iterate_values(&mut self, value: &Value) -> Result<Vec<Value>> {
        match value {
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(items) | ObjectKind::Set(items) => Ok(items.clone()),
                ObjectKind::Map(entries) => Ok(entries
                    .iter()
                    .map(|(key, value)| Value::array(vec![key.clone(), value.clone()]))
                    .collect()),
                _ => Err(type_error("object is not iterable")),
            },
            other => Err(type_error(format!("{} is not iterable", other.to_js_string()))),
        }
    }

    /// Apply a binary operator.
    pub(crate) fn binary(&mut self, op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
        use BinaryOperator as B;

        let number = |f: fn(f64, f64) -> f64| Value::Number(f(to_numeric(left), to_numeric(right)));
        let int32 = |f: fn(i32, i32) -> i32| {
            Value::Number(f64::from(f(to_int32(to_numeric(left)), to_int32(to_numeric(right)))))
        };
        let shift = (to_uint32(to_numeric(right)) & 31) as i32;

        Ok(match op {
            B::Equality => Value::Bool(left.loose_equals(right)),
            B::Inequality => Value::Bool(!left.loose_equals(right)),
            B::StrictEquality => Value::Bool(left.strict_equals(right)),
            B::StrictInequality => Value::Bool(!left.strict_equals(right)),
            B::LessThan => Value::Bool(compare(left, right) == Some(Ordering::Less)),
            B::LessEqualThan => {
                Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)))
            }
            B::GreaterThan => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
            B::GreaterEqualThan => {
                Value::Bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)))
            }
            B::Addition => {
                let (l, r) = (to_primitive(left), to_primitive(right));
                if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                    let (l, r) = (l.to_js_string(), r.to_js_string());
                    self.string_length(l.len() + r.len())?;
                    Value::from(format!("{l}{r}"))
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            B::Subtraction => number(|a, b| a - b),
            B::Multiplication => number(|a, b| a * b),
            B::Division => number(|a, b| a / b),
            B::Remainder => number(|a, b| a % b),
            B::Exponential => number(|a, b| {
                if b.is_infinite() && a.abs() == 1.0 {
                    f64::NAN
                } else {
                    a.powf(b)
                }
            }),
            B::ShiftLeft => Value::Number(f64::from(to_int32(to_numeric(left)).wrapping_shl(shift as u32))),
            B::ShiftRight => Value::Number(f64::from(to_int32(to_numeric(left)) >> shift)),
            B::ShiftRightZeroFill => Value::Number(f64::from(to_uint32(to_numeric(left)) >> shift)),
            B::BitwiseOR => int32(|a, b| a | b),
            B::BitwiseXOR => int32(|a, b| a ^ b),
            B::BitwiseAnd => int32(|a, b| a & b),
            B::In => Value::Bool(self.has_property(right, &property_key(left))?),
            B::Instanceof => Value::Bool(instance_of(left, right)?),
        })
    }
}

fn lookup_name(scope: &ScopeRef, name: &str) -> Result<Value> {
    match scope.lookup(name) {
        Lookup::Found(value) => Ok(value),
        Lookup::Uninitialized => Err(reference_error(format!(
            "Cannot access '{name}' before initialization"
        ))),
        Lookup::Missing => Err(reference_error(format!("{name} is not defined"))),
    }
}

fn assign_name(scope: &ScopeRef, name: &str, value: Value) -> Result<()> {
    match scope.assign(name, value) {
        Ok(()) => Ok(()),
        Err(AssignError::Missing) => Err(reference_error(format!("{name} is not defined"))),
        Err(AssignError::Constant) => Err(type_error("Assignment to constant variable.")),
        Err(AssignError::Uninitialized) => Err(reference_error(format!(
            "Cannot access '{name}' before initialization"
        ))),
    }
}

pub(super) fn short_circuits(op: LogicalOperator, left: &Value) -> bool {
    match op {
        LogicalOperator::Or => left.truthy(),
        LogicalOperator::And => !left.truthy(),
        LogicalOperator::Coalesce => !left.is_nullish(),
    }
}

fn loop_control(flow: Flow, label: Option<&Name>) -> LoopControl {
    match flow {
        Flow::Normal | Flow::Continue(None) => LoopControl::Next,
        Flow::Continue(Some(target)) if Some(&target) == label => LoopControl::Next,
        Flow::Break(None) => LoopControl::Exit,
        Flow::Break(Some(target)) if Some(&target) == label => LoopControl::Exit,
        other => LoopControl::Propagate(other),
    }
}

/// Fresh per-iteration scope for `for (let ...)` loops.
pub(super) fn copy_iteration(from: &ScopeRef, names: &[Name], parent: &ScopeRef) -> ScopeRef {
    if names.is_empty() {
        return from.clone();
    }
    let next = Scope::child(parent);
    for name in names {
        match from.own(name) {
            Some((value, mutable)) => next.declare(name.clone(), Some(value), mutable),
            None => next.declare(name.clone(), None, true),
        }
    }
    next
}

/// Names introduced by a binding pattern.
pub(super) fn bound_names(pattern: &Pattern, out: &mut Vec<Name>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Member(_) => {}
        Pattern::Object { props, rest } => {
            for prop in props {
                bound_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                bound_names(rest, out);
            }
        }
        Pattern::Array { elements, rest } => {
            for element in elements.iter().flatten() {
                bound_names(element, out);
            }
            if let Some(rest) = rest {
                bound_names(rest, out);
            }
        }
        Pattern::Default { target, .. } => bound_names(target, out),
    }
}

/// Hoist `var` declarations anywhere in a function body (not nested functions).
pub(super) fn hoist_vars(body: &[Stmt], scope: &Scope) {
    for stmt in body {
        hoist_var_stmt(stmt, scope);
    }
}

fn hoist_var_stmt(stmt: &Stmt, scope: &Scope) {
    let mut names = Vec::new();
    match stmt {
        Stmt::Var(VarKind::Var, decls) => {
            for decl in decls {
                bound_names(&decl.target, &mut names);
            }
        }
        Stmt::If { consequent, alternate, .. } => {
            hoist_var_stmt(consequent, scope);
            if let Some(alternate) = alternate {
                hoist_var_stmt(alternate, scope);
            }
        }
        Stmt::Block(body) => hoist_vars(body, scope),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Var(VarKind::Var, decls)) = init {
                for decl in decls {
                    bound_names(&decl.target, &mut names);
                }
            }
            hoist_var_stmt(body, scope);
        }
        Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
            if let ForHead::Var(VarKind::Var, pattern) = left {
                bound_names(pattern, &mut names);
            }
            hoist_var_stmt(body, scope);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            hoist_var_stmt(body, scope)
        }
        Stmt::Try { block, handler, finalizer } => {
            hoist_vars(block, scope);
            if let Some(handler) = handler {
                hoist_vars(&handler.body, scope);
            }
            if let Some(finalizer) = finalizer {
                hoist_vars(finalizer, scope);
            }
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                hoist_vars(&case.body, scope);
            }
        }
        _ => {}
    }
    for name in &names {
        scope.declare_var(name);
    }
}

/// Short source-like description of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member { object, property: MemberProp::Static(name), .. } => {
            format!("{}.{name}", describe(object))
        }
        Expr::Member { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        Expr::Chain(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

/// ToPrimitive with the default hint.
pub(crate) fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::AnimatedValue(n) => Value::Number(*n),
            _ => Value::String(value.to_js_string()),
        },
        other => other.clone(),
    }
}

/// ToPrimitive with a number hint: dates yield their time value.
fn to_primitive_number(value: &Value) -> Value {
    match value {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Date(time) => Value::Number(*time),
            _ => to_primitive(value),
        },
        other => other.clone(),
    }
}

/// ToNumber, converting objects through their primitive form.
pub(crate) fn to_numeric(value: &Value) -> f64 {
    to_primitive_number(value).to_number()
}

pub(crate) fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (to_primitive_number(left), to_primitive_number(right)) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

fn instance_of(left: &Value, right: &Value) -> Result<bool> {
    let Value::Object(constructor) = right else {
        return Err(type_error("Right-hand side of 'instanceof' is not callable"));
    };
    if !right.is_callable() {
        return Err(type_error("Right-hand side of 'instanceof' is not callable"));
    }
    let Value::Object(obj) = left else {
        return Ok(false);
    };

    let object = obj.borrow();
    if let Some(own) = &object.constructor {
        if Rc::ptr_eq(own, constructor) {
            return Ok(true);
        }
    }
    let name = match &constructor.borrow().kind {
        ObjectKind::Function(Callable::Native(native)) => native.name.clone(),
        _ => return Ok(false),
    };
    Ok(match (&*name, &object.kind) {
        ("Object", _) | ("Error", ObjectKind::Error) => true,
        (expected, ObjectKind::Error) => {
            matches!(object.get("name"), Some(Value::String(actual)) if &**actual == expected)
        }
        ("Array", ObjectKind::Array(_))
        | ("Promise", ObjectKind::Promise(_))
        | ("RegExp", ObjectKind::RegExp(_))
        | ("Date", ObjectKind::Date(_))
        | ("Map", ObjectKind::Map(_))
        | ("Set", ObjectKind::Set(_))
        | ("Function", ObjectKind::Function(_)) => true,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_conversion_wraps() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn primitives_for_arrays() {
        let arr = Value::array(vec![Value::from(5.0)]);
        assert_eq!(to_numeric(&arr), 5.0);
        assert_eq!(compare(&Value::from("a"), &Value::from("b")), Some(Ordering::Less));
        assert_eq!(compare(&Value::Number(f64::NAN), &Value::Number(1.0)), None);
    }

    #[test]
    fn callee_descriptions() {
        let expr = Expr::dotted("props.navigation.navigate");
        assert_eq!(describe(&expr), "props.navigation.navigate");
    }
}
