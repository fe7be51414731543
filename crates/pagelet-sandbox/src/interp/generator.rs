//! Resumable execution of lowered async bodies.
//!
//! Async functions reach the interpreter as generator functions whose
//! `yield`s mark the suspension points. A generator body is compiled once
//! into a flat [`Program`], so a suspended call is just a program counter
//! plus the scopes, handlers and loop iterators it had open. The driver
//! resumes it from promise reactions, one microtask per `await`.
//!
//! Statements without a suspension point stay whole and run on the
//! tree-walker. Expressions that suspend are flattened: operands evaluated
//! before the pause are spilled into hidden bindings of the function scope
//! so evaluation order survives it.

use std::cell::RefCell;
use std::rc::Rc;

use pagelet_transpile::ast::{
    Arg, ArrayItem, AssignmentOperator, Declarator, Expr, ForHead, ForInit, Function, FunctionBody,
    FunctionKind, LogicalOperator, MemberProp, Name, ObjectItem, Pattern, PropKey, Stmt, VarKind,
};

use crate::builtins::promise;
use crate::value::{Callable, ObjRef, Value};

use super::eval::{bound_names, copy_iteration, hoist_vars, short_circuits, BindMode};
use super::scope::{Lookup, Scope, ScopeRef};
use super::{callable_of, own_keys, throw_error, type_error, Abrupt, Flow, Interp};

type Result<T> = std::result::Result<T, Abrupt>;

/// Index into [`Program::labels`].
type Label = usize;

/// A compiled generator body.
pub(super) struct Program {
    ops: Vec<Op>,
    /// Label to op index
    labels: Vec<usize>,
    /// Hidden bindings declared in the function scope
    temps: Vec<Name>,
}

enum Op {
    /// Run a statement that cannot suspend
    Exec { stmt: Stmt, exits: Rc<[Exit]> },
    Eval { expr: Expr, into: Option<Name> },
    /// Suspend on `operand`; the settled value lands in `into`
    Await { operand: Expr, into: Name },
    Bind { target: Pattern, value: Expr, mode: BindMode },
    EnterScope { hoist: Vec<Stmt> },
    ExitScope,
    /// Fresh copy of the innermost scope for the next `for (let ...)` pass
    NextIteration { names: Vec<Name> },
    Goto(Label),
    Branch { test: Expr, when: bool, to: Label },
    ShortCircuit { op: LogicalOperator, value: Name, to: Label },
    CaseMatch { subject: Name, test: Expr, to: Label },
    IterStart { iterable: Expr, keys: bool },
    IterNext { head: ForHead, exit: Label },
    IterEnd,
    TryEnter { catch: Option<Label>, finally: Option<Label>, after: Label },
    Catch { param: Option<Pattern> },
    TryExit,
    FinallyEnd,
    Return(Option<Expr>),
    Throw(Expr),
}

/// Where a jump lands and how much open state survives it.
#[derive(Debug, Clone, Copy)]
struct Target {
    label: Label,
    scopes: usize,
    handlers: usize,
    iters: usize,
}

/// A `break`/`continue` destination visible from a statement.
#[derive(Debug, Clone)]
struct Exit {
    labels: Vec<Name>,
    kind: ExitKind,
    on_break: Target,
    on_continue: Option<Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    Loop,
    Switch,
    Block,
}

fn find_break(exits: &[Exit], label: Option<&Name>) -> Option<Target> {
    exits
        .iter()
        .rev()
        .find(|exit| match label {
            Some(label) => exit.labels.contains(label),
            None => exit.kind != ExitKind::Block,
        })
        .map(|exit| exit.on_break)
}

fn find_continue(exits: &[Exit], label: Option<&Name>) -> Option<Target> {
    exits
        .iter()
        .rev()
        .filter(|exit| exit.kind == ExitKind::Loop)
        .find(|exit| label.map_or(true, |label| exit.labels.contains(label)))
        .and_then(|exit| exit.on_continue)
}

fn unsupported_pattern() -> Abrupt {
    throw_error("SyntaxError", "await is not supported inside a destructuring pattern")
}

struct Compiler {
    ops: Vec<Op>,
    labels: Vec<usize>,
    temps: Vec<Name>,
    scopes: usize,
    handlers: usize,
    iters: usize,
    exits: Vec<Exit>,
    /// Labels waiting for the statement they name
    pending_labels: Vec<Name>,
}

impl Compiler {
    fn compile(body: &[Stmt]) -> Result<Program> {
        let mut compiler = Self {
            ops: Vec::new(),
            labels: Vec::new(),
            temps: Vec::new(),
            scopes: 1,
            handlers: 0,
            iters: 0,
            exits: Vec::new(),
            pending_labels: Vec::new(),
        };
        for stmt in body {
            compiler.stmt(stmt)?;
        }
        Ok(Program { ops: compiler.ops, labels: compiler.labels, temps: compiler.temps })
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn label(&mut self) -> Label {
        self.labels.push(usize::MAX);
        self.labels.len() - 1
    }

    fn place(&mut self, label: Label) {
        self.labels[label] = self.ops.len();
    }

    fn temp(&mut self) -> Name {
        let name: Name = Rc::from(format!("%{}", self.temps.len()));
        self.temps.push(name.clone());
        name
    }

    fn target(&self, label: Label) -> Target {
        Target { label, scopes: self.scopes, handlers: self.handlers, iters: self.iters }
    }

    fn exec(&mut self, stmt: Stmt) {
        let exits = Rc::from(self.exits.as_slice());
        self.emit(Op::Exec { stmt, exits });
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        let labels = std::mem::take(&mut self.pending_labels);
        if !stmt_suspends(stmt) {
            if !matches!(stmt, Stmt::Function(_) | Stmt::Empty) {
                let stmt = labels
                    .into_iter()
                    .rev()
                    .fold(stmt.clone(), |body, label| Stmt::Labeled { label, body: Box::new(body) });
                self.exec(stmt);
            }
            return Ok(());
        }

        match stmt {
            Stmt::Labeled { label, body } => {
                self.pending_labels = labels;
                self.pending_labels.push(label.clone());
                self.stmt(body)
            }
            Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. } => self.loop_stmt(stmt, labels),
            Stmt::Switch { discriminant, cases } => {
                let value = self.expr(discriminant)?;
                let subject = self.temp();
                self.emit(Op::Eval { expr: value, into: Some(subject.clone()) });
                let hoist = cases.iter().flat_map(|case| lexical(&case.body)).collect();
                self.emit(Op::EnterScope { hoist });
                self.scopes += 1;

                let exit = self.label();
                let entries: Vec<Label> = cases.iter().map(|_| self.label()).collect();
                for (case, &entry) in cases.iter().zip(&entries) {
                    if let Some(test) = &case.test {
                        let test = self.expr(test)?;
                        self.emit(Op::CaseMatch { subject: subject.clone(), test, to: entry });
                    }
                }
                let fallback = cases.iter().position(|case| case.test.is_none());
                self.emit(Op::Goto(fallback.map_or(exit, |i| entries[i])));

                let on_break = self.target(exit);
                self.exits.push(Exit { labels, kind: ExitKind::Switch, on_break, on_continue: None });
                for (case, &entry) in cases.iter().zip(&entries) {
                    self.place(entry);
                    for stmt in &case.body {
                        self.stmt(stmt)?;
                    }
                }
                self.exits.pop();
                self.place(exit);
                self.emit(Op::ExitScope);
                self.scopes -= 1;
                Ok(())
            }
            other => self.with_break_label(labels, |c| c.plain(other)),
        }
    }

    /// Compile `f` so a labeled `break` out of it lands after it.
    fn with_break_label(&mut self, labels: Vec<Name>, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if labels.is_empty() {
            return f(self);
        }
        let end = self.label();
        let on_break = self.target(end);
        self.exits.push(Exit { labels, kind: ExitKind::Block, on_break, on_continue: None });
        f(self)?;
        self.exits.pop();
        self.place(end);
        Ok(())
    }

    fn plain(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                let expr = self.expr(expr)?;
                self.emit(Op::Eval { expr, into: None });
            }
            Stmt::Var(kind, decls) => self.declarations(*kind, decls)?,
            Stmt::Return(arg) => {
                let value = match arg {
                    Some(expr) => Some(self.expr(expr)?),
                    None => None,
                };
                self.emit(Op::Return(value));
            }
            Stmt::Throw(expr) => {
                let expr = self.expr(expr)?;
                self.emit(Op::Throw(expr));
            }
            Stmt::If { test, consequent, alternate } => {
                let test = self.expr(test)?;
                let (otherwise, end) = (self.label(), self.label());
                self.emit(Op::Branch { test, when: false, to: otherwise });
                self.stmt(consequent)?;
                self.emit(Op::Goto(end));
                self.place(otherwise);
                if let Some(alternate) = alternate {
                    self.stmt(alternate)?;
                }
                self.place(end);
            }
            Stmt::Block(body) => self.block(body)?,
            Stmt::Try { block, handler, finalizer } => {
                let catch = handler.as_ref().map(|_| self.label());
                let finally = finalizer.as_ref().map(|_| self.label());
                let after = self.label();
                self.emit(Op::TryEnter { catch, finally, after });
                self.handlers += 1;
                self.block(block)?;
                self.emit(Op::TryExit);

                if let (Some(label), Some(handler)) = (catch, handler) {
                    if handler.param.as_ref().is_some_and(pattern_suspends) {
                        return Err(unsupported_pattern());
                    }
                    self.place(label);
                    self.emit(Op::Catch { param: handler.param.clone() });
                    self.scopes += 1;
                    self.block(&handler.body)?;
                    self.emit(Op::ExitScope);
                    self.scopes -= 1;
                    self.emit(Op::TryExit);
                }
                if let (Some(label), Some(finalizer)) = (finally, finalizer) {
                    self.place(label);
                    self.block(finalizer)?;
                    self.emit(Op::FinallyEnd);
                }
                self.place(after);
                self.handlers -= 1;
            }
            other => self.exec(other.clone()),
        }
        Ok(())
    }

    fn block(&mut self, body: &[Stmt]) -> Result<()> {
        self.emit(Op::EnterScope { hoist: lexical(body) });
        self.scopes += 1;
        for stmt in body {
            self.stmt(stmt)?;
        }
        self.emit(Op::ExitScope);
        self.scopes -= 1;
        Ok(())
    }

    fn declarations(&mut self, kind: VarKind, decls: &[Declarator]) -> Result<()> {
        for decl in decls {
            if pattern_suspends(&decl.target) {
                return Err(unsupported_pattern());
            }
            match &decl.init {
                Some(init) if expr_suspends(init) => {
                    let value = self.expr(init)?;
                    self.emit(Op::Bind { target: decl.target.clone(), value, mode: BindMode::Declare(kind) });
                }
                _ => self.exec(Stmt::Var(kind, vec![decl.clone()])),
            }
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt, labels: Vec<Name>, on_break: Target, next: Label) -> Result<()> {
        let on_continue = Some(self.target(next));
        self.exits.push(Exit { labels, kind: ExitKind::Loop, on_break, on_continue });
        self.stmt(body)?;
        self.exits.pop();
        Ok(())
    }

    fn loop_stmt(&mut self, stmt: &Stmt, labels: Vec<Name>) -> Result<()> {
        let (top, next, exit) = (self.label(), self.label(), self.label());
        match stmt {
            Stmt::While { test, body } => {
                self.place(top);
                self.place(next);
                let test = self.expr(test)?;
                self.emit(Op::Branch { test, when: false, to: exit });
                let on_break = self.target(exit);
                self.loop_body(body, labels, on_break, next)?;
                self.emit(Op::Goto(top));
                self.place(exit);
            }
            Stmt::DoWhile { body, test } => {
                self.place(top);
                let on_break = self.target(exit);
                self.loop_body(body, labels, on_break, next)?;
                self.place(next);
                let test = self.expr(test)?;
                self.emit(Op::Branch { test, when: true, to: top });
                self.place(exit);
            }
            Stmt::For { init, test, update, body } => {
                let mut names = Vec::new();
                let mut hoist = Vec::new();
                if let Some(ForInit::Var(kind, decls)) = init {
                    if *kind != VarKind::Var {
                        for decl in decls {
                            bound_names(&decl.target, &mut names);
                        }
                        hoist.push(Stmt::Var(*kind, decls.clone()));
                    }
                }
                self.emit(Op::EnterScope { hoist });
                self.scopes += 1;
                match init {
                    Some(ForInit::Var(kind, decls)) => self.declarations(*kind, decls)?,
                    Some(ForInit::Expr(expr)) => self.stmt(&Stmt::Expr(expr.clone()))?,
                    None => {}
                }
                self.emit(Op::NextIteration { names: names.clone() });

                self.place(top);
                if let Some(test) = test {
                    let test = self.expr(test)?;
                    self.emit(Op::Branch { test, when: false, to: exit });
                }
                let on_break = self.target(exit);
                self.loop_body(body, labels, on_break, next)?;
                self.place(next);
                self.emit(Op::NextIteration { names });
                if let Some(update) = update {
                    self.stmt(&Stmt::Expr(update.clone()))?;
                }
                self.emit(Op::Goto(top));
                self.place(exit);
                self.emit(Op::ExitScope);
                self.scopes -= 1;
            }
            Stmt::ForIn { left, right, body } | Stmt::ForOf { left, right, body } => {
                let (ForHead::Var(_, pattern) | ForHead::Target(pattern)) = left;
                if pattern_suspends(pattern) {
                    return Err(unsupported_pattern());
                }
                let iterable = self.expr(right)?;
                self.emit(Op::IterStart { iterable, keys: matches!(stmt, Stmt::ForIn { .. }) });
                self.iters += 1;

                self.place(top);
                self.emit(Op::IterNext { head: left.clone(), exit });
                let on_break = self.target(exit);
                self.scopes += 1;
                self.loop_body(body, labels, on_break, next)?;
                self.place(next);
                self.emit(Op::ExitScope);
                self.scopes -= 1;
                self.emit(Op::Goto(top));

                self.place(exit);
                self.emit(Op::IterEnd);
                self.iters -= 1;
            }
            other => self.plain(other)?,
        }
        Ok(())
    }

    /// Emit the suspending parts of `expr`; returns what is left to evaluate.
    fn expr(&mut self, expr: &Expr) -> Result<Expr> {
        if !expr_suspends(expr) {
            return Ok(expr.clone());
        }
        match expr {
            Expr::Yield(operand) => {
                let operand = self.expr(operand)?;
                let into = self.temp();
                self.emit(Op::Await { operand, into: into.clone() });
                Ok(Expr::Ident(into))
            }
            Expr::Logical(op, left, right) => {
                let left = self.expr(left)?;
                if !expr_suspends(right) {
                    return Ok(Expr::Logical(*op, Box::new(left), right.clone()));
                }
                let value = self.temp();
                let end = self.label();
                self.emit(Op::Eval { expr: left, into: Some(value.clone()) });
                self.emit(Op::ShortCircuit { op: *op, value: value.clone(), to: end });
                let right = self.expr(right)?;
                self.emit(Op::Eval { expr: right, into: Some(value.clone()) });
                self.place(end);
                Ok(Expr::Ident(value))
            }
            Expr::Conditional { test, consequent, alternate } => {
                let test = self.expr(test)?;
                if !expr_suspends(consequent) && !expr_suspends(alternate) {
                    return Ok(Expr::Conditional {
                        test: Box::new(test),
                        consequent: consequent.clone(),
                        alternate: alternate.clone(),
                    });
                }
                let value = self.temp();
                let (otherwise, end) = (self.label(), self.label());
                self.emit(Op::Branch { test, when: false, to: otherwise });
                let consequent = self.expr(consequent)?;
                self.emit(Op::Eval { expr: consequent, into: Some(value.clone()) });
                self.emit(Op::Goto(end));
                self.place(otherwise);
                let alternate = self.expr(alternate)?;
                self.emit(Op::Eval { expr: alternate, into: Some(value.clone()) });
                self.place(end);
                Ok(Expr::Ident(value))
            }
            Expr::Sequence(exprs) => {
                let Some((last, init)) = exprs.split_last() else {
                    return Ok(expr.clone());
                };
                for expr in init {
                    let expr = self.expr(expr)?;
                    self.emit(Op::Eval { expr, into: None });
                }
                self.expr(last)
            }
            Expr::Assign { op, target, value } if *op != AssignmentOperator::Assign => {
                self.compound(*op, target, value)
            }
            Expr::Assign { target, .. }
                if !matches!(**target, Pattern::Member(_)) && pattern_suspends(target) =>
            {
                Err(unsupported_pattern())
            }
            _ => {
                let mut lowered = expr.clone();
                let mut parts = operands(&mut lowered);
                let last = parts.iter().rposition(|part| expr_suspends(part));
                for (i, part) in parts.iter_mut().enumerate() {
                    match last {
                        Some(last) if i < last => {
                            let value = self.expr(part)?;
                            **part = self.spill(value);
                        }
                        Some(last) if i == last => **part = self.expr(part)?,
                        _ => {}
                    }
                }
                drop(parts);
                Ok(lowered)
            }
        }
    }

    /// `target op= value` where `value` suspends.
    fn compound(&mut self, op: AssignmentOperator, target: &Pattern, value: &Expr) -> Result<Expr> {
        let (place, read) = match target {
            Pattern::Ident(name) => (target.clone(), Expr::Ident(name.clone())),
            Pattern::Member(member) => {
                let member = self.pin_member(member)?;
                (Pattern::Member(Box::new(member.clone())), member)
            }
            _ => return Err(throw_error("SyntaxError", "Invalid assignment target")),
        };
        if let Some(logical) = op.to_logical_operator() {
            let assign = Expr::Assign {
                op: AssignmentOperator::Assign,
                target: Box::new(place),
                value: Box::new(value.clone()),
            };
            return self.expr(&Expr::Logical(logical, Box::new(read), Box::new(assign)));
        }
        let binary = op
            .to_binary_operator()
            .ok_or_else(|| throw_error("SyntaxError", "Invalid assignment operator"))?;
        let current = self.spill(read);
        let operand = self.expr(value)?;
        Ok(Expr::Assign {
            op: AssignmentOperator::Assign,
            target: Box::new(place),
            value: Box::new(Expr::Binary(binary, Box::new(current), Box::new(operand))),
        })
    }

    /// `object[key]` with object and key evaluated now.
    fn pin_member(&mut self, member: &Expr) -> Result<Expr> {
        let Expr::Member { object, property, optional } = member else {
            return Err(throw_error("SyntaxError", "Invalid assignment target"));
        };
        let object = self.expr(object)?;
        let object = self.spill(object);
        let property = match property {
            MemberProp::Static(name) => MemberProp::Static(name.clone()),
            MemberProp::Computed(key) => {
                let key = self.expr(key)?;
                MemberProp::Computed(Box::new(self.spill(key)))
            }
        };
        Ok(Expr::Member { object: Box::new(object), property, optional: *optional })
    }

    /// Evaluate `expr` now and refer to the result later.
    fn spill(&mut self, expr: Expr) -> Expr {
        match &expr {
            Expr::Null | Expr::Bool(_) | Expr::Number(_) | Expr::Str(_) | Expr::This => expr,
            Expr::Ident(name) if name.starts_with('%') => expr,
            _ => {
                let into = self.temp();
                self.emit(Op::Eval { expr, into: Some(into.clone()) });
                Expr::Ident(into)
            }
        }
    }
}

/// Block-scoped declarations of `body`, for hoisting.
fn lexical(body: &[Stmt]) -> Vec<Stmt> {
    body.iter()
        .filter(|stmt| matches!(stmt, Stmt::Var(VarKind::Let | VarKind::Const, _) | Stmt::Function(_)))
        .cloned()
        .collect()
}

/// Operands of `expr` in evaluation order. Callees and assignment targets
/// contribute their object and key so the member itself is kept.
fn operands(expr: &mut Expr) -> Vec<&mut Expr> {
    match expr {
        Expr::Template { exprs, .. } | Expr::Sequence(exprs) => exprs.iter_mut().collect(),
        Expr::Array(items) => items
            .iter_mut()
            .filter_map(|item| match item {
                ArrayItem::Expr(expr) | ArrayItem::Spread(expr) => Some(expr),
                ArrayItem::Hole => None,
            })
            .collect(),
        Expr::Object(items) => items.iter_mut().flat_map(item_operands).collect(),
        Expr::Unary(_, arg) | Expr::Chain(arg) | Expr::Yield(arg) => vec![&mut **arg],
        Expr::Update { target, .. } => match &mut **target {
            Pattern::Member(member) => member_operands(member),
            _ => Vec::new(),
        },
        Expr::Binary(_, left, right) | Expr::Logical(_, left, right) => vec![&mut **left, &mut **right],
        Expr::Conditional { test, consequent, alternate } => {
            vec![&mut **test, &mut **consequent, &mut **alternate]
        }
        Expr::Assign { target, value, .. } => {
            let mut parts = match &mut **target {
                Pattern::Member(member) => member_operands(member),
                _ => Vec::new(),
            };
            parts.push(&mut **value);
            parts
        }
        Expr::Call { callee, args, .. } => {
            let mut parts = member_operands(callee);
            parts.extend(args.iter_mut().map(arg_operand));
            parts
        }
        Expr::New { callee, args } => {
            let mut parts = vec![&mut **callee];
            parts.extend(args.iter_mut().map(arg_operand));
            parts
        }
        Expr::Member { object, property, .. } => {
            let mut parts = vec![&mut **object];
            if let MemberProp::Computed(key) = property {
                parts.push(&mut **key);
            }
            parts
        }
        _ => Vec::new(),
    }
}

fn item_operands(item: &mut ObjectItem) -> Vec<&mut Expr> {
    match item {
        ObjectItem::Prop { key: PropKey::Computed(key), value, .. } => vec![&mut **key, value],
        ObjectItem::Prop { value, .. } => vec![value],
        ObjectItem::Spread(expr) => vec![expr],
    }
}

fn member_operands(expr: &mut Expr) -> Vec<&mut Expr> {
    if matches!(expr, Expr::Member { .. }) {
        operands(expr)
    } else {
        vec![expr]
    }
}

fn arg_operand(arg: &mut Arg) -> &mut Expr {
    match arg {
        Arg::Expr(expr) | Arg::Spread(expr) => expr,
    }
}

fn expr_suspends(expr: &Expr) -> bool {
    match expr {
        Expr::Yield(_) => true,
        Expr::Null
        | Expr::Bool(_)
        | Expr::Number(_)
        | Expr::Str(_)
        | Expr::Regex { .. }
        | Expr::Ident(_)
        | Expr::This
        | Expr::Function(_) => false,
        Expr::Template { exprs, .. } | Expr::Sequence(exprs) => exprs.iter().any(expr_suspends),
        Expr::Array(items) => items.iter().any(|item| match item {
            ArrayItem::Expr(expr) | ArrayItem::Spread(expr) => expr_suspends(expr),
            ArrayItem::Hole => false,
        }),
        Expr::Object(items) => items.iter().any(|item| match item {
            ObjectItem::Prop { key, value, .. } => key_suspends(key) || expr_suspends(value),
            ObjectItem::Spread(expr) => expr_suspends(expr),
        }),
        Expr::Unary(_, arg) | Expr::Chain(arg) => expr_suspends(arg),
        Expr::Update { target, .. } => pattern_suspends(target),
        Expr::Binary(_, left, right) | Expr::Logical(_, left, right) => {
            expr_suspends(left) || expr_suspends(right)
        }
        Expr::Conditional { test, consequent, alternate } => {
            expr_suspends(test) || expr_suspends(consequent) || expr_suspends(alternate)
        }
        Expr::Assign { target, value, .. } => pattern_suspends(target) || expr_suspends(value),
        Expr::Call { callee, args, .. } | Expr::New { callee, args } => {
            expr_suspends(callee)
                || args.iter().any(|arg| match arg {
                    Arg::Expr(expr) | Arg::Spread(expr) => expr_suspends(expr),
                })
        }
        Expr::Member { object, property, .. } => {
            expr_suspends(object) || matches!(property, MemberProp::Computed(key) if expr_suspends(key))
        }
    }
}

fn key_suspends(key: &PropKey) -> bool {
    matches!(key, PropKey::Computed(expr) if expr_suspends(expr))
}

fn pattern_suspends(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Ident(_) => false,
        Pattern::Member(member) => expr_suspends(member),
        Pattern::Object { props, rest } => {
            props.iter().any(|prop| key_suspends(&prop.key) || pattern_suspends(&prop.value))
                || rest.as_deref().is_some_and(pattern_suspends)
        }
        Pattern::Array { elements, rest } => {
            elements.iter().flatten().any(pattern_suspends) || rest.as_deref().is_some_and(pattern_suspends)
        }
        Pattern::Default { target, default } => pattern_suspends(target) || expr_suspends(default),
    }
}

fn decl_suspends(decl: &Declarator) -> bool {
    pattern_suspends(&decl.target) || decl.init.as_ref().is_some_and(expr_suspends)
}

fn stmt_suspends(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(expr) | Stmt::Throw(expr) => expr_suspends(expr),
        Stmt::Var(_, decls) => decls.iter().any(decl_suspends),
        Stmt::Function(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty => false,
        Stmt::Return(arg) => arg.as_ref().is_some_and(expr_suspends),
        Stmt::If { test, consequent, alternate } => {
            expr_suspends(test) || stmt_suspends(consequent) || alternate.as_deref().is_some_and(stmt_suspends)
        }
        Stmt::Block(body) => body.iter().any(stmt_suspends),
        Stmt::For { init, test, update, body } => {
            let init = match init {
                Some(ForInit::Var(_, decls)) => decls.iter().any(decl_suspends),
                Some(ForInit::Expr(expr)) => expr_suspends(expr),
                None => false,
            };
            init || test.as_ref().is_some_and(expr_suspends)
                || update.as_ref().is_some_and(expr_suspends)
                || stmt_suspends(body)
        }
        Stmt::ForIn { left, right, body } | Stmt::ForOf { left, right, body } => {
            let (ForHead::Var(_, pattern) | ForHead::Target(pattern)) = left;
            pattern_suspends(pattern) || expr_suspends(right) || stmt_suspends(body)
        }
        Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
            expr_suspends(test) || stmt_suspends(body)
        }
        Stmt::Try { block, handler, finalizer } => {
            block.iter().any(stmt_suspends)
                || handler.as_ref().is_some_and(|handler| {
                    handler.param.as_ref().is_some_and(pattern_suspends)
                        || handler.body.iter().any(stmt_suspends)
                })
                || finalizer.as_ref().is_some_and(|body| body.iter().any(stmt_suspends))
        }
        Stmt::Switch { discriminant, cases } => {
            expr_suspends(discriminant)
                || cases.iter().any(|case| {
                    case.test.as_ref().is_some_and(expr_suspends) || case.body.iter().any(stmt_suspends)
                })
        }
        Stmt::Labeled { body, .. } => stmt_suspends(body),
    }
}

/// Open state of a suspended body.
struct Frame {
    pc: usize,
    /// Function scope first, innermost block last
    scopes: Vec<ScopeRef>,
    handlers: Vec<Handler>,
    iters: Vec<Iteration>,
    /// Temp that receives the value of the pending `await`
    awaiting: Option<Name>,
    /// Value on its way to a `catch` clause
    thrown: Option<Value>,
}

struct Iteration {
    items: Vec<Value>,
    next: usize,
}

struct Handler {
    catch: Option<Label>,
    finally: Option<Label>,
    after: Label,
    scopes: usize,
    iters: usize,
    state: HandlerState,
}

enum HandlerState {
    Try,
    Catch,
    /// Running the `finally` block; resumes the completion afterwards
    Finally(Completion),
}

/// How control leaves a guarded region.
enum Completion {
    Normal,
    Throw(Value),
    Return(Value),
    Jump(Target),
}

enum Control {
    Next,
    Suspend(Value),
    Complete(Completion),
}

enum Resume {
    Next(Value),
    Throw(Value),
}

enum Step {
    Suspended(Value),
    Done(Value),
}

impl Frame {
    fn new(scope: ScopeRef) -> Self {
        Self {
            pc: 0,
            scopes: vec![scope],
            handlers: Vec::new(),
            iters: Vec::new(),
            awaiting: None,
            thrown: None,
        }
    }

    fn scope(&self) -> &ScopeRef {
        &self.scopes[self.scopes.len() - 1]
    }

    fn store(&self, temp: &Name, value: Value) {
        self.scopes[0].declare(temp.clone(), Some(value), true);
    }

    fn load(&self, temp: &Name) -> Value {
        match self.scopes[0].lookup(temp) {
            Lookup::Found(value) => value,
            _ => Value::Undefined,
        }
    }

    fn unwind_to(&mut self, scopes: usize, iters: usize) {
        self.scopes.truncate(scopes.max(1));
        self.iters.truncate(iters);
    }

    fn set_state(&mut self, state: HandlerState) {
        if let Some(handler) = self.handlers.last_mut() {
            handler.state = state;
        }
    }
}

/// A running async body and the promise its caller holds.
struct Task {
    program: Rc<Program>,
    /// `None` while running or once finished
    frame: Option<Frame>,
    promise: ObjRef,
}

type TaskRef = Rc<RefCell<Task>>;

impl Interp {
    /// Start a lowered async body. The returned promise settles with its result.
    pub(crate) fn spawn_async(&mut self, generator: &Value, this: &Value) -> Result<Value> {
        let closure = match callable_of(generator) {
            Some(Callable::Closure(closure)) if closure.func.kind == FunctionKind::Generator => closure,
            _ => return Err(type_error("asyncToGenerator expects a generator function")),
        };
        let program = self.compiled(&closure.func)?;
        let scope = self.enter_function(generator, &closure, this, &[])?;
        if let FunctionBody::Block(body) = &closure.func.body {
            hoist_vars(body, &scope);
            self.hoist_block(body, &scope);
        }
        for temp in &program.temps {
            scope.declare(temp.clone(), Some(Value::Undefined), true);
        }

        let promise = promise::new_promise();
        let task = Rc::new(RefCell::new(Task {
            program,
            frame: Some(Frame::new(scope)),
            promise: promise.clone(),
        }));
        self.advance(&task, Resume::Next(Value::Undefined))?;
        Ok(Value::Object(promise))
    }

    fn compiled(&mut self, func: &Rc<Function>) -> Result<Rc<Program>> {
        let key = Rc::as_ptr(func);
        if let Some((_, program)) = self.generators.get(&key) {
            return Ok(program.clone());
        }
        let program = Rc::new(match &func.body {
            FunctionBody::Block(body) => Compiler::compile(body)?,
            FunctionBody::Expr(expr) => Compiler::compile(&[Stmt::Return(Some((**expr).clone()))])?,
        });
        self.generators.insert(key, (func.clone(), program.clone()));
        Ok(program)
    }

    /// Run a task until it suspends or finishes.
    fn advance(&mut self, task: &TaskRef, input: Resume) -> Result<()> {
        let (program, frame, promise) = {
            let mut task = task.borrow_mut();
            (task.program.clone(), task.frame.take(), task.promise.clone())
        };
        let Some(mut frame) = frame else {
            return Ok(());
        };

        match self.run_frame(&program, &mut frame, input) {
            Ok(Step::Suspended(value)) => {
                task.borrow_mut().frame = Some(frame);
                let awaited = promise::to_promise(self, value)?;
                promise::then(self, &awaited, Some(resumer(task, false)), Some(resumer(task, true)));
                Ok(())
            }
            Ok(Step::Done(value)) => promise::resolve(self, &promise, value),
            Err(Abrupt::Throw(reason)) => {
                promise::reject(self, &promise, reason);
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn run_frame(&mut self, program: &Program, frame: &mut Frame, input: Resume) -> Result<Step> {
        match input {
            Resume::Next(value) => {
                if let Some(temp) = frame.awaiting.take() {
                    frame.store(&temp, value);
                }
            }
            Resume::Throw(reason) => {
                frame.awaiting = None;
                if let Some(value) = self.complete(program, frame, Completion::Throw(reason))? {
                    return Ok(Step::Done(value));
                }
            }
        }

        while let Some(op) = program.ops.get(frame.pc) {
            frame.pc += 1;
            let completion = match self.step(program, frame, op) {
                Ok(Control::Next) => continue,
                Ok(Control::Suspend(value)) => return Ok(Step::Suspended(value)),
                Ok(Control::Complete(completion)) => completion,
                Err(Abrupt::Throw(reason)) => Completion::Throw(reason),
                Err(other) => return Err(other),
            };
            if let Some(value) = self.complete(program, frame, completion)? {
                return Ok(Step::Done(value));
            }
        }
        Ok(Step::Done(Value::Undefined))
    }

    fn step(&mut self, program: &Program, frame: &mut Frame, op: &Op) -> Result<Control> {
        self.tick()?;
        match op {
            Op::Exec { stmt, exits } => {
                let flow = self.exec_stmt(stmt, frame.scope())?;
                let stray = || throw_error("SyntaxError", "Illegal break or continue target");
                return Ok(match flow {
                    Flow::Normal => Control::Next,
                    Flow::Return(value) => Control::Complete(Completion::Return(value)),
                    Flow::Break(label) => {
                        Control::Complete(Completion::Jump(find_break(exits, label.as_ref()).ok_or_else(stray)?))
                    }
                    Flow::Continue(label) => Control::Complete(Completion::Jump(
                        find_continue(exits, label.as_ref()).ok_or_else(stray)?,
                    )),
                });
            }
            Op::Eval { expr, into } => {
                let value = self.eval(expr, frame.scope())?;
                if let Some(into) = into {
                    frame.store(into, value);
                }
            }
            Op::Await { operand, into } => {
                let value = self.eval(operand, frame.scope())?;
                frame.awaiting = Some(into.clone());
                return Ok(Control::Suspend(value));
            }
            Op::Bind { target, value, mode } => {
                let value = self.eval(value, frame.scope())?;
                self.bind_pattern(target, value, frame.scope(), *mode)?;
            }
            Op::EnterScope { hoist } => {
                let scope = Scope::child(frame.scope());
                self.hoist_block(hoist, &scope);
                frame.scopes.push(scope);
            }
            Op::ExitScope => {
                if frame.scopes.len() > 1 {
                    frame.scopes.pop();
                }
            }
            Op::NextIteration { names } => {
                let n = frame.scopes.len();
                if !names.is_empty() && n > 1 {
                    let fresh = copy_iteration(&frame.scopes[n - 1], names, &frame.scopes[n - 2]);
                    frame.scopes[n - 1] = fresh;
                }
            }
            Op::Goto(label) => frame.pc = program.labels[*label],
            Op::Branch { test, when, to } => {
                if self.eval(test, frame.scope())?.truthy() == *when {
                    frame.pc = program.labels[*to];
                }
            }
            Op::ShortCircuit { op, value, to } => {
                if short_circuits(*op, &frame.load(value)) {
                    frame.pc = program.labels[*to];
                }
            }
            Op::CaseMatch { subject, test, to } => {
                if self.eval(test, frame.scope())?.strict_equals(&frame.load(subject)) {
                    frame.pc = program.labels[*to];
                }
            }
            Op::IterStart { iterable, keys } => {
                let value = self.eval(iterable, frame.scope())?;
                let items = if *keys {
                    own_keys(&value).into_iter().map(Value::String).collect()
                } else {
                    self.iterate_values(&value)?
                };
                frame.iters.push(Iteration { items, next: 0 });
            }
            Op::IterNext { head, exit } => {
                let item = frame.iters.last_mut().and_then(|iteration| {
                    let item = iteration.items.get(iteration.next).cloned();
                    iteration.next += 1;
                    item
                });
                let Some(item) = item else {
                    frame.pc = program.labels[*exit];
                    return Ok(Control::Next);
                };
                let scope = Scope::child(frame.scope());
                frame.scopes.push(scope.clone());
                match head {
                    ForHead::Var(kind, pattern) => {
                        self.bind_pattern(pattern, item, &scope, BindMode::Declare(*kind))?
                    }
                    ForHead::Target(pattern) => self.bind_pattern(pattern, item, &scope, BindMode::Assign)?,
                }
            }
            Op::IterEnd => {
                frame.iters.pop();
            }
            Op::TryEnter { catch, finally, after } => frame.handlers.push(Handler {
                catch: *catch,
                finally: *finally,
                after: *after,
                scopes: frame.scopes.len(),
                iters: frame.iters.len(),
                state: HandlerState::Try,
            }),
            Op::Catch { param } => {
                let scope = Scope::child(frame.scope());
                frame.scopes.push(scope.clone());
                let thrown = frame.thrown.take().unwrap_or_default();
                if let Some(param) = param {
                    self.bind_pattern(param, thrown, &scope, BindMode::Declare(VarKind::Let))?;
                }
            }
            Op::TryExit => {
                let Some(handler) = frame.handlers.last() else {
                    return Ok(Control::Next);
                };
                let (scopes, iters, after) = (handler.scopes, handler.iters, handler.after);
                let finally = match handler.state {
                    HandlerState::Finally(_) => None,
                    _ => handler.finally,
                };
                match finally {
                    None => {
                        frame.handlers.pop();
                        frame.pc = program.labels[after];
                    }
                    Some(finally) => {
                        frame.unwind_to(scopes, iters);
                        frame.set_state(HandlerState::Finally(Completion::Normal));
                        frame.pc = program.labels[finally];
                    }
                }
            }
            Op::FinallyEnd => {
                if let Some(Handler { state: HandlerState::Finally(completion), .. }) = frame.handlers.pop() {
                    return Ok(Control::Complete(completion));
                }
            }
            Op::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame.scope())?,
                    None => Value::Undefined,
                };
                return Ok(Control::Complete(Completion::Return(value)));
            }
            Op::Throw(expr) => return Err(Abrupt::Throw(self.eval(expr, frame.scope())?)),
        }
        Ok(Control::Next)
    }

    /// Route a completion through the open handlers. `Some` once the body is done.
    fn complete(&mut self, program: &Program, frame: &mut Frame, mut completion: Completion) -> Result<Option<Value>> {
        loop {
            match &completion {
                Completion::Normal => return Ok(None),
                Completion::Jump(target) if frame.handlers.len() <= target.handlers => {
                    frame.unwind_to(target.scopes, target.iters);
                    frame.pc = program.labels[target.label];
                    return Ok(None);
                }
                _ => {}
            }
            let Some(handler) = frame.handlers.last() else {
                return match completion {
                    Completion::Throw(reason) => Err(Abrupt::Throw(reason)),
                    Completion::Return(value) => Ok(Some(value)),
                    Completion::Normal | Completion::Jump(_) => Ok(Some(Value::Undefined)),
                };
            };
            let (scopes, iters) = (handler.scopes, handler.iters);
            let catch = match handler.state {
                HandlerState::Try => handler.catch,
                _ => None,
            };
            let finally = match handler.state {
                HandlerState::Finally(_) => None,
                _ => handler.finally,
            };
            completion = match (completion, catch, finally) {
                (Completion::Throw(reason), Some(label), _) => {
                    frame.unwind_to(scopes, iters);
                    frame.set_state(HandlerState::Catch);
                    frame.thrown = Some(reason);
                    frame.pc = program.labels[label];
                    return Ok(None);
                }
                (completion, _, Some(label)) => {
                    frame.unwind_to(scopes, iters);
                    frame.set_state(HandlerState::Finally(completion));
                    frame.pc = program.labels[label];
                    return Ok(None);
                }
                (completion, _, None) => {
                    frame.handlers.pop();
                    completion
                }
            };
        }
    }
}

/// Promise reaction that resumes `task` with the settled value.
fn resumer(task: &TaskRef, rejected: bool) -> Value {
    let task = task.clone();
    Value::native("", move |interp: &mut Interp, _: &Value, args: &[Value]| {
        let value = args.first().cloned().unwrap_or_default();
        let input = if rejected { Resume::Throw(value) } else { Resume::Next(value) };
        interp.advance(&task, input)?;
        Ok(Value::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SandboxExecutor;
    use crate::registry::CapabilityRegistry;
    use pagelet_transpile::Transpiler;
    use pretty_assertions::assert_eq;

    /// Run `source`, advance virtual time by `ms` and join the returned array.
    fn run(source: &str, ms: u64) -> String {
        let artifact = Transpiler::new(CapabilityRegistry::global().transpile_options())
            .transpile(source)
            .unwrap();
        let mut execution = SandboxExecutor::default().execute(&artifact).unwrap();
        execution.advance_time(ms).unwrap();
        let items = execution.element().array_items().unwrap();
        items.iter().map(|item| item.to_js_string().to_string()).collect::<Vec<_>>().join(",")
    }

    const WAIT: &str = "const wait = (ms, value) => new Promise((resolve) => setTimeout(() => resolve(value), ms));\n";

    #[test]
    fn body_runs_synchronously_until_the_first_await() {
        let source = r#"
            const log = [];
            async function task() {
              log.push('start');
              await null;
              log.push('resumed');
            }
            task();
            log.push('caller');
            Promise.resolve().then(() => log.push('queued'));
            return log;
        "#;
        assert_eq!(run(source, 0), "start,caller,resumed,queued");
    }

    #[test]
    fn loops_break_and_continue_across_awaits() {
        let source = format!(
            "{WAIT}{}",
            r#"
            const log = [];
            async function main() {
              for (let i = 0; i < 4; i++) {
                if (i === 1) continue;
                if (i === 3) break;
                log.push(await wait(10, i));
              }
              let n = 0;
              while (n < 2) {
                n = await Promise.resolve(n + 1);
              }
              log.push('n=' + n);
              return 'done';
            }
            main().then((value) => log.push(value));
            return log;
            "#
        );
        assert_eq!(run(&source, 0), "");
        assert_eq!(run(&source, 100), "0,2,n=2,done");
    }

    #[test]
    fn per_iteration_bindings_survive_suspension() {
        let source = r#"
            const log = [];
            const fns = [];
            async function main() {
              for (let i = 0; i < 3; i++) {
                await null;
                fns.push(() => i);
              }
            }
            main().then(() => { for (const f of fns) log.push(f()); });
            return log;
        "#;
        assert_eq!(run(source, 0), "0,1,2");
    }

    #[test]
    fn rejections_reach_catch_and_finally() {
        let source = format!(
            "{WAIT}{}",
            r#"
            const log = [];
            async function main() {
              try {
                await Promise.reject(new Error('no'));
                log.push('unreached');
              } catch (e) {
                log.push(e.message);
              } finally {
                log.push('finally');
              }
            }
            async function cleanup() {
              try {
                return await wait(5, 'result');
              } finally {
                log.push('cleanup');
                await wait(5);
                log.push('after');
              }
            }
            main().then(() => cleanup()).then((value) => log.push(value));
            return log;
            "#
        );
        assert_eq!(run(&source, 50), "no,finally,cleanup,after,result");
    }

    #[test]
    fn throwing_before_await_rejects_the_promise() {
        let source = r#"
            const log = [];
            async function fail() { throw new Error('early'); }
            fail().catch((e) => log.push(e.message));
            log.push('sync');
            return log;
        "#;
        assert_eq!(run(source, 0), "sync,early");
    }

    #[test]
    fn operands_keep_their_evaluation_order() {
        let source = r#"
            const log = [];
            const calls = [];
            const tag = (x) => { calls.push(x); return x; };
            const never = () => { calls.push('never'); return new Promise(() => {}); };
            let total = 1;
            async function main() {
              total += await Promise.resolve(2);
              const pick = (await Promise.resolve(0)) || (await Promise.resolve(5));
              const skip = true || (await never());
              const sum = tag(1) + (await Promise.resolve(tag(2))) + tag(3);
              const box = { n: 1 };
              box.n += await Promise.resolve(4);
              log.push(total, pick, skip, sum, box.n, (await Promise.resolve(false)) ? 'yes' : 'no', calls.join(''));
            }
            main();
            return log;
        "#;
        assert_eq!(run(source, 0), "3,5,true,6,5,no,123");
    }

    #[test]
    fn labeled_break_leaves_nested_iterations() {
        let source = r#"
            const log = [];
            async function main() {
              outer: for (const row of [[1, 2], [3, 4]]) {
                for (const cell of row) {
                  await null;
                  if (cell === 3) break outer;
                  log.push(cell);
                }
              }
              log.push('end');
            }
            main();
            return log;
        "#;
        assert_eq!(run(source, 0), "1,2,end");
    }

    #[test]
    fn switch_cases_may_await() {
        let source = r#"
            const log = [];
            async function kind(x) {
              switch (x) {
                case await Promise.resolve(1):
                  return 'one';
                default:
                  await null;
                  return 'other';
              }
            }
            Promise.all([kind(1), kind(2)]).then((kinds) => log.push(...kinds));
            return log;
        "#;
        assert_eq!(run(source, 0), "one,other");
    }

    #[test]
    fn await_inside_destructuring_defaults_is_rejected() {
        let source = r#"
            async function main(options) {
              const { delay = await Promise.resolve(1) } = options;
              return delay;
            }
            main({});
            return [];
        "#;
        let artifact = Transpiler::new(CapabilityRegistry::global().transpile_options())
            .transpile(source)
            .unwrap();
        let err = SandboxExecutor::default().execute(&artifact).unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: await is not supported inside a destructuring pattern");
    }
}
