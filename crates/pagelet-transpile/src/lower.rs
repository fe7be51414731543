//! Lowering from the oxc AST into the owned IR.
//!
//! JSX and async functions are desugared here; constructs the sandbox cannot
//! evaluate are rejected with [`TranspileError::Unsupported`].

use std::rc::Rc;

use oxc_allocator::Allocator;
use oxc_ast::ast::{self as js, Expression, Statement};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::{GetSpan, SourceType, Span};

use crate::ast::*;
use crate::error::{Position, TranspileError};
use crate::TranspileOptions;

type Result<T> = std::result::Result<T, TranspileError>;

/// What kind of input is being lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Author-written component source
    Source,
    /// Previously transpiled output; may contain lowering-generated generators
    Artifact,
}

#[derive(Debug, Clone, Copy)]
struct FnContext {
    is_async: bool,
    is_generator: bool,
}

/// Parse `source` as a JSX script that may `return` at the top level.
pub(crate) fn lower(source: &str, options: &TranspileOptions, mode: Mode) -> Result<Program> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs().with_jsx(true))
        .with_options(ParseOptions {
            allow_return_outside_function: true,
            preserve_parens: false,
            ..ParseOptions::default()
        })
        .parse();

    if let Some(diagnostic) = parsed.errors.first() {
        let offset = diagnostic
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or_default();
        let position = Position::of(source, offset);
        return Err(TranspileError::Syntax {
            message: diagnostic.message.to_string(),
            line: position.line,
            column: position.column,
        });
    }
    if parsed.panicked {
        return Err(TranspileError::Syntax {
            message: "Unexpected end of input".to_string(),
            line: 1,
            column: 1,
        });
    }

    let mut lowerer = Lowerer {
        source,
        mode,
        pragma: Expr::dotted(&options.pragma),
        pragma_frag: Expr::dotted(&options.pragma_frag),
        functions: Vec::new(),
    };

    // Directives (including "use strict") and the hashbang are dropped
    let body = lowerer.statements(&parsed.program.body)?;
    Ok(Program { body })
}

pub(crate) struct Lowerer<'s> {
    source: &'s str,
    mode: Mode,
    pub(crate) pragma: Expr,
    pub(crate) pragma_frag: Expr,
    functions: Vec<FnContext>,
}

fn name(atom: &str) -> Name {
    Rc::from(atom)
}

impl<'s> Lowerer<'s> {
    pub(crate) fn unsupported<T>(&self, construct: &str, span: Span) -> Result<T> {
        let position = Position::of(self.source, span.start as usize);
        Err(TranspileError::Unsupported {
            construct: construct.to_string(),
            line: position.line,
            column: position.column,
        })
    }

    fn statements(&mut self, stmts: &[Statement<'_>]) -> Result<Vec<Stmt>> {
        stmts.iter().map(|stmt| self.statement(stmt)).collect()
    }

    fn block(&mut self, block: &js::BlockStatement<'_>) -> Result<Vec<Stmt>> {
        self.statements(&block.body)
    }

    fn boxed(&mut self, stmt: &Statement<'_>) -> Result<Box<Stmt>> {
        Ok(Box::new(self.statement(stmt)?))
    }

    fn statement(&mut self, stmt: &Statement<'_>) -> Result<Stmt> {
        match stmt {
            Statement::BlockStatement(block) => Ok(Stmt::Block(self.block(block)?)),
            Statement::BreakStatement(s) => Ok(Stmt::Break(s.label.as_ref().map(|l| name(&l.name)))),
            Statement::ContinueStatement(s) => {
                Ok(Stmt::Continue(s.label.as_ref().map(|l| name(&l.name))))
            }
            Statement::DebuggerStatement(_) | Statement::EmptyStatement(_) => Ok(Stmt::Empty),
            Statement::DoWhileStatement(s) => Ok(Stmt::DoWhile {
                body: self.boxed(&s.body)?,
                test: self.expr(&s.test)?,
            }),
            Statement::ExpressionStatement(s) => Ok(Stmt::Expr(self.expr(&s.expression)?)),
            Statement::ForInStatement(s) => Ok(Stmt::ForIn {
                left: self.for_head(&s.left)?,
                right: self.expr(&s.right)?,
                body: self.boxed(&s.body)?,
            }),
            Statement::ForOfStatement(s) => {
                if s.r#await {
                    return self.unsupported("for await", s.span);
                }
                Ok(Stmt::ForOf {
                    left: self.for_head(&s.left)?,
                    right: self.expr(&s.right)?,
                    body: self.boxed(&s.body)?,
                })
            }
            Statement::ForStatement(s) => {
                let init = match &s.init {
                    None => None,
                    Some(js::ForStatementInit::VariableDeclaration(decl)) => {
                        let (kind, declarators) = self.var_declaration(decl)?;
                        Some(ForInit::Var(kind, declarators))
                    }
                    Some(init) => match init.as_expression() {
                        Some(expr) => Some(ForInit::Expr(self.expr(expr)?)),
                        None => return self.unsupported("for initializer", s.span),
                    },
                };
                Ok(Stmt::For {
                    init,
                    test: s.test.as_ref().map(|e| self.expr(e)).transpose()?,
                    update: s.update.as_ref().map(|e| self.expr(e)).transpose()?,
                    body: self.boxed(&s.body)?,
                })
            }
            Statement::IfStatement(s) => Ok(Stmt::If {
                test: self.expr(&s.test)?,
                consequent: self.boxed(&s.consequent)?,
                alternate: s.alternate.as_ref().map(|alt| self.boxed(alt)).transpose()?,
            }),
            Statement::LabeledStatement(s) => Ok(Stmt::Labeled {
                label: name(&s.label.name),
                body: self.boxed(&s.body)?,
            }),
            Statement::ReturnStatement(s) => {
                Ok(Stmt::Return(s.argument.as_ref().map(|e| self.expr(e)).transpose()?))
            }
            Statement::SwitchStatement(s) => {
                let discriminant = self.expr(&s.discriminant)?;
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in &s.cases {
                    cases.push(SwitchCase {
                        test: case.test.as_ref().map(|e| self.expr(e)).transpose()?,
                        body: self.statements(&case.consequent)?,
                    });
                }
                Ok(Stmt::Switch { discriminant, cases })
            }
            Statement::ThrowStatement(s) => Ok(Stmt::Throw(self.expr(&s.argument)?)),
            Statement::TryStatement(s) => {
                let block = self.block(&s.block)?;
                let handler = match &s.handler {
                    Some(clause) => Some(CatchClause {
                        param: clause
                            .param
                            .as_ref()
                            .map(|p| self.binding(&p.pattern))
                            .transpose()?,
                        body: self.block(&clause.body)?,
                    }),
                    None => None,
                };
                let finalizer = s.finalizer.as_ref().map(|f| self.block(f)).transpose()?;
                Ok(Stmt::Try { block, handler, finalizer })
            }
            Statement::WhileStatement(s) => Ok(Stmt::While {
                test: self.expr(&s.test)?,
                body: self.boxed(&s.body)?,
            }),
            Statement::WithStatement(s) => self.unsupported("with statement", s.span),
            Statement::VariableDeclaration(decl) => {
                let (kind, declarators) = self.var_declaration(decl)?;
                Ok(Stmt::Var(kind, declarators))
            }
            Statement::FunctionDeclaration(func) => Ok(Stmt::Function(self.function(func)?)),
            Statement::ClassDeclaration(class) => self.unsupported("class", class.span),
            other if other.is_module_declaration() => {
                self.unsupported("import/export", other.span())
            }
            other => self.unsupported("TypeScript syntax", other.span()),
        }
    }

    fn var_declaration(
        &mut self,
        decl: &js::VariableDeclaration<'_>,
    ) -> Result<(VarKind, Vec<Declarator>)> {
        let kind = match decl.kind {
            js::VariableDeclarationKind::Var => VarKind::Var,
            js::VariableDeclarationKind::Let => VarKind::Let,
            js::VariableDeclarationKind::Const => VarKind::Const,
            _ => return self.unsupported("using declaration", decl.span),
        };
        let mut declarators = Vec::with_capacity(decl.declarations.len());
        for declarator in &decl.declarations {
            declarators.push(Declarator {
                target: self.binding(&declarator.id)?,
                init: declarator.init.as_ref().map(|e| self.expr(e)).transpose()?,
            });
        }
        Ok((kind, declarators))
    }

    fn for_head(&mut self, left: &js::ForStatementLeft<'_>) -> Result<ForHead> {
        match left {
            js::ForStatementLeft::VariableDeclaration(decl) => {
                let (kind, mut declarators) = self.var_declaration(decl)?;
                match declarators.pop() {
                    Some(declarator) if declarators.is_empty() => {
                        Ok(ForHead::Var(kind, declarator.target))
                    }
                    _ => self.unsupported("multiple loop bindings", decl.span),
                }
            }
            other => match other.as_assignment_target() {
                Some(target) => Ok(ForHead::Target(self.assignment_target(target)?)),
                None => self.unsupported("loop binding", other.span()),
            },
        }
    }

    // Patterns

    fn binding(&mut self, pattern: &js::BindingPattern<'_>) -> Result<Pattern> {
        match pattern {
            js::BindingPattern::BindingIdentifier(id) => Ok(Pattern::Ident(name(&id.name))),
            js::BindingPattern::ObjectPattern(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    props.push(PatternProp {
                        key: self.prop_key(&prop.key, prop.computed)?,
                        value: self.binding(&prop.value)?,
                        shorthand: prop.shorthand,
                    });
                }
                let rest = match &obj.rest {
                    Some(rest) => Some(Box::new(self.binding(&rest.argument)?)),
                    None => None,
                };
                Ok(Pattern::Object { props, rest })
            }
            js::BindingPattern::ArrayPattern(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    elements.push(element.as_ref().map(|p| self.binding(p)).transpose()?);
                }
                let rest = match &arr.rest {
                    Some(rest) => Some(Box::new(self.binding(&rest.argument)?)),
                    None => None,
                };
                Ok(Pattern::Array { elements, rest })
            }
            js::BindingPattern::AssignmentPattern(assign) => Ok(Pattern::Default {
                target: Box::new(self.binding(&assign.left)?),
                default: Box::new(self.expr(&assign.right)?),
            }),
        }
    }

    fn simple_target(&mut self, target: &js::SimpleAssignmentTarget<'_>) -> Result<Pattern> {
        match target {
            js::SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                Ok(Pattern::Ident(name(&id.name)))
            }
            other => match other.as_member_expression() {
                Some(member) => Ok(Pattern::Member(Box::new(self.member(member)?))),
                None => self.unsupported("TypeScript syntax", other.span()),
            },
        }
    }

    fn assignment_target(&mut self, target: &js::AssignmentTarget<'_>) -> Result<Pattern> {
        match target {
            js::AssignmentTarget::ArrayAssignmentTarget(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    elements.push(element.as_ref().map(|e| self.maybe_default(e)).transpose()?);
                }
                let rest = match &arr.rest {
                    Some(rest) => Some(Box::new(self.assignment_target(&rest.target)?)),
                    None => None,
                };
                Ok(Pattern::Array { elements, rest })
            }
            js::AssignmentTarget::ObjectAssignmentTarget(obj) => {
                let mut props = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    props.push(match prop {
                        js::AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                            let ident = name(&p.binding.name);
                            let mut value = Pattern::Ident(ident.clone());
                            if let Some(init) = &p.init {
                                value = Pattern::Default {
                                    target: Box::new(value),
                                    default: Box::new(self.expr(init)?),
                                };
                            }
                            PatternProp { key: PropKey::Static(ident), value, shorthand: true }
                        }
                        js::AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => {
                            PatternProp {
                                key: self.prop_key(&p.name, p.computed)?,
                                value: self.maybe_default(&p.binding)?,
                                shorthand: false,
                            }
                        }
                    });
                }
                let rest = match &obj.rest {
                    Some(rest) => Some(Box::new(self.assignment_target(&rest.target)?)),
                    None => None,
                };
                Ok(Pattern::Object { props, rest })
            }
            other => match other.as_simple_assignment_target() {
                Some(simple) => self.simple_target(simple),
                None => self.unsupported("assignment target", other.span()),
            },
        }
    }

    fn maybe_default(&mut self, target: &js::AssignmentTargetMaybeDefault<'_>) -> Result<Pattern> {
        match target {
            js::AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(d) => {
                Ok(Pattern::Default {
                    target: Box::new(self.assignment_target(&d.binding)?),
                    default: Box::new(self.expr(&d.init)?),
                })
            }
            other => match other.as_assignment_target() {
                Some(target) => self.assignment_target(target),
                None => self.unsupported("assignment target", other.span()),
            },
        }
    }

    fn prop_key(&mut self, key: &js::PropertyKey<'_>, computed: bool) -> Result<PropKey> {
        match key {
            js::PropertyKey::StaticIdentifier(id) => Ok(PropKey::Static(name(&id.name))),
            js::PropertyKey::PrivateIdentifier(id) => self.unsupported("private field", id.span),
            other => {
                let Some(expr) = other.as_expression() else {
                    return self.unsupported("property key", other.span());
                };
                if !computed {
                    match expr {
                        Expression::StringLiteral(s) => return Ok(PropKey::Static(name(&s.value))),
                        Expression::NumericLiteral(n) => {
                            return Ok(PropKey::Static(Rc::from(crate::number_to_string(n.value))))
                        }
                        _ => {}
                    }
                }
                Ok(PropKey::Computed(Box::new(self.expr(expr)?)))
            }
        }
    }

    // Functions

    fn with_function<T>(
        &mut self,
        context: FnContext,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.functions.push(context);
        let result = f(self);
        self.functions.pop();
        result
    }

    fn params(&mut self, params: &js::FormalParameters<'_>) -> Result<(Vec<Pattern>, Option<Pattern>)> {
        let mut out = Vec::with_capacity(params.items.len());
        for param in &params.items {
            let mut pattern = self.binding(&param.pattern)?;
            if let Some(init) = &param.initializer {
                pattern = Pattern::Default {
                    target: Box::new(pattern),
                    default: Box::new(self.expr(init)?),
                };
            }
            out.push(pattern);
        }
        let rest = params.rest.as_ref().map(|r| self.binding(&r.rest.argument)).transpose()?;
        Ok((out, rest))
    }

    fn function(&mut self, func: &js::Function<'_>) -> Result<Rc<Function>> {
        if func.generator && self.mode == Mode::Source {
            return self.unsupported("generator function", func.span);
        }
        let context = FnContext { is_async: func.r#async, is_generator: func.generator };
        self.with_function(context, |this| {
            let (params, rest) = this.params(&func.params)?;
            let mut body = match &func.body {
                Some(body) => this.statements(&body.statements)?,
                None => Vec::new(),
            };
            if func.r#async {
                body = async_body(body);
            }
            Ok(Rc::new(Function {
                name: func.id.as_ref().map(|id| name(&id.name)),
                params,
                rest,
                body: FunctionBody::Block(body),
                kind: if func.generator { FunctionKind::Generator } else { FunctionKind::Normal },
            }))
        })
    }

    fn arrow(&mut self, arrow: &js::ArrowFunctionExpression<'_>) -> Result<Rc<Function>> {
        let context = FnContext { is_async: arrow.r#async, is_generator: false };
        self.with_function(context, |this| {
            let (params, rest) = this.params(&arrow.params)?;
            let concise = match arrow.body.statements.first() {
                Some(Statement::ExpressionStatement(s)) if arrow.expression => {
                    Some(this.expr(&s.expression)?)
                }
                _ => None,
            };
            let body = match (concise, arrow.r#async) {
                (Some(expr), false) => FunctionBody::Expr(Box::new(expr)),
                (Some(expr), true) => {
                    FunctionBody::Expr(Box::new(async_call(vec![Stmt::Return(Some(expr))])))
                }
                (None, is_async) => {
                    let stmts = this.statements(&arrow.body.statements)?;
                    if is_async {
                        FunctionBody::Expr(Box::new(async_call(stmts)))
                    } else {
                        FunctionBody::Block(stmts)
                    }
                }
            };
            Ok(Rc::new(Function { name: None, params, rest, body, kind: FunctionKind::Arrow }))
        })
    }

    // Expressions

    fn boxed_expr(&mut self, expr: &Expression<'_>) -> Result<Box<Expr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn args(&mut self, args: &[js::Argument<'_>]) -> Result<Vec<Arg>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(match arg {
                js::Argument::SpreadElement(spread) => Arg::Spread(self.expr(&spread.argument)?),
                other => match other.as_expression() {
                    Some(expr) => Arg::Expr(self.expr(expr)?),
                    None => return self.unsupported("argument", other.span()),
                },
            });
        }
        Ok(out)
    }

    fn static_member(&mut self, m: &js::StaticMemberExpression<'_>) -> Result<Expr> {
        Ok(Expr::Member {
            object: self.boxed_expr(&m.object)?,
            property: MemberProp::Static(name(&m.property.name)),
            optional: m.optional,
        })
    }

    fn computed_member(&mut self, m: &js::ComputedMemberExpression<'_>) -> Result<Expr> {
        Ok(Expr::Member {
            object: self.boxed_expr(&m.object)?,
            property: MemberProp::Computed(self.boxed_expr(&m.expression)?),
            optional: m.optional,
        })
    }

    fn member(&mut self, member: &js::MemberExpression<'_>) -> Result<Expr> {
        match member {
            js::MemberExpression::StaticMemberExpression(m) => self.static_member(m),
            js::MemberExpression::ComputedMemberExpression(m) => self.computed_member(m),
            js::MemberExpression::PrivateFieldExpression(m) => {
                self.unsupported("private field", m.span)
            }
        }
    }

    fn call(&mut self, call: &js::CallExpression<'_>) -> Result<Expr> {
        if let Expression::Super(s) = &call.callee {
            return self.unsupported("super", s.span);
        }
        Ok(Expr::Call {
            callee: self.boxed_expr(&call.callee)?,
            args: self.args(&call.arguments)?,
            optional: call.optional,
        })
    }

    pub(crate) fn expr(&mut self, expr: &Expression<'_>) -> Result<Expr> {
        match expr {
            Expression::BooleanLiteral(b) => Ok(Expr::Bool(b.value)),
            Expression::NullLiteral(_) => Ok(Expr::Null),
            Expression::NumericLiteral(n) => Ok(Expr::Number(n.value)),
            Expression::BigIntLiteral(b) => self.unsupported("BigInt literal", b.span),
            Expression::RegExpLiteral(r) => Ok(Expr::Regex {
                pattern: name(&r.regex.pattern.text),
                flags: Rc::from(r.regex.flags.to_string()),
            }),
            Expression::StringLiteral(s) => Ok(Expr::Str(name(&s.value))),
            Expression::TemplateLiteral(t) => {
                let quasis = t
                    .quasis
                    .iter()
                    .map(|q| name(q.value.cooked.as_ref().unwrap_or(&q.value.raw)))
                    .collect();
                let mut exprs = Vec::with_capacity(t.expressions.len());
                for e in &t.expressions {
                    exprs.push(self.expr(e)?);
                }
                Ok(Expr::Template { quasis, exprs })
            }
            Expression::Identifier(id) => Ok(Expr::Ident(name(&id.name))),
            Expression::MetaProperty(m) => self.unsupported("meta property", m.span),
            Expression::Super(s) => self.unsupported("super", s.span),
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    items.push(match element {
                        js::ArrayExpressionElement::SpreadElement(s) => {
                            ArrayItem::Spread(self.expr(&s.argument)?)
                        }
                        js::ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(e) => ArrayItem::Expr(self.expr(e)?),
                            None => return self.unsupported("array element", other.span()),
                        },
                    });
                }
                Ok(Expr::Array(items))
            }
            Expression::ArrowFunctionExpression(arrow) => Ok(Expr::Function(self.arrow(arrow)?)),
            Expression::AssignmentExpression(assign) => Ok(Expr::Assign {
                op: assign.operator,
                target: Box::new(self.assignment_target(&assign.left)?),
                value: self.boxed_expr(&assign.right)?,
            }),
            Expression::AwaitExpression(a) => match self.functions.last().copied() {
                Some(context) if context.is_async => Ok(Expr::Yield(self.boxed_expr(&a.argument)?)),
                _ => self.unsupported("top-level await", a.span),
            },
            Expression::BinaryExpression(b) => Ok(Expr::Binary(
                b.operator,
                self.boxed_expr(&b.left)?,
                self.boxed_expr(&b.right)?,
            )),
            Expression::CallExpression(call) => self.call(call),
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    js::ChainElement::CallExpression(call) => self.call(call)?,
                    js::ChainElement::TSNonNullExpression(e) => {
                        return self.unsupported("TypeScript syntax", e.span)
                    }
                    other => match other.as_member_expression() {
                        Some(member) => self.member(member)?,
                        None => return self.unsupported("optional chain", chain.span),
                    },
                };
                Ok(Expr::Chain(Box::new(inner)))
            }
            Expression::ClassExpression(class) => self.unsupported("class", class.span),
            Expression::ConditionalExpression(c) => Ok(Expr::Conditional {
                test: self.boxed_expr(&c.test)?,
                consequent: self.boxed_expr(&c.consequent)?,
                alternate: self.boxed_expr(&c.alternate)?,
            }),
            Expression::FunctionExpression(func) => Ok(Expr::Function(self.function(func)?)),
            Expression::ImportExpression(i) => self.unsupported("dynamic import", i.span),
            Expression::LogicalExpression(l) => Ok(Expr::Logical(
                l.operator,
                self.boxed_expr(&l.left)?,
                self.boxed_expr(&l.right)?,
            )),
            Expression::NewExpression(n) => Ok(Expr::New {
                callee: self.boxed_expr(&n.callee)?,
                args: self.args(&n.arguments)?,
            }),
            Expression::ObjectExpression(obj) => self.object(obj),
            Expression::ParenthesizedExpression(p) => self.expr(&p.expression),
            Expression::SequenceExpression(seq) => {
                let mut exprs = Vec::with_capacity(seq.expressions.len());
                for e in &seq.expressions {
                    exprs.push(self.expr(e)?);
                }
                Ok(Expr::Sequence(exprs))
            }
            Expression::TaggedTemplateExpression(t) => self.unsupported("tagged template", t.span),
            Expression::ThisExpression(_) => Ok(Expr::This),
            Expression::UnaryExpression(u) => {
                Ok(Expr::Unary(u.operator, self.boxed_expr(&u.argument)?))
            }
            Expression::UpdateExpression(u) => Ok(Expr::Update {
                op: u.operator,
                prefix: u.prefix,
                target: Box::new(self.simple_target(&u.argument)?),
            }),
            Expression::YieldExpression(y) => {
                let in_generator = self.functions.last().is_some_and(|c| c.is_generator);
                if self.mode == Mode::Source || !in_generator {
                    return self.unsupported("yield", y.span);
                }
                if y.delegate {
                    return self.unsupported("yield*", y.span);
                }
                let argument = match &y.argument {
                    Some(arg) => self.expr(arg)?,
                    None => Expr::ident("undefined"),
                };
                Ok(Expr::Yield(Box::new(argument)))
            }
            Expression::PrivateInExpression(p) => self.unsupported("private field", p.span),
            Expression::JSXElement(el) => self.jsx_element(el),
            Expression::JSXFragment(frag) => self.jsx_fragment(frag),
            Expression::StaticMemberExpression(m) => self.static_member(m),
            Expression::ComputedMemberExpression(m) => self.computed_member(m),
            Expression::PrivateFieldExpression(m) => self.unsupported("private field", m.span),
            other => self.unsupported("TypeScript syntax", other.span()),
        }
    }

    fn object(&mut self, obj: &js::ObjectExpression<'_>) -> Result<Expr> {
        let mut items = Vec::with_capacity(obj.properties.len());
        for prop in &obj.properties {
            items.push(match prop {
                js::ObjectPropertyKind::SpreadProperty(spread) => {
                    ObjectItem::Spread(self.expr(&spread.argument)?)
                }
                js::ObjectPropertyKind::ObjectProperty(p) => {
                    if p.kind != js::PropertyKind::Init {
                        return self.unsupported("getter/setter", p.span);
                    }
                    ObjectItem::Prop {
                        key: self.prop_key(&p.key, p.computed)?,
                        value: self.expr(&p.value)?,
                        shorthand: p.shorthand,
                    }
                }
            });
        }
        Ok(Expr::Object(items))
    }
}

/// `__helpers.asyncToGenerator(function* () { body }).call(this)`
fn async_call(body: Vec<Stmt>) -> Expr {
    let generator = Expr::Function(Rc::new(Function {
        name: None,
        params: Vec::new(),
        rest: None,
        body: FunctionBody::Block(body),
        kind: FunctionKind::Generator,
    }));
    let wrapped = Expr::call(Expr::dotted("__helpers.asyncToGenerator"), vec![generator]);
    Expr::call(Expr::member(wrapped, "call"), vec![Expr::This])
}

fn async_body(body: Vec<Stmt>) -> Vec<Stmt> {
    vec![Stmt::Return(Some(async_call(body)))]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_source(source: &str) -> Result<Program> {
        lower(source, &TranspileOptions::default(), Mode::Source)
    }

    #[test]
    fn top_level_return_is_allowed() {
        let program = lower_source("return 1;").unwrap();
        assert_eq!(program.body, vec![Stmt::Return(Some(Expr::Number(1.0)))]);
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = lower_source("const a = 1;\nretrun <View/>;").unwrap_err();
        match err {
            TranspileError::Syntax { message, line, .. } => {
                assert!(!message.is_empty());
                assert_eq!(line, 2);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_imports() {
        let err = lower_source("import React from 'react';\nreturn 1;").unwrap_err();
        assert!(
            matches!(err, TranspileError::Unsupported { .. } | TranspileError::Syntax { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn rejects_classes_and_generators() {
        let err = lower_source("class A {}\nreturn 1;").unwrap_err();
        assert!(matches!(err, TranspileError::Unsupported { ref construct, line: 1, column: 1 } if construct == "class"));

        let err = lower_source("function* g() {}").unwrap_err();
        assert!(matches!(err, TranspileError::Unsupported { ref construct, .. } if construct == "generator function"));
    }

    #[test]
    fn artifact_mode_allows_generators() {
        let program = lower(
            "return function* () { yield 1; };",
            &TranspileOptions::default(),
            Mode::Artifact,
        )
        .unwrap();
        let Stmt::Return(Some(Expr::Function(func))) = &program.body[0] else {
            panic!("expected returned function");
        };
        assert_eq!(func.kind, FunctionKind::Generator);
    }

    #[test]
    fn await_becomes_yield() {
        let program = lower_source("async function f() { await g(); }").unwrap();
        let Stmt::Function(func) = &program.body[0] else {
            panic!("expected function");
        };
        assert_eq!(func.kind, FunctionKind::Normal);
        let FunctionBody::Block(body) = &func.body else {
            panic!("expected block body");
        };
        assert!(matches!(body[0], Stmt::Return(Some(Expr::Call { .. }))));
    }

    #[test]
    fn rejects_getters() {
        let err = lower_source("const o = { get x() { return 1; } };").unwrap_err();
        assert!(matches!(err, TranspileError::Unsupported { ref construct, .. } if construct == "getter/setter"));
    }

    #[test]
    fn rejects_every_class_accessor_and_generator_form() {
        let cases = [
            ("const A = class {};", "class"),
            ("return class extends Object {};", "class"),
            ("const o = { set x(v) {} };", "getter/setter"),
            ("const g = function* () {};", "generator function"),
            ("const o = { *items() {} };", "generator function"),
            ("async function* stream() {}", "generator function"),
        ];
        for (source, expected) in cases {
            match lower_source(source) {
                Err(TranspileError::Unsupported { construct, .. }) => assert_eq!(construct, expected, "{source}"),
                other => panic!("{source}: expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn string_keys_become_static() {
        let program = lower_source("const o = { 'a-b': 1, 2: 3 };").unwrap();
        let Stmt::Var(_, decls) = &program.body[0] else {
            panic!("expected var");
        };
        let Some(Expr::Object(items)) = &decls[0].init else {
            panic!("expected object");
        };
        assert!(matches!(&items[0], ObjectItem::Prop { key: PropKey::Static(k), .. } if &**k == "a-b"));
        assert!(matches!(&items[1], ObjectItem::Prop { key: PropKey::Static(k), .. } if &**k == "2"));
    }
}
