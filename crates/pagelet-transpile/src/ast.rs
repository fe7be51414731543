//! Owned intermediate representation shared by the transpiler and the sandbox.
//!
//! The oxc AST borrows from an arena, so it cannot outlive a single parse.
//! Everything downstream (code generation, the interpreter, closures kept alive
//! by a rendered tree) works on this owned tree instead.

use std::rc::Rc;

pub use oxc_ast::ast::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};

/// Identifier or property name.
pub type Name = Rc<str>;

/// A whole function body as evaluated by the sandbox.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements
    pub body: Vec<Stmt>,
}

/// Declaration keyword of a variable binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    /// Keyword as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Let => "let",
            Self::Const => "const",
        }
    }
}

/// One `target = init` entry of a variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Var(VarKind, Vec<Declarator>),
    Function(Rc<Function>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        left: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        left: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break(Option<Name>),
    Continue(Option<Name>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: Name,
        body: Box<Stmt>,
    },
    Empty,
}

/// Initializer slot of a classic `for` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarKind, Vec<Declarator>),
    Expr(Expr),
}

/// Left-hand side of `for-in` / `for-of`.
#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    Var(VarKind, Pattern),
    Target(Pattern),
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

/// `case test: body` (or `default:` when `test` is `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Binding and assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Name),
    /// `obj.x` or `obj[k]`; only valid as an assignment target
    Member(Box<Expr>),
    Object {
        props: Vec<PatternProp>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        default: Box<Expr>,
    },
}

/// `key: value` inside an object pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternProp {
    pub key: PropKey,
    pub value: Pattern,
    pub shorthand: bool,
}

/// Property key of an object literal or pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Static(Name),
    Computed(Box<Expr>),
}

/// How a function binds `this` and whether it suspends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    /// Produced only by async lowering; driven by `__helpers.asyncToGenerator`
    Generator,
}

/// Function body: a block, or the concise expression of an arrow.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

/// A function declaration, expression, or arrow.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<Name>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Template {
        quasis: Vec<Rc<str>>,
        exprs: Vec<Expr>,
    },
    Regex {
        pattern: Rc<str>,
        flags: Rc<str>,
    },
    Ident(Name),
    This,
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<Function>),
    Unary(UnaryOperator, Box<Expr>),
    Update {
        op: UpdateOperator,
        prefix: bool,
        target: Box<Pattern>,
    },
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    Logical(LogicalOperator, Box<Expr>, Box<Expr>),
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignmentOperator,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    /// Boundary of an optional chain; a short-circuit inside yields `undefined`
    Chain(Box<Expr>),
    /// Suspension point of a lowered async body
    Yield(Box<Expr>),
}

/// Property of a member access.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Static(Name),
    Computed(Box<Expr>),
}

/// Element of an array literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Expr(Expr),
    Spread(Expr),
    Hole,
}

/// Entry of an object literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectItem {
    Prop {
        key: PropKey,
        value: Expr,
        shorthand: bool,
    },
    Spread(Expr),
}

/// Call or `new` argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    Spread(Expr),
}

impl Expr {
    /// Shorthand for an identifier reference.
    pub fn ident(name: &str) -> Self {
        Self::Ident(Rc::from(name))
    }

    /// Shorthand for `object.name`.
    pub fn member(object: Expr, name: &str) -> Self {
        Self::Member {
            object: Box::new(object),
            property: MemberProp::Static(Rc::from(name)),
            optional: false,
        }
    }

    /// Shorthand for a plain call.
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::Call {
            callee: Box::new(callee),
            args: args.into_iter().map(Arg::Expr).collect(),
            optional: false,
        }
    }

    /// Parse a dotted path such as `React.createElement` into a member chain.
    pub fn dotted(path: &str) -> Self {
        let mut parts = path.split('.');
        let head = parts.next().unwrap_or_default();
        parts.fold(Self::ident(head), |acc, part| Self::member(acc, part))
    }
}

/// Whether `name` can be written as a bare identifier (and object key).
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_builds_member_chain() {
        let expr = Expr::dotted("React.createElement");
        assert_eq!(
            expr,
            Expr::member(Expr::ident("React"), "createElement")
        );
    }

    #[test]
    fn identifier_names() {
        assert!(is_identifier_name("onPress"));
        assert!(is_identifier_name("$el"));
        assert!(!is_identifier_name("aria-label"));
        assert!(!is_identifier_name("1st"));
        assert!(!is_identifier_name(""));
    }
}
