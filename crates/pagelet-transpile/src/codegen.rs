//! JavaScript printer for the IR.
//!
//! Output is deterministic: two-space indentation, double-quoted strings and
//! the minimum parentheses needed to preserve evaluation order.

use crate::ast::*;

/// Print a program as a plain function body.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();
    for stmt in &program.body {
        printer.stmt(stmt);
    }
    printer.out
}

/// Format a number the way JavaScript's `Number.prototype.toString` does.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value < 0.0 {
        return format!("-{}", number_to_string(-value));
    }

    // Shortest round-trip digits and decimal exponent
    let sci = format!("{value:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exp: i32 = exp.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exp + 1;

    if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let sign = if n - 1 < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", (n - 1).abs())
        } else {
            format!("{first}.{rest}e{sign}{}", (n - 1).abs())
        }
    }
}

/// Quote a string as a double-quoted JavaScript literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// Precedence levels, loosest first
const SEQUENCE: u8 = 1;
const ASSIGN: u8 = 2;
const CONDITIONAL: u8 = 3;
const COALESCE_OR: u8 = 4;
const AND: u8 = 5;
const EXPONENT: u8 = 14;
const UNARY: u8 = 15;
const POSTFIX: u8 = 16;
const CALL: u8 = 17;
const MEMBER: u8 = 18;
const PRIMARY: u8 = 19;

fn binary_precedence(op: BinaryOperator) -> u8 {
    use BinaryOperator::*;
    match op {
        BitwiseOR => 6,
        BitwiseXOR => 7,
        BitwiseAnd => 8,
        Equality | Inequality | StrictEquality | StrictInequality => 9,
        LessThan | LessEqualThan | GreaterThan | GreaterEqualThan | Instanceof | In => 10,
        ShiftLeft | ShiftRight | ShiftRightZeroFill => 11,
        Addition | Subtraction => 12,
        Multiplication | Division | Remainder => 13,
        Exponential => EXPONENT,
    }
}

fn logical_precedence(op: LogicalOperator) -> u8 {
    match op {
        LogicalOperator::And => AND,
        LogicalOperator::Or | LogicalOperator::Coalesce => COALESCE_OR,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Sequence(_) => SEQUENCE,
        Expr::Assign { .. } | Expr::Yield(_) => ASSIGN,
        Expr::Function(func) if func.kind == FunctionKind::Arrow => ASSIGN,
        Expr::Conditional { .. } => CONDITIONAL,
        Expr::Logical(op, ..) => logical_precedence(*op),
        Expr::Binary(op, ..) => binary_precedence(*op),
        Expr::Unary(..) => UNARY,
        Expr::Update { prefix: true, .. } => UNARY,
        Expr::Update { prefix: false, .. } => POSTFIX,
        Expr::Call { .. } => CALL,
        Expr::Chain(inner) => precedence(inner),
        Expr::Member { .. } | Expr::New { .. } => MEMBER,
        _ => PRIMARY,
    }
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn newline(&mut self) {
        self.out.push('\n');
    }

    fn pad(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    // Statements

    fn stmt(&mut self, stmt: &Stmt) {
        self.pad();
        self.stmt_inline(stmt);
        self.newline();
    }

    fn block_body(&mut self, body: &[Stmt]) {
        if body.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{");
        self.newline();
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.pad();
        self.push("}");
    }

    /// Print a statement body as a block, wrapping single statements.
    fn body(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(body) => self.block_body(body),
            other => self.block_body(std::slice::from_ref(other)),
        }
    }

    fn stmt_inline(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => {
                let text = self.render(|p| p.expr(expr, SEQUENCE));
                if starts_ambiguously(&text) {
                    self.push(&format!("({text});"));
                } else {
                    self.push(&text);
                    self.push(";");
                }
            }
            Stmt::Var(kind, declarators) => {
                self.declarations(*kind, declarators);
                self.push(";");
            }
            Stmt::Function(func) => self.function(func),
            Stmt::Return(None) => self.push("return;"),
            Stmt::Return(Some(expr)) => {
                self.push("return ");
                self.expr(expr, SEQUENCE);
                self.push(";");
            }
            Stmt::If { test, consequent, alternate } => {
                self.push("if (");
                self.expr(test, SEQUENCE);
                self.push(") ");
                self.body(consequent);
                if let Some(alternate) = alternate {
                    self.push(" else ");
                    match alternate.as_ref() {
                        nested @ Stmt::If { .. } => self.stmt_inline(nested),
                        other => self.body(other),
                    }
                }
            }
            Stmt::Block(body) => self.block_body(body),
            Stmt::For { init, test, update, body } => {
                self.push("for (");
                match init {
                    Some(ForInit::Var(kind, declarators)) => self.declarations(*kind, declarators),
                    Some(ForInit::Expr(expr)) => self.expr(expr, SEQUENCE),
                    None => {}
                }
                self.push(";");
                if let Some(test) = test {
                    self.push(" ");
                    self.expr(test, SEQUENCE);
                }
                self.push(";");
                if let Some(update) = update {
                    self.push(" ");
                    self.expr(update, SEQUENCE);
                }
                self.push(") ");
                self.body(body);
            }
            Stmt::ForIn { left, right, body } => {
                self.push("for (");
                self.for_head(left);
                self.push(" in ");
                self.expr(right, SEQUENCE);
                self.push(") ");
                self.body(body);
            }
            Stmt::ForOf { left, right, body } => {
                self.push("for (");
                self.for_head(left);
                self.push(" of ");
                self.expr(right, ASSIGN);
                self.push(") ");
                self.body(body);
            }
            Stmt::While { test, body } => {
                self.push("while (");
                self.expr(test, SEQUENCE);
                self.push(") ");
                self.body(body);
            }
            Stmt::DoWhile { body, test } => {
                self.push("do ");
                self.body(body);
                self.push(" while (");
                self.expr(test, SEQUENCE);
                self.push(");");
            }
            Stmt::Break(label) => match label {
                Some(label) => self.push(&format!("break {label};")),
                None => self.push("break;"),
            },
            Stmt::Continue(label) => match label {
                Some(label) => self.push(&format!("continue {label};")),
                None => self.push("continue;"),
            },
            Stmt::Throw(expr) => {
                self.push("throw ");
                self.expr(expr, SEQUENCE);
                self.push(";");
            }
            Stmt::Try { block, handler, finalizer } => {
                self.push("try ");
                self.block_body(block);
                if let Some(handler) = handler {
                    self.push(" catch ");
                    if let Some(param) = &handler.param {
                        self.push("(");
                        self.pattern(param);
                        self.push(") ");
                    }
                    self.block_body(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.push(" finally ");
                    self.block_body(finalizer);
                }
            }
            Stmt::Switch { discriminant, cases } => {
                self.push("switch (");
                self.expr(discriminant, SEQUENCE);
                self.push(") {");
                self.newline();
                self.indent += 1;
                for case in cases {
                    self.pad();
                    match &case.test {
                        Some(test) => {
                            self.push("case ");
                            self.expr(test, SEQUENCE);
                            self.push(":");
                        }
                        None => self.push("default:"),
                    }
                    self.newline();
                    self.indent += 1;
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.pad();
                self.push("}");
            }
            Stmt::Labeled { label, body } => {
                self.push(&format!("{label}: "));
                self.stmt_inline(body);
            }
            Stmt::Empty => self.push(";"),
        }
    }

    fn declarations(&mut self, kind: VarKind, declarators: &[Declarator]) {
        self.push(kind.as_str());
        self.push(" ");
        for (i, declarator) in declarators.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.pattern(&declarator.target);
            if let Some(init) = &declarator.init {
                self.push(" = ");
                self.expr(init, ASSIGN);
            }
        }
    }

    fn for_head(&mut self, head: &ForHead) {
        match head {
            ForHead::Var(kind, pattern) => {
                self.push(kind.as_str());
                self.push(" ");
                self.pattern(pattern);
            }
            ForHead::Target(pattern) => self.pattern(pattern),
        }
    }

    // Functions

    fn params(&mut self, func: &Function) {
        self.push("(");
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.pattern(param);
        }
        if let Some(rest) = &func.rest {
            if !func.params.is_empty() {
                self.push(", ");
            }
            self.push("...");
            self.pattern(rest);
        }
        self.push(")");
    }

    fn function(&mut self, func: &Function) {
        match func.kind {
            FunctionKind::Arrow => {
                self.params(func);
                self.push(" => ");
                match &func.body {
                    FunctionBody::Block(body) => self.block_body(body),
                    FunctionBody::Expr(expr) => {
                        let text = self.render(|p| p.expr(expr, ASSIGN));
                        if text.starts_with('{') {
                            self.push(&format!("({text})"));
                        } else {
                            self.push(&text);
                        }
                    }
                }
            }
            kind => {
                self.push(if kind == FunctionKind::Generator { "function* " } else { "function " });
                if let Some(name) = &func.name {
                    self.push(name);
                }
                self.params(func);
                self.push(" ");
                match &func.body {
                    FunctionBody::Block(body) => self.block_body(body),
                    FunctionBody::Expr(expr) => {
                        self.block_body(&[Stmt::Return(Some(expr.as_ref().clone()))])
                    }
                }
            }
        }
    }

    // Patterns

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Static(name) if is_identifier_name(name) => self.push(name),
            PropKey::Static(name) if is_canonical_index(name) => self.push(name),
            PropKey::Static(name) => self.push(&quote(name)),
            PropKey::Computed(expr) => {
                self.push("[");
                self.expr(expr, ASSIGN);
                self.push("]");
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(name) => self.push(name),
            Pattern::Member(expr) => self.expr(expr, MEMBER),
            Pattern::Object { props, rest } => {
                if props.is_empty() && rest.is_none() {
                    self.push("{}");
                    return;
                }
                self.push("{ ");
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    let shorthand = match (&prop.key, &prop.value) {
                        (PropKey::Static(key), Pattern::Ident(value)) => key == value,
                        (PropKey::Static(key), Pattern::Default { target, .. }) => {
                            matches!(target.as_ref(), Pattern::Ident(value) if key == value)
                        }
                        _ => false,
                    };
                    if !shorthand {
                        self.prop_key(&prop.key);
                        self.push(": ");
                    }
                    self.pattern(&prop.value);
                }
                if let Some(rest) = rest {
                    if !props.is_empty() {
                        self.push(", ");
                    }
                    self.push("...");
                    self.pattern(rest);
                }
                self.push(" }");
            }
            Pattern::Array { elements, rest } => {
                self.push("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    if let Some(element) = element {
                        self.pattern(element);
                    }
                }
                if let Some(rest) = rest {
                    if !elements.is_empty() {
                        self.push(", ");
                    }
                    self.push("...");
                    self.pattern(rest);
                } else if matches!(elements.last(), Some(None)) {
                    self.push(",");
                }
                self.push("]");
            }
            Pattern::Default { target, default } => {
                self.pattern(target);
                self.push(" = ");
                self.expr(default, ASSIGN);
            }
        }
    }

    // Expressions

    fn render(&mut self, f: impl FnOnce(&mut Printer)) -> String {
        let mut nested = Printer { out: String::new(), indent: self.indent };
        f(&mut nested);
        nested.out
    }

    fn expr(&mut self, expr: &Expr, min: u8) {
        if precedence(expr) < min {
            self.push("(");
            self.expr_inner(expr);
            self.push(")");
        } else {
            self.expr_inner(expr);
        }
    }

    fn args(&mut self, args: &[Arg]) {
        self.push("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match arg {
                Arg::Expr(expr) => self.expr(expr, ASSIGN),
                Arg::Spread(expr) => {
                    self.push("...");
                    self.expr(expr, ASSIGN);
                }
            }
        }
        self.push(")");
    }

    /// Object position of a member access or call.
    fn object(&mut self, object: &Expr, min: u8) {
        match object {
            // A chain would otherwise swallow the access that follows it
            Expr::Chain(_) => {
                self.push("(");
                self.expr_inner(object);
                self.push(")");
            }
            Expr::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                self.push("(");
                self.expr_inner(object);
                self.push(")");
            }
            other => self.expr(other, min),
        }
    }

    fn logical_operand(&mut self, parent: LogicalOperator, operand: &Expr, min: u8) {
        let mixes_coalesce = match operand {
            Expr::Logical(child, ..) => {
                (parent == LogicalOperator::Coalesce) != (*child == LogicalOperator::Coalesce)
            }
            _ => false,
        };
        if mixes_coalesce {
            self.push("(");
            self.expr_inner(operand);
            self.push(")");
        } else {
            self.expr(operand, min);
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Null => self.push("null"),
            Expr::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Expr::Number(n) => self.push(&number_to_string(*n)),
            Expr::Str(s) => self.push(&quote(s)),
            Expr::Template { quasis, exprs } => {
                self.push("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.push(&escape_template(quasi));
                    if let Some(expr) = exprs.get(i) {
                        self.push("${");
                        self.expr(expr, SEQUENCE);
                        self.push("}");
                    }
                }
                self.push("`");
            }
            Expr::Regex { pattern, flags } => self.push(&format!("/{pattern}/{flags}")),
            Expr::Ident(name) => self.push(name),
            Expr::This => self.push("this"),
            Expr::Array(items) => {
                self.push("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match item {
                        ArrayItem::Expr(expr) => self.expr(expr, ASSIGN),
                        ArrayItem::Spread(expr) => {
                            self.push("...");
                            self.expr(expr, ASSIGN);
                        }
                        ArrayItem::Hole => {}
                    }
                }
                if matches!(items.last(), Some(ArrayItem::Hole)) {
                    self.push(",");
                }
                self.push("]");
            }
            Expr::Object(items) => {
                if items.is_empty() {
                    self.push("{}");
                    return;
                }
                self.push("{ ");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match item {
                        ObjectItem::Prop { key: PropKey::Static(key), value: Expr::Ident(value), .. }
                            if key == value =>
                        {
                            self.push(value)
                        }
                        ObjectItem::Prop { key, value, .. } => {
                            self.prop_key(key);
                            self.push(": ");
                            self.expr(value, ASSIGN);
                        }
                        ObjectItem::Spread(expr) => {
                            self.push("...");
                            self.expr(expr, ASSIGN);
                        }
                    }
                }
                self.push(" }");
            }
            Expr::Function(func) => self.function(func),
            Expr::Unary(op, argument) => {
                let op_str = op.as_str();
                self.push(op_str);
                let needs_space = op_str.chars().all(|c| c.is_ascii_alphabetic())
                    || matches!(
                        (op_str, argument.as_ref()),
                        ("-", Expr::Unary(UnaryOperator::UnaryNegation, _))
                            | ("+", Expr::Unary(UnaryOperator::UnaryPlus, _))
                            | ("-", Expr::Update { op: UpdateOperator::Decrement, prefix: true, .. })
                            | ("+", Expr::Update { op: UpdateOperator::Increment, prefix: true, .. })
                    );
                if needs_space {
                    self.push(" ");
                }
                self.expr(argument, UNARY);
            }
            Expr::Update { op, prefix, target } => {
                if *prefix {
                    self.push(op.as_str());
                    self.pattern(target);
                } else {
                    self.pattern(target);
                    self.push(op.as_str());
                }
            }
            Expr::Binary(op, left, right) => {
                let prec = binary_precedence(*op);
                if *op == BinaryOperator::Exponential {
                    // Unary operands on the left of `**` must be parenthesized
                    self.expr(left, POSTFIX);
                    self.push(" ** ");
                    self.expr(right, prec);
                } else {
                    self.expr(left, prec);
                    self.push(&format!(" {} ", op.as_str()));
                    self.expr(right, prec + 1);
                }
            }
            Expr::Logical(op, left, right) => {
                let prec = logical_precedence(*op);
                self.logical_operand(*op, left, prec);
                self.push(&format!(" {} ", op.as_str()));
                self.logical_operand(*op, right, prec + 1);
            }
            Expr::Conditional { test, consequent, alternate } => {
                self.expr(test, COALESCE_OR);
                self.push(" ? ");
                self.expr(consequent, ASSIGN);
                self.push(" : ");
                self.expr(alternate, ASSIGN);
            }
            Expr::Assign { op, target, value } => {
                self.pattern(target);
                self.push(&format!(" {} ", op.as_str()));
                self.expr(value, ASSIGN);
            }
            Expr::Sequence(exprs) => {
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(expr, ASSIGN);
                }
            }
            Expr::Call { callee, args, optional } => {
                self.object(callee, CALL);
                if *optional {
                    self.push("?.");
                }
                self.args(args);
            }
            Expr::New { callee, args } => {
                self.push("new ");
                if contains_call(callee) {
                    self.push("(");
                    self.expr_inner(callee);
                    self.push(")");
                } else {
                    self.object(callee, MEMBER);
                }
                self.args(args);
            }
            Expr::Member { object, property, optional } => {
                self.object(object, CALL);
                match property {
                    MemberProp::Static(name) => {
                        self.push(if *optional { "?." } else { "." });
                        self.push(name);
                    }
                    MemberProp::Computed(expr) => {
                        if *optional {
                            self.push("?.");
                        }
                        self.push("[");
                        self.expr(expr, SEQUENCE);
                        self.push("]");
                    }
                }
            }
            Expr::Chain(inner) => self.expr_inner(inner),
            Expr::Yield(argument) => {
                self.push("yield ");
                self.expr(argument, ASSIGN);
            }
        }
    }
}

fn is_canonical_index(name: &str) -> bool {
    name.parse::<u32>().is_ok_and(|n| n.to_string() == name)
}

/// Whether a statement-level expression would be read as a block or declaration.
fn starts_ambiguously(text: &str) -> bool {
    if text.starts_with('{') {
        return true;
    }
    ["function", "class", "let ["].iter().any(|keyword| {
        text.strip_prefix(keyword).is_some_and(|rest| {
            keyword.ends_with('[')
                || rest.starts_with([' ', '*', '('])
        })
    })
}

fn contains_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } => true,
        Expr::Member { object, .. } => contains_call(object),
        Expr::Chain(inner) => contains_call(inner),
        _ => false,
    }
}

fn escape_template(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
