//! JSX desugaring into factory calls.
//!
//! `<View style={s}>Hi</View>` becomes
//! `React.createElement(View, { style: s }, "Hi")`, following the classic
//! runtime: lowercase tags are strings, member tags are member expressions and
//! fragments use the fragment identifier.

use std::rc::Rc;

use oxc_ast::ast as js;

use crate::ast::*;
use crate::error::TranspileError;
use crate::lower::Lowerer;

type Result<T> = std::result::Result<T, TranspileError>;

impl Lowerer<'_> {
    pub(crate) fn jsx_element(&mut self, el: &js::JSXElement<'_>) -> Result<Expr> {
        let opening = &el.opening_element;
        let element_type = self.jsx_name(&opening.name)?;

        let props = if opening.attributes.is_empty() {
            Expr::Null
        } else {
            let mut items = Vec::with_capacity(opening.attributes.len());
            for attr in &opening.attributes {
                items.push(match attr {
                    js::JSXAttributeItem::Attribute(attr) => {
                        let key = match &attr.name {
                            js::JSXAttributeName::Identifier(id) => Rc::from(id.name.as_str()),
                            js::JSXAttributeName::NamespacedName(ns) => {
                                Rc::from(format!("{}:{}", ns.namespace.name, ns.name.name))
                            }
                        };
                        let value = match &attr.value {
                            None => Expr::Bool(true),
                            Some(value) => self.jsx_attribute_value(value)?,
                        };
                        ObjectItem::Prop { key: PropKey::Static(key), value, shorthand: false }
                    }
                    js::JSXAttributeItem::SpreadAttribute(spread) => {
                        ObjectItem::Spread(self.expr(&spread.argument)?)
                    }
                });
            }
            Expr::Object(items)
        };

        let children = self.jsx_children(&el.children)?;
        Ok(self.create_element(element_type, props, children))
    }

    pub(crate) fn jsx_fragment(&mut self, frag: &js::JSXFragment<'_>) -> Result<Expr> {
        let children = self.jsx_children(&frag.children)?;
        let fragment = self.pragma_frag.clone();
        Ok(self.create_element(fragment, Expr::Null, children))
    }

    fn create_element(&self, element_type: Expr, props: Expr, children: Vec<Expr>) -> Expr {
        let mut args = Vec::with_capacity(children.len() + 2);
        args.push(element_type);
        args.push(props);
        args.extend(children);
        Expr::call(self.pragma.clone(), args)
    }

    fn jsx_name(&mut self, name: &js::JSXElementName<'_>) -> Result<Expr> {
        match name {
            js::JSXElementName::Identifier(id) => Ok(Expr::Str(Rc::from(id.name.as_str()))),
            js::JSXElementName::IdentifierReference(id) => Ok(Expr::ident(&id.name)),
            js::JSXElementName::NamespacedName(ns) => Ok(Expr::Str(Rc::from(format!(
                "{}:{}",
                ns.namespace.name, ns.name.name
            )))),
            js::JSXElementName::MemberExpression(member) => Ok(self.jsx_member(member)),
            js::JSXElementName::ThisExpression(_) => Ok(Expr::This),
        }
    }

    fn jsx_member(&self, member: &js::JSXMemberExpression<'_>) -> Expr {
        let object = match &member.object {
            js::JSXMemberExpressionObject::IdentifierReference(id) => Expr::ident(&id.name),
            js::JSXMemberExpressionObject::MemberExpression(inner) => self.jsx_member(inner),
            js::JSXMemberExpressionObject::ThisExpression(_) => Expr::This,
        };
        Expr::member(object, &member.property.name)
    }

    fn jsx_attribute_value(&mut self, value: &js::JSXAttributeValue<'_>) -> Result<Expr> {
        match value {
            js::JSXAttributeValue::StringLiteral(s) => Ok(Expr::Str(Rc::from(decode_entities(&s.value)))),
            js::JSXAttributeValue::ExpressionContainer(container) => {
                match container.expression.as_expression() {
                    Some(expr) => self.expr(expr),
                    None => self.unsupported("empty JSX attribute", container.span),
                }
            }
            js::JSXAttributeValue::Element(el) => self.jsx_element(el),
            js::JSXAttributeValue::Fragment(frag) => self.jsx_fragment(frag),
        }
    }

    fn jsx_children(&mut self, children: &[js::JSXChild<'_>]) -> Result<Vec<Expr>> {
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match child {
                js::JSXChild::Text(text) => {
                    let cleaned = clean_text(&decode_entities(&text.value));
                    if !cleaned.is_empty() {
                        out.push(Expr::Str(Rc::from(cleaned)));
                    }
                }
                js::JSXChild::Element(el) => out.push(self.jsx_element(el)?),
                js::JSXChild::Fragment(frag) => out.push(self.jsx_fragment(frag)?),
                js::JSXChild::ExpressionContainer(container) => {
                    // `{/* comment */}` produces nothing
                    if let Some(expr) = container.expression.as_expression() {
                        out.push(self.expr(expr)?);
                    }
                }
                js::JSXChild::Spread(spread) => {
                    return self.unsupported("JSX spread child", spread.span);
                }
            }
        }
        Ok(out)
    }
}

/// Collapse JSX text whitespace the way the classic transform does.
///
/// Lines are trimmed (except the leading edge of the first line and the
/// trailing edge of the last), blank lines are dropped, and the remaining
/// lines are joined with single spaces.
pub(crate) fn clean_text(value: &str) -> String {
    let lines: Vec<&str> = value.split("\r\n").flat_map(|l| l.split(['\n', '\r'])).collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'));

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == lines.len() - 1;

        let mut trimmed = line.replace('\t', " ");
        if !is_first {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if !is_last {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(&trimmed);
        if Some(i) != last_non_empty {
            out.push(' ');
        }
    }
    out
}

/// Decode HTML character references in JSX text and attribute strings.
pub(crate) fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end > 1 && end <= 10)
            .and_then(|end| entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "deg" => '\u{b0}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        "yen" => '\u{a5}',
        "cent" => '\u{a2}',
        "larr" => '\u{2190}',
        "rarr" => '\u{2192}',
        "uarr" => '\u{2191}',
        "darr" => '\u{2193}',
        "hearts" => '\u{2665}',
        "check" => '\u{2713}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_lines() {
        assert_eq!(clean_text("\n      Hello\n      world\n    "), "Hello world");
        assert_eq!(clean_text("  a  "), "  a  ");
        assert_eq!(clean_text("\n   \n"), "");
        assert_eq!(clean_text("Count: "), "Count: ");
    }

    #[test]
    fn clean_text_keeps_inner_spacing() {
        assert_eq!(clean_text("a\tb"), "a b");
        assert_eq!(clean_text(" Tap me\n  "), " Tap me");
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&#169; &#x2014;"), "\u{a9} \u{2014}");
        assert_eq!(decode_entities("AT&T"), "AT&T");
        assert_eq!(decode_entities("&unknown; &"), "&unknown; &");
    }
}
