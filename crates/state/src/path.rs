//! JSONPath queries.
//!
//! Expressions are parsed once into a [`JsonPath`] and evaluated eagerly
//! against a borrowed document. Every match carries the JSON Pointer of its
//! location.
//!
//! Supported syntax:
//!
//! | Form | Meaning |
//! |---|---|
//! | `$` | the root |
//! | `.name`, `['name']` | object member |
//! | `[2]`, `[-1]` | array element, negative counts from the end |
//! | `.*`, `[*]` | every child |
//! | `..name`, `..*`, `..[0]` | descendants (pre-order) |
//! | `[start:end:step]` | slice, Python semantics |
//! | `[0,2]`, `['a','b']` | union |
//! | `[?(@.price < 10 && @.tag)]` | filter over children |

use crate::error::{Result, StateError};
use crate::patch::json_equal;
use crate::pointer::JsonPointer;
use serde_json::Value;
use std::cmp::Ordering;

/// A parsed JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

/// A value selected by a query, with the pointer to where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch<'a> {
    pub pointer: JsonPointer,
    pub value: &'a Value,
}

/// Parse `expression` and evaluate it against `document`.
pub fn query<'a>(document: &'a Value, expression: &str) -> Result<Vec<QueryMatch<'a>>> {
    Ok(JsonPath::parse(expression)?.evaluate(document))
}

impl JsonPath {
    pub fn parse(expression: &str) -> Result<Self> {
        let mut parser = Parser::new(expression);
        let segments = parser.root_query()?;
        Ok(Self {
            source: expression.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate against `document`. Never mutates and never fails: an
    /// expression that selects nothing yields an empty vector.
    pub fn evaluate<'a>(&self, document: &'a Value) -> Vec<QueryMatch<'a>> {
        select(&self.segments, document, document, JsonPointer::root())
            .into_iter()
            .map(|(pointer, value)| QueryMatch { pointer, value })
            .collect()
    }
}

impl std::str::FromStr for JsonPath {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ── Syntax tree ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Vec<Selector>),
    Descendant(Vec<Selector>),
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Filter(Box<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Or(Box<Filter>, Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    Exists(SubQuery),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct SubQuery {
    from_root: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Query(SubQuery),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// ── Evaluation ────────────────────────────────────────────────────────────

type Node<'a> = (JsonPointer, &'a Value);

fn select<'a>(
    segments: &[Segment],
    root: &'a Value,
    start: &'a Value,
    location: JsonPointer,
) -> Vec<Node<'a>> {
    let mut nodes = vec![(location, start)];
    for segment in segments {
        let mut next = Vec::new();
        for (pointer, value) in &nodes {
            match segment {
                Segment::Child(selectors) => {
                    apply_selectors(selectors, root, pointer, *value, &mut next);
                }
                Segment::Descendant(selectors) => {
                    for (inner_pointer, inner) in descendants(pointer.clone(), *value) {
                        apply_selectors(selectors, root, &inner_pointer, inner, &mut next);
                    }
                }
            }
        }
        nodes = next;
    }
    nodes
}

/// The node itself followed by every node beneath it, in document order.
fn descendants(pointer: JsonPointer, value: &Value) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![(pointer, value)];
    while let Some((pointer, value)) = stack.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter().rev() {
                    stack.push((pointer.child(key.as_str()), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate().rev() {
                    stack.push((pointer.child(i.to_string()), child));
                }
            }
            _ => {}
        }
        out.push((pointer, value));
    }
    out
}

fn children<'a>(pointer: &JsonPointer, value: &'a Value) -> Vec<Node<'a>> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| (pointer.child(key.as_str()), child))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| (pointer.child(i.to_string()), child))
            .collect(),
        _ => Vec::new(),
    }
}

fn apply_selectors<'a>(
    selectors: &[Selector],
    root: &'a Value,
    pointer: &JsonPointer,
    value: &'a Value,
    out: &mut Vec<Node<'a>>,
) {
    for selector in selectors {
        match selector {
            Selector::Name(name) => {
                if let Some(child) = value.as_object().and_then(|map| map.get(name)) {
                    out.push((pointer.child(name.as_str()), child));
                }
            }
            Selector::Wildcard => out.extend(children(pointer, value)),
            Selector::Index(index) => {
                if let Some(items) = value.as_array()
                    && let Some(i) = normalize_index(*index, items.len())
                {
                    out.push((pointer.child(i.to_string()), &items[i]));
                }
            }
            Selector::Slice { start, end, step } => {
                if let Some(items) = value.as_array() {
                    for i in slice_indices(items.len(), *start, *end, *step) {
                        out.push((pointer.child(i.to_string()), &items[i]));
                    }
                }
            }
            Selector::Filter(filter) => {
                for (child_pointer, child) in children(pointer, value) {
                    if test_filter(filter, root, child) {
                        out.push((child_pointer, child));
                    }
                }
            }
        }
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let bound = |raw: i64, low: i64, high: i64| {
        let resolved = if raw < 0 { raw + len } else { raw };
        resolved.clamp(low, high)
    };
    let mut indices = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| bound(s, 0, len));
        let stop = end.map_or(len, |e| bound(e, 0, len));
        while i < stop {
            indices.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let mut i = start.map_or(len - 1, |s| bound(s, -1, len - 1));
        let stop = end.map_or(-1, |e| bound(e, -1, len - 1));
        while i > stop {
            indices.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    indices
}

fn test_filter(filter: &Filter, root: &Value, current: &Value) -> bool {
    match filter {
        Filter::Or(l, r) => test_filter(l, root, current) || test_filter(r, root, current),
        Filter::And(l, r) => test_filter(l, root, current) && test_filter(r, root, current),
        Filter::Not(inner) => !test_filter(inner, root, current),
        Filter::Exists(query) => !run_subquery(query, root, current).is_empty(),
        Filter::Compare { left, op, right } => {
            let l = resolve_operand(left, root, current);
            let r = resolve_operand(right, root, current);
            compare(l, *op, r)
        }
    }
}

fn run_subquery<'a>(query: &SubQuery, root: &'a Value, current: &'a Value) -> Vec<Node<'a>> {
    let start = if query.from_root { root } else { current };
    select(&query.segments, root, start, JsonPointer::root())
}

/// A comparison operand resolves to a single value, or to nothing when a
/// query selects zero or several nodes.
fn resolve_operand<'a>(operand: &'a Operand, root: &'a Value, current: &'a Value) -> Option<&'a Value> {
    match operand {
        Operand::Literal(value) => Some(value),
        Operand::Query(query) => {
            let mut nodes = run_subquery(query, root, current);
            if nodes.len() == 1 {
                nodes.pop().map(|(_, value)| value)
            } else {
                None
            }
        }
    }
}

fn compare(left: Option<&Value>, op: CmpOp, right: Option<&Value>) -> bool {
    match op {
        CmpOp::Eq => equal_or_both_missing(left, right),
        CmpOp::Ne => !equal_or_both_missing(left, right),
        CmpOp::Lt => order(left, right) == Some(Ordering::Less),
        CmpOp::Gt => order(left, right) == Some(Ordering::Greater),
        CmpOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn equal_or_both_missing(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => json_equal(l, r),
        _ => false,
    }
}

/// Only numbers with numbers and strings with strings are ordered.
fn order(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────

/// Filter nesting deeper than this is rejected before it can exhaust the stack.
const MAX_FILTER_DEPTH: usize = 64;

struct Parser<'s> {
    src: &'s str,
    pos: usize,
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    fn error<T>(&self, reason: impl Into<String>) -> Result<T> {
        Err(StateError::InvalidPathExpression {
            expression: self.src.to_string(),
            offset: self.pos,
            reason: reason.into(),
        })
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        if self.src[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => self.error(format!("expected '{expected}', found '{found}'")),
                None => self.error(format!("expected '{expected}', found end of expression")),
            }
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn root_query(&mut self) -> Result<Vec<Segment>> {
        self.skip_ws();
        if self.peek().is_none() {
            return self.error("empty expression");
        }
        if !self.eat('$') {
            return self.error("expression must start with '$'");
        }
        let segments = self.segments()?;
        self.skip_ws();
        if let Some(c) = self.peek() {
            return self.error(format!("unexpected character '{c}'"));
        }
        Ok(segments)
    }

    /// Parse segments until something that cannot continue a path.
    fn segments(&mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some('.') if self.peek_second() == Some('.') => {
                    self.pos += 2;
                    segments.push(Segment::Descendant(self.after_descendant()?));
                }
                Some('.') => {
                    self.bump();
                    segments.push(Segment::Child(vec![self.dot_selector()?]));
                }
                Some('[') => segments.push(Segment::Child(self.bracket()?)),
                _ => return Ok(segments),
            }
        }
    }

    fn after_descendant(&mut self) -> Result<Vec<Selector>> {
        if self.peek() == Some('[') {
            self.bracket()
        } else {
            Ok(vec![self.dot_selector()?])
        }
    }

    fn dot_selector(&mut self) -> Result<Selector> {
        if self.eat('*') {
            return Ok(Selector::Wildcard);
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.bump();
        }
        if start == self.pos {
            return self.error("expected a member name or '*'");
        }
        Ok(Selector::Name(self.src[start..self.pos].to_string()))
    }

    fn bracket(&mut self) -> Result<Vec<Selector>> {
        self.expect('[')?;
        let mut selectors = Vec::new();
        loop {
            self.skip_ws();
            selectors.push(self.bracket_selector()?);
            self.skip_ws();
            if self.eat(']') {
                return Ok(selectors);
            }
            self.expect(',')?;
        }
    }

    fn bracket_selector(&mut self) -> Result<Selector> {
        match self.peek() {
            Some('\'' | '"') => Ok(Selector::Name(self.quoted()?)),
            Some('*') => {
                self.bump();
                Ok(Selector::Wildcard)
            }
            Some('?') => {
                self.bump();
                self.skip_ws();
                Ok(Selector::Filter(Box::new(self.filter_or()?)))
            }
            Some(c) if c == '-' || c == ':' || c.is_ascii_digit() => self.index_or_slice(),
            Some(c) => self.error(format!("unexpected character '{c}' in brackets")),
            None => self.error("unterminated '['"),
        }
    }

    fn index_or_slice(&mut self) -> Result<Selector> {
        let start = self.opt_int()?;
        self.skip_ws();
        if !self.eat(':') {
            return match start {
                Some(index) => Ok(Selector::Index(index)),
                None => self.error("expected an index"),
            };
        }
        self.skip_ws();
        let end = self.opt_int()?;
        self.skip_ws();
        let mut step = 1;
        if self.eat(':') {
            self.skip_ws();
            let step_pos = self.pos;
            step = self.opt_int()?.unwrap_or(1);
            if step == 0 {
                self.pos = step_pos;
                return self.error("slice step cannot be zero");
            }
        }
        Ok(Selector::Slice { start, end, step })
    }

    fn opt_int(&mut self) -> Result<Option<i64>> {
        let start = self.pos;
        self.eat('-');
        let digits = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == digits {
            if self.pos != start {
                return self.error("expected digits after '-'");
            }
            return Ok(None);
        }
        match self.src[start..self.pos].parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                self.pos = start;
                self.error("integer out of range")
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        let open = self.pos;
        let Some(quote) = self.bump() else {
            return self.error("expected a quoted string");
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c @ ('\\' | '\'' | '"' | '/')) => out.push(c),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => {
                        self.pos -= c.len_utf8() + 1;
                        return self.error(format!("unknown escape '\\{c}'"));
                    }
                    None => break,
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => break,
            }
        }
        self.pos = open;
        self.error("unterminated string")
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_FILTER_DEPTH {
            return self.error("nesting too deep");
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn filter_or(&mut self) -> Result<Filter> {
        self.nested(Self::filter_or_inner)
    }

    fn filter_or_inner(&mut self) -> Result<Filter> {
        let mut left = self.filter_and()?;
        loop {
            self.skip_ws();
            if !self.eat_str("||") {
                return Ok(left);
            }
            let right = self.filter_and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
    }

    fn filter_and(&mut self) -> Result<Filter> {
        let mut left = self.filter_unary()?;
        loop {
            self.skip_ws();
            if !self.eat_str("&&") {
                return Ok(left);
            }
            let right = self.filter_unary()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
    }

    fn filter_unary(&mut self) -> Result<Filter> {
        self.skip_ws();
        if self.peek() == Some('!') && self.peek_second() != Some('=') {
            self.bump();
            let inner = self.nested(Self::filter_unary)?;
            return Ok(Filter::Not(Box::new(inner)));
        }
        if self.eat('(') {
            let inner = self.filter_or()?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(inner);
        }
        let operand_pos = self.pos;
        let left = self.operand()?;
        self.skip_ws();
        match self.comparison_op() {
            Some(op) => {
                self.skip_ws();
                let right = self.operand()?;
                Ok(Filter::Compare { left, op, right })
            }
            None => match left {
                Operand::Query(query) => Ok(Filter::Exists(query)),
                Operand::Literal(_) => {
                    self.pos = operand_pos;
                    self.error("a literal must be compared against something")
                }
            },
        }
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        const OPS: [(&str, CmpOp); 6] = [
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ];
        OPS.iter()
            .find(|(text, _)| self.eat_str(text))
            .map(|(_, op)| *op)
    }

    fn operand(&mut self) -> Result<Operand> {
        match self.peek() {
            Some('@') => {
                self.bump();
                Ok(Operand::Query(SubQuery {
                    from_root: false,
                    segments: self.segments()?,
                }))
            }
            Some('$') => {
                self.bump();
                Ok(Operand::Query(SubQuery {
                    from_root: true,
                    segments: self.segments()?,
                }))
            }
            Some('\'' | '"') => Ok(Operand::Literal(Value::String(self.quoted()?))),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            _ => {
                for (word, value) in [
                    ("true", Value::Bool(true)),
                    ("false", Value::Bool(false)),
                    ("null", Value::Null),
                ] {
                    if self.eat_str(word) {
                        return Ok(Operand::Literal(value));
                    }
                }
                match self.peek() {
                    Some(c) => self.error(format!("unexpected character '{c}' in filter")),
                    None => self.error("unterminated filter"),
                }
            }
        }
    }

    fn number(&mut self) -> Result<Operand> {
        let start = self.pos;
        self.eat('-');
        let scan_digits = |p: &mut Self| {
            let from = p.pos;
            while p.peek().is_some_and(|c| c.is_ascii_digit()) {
                p.bump();
            }
            p.pos > from
        };
        let mut ok = scan_digits(self);
        if self.peek() == Some('.') {
            self.bump();
            ok &= scan_digits(self);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            ok &= scan_digits(self);
        }
        let text = &self.src[start..self.pos];
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Number(_)) if ok => Ok(Operand::Literal(value)),
            _ => {
                self.pos = start;
                self.error(format!("invalid number '{text}'"))
            }
        }
    }
}
