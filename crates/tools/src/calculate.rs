//! `calculate` — evaluate an arithmetic expression.
//!
//! Supports `+ - * / %`, parentheses, unary minus and decimals, with the
//! usual precedence. Evaluated by precedence climbing over a token list.

use crate::registry::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use statecraft_core::error::ToolError;
use statecraft_core::tool::ToolResult;

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, parentheses and decimals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolResult, ToolError> {
        let expression = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        Ok(match evaluate(expression) {
            Ok(value) => ToolResult::ok(ctx.call_id, format_number(value))
                .with_data(json!({ "result": value })),
            Err(reason) => ToolResult::failure(ctx.call_id, reason),
        })
    }
}

/// Render integral results without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = lex(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    let mut cursor = Cursor {
        tokens: &tokens,
        at: 0,
        depth: 0,
    };
    let value = cursor.expr(0)?;
    match cursor.tokens.get(cursor.at) {
        None => Ok(value),
        Some(tok) => Err(format!("unexpected {tok:?} at token {}", cursor.at)),
    }
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut rest = input.char_indices().peekable();
    while let Some((i, c)) = rest.next() {
        match c {
            ' ' | '\t' | '\n' => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '+' | '-' | '*' | '/' | '%' => tokens.push(Token::Op(c)),
            '0'..='9' | '.' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, d)) = rest.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = j + d.len_utf8();
                        rest.next();
                    } else {
                        break;
                    }
                }
                let text = &input[i..end];
                let n = text
                    .parse()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(n));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// Parentheses and unary signs nested deeper than this are rejected.
const MAX_NESTING: usize = 64;

fn precedence(op: char) -> u8 {
    match op {
        '+' | '-' => 1,
        _ => 2,
    }
}

struct Cursor<'t> {
    tokens: &'t [Token],
    at: usize,
    depth: usize,
}

impl Cursor<'_> {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.at).copied();
        self.at += 1;
        tok
    }

    /// Parse binary operators binding tighter than `min`.
    fn expr(&mut self, min: u8) -> Result<f64, String> {
        let mut lhs = self.operand()?;
        while let Some(&Token::Op(op)) = self.tokens.get(self.at) {
            let prec = precedence(op);
            if prec <= min {
                break;
            }
            self.at += 1;
            let rhs = self.expr(prec)?;
            lhs = match op {
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                '*' => lhs * rhs,
                '/' if rhs == 0.0 => return Err("division by zero".into()),
                '/' => lhs / rhs,
                '%' if rhs == 0.0 => return Err("modulo by zero".into()),
                _ => lhs % rhs,
            };
        }
        Ok(lhs)
    }

    fn operand(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_NESTING {
            return Err("expression nested too deeply".into());
        }
        self.depth += 1;
        let value = self.operand_inner();
        self.depth -= 1;
        value
    }

    fn operand_inner(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('-')) => Ok(-self.operand()?),
            Some(Token::Op('+')) => self.operand(),
            Some(Token::Open) => {
                let inner = self.expr(0)?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("missing ')'".into()),
                }
            }
            Some(tok) => Err(format!("unexpected {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptSlot;
    use statecraft_state::AgentStateDocument;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("100 / 10 / 5").unwrap(), 2.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("17 % 5 * 2").unwrap(), 4.0);
    }

    #[test]
    fn unary_and_decimals() {
        assert_eq!(evaluate("-5 + 2").unwrap(), -3.0);
        assert_eq!(evaluate("-(2 + 3)").unwrap(), -5.0);
        assert_eq!(evaluate("2 * -3").unwrap(), -6.0);
        assert!((evaluate("0.1 + 0.2").unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn errors() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1 / 0").unwrap_err().contains("division by zero"));
        assert!(evaluate("1 % 0").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 + ").is_err());
        assert!(evaluate("2 ^ 3").is_err());
        assert!(evaluate("1.2.3").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(evaluate(&parens).unwrap_err(), "expression nested too deeply");
        assert!(evaluate(&"-".repeat(20_000)).is_err());
        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn tool_formats_integers() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "c1");
        let result = CalculateTool
            .execute(json!({"expression": "6 * 7"}), &mut ctx)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn tool_reports_errors_as_observations() {
        let mut doc = AgentStateDocument::new();
        let mut slot = InterruptSlot::new();
        let mut ctx = ToolContext::new(&mut doc, &mut slot, "c1");
        let result = CalculateTool
            .execute(json!({"expression": "1 / 0"}), &mut ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Error: division by zero");
    }
}
