// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Numeric conversion and expression evaluation.
//!
//! This module is the single authority on numeric literals: parsing across
//! the four supported bases, formatting back to text, and classifying how
//! wide a value is for operand-size inference. It also provides the shared
//! expression evaluator used by the directive processor and the encoder.

use crate::core::parser::{BinaryOp, Expr, UnaryOp};
use crate::core::tokenizer::Span;

/// Error returned from expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub span: Option<Span>,
    pub undefined_symbol: Option<String>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            undefined_symbol: None,
        }
    }

    pub fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
            undefined_symbol: None,
        }
    }

    pub fn undefined(name: &str, span: Span) -> Self {
        Self {
            message: format!("Undefined symbol: {name}"),
            span: Some(span),
            undefined_symbol: Some(name.to_string()),
        }
    }

    /// True when the failure is an undefined symbol, the one case the
    /// encoder turns into a fixup instead of a fatal error.
    pub fn is_undefined(&self) -> bool {
        self.undefined_symbol.is_some()
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Context for expression evaluation.
///
/// Symbol lookup may itself fail (a local reference with no governing
/// global label), which is why the return is layered: `Ok(None)` means
/// "not defined yet" and is fixup material, `Err` is fatal.
pub trait EvalContext {
    fn lookup_symbol(&self, name: &str) -> Result<Option<i32>, EvalError>;
}

/// Evaluate an expression to a numeric value. All arithmetic is signed
/// 32-bit; narrowing happens at operand binding, not here.
pub fn eval_expr(expr: &Expr, ctx: &dyn EvalContext) -> Result<i32, EvalError> {
    match expr {
        Expr::Number(text, span) => parse_number(text)
            .ok_or_else(|| EvalError::with_span(format!("Invalid number: {text}"), *span)),

        Expr::Identifier(name, span) => match ctx.lookup_symbol(name) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(EvalError::undefined(name, *span)),
            Err(mut err) => {
                if err.span.is_none() {
                    err.span = Some(*span);
                }
                Err(err)
            }
        },

        Expr::Register(name, span) => Err(EvalError::with_span(
            format!("Register {name} cannot be used as a value"),
            *span,
        )),

        Expr::String(bytes, span) => {
            if bytes.len() == 1 {
                Ok(bytes[0] as i32)
            } else if bytes.len() == 2 {
                Ok(((bytes[0] as i32) << 8) | (bytes[1] as i32))
            } else {
                Err(EvalError::with_span(
                    "Multi-character string not allowed in expression",
                    *span,
                ))
            }
        }

        // Parenthesized grouping; indirection is resolved by the encoder
        // before expressions ever reach the evaluator.
        Expr::Indirect(inner, _) => eval_expr(inner, ctx),

        Expr::Unary { op, expr, .. } => {
            let val = eval_expr(expr, ctx)?;
            Ok(match op {
                UnaryOp::Minus => val.wrapping_neg(),
            })
        }

        Expr::Binary {
            op,
            left,
            right,
            span,
        } => {
            let l = eval_expr(left, ctx)?;
            let r = eval_expr(right, ctx)?;
            apply_binary(*op, l, r, *span)
        }
    }
}

/// Apply a binary operator to two values.
pub fn apply_binary(op: BinaryOp, l: i32, r: i32, span: Span) -> Result<i32, EvalError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(EvalError::with_span("Division by zero", span));
            }
            l.wrapping_div(r)
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(EvalError::with_span("Modulo by zero", span));
            }
            l.wrapping_rem(r)
        }
    })
}

/// Parse a numeric literal in one of the four supported bases.
///
/// - Decimal: `42`
/// - Hex: `$2A` (`$$002A` forces the four-digit 16-bit form)
/// - Binary: `%101010`
/// - Octal: `&52` or `0o52`
///
/// Underscores are visual separators and ignored. Returns `None` for any
/// other leading character or malformed digits.
pub fn parse_number(text: &str) -> Option<i32> {
    let text: String = text.chars().filter(|&c| c != '_').collect();
    let text = text.as_str();
    if text.is_empty() {
        return None;
    }

    if let Some(hex) = text.strip_prefix("$$") {
        if hex.len() != 4 {
            return None;
        }
        return i32::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = text.strip_prefix('$') {
        return i32::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = text.strip_prefix('%') {
        return i32::from_str_radix(bin, 2).ok();
    }
    if let Some(oct) = text.strip_prefix('&') {
        return i32::from_str_radix(oct, 8).ok();
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return i32::from_str_radix(oct, 8).ok();
    }
    if text.bytes().all(|c| c.is_ascii_digit()) {
        return text.parse::<i32>().ok();
    }
    None
}

/// True for the `$$hhhh` literal form, which pins the value to 16 bits
/// regardless of magnitude.
pub fn is_forced_word(text: &str) -> bool {
    text.starts_with("$$")
}

/// Format a value as a literal in the given base, zero-padded to `width`
/// bits (8 or 16). The output round-trips through [`parse_number`].
pub fn format_number(value: i32, base: u32, width: u32) -> String {
    let mask = if width >= 16 { 0xffff } else { 0xff };
    let value = (value as u32) & mask;
    match (base, width) {
        (16, 0..=8) => format!("${value:02X}"),
        (16, _) => format!("${value:04X}"),
        (2, 0..=8) => format!("%{value:08b}"),
        (2, _) => format!("%{value:016b}"),
        (8, 0..=8) => format!("&{value:03o}"),
        (8, _) => format!("&{value:06o}"),
        _ => format!("{value}"),
    }
}

/// Returns true if the value fits in an unsigned 8-bit byte.
pub fn value_fits_byte(value: i32) -> bool {
    (0..=0xff).contains(&value)
}

/// Returns true if the value fits in an unsigned 16-bit word.
pub fn value_fits_word(value: i32) -> bool {
    (0..=0xffff).contains(&value)
}

/// Returns true if the value can be stored in a byte operand, allowing
/// negative constants down to -128.
pub fn value_fits_imm8(value: i32) -> bool {
    (-128..=0xff).contains(&value)
}

/// Returns true if the value can be stored in a word operand.
pub fn value_fits_imm16(value: i32) -> bool {
    (-32768..=0xffff).contains(&value)
}

/// Returns true if the value is a legal signed 8-bit displacement.
pub fn value_fits_rel8(value: i32) -> bool {
    (-128..=127).contains(&value)
}
