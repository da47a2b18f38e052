// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Mnemonic synonyms accepted by the dialect.
//!
//! These are spellings with no opcode of their own; they rewrite into
//! canonical `LD` forms before the table is consulted:
//!
//! - `ldhl sp, e`  -> `ld hl, sp+e`     (F8)
//! - `ldi a, (hl)` -> `ld a, (hl+)`     (2A), and the stores likewise
//! - `ldd a, (hl)` -> `ld a, (hl-)`     (3A), and the stores likewise

use crate::core::parser::{BinaryOp, Expr};

/// Mnemonics that exist only as synonyms; they belong in the mnemonic
/// set but never appear in the opcode table.
pub static SYNONYM_MNEMONICS: &[&str] = &["LDHL", "LDI", "LDD"];

/// Rewrite a synonym mnemonic and its operands into canonical form.
/// Returns the mnemonic to use for the table lookup; non-synonyms pass
/// through unchanged.
pub fn rewrite<'a>(mnemonic: &'a str, operands: &mut Vec<Expr>) -> &'a str {
    let upper = mnemonic.to_ascii_uppercase();
    match upper.as_str() {
        "LDHL" => {
            // ldhl sp, e => ld hl, sp+e
            if operands.len() == 2 && is_register(&operands[0], "SP") {
                let offset = operands[1].clone();
                let span = operands[0].span();
                operands[0] = Expr::Register("HL".to_string(), span);
                operands[1] = Expr::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(Expr::Register("SP".to_string(), span)),
                    right: Box::new(offset),
                    span,
                };
            }
            "LD"
        }
        "LDI" | "LDD" => {
            let inner = if upper == "LDI" { "HLI" } else { "HLD" };
            for operand in operands.iter_mut() {
                if let Expr::Indirect(boxed, span) = operand {
                    if is_register(boxed, "HL") {
                        **boxed = Expr::Register(inner.to_string(), *span);
                    }
                }
            }
            "LD"
        }
        _ => mnemonic,
    }
}

fn is_register(expr: &Expr, name: &str) -> bool {
    matches!(expr, Expr::Register(reg, _) if reg.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::rewrite;
    use crate::core::parser::Expr;
    use crate::core::tokenizer::Span;

    fn reg(name: &str) -> Expr {
        Expr::Register(name.to_string(), Span::default())
    }

    fn num(text: &str) -> Expr {
        Expr::Number(text.to_string(), Span::default())
    }

    #[test]
    fn ldhl_becomes_ld_hl_sp_offset() {
        let mut operands = vec![reg("sp"), num("$6a")];
        let mnemonic = rewrite("ldhl", &mut operands);
        assert_eq!(mnemonic, "LD");
        assert!(matches!(&operands[0], Expr::Register(name, _) if name == "HL"));
        assert!(matches!(&operands[1], Expr::Binary { .. }));
    }

    #[test]
    fn ldi_rewrites_hl_indirection() {
        let mut operands = vec![reg("A"), Expr::Indirect(Box::new(reg("HL")), Span::default())];
        let mnemonic = rewrite("ldi", &mut operands);
        assert_eq!(mnemonic, "LD");
        match &operands[1] {
            Expr::Indirect(inner, _) => {
                assert!(matches!(&**inner, Expr::Register(name, _) if name == "HLI"));
            }
            other => panic!("Expected indirect, got {other:?}"),
        }
    }

    #[test]
    fn ldd_store_form_rewrites_too() {
        let mut operands = vec![Expr::Indirect(Box::new(reg("HL")), Span::default()), reg("A")];
        let mnemonic = rewrite("LDD", &mut operands);
        assert_eq!(mnemonic, "LD");
        match &operands[0] {
            Expr::Indirect(inner, _) => {
                assert!(matches!(&**inner, Expr::Register(name, _) if name == "HLD"));
            }
            other => panic!("Expected indirect, got {other:?}"),
        }
    }

    #[test]
    fn ordinary_mnemonics_pass_through() {
        let mut operands = vec![reg("A")];
        assert_eq!(rewrite("inc", &mut operands), "inc");
    }
}
