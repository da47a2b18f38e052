// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Parser for tokenized assembly source.
//!
//! A line parses to one of a handful of shapes: empty, a `SECTION`
//! declaration, a constant definition (`name EQU expr` or
//! `DEF name EQU expr`), or a generic statement carrying an optional
//! label, an optional mnemonic and its operand expressions. Whether a
//! statement mnemonic is a directive or an instruction is decided by the
//! driver; the parser only needs the keyword set to tell a leading
//! mnemonic apart from a label.

use crate::core::text_utils::is_ident_start;
use crate::core::tokenizer::{
    KeywordChecker, OperatorKind, RegisterChecker, Span, Token, TokenKind, TokenizeError,
    Tokenizer,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum LineAst {
    Empty,
    Section {
        name: String,
        region: String,
        bank: Option<Expr>,
        span: Span,
    },
    Constant {
        name: Label,
        expr: Expr,
    },
    Statement {
        label: Option<Label>,
        mnemonic: Option<String>,
        operands: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(String, Span),
    Identifier(String, Span),
    Register(String, Span),
    /// Parenthesized subexpression. Grouping and memory indirection share
    /// this node; the encoder decides which one it is from context.
    Indirect(Box<Expr>, Span),
    String(Vec<u8>, Span),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::Identifier(_, span)
            | Expr::Register(_, span)
            | Expr::Indirect(_, span)
            | Expr::String(_, span) => *span,
            Expr::Unary { span, .. } | Expr::Binary { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
}

/// The directive words of the dialect.
pub fn is_directive(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "SECTION" | "DB" | "DW" | "DS" | "EQU" | "DEF" | "INCLUDE"
    )
}

fn no_keywords(_word: &str) -> bool {
    false
}

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end_span: Span,
    is_mnemonic: KeywordChecker,
}

impl Parser {
    pub fn from_line(line: &str, line_num: u32) -> Result<Self, ParseError> {
        Self::from_line_with_checkers(
            line,
            line_num,
            crate::core::tokenizer::register_checker_none(),
            Arc::new(no_keywords),
        )
    }

    pub fn from_line_with_checkers(
        line: &str,
        line_num: u32,
        is_register: RegisterChecker,
        is_mnemonic: KeywordChecker,
    ) -> Result<Self, ParseError> {
        if let Some(first) = line.as_bytes().first().copied() {
            if !first.is_ascii_whitespace()
                && first != b';'
                && first != b'.'
                && !is_ident_start(first)
            {
                return Err(ParseError {
                    message: format!(
                        "Illegal character in column 1. Must be symbol, '.', comment, or space. Found: {line}"
                    ),
                    span: Span {
                        line: line_num,
                        col_start: 1,
                        col_end: 1,
                    },
                });
            }
        }
        let mut tokenizer = Tokenizer::with_register_checker(line, line_num, is_register);
        let mut tokens = Vec::new();
        let end_span = loop {
            let token = tokenizer.next_token().map_err(map_tokenize_error)?;
            if matches!(token.kind, TokenKind::End) {
                break token.span;
            }
            tokens.push(token);
        };
        Ok(Self {
            tokens,
            index: 0,
            end_span,
            is_mnemonic,
        })
    }

    pub fn end_span(&self) -> Span {
        self.end_span
    }

    fn is_keyword(&self, word: &str) -> bool {
        is_directive(word) || (self.is_mnemonic)(word)
    }

    pub fn parse_line(&mut self) -> Result<LineAst, ParseError> {
        if self.tokens.is_empty() {
            return Ok(LineAst::Empty);
        }

        let label = self.take_label()?;

        if self.index >= self.tokens.len() {
            return Ok(LineAst::Statement {
                label,
                mnemonic: None,
                operands: Vec::new(),
            });
        }

        let (mnemonic, mnemonic_span) = match self.next() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                span,
            }) => (name, span),
            Some(token) => {
                return Err(ParseError {
                    message: "Expected mnemonic identifier".to_string(),
                    span: token.span,
                });
            }
            None => unreachable!("checked above"),
        };

        if mnemonic.eq_ignore_ascii_case("SECTION") {
            if let Some(label) = label {
                return Err(ParseError {
                    message: "Label not allowed on a SECTION line".to_string(),
                    span: label.span,
                });
            }
            return self.parse_section_args(mnemonic_span);
        }

        if mnemonic.eq_ignore_ascii_case("EQU") {
            let name = label.ok_or(ParseError {
                message: "EQU requires a name in the label position".to_string(),
                span: mnemonic_span,
            })?;
            if name.exported {
                return Err(ParseError {
                    message: "A constant cannot be exported".to_string(),
                    span: name.span,
                });
            }
            let expr = self.parse_expr()?;
            self.expect_line_end()?;
            return Ok(LineAst::Constant { name, expr });
        }

        if mnemonic.eq_ignore_ascii_case("DEF") {
            if let Some(label) = label {
                return Err(ParseError {
                    message: "Label not allowed on a DEF line".to_string(),
                    span: label.span,
                });
            }
            return self.parse_def();
        }

        let mut operands = Vec::new();
        if self.index < self.tokens.len() {
            operands.push(self.parse_expr()?);
            while self.consume_kind(TokenKind::Comma) {
                operands.push(self.parse_expr()?);
            }
        }
        self.expect_line_end()?;

        Ok(LineAst::Statement {
            label,
            mnemonic: Some(mnemonic),
            operands,
        })
    }

    /// Recognize a leading label. A first-token identifier followed by `:`
    /// or `::` is always a label definition; without a colon it is a label
    /// only when it sits in column 1 and is not a known keyword (that form
    /// carries `name EQU expr` lines).
    fn take_label(&mut self) -> Result<Option<Label>, ParseError> {
        let first = match self.tokens.first() {
            Some(token) => token.clone(),
            None => return Ok(None),
        };
        let name = match &first.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Register(name) => {
                if matches!(
                    self.tokens.get(1).map(|t| &t.kind),
                    Some(TokenKind::Colon) | Some(TokenKind::DoubleColon)
                ) {
                    return Err(ParseError {
                        message: format!("Register name cannot be used as a label: {name}"),
                        span: first.span,
                    });
                }
                return Ok(None);
            }
            _ => return Ok(None),
        };

        match self.tokens.get(1).map(|t| &t.kind) {
            Some(TokenKind::Colon) => {
                self.index = 2;
                Ok(Some(Label {
                    name,
                    exported: false,
                    span: first.span,
                }))
            }
            Some(TokenKind::DoubleColon) => {
                self.index = 2;
                Ok(Some(Label {
                    name,
                    exported: true,
                    span: first.span,
                }))
            }
            _ => {
                if first.span.col_start == 1 && !self.is_keyword(&name) {
                    self.index = 1;
                    Ok(Some(Label {
                        name,
                        exported: false,
                        span: first.span,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// `SECTION "name", REGION [, BANK[n]]`
    fn parse_section_args(&mut self, start_span: Span) -> Result<LineAst, ParseError> {
        let name = match self.next() {
            Some(Token {
                kind: TokenKind::String(lit),
                ..
            }) => String::from_utf8_lossy(&lit.bytes).to_string(),
            Some(token) => {
                return Err(ParseError {
                    message: "SECTION requires a quoted name".to_string(),
                    span: token.span,
                });
            }
            None => {
                return Err(ParseError {
                    message: "SECTION requires a quoted name".to_string(),
                    span: self.end_span,
                });
            }
        };
        if !self.consume_kind(TokenKind::Comma) {
            return Err(ParseError {
                message: "Expected ',' after section name".to_string(),
                span: self.current_span(),
            });
        }
        let region = match self.next() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) => name,
            Some(token) => {
                return Err(ParseError {
                    message: "Expected a memory region name".to_string(),
                    span: token.span,
                });
            }
            None => {
                return Err(ParseError {
                    message: "Expected a memory region name".to_string(),
                    span: self.end_span,
                });
            }
        };

        let mut bank = None;
        if self.consume_kind(TokenKind::Comma) {
            match self.next() {
                Some(Token {
                    kind: TokenKind::Identifier(word),
                    span,
                }) if word.eq_ignore_ascii_case("BANK") => {
                    if !self.consume_kind(TokenKind::OpenParen) {
                        return Err(ParseError {
                            message: "Expected '[' after BANK".to_string(),
                            span,
                        });
                    }
                    bank = Some(self.parse_expr()?);
                    if !self.consume_kind(TokenKind::CloseParen) {
                        return Err(ParseError {
                            message: "Missing ']' after BANK number".to_string(),
                            span: self.current_span(),
                        });
                    }
                }
                Some(token) => {
                    return Err(ParseError {
                        message: "Expected BANK[n] after region".to_string(),
                        span: token.span,
                    });
                }
                None => {
                    return Err(ParseError {
                        message: "Expected BANK[n] after region".to_string(),
                        span: self.end_span,
                    });
                }
            }
        }
        self.expect_line_end()?;

        let end = self
            .tokens
            .last()
            .map(|t| t.span.col_end)
            .unwrap_or(start_span.col_end);
        Ok(LineAst::Section {
            name,
            region,
            bank,
            span: Span {
                line: start_span.line,
                col_start: start_span.col_start,
                col_end: end,
            },
        })
    }

    /// `DEF name EQU expr`
    fn parse_def(&mut self) -> Result<LineAst, ParseError> {
        let (name, span) = match self.next() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                span,
            }) => (name, span),
            Some(token) => {
                return Err(ParseError {
                    message: "Expected a constant name after DEF".to_string(),
                    span: token.span,
                });
            }
            None => {
                return Err(ParseError {
                    message: "Expected a constant name after DEF".to_string(),
                    span: self.end_span,
                });
            }
        };
        match self.next() {
            Some(Token {
                kind: TokenKind::Identifier(word),
                ..
            }) if word.eq_ignore_ascii_case("EQU") => {}
            Some(token) => {
                return Err(ParseError {
                    message: "Expected EQU after the constant name".to_string(),
                    span: token.span,
                });
            }
            None => {
                return Err(ParseError {
                    message: "Expected EQU after the constant name".to_string(),
                    span: self.end_span,
                });
            }
        }
        let expr = self.parse_expr()?;
        self.expect_line_end()?;
        Ok(LineAst::Constant {
            name: Label {
                name,
                exported: false,
                span,
            },
            expr,
        })
    }

    fn expect_line_end(&self) -> Result<(), ParseError> {
        if self.index < self.tokens.len() {
            return Err(ParseError {
                message: "Unexpected trailing tokens".to_string(),
                span: self.tokens[self.index].span,
            });
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_sum()
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_term()?;
        loop {
            let op = match self.peek_operator_kind() {
                Some(OperatorKind::Plus) => BinaryOp::Add,
                Some(OperatorKind::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.index += 1;
            let op_span = self.prev_span();
            let right = self.parse_term()?;
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
                span: op_span,
            };
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek_operator_kind() {
                Some(OperatorKind::Multiply) => BinaryOp::Multiply,
                Some(OperatorKind::Divide) => BinaryOp::Divide,
                Some(OperatorKind::Mod) => BinaryOp::Mod,
                _ => break,
            };
            self.index += 1;
            let op_span = self.prev_span();
            let right = self.parse_unary()?;
            node = Expr::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
                span: op_span,
            };
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_operator(OperatorKind::Minus) {
            let span = self.prev_span();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Minus,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Number(num),
                span,
            }) => Ok(Expr::Number(num.text, span)),
            Some(Token {
                kind: TokenKind::Identifier(name),
                span,
            }) => Ok(Expr::Identifier(name, span)),
            Some(Token {
                kind: TokenKind::Register(name),
                span,
            }) => Ok(Expr::Register(name, span)),
            Some(Token {
                kind: TokenKind::String(lit),
                span,
            }) => Ok(Expr::String(lit.bytes, span)),
            Some(Token {
                kind: TokenKind::OpenParen,
                span: open_span,
            }) => {
                // (HL+) / (HL-) post-increment forms need a look before the
                // expression parser eats the sign as a binary operator.
                if let Some(expr) = self.take_hl_increment(open_span) {
                    return Ok(expr);
                }
                let expr = self.parse_expr()?;
                let close_span = self.current_span();
                if !self.consume_kind(TokenKind::CloseParen) {
                    return Err(ParseError {
                        message: "Missing ')'".to_string(),
                        span: self.current_span(),
                    });
                }
                Ok(Expr::Indirect(
                    Box::new(expr),
                    Span {
                        line: open_span.line,
                        col_start: open_span.col_start,
                        col_end: close_span.col_end,
                    },
                ))
            }
            Some(token) => Err(ParseError {
                message: "Unexpected token in expression".to_string(),
                span: token.span,
            }),
            None => Err(ParseError {
                message: "Unexpected end of expression".to_string(),
                span: self.end_span,
            }),
        }
    }

    fn take_hl_increment(&mut self, open_span: Span) -> Option<Expr> {
        match self.tokens.get(self.index) {
            Some(Token {
                kind: TokenKind::Register(name),
                ..
            }) if name.eq_ignore_ascii_case("HL") => {}
            _ => return None,
        }
        let inner = match self.tokens.get(self.index + 1).map(|t| &t.kind) {
            Some(TokenKind::Operator(OperatorKind::Plus)) => "HLI",
            Some(TokenKind::Operator(OperatorKind::Minus)) => "HLD",
            _ => return None,
        };
        let close = match self.tokens.get(self.index + 2) {
            Some(Token {
                kind: TokenKind::CloseParen,
                span,
            }) => *span,
            _ => return None,
        };
        self.index += 3;
        let span = Span {
            line: open_span.line,
            col_start: open_span.col_start,
            col_end: close.col_end,
        };
        Some(Expr::Indirect(
            Box::new(Expr::Register(inner.to_string(), span)),
            span,
        ))
    }

    fn consume_kind(&mut self, kind: TokenKind) -> bool {
        if let Some(token) = self.peek() {
            if token.kind == kind {
                self.index += 1;
                return true;
            }
        }
        false
    }

    fn match_operator(&mut self, op: OperatorKind) -> bool {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Operator(op) {
                self.index += 1;
                return true;
            }
        }
        false
    }

    fn peek_operator_kind(&self) -> Option<OperatorKind> {
        if let Some(token) = self.peek() {
            if let TokenKind::Operator(op) = token.kind {
                return Some(op);
            }
        }
        None
    }

    fn next(&mut self) -> Option<Token> {
        if self.index >= self.tokens.len() {
            None
        } else {
            let token = self.tokens[self.index].clone();
            self.index += 1;
            Some(token)
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn prev_span(&self) -> Span {
        if self.index == 0 {
            Span::default()
        } else {
            self.tokens[self.index - 1].span
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.index)
            .map(|t| t.span)
            .unwrap_or(self.end_span)
    }
}

fn map_tokenize_error(err: TokenizeError) -> ParseError {
    ParseError {
        message: err.message,
        span: err.span,
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, LineAst, Parser};
    use crate::core::tokenizer::register_checker_from_fn;
    use std::sync::Arc;

    fn gb_registers(ident: &str) -> bool {
        matches!(
            ident,
            "A" | "B" | "C" | "D" | "E" | "H" | "L" | "AF" | "BC" | "DE" | "HL" | "SP" | "PC"
                | "HLI" | "HLD" | "Z" | "NZ" | "NC"
        )
    }

    fn parse(line: &str) -> LineAst {
        let mut parser = Parser::from_line_with_checkers(
            line,
            1,
            register_checker_from_fn(gb_registers),
            Arc::new(|word: &str| {
                matches!(word.to_ascii_uppercase().as_str(), "LD" | "JR" | "JP" | "NOP")
            }),
        )
        .unwrap();
        parser.parse_line().unwrap()
    }

    #[test]
    fn parses_label_and_instruction() {
        match parse("start: ld A, 5") {
            LineAst::Statement {
                label,
                mnemonic,
                operands,
            } => {
                let label = label.expect("label");
                assert_eq!(label.name, "start");
                assert!(!label.exported);
                assert_eq!(mnemonic.as_deref(), Some("ld"));
                assert_eq!(operands.len(), 2);
                assert!(matches!(&operands[0], Expr::Register(name, _) if name == "A"));
                assert!(matches!(&operands[1], Expr::Number(_, _)));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_exported_label() {
        match parse("entry:: nop") {
            LineAst::Statement { label, .. } => {
                let label = label.expect("label");
                assert_eq!(label.name, "entry");
                assert!(label.exported);
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn leading_mnemonic_is_not_a_label() {
        match parse("nop") {
            LineAst::Statement {
                label, mnemonic, ..
            } => {
                assert!(label.is_none());
                assert_eq!(mnemonic.as_deref(), Some("nop"));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_local_label() {
        match parse(".loop: jr .loop") {
            LineAst::Statement {
                label,
                mnemonic,
                operands,
            } => {
                assert_eq!(label.expect("label").name, ".loop");
                assert_eq!(mnemonic.as_deref(), Some("jr"));
                assert!(matches!(&operands[0], Expr::Identifier(name, _) if name == ".loop"));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_equ_constant() {
        match parse("BIG EQU 65500") {
            LineAst::Constant { name, expr } => {
                assert_eq!(name.name, "BIG");
                assert!(matches!(expr, Expr::Number(_, _)));
            }
            other => panic!("Expected constant, got {other:?}"),
        }
    }

    #[test]
    fn parses_def_constant() {
        match parse("DEF WIDTH EQU 40/8") {
            LineAst::Constant { name, expr } => {
                assert_eq!(name.name, "WIDTH");
                assert!(matches!(expr, Expr::Binary { .. }));
            }
            other => panic!("Expected constant, got {other:?}"),
        }
    }

    #[test]
    fn parses_section_line() {
        match parse("SECTION \"x\", ROM0") {
            LineAst::Section {
                name, region, bank, ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(region, "ROM0");
                assert!(bank.is_none());
            }
            other => panic!("Expected section, got {other:?}"),
        }
    }

    #[test]
    fn parses_section_with_bank() {
        match parse("SECTION \"engine\", ROMX, BANK[2]") {
            LineAst::Section { region, bank, .. } => {
                assert_eq!(region, "ROMX");
                assert!(bank.is_some());
            }
            other => panic!("Expected section, got {other:?}"),
        }
    }

    #[test]
    fn parses_indirect_operand() {
        match parse(" ld A, (HL)") {
            LineAst::Statement { operands, .. } => {
                assert!(matches!(&operands[1], Expr::Indirect(_, _)));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn square_brackets_parse_like_parens() {
        match parse(" ld A, [HL]") {
            LineAst::Statement { operands, .. } => {
                assert!(matches!(&operands[1], Expr::Indirect(_, _)));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_hl_increment_forms() {
        match parse(" ld (HL+), A") {
            LineAst::Statement { operands, .. } => match &operands[0] {
                Expr::Indirect(inner, _) => {
                    assert!(matches!(&**inner, Expr::Register(name, _) if name == "HLI"));
                }
                other => panic!("Expected indirect, got {other:?}"),
            },
            other => panic!("Expected statement, got {other:?}"),
        }
        match parse(" ld A, (HL-)") {
            LineAst::Statement { operands, .. } => match &operands[1] {
                Expr::Indirect(inner, _) => {
                    assert!(matches!(&**inner, Expr::Register(name, _) if name == "HLD"));
                }
                other => panic!("Expected indirect, got {other:?}"),
            },
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_sp_plus_offset() {
        match parse(" ld HL, SP+$55") {
            LineAst::Statement { operands, .. } => {
                assert!(matches!(&operands[1], Expr::Binary { .. }));
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_operand_list() {
        match parse(" db 1, 2, 3") {
            LineAst::Statement {
                mnemonic, operands, ..
            } => {
                assert_eq!(mnemonic.as_deref(), Some("db"));
                assert_eq!(operands.len(), 3);
            }
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_tokens() {
        let mut parser = Parser::from_line(" db 1 2", 1).unwrap();
        assert!(parser.parse_line().is_err());
    }

    #[test]
    fn rejects_register_label() {
        let mut parser = Parser::from_line_with_checkers(
            "HL: nop",
            1,
            register_checker_from_fn(gb_registers),
            Arc::new(|_: &str| false),
        )
        .unwrap();
        assert!(parser.parse_line().is_err());
    }

    #[test]
    fn empty_and_comment_lines_parse_empty() {
        assert!(matches!(parse(""), LineAst::Empty));
        assert!(matches!(parse("; just a comment"), LineAst::Empty));
    }
}
