// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! LR35902 instruction encoder.
//!
//! The encoder classifies operand expressions into [`Operand`] shapes,
//! finds the matching opcode-table row, folds register / condition / bit
//! fields into the base byte and appends immediate bytes. An operand
//! whose expression references a symbol that is not defined yet emits
//! placeholder zeros and a [`FixupRequest`]; the instruction size is
//! always fixed by the mnemonic form, never inferred from symbol values.

use crate::core::expr::{
    is_forced_word, value_fits_imm16, value_fits_imm8, value_fits_rel8, EvalError,
};
use crate::core::fixup::FixupKind;
use crate::core::parser::{BinaryOp, Expr};
use crate::core::tokenizer::Span;
use crate::lr35902::dialect;
use crate::lr35902::operand::{Cond, ImmValue, Operand, Reg16, Reg8};
use crate::lr35902::table::{self, Encode, OpcodeEntry, Prefix, Shape};

/// Context provided by the driver for expression evaluation and the
/// current instruction pointer.
pub trait AssemblerContext {
    /// Evaluate an expression to a value. An undefined symbol comes back
    /// as an [`EvalError`] with `is_undefined()` set.
    fn eval_expr(&self, expr: &Expr) -> Result<i32, EvalError>;

    /// The address at which the instruction being encoded will start.
    fn current_address(&self) -> u16;
}

/// A deferred operand patch requested by the encoder. Offsets are
/// relative to the start of the returned byte sequence; the driver
/// rebases them onto the section buffer.
#[derive(Debug, Clone)]
pub struct FixupRequest {
    pub offset: usize,
    pub width: u8,
    pub kind: FixupKind,
    pub expr: Expr,
    pub span: Span,
}

/// The encoder's result: machine bytes, any fixups for unresolved
/// operands, and the instruction's machine-cycle count.
#[derive(Debug)]
pub struct EncodedInstruction {
    pub bytes: Vec<u8>,
    pub fixups: Vec<FixupRequest>,
    pub cycles: u8,
}

#[derive(Debug, Clone)]
pub struct EncodeError {
    pub message: String,
    pub span: Option<Span>,
}

impl EncodeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl From<EvalError> for EncodeError {
    fn from(err: EvalError) -> Self {
        Self {
            message: err.message,
            span: err.span,
        }
    }
}

/// Stateless encoder for the LR35902 instruction set.
#[derive(Debug, Default)]
pub struct Lr35902Handler;

impl Lr35902Handler {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(
        &self,
        mnemonic: &str,
        operands: &[Expr],
        ctx: &dyn AssemblerContext,
    ) -> Result<EncodedInstruction, EncodeError> {
        let mut exprs = operands.to_vec();
        let canonical = dialect::rewrite(mnemonic, &mut exprs).to_string();
        if !table::is_mnemonic(&canonical) {
            return Err(EncodeError::new(format!("Unknown mnemonic: {mnemonic}")));
        }

        let upper = canonical.to_ascii_uppercase();
        strip_implicit_accumulator(&upper, &mut exprs);

        let mut ops = Vec::with_capacity(exprs.len());
        for (index, expr) in exprs.iter().enumerate() {
            ops.push(self.classify(&upper, index, exprs.len(), expr, ctx)?);
        }

        let row = match find_row(&upper, &ops) {
            Some(row) => row,
            None => return Err(no_match_error(mnemonic, &upper, &ops)),
        };

        self.emit(&upper, row, &ops, ctx)
    }

    fn classify(
        &self,
        mnemonic: &str,
        index: usize,
        count: usize,
        expr: &Expr,
        ctx: &dyn AssemblerContext,
    ) -> Result<Operand, EncodeError> {
        // Condition codes are positional: only the first operand of the
        // branch mnemonics, and only when a target follows (RET aside).
        let allow_cond = matches!(mnemonic, "JP" | "JR" | "CALL" | "RET")
            && index == 0
            && (count == 2 || mnemonic == "RET");

        match expr {
            Expr::Register(name, span) => {
                if allow_cond {
                    if let Some(cond) = Cond::parse(name) {
                        return Ok(Operand::Cond(cond, *span));
                    }
                }
                if let Some(reg) = Reg8::parse(name) {
                    return Ok(Operand::Reg8(reg, *span));
                }
                if let Some(reg) = Reg16::parse(name) {
                    return Ok(Operand::Reg16(reg, *span));
                }
                Err(EncodeError::with_span(
                    format!("{name} cannot be used as an operand here"),
                    *span,
                ))
            }

            Expr::Indirect(inner, span) => match &**inner {
                Expr::Register(name, _) => match name.to_ascii_uppercase().as_str() {
                    "BC" => Ok(Operand::IndBc(*span)),
                    "DE" => Ok(Operand::IndDe(*span)),
                    "HL" => Ok(Operand::IndHl(*span)),
                    "HLI" => Ok(Operand::IndHli(*span)),
                    "HLD" => Ok(Operand::IndHld(*span)),
                    "C" => Ok(Operand::IndC(*span)),
                    other => Err(EncodeError::with_span(
                        format!("({other}) is not an addressable operand"),
                        *span,
                    )),
                },
                address => Ok(Operand::IndImm(self.immediate(address, *span, ctx)?)),
            },

            // `SP+e` is its own shape, not an arithmetic expression over
            // a register.
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
                span,
            } if matches!(&**left, Expr::Register(name, _) if name.eq_ignore_ascii_case("SP")) => {
                Ok(Operand::SpRel(self.immediate(right, *span, ctx)?))
            }

            other => Ok(Operand::Imm(self.immediate(other, other.span(), ctx)?)),
        }
    }

    fn immediate(
        &self,
        expr: &Expr,
        span: Span,
        ctx: &dyn AssemblerContext,
    ) -> Result<ImmValue, EncodeError> {
        let value = match ctx.eval_expr(expr) {
            Ok(value) => Some(value),
            Err(err) if err.is_undefined() => None,
            Err(err) => return Err(err.into()),
        };
        let forced_word = matches!(expr, Expr::Number(text, _) if is_forced_word(text));
        Ok(ImmValue {
            value,
            expr: expr.clone(),
            span,
            forced_word,
        })
    }

    fn emit(
        &self,
        mnemonic: &str,
        row: &'static OpcodeEntry,
        ops: &[Operand],
        ctx: &dyn AssemblerContext,
    ) -> Result<EncodedInstruction, EncodeError> {
        let mut bytes = Vec::with_capacity(3);
        let mut fixups = Vec::new();

        if row.prefix == Prefix::Cb {
            bytes.push(0xCB);
        }

        let mut opcode = row.base;
        match row.encode {
            Encode::Fixed => {}
            Encode::R8Dst => {
                opcode |= r8_slot(row, ops, 0)? << 3;
            }
            Encode::R8Src => {
                opcode |= r8_slot(row, ops, 0)?;
            }
            Encode::R8Pair => {
                let dst = r8_slot(row, ops, 0)?;
                let src = r8_slot(row, ops, 1)?;
                if dst == 6 && src == 6 {
                    return Err(EncodeError::with_span(
                        "ld (HL), (HL) is not a valid instruction",
                        ops[0].span(),
                    ));
                }
                opcode |= (dst << 3) | src;
            }
            Encode::R16 => {
                opcode |= r16_slot(row, ops, Shape::R16)? << 4;
            }
            Encode::R16Stack => {
                opcode |= r16_slot(row, ops, Shape::R16Stack)? << 4;
            }
            Encode::CondBits => {
                let cond = ops
                    .iter()
                    .find_map(|op| match op {
                        Operand::Cond(cond, _) => Some(*cond),
                        _ => None,
                    })
                    .expect("CondBits row matched without a condition");
                opcode |= cond.code() << 3;
            }
            Encode::BitR8 => {
                let bit = known_value(&ops[0], "Bit index")?;
                if !(0..=7).contains(&bit) {
                    return Err(EncodeError::with_span(
                        format!("Bit index {bit} out of range (0-7)"),
                        ops[0].span(),
                    ));
                }
                opcode |= (bit as u8) << 3;
                opcode |= r8_slot(row, ops, 0)?;
            }
            Encode::RstBits => {
                let target = known_value(&ops[0], "RST target")?;
                if !(0..=0x38).contains(&target) || target % 8 != 0 {
                    return Err(EncodeError::with_span(
                        format!(
                            "RST target ${target:02X} invalid; must be one of $00,$08,$10,$18,$20,$28,$30,$38"
                        ),
                        ops[0].span(),
                    ));
                }
                opcode |= target as u8;
            }
        }
        bytes.push(opcode);

        // The padding byte the hardware expects after STOP.
        if mnemonic == "STOP" {
            bytes.push(0x00);
        }

        for (shape, op) in row.pattern.iter().zip(ops) {
            self.emit_immediate(*shape, op, ctx, &mut bytes, &mut fixups)?;
        }

        Ok(EncodedInstruction {
            bytes,
            fixups,
            cycles: row.cycles,
        })
    }

    fn emit_immediate(
        &self,
        shape: Shape,
        op: &Operand,
        ctx: &dyn AssemblerContext,
        bytes: &mut Vec<u8>,
        fixups: &mut Vec<FixupRequest>,
    ) -> Result<(), EncodeError> {
        let imm = match op {
            Operand::Imm(imm) | Operand::IndImm(imm) | Operand::SpRel(imm) => imm,
            _ => return Ok(()),
        };
        match shape {
            Shape::Imm8 => {
                if imm.forced_word {
                    return Err(EncodeError::with_span(
                        "16-bit literal in an 8-bit operand",
                        imm.span,
                    ));
                }
                match imm.value {
                    Some(value) => {
                        if !value_fits_imm8(value) {
                            return Err(EncodeError::with_span(
                                format!("Value {value} out of range for an 8-bit operand"),
                                imm.span,
                            ));
                        }
                        bytes.push((value & 0xff) as u8);
                    }
                    None => {
                        fixups.push(FixupRequest {
                            offset: bytes.len(),
                            width: 1,
                            kind: FixupKind::Absolute,
                            expr: imm.expr.clone(),
                            span: imm.span,
                        });
                        bytes.push(0x00);
                    }
                }
            }
            Shape::Imm16 | Shape::IndImm16 => match imm.value {
                Some(value) => {
                    if !value_fits_imm16(value) {
                        return Err(EncodeError::with_span(
                            format!("Value {value} out of range for a 16-bit operand"),
                            imm.span,
                        ));
                    }
                    let word = value as u16;
                    bytes.push((word & 0xff) as u8);
                    bytes.push((word >> 8) as u8);
                }
                None => {
                    fixups.push(FixupRequest {
                        offset: bytes.len(),
                        width: 2,
                        kind: FixupKind::Absolute,
                        expr: imm.expr.clone(),
                        span: imm.span,
                    });
                    bytes.push(0x00);
                    bytes.push(0x00);
                }
            },
            Shape::IndImm8 => match imm.value {
                Some(value) => {
                    if (0xFF00..=0xFFFF).contains(&value) || (0..=0xFF).contains(&value) {
                        bytes.push((value & 0xff) as u8);
                    } else {
                        return Err(EncodeError::with_span(
                            format!("Address {value:#06X} not in the $FF00 page"),
                            imm.span,
                        ));
                    }
                }
                None => {
                    fixups.push(FixupRequest {
                        offset: bytes.len(),
                        width: 1,
                        kind: FixupKind::HighPage,
                        expr: imm.expr.clone(),
                        span: imm.span,
                    });
                    bytes.push(0x00);
                }
            },
            Shape::SignedImm8 | Shape::SpImm8 => match imm.value {
                Some(value) => {
                    if !value_fits_rel8(value) {
                        return Err(EncodeError::with_span(
                            format!("Displacement {value} out of range (-128..127)"),
                            imm.span,
                        ));
                    }
                    bytes.push((value as i8) as u8);
                }
                None => {
                    fixups.push(FixupRequest {
                        offset: bytes.len(),
                        width: 1,
                        kind: FixupKind::Signed8,
                        expr: imm.expr.clone(),
                        span: imm.span,
                    });
                    bytes.push(0x00);
                }
            },
            Shape::Rel8 => match imm.value {
                Some(target) => {
                    // Displacement is relative to the IP past this
                    // 2-byte instruction.
                    let disp = target - (ctx.current_address() as i32 + 2);
                    if !value_fits_rel8(disp) {
                        return Err(EncodeError::with_span(
                            format!("Relative jump out of range: displacement {disp}"),
                            imm.span,
                        ));
                    }
                    bytes.push((disp as i8) as u8);
                }
                None => {
                    fixups.push(FixupRequest {
                        offset: bytes.len(),
                        width: 1,
                        kind: FixupKind::Relative8,
                        expr: imm.expr.clone(),
                        span: imm.span,
                    });
                    bytes.push(0x00);
                }
            },
            _ => {}
        }
        Ok(())
    }
}

/// The ALU mnemonics accept `op A, x` and `op x` interchangeably; the
/// table holds the single-operand form.
fn strip_implicit_accumulator(mnemonic: &str, exprs: &mut Vec<Expr>) {
    if !matches!(
        mnemonic,
        "ADD" | "ADC" | "SUB" | "SBC" | "AND" | "XOR" | "OR" | "CP"
    ) {
        return;
    }
    if exprs.len() == 2 {
        let first_is_a =
            matches!(&exprs[0], Expr::Register(name, _) if name.eq_ignore_ascii_case("A"));
        // `ADD HL, rr` and `ADD SP, e` keep both operands.
        if first_is_a {
            exprs.remove(0);
        }
    }
}

fn find_row(mnemonic: &str, ops: &[Operand]) -> Option<&'static OpcodeEntry> {
    table::rows_for(mnemonic).find(|row| {
        row.pattern.len() == ops.len()
            && row
                .pattern
                .iter()
                .zip(ops)
                .all(|(shape, op)| shape_matches(*shape, op))
    })
}

fn shape_matches(shape: Shape, op: &Operand) -> bool {
    match shape {
        Shape::A => matches!(op, Operand::Reg8(Reg8::A, _)),
        Shape::R8 => matches!(op, Operand::Reg8(_, _) | Operand::IndHl(_)),
        Shape::R16 => matches!(op, Operand::Reg16(reg, _) if reg.pair_code().is_some()),
        Shape::R16Stack => matches!(op, Operand::Reg16(reg, _) if reg.stack_code().is_some()),
        Shape::Hl => matches!(op, Operand::Reg16(Reg16::Hl, _)),
        Shape::Sp => matches!(op, Operand::Reg16(Reg16::Sp, _)),
        Shape::IndBc => matches!(op, Operand::IndBc(_)),
        Shape::IndDe => matches!(op, Operand::IndDe(_)),
        Shape::IndHl => matches!(op, Operand::IndHl(_)),
        Shape::IndHli => matches!(op, Operand::IndHli(_)),
        Shape::IndHld => matches!(op, Operand::IndHld(_)),
        Shape::IndC => matches!(op, Operand::IndC(_)),
        Shape::Imm8
        | Shape::Imm16
        | Shape::SignedImm8
        | Shape::Rel8
        | Shape::Bit
        | Shape::RstVec => matches!(op, Operand::Imm(_)),
        Shape::IndImm8 | Shape::IndImm16 => matches!(op, Operand::IndImm(_)),
        Shape::SpImm8 => matches!(op, Operand::SpRel(_)),
        Shape::Cond => matches!(op, Operand::Cond(_, _)),
    }
}

/// Three-bit register code for the n-th R8 slot of the row's pattern.
fn r8_slot(row: &OpcodeEntry, ops: &[Operand], nth: usize) -> Result<u8, EncodeError> {
    let index = row
        .pattern
        .iter()
        .enumerate()
        .filter(|(_, shape)| matches!(shape, Shape::R8))
        .map(|(i, _)| i)
        .nth(nth)
        .expect("encode rule requires an R8 slot the pattern lacks");
    match &ops[index] {
        Operand::Reg8(reg, _) => Ok(reg.code()),
        Operand::IndHl(_) => Ok(6),
        other => Err(EncodeError::with_span(
            format!("Expected an 8-bit register, got {}", other.describe()),
            other.span(),
        )),
    }
}

fn r16_slot(row: &OpcodeEntry, ops: &[Operand], group: Shape) -> Result<u8, EncodeError> {
    let index = row
        .pattern
        .iter()
        .position(|shape| *shape == group)
        .expect("encode rule requires an R16 slot the pattern lacks");
    match &ops[index] {
        Operand::Reg16(reg, span) => {
            let code = if group == Shape::R16Stack {
                reg.stack_code()
            } else {
                reg.pair_code()
            };
            code.ok_or_else(|| {
                EncodeError::with_span(
                    format!("{} is not valid in this register group", reg.name()),
                    *span,
                )
            })
        }
        other => Err(EncodeError::with_span(
            format!("Expected a 16-bit register, got {}", other.describe()),
            other.span(),
        )),
    }
}

/// Operand fields folded into the opcode byte cannot be forward
/// references; there is no byte to patch later.
fn known_value(op: &Operand, what: &str) -> Result<i32, EncodeError> {
    match op {
        Operand::Imm(imm) => imm.value.ok_or_else(|| {
            EncodeError::with_span(format!("{what} must be a known constant"), imm.span)
        }),
        other => Err(EncodeError::with_span(
            format!("{what} must be a constant expression"),
            other.span(),
        )),
    }
}

fn no_match_error(original: &str, mnemonic: &str, ops: &[Operand]) -> EncodeError {
    let given = ops
        .iter()
        .map(Operand::describe)
        .collect::<Vec<_>>()
        .join(", ");
    let accepted = table::rows_for(mnemonic)
        .map(|row| {
            let shapes = row
                .pattern
                .iter()
                .map(|shape| shape.name())
                .collect::<Vec<_>>()
                .join(", ");
            if shapes.is_empty() {
                mnemonic.to_string()
            } else {
                format!("{mnemonic} {shapes}")
            }
        })
        .collect::<Vec<_>>()
        .join(" | ");
    EncodeError::new(format!(
        "No operand form of {original} matches ({given}); accepted: {accepted}"
    ))
}

#[cfg(test)]
mod tests {
    use super::{AssemblerContext, EncodedInstruction, Lr35902Handler};
    use crate::core::expr::{eval_expr, EvalContext, EvalError};
    use crate::core::fixup::FixupKind;
    use crate::core::parser::{Expr, LineAst, Parser};
    use crate::core::tokenizer::register_checker_from_fn;
    use crate::lr35902::{is_register, table};
    use std::sync::Arc;

    struct TestCtx {
        symbols: Vec<(&'static str, i32)>,
        addr: u16,
    }

    impl TestCtx {
        fn empty() -> Self {
            Self {
                symbols: Vec::new(),
                addr: 0,
            }
        }

        fn at(addr: u16) -> Self {
            Self {
                symbols: Vec::new(),
                addr,
            }
        }

        fn with(mut self, name: &'static str, value: i32) -> Self {
            self.symbols.push((name, value));
            self
        }
    }

    impl EvalContext for TestCtx {
        fn lookup_symbol(&self, name: &str) -> Result<Option<i32>, EvalError> {
            Ok(self
                .symbols
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v))
        }
    }

    impl AssemblerContext for TestCtx {
        fn eval_expr(&self, expr: &Expr) -> Result<i32, EvalError> {
            eval_expr(expr, self)
        }

        fn current_address(&self) -> u16 {
            self.addr
        }
    }

    fn parse_statement(line: &str) -> (String, Vec<Expr>) {
        let mut parser = Parser::from_line_with_checkers(
            &format!("        {line}"),
            1,
            register_checker_from_fn(is_register),
            Arc::new(|word: &str| table::is_mnemonic(word)),
        )
        .unwrap();
        match parser.parse_line().unwrap() {
            LineAst::Statement {
                mnemonic, operands, ..
            } => (mnemonic.expect("mnemonic"), operands),
            other => panic!("Expected statement, got {other:?}"),
        }
    }

    fn encode_with(line: &str, ctx: &TestCtx) -> EncodedInstruction {
        let (mnemonic, operands) = parse_statement(line);
        Lr35902Handler::new()
            .encode(&mnemonic, &operands, ctx)
            .unwrap_or_else(|err| panic!("encode failed for '{line}': {}", err.message))
    }

    fn encode(line: &str) -> Vec<u8> {
        encode_with(line, &TestCtx::empty()).bytes
    }

    fn encode_err(line: &str) -> String {
        let (mnemonic, operands) = parse_statement(line);
        match Lr35902Handler::new().encode(&mnemonic, &operands, &TestCtx::empty()) {
            Ok(encoded) => panic!("expected error for '{line}', got {:02X?}", encoded.bytes),
            Err(err) => err.message,
        }
    }

    #[test]
    fn encodes_ld_hl_imm16() {
        assert_eq!(encode("ld HL, $FFDC"), vec![0x21, 0xDC, 0xFF]);
    }

    #[test]
    fn encodes_ld_sp_relative_and_synonym() {
        assert_eq!(encode("ld HL, SP+$55"), vec![0xF8, 0x55]);
        assert_eq!(encode("ldhl sp, $6a"), vec![0xF8, 0x6A]);
    }

    #[test]
    fn encodes_register_matrix_loads() {
        assert_eq!(encode("ld a, b"), vec![0x78]);
        assert_eq!(encode("ld b, a"), vec![0x47]);
        assert_eq!(encode("ld (HL), a"), vec![0x77]);
        assert_eq!(encode("ld a, (HL)"), vec![0x7E]);
        assert_eq!(encode("ld (HL), $42"), vec![0x36, 0x42]);
        assert_eq!(encode("ld e, $9F"), vec![0x1E, 0x9F]);
    }

    #[test]
    fn encodes_hl_increment_forms() {
        assert_eq!(encode("ld (HL+), a"), vec![0x22]);
        assert_eq!(encode("ld a, (HL-)"), vec![0x3A]);
        assert_eq!(encode("ldi (HL), a"), vec![0x22]);
        assert_eq!(encode("ldd a, (HL)"), vec![0x3A]);
    }

    #[test]
    fn encodes_absolute_loads() {
        assert_eq!(encode("ld ($8000), a"), vec![0xEA, 0x00, 0x80]);
        assert_eq!(encode("ld a, [$9FFF]"), vec![0xFA, 0xFF, 0x9F]);
        assert_eq!(encode("ld ($C123), sp"), vec![0x08, 0x23, 0xC1]);
    }

    #[test]
    fn encodes_high_page_loads() {
        assert_eq!(encode("ldh ($FF44), a"), vec![0xE0, 0x44]);
        assert_eq!(encode("ldh a, ($44)"), vec![0xF0, 0x44]);
        assert_eq!(encode("ldh (C), a"), vec![0xE2]);
        assert_eq!(encode("ld a, (C)"), vec![0xF2]);
    }

    #[test]
    fn encodes_alu_both_spellings() {
        assert_eq!(encode("add a, b"), vec![0x80]);
        assert_eq!(encode("add b"), vec![0x80]);
        assert_eq!(encode("xor a"), vec![0xAF]);
        assert_eq!(encode("cp $90"), vec![0xFE, 0x90]);
        assert_eq!(encode("sbc a, (HL)"), vec![0x9E]);
        assert_eq!(encode("add HL, DE"), vec![0x19]);
        assert_eq!(encode("add SP, -2"), vec![0xE8, 0xFE]);
    }

    #[test]
    fn encodes_inc_dec_groups() {
        assert_eq!(encode("inc a"), vec![0x3C]);
        assert_eq!(encode("inc (HL)"), vec![0x34]);
        assert_eq!(encode("inc BC"), vec![0x03]);
        assert_eq!(encode("dec SP"), vec![0x3B]);
    }

    #[test]
    fn encodes_stack_group() {
        assert_eq!(encode("push AF"), vec![0xF5]);
        assert_eq!(encode("pop BC"), vec![0xC1]);
    }

    #[test]
    fn encodes_jumps_and_calls() {
        assert_eq!(encode("jp $0150"), vec![0xC3, 0x50, 0x01]);
        assert_eq!(encode("jp nz, $0150"), vec![0xC2, 0x50, 0x01]);
        assert_eq!(encode("jp HL"), vec![0xE9]);
        assert_eq!(encode("jp (HL)"), vec![0xE9]);
        assert_eq!(encode("call $1234"), vec![0xCD, 0x34, 0x12]);
        assert_eq!(encode("call c, $1234"), vec![0xDC, 0x34, 0x12]);
        assert_eq!(encode("ret"), vec![0xC9]);
        assert_eq!(encode("ret nc"), vec![0xD0]);
        assert_eq!(encode("reti"), vec![0xD9]);
    }

    #[test]
    fn encodes_relative_jumps() {
        // Backward to self: displacement -2.
        let encoded = encode_with("jr $0000", &TestCtx::at(0x0000));
        assert_eq!(encoded.bytes, vec![0x18, 0xFE]);
        let encoded = encode_with("jr z, $0005", &TestCtx::at(0x0010));
        assert_eq!(encoded.bytes, vec![0x28, 0xF3]);
    }

    #[test]
    fn relative_jump_boundaries() {
        // +127 and -128 are the extremes; one past either fails.
        let encoded = encode_with("jr $0081", &TestCtx::at(0x0000));
        assert_eq!(encoded.bytes, vec![0x18, 0x7F]);
        let encoded = encode_with("jr $FE82", &TestCtx::at(0xFF00));
        assert_eq!(encoded.bytes, vec![0x18, 0x80]);

        let (mnemonic, operands) = parse_statement("jr $0082");
        assert!(Lr35902Handler::new()
            .encode(&mnemonic, &operands, &TestCtx::at(0x0000))
            .is_err());
    }

    #[test]
    fn encodes_rst_targets() {
        assert_eq!(encode("rst $00"), vec![0xC7]);
        assert_eq!(encode("rst $18"), vec![0xDF]);
        assert_eq!(encode("rst $38"), vec![0xFF]);
        assert!(encode_err("rst $11").contains("RST target"));
        assert!(encode_err("rst $40").contains("RST target"));
    }

    #[test]
    fn encodes_cb_page() {
        assert_eq!(encode("rlc b"), vec![0xCB, 0x00]);
        assert_eq!(encode("swap a"), vec![0xCB, 0x37]);
        assert_eq!(encode("srl (HL)"), vec![0xCB, 0x3E]);
        assert_eq!(encode("bit 7, h"), vec![0xCB, 0x7C]);
        assert_eq!(encode("res 0, a"), vec![0xCB, 0x87]);
        assert_eq!(encode("set 3, a"), vec![0xCB, 0xDF]);
    }

    #[test]
    fn bit_index_is_validated() {
        assert!(encode_err("bit 8, a").contains("Bit index"));
    }

    #[test]
    fn encodes_misc_singletons() {
        assert_eq!(encode("nop"), vec![0x00]);
        assert_eq!(encode("halt"), vec![0x76]);
        assert_eq!(encode("stop"), vec![0x10, 0x00]);
        assert_eq!(encode("di"), vec![0xF3]);
        assert_eq!(encode("ei"), vec![0xFB]);
        assert_eq!(encode("daa"), vec![0x27]);
        assert_eq!(encode("rlca"), vec![0x07]);
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(encode("LD A, B"), encode("ld a, b"));
        assert_eq!(encode("Jp $100"), encode("jp $100"));
    }

    #[test]
    fn symbol_operand_encodes_like_its_value() {
        let ctx = TestCtx::empty().with("BIG", 65500);
        assert_eq!(
            encode_with("ld HL, BIG", &ctx).bytes,
            encode("ld HL, $FFDC")
        );
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        assert!(encode_err("mov a, b").contains("Unknown mnemonic"));
    }

    #[test]
    fn shape_mismatch_lists_accepted_forms() {
        let message = encode_err("push a");
        assert!(message.contains("PUSH"), "{message}");
        assert!(message.contains("r16"), "{message}");
    }

    #[test]
    fn out_of_range_immediates_are_errors() {
        assert!(encode_err("ld a, $100").contains("out of range"));
        assert!(encode_err("ld a, $$0012").contains("16-bit literal"));
        assert!(encode_err("ldh ($1234), a").contains("$FF00"));
    }

    #[test]
    fn unresolved_symbol_queues_fixup() {
        let (mnemonic, operands) = parse_statement("jp later");
        let encoded = Lr35902Handler::new()
            .encode(&mnemonic, &operands, &TestCtx::empty())
            .unwrap();
        assert_eq!(encoded.bytes, vec![0xC3, 0x00, 0x00]);
        assert_eq!(encoded.fixups.len(), 1);
        let fixup = &encoded.fixups[0];
        assert_eq!(fixup.offset, 1);
        assert_eq!(fixup.width, 2);
        assert_eq!(fixup.kind, FixupKind::Absolute);

        let (mnemonic, operands) = parse_statement("jr target");
        let encoded = Lr35902Handler::new()
            .encode(&mnemonic, &operands, &TestCtx::empty())
            .unwrap();
        assert_eq!(encoded.bytes, vec![0x18, 0x00]);
        assert_eq!(encoded.fixups[0].kind, FixupKind::Relative8);
        assert_eq!(encoded.fixups[0].width, 1);
    }

    #[test]
    fn cycles_are_reported() {
        assert_eq!(encode_with("nop", &TestCtx::empty()).cycles, 1);
        assert_eq!(encode_with("call $1234", &TestCtx::empty()).cycles, 6);
    }
}
