// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Static LR35902 opcode table.
//!
//! Every row keys a `(mnemonic, operand-pattern)` pair to a base opcode,
//! an optional `CB` prefix, the rule for folding register / condition /
//! bit fields into the base byte, and the machine-cycle count. Register
//! groups are single rows (`R8` covers B..A and `(HL)`); the fold rule
//! and the hardware's regular encoding do the multiplication that would
//! otherwise take a few hundred explicit rows.
//!
//! Immediate operands are implied by the shapes: `Imm8`/`IndImm8` append
//! one byte, `Imm16`/`IndImm16` two little-endian bytes, `Rel8` a signed
//! displacement, `SpImm8`/`SignedImm8` a signed byte.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::lr35902::dialect::SYNONYM_MNEMONICS;

/// One element of an operand pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The accumulator specifically.
    A,
    /// Any of B, C, D, E, H, L, A or (HL) in the three-bit register field.
    R8,
    /// BC, DE, HL or SP.
    R16,
    /// BC, DE, HL or AF (push/pop group).
    R16Stack,
    /// HL specifically.
    Hl,
    /// SP specifically.
    Sp,
    IndBc,
    IndDe,
    IndHl,
    IndHli,
    IndHld,
    IndC,
    /// 8-bit immediate data.
    Imm8,
    /// 16-bit immediate data.
    Imm16,
    /// $FF00-page address operand (LDH).
    IndImm8,
    /// 16-bit address operand.
    IndImm16,
    /// Signed 8-bit immediate (ADD SP, e).
    SignedImm8,
    /// `SP+e` displacement operand (LD HL, SP+e).
    SpImm8,
    /// Relative branch target; the encoder emits the displacement.
    Rel8,
    /// Condition code NZ/Z/NC/C.
    Cond,
    /// Bit index 0-7 for the CB bit group.
    Bit,
    /// One of the eight RST targets $00/$08/.../$38.
    RstVec,
}

impl Shape {
    pub fn name(self) -> &'static str {
        match self {
            Shape::A => "A",
            Shape::R8 => "r8",
            Shape::R16 => "r16",
            Shape::R16Stack => "r16",
            Shape::Hl => "HL",
            Shape::Sp => "SP",
            Shape::IndBc => "(BC)",
            Shape::IndDe => "(DE)",
            Shape::IndHl => "(HL)",
            Shape::IndHli => "(HL+)",
            Shape::IndHld => "(HL-)",
            Shape::IndC => "(C)",
            Shape::Imm8 => "n8",
            Shape::Imm16 => "n16",
            Shape::IndImm8 => "(n8)",
            Shape::IndImm16 => "(n16)",
            Shape::SignedImm8 => "e8",
            Shape::SpImm8 => "SP+e8",
            Shape::Rel8 => "e8",
            Shape::Cond => "cc",
            Shape::Bit => "b3",
            Shape::RstVec => "vec",
        }
    }
}

/// Instruction prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    None,
    Cb,
}

/// How operand fields fold into the base opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encode {
    /// The base byte stands alone.
    Fixed,
    /// `base | (r8 << 3)` - destination register slot.
    R8Dst,
    /// `base | r8` - source register slot.
    R8Src,
    /// `base | (dst << 3) | src`.
    R8Pair,
    /// `base | (rr << 4)` over the BC/DE/HL/SP group.
    R16,
    /// `base | (rr << 4)` over the BC/DE/HL/AF group.
    R16Stack,
    /// `base | (cc << 3)`.
    CondBits,
    /// `base | (bit << 3) | r8` on the CB page.
    BitR8,
    /// `base | target` with target one of $00/$08/.../$38.
    RstBits,
}

/// A static opcode table row.
#[derive(Debug)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub pattern: &'static [Shape],
    pub prefix: Prefix,
    pub base: u8,
    pub encode: Encode,
    pub cycles: u8,
}

const fn row(
    mnemonic: &'static str,
    pattern: &'static [Shape],
    prefix: Prefix,
    base: u8,
    encode: Encode,
    cycles: u8,
) -> OpcodeEntry {
    OpcodeEntry {
        mnemonic,
        pattern,
        prefix,
        base,
        encode,
        cycles,
    }
}

use Encode as E;
use Prefix::{Cb, None as NoPfx};
use Shape::*;

/// The full LR35902 instruction set, base page and CB page.
pub static OPCODE_TABLE: &[OpcodeEntry] = &[
    // Control
    row("NOP", &[], NoPfx, 0x00, E::Fixed, 1),
    row("STOP", &[], NoPfx, 0x10, E::Fixed, 1),
    row("HALT", &[], NoPfx, 0x76, E::Fixed, 1),
    row("DI", &[], NoPfx, 0xF3, E::Fixed, 1),
    row("EI", &[], NoPfx, 0xFB, E::Fixed, 1),
    // Accumulator / flag operations
    row("RLCA", &[], NoPfx, 0x07, E::Fixed, 1),
    row("RRCA", &[], NoPfx, 0x0F, E::Fixed, 1),
    row("RLA", &[], NoPfx, 0x17, E::Fixed, 1),
    row("RRA", &[], NoPfx, 0x1F, E::Fixed, 1),
    row("DAA", &[], NoPfx, 0x27, E::Fixed, 1),
    row("CPL", &[], NoPfx, 0x2F, E::Fixed, 1),
    row("SCF", &[], NoPfx, 0x37, E::Fixed, 1),
    row("CCF", &[], NoPfx, 0x3F, E::Fixed, 1),
    // 8-bit loads
    row("LD", &[R8, R8], NoPfx, 0x40, E::R8Pair, 1),
    row("LD", &[R8, Imm8], NoPfx, 0x06, E::R8Dst, 2),
    row("LD", &[IndBc, A], NoPfx, 0x02, E::Fixed, 2),
    row("LD", &[IndDe, A], NoPfx, 0x12, E::Fixed, 2),
    row("LD", &[IndHli, A], NoPfx, 0x22, E::Fixed, 2),
    row("LD", &[IndHld, A], NoPfx, 0x32, E::Fixed, 2),
    row("LD", &[A, IndBc], NoPfx, 0x0A, E::Fixed, 2),
    row("LD", &[A, IndDe], NoPfx, 0x1A, E::Fixed, 2),
    row("LD", &[A, IndHli], NoPfx, 0x2A, E::Fixed, 2),
    row("LD", &[A, IndHld], NoPfx, 0x3A, E::Fixed, 2),
    row("LD", &[IndC, A], NoPfx, 0xE2, E::Fixed, 2),
    row("LD", &[A, IndC], NoPfx, 0xF2, E::Fixed, 2),
    row("LD", &[IndImm16, A], NoPfx, 0xEA, E::Fixed, 4),
    row("LD", &[A, IndImm16], NoPfx, 0xFA, E::Fixed, 4),
    // 16-bit loads
    row("LD", &[R16, Imm16], NoPfx, 0x01, E::R16, 3),
    row("LD", &[IndImm16, Sp], NoPfx, 0x08, E::Fixed, 5),
    row("LD", &[Sp, Hl], NoPfx, 0xF9, E::Fixed, 2),
    row("LD", &[Hl, SpImm8], NoPfx, 0xF8, E::Fixed, 3),
    row("PUSH", &[R16Stack], NoPfx, 0xC5, E::R16Stack, 4),
    row("POP", &[R16Stack], NoPfx, 0xC1, E::R16Stack, 3),
    // $FF00-page loads
    row("LDH", &[IndImm8, A], NoPfx, 0xE0, E::Fixed, 3),
    row("LDH", &[A, IndImm8], NoPfx, 0xF0, E::Fixed, 3),
    row("LDH", &[IndC, A], NoPfx, 0xE2, E::Fixed, 2),
    row("LDH", &[A, IndC], NoPfx, 0xF2, E::Fixed, 2),
    // 8-bit arithmetic / logic (the A destination is implicit by the
    // time the table is consulted)
    row("ADD", &[Hl, R16], NoPfx, 0x09, E::R16, 2),
    row("ADD", &[Sp, SignedImm8], NoPfx, 0xE8, E::Fixed, 4),
    row("ADD", &[R8], NoPfx, 0x80, E::R8Src, 1),
    row("ADD", &[Imm8], NoPfx, 0xC6, E::Fixed, 2),
    row("ADC", &[R8], NoPfx, 0x88, E::R8Src, 1),
    row("ADC", &[Imm8], NoPfx, 0xCE, E::Fixed, 2),
    row("SUB", &[R8], NoPfx, 0x90, E::R8Src, 1),
    row("SUB", &[Imm8], NoPfx, 0xD6, E::Fixed, 2),
    row("SBC", &[R8], NoPfx, 0x98, E::R8Src, 1),
    row("SBC", &[Imm8], NoPfx, 0xDE, E::Fixed, 2),
    row("AND", &[R8], NoPfx, 0xA0, E::R8Src, 1),
    row("AND", &[Imm8], NoPfx, 0xE6, E::Fixed, 2),
    row("XOR", &[R8], NoPfx, 0xA8, E::R8Src, 1),
    row("XOR", &[Imm8], NoPfx, 0xEE, E::Fixed, 2),
    row("OR", &[R8], NoPfx, 0xB0, E::R8Src, 1),
    row("OR", &[Imm8], NoPfx, 0xF6, E::Fixed, 2),
    row("CP", &[R8], NoPfx, 0xB8, E::R8Src, 1),
    row("CP", &[Imm8], NoPfx, 0xFE, E::Fixed, 2),
    row("INC", &[R8], NoPfx, 0x04, E::R8Dst, 1),
    row("INC", &[R16], NoPfx, 0x03, E::R16, 2),
    row("DEC", &[R8], NoPfx, 0x05, E::R8Dst, 1),
    row("DEC", &[R16], NoPfx, 0x0B, E::R16, 2),
    // Jumps and calls
    row("JP", &[Cond, Imm16], NoPfx, 0xC2, E::CondBits, 4),
    row("JP", &[Imm16], NoPfx, 0xC3, E::Fixed, 4),
    row("JP", &[Hl], NoPfx, 0xE9, E::Fixed, 1),
    row("JP", &[IndHl], NoPfx, 0xE9, E::Fixed, 1),
    row("JR", &[Cond, Rel8], NoPfx, 0x20, E::CondBits, 3),
    row("JR", &[Rel8], NoPfx, 0x18, E::Fixed, 3),
    row("CALL", &[Cond, Imm16], NoPfx, 0xC4, E::CondBits, 6),
    row("CALL", &[Imm16], NoPfx, 0xCD, E::Fixed, 6),
    row("RET", &[Cond], NoPfx, 0xC0, E::CondBits, 5),
    row("RET", &[], NoPfx, 0xC9, E::Fixed, 4),
    row("RETI", &[], NoPfx, 0xD9, E::Fixed, 4),
    row("RST", &[RstVec], NoPfx, 0xC7, E::RstBits, 4),
    // CB page: rotates and shifts
    row("RLC", &[R8], Cb, 0x00, E::R8Src, 2),
    row("RRC", &[R8], Cb, 0x08, E::R8Src, 2),
    row("RL", &[R8], Cb, 0x10, E::R8Src, 2),
    row("RR", &[R8], Cb, 0x18, E::R8Src, 2),
    row("SLA", &[R8], Cb, 0x20, E::R8Src, 2),
    row("SRA", &[R8], Cb, 0x28, E::R8Src, 2),
    row("SWAP", &[R8], Cb, 0x30, E::R8Src, 2),
    row("SRL", &[R8], Cb, 0x38, E::R8Src, 2),
    // CB page: bit test / reset / set
    row("BIT", &[Bit, R8], Cb, 0x40, E::BitR8, 2),
    row("RES", &[Bit, R8], Cb, 0x80, E::BitR8, 2),
    row("SET", &[Bit, R8], Cb, 0xC0, E::BitR8, 2),
];

/// All rows for a mnemonic, in table order.
pub fn rows_for(mnemonic: &str) -> impl Iterator<Item = &'static OpcodeEntry> + '_ {
    OPCODE_TABLE
        .iter()
        .filter(move |entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

static MNEMONICS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    OPCODE_TABLE
        .iter()
        .map(|entry| entry.mnemonic)
        .chain(SYNONYM_MNEMONICS.iter().copied())
        .collect()
});

/// Check whether a word is an instruction mnemonic (case-insensitive),
/// including the dialect synonyms.
pub fn is_mnemonic(word: &str) -> bool {
    MNEMONICS.contains(word.to_ascii_uppercase().as_str())
}
