// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! LR35902 (Game Boy CPU) support module.
//!
//! This module provides the target-specific half of the assembler:
//! - Register and condition-code classification
//! - Operand shapes
//! - The static opcode table (base and CB-prefixed pages)
//! - Dialect mapping (ldhl / ldi / ldd synonyms)
//! - The instruction encoder

pub mod dialect;
pub mod handler;
pub mod operand;
pub mod table;

pub use handler::{AssemblerContext, EncodedInstruction, Lr35902Handler};
pub use table::is_mnemonic;

/// Check if an identifier is an LR35902 register name.
///
/// Valid 8-bit registers: A, B, C, D, E, H, L
/// Valid 16-bit registers: AF, BC, DE, HL, SP, PC
/// The post-increment memory operands (HL+) and (HL-) may also be
/// written (HLI) and (HLD). Condition codes Z, NZ, NC are recognized as
/// pseudo-registers so the tokenizer can classify them by position; C
/// doubles as register and condition.
pub fn is_register(ident: &str) -> bool {
    matches!(
        ident,
        "A" | "B" | "C" | "D" | "E" | "H" | "L"
            | "AF" | "BC" | "DE" | "HL" | "SP" | "PC"
            | "HLI" | "HLD"
            | "Z" | "NZ" | "NC"
    )
}

/// Check if an identifier is an LR35902 condition code.
pub fn is_condition(ident: &str) -> bool {
    matches!(ident.to_ascii_uppercase().as_str(), "Z" | "NZ" | "C" | "NC")
}
