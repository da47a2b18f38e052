// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Symbol table for labels and constants.

use crate::core::text_utils::is_valid_symbol_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Constant,
    Label,
    ExportedLabel,
}

/// Where a symbol was defined, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub value: i32,
    pub defined_at: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum DefineOutcome {
    Ok,
    Duplicate,
    BadName,
}

/// Name → symbol map. Names are case-sensitive. Local symbols (leading
/// `.`) are stored qualified by their governing global label, so the same
/// `.loop` may recur under different globals.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Qualify a local name against its governing global label. Global
    /// names and already-qualified names pass through untouched. A local
    /// with no governing global stands alone in the file-level scope.
    pub fn qualify(name: &str, current_global: Option<&str>) -> String {
        if !name.starts_with('.') {
            return name.to_string();
        }
        match current_global {
            Some(global) => format!("{global}{name}"),
            None => name.to_string(),
        }
    }

    pub fn define(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: i32,
        defined_at: SourceLocation,
    ) -> DefineOutcome {
        if !Self::name_is_valid(name) {
            return DefineOutcome::BadName;
        }
        if self.entries.iter().any(|entry| entry.name == name) {
            return DefineOutcome::Duplicate;
        }
        self.entries.push(Symbol {
            name: name.to_string(),
            kind,
            value,
            defined_at,
        });
        DefineOutcome::Ok
    }

    fn name_is_valid(name: &str) -> bool {
        match name.split_once('.') {
            // Qualified local: both halves must be well-formed on their own.
            Some((global, local)) if !global.is_empty() => {
                is_valid_symbol_name(global) && is_valid_symbol_name(&format!(".{local}"))
            }
            _ => is_valid_symbol_name(name),
        }
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Look up a symbol applying the local rule: a `.name` reference
    /// resolves against the given global scope.
    #[must_use]
    pub fn resolve(&self, name: &str, current_global: Option<&str>) -> Option<&Symbol> {
        let qualified = Self::qualify(name, current_global);
        self.lookup(&qualified)
    }

    /// Upgrade an existing label to exported visibility.
    pub fn mark_exported(&mut self, name: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                if entry.kind == SymbolKind::Label {
                    entry.kind = SymbolKind::ExportedLabel;
                }
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
