// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Game Boy assembler - main entry point.
//!
//! This module ties the CPU-agnostic core to the LR35902 encoder. One
//! assembly run is a scoped resource: it owns a fresh symbol table,
//! section registry and fixup queue, streams every source line through
//! the parser exactly once (INCLUDE splices in place), then drains the
//! fixup queue in the resolver pass. Any error is fatal to the run; only
//! the fixup pass collects its failures so all unresolved sites are
//! reported together.

pub mod cli;


use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser as ClapParser;

use crate::core::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, PassCounts, Severity,
};
use crate::core::expr::{
    eval_expr, is_forced_word, value_fits_imm16, value_fits_imm8, EvalContext, EvalError,
};
use crate::core::fixup::{resolve_fixups, Fixup, FixupKind};
use crate::core::parser::{Expr, Label, LineAst, Parser};
use crate::core::section::{Region, SectionRegistry};
use crate::core::symbol_table::{DefineOutcome, SourceLocation, SymbolKind, SymbolTable};
use crate::core::tokenizer::register_checker_from_fn;
use crate::lr35902::{is_register, table, AssemblerContext, Lr35902Handler};
use std::sync::Arc;

use cli::{input_base_from_path, section_output_path, validate_cli, Cli};

// Re-export public types
pub use crate::core::error::{AsmRunError as RunError, AsmRunReport as RunReport};
pub use cli::VERSION;

/// The driver contract for file access: the core never touches the
/// filesystem directly.
pub trait SourceLoader {
    fn load(&mut self, path: &str) -> io::Result<Vec<String>>;
}

/// Filesystem loader rooted at the main file's directory, so INCLUDE
/// paths resolve relative to the source tree.
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl SourceLoader for FileLoader {
    fn load(&mut self, path: &str) -> io::Result<Vec<String>> {
        let contents = fs::read_to_string(self.root.join(path))?;
        Ok(contents.lines().map(|line| line.to_string()).collect())
    }
}

/// One populated section after a successful run.
#[derive(Debug)]
pub struct SectionImage {
    pub name: String,
    pub region: Region,
    pub bank: u16,
    pub base: u16,
    pub bytes: Vec<u8>,
}

/// The result of a successful assembly run.
#[derive(Debug)]
pub struct AssemblyOutput {
    pub sections: Vec<SectionImage>,
    pub symbols: SymbolTable,
    pub counts: PassCounts,
}

/// Run the assembler with command-line arguments.
pub fn run() -> Result<Vec<AsmRunReport>, AsmRunError> {
    let cli = Cli::parse();
    let config = validate_cli(&cli)?;

    let mut reports = Vec::new();
    for asm_path in &cli.infiles {
        let (asm_name, input_base) = input_base_from_path(asm_path)?;
        let out_base = if let Some(dir) = &config.out_dir {
            dir.join(&input_base).to_string_lossy().to_string()
        } else {
            cli.outfile.as_deref().unwrap_or(&input_base).to_string()
        };
        reports.push(run_one(&cli, asm_path, &asm_name, &out_base)?);
    }

    Ok(reports)
}

fn run_one(
    cli: &Cli,
    asm_path: &Path,
    asm_name: &str,
    out_base: &str,
) -> Result<AsmRunReport, AsmRunError> {
    let root = asm_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = asm_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(asm_name)
        .to_string();

    let mut loader = FileLoader::new(root);
    let output = Assembler::new(&mut loader).assemble(&file_name)?;

    for image in &output.sections {
        let path = section_output_path(out_base, &image.name);
        fs::write(&path, &image.bytes).map_err(|_| {
            AsmRunError::new(
                AsmError::new(AsmErrorKind::Io, "Error opening file for write", Some(&path)),
                Vec::new(),
            )
        })?;
        if !cli.quiet {
            println!(
                "Wrote {path} ({} bytes, {} at ${:04X})",
                image.bytes.len(),
                image.region.name(),
                image.base
            );
        }
    }

    Ok(AsmRunReport::new(Vec::new()))
}

/// Location context for the line being processed.
struct LineCtx<'a> {
    file: &'a str,
    line: u32,
    source: &'a str,
}

fn fail(
    ctx: &LineCtx<'_>,
    kind: AsmErrorKind,
    msg: &str,
    param: Option<&str>,
    column: Option<usize>,
) -> Diagnostic {
    Diagnostic::new(ctx.line, Severity::Error, AsmError::new(kind, msg, param))
        .with_column(column)
        .with_file(Some(ctx.file.to_string()))
        .with_source(Some(ctx.source.to_string()))
}

/// Symbol lookup with the local-label rule applied.
struct ScopedEval<'a> {
    symbols: &'a SymbolTable,
    scope: Option<&'a str>,
}

impl EvalContext for ScopedEval<'_> {
    fn lookup_symbol(&self, name: &str) -> Result<Option<i32>, EvalError> {
        Ok(self
            .symbols
            .resolve(name, self.scope)
            .map(|symbol| symbol.value))
    }
}

/// Evaluation context handed to the encoder.
struct EncodeCtx<'a> {
    symbols: &'a SymbolTable,
    scope: Option<&'a str>,
    addr: u16,
}

impl EvalContext for EncodeCtx<'_> {
    fn lookup_symbol(&self, name: &str) -> Result<Option<i32>, EvalError> {
        ScopedEval {
            symbols: self.symbols,
            scope: self.scope,
        }
        .lookup_symbol(name)
    }
}

impl AssemblerContext for EncodeCtx<'_> {
    fn eval_expr(&self, expr: &Expr) -> Result<i32, EvalError> {
        eval_expr(expr, self)
    }

    fn current_address(&self) -> u16 {
        self.addr
    }
}

/// Core assembler state for one run.
pub struct Assembler<'a> {
    loader: &'a mut dyn SourceLoader,
    symbols: SymbolTable,
    sections: SectionRegistry,
    fixups: Vec<Fixup>,
    handler: Lr35902Handler,
    current_global: Option<String>,
    include_stack: Vec<String>,
    counts: PassCounts,
}

impl<'a> Assembler<'a> {
    pub fn new(loader: &'a mut dyn SourceLoader) -> Self {
        Self {
            loader,
            symbols: SymbolTable::new(),
            sections: SectionRegistry::new(),
            fixups: Vec::new(),
            handler: Lr35902Handler::new(),
            current_global: None,
            include_stack: Vec::new(),
            counts: PassCounts::new(),
        }
    }

    /// Assemble the file named `path` (resolved by the loader) and every
    /// file it includes.
    pub fn assemble(mut self, path: &str) -> Result<AssemblyOutput, AsmRunError> {
        if let Err(diag) = self.process_include(path, None) {
            let error = AsmError::new(
                diag.error().kind(),
                "Errors detected in source. No output written.",
                None,
            );
            return Err(AsmRunError::new(error, vec![diag]));
        }

        let fixup_diags = {
            let symbols = &self.symbols;
            resolve_fixups(&self.fixups, &mut self.sections, |expr, scope| {
                eval_expr(expr, &ScopedEval { symbols, scope })
            })
        };
        if !fixup_diags.is_empty() {
            self.counts.errors = fixup_diags.len() as u32;
            return Err(AsmRunError::new(
                AsmError::new(
                    AsmErrorKind::Symbol,
                    "Unresolved references detected. No output written.",
                    None,
                ),
                fixup_diags,
            ));
        }

        if let Err(err) = self.sections.check_overlap() {
            return Err(AsmRunError::new(
                AsmError::new(AsmErrorKind::Section, &err.to_string(), None),
                Vec::new(),
            ));
        }

        let sections = self
            .sections
            .iter_populated()
            .map(|section| SectionImage {
                name: section.name().to_string(),
                region: section.region(),
                bank: section.bank(),
                base: section.base(),
                bytes: section.bytes().to_vec(),
            })
            .collect();

        Ok(AssemblyOutput {
            sections,
            symbols: self.symbols,
            counts: self.counts,
        })
    }

    fn process_include(
        &mut self,
        path: &str,
        site: Option<(String, u32, String)>,
    ) -> Result<(), Diagnostic> {
        let site_diag = |kind: AsmErrorKind, msg: &str, param: Option<&str>| {
            let mut diag = Diagnostic::new(
                site.as_ref().map(|(_, line, _)| *line).unwrap_or(0),
                Severity::Error,
                AsmError::new(kind, msg, param),
            );
            if let Some((file, _, source)) = &site {
                diag = diag
                    .with_file(Some(file.clone()))
                    .with_source(Some(source.clone()));
            }
            diag
        };

        if self.include_stack.iter().any(|entry| entry == path) {
            return Err(site_diag(
                AsmErrorKind::Include,
                "Recursive INCLUDE",
                Some(path),
            ));
        }
        let lines = match self.loader.load(path) {
            Ok(lines) => lines,
            Err(err) => {
                return Err(site_diag(
                    AsmErrorKind::Io,
                    &format!("Cannot read {path}: {err}"),
                    None,
                ));
            }
        };

        self.include_stack.push(path.to_string());
        for (index, line) in lines.iter().enumerate() {
            self.process_line(path, index as u32 + 1, line)?;
        }
        self.include_stack.pop();
        Ok(())
    }

    fn process_line(&mut self, file: &str, line_num: u32, source: &str) -> Result<(), Diagnostic> {
        self.counts.lines += 1;
        let ctx = LineCtx {
            file,
            line: line_num,
            source,
        };

        let mut parser = Parser::from_line_with_checkers(
            source,
            line_num,
            register_checker_from_fn(is_register),
            Arc::new(|word: &str| table::is_mnemonic(word)),
        )
        .map_err(|err| {
            fail(
                &ctx,
                AsmErrorKind::Lexical,
                &err.message,
                None,
                Some(err.span.col_start),
            )
        })?;
        let ast = parser.parse_line().map_err(|err| {
            fail(
                &ctx,
                AsmErrorKind::Syntax,
                &err.message,
                None,
                Some(err.span.col_start),
            )
        })?;

        self.process_ast(ast, &ctx)
    }

    fn process_ast(&mut self, ast: LineAst, ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        match ast {
            LineAst::Empty => Ok(()),
            LineAst::Section {
                name,
                region,
                bank,
                span,
            } => {
                let region = Region::parse(&region).ok_or_else(|| {
                    fail(
                        ctx,
                        AsmErrorKind::Section,
                        "Unknown memory region",
                        Some(&region),
                        Some(span.col_start),
                    )
                })?;
                let bank = match bank {
                    Some(expr) => Some(self.eval_known(
                        &expr,
                        ctx,
                        AsmErrorKind::Section,
                        "BANK number must be a known value",
                    )? as u16),
                    None => None,
                };
                self.sections.select(&name, region, bank).map_err(|err| {
                    fail(
                        ctx,
                        AsmErrorKind::Section,
                        &err.to_string(),
                        None,
                        Some(span.col_start),
                    )
                })?;
                Ok(())
            }
            LineAst::Constant { name, expr } => self.define_constant(&name, &expr, ctx),
            LineAst::Statement {
                label,
                mnemonic,
                operands,
            } => {
                if let Some(label) = &label {
                    self.define_label(label, ctx)?;
                }
                match mnemonic {
                    None => Ok(()),
                    Some(word) => match word.to_ascii_uppercase().as_str() {
                        "DB" => self.dir_db(&operands, ctx),
                        "DW" => self.dir_dw(&operands, ctx),
                        "DS" => self.dir_ds(&operands, ctx),
                        "INCLUDE" => self.dir_include(&operands, ctx),
                        _ => self.process_instruction(&word, &operands, ctx),
                    },
                }
            }
        }
    }

    fn define_label(&mut self, label: &Label, ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        let ip = self.sections.ip().map_err(|_| {
            fail(
                ctx,
                AsmErrorKind::Section,
                "Label defined outside of a section",
                Some(&label.name),
                Some(label.span.col_start),
            )
        })?;

        let column = Some(label.span.col_start);
        if label.name.starts_with('.') {
            if label.exported {
                return Err(fail(
                    ctx,
                    AsmErrorKind::Symbol,
                    "Local labels cannot be exported",
                    Some(&label.name),
                    column,
                ));
            }
            let qualified = SymbolTable::qualify(&label.name, self.current_global.as_deref());
            self.define_symbol(&qualified, SymbolKind::Label, ip as i32, ctx, column)
        } else {
            let kind = if label.exported {
                SymbolKind::ExportedLabel
            } else {
                SymbolKind::Label
            };
            self.define_symbol(&label.name, kind, ip as i32, ctx, column)?;
            self.current_global = Some(label.name.clone());
            Ok(())
        }
    }

    fn define_constant(
        &mut self,
        name: &Label,
        expr: &Expr,
        ctx: &LineCtx<'_>,
    ) -> Result<(), Diagnostic> {
        // EQU evaluates immediately; forward references would make the
        // table depend on processing order.
        let value = match self.eval_scoped(expr) {
            Ok(value) => value,
            Err(err) if err.is_undefined() => {
                return Err(fail(
                    ctx,
                    AsmErrorKind::Symbol,
                    "Forward reference in EQU",
                    err.undefined_symbol.as_deref(),
                    err.span.map(|span| span.col_start),
                ));
            }
            Err(err) => {
                return Err(fail(
                    ctx,
                    AsmErrorKind::Expression,
                    &err.message,
                    None,
                    err.span.map(|span| span.col_start),
                ));
            }
        };
        let qualified = SymbolTable::qualify(&name.name, self.current_global.as_deref());
        self.define_symbol(
            &qualified,
            SymbolKind::Constant,
            value,
            ctx,
            Some(name.span.col_start),
        )
    }

    fn define_symbol(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: i32,
        ctx: &LineCtx<'_>,
        column: Option<usize>,
    ) -> Result<(), Diagnostic> {
        let defined_at = SourceLocation {
            file: Some(ctx.file.to_string()),
            line: ctx.line,
        };
        match self.symbols.define(name, kind, value, defined_at) {
            DefineOutcome::Ok => Ok(()),
            DefineOutcome::Duplicate => {
                let prior = self
                    .symbols
                    .lookup(name)
                    .map(|symbol| symbol.defined_at.line)
                    .unwrap_or(0);
                Err(fail(
                    ctx,
                    AsmErrorKind::Symbol,
                    &format!("Symbol already defined at line {prior}"),
                    Some(name),
                    column,
                ))
            }
            DefineOutcome::BadName => Err(fail(
                ctx,
                AsmErrorKind::Symbol,
                "Invalid symbol name",
                Some(name),
                column,
            )),
        }
    }

    fn process_instruction(
        &mut self,
        mnemonic: &str,
        operands: &[Expr],
        ctx: &LineCtx<'_>,
    ) -> Result<(), Diagnostic> {
        let addr = self.sections.ip().map_err(|_| {
            fail(
                ctx,
                AsmErrorKind::Section,
                "Instruction outside of a section",
                Some(mnemonic),
                None,
            )
        })?;

        let encoded = {
            let encode_ctx = EncodeCtx {
                symbols: &self.symbols,
                scope: self.current_global.as_deref(),
                addr,
            };
            self.handler
                .encode(mnemonic, operands, &encode_ctx)
                .map_err(|err| {
                    fail(
                        ctx,
                        AsmErrorKind::Instruction,
                        &err.message,
                        None,
                        err.span.map(|span| span.col_start),
                    )
                })?
        };

        let section = self
            .sections
            .current_id()
            .expect("ip() succeeded with no current section");
        let base_offset = self.sections.current().map(|s| s.len()).unwrap_or(0);
        self.sections.emit(&encoded.bytes).map_err(|err| {
            fail(ctx, AsmErrorKind::Section, &err.to_string(), None, None)
        })?;

        for request in encoded.fixups {
            self.fixups.push(Fixup {
                section,
                offset: base_offset + request.offset as u32,
                width: request.width,
                kind: request.kind,
                expr: request.expr,
                scope: self.current_global.clone(),
                file: Some(ctx.file.to_string()),
                line: ctx.line,
                source: Some(ctx.source.to_string()),
            });
        }
        Ok(())
    }

    fn dir_db(&mut self, operands: &[Expr], ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        if operands.is_empty() {
            return Err(fail(
                ctx,
                AsmErrorKind::Directive,
                "DB requires at least one value",
                None,
                None,
            ));
        }
        for operand in operands {
            match operand {
                // Strings expand to their bytes, no terminator.
                Expr::String(bytes, _) => self.emit_data(bytes, ctx)?,
                expr => match self.eval_scoped(expr) {
                    Ok(value) => {
                        if matches!(expr, Expr::Number(text, _) if is_forced_word(text)) {
                            return Err(fail(
                                ctx,
                                AsmErrorKind::Range,
                                "16-bit literal in DB",
                                None,
                                Some(expr.span().col_start),
                            ));
                        }
                        if !value_fits_imm8(value) {
                            return Err(fail(
                                ctx,
                                AsmErrorKind::Range,
                                "DB value out of 8-bit range",
                                Some(&value.to_string()),
                                Some(expr.span().col_start),
                            ));
                        }
                        self.emit_data(&[(value & 0xff) as u8], ctx)?;
                    }
                    Err(err) if err.is_undefined() => {
                        self.emit_with_fixup(expr, 1, FixupKind::Absolute, ctx)?;
                    }
                    Err(err) => {
                        return Err(fail(
                            ctx,
                            AsmErrorKind::Expression,
                            &err.message,
                            None,
                            err.span.map(|span| span.col_start),
                        ));
                    }
                },
            }
        }
        Ok(())
    }

    fn dir_dw(&mut self, operands: &[Expr], ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        if operands.is_empty() {
            return Err(fail(
                ctx,
                AsmErrorKind::Directive,
                "DW requires at least one value",
                None,
                None,
            ));
        }
        for operand in operands {
            match self.eval_scoped(operand) {
                Ok(value) => {
                    if !value_fits_imm16(value) {
                        return Err(fail(
                            ctx,
                            AsmErrorKind::Range,
                            "DW value out of 16-bit range",
                            Some(&value.to_string()),
                            Some(operand.span().col_start),
                        ));
                    }
                    let word = value as u16;
                    self.emit_data(&[(word & 0xff) as u8, (word >> 8) as u8], ctx)?;
                }
                Err(err) if err.is_undefined() => {
                    self.emit_with_fixup(operand, 2, FixupKind::Absolute, ctx)?;
                }
                Err(err) => {
                    return Err(fail(
                        ctx,
                        AsmErrorKind::Expression,
                        &err.message,
                        None,
                        err.span.map(|span| span.col_start),
                    ));
                }
            }
        }
        Ok(())
    }

    fn dir_ds(&mut self, operands: &[Expr], ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        if operands.is_empty() || operands.len() > 2 {
            return Err(fail(
                ctx,
                AsmErrorKind::Directive,
                "DS takes a count and an optional fill byte",
                None,
                None,
            ));
        }
        let count = self.eval_known(
            &operands[0],
            ctx,
            AsmErrorKind::Directive,
            "DS count must be a known value",
        )?;
        if count < 0 {
            return Err(fail(
                ctx,
                AsmErrorKind::Range,
                "DS count cannot be negative",
                Some(&count.to_string()),
                Some(operands[0].span().col_start),
            ));
        }

        let in_rom = self
            .sections
            .current()
            .map(|section| section.region().is_rom())
            .unwrap_or(false);
        let fill = match operands.get(1) {
            Some(expr) => {
                if !in_rom {
                    return Err(fail(
                        ctx,
                        AsmErrorKind::Directive,
                        "DS fill byte is only allowed in ROM sections",
                        None,
                        Some(expr.span().col_start),
                    ));
                }
                let fill = self.eval_known(
                    expr,
                    ctx,
                    AsmErrorKind::Directive,
                    "DS fill must be a known value",
                )?;
                if !value_fits_imm8(fill) {
                    return Err(fail(
                        ctx,
                        AsmErrorKind::Range,
                        "DS fill out of 8-bit range",
                        Some(&fill.to_string()),
                        Some(expr.span().col_start),
                    ));
                }
                (fill & 0xff) as u8
            }
            None => 0x00,
        };

        self.sections
            .reserve(count as u32, fill)
            .map_err(|err| fail(ctx, AsmErrorKind::Section, &err.to_string(), None, None))
    }

    fn dir_include(&mut self, operands: &[Expr], ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        let path = match operands {
            [Expr::String(bytes, _)] => String::from_utf8_lossy(bytes).to_string(),
            _ => {
                return Err(fail(
                    ctx,
                    AsmErrorKind::Directive,
                    "INCLUDE requires a quoted path",
                    None,
                    None,
                ));
            }
        };
        let site = (ctx.file.to_string(), ctx.line, ctx.source.to_string());
        self.process_include(&path, Some(site))
    }

    fn emit_data(&mut self, bytes: &[u8], ctx: &LineCtx<'_>) -> Result<(), Diagnostic> {
        self.sections
            .emit(bytes)
            .map_err(|err| fail(ctx, AsmErrorKind::Section, &err.to_string(), None, None))
    }

    fn emit_with_fixup(
        &mut self,
        expr: &Expr,
        width: u8,
        kind: FixupKind,
        ctx: &LineCtx<'_>,
    ) -> Result<(), Diagnostic> {
        let section = self.sections.current_id().ok_or_else(|| {
            fail(
                ctx,
                AsmErrorKind::Section,
                "No section selected; use SECTION before emitting",
                None,
                None,
            )
        })?;
        let offset = self.sections.current().map(|s| s.len()).unwrap_or(0);
        self.emit_data(&vec![0x00; width as usize], ctx)?;
        self.fixups.push(Fixup {
            section,
            offset,
            width,
            kind,
            expr: expr.clone(),
            scope: self.current_global.clone(),
            file: Some(ctx.file.to_string()),
            line: ctx.line,
            source: Some(ctx.source.to_string()),
        });
        Ok(())
    }

    fn eval_scoped(&self, expr: &Expr) -> Result<i32, EvalError> {
        eval_expr(
            expr,
            &ScopedEval {
                symbols: &self.symbols,
                scope: self.current_global.as_deref(),
            },
        )
    }

    fn eval_known(
        &self,
        expr: &Expr,
        ctx: &LineCtx<'_>,
        kind: AsmErrorKind,
        undefined_msg: &str,
    ) -> Result<i32, Diagnostic> {
        match self.eval_scoped(expr) {
            Ok(value) => Ok(value),
            Err(err) if err.is_undefined() => Err(fail(
                ctx,
                kind,
                undefined_msg,
                err.undefined_symbol.as_deref(),
                err.span.map(|span| span.col_start),
            )),
            Err(err) => Err(fail(
                ctx,
                AsmErrorKind::Expression,
                &err.message,
                None,
                err.span.map(|span| span.col_start),
            )),
        }
    }
}
