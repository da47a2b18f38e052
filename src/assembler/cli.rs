// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError};

pub const VERSION: &str = "1.0";

const LONG_ABOUT: &str = "Game Boy (LR35902) assembler with sections, expressions and includes.

Each populated ROM section is written to its own <base>.<section>.bin file.
Use -o/--outfile to set the output base name; it defaults to the input base.
With multiple inputs, -o must be a directory.";

#[derive(Parser, Debug)]
#[command(
    name = "dmgforge",
    version = VERSION,
    about = "Game Boy (LR35902) assembler with sections, expressions and includes",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        short = 'i',
        long = "infile",
        value_name = "FILE",
        action = ArgAction::Append,
        long_help = "Input assembly file (repeatable). Must end with .asm."
    )]
    pub infiles: Vec<PathBuf>,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "BASE",
        long_help = "Output filename base for section binaries. Defaults to the input base. With multiple inputs, BASE must be a directory."
    )]
    pub outfile: Option<String>,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the per-section summary lines on stdout."
    )]
    pub quiet: bool,
}

#[derive(Debug, Default)]
pub struct Config {
    pub out_dir: Option<PathBuf>,
}

fn cli_error(msg: &str, param: Option<&str>) -> AsmRunError {
    AsmRunError::new(AsmError::new(AsmErrorKind::Cli, msg, param), Vec::new())
}

pub fn validate_cli(cli: &Cli) -> Result<Config, AsmRunError> {
    if cli.infiles.is_empty() {
        return Err(cli_error("No input file; use -i/--infile", None));
    }
    for path in &cli.infiles {
        if path.extension().and_then(|ext| ext.to_str()) != Some("asm") {
            return Err(cli_error(
                "Input file must end with .asm",
                Some(&path.to_string_lossy()),
            ));
        }
    }
    let mut out_dir = None;
    if let Some(outfile) = &cli.outfile {
        let path = PathBuf::from(outfile);
        if cli.infiles.len() > 1 {
            if !path.is_dir() {
                return Err(cli_error(
                    "With multiple inputs, -o/--outfile must be an existing directory",
                    Some(outfile),
                ));
            }
            out_dir = Some(path);
        }
    }
    Ok(Config { out_dir })
}

/// Split an input path into its file name and output base (the stem).
pub fn input_base_from_path(path: &Path) -> Result<(String, String), AsmRunError> {
    let name = path
        .to_str()
        .ok_or_else(|| cli_error("Input path is not valid UTF-8", None))?
        .to_string();
    let base = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| cli_error("Input path has no file name", Some(&name)))?
        .to_string();
    Ok((name, base))
}

/// Output path for one section's binary. Section names may contain
/// anything; non-filename characters collapse to underscores.
pub fn section_output_path(out_base: &str, section: &str) -> String {
    let sanitized: String = section
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{out_base}.{sanitized}.bin")
}

#[cfg(test)]
mod tests {
    use super::{input_base_from_path, section_output_path, validate_cli, Cli};
    use std::path::{Path, PathBuf};

    fn cli_with(infiles: &[&str]) -> Cli {
        Cli {
            infiles: infiles.iter().map(PathBuf::from).collect(),
            outfile: None,
            quiet: false,
        }
    }

    #[test]
    fn requires_an_input_file() {
        assert!(validate_cli(&cli_with(&[])).is_err());
        assert!(validate_cli(&cli_with(&["game.asm"])).is_ok());
    }

    #[test]
    fn rejects_non_asm_extension() {
        assert!(validate_cli(&cli_with(&["game.s"])).is_err());
        assert!(validate_cli(&cli_with(&["game"])).is_err());
    }

    #[test]
    fn computes_output_base() {
        let (name, base) = input_base_from_path(Path::new("src/game.asm")).unwrap();
        assert_eq!(name, "src/game.asm");
        assert_eq!(base, "game");
    }

    #[test]
    fn sanitizes_section_names() {
        assert_eq!(section_output_path("game", "x"), "game.x.bin");
        assert_eq!(
            section_output_path("game", "main code!"),
            "game.main_code_.bin"
        );
    }
}
