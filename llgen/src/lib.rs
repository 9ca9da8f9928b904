//! llgen - IR generation for llang
//!
//! Drives the llang frontend (lexer, parser, verifier) and lowers verified
//! documents to a small SSA-style IR. With the `cranelift-backend` feature
//! the IR can be compiled to an object file or run in-process.

#![warn(missing_docs)]

pub mod backend;
pub mod codegen;
pub mod frontend;
pub mod ir;

use std::path::Path;

use llang::diagnostics::pretty::RenderOptions;
use llang::lexer::LexError;
use llang::parser::ast::Document;
use llang::parser::ParseError;
use llang::source::SourceFile;
use llang::verify::{verify_document, VerifyOptions};
use thiserror::Error;

use codegen::{CodeGenerator, InternalError};
use frontend::Frontend;

/// llgen version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main compiler interface
#[derive(Debug, Clone)]
pub struct Compiler {
    /// Verifier checks to enable
    pub verify: VerifyOptions,
    /// Target architecture
    pub target: String,
    /// Render diagnostics with ANSI colors
    pub color: bool,
}

impl Compiler {
    /// Create a new compiler with default settings
    pub fn new() -> Self {
        Self {
            verify: VerifyOptions::default(),
            target: std::env::consts::ARCH.to_string(),
            color: false,
        }
    }

    /// Compile llang source text into IR.
    pub fn compile_source(&self, source: &str, name: &str) -> Result<ir::Module, CompileError> {
        let mut frontend = Frontend::new();
        let document = frontend.parse_source(source, None)?;
        self.compile_document(&document, &SourceFile::new(name, source))
    }

    /// Compile a file and everything it imports into IR.
    pub fn compile_file(&self, path: &Path) -> Result<ir::Module, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            CompileError::Import(format!("failed to read '{}': {}", path.display(), err))
        })?;
        let mut frontend = Frontend::new();
        let document = frontend.parse_source(&source, Some(path))?;
        self.compile_document(&document, &SourceFile::new(path.display().to_string(), source))
    }

    /// Verify a parsed document and lower it to IR.
    ///
    /// `file` is only used to render diagnostics and name the module.
    pub fn compile_document(
        &self,
        document: &Document,
        file: &SourceFile,
    ) -> Result<ir::Module, CompileError> {
        let verification = verify_document(document, self.verify);
        if verification.has_errors() {
            let options = if self.color {
                RenderOptions::colored()
            } else {
                RenderOptions::plain()
            };
            return Err(CompileError::Verification {
                count: verification.diagnostics.error_count(),
                report: verification.diagnostics.render(file, options),
            });
        }

        CodeGenerator::new()
            .with_block_scoping(self.verify.block_scoping)
            .compile(document, &verification.tables, module_name(&file.name))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn module_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Lexing failed
    #[error("{0}")]
    Lex(#[from] LexError),
    /// Parsing failed
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// An import could not be resolved or loaded
    #[error("import error: {0}")]
    Import(String),
    /// The verifier reported errors
    #[error("{report}{count} error(s) reported")]
    Verification {
        /// Number of errors
        count: usize,
        /// Rendered diagnostics
        report: String,
    },
    /// Generation hit a state verification should have ruled out
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
    /// IR validation failed
    #[error("invalid IR: {0}")]
    InvalidIr(String),
    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),
    /// Feature not yet implemented
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_creation() {
        let compiler = Compiler::new();
        assert_eq!(compiler.verify, VerifyOptions::default());
        assert!(!compiler.color);
    }

    #[test]
    fn module_is_named_after_file_stem() {
        assert_eq!(module_name("src/main.ll"), "main");
        assert_eq!(module_name("input"), "input");
    }
}
