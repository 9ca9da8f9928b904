//! Code generation orchestration
//!
//! Lowers a verified document to IR. Generation trusts the verifier: any
//! name or type it cannot resolve is an `InternalError` and aborts the run.

mod expr;
pub mod lowering;

use llang::parser::ast::Document;
use llang::verify::ScopeTables;
use thiserror::Error;

use crate::ir::{validate, Module};
use crate::CompileError;

/// Generator states that verification should have ruled out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InternalError {
    /// No storage was recorded for a variable.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    /// Call to a function that was never declared.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// Reference to a struct with no registered layout.
    #[error("unknown structure '{0}'")]
    UnknownStruct(String),
    /// Field missing from a struct layout.
    #[error("structure '{structure}' has no field '{field}'")]
    UnknownField {
        /// Struct name.
        structure: String,
        /// Requested field.
        field: String,
    },
    /// A field was initialized with a value of another type.
    #[error("field '{field}' of '{structure}' has type {expected}, got {found}")]
    FieldTypeMismatch {
        /// Struct name.
        structure: String,
        /// Initialized field.
        field: String,
        /// Declared field type.
        expected: String,
        /// Type of the stored value.
        found: String,
    },
    /// A void call was used where a value is required.
    #[error("call to '{0}' produces no value")]
    VoidValue(String),
    /// An operator was applied to a type it has no lowering for.
    #[error("operator '{op}' cannot be applied to {ty}")]
    UnsupportedOperand {
        /// Operator spelling.
        op: &'static str,
        /// Operand type.
        ty: String,
    },
}

/// Whether an expression is wanted as a storage address or as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// Produce the address of the storage instead of loading from it.
    pub as_lvalue: bool,
}

impl EvalContext {
    /// Load values.
    pub const RVALUE: EvalContext = EvalContext { as_lvalue: false };
    /// Produce addresses.
    pub const LVALUE: EvalContext = EvalContext { as_lvalue: true };
}

/// Main codegen entry point.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    block_scoping: bool,
}

impl CodeGenerator {
    /// Create a new code generator with function-wide local names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope locals to their enclosing block, as the verifier does when
    /// `VerifyOptions::block_scoping` is set.
    pub fn with_block_scoping(mut self, block_scoping: bool) -> Self {
        self.block_scoping = block_scoping;
        self
    }

    /// Lower a verified document to IR.
    pub fn compile(
        &self,
        document: &Document,
        tables: &ScopeTables,
        module_name: &str,
    ) -> Result<Module, CompileError> {
        let mut lowering = lowering::Lowering::new(tables, module_name, self.block_scoping);
        lowering.lower_document(document)?;
        let module = lowering.finish();
        validate::validate_module(&module)?;
        Ok(module)
    }
}
