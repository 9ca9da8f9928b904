//! Code generation backends
//!
//! Cranelift is the only backend, enabled with the `cranelift-backend`
//! feature. Without it llgen stops at IR.

#[cfg(feature = "cranelift-backend")]
pub mod cranelift;

use crate::ir::Module;
use crate::CompileError;

/// Code generation backend trait
pub trait Backend {
    /// Generate a relocatable object from IR
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError>;

    /// Get backend name
    fn name(&self) -> &'static str;

    /// Get supported target architectures
    fn supported_targets(&self) -> &[&str];
}
