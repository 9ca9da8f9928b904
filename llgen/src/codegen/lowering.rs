//! AST to IR lowering
//!
//! Declarations and statements live here; expressions are in `expr.rs`.

use rustc_hash::FxHashMap;

use llang::parser::ast::{Block, Decl, Document, Expr, FunctionDecl, ProtoFunc, Stmt, StructProto};
use llang::types::Type as AstType;
use llang::verify::ScopeTables;

use super::{EvalContext, InternalError};
use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
use crate::ir::*;
use crate::CompileError;

/// Lower a verified llang document to IR.
pub struct Lowering<'t> {
    tables: &'t ScopeTables,
    module: ModuleBuilder,
    block_scoping: bool,
}

impl<'t> Lowering<'t> {
    /// Create a new lowering context over the verifier's tables.
    ///
    /// `block_scoping` must match the setting the document was verified
    /// with, so that names resolve to the same declarations.
    pub fn new(tables: &'t ScopeTables, module_name: &str, block_scoping: bool) -> Self {
        Self {
            tables,
            module: ModuleBuilder::new(module_name.to_string()),
            block_scoping,
        }
    }

    /// Lower every declaration of a document.
    ///
    /// Layouts and prototypes are registered before any body is lowered, so
    /// bodies may refer to anything declared in the unit.
    pub fn lower_document(&mut self, document: &Document) -> Result<(), CompileError> {
        self.register_structs(document);
        self.declare_prototypes(document);

        for item in &document.items {
            if let Decl::Function(decl) = item {
                let function = self.lower_function(decl)?;
                self.module.add_function(function);
            }
        }
        Ok(())
    }

    /// Finish and return the module.
    pub fn finish(self) -> Module {
        self.module.build()
    }

    fn register_structs(&mut self, document: &Document) {
        for item in &document.items {
            match item {
                Decl::Struct(proto) => self.module.add_struct(layout_of(proto)),
                Decl::Import(import) => {
                    if let Some(imported) = &import.document {
                        self.register_structs(imported);
                    }
                }
                Decl::Function(_) | Decl::Extern(_) => {}
            }
        }
    }

    // Imported units contribute prototypes only; their bodies are compiled
    // separately and linked.
    fn declare_prototypes(&mut self, document: &Document) {
        for item in &document.items {
            match item {
                Decl::Function(decl) => self.declare(&decl.proto),
                Decl::Extern(decl) => self.declare(&decl.proto),
                Decl::Import(import) => {
                    if let Some(imported) = &import.document {
                        self.declare_prototypes(imported);
                    }
                }
                Decl::Struct(_) => {}
            }
        }
    }

    fn declare(&mut self, proto: &ProtoFunc) {
        self.module.declare_function(
            &proto.name,
            parameters(proto),
            Type::from_ast(&proto.return_type),
        );
    }

    fn lower_function(&mut self, decl: &FunctionDecl) -> Result<Function, CompileError> {
        let proto = &decl.proto;
        let mut builder = FunctionBuilder::new(
            proto.name.clone(),
            parameters(proto),
            Type::from_ast(&proto.return_type),
        );
        let entry = builder.create_attached_block("entry");
        builder.switch_to_block(entry);

        let mut lowering = FunctionLowering {
            tables: self.tables,
            module: &mut self.module,
            builder,
            symbols: FxHashMap::default(),
            block_scoping: self.block_scoping,
        };

        // Parameters get their own slots so the body can assign to them.
        for (index, param) in proto.params.iter().enumerate() {
            let ty = Type::from_ast(&param.ty);
            let slot = lowering.builder.build_entry_alloca(ty.clone());
            lowering
                .builder
                .build_store(Value::Arg { index, ty }, slot.clone());
            lowering
                .symbols
                .insert(param.name.clone(), (slot, param.ty.clone()));
        }

        lowering.lower_block(&decl.body)?;

        if !lowering.builder.is_terminated() {
            if proto.return_type == AstType::Void {
                lowering.builder.build_ret(None);
            } else {
                lowering.builder.build_unreachable();
            }
        }

        let function = lowering.builder.build();
        validate::validate_function(&function)?;
        Ok(function)
    }
}

fn parameters(proto: &ProtoFunc) -> Vec<Parameter> {
    proto
        .params
        .iter()
        .map(|param| Parameter {
            name: param.name.clone(),
            ty: Type::from_ast(&param.ty),
        })
        .collect()
}

fn layout_of(proto: &StructProto) -> StructLayout {
    StructLayout::new(
        proto.name.clone(),
        proto
            .fields
            .iter()
            .map(|field| (field.name.clone(), Type::from_ast(&field.ty)))
            .collect(),
    )
}

/// State for lowering one function body.
pub(super) struct FunctionLowering<'a, 't> {
    pub(super) tables: &'t ScopeTables,
    pub(super) module: &'a mut ModuleBuilder,
    pub(super) builder: FunctionBuilder,
    /// Storage slot and source type of every local in scope.
    pub(super) symbols: FxHashMap<String, (Value, AstType)>,
    block_scoping: bool,
}

impl FunctionLowering<'_, '_> {
    pub(super) fn lower_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.scoped(|this| {
            for stmt in &block.stmts {
                this.lower_stmt(stmt)?;
            }
            Ok(())
        })
    }

    // Names declared inside `f` go out of scope afterwards when block
    // scoping is on; otherwise they stay visible for the rest of the function.
    fn scoped(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        let saved = self.block_scoping.then(|| self.symbols.clone());
        let result = f(self);
        if let Some(saved) = saved {
            self.symbols = saved;
        }
        result
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, ty, init, .. } => {
                let slot = self.builder.build_entry_alloca(Type::from_ast(ty));
                if let Some(init) = init {
                    let value = self.lower_value(init, EvalContext::RVALUE)?;
                    self.builder.build_store(value.value, slot.clone());
                }
                self.symbols.insert(name.clone(), (slot, ty.clone()));
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => Some(self.lower_value(expr, EvalContext::RVALUE)?.value),
                    None => None,
                };
                self.builder.build_ret(value);
            }
            Stmt::If {
                branches,
                else_block,
                ..
            } => self.lower_if(branches, else_block.as_ref())?,
            Stmt::While { cond, body, .. } => self.lower_while(cond, body)?,
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => self.scoped(|this| {
                this.lower_stmt(init)?;
                this.lower_loop(cond, body, Some(step))
            })?,
            Stmt::Expr(expr) => {
                self.lower_expr(expr, EvalContext::RVALUE)?;
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        branches: &[(Expr, Block)],
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        let merge = self.builder.create_block("if.end");

        for (cond, body) in branches {
            let cond = self.lower_condition(cond)?;
            let then_block = self.builder.create_attached_block("if.then");
            let next_block = self.builder.create_block("if.else");
            self.builder.build_cond_br(cond, then_block, next_block);

            self.builder.switch_to_block(then_block);
            self.lower_block(body)?;
            if !self.builder.is_terminated() {
                self.builder.build_br(merge);
            }

            self.builder.append_block(next_block);
            self.builder.switch_to_block(next_block);
        }

        if let Some(else_block) = else_block {
            self.lower_block(else_block)?;
        }
        if !self.builder.is_terminated() {
            self.builder.build_br(merge);
        }

        self.builder.append_block(merge);
        self.builder.switch_to_block(merge);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        self.lower_loop(cond, body, None)
    }

    fn lower_loop(
        &mut self,
        cond: &Expr,
        body: &Block,
        step: Option<&Expr>,
    ) -> Result<(), CompileError> {
        let cond_block = self.builder.create_attached_block("loop.cond");
        let body_block = self.builder.create_attached_block("loop.body");
        let exit = self.builder.create_block("loop.end");

        self.builder.build_br(cond_block);
        self.builder.switch_to_block(cond_block);
        let cond = self.lower_condition(cond)?;
        self.builder.build_cond_br(cond, body_block, exit);

        self.builder.switch_to_block(body_block);
        self.lower_block(body)?;
        if !self.builder.is_terminated() {
            if let Some(step) = step {
                self.lower_expr(step, EvalContext::RVALUE)?;
            }
            self.builder.build_br(cond_block);
        }

        self.builder.append_block(exit);
        self.builder.switch_to_block(exit);
        Ok(())
    }

    /// Lowers a condition to an `i1`, comparing wider integers against zero.
    fn lower_condition(&mut self, cond: &Expr) -> Result<Value, CompileError> {
        let typed = self.lower_value(cond, EvalContext::RVALUE)?;
        match typed.value.ty() {
            Type::Int(1) => Ok(typed.value),
            Type::Int(bits) => {
                let zero = Value::Int { value: 0, bits };
                Ok(self.builder.build_icmp(IntPredicate::Ne, typed.value, zero))
            }
            _ => Err(InternalError::UnsupportedOperand {
                op: "condition",
                ty: typed.ty.to_string(),
            }
            .into()),
        }
    }
}
