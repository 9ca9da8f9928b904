//! Cranelift backend implementation
//!
//! Stack slots back every `alloca`; struct field and element addresses are
//! computed from the module's layouts. Externs are imported symbols, which
//! the JIT resolves against the running process.

use cranelift::codegen::ir::{FuncRef, GlobalValue};
use cranelift::codegen::isa::OwnedTargetIsa;
use cranelift::prelude::{
    settings, types, AbiParam, Block, Configurable, FloatCC, FunctionBuilder,
    FunctionBuilderContext, InstBuilder, IntCC, MemFlags, StackSlotData, StackSlotKind, TrapCode,
    Type as ClifType, Value as ClifValue,
};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as ClifModule};
use cranelift_object::{ObjectBuilder, ObjectModule};
use rustc_hash::FxHashMap;

use crate::backend::Backend;
use crate::ir::{
    BinOp, BlockId, FloatPredicate, Function as IrFunction, Instruction, IntPredicate, Module,
    Terminator, Type, Value,
};
use crate::CompileError;

/// Cranelift code generator.
pub struct CraneliftBackend {
    /// Target ISA (instruction set architecture).
    target: String,
}

impl CraneliftBackend {
    /// Create a new Cranelift backend.
    pub fn new() -> Result<Self, CompileError> {
        Ok(Self {
            target: std::env::consts::ARCH.to_string(),
        })
    }

    /// Compile IR to object bytes.
    fn compile_module(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        let isa = build_native_isa()?;
        let builder = ObjectBuilder::new(isa, module.name.as_str(), cranelift_module::default_libcall_names())
            .map_err(module_error)?;
        let mut object_module = ObjectModule::new(builder);

        compile_into_module(&mut object_module, module)?;
        let product = object_module.finish();
        product
            .emit()
            .map_err(|err| CompileError::Backend(format!("failed to emit object bytes: {}", err)))
    }

    /// JIT-compile and run `main`, returning its result as an exit code.
    pub fn run_main(&self, module: &Module) -> Result<i64, CompileError> {
        let main = module
            .function("main")
            .filter(|function| !function.is_declaration)
            .ok_or_else(|| CompileError::InvalidIr("module has no `main` function".to_string()))?;
        if !main.params.is_empty() {
            return Err(CompileError::NotImplemented("running `main` with parameters"));
        }
        let return_type = main.return_type.clone();
        if !matches!(return_type, Type::Int(64) | Type::Int(32) | Type::Void) {
            return Err(CompileError::NotImplemented(
                "running `main` that does not return i64, i32 or void",
            ));
        }

        let jit_builder =
            JITBuilder::new(cranelift_module::default_libcall_names()).map_err(module_error)?;
        let mut jit_module = JITModule::new(jit_builder);
        let compiled = compile_into_module(&mut jit_module, module)?;
        jit_module.finalize_definitions().map_err(module_error)?;

        let main_id = compiled.functions.get("main").copied().ok_or_else(|| {
            CompileError::InvalidIr("module has no `main` function".to_string())
        })?;
        let code = jit_module.get_finalized_function(main_id);

        // SAFETY: `main` was declared above with no parameters and the return
        // type matched here.
        let exit_code = unsafe {
            match return_type {
                Type::Int(64) => {
                    let main_fn: extern "C" fn() -> i64 = std::mem::transmute(code);
                    main_fn()
                }
                Type::Int(32) => {
                    let main_fn: extern "C" fn() -> i32 = std::mem::transmute(code);
                    i64::from(main_fn())
                }
                _ => {
                    let main_fn: extern "C" fn() = std::mem::transmute(code);
                    main_fn();
                    0
                }
            }
        };
        Ok(exit_code)
    }

    /// Get configured target architecture name.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Backend for CraneliftBackend {
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        self.compile_module(module)
    }

    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn supported_targets(&self) -> &[&str] {
        &["x86_64", "aarch64"]
    }
}

struct CompiledFunctions {
    functions: FxHashMap<String, FuncId>,
}

fn compile_into_module<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
) -> Result<CompiledFunctions, CompileError> {
    let pointer_ty = module.target_config().pointer_type();
    let mut functions = FxHashMap::default();

    for function in &ir_module.functions {
        let signature = make_signature(module, function, pointer_ty)?;
        let linkage = if function.is_declaration {
            Linkage::Import
        } else {
            Linkage::Export
        };
        let func_id = module
            .declare_function(&function.name, linkage, &signature)
            .map_err(module_error)?;
        functions.insert(function.name.clone(), func_id);
    }

    let strings = define_strings(module, ir_module)?;

    let mut context = module.make_context();
    let mut builder_context = FunctionBuilderContext::new();

    for function in ir_module.functions.iter().filter(|f| !f.is_declaration) {
        let func_id = *functions.get(&function.name).ok_or_else(|| {
            CompileError::InvalidIr(format!("missing function id for {}", function.name))
        })?;

        context.func.signature = make_signature(module, function, pointer_ty)?;
        {
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
            lower_function(module, ir_module, function, &functions, &strings, &mut builder)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        module
            .define_function(func_id, &mut context)
            .map_err(module_error)?;
        module.clear_context(&mut context);
    }

    Ok(CompiledFunctions { functions })
}

fn define_strings<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
) -> Result<FxHashMap<String, DataId>, CompileError> {
    let mut ids = FxHashMap::default();
    for global in &ir_module.globals {
        let mut data = DataDescription::new();
        let mut bytes = global.value.as_bytes().to_vec();
        bytes.push(0);
        data.define(bytes.into_boxed_slice());

        let data_id = module
            .declare_data(&global.name, Linkage::Local, false, false)
            .map_err(module_error)?;
        module.define_data(data_id, &data).map_err(module_error)?;
        ids.insert(global.name.clone(), data_id);
    }
    Ok(ids)
}

/// Per-function lowering state.
struct FunctionContext<'m> {
    ir_module: &'m Module,
    pointer_ty: ClifType,
    blocks: FxHashMap<BlockId, Block>,
    regs: FxHashMap<usize, ClifValue>,
    args: Vec<ClifValue>,
    functions: FxHashMap<String, FuncRef>,
    globals: FxHashMap<String, GlobalValue>,
}

fn lower_function<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
    ir_function: &IrFunction,
    function_ids: &FxHashMap<String, FuncId>,
    strings: &FxHashMap<String, DataId>,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    let Some(first) = ir_function.blocks.first() else {
        return Err(CompileError::InvalidIr(format!(
            "function '{}' has no basic blocks",
            ir_function.name
        )));
    };

    let mut blocks = FxHashMap::default();
    for block in &ir_function.blocks {
        blocks.insert(block.id, builder.create_block());
    }

    let entry = blocks[&first.id];
    builder.append_block_params_for_function_params(entry);
    let args = builder.block_params(entry).to_vec();

    let mut functions = FxHashMap::default();
    for (name, id) in function_ids {
        functions.insert(name.clone(), module.declare_func_in_func(*id, builder.func));
    }
    let mut globals = FxHashMap::default();
    for (name, id) in strings {
        globals.insert(name.clone(), module.declare_data_in_func(*id, builder.func));
    }

    let mut ctx = FunctionContext {
        ir_module,
        pointer_ty: module.target_config().pointer_type(),
        blocks,
        regs: FxHashMap::default(),
        args,
        functions,
        globals,
    };

    for block in &ir_function.blocks {
        builder.switch_to_block(ctx.blocks[&block.id]);

        for instruction in &block.instructions {
            lower_instruction(&mut ctx, instruction, builder)?;
        }

        let terminator = block.terminator.as_ref().ok_or_else(|| {
            CompileError::InvalidIr(format!(
                "in function '{}': block '{}' has no terminator",
                ir_function.name, block.label
            ))
        })?;
        lower_terminator(&mut ctx, terminator, builder)?;
    }

    Ok(())
}

fn lower_instruction(
    ctx: &mut FunctionContext<'_>,
    instruction: &Instruction,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match instruction {
        Instruction::Alloca { dest, ty } => {
            let addr = ctx.stack_slot(ty, builder)?;
            ctx.regs.insert(dest.id, addr);
        }
        Instruction::Load { dest, ty, addr } => {
            let addr = ctx.value(addr, builder)?;
            let loaded = match ty {
                // Aggregates are copied into a fresh slot and handled by address.
                Type::Struct(name) => {
                    let copy = ctx.stack_slot(ty, builder)?;
                    ctx.copy_struct(name, addr, copy, builder)?;
                    copy
                }
                _ => {
                    let clif_ty = map_type_to_clif(ty, ctx.pointer_ty)?;
                    builder.ins().load(clif_ty, MemFlags::new(), addr, 0)
                }
            };
            ctx.regs.insert(dest.id, loaded);
        }
        Instruction::Store { value, addr } => {
            let addr = ctx.value(addr, builder)?;
            let stored = ctx.value(value, builder)?;
            match value.ty() {
                Type::Struct(name) => ctx.copy_struct(&name, stored, addr, builder)?,
                _ => {
                    builder.ins().store(MemFlags::new(), stored, addr, 0);
                }
            }
        }
        Instruction::FieldAddr {
            dest,
            struct_name,
            base,
            index,
        } => {
            let offsets = ctx.ir_module.field_offsets(struct_name)?;
            let offset = offsets.get(*index as usize).copied().ok_or_else(|| {
                CompileError::InvalidIr(format!(
                    "struct '{}' has no field {}",
                    struct_name, index
                ))
            })?;
            let base = ctx.value(base, builder)?;
            let addr = builder.ins().iadd_imm(base, i64::from(offset));
            ctx.regs.insert(dest.id, addr);
        }
        Instruction::ElementAddr {
            dest,
            elem_ty,
            base,
            index,
        } => {
            let size = ctx.ir_module.size_of(elem_ty)?;
            let base = ctx.value(base, builder)?;
            let index = ctx.value(index, builder)?;
            let index = widen(index, ctx.pointer_ty, builder);
            let scaled = builder.ins().imul_imm(index, i64::from(size));
            let addr = builder.ins().iadd(base, scaled);
            ctx.regs.insert(dest.id, addr);
        }
        Instruction::Binary { dest, op, lhs, rhs } => {
            let lhs = ctx.value(lhs, builder)?;
            let rhs = ctx.value(rhs, builder)?;
            let result = lower_binop(*op, lhs, rhs, builder);
            ctx.regs.insert(dest.id, result);
        }
        Instruction::Neg { dest, operand } => {
            let operand = ctx.value(operand, builder)?;
            let result = builder.ins().ineg(operand);
            ctx.regs.insert(dest.id, result);
        }
        Instruction::FNeg { dest, operand } => {
            let operand = ctx.value(operand, builder)?;
            let result = builder.ins().fneg(operand);
            ctx.regs.insert(dest.id, result);
        }
        Instruction::ICmp {
            dest,
            pred,
            lhs,
            rhs,
        } => {
            let lhs = ctx.value(lhs, builder)?;
            let rhs = ctx.value(rhs, builder)?;
            let result = builder.ins().icmp(int_cc(*pred), lhs, rhs);
            ctx.regs.insert(dest.id, result);
        }
        Instruction::FCmp {
            dest,
            pred,
            lhs,
            rhs,
        } => {
            let lhs = ctx.value(lhs, builder)?;
            let rhs = ctx.value(rhs, builder)?;
            let result = builder.ins().fcmp(float_cc(*pred), lhs, rhs);
            ctx.regs.insert(dest.id, result);
        }
        Instruction::Call { dest, callee, args } => {
            let func_ref = ctx.functions.get(callee).copied().ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown call target '{}'", callee))
            })?;

            let mut lowered_args = Vec::with_capacity(args.len());
            for arg in args {
                lowered_args.push(ctx.value(arg, builder)?);
            }

            let call = builder.ins().call(func_ref, &lowered_args);
            if let Some(dest) = dest {
                let result = builder.inst_results(call).first().copied().ok_or_else(|| {
                    CompileError::InvalidIr(format!("call to '{}' produced no result", callee))
                })?;
                ctx.regs.insert(dest.id, result);
            }
        }
    }
    Ok(())
}

fn lower_terminator(
    ctx: &mut FunctionContext<'_>,
    terminator: &Terminator,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match terminator {
        Terminator::Return(value) => {
            if let Some(value) = value {
                let lowered = ctx.value(value, builder)?;
                builder.ins().return_(&[lowered]);
            } else {
                builder.ins().return_(&[]);
            }
        }
        Terminator::Branch(target) => {
            let target = ctx.block(*target)?;
            builder.ins().jump(target, &[]);
        }
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => {
            let then_block = ctx.block(*then_block)?;
            let else_block = ctx.block(*else_block)?;
            let cond = ctx.value(cond, builder)?;
            builder.ins().brif(cond, then_block, &[], else_block, &[]);
        }
        Terminator::Unreachable => {
            builder.ins().trap(TrapCode::unwrap_user(1));
        }
    }
    Ok(())
}

impl FunctionContext<'_> {
    fn block(&self, id: BlockId) -> Result<Block, CompileError> {
        self.blocks
            .get(&id)
            .copied()
            .ok_or_else(|| CompileError::InvalidIr(format!("unknown branch target {}", id.0)))
    }

    fn value(&self, value: &Value, builder: &mut FunctionBuilder) -> Result<ClifValue, CompileError> {
        match value {
            Value::Reg(reg) => self.regs.get(&reg.id).copied().ok_or_else(|| {
                CompileError::InvalidIr(format!("register %{} used before definition", reg.id))
            }),
            Value::Int { value, bits } => {
                let ty = int_type(*bits)?;
                // Narrow immediates must be zero-extended.
                let imm = if *bits >= 64 {
                    *value
                } else {
                    *value & ((1i64 << bits) - 1)
                };
                Ok(builder.ins().iconst(ty, imm))
            }
            Value::Float { value, bits: 32 } => Ok(builder.ins().f32const(*value as f32)),
            Value::Float { value, bits: 64 } => Ok(builder.ins().f64const(*value)),
            Value::Float { .. } => Err(CompileError::NotImplemented(
                "float widths other than 32 and 64 bits",
            )),
            Value::Arg { index, .. } => self.args.get(*index).copied().ok_or_else(|| {
                CompileError::InvalidIr(format!("argument {} out of range", index))
            }),
            Value::Global(name) => {
                let global = self.globals.get(name).copied().ok_or_else(|| {
                    CompileError::InvalidIr(format!("unknown global '{}'", name))
                })?;
                Ok(builder.ins().global_value(self.pointer_ty, global))
            }
        }
    }

    /// A fresh stack slot for one `ty`, returned as an address.
    fn stack_slot(&self, ty: &Type, builder: &mut FunctionBuilder) -> Result<ClifValue, CompileError> {
        let size = self.ir_module.size_of(ty)?.max(1);
        let align = self.ir_module.align_of(ty)?;
        let slot = builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align.trailing_zeros() as u8,
        ));
        Ok(builder.ins().stack_addr(self.pointer_ty, slot, 0))
    }

    // Field by field, recursing into nested structs.
    fn copy_struct(
        &self,
        struct_name: &str,
        src: ClifValue,
        dst: ClifValue,
        builder: &mut FunctionBuilder,
    ) -> Result<(), CompileError> {
        let layout = self.ir_module.struct_layout(struct_name).ok_or_else(|| {
            CompileError::InvalidIr(format!("unknown struct type '{}'", struct_name))
        })?;
        let offsets = self.ir_module.field_offsets(struct_name)?;

        for ((_, field_ty), offset) in layout.fields.iter().zip(offsets) {
            match field_ty {
                Type::Struct(inner) => {
                    let src = builder.ins().iadd_imm(src, i64::from(offset));
                    let dst = builder.ins().iadd_imm(dst, i64::from(offset));
                    self.copy_struct(inner, src, dst, builder)?;
                }
                _ => {
                    let clif_ty = map_type_to_clif(field_ty, self.pointer_ty)?;
                    let offset = offset as i32;
                    let value = builder.ins().load(clif_ty, MemFlags::new(), src, offset);
                    builder.ins().store(MemFlags::new(), value, dst, offset);
                }
            }
        }
        Ok(())
    }
}

fn lower_binop(
    op: BinOp,
    lhs: ClifValue,
    rhs: ClifValue,
    builder: &mut FunctionBuilder,
) -> ClifValue {
    match op {
        BinOp::Add => builder.ins().iadd(lhs, rhs),
        BinOp::Sub => builder.ins().isub(lhs, rhs),
        BinOp::Mul => builder.ins().imul(lhs, rhs),
        BinOp::SDiv => builder.ins().sdiv(lhs, rhs),
        BinOp::FAdd => builder.ins().fadd(lhs, rhs),
        BinOp::FSub => builder.ins().fsub(lhs, rhs),
        BinOp::FMul => builder.ins().fmul(lhs, rhs),
        BinOp::FDiv => builder.ins().fdiv(lhs, rhs),
    }
}

fn int_cc(pred: IntPredicate) -> IntCC {
    match pred {
        IntPredicate::Eq => IntCC::Equal,
        IntPredicate::Ne => IntCC::NotEqual,
        IntPredicate::Slt => IntCC::SignedLessThan,
        IntPredicate::Sgt => IntCC::SignedGreaterThan,
        IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
        IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
    }
}

fn float_cc(pred: FloatPredicate) -> FloatCC {
    match pred {
        FloatPredicate::Ueq => FloatCC::UnorderedOrEqual,
        FloatPredicate::Ult => FloatCC::UnorderedOrLessThan,
        FloatPredicate::Ugt => FloatCC::UnorderedOrGreaterThan,
        FloatPredicate::Ule => FloatCC::UnorderedOrLessThanOrEqual,
        FloatPredicate::Uge => FloatCC::UnorderedOrGreaterThanOrEqual,
    }
}

fn widen(value: ClifValue, to: ClifType, builder: &mut FunctionBuilder) -> ClifValue {
    let ty = builder.func.dfg.value_type(value);
    if ty.bits() < to.bits() {
        builder.ins().sextend(to, value)
    } else {
        value
    }
}

fn make_signature<M: ClifModule>(
    module: &M,
    function: &IrFunction,
    pointer_ty: ClifType,
) -> Result<cranelift::prelude::Signature, CompileError> {
    let mut signature = module.make_signature();

    for param in &function.params {
        let ty = map_type_to_clif(&param.ty, pointer_ty)?;
        signature.params.push(AbiParam::new(ty));
    }

    if function.return_type != Type::Void {
        let return_type = map_type_to_clif(&function.return_type, pointer_ty)?;
        signature.returns.push(AbiParam::new(return_type));
    }

    Ok(signature)
}

fn int_type(bits: u8) -> Result<ClifType, CompileError> {
    match bits {
        1 | 8 => Ok(types::I8),
        16 => Ok(types::I16),
        32 => Ok(types::I32),
        64 => Ok(types::I64),
        _ => Err(CompileError::NotImplemented("integer widths other than 8, 16, 32 and 64 bits")),
    }
}

fn map_type_to_clif(ty: &Type, pointer_ty: ClifType) -> Result<ClifType, CompileError> {
    match ty {
        Type::Int(bits) => int_type(*bits),
        Type::Float(32) => Ok(types::F32),
        Type::Float(64) => Ok(types::F64),
        Type::Float(_) => Err(CompileError::NotImplemented(
            "float widths other than 32 and 64 bits",
        )),
        Type::Ptr => Ok(pointer_ty),
        Type::Void => Err(CompileError::InvalidIr(
            "void cannot be used as a concrete value type".to_string(),
        )),
        Type::Struct(_) => Err(CompileError::NotImplemented(
            "passing or returning structs by value",
        )),
    }
}

fn build_native_isa() -> Result<OwnedTargetIsa, CompileError> {
    let mut flags = settings::builder();
    flags
        .set("is_pic", "true")
        .map_err(|err| CompileError::Backend(format!("failed to set Cranelift flag: {}", err)))?;

    let isa_builder = cranelift_native::builder().map_err(|msg| {
        CompileError::Backend(format!(
            "host machine is not supported by Cranelift: {}",
            msg
        ))
    })?;

    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(module_error)
}

fn module_error(err: impl std::fmt::Display) -> CompileError {
    CompileError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = CraneliftBackend::new();
        assert!(backend.is_ok());
    }

    #[test]
    fn narrow_ints_map_to_byte_registers() {
        assert_eq!(int_type(1).unwrap(), types::I8);
        assert_eq!(int_type(32).unwrap(), types::I32);
        assert!(int_type(12).is_err());
    }

    #[test]
    fn runs_simple_main() {
        let module = crate::Compiler::new()
            .compile_source(
                "function add(a: i64, b: i64): i64 { return a + b; }\n\
                 function main(): i64 { return add(40, 2); }",
                "add.ll",
            )
            .unwrap();
        let backend = CraneliftBackend::new().unwrap();
        assert_eq!(backend.run_main(&module).unwrap(), 42);
    }
}
