//! Structural well-formedness checks
//!
//! Values only flow between blocks through memory, so a register may be
//! used in the block that defines it (after the definition) or, when it is
//! defined in the entry block, anywhere in the function.

use rustc_hash::{FxHashMap, FxHashSet};

use super::*;
use crate::CompileError;

/// Validate every function of a module, including cross-function references
pub fn validate_module(module: &Module) -> Result<(), CompileError> {
    let mut names = FxHashSet::default();
    for function in &module.functions {
        if !names.insert(function.name.as_str()) {
            return Err(invalid(&function.name, "function is defined more than once"));
        }
        validate_function(function)?;
        validate_references(module, function)?;
    }
    Ok(())
}

/// Validate one function in isolation
pub fn validate_function(function: &Function) -> Result<(), CompileError> {
    if function.is_declaration {
        if !function.blocks.is_empty() {
            return Err(invalid(&function.name, "declaration has a body"));
        }
        return Ok(());
    }

    let Some(entry) = function.blocks.first() else {
        return Err(invalid(&function.name, "function has no entry block"));
    };

    let mut block_ids = FxHashSet::default();
    for block in &function.blocks {
        if !block_ids.insert(block.id) {
            return Err(invalid(
                &function.name,
                &format!("block '{}' is placed twice", block.label),
            ));
        }
    }

    let mut defined = FxHashSet::default();
    let mut entry_defs = FxHashSet::default();
    for inst in &entry.instructions {
        if let Some(dest) = inst.dest() {
            entry_defs.insert(dest.id);
        }
    }

    for block in &function.blocks {
        let mut visible = if block.id == entry.id {
            FxHashSet::default()
        } else {
            entry_defs.clone()
        };

        for inst in &block.instructions {
            for operand in inst.operands() {
                check_operand(function, block, operand, &visible)?;
            }
            if let Some(dest) = inst.dest() {
                if !defined.insert(dest.id) {
                    return Err(invalid(
                        &function.name,
                        &format!("register %{} is defined more than once", dest.id),
                    ));
                }
                visible.insert(dest.id);
            }
        }

        let Some(term) = &block.terminator else {
            return Err(invalid(
                &function.name,
                &format!("block '{}' has no terminator", block.label),
            ));
        };

        match term {
            Terminator::Return(value) => {
                if let Some(value) = value {
                    check_operand(function, block, value, &visible)?;
                }
                if value.is_some() == (function.return_type == Type::Void) {
                    return Err(invalid(
                        &function.name,
                        &format!("return in '{}' does not match {}", block.label, function.return_type),
                    ));
                }
            }
            Terminator::CondBranch { cond, .. } => {
                check_operand(function, block, cond, &visible)?;
                if cond.ty() != Type::Int(1) {
                    return Err(invalid(
                        &function.name,
                        &format!("branch condition in '{}' is not i1", block.label),
                    ));
                }
            }
            Terminator::Branch(_) | Terminator::Unreachable => {}
        }

        for successor in term.successors() {
            if !block_ids.contains(&successor) {
                return Err(invalid(
                    &function.name,
                    &format!("block '{}' branches to a block outside the function", block.label),
                ));
            }
        }
    }

    Ok(())
}

fn check_operand(
    function: &Function,
    block: &BasicBlock,
    value: &Value,
    visible: &FxHashSet<usize>,
) -> Result<(), CompileError> {
    match value {
        Value::Reg(reg) if !visible.contains(&reg.id) => Err(invalid(
            &function.name,
            &format!("register %{} used in '{}' before it is defined", reg.id, block.label),
        )),
        Value::Arg { index, .. } if *index >= function.params.len() => Err(invalid(
            &function.name,
            &format!("argument {} out of range", index),
        )),
        _ => Ok(()),
    }
}

fn validate_references(module: &Module, function: &Function) -> Result<(), CompileError> {
    // Field type behind every register produced by a field address.
    let mut field_types: FxHashMap<usize, &Type> = FxHashMap::default();

    for block in &function.blocks {
        for inst in &block.instructions {
            match inst {
                Instruction::Call { callee, args, .. } => {
                    let Some(target) = module.function(callee) else {
                        return Err(invalid(&function.name, &format!("call to unknown '{}'", callee)));
                    };
                    if target.params.len() != args.len() {
                        return Err(invalid(
                            &function.name,
                            &format!(
                                "call to '{}' passes {} argument(s), expected {}",
                                callee,
                                args.len(),
                                target.params.len()
                            ),
                        ));
                    }
                }
                Instruction::FieldAddr {
                    dest,
                    struct_name,
                    index,
                    ..
                } => {
                    let Some(field_ty) = module
                        .struct_layout(struct_name)
                        .and_then(|layout| layout.field_type(*index))
                    else {
                        return Err(invalid(
                            &function.name,
                            &format!("field {} of '{}' does not exist", index, struct_name),
                        ));
                    };
                    field_types.insert(dest.id, field_ty);
                }
                Instruction::Store {
                    value,
                    addr: Value::Reg(addr),
                } => {
                    if let Some(field_ty) = field_types.get(&addr.id) {
                        if value.ty() != **field_ty {
                            return Err(invalid(
                                &function.name,
                                &format!("store of {} into a {} field", value.ty(), field_ty),
                            ));
                        }
                    }
                }
                _ => {}
            }
            for operand in inst.operands() {
                if let Value::Global(name) = operand {
                    if !module.globals.iter().any(|global| &global.name == name) {
                        return Err(invalid(&function.name, &format!("unknown global '@{}'", name)));
                    }
                }
            }
        }
    }
    Ok(())
}

fn invalid(function: &str, message: &str) -> CompileError {
    CompileError::InvalidIr(format!("in function '{}': {}", function, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_block(terminator: Option<Terminator>) -> Function {
        let mut function = Function::new("f".to_string(), vec![], Type::Int(64));
        let mut entry = BasicBlock::new(BlockId(0), "entry".to_string());
        entry.terminator = terminator;
        function.blocks.push(entry);
        function
    }

    #[test]
    fn accepts_minimal_function() {
        let function = single_block(Some(Terminator::Return(Some(Value::Int {
            value: 0,
            bits: 64,
        }))));
        assert!(validate_function(&function).is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let err = validate_function(&single_block(None)).expect_err("should fail");
        assert!(err.to_string().contains("has no terminator"));
    }

    #[test]
    fn rejects_unknown_branch_target() {
        let err = validate_function(&single_block(Some(Terminator::Branch(BlockId(7)))))
            .expect_err("should fail");
        assert!(err.to_string().contains("outside the function"));
    }

    #[test]
    fn rejects_void_return_from_value_function() {
        let err = validate_function(&single_block(Some(Terminator::Return(None))))
            .expect_err("should fail");
        assert!(err.to_string().contains("does not match i64"));
    }

    #[test]
    fn rejects_store_that_does_not_fit_the_field() {
        let slot = Reg {
            id: 0,
            ty: Type::Ptr,
        };
        let field = Reg {
            id: 1,
            ty: Type::Ptr,
        };
        let mut entry = BasicBlock::new(BlockId(0), "entry".to_string());
        entry.instructions = vec![
            Instruction::Alloca {
                dest: slot.clone(),
                ty: Type::Struct("Flags".to_string()),
            },
            Instruction::FieldAddr {
                dest: field.clone(),
                struct_name: "Flags".to_string(),
                base: Value::Reg(slot),
                index: 1,
            },
            Instruction::Store {
                value: Value::Int { value: 5, bits: 64 },
                addr: Value::Reg(field),
            },
        ];
        entry.terminator = Some(Terminator::Return(None));

        let mut function = Function::new("f".to_string(), vec![], Type::Void);
        function.blocks.push(entry);
        let mut module = Module::new("m".to_string());
        module.structs.push(StructLayout::new(
            "Flags".to_string(),
            vec![
                ("a".to_string(), Type::Int(8)),
                ("c".to_string(), Type::Int(8)),
            ],
        ));
        module.functions.push(function);

        let err = validate_module(&module).expect_err("should fail");
        assert!(err.to_string().contains("store of i64 into a i8 field"));
    }

    #[test]
    fn rejects_use_before_definition() {
        let reg = Reg {
            id: 3,
            ty: Type::Int(64),
        };
        let function = single_block(Some(Terminator::Return(Some(Value::Reg(reg)))));
        let err = validate_function(&function).expect_err("should fail");
        assert!(err.to_string().contains("before it is defined"));
    }
}
