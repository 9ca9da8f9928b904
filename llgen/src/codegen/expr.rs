//! Expression lowering

use llang::parser::ast::{BinaryOp, Expr, ExprKind, FieldInit, UnaryOp};
use llang::types::Type as AstType;

use super::lowering::FunctionLowering;
use super::{EvalContext, InternalError};
use crate::ir::*;
use crate::CompileError;

/// A lowered value together with its source type.
///
/// The IR only has opaque pointers, so the source type is what tells a later
/// dereference or field access what it points at.
#[derive(Debug, Clone)]
pub(super) struct Typed {
    pub(super) value: Value,
    pub(super) ty: AstType,
}

impl Typed {
    fn new(value: Value, ty: AstType) -> Self {
        Self { value, ty }
    }
}

impl FunctionLowering<'_, '_> {
    /// Lowers an expression that must produce a value.
    pub(super) fn lower_value(
        &mut self,
        expr: &Expr,
        ctx: EvalContext,
    ) -> Result<Typed, CompileError> {
        match self.lower_expr(expr, ctx)? {
            Some(typed) => Ok(typed),
            None => Err(InternalError::VoidValue(describe(expr)).into()),
        }
    }

    /// Lowers an expression. `None` is the result of a void call.
    pub(super) fn lower_expr(
        &mut self,
        expr: &Expr,
        ctx: EvalContext,
    ) -> Result<Option<Typed>, CompileError> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(Some(Typed::new(
                Value::Int {
                    value: *value,
                    bits: 64,
                },
                AstType::Int(64),
            ))),
            ExprKind::Float(value) => Ok(Some(Typed::new(
                Value::Float {
                    value: *value,
                    bits: 64,
                },
                AstType::Float(64),
            ))),
            ExprKind::String(text) => {
                let global = self.module.intern_string(text);
                Ok(Some(Typed::new(
                    global,
                    AstType::pointer_to(AstType::Int(8)),
                )))
            }
            ExprKind::Variable(name) => {
                let (slot, ty) = self
                    .symbols
                    .get(name)
                    .cloned()
                    .ok_or_else(|| InternalError::UnknownVariable(name.clone()))?;
                self.access(slot, ty, ctx)
            }
            ExprKind::Assign { target, value } => {
                let value = self.lower_value(value, EvalContext::RVALUE)?;
                let addr = self.lower_address(target)?;
                self.builder.build_store(value.value.clone(), addr.value);
                Ok(Some(value))
            }
            ExprKind::Binary { lhs, op, rhs } => self.lower_binary(*op, lhs, rhs).map(Some),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, ctx).map(Some),
            ExprKind::Call { callee, args, .. } => self.lower_call(callee, args),
            ExprKind::Dot { lhs, field } => {
                let base = self.lower_address(lhs)?;
                let struct_name = match base.ty.struct_name() {
                    Some(name) => name.to_string(),
                    None => {
                        return Err(InternalError::UnsupportedOperand {
                            op: ".",
                            ty: base.ty.to_string(),
                        }
                        .into())
                    }
                };
                let (index, field_ty) = self.field(&struct_name, field)?;
                let addr = self.builder.build_field_addr(&struct_name, base.value, index);
                self.access(addr, field_ty, ctx)
            }
            ExprKind::ArrayAccess { target, index } => {
                let base = self.lower_value(target, EvalContext::RVALUE)?;
                let elem = pointee(&base.ty, "[]")?;
                let index = self.lower_value(index, EvalContext::RVALUE)?;
                let addr =
                    self.builder
                        .build_element_addr(Type::from_ast(&elem), base.value, index.value);
                self.access(addr, elem, ctx)
            }
            ExprKind::StructLiteral { name, fields } => self.lower_struct_literal(name, fields, ctx),
        }
    }

    /// Address of an expression's storage. Values without storage are spilled
    /// to a fresh stack slot first.
    pub(super) fn lower_address(&mut self, expr: &Expr) -> Result<Typed, CompileError> {
        if is_addressable(expr) {
            return self.lower_value(expr, EvalContext::LVALUE);
        }
        let value = self.lower_value(expr, EvalContext::RVALUE)?;
        let slot = self.builder.build_entry_alloca(Type::from_ast(&value.ty));
        self.builder.build_store(value.value, slot.clone());
        Ok(Typed::new(slot, value.ty))
    }

    // Either hand back the address or load through it.
    fn access(
        &mut self,
        addr: Value,
        ty: AstType,
        ctx: EvalContext,
    ) -> Result<Option<Typed>, CompileError> {
        if ctx.as_lvalue {
            return Ok(Some(Typed::new(addr, ty)));
        }
        let value = self.builder.build_load(Type::from_ast(&ty), addr);
        Ok(Some(Typed::new(value, ty)))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        ctx: EvalContext,
    ) -> Result<Typed, CompileError> {
        match op {
            UnaryOp::Ref => {
                let addr = self.lower_address(operand)?;
                Ok(Typed::new(addr.value, AstType::pointer_to(addr.ty)))
            }
            UnaryOp::Deref => {
                let ptr = self.lower_value(operand, EvalContext::RVALUE)?;
                let elem = pointee(&ptr.ty, "*")?;
                match self.access(ptr.value, elem, ctx)? {
                    Some(typed) => Ok(typed),
                    None => Err(InternalError::VoidValue(describe(operand)).into()),
                }
            }
            UnaryOp::Neg => {
                let value = self.lower_value(operand, EvalContext::RVALUE)?;
                let negated = match value.value.ty() {
                    Type::Float(_) => self.builder.build_fneg(value.value),
                    Type::Int(_) => self.builder.build_neg(value.value),
                    _ => {
                        return Err(InternalError::UnsupportedOperand {
                            op: "-",
                            ty: value.ty.to_string(),
                        }
                        .into())
                    }
                };
                Ok(Typed::new(negated, value.ty))
            }
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Typed, CompileError> {
        let lhs = self.lower_value(lhs, EvalContext::RVALUE)?;
        let rhs = self.lower_value(rhs, EvalContext::RVALUE)?;

        // Dispatch on the representation the operands actually have.
        let value = match lhs.value.ty() {
            Type::Float(_) => match float_predicate(op) {
                Some(pred) => self.builder.build_fcmp(pred, lhs.value, rhs.value),
                None => {
                    let op = match op {
                        BinaryOp::Add => BinOp::FAdd,
                        BinaryOp::Sub => BinOp::FSub,
                        BinaryOp::Mul => BinOp::FMul,
                        _ => BinOp::FDiv,
                    };
                    self.builder.build_binary(op, lhs.value, rhs.value)
                }
            },
            Type::Int(_) => match int_predicate(op) {
                Some(pred) => self.builder.build_icmp(pred, lhs.value, rhs.value),
                None => {
                    let op = match op {
                        BinaryOp::Add => BinOp::Add,
                        BinaryOp::Sub => BinOp::Sub,
                        BinaryOp::Mul => BinOp::Mul,
                        _ => BinOp::SDiv,
                    };
                    self.builder.build_binary(op, lhs.value, rhs.value)
                }
            },
            Type::Ptr if op.is_comparison() => {
                let pred = int_predicate(op).unwrap_or(IntPredicate::Eq);
                self.builder.build_icmp(pred, lhs.value, rhs.value)
            }
            _ => {
                return Err(InternalError::UnsupportedOperand {
                    op: symbol(op),
                    ty: lhs.ty.to_string(),
                }
                .into())
            }
        };

        let ty = if op.is_comparison() { AstType::BOOL } else { lhs.ty };
        Ok(Typed::new(value, ty))
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<Option<Typed>, CompileError> {
        let return_type = match self.tables.funcs.get(callee) {
            Some(proto) if self.module.function(callee).is_some() => proto.return_type.clone(),
            _ => return Err(InternalError::UnknownFunction(callee.to_string()).into()),
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_value(arg, EvalContext::RVALUE)?.value);
        }

        let result = self
            .builder
            .build_call(callee, values, Type::from_ast(&return_type));
        Ok(result.map(|value| Typed::new(value, return_type)))
    }

    fn lower_struct_literal(
        &mut self,
        name: &str,
        fields: &[FieldInit],
        ctx: EvalContext,
    ) -> Result<Option<Typed>, CompileError> {
        let ty = AstType::Struct(name.to_string());
        let slot = self.builder.build_entry_alloca(Type::from_ast(&ty));

        for init in fields {
            let (index, _) = self.field(name, &init.name)?;
            let value = self.lower_value(&init.value, EvalContext::RVALUE)?;
            let expected = self
                .module
                .struct_layout(name)
                .and_then(|layout| layout.field_type(index))
                .cloned()
                .ok_or_else(|| InternalError::UnknownStruct(name.to_string()))?;
            let found = value.value.ty();
            if found != expected {
                return Err(InternalError::FieldTypeMismatch {
                    structure: name.to_string(),
                    field: init.name.clone(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                }
                .into());
            }
            let addr = self.builder.build_field_addr(name, slot.clone(), index);
            self.builder.build_store(value.value, addr);
        }

        self.access(slot, ty, ctx)
    }

    /// Field index from the registered layout, plus the field's source type.
    fn field(&self, struct_name: &str, field: &str) -> Result<(u32, AstType), CompileError> {
        let unknown_field = || InternalError::UnknownField {
            structure: struct_name.to_string(),
            field: field.to_string(),
        };

        let layout = self
            .module
            .struct_layout(struct_name)
            .ok_or_else(|| InternalError::UnknownStruct(struct_name.to_string()))?;
        let index = layout.field_index(field).ok_or_else(unknown_field)?;

        let proto = self
            .tables
            .structures
            .get(struct_name)
            .ok_or_else(|| InternalError::UnknownStruct(struct_name.to_string()))?;
        let (_, decl) = proto.field(field).ok_or_else(unknown_field)?;
        Ok((index, decl.ty.clone()))
    }
}

fn pointee(ty: &AstType, op: &'static str) -> Result<AstType, CompileError> {
    ty.pointee().cloned().ok_or_else(|| {
        InternalError::UnsupportedOperand {
            op,
            ty: ty.to_string(),
        }
        .into()
    })
}

fn is_addressable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::Dot { .. }
            | ExprKind::ArrayAccess { .. }
            | ExprKind::StructLiteral { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            }
    )
}

fn int_predicate(op: BinaryOp) -> Option<IntPredicate> {
    match op {
        BinaryOp::Eq => Some(IntPredicate::Eq),
        BinaryOp::Lt => Some(IntPredicate::Slt),
        BinaryOp::Gt => Some(IntPredicate::Sgt),
        BinaryOp::Le => Some(IntPredicate::Sle),
        BinaryOp::Ge => Some(IntPredicate::Sge),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => None,
    }
}

fn float_predicate(op: BinaryOp) -> Option<FloatPredicate> {
    match op {
        BinaryOp::Eq => Some(FloatPredicate::Ueq),
        BinaryOp::Lt => Some(FloatPredicate::Ult),
        BinaryOp::Gt => Some(FloatPredicate::Ugt),
        BinaryOp::Le => Some(FloatPredicate::Ule),
        BinaryOp::Ge => Some(FloatPredicate::Uge),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => None,
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Eq => "==",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
    }
}

fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Call { callee, .. } => callee.clone(),
        _ => "expression".to_string(),
    }
}
