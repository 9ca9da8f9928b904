//! Type verification.
//!
//! Every check yields `Option<Type>`: `None` means a diagnostic was already
//! recorded for this node (or one of its children), and callers stay silent
//! about it so a single mistake is reported once.

pub mod scope;

use crate::diagnostics::Diagnostics;
use crate::parser::ast::{
    Block, Decl, Document, Expr, ExprKind, FunctionDecl, StructProto, Stmt, UnaryOp,
};
use crate::source::Span;
use crate::types::Type;
pub use scope::ScopeTables;

/// Checks that are stricter than the language's historical behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Report calls that pass fewer arguments than the callee declares.
    pub check_missing_arguments: bool,
    /// Type-check struct literal fields against the declaration.
    pub check_struct_literals: bool,
    /// Give every block its own scope instead of one flat scope per function.
    pub block_scoping: bool,
}

impl VerifyOptions {
    pub fn strict() -> Self {
        Self {
            check_missing_arguments: true,
            check_struct_literals: true,
            block_scoping: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub tables: ScopeTables,
    pub diagnostics: Diagnostics,
}

impl Verification {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

pub fn verify_document(document: &Document, options: VerifyOptions) -> Verification {
    let mut verifier = Verifier::new(options);
    verifier.verify_document(document);
    verifier.finish()
}

fn type_mismatch(expected: &Type, got: &Type) -> String {
    format!("unmatched types, expected {} and got {}", expected, got)
}

pub struct Verifier {
    tables: ScopeTables,
    diagnostics: Diagnostics,
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self::with_diagnostics(options, Diagnostics::new())
    }

    /// Continues an existing diagnostics stream, e.g. one a driver already
    /// wrote to.
    pub fn with_diagnostics(options: VerifyOptions, diagnostics: Diagnostics) -> Self {
        Self {
            tables: ScopeTables::new(),
            diagnostics,
            options,
        }
    }

    pub fn tables(&self) -> &ScopeTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut ScopeTables {
        &mut self.tables
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn finish(self) -> Verification {
        Verification {
            tables: self.tables,
            diagnostics: self.diagnostics,
        }
    }

    /// Registers every prototype first so bodies can call functions declared
    /// later in the file, then checks the bodies one at a time.
    pub fn verify_document(&mut self, document: &Document) {
        self.register_declarations(document);
        for item in &document.items {
            if let Decl::Function(function) = item {
                self.verify_function(function);
            }
        }
    }

    fn register_declarations(&mut self, document: &Document) {
        for item in &document.items {
            match item {
                Decl::Struct(proto) => self.tables.register_struct(proto),
                Decl::Function(function) => self.tables.register_function(&function.proto),
                Decl::Extern(decl) => self.tables.register_function(&decl.proto),
                // Only signatures cross an import; bodies are compiled on their own.
                Decl::Import(import) => {
                    if let Some(imported) = &import.document {
                        self.register_declarations(imported);
                    }
                }
            }
        }
    }

    pub fn verify_function(&mut self, function: &FunctionDecl) -> Option<Type> {
        self.tables.register_function(&function.proto);
        self.tables.enter_function(&function.proto);
        self.verify_block(&function.body);
        Some(Type::Void)
    }

    pub fn verify_block(&mut self, block: &Block) -> Option<Type> {
        if self.options.block_scoping {
            self.tables.push_scope();
        }
        let mut last = Some(Type::Void);
        for stmt in &block.stmts {
            last = self.verify_stmt(stmt);
        }
        if self.options.block_scoping {
            self.tables.pop_scope();
        }
        last
    }

    pub fn verify_stmt(&mut self, stmt: &Stmt) -> Option<Type> {
        match stmt {
            Stmt::Let { name, ty, init, .. } => {
                if let Some(init) = init {
                    if let Some(got) = self.verify_expr(init) {
                        if got != *ty {
                            self.diagnostics.error(init.span, type_mismatch(ty, &got));
                        }
                    }
                }
                self.tables.bind(name, ty.clone());
                Some(ty.clone())
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    let got = self.verify_expr(value)?;
                    if got != self.tables.ret_type {
                        let message = type_mismatch(&self.tables.ret_type, &got);
                        self.diagnostics.error(value.span, message);
                    }
                }
                Some(self.tables.ret_type.clone())
            }
            Stmt::If {
                branches,
                else_block,
                ..
            } => {
                for (cond, body) in branches {
                    self.verify_condition(cond);
                    self.verify_block(body);
                }
                if let Some(else_block) = else_block {
                    self.verify_block(else_block);
                }
                Some(Type::Void)
            }
            Stmt::While { cond, body, .. } => {
                self.verify_condition(cond);
                self.verify_block(body);
                Some(Type::Void)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                if self.options.block_scoping {
                    self.tables.push_scope();
                }
                self.verify_stmt(init);
                self.verify_condition(cond);
                self.verify_expr(step);
                self.verify_block(body);
                if self.options.block_scoping {
                    self.tables.pop_scope();
                }
                Some(Type::Void)
            }
            Stmt::Expr(expr) => self.verify_expr(expr),
        }
    }

    fn verify_condition(&mut self, cond: &Expr) {
        if let Some(ty) = self.verify_expr(cond) {
            if !ty.is_int() {
                self.diagnostics
                    .error(cond.span, format!("expected int type, got {}", ty));
            }
        }
    }

    pub fn verify_expr(&mut self, expr: &Expr) -> Option<Type> {
        match &expr.kind {
            ExprKind::Assign { target, value } => {
                let left = self.verify_expr(target)?;
                let right = self.verify_expr(value)?;
                if left != right {
                    self.diagnostics.error(expr.span, type_mismatch(&left, &right));
                }
                Some(left)
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let left = self.verify_expr(lhs)?;
                let right = self.verify_expr(rhs)?;
                if left != right {
                    self.diagnostics.error(expr.span, type_mismatch(&left, &right));
                    return None;
                }
                if op.is_comparison() {
                    Some(Type::BOOL)
                } else {
                    Some(left)
                }
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.verify_expr(operand)?;
                match op {
                    UnaryOp::Deref => match ty {
                        Type::Ptr(elem) => Some(*elem),
                        other => {
                            self.diagnostics.error(
                                operand.span,
                                format!("cannot dereference non-pointer type ({})", other),
                            );
                            None
                        }
                    },
                    UnaryOp::Ref => Some(Type::pointer_to(ty)),
                    UnaryOp::Neg => Some(ty),
                }
            }
            ExprKind::Call {
                callee,
                callee_span,
                args,
            } => self.verify_call(expr.span, callee, *callee_span, args),
            ExprKind::Variable(name) => match self.tables.lookup(name) {
                Some(ty) => Some(ty.clone()),
                None => {
                    self.diagnostics.error(expr.span, "variable name not in scope");
                    None
                }
            },
            ExprKind::Dot { lhs, field } => {
                let name = match self.verify_expr(lhs)? {
                    Type::Struct(name) => name,
                    other => {
                        self.diagnostics.error(
                            lhs.span,
                            format!("must be struct for dot operator ({})", other),
                        );
                        if other.is_ptr() {
                            self.diagnostics.note(lhs.span, "did you mean to use '->'?");
                        }
                        return None;
                    }
                };
                let proto = self.lookup_struct(&name, lhs.span)?;
                match proto.field(field) {
                    Some((_, decl)) => Some(decl.ty.clone()),
                    None => {
                        self.diagnostics.error(lhs.span, "field not found in structure");
                        None
                    }
                }
            }
            ExprKind::ArrayAccess { target, index } => {
                let target_ty = self.verify_expr(target);
                let index_ty = self.verify_expr(index);
                let (target_ty, index_ty) = (target_ty?, index_ty?);
                let elem = match target_ty {
                    Type::Ptr(elem) => Some(*elem),
                    other => {
                        self.diagnostics.error(
                            target.span,
                            format!("must be pointer to access values ({})", other),
                        );
                        None
                    }
                };
                if !index_ty.is_int() {
                    self.diagnostics
                        .error(index.span, format!("must be an integer ({})", index_ty));
                }
                elem
            }
            ExprKind::Int(_) => Some(Type::Int(64)),
            ExprKind::Float(_) => Some(Type::Float(64)),
            ExprKind::String(_) => Some(Type::pointer_to(Type::Int(8))),
            ExprKind::StructLiteral { name, fields } => {
                let proto = self.lookup_struct(name, expr.span)?;
                if self.options.check_struct_literals {
                    for init in fields {
                        let Some((_, decl)) = proto.field(&init.name) else {
                            self.diagnostics.error(init.span, "field not found in structure");
                            continue;
                        };
                        if let Some(got) = self.verify_expr(&init.value) {
                            if got != decl.ty {
                                self.diagnostics
                                    .error(init.value.span, type_mismatch(&decl.ty, &got));
                            }
                        }
                    }
                }
                Some(Type::Struct(name.clone()))
            }
        }
    }

    fn verify_call(
        &mut self,
        span: Span,
        callee: &str,
        callee_span: Span,
        args: &[Expr],
    ) -> Option<Type> {
        let Some(proto) = self.tables.funcs.get(callee).cloned() else {
            self.diagnostics.error(callee_span, "function name not in scope");
            return None;
        };

        for (position, arg) in args.iter().enumerate() {
            let Some(param) = proto.params.get(position) else {
                self.diagnostics.error(arg.span, "extra argument");
                break;
            };
            let Some(got) = self.verify_expr(arg) else {
                continue;
            };
            if got != param.ty {
                self.diagnostics.error(arg.span, type_mismatch(&param.ty, &got));
            }
        }

        if self.options.check_missing_arguments && args.len() < proto.params.len() {
            let missing = proto.params[args.len()..]
                .iter()
                .map(|param| param.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.diagnostics
                .error(span, format!("missing argument(s): {}", missing));
        }

        Some(proto.return_type)
    }

    fn lookup_struct(&mut self, name: &str, span: Span) -> Option<StructProto> {
        match self.tables.structures.get(name) {
            Some(proto) => Some(proto.clone()),
            None => {
                self.diagnostics
                    .error(span, format!("unknown structure '{}'", name));
                None
            }
        }
    }
}
