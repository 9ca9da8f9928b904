//! Textual IR, close to LLVM assembly syntax

use super::*;
use std::fmt;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;

        for layout in &self.structs {
            let fields = layout
                .fields
                .iter()
                .map(|(_, ty)| ty.to_string())
                .collect::<Vec<_>>();
            writeln!(f, "%{} = type {{ {} }}", layout.name, fields.join(", "))?;
        }

        for global in &self.globals {
            writeln!(
                f,
                "@{} = constant c\"{}\\00\"",
                global.name,
                escape(&global.value)
            )?;
        }

        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }

        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_declaration { "declare" } else { "define" };
        write!(f, "{} {} @{}(", keyword, self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", param.ty, param.name)?;
        }
        write!(f, ")")?;

        if self.is_declaration {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
            match &block.terminator {
                Some(term) => writeln!(f, "  {}", DisplayTerm(term, self))?,
                None => writeln!(f, "  ; missing terminator")?,
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float(bits) => write!(f, "f{}", bits),
            Type::Ptr => write!(f, "ptr"),
            Type::Struct(name) => write!(f, "%{}", name),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(reg) => write!(f, "{} {}", reg.ty, reg),
            Value::Int { value, bits } => write!(f, "i{} {}", bits, value),
            Value::Float { value, bits } => write!(f, "f{} {:?}", bits, value),
            Value::Arg { index, ty } => write!(f, "{} %arg{}", ty, index),
            Value::Global(name) => write!(f, "ptr @{}", name),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        };
        f.write_str(name)
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sge => "sge",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FloatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FloatPredicate::Ueq => "ueq",
            FloatPredicate::Ult => "ult",
            FloatPredicate::Ugt => "ugt",
            FloatPredicate::Ule => "ule",
            FloatPredicate::Uge => "uge",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alloca { dest, ty } => write!(f, "{} = alloca {}", dest, ty),
            Instruction::Load { dest, ty, addr } => write!(f, "{} = load {}, {}", dest, ty, addr),
            Instruction::Store { value, addr } => write!(f, "store {}, {}", value, addr),
            Instruction::FieldAddr {
                dest,
                struct_name,
                base,
                index,
            } => write!(
                f,
                "{} = getelementptr %{}, {}, i32 0, i32 {}",
                dest, struct_name, base, index
            ),
            Instruction::ElementAddr {
                dest,
                elem_ty,
                base,
                index,
            } => write!(f, "{} = getelementptr {}, {}, {}", dest, elem_ty, base, index),
            Instruction::Binary { dest, op, lhs, rhs } => {
                write!(f, "{} = {} {}, {}", dest, op, lhs, rhs)
            }
            Instruction::Neg { dest, operand } => write!(f, "{} = neg {}", dest, operand),
            Instruction::FNeg { dest, operand } => write!(f, "{} = fneg {}", dest, operand),
            Instruction::ICmp {
                dest,
                pred,
                lhs,
                rhs,
            } => write!(f, "{} = icmp {} {}, {}", dest, pred, lhs, rhs),
            Instruction::FCmp {
                dest,
                pred,
                lhs,
                rhs,
            } => write!(f, "{} = fcmp {} {}, {}", dest, pred, lhs, rhs),
            Instruction::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                let return_type = dest.as_ref().map_or(Type::Void, |reg| reg.ty.clone());
                let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
                write!(f, "call {} @{}({})", return_type, callee, args.join(", "))
            }
        }
    }
}

struct DisplayTerm<'a>(&'a Terminator, &'a Function);

impl DisplayTerm<'_> {
    fn label(&self, id: BlockId) -> String {
        self.1
            .block(id)
            .map(|block| block.label.clone())
            .unwrap_or_else(|| format!("bb{}", id.0))
    }
}

impl fmt::Display for DisplayTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Terminator::Return(Some(value)) => write!(f, "ret {}", value),
            Terminator::Return(None) => write!(f, "ret void"),
            Terminator::Branch(target) => write!(f, "br label %{}", self.label(*target)),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                cond,
                self.label(*then_block),
                self.label(*else_block)
            ),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::new();
    for byte in text.bytes() {
        if (byte.is_ascii_graphic() || byte == b' ') && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_declarations_and_bodies() {
        let mut module = Module::new("demo".to_string());
        module.globals.push(Global {
            name: ".str.0".to_string(),
            value: "hi\n".to_string(),
        });
        module.functions.push(Function::declaration(
            "puts".to_string(),
            vec![Parameter {
                name: "s".to_string(),
                ty: Type::Ptr,
            }],
            Type::Int(32),
        ));

        let mut main = Function::new("main".to_string(), vec![], Type::Void);
        let mut entry = BasicBlock::new(BlockId(0), "entry".to_string());
        entry.instructions.push(Instruction::Call {
            dest: Some(Reg {
                id: 0,
                ty: Type::Int(32),
            }),
            callee: "puts".to_string(),
            args: vec![Value::Global(".str.0".to_string())],
        });
        entry.terminator = Some(Terminator::Return(None));
        main.blocks.push(entry);
        module.functions.push(main);

        let text = module.to_string();
        assert!(text.contains("@.str.0 = constant c\"hi\\0A\\00\""));
        assert!(text.contains("declare i32 @puts(ptr %s)"));
        assert!(text.contains("  %0 = call i32 @puts(ptr @.str.0)"));
        assert!(text.contains("  ret void"));
    }
}
