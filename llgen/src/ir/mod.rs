//! Intermediate representation for llang
//!
//! A typed, register-based IR organised as functions of basic blocks.
//! Memory is explicit: locals live in stack slots created by `alloca`
//! and are reached through `load`, `store` and address computations.

pub mod builder;
pub mod layout;
pub mod printer;
pub mod validate;

pub use layout::StructLayout;

/// A compiled module
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Struct layouts in declaration order
    pub structs: Vec<StructLayout>,
    /// Global string constants
    pub globals: Vec<Global>,
    /// Declared and defined functions
    pub functions: Vec<Function>,
}

/// A nul-terminated global string
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Symbol name
    pub name: String,
    /// Contents, without the trailing nul
    pub value: String,
}

/// A function declaration or definition
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Parameters
    pub params: Vec<Parameter>,
    /// Return type
    pub return_type: Type,
    /// Basic blocks in layout order; the first one is the entry block
    pub blocks: Vec<BasicBlock>,
    /// True for externally defined functions, which have no blocks
    pub is_declaration: bool,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: Type,
}

/// Identifier of a basic block within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// A basic block (straight-line code with no branches except at the end)
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block id
    pub id: BlockId,
    /// Block label
    pub label: String,
    /// Instructions in this block
    pub instructions: Vec<Instruction>,
    /// Block terminator, once one has been emitted
    pub terminator: Option<Terminator>,
}

/// A virtual register
#[derive(Debug, Clone, PartialEq)]
pub struct Reg {
    /// Function-unique register number
    pub id: usize,
    /// Type of the value held
    pub ty: Type,
}

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserve a stack slot for one value of `ty`; `dest` holds its address
    Alloca {
        /// Address of the slot
        dest: Reg,
        /// Type stored in the slot
        ty: Type,
    },
    /// Read a value of `ty` from memory
    Load {
        /// Loaded value
        dest: Reg,
        /// Type read
        ty: Type,
        /// Address read from
        addr: Value,
    },
    /// Write a value to memory
    Store {
        /// Value written
        value: Value,
        /// Address written to
        addr: Value,
    },
    /// Address of field `index` of the struct at `base`
    FieldAddr {
        /// Field address
        dest: Reg,
        /// Struct whose layout gives the offset
        struct_name: String,
        /// Address of the struct
        base: Value,
        /// Field position
        index: u32,
    },
    /// Address of element `index` of an array of `elem_ty` starting at `base`
    ElementAddr {
        /// Element address
        dest: Reg,
        /// Element type
        elem_ty: Type,
        /// Address of element zero
        base: Value,
        /// Signed element index
        index: Value,
    },
    /// Arithmetic operation
    Binary {
        /// Result
        dest: Reg,
        /// Operation
        op: BinOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Integer negation
    Neg {
        /// Result
        dest: Reg,
        /// Negated value
        operand: Value,
    },
    /// Floating-point negation
    FNeg {
        /// Result
        dest: Reg,
        /// Negated value
        operand: Value,
    },
    /// Signed integer comparison, producing an `i1`
    ICmp {
        /// Result
        dest: Reg,
        /// Comparison
        pred: IntPredicate,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Unordered floating-point comparison, producing an `i1`
    FCmp {
        /// Result
        dest: Reg,
        /// Comparison
        pred: FloatPredicate,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Direct function call
    Call {
        /// Result, absent for void callees
        dest: Option<Reg>,
        /// Called function
        callee: String,
        /// Arguments in parameter order
        args: Vec<Value>,
    },
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Return from function
    Return(Option<Value>),
    /// Unconditional branch
    Branch(BlockId),
    /// Conditional branch on an `i1`
    CondBranch {
        /// Branch condition
        cond: Value,
        /// Target when the condition is 1
        then_block: BlockId,
        /// Target when the condition is 0
        else_block: BlockId,
    },
    /// Control never reaches the end of this block
    Unreachable,
}

/// Arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Integer addition
    Add,
    /// Integer subtraction
    Sub,
    /// Integer multiplication
    Mul,
    /// Signed integer division
    SDiv,
    /// Float addition
    FAdd,
    /// Float subtraction
    FSub,
    /// Float multiplication
    FMul,
    /// Float division
    FDiv,
}

/// Signed integer comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Slt,
    /// Signed greater than
    Sgt,
    /// Signed less than or equal
    Sle,
    /// Signed greater than or equal
    Sge,
}

/// Unordered floating-point comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    /// Unordered or equal
    Ueq,
    /// Unordered or less than
    Ult,
    /// Unordered or greater than
    Ugt,
    /// Unordered or less than or equal
    Ule,
    /// Unordered or greater than or equal
    Uge,
}

/// IR value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of an earlier instruction
    Reg(Reg),
    /// Integer constant of the given bit width
    Int {
        /// Constant value
        value: i64,
        /// Bit width
        bits: u8,
    },
    /// Float constant of the given bit width
    Float {
        /// Constant value
        value: f64,
        /// Bit width
        bits: u8,
    },
    /// Incoming function argument
    Arg {
        /// Parameter position
        index: usize,
        /// Parameter type
        ty: Type,
    },
    /// Address of a global string
    Global(String),
}

/// IR type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Void (no value)
    Void,
    /// Integer of the given bit width
    Int(u8),
    /// Float of the given bit width
    Float(u8),
    /// Opaque pointer
    Ptr,
    /// Named struct, laid out by the module's `StructLayout`
    Struct(String),
}

impl Type {
    /// Lowers a source-level type. Pointers become opaque.
    pub fn from_ast(ty: &llang::types::Type) -> Self {
        use llang::types::Type as Ast;
        match ty {
            Ast::Ptr(_) => Type::Ptr,
            Ast::Int(bits) => Type::Int(*bits),
            Ast::Float(bits) => Type::Float(*bits),
            Ast::Struct(name) => Type::Struct(name.clone()),
            Ast::Void => Type::Void,
        }
    }

    /// Whether this is a floating-point type
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }
}

impl Value {
    /// Type of the value
    pub fn ty(&self) -> Type {
        match self {
            Value::Reg(reg) => reg.ty.clone(),
            Value::Int { bits, .. } => Type::Int(*bits),
            Value::Float { bits, .. } => Type::Float(*bits),
            Value::Arg { ty, .. } => ty.clone(),
            Value::Global(_) => Type::Ptr,
        }
    }
}

impl Instruction {
    /// Register defined by this instruction, if any
    pub fn dest(&self) -> Option<&Reg> {
        match self {
            Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::FieldAddr { dest, .. }
            | Instruction::ElementAddr { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Neg { dest, .. }
            | Instruction::FNeg { dest, .. }
            | Instruction::ICmp { dest, .. }
            | Instruction::FCmp { dest, .. } => Some(dest),
            Instruction::Call { dest, .. } => dest.as_ref(),
            Instruction::Store { .. } => None,
        }
    }

    /// Values read by this instruction
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Alloca { .. } => Vec::new(),
            Instruction::Load { addr, .. } => vec![addr],
            Instruction::Store { value, addr } => vec![value, addr],
            Instruction::FieldAddr { base, .. } => vec![base],
            Instruction::ElementAddr { base, index, .. } => vec![base, index],
            Instruction::Binary { lhs, rhs, .. }
            | Instruction::ICmp { lhs, rhs, .. }
            | Instruction::FCmp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Neg { operand, .. } | Instruction::FNeg { operand, .. } => vec![operand],
            Instruction::Call { args, .. } => args.iter().collect(),
        }
    }
}

impl Terminator {
    /// Blocks this terminator may transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

impl Module {
    /// Create a new empty module
    pub fn new(name: String) -> Self {
        Self {
            name,
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// Look up a struct layout by name
    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.iter().find(|layout| layout.name == name)
    }
}

impl Function {
    /// Create a function with no blocks yet
    pub fn new(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            name,
            params,
            return_type,
            blocks: Vec::new(),
            is_declaration: false,
        }
    }

    /// Create an external declaration
    pub fn declaration(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            is_declaration: true,
            ..Self::new(name, params, return_type)
        }
    }

    /// Look up a block by id
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|block| block.id == id)
    }
}

impl BasicBlock {
    /// Create a new empty basic block
    pub fn new(id: BlockId, label: String) -> Self {
        Self {
            id,
            label,
            instructions: Vec::new(),
            terminator: None,
        }
    }
}
