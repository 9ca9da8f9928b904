//! IR builder utilities
//!
//! `FunctionBuilder` keeps blocks in an arena and separately tracks which of
//! them are attached to the function, so a block can be created (and used as
//! a branch target) before it is placed.

use rustc_hash::FxHashMap;

use super::*;

/// IR builder for constructing modules
pub struct ModuleBuilder {
    module: Module,
    strings: FxHashMap<String, String>,
}

impl ModuleBuilder {
    /// Create a new module builder
    pub fn new(name: String) -> Self {
        Self {
            module: Module::new(name),
            strings: FxHashMap::default(),
        }
    }

    /// Register a struct layout, replacing any earlier one with the same name
    pub fn add_struct(&mut self, layout: StructLayout) {
        match self
            .module
            .structs
            .iter_mut()
            .find(|existing| existing.name == layout.name)
        {
            Some(existing) => *existing = layout,
            None => self.module.structs.push(layout),
        }
    }

    /// Look up a registered struct layout
    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.module.struct_layout(name)
    }

    /// Declare a function unless one with the same name already exists
    pub fn declare_function(&mut self, name: &str, params: Vec<Parameter>, return_type: Type) {
        if self.module.function(name).is_none() {
            self.module.functions.push(Function::declaration(
                name.to_string(),
                params,
                return_type,
            ));
        }
    }

    /// Add a function, replacing a prior declaration of the same name
    pub fn add_function(&mut self, func: Function) {
        match self
            .module
            .functions
            .iter_mut()
            .find(|existing| existing.name == func.name)
        {
            Some(existing) => *existing = func,
            None => self.module.functions.push(func),
        }
    }

    /// Look up a declared or defined function
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.module.function(name)
    }

    /// Intern a string constant, returning the address of its global
    pub fn intern_string(&mut self, text: &str) -> Value {
        if let Some(name) = self.strings.get(text) {
            return Value::Global(name.clone());
        }
        let name = format!(".str.{}", self.module.globals.len());
        self.module.globals.push(Global {
            name: name.clone(),
            value: text.to_string(),
        });
        self.strings.insert(text.to_string(), name.clone());
        Value::Global(name)
    }

    /// Finish building and return the module
    pub fn build(self) -> Module {
        self.module
    }
}

/// IR builder for constructing functions
pub struct FunctionBuilder {
    function: Function,
    arena: Vec<BasicBlock>,
    attached: Vec<BlockId>,
    current_block: Option<BlockId>,
    next_reg: usize,
    entry_allocas: usize,
}

impl FunctionBuilder {
    /// Create a new function builder
    pub fn new(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            function: Function::new(name, params, return_type),
            arena: Vec::new(),
            attached: Vec::new(),
            current_block: None,
            next_reg: 0,
            entry_allocas: 0,
        }
    }

    /// Function parameters
    pub fn params(&self) -> &[Parameter] {
        &self.function.params
    }

    /// Declared return type
    pub fn return_type(&self) -> &Type {
        &self.function.return_type
    }

    /// Create a new basic block that is not yet part of the function
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.arena.len());
        let label = if self.arena.iter().any(|block| block.label == label) {
            format!("{}{}", label, id.0)
        } else {
            label.to_string()
        };
        self.arena.push(BasicBlock::new(id, label));
        id
    }

    /// Place a block at the end of the function
    pub fn append_block(&mut self, block_id: BlockId) {
        if !self.attached.contains(&block_id) {
            self.attached.push(block_id);
        }
    }

    /// Create a block and immediately place it
    pub fn create_attached_block(&mut self, label: &str) -> BlockId {
        let id = self.create_block(label);
        self.append_block(id);
        id
    }

    /// Switch to a block
    pub fn switch_to_block(&mut self, block_id: BlockId) {
        self.current_block = Some(block_id);
    }

    /// Block receiving new instructions
    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    /// Whether the current block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        self.current_block
            .and_then(|id| self.arena.get(id.0))
            .is_some_and(|block| block.terminator.is_some())
    }

    /// Labels of the attached blocks, in layout order
    pub fn block_labels(&self) -> Vec<&str> {
        self.attached
            .iter()
            .filter_map(|id| self.arena.get(id.0))
            .map(|block| block.label.as_str())
            .collect()
    }

    fn new_reg(&mut self, ty: Type) -> Reg {
        let reg = Reg {
            id: self.next_reg,
            ty,
        };
        self.next_reg += 1;
        reg
    }

    // Code after a terminator (e.g. statements following `return`) has no
    // predecessor; it gets its own block so every block keeps one terminator.
    fn ensure_open_block(&mut self) -> BlockId {
        match self.current_block {
            Some(id) if !self.is_terminated() => id,
            _ => {
                let id = self.create_attached_block("dead");
                self.current_block = Some(id);
                id
            }
        }
    }

    /// Add an instruction to the current block
    pub fn add_instruction(&mut self, inst: Instruction) {
        let id = self.ensure_open_block();
        self.arena[id.0].instructions.push(inst);
    }

    /// Set the terminator for the current block
    pub fn set_terminator(&mut self, term: Terminator) {
        let id = self.ensure_open_block();
        self.arena[id.0].terminator = Some(term);
    }

    /// Allocate a stack slot in the entry block, ahead of all other code,
    /// so the slot dominates every use wherever the request came from
    pub fn build_entry_alloca(&mut self, ty: Type) -> Value {
        let dest = self.new_reg(Type::Ptr);
        let inst = Instruction::Alloca {
            dest: dest.clone(),
            ty,
        };
        match self.attached.first().copied() {
            Some(entry) => {
                let position = self.entry_allocas;
                self.arena[entry.0].instructions.insert(position, inst);
                self.entry_allocas += 1;
            }
            None => self.add_instruction(inst),
        }
        Value::Reg(dest)
    }

    /// Load a value of `ty` from `addr`
    pub fn build_load(&mut self, ty: Type, addr: Value) -> Value {
        let dest = self.new_reg(ty.clone());
        self.add_instruction(Instruction::Load {
            dest: dest.clone(),
            ty,
            addr,
        });
        Value::Reg(dest)
    }

    /// Store `value` to `addr`
    pub fn build_store(&mut self, value: Value, addr: Value) {
        self.add_instruction(Instruction::Store { value, addr });
    }

    /// Address of a struct field
    pub fn build_field_addr(&mut self, struct_name: &str, base: Value, index: u32) -> Value {
        let dest = self.new_reg(Type::Ptr);
        self.add_instruction(Instruction::FieldAddr {
            dest: dest.clone(),
            struct_name: struct_name.to_string(),
            base,
            index,
        });
        Value::Reg(dest)
    }

    /// Address of an array element
    pub fn build_element_addr(&mut self, elem_ty: Type, base: Value, index: Value) -> Value {
        let dest = self.new_reg(Type::Ptr);
        self.add_instruction(Instruction::ElementAddr {
            dest: dest.clone(),
            elem_ty,
            base,
            index,
        });
        Value::Reg(dest)
    }

    /// Arithmetic; the result has the type of `lhs`
    pub fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let dest = self.new_reg(lhs.ty());
        self.add_instruction(Instruction::Binary {
            dest: dest.clone(),
            op,
            lhs,
            rhs,
        });
        Value::Reg(dest)
    }

    /// Integer negation
    pub fn build_neg(&mut self, operand: Value) -> Value {
        let dest = self.new_reg(operand.ty());
        self.add_instruction(Instruction::Neg {
            dest: dest.clone(),
            operand,
        });
        Value::Reg(dest)
    }

    /// Floating-point negation
    pub fn build_fneg(&mut self, operand: Value) -> Value {
        let dest = self.new_reg(operand.ty());
        self.add_instruction(Instruction::FNeg {
            dest: dest.clone(),
            operand,
        });
        Value::Reg(dest)
    }

    /// Integer comparison producing an `i1`
    pub fn build_icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        let dest = self.new_reg(Type::Int(1));
        self.add_instruction(Instruction::ICmp {
            dest: dest.clone(),
            pred,
            lhs,
            rhs,
        });
        Value::Reg(dest)
    }

    /// Float comparison producing an `i1`
    pub fn build_fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        let dest = self.new_reg(Type::Int(1));
        self.add_instruction(Instruction::FCmp {
            dest: dest.clone(),
            pred,
            lhs,
            rhs,
        });
        Value::Reg(dest)
    }

    /// Direct call; returns `None` for void callees
    pub fn build_call(&mut self, callee: &str, args: Vec<Value>, return_type: Type) -> Option<Value> {
        let dest = (return_type != Type::Void).then(|| self.new_reg(return_type));
        self.add_instruction(Instruction::Call {
            dest: dest.clone(),
            callee: callee.to_string(),
            args,
        });
        dest.map(Value::Reg)
    }

    /// Unconditional branch
    pub fn build_br(&mut self, target: BlockId) {
        self.set_terminator(Terminator::Branch(target));
    }

    /// Conditional branch
    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.set_terminator(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Return, with or without a value
    pub fn build_ret(&mut self, value: Option<Value>) {
        self.set_terminator(Terminator::Return(value));
    }

    /// Mark the end of the current block as unreachable
    pub fn build_unreachable(&mut self) {
        self.set_terminator(Terminator::Unreachable);
    }

    /// Finish building and return the function with its attached blocks
    pub fn build(self) -> Function {
        let mut arena = self.arena.into_iter().map(Some).collect::<Vec<_>>();
        let mut function = self.function;
        function.blocks = self
            .attached
            .iter()
            .filter_map(|id| arena.get_mut(id.0).and_then(Option::take))
            .collect();
        function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocas_are_hoisted_into_entry() {
        let mut builder = FunctionBuilder::new("f".to_string(), vec![], Type::Void);
        let entry = builder.create_attached_block("entry");
        builder.switch_to_block(entry);
        let first = builder.build_entry_alloca(Type::Int(64));
        let body = builder.create_attached_block("body");
        builder.build_br(body);
        builder.switch_to_block(body);
        builder.build_store(Value::Int { value: 1, bits: 64 }, first);
        builder.build_entry_alloca(Type::Float(64));
        builder.build_ret(None);

        let function = builder.build();
        let entry = &function.blocks[0];
        assert_eq!(entry.instructions.len(), 2);
        assert!(entry
            .instructions
            .iter()
            .all(|inst| matches!(inst, Instruction::Alloca { .. })));
        assert_eq!(function.blocks[1].instructions.len(), 1);
    }

    #[test]
    fn detached_blocks_are_placed_when_appended() {
        let mut builder = FunctionBuilder::new("f".to_string(), vec![], Type::Void);
        let entry = builder.create_attached_block("entry");
        let end = builder.create_block("end");
        let middle = builder.create_attached_block("middle");
        builder.switch_to_block(entry);
        builder.build_br(middle);
        builder.switch_to_block(middle);
        builder.build_br(end);
        builder.append_block(end);
        builder.switch_to_block(end);
        builder.build_ret(None);

        assert_eq!(builder.block_labels(), vec!["entry", "middle", "end"]);
    }

    #[test]
    fn code_after_terminator_opens_new_block() {
        let mut builder = FunctionBuilder::new("f".to_string(), vec![], Type::Int(64));
        let entry = builder.create_attached_block("entry");
        builder.switch_to_block(entry);
        builder.build_ret(Some(Value::Int { value: 0, bits: 64 }));
        assert!(builder.is_terminated());
        builder.build_neg(Value::Int { value: 1, bits: 64 });
        assert!(!builder.is_terminated());

        let function = builder.build();
        assert_eq!(function.blocks.len(), 2);
        assert_eq!(function.blocks[1].label, "dead");
    }

    #[test]
    fn interned_strings_are_shared() {
        let mut module = ModuleBuilder::new("m".to_string());
        let a = module.intern_string("hi");
        let b = module.intern_string("hi");
        let c = module.intern_string("bye");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.build().globals.len(), 2);
    }
}
