use rustc_hash::FxHashMap;

use crate::parser::ast::{ProtoFunc, StructProto};
use crate::types::Type;

/// Name tables built by the verifier and read by code generation.
#[derive(Debug, Clone)]
pub struct ScopeTables {
    pub named_values: FxHashMap<String, Type>,
    pub funcs: FxHashMap<String, ProtoFunc>,
    pub structures: FxHashMap<String, StructProto>,
    pub ret_type: Type,
    // One frame per open block when block scoping is on; each entry is the
    // binding a name had before the block shadowed it.
    frames: Vec<Vec<(String, Option<Type>)>>,
}

impl Default for ScopeTables {
    fn default() -> Self {
        Self {
            named_values: FxHashMap::default(),
            funcs: FxHashMap::default(),
            structures: FxHashMap::default(),
            ret_type: Type::Void,
            frames: Vec::new(),
        }
    }
}

impl ScopeTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(&mut self, proto: &ProtoFunc) {
        self.funcs.insert(proto.name.clone(), proto.clone());
    }

    pub fn register_struct(&mut self, proto: &StructProto) {
        self.structures.insert(proto.name.clone(), proto.clone());
    }

    /// Starts a function body: drops every local binding, binds the
    /// parameters and sets the expected return type.
    pub fn enter_function(&mut self, proto: &ProtoFunc) {
        self.named_values.clear();
        self.frames.clear();
        for param in &proto.params {
            self.named_values.insert(param.name.clone(), param.ty.clone());
        }
        self.ret_type = proto.return_type.clone();
    }

    pub fn bind(&mut self, name: &str, ty: Type) {
        let previous = self.named_values.insert(name.to_string(), ty);
        if let Some(frame) = self.frames.last_mut() {
            if !frame.iter().any(|(bound, _)| bound == name) {
                frame.push((name.to_string(), previous));
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.named_values.get(name)
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Closes the innermost block, restoring any binding it shadowed.
    pub fn pop_scope(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (name, previous) in frame.into_iter().rev() {
            match previous {
                Some(ty) => {
                    self.named_values.insert(name, ty);
                }
                None => {
                    self.named_values.remove(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_bindings_survive_without_frames() {
        let mut tables = ScopeTables::new();
        tables.bind("x", Type::Int(64));
        tables.bind("x", Type::Float(64));
        assert_eq!(tables.lookup("x"), Some(&Type::Float(64)));
    }

    #[test]
    fn pop_scope_restores_shadowed_binding() {
        let mut tables = ScopeTables::new();
        tables.bind("x", Type::Int(64));
        tables.push_scope();
        tables.bind("x", Type::Float(64));
        tables.bind("y", Type::Int(8));
        tables.bind("x", Type::Int(32));
        tables.pop_scope();
        assert_eq!(tables.lookup("x"), Some(&Type::Int(64)));
        assert_eq!(tables.lookup("y"), None);
    }
}
