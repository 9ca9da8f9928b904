use std::fmt;

/// A value type of the language.
///
/// Equality is structural, except for structs which compare by name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Ptr(Box<Type>),
    Int(u8),
    Float(u8),
    Struct(String),
    Void,
}

impl Type {
    /// The type produced by comparison operators.
    pub const BOOL: Type = Type::Int(1);

    /// Resolves a primitive type name. `str` is shorthand for `i8*`.
    pub fn from_name(name: &str) -> Option<Type> {
        let ty = match name {
            "i8" => Type::Int(8),
            "i16" => Type::Int(16),
            "i32" => Type::Int(32),
            "i64" => Type::Int(64),
            "f8" => Type::Float(8),
            "f16" => Type::Float(16),
            "f32" => Type::Float(32),
            "f64" => Type::Float(64),
            "void" => Type::Void,
            "str" => Type::pointer_to(Type::Int(8)),
            _ => return None,
        };
        Some(ty)
    }

    pub fn pointer_to(elem: Type) -> Type {
        Type::Ptr(Box::new(elem))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Type::Struct(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Ptr(elem) => write!(f, "{}*", elem),
            Type::Int(width) => write!(f, "i{}", width),
            Type::Float(width) => write!(f, "f{}", width),
            Type::Struct(name) => f.write_str(name),
            Type::Void => f.write_str("void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_equality_depends_on_width() {
        assert_eq!(Type::Int(64), Type::Int(64));
        assert_ne!(Type::Int(32), Type::Int(64));
        assert_ne!(Type::Int(64), Type::Float(64));
    }

    #[test]
    fn pointer_equality_is_recursive() {
        let a = Type::pointer_to(Type::pointer_to(Type::Int(8)));
        let b = Type::pointer_to(Type::pointer_to(Type::Int(8)));
        let c = Type::pointer_to(Type::pointer_to(Type::Int(16)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn structs_compare_by_name() {
        assert_eq!(Type::Struct("P".into()), Type::Struct("P".into()));
        assert_ne!(Type::Struct("P".into()), Type::Struct("Q".into()));
    }

    #[test]
    fn display_names() {
        assert_eq!(Type::from_name("str").map(|t| t.to_string()), Some("i8*".into()));
        assert_eq!(Type::pointer_to(Type::Struct("P".into())).to_string(), "P*");
        assert_eq!(Type::Float(32).to_string(), "f32");
        assert_eq!(Type::Void.to_string(), "void");
        assert_eq!(Type::from_name("P"), None);
    }
}
