//! Runtime values.
//!
//! `Object` is the closed set of values a program can hold. The control-flow
//! carriers (early return, error) live in [`crate::interpreter::Flow`] instead
//! of being variants here, so nothing a program can observe ever wraps them.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::ast::Block;
use crate::environment::Environment;
use crate::interpreter::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Integer,
    Boolean,
    String,
    Null,
    ReturnValue,
    Error,
    Function,
    Builtin,
    List,
    Tuple,
    Map,
}

impl ObjectType {
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Integer => "INTEGER",
            ObjectType::Boolean => "BOOLEAN",
            ObjectType::String => "STRING",
            ObjectType::Null => "NULL",
            ObjectType::ReturnValue => "RETURN_VALUE",
            ObjectType::Error => "ERROR",
            ObjectType::Function => "FUNCTION",
            ObjectType::Builtin => "BUILTIN",
            ObjectType::List => "LIST",
            ObjectType::Tuple => "TUPLE",
            ObjectType::Map => "MAP",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    String(String),
    Null,
    List(Rc<Vec<Object>>),
    Tuple(Rc<Vec<Object>>),
    Map(Rc<BTreeMap<MapKey, MapPair>>),
    Function(Rc<Function>),
    Builtin(Builtin),
}

/// Hashable projection of a `Boolean`, `Integer` or `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapKey {
    pub kind: ObjectType,
    pub hash: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapPair {
    pub key: Object,
    pub value: Object,
}

pub struct Function {
    pub params: Vec<String>,
    pub body: Rc<Block>,
    pub env: Rc<Environment>,
}

/// Native function signature. Builtins get the already-evaluated arguments
/// and the interpreter's output stream.
pub type BuiltinFn = fn(&mut dyn Write, Vec<Object>) -> Result<Object, Flow>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn call(&self, out: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
        (self.func)(out, args)
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

impl Object {
    pub fn kind(&self) -> ObjectType {
        match self {
            Object::Integer(_) => ObjectType::Integer,
            Object::Boolean(_) => ObjectType::Boolean,
            Object::String(_) => ObjectType::String,
            Object::Null => ObjectType::Null,
            Object::List(_) => ObjectType::List,
            Object::Tuple(_) => ObjectType::Tuple,
            Object::Map(_) => ObjectType::Map,
            Object::Function(_) => ObjectType::Function,
            Object::Builtin(_) => ObjectType::Builtin,
        }
    }

    pub fn list(elements: Vec<Object>) -> Self {
        Object::List(Rc::new(elements))
    }

    pub fn tuple(elements: Vec<Object>) -> Self {
        Object::Tuple(Rc::new(elements))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Object::String(s.into())
    }

    /// `None` for variants that cannot key a map.
    pub fn map_key(&self) -> Option<MapKey> {
        let hash = match self {
            Object::Boolean(b) => u64::from(*b),
            Object::Integer(n) => *n as u64,
            Object::String(s) => fnv1a(s.as_bytes()),
            _ => return None,
        };
        Some(MapKey {
            kind: self.kind(),
            hash,
        })
    }

    /// Only `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::List(a), Object::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object::Tuple(a), Object::Tuple(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object::Map(a), Object::Map(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => a.name == b.name,
            _ => false,
        }
    }
}

fn join(elements: &[Object]) -> String {
    elements
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::String(s) => f.write_str(s),
            Object::Null => f.write_str("null"),
            Object::List(elements) => write!(f, "[{}]", join(elements)),
            Object::Tuple(elements) => write!(f, "({})", join(elements)),
            Object::Map(pairs) => {
                let pairs = pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key, pair.value))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Object::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.params.join(", "), func.body)
            }
            Object::Builtin(_) => f.write_str("builtin function"),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::String(s) => write!(f, "{:?}", s),
            Object::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, Expression, Statement};
    use pretty_assertions::assert_eq;

    fn map_of(pairs: Vec<(Object, Object)>) -> Object {
        let mut map = BTreeMap::new();
        for (key, value) in pairs {
            let hashed = key.map_key().expect("test keys are hashable");
            map.insert(hashed, MapPair { key, value });
        }
        Object::Map(Rc::new(map))
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn map_keys_by_variant() {
        assert_eq!(
            Object::Boolean(true).map_key(),
            Some(MapKey {
                kind: ObjectType::Boolean,
                hash: 1
            })
        );
        assert_eq!(
            Object::Integer(-1).map_key().map(|k| k.hash),
            Some(u64::MAX)
        );
        assert_eq!(
            Object::string("hello").map_key(),
            Object::string("hello").map_key()
        );
        assert_ne!(Object::Integer(1).map_key(), Object::Boolean(true).map_key());
        assert_eq!(Object::list(vec![]).map_key(), None);
        assert_eq!(Object::Null.map_key(), None);
    }

    #[test]
    fn truthiness() {
        assert!(Object::Integer(0).is_truthy());
        assert!(Object::string("").is_truthy());
        assert!(Object::list(vec![]).is_truthy());
        assert!(Object::Boolean(true).is_truthy());
        assert!(!Object::Boolean(false).is_truthy());
        assert!(!Object::Null.is_truthy());
    }

    #[test]
    fn rendering() {
        let list = Object::list(vec![Object::Integer(1), Object::string("two"), Object::Null]);
        assert_eq!(list.to_string(), "[1, two, null]");
        let tuple = Object::tuple(vec![Object::Boolean(false), list]);
        assert_eq!(tuple.to_string(), "(false, [1, two, null])");
        let map = map_of(vec![(Object::string("k"), Object::Integer(7))]);
        assert_eq!(map.to_string(), "{k: 7}");
        assert_eq!(Object::tuple(vec![]).to_string(), "()");
    }

    #[test]
    fn function_renders_parameters_and_body() {
        let body = Block {
            statements: vec![Statement::Return(Some(Expression::Binary {
                left: Box::new(Expression::Identifier("a".to_string())),
                op: BinaryOperator::Add,
                right: Box::new(Expression::Identifier("b".to_string())),
            }))],
        };
        let func = Object::Function(Rc::new(Function {
            params: vec!["a".to_string(), "b".to_string()],
            body: Rc::new(body),
            env: Environment::new(None),
        }));
        assert_eq!(func.to_string(), "fn(a, b) {\nreturn (a + b)\n}");
        assert_eq!(func.kind(), ObjectType::Function);
    }

    #[test]
    fn structural_equality_for_composites() {
        let a = Object::list(vec![Object::Integer(1), Object::string("x")]);
        let b = Object::list(vec![Object::Integer(1), Object::string("x")]);
        assert_eq!(a, b);
        assert_ne!(a, Object::tuple(vec![Object::Integer(1), Object::string("x")]));
        assert_eq!(
            map_of(vec![(Object::Integer(1), Object::Boolean(true))]),
            map_of(vec![(Object::Integer(1), Object::Boolean(true))])
        );
        assert_ne!(Object::Integer(1), Object::Boolean(true));
    }

    #[test]
    fn type_tags_render_upper_case() {
        assert_eq!(ObjectType::ReturnValue.to_string(), "RETURN_VALUE");
        assert_eq!(Object::Null.kind().to_string(), "NULL");
    }
}
