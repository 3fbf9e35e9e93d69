/// C言語風の型文字列 → 簡略化された中間型表現
///
/// 符号・const修飾は保持しない（既知の制限）

pub mod converter;

pub use converter::{NoDefinitions, TypeConverter, TypeDefinitionLookup, TypeParseError, MAX_EXPANDED_NODES, MAX_NESTING};

use serde::Serialize;
use std::fmt;

/// 簡略化された型記述子
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    /// 正規化済みのプリミティブ名（i8, i32, float ...）
    Primitive { name: String },
    /// ポインタ（depth >= 1）
    Pointer { inner: Box<TypeDescriptor>, depth: usize },
    /// 無名構造体（メンバーは宣言順）
    Struct { members: Vec<TypeDescriptor> },
    /// 不明（voidとして扱う）
    Unknown,
}

impl TypeDescriptor {
    pub fn primitive(name: impl Into<String>) -> Self {
        TypeDescriptor::Primitive { name: name.into() }
    }

    /// ポインタで包む。既にポインタなら深さを加算する
    pub fn pointer(inner: TypeDescriptor, depth: usize) -> Self {
        if depth == 0 {
            return inner;
        }
        match inner {
            TypeDescriptor::Pointer { inner, depth: d } => TypeDescriptor::Pointer { inner, depth: d + depth },
            other => TypeDescriptor::Pointer { inner: Box::new(other), depth },
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeDescriptor::Unknown)
    }

    /// ポインタの深さ（ポインタでなければ0）
    pub fn pointer_depth(&self) -> usize {
        match self {
            TypeDescriptor::Pointer { depth, .. } => *depth,
            _ => 0,
        }
    }
}

impl Default for TypeDescriptor {
    fn default() -> Self {
        TypeDescriptor::Unknown
    }
}

/// 中間表現の文字列形式: `i32`, `i8**`, `{i32,i8*}`, `void`
impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive { name } => write!(f, "{}", name),
            TypeDescriptor::Pointer { inner, depth } => write!(f, "{}{}", inner, "*".repeat(*depth)),
            TypeDescriptor::Struct { members } => {
                write!(f, "{{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, "}}")
            }
            TypeDescriptor::Unknown => write!(f, "void"),
        }
    }
}
