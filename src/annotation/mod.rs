/// 注釈付きコード再構築
///
/// デコンパイラが出力するトークン列から、連続したテキストと
/// そのバイト範囲に付与される注釈（アドレス・ハイライト・シンボル参照）を生成する

pub mod token;
pub mod classifier;
pub mod builder;

pub use token::Token;
pub use classifier::{AnnotationClassifier, HighlightCategory, KindTable, ReferenceKind};
pub use builder::{AnnotatedTextBuilder, BuilderOptions};

use serde::Serialize;
use std::ops::Range;

/// テキスト内のバイト範囲 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// シンボル参照
///
/// 参照の種類ごとに必須のペイロードだけを持つ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reference", rename_all = "snake_case")]
pub enum SymbolReference {
    FunctionName { address: u64 },
    GlobalVariable { address: u64 },
    Constant { address: u64 },
    LocalVariable { name: String },
    Parameter { name: String },
}

impl SymbolReference {
    /// 参照先アドレス（アドレス参照の場合のみ）
    pub fn address(&self) -> Option<u64> {
        match self {
            SymbolReference::FunctionName { address }
            | SymbolReference::GlobalVariable { address }
            | SymbolReference::Constant { address } => Some(*address),
            _ => None,
        }
    }

    /// 参照先シンボル名（名前参照の場合のみ）
    pub fn name(&self) -> Option<&str> {
        match self {
            SymbolReference::LocalVariable { name } | SymbolReference::Parameter { name } => {
                Some(name)
            }
            _ => None,
        }
    }
}

/// 注釈の内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationKind {
    /// テキストの元になったバイナリアドレス
    AddressMapping { address: u64 },
    /// シンタックスハイライト
    SyntaxHighlight { category: HighlightCategory },
    /// 構造化されたシンボル参照
    Reference(SymbolReference),
}

/// テキストの範囲に付与された注釈
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub range: TextRange,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn address_mapping(range: TextRange, address: u64) -> Self {
        Self { range, kind: AnnotationKind::AddressMapping { address } }
    }

    pub fn highlight(range: TextRange, category: HighlightCategory) -> Self {
        Self { range, kind: AnnotationKind::SyntaxHighlight { category } }
    }

    pub fn reference(range: TextRange, reference: SymbolReference) -> Self {
        Self { range, kind: AnnotationKind::Reference(reference) }
    }
}

/// 再構築されたテキストと注釈一覧
///
/// 構築後は不変。注釈の順序は挿入順で、意味は持たない
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotatedDocument {
    text: String,
    annotations: Vec<Annotation>,
}

impl AnnotatedDocument {
    pub(crate) fn new(text: String, annotations: Vec<Annotation>) -> Self {
        Self { text, annotations }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// 注釈範囲に対応するテキスト片
    pub fn slice(&self, range: TextRange) -> Option<&str> {
        self.text.get(range.as_range())
    }

    /// 指定アドレスに対応付けられたテキスト範囲
    pub fn ranges_for_address(&self, address: u64) -> impl Iterator<Item = TextRange> + '_ {
        self.annotations.iter().filter_map(move |a| match a.kind {
            AnnotationKind::AddressMapping { address: addr } if addr == address => Some(a.range),
            _ => None,
        })
    }

    pub fn into_parts(self) -> (String, Vec<Annotation>) {
        (self.text, self.annotations)
    }
}
