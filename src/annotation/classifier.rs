/// トークン種別 → ハイライト分類 → シンボル参照種別 の対応付け
///
/// 種別テーブルはコードではなくデータとして保持し、JSONから差し替え可能

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ハイライト分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightCategory {
    Keyword,
    Comment,
    Datatype,
    FunctionName,
    FunctionParameter,
    LocalVariable,
    ConstantVariable,
    GlobalVariable,
}

/// 構造化参照の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    FunctionName,
    GlobalVariable,
    Constant,
    LocalVariable,
    Parameter,
}

impl ReferenceKind {
    /// 現在アドレスを参照先として必要とするか（falseならシンボル名を使う）
    pub fn requires_address(self) -> bool {
        matches!(
            self,
            ReferenceKind::FunctionName | ReferenceKind::GlobalVariable | ReferenceKind::Constant
        )
    }
}

/// RetDecのトークン種別テーブル
///
/// nl / ws / punc / op / i_mem は意図的に未対応
const RETDEC_KINDS: &[(&str, HighlightCategory)] = &[
    ("i_var", HighlightCategory::GlobalVariable),
    ("i_lab", HighlightCategory::Keyword),
    ("i_fnc", HighlightCategory::FunctionName),
    ("i_arg", HighlightCategory::FunctionParameter),
    ("keyw", HighlightCategory::Keyword),
    ("type", HighlightCategory::Datatype),
    ("preproc", HighlightCategory::Keyword),
    ("inc", HighlightCategory::Comment),
    ("l_bool", HighlightCategory::ConstantVariable),
    ("l_int", HighlightCategory::ConstantVariable),
    ("l_fp", HighlightCategory::ConstantVariable),
    ("l_str", HighlightCategory::ConstantVariable),
    ("l_sym", HighlightCategory::ConstantVariable),
    ("l_ptr", HighlightCategory::ConstantVariable),
    ("cmnt", HighlightCategory::Comment),
];

/// トークン種別 → ハイライト分類 のテーブル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindTable {
    entries: IndexMap<String, HighlightCategory>,
}

impl KindTable {
    /// 空のテーブル
    pub fn empty() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// RetDec出力用の標準テーブル
    pub fn retdec() -> Self {
        RETDEC_KINDS
            .iter()
            .map(|(kind, category)| (kind.to_string(), *category))
            .collect()
    }

    /// `{"kind": "category", ...}` 形式のJSONから読み込む
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse kind table")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read kind table: {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// 対応を追加（既存の種別は上書き）
    pub fn insert(&mut self, kind: impl Into<String>, category: HighlightCategory) {
        self.entries.insert(kind.into(), category);
    }

    pub fn get(&self, kind: &str) -> Option<HighlightCategory> {
        self.entries.get(kind).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, HighlightCategory)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::retdec()
    }
}

impl FromIterator<(String, HighlightCategory)> for KindTable {
    fn from_iter<I: IntoIterator<Item = (String, HighlightCategory)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// 注釈分類器
///
/// 初期化後は読み取り専用
#[derive(Debug, Clone, Default)]
pub struct AnnotationClassifier {
    table: KindTable,
}

impl AnnotationClassifier {
    pub fn new(table: KindTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KindTable {
        &self.table
    }

    /// トークン種別のハイライト分類（未知の種別はNone、エラーではない）
    pub fn highlight_for(&self, kind: &str) -> Option<HighlightCategory> {
        self.table.get(kind)
    }

    /// ハイライト分類から構造化参照の種類を導出
    pub fn reference_for(&self, highlight: HighlightCategory) -> Option<ReferenceKind> {
        match highlight {
            HighlightCategory::FunctionName => Some(ReferenceKind::FunctionName),
            HighlightCategory::GlobalVariable => Some(ReferenceKind::GlobalVariable),
            HighlightCategory::ConstantVariable => Some(ReferenceKind::Constant),
            HighlightCategory::LocalVariable => Some(ReferenceKind::LocalVariable),
            HighlightCategory::FunctionParameter => Some(ReferenceKind::Parameter),
            HighlightCategory::Keyword | HighlightCategory::Comment | HighlightCategory::Datatype => None,
        }
    }

    /// 種別からハイライト分類と参照種類をまとめて取得
    pub fn classify(&self, kind: &str) -> Option<(HighlightCategory, Option<ReferenceKind>)> {
        let highlight = self.highlight_for(kind)?;
        Some((highlight, self.reference_for(highlight)))
    }
}
