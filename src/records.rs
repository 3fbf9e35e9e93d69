/// 関数・変数レコード
///
/// ホスト解析フレームワークから取得した関数・変数情報を保持し、
/// 型文字列を中間型表現に変換して持たせる

use crate::types::{TypeConverter, TypeDefinitionLookup, TypeDescriptor};
use serde::Serialize;

/// 変数の格納場所
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum Storage {
    Register { name: String },
    Stack { offset: i64 },
    Memory { address: u64 },
    Undefined,
}

/// 呼び出し規約
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingConvention {
    Arm,
    Arm64,
    Mips,
    PowerPc,
    PowerPc64,
    X64,
    Pascal,
    Cdecl,
    Thiscall,
    Fastcall,
    Stdcall,
    Watcom,
    Unknown,
}

impl CallingConvention {
    /// ホストの呼び出し規約名から変換（未知はUnknown）
    pub fn from_host_name(name: &str) -> Self {
        match name {
            "arm32" => CallingConvention::Arm,
            "arm64" => CallingConvention::Arm64,
            "n32" => CallingConvention::Mips,
            "powerpc-32" => CallingConvention::PowerPc,
            "powerpc-64" => CallingConvention::PowerPc64,
            "amd64" | "ms" => CallingConvention::X64,
            "borland" | "pascal" => CallingConvention::Pascal,
            "cdecl" => CallingConvention::Cdecl,
            "cdecl-thiscall-ms" => CallingConvention::Thiscall,
            "fastcall" => CallingConvention::Fastcall,
            "stdcall" => CallingConvention::Stdcall,
            "watcom" => CallingConvention::Watcom,
            _ => CallingConvention::Unknown,
        }
    }
}

/// 変数（ローカル・引数・グローバル）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableRecord {
    pub name: String,
    /// ホストが報告した元の型文字列
    pub c_type: String,
    pub descriptor: TypeDescriptor,
    pub storage: Storage,
}

impl VariableRecord {
    pub fn new<L: TypeDefinitionLookup>(
        converter: &TypeConverter<L>,
        name: impl Into<String>,
        c_type: impl Into<String>,
        storage: Storage,
    ) -> Self {
        let c_type = c_type.into();
        let descriptor = converter.convert(&c_type);
        Self {
            name: name.into(),
            c_type,
            descriptor,
            storage,
        }
    }
}

/// 関数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub return_type: TypeDescriptor,
    pub calling_convention: CallingConvention,
    pub parameters: Vec<VariableRecord>,
    pub locals: Vec<VariableRecord>,
}

impl FunctionRecord {
    /// ホスト名を整形して関数レコードを作成（戻り値はvoid）
    pub fn new(raw_name: &str, start: u64, end: u64) -> Self {
        Self {
            name: strip_name(raw_name),
            start,
            end,
            return_type: TypeDescriptor::Unknown,
            calling_convention: CallingConvention::Unknown,
            parameters: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// `ret name(t1 a, t2 b);` 形式の宣言
    pub fn declaration(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.descriptor, p.name))
            .collect();

        sanitize(&format!("{} {}({});", self.return_type, self.name, params.join(", ")))
    }

    /// キャッシュ用の識別子 `NAME@HEX_ADDR`
    pub fn cache_name(&self) -> String {
        format!("{}@{:x}", self.name, self.start)
    }
}

/// ホストが付けるプレフィックスを除去した関数名
///
/// 空または16進数字だけになった名前には `fcn_` を付ける
pub fn strip_name(name: &str) -> String {
    const PREFIXES: &[&str] = &["sym.", "fcn.", "imp.", "__isoc99_"];

    let mut stripped = name;
    for prefix in PREFIXES {
        if stripped.len() <= prefix.len() {
            continue;
        }
        if let Some(rest) = stripped.strip_prefix(prefix) {
            stripped = rest;
        }
    }

    if stripped.is_empty() || stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return format!("fcn_{}", stripped);
    }

    stripped.to_string()
}

/// ホストの宣言パーサーが受け付けない文字を除去
fn sanitize(declaration: &str) -> String {
    declaration.chars().filter(|c| *c != '$' && *c != '@').collect()
}
