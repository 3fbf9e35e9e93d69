/// デコンパイラ出力のトークン
///
/// JSON形式: `{"tokens": [{"addr": "..."} | {"val": "...", "kind": "..."}]}`

use crate::error::{DecompileError, Result};
use serde_json::Value;

/// トークン列の1要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// アドレスコンテキスト（空文字列はクリア）
    Address(String),
    /// テキスト片とその意味種別
    Text { value: String, kind: String },
}

impl Token {
    pub fn address(raw: impl Into<String>) -> Self {
        Token::Address(raw.into())
    }

    pub fn clear_address() -> Self {
        Token::Address(String::new())
    }

    pub fn text(value: impl Into<String>, kind: impl Into<String>) -> Self {
        Token::Text { value: value.into(), kind: kind.into() }
    }

    /// JSONオブジェクト1つをトークンに変換
    ///
    /// `addr` を持つものはアドレストークン、`val` と `kind` を両方持つものは
    /// テキストトークン、それ以外は不正
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| DecompileError::malformed("token is not an object"))?;

        if let Some(addr) = obj.get("addr") {
            let raw = addr
                .as_str()
                .ok_or_else(|| DecompileError::malformed(format!("invalid address: {}", addr)))?;
            return Ok(Token::Address(raw.to_string()));
        }

        match (obj.get("val"), obj.get("kind")) {
            (Some(Value::String(val)), Some(Value::String(kind))) => Ok(Token::Text {
                value: val.clone(),
                kind: kind.clone(),
            }),
            _ => Err(DecompileError::malformed("malformed RetDec JSON output")),
        }
    }

    /// デコンパイラ出力ドキュメント全体からトークン列を取り出す
    pub fn parse_document(json: &str) -> Result<Vec<Token>> {
        let root: Value = serde_json::from_str(json).map_err(|e| {
            DecompileError::malformed(format!("unable to parse RetDec JSON output: {}", e))
        })?;

        let tokens = root
            .as_object()
            .and_then(|obj| obj.get("tokens"))
            .and_then(Value::as_array)
            .ok_or_else(|| DecompileError::malformed("malformed JSON: missing tokens array"))?;

        tokens.iter().map(Token::from_value).collect()
    }
}
