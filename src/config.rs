/// デコンパイル設定
///
/// RetDecの設定JSONをそのまま保持し、キャッシュ判定に必要なパラメータだけを読み出す

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// RetDecのデコンパイル設定ドキュメント
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecompilationConfig {
    document: Map<String, Value>,
}

impl DecompilationConfig {
    pub fn new(document: Map<String, Value>) -> Self {
        Self { document }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(json).context("Failed to parse decompilation config")?;
        match document {
            Value::Object(document) => Ok(Self { document }),
            _ => anyhow::bail!("Decompilation config must be a JSON object"),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decompilation config: {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    fn parameter(&self, key: &str) -> Option<&Value> {
        self.document.get("parameters")?.get(key)
    }

    fn path_parameter(&self, key: &str) -> Option<PathBuf> {
        self.parameter(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    /// 出力設定ファイル（キャッシュのサイドカーはこの隣に置かれる）
    pub fn output_config_file(&self) -> Option<PathBuf> {
        self.path_parameter("outputConfigFile")
    }

    /// デコンパイラの出力ファイル（トークン列JSON）
    pub fn output_file(&self) -> Option<PathBuf> {
        self.path_parameter("outputFile")
    }

    pub fn input_file(&self) -> Option<PathBuf> {
        self.path_parameter("inputFile")
    }

    pub fn selected_ranges(&self) -> Option<&Value> {
        self.parameter("selectedRanges")
    }

    /// パラメータを設定
    pub fn set_parameter(&mut self, key: &str, value: impl Into<Value>) {
        let params = self
            .document
            .entry("parameters")
            .or_insert_with(|| Value::Object(Map::new()));

        match params {
            Value::Object(map) => {
                map.insert(key.to_string(), value.into());
            }
            other => {
                let mut map = Map::new();
                map.insert(key.to_string(), value.into());
                *other = Value::Object(map);
            }
        }
    }

    /// トップレベルのフィールドを設定
    pub fn set_field(&mut self, key: &str, value: impl Into<Value>) {
        self.document.insert(key.to_string(), value.into());
    }
}
