/// デコンパイルキャッシュ検証
///
/// 正規化した設定のハッシュとサイドカーファイルに保存したハッシュを比較し、
/// 外部デコンパイラを再実行せずに前回の出力を再利用できるか判定する

use crate::config::DecompilationConfig;
use crate::error::{DecompileError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

/// サイドカーハッシュファイル名（出力設定ファイルと同じディレクトリ）
pub const HASH_FILE_NAME: &str = ".rd_hash";

/// 時刻で変化するフィールドを置き換える値
const MASK: &str = "removed";

/// ハッシュ計算前にマスクするフィールド
const VOLATILE_FIELDS: &[&str] = &["time", "date", "decompParams"];

/// キャッシュ判定の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRecord {
    /// 現在の設定から計算したハッシュ
    pub config_hash: String,
    /// サイドカーに保存されていたハッシュ
    pub stored_hash: Option<String>,
    pub output_config_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub usable: bool,
}

/// キャッシュ検証器
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheValidator;

impl CacheValidator {
    pub fn new() -> Self {
        Self
    }

    /// サイドカーファイルのパス
    pub fn hash_path(config_path: &Path) -> PathBuf {
        config_path.with_file_name(HASH_FILE_NAME)
    }

    /// 正規化した設定のハッシュ（小文字16進）
    pub fn compute_hash(&self, config: &DecompilationConfig) -> String {
        let mut document = config.document().clone();
        for field in VOLATILE_FIELDS {
            document.insert(field.to_string(), Value::String(MASK.to_string()));
        }

        let normalized = canonical(Value::Object(document)).to_string();

        let mut hasher = Xxh3::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.digest())
    }

    /// キャッシュの状態を調べる
    pub fn inspect(&self, config: &DecompilationConfig) -> CacheRecord {
        let config_hash = self.compute_hash(config);
        let output_config_path = config.output_config_file();
        let output_path = config.output_file();

        let stored_hash = output_config_path
            .as_deref()
            .and_then(|path| load_hash(&Self::hash_path(path)));

        let config_exists = output_config_path.as_deref().is_some_and(Path::is_file);
        let output_exists = output_path.as_deref().map_or(true, Path::exists);
        let usable = config_exists && output_exists && stored_hash.as_deref() == Some(config_hash.as_str());

        CacheRecord {
            config_hash,
            stored_hash,
            output_config_path,
            output_path,
            usable,
        }
    }

    /// 前回の出力を再利用できるか（I/O失敗はキャッシュミス扱い）
    pub fn is_usable(&self, config: &DecompilationConfig) -> bool {
        let record = self.inspect(config);
        if record.usable {
            info!("Cache hit: {}", record.config_hash);
        } else {
            info!("Cache miss: {}", record.config_hash);
        }
        record.usable
    }

    /// サイドカーにハッシュを書き込む（デコンパイル成功後のみ呼ぶ）
    pub fn persist(&self, config: &DecompilationConfig) -> Result<()> {
        let config_path = config.output_config_file().ok_or_else(|| {
            DecompileError::malformed("decompilation config has no outputConfigFile parameter")
        })?;
        let hash_path = Self::hash_path(&config_path);
        let hash = self.compute_hash(config);

        fs::write(&hash_path, format!("{}\n", hash)).map_err(|source| DecompileError::CacheIo {
            path: hash_path.clone(),
            source,
        })?;

        debug!("Stored config hash {} at {}", hash, hash_path.display());
        Ok(())
    }
}

/// オブジェクトのキーを再帰的に昇順へ並べ替える
///
/// serde_jsonの `preserve_order` が有効でもキーの記述順がハッシュに影響しない
fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonical(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}

/// サイドカーファイルからハッシュを読む（読めなければNone）
fn load_hash(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            debug!("Failed to read cache hash {}: {}", path.display(), e);
            None
        }
    }
}
