/// エラー分類
///
/// デコンパイラ出力の破損・メモリ確保失敗・キャッシュ書き込み失敗を区別する

use std::path::PathBuf;
use thiserror::Error;

/// 注釈付きコード再構築とキャッシュ永続化のエラー
#[derive(Debug, Error)]
pub enum DecompileError {
    /// デコンパイラ出力が壊れている、または形式が変わった
    #[error("malformed decompiler output: {0}")]
    MalformedInput(String),

    /// 出力バッファを確保できない（致命的、リトライしない）
    #[error("unable to allocate memory: {0}")]
    Allocation(String),

    /// サイドカーハッシュファイルの書き込み失敗
    #[error("failed to write cache hash file {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DecompileError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DecompileError::MalformedInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DecompileError>;
