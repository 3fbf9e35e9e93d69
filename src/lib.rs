/// RetDec注釈付きコード ライブラリ
///
/// デコンパイラのトークン列から注釈付きテキストを再構築し、
/// C型文字列の変換とデコンパイルキャッシュの検証を提供

pub mod error;
pub mod annotation;
pub mod types;
pub mod config;
pub mod cache;
pub mod records;

// 外部デコンパイラとの連携
pub mod session;

pub use annotation::{AnnotatedDocument, AnnotatedTextBuilder, Annotation, AnnotationKind, Token};
pub use cache::{CacheRecord, CacheValidator};
pub use config::DecompilationConfig;
pub use error::DecompileError;
pub use session::{DecompilationSession, Decompiler};
pub use types::{TypeConverter, TypeDescriptor};
