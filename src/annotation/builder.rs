/// 注釈付きテキストビルダー
///
/// トークン列を先頭から順に処理し、「現在アドレス」カーソルを追跡しながら
/// テキストバッファへ追記して、各トークンの占めるバイト範囲に注釈を付ける。
/// 構築は全か無か：エラー時に部分的なドキュメントは返さない

use super::classifier::{AnnotationClassifier, ReferenceKind};
use super::token::Token;
use super::{AnnotatedDocument, Annotation, SymbolReference, TextRange};
use crate::error::{DecompileError, Result};
use std::path::Path;
use tracing::debug;

/// ビルダー設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderOptions {
    /// アドレス文字列の基数
    pub address_radix: u32,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self { address_radix: 16 }
    }
}

/// 注釈付きテキストビルダー
#[derive(Debug, Clone, Default)]
pub struct AnnotatedTextBuilder {
    classifier: AnnotationClassifier,
    options: BuilderOptions,
}

impl AnnotatedTextBuilder {
    pub fn new(classifier: AnnotationClassifier) -> Self {
        Self { classifier, options: BuilderOptions::default() }
    }

    pub fn with_options(classifier: AnnotationClassifier, options: BuilderOptions) -> Self {
        Self { classifier, options }
    }

    pub fn classifier(&self) -> &AnnotationClassifier {
        &self.classifier
    }

    /// トークン列から注釈付きドキュメントを構築
    pub fn build(&self, tokens: &[Token]) -> Result<AnnotatedDocument> {
        let mut state = BuildState::default();

        for token in tokens {
            match token {
                Token::Address(raw) => {
                    state.current_address = self.parse_address(raw)?;
                }
                Token::Text { value, kind } => {
                    self.append_text(&mut state, value, kind)?;
                }
            }
        }

        debug!(
            "Built annotated document: {} bytes, {} annotations",
            state.buffer.len(),
            state.annotations.len()
        );

        Ok(AnnotatedDocument::new(state.buffer, state.annotations))
    }

    /// JSON文字列（デコンパイラ出力）から構築
    pub fn build_from_json(&self, json: &str) -> Result<AnnotatedDocument> {
        let tokens = Token::parse_document(json)?;
        self.build(&tokens)
    }

    /// デコンパイラ出力ファイルから構築
    pub fn build_from_path(&self, path: impl AsRef<Path>) -> Result<AnnotatedDocument> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DecompileError::malformed(format!(
                "unable to open RetDec output: {}: {}",
                path.display(),
                e
            ))
        })?;
        self.build_from_json(&json)
    }

    /// アドレス文字列を解釈（空文字列はカーソルのクリア）
    fn parse_address(&self, raw: &str) -> Result<Option<u64>> {
        if raw.is_empty() {
            return Ok(None);
        }

        if !(2..=36).contains(&self.options.address_radix) {
            return Err(DecompileError::malformed(format!(
                "unsupported address radix: {}",
                self.options.address_radix
            )));
        }

        let digits = if self.options.address_radix == 16 {
            raw.strip_prefix("0x")
                .or_else(|| raw.strip_prefix("0X"))
                .unwrap_or(raw)
        } else {
            raw
        };

        u64::from_str_radix(digits, self.options.address_radix)
            .map(Some)
            .map_err(|_| DecompileError::malformed(format!("invalid address: {}", raw)))
    }

    fn append_text(&self, state: &mut BuildState, value: &str, kind: &str) -> Result<()> {
        state
            .buffer
            .try_reserve(value.len())
            .map_err(|e| DecompileError::Allocation(e.to_string()))?;

        let start = state.buffer.len();
        state.buffer.push_str(value);
        let range = TextRange::new(start, state.buffer.len());

        // アドレスは次のアドレストークンまで後続の全テキストに適用される
        if let Some(address) = state.current_address {
            state.annotations.push(Annotation::address_mapping(range, address));
        }

        let Some((highlight, reference)) = self.classifier.classify(kind) else {
            return Ok(());
        };
        state.annotations.push(Annotation::highlight(range, highlight));

        if let Some(reference) = reference {
            let reference = symbol_reference(reference, state.current_address, value)?;
            state.annotations.push(Annotation::reference(range, reference));
        }

        Ok(())
    }
}

#[derive(Default)]
struct BuildState {
    buffer: String,
    annotations: Vec<Annotation>,
    current_address: Option<u64>,
}

fn symbol_reference(kind: ReferenceKind, address: Option<u64>, name: &str) -> Result<SymbolReference> {
    if kind.requires_address() {
        let address = address.ok_or_else(|| {
            DecompileError::malformed(format!(
                "{:?} reference to {:?} has no address context",
                kind, name
            ))
        })?;

        return Ok(match kind {
            ReferenceKind::FunctionName => SymbolReference::FunctionName { address },
            ReferenceKind::GlobalVariable => SymbolReference::GlobalVariable { address },
            _ => SymbolReference::Constant { address },
        });
    }

    let name = name.to_string();
    Ok(match kind {
        ReferenceKind::LocalVariable => SymbolReference::LocalVariable { name },
        _ => SymbolReference::Parameter { name },
    })
}
