/// デコンパイルセッション
///
/// キャッシュ検証 → 外部デコンパイラ実行 → 注釈付きテキスト構築 をまとめる。
/// デコンパイルはプロセス全体で同時に1つだけ実行する

use crate::annotation::{AnnotatedDocument, AnnotatedTextBuilder};
use crate::cache::CacheValidator;
use crate::config::DecompilationConfig;
use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing::{error, info};

/// 外部デコンパイラ
///
/// 設定の `outputFile` にトークン列JSONを書き出すことが期待される
pub trait Decompiler {
    fn decompile(&self, config: &DecompilationConfig) -> Result<()>;
}

/// デコンパイルセッション
pub struct DecompilationSession<D> {
    decompiler: D,
    builder: AnnotatedTextBuilder,
    validator: CacheValidator,
    gate: Mutex<()>,
}

impl<D: Decompiler> DecompilationSession<D> {
    pub fn new(decompiler: D, builder: AnnotatedTextBuilder, validator: CacheValidator) -> Self {
        Self {
            decompiler,
            builder,
            validator,
            gate: Mutex::new(()),
        }
    }

    pub fn builder(&self) -> &AnnotatedTextBuilder {
        &self.builder
    }

    /// デコンパイルして注釈付きドキュメントを返す（失敗はログに出してNone）
    pub fn decompile(&self, config: &DecompilationConfig, use_cache: bool) -> Option<AnnotatedDocument> {
        match self.try_decompile(config, use_cache) {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!("decompilation error: {:#}", e);
                None
            }
        }
    }

    /// デコンパイルして注釈付きドキュメントを返す
    pub fn try_decompile(&self, config: &DecompilationConfig, use_cache: bool) -> Result<AnnotatedDocument> {
        // 前のリクエストがパニックしてもゲート自体は使い続ける
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let output = config
            .output_file()
            .context("decompilation config has no outputFile parameter")?;

        if use_cache && self.validator.is_usable(config) {
            info!("Reusing cached decompilation: {}", output.display());
        } else {
            info!("Running decompiler...");
            self.decompiler.decompile(config).context("decompiler failed")?;
            self.validator.persist(config)?;
        }

        let doc = self.builder.build_from_path(&output)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// 呼び出し回数を数え、固定のトークン列を書き出すデコンパイラ
    struct FakeDecompiler {
        runs: Cell<usize>,
        output: &'static str,
        fail: bool,
    }

    impl FakeDecompiler {
        fn new(output: &'static str) -> Self {
            Self { runs: Cell::new(0), output, fail: false }
        }
    }

    impl Decompiler for FakeDecompiler {
        fn decompile(&self, config: &DecompilationConfig) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.fail {
                anyhow::bail!("decompilation ended with error code 1");
            }
            let output = config.output_file().context("no output file")?;
            fs::write(output, self.output)?;
            let output_config = config.output_config_file().context("no output config")?;
            fs::write(output_config, "{}")?;
            Ok(())
        }
    }

    const OUTPUT: &str = r#"{"tokens": [{"addr": "1000"}, {"val": "main", "kind": "i_fnc"}, {"addr": ""}]}"#;

    fn config_in(dir: &Path) -> DecompilationConfig {
        let mut config = DecompilationConfig::default();
        config.set_field("time", "10:00:00");
        config.set_parameter("inputFile", "/bin/true");
        config.set_parameter("outputFile", dir.join("rd_dec.json").display().to_string());
        config.set_parameter("outputConfigFile", dir.join("rd_config.json").display().to_string());
        config
    }

    fn session(decompiler: FakeDecompiler) -> DecompilationSession<FakeDecompiler> {
        DecompilationSession::new(decompiler, AnnotatedTextBuilder::default(), CacheValidator::new())
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let temp = TempDir::new().unwrap();
        let session = session(FakeDecompiler::new(OUTPUT));
        let config = config_in(temp.path());

        let first = session.decompile(&config, true).unwrap();
        assert_eq!(first.text(), "main");
        assert_eq!(session.decompiler.runs.get(), 1);

        let mut later = config.clone();
        later.set_field("time", "11:00:00");
        let second = session.decompile(&later, true).unwrap();
        assert_eq!(second, first);
        assert_eq!(session.decompiler.runs.get(), 1);
    }

    #[test]
    fn test_cache_disabled_always_runs() {
        let temp = TempDir::new().unwrap();
        let session = session(FakeDecompiler::new(OUTPUT));
        let config = config_in(temp.path());

        session.decompile(&config, false).unwrap();
        session.decompile(&config, false).unwrap();
        assert_eq!(session.decompiler.runs.get(), 2);
    }

    #[test]
    fn test_failed_run_does_not_persist_hash() {
        let temp = TempDir::new().unwrap();
        let mut decompiler = FakeDecompiler::new(OUTPUT);
        decompiler.fail = true;
        let session = session(decompiler);
        let config = config_in(temp.path());

        assert!(session.decompile(&config, true).is_none());
        assert!(!temp.path().join(crate::cache::HASH_FILE_NAME).exists());
    }

    #[test]
    fn test_malformed_output_yields_no_result() {
        let temp = TempDir::new().unwrap();
        let session = session(FakeDecompiler::new(r#"{"tokens": [{"val": "x"}]}"#));
        let config = config_in(temp.path());

        assert!(session.decompile(&config, true).is_none());
        let err = session.try_decompile(&config, true).unwrap_err();
        assert!(err.downcast_ref::<crate::error::DecompileError>().is_some());
    }

    /// 同時に実行中の呼び出し数の最大値を記録するデコンパイラ
    #[derive(Default)]
    struct OverlapDecompiler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        runs: AtomicUsize,
    }

    impl Decompiler for OverlapDecompiler {
        fn decompile(&self, config: &DecompilationConfig) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            thread::sleep(Duration::from_millis(20));
            let output = config.output_file().context("no output file")?;
            fs::write(output, OUTPUT)?;

            self.runs.fetch_add(1, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_requests_are_serialized() {
        let temp = TempDir::new().unwrap();
        let session = DecompilationSession::new(
            OverlapDecompiler::default(),
            AnnotatedTextBuilder::default(),
            CacheValidator::new(),
        );
        let config = config_in(temp.path());

        thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| session.decompile(&config, false)))
                .collect();
            for handle in handles {
                let doc = handle.join().unwrap().unwrap();
                assert_eq!(doc.text(), "main");
            }
        });

        assert_eq!(session.decompiler.runs.load(Ordering::SeqCst), 4);
        assert_eq!(session.decompiler.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
