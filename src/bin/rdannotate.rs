/// RetDec出力のデバッグ用CLI
///
/// Usage:
///   rdannotate annotate rd_dec.json
///   rdannotate annotate rd_dec.json --json
///   rdannotate type "unsigned char**"
///   rdannotate cache rd_config.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retdec_annotate::annotation::{AnnotationClassifier, AnnotationKind, BuilderOptions, KindTable};
use retdec_annotate::{AnnotatedTextBuilder, CacheValidator, DecompilationConfig, TypeConverter};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rdannotate")]
#[command(about = "Inspect RetDec token output, C type conversion and decompilation cache state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild annotated text from RetDec JSON output
    Annotate {
        /// RetDec output file (rd_dec.json)
        path: PathBuf,

        /// Radix of address strings
        #[arg(short, long, default_value = "16", value_parser = clap::value_parser!(u32).range(2..=36))]
        radix: u32,

        /// Kind table JSON ({"kind": "category"}) replacing the RetDec defaults
        #[arg(short, long)]
        kind_table: Option<PathBuf>,

        /// Dump the whole document as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Convert a C type string
    Type {
        /// Type string (e.g. "unsigned char**")
        type_string: String,

        /// Named type definition NAME={m1; m2; } (repeatable)
        #[arg(short, long, value_name = "NAME=BODY")]
        define: Vec<String>,

        /// Fail instead of degrading to void
        #[arg(short, long)]
        strict: bool,
    },

    /// Show the cache state of a decompilation config
    Cache {
        /// RetDec config JSON
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Annotate { path, radix, kind_table, json } => {
            cmd_annotate(&path, radix, kind_table, json)?;
        }
        Commands::Type { type_string, define, strict } => {
            cmd_type(&type_string, &define, strict)?;
        }
        Commands::Cache { config } => {
            cmd_cache(&config)?;
        }
    }

    Ok(())
}

fn cmd_annotate(path: &PathBuf, radix: u32, kind_table: Option<PathBuf>, json: bool) -> Result<()> {
    let table = match kind_table {
        Some(table_path) => KindTable::from_path(table_path)?,
        None => KindTable::retdec(),
    };

    let builder = AnnotatedTextBuilder::with_options(
        AnnotationClassifier::new(table),
        BuilderOptions { address_radix: radix },
    );
    let doc = builder.build_from_path(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{}", doc.text());
    println!("{}", "=".repeat(80));

    for annotation in doc.annotations() {
        let fragment = doc.slice(annotation.range).unwrap_or("");
        let what = match &annotation.kind {
            AnnotationKind::AddressMapping { address } => format!("offset 0x{:x}", address),
            AnnotationKind::SyntaxHighlight { category } => format!("highlight {:?}", category),
            AnnotationKind::Reference(reference) => format!("reference {:?}", reference),
        };
        println!(
            "[{:>6}..{:<6}] {:<40} {:?}",
            annotation.range.start, annotation.range.end, what, fragment
        );
    }

    println!("{}", "=".repeat(80));
    println!("{} bytes, {} annotations", doc.text().len(), doc.annotations().len());

    Ok(())
}

fn cmd_type(type_string: &str, define: &[String], strict: bool) -> Result<()> {
    let mut definitions = HashMap::new();
    for def in define {
        let (name, body) = def
            .split_once('=')
            .with_context(|| format!("Invalid definition (expected NAME=BODY): {}", def))?;
        definitions.insert(name.trim().to_string(), body.to_string());
    }

    let converter = TypeConverter::with_lookup(definitions);
    let descriptor = if strict {
        converter.try_convert(type_string)?
    } else {
        converter.convert(type_string)
    };

    println!("{}", descriptor);
    Ok(())
}

fn cmd_cache(config_path: &PathBuf) -> Result<()> {
    let config = DecompilationConfig::from_path(config_path)?;
    let record = CacheValidator::new().inspect(&config);

    println!("config hash:  {}", record.config_hash);
    println!("stored hash:  {}", record.stored_hash.as_deref().unwrap_or("<none>"));
    if let Some(path) = &record.output_path {
        println!("output:       {}", path.display());
    }
    println!("usable:       {}", record.usable);

    Ok(())
}
