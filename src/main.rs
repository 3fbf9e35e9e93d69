use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use retdec_annotate::annotation::{AnnotationClassifier, BuilderOptions, KindTable};
use retdec_annotate::{AnnotatedTextBuilder, CacheValidator, DecompilationConfig, TypeConverter};

#[derive(Debug, Deserialize)]
struct McpRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct McpResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize)]
struct McpError {
    code: i32,
    message: String,
}

/// サーバー全体で共有する読み取り専用の状態
struct ServerState {
    classifier: AnnotationClassifier,
    validator: CacheValidator,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdoutはJSON-RPC専用
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    info!("RetDec annotation server starting...");

    // トークン種別テーブル（RD_KIND_TABLEで差し替え可能）
    let table = match std::env::var("RD_KIND_TABLE") {
        Ok(path) => {
            let table = KindTable::from_path(&path)?;
            info!("Loaded kind table from {} ({} kinds)", path, table.len());
            table
        }
        Err(_) => KindTable::retdec(),
    };

    let state = Arc::new(ServerState {
        classifier: AnnotationClassifier::new(table),
        validator: CacheValidator::new(),
    });

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    info!("Server ready");

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }

                let response = match process_request(&line, Arc::clone(&state)).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        error!("Request processing error: {:#}", e);
                        McpResponse {
                            jsonrpc: "2.0".to_string(),
                            id: None,
                            result: None,
                            error: Some(McpError {
                                code: -32603,
                                message: format!("{:#}", e),
                            }),
                        }
                    }
                };

                let response_str = serde_json::to_string(&response)?;
                stdout.write_all(response_str.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    info!("Server shutting down");
    Ok(())
}

async fn process_request(request_str: &str, state: Arc<ServerState>) -> Result<McpResponse> {
    let request: McpRequest = serde_json::from_str(request_str)?;

    info!("Processing method: {}", request.method);

    let result = match request.method.as_str() {
        "initialize" => handle_initialize().await?,
        "tools/list" => handle_list_tools().await?,
        "tools/call" => handle_tool_call(request.params, state).await?,
        _ => {
            return Ok(McpResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(McpError {
                    code: -32601,
                    message: format!("Method not found: {}", request.method),
                }),
            });
        }
    };

    Ok(McpResponse {
        jsonrpc: "2.0".to_string(),
        id: request.id,
        result: Some(result),
        error: None,
    })
}

async fn handle_initialize() -> Result<Value> {
    Ok(json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "retdec-annotate",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Annotated code reconstruction for RetDec output"
        }
    }))
}

async fn handle_list_tools() -> Result<Value> {
    let tools = vec![
        json!({
            "name": "annotate_output",
            "description": "RetDecのJSON出力（トークン列）からテキストと注釈（アドレス・ハイライト・シンボル参照）を再構築",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "RetDec出力ファイルパス（rd_dec.json）"
                    },
                    "radix": {
                        "type": "integer",
                        "description": "アドレス文字列の基数",
                        "default": 16
                    }
                },
                "required": ["path"]
            }
        }),
        json!({
            "name": "convert_c_type",
            "description": "C言語の型文字列を中間型表現に変換（例: 'unsigned char**' → i8**）",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "description": "C型文字列"
                    },
                    "definitions": {
                        "type": "object",
                        "description": "名前付き型の定義（例: {\"point\": \"{int; int;}\"}）"
                    },
                    "strict": {
                        "type": "boolean",
                        "description": "解析できない場合にvoidへ縮退せずエラーを返す",
                        "default": false
                    }
                },
                "required": ["type"]
            }
        }),
        json!({
            "name": "check_cache",
            "description": "デコンパイル設定のハッシュを計算し、前回の出力を再利用できるか判定",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "config_path": {
                        "type": "string",
                        "description": "RetDec設定JSONのパス"
                    }
                },
                "required": ["config_path"]
            }
        }),
    ];

    Ok(json!({
        "tools": tools
    }))
}

fn string_arg<'a>(arguments: &'a Value, name: &str) -> Result<&'a str> {
    arguments[name]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing argument: {}", name))
}

async fn handle_tool_call(params: Option<Value>, state: Arc<ServerState>) -> Result<Value> {
    let params = params.ok_or_else(|| anyhow::anyhow!("Missing params"))?;
    let tool_name = params["name"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing tool name"))?;
    let arguments = &params["arguments"];

    info!("Calling tool: {}", tool_name);

    let result = match tool_name {
        "annotate_output" => {
            let path = string_arg(arguments, "path")?;
            let radix = arguments["radix"].as_u64().unwrap_or(16);
            if !(2..=36).contains(&radix) {
                anyhow::bail!("Invalid radix: {}", radix);
            }

            let builder = AnnotatedTextBuilder::with_options(
                state.classifier.clone(),
                BuilderOptions { address_radix: radix as u32 },
            );
            let doc = builder.build_from_path(path)?;
            serde_json::to_value(doc)?
        }

        "convert_c_type" => {
            let type_string = string_arg(arguments, "type")?;
            let strict = arguments["strict"].as_bool().unwrap_or(false);
            let definitions: HashMap<String, String> = match arguments.get("definitions") {
                Some(defs) if !defs.is_null() => {
                    serde_json::from_value(defs.clone()).context("Invalid type definitions")?
                }
                _ => HashMap::new(),
            };

            let converter = TypeConverter::with_lookup(definitions);
            let descriptor = if strict {
                converter.try_convert(type_string)?
            } else {
                converter.convert(type_string)
            };

            json!({
                "type": type_string,
                "converted": descriptor.to_string(),
                "descriptor": descriptor
            })
        }

        "check_cache" => {
            let config_path = string_arg(arguments, "config_path")?;
            let config = DecompilationConfig::from_path(config_path)?;
            let record = state.validator.inspect(&config);
            serde_json::to_value(record)?
        }

        _ => {
            return Err(anyhow::anyhow!("Unknown tool: {}", tool_name));
        }
    };

    Ok(json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(&result)?
        }]
    }))
}
