// ==========================================
// 合规记录导入 - 命令行入口
// ==========================================
// 用法:
//   compliance-import <db_path|-> <file> <training|deadline> [skip|overwrite]
//                     [--map field=column]... [--json-log]
// db_path 为 "-" 时使用默认数据库路径
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use compliance_import::db::default_db_path;
use compliance_import::domain::types::{DuplicateMode, RecordKind};
use compliance_import::{logging, ImportApi};
use std::collections::HashMap;

const USAGE: &str = "用法: compliance-import <db_path|-> <file> <training|deadline> [skip|overwrite] [--map field=column]... [--json-log]";

struct CliArgs {
    db_path: String,
    file_path: String,
    record_kind: RecordKind,
    duplicate_mode: DuplicateMode,
    overrides: HashMap<String, String>,
    json_log: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut overrides = HashMap::new();
    let mut json_log = false;

    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json-log" => json_log = true,
            "--map" => {
                let pair = args.next().ok_or_else(|| anyhow!("--map 缺少参数\n{}", USAGE))?;
                let (field, column) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--map 参数格式应为 field=column: {}", pair))?;
                overrides.insert(field.trim().to_string(), column.trim().to_string());
            }
            _ => positional.push(arg),
        }
    }

    if positional.len() < 3 || positional.len() > 4 {
        bail!("{}", USAGE);
    }

    let db_path = if positional[0] == "-" {
        default_db_path()
    } else {
        positional[0].clone()
    };
    let record_kind = positional[2]
        .parse::<RecordKind>()
        .map_err(|e| anyhow!(e))?;
    let duplicate_mode = match positional.get(3) {
        Some(mode) => mode.parse::<DuplicateMode>().map_err(|e| anyhow!(e))?,
        None => DuplicateMode::Skip,
    };

    Ok(CliArgs {
        db_path,
        file_path: positional[1].clone(),
        record_kind,
        duplicate_mode,
        overrides,
        json_log,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.json_log {
        logging::init_json();
    } else {
        logging::init();
    }

    tracing::info!("合规记录导入 v{}", compliance_import::VERSION);
    tracing::info!("使用数据库: {}", args.db_path);

    let api = ImportApi::new(args.db_path.clone());
    let report = api
        .import_file(
            &args.file_path,
            args.record_kind,
            args.duplicate_mode,
            args.overrides,
        )
        .await
        .with_context(|| format!("导入失败: {}", args.file_path))?;

    println!("批次: {}", report.batch_id);
    println!(
        "总行数 {} | 新增 {} | 更新 {} | 跳过(重复) {} | 失败 {} | 耗时 {}ms",
        report.total_rows,
        report.inserted,
        report.updated,
        report.skipped_duplicates,
        report.failed,
        report.elapsed_ms
    );
    for line in report.error_lines() {
        println!("  {}", line);
    }

    Ok(())
}
