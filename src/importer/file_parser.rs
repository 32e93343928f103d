// ==========================================
// 合规记录导入 - 文件解析器实现 (Format Reader)
// ==========================================
// 阶段 0: 字节流 → 有序 RawRow 序列
// 支持: 分隔文本 (.csv/.tsv/.txt) / 工作簿 (.xlsx/.xlsm/.xls/.ods，仅第一个工作表)
// 红线: 纯转换，无副作用；失败时不产生部分输出
// ==========================================

use crate::domain::record::{ParsedSheet, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::record_importer_trait::FileParser;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ==========================================
// SourceFormat - 声明的文件类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited { delimiter: u8 },
    Workbook,
}

impl SourceFormat {
    pub const CSV: SourceFormat = SourceFormat::Delimited { delimiter: b',' };
    pub const TSV: SourceFormat = SourceFormat::Delimited { delimiter: b'\t' };

    /// 根据文件扩展名推断类型
    pub fn from_file_name(file_name: &str) -> ImportResult<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" | "txt" => Ok(SourceFormat::CSV),
            "tsv" => Ok(SourceFormat::TSV),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(SourceFormat::Workbook),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }

    /// 构造对应的解析器
    pub fn parser(&self) -> Box<dyn FileParser> {
        match *self {
            SourceFormat::Delimited { delimiter } => Box::new(CsvParser::new(delimiter)),
            SourceFormat::Workbook => Box::new(ExcelParser),
        }
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser {
    delimiter: u8,
}

impl CsvParser {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl FileParser for CsvParser {
    fn parse_sheet(&self, bytes: &[u8]) -> ImportResult<ParsedSheet> {
        // 去除 BOM 后整体按 UTF-8 解码
        let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = std::str::from_utf8(content).map_err(|e| ImportError::InvalidEncoding {
            position: e.valid_up_to(),
        })?;

        if text.trim().is_empty() {
            return Err(ImportError::EmptyFile("没有任何内容".to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头由第一条非空行决定
            .flexible(true) // 允许行长度不一致
            .delimiter(self.delimiter)
            .from_reader(text.as_bytes());

        // 物理行号 = 记录起始字节之前的换行数 + 1
        // 记录起点取上一条记录结束位置之后第一个非换行字节（csv 跳过的空行在此计入）
        let raw = text.as_bytes();
        let mut record = StringRecord::new();
        let mut line = 1usize;
        let mut counted = 0usize;
        let mut next_from = 0usize;
        let mut grid = Vec::new();
        while reader.read_record(&mut record)? {
            let start = skip_line_breaks(raw, next_from);
            line += count_newlines(&raw[counted..start]);
            counted = start;
            grid.push((line, record.iter().map(|v| v.to_string()).collect::<Vec<_>>()));
            next_from = (reader.position().byte() as usize).clamp(start, raw.len());
        }

        build_raw_rows(grid)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_sheet(&self, bytes: &[u8]) -> ImportResult<ParsedSheet> {
        if bytes.is_empty() {
            return Err(ImportError::EmptyFile("没有任何内容".to_string()));
        }

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::EmptyFile("工作簿无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let grid = range
            .rows()
            .enumerate()
            .map(|(idx, row)| (idx + 1, row.iter().map(cell_to_string).collect::<Vec<_>>()))
            .collect::<Vec<_>>();

        build_raw_rows(grid)
    }
}

/// 工作簿单元格 → 标准字符串
///
/// - 日期: YYYY-MM-DD（含非零时间时为 YYYY-MM-DD HH:MM:SS）
/// - 整数值浮点: 去掉小数部分
/// - 错误单元格: 空串
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                return dt.as_f64().to_string();
            }
            match dt.as_datetime() {
                Some(value) if value.time() == chrono::NaiveTime::MIN => {
                    value.date().format("%Y-%m-%d").to_string()
                }
                Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => dt.as_f64().to_string(),
            }
        }
        Data::DateTimeIso(s) => match s.split_once('T') {
            Some((date, "00:00:00")) | Some((date, "")) => date.to_string(),
            Some((date, time)) => format!("{} {}", date, time),
            None => s.clone(),
        },
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

fn skip_line_breaks(bytes: &[u8], from: usize) -> usize {
    let from = from.min(bytes.len());
    from + bytes[from..]
        .iter()
        .take_while(|&&b| b == b'\n' || b == b'\r')
        .count()
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

// ==========================================
// 网格 → RawRow
// ==========================================
// 第一条非空行作为表头；数据行按"表头后第几行"编号（跳过的空行也占位）
fn build_raw_rows(grid: Vec<(usize, Vec<String>)>) -> ImportResult<ParsedSheet> {
    let is_blank = |row: &[String]| row.iter().all(|c| c.trim().is_empty());

    let header_pos = grid
        .iter()
        .position(|(_, row)| !is_blank(row))
        .ok_or_else(|| ImportError::EmptyFile("未找到表头行".to_string()))?;

    let header_line = grid[header_pos].0;
    let headers: Vec<String> = grid[header_pos]
        .1
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    // 表头重复校验（大小写不敏感，空表头列忽略）
    let mut seen = HashSet::new();
    for header in headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(header.to_lowercase()) {
            return Err(ImportError::DuplicateHeader(header.clone()));
        }
    }

    let mut rows = Vec::new();
    for (line, data_row) in grid.into_iter().skip(header_pos + 1) {
        // 跳过完全空白的行
        if is_blank(&data_row) {
            continue;
        }

        let cells = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(col_idx, header)| {
                let value = data_row.get(col_idx).cloned().unwrap_or_default();
                (header.clone(), value)
            })
            .collect();

        let row = RawRow::new(line - header_line, cells);
        // 数据只落在空表头列上的行同样视为空行
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    Ok(ParsedSheet {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
    })
}
