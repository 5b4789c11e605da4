// ==========================================
// 外勤运营平台 - 分词器（文件读取与解析）
// ==========================================
// 支持: CSV / TXT (.csv/.txt) / Excel (.xlsx/.xls/.ods)
// 输出: 表头 + 带物理行号的数据行
// 规则:
// - 空白行（所有单元格为空）丢弃
// - 单元格去首尾空白并剥离包裹引号
// - 非空行少于 2 行 → 结构错误
// ==========================================

use crate::config::DelimiterMode;
use crate::domain::ImportRow;
use crate::importer::error::{EngineResult, ImportError};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::{Path, PathBuf};
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

// ==========================================
// TokenizedFile - 分词结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedFile {
    pub header: Vec<String>,
    pub header_line: usize,
    pub rows: Vec<ImportRow>,
}

impl TokenizedFile {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ==========================================
// Tokenizer
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    delimiter: DelimiterMode,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(DelimiterMode::Auto)
    }
}

impl Tokenizer {
    pub fn new(delimiter: DelimiterMode) -> Self {
        Self { delimiter }
    }

    /// 将原始文本切分为表头与数据行
    pub fn tokenize(&self, text: &str) -> EngineResult<TokenizedFile> {
        let text = text.trim_start_matches(UTF8_BOM);
        let delimiter = self.resolve_delimiter(text);
        debug!(delimiter = %(delimiter as char), "CSV 分隔符已确定");

        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .trim(Trim::All)
            .delimiter(delimiter);

        // 按物理行切分，保证行号与源文件一致
        let mut lines = Vec::new();
        let mut record = StringRecord::new();
        for (idx, raw_line) in text.lines().enumerate() {
            if raw_line.trim().is_empty() {
                continue;
            }
            let mut reader = builder.from_reader(raw_line.as_bytes());
            if reader.read_record(&mut record)? {
                lines.push((idx + 1, record.iter().map(str::to_string).collect()));
            }
        }

        Self::tokenize_grid(lines)
    }

    /// 对已按行切分的单元格网格做统一清洗（CSV 与工作簿共用）
    pub fn tokenize_grid(lines: Vec<(usize, Vec<String>)>) -> EngineResult<TokenizedFile> {
        let mut non_blank = lines
            .into_iter()
            .map(|(line, cells)| (line, cells.iter().map(|c| clean_cell(c)).collect::<Vec<_>>()))
            .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()));

        let (header_line, header) = non_blank
            .next()
            .ok_or_else(|| ImportError::Structural("insufficient rows: file is empty".to_string()))?;

        let rows: Vec<ImportRow> = non_blank
            .map(|(line, cells)| ImportRow::new(line, cells))
            .collect();

        if rows.is_empty() {
            return Err(ImportError::Structural(
                "insufficient rows: a header and at least one data row are required".to_string(),
            ));
        }

        Ok(TokenizedFile {
            header,
            header_line,
            rows,
        })
    }

    fn resolve_delimiter(&self, text: &str) -> u8 {
        match self.delimiter {
            DelimiterMode::Comma => b',',
            DelimiterMode::Semicolon => b';',
            DelimiterMode::Auto => detect_delimiter(text),
        }
    }
}

/// 按首个非空行中的计数在 `,` 与 `;` 之间选择
fn detect_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let semicolons = first.matches(';').count();
    let commas = first.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// 仅当首尾同时带引号时剥离一层包裹引号；CSV 已转义的内部引号保持不变
fn clean_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// 字节解码: UTF-8 优先，失败回退 Latin-1（pt-BR 表格软件常见导出编码）
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

// ==========================================
// ExcelReader - 工作簿读取（首个工作表）
// ==========================================
pub struct ExcelReader;

impl ExcelReader {
    /// 读取首个工作表，行号 = 工作表行序号 + 1
    pub fn read(path: &Path) -> EngineResult<Vec<(usize, Vec<String>)>> {
        let mut workbook = open_workbook_auto(path)?;

        let sheet_names = workbook.sheet_names().to_vec();
        let first = sheet_names
            .first()
            .ok_or_else(|| ImportError::WorkbookParse("workbook has no sheets".to_string()))?;

        let range = workbook.worksheet_range(first)?;
        let start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

        Ok(range
            .rows()
            .enumerate()
            .map(|(offset, cells)| {
                let line = start_row + offset + 1;
                (line, cells.iter().map(cell_text).collect())
            })
            .collect())
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Excel 序列日期（1899-12-30 起算）→ `YYYY-MM-DD HH:MM:SS`
fn excel_serial_to_text(serial: f64) -> String {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0));
    match epoch {
        Some(epoch) => {
            let millis = (serial * 86_400_000.0).round() as i64;
            (epoch + Duration::milliseconds(millis))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        }
        None => serial.to_string(),
    }
}

// ==========================================
// 按扩展名读取源文件
// ==========================================
pub async fn read_source(path: &Path, tokenizer: &Tokenizer) -> EngineResult<TokenizedFile> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" | "txt" => {
            let bytes = tokio::fs::read(path).await?;
            tokenizer.tokenize(&decode_text(bytes))
        }
        "xlsx" | "xls" | "xlsm" | "ods" => {
            let owned: PathBuf = path.to_path_buf();
            let grid = tokio::task::spawn_blocking(move || ExcelReader::read(&owned))
                .await
                .map_err(|e| ImportError::Internal(format!("workbook reader task failed: {}", e)))??;
            Tokenizer::tokenize_grid(grid)
        }
        _ => Err(ImportError::UnsupportedFormat(ext)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_tokenize_assigns_spreadsheet_line_numbers() {
        let text = "Name,Tax ID\nAna,1\nBruno,2\nCarla,3\n";
        let file = Tokenizer::default().tokenize(text).unwrap();

        assert_eq!(file.header, vec!["Name", "Tax ID"]);
        assert_eq!(file.header_line, 1);
        let lines: Vec<usize> = file.rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
    }

    #[test]
    fn test_blank_lines_are_dropped_but_numbering_is_physical() {
        let text = "Name,City\n\nAna,Recife\n , \nBruno,Natal\n";
        let file = Tokenizer::default().tokenize(text).unwrap();

        assert_eq!(file.row_count(), 2);
        assert_eq!(file.rows[0].line, 3);
        assert_eq!(file.rows[1].line, 5);
    }

    #[test]
    fn test_quotes_and_whitespace_are_stripped() {
        let text = "\u{feff}\"Name\";\"City\"\n  \"Ana Lima\" ; \"São Paulo, SP\" \n";
        let file = Tokenizer::default().tokenize(text).unwrap();

        assert_eq!(file.header, vec!["Name", "City"]);
        assert_eq!(file.rows[0].cells, vec!["Ana Lima", "São Paulo, SP"]);
    }

    #[test]
    fn test_escaped_quotes_survive() {
        let text = "Name,Street\nAna,\"Rua \"\"A\"\"\"\nBruno,\"\"\"Vila\"\" Nova\"\n";
        let file = Tokenizer::default().tokenize(text).unwrap();

        assert_eq!(file.rows[0].cells, vec!["Ana", "Rua \"A\""]);
        assert_eq!(file.rows[1].cells, vec!["Bruno", "\"Vila\" Nova"]);
    }

    #[test]
    fn test_semicolon_is_detected() {
        let text = "Name;Street;Number\nAna;Rua A, bloco 2;10\n";
        let file = Tokenizer::default().tokenize(text).unwrap();
        assert_eq!(file.rows[0].cells, vec!["Ana", "Rua A, bloco 2", "10"]);
    }

    #[test]
    fn test_forced_delimiter_overrides_detection() {
        let text = "Name;Street\nAna;Rua A\n";
        let file = Tokenizer::new(DelimiterMode::Comma).tokenize(text).unwrap();
        assert_eq!(file.header, vec!["Name;Street"]);
    }

    #[test]
    fn test_header_only_is_structural_error() {
        let err = Tokenizer::default().tokenize("Name,City\n\n\n").unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("insufficient rows"));
    }

    #[test]
    fn test_empty_input_is_structural_error() {
        let err = Tokenizer::default().tokenize("").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_latin1_fallback() {
        let bytes = vec![b'S', 0xE3, b'o'];
        assert_eq!(decode_text(bytes), "São");
    }

    #[test]
    fn test_excel_serial_conversion() {
        // 45651.6041666 = 2024-12-25 14:30
        assert_eq!(excel_serial_to_text(45651.604166666664), "2024-12-25 14:30:00");
    }

    #[tokio::test]
    async fn test_read_source_csv_file() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "Name,City").unwrap();
        writeln!(temp_file, "Ana,Recife").unwrap();

        let file = read_source(temp_file.path(), &Tokenizer::default())
            .await
            .unwrap();
        assert_eq!(file.row_count(), 1);
        assert_eq!(file.rows[0].line, 2);
    }

    #[tokio::test]
    async fn test_read_source_rejects_unknown_extension() {
        let temp_file = Builder::new().suffix(".pdf").tempfile().unwrap();
        let err = read_source(temp_file.path(), &Tokenizer::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(ext) if ext == "pdf"));
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let err = read_source(Path::new("/nonexistent/agenda.csv"), &Tokenizer::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
