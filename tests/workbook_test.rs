// ==========================================
// 外勤运营平台 - 工作簿读取集成测试
// ==========================================
// 覆盖: .xlsx 首个工作表 → 表头/数据行拆分 / 行号 = 工作表行序号 + 1 /
//       整数浮点单元格（门牌号）/ 日期单元格
// 夹具: 以 zip 写出最小 SpreadsheetML 包
// ==========================================


use fieldops_import::domain::EntityKind;
use fieldops_import::importer::{read_source, ColumnSchema, Importer, Tokenizer};
use std::io::Write;
use std::path::Path;
use tempfile::Builder;
use test_helpers::{mock_engine, MockEndpoint};
use zip::write::SimpleFileOptions;

enum XCell {
    Text(&'static str),
    Number(f64),
    /// Excel 序列日期，套用内置日期格式
    Date(f64),
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Agendamentos" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

// s="1" → numFmtId 22（内置 m/d/yy h:mm，日期时间）
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="22" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/></cellXfs>
</styleSheet>"#;

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn sheet_xml(rows: &[(usize, Vec<Option<XCell>>)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row_number, cells) in rows {
        xml.push_str(&format!(r#"<row r="{}">"#, row_number));
        for (index, cell) in cells.iter().enumerate() {
            let reference = format!("{}{}", column_letter(index), row_number);
            match cell {
                None => {}
                Some(XCell::Text(text)) => xml.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    reference,
                    xml_escape(text)
                )),
                Some(XCell::Number(value)) => {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value))
                }
                Some(XCell::Date(serial)) => xml.push_str(&format!(
                    r#"<c r="{}" s="1"><v>{}</v></c>"#,
                    reference, serial
                )),
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn write_xlsx(path: &Path, rows: &[(usize, Vec<Option<XCell>>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let sheet = sheet_xml(rows);
    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/styles.xml", STYLES),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, contents) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn header_cells() -> Vec<Option<XCell>> {
    ColumnSchema::for_kind(EntityKind::Appointment)
        .header_row()
        .into_iter()
        .map(|label| Some(XCell::Text(label)))
        .collect()
}

/// 17 列预约行；日期与门牌号由调用方给出单元格类型
fn appointment_cells(client: &'static str, scheduled: XCell, number: XCell) -> Vec<Option<XCell>> {
    vec![
        Some(XCell::Text(client)),
        None,
        None,
        Some(XCell::Text("(11) 91234-5678")),
        None,
        Some(XCell::Text("Instalação")),
        Some(XCell::Text("João Silva")),
        Some(scheduled),
        Some(XCell::Text("Agendado")),
        Some(XCell::Text("Normal")),
        Some(XCell::Text("01234-567")),
        Some(XCell::Text("Centro")),
        Some(XCell::Text("São Paulo")),
        Some(XCell::Text("Rua das Flores")),
        Some(number),
        None,
        None,
    ]
}

/// 第 1 行表头，第 2、4 行数据，第 3 行空
fn agenda_workbook() -> tempfile::NamedTempFile {
    let temp_file = Builder::new().suffix(".xlsx").tempfile().unwrap();
    write_xlsx(
        temp_file.path(),
        &[
            (1, header_cells()),
            (
                2,
                // 45731.375 = 2025-03-15 09:00
                appointment_cells("Marina Rocha", XCell::Date(45731.375), XCell::Number(123.0)),
            ),
            (
                4,
                appointment_cells(
                    "Bruno Teixeira",
                    XCell::Text("16/03/2025 14:30"),
                    XCell::Text("45"),
                ),
            ),
        ],
    );
    temp_file
}

#[tokio::test]
async fn test_workbook_rows_keep_sheet_line_numbers() {
    let workbook = agenda_workbook();
    let file = read_source(workbook.path(), &Tokenizer::default())
        .await
        .unwrap();

    assert_eq!(file.header_line, 1);
    assert_eq!(
        file.header,
        ColumnSchema::for_kind(EntityKind::Appointment).header_row()
    );
    let lines: Vec<usize> = file.rows.iter().map(|r| r.line).collect();
    assert_eq!(lines, vec![2, 4]);

    let first = &file.rows[0].cells;
    assert_eq!(first[0], "Marina Rocha");
    assert_eq!(first[1], "");
    assert_eq!(first[7], "2025-03-15 09:00:00");
    assert_eq!(first[14], "123");
    assert_eq!(file.rows[1].cells[7], "16/03/2025 14:30");
}

#[tokio::test]
async fn test_workbook_imports_like_csv() {
    let endpoint = MockEndpoint::accepting();
    let engine = mock_engine(endpoint.clone());
    let workbook = agenda_workbook();

    let result = engine
        .import_file(workbook.path(), EntityKind::Appointment)
        .await
        .unwrap();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.total_lines, 2);
    assert_eq!(result.valid_count, 2);

    let payloads = endpoint.payload_json();
    assert_eq!(payloads[0]["scheduledDate"], "2025-03-15T12:00:00+00:00");
    assert_eq!(payloads[0]["numero"], "123");
    assert_eq!(payloads[1]["scheduledDate"], "2025-03-16T17:30:00+00:00");
    assert_eq!(payloads[1]["numero"], "45");
}
