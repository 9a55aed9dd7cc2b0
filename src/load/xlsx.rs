//! # Gravação de planilhas `.xlsx`
//!
//! Gera um pacote SpreadsheetML mínimo (zip + XML) com uma única aba e
//! células em texto inline. No modo estilizado o cabeçalho fica em negrito,
//! centralizado e preenchido, a primeira linha é congelada, as colunas são
//! dimensionadas pelo conteúdo e há autofiltro sobre a área usada. Se a versão
//! estilizada falhar, grava a versão simples.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;

use crate::config::OutputConfig;
use crate::error::{LoadError, Result, RoboError};
use crate::schema::{model_columns, CanonicalRecord, Field};
use crate::traits::{RecordWriter, WriteSummary};
use crate::types::Table;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Estilo do cabeçalho no `cellXfs` de `styles.xml`
const HEADER_STYLE: &str = "1";

/// Gravador de planilhas `.xlsx`
#[derive(Debug, Clone)]
pub struct XlsxWriter {
    sheet_name: String,
    header_fill: String,
    max_column_width: usize,
    styled: bool,
    /// Colunas gravadas por `write_records`, na ordem de saída
    columns: Vec<Field>,
}

impl Default for XlsxWriter {
    fn default() -> Self {
        let output = OutputConfig::default();
        Self::from_config(&output, &output.cadastro_sheet)
    }
}

impl XlsxWriter {
    pub fn from_config(config: &OutputConfig, sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            header_fill: config.header_fill.clone(),
            max_column_width: config.max_column_width,
            styled: config.styled,
            columns: config.selected_fields(),
        }
    }

    /// Restringe as colunas gravadas por `write_records`
    pub fn with_columns(mut self, columns: Vec<Field>) -> Self {
        self.columns = columns;
        self
    }

    /// Cabeçalho emitido por `write_records`
    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(Field::as_str).collect()
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn with_styles(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    /// Grava uma tabela qualquer
    pub fn write_table(&self, table: &Table, path: &Path) -> Result<WriteSummary> {
        let headers: Vec<&str> = table.headers().iter().map(String::as_str).collect();
        let rows: Vec<&[String]> = table.rows().map(|row| row.cells()).collect();
        self.write(&headers, &rows, path)
    }

    fn write(&self, headers: &[&str], rows: &[&[String]], path: &Path) -> Result<WriteSummary> {
        let (bytes, styled) = self.to_bytes(headers, rows)?;
        std::fs::write(path, bytes).map_err(|e| {
            LoadError::WriteError(format!("{}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), rows = rows.len(), styled, "Planilha gravada");
        Ok(WriteSummary {
            rows_written: rows.len(),
            styled,
        })
    }

    /// Conteúdo do `.xlsx`; o booleano indica se a versão estilizada foi gerada
    pub fn to_bytes(&self, headers: &[&str], rows: &[&[String]]) -> Result<(Vec<u8>, bool)> {
        if self.styled {
            match self.build_package(headers, rows, true) {
                Ok(bytes) => return Ok((bytes, true)),
                Err(e) => warn!(error = %e, "Falha ao estilizar planilha; gravando versão simples"),
            }
        }
        Ok((self.build_package(headers, rows, false)?, false))
    }

    fn build_package(&self, headers: &[&str], rows: &[&[String]], styled: bool) -> Result<Vec<u8>> {
        if styled && !is_argb(&self.header_fill) {
            return Err(LoadError::WriteError(format!(
                "cor de cabeçalho inválida: {}",
                self.header_fill
            ))
            .into());
        }

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        let parts: Vec<(&str, Vec<u8>)> = {
            let mut parts = vec![
                ("[Content_Types].xml", content_types_xml(styled)?),
                ("_rels/.rels", root_rels_xml()?),
                ("xl/workbook.xml", workbook_xml(&self.sheet_name)?),
                ("xl/_rels/workbook.xml.rels", workbook_rels_xml(styled)?),
                ("xl/worksheets/sheet1.xml", self.sheet_xml(headers, rows, styled)?),
            ];
            if styled {
                parts.push(("xl/styles.xml", styles_xml(&self.header_fill)?));
            }
            parts
        };

        for (name, content) in parts {
            zip.start_file(name, options).map_err(write_err)?;
            zip.write_all(&content)?;
        }

        Ok(zip.finish().map_err(write_err)?.into_inner())
    }

    fn sheet_xml(&self, headers: &[&str], rows: &[&[String]], styled: bool) -> Result<Vec<u8>> {
        let mut writer = xml_writer()?;
        let last_ref = format!(
            "{}{}",
            column_letter(headers.len().max(1)),
            rows.len() + 1
        );
        let used_range = format!("A1:{}", last_ref);

        writer
            .write_event(Event::Start(
                BytesStart::new("worksheet").with_attributes([("xmlns", NS_MAIN), ("xmlns:r", NS_REL)]),
            ))
            .map_err(write_err)?;
        empty(&mut writer, "dimension", &[("ref", used_range.as_str())])?;

        if styled {
            writer
                .write_event(Event::Start(BytesStart::new("sheetViews")))
                .map_err(write_err)?;
            writer
                .write_event(Event::Start(
                    BytesStart::new("sheetView").with_attributes([("workbookViewId", "0")]),
                ))
                .map_err(write_err)?;
            empty(
                &mut writer,
                "pane",
                &[
                    ("ySplit", "1"),
                    ("topLeftCell", "A2"),
                    ("activePane", "bottomLeft"),
                    ("state", "frozen"),
                ],
            )?;
            end(&mut writer, "sheetView")?;
            end(&mut writer, "sheetViews")?;
        }

        if styled && !headers.is_empty() {
            writer
                .write_event(Event::Start(BytesStart::new("cols")))
                .map_err(write_err)?;
            for (i, width) in self.column_widths(headers, rows).into_iter().enumerate() {
                let index = (i + 1).to_string();
                let width = width.to_string();
                empty(
                    &mut writer,
                    "col",
                    &[
                        ("min", index.as_str()),
                        ("max", index.as_str()),
                        ("width", width.as_str()),
                        ("customWidth", "1"),
                    ],
                )?;
            }
            end(&mut writer, "cols")?;
        }

        writer
            .write_event(Event::Start(BytesStart::new("sheetData")))
            .map_err(write_err)?;
        write_row(&mut writer, 1, headers, styled.then_some(HEADER_STYLE))?;
        for (i, row) in rows.iter().enumerate() {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            write_row(&mut writer, i + 2, &cells, None)?;
        }
        end(&mut writer, "sheetData")?;

        if styled {
            empty(&mut writer, "autoFilter", &[("ref", used_range.as_str())])?;
        }
        end(&mut writer, "worksheet")?;

        Ok(writer.into_inner())
    }

    /// Largura por coluna: maior texto (cabeçalho incluso) + 2, limitada
    pub fn column_widths(&self, headers: &[&str], rows: &[&[String]]) -> Vec<usize> {
        headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let longest = rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(self.max_column_width)
            })
            .collect()
    }
}

impl RecordWriter for XlsxWriter {
    fn write_records(&self, records: &[CanonicalRecord], path: &Path) -> Result<WriteSummary> {
        let headers = self.headers();
        if headers == model_columns() {
            let rows: Vec<&[String]> = records.iter().map(CanonicalRecord::values).collect();
            return self.write(&headers, &rows, path);
        }

        let projected: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|field| record.get(*field).to_string())
                    .collect()
            })
            .collect();
        let rows: Vec<&[String]> = projected.iter().map(Vec::as_slice).collect();
        self.write(&headers, &rows, path)
    }
}

fn write_err<E: Display>(e: E) -> RoboError {
    LoadError::WriteError(e.to_string()).into()
}

fn xml_writer() -> Result<Writer<Vec<u8>>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(write_err)?;
    Ok(writer)
}

fn empty(writer: &mut Writer<Vec<u8>>, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    writer
        .write_event(Event::Empty(
            BytesStart::new(name).with_attributes(attributes.iter().copied()),
        ))
        .map_err(write_err)
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)
}

fn write_row(
    writer: &mut Writer<Vec<u8>>,
    number: usize,
    cells: &[&str],
    style: Option<&str>,
) -> Result<()> {
    let row_number = number.to_string();
    writer
        .write_event(Event::Start(
            BytesStart::new("row").with_attributes([("r", row_number.as_str())]),
        ))
        .map_err(write_err)?;

    for (i, value) in cells.iter().enumerate() {
        if value.is_empty() {
            continue;
        }
        let reference = format!("{}{}", column_letter(i + 1), number);
        let mut cell = BytesStart::new("c");
        cell.push_attribute(("r", reference.as_str()));
        cell.push_attribute(("t", "inlineStr"));
        if let Some(style) = style {
            cell.push_attribute(("s", style));
        }
        writer.write_event(Event::Start(cell)).map_err(write_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("is")))
            .map_err(write_err)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
            ))
            .map_err(write_err)?;
        let text = strip_control_chars(value);
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(write_err)?;
        end(writer, "t")?;
        end(writer, "is")?;
        end(writer, "c")?;
    }

    end(writer, "row")
}

fn content_types_xml(styled: bool) -> Result<Vec<u8>> {
    let mut writer = xml_writer()?;
    writer
        .write_event(Event::Start(
            BytesStart::new("Types").with_attributes([("xmlns", NS_CONTENT_TYPES)]),
        ))
        .map_err(write_err)?;
    empty(
        &mut writer,
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        ],
    )?;
    empty(
        &mut writer,
        "Default",
        &[("Extension", "xml"), ("ContentType", "application/xml")],
    )?;
    empty(
        &mut writer,
        "Override",
        &[
            ("PartName", "/xl/workbook.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
        ],
    )?;
    empty(
        &mut writer,
        "Override",
        &[
            ("PartName", "/xl/worksheets/sheet1.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
        ],
    )?;
    if styled {
        empty(
            &mut writer,
            "Override",
            &[
                ("PartName", "/xl/styles.xml"),
                (
                    "ContentType",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
                ),
            ],
        )?;
    }
    end(&mut writer, "Types")?;
    Ok(writer.into_inner())
}

fn root_rels_xml() -> Result<Vec<u8>> {
    let mut writer = xml_writer()?;
    writer
        .write_event(Event::Start(
            BytesStart::new("Relationships").with_attributes([("xmlns", NS_PKG_REL)]),
        ))
        .map_err(write_err)?;
    empty(
        &mut writer,
        "Relationship",
        &[
            ("Id", "rId1"),
            (
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument",
            ),
            ("Target", "xl/workbook.xml"),
        ],
    )?;
    end(&mut writer, "Relationships")?;
    Ok(writer.into_inner())
}

fn workbook_xml(sheet_name: &str) -> Result<Vec<u8>> {
    let mut writer = xml_writer()?;
    writer
        .write_event(Event::Start(
            BytesStart::new("workbook").with_attributes([("xmlns", NS_MAIN), ("xmlns:r", NS_REL)]),
        ))
        .map_err(write_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("sheets")))
        .map_err(write_err)?;
    empty(
        &mut writer,
        "sheet",
        &[("name", sheet_name), ("sheetId", "1"), ("r:id", "rId1")],
    )?;
    end(&mut writer, "sheets")?;
    end(&mut writer, "workbook")?;
    Ok(writer.into_inner())
}

fn workbook_rels_xml(styled: bool) -> Result<Vec<u8>> {
    let mut writer = xml_writer()?;
    writer
        .write_event(Event::Start(
            BytesStart::new("Relationships").with_attributes([("xmlns", NS_PKG_REL)]),
        ))
        .map_err(write_err)?;
    empty(
        &mut writer,
        "Relationship",
        &[
            ("Id", "rId1"),
            (
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            ),
            ("Target", "worksheets/sheet1.xml"),
        ],
    )?;
    if styled {
        empty(
            &mut writer,
            "Relationship",
            &[
                ("Id", "rId2"),
                (
                    "Type",
                    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
                ),
                ("Target", "styles.xml"),
            ],
        )?;
    }
    end(&mut writer, "Relationships")?;
    Ok(writer.into_inner())
}

/// Dois formatos de célula: 0 = padrão, 1 = cabeçalho
fn styles_xml(header_fill: &str) -> Result<Vec<u8>> {
    let mut writer = xml_writer()?;
    let start = |writer: &mut Writer<Vec<u8>>, name: &str, attributes: &[(&str, &str)]| {
        writer
            .write_event(Event::Start(
                BytesStart::new(name).with_attributes(attributes.iter().copied()),
            ))
            .map_err(write_err)
    };

    start(&mut writer, "styleSheet", &[("xmlns", NS_MAIN)])?;

    start(&mut writer, "fonts", &[("count", "2")])?;
    for bold in [false, true] {
        start(&mut writer, "font", &[])?;
        if bold {
            empty(&mut writer, "b", &[])?;
        }
        empty(&mut writer, "sz", &[("val", "11")])?;
        empty(&mut writer, "name", &[("val", "Calibri")])?;
        end(&mut writer, "font")?;
    }
    end(&mut writer, "fonts")?;

    start(&mut writer, "fills", &[("count", "3")])?;
    for pattern in ["none", "gray125"] {
        start(&mut writer, "fill", &[])?;
        empty(&mut writer, "patternFill", &[("patternType", pattern)])?;
        end(&mut writer, "fill")?;
    }
    start(&mut writer, "fill", &[])?;
    start(&mut writer, "patternFill", &[("patternType", "solid")])?;
    empty(&mut writer, "fgColor", &[("rgb", header_fill)])?;
    empty(&mut writer, "bgColor", &[("rgb", header_fill)])?;
    end(&mut writer, "patternFill")?;
    end(&mut writer, "fill")?;
    end(&mut writer, "fills")?;

    start(&mut writer, "borders", &[("count", "1")])?;
    start(&mut writer, "border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        empty(&mut writer, side, &[])?;
    }
    end(&mut writer, "border")?;
    end(&mut writer, "borders")?;

    start(&mut writer, "cellStyleXfs", &[("count", "1")])?;
    empty(
        &mut writer,
        "xf",
        &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")],
    )?;
    end(&mut writer, "cellStyleXfs")?;

    start(&mut writer, "cellXfs", &[("count", "2")])?;
    empty(
        &mut writer,
        "xf",
        &[
            ("numFmtId", "0"),
            ("fontId", "0"),
            ("fillId", "0"),
            ("borderId", "0"),
            ("xfId", "0"),
        ],
    )?;
    start(
        &mut writer,
        "xf",
        &[
            ("numFmtId", "0"),
            ("fontId", "1"),
            ("fillId", "2"),
            ("borderId", "0"),
            ("xfId", "0"),
            ("applyFont", "1"),
            ("applyFill", "1"),
            ("applyAlignment", "1"),
        ],
    )?;
    empty(
        &mut writer,
        "alignment",
        &[("horizontal", "center"), ("vertical", "center")],
    )?;
    end(&mut writer, "xf")?;
    end(&mut writer, "cellXfs")?;

    start(&mut writer, "cellStyles", &[("count", "1")])?;
    empty(
        &mut writer,
        "cellStyle",
        &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")],
    )?;
    end(&mut writer, "cellStyles")?;

    end(&mut writer, "styleSheet")?;
    Ok(writer.into_inner())
}

/// Letra da coluna (1 → A, 27 → AA)
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn is_argb(color: &str) -> bool {
    color.len() == 8 && color.chars().all(|c| c.is_ascii_hexdigit())
}

/// Caracteres de controle não são válidos em XML 1.0
fn strip_control_chars(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::spreadsheet::SpreadsheetReader;
    use crate::traits::TabularReader;
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> Option<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        Some(content)
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(31), "AE");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_column_widths_are_capped() {
        let writer = XlsxWriter::default();
        let long = "X".repeat(100);
        let row = vec!["Ana".to_string(), long];
        let widths = writer.column_widths(&["Nome", "Obs"], &[row.as_slice()]);
        assert_eq!(widths, vec![6, 60]);
    }

    #[test]
    fn test_styled_package_parts() {
        let writer = XlsxWriter::default().with_sheet_name("Inativacao");
        let row = vec!["DELETE".to_string(), "A & B".to_string()];
        let (bytes, styled) = writer.to_bytes(&["Operacao", "Nome"], &[row.as_slice()]).unwrap();
        assert!(styled);

        let sheet = part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"state="frozen""#));
        assert!(sheet.contains(r#"<autoFilter ref="A1:B2"/>"#));
        assert!(sheet.contains("A &amp; B"));
        assert!(sheet.contains(r#"s="1""#));

        let styles = part(&bytes, "xl/styles.xml").unwrap();
        assert!(styles.contains("FFDCE6F1"));
        assert!(part(&bytes, "xl/workbook.xml").unwrap().contains(r#"name="Inativacao""#));
    }

    #[test]
    fn test_falls_back_to_plain_when_styling_fails() {
        let mut config = OutputConfig::default();
        config.header_fill = "azul".to_string();
        let writer = XlsxWriter::from_config(&config, "Cadastro");

        let (bytes, styled) = writer.to_bytes(&["Operacao"], &[]).unwrap();
        assert!(!styled);
        assert!(part(&bytes, "xl/styles.xml").is_none());
        let sheet = part(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(!sheet.contains("autoFilter"));
    }

    #[test]
    fn test_records_roundtrip_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saida.xlsx");

        let mut record = CanonicalRecord::new();
        record.set(Field::Operacao, "INSERT");
        record.set(Field::NomeCompleto, "ANA SOUZA");
        record.set(Field::Login, "111222333-44");

        let summary = XlsxWriter::default().write_records(&[record], &path).unwrap();
        assert_eq!(summary, WriteSummary { rows_written: 1, styled: true });

        let table = SpreadsheetReader::new().read_table(&path).unwrap();
        assert_eq!(table.headers().len(), Field::COUNT);
        assert_eq!(table.headers(), model_columns().as_slice());
        assert_eq!(table.headers()[0], "Operacao");
        assert_eq!(table.headers().last().map(String::as_str), Some("Status"));
        let row = table.row(0).unwrap();
        assert_eq!(row.get("Login"), Some("111222333-44"));
        assert_eq!(row.get("NomeCompleto"), Some("ANA SOUZA"));
        assert_eq!(row.get("Status"), Some(""));
    }
}
