//! Leitura de fichas `.docx`: o texto de cada parágrafo (`w:p`) do corpo,
//! inclusive os de tabelas, separado por quebra de linha.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::traits::DocumentReader;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extrator de texto de documentos Word (OOXML)
#[derive(Debug, Clone, Default)]
pub struct DocxReader;

impl DocxReader {
    pub fn new() -> Self {
        Self
    }

    /// Texto dos parágrafos de um `word/document.xml`.
    ///
    /// Parágrafos aninhados (caixas de texto em `w:txbxContent`) saem como
    /// parágrafos próprios, antes do parágrafo que os contém, sem interromper
    /// o texto dele.
    pub fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>> {
        let mut reader = Reader::from_str(xml);
        let mut paragraphs = Vec::new();
        let mut open: Vec<String> = Vec::new();
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"w:p" => open.push(String::new()),
                    b"w:t" => in_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match (e.name().as_ref(), open.last_mut()) {
                    (b"w:p", _) => paragraphs.push(String::new()),
                    (b"w:tab", Some(text)) => text.push('\t'),
                    (b"w:br" | b"w:cr", Some(text)) => text.push('\n'),
                    _ => {}
                },
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:p" => {
                        if let Some(text) = open.pop() {
                            paragraphs.push(text);
                        }
                    }
                    b"w:t" => in_text = false,
                    _ => {}
                },
                Ok(Event::Text(t)) if in_text => {
                    if let Some(text) = open.last_mut() {
                        text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Ok(Event::CData(t)) if in_text => {
                    if let Some(text) = open.last_mut() {
                        text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Ok(Event::GeneralRef(r)) if in_text => {
                    if let Some(text) = open.last_mut() {
                        let name = String::from_utf8_lossy(&r);
                        match r.resolve_char_ref() {
                            Ok(Some(c)) => text.push(c),
                            _ => match resolve_predefined_entity(&name) {
                                Some(entity) => text.push_str(entity),
                                None => {
                                    text.push('&');
                                    text.push_str(&name);
                                    text.push(';');
                                }
                            },
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ExtractError::ParseError(format!(
                        "XML inválido na posição {}: {}",
                        reader.error_position(),
                        e
                    ))
                    .into())
                }
            }
        }

        Ok(paragraphs)
    }
}

impl DocumentReader for DocxReader {
    fn read_text(&self, path: &Path) -> Result<String> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let mut part = archive.by_name(DOCUMENT_PART).map_err(|_| {
            ExtractError::InvalidFormat(format!(
                "documento sem {}: {}",
                DOCUMENT_PART,
                path.display()
            ))
        })?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)?;

        Ok(Self::paragraphs_from_xml(&xml)?.join("\n"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Grava um .docx mínimo com um parágrafo por linha
    pub(crate) fn write_docx(path: &Path, lines: &[&str]) {
        let body: String = lines
            .iter()
            .map(|line| {
                let escaped = line
                    .replace('&', "&amp;")
                    .replace('<', "&lt;")
                    .replace('>', "&gt;");
                format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", escaped)
            })
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}</w:body></w:document>",
            body
        );

        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        zip.start_file(DOCUMENT_PART, SimpleFileOptions::default()).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_paragraphs_from_xml() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>NOME COMPLETO: </w:t></w:r><w:r><w:t>Ana Souza</w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t><w:br/><w:t>C &amp; D &#233;</w:t></w:r></w:p>
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>CPF: 111</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
        </w:body></w:document>"#;

        let paragraphs = DocxReader::paragraphs_from_xml(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec!["NOME COMPLETO: Ana Souza", "", "A\tB\nC & D é", "CPF: 111"]
        );
    }

    #[test]
    fn test_text_box_keeps_enclosing_paragraph() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>CPF: 11122233344</w:t></w:r><w:r><w:pict><w:txbxContent><w:p><w:r><w:t>Logo</w:t></w:r></w:p></w:txbxContent></w:pict></w:r><w:r><w:t xml:space="preserve"> (sem pontos)</w:t></w:r></w:p>
            <w:p><w:r><w:t>NOME: Ana &#x53;ouza &lt;RH&gt;</w:t></w:r></w:p>
        </w:body></w:document>"#;

        let paragraphs = DocxReader::paragraphs_from_xml(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec!["Logo", "CPF: 11122233344 (sem pontos)", "NOME: Ana Souza <RH>"]
        );
    }

    #[test]
    fn test_read_text_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ficha.docx");
        write_docx(&path, &["CPF: 111.222.333-44", "NOME COMPLETO: Ana & Souza"]);

        let text = DocxReader::new().read_text(&path).unwrap();
        assert_eq!(text, "CPF: 111.222.333-44\nNOME COMPLETO: Ana & Souza");
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("falso.docx");
        std::fs::write(&path, b"texto puro").unwrap();

        assert!(DocxReader::new().read_text(&path).is_err());
    }
}
