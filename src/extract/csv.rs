use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::normalize_headers;
use crate::error::Result;
use crate::traits::TabularReader;
use crate::types::Table;

/// Leitor de arquivos CSV; todas as células são lidas como texto
#[derive(Debug, Clone)]
pub struct CsvReader {
    /// `None` detecta entre `,` e `;` pela linha de cabeçalho
    delimiter: Option<u8>,
    quote_char: u8,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote_char: b'"',
        }
    }
}

impl CsvReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define o delimitador
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Define o caractere de aspas
    pub fn with_quote_char(mut self, quote_char: u8) -> Self {
        self.quote_char = quote_char;
        self
    }

    /// Planilhas exportadas em pt-BR costumam usar ";"
    fn sniff_delimiter(path: &Path) -> Result<u8> {
        let mut first_line = String::new();
        BufReader::new(File::open(path)?).read_line(&mut first_line)?;
        let semicolons = first_line.matches(';').count();
        let commas = first_line.matches(',').count();
        Ok(if semicolons > commas { b';' } else { b',' })
    }
}

impl TabularReader for CsvReader {
    fn read_table(&self, path: &Path) -> Result<Table> {
        let delimiter = match self.delimiter {
            Some(delimiter) => delimiter,
            None => Self::sniff_delimiter(path)?,
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(self.quote_char)
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(File::open(path)?));

        let raw_headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let mut table = Table::new(normalize_headers(raw_headers));

        for result in csv_reader.records() {
            let record = result?;
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            // sobras após a última coluna nomeada são descartadas
            cells.truncate(table.headers().len());
            table.push_row(cells)?;
        }

        Ok(table)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_read_comma_separated() {
        let file = csv_file("CPF,Nome Completo,Email\n111.222.333-44,Ana Souza,ana@x.com\n,Bruno,\n");
        let table = CsvReader::new().read_table(file.path()).unwrap();

        assert_eq!(table.headers(), &["CPF", "Nome Completo", "Email"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).unwrap().get("CPF"), Some("111.222.333-44"));
        assert_eq!(table.row(1).unwrap().get("Email"), Some(""));
    }

    #[test]
    fn test_sniffs_semicolon_and_pads_short_rows() {
        let file = csv_file("\u{feff}CPF;Nome;Nome\n00011122233;Ana\n");
        let table = CsvReader::new().read_table(file.path()).unwrap();

        assert_eq!(table.headers(), &["CPF", "Nome", "Nome.1"]);
        // zeros à esquerda preservados
        assert_eq!(table.row(0).unwrap().get("CPF"), Some("00011122233"));
        assert_eq!(table.row(0).unwrap().get("Nome.1"), Some(""));
    }

    #[test]
    fn test_explicit_delimiter() {
        let file = csv_file("A|B\n1|2\n");
        let table = CsvReader::new()
            .with_delimiter(b'|')
            .read_table(file.path())
            .unwrap();
        assert_eq!(table.row(0).unwrap().get("B"), Some("2"));
    }
}
