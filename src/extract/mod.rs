//! Leitura das fontes de entrada: planilhas, CSV e fichas `.docx`.

#[cfg(feature = "csv")]
pub mod csv;
pub mod docx;
pub mod spreadsheet;

use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{ExtractError, Result};
use crate::traits::{DocumentReader, TabularReader};
use crate::types::Table;

use self::docx::DocxReader;
use self::spreadsheet::SpreadsheetReader;

/// Tipo de fonte, pela extensão do arquivo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Spreadsheet,
    Csv,
    Document,
    Unsupported,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => SourceKind::Spreadsheet,
            "csv" if cfg!(feature = "csv") => SourceKind::Csv,
            "docx" => SourceKind::Document,
            _ => SourceKind::Unsupported,
        }
    }
}

/// Conteúdo lido de uma fonte
#[derive(Debug, Clone)]
pub enum Extracted {
    Table(Table),
    /// Texto corrido de uma ficha
    Document(String),
}

/// Despacha a leitura para o leitor adequado, respeitando o limite de tamanho
#[derive(Debug, Clone)]
pub struct SourceReader {
    max_file_size_mb: u64,
    spreadsheet: SpreadsheetReader,
    #[cfg(feature = "csv")]
    csv: self::csv::CsvReader,
    docx: DocxReader,
}

impl Default for SourceReader {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl SourceReader {
    pub fn new(max_file_size_mb: u64) -> Self {
        Self {
            max_file_size_mb,
            spreadsheet: SpreadsheetReader::new(),
            #[cfg(feature = "csv")]
            csv: self::csv::CsvReader::new(),
            docx: DocxReader::new(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.max_file_size_mb)
    }

    /// Lê uma fonte; `Ok(None)` para extensões não suportadas
    pub fn read(&self, path: &Path) -> Result<Option<Extracted>> {
        let kind = SourceKind::detect(path);
        if kind == SourceKind::Unsupported {
            debug!(path = %path.display(), "Ignorando arquivo não suportado");
            return Ok(None);
        }

        self.check_size(path)?;

        let extracted = match kind {
            SourceKind::Spreadsheet => Extracted::Table(self.spreadsheet.read_table(path)?),
            #[cfg(feature = "csv")]
            SourceKind::Csv => Extracted::Table(self.csv.read_table(path)?),
            SourceKind::Document => Extracted::Document(self.docx.read_text(path)?),
            _ => return Ok(None),
        };
        Ok(Some(extracted))
    }

    /// Lê uma fonte que precisa ser tabular (base de usuários, lista de desligados)
    pub fn read_table(&self, path: &Path) -> Result<Table> {
        match self.read(path)? {
            Some(Extracted::Table(table)) => Ok(table),
            _ => Err(ExtractError::UnsupportedFormat(path.display().to_string()).into()),
        }
    }

    fn check_size(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ExtractError::FileNotFound(path.display().to_string()).into()
            }
            _ => crate::error::RoboError::Io(e),
        })?;

        if metadata.len() > self.max_file_size_mb.saturating_mul(1024 * 1024) {
            return Err(ExtractError::TooLarge {
                path: path.display().to_string(),
                limit_mb: self.max_file_size_mb,
            }
            .into());
        }
        Ok(())
    }
}

/// Cabeçalhos únicos: vazio vira `Unnamed: {i}`, repetido ganha `.{n}`
pub(crate) fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(raw.len());
    let mut headers = Vec::with_capacity(raw.len());

    for (i, header) in raw.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        seen.insert(name.clone(), 0);
        if name != base {
            seen.entry(base).or_insert(0);
        }
        headers.push(name);
    }

    headers
}
