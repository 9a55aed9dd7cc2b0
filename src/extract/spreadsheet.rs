use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::debug;

use super::normalize_headers;
use crate::error::{ExtractError, Result};
use crate::traits::TabularReader;
use crate::types::Table;

/// Leitor de planilhas (.xlsx, .xlsm, .xls, .ods) baseado em calamine.
///
/// Lê apenas a primeira aba; a primeira linha é o cabeçalho e toda célula
/// vira texto.
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetReader;

impl SpreadsheetReader {
    pub fn new() -> Self {
        Self
    }

    /// Texto de uma célula: vazio vira "", números inteiros perdem o ".0"
    pub fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.clone(),
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::Bool(true) => "True".to_string(),
            Data::Bool(false) => "False".to_string(),
            other => other.to_string(),
        }
    }
}

impl TabularReader for SpreadsheetReader {
    fn read_table(&self, path: &Path) -> Result<Table> {
        let mut workbook = open_workbook_auto(path)?;

        let sheet_names = workbook.sheet_names().to_vec();
        let Some(sheet_name) = sheet_names.first() else {
            return Err(ExtractError::InvalidFormat(format!(
                "planilha sem abas: {}",
                path.display()
            ))
            .into());
        };

        let range = workbook.worksheet_range(sheet_name)?;
        let mut rows = range.rows();

        let Some(header_row) = rows.next() else {
            debug!(path = %path.display(), sheet = %sheet_name, "Aba vazia");
            return Ok(Table::new(Vec::new()));
        };

        let headers = normalize_headers(header_row.iter().map(Self::cell_to_string).collect());
        let mut table = Table::new(headers);
        for row in rows {
            table.push_row(row.iter().map(Self::cell_to_string).collect())?;
        }

        debug!(
            path = %path.display(),
            sheet = %sheet_name,
            rows = table.len(),
            "Planilha lida"
        );
        Ok(table)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx", "xlsm", "xls", "ods"]
    }
}
