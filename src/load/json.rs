//! # Relatórios JSON
//!
//! Serializa estatísticas de conciliação, prévias, resultados de busca e
//! erros de validação.

use serde::Serialize;
use std::path::Path;

use crate::error::{LoadError, Result};

/// Gravador de relatórios JSON
///
/// # Exemplos
///
/// ```rust
/// use roborh::load::json::JsonReportWriter;
///
/// let writer = JsonReportWriter::new().with_pretty(false);
/// let texto = writer.to_string(&serde_json::json!({"total_matches": 0})).unwrap();
/// assert_eq!(texto, r#"{"total_matches":0}"#);
/// ```
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    pretty: bool,
}

impl Default for JsonReportWriter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define se deve usar formatação pretty-print
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn to_string<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(text)
    }

    /// Grava o relatório, sobrescrevendo o arquivo
    pub fn write<T: Serialize + ?Sized>(&self, value: &T, path: &Path) -> Result<()> {
        let text = self.to_string(value)?;
        std::fs::write(path, text)
            .map_err(|e| LoadError::WriteError(format!("{}: {}", path.display(), e)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_pretty_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erros.json");

        let mut errors: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        errors.insert(0, vec!["NomeCompleto empty".to_string()]);
        JsonReportWriter::new().write(&errors, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["0"][0], "NomeCompleto empty");
    }

    #[test]
    fn test_invalid_path() {
        let result = JsonReportWriter::new().write(&1, Path::new("/nao/existe/x.json"));
        assert!(matches!(
            result,
            Err(crate::error::RoboError::Load(LoadError::WriteError(_)))
        ));
    }
}
