use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::schema::CanonicalRecord;
use crate::types::{PipelineEvent, Table};

/// Trait para componentes que leem planilhas como tabelas de texto
pub trait TabularReader: Send + Sync {
    /// Lê a tabela; células ausentes viram ""
    fn read_table(&self, path: &Path) -> Result<Table>;

    /// Extensões (minúsculas, sem ponto) aceitas pelo leitor
    fn extensions(&self) -> &'static [&'static str];

    /// Verifica se o leitor aceita o arquivo
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions().contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Trait para componentes que extraem o texto corrido de documentos
pub trait DocumentReader: Send + Sync {
    /// Texto de todos os parágrafos, separados por quebra de linha
    fn read_text(&self, path: &Path) -> Result<String>;
}

/// Resumo de uma gravação
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows_written: usize,
    /// false quando a gravação caiu para a versão sem estilos
    pub styled: bool,
}

/// Trait para componentes que gravam registros canônicos
pub trait RecordWriter: Send + Sync {
    /// Grava os registros, cabeçalho incluso
    fn write_records(&self, records: &[CanonicalRecord], path: &Path) -> Result<WriteSummary>;
}

/// Trait para emissão de eventos do pipeline
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emite um evento do pipeline
    async fn emit(&self, event: PipelineEvent) -> Result<()>;
}
