use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, RoboError, TransformError};

/// Tabela lida de uma planilha: cabeçalhos na ordem original e células como texto
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Cria uma tabela vazia com os cabeçalhos informados
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Constrói a tabela a partir de cabeçalhos e linhas
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Atalho para testes e fixtures: `Table::literal(&["A"], &[&["1"]])`
    pub fn literal(headers: &[&str], rows: &[&[&str]]) -> Result<Self> {
        Self::from_rows(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    /// Adiciona uma linha. Linhas curtas são completadas com "".
    pub fn push_row(&mut self, mut row: Vec<String>) -> Result<()> {
        if row.len() > self.headers.len() {
            return Err(RoboError::Transform(TransformError::IncompatibleType(format!(
                "linha com {} células para {} colunas",
                row.len(),
                self.headers.len()
            ))));
        }
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Posição da coluna com o nome exato
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        self.rows.get(index).map(|cells| RowRef {
            headers: &self.headers,
            cells,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |cells| RowRef {
            headers: &self.headers,
            cells,
        })
    }

    /// Mantém apenas as linhas para as quais `keep` retorna true
    pub fn retain_rows(&mut self, mut keep: impl FnMut(RowRef<'_>) -> bool) {
        let headers = &self.headers;
        self.rows.retain(|cells| keep(RowRef { headers, cells }));
    }
}

/// Visão de uma linha da tabela
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    headers: &'a [String],
    cells: &'a [String],
}

impl<'a> RowRef<'a> {
    /// Valor da coluna com o nome exato
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|i| self.cells[i].as_str())
    }

    pub fn cell(&self, index: usize) -> &'a str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn cells(&self) -> &'a [String] {
        self.cells
    }

    /// Pares (cabeçalho, valor) na ordem das colunas
    pub fn pairs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(String::as_str))
    }
}

/// Erros de leitura por arquivo: caminho → mensagem
pub type ProcessingErrors = BTreeMap<String, String>;

/// Mensagens de validação por índice de linha
pub type RowErrors = BTreeMap<usize, Vec<String>>;

/// Resumo de uma execução de job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub execution_time_ms: u64,
    pub errors: Vec<String>,
}

impl JobSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Estados do pipeline para rastreamento de execução
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Reading,
    Processing,
    Writing,
    Completed,
    Failed(String),
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Ocioso"),
            PipelineState::Reading => write!(f, "Lendo"),
            PipelineState::Processing => write!(f, "Processando"),
            PipelineState::Writing => write!(f, "Gravando"),
            PipelineState::Completed => write!(f, "Concluído"),
            PipelineState::Failed(error) => write!(f, "Falhou: {}", error),
        }
    }
}

/// Eventos do pipeline para monitoramento externo
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Job iniciado
    Started {
        job_id: String,
        kind: &'static str,
        timestamp: DateTime<Utc>,
    },
    /// Estado alterado
    StateChanged {
        job_id: String,
        old_state: PipelineState,
        new_state: PipelineState,
        timestamp: DateTime<Utc>,
    },
    /// Arquivo de entrada ignorado ou com falha
    FileSkipped {
        job_id: String,
        path: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Erro ocorreu
    Error {
        job_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Job concluído
    Completed {
        job_id: String,
        summary: JobSummary,
        timestamp: DateTime<Utc>,
    },
}
