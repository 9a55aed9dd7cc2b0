//! # RoboRH - Normalização de fichas de RH
//!
//! Motor que transforma planilhas e fichas `.docx` heterogêneas em registros
//! de um esquema canônico de 32 colunas, pronto para importação num sistema
//! de gestão de usuários.
//!
//! ## Pipelines
//!
//! - **Cadastro**: lê fichas e planilhas, mapeia rótulos para o esquema,
//!   normaliza nomes, CPF e flags S/N e gera registros `INSERT`.
//! - **Inativação**: concilia uma lista de desligados com a base de usuários
//!   (CPF, depois nome, depois e-mail; só usuários ativos) e gera registros
//!   `DELETE`.
//! - **Busca**: localiza CPFs, nomes e e-mails na base para conferência antes
//!   de confirmar uma inativação.
//!
//! ## Exemplo Rápido
//!
//! ```rust,no_run
//! use roborh::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runner = JobRunner::new(RoboConfig::default())?;
//!     let report = runner
//!         .run(Job::Cadastro {
//!             inputs: vec!["ficha.docx".into(), "planilha.xlsx".into()],
//!             output: Some("cadastro.xlsx".into()),
//!         })
//!         .await?;
//!     println!("{} registros gravados", report.summary.rows_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Arquitetura
//!
//! ### Extract
//! Leitores de planilhas (`calamine`, `csv`) e de documentos (`zip` + `quick-xml`).
//!
//! ### Transform
//! Funções puras de texto, nomes, mapeamento de colunas e validação.
//!
//! ### Load
//! Gravação de `.xlsx` com cabeçalho estilizado e relatórios JSON.

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod traits;
pub mod transform;
pub mod types;

// Re-exports para facilitar o uso
pub use crate::config::RoboConfig;
pub use error::{Result, RoboError};
pub use events::{InMemoryEventEmitter, LoggingEventEmitter};
pub use pipeline::{Job, JobOutput, JobReport, JobRunner};
pub use schema::{CanonicalRecord, Field, Flow, LoginChoice};
pub use traits::*;
pub use types::{JobSummary, PipelineEvent, PipelineState, Table};

/// Prelude com imports mais comuns
pub mod prelude {
    pub use crate::config::{LogFormat, RoboConfig};
    pub use crate::error::{Result, RoboError};
    pub use crate::events::{InMemoryEventEmitter, LoggingEventEmitter};
    pub use crate::schema::{model_columns, CanonicalRecord, Field, Flow, LoginChoice};
    pub use crate::traits::{DocumentReader, EventEmitter, RecordWriter, TabularReader};
    pub use crate::types::{JobSummary, PipelineEvent, PipelineState, Table};

    // Extract
    pub use crate::extract::{Extracted, SourceKind, SourceReader};

    // Pipelines
    pub use crate::pipeline::cadastro::{
        CadastroOptions, CadastroOutcome, CadastroResult, RecordNormalizer,
    };
    pub use crate::pipeline::inativacao::{
        InativacaoPipeline, InativacaoReport, MatchEngine, MatchOptions, MatchStats,
        MatchStatus, TargetEntry, TargetList, TargetSource,
    };
    pub use crate::pipeline::lookup::{confirm, search, SearchReport, SelectedUser};
    pub use crate::pipeline::{Job, JobOutput, JobReport, JobRunner};

    // Load
    pub use crate::load::json::JsonReportWriter;
    pub use crate::load::xlsx::XlsxWriter;
}

/// Informações sobre a versão da biblioteca
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Informações sobre a biblioteca
pub fn about() -> &'static str {
    env!("CARGO_PKG_DESCRIPTION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_about() {
        assert!(!about().is_empty());
    }
}
