//! Sistema de eventos para observabilidade dos jobs

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::traits::EventEmitter;
use crate::types::PipelineEvent;

/// Implementação simples de EventEmitter que loga eventos
#[derive(Debug, Clone, Default)]
pub struct LoggingEventEmitter;

impl LoggingEventEmitter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventEmitter for LoggingEventEmitter {
    async fn emit(&self, event: PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::Started {
                job_id,
                kind,
                timestamp,
            } => {
                info!(job_id = %job_id, kind, timestamp = %timestamp, "Job iniciado");
            }
            PipelineEvent::StateChanged {
                job_id,
                old_state,
                new_state,
                timestamp,
            } => {
                info!(
                    job_id = %job_id,
                    old_state = %old_state,
                    new_state = %new_state,
                    timestamp = %timestamp,
                    "Estado do job alterado"
                );
            }
            PipelineEvent::FileSkipped {
                job_id,
                path,
                reason,
                timestamp,
            } => {
                warn!(
                    job_id = %job_id,
                    path = %path,
                    reason = %reason,
                    timestamp = %timestamp,
                    "Arquivo ignorado"
                );
            }
            PipelineEvent::Error {
                job_id,
                error,
                timestamp,
            } => {
                error!(job_id = %job_id, error = %error, timestamp = %timestamp, "Erro no job");
            }
            PipelineEvent::Completed {
                job_id,
                summary,
                timestamp,
            } => {
                info!(
                    job_id = %job_id,
                    rows_read = summary.rows_read,
                    rows_written = summary.rows_written,
                    errors = summary.errors.len(),
                    execution_time_ms = summary.execution_time_ms,
                    timestamp = %timestamp,
                    "Job concluído"
                );
            }
        }

        Ok(())
    }
}

/// EventEmitter que armazena eventos em memória para testes
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventEmitter {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl InMemoryEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PipelineEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Retorna todos os eventos capturados
    pub fn get_events(&self) -> Vec<PipelineEvent> {
        self.lock().clone()
    }

    /// Limpa todos os eventos armazenados
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Retorna o número de eventos capturados
    pub fn event_count(&self) -> usize {
        self.lock().len()
    }
}

#[async_trait]
impl EventEmitter for InMemoryEventEmitter {
    async fn emit(&self, event: PipelineEvent) -> Result<()> {
        self.lock().push(event);
        Ok(())
    }
}
