//! Pipelines de cadastro, inativação e busca, e o executor assíncrono de jobs.
//!
//! O núcleo de cada pipeline é síncrono. O [`JobRunner`] executa cada fase em
//! `spawn_blocking`, limitado a `runtime.parallel_workers` jobs simultâneos,
//! e publica o progresso via [`EventEmitter`].

pub mod cadastro;
pub mod inativacao;
pub mod lookup;

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::config::RoboConfig;
use crate::error::{Result, RoboError, TransformError};
use crate::events::LoggingEventEmitter;
use crate::extract::SourceReader;
use crate::load::xlsx::XlsxWriter;
use crate::schema::CanonicalRecord;
use crate::traits::{EventEmitter, RecordWriter, WriteSummary};
use crate::transform::validate::check_output_columns;
use crate::types::{JobSummary, PipelineEvent, PipelineState};

use self::cadastro::{CadastroOptions, CadastroResult, RecordNormalizer};
use self::inativacao::{
    InativacaoPipeline, InativacaoReport, MatchEngine, MatchOptions, MatchStatus, TargetSource,
};
use self::lookup::SearchReport;

/// Trabalho a executar
#[derive(Debug, Clone)]
pub enum Job {
    Cadastro {
        inputs: Vec<PathBuf>,
        output: Option<PathBuf>,
    },
    Inativacao {
        base: PathBuf,
        targets: TargetSource,
        output: Option<PathBuf>,
    },
    Busca {
        base: PathBuf,
        items: Vec<String>,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Cadastro { .. } => "cadastro",
            Job::Inativacao { .. } => "inativacao",
            Job::Busca { .. } => "busca",
        }
    }
}

/// Saída de um job
#[derive(Debug, Clone)]
pub enum JobOutput {
    Cadastro {
        result: CadastroResult,
        written: Option<WriteSummary>,
    },
    Inativacao {
        report: InativacaoReport,
        written: Option<WriteSummary>,
    },
    Busca(SearchReport),
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub state: PipelineState,
    pub summary: JobSummary,
    pub output: JobOutput,
}

/// Métricas acumuladas do executor
#[derive(Debug, Clone, Default)]
pub struct RunnerMetrics {
    pub jobs_started: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub total_rows_read: usize,
    pub total_rows_written: usize,
    pub total_execution_time_ms: u64,
    pub executions: Vec<JobExecution>,
}

/// Informações de uma execução de job
#[derive(Debug, Clone)]
pub struct JobExecution {
    pub job_id: String,
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub summary: JobSummary,
    pub failed: bool,
}

/// Executor assíncrono de jobs com estado, eventos e métricas
pub struct JobRunner {
    config: Arc<RoboConfig>,
    reader: SourceReader,
    normalizer: Arc<RecordNormalizer>,
    inativacao: Arc<InativacaoPipeline>,
    semaphore: Arc<Semaphore>,
    event_emitter: Arc<dyn EventEmitter>,
    states: Mutex<BTreeMap<String, PipelineState>>,
    /// Jobs encerrados, do mais antigo ao mais recente
    finished: Mutex<VecDeque<String>>,
    metrics: Mutex<RunnerMetrics>,
    next_id: AtomicU64,
}

impl JobRunner {
    pub fn new(config: RoboConfig) -> Result<Self> {
        Self::with_event_emitter(config, Arc::new(LoggingEventEmitter::new()))
    }

    pub fn with_event_emitter(config: RoboConfig, event_emitter: Arc<dyn EventEmitter>) -> Result<Self> {
        config.validate()?;
        let aliases = Arc::new(config.alias_table()?);
        let reader = SourceReader::from_config(&config.runtime);
        let normalizer = RecordNormalizer::new(
            aliases,
            reader.clone(),
            CadastroOptions::from(&config.processing),
        )?;
        let engine = MatchEngine::new(MatchOptions::from(&config.processing));

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.runtime.parallel_workers.max(1))),
            inativacao: Arc::new(InativacaoPipeline::new(reader.clone(), engine)),
            normalizer: Arc::new(normalizer),
            reader,
            config: Arc::new(config),
            event_emitter,
            states: Mutex::new(BTreeMap::new()),
            finished: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(RunnerMetrics::default()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RoboConfig {
        &self.config
    }

    /// Estado atual de um job
    pub fn job_state(&self, job_id: &str) -> Option<PipelineState> {
        lock(&self.states).get(job_id).cloned()
    }

    /// Obtém métricas do executor
    pub fn get_metrics(&self) -> RunnerMetrics {
        lock(&self.metrics).clone()
    }

    /// Reseta métricas do executor
    pub fn reset_metrics(&self) {
        *lock(&self.metrics) = RunnerMetrics::default();
    }

    /// Executa vários jobs concorrentemente, respeitando o limite de workers
    pub async fn run_all(&self, jobs: Vec<Job>) -> Vec<Result<JobReport>> {
        futures::future::join_all(jobs.into_iter().map(|job| self.run(job))).await
    }

    /// Executa um job até o fim
    pub async fn run(&self, job: Job) -> Result<JobReport> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RoboError::Pipeline(format!("Executor encerrado: {}", e)))?;

        let job_id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let kind = job.kind();
        let start_time = Instant::now();
        lock(&self.states).insert(job_id.clone(), PipelineState::Idle);
        lock(&self.metrics).jobs_started += 1;

        self.event_emitter
            .emit(PipelineEvent::Started {
                job_id: job_id.clone(),
                kind,
                timestamp: Utc::now(),
            })
            .await?;
        tracing::info!(job_id = %job_id, kind, "Iniciando job");

        let outcome = match job {
            Job::Cadastro { inputs, output } => self.run_cadastro(&job_id, inputs, output).await,
            Job::Inativacao {
                base,
                targets,
                output,
            } => self.run_inativacao(&job_id, base, targets, output).await,
            Job::Busca { base, items } => self.run_busca(&job_id, base, items).await,
        };

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        match outcome {
            Ok((mut summary, output, failure)) => {
                summary.execution_time_ms = elapsed_ms;
                let state = match failure {
                    Some(error) => {
                        self.fail(&job_id, error).await?;
                        self.job_state(&job_id).unwrap_or_default()
                    }
                    None => {
                        self.set_state(&job_id, PipelineState::Completed).await?;
                        PipelineState::Completed
                    }
                };
                let failed = matches!(state, PipelineState::Failed(_));
                self.event_emitter
                    .emit(PipelineEvent::Completed {
                        job_id: job_id.clone(),
                        summary: summary.clone(),
                        timestamp: Utc::now(),
                    })
                    .await?;
                self.record_execution(&job_id, kind, &summary, failed);

                tracing::info!(
                    job_id = %job_id,
                    rows_read = summary.rows_read,
                    rows_written = summary.rows_written,
                    execution_time_ms = elapsed_ms,
                    "Job concluído"
                );
                Ok(JobReport {
                    job_id,
                    state,
                    summary,
                    output,
                })
            }
            Err(e) => {
                self.fail(&job_id, e.to_string()).await?;
                let summary = JobSummary {
                    execution_time_ms: elapsed_ms,
                    errors: vec![e.to_string()],
                    ..JobSummary::default()
                };
                self.record_execution(&job_id, kind, &summary, true);
                Err(e)
            }
        }
    }

    async fn run_cadastro(
        &self,
        job_id: &str,
        inputs: Vec<PathBuf>,
        output: Option<PathBuf>,
    ) -> Result<(JobSummary, JobOutput, Option<String>)> {
        self.set_state(job_id, PipelineState::Reading).await?;
        let normalizer = Arc::clone(&self.normalizer);
        let (rows, file_errors) = blocking(move || normalizer.extract_files(&inputs)).await?;

        for (path, reason) in &file_errors {
            self.event_emitter
                .emit(PipelineEvent::FileSkipped {
                    job_id: job_id.to_string(),
                    path: path.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                })
                .await?;
        }

        self.set_state(job_id, PipelineState::Processing).await?;
        let normalizer = Arc::clone(&self.normalizer);
        let result = blocking(move || normalizer.normalize_rows(rows, file_errors)).await?;

        let written = match output {
            Some(path) if !result.is_empty() => {
                self.set_state(job_id, PipelineState::Writing).await?;
                let sheet = self.config.output.cadastro_sheet.clone();
                Some(self.write(result.records.clone(), path, sheet).await?)
            }
            _ => None,
        };

        let summary = JobSummary {
            rows_read: result.rows_extracted,
            rows_written: written.as_ref().map_or(0, |w| w.rows_written),
            execution_time_ms: 0,
            errors: result
                .file_errors
                .iter()
                .map(|(path, error)| format!("{}: {}", path, error))
                .collect(),
        };
        Ok((summary, JobOutput::Cadastro { result, written }, None))
    }

    async fn run_inativacao(
        &self,
        job_id: &str,
        base: PathBuf,
        targets: TargetSource,
        output: Option<PathBuf>,
    ) -> Result<(JobSummary, JobOutput, Option<String>)> {
        self.set_state(job_id, PipelineState::Reading).await?;
        let pipeline = Arc::clone(&self.inativacao);
        let loaded = blocking(move || pipeline.load_inputs(&base, &targets)).await?;

        let (report, rows_read) = match loaded {
            Ok((table, targets)) => {
                self.set_state(job_id, PipelineState::Processing).await?;
                let rows_read = table.len();
                let pipeline = Arc::clone(&self.inativacao);
                let report = blocking(move || pipeline.engine().run(&table, &targets)).await?;
                (report, rows_read)
            }
            Err(e) => {
                self.event_emitter
                    .emit(PipelineEvent::Error {
                        job_id: job_id.to_string(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await?;
                (InativacaoReport::failed(e.to_string()), 0)
            }
        };

        let written = match output {
            Some(path) if !report.is_empty() => {
                self.set_state(job_id, PipelineState::Writing).await?;
                let sheet = self.config.output.inativacao_sheet.clone();
                Some(self.write(report.records.clone(), path, sheet).await?)
            }
            _ => None,
        };

        let failure = match &report.status {
            MatchStatus::Failed { error } => Some(error.clone()),
            _ => None,
        };
        let summary = JobSummary {
            rows_read,
            rows_written: written.as_ref().map_or(0, |w| w.rows_written),
            execution_time_ms: 0,
            errors: failure.iter().cloned().collect(),
        };
        Ok((summary, JobOutput::Inativacao { report, written }, failure))
    }

    async fn run_busca(
        &self,
        job_id: &str,
        base: PathBuf,
        items: Vec<String>,
    ) -> Result<(JobSummary, JobOutput, Option<String>)> {
        self.set_state(job_id, PipelineState::Reading).await?;
        let reader = self.reader.clone();
        let table = blocking(move || reader.read_table(&base)).await??;

        self.set_state(job_id, PipelineState::Processing).await?;
        let rows_read = table.len();
        let report = blocking(move || lookup::search(&table, &items)).await?;

        let summary = JobSummary {
            rows_read,
            ..JobSummary::default()
        };
        Ok((summary, JobOutput::Busca(report), None))
    }

    async fn write(
        &self,
        records: Vec<CanonicalRecord>,
        path: PathBuf,
        sheet: String,
    ) -> Result<WriteSummary> {
        let writer = XlsxWriter::from_config(&self.config.output, &sheet);
        let missing = check_output_columns(&writer.headers());
        if !missing.is_empty() {
            return Err(TransformError::MissingColumn(missing.join("; ")).into());
        }

        blocking(move || writer.write_records(&records, &path)).await?
    }

    /// Altera o estado do job e emite evento
    async fn set_state(&self, job_id: &str, new_state: PipelineState) -> Result<()> {
        let old_state = {
            let mut states = lock(&self.states);
            states
                .insert(job_id.to_string(), new_state.clone())
                .unwrap_or_default()
        };

        self.event_emitter
            .emit(PipelineEvent::StateChanged {
                job_id: job_id.to_string(),
                old_state,
                new_state,
                timestamp: Utc::now(),
            })
            .await
    }

    async fn fail(&self, job_id: &str, error: String) -> Result<()> {
        tracing::error!(job_id = %job_id, error = %error, "Job falhou");
        self.set_state(job_id, PipelineState::Failed(error)).await
    }

    /// Registra uma execução nas métricas e descarta o histórico excedente
    fn record_execution(&self, job_id: &str, kind: &'static str, summary: &JobSummary, failed: bool) {
        let history = self.config.runtime.job_history;
        let mut metrics = lock(&self.metrics);
        if failed {
            metrics.jobs_failed += 1;
        } else {
            metrics.jobs_completed += 1;
        }
        metrics.total_rows_read += summary.rows_read;
        metrics.total_rows_written += summary.rows_written;
        metrics.total_execution_time_ms += summary.execution_time_ms;
        metrics.executions.push(JobExecution {
            job_id: job_id.to_string(),
            kind,
            timestamp: Utc::now(),
            summary: summary.clone(),
            failed,
        });
        if metrics.executions.len() > history {
            let excess = metrics.executions.len() - history;
            metrics.executions.drain(..excess);
        }
        drop(metrics);

        let mut finished = lock(&self.finished);
        finished.push_back(job_id.to_string());
        while finished.len() > history {
            if let Some(oldest) = finished.pop_front() {
                lock(&self.states).remove(&oldest);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Executa trabalho síncrono fora das threads do runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RoboError::Pipeline(format!("Tarefa interrompida: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventEmitter;
    use crate::extract::docx::tests::write_docx;
    use crate::schema::Field;
    use crate::types::Table;

    fn runner(emitter: Arc<InMemoryEventEmitter>) -> JobRunner {
        let config = RoboConfig::builder().parallel_workers(2).build().unwrap();
        JobRunner::with_event_emitter(config, emitter).unwrap()
    }

    fn states(emitter: &InMemoryEventEmitter) -> Vec<PipelineState> {
        emitter
            .get_events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::StateChanged { new_state, .. } => Some(new_state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_cadastro_job_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let ficha = dir.path().join("ficha.docx");
        write_docx(&ficha, &["Nome Completo: Ana Souza", "CPF: 111.222.333-44", "Solicitante: S"]);
        let broken = dir.path().join("quebrado.xlsx");
        std::fs::write(&broken, b"nao e zip").unwrap();
        let output = dir.path().join("saida.xlsx");

        let emitter = Arc::new(InMemoryEventEmitter::new());
        let runner = runner(emitter.clone());
        let report = runner
            .run(Job::Cadastro {
                inputs: vec![ficha, broken],
                output: Some(output.clone()),
            })
            .await
            .unwrap();

        assert_eq!(report.state, PipelineState::Completed);
        assert_eq!(report.summary.rows_read, 1);
        assert_eq!(report.summary.rows_written, 1);
        assert_eq!(report.summary.errors.len(), 1);
        assert!(output.exists());

        match &report.output {
            JobOutput::Cadastro { result, written } => {
                assert_eq!(result.records[0].get(Field::Nome), "ANA");
                assert_eq!(written.as_ref().map(|w| w.rows_written), Some(1));
            }
            other => panic!("saída inesperada: {:?}", other),
        }

        assert_eq!(
            states(&emitter),
            vec![
                PipelineState::Reading,
                PipelineState::Processing,
                PipelineState::Writing,
                PipelineState::Completed,
            ]
        );
        assert!(emitter
            .get_events()
            .iter()
            .any(|e| matches!(e, PipelineEvent::FileSkipped { .. })));

        let metrics = runner.get_metrics();
        assert_eq!(metrics.jobs_started, 1);
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.total_rows_written, 1);
    }

    #[tokio::test]
    async fn test_inativacao_job_with_missing_base_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Arc::new(InMemoryEventEmitter::new());
        let runner = runner(emitter.clone());

        let report = runner
            .run(Job::Inativacao {
                base: dir.path().join("nao-existe.xlsx"),
                targets: TargetSource::Text("11122233344".to_string()),
                output: None,
            })
            .await
            .unwrap();

        assert!(matches!(report.state, PipelineState::Failed(_)));
        match &report.output {
            JobOutput::Inativacao { report, .. } => {
                assert!(matches!(report.status, MatchStatus::Failed { .. }));
                assert_eq!(report.stats.total_matches, 0);
            }
            other => panic!("saída inesperada: {:?}", other),
        }
        assert_eq!(runner.get_metrics().jobs_failed, 1);
        assert_eq!(runner.job_state(&report.job_id), Some(report.state.clone()));
    }

    #[tokio::test]
    async fn test_concurrent_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().join("base.xlsx");
        let base = Table::literal(
            &["CPF", "NomeCompleto", "Status"],
            &[
                &["11122233344", "Maria Silva", "ATIVO"],
                &["33344455566", "João Souza", "INATIVO"],
            ],
        )
        .unwrap();
        XlsxWriter::default().write_table(&base, &base_path).unwrap();

        let runner = runner(Arc::new(InMemoryEventEmitter::new()));
        let results = runner
            .run_all(vec![
                Job::Inativacao {
                    base: base_path.clone(),
                    targets: TargetSource::Text("111.222.333-44".to_string()),
                    output: Some(dir.path().join("inativacao.xlsx")),
                },
                Job::Inativacao {
                    base: base_path.clone(),
                    targets: TargetSource::Text("33344455566".to_string()),
                    output: None,
                },
                Job::Busca {
                    base: base_path.clone(),
                    items: vec!["João Souza".to_string()],
                },
            ])
            .await;

        assert_eq!(results.len(), 3);
        let reports: Vec<JobReport> = results.into_iter().map(|r| r.unwrap()).collect();

        match &reports[0].output {
            JobOutput::Inativacao { report, written } => {
                assert_eq!(report.stats.cpf_matches, 1);
                assert_eq!(written.as_ref().map(|w| w.rows_written), Some(1));
            }
            other => panic!("saída inesperada: {:?}", other),
        }
        match &reports[1].output {
            JobOutput::Inativacao { report, written } => {
                assert_eq!(report.status, MatchStatus::OnlyInactive { inactive_hits: 1 });
                assert!(written.is_none());
            }
            other => panic!("saída inesperada: {:?}", other),
        }
        match &reports[2].output {
            JobOutput::Busca(search) => {
                assert_eq!(search.items[0].status_atual, "INATIVO");
            }
            other => panic!("saída inesperada: {:?}", other),
        }

        let ids: std::collections::HashSet<&str> =
            reports.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(runner.get_metrics().jobs_completed, 3);
    }

    #[tokio::test]
    async fn test_busca_with_missing_base_is_an_error() {
        let runner = runner(Arc::new(InMemoryEventEmitter::new()));
        let result = runner
            .run(Job::Busca {
                base: PathBuf::from("/nao/existe.xlsx"),
                items: vec!["11122233344".to_string()],
            })
            .await;

        assert!(result.is_err());
        assert_eq!(runner.get_metrics().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_missing_required_output_column_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let ficha = dir.path().join("ficha.docx");
        write_docx(&ficha, &["Nome Completo: Ana Souza", "CPF: 111.222.333-44"]);
        let output = dir.path().join("saida.xlsx");

        let config = RoboConfig::builder()
            .parallel_workers(1)
            .columns([
                "Operacao",
                "NomeCompleto",
                "Nome",
                "SobreNome",
                "CodigoIntegracao",
                "EmpresaCCustoParaUsuario",
            ])
            .build()
            .unwrap();
        let runner = JobRunner::with_event_emitter(config, Arc::new(InMemoryEventEmitter::new())).unwrap();

        let result = runner
            .run(Job::Cadastro {
                inputs: vec![ficha],
                output: Some(output.clone()),
            })
            .await;

        match result {
            Err(RoboError::Transform(TransformError::MissingColumn(message))) => {
                assert!(message.contains("Coluna obrigatória ausente: Login"));
            }
            other => panic!("resultado inesperado: {:?}", other.map(|r| r.job_id)),
        }
        assert!(!output.exists());
        assert!(matches!(runner.job_state("job-1"), Some(PipelineState::Failed(_))));
        assert_eq!(runner.get_metrics().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_selected_columns_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let ficha = dir.path().join("ficha.docx");
        write_docx(&ficha, &["Nome Completo: Ana Souza", "CPF: 111.222.333-44"]);
        let output = dir.path().join("saida.xlsx");

        let columns = [
            "Operacao",
            "Login",
            "NomeCompleto",
            "Nome",
            "SobreNome",
            "CodigoIntegracao",
            "EmpresaCCustoParaUsuario",
        ];
        let config = RoboConfig::builder().columns(columns).build().unwrap();
        let runner = JobRunner::with_event_emitter(config, Arc::new(InMemoryEventEmitter::new())).unwrap();
        let report = runner
            .run(Job::Cadastro {
                inputs: vec![ficha],
                output: Some(output.clone()),
            })
            .await
            .unwrap();
        assert_eq!(report.state, PipelineState::Completed);

        let table = SourceReader::default().read_table(&output).unwrap();
        assert_eq!(table.headers(), columns.as_slice());
        assert_eq!(table.row(0).unwrap().get("Login"), Some("111222333-44"));
    }

    #[tokio::test]
    async fn test_job_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoboConfig::builder().job_history(2).build().unwrap();
        let runner = JobRunner::with_event_emitter(config, Arc::new(InMemoryEventEmitter::new())).unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let report = runner
                .run(Job::Inativacao {
                    base: dir.path().join("nao-existe.xlsx"),
                    targets: TargetSource::Text("11122233344".to_string()),
                    output: None,
                })
                .await
                .unwrap();
            ids.push(report.job_id);
        }

        assert_eq!(runner.job_state(&ids[0]), None);
        assert!(runner.job_state(&ids[1]).is_some());
        assert!(runner.job_state(&ids[2]).is_some());

        let metrics = runner.get_metrics();
        assert_eq!(metrics.jobs_failed, 3);
        let kept: Vec<&str> = metrics.executions.iter().map(|e| e.job_id.as_str()).collect();
        assert_eq!(kept, vec![ids[1].as_str(), ids[2].as_str()]);
    }
}
