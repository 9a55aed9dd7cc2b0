//! CLI do RoboRH.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use roborh::config::{LogFormat, RoboConfig};
use roborh::load::json::JsonReportWriter;
use roborh::logging::init_tracing;
use roborh::pipeline::cadastro::CadastroOutcome;
use roborh::pipeline::inativacao::{MatchStatus, TargetSource};
use roborh::{Flow, Job, JobOutput, JobRunner, LoginChoice};

/// Sem dados para processar
const EXIT_NOTHING_PROCESSED: u8 = 2;
/// Só usuários inativos corresponderam
const EXIT_ONLY_INACTIVE: u8 = 3;

#[derive(Parser)]
#[command(
    name = "roborh",
    version,
    about = "Normalização de fichas de RH: cadastro e inativação de usuários"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Arquivo de configuração TOML (senão, variáveis ROBO_*)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Formato dos logs
    #[arg(long = "log-format", value_enum, global = true)]
    log_format: Option<LogFormatArg>,

    /// Nível dos logs (ex.: info, debug, roborh=trace)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Gera a planilha de cadastro (INSERT) a partir de fichas e planilhas
    Cadastro(CadastroArgs),
    /// Gera a planilha de inativação (DELETE) conciliando base e lista
    Inativacao(InativacaoArgs),
    /// Procura CPFs, nomes e e-mails na base
    Buscar(BuscarArgs),
}

#[derive(Args)]
struct CadastroArgs {
    /// Fichas .docx e planilhas .xlsx/.xls/.ods/.csv
    #[arg(value_name = "ARQUIVOS", required = true)]
    files: Vec<PathBuf>,

    #[arg(long, value_enum)]
    login: Option<LoginArg>,

    #[arg(long, value_enum)]
    flow: Option<FlowArg>,

    /// Planilha de saída
    #[arg(short, long, value_name = "PATH", default_value = "cadastro.xlsx")]
    output: PathBuf,

    /// Grava os erros de validação por linha em JSON
    #[arg(long, value_name = "PATH")]
    erros: Option<PathBuf>,
}

#[derive(Args)]
struct InativacaoArgs {
    /// Base de usuários
    #[arg(long, value_name = "PATH")]
    base: PathBuf,

    /// Planilha com a lista de desligados
    #[arg(long, value_name = "PATH", conflicts_with = "texto", required_unless_present = "texto")]
    lista: Option<PathBuf>,

    /// Arquivo texto com um CPF, nome ou e-mail por linha
    #[arg(long, value_name = "PATH")]
    texto: Option<PathBuf>,

    #[arg(long)]
    fuzzy: bool,

    #[arg(long)]
    cutoff: Option<f64>,

    /// Planilha de saída
    #[arg(short, long, value_name = "PATH", default_value = "inativacao.xlsx")]
    output: PathBuf,

    /// Grava as estatísticas da conciliação em JSON
    #[arg(long, value_name = "PATH")]
    stats: Option<PathBuf>,

    /// Grava a prévia (amostra e registros) em JSON
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,
}

#[derive(Args)]
struct BuscarArgs {
    #[arg(long, value_name = "PATH")]
    base: PathBuf,

    /// Arquivo texto com um item por linha
    #[arg(long, value_name = "PATH")]
    itens: PathBuf,

    /// Grava o resultado em JSON (senão, imprime na saída padrão)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LoginArg {
    Cpf,
    Email,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlowArg {
    #[value(name = "self")]
    SelfService,
    Front,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("erro: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => RoboConfig::from_file(path)
            .with_context(|| format!("falha ao ler {}", path.display()))?,
        None => RoboConfig::from_env()?,
    };

    if let Some(format) = cli.log_format {
        config.observability.log_format = match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    init_tracing(&config.observability)?;

    match cli.command {
        Command::Cadastro(args) => cadastro(config, args).await,
        Command::Inativacao(args) => inativacao(config, args).await,
        Command::Buscar(args) => buscar(config, args).await,
    }
}

async fn cadastro(mut config: RoboConfig, args: CadastroArgs) -> anyhow::Result<ExitCode> {
    if let Some(login) = args.login {
        config.processing.login_choice = match login {
            LoginArg::Cpf => LoginChoice::Cpf,
            LoginArg::Email => LoginChoice::Email,
        };
    }
    if let Some(flow) = args.flow {
        config.processing.flow = match flow {
            FlowArg::SelfService => Flow::SelfService,
            FlowArg::Front => Flow::Front,
        };
    }

    let runner = JobRunner::new(config)?;
    let report = runner
        .run(Job::Cadastro {
            inputs: args.files,
            output: Some(args.output.clone()),
        })
        .await?;

    let JobOutput::Cadastro { result, .. } = report.output else {
        anyhow::bail!("saída inesperada do job {}", report.job_id);
    };

    for (path, error) in &result.file_errors {
        eprintln!("aviso: {}: {}", path, error);
    }
    if let Some(path) = &args.erros {
        JsonReportWriter::new().write(&result.row_errors, path)?;
    }

    match result.outcome {
        CadastroOutcome::Processed => {
            println!(
                "{} registro(s) gravados em {} ({} linha(s) com avisos)",
                result.records.len(),
                args.output.display(),
                result.row_errors.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        CadastroOutcome::NothingExtracted | CadastroOutcome::NoIdentifiableRows => {
            eprintln!("Nenhum dado processado");
            Ok(ExitCode::from(EXIT_NOTHING_PROCESSED))
        }
    }
}

async fn inativacao(mut config: RoboConfig, args: InativacaoArgs) -> anyhow::Result<ExitCode> {
    if args.fuzzy {
        config.processing.use_fuzzy = true;
    }
    if let Some(cutoff) = args.cutoff {
        config.processing.fuzzy_cutoff = cutoff;
    }

    let targets = match (&args.lista, &args.texto) {
        (Some(path), _) => TargetSource::Table(path.clone()),
        (None, Some(path)) => TargetSource::Text(
            std::fs::read_to_string(path)
                .with_context(|| format!("falha ao ler {}", path.display()))?,
        ),
        (None, None) => anyhow::bail!("Envie a lista ou insira os nomes/CPFs"),
    };

    let runner = JobRunner::new(config)?;
    let report = runner
        .run(Job::Inativacao {
            base: args.base,
            targets,
            output: Some(args.output.clone()),
        })
        .await?;

    let JobOutput::Inativacao { report, .. } = report.output else {
        anyhow::bail!("saída inesperada do job {}", report.job_id);
    };

    let writer = JsonReportWriter::new();
    if let Some(path) = &args.stats {
        writer.write(&report.stats, path)?;
    }
    if let Some(path) = &args.preview {
        writer.write(&report.preview(), path)?;
    }

    match &report.status {
        MatchStatus::Matched => {
            println!(
                "{} usuário(s) para inativação gravados em {} (CPF={}, Nome={}, Email={})",
                report.records.len(),
                args.output.display(),
                report.stats.cpf_matches,
                report.stats.name_matches,
                report.stats.email_matches
            );
            Ok(ExitCode::SUCCESS)
        }
        MatchStatus::OnlyInactive { inactive_hits } => {
            eprintln!(
                "Nenhuma linha ativa correspondeu; foram encontradas {} correspondência(s) INATIVAS.",
                inactive_hits
            );
            Ok(ExitCode::from(EXIT_ONLY_INACTIVE))
        }
        MatchStatus::NoMatches => {
            eprintln!("Nenhum dado processado para inativação");
            Ok(ExitCode::from(EXIT_NOTHING_PROCESSED))
        }
        MatchStatus::Failed { error } => anyhow::bail!("{}", error),
    }
}

async fn buscar(config: RoboConfig, args: BuscarArgs) -> anyhow::Result<ExitCode> {
    let text = std::fs::read_to_string(&args.itens)
        .with_context(|| format!("falha ao ler {}", args.itens.display()))?;
    let items: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        eprintln!("Nenhum item para buscar");
        return Ok(ExitCode::from(EXIT_NOTHING_PROCESSED));
    }

    let runner = JobRunner::new(config)?;
    let report = runner
        .run(Job::Busca {
            base: args.base,
            items,
        })
        .await?;

    let JobOutput::Busca(search) = report.output else {
        anyhow::bail!("saída inesperada do job {}", report.job_id);
    };

    let writer = JsonReportWriter::new();
    match &args.output {
        Some(path) => writer.write(&search, path)?,
        None => println!("{}", writer.to_string(&search)?),
    }
    Ok(ExitCode::SUCCESS)
}
