use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, Result, RoboError};
use crate::schema::{Field, Flow, LoginChoice};
use crate::transform::columns::AliasTable;

/// Configuração principal do robô
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoboConfig {
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub runtime: RuntimeConfig,
    pub observability: ObservabilityConfig,
    /// Rótulos extras: rótulo da fonte → campo canônico
    pub aliases: BTreeMap<String, String>,
}

/// Parâmetros de normalização e conciliação
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub login_choice: LoginChoice,
    pub flow: Flow,
    pub use_fuzzy: bool,
    pub fuzzy_cutoff: f64,
    /// Fração de células iguais ao cabeçalho a partir da qual a linha é descartada
    pub header_row_threshold: f64,
    pub name_max_len: usize,
}

/// Parâmetros da planilha de saída
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub cadastro_sheet: String,
    pub inativacao_sheet: String,
    /// Cor ARGB do cabeçalho
    pub header_fill: String,
    pub max_column_width: usize,
    pub styled: bool,
    /// Colunas gravadas, na ordem de saída; vazio grava o esquema completo
    pub columns: Vec<String>,
}

/// Parâmetros de execução
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub parallel_workers: usize,
    pub max_file_size_mb: u64,
    /// Jobs concluídos mantidos no histórico de estados e métricas
    pub job_history: usize,
}

/// Configuração de observabilidade
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Formato de log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(RoboError::Config(ConfigError::InvalidValue {
                param: "log_format".to_string(),
                value: other.to_string(),
            })),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            login_choice: LoginChoice::Cpf,
            flow: Flow::SelfService,
            use_fuzzy: false,
            fuzzy_cutoff: 0.90,
            header_row_threshold: 0.4,
            name_max_len: 20,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cadastro_sheet: "Cadastro".to_string(),
            inativacao_sheet: "Inativacao".to_string(),
            header_fill: "FFDCE6F1".to_string(),
            max_column_width: 60,
            styled: true,
            columns: Vec::new(),
        }
    }
}

impl OutputConfig {
    /// Campos das colunas configuradas; nomes desconhecidos são ignorados
    pub fn selected_fields(&self) -> Vec<Field> {
        if self.columns.is_empty() {
            return Field::ALL.to_vec();
        }
        self.columns
            .iter()
            .filter_map(|name| name.trim().parse::<Field>().ok())
            .collect()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            parallel_workers: num_cpus::get(),
            max_file_size_mb: 16,
            job_history: 256,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl RoboConfig {
    /// Cria um novo builder para configuração
    pub fn builder() -> RoboConfigBuilder {
        RoboConfigBuilder::default()
    }

    /// Carrega configuração do ambiente (variáveis `ROBO_*`)
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut builder = Self::builder();

        for (key, value) in vars {
            builder = match key.as_str() {
                "ROBO_LOGIN_CHOICE" => builder.login_choice(value.parse()?),
                "ROBO_FLOW" => builder.flow(value.parse()?),
                "ROBO_USE_FUZZY" => builder.use_fuzzy(parse_var(&key, &value)?),
                "ROBO_FUZZY_CUTOFF" => builder.fuzzy_cutoff(parse_var(&key, &value)?),
                "ROBO_PARALLEL_WORKERS" => builder.parallel_workers(parse_var(&key, &value)?),
                "ROBO_MAX_FILE_SIZE_MB" => builder.max_file_size_mb(parse_var(&key, &value)?),
                "ROBO_JOB_HISTORY" => builder.job_history(parse_var(&key, &value)?),
                "ROBO_STYLED_OUTPUT" => builder.styled(parse_var(&key, &value)?),
                "ROBO_LOG_LEVEL" => builder.log_level(value),
                "ROBO_LOG_FORMAT" => builder.log_format(value.parse()?),
                _ => builder,
            };
        }

        builder.build()
    }

    /// Carrega configuração de arquivo (TOML, JSON ou YAML pela extensão)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Carrega configuração de string TOML
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from_str(toml_str, ::config::FileFormat::Toml))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Valida a configuração
    pub fn validate(&self) -> Result<()> {
        let invalid = |param: &str, value: String| -> Result<()> {
            Err(RoboError::Config(ConfigError::InvalidValue {
                param: param.to_string(),
                value,
            }))
        };

        let p = &self.processing;
        if !(0.0..=1.0).contains(&p.fuzzy_cutoff) {
            return invalid("fuzzy_cutoff", p.fuzzy_cutoff.to_string());
        }
        if !(p.header_row_threshold > 0.0 && p.header_row_threshold <= 1.0) {
            return invalid("header_row_threshold", p.header_row_threshold.to_string());
        }
        if p.name_max_len == 0 {
            return invalid("name_max_len", "0".to_string());
        }
        if self.runtime.parallel_workers == 0 {
            return invalid("parallel_workers", "0".to_string());
        }
        if self.runtime.max_file_size_mb == 0 {
            return invalid("max_file_size_mb", "0".to_string());
        }
        if self.runtime.job_history == 0 {
            return invalid("job_history", "0".to_string());
        }
        if self.output.max_column_width == 0 {
            return invalid("max_column_width", "0".to_string());
        }
        let fill = &self.output.header_fill;
        if fill.len() != 8 || !fill.chars().all(|c| c.is_ascii_hexdigit()) {
            return invalid("header_fill", fill.clone());
        }
        for (param, sheet) in [
            ("cadastro_sheet", &self.output.cadastro_sheet),
            ("inativacao_sheet", &self.output.inativacao_sheet),
        ] {
            if sheet.trim().is_empty() || sheet.chars().count() > 31 {
                return invalid(param, sheet.clone());
            }
        }
        for column in &self.output.columns {
            if column.trim().parse::<Field>().is_err() {
                return invalid("columns", column.clone());
            }
        }
        // nomes de campo dos aliases extras
        self.alias_table()?;

        Ok(())
    }

    /// Tabela de aliases padrão acrescida dos rótulos configurados
    pub fn alias_table(&self) -> Result<AliasTable> {
        AliasTable::with_extra(self.aliases.iter().map(|(k, v)| (k.clone(), v)))
    }
}

/// Converte o valor de uma variável `ROBO_*`
fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RoboError::Config(ConfigError::InvalidValue {
            param: key.to_string(),
            value: value.to_string(),
        })
    })
}

/// Builder para configuração do robô
#[derive(Default)]
pub struct RoboConfigBuilder {
    config: RoboConfig,
}

impl RoboConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_choice(mut self, choice: LoginChoice) -> Self {
        self.config.processing.login_choice = choice;
        self
    }

    pub fn flow(mut self, flow: Flow) -> Self {
        self.config.processing.flow = flow;
        self
    }

    pub fn use_fuzzy(mut self, enable: bool) -> Self {
        self.config.processing.use_fuzzy = enable;
        self
    }

    pub fn fuzzy_cutoff(mut self, cutoff: f64) -> Self {
        self.config.processing.fuzzy_cutoff = cutoff;
        self
    }

    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.config.runtime.parallel_workers = workers;
        self
    }

    pub fn max_file_size_mb(mut self, limit: u64) -> Self {
        self.config.runtime.max_file_size_mb = limit;
        self
    }

    pub fn job_history(mut self, jobs: usize) -> Self {
        self.config.runtime.job_history = jobs;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.output.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn styled(mut self, styled: bool) -> Self {
        self.config.output.styled = styled;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.observability.log_level = level.into();
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.observability.log_format = format;
        self
    }

    pub fn alias(mut self, label: impl Into<String>, field: impl Into<String>) -> Self {
        self.config.aliases.insert(label.into(), field.into());
        self
    }

    pub fn build(self) -> Result<RoboConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::columns::AliasTarget;

    #[test]
    fn test_default_config() {
        let config = RoboConfig::default();
        assert_eq!(config.processing.login_choice, LoginChoice::Cpf);
        assert_eq!(config.processing.flow, Flow::SelfService);
        assert!(!config.processing.use_fuzzy);
        assert_eq!(config.processing.fuzzy_cutoff, 0.90);
        assert_eq!(config.output.cadastro_sheet, "Cadastro");
        assert_eq!(config.observability.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RoboConfig::builder()
            .login_choice(LoginChoice::Email)
            .flow(Flow::Front)
            .parallel_workers(2)
            .log_level("debug")
            .alias("Função", "Cargo")
            .build()
            .unwrap();

        assert_eq!(config.processing.login_choice, LoginChoice::Email);
        assert_eq!(config.processing.flow, Flow::Front);
        assert_eq!(config.runtime.parallel_workers, 2);
        assert_eq!(
            config.alias_table().unwrap().lookup("funcao"),
            Some(AliasTarget::Field(Field::Cargo))
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = RoboConfig::default();
        config.processing.fuzzy_cutoff = 1.5;
        assert!(config.validate().is_err());

        let mut config = RoboConfig::default();
        config.runtime.parallel_workers = 0;
        assert!(config.validate().is_err());

        let mut config = RoboConfig::default();
        config.output.header_fill = "azul".to_string();
        assert!(config.validate().is_err());

        let result = RoboConfig::builder().alias("X", "NaoExiste").build();
        assert!(matches!(result, Err(RoboError::Config(_))));
    }

    #[test]
    fn test_config_from_vars() {
        let vars = [
            ("ROBO_LOGIN_CHOICE", "email"),
            ("ROBO_FLOW", "front"),
            ("ROBO_PARALLEL_WORKERS", "3"),
            ("ROBO_USE_FUZZY", "true"),
            ("ROBO_JOB_HISTORY", "10"),
            ("ROBO_LOG_FORMAT", "json"),
            ("PATH", "/usr/bin"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()));

        let config = RoboConfig::from_vars(vars).unwrap();
        assert_eq!(config.processing.login_choice, LoginChoice::Email);
        assert_eq!(config.processing.flow, Flow::Front);
        assert_eq!(config.runtime.parallel_workers, 3);
        assert!(config.processing.use_fuzzy);
        assert_eq!(config.runtime.job_history, 10);
        assert_eq!(config.observability.log_format, LogFormat::Json);

        let bad = [("ROBO_FLOW".to_string(), "misto".to_string())];
        assert!(RoboConfig::from_vars(bad).is_err());
    }

    #[test]
    fn test_config_from_vars_rejects_invalid_values() {
        for (key, value) in [
            ("ROBO_FUZZY_CUTOFF", "abc"),
            ("ROBO_USE_FUZZY", "nao-booleano"),
            ("ROBO_PARALLEL_WORKERS", "-1"),
            ("ROBO_MAX_FILE_SIZE_MB", "16MB"),
            ("ROBO_STYLED_OUTPUT", "sim"),
        ] {
            let result = RoboConfig::from_vars([(key.to_string(), value.to_string())]);
            match result {
                Err(RoboError::Config(ConfigError::InvalidValue { param, value: got })) => {
                    assert_eq!(param, key);
                    assert_eq!(got, value);
                }
                other => panic!("{}={} deveria falhar: {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_output_columns() {
        let config = RoboConfig::builder()
            .columns(["Operacao", "Login", "NomeCompleto"])
            .build()
            .unwrap();
        assert_eq!(
            config.output.selected_fields(),
            vec![Field::Operacao, Field::Login, Field::NomeCompleto]
        );
        assert_eq!(RoboConfig::default().output.selected_fields().len(), Field::COUNT);

        let result = RoboConfig::builder().columns(["Observacoes"]).build();
        assert!(matches!(result, Err(RoboError::Config(_))));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
        [processing]
        login_choice = "EMAIL"
        flow = "FRONT"
        fuzzy_cutoff = 0.8

        [output]
        styled = false

        [observability]
        log_level = "warn"
        log_format = "json"

        [aliases]
        "Função" = "Cargo"
        "#;

        let config = RoboConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.processing.login_choice, LoginChoice::Email);
        assert_eq!(config.processing.flow, Flow::Front);
        assert_eq!(config.processing.fuzzy_cutoff, 0.8);
        assert_eq!(config.processing.name_max_len, 20);
        assert!(!config.output.styled);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.aliases.len(), 1);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robo.toml");
        std::fs::write(&path, "[runtime]\nmax_file_size_mb = 4\n").unwrap();

        let config = RoboConfig::from_file(&path).unwrap();
        assert_eq!(config.runtime.max_file_size_mb, 4);
    }
}
