use thiserror::Error;

/// Tipo Result principal da biblioteca
pub type Result<T> = std::result::Result<T, RoboError>;

/// Erro principal da biblioteca RoboRH
#[derive(Error, Debug)]
pub enum RoboError {
    #[error("Erro de leitura: {0}")]
    Extract(#[from] ExtractError),

    #[error("Erro de transformação: {0}")]
    Transform(#[from] TransformError),

    #[error("Erro de gravação: {0}")]
    Load(#[from] LoadError),

    #[error("Erro de configuração: {0}")]
    Config(#[from] ConfigError),

    #[error("Erro de pipeline: {0}")]
    Pipeline(String),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de serialização: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Erro genérico: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Erros relacionados à leitura de arquivos de entrada
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Arquivo não encontrado: {0}")]
    FileNotFound(String),

    #[error("Formato não suportado: {0}")]
    UnsupportedFormat(String),

    #[error("Formato inválido: {0}")]
    InvalidFormat(String),

    #[error("Erro de parsing: {0}")]
    ParseError(String),

    #[error("Arquivo excede o limite de {limit_mb} MB: {path}")]
    TooLarge { path: String, limit_mb: u64 },

    #[error("Dados corrompidos: {0}")]
    CorruptedData(String),
}

/// Erros relacionados à normalização e ao casamento de registros
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Tipo de dado incompatível: {0}")]
    IncompatibleType(String),

    #[error("Coluna ausente: {0}")]
    MissingColumn(String),

    #[error("Erro de processamento: {0}")]
    ProcessingError(String),
}

/// Erros relacionados à gravação das saídas
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Erro de escrita: {0}")]
    WriteError(String),

    #[error("Caminho inválido: {0}")]
    InvalidPath(String),
}

/// Erros relacionados à configuração
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuração inválida: {0}")]
    InvalidConfig(String),

    #[error("Parâmetro obrigatório ausente: {0}")]
    MissingRequiredParameter(String),

    #[error("Valor inválido para {param}: {value}")]
    InvalidValue { param: String, value: String },

    #[error("Erro de parsing de configuração: {0}")]
    ParseError(String),
}

impl RoboError {
    /// Indica se o erro afeta apenas um arquivo do lote (o lote continua)
    pub fn is_per_file(&self) -> bool {
        matches!(self, RoboError::Extract(_) | RoboError::Io(_))
    }

    /// Retorna o código de erro
    pub fn error_code(&self) -> &'static str {
        match self {
            RoboError::Extract(_) => "EXTRACT_ERROR",
            RoboError::Transform(_) => "TRANSFORM_ERROR",
            RoboError::Load(_) => "LOAD_ERROR",
            RoboError::Config(_) => "CONFIG_ERROR",
            RoboError::Pipeline(_) => "PIPELINE_ERROR",
            RoboError::Io(_) => "IO_ERROR",
            RoboError::Serialization(_) => "SERIALIZATION_ERROR",
            RoboError::Generic(_) => "GENERIC_ERROR",
        }
    }
}

impl From<::config::ConfigError> for RoboError {
    fn from(err: ::config::ConfigError) -> Self {
        RoboError::Config(ConfigError::ParseError(err.to_string()))
    }
}

impl From<calamine::Error> for RoboError {
    fn from(err: calamine::Error) -> Self {
        match err {
            calamine::Error::Io(io_err) => RoboError::Io(io_err),
            other => RoboError::Extract(ExtractError::ParseError(other.to_string())),
        }
    }
}

impl From<zip::result::ZipError> for RoboError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io_err) => RoboError::Io(io_err),
            zip::result::ZipError::FileNotFound => RoboError::Extract(
                ExtractError::CorruptedData("entrada ausente no pacote zip".to_string()),
            ),
            other => RoboError::Extract(ExtractError::CorruptedData(other.to_string())),
        }
    }
}

#[cfg(feature = "csv")]
impl From<csv::Error> for RoboError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(io_err) => {
                RoboError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()))
            }
            csv::ErrorKind::Utf8 { .. } => {
                RoboError::Extract(ExtractError::InvalidFormat("UTF-8 inválido".to_string()))
            }
            _ => RoboError::Extract(ExtractError::ParseError(err.to_string())),
        }
    }
}
