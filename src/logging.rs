//! Inicialização do `tracing` para o binário e para hosts que embutem a biblioteca.
//!
//! O filtro vem de `RUST_LOG` quando definido; senão de
//! `observability.log_level`. Os logs vão para stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::error::{ConfigError, Result};

/// Monta o filtro de níveis
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| {
            ConfigError::InvalidValue {
                param: "log_level".to_string(),
                value: format!("{} ({})", level, e),
            }
            .into()
        }),
    }
}

/// Instala o subscriber global. Chamadas repetidas são ignoradas.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_env_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Subscriber de tracing já instalado");
    }
    Ok(())
}
