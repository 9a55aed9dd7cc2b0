//! Esquema canônico de saída: 32 colunas fixas, sempre na mesma ordem.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, RoboError};

/// Operação gravada na coluna `Operacao`
pub const OPERACAO_INSERT: &str = "INSERT";
pub const OPERACAO_DELETE: &str = "DELETE";

/// Valor fixo de `CodigoIntegracao`
pub const CODIGO_INTEGRACAO: &str = "AUT";

macro_rules! canonical_fields {
    ($($variant:ident),+ $(,)?) => {
        /// Campo do esquema canônico
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Field {
            $($variant),+
        }

        impl Field {
            /// Quantidade de colunas do esquema
            pub const COUNT: usize = [$(stringify!($variant)),+].len();

            /// Todos os campos, na ordem de saída
            pub const ALL: [Field; Self::COUNT] = [$(Field::$variant),+];

            /// Nome da coluna na saída
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Field::$variant => stringify!($variant)),+
                }
            }
        }

        impl FromStr for Field {
            type Err = RoboError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Field::$variant),)+
                    other => Err(RoboError::Config(ConfigError::InvalidValue {
                        param: "campo".to_string(),
                        value: other.to_string(),
                    })),
                }
            }
        }
    };
}

canonical_fields!(
    Operacao,
    UserId,
    Login,
    CodigoCCustoCliente,
    DescricaoCCustoCliente,
    NomeEmpresa,
    CodigoCCustoEmpresa,
    DescricaoCCustoEmpresa,
    EmpresaCCustoParaUsuario,
    NroMatricula,
    Nome,
    SobreNome,
    NomeCompleto,
    Email,
    Telefone,
    Cargo,
    Departamento,
    Nivel,
    Endereco,
    Cidade,
    Estado,
    CEP,
    Solicitante,
    Vip,
    ViajanteMasterNacional,
    ViajanteMasterInternacional,
    SolicitanteMaster,
    MasterAdiantamento,
    MasterReembolso,
    Terceiro,
    CodigoIntegracao,
    Status,
);

impl Field {
    /// Flags S/N do esquema
    pub const FLAGS: [Field; 8] = [
        Field::Solicitante,
        Field::Terceiro,
        Field::Vip,
        Field::ViajanteMasterNacional,
        Field::ViajanteMasterInternacional,
        Field::SolicitanteMaster,
        Field::MasterAdiantamento,
        Field::MasterReembolso,
    ];

    /// Flags de perfil definidas pelo fluxo (SELF/FRONT)
    pub const PROFILE_FLAGS: [Field; 6] = [
        Field::Vip,
        Field::ViajanteMasterNacional,
        Field::ViajanteMasterInternacional,
        Field::SolicitanteMaster,
        Field::MasterAdiantamento,
        Field::MasterReembolso,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_flag(self) -> bool {
        Self::FLAGS.contains(&self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nomes das colunas, na ordem de saída
pub fn model_columns() -> Vec<&'static str> {
    Field::ALL.iter().map(Field::as_str).collect()
}

/// Registro no esquema canônico. Todas as chaves existem sempre.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CanonicalRecord {
    values: [String; Field::COUNT],
}

impl CanonicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    /// Aplica `f` ao valor atual do campo
    pub fn update(&mut self, field: Field, f: impl FnOnce(&str) -> String) {
        let current = std::mem::take(&mut self.values[field.index()]);
        self.values[field.index()] = f(&current);
    }

    /// Itera pares (campo, valor) na ordem de saída
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL.iter().map(move |f| (*f, self.get(*f)))
    }

    /// Valores na ordem de saída
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::ALL.len()))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}

/// Estratégia de geração do Login no cadastro
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginChoice {
    #[default]
    Cpf,
    Email,
}

impl FromStr for LoginChoice {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CPF" => Ok(LoginChoice::Cpf),
            "EMAIL" | "E-MAIL" => Ok(LoginChoice::Email),
            other => Err(RoboError::Config(ConfigError::InvalidValue {
                param: "login_choice".to_string(),
                value: other.to_string(),
            })),
        }
    }
}

/// Fluxo de cadastro, define as flags de perfil
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flow {
    #[default]
    #[serde(rename = "SELF")]
    SelfService,
    Front,
}

impl FromStr for Flow {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SELF" => Ok(Flow::SelfService),
            "FRONT" => Ok(Flow::Front),
            other => Err(RoboError::Config(ConfigError::InvalidValue {
                param: "flow".to_string(),
                value: other.to_string(),
            })),
        }
    }
}
