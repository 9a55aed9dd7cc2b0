//! # Mapeamento de colunas
//!
//! Resolve rótulos heterogêneos de planilhas e fichas para os campos do
//! esquema canônico. A tabela de aliases é construída uma vez na
//! inicialização e compartilhada somente para leitura.
//!
//! A detecção dinâmica opera sobre pares (rótulo normalizado, coluna original)
//! na ordem em que as colunas aparecem na fonte; quando mais de uma coluna casa
//! com o mesmo padrão, vence a primeira.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use super::text::{collapse_upper, upper_no_accents};
use crate::error::{ConfigError, RoboError};
use crate::schema::Field;
use crate::types::{RowRef, Table};

/// Destino de um alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasTarget {
    /// Campo do esquema canônico
    Field(Field),
    /// CPF bruto, usado para Login e validação; não vai para a saída
    Cpf,
    /// "Envia dados de acesso?", lido da ficha mas descartado na saída
    SendAccessData,
}

impl FromStr for AliasTarget {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CPF" => Ok(AliasTarget::Cpf),
            "EnviaDadosAcesso" => Ok(AliasTarget::SendAccessData),
            other => other.parse::<Field>().map(AliasTarget::Field).map_err(|_| {
                RoboError::Config(ConfigError::InvalidValue {
                    param: "aliases".to_string(),
                    value: other.to_string(),
                })
            }),
        }
    }
}

impl fmt::Display for AliasTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasTarget::Field(field) => write!(f, "{}", field),
            AliasTarget::Cpf => write!(f, "CPF"),
            AliasTarget::SendAccessData => write!(f, "EnviaDadosAcesso"),
        }
    }
}

/// Rótulos conhecidos das fichas de cadastro, na ordem de extração
const DEFAULT_ALIASES: &[(&str, AliasTarget)] = &[
    ("CPF", AliasTarget::Cpf),
    ("CPF (SEM PONTOS)", AliasTarget::Cpf),
    ("EMPRESA (DO GRUPO)", AliasTarget::Field(Field::NomeEmpresa)),
    ("Empresa", AliasTarget::Field(Field::NomeEmpresa)),
    ("Centro de custo", AliasTarget::Field(Field::CodigoCCustoEmpresa)),
    ("Centro_de_Custo", AliasTarget::Field(Field::CodigoCCustoEmpresa)),
    ("CODIGO - CENTRO DE CUSTO", AliasTarget::Field(Field::CodigoCCustoEmpresa)),
    ("DESCRICAO - CENTRO DE CUSTO", AliasTarget::Field(Field::DescricaoCCustoEmpresa)),
    ("Descrição Centro de Custo", AliasTarget::Field(Field::DescricaoCCustoEmpresa)),
    ("Codigo_Centro_De_Custo", AliasTarget::Field(Field::DescricaoCCustoEmpresa)),
    ("MATRICULA", AliasTarget::Field(Field::NroMatricula)),
    ("Matricula", AliasTarget::Field(Field::NroMatricula)),
    ("NroMatricula", AliasTarget::Field(Field::NroMatricula)),
    ("NOME", AliasTarget::Field(Field::Nome)),
    ("SOBRENOME (ATE 20 CARACTERES)", AliasTarget::Field(Field::SobreNome)),
    ("NOME COMPLETO", AliasTarget::Field(Field::NomeCompleto)),
    ("NomeCompleto", AliasTarget::Field(Field::NomeCompleto)),
    ("EMAIL", AliasTarget::Field(Field::Email)),
    ("E-MAIL", AliasTarget::Field(Field::Email)),
    ("TELEFONE", AliasTarget::Field(Field::Telefone)),
    ("CARGO", AliasTarget::Field(Field::Cargo)),
    ("DEPARTAMENTO", AliasTarget::Field(Field::Departamento)),
    ("NIVEL", AliasTarget::Field(Field::Nivel)),
    ("NÍVEL", AliasTarget::Field(Field::Nivel)),
    ("SOLICITANTE? (S/N)", AliasTarget::Field(Field::Solicitante)),
    ("TERCEIRO? (S/N)", AliasTarget::Field(Field::Terceiro)),
    ("Terceiro", AliasTarget::Field(Field::Terceiro)),
    ("ENVIA DADOS DE ACESSO? (S/N)", AliasTarget::SendAccessData),
];

/// Tabela imutável de aliases: rótulo bruto → destino
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<(String, AliasTarget)>,
    by_key: HashMap<String, AliasTarget>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from_entries(
            DEFAULT_ALIASES
                .iter()
                .map(|(label, target)| (label.to_string(), *target))
                .collect(),
        )
    }
}

impl AliasTable {
    fn from_entries(entries: Vec<(String, AliasTarget)>) -> Self {
        let mut by_key = HashMap::with_capacity(entries.len());
        for (label, target) in &entries {
            by_key.insert(upper_no_accents(label), *target);
        }
        Self { entries, by_key }
    }

    /// Tabela padrão acrescida de rótulos extras (`rótulo → destino`).
    /// Entradas extras vêm depois das padrão e prevalecem em caso de conflito.
    pub fn with_extra<I, K, V>(extra: I) -> Result<Self, RoboError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut entries: Vec<(String, AliasTarget)> = DEFAULT_ALIASES
            .iter()
            .map(|(label, target)| (label.to_string(), *target))
            .collect();
        for (label, target) in extra {
            entries.push((label.into(), target.as_ref().parse()?));
        }
        Ok(Self::from_entries(entries))
    }

    /// Resolve um rótulo bruto (sem diferenciar caixa, acentos ou espaços nas bordas)
    pub fn lookup(&self, label: &str) -> Option<AliasTarget> {
        self.by_key.get(&upper_no_accents(label)).copied()
    }

    /// Rótulos na ordem de declaração
    pub fn entries(&self) -> &[(String, AliasTarget)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Índice ordenado (rótulo normalizado → posição da coluna original).
///
/// Rótulos que normalizam para a mesma chave mantêm a posição da primeira
/// ocorrência e apontam para a última coluna.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    keys: Vec<(String, usize)>,
}

impl ColumnIndex {
    pub fn build(headers: &[String], normalize: impl Fn(&str) -> String) -> Self {
        let mut keys: Vec<(String, usize)> = Vec::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            let key = normalize(header);
            match keys.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = position,
                None => keys.push((key, position)),
            }
        }
        Self { keys }
    }

    /// Índice com a normalização padrão (maiúsculas, sem acentos)
    pub fn upper_no_accents(headers: &[String]) -> Self {
        Self::build(headers, upper_no_accents)
    }

    /// Primeira coluna cuja chave satisfaz `predicate`
    pub fn find(&self, predicate: impl Fn(&str) -> bool) -> Option<usize> {
        self.keys
            .iter()
            .find(|(key, _)| predicate(key))
            .map(|(_, position)| *position)
    }

    /// Primeira coluna cuja chave contém `pattern`
    pub fn find_containing(&self, pattern: &str) -> Option<usize> {
        self.find(|key| key.contains(pattern))
    }
}

/// Colunas detectadas na base autoritativa de usuários
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseColumns {
    pub cpf: Option<usize>,
    pub full_name: Option<usize>,
    pub email: Option<usize>,
    pub status: Option<usize>,
    pub user_id: Option<usize>,
}

/// Origem do nome completo numa lista de alvos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    Column(usize),
    /// Nome + sobrenome em colunas separadas
    Concat { first: usize, last: usize },
    Missing,
}

/// Colunas de chave numa lista de desligados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetColumns {
    pub cpf: Option<usize>,
    pub full_name: NameSource,
    pub email: Option<usize>,
}

/// Mapeador de colunas baseado na tabela de aliases
#[derive(Debug, Clone, Copy)]
pub struct ColumnMapper<'a> {
    aliases: &'a AliasTable,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &'a AliasTable {
        self.aliases
    }

    /// Para cada coluna reconhecida, a posição e o destino, na ordem das colunas
    pub fn map_headers(&self, headers: &[String]) -> Vec<(usize, AliasTarget)> {
        headers
            .iter()
            .enumerate()
            .filter_map(|(position, header)| {
                self.aliases.lookup(header).map(|target| (position, target))
            })
            .collect()
    }

    /// Valores de uma linha por destino. Colunas posteriores com o mesmo
    /// destino sobrescrevem as anteriores.
    pub fn map_row(
        &self,
        mapping: &[(usize, AliasTarget)],
        row: RowRef<'_>,
    ) -> BTreeMap<AliasTarget, String> {
        mapping
            .iter()
            .map(|(position, target)| (*target, row.cell(*position).to_string()))
            .collect()
    }

    /// Detecta CPF, nome completo, e-mail, status e UserId na base
    pub fn detect_base_columns(headers: &[String]) -> BaseColumns {
        let index = ColumnIndex::upper_no_accents(headers);
        BaseColumns {
            cpf: index.find_containing("CPF"),
            full_name: index.find(|k| k.contains("NOMECOMPLETO") || k.contains("NOME COMPLETO")),
            email: index.find_containing("EMAIL"),
            status: index.find_containing("STATUS"),
            user_id: index.find(|k| {
                k.contains("USERID") || k.contains("IDUSUARIO") || k.ends_with(" USERID")
            }),
        }
    }

    /// Resolve as colunas-chave de uma lista de desligados.
    ///
    /// Cabeçalhos exatos `CPF`, `NomeCompleto` e `Email` prevalecem. Para o
    /// nome, tenta em ordem: coluna de nome completo, NOME + SOBRENOME,
    /// apenas NOME e, por fim, qualquer coluna contendo "NOME".
    pub fn resolve_target_columns(headers: &[String]) -> TargetColumns {
        let exact = |name: &str| headers.iter().position(|h| h == name);
        let index = ColumnIndex::build(headers, collapse_upper);

        let cpf = exact("CPF").or_else(|| index.find_containing("CPF"));
        let email = exact("Email").or_else(|| index.find_containing("EMAIL"));

        let full_name = match exact("NomeCompleto") {
            Some(position) => NameSource::Column(position),
            None => Self::resolve_name_source(&index),
        };

        TargetColumns {
            cpf,
            full_name,
            email,
        }
    }

    fn resolve_name_source(index: &ColumnIndex) -> NameSource {
        if let Some(position) =
            index.find(|k| k.contains("NOME COMPLETO") || k.contains("NOMECOMPLETO"))
        {
            return NameSource::Column(position);
        }

        let first = index.find(|k| k == "NOME" || k.ends_with(" NOME"));
        let last = index.find_containing("SOBRENOME");
        match (first, last) {
            (Some(first), Some(last)) => NameSource::Concat { first, last },
            (Some(first), None) => NameSource::Column(first),
            _ => index
                .find_containing("NOME")
                .map(NameSource::Column)
                .unwrap_or(NameSource::Missing),
        }
    }
}

/// Remove linhas que repetem o cabeçalho dentro da planilha.
///
/// Uma linha é descartada quando mais de `threshold` (fração) de suas células
/// são iguais, sem diferenciar caixa, ao rótulo da própria coluna.
pub fn drop_header_like_rows(table: &mut Table, threshold: f64) -> usize {
    if table.is_empty() {
        return 0;
    }
    let upper_headers: Vec<String> = table.headers().iter().map(|h| h.to_uppercase()).collect();
    let total = upper_headers.len().max(1) as f64;
    let before = table.len();

    table.retain_rows(|row| {
        let matches = row
            .cells()
            .iter()
            .zip(&upper_headers)
            .filter(|(cell, header)| cell.trim().to_uppercase() == **header)
            .count();
        (matches as f64 / total) <= threshold
    });

    before - table.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_alias_lookup_ignores_case_accents_and_edges() {
        let aliases = AliasTable::default();
        assert_eq!(aliases.lookup(" nível "), Some(AliasTarget::Field(Field::Nivel)));
        assert_eq!(aliases.lookup("e-mail"), Some(AliasTarget::Field(Field::Email)));
        assert_eq!(aliases.lookup("cpf (sem pontos)"), Some(AliasTarget::Cpf));
        assert_eq!(aliases.lookup("Observações"), None);
    }

    #[test]
    fn test_alias_table_with_extra_entries() {
        let aliases = AliasTable::with_extra([("Função", "Cargo")]).unwrap();
        assert_eq!(aliases.lookup("FUNCAO"), Some(AliasTarget::Field(Field::Cargo)));
        assert_eq!(aliases.len(), DEFAULT_ALIASES.len() + 1);

        assert!(AliasTable::with_extra([("X", "CampoInexistente")]).is_err());
    }

    #[test]
    fn test_map_headers_and_row() {
        let aliases = AliasTable::default();
        let mapper = ColumnMapper::new(&aliases);
        let table = Table::literal(
            &["Nome Completo", "Observação", "CPF", "E-mail", "EMAIL"],
            &[&["Ana Souza", "x", "111", "a@x.com", "b@x.com"]],
        )
        .unwrap();

        let mapping = mapper.map_headers(table.headers());
        assert_eq!(mapping.len(), 4);

        let mapped = mapper.map_row(&mapping, table.row(0).unwrap());
        assert_eq!(mapped[&AliasTarget::Field(Field::NomeCompleto)], "Ana Souza");
        assert_eq!(mapped[&AliasTarget::Cpf], "111");
        // a última coluna com o mesmo destino prevalece
        assert_eq!(mapped[&AliasTarget::Field(Field::Email)], "b@x.com");
    }

    #[test]
    fn test_detect_base_columns_first_match_wins() {
        let cols = ColumnMapper::detect_base_columns(&headers(&[
            "UserId",
            "CPF Titular",
            "CPF Dependente",
            "Nome Completo",
            "E-mail",
            "EmailCorporativo",
            "Status",
        ]));
        assert_eq!(cols.cpf, Some(1));
        assert_eq!(cols.full_name, Some(3));
        // "E-MAIL" não contém "EMAIL"
        assert_eq!(cols.email, Some(5));
        assert_eq!(cols.status, Some(6));
        assert_eq!(cols.user_id, Some(0));
    }

    #[test]
    fn test_resolve_target_columns() {
        let cols = ColumnMapper::resolve_target_columns(&headers(&["Nº CPF", "Nome", "Sobrenome"]));
        assert_eq!(cols.cpf, Some(0));
        assert_eq!(cols.full_name, NameSource::Concat { first: 1, last: 2 });
        assert_eq!(cols.email, None);

        let cols = ColumnMapper::resolve_target_columns(&headers(&["Nome do Colaborador", "Email"]));
        assert_eq!(cols.full_name, NameSource::Column(0));
        assert_eq!(cols.email, Some(1));

        let cols = ColumnMapper::resolve_target_columns(&headers(&["NOME", "Nome  Completo"]));
        assert_eq!(cols.full_name, NameSource::Column(1));

        let cols = ColumnMapper::resolve_target_columns(&headers(&["Matrícula"]));
        assert_eq!(cols.full_name, NameSource::Missing);
    }

    #[test]
    fn test_drop_header_like_rows() {
        let mut table = Table::literal(
            &["CPF", "Nome", "Email"],
            &[
                &["111", "Ana", "a@x.com"],
                &["cpf", "NOME", "x"],
                &["CPF", "", ""],
            ],
        )
        .unwrap();

        let dropped = drop_header_like_rows(&mut table, 0.4);
        assert_eq!(dropped, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).unwrap().get("CPF"), Some("CPF"));
    }
}
