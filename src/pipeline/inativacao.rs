//! # Pipeline de inativação
//!
//! Concilia uma lista de desligados com a base autoritativa de usuários e
//! projeta as linhas encontradas no esquema canônico com `Operacao=DELETE`.
//!
//! O casamento é exato e em camadas, com precedência estrita: CPF, depois
//! nome normalizado, depois e-mail. Uma linha da base aparece em no máximo
//! uma camada. Quando a base tem coluna de status, só linhas `ATIVO` podem
//! casar.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::ProcessingConfig;
use crate::error::{Result, RoboError};
use crate::extract::SourceReader;
use crate::schema::{model_columns, CanonicalRecord, Field, CODIGO_INTEGRACAO, OPERACAO_DELETE};
use crate::transform::columns::{BaseColumns, ColumnIndex, ColumnMapper, NameSource};
use crate::transform::text::{
    compact_key, cpf_key, email_key, extract_digits, is_email_like, upper_no_accents,
};
use crate::types::{RowRef, Table};

const STATUS_ATIVO: &str = "ATIVO";
const PREVIEW_SAMPLE: usize = 10;
const PREVIEW_RECORDS: usize = 500;
const PREVIEW_COLUMN_SCAN: usize = 50;

/// Um desligado a localizar na base
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetEntry {
    pub cpf: String,
    pub full_name: String,
    pub email: String,
}

/// Lista de desligados
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetList {
    entries: Vec<TargetEntry>,
}

impl TargetList {
    pub fn new(entries: Vec<TargetEntry>) -> Self {
        Self { entries }
    }

    /// Lista a partir de uma planilha com cabeçalhos arbitrários
    pub fn from_table(table: &Table) -> Self {
        let columns = ColumnMapper::resolve_target_columns(table.headers());
        let cell = |row: &RowRef<'_>, position: Option<usize>| {
            position.map(|p| row.cell(p).to_string()).unwrap_or_default()
        };

        let entries = table
            .rows()
            .map(|row| {
                let full_name = match columns.full_name {
                    NameSource::Column(position) => row.cell(position).to_string(),
                    NameSource::Concat { first, last } => {
                        format!("{} {}", row.cell(first), row.cell(last)).trim().to_string()
                    }
                    NameSource::Missing => String::new(),
                };
                TargetEntry {
                    cpf: cell(&row, columns.cpf),
                    full_name,
                    email: cell(&row, columns.email).trim().to_string(),
                }
            })
            .collect();

        Self { entries }
    }

    /// Lista a partir de texto colado, um item por linha.
    ///
    /// E-mail tem precedência; 11 dígitos formam um CPF; o resto é nome.
    pub fn from_text(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                if is_email_like(line) {
                    TargetEntry {
                        email: line.to_string(),
                        ..Default::default()
                    }
                } else if extract_digits(line).len() == 11 {
                    TargetEntry {
                        cpf: line.to_string(),
                        ..Default::default()
                    }
                } else {
                    TargetEntry {
                        full_name: line.to_string(),
                        ..Default::default()
                    }
                }
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[TargetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parâmetros de casamento
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Aceito mas não aplicado: o casamento é sempre exato
    pub use_fuzzy: bool,
    pub fuzzy_cutoff: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::from(&ProcessingConfig::default())
    }
}

impl From<&ProcessingConfig> for MatchOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            use_fuzzy: config.use_fuzzy,
            fuzzy_cutoff: config.fuzzy_cutoff,
        }
    }
}

/// Camada em que a linha casou
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Cpf,
    Nome,
    Email,
}

impl MatchTier {
    pub const ALL: [MatchTier; 3] = [MatchTier::Cpf, MatchTier::Nome, MatchTier::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Cpf => "cpf",
            MatchTier::Nome => "nome",
            MatchTier::Email => "email",
        }
    }
}

/// Linha da base casada, com as chaves derivadas e a camada, para auditoria.
/// Serializa como mapa, preservando a ordem das colunas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AuditRow(Vec<(String, String)>);

impl AuditRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    fn from_record(record: &CanonicalRecord) -> Self {
        Self(
            record
                .iter()
                .map(|(field, value)| (field.as_str().to_string(), value.to_string()))
                .collect(),
        )
    }
}

impl Serialize for AuditRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Estatísticas da conciliação. Sempre presentes, inclusive em falha.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchStats {
    pub cpf_matches: usize,
    pub name_matches: usize,
    pub email_matches: usize,
    pub total_matches: usize,
    /// Linhas casadas por camada
    #[serde(rename = "inactive_matches")]
    pub buckets: BTreeMap<MatchTier, Vec<AuditRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Situação final da conciliação
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    /// Nenhuma linha da base corresponde à lista
    NoMatches,
    /// Só linhas inativas corresponderiam à lista
    OnlyInactive { inactive_hits: usize },
    Failed { error: String },
}

/// Resultado de uma inativação
#[derive(Debug, Clone, Serialize)]
pub struct InativacaoReport {
    #[serde(flatten)]
    pub status: MatchStatus,
    pub records: Vec<CanonicalRecord>,
    pub stats: MatchStats,
}

/// Prévia para conferência antes de gerar a planilha
#[derive(Debug, Clone, Default, Serialize)]
pub struct InativacaoPreview {
    pub count: usize,
    pub columns: Vec<String>,
    pub sample: Vec<AuditRow>,
    pub records: Vec<AuditRow>,
}

impl InativacaoReport {
    /// Relatório de falha com estatísticas zeradas
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: MatchStatus::Failed {
                error: error.clone(),
            },
            records: Vec::new(),
            stats: MatchStats {
                error: Some(error),
                ..Default::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Prévia: registros canônicos quando houver; senão as linhas das
    /// camadas marcadas com `match_type`
    pub fn preview(&self) -> InativacaoPreview {
        let count = self.stats.total_matches;

        if !self.records.is_empty() {
            let rows: Vec<AuditRow> = self
                .records
                .iter()
                .take(PREVIEW_RECORDS)
                .map(AuditRow::from_record)
                .collect();
            return InativacaoPreview {
                count,
                columns: model_columns().into_iter().map(String::from).collect(),
                sample: rows.iter().take(PREVIEW_SAMPLE).cloned().collect(),
                records: rows,
            };
        }

        let rows: Vec<AuditRow> = self
            .stats
            .buckets
            .iter()
            .flat_map(|(tier, rows)| {
                rows.iter().map(move |row| {
                    let mut row = row.clone();
                    row.push("match_type", tier.as_str());
                    row
                })
            })
            .collect();

        let mut columns: Vec<String> = Vec::new();
        for row in rows.iter().take(PREVIEW_COLUMN_SCAN) {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }

        InativacaoPreview {
            count,
            columns,
            sample: rows.iter().take(PREVIEW_SAMPLE).cloned().collect(),
            records: rows.into_iter().take(PREVIEW_RECORDS).collect(),
        }
    }
}

/// Chaves de casamento de uma linha da base
struct BaseKeys {
    cpf: String,
    name: String,
    email: String,
    status: Option<String>,
}

impl BaseKeys {
    fn derive(row: &RowRef<'_>, columns: &BaseColumns) -> Self {
        let value = |position: Option<usize>| position.map(|p| row.cell(p)).unwrap_or("");
        Self {
            cpf: cpf_key(value(columns.cpf)),
            name: upper_no_accents(value(columns.full_name)),
            email: email_key(value(columns.email)),
            status: columns.status.map(|p| upper_no_accents(row.cell(p))),
        }
    }

    fn is_active(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == STATUS_ATIVO)
    }
}

/// Conjuntos de chaves não vazias da lista de desligados
struct TargetKeys {
    cpfs: HashSet<String>,
    names: HashSet<String>,
    emails: HashSet<String>,
}

impl TargetKeys {
    fn from_list(targets: &TargetList) -> Self {
        let collect = |f: fn(&TargetEntry) -> String| -> HashSet<String> {
            targets
                .entries()
                .iter()
                .map(f)
                .filter(|key| !key.is_empty())
                .collect()
        };
        Self {
            cpfs: collect(|e| cpf_key(&e.cpf)),
            names: collect(|e| upper_no_accents(&e.full_name)),
            emails: collect(|e| email_key(&e.email)),
        }
    }

    fn tier_of(&self, keys: &BaseKeys) -> Option<MatchTier> {
        if self.cpfs.contains(&keys.cpf) {
            Some(MatchTier::Cpf)
        } else if self.names.contains(&keys.name) {
            Some(MatchTier::Nome)
        } else if self.emails.contains(&keys.email) {
            Some(MatchTier::Email)
        } else {
            None
        }
    }
}

/// Motor de conciliação base × lista
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchEngine {
    options: MatchOptions,
}

impl MatchEngine {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Concilia a base com a lista de desligados
    pub fn run(&self, base: &Table, targets: &TargetList) -> InativacaoReport {
        if self.options.use_fuzzy {
            debug!(
                cutoff = self.options.fuzzy_cutoff,
                "Casamento aproximado solicitado; usando casamento exato"
            );
        }

        let columns = ColumnMapper::detect_base_columns(base.headers());
        match columns.cpf {
            Some(position) => info!(coluna = %base.headers()[position], "Coluna CPF detectada"),
            None => info!("Nenhuma coluna CPF detectada na base; casamento por CPF desabilitado"),
        }

        let target_keys = TargetKeys::from_list(targets);
        let mut stats = MatchStats::default();
        let mut tiers: BTreeMap<MatchTier, Vec<(usize, AuditRow)>> = BTreeMap::new();
        let mut inactive_hits = 0;

        for (position, row) in base.rows().enumerate() {
            let keys = BaseKeys::derive(&row, &columns);
            let Some(tier) = target_keys.tier_of(&keys) else {
                continue;
            };
            if !keys.is_active() {
                inactive_hits += 1;
                continue;
            }
            tiers
                .entry(tier)
                .or_default()
                .push((position, audit_row(&row, &keys, tier)));
        }

        stats.cpf_matches = tiers.get(&MatchTier::Cpf).map_or(0, Vec::len);
        stats.name_matches = tiers.get(&MatchTier::Nome).map_or(0, Vec::len);
        stats.email_matches = tiers.get(&MatchTier::Email).map_or(0, Vec::len);

        let matched: Vec<usize> = {
            let mut seen: HashSet<&AuditRow> = HashSet::new();
            MatchTier::ALL
                .iter()
                .filter_map(|tier| tiers.get(tier))
                .flatten()
                .filter(|(_, audit)| seen.insert(audit))
                .map(|(position, _)| *position)
                .collect()
        };

        if matched.is_empty() {
            warn!(inactive_hits, "Nenhuma correspondência encontrada para inativação");
            let status = if inactive_hits > 0 {
                MatchStatus::OnlyInactive { inactive_hits }
            } else {
                MatchStatus::NoMatches
            };
            return InativacaoReport {
                status,
                records: Vec::new(),
                stats,
            };
        }

        let projection = Projection::new(base.headers(), &columns);
        let records: Vec<CanonicalRecord> = matched
            .iter()
            .filter_map(|position| base.row(*position))
            .map(|row| projection.project(&row))
            .collect();

        stats.total_matches = records.len();
        stats.buckets = MatchTier::ALL
            .iter()
            .map(|tier| {
                let rows = tiers
                    .remove(tier)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, audit)| audit)
                    .collect();
                (*tier, rows)
            })
            .collect();

        info!(
            linhas = records.len(),
            cpf = stats.cpf_matches,
            nome = stats.name_matches,
            email = stats.email_matches,
            "Inativação concluída"
        );

        InativacaoReport {
            status: MatchStatus::Matched,
            records,
            stats,
        }
    }
}

fn audit_row(row: &RowRef<'_>, keys: &BaseKeys, tier: MatchTier) -> AuditRow {
    let mut audit = AuditRow(
        row.pairs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    );
    audit.push("CPFdigits", keys.cpf.as_str());
    audit.push("Nome Normalizado", keys.name.as_str());
    audit.push("Email Normalizado", keys.email.as_str());
    if let Some(status) = &keys.status {
        audit.push("Status Normalizado", status.as_str());
    }
    audit.push("__match_type", tier.as_str());
    audit
}

/// Colunas da base usadas para montar cada registro DELETE
struct Projection {
    picks: Vec<(Field, Option<usize>)>,
    flags: Vec<(Field, usize)>,
    matricula: Option<usize>,
}

impl Projection {
    fn new(headers: &[String], columns: &BaseColumns) -> Self {
        let exact = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h == name))
        };

        let full_name = exact(&["NomeCompleto", "Nome Completo"]).or(columns.full_name);
        let picks = vec![
            (Field::UserId, exact(&["UserId"])),
            (Field::Login, exact(&["Login", "UserName"])),
            (Field::NomeCompleto, full_name),
            (Field::Nome, exact(&["Nome"])),
            (Field::SobreNome, exact(&["SobreNome"])),
            (Field::Email, exact(&["Email"])),
            (Field::Telefone, exact(&["Telefone"])),
            (Field::Cargo, exact(&["Cargo"])),
            (Field::Departamento, exact(&["Departamento"])),
            (Field::Nivel, exact(&["Nivel"])),
            (Field::NomeEmpresa, exact(&["Empresa"])),
            (Field::CodigoCCustoEmpresa, exact(&["Codigo_Centro_de_Custo"])),
            (Field::DescricaoCCustoEmpresa, exact(&["Centro_de_Custo"])),
        ];

        let index = ColumnIndex::upper_no_accents(headers);
        let flags = Field::FLAGS
            .iter()
            .filter_map(|flag| {
                index
                    .find_containing(&upper_no_accents(flag.as_str()))
                    .map(|position| (*flag, position))
            })
            .collect();

        let aliases = ["NROMATRICULA", "MATRICULA"];
        let matricula = headers.iter().position(|h| {
            let key = compact_key(h);
            aliases.iter().any(|alias| key == *alias || key.contains(alias))
        });

        Self {
            picks,
            flags,
            matricula,
        }
    }

    fn project(&self, row: &RowRef<'_>) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record.set(Field::Operacao, OPERACAO_DELETE);

        for (field, position) in &self.picks {
            if let Some(position) = position {
                record.set(*field, row.cell(*position));
            }
        }

        record.set(Field::EmpresaCCustoParaUsuario, "S");
        record.set(Field::CodigoIntegracao, CODIGO_INTEGRACAO);

        for flag in Field::FLAGS {
            record.set(flag, "N");
        }
        for (flag, position) in &self.flags {
            let raw = row.cell(*position);
            let value = if *flag == Field::Terceiro {
                let digits = extract_digits(raw);
                if digits.is_empty() {
                    strict_flag(raw).to_string()
                } else {
                    digits
                }
            } else {
                strict_flag(raw).to_string()
            };
            record.set(*flag, value);
        }

        if let Some(position) = self.matricula {
            record.set(Field::NroMatricula, extract_digits(row.cell(position)));
        }

        for field in Field::ALL {
            record.update(field, |value| value.trim().to_uppercase());
        }
        record
    }
}

/// S/N a partir dos valores da base: SIM/S/TRUE viram S, o resto N
fn strict_flag(raw: &str) -> &'static str {
    match raw.trim().to_uppercase().as_str() {
        "SIM" | "S" | "TRUE" => "S",
        _ => "N",
    }
}

/// Origem da lista de desligados
#[derive(Debug, Clone)]
pub enum TargetSource {
    /// Planilha com cabeçalhos arbitrários
    Table(PathBuf),
    /// Texto colado, um item por linha
    Text(String),
    Entries(TargetList),
}

/// Inativação a partir de arquivos, sem nunca propagar erro
#[derive(Debug, Clone, Default)]
pub struct InativacaoPipeline {
    reader: SourceReader,
    engine: MatchEngine,
}

impl InativacaoPipeline {
    pub fn new(reader: SourceReader, engine: MatchEngine) -> Self {
        Self { reader, engine }
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// Lê a base e resolve a lista de desligados
    pub fn load_inputs(&self, base_path: &Path, targets: &TargetSource) -> Result<(Table, TargetList)> {
        let targets = match targets {
            TargetSource::Table(path) => TargetList::from_table(&self.reader.read_table(path)?),
            TargetSource::Text(text) => TargetList::from_text(text),
            TargetSource::Entries(list) => list.clone(),
        };
        if targets.is_empty() {
            return Err(RoboError::Pipeline(
                "Lista de desligados vazia ou sem CPF/Nome/E-mail válidos".to_string(),
            ));
        }

        let base = self.reader.read_table(base_path)?;
        debug!(linhas = base.len(), alvos = targets.len(), "Entradas carregadas");
        Ok((base, targets))
    }

    /// Executa a conciliação; falhas viram [`MatchStatus::Failed`]
    pub fn process(&self, base_path: &Path, targets: &TargetSource) -> InativacaoReport {
        match self.load_inputs(base_path, targets) {
            Ok((base, targets)) => self.engine.run(&base, &targets),
            Err(e) => {
                error!(code = e.error_code(), error = %e, "Erro na inativação");
                InativacaoReport::failed(e.to_string())
            }
        }
    }
}
