//! # Pipeline de cadastro
//!
//! Converte fichas `.docx` e planilhas heterogêneas em registros `INSERT` no
//! esquema canônico de 32 colunas.
//!
//! Etapas, na ordem:
//!
//! 1. extração por arquivo (erros de leitura ficam em `file_errors` e o lote segue);
//! 2. valores fixos (`Operacao`, `EmpresaCCustoParaUsuario`, `CodigoIntegracao`, `Status`);
//! 3. Nome/SobreNome recalculados a partir de NomeCompleto;
//! 4. Login conforme [`LoginChoice`] e flags de perfil conforme [`Flow`];
//! 5. sanitização das colunas de texto;
//! 6. validação consultiva por linha;
//! 7. deduplicação por (Login, NomeCompleto);
//! 8. flags S/N, matrícula só com dígitos e sanitização final;
//! 9. descarte de linhas sem nenhum dado de identificação.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::error::{ConfigError, Result, RoboError};
use crate::extract::{Extracted, SourceReader};
use crate::schema::{
    CanonicalRecord, Field, Flow, LoginChoice, CODIGO_INTEGRACAO, OPERACAO_INSERT,
};
use crate::transform::columns::{drop_header_like_rows, AliasTable, AliasTarget, ColumnMapper};
use crate::transform::names::split_first_last;
use crate::transform::text::{
    extract_digits, format_cpf_for_output, map_boolean_token, sanitize_output_text,
};
use crate::transform::validate::validate_row;
use crate::types::{ProcessingErrors, RowErrors, Table};

/// Valores extraídos de uma linha ou ficha, por destino
pub type SourceRow = BTreeMap<AliasTarget, String>;

/// Colunas de texto sanitizadas antes da validação
const TEXT_FIELDS: [Field; 11] = [
    Field::Nome,
    Field::SobreNome,
    Field::NomeCompleto,
    Field::NomeEmpresa,
    Field::DescricaoCCustoEmpresa,
    Field::DescricaoCCustoCliente,
    Field::Cargo,
    Field::Departamento,
    Field::Cidade,
    Field::Estado,
    Field::Endereco,
];

/// Opções do cadastro
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadastroOptions {
    pub login_choice: LoginChoice,
    pub flow: Flow,
    pub name_max_len: usize,
    pub header_row_threshold: f64,
}

impl Default for CadastroOptions {
    fn default() -> Self {
        Self::from(&ProcessingConfig::default())
    }
}

impl From<&ProcessingConfig> for CadastroOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            login_choice: config.login_choice,
            flow: config.flow,
            name_max_len: config.name_max_len,
            header_row_threshold: config.header_row_threshold,
        }
    }
}

/// Resultado geral de um cadastro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CadastroOutcome {
    /// Há ao menos um registro na saída
    Processed,
    /// Nenhum arquivo forneceu dados
    NothingExtracted,
    /// Houve dados, mas nenhuma linha tinha Login, NomeCompleto, CPF ou Email
    NoIdentifiableRows,
}

#[derive(Debug, Clone, Serialize)]
pub struct CadastroResult {
    pub outcome: CadastroOutcome,
    /// Erros de leitura por arquivo
    pub file_errors: ProcessingErrors,
    /// Mensagens de validação por posição na lista extraída
    pub row_errors: RowErrors,
    pub rows_extracted: usize,
    pub records: Vec<CanonicalRecord>,
}

impl CadastroResult {
    fn empty(outcome: CadastroOutcome, file_errors: ProcessingErrors) -> Self {
        Self {
            outcome,
            file_errors,
            row_errors: RowErrors::new(),
            rows_extracted: 0,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Linha em processamento: registro canônico + CPF bruto da fonte
struct WorkingRow {
    record: CanonicalRecord,
    cpf: String,
}

/// Normalizador de registros de cadastro
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    aliases: Arc<AliasTable>,
    document_patterns: Vec<(Regex, AliasTarget)>,
    reader: SourceReader,
    options: CadastroOptions,
}

impl RecordNormalizer {
    pub fn new(aliases: Arc<AliasTable>, reader: SourceReader, options: CadastroOptions) -> Result<Self> {
        let document_patterns = aliases
            .entries()
            .iter()
            .map(|(label, target)| {
                let pattern = format!(r"(?i){}\s*[:\-]\s*(.+)", regex::escape(label));
                Regex::new(&pattern)
                    .map(|re| (re, *target))
                    .map_err(|e| RoboError::Config(ConfigError::InvalidConfig(e.to_string())))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            aliases,
            document_patterns,
            reader,
            options,
        })
    }

    pub fn options(&self) -> &CadastroOptions {
        &self.options
    }

    /// Processa um lote de arquivos
    pub fn process<P: AsRef<Path>>(&self, paths: &[P]) -> CadastroResult {
        let (rows, file_errors) = self.extract_files(paths);
        self.normalize_rows(rows, file_errors)
    }

    /// Extrai todos os arquivos; falhas de leitura ficam no mapa de erros
    pub fn extract_files<P: AsRef<Path>>(&self, paths: &[P]) -> (Vec<SourceRow>, ProcessingErrors) {
        let mut file_errors = ProcessingErrors::new();
        let mut rows: Vec<SourceRow> = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match self.extract_file(path) {
                Ok(extracted) => {
                    debug!(path = %path.display(), rows = extracted.len(), "Arquivo extraído");
                    rows.extend(extracted);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        code = e.error_code(),
                        error = %e,
                        "Falha ao ler arquivo"
                    );
                    file_errors.insert(path.display().to_string(), e.to_string());
                }
            }
        }

        (rows, file_errors)
    }

    /// Linhas extraídas de um arquivo; vazio para formatos não suportados
    pub fn extract_file(&self, path: &Path) -> Result<Vec<SourceRow>> {
        Ok(match self.reader.read(path)? {
            None => Vec::new(),
            Some(Extracted::Document(text)) => {
                let row = self.extract_document(&text);
                if row.is_empty() {
                    Vec::new()
                } else {
                    vec![row]
                }
            }
            Some(Extracted::Table(table)) => self.extract_table(table),
        })
    }

    /// Pares rótulo:valor de uma ficha; rótulos posteriores sobrescrevem
    pub fn extract_document(&self, text: &str) -> SourceRow {
        let mut row = SourceRow::new();
        for (pattern, target) in &self.document_patterns {
            if let Some(value) = pattern.captures(text).and_then(|c| c.get(1)) {
                row.insert(*target, value.as_str().trim().to_string());
            }
        }
        row
    }

    /// Uma linha por registro da planilha, após descartar cabeçalhos repetidos
    pub fn extract_table(&self, mut table: Table) -> Vec<SourceRow> {
        let dropped = drop_header_like_rows(&mut table, self.options.header_row_threshold);
        if dropped > 0 {
            debug!(dropped, "Linhas de cabeçalho repetido descartadas");
        }

        let mapper = ColumnMapper::new(&self.aliases);
        let mapping = mapper.map_headers(table.headers());
        if mapping.is_empty() {
            return Vec::new();
        }
        table.rows().map(|row| mapper.map_row(&mapping, row)).collect()
    }

    /// Normaliza linhas já extraídas
    pub fn normalize_rows(&self, rows: Vec<SourceRow>, file_errors: ProcessingErrors) -> CadastroResult {
        if rows.is_empty() {
            warn!(files_with_errors = file_errors.len(), "Nenhum dado extraído");
            return CadastroResult::empty(CadastroOutcome::NothingExtracted, file_errors);
        }

        let rows_extracted = rows.len();
        let mut row_errors = RowErrors::new();
        let mut working: Vec<WorkingRow> = Vec::with_capacity(rows.len());

        for (index, source) in rows.into_iter().enumerate() {
            let mut row = self.prepare(source);
            let messages = validate_row(&mut row.record, &row.cpf);
            if !messages.is_empty() {
                row_errors.insert(index, messages);
            }
            working.push(row);
        }

        let mut seen: HashSet<(String, String)> = HashSet::with_capacity(working.len());
        working.retain(|row| {
            seen.insert((
                row.record.get(Field::Login).to_string(),
                row.record.get(Field::NomeCompleto).to_string(),
            ))
        });

        let records: Vec<CanonicalRecord> = working
            .into_iter()
            .map(finalize)
            .filter(|row| !is_blank(row))
            .map(|row| row.record)
            .collect();

        let outcome = if records.is_empty() {
            CadastroOutcome::NoIdentifiableRows
        } else {
            CadastroOutcome::Processed
        };

        info!(
            rows_extracted,
            rows = records.len(),
            row_errors = row_errors.len(),
            file_errors = file_errors.len(),
            "Cadastro concluído"
        );

        CadastroResult {
            outcome,
            file_errors,
            row_errors,
            rows_extracted,
            records,
        }
    }

    /// Valores fixos, nomes, Login, flags de fluxo e sanitização de texto
    fn prepare(&self, source: SourceRow) -> WorkingRow {
        let mut record = CanonicalRecord::new();
        let mut cpf = String::new();
        for (target, value) in source {
            match target {
                AliasTarget::Field(field) => record.set(field, value),
                AliasTarget::Cpf => cpf = value,
                AliasTarget::SendAccessData => {}
            }
        }

        record.set(Field::Operacao, OPERACAO_INSERT);
        record.set(Field::EmpresaCCustoParaUsuario, "S");
        record.set(Field::CodigoIntegracao, CODIGO_INTEGRACAO);
        record.set(Field::Status, "");

        let (first, last) = split_first_last(record.get(Field::NomeCompleto), self.options.name_max_len);
        if !first.is_empty() {
            record.set(Field::Nome, first);
        }
        if !last.is_empty() {
            record.set(Field::SobreNome, last);
        }

        let login = match self.options.login_choice {
            LoginChoice::Cpf if cpf.is_empty() => String::new(),
            LoginChoice::Cpf => format_cpf_for_output(&extract_digits(&cpf)),
            LoginChoice::Email => record.get(Field::Email).to_string(),
        };
        record.set(Field::Login, login);

        match self.options.flow {
            Flow::SelfService => {
                for flag in Field::PROFILE_FLAGS {
                    record.set(flag, "N");
                }
            }
            Flow::Front => {
                for flag in Field::PROFILE_FLAGS {
                    let value = match flag {
                        Field::ViajanteMasterNacional | Field::ViajanteMasterInternacional => "S",
                        _ => "N",
                    };
                    record.set(flag, value);
                }
                record.update(Field::Login, |login| {
                    if login.trim().is_empty() {
                        login.to_string()
                    } else {
                        format!("FRONT{}", login.replace(' ', ""))
                    }
                });
            }
        }

        for field in TEXT_FIELDS {
            let max_len = match field {
                Field::Nome | Field::SobreNome => Some(self.options.name_max_len),
                _ => None,
            };
            record.update(field, |value| sanitize_output_text(value, max_len));
        }

        WorkingRow { record, cpf }
    }
}

/// Flags S/N, matrícula e sanitização final de todas as colunas
fn finalize(mut row: WorkingRow) -> WorkingRow {
    for flag in Field::FLAGS {
        row.record.update(flag, |value| {
            let digits = extract_digits(value);
            if flag == Field::Terceiro && !digits.is_empty() {
                digits
            } else {
                map_boolean_token(value).to_string()
            }
        });
    }

    for field in Field::ALL {
        row.record.update(field, |value| match field {
            Field::Email | Field::Telefone => value.trim().to_uppercase(),
            Field::NroMatricula => extract_digits(value),
            _ => sanitize_output_text(value, None),
        });
    }
    row.cpf = sanitize_output_text(&row.cpf, None);

    row
}

fn is_blank(row: &WorkingRow) -> bool {
    [
        row.record.get(Field::Login),
        row.record.get(Field::NomeCompleto),
        row.cpf.as_str(),
        row.record.get(Field::Email),
    ]
    .iter()
    .all(|value| value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::docx::tests::write_docx;
    use crate::load::xlsx::XlsxWriter;
    use crate::transform::validate::{MSG_CPF_DIGITS, MSG_NOME_COMPLETO, MSG_SOLICITANTE};

    fn normalizer(options: CadastroOptions) -> RecordNormalizer {
        RecordNormalizer::new(Arc::new(AliasTable::default()), SourceReader::default(), options).unwrap()
    }

    fn source(pairs: &[(AliasTarget, &str)]) -> SourceRow {
        pairs.iter().map(|(t, v)| (*t, v.to_string())).collect()
    }

    fn f(field: Field) -> AliasTarget {
        AliasTarget::Field(field)
    }

    #[test]
    fn test_ana_souza_terceiro_sim() {
        let result = normalizer(CadastroOptions::default()).normalize_rows(
            vec![source(&[
                (f(Field::NomeCompleto), "Ana Souza"),
                (f(Field::Terceiro), "Sim"),
                (AliasTarget::Cpf, "111.222.333-44"),
            ])],
            ProcessingErrors::new(),
        );

        assert_eq!(result.outcome, CadastroOutcome::Processed);
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.get(Field::Nome), "ANA");
        assert_eq!(record.get(Field::SobreNome), "SOUZA");
        assert_eq!(record.get(Field::Terceiro), "S");
        assert_eq!(record.get(Field::Login), "111222333-44");
        assert_eq!(record.get(Field::Operacao), "INSERT");
        assert_eq!(record.get(Field::CodigoIntegracao), "AUT");
        assert_eq!(record.get(Field::EmpresaCCustoParaUsuario), "S");
        assert_eq!(record.get(Field::Solicitante), "N");
        assert_eq!(record.get(Field::Vip), "N");
        // Solicitante ausente é sinalizado, mas a linha permanece
        assert_eq!(result.row_errors[&0], vec![MSG_SOLICITANTE]);
    }

    #[test]
    fn test_blank_identification_rows_are_dropped() {
        let result = normalizer(CadastroOptions::default()).normalize_rows(
            vec![
                source(&[(f(Field::Cargo), "Analista"), (f(Field::Telefone), "1199")]),
                source(&[(f(Field::NomeCompleto), "Bruno Lima")]),
            ],
            ProcessingErrors::new(),
        );

        assert_eq!(result.rows_extracted, 2);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].get(Field::NomeCompleto), "BRUNO LIMA");
        assert!(result.row_errors[&0].contains(&MSG_NOME_COMPLETO.to_string()));

        let only_blank = normalizer(CadastroOptions::default())
            .normalize_rows(vec![source(&[(f(Field::Cargo), "X")])], ProcessingErrors::new());
        assert_eq!(only_blank.outcome, CadastroOutcome::NoIdentifiableRows);
    }

    #[test]
    fn test_front_flow_and_email_login() {
        let options = CadastroOptions {
            flow: Flow::Front,
            ..CadastroOptions::default()
        };
        let result = normalizer(options).normalize_rows(
            vec![source(&[
                (f(Field::NomeCompleto), "Carla Dias"),
                (AliasTarget::Cpf, "11122233344"),
            ])],
            ProcessingErrors::new(),
        );
        let record = &result.records[0];
        assert_eq!(record.get(Field::Login), "FRONT111222333-44");
        assert_eq!(record.get(Field::ViajanteMasterNacional), "S");
        assert_eq!(record.get(Field::ViajanteMasterInternacional), "S");
        assert_eq!(record.get(Field::SolicitanteMaster), "N");

        let options = CadastroOptions {
            login_choice: LoginChoice::Email,
            ..CadastroOptions::default()
        };
        let result = normalizer(options).normalize_rows(
            vec![source(&[
                (f(Field::NomeCompleto), "Carla Dias"),
                (f(Field::Email), " carla@empresa.com "),
            ])],
            ProcessingErrors::new(),
        );
        let record = &result.records[0];
        assert_eq!(record.get(Field::Email), "CARLA@EMPRESA.COM");
        // a sanitização final vale também para o Login
        assert_eq!(record.get(Field::Login), "CARLAEMPRESACOM");
    }

    #[test]
    fn test_names_and_text_sanitization() {
        let result = normalizer(CadastroOptions::default()).normalize_rows(
            vec![
                source(&[
                    (f(Field::NomeCompleto), "José  da Conceição"),
                    (f(Field::Nome), "Zé"),
                    (f(Field::Cargo), "Técnico (Jr.)"),
                    (f(Field::NroMatricula), "MAT-00123"),
                    (f(Field::Terceiro), "Fornecedor 42"),
                    (f(Field::Nivel), "gerente"),
                ]),
                source(&[(f(Field::NomeCompleto), "Cher"), (f(Field::SobreNome), "Sarkisian")]),
            ],
            ProcessingErrors::new(),
        );

        let first = &result.records[0];
        assert_eq!(first.get(Field::Nome), "JOSE");
        assert_eq!(first.get(Field::SobreNome), "CONCEICAO");
        assert_eq!(first.get(Field::NomeCompleto), "JOSE DA CONCEICAO");
        assert_eq!(first.get(Field::Cargo), "TECNICO JR");
        assert_eq!(first.get(Field::NroMatricula), "00123");
        assert_eq!(first.get(Field::Terceiro), "42");
        assert_eq!(first.get(Field::Nivel), "GERENCIA");

        // nome de um só token mantém o SobreNome da fonte
        let second = &result.records[1];
        assert_eq!(second.get(Field::Nome), "CHER");
        assert_eq!(second.get(Field::SobreNome), "SARKISIAN");
    }

    #[test]
    fn test_dedup_keeps_first_and_row_errors_use_extraction_index() {
        let result = normalizer(CadastroOptions::default()).normalize_rows(
            vec![
                source(&[(f(Field::NomeCompleto), "Ana Souza"), (AliasTarget::Cpf, "111.222.333-44"), (f(Field::Cargo), "A")]),
                source(&[(f(Field::NomeCompleto), "ANA SOUZA"), (AliasTarget::Cpf, "11122233344"), (f(Field::Cargo), "B")]),
                source(&[(f(Field::NomeCompleto), "Davi Reis"), (AliasTarget::Cpf, "123"), (f(Field::Solicitante), "S")]),
            ],
            ProcessingErrors::new(),
        );

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].get(Field::Cargo), "A");
        assert_eq!(result.row_errors[&2], vec![MSG_CPF_DIGITS]);
    }

    #[test]
    fn test_idempotent() {
        let rows = vec![
            source(&[(f(Field::NomeCompleto), "Ana Souza"), (AliasTarget::Cpf, "11122233344")]),
            source(&[(f(Field::NomeCompleto), "Bruno Lima"), (f(Field::Email), "b@x.com")]),
        ];
        let normalizer = normalizer(CadastroOptions::default());
        let first = normalizer.normalize_rows(rows.clone(), ProcessingErrors::new());
        let second = normalizer.normalize_rows(rows, ProcessingErrors::new());
        assert_eq!(first.records, second.records);
        assert_eq!(first.row_errors, second.row_errors);
    }

    #[test]
    fn test_extract_document_labels() {
        let normalizer = normalizer(CadastroOptions::default());
        let text = "FICHA DE CADASTRO\nNOME COMPLETO: Ana Souza\nCPF (sem pontos) - 11122233344\nE-mail:ana@x.com\nNível: Operacional";
        let row = normalizer.extract_document(text);

        assert_eq!(row[&f(Field::NomeCompleto)], "Ana Souza");
        assert_eq!(row[&AliasTarget::Cpf], "11122233344");
        assert_eq!(row[&f(Field::Email)], "ana@x.com");
        assert_eq!(row[&f(Field::Nivel)], "Operacional");
        assert!(normalizer.extract_document("sem rótulos aqui").is_empty());
    }

    #[test]
    fn test_process_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();

        let ficha = dir.path().join("ficha.docx");
        write_docx(&ficha, &["NOME COMPLETO: Ana Souza", "CPF: 111.222.333-44", "SOLICITANTE? (S/N): S"]);

        let planilha = dir.path().join("lote.xlsx");
        let table = Table::literal(
            &["Nome Completo", "CPF", "Terceiro", "Observação"],
            &[
                &["Bruno Lima", "22233344455", "Não", "x"],
                &["NOME COMPLETO", "CPF", "TERCEIRO", "y"],
                &["Carla Dias", "", "1", ""],
            ],
        )
        .unwrap();
        XlsxWriter::default().write_table(&table, &planilha).unwrap();

        let quebrado = dir.path().join("quebrado.xlsx");
        std::fs::write(&quebrado, b"nao e zip").unwrap();
        let ignorado = dir.path().join("leia-me.txt");
        std::fs::write(&ignorado, b"texto").unwrap();

        let result = normalizer(CadastroOptions::default()).process(&[&ficha, &planilha, &quebrado, &ignorado]);

        assert_eq!(result.outcome, CadastroOutcome::Processed);
        assert_eq!(result.file_errors.len(), 1);
        assert!(result.file_errors.contains_key(&quebrado.display().to_string()));
        assert_eq!(result.rows_extracted, 3);

        let names: Vec<&str> = result.records.iter().map(|r| r.get(Field::NomeCompleto)).collect();
        assert_eq!(names, vec!["ANA SOUZA", "BRUNO LIMA", "CARLA DIAS"]);
        assert_eq!(result.records[0].get(Field::Solicitante), "S");
        assert_eq!(result.records[1].get(Field::Terceiro), "N");
        assert_eq!(result.records[2].get(Field::Terceiro), "1");
        assert_eq!(result.records[2].get(Field::Login), "");
    }

    #[test]
    fn test_nothing_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let ignorado = dir.path().join("foto.png");
        std::fs::write(&ignorado, b"png").unwrap();

        let result = normalizer(CadastroOptions::default()).process(&[&ignorado]);
        assert_eq!(result.outcome, CadastroOutcome::NothingExtracted);
        assert!(result.is_empty());
        assert!(result.file_errors.is_empty());
    }
}
