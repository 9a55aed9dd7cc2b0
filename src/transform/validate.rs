//! Validação consultiva de linhas do cadastro.
//!
//! As mensagens nunca removem dados: são devolvidas à parte, por linha.

use tracing::warn;

use super::text::{extract_digits, upper_no_accents};
use crate::schema::{CanonicalRecord, Field};

pub const MSG_SOLICITANTE: &str = "Solicitante required";
pub const MSG_CPF_DIGITS: &str = "CPF must have 11 digits";
pub const MSG_INVALID_EMAIL: &str = "Invalid email";
pub const MSG_NOME_COMPLETO: &str = "NomeCompleto empty";
pub const MSG_NIVEL: &str = "Nivel invalid, cleared";

const NIVEIS: [&str; 3] = ["OPERACIONAL", "GERENCIA", "DIRETORIA"];

/// Colunas que toda saída precisa ter
pub const REQUIRED_OUTPUT_COLUMNS: [&str; 7] = [
    "Operacao",
    "Login",
    "NomeCompleto",
    "Nome",
    "SobreNome",
    "CodigoIntegracao",
    "EmpresaCCustoParaUsuario",
];

/// Valida uma linha e devolve as mensagens (vazio = válida).
///
/// `cpf` é o CPF bruto da fonte; quando vazio, o Login é usado no lugar.
/// Um `Nivel` reconhecível é corrigido no próprio registro; um `Nivel`
/// irreconhecível é apagado e sinalizado.
pub fn validate_row(record: &mut CanonicalRecord, cpf: &str) -> Vec<String> {
    let mut messages = Vec::new();

    let solicitante = record.get(Field::Solicitante).trim().to_uppercase();
    if solicitante != "S" && solicitante != "N" {
        messages.push(MSG_SOLICITANTE.to_string());
    }

    let cpf_source = if cpf.is_empty() {
        record.get(Field::Login)
    } else {
        cpf
    };
    let digits = extract_digits(cpf_source);
    if !digits.is_empty() && digits.len() != 11 {
        messages.push(MSG_CPF_DIGITS.to_string());
    } else if digits.is_empty() && !cpf.trim().is_empty() {
        warn!(
            nome = %record.get(Field::NomeCompleto),
            "CPF ausente ou inválido para registro"
        );
    }

    let email = record.get(Field::Email).trim();
    if !email.is_empty() && !is_plausible_email(email) {
        messages.push(MSG_INVALID_EMAIL.to_string());
    }

    if record.get(Field::NomeCompleto).trim().is_empty() {
        messages.push(MSG_NOME_COMPLETO.to_string());
    }

    let nivel = upper_no_accents(record.get(Field::Nivel));
    if !nivel.is_empty() && !NIVEIS.contains(&nivel.as_str()) {
        let corrected = if nivel.contains("OPER") {
            "OPERACIONAL"
        } else if nivel.contains("GER") {
            "GERENCIA"
        } else if nivel.contains("DIR") {
            "DIRETORIA"
        } else {
            messages.push(MSG_NIVEL.to_string());
            ""
        };
        record.set(Field::Nivel, corrected);
    }

    messages
}

/// Tem "@" e o domínio (após o último "@") contém "."
fn is_plausible_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((_, domain)) => domain.contains('.'),
        None => false,
    }
}

/// Colunas obrigatórias ausentes de uma lista de cabeçalhos
pub fn check_output_columns<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    REQUIRED_OUTPUT_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h.as_ref() == **required))
        .map(|missing| format!("Coluna obrigatória ausente: {}", missing))
        .collect()
}
