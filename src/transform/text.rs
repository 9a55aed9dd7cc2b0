//! # Normalização de texto
//!
//! Funções puras usadas por todo o motor: remoção de acentos, extração de
//! dígitos, formatação de CPF, sanitização de saída e mapeamento de flags S/N.
//! Nenhuma delas falha: entradas ausentes são tratadas como "".

use unicode_normalization::UnicodeNormalization;

/// Tokens aceitos como "sim" nas flags booleanas
const TRUE_TOKENS: [&str; 6] = ["S", "SIM", "YES", "Y", "TRUE", "1"];

/// Remove espaços das bordas
pub fn normalize(s: &str) -> String {
    s.trim().to_string()
}

/// Maiúsculas sem acentos.
///
/// Decompõe em NFKD e descarta tudo que não for ASCII, o que elimina as marcas
/// diacríticas (`"João"` → `"JOAO"`). Chave universal de comparação de
/// rótulos, nomes e status.
pub fn upper_no_accents(s: &str) -> String {
    s.trim()
        .to_uppercase()
        .nfkd()
        .filter(char::is_ascii)
        .collect()
}

/// Apenas os dígitos da string
pub fn extract_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Formata CPF com traço antes dos dois últimos dígitos: `12345678901` → `123456789-01`.
/// Qualquer outro tamanho volta sem alteração.
pub fn format_cpf_for_output(digits: &str) -> String {
    if digits.len() == 11 && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}", &digits[..9], &digits[9..])
    } else {
        digits.to_string()
    }
}

/// Chave de CPF para casamento: dígitos completados com zeros à esquerda até 11
pub fn cpf_key(s: &str) -> String {
    let digits = extract_digits(s);
    if digits.is_empty() {
        digits
    } else {
        format!("{:0>11}", digits)
    }
}

/// Chave de e-mail para casamento
pub fn email_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Rótulo compacto: maiúsculas, sem acentos e apenas `A-Z0-9`
pub fn compact_key(s: &str) -> String {
    upper_no_accents(s)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Sanitização canônica de texto de saída.
///
/// Remove acentos, converte para maiúsculas, mantém apenas letras, dígitos,
/// espaço e hífen, colapsa espaços e corta em `max_len` caracteres.
pub fn sanitize_output_text(s: &str, max_len: Option<usize>) -> String {
    let kept: String = upper_no_accents(s)
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    match max_len {
        Some(limit) if limit > 0 => collapsed.chars().take(limit).collect(),
        _ => collapsed,
    }
}

/// Mapeia um token booleano para "S" ou "N". Nunca falha.
pub fn map_boolean_token(s: &str) -> &'static str {
    let token = upper_no_accents(s);
    if TRUE_TOKENS.contains(&token.as_str()) {
        "S"
    } else {
        "N"
    }
}

/// Formato `algo@dominio.tld`, sem espaços e com um único `@`
pub fn is_email_like(s: &str) -> bool {
    let s = s.trim();
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Colapsa espaços e converte para maiúsculas, preservando acentos
pub fn collapse_upper(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
