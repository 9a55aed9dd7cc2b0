//! # Separação de nomes
//!
//! Dois separadores convivem:
//!
//! - [`split_full_name`]: respeita partículas (`da`, `dos`, `van`...) e sufixos
//!   geracionais (`Filho`, `Neto`, `Júnior`...);
//! - [`split_first_last`]: regra simples usada pelo cadastro, primeiro e último
//!   token, cada um sanitizado e limitado em tamanho.

use super::text::sanitize_output_text;

const PARTICLES: [&str; 11] = [
    "da", "de", "do", "das", "dos", "di", "della", "del", "dela", "van", "von",
];

const GENERATIONAL_SUFFIXES: [&str; 8] = [
    "neto", "netto", "filho", "filha", "junior", "júnior", "jr", "sobrinho",
];

fn is_particle(word: &str) -> bool {
    let lower = word.to_lowercase();
    PARTICLES.contains(&lower.as_str())
}

fn is_suffix(word: &str) -> bool {
    let lower = word.to_lowercase();
    GENERATIONAL_SUFFIXES.contains(&lower.as_str())
}

/// Separa um nome completo em (nome, sobrenome).
///
/// ```
/// use roborh::transform::names::split_full_name;
///
/// assert_eq!(
///     split_full_name("João Pedro da Silva"),
///     ("João Pedro".to_string(), "da Silva".to_string())
/// );
/// assert_eq!(
///     split_full_name("Carlos Alberto de Oliveira Filho"),
///     ("Carlos Alberto".to_string(), "de Oliveira Filho".to_string())
/// );
/// ```
pub fn split_full_name(full_name: &str) -> (String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    let n = parts.len();

    match n {
        0 => return (String::new(), String::new()),
        1 => return (parts[0].to_string(), String::new()),
        2 => return (parts[0].to_string(), parts[1].to_string()),
        3 if !is_suffix(parts[2]) => return (parts[0].to_string(), parts[1..].join(" ")),
        _ => {}
    }

    // `start` marca o primeiro token do sobrenome; cresce para a esquerda
    let mut start = n - 1;

    if is_suffix(parts[start]) && start > 0 {
        start -= 1;
    }

    if n >= 4 && start == n - 1 && start > 0 {
        start -= 1;
    }

    while start > 0 && is_particle(parts[start - 1]) {
        start -= 1;
    }

    if start == 0 {
        return (parts[0].to_string(), parts[1..].join(" "));
    }

    (parts[..start].join(" "), parts[start..].join(" "))
}

/// Regra do cadastro: primeiro token como Nome, último como SobreNome,
/// ambos sanitizados e cortados em `max_len` caracteres.
pub fn split_first_last(full_name: &str, max_len: usize) -> (String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    let (first, last) = match parts.as_slice() {
        [] => return (String::new(), String::new()),
        [only] => (*only, ""),
        [first, .., last] => (*first, *last),
    };

    (
        sanitize_output_text(first, Some(max_len)),
        sanitize_output_text(last, Some(max_len)),
    )
}
