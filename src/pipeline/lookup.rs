//! Busca de usuários na base e confirmação da inativação.
//!
//! Diferente da conciliação em camadas, a busca não filtra por status: ela
//! mostra o status atual de cada usuário encontrado para conferência.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::error::{Result, RoboError};
use crate::transform::columns::ColumnMapper;
use crate::transform::text::{extract_digits, is_email_like, upper_no_accents};
use crate::types::{RowRef, Table};

pub const STATUS_NAO_LOCALIZADO: &str = "Não localizado";

/// Item do resultado da busca
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupItem {
    pub id: Option<String>,
    pub nome: String,
    pub cpf: String,
    pub email: String,
    pub status_atual: String,
    pub found: bool,
}

impl LookupItem {
    fn not_found(nome: &str, cpf: &str, email: &str) -> Self {
        Self {
            id: None,
            nome: nome.to_string(),
            cpf: cpf.to_string(),
            email: email.to_string(),
            status_atual: STATUS_NAO_LOCALIZADO.to_string(),
            found: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub items: Vec<LookupItem>,
    pub total: usize,
    /// CPFs repetidos na entrada
    pub duplicates: Vec<String>,
    pub not_found: Vec<String>,
}

/// Itens de busca separados por tipo
#[derive(Debug, Default)]
struct Classified {
    cpfs: Vec<String>,
    emails: Vec<String>,
    names_raw: Vec<String>,
    names: Vec<String>,
}

fn classify(items: &[String]) -> Classified {
    let raw: Vec<&str> = items.iter().map(|item| item.trim()).collect();
    let cpfs: Vec<String> = raw
        .iter()
        .map(|item| extract_digits(item))
        .filter(|digits| digits.len() == 11)
        .collect();
    let is_cpf = |item: &str| cpfs.contains(&extract_digits(item));

    let emails: Vec<String> = raw
        .iter()
        .copied()
        .filter(|item| is_email_like(item) && !is_cpf(*item))
        .map(str::to_string)
        .collect();

    let names_raw: Vec<String> = raw
        .iter()
        .copied()
        .filter(|item| !is_cpf(*item) && !emails.iter().any(|e| e.as_str() == *item))
        .filter(|item| is_full_name(item))
        .map(str::to_string)
        .collect();
    let names = names_raw.iter().map(|name| upper_no_accents(name)).collect();

    Classified {
        cpfs,
        emails,
        names_raw,
        names,
    }
}

/// Nome completo: ao menos duas palavras e três caracteres
fn is_full_name(item: &str) -> bool {
    let normalized = upper_no_accents(item);
    normalized.split_whitespace().count() >= 2 && normalized.chars().count() >= 3
}

/// Procura CPFs, nomes completos e e-mails na base
pub fn search(base: &Table, items: &[String]) -> SearchReport {
    let classified = classify(items);
    let columns = ColumnMapper::detect_base_columns(base.headers());
    let fallback = |name: &str| base.column_index(name);
    let name_col = columns.full_name.or_else(|| fallback("NomeCompleto"));
    let email_col = columns.email.or_else(|| fallback("Email"));
    let status_col = columns.status.or_else(|| fallback("Status"));

    let cell = |row: &RowRef<'_>, position: Option<usize>| -> String {
        position.map(|p| row.cell(p).to_string()).unwrap_or_default()
    };
    let cpf_digits = |row: &RowRef<'_>| {
        columns
            .cpf
            .map(|p| extract_digits(row.cell(p)))
            .unwrap_or_default()
    };
    let found_item = |row: &RowRef<'_>, cpf: String, email: String| LookupItem {
        id: columns
            .user_id
            .map(|p| row.cell(p))
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        nome: cell(row, name_col),
        cpf,
        email,
        status_atual: cell(row, status_col),
        found: true,
    };

    let mut items = Vec::new();
    let mut found_cpfs: HashSet<String> = HashSet::new();

    if !classified.cpfs.is_empty() && columns.cpf.is_some() {
        for row in base.rows() {
            let cpf = cpf_digits(&row);
            if classified.cpfs.contains(&cpf) {
                found_cpfs.insert(cpf.clone());
                items.push(found_item(&row, cpf, cell(&row, email_col)));
            }
        }
    }

    let mut found_names: HashSet<String> = HashSet::new();
    if !classified.names.is_empty() {
        if let Some(position) = columns.full_name {
            for row in base.rows() {
                let name = upper_no_accents(row.cell(position));
                if !classified.names.contains(&name) {
                    continue;
                }
                found_names.insert(name);
                let cpf = cpf_digits(&row);
                if !cpf.is_empty() && found_cpfs.contains(&cpf) {
                    continue;
                }
                items.push(found_item(&row, cpf, cell(&row, email_col)));
            }
        }
    }

    let mut found_emails: HashSet<String> = HashSet::new();
    if !classified.emails.is_empty() {
        if let Some(position) = columns.email {
            let targets: HashSet<String> =
                classified.emails.iter().map(|e| e.trim().to_lowercase()).collect();
            for row in base.rows() {
                let email = row.cell(position).trim().to_string();
                if targets.contains(&email.to_lowercase()) {
                    found_emails.insert(email.to_lowercase());
                    items.push(found_item(&row, cpf_digits(&row), email));
                }
            }
        }
    }

    let mut not_found = Vec::new();
    let mut missing_cpfs: HashSet<&str> = HashSet::new();
    for cpf in &classified.cpfs {
        if !found_cpfs.contains(cpf) && missing_cpfs.insert(cpf.as_str()) {
            items.push(LookupItem::not_found("", cpf, ""));
            not_found.push(cpf.clone());
        }
    }
    for (raw, name) in classified.names_raw.iter().zip(&classified.names) {
        if !found_names.contains(name) {
            items.push(LookupItem::not_found(name, "", ""));
            not_found.push(raw.clone());
        }
    }
    for email in &classified.emails {
        if !found_emails.contains(&email.to_lowercase()) {
            items.push(LookupItem::not_found("", "", email));
            not_found.push(email.clone());
        }
    }

    items.sort_by(|a, b| (!a.found, &a.nome, &a.cpf).cmp(&(!b.found, &b.nome, &b.cpf)));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for cpf in &classified.cpfs {
        if !seen.insert(cpf.as_str()) && !duplicates.contains(cpf) {
            duplicates.push(cpf.clone());
        }
    }

    info!(
        itens = items.len(),
        nao_localizados = not_found.len(),
        duplicados = duplicates.len(),
        "Busca concluída"
    );

    SearchReport {
        total: items.len(),
        items,
        duplicates,
        not_found,
    }
}

/// Usuário selecionado para inativação
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedUser {
    pub id: Option<String>,
    pub cpf: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub success: bool,
    pub processed: usize,
    pub usuarios: Vec<SelectedUser>,
    pub message: String,
}

/// Confirma a inativação dos usuários com CPF válido, sem repetir CPF
pub fn confirm(users: &[SelectedUser]) -> Result<Confirmation> {
    if users.is_empty() {
        return Err(RoboError::Pipeline("Nenhum usuário selecionado".to_string()));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let usuarios: Vec<SelectedUser> = users
        .iter()
        .filter_map(|user| {
            let cpf = extract_digits(&user.cpf);
            (cpf.len() == 11 && seen.insert(cpf.clone())).then(|| SelectedUser {
                id: user.id.clone(),
                cpf,
            })
        })
        .collect();

    let processed = usuarios.len();
    info!(processed, "Inativação confirmada");
    Ok(Confirmation {
        success: true,
        processed,
        usuarios,
        message: format!("{} usuário(s) inativados.", processed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Table {
        Table::literal(
            &["IdUsuario", "CPF", "Nome Completo", "Email", "Status"],
            &[
                &["7", "111.222.333-44", "Maria Silva", "maria@empresa.com", "ATIVO"],
                &["", "55566677788", "João Souza", "joao@empresa.com", "INATIVO"],
                &["9", "99988877766", "Carla Dias", "Carla@Empresa.com", "ATIVO"],
            ],
        )
        .unwrap()
    }

    fn items(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_search_by_cpf_name_and_email() {
        let report = search(
            &base(),
            &items(&["11122233344", "joao souza", "CARLA@empresa.com", "00011122233"]),
        );

        assert_eq!(report.total, 4);
        let found: Vec<&str> = report
            .items
            .iter()
            .filter(|i| i.found)
            .map(|i| i.nome.as_str())
            .collect();
        assert_eq!(found, vec!["Carla Dias", "João Souza", "Maria Silva"]);

        let maria = report.items.iter().find(|i| i.nome == "Maria Silva").unwrap();
        assert_eq!(maria.id.as_deref(), Some("7"));
        assert_eq!(maria.cpf, "11122233344");

        let joao = report.items.iter().find(|i| i.nome == "João Souza").unwrap();
        assert_eq!(joao.id, None);
        assert_eq!(joao.status_atual, "INATIVO");

        let missing = report.items.last().unwrap();
        assert!(!missing.found);
        assert_eq!(missing.cpf, "00011122233");
        assert_eq!(missing.status_atual, STATUS_NAO_LOCALIZADO);
        assert_eq!(report.not_found, vec!["00011122233"]);
    }

    #[test]
    fn test_name_already_found_by_cpf_is_not_repeated() {
        let report = search(&base(), &items(&["111.222.333-44", "Maria Silva"]));
        assert_eq!(report.total, 1);
        assert!(report.not_found.is_empty());
    }

    #[test]
    fn test_duplicates_and_not_found_names() {
        let report = search(
            &base(),
            &items(&["11122233344", "111.222.333-44", "Fulano de Tal", "Ana"]),
        );
        assert_eq!(report.duplicates, vec!["11122233344"]);
        assert_eq!(report.not_found, vec!["Fulano de Tal"]);
        let missing = report.items.iter().find(|i| !i.found).unwrap();
        assert_eq!(missing.nome, "FULANO DE TAL");
    }

    #[test]
    fn test_confirm() {
        let users = vec![
            SelectedUser {
                id: Some("7".to_string()),
                cpf: "111.222.333-44".to_string(),
            },
            SelectedUser {
                id: Some("8".to_string()),
                cpf: "11122233344".to_string(),
            },
            SelectedUser {
                id: None,
                cpf: "123".to_string(),
            },
        ];
        let confirmation = confirm(&users).unwrap();
        assert!(confirmation.success);
        assert_eq!(confirmation.processed, 1);
        assert_eq!(confirmation.usuarios[0].cpf, "11122233344");
        assert_eq!(confirmation.message, "1 usuário(s) inativados.");
    }

    #[test]
    fn test_confirm_empty_selection() {
        assert!(matches!(confirm(&[]), Err(RoboError::Pipeline(_))));
    }
}
