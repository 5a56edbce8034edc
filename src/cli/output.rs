//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command. Tables and status lines go to
//! stdout, diagnostics to stderr.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::decrypt::VaultSecret;
use crate::format::cred::{CredSecret, Credential};
use crate::pool::{UnlockMethod, UnlockOutcome, UnlockStatus};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print the per-file outcome table for an unlock run.
pub fn print_outcomes_table(outcomes: &[UnlockOutcome], show_keys: bool) {
    if outcomes.is_empty() {
        info("No master key files loaded.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec!["Master key", "Status", "Method"];
    if show_keys {
        header.push("Key");
    }
    table.set_header(header);

    for o in outcomes {
        let status = match o.status {
            UnlockStatus::Unlocked => "unlocked",
            UnlockStatus::Locked => "locked",
        };
        let method = match o.method {
            Some(UnlockMethod::Password) => "password",
            Some(UnlockMethod::Hash) => "hash",
            Some(UnlockMethod::History) => "history",
            None => "-",
        };
        let mut row = vec![o.guid.to_string(), status.to_string(), method.to_string()];
        if show_keys {
            row.push(o.key.clone().unwrap_or_else(|| "-".into()));
        }
        table.add_row(row);
    }

    println!("{table}");
}

/// Print a decrypted credential as a field/value table.
pub fn print_credential_table(cred: &Credential) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Target".to_string(), cred.target.clone()]);
    table.add_row(vec!["Username".to_string(), cred.username.clone()]);
    let secret = match &cred.secret {
        CredSecret::Text(text) => text.clone(),
        CredSecret::Raw(bytes) => format!("(raw) {}", hex::encode(bytes)),
    };
    table.add_row(vec!["Secret".to_string(), secret]);
    if !cred.alias.is_empty() {
        table.add_row(vec!["Alias".to_string(), cred.alias.clone()]);
    }
    if !cred.comment.is_empty() {
        table.add_row(vec!["Comment".to_string(), cred.comment.clone()]);
    }
    if let Some(ts) = cred.last_written {
        table.add_row(vec![
            "Last written".to_string(),
            ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print decrypted vault items, one row each.
pub fn print_vault_table(secrets: &[VaultSecret]) {
    if secrets.is_empty() {
        info("No vault items in this directory.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Item",
        "Resource",
        "Identity",
        "Authenticator",
        "Last written",
    ]);

    for s in secrets {
        table.add_row(vec![
            s.name.clone(),
            s.resource.clone().unwrap_or_else(|| "-".into()),
            s.identity.clone().unwrap_or_else(|| "-".into()),
            s.authenticator.clone().unwrap_or_else(|| "-".into()),
            s.last_written
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".into()),
        ]);
    }

    println!("{table}");
}
