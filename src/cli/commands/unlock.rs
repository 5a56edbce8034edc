//! `unprotect unlock` — derive master keys from a credential and report
//! per-file outcomes.

use std::time::Duration;

use crate::cli::output;
use crate::cli::{build_pool, unlock_pool, CredentialArgs, PoolArgs};
use crate::config::UnlockOptions;
use crate::errors::Result;

/// Execute the `unlock` command.
pub fn execute(
    pool_args: &PoolArgs,
    credential: &CredentialArgs,
    limit: Option<usize>,
    timeout: Option<u64>,
    json: bool,
    show_keys: bool,
) -> Result<()> {
    let pool = build_pool(pool_args)?;
    let options = UnlockOptions {
        candidate_limit: limit,
        time_budget: timeout.map(Duration::from_secs),
    };

    let mut outcomes = unlock_pool(&pool, credential, &options)?;
    if !show_keys {
        for o in &mut outcomes {
            o.key = None;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    output::info(&format!(
        "{} of {} master key file(s) unlocked for {} ({} derivations)",
        pool.unlocked_count(),
        pool.loaded_count(),
        pool.sid(),
        pool.derivation_attempts(),
    ));
    output::print_outcomes_table(&outcomes, show_keys);

    if let Some(password) = pool.cleartext_password() {
        output::success(&format!("Account password: {}", password.as_str()));
    }
    if pool.unlocked_count() == 0 {
        output::warning("Nothing unlocked.");
        output::tip("Run `unprotect hash` to export a crackable $DPAPImk$ line.");
    }
    Ok(())
}
