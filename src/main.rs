use clap::Parser;
use unprotect::cli::{Cli, Commands};

fn main() {
    // Diagnostics go to stderr so piped stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Unlock {
            ref pool,
            ref credential,
            limit,
            timeout,
            json,
            show_keys,
        } => unprotect::cli::commands::unlock::execute(
            pool, credential, limit, timeout, json, show_keys,
        ),
        Commands::Hash { ref pool, context } => {
            unprotect::cli::commands::hash::execute(pool, context)
        }
        Commands::Blob {
            ref pool,
            ref credential,
            ref file,
            ref entropy,
            ref out,
        } => unprotect::cli::commands::blob::execute(
            pool,
            credential,
            file,
            entropy.as_deref(),
            out.as_deref(),
        ),
        Commands::Cred {
            ref pool,
            ref credential,
            ref file,
            json,
        } => unprotect::cli::commands::cred::execute(pool, credential, file, json),
        Commands::Vault {
            ref pool,
            ref credential,
            ref dir,
            json,
        } => unprotect::cli::commands::vault::execute(pool, credential, dir, json),
    };

    if let Err(e) = result {
        unprotect::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
