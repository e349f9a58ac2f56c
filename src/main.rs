use colored::Colorize;
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime;
use typerace_collab::{Collab, Config, DatabaseError, MemoryDatabase, PgDatabase};
use typerace_server::run_server;

use crate::{env::EnvConfig, logging::LogColor};

mod env;
mod logging;

#[derive(Debug, Error)]
enum TyperaceError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not run server: {0}")]
    Server(#[from] std::io::Error),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl TyperaceError {
    fn hint(&self) -> String {
        match self {
            TyperaceError::Database(_) => "This is a database error. Make sure the Postgres instance in TYPERACE_DATABASE_URL is running and reachable, then try again.".to_string(),
            TyperaceError::Server(_) => "The server could not listen. Make sure TYPERACE_SERVER_PORT is not already in use.".to_string(),
            TyperaceError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn run(env: EnvConfig) -> Result<(), TyperaceError> {
    info!("Building async runtime...");
    let main_runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("typerace-async")
        .build()
        .map_err(|e| TyperaceError::Fatal(e.to_string()))?;

    main_runtime.block_on(async move {
        let config = Config::default();

        let collab = match &env.database_url {
            Some(url) => {
                info!("Connecting to database...");
                Collab::new(PgDatabase::new(url).await?, config)
            }
            None => {
                warn!("TYPERACE_DATABASE_URL is not set, lobbies will only be kept in memory");
                Collab::new(MemoryDatabase::new(), config)
            }
        };

        info!("Initialized successfully.");
        run_server(collab, env.port).await?;

        Ok::<(), TyperaceError>(())
    })
}

fn main() {
    logging::init_logger();

    if let Err(error) = run(EnvConfig::from_env()) {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "typerace failed to start!".bold().color(LogColor::Red));
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint())
                .color(LogColor::Dimmed)
                .italic()
        );
    }
}
