#[macro_use]
extern crate tracing;

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use stratus_core::tracing::initialize_tracing;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing(None);

    let args = Cli::parse();

    match args.command {
        Command::Serve {
            interface,
            port,
            env_file,
        } => {
            let resolver = commands::resolver(env_file.as_deref())?;
            commands::serve(resolver, interface, port).await?;
        }
        Command::Sign {
            method,
            path,
            body,
            user,
            env_file,
        } => {
            let resolver = commands::resolver(env_file.as_deref())?;
            commands::sign(
                resolver,
                &method,
                &path,
                body.as_deref(),
                user.as_deref(),
            )?;
        }
    };

    Ok(())
}
