use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use clap::Subcommand;

#[derive(Debug, Parser)]
#[clap(name = "stratus-app")]
#[clap(about = "Stratus external application", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the lifecycle endpoints the server calls
    Serve {
        /// The IP address of the interface to bind to; defaults to APP_HOST
        #[clap(short, long, value_parser)]
        interface: Option<IpAddr>,

        /// The port to listen on; defaults to APP_PORT
        #[clap(short, long, value_parser)]
        port: Option<u16>,

        /// A dotenv file with lower precedence than the environment
        #[clap(short, long, value_parser)]
        env_file: Option<PathBuf>,
    },

    /// Print the header set a request would be signed with
    #[clap(arg_required_else_help = true)]
    Sign {
        #[clap(short, long, value_parser, default_value = "GET")]
        method: String,

        /// Path and query, relative to the server's base URL
        #[clap(long, value_parser)]
        path: String,

        #[clap(short, long, value_parser)]
        body: Option<String>,

        /// Sign on behalf of this user
        #[clap(short, long, value_parser)]
        user: Option<String>,

        #[clap(short, long, value_parser)]
        env_file: Option<PathBuf>,
    },
}
