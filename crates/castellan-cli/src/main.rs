mod bench;
mod uci;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "castellan", about = "UCI chess engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<SubCommands>,
}

#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Search a fixed position suite and report node counts and speed.
    Bench {
        #[arg(long, default_value = "8")]
        depth: i32,

        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(SubCommands::Bench { depth, threads }) => bench::run(depth, threads),
        None => uci::run(),
    }
}
