use std::process;

use clap::Parser;

use zk_shepherd::cli::Cli;

fn main() {
    env_logger::init();

    match Cli::parse().run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
