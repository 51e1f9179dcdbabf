use clap::Parser;

use skein::cmd::Cli;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = cli.command.run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
