mod cli;

use clap::Parser;
use cli::Cli;
use colored::Colorize;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 初始化日志系统
    functest::logger::init_logger(cli.verbose);

    let code = match cli::run(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            1
        }
    };

    // Exit directly: a timed-out test may still occupy a blocking thread,
    // which would otherwise hold up runtime shutdown.
    process::exit(code);
}
