use clap::Parser;
use hodol_ledger::args::{Args, Command};
use hodol_ledger::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().hodol_home().path();

    // When HODOL_IN_TEST_MODE is set and non-empty, client commands use a seeded in-memory store
    // instead of the API.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => {
            commands::init(home, init_args.api_url(), init_args.token())
                .await?
                .print()
        }

        Command::Serve(serve_args) => commands::serve(Config::load(home).await?, serve_args)
            .await?
            .print(),

        Command::Expenses(expenses_args) => {
            commands::list_expenses(Config::load(home).await?, mode, expenses_args)
                .await?
                .print()
        }

        Command::Add(add_args) => commands::add_expense(Config::load(home).await?, mode, add_args)
            .await?
            .print(),

        Command::Move(move_args) => {
            commands::move_expense(Config::load(home).await?, mode, move_args)
                .await?
                .print()
        }

        Command::Delete(delete_args) => {
            commands::delete_expense(Config::load(home).await?, mode, delete_args)
                .await?
                .print()
        }

        Command::Categories(categories_args) => {
            commands::categories(Config::load(home).await?, mode, categories_args)
                .await?
                .print()
        }

        Command::Summary(summary_args) => {
            commands::summary(Config::load(home).await?, mode, summary_args)
                .await?
                .print()
        }

        Command::Eval(eval_args) => commands::eval(eval_args)?.print(),
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        // Without RUST_LOG, only the library and this binary log, at the requested level.
        None => EnvFilter::new(format!(
            "{}={level},{}={level}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            env!("CARGO_BIN_NAME"),
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
