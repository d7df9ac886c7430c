//! These structs provide the CLI interface for the hodol CLI.

use crate::model::ExpenseType;
use crate::server::DEFAULT_PORT;
use crate::table::SortMode;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// hodol: a two-person household expense ledger.
///
/// Expenses are kept per month in three tables: shared expenses ("both") and each member's own
/// ("hodol" and "doldol"). `hodol serve` runs the REST API that stores them. The other
/// subcommands are clients of that API: they list, add, move and delete expenses, manage the
/// category directory and print a yearly summary.
///
/// Writes need one of the two household tokens, configured at `hodol init`.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the server database.
    ///
    /// By default the data directory is $HOME/hodol. Pass --hodol-home or set HODOL_HOME to put
    /// it somewhere else.
    Init(InitArgs),
    /// Run the REST API server.
    Serve(ServeArgs),
    /// List expenses, optionally for one month and/or one table.
    Expenses(ExpensesArgs),
    /// Add an expense to one table. The amount may be a formula such as "=12000/3".
    Add(AddArgs),
    /// Move an expense to another table of the same month.
    Move(MoveArgs),
    /// Delete an expense.
    Delete(DeleteArgs),
    /// List, add, rename or delete categories.
    Categories(CategoriesArgs),
    /// Print the yearly summary by major category and month.
    Summary(SummaryArgs),
    /// Evaluate an amount formula, e.g. "=(10+2)*3".
    Eval(EvalArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where hodol configuration and data is held. Defaults to ~/hodol
    #[arg(long, env = "HODOL_HOME", default_value_t = default_hodol_home())]
    hodol_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, hodol_home: PathBuf) -> Self {
        Self {
            log_level,
            hodol_home: hodol_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn hodol_home(&self) -> &DisplayPath {
        &self.hodol_home
    }
}

/// (Not shown): Args for the `hodol init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The base URL of the API used by client commands.
    #[arg(long, default_value_t = format!("http://localhost:{DEFAULT_PORT}/api"))]
    api_url: String,

    /// The household token client commands present. Without one, client commands are read-only.
    #[arg(long, env = "HODOL_TOKEN", default_value = "")]
    token: String,
}

impl InitArgs {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// (Not shown): Args for the `hodol serve` command. Each flag overrides the config file.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The port to listen on. Defaults to the config file's port, or 3001.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// The browser origin allowed by CORS, e.g. http://localhost:3000
    #[arg(long, env = "FRONTEND_URL")]
    allowed_origin: Option<String>,

    /// Comma separated tokens that may write, e.g. "hodol,doldol"
    #[arg(long, env = "ALLOWED_TOKENS", value_delimiter = ',')]
    allowed_tokens: Option<Vec<String>>,
}

impl ServeArgs {
    pub fn new(
        port: Option<u16>,
        allowed_origin: Option<String>,
        allowed_tokens: Option<Vec<String>>,
    ) -> Self {
        Self {
            port,
            allowed_origin,
            allowed_tokens,
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn allowed_origin(&self) -> Option<&str> {
        self.allowed_origin.as_deref()
    }

    pub fn allowed_tokens(&self) -> Option<&[String]> {
        self.allowed_tokens.as_deref()
    }
}

/// (Not shown): Args for the `hodol expenses` command.
#[derive(Debug, Parser, Clone)]
pub struct ExpensesArgs {
    /// Only this month, 1 to 12.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    month: Option<u8>,

    /// Only this table: both, hodol or doldol.
    #[arg(long = "type")]
    expense_type: Option<ExpenseType>,

    /// Order within each table: date, amount_desc or amount_asc.
    #[arg(long, default_value_t = SortMode::ByDate)]
    sort: SortMode,
}

impl ExpensesArgs {
    pub fn new(month: Option<u8>, expense_type: Option<ExpenseType>, sort: SortMode) -> Self {
        Self {
            month,
            expense_type,
            sort,
        }
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn month(&self) -> Option<u8> {
        self.month
    }

    pub fn expense_type(&self) -> Option<ExpenseType> {
        self.expense_type
    }
}

/// (Not shown): Args for the `hodol add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// The month of the table, 1 to 12.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    month: u8,

    /// The table: both, hodol or doldol.
    #[arg(long = "type")]
    expense_type: ExpenseType,

    /// The date of the expense, YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// The amount, as a number ("12,000") or a formula ("=12000/3").
    #[arg(long)]
    amount: String,

    #[arg(long)]
    major: String,

    #[arg(long)]
    minor: String,

    #[arg(long, default_value = "")]
    note: String,
}

impl AddArgs {
    pub fn new(
        month: u8,
        expense_type: ExpenseType,
        date: Option<NaiveDate>,
        amount: impl Into<String>,
        major: impl Into<String>,
        minor: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            month,
            expense_type,
            date,
            amount: amount.into(),
            major: major.into(),
            minor: minor.into(),
            note: note.into(),
        }
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn expense_type(&self) -> ExpenseType {
        self.expense_type
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn major(&self) -> &str {
        &self.major
    }

    pub fn minor(&self) -> &str {
        &self.minor
    }

    pub fn note(&self) -> &str {
        &self.note
    }
}

/// (Not shown): Args for the `hodol move` command.
#[derive(Debug, Parser, Clone)]
pub struct MoveArgs {
    /// The id of the expense to move.
    id: String,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    month: u8,

    /// The table the expense is in now.
    #[arg(long)]
    from: ExpenseType,

    /// The table to move it to.
    #[arg(long)]
    to: ExpenseType,
}

impl MoveArgs {
    pub fn new(id: impl Into<String>, month: u8, from: ExpenseType, to: ExpenseType) -> Self {
        Self {
            id: id.into(),
            month,
            from,
            to,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn from(&self) -> ExpenseType {
        self.from
    }

    pub fn to(&self) -> ExpenseType {
        self.to
    }
}

/// (Not shown): Args for the `hodol delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The id of the expense to delete.
    id: String,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    month: u8,

    #[arg(long = "type")]
    expense_type: ExpenseType,
}

impl DeleteArgs {
    pub fn new(id: impl Into<String>, month: u8, expense_type: ExpenseType) -> Self {
        Self {
            id: id.into(),
            month,
            expense_type,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn expense_type(&self) -> ExpenseType {
        self.expense_type
    }
}

/// (Not shown): Args for the `hodol categories` command.
#[derive(Debug, Parser, Clone)]
pub struct CategoriesArgs {
    #[command(subcommand)]
    action: Option<CategoryAction>,
}

impl CategoriesArgs {
    pub fn new(action: Option<CategoryAction>) -> Self {
        Self { action }
    }

    pub fn action(&self) -> Option<&CategoryAction> {
        self.action.as_ref()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryAction {
    /// Add a major/minor category pair.
    Add { major: String, minor: String },
    /// Rename the category with this id.
    Rename {
        id: String,
        major: String,
        minor: String,
    },
    /// Delete the category with this id. Expenses using it lose their categories.
    Delete { id: String },
}

/// (Not shown): Args for the `hodol summary` command.
#[derive(Debug, Parser, Clone)]
pub struct SummaryArgs {
    /// Break this major category down by minor category instead.
    #[arg(long)]
    major: Option<String>,

    /// With --major, only this month.
    #[arg(long, requires = "major", value_parser = clap::value_parser!(u8).range(1..=12))]
    month: Option<u8>,
}

impl SummaryArgs {
    pub fn new(major: Option<String>, month: Option<u8>) -> Self {
        Self { major, month }
    }

    pub fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }

    pub fn month(&self) -> Option<u8> {
        self.month
    }
}

/// (Not shown): Args for the `hodol eval` command.
#[derive(Debug, Parser, Clone)]
pub struct EvalArgs {
    /// The amount as typed into a cell: "12,000", "=10+2*3", ...
    expression: String,
}

impl EvalArgs {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

fn default_hodol_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("hodol"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --hodol-home or HODOL_HOME instead of relying on the default \
                hodol home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("hodol")
        }
    })
}

/// A `PathBuf` that clap can show as a default value.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expenses_filters() {
        let args = Args::try_parse_from([
            "hodol",
            "--hodol-home",
            "/tmp/h",
            "expenses",
            "--month",
            "5",
            "--type",
            "doldol",
        ])
        .unwrap();
        assert_eq!(args.common().hodol_home().path(), Path::new("/tmp/h"));
        let Command::Expenses(expenses) = args.command() else {
            panic!("expected the expenses command");
        };
        assert_eq!(expenses.month(), Some(5));
        assert_eq!(expenses.expense_type(), Some(ExpenseType::Doldol));
        assert_eq!(expenses.sort(), SortMode::ByDate);
    }

    #[test]
    fn test_month_out_of_range_is_rejected() {
        assert!(Args::try_parse_from(["hodol", "expenses", "--month", "13"]).is_err());
        assert!(Args::try_parse_from(["hodol", "expenses", "--type", "sum"]).is_err());
    }

    #[test]
    fn test_serve_tokens_are_comma_separated() {
        let args = Args::try_parse_from([
            "hodol",
            "serve",
            "--allowed-tokens",
            "hodol,doldol",
            "--port",
            "4000",
        ])
        .unwrap();
        let Command::Serve(serve) = args.command() else {
            panic!("expected the serve command");
        };
        assert_eq!(serve.port(), Some(4000));
        assert_eq!(
            serve.allowed_tokens(),
            Some(&["hodol".to_string(), "doldol".to_string()][..])
        );
    }

    #[test]
    fn test_add_parses_formula_amount() {
        let args = Args::try_parse_from([
            "hodol", "add", "--month", "3", "--type", "both", "--amount", "=12000/3", "--major",
            "Food", "--minor", "Cafe",
        ])
        .unwrap();
        let Command::Add(add) = args.command() else {
            panic!("expected the add command");
        };
        assert_eq!(add.amount(), "=12000/3");
        assert_eq!(add.note(), "");
        assert_eq!(add.date(), None);
    }
}
