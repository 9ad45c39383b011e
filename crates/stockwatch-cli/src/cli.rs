//! Command-line interface for the stockwatch client.

use clap::{Args, Parser, Subcommand};
use market_data_client::HistoryPeriod;

/// Keep a stock watchlist locally and sync it to your account once you sign in.
#[derive(Debug, Parser)]
#[command(name = "stockwatch", author, version, about)]
pub struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the active watchlist.
    List,
    /// Add tickers to the active watchlist.
    Add {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// Remove tickers from the active watchlist.
    Remove {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// Create an account and sign in.
    Signup(Credentials),
    /// Sign in with email and password.
    Login(Credentials),
    /// Sign in with an identity token from a federated provider.
    LoginFederated {
        /// Provider id, e.g. google.com.
        #[arg(long, default_value = "google.com")]
        provider: String,
        /// Provider-issued id token. Omitting it cancels the sign-in.
        #[arg(long, env = "STOCKWATCH_FEDERATED_TOKEN", hide_env_values = true)]
        id_token: Option<String>,
    },
    /// Sign out and return to the local watchlist.
    Logout,
    /// Email a password reset link.
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Show session, active store and last reconciliation.
    Status,
    /// Show daily price history for a ticker.
    History {
        ticker: String,
        /// One of 1d 5d 1mo 3mo 6mo 1y 2y 5y ytd max.
        #[arg(long, default_value_t = HistoryPeriod::OneMonth)]
        period: HistoryPeriod,
    },
    /// Send a message through the contact form.
    Contact(ContactArgs),
}

#[derive(Debug, Args)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "STOCKWATCH_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct ContactArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_history_period() {
        let cli = Cli::parse_from(["stockwatch", "history", "aapl", "--period", "6mo"]);
        match cli.command {
            Command::History { ticker, period } => {
                assert_eq!(ticker, "aapl");
                assert_eq!(period, HistoryPeriod::SixMonths);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_add_requires_ticker() {
        assert!(Cli::try_parse_from(["stockwatch", "add"]).is_err());
        let cli = Cli::try_parse_from(["stockwatch", "--json", "add", "AAPL", "MSFT"]).unwrap();
        assert!(cli.json);
    }
}
