mod dispatch;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use tabbridge::bridge::transport::connect;
use tabbridge::config::timeout_from_secs;
use tabbridge::{BridgeConfig, ClientConfig, RpcClient};

use crate::error::CliError;
use crate::output::Output;

#[derive(Parser, Debug)]
#[command(name = "tabbridge")]
#[command(about = "Control a running browser from the command line", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Host socket (overrides TABBRIDGE_SOCKET)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Seconds to wait for each reply, 0 waits forever (overrides TABBRIDGE_TIMEOUT_SECS)
    #[arg(long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<f64>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage tabs
    Tab {
        #[command(subcommand)]
        command: TabCommands,
    },

    /// Read or replace the selected text
    Selection {
        #[command(subcommand)]
        command: SelectionCommands,
    },

    /// Manage windows
    Window {
        #[command(subcommand)]
        command: WindowCommands,
    },

    /// Inspect installed extensions
    Extension {
        #[command(subcommand)]
        command: ExtensionCommands,
    },

    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },

    /// Inspect downloads
    Download {
        #[command(subcommand)]
        command: DownloadCommands,
    },

    /// Search browsing history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Send an arbitrary command and print the raw JSON result
    Call {
        /// Command name (e.g. "tab.list")
        command: String,
        /// JSON object with the command's fields (e.g. '{"tabId": 7}')
        args: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TabCommands {
    /// List all tabs
    List,
    /// Show a tab (the active one by default)
    Get { id: Option<i64> },
    /// Print a tab's URL (the active one by default)
    Url { id: Option<i64> },
    /// Activate a tab and focus its window
    Focus { id: i64 },
    /// Open tabs (a new-tab page when no URL is given)
    Create { urls: Vec<String> },
    /// Close tabs (the active one by default)
    Close { ids: Vec<i64> },
    /// Pin tabs (the active one by default)
    Pin { ids: Vec<i64> },
    /// Unpin tabs (the active one by default)
    Unpin { ids: Vec<i64> },
    /// Reload tabs (the active one by default)
    Reload { ids: Vec<i64> },
    /// Navigate a tab to a new URL
    Update {
        /// Tab to update (the active one by default)
        #[arg(long)]
        tab: Option<i64>,
        #[arg(long)]
        url: String,
    },
    /// Print a tab's page source (the active one by default)
    Source { id: Option<i64> },
}

#[derive(Subcommand, Debug)]
pub enum SelectionCommands {
    /// Print the selected text
    Get {
        #[arg(long)]
        tab: Option<i64>,
    },
    /// Replace the selection with TEXT
    Set {
        text: String,
        #[arg(long)]
        tab: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WindowCommands {
    /// List windows
    List,
    /// Focus a window
    Focus { id: i64 },
    /// Close windows (the current one by default)
    Close { ids: Vec<i64> },
    /// Open a window with the given URLs
    Create { urls: Vec<String> },
}

#[derive(Subcommand, Debug)]
pub enum ExtensionCommands {
    /// List installed extensions
    List,
}

#[derive(Subcommand, Debug)]
pub enum BookmarkCommands {
    /// Print the bookmark tree
    List,
    /// Bookmark a URL
    Create {
        url: String,
        #[arg(long)]
        title: Option<String>,
        /// Folder to create the bookmark in
        #[arg(long)]
        parent: Option<String>,
    },
    /// Remove bookmarks by ID
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DownloadCommands {
    /// List downloads
    List,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// Search history for QUERY
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        max: Option<u32>,
    },
}

fn parse_timeout(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .ok_or_else(|| format!("expected a non-negative number of seconds, got {raw:?}"))
}

/// Parse `call` arguments up front so malformed JSON never reaches the host.
pub fn parse_call_args(raw: Option<&str>) -> Result<Map<String, Value>, CliError> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::Arguments(
            "call arguments must be a JSON object".to_string(),
        )),
        Err(e) => Err(CliError::Arguments(format!("malformed JSON: {e}"))),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tabbridge::init_tracing("warn");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("tabbridge: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(socket) = cli.socket {
        config = config.with_socket_path(socket);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(timeout_from_secs(secs));
    }

    if let Commands::Call { args, .. } = &cli.command {
        parse_call_args(args.as_deref())?;
    }

    let stream = connect(&config.socket_path)
        .await
        .map_err(|source| CliError::Connect {
            path: config.socket_path.clone(),
            source,
        })?;
    let (reader, writer) = stream.into_split();
    let client = RpcClient::new(reader, writer, ClientConfig::from(&config));

    let mut output = Output::new(std::io::stdout().lock(), cli.json);
    dispatch::execute(&client, cli.command, &mut output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["tabbridge", "tab", "pin", "3", "4", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Tab {
                command: TabCommands::Pin { ids },
            } => assert_eq!(ids, vec![3, 4]),
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "tabbridge",
            "--socket",
            "/tmp/t.sock",
            "tab",
            "update",
            "--tab",
            "5",
            "--url",
            "https://example.com",
        ])
        .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/t.sock")));
        assert!(matches!(
            cli.command,
            Commands::Tab {
                command: TabCommands::Update { tab: Some(5), .. }
            }
        ));
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        let err = Cli::try_parse_from(["tabbridge", "tab", "close", "1", "two"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = Cli::try_parse_from(["tabbridge", "tab", "focus", "abc"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let err = Cli::try_parse_from(["tabbridge", "--timeout=-1", "tab", "list"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let cli = Cli::try_parse_from(["tabbridge", "tab", "list", "--timeout", "0"]).unwrap();
        assert_eq!(cli.timeout, Some(0.0));
    }

    #[test]
    fn bookmark_remove_requires_ids() {
        let err = Cli::try_parse_from(["tabbridge", "bookmark", "remove"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn call_arguments_must_be_an_object() {
        assert!(parse_call_args(None).unwrap().is_empty());
        assert_eq!(
            parse_call_args(Some(r#"{"tabId": 7}"#)).unwrap()["tabId"],
            Value::from(7)
        );

        let err = parse_call_args(Some("[1, 2]")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = parse_call_args(Some("{nope")).unwrap_err();
        assert!(err.to_string().starts_with("invalid arguments: malformed JSON"));
    }
}
