//! Maps parsed subcommands onto typed requests and renders their results.

use std::io::Write;

use tabbridge::RpcClient;
use tabbridge::commands::{
    BookmarkCreate, BookmarkList, BookmarkRemove, DownloadList, ExtensionList, HistorySearch,
    SelectionGet, SelectionSet, TabCreate, TabFocus, TabGet, TabList, TabPin, TabReload,
    TabRemove, TabSource, TabUnpin, TabUpdate, WindowCreate, WindowFocus, WindowList,
    WindowRemove,
};

use crate::error::CliError;
use crate::output::Output;
use crate::{
    BookmarkCommands, Commands, DownloadCommands, ExtensionCommands, HistoryCommands,
    SelectionCommands, TabCommands, WindowCommands, parse_call_args,
};

pub async fn execute<W: Write>(
    client: &RpcClient,
    command: Commands,
    out: &mut Output<W>,
) -> Result<(), CliError> {
    match command {
        Commands::Tab { command } => tab(client, command, out).await,
        Commands::Selection { command } => selection(client, command, out).await,
        Commands::Window { command } => window(client, command, out).await,
        Commands::Extension {
            command: ExtensionCommands::List,
        } => Ok(out.show(&client.call(&ExtensionList {}).await?)?),
        Commands::Bookmark { command } => bookmark(client, command, out).await,
        Commands::Download {
            command: DownloadCommands::List,
        } => Ok(out.show(&client.call(&DownloadList {}).await?)?),
        Commands::History {
            command: HistoryCommands::Search { query, max },
        } => {
            let request = HistorySearch {
                text: query,
                max_results: max,
            };
            Ok(out.show(&client.call(&request).await?)?)
        }
        Commands::Call { command, args } => {
            let args = parse_call_args(args.as_deref())?;
            let result = client.invoke(&command, args).await?;
            Ok(out.json(&result)?)
        }
    }
}

/// An empty list on the command line means "let the browser pick".
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

async fn tab<W: Write>(
    client: &RpcClient,
    command: TabCommands,
    out: &mut Output<W>,
) -> Result<(), CliError> {
    match command {
        TabCommands::List => out.show(&client.call(&TabList {}).await?)?,
        TabCommands::Get { id } => out.show(&client.call(&TabGet { tab_id: id }).await?)?,
        TabCommands::Url { id } => {
            let tab = client.call(&TabGet { tab_id: id }).await?;
            out.line(&tab.url)?;
        }
        TabCommands::Focus { id } => client.call(&TabFocus { tab_id: id }).await?,
        TabCommands::Create { urls } => {
            client
                .call(&TabCreate {
                    urls: non_empty(urls),
                })
                .await?
        }
        TabCommands::Close { ids } => {
            client
                .call(&TabRemove {
                    tab_ids: non_empty(ids),
                })
                .await?
        }
        TabCommands::Pin { ids } => {
            client
                .call(&TabPin {
                    tab_ids: non_empty(ids),
                })
                .await?
        }
        TabCommands::Unpin { ids } => {
            client
                .call(&TabUnpin {
                    tab_ids: non_empty(ids),
                })
                .await?
        }
        TabCommands::Reload { ids } => {
            client
                .call(&TabReload {
                    tab_ids: non_empty(ids),
                })
                .await?
        }
        TabCommands::Update { tab, url } => {
            let request = TabUpdate {
                tab_id: tab,
                url: Some(url),
            };
            out.show(&client.call(&request).await?)?;
        }
        TabCommands::Source { id } => {
            let source = client.call(&TabSource { tab_id: id }).await?;
            out.raw(&source)?;
        }
    }
    Ok(())
}

async fn selection<W: Write>(
    client: &RpcClient,
    command: SelectionCommands,
    out: &mut Output<W>,
) -> Result<(), CliError> {
    match command {
        SelectionCommands::Get { tab } => {
            let text = client.call(&SelectionGet { tab_id: tab }).await?;
            out.line(&text)?;
        }
        SelectionCommands::Set { text, tab } => {
            client.call(&SelectionSet { tab_id: tab, text }).await?;
        }
    }
    Ok(())
}

async fn window<W: Write>(
    client: &RpcClient,
    command: WindowCommands,
    out: &mut Output<W>,
) -> Result<(), CliError> {
    match command {
        WindowCommands::List => out.show(&client.call(&WindowList {}).await?)?,
        WindowCommands::Focus { id } => client.call(&WindowFocus { window_id: id }).await?,
        WindowCommands::Close { ids } => {
            client
                .call(&WindowRemove {
                    window_ids: non_empty(ids),
                })
                .await?
        }
        WindowCommands::Create { urls } => {
            let request = WindowCreate {
                urls: non_empty(urls),
            };
            out.show(&client.call(&request).await?)?;
        }
    }
    Ok(())
}

async fn bookmark<W: Write>(
    client: &RpcClient,
    command: BookmarkCommands,
    out: &mut Output<W>,
) -> Result<(), CliError> {
    match command {
        BookmarkCommands::List => out.show(&client.call(&BookmarkList {}).await?)?,
        BookmarkCommands::Create { url, title, parent } => {
            let request = BookmarkCreate {
                url,
                title,
                parent_id: parent,
            };
            out.show(&client.call(&request).await?)?;
        }
        BookmarkCommands::Remove { ids } => {
            client
                .call(&BookmarkRemove { bookmark_ids: ids })
                .await?
        }
    }
    Ok(())
}
