//! Typed request/response pairs for every command the browser side understands.
//!
//! Each request type serializes to the command-specific fields of the payload
//! (camelCase, absent options omitted) and names its command and output type
//! through [`Command`]. The browser objects are decoded leniently: unknown
//! fields are ignored and missing ones default, since browsers differ in what
//! they report.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A strongly typed remote procedure.
pub trait Command: Serialize + DeserializeOwned + Send + 'static {
    /// Command name on the wire, e.g. `tab.list`.
    const NAME: &'static str;

    /// Reply payload. `()` for void operations (encoded as `null`).
    type Output: Serialize + DeserializeOwned + Send + 'static;
}

macro_rules! command {
    ($ty:ident, $name:literal, $output:ty) => {
        impl Command for $ty {
            const NAME: &'static str = $name;
            type Output = $output;
        }
    };
}

/// Every command name, in the order the CLI documents them.
pub const COMMAND_NAMES: &[&str] = &[
    TabList::NAME,
    TabGet::NAME,
    TabPin::NAME,
    TabUnpin::NAME,
    TabFocus::NAME,
    TabRemove::NAME,
    TabReload::NAME,
    TabUpdate::NAME,
    TabCreate::NAME,
    TabSource::NAME,
    SelectionGet::NAME,
    SelectionSet::NAME,
    WindowList::NAME,
    WindowFocus::NAME,
    WindowRemove::NAME,
    WindowCreate::NAME,
    ExtensionList::NAME,
    BookmarkList::NAME,
    BookmarkCreate::NAME,
    BookmarkRemove::NAME,
    DownloadList::NAME,
    HistorySearch::NAME,
];

// Browser objects

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutedInfo {
    pub muted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tab {
    pub active: bool,
    pub audible: bool,
    pub auto_discardable: bool,
    pub discarded: bool,
    pub fav_icon_url: String,
    pub group_id: i64,
    pub height: i64,
    pub highlighted: bool,
    pub id: i64,
    pub incognito: bool,
    pub index: i64,
    pub muted_info: MutedInfo,
    pub pinned: bool,
    pub selected: bool,
    pub status: String,
    pub title: String,
    pub url: String,
    pub width: i64,
    pub window_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Window {
    pub id: i64,
    pub focused: bool,
    pub incognito: bool,
    pub always_on_top: bool,
    pub state: String,
    #[serde(rename = "type")]
    pub window_type: String,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Vec<Tab>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Extension {
    pub id: String,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub description: String,
    #[serde(rename = "type")]
    pub extension_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bookmark {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Bookmark>>,
}

impl Bookmark {
    /// Depth-first walk of this node and its descendants, with depth.
    pub fn walk(&self) -> Vec<(usize, &Bookmark)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            if let Some(children) = &node.children {
                for child in children.iter().rev() {
                    stack.push((depth + 1, child));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Download {
    pub id: i64,
    pub url: String,
    pub filename: String,
    pub mime: String,
    pub state: String,
    pub total_bytes: i64,
    pub bytes_received: i64,
    pub start_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryItem {
    pub id: String,
    pub url: String,
    pub title: String,
    pub last_visit_time: f64,
    pub visit_count: i64,
    pub typed_count: i64,
}

// Tabs

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabList {}
command!(TabList, "tab.list", Vec<Tab>);

/// Without `tab_id` the browser uses the active tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}
command!(TabGet, "tab.get", Tab);

macro_rules! tab_ids_command {
    ($(#[$doc:meta])* $ty:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $ty {
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub tab_ids: Option<Vec<i64>>,
        }
        command!($ty, $name, ());
    };
}

tab_ids_command!(
    /// Without `tab_ids` the active tab is pinned.
    TabPin,
    "tab.pin"
);
tab_ids_command!(TabUnpin, "tab.unpin");
tab_ids_command!(
    /// Without `tab_ids` the active tab is closed.
    TabRemove,
    "tab.remove"
);
tab_ids_command!(TabReload, "tab.reload");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabFocus {
    pub tab_id: i64,
}
command!(TabFocus, "tab.focus", ());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
command!(TabUpdate, "tab.update", Tab);

/// Without `urls` a single new-tab page is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}
command!(TabCreate, "tab.create", ());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}
command!(TabSource, "tab.source", String);

// Selection

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionGet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}
command!(SelectionGet, "selection.get", String);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    pub text: String,
}
command!(SelectionSet, "selection.set", ());

// Windows

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowList {}
command!(WindowList, "window.list", Vec<Window>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowFocus {
    pub window_id: i64,
}
command!(WindowFocus, "window.focus", ());

/// Without `window_ids` the current window is closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRemove {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ids: Option<Vec<i64>>,
}
command!(WindowRemove, "window.remove", ());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}
command!(WindowCreate, "window.create", Window);

// Extensions, bookmarks, downloads, history

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionList {}
command!(ExtensionList, "extension.list", Vec<Extension>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkList {}
command!(BookmarkList, "bookmark.list", Vec<Bookmark>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkCreate {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}
command!(BookmarkCreate, "bookmark.create", Bookmark);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRemove {
    pub bookmark_ids: Vec<String>,
}
command!(BookmarkRemove, "bookmark.remove", ());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadList {}
command!(DownloadList, "download.list", Vec<Download>);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySearch {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}
command!(HistorySearch, "history.search", Vec<HistoryItem>);
