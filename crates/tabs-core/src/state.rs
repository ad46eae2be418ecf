use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

pub const RECOVER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    // Ids are minted by the writer before the operation is appended, so
    // replaying the log never needs to generate one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabKind {
    NewTabPlaceholder,
    Regular,
}

impl TabKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::NewTabPlaceholder => "new_tab",
            Self::Regular => "regular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRecord {
    pub tab_id: TabId,
    #[serde(rename = "type")]
    pub kind: TabKind,
    pub url: Option<String>,
    pub title: Option<String>,
    pub load: u64,
}

impl TabRecord {
    pub fn placeholder(tab_id: TabId) -> Self {
        Self {
            tab_id,
            kind: TabKind::NewTabPlaceholder,
            url: None,
            title: None,
            load: 0,
        }
    }

    pub fn regular(tab_id: TabId, url: Option<String>) -> Self {
        Self {
            tab_id,
            kind: TabKind::Regular,
            url,
            title: None,
            load: 1,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == TabKind::NewTabPlaceholder
    }
}

// Closed tabs, most recent at the back. Pushing past RECOVER_LIMIT drops
// the oldest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoverStack {
    entries: VecDeque<TabRecord>,
}

impl RecoverStack {
    pub fn push(&mut self, record: TabRecord) {
        self.entries.push_back(record);
        while self.entries.len() > RECOVER_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<TabRecord> {
        self.entries.pop_back()
    }

    pub fn top(&self) -> Option<&TabRecord> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabRecord> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u64,
    pub tabs: Vec<TabRecord>,
    pub active: Option<usize>,
    pub recover: RecoverStack,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tab(&self) -> Option<&TabRecord> {
        self.active.and_then(|index| self.tabs.get(index))
    }

    pub fn position(&self, tab_id: &TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| &tab.tab_id == tab_id)
    }

    pub fn get(&self, tab_id: &TabId) -> Option<&TabRecord> {
        self.tabs.iter().find(|tab| &tab.tab_id == tab_id)
    }

    pub fn placeholder(&self) -> Option<&TabRecord> {
        self.tabs.iter().find(|tab| tab.is_placeholder())
    }

    pub fn placeholder_count(&self) -> usize {
        self.tabs.iter().filter(|tab| tab.is_placeholder()).count()
    }

    pub fn neighbour(&self, offset: isize) -> Option<&TabRecord> {
        let active = self.active?;
        let len = self.tabs.len() as isize;
        if len == 0 {
            return None;
        }
        let index = (active as isize + offset).rem_euclid(len) as usize;
        self.tabs.get(index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    pub title: Option<String>,
    pub url: Option<String>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabView {
    #[serde(flatten)]
    pub record: TabRecord,
    pub state: Option<LiveState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub active: Option<usize>,
    pub tabs: Vec<TabView>,
}

impl SessionView {
    pub fn active_tab(&self) -> Option<&TabView> {
        self.active.and_then(|index| self.tabs.get(index))
    }
}
