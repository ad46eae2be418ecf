use serde::Deserialize;
use serde::Serialize;

use super::state::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    NewTab,
    NewForegroundTab,
    NewBackgroundTab,
}

impl Disposition {
    pub fn is_foreground(self) -> bool {
        match self {
            Self::NewTab | Self::NewForegroundTab => true,
            Self::NewBackgroundTab => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NewTab => "new_tab",
            Self::NewForegroundTab => "new_foreground_tab",
            Self::NewBackgroundTab => "new_background_tab",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    New {
        disposition: Disposition,
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    Select {
        tab_id: TabId,
    },
    Commit,
    Close {
        #[serde(default)]
        tab_id: Option<TabId>,
        next_tab_id: TabId,
    },
    Recover,
    StateUpdate {
        tab_id: TabId,
        title: Option<String>,
        url: Option<String>,
    },
    Load {
        tab_id: TabId,
        url: String,
    },
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::New { .. } => "new",
            Self::Select { .. } => "select",
            Self::Commit => "commit",
            Self::Close { .. } => "close",
            Self::Recover => "recover",
            Self::StateUpdate { .. } => "state_update",
            Self::Load { .. } => "load",
        }
    }

    pub fn tab_id(&self) -> Option<&TabId> {
        match self {
            Self::New { tab_id, .. }
            | Self::Select { tab_id }
            | Self::StateUpdate { tab_id, .. }
            | Self::Load { tab_id, .. } => Some(tab_id),
            Self::Close { tab_id, .. } => tab_id.as_ref(),
            Self::Commit | Self::Recover => None,
        }
    }
}

// Already-normalized user intents, as produced by the tab strip, the
// address box and keyboard shortcuts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "arg", rename_all = "snake_case")]
pub enum TabIntent {
    NewTab,
    Commit,
    Close(Option<TabId>),
    Back,
    Forward,
    Reload,
    Recover,
    Select(TabId),
    SelectAndCommit(TabId),
    SelectNext,
    SelectPrev,
    Load(String),
}
