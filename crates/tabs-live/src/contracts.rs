use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tabs_core::actions::Disposition;
use tabs_core::state::LiveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTab {
    pub url: Option<String>,
    pub visible: bool,
    pub focus: bool,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Create {
        url: Option<String>,
        visible: bool,
        focus: bool,
        version: u64,
    },
    Close {
        handle: HandleId,
    },
    Navigate {
        handle: HandleId,
        url: String,
        version: u64,
    },
    Show {
        handle: HandleId,
        focus: bool,
    },
    SetTitle {
        title: Option<String>,
    },
    Back {
        handle: HandleId,
    },
    Forward {
        handle: HandleId,
    },
    Reload {
        handle: HandleId,
    },
}

// `version` on StateChanged is the latest command version the engine has
// applied to that handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineNotification {
    StateChanged {
        handle: HandleId,
        state: LiveState,
        version: u64,
    },
    TabCreated {
        disposition: Disposition,
        handle: HandleId,
    },
    ContextMenu {
        handle: HandleId,
        item: ContextMenuItem,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMenuItem {
    Back,
    Forward,
    Reload,
    InspectElement,
    CloseDevTools,
}

impl ContextMenuItem {
    pub fn label(self) -> &'static str {
        match self {
            Self::Back => "Back",
            Self::Forward => "Forward",
            Self::Reload => "Reload",
            Self::InspectElement => "Inspect Element",
            Self::CloseDevTools => "Close DevTools",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuEntry {
    Item(ContextMenuItem),
    Separator,
}

pub fn context_menu_entries(state: Option<&LiveState>) -> Vec<MenuEntry> {
    let mut entries = Vec::with_capacity(6);
    if let Some(state) = state {
        if state.can_go_back {
            entries.push(MenuEntry::Item(ContextMenuItem::Back));
        }
        if state.can_go_forward {
            entries.push(MenuEntry::Item(ContextMenuItem::Forward));
        }
    }
    entries.push(MenuEntry::Item(ContextMenuItem::Reload));
    entries.push(MenuEntry::Separator);
    entries.push(MenuEntry::Item(ContextMenuItem::InspectElement));
    entries.push(MenuEntry::Item(ContextMenuItem::CloseDevTools));
    entries
}
