use std::collections::BTreeMap;
use std::collections::VecDeque;

use tabs_core::actions::Disposition;
use tabs_core::state::LiveState;
use thiserror::Error;

use crate::contracts::CreateTab;
use crate::contracts::EngineCommand;
use crate::contracts::EngineNotification;
use crate::contracts::HandleId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown engine handle {0}")]
    UnknownHandle(HandleId),
    #[error("engine rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

// Fire-and-forget commands into the browser engine. Results come back
// through EngineNotification, not through these return values.
pub trait TabEngine {
    fn create_tab(&mut self, request: CreateTab) -> Result<HandleId, EngineError>;
    fn close_tab(&mut self, handle: HandleId) -> Result<(), EngineError>;
    fn navigate(&mut self, handle: HandleId, url: &str, version: u64) -> Result<(), EngineError>;
    fn show(&mut self, handle: HandleId, focus: bool) -> Result<(), EngineError>;
    fn set_title(&mut self, title: Option<&str>) -> Result<(), EngineError>;
    fn back(&mut self, handle: HandleId) -> Result<(), EngineError>;
    fn forward(&mut self, handle: HandleId) -> Result<(), EngineError>;
    fn reload(&mut self, handle: HandleId) -> Result<(), EngineError>;

    fn take_notifications(&mut self) -> Vec<EngineNotification> {
        Vec::new()
    }
}

pub trait DevtoolsHost {
    fn inspect_element(&mut self, handle: HandleId);
    fn close_devtools(&mut self);
}

#[derive(Debug, Clone, Default)]
struct SimulatedTab {
    entries: Vec<SimulatedEntry>,
    index: usize,
    version: u64,
}

#[derive(Debug, Clone)]
struct SimulatedEntry {
    url: String,
    title: Option<String>,
}

impl SimulatedTab {
    fn live_state(&self) -> LiveState {
        let current = self.entries.get(self.index);
        LiveState {
            title: current.and_then(|entry| entry.title.clone()),
            url: current.map(|entry| entry.url.clone()),
            can_go_back: self.index > 0,
            can_go_forward: self.index + 1 < self.entries.len(),
        }
    }

    fn visit(&mut self, url: &str) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(SimulatedEntry {
            url: url.to_string(),
            title: None,
        });
        self.index = self.entries.len() - 1;
    }
}

// In-process engine that keeps a per-handle history and queues the
// notifications a real engine would emit. Every command is recorded,
// including ones that fail.
#[derive(Debug, Default)]
pub struct SimulatedTabEngine {
    next_handle: u64,
    tabs: BTreeMap<HandleId, SimulatedTab>,
    commands: Vec<EngineCommand>,
    pending: VecDeque<EngineNotification>,
    offline: Option<String>,
    shown: Option<HandleId>,
    title: Option<String>,
}

impl SimulatedTabEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&mut self, reason: Option<&str>) {
        self.offline = reason.map(str::to_string);
    }

    pub fn commands(&self) -> &[EngineCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<EngineCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn open_handles(&self) -> Vec<HandleId> {
        self.tabs.keys().copied().collect()
    }

    pub fn shown(&self) -> Option<HandleId> {
        self.shown
    }

    pub fn window_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn live_state(&self, handle: HandleId) -> Option<LiveState> {
        self.tabs.get(&handle).map(SimulatedTab::live_state)
    }

    pub fn pending_notifications(&self) -> usize {
        self.pending.len()
    }

    // Page finished loading and reported its title.
    pub fn page_titled(&mut self, handle: HandleId, title: &str) -> Result<(), EngineError> {
        let tab = self
            .tabs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        if let Some(entry) = tab.entries.get_mut(tab.index) {
            entry.title = Some(title.to_string());
        }
        self.notify_state(handle);
        Ok(())
    }

    // In-page navigation the session did not ask for, such as a link click.
    pub fn follow_link(&mut self, handle: HandleId, url: &str) -> Result<(), EngineError> {
        let tab = self
            .tabs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        tab.visit(url);
        self.notify_state(handle);
        Ok(())
    }

    // A page opened a new tab on its own (middle-click, window.open).
    pub fn open_from_page(&mut self, disposition: Disposition, url: &str) -> HandleId {
        let handle = self.allocate();
        let mut tab = SimulatedTab::default();
        tab.visit(url);
        self.tabs.insert(handle, tab);
        self.pending
            .push_back(EngineNotification::TabCreated { disposition, handle });
        self.notify_state(handle);
        handle
    }

    pub fn queue(&mut self, notification: EngineNotification) {
        self.pending.push_back(notification);
    }

    fn allocate(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId(self.next_handle)
    }

    fn check_online(&self, command: &'static str) -> Result<(), EngineError> {
        match &self.offline {
            Some(reason) => Err(EngineError::Unavailable(format!("{command}: {reason}"))),
            None => Ok(()),
        }
    }

    fn tab_mut(&mut self, handle: HandleId) -> Result<&mut SimulatedTab, EngineError> {
        self.tabs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))
    }

    fn notify_state(&mut self, handle: HandleId) {
        if let Some(tab) = self.tabs.get(&handle) {
            self.pending.push_back(EngineNotification::StateChanged {
                handle,
                state: tab.live_state(),
                version: tab.version,
            });
        }
    }
}

impl TabEngine for SimulatedTabEngine {
    fn create_tab(&mut self, request: CreateTab) -> Result<HandleId, EngineError> {
        self.commands.push(EngineCommand::Create {
            url: request.url.clone(),
            visible: request.visible,
            focus: request.focus,
            version: request.version,
        });
        self.check_online("create")?;

        let handle = self.allocate();
        let mut tab = SimulatedTab {
            version: request.version,
            ..SimulatedTab::default()
        };
        if let Some(url) = &request.url {
            tab.visit(url);
        }
        self.tabs.insert(handle, tab);
        if request.visible {
            self.shown = Some(handle);
        }
        self.notify_state(handle);
        Ok(handle)
    }

    fn close_tab(&mut self, handle: HandleId) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Close { handle });
        self.check_online("close")?;
        self.tabs
            .remove(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        if self.shown == Some(handle) {
            self.shown = None;
        }
        Ok(())
    }

    fn navigate(&mut self, handle: HandleId, url: &str, version: u64) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Navigate {
            handle,
            url: url.to_string(),
            version,
        });
        self.check_online("navigate")?;
        let tab = self.tab_mut(handle)?;
        tab.visit(url);
        tab.version = tab.version.max(version);
        self.notify_state(handle);
        Ok(())
    }

    fn show(&mut self, handle: HandleId, focus: bool) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Show { handle, focus });
        self.check_online("show")?;
        self.tab_mut(handle)?;
        self.shown = Some(handle);
        Ok(())
    }

    fn set_title(&mut self, title: Option<&str>) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::SetTitle {
            title: title.map(str::to_string),
        });
        self.check_online("set_title")?;
        self.title = title.map(str::to_string);
        Ok(())
    }

    fn back(&mut self, handle: HandleId) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Back { handle });
        self.check_online("back")?;
        let tab = self.tab_mut(handle)?;
        if tab.index == 0 {
            return Err(EngineError::Rejected {
                command: "back",
                reason: "no earlier history entry".to_string(),
            });
        }
        tab.index -= 1;
        self.notify_state(handle);
        Ok(())
    }

    fn forward(&mut self, handle: HandleId) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Forward { handle });
        self.check_online("forward")?;
        let tab = self.tab_mut(handle)?;
        if tab.index + 1 >= tab.entries.len() {
            return Err(EngineError::Rejected {
                command: "forward",
                reason: "no later history entry".to_string(),
            });
        }
        tab.index += 1;
        self.notify_state(handle);
        Ok(())
    }

    fn reload(&mut self, handle: HandleId) -> Result<(), EngineError> {
        self.commands.push(EngineCommand::Reload { handle });
        self.check_online("reload")?;
        self.tab_mut(handle)?;
        self.notify_state(handle);
        Ok(())
    }

    fn take_notifications(&mut self) -> Vec<EngineNotification> {
        self.pending.drain(..).collect()
    }
}
