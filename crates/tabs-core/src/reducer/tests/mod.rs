use pretty_assertions::assert_eq;

pub(super) use super::fold_log;
pub(super) use super::reduce;
pub(super) use super::reduce_log;
pub(super) use crate::actions::Disposition;
pub(super) use crate::actions::Operation;
pub(super) use crate::state::SessionState;
pub(super) use crate::state::TabId;
pub(super) use crate::state::TabKind;
pub(super) use crate::state::TabRecord;
pub(super) use crate::state::RECOVER_LIMIT;


fn id(raw: &str) -> TabId {
    TabId::from(raw)
}

fn new_tab(raw: &str) -> Operation {
    Operation::New {
        disposition: Disposition::NewTab,
        tab_id: id(raw),
        url: None,
    }
}

fn foreground(raw: &str, url: &str) -> Operation {
    Operation::New {
        disposition: Disposition::NewForegroundTab,
        tab_id: id(raw),
        url: Some(url.to_string()),
    }
}

fn background(raw: &str, url: &str) -> Operation {
    Operation::New {
        disposition: Disposition::NewBackgroundTab,
        tab_id: id(raw),
        url: Some(url.to_string()),
    }
}

fn load(raw: &str, url: &str) -> Operation {
    Operation::Load {
        tab_id: id(raw),
        url: url.to_string(),
    }
}

fn close(target: Option<&str>, next: &str) -> Operation {
    Operation::Close {
        tab_id: target.map(id),
        next_tab_id: id(next),
    }
}

fn select(raw: &str) -> Operation {
    Operation::Select { tab_id: id(raw) }
}

fn run(state: &SessionState, ops: &[Operation]) -> SessionState {
    fold_log(state, ops.iter())
}

fn tab_ids(state: &SessionState) -> Vec<&str> {
    state.tabs.iter().map(|tab| tab.tab_id.as_str()).collect()
}

fn recover_ids(state: &SessionState) -> Vec<&str> {
    state.recover.iter().map(|tab| tab.tab_id.as_str()).collect()
}

fn assert_active_valid(state: &SessionState) {
    if state.tabs.is_empty() {
        assert_eq!(state.active, None);
    } else {
        let active = state.active.expect("non-empty session has an active tab");
        assert!(active < state.tabs.len(), "active {active} out of range");
    }
}
