use super::actions::Disposition;
use super::actions::Operation;
use super::persistence::ReducerIdentity;
use super::state::SessionState;
use super::state::TabId;
use super::state::TabKind;
use super::state::TabRecord;

pub const TABS_REDUCER: ReducerIdentity = ReducerIdentity {
    name: "tabs",
    apply: reduce,
};

pub fn reduce(state: &SessionState, op: &Operation) -> SessionState {
    let mut next = state.clone();
    apply(&mut next, op);
    next
}

pub fn reduce_log<'a, I>(log: I) -> SessionState
where
    I: IntoIterator<Item = &'a Operation>,
{
    fold_log(&SessionState::new(), log)
}

pub fn fold_log<'a, I>(initial: &SessionState, log: I) -> SessionState
where
    I: IntoIterator<Item = &'a Operation>,
{
    let mut state = initial.clone();
    for op in log {
        apply(&mut state, op);
    }
    state
}

fn apply(state: &mut SessionState, op: &Operation) {
    state.version = state.version.saturating_add(1);
    match op {
        Operation::New {
            disposition,
            tab_id,
            url,
        } => apply_new(state, *disposition, tab_id, url.as_deref()),
        Operation::Select { tab_id } => {
            if let Some(index) = state.position(tab_id) {
                state.active = Some(index);
            }
        }
        Operation::Commit => apply_commit(state),
        Operation::Close {
            tab_id,
            next_tab_id,
        } => apply_close(state, tab_id.as_ref(), next_tab_id),
        Operation::Recover => {
            if let Some(record) = state.recover.pop() {
                if state.position(&record.tab_id).is_some() {
                    return;
                }
                if record.is_placeholder() {
                    state.tabs.retain(|tab| !tab.is_placeholder());
                }
                state.tabs.insert(0, record);
                state.active = Some(0);
            }
        }
        Operation::StateUpdate { tab_id, title, url } => {
            if let Some(tab) = state
                .tabs
                .iter_mut()
                .find(|tab| &tab.tab_id == tab_id && !tab.is_placeholder())
            {
                tab.title = title.clone();
                tab.url = url.clone();
            }
        }
        Operation::Load { tab_id, url } => {
            if let Some(tab) = state.tabs.iter_mut().find(|tab| &tab.tab_id == tab_id) {
                tab.url = Some(url.clone());
                tab.kind = TabKind::Regular;
                tab.load = tab.load.saturating_add(1);
            }
        }
    }
}

fn apply_new(
    state: &mut SessionState,
    disposition: Disposition,
    tab_id: &TabId,
    url: Option<&str>,
) {
    if state.position(tab_id).is_some() {
        return;
    }
    match disposition {
        Disposition::NewTab => {
            // At most one placeholder: a fresh one replaces any stale slot.
            state.tabs.retain(|tab| !tab.is_placeholder());
            state.tabs.insert(0, TabRecord::placeholder(tab_id.clone()));
            state.active = Some(0);
        }
        Disposition::NewForegroundTab => {
            state
                .tabs
                .insert(0, TabRecord::regular(tab_id.clone(), url.map(str::to_string)));
            state.active = Some(0);
        }
        Disposition::NewBackgroundTab => {
            let index = state.tabs.len().min(1);
            state
                .tabs
                .insert(index, TabRecord::regular(tab_id.clone(), url.map(str::to_string)));
            state.active = match state.active {
                None => Some(0),
                Some(active) if active >= index => Some(active + 1),
                Some(active) => Some(active),
            };
        }
    }
}

fn apply_commit(state: &mut SessionState) {
    let Some(active) = state.active else {
        return;
    };
    if active >= state.tabs.len() {
        return;
    }
    let tab = state.tabs.remove(active);
    state.tabs.insert(0, tab);
    state.active = Some(0);
}

fn apply_close(state: &mut SessionState, tab_id: Option<&TabId>, next_tab_id: &TabId) {
    if state.tabs.is_empty() {
        return;
    }
    let index = match tab_id {
        Some(tab_id) => state.position(tab_id),
        None => state.active.filter(|active| *active < state.tabs.len()),
    };
    let Some(index) = index else {
        return;
    };

    let closed = state.tabs.remove(index);
    state.recover.push(closed);

    if state.tabs.is_empty() {
        state.tabs.push(TabRecord::placeholder(next_tab_id.clone()));
        state.active = Some(0);
        return;
    }

    let active = state.active.unwrap_or(0);
    let active = if index <= active {
        active.saturating_sub(1)
    } else {
        active
    };
    state.active = Some(active.min(state.tabs.len() - 1));
}

#[cfg(test)]
mod tests;
