use std::io;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tabs_core::actions::TabIntent;
use tabs_core::persistence::OperationStore;
use tabs_core::state::SessionState;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::broadcast::SubscriberId;
use crate::broadcast::Subscription;
use crate::contracts::EngineNotification;
use crate::engine::TabEngine;
use crate::session::Session;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session runtime has stopped")]
    Stopped,
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub enum SessionEvent {
    Intent {
        intent: TabIntent,
        respond: Option<Sender<Result<(), SessionError>>>,
    },
    Notification(EngineNotification),
    Subscribe(Sender<Subscription>),
    Unsubscribe(SubscriberId),
    Sync(Sender<SessionState>),
    Shutdown,
}

#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn dispatch(&self, intent: TabIntent) -> Result<(), RuntimeError> {
        let (respond_tx, respond_rx) = crossbeam_channel::bounded(1);
        self.send(SessionEvent::Intent {
            intent,
            respond: Some(respond_tx),
        })?;
        let result = respond_rx.recv().map_err(|_| RuntimeError::Stopped)?;
        result.map_err(RuntimeError::from)
    }

    pub fn post(&self, intent: TabIntent) -> Result<(), RuntimeError> {
        self.send(SessionEvent::Intent {
            intent,
            respond: None,
        })
    }

    pub fn notify(&self, notification: EngineNotification) -> Result<(), RuntimeError> {
        self.send(SessionEvent::Notification(notification))
    }

    pub fn subscribe(&self) -> Result<Subscription, RuntimeError> {
        let (respond_tx, respond_rx) = crossbeam_channel::bounded(1);
        self.send(SessionEvent::Subscribe(respond_tx))?;
        respond_rx.recv().map_err(|_| RuntimeError::Stopped)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> Result<(), RuntimeError> {
        self.send(SessionEvent::Unsubscribe(id))
    }

    // Waits until every event sent before this one has been applied.
    pub fn state(&self) -> Result<SessionState, RuntimeError> {
        let (respond_tx, respond_rx) = crossbeam_channel::bounded(1);
        self.send(SessionEvent::Sync(respond_tx))?;
        respond_rx.recv().map_err(|_| RuntimeError::Stopped)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionEvent::Shutdown);
    }

    fn send(&self, event: SessionEvent) -> Result<(), RuntimeError> {
        self.tx.send(event).map_err(|_| RuntimeError::Stopped)
    }
}

// Single consumer for intents and engine notifications. Events are drained
// in batches; the reconcile pass for a batch runs once against its final
// state.
pub struct SessionRuntime<S, E> {
    session: Session<S, E>,
    rx: Receiver<SessionEvent>,
    stopped: bool,
}

impl<S, E> SessionRuntime<S, E>
where
    S: OperationStore,
    E: TabEngine,
{
    pub fn new(session: Session<S, E>) -> (Self, SessionHandle) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let runtime = Self {
            session,
            rx,
            stopped: false,
        };
        (runtime, SessionHandle { tx })
    }

    pub fn session(&self) -> &Session<S, E> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<S, E> {
        &mut self.session
    }

    pub fn run(mut self) -> Session<S, E> {
        while !self.stopped {
            let first = match self.rx.recv() {
                Ok(event) => event,
                Err(_) => {
                    debug!("all session handles dropped");
                    self.stop();
                    break;
                }
            };
            let mut batch = vec![first];
            batch.extend(self.rx.try_iter());
            self.apply_batch(batch);
        }
        self.session
    }

    // Applies whatever is queued without blocking. Returns the number of
    // events handled.
    pub fn run_pending(&mut self) -> usize {
        if self.stopped {
            return 0;
        }
        let batch: Vec<SessionEvent> = self.rx.try_iter().collect();
        let count = batch.len();
        if count > 0 {
            self.apply_batch(batch);
        }
        count
    }

    fn apply_batch(&mut self, batch: Vec<SessionEvent>) {
        self.session.begin_batch();
        for event in batch {
            if self.stopped {
                debug!("dropping event after shutdown");
                continue;
            }
            self.apply(event);
        }
        if self.stopped {
            return;
        }
        self.session.end_batch();
        self.session.pump_engine();
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Intent { intent, respond } => {
                let result = self.session.dispatch(intent);
                match respond {
                    Some(respond) => {
                        let _ = respond.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            warn!(error = %err, "intent failed");
                        }
                    }
                }
            }
            SessionEvent::Notification(notification) => {
                self.session.handle_notification(notification);
            }
            SessionEvent::Subscribe(respond) => {
                let subscription = self.session.subscribe();
                let _ = respond.send(subscription);
            }
            SessionEvent::Unsubscribe(id) => {
                self.session.unsubscribe(id);
            }
            SessionEvent::Sync(respond) => {
                self.session.end_batch();
                self.session.pump_engine();
                let _ = respond.send(self.session.state().clone());
                self.session.begin_batch();
            }
            SessionEvent::Shutdown => self.stop(),
        }
    }

    fn stop(&mut self) {
        self.session.end_batch();
        self.session.end();
        self.stopped = true;
        info!("session runtime stopped");
    }
}

impl<S, E> SessionRuntime<S, E>
where
    S: OperationStore + Send + 'static,
    E: TabEngine + Send + 'static,
{
    pub fn spawn(self) -> io::Result<JoinHandle<Session<S, E>>> {
        thread::Builder::new()
            .name("tabs-session".to_string())
            .spawn(move || self.run())
    }
}
