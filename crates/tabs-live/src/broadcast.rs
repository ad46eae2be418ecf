use crossbeam_channel::Receiver;
use crossbeam_channel::RecvError;
use crossbeam_channel::Sender;
use crossbeam_channel::TryRecvError;
use tabs_core::state::SessionView;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: Receiver<SessionView>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn recv(&self) -> Result<SessionView, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<SessionView, TryRecvError> {
        self.receiver.try_recv()
    }

    // Drops queued views and keeps only the newest one.
    pub fn latest(&self) -> Option<SessionView> {
        self.receiver.try_iter().last()
    }
}

// Pushes merged session views to UI clients. New subscribers get the
// current view straight away; later views are sent only when they differ
// from the last one published.
#[derive(Debug, Default)]
pub struct StateBroadcaster {
    next_id: u64,
    subscribers: Vec<(SubscriberId, Sender<SessionView>)>,
    last: SessionView,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        let (sender, receiver) = crossbeam_channel::unbounded();
        if sender.send(self.last.clone()).is_ok() {
            self.subscribers.push((id, sender));
        }
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(subscriber, _)| *subscriber != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, view: SessionView) -> usize {
        if view == self.last {
            return 0;
        }
        self.last = view;
        let last = &self.last;
        self.subscribers.retain(|(id, sender)| {
            let delivered = sender.send(last.clone()).is_ok();
            if !delivered {
                debug!(subscriber = id.0, "dropping disconnected subscriber");
            }
            delivered
        });
        self.subscribers.len()
    }
}
