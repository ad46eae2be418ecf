pub mod broadcast;
pub mod contracts;
pub mod engine;
pub mod reconcile;
pub mod runtime;
pub mod session;

pub use broadcast::StateBroadcaster;
pub use broadcast::SubscriberId;
pub use broadcast::Subscription;
pub use contracts::*;
pub use engine::DevtoolsHost;
pub use engine::EngineError;
pub use engine::SimulatedTabEngine;
pub use engine::TabEngine;
pub use reconcile::LiveTabHandle;
pub use reconcile::ReconcileOutcome;
pub use reconcile::Reconciler;
pub use reconcile::ShownTab;
pub use runtime::RuntimeError;
pub use runtime::SessionEvent;
pub use runtime::SessionHandle;
pub use runtime::SessionRuntime;
pub use session::Session;
pub use session::SessionError;
