pub mod agent_session;
pub mod coordinator;
pub mod lifecycle;

pub use agent_session::AgentSession;
pub use coordinator::{StreamingRunCoordinator, Turn, TurnCanceller, TurnOutcome};
pub use lifecycle::{ReleaseStack, SessionLifecycle, SessionResources, TraceScope};
