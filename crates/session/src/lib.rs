//! QManager transfer sessions.
//!
//! This crate holds the **business logic** of moving one image to or from
//! the QManager service. It has no RPC dependency: the application provides
//! a [`ControlPlane`] implementation bridging to the real client.
//!
//! # Session
//!
//! 1. **Negotiating**: check the service, ask it to open a data port
//! 2. **Transferring**: stream the file over the data channel
//! 3. **Confirming**: poll until the service has verified size and digest
//! 4. **Succeeded** or **Failed**

pub mod control;
pub mod error;
pub mod orchestrator;
pub mod types;

pub use control::{ControlFuture, ControlPlane};
pub use error::SessionError;
pub use orchestrator::TransferOrchestrator;
pub use types::{SessionPhase, SessionStatus, TransferConfig, TransferEvent, TransferSession};
