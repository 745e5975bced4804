//! Application layer for the TACS secure-access link
//!
//! Feature managers translate raw service grant traffic into domain events,
//! and a generic runtime drives one [`Session`](tacs_core::session::Session)
//! over any [`Transport`](tacs_core::transport::Transport).
//!
//! # Components
//!
//! - [`ServiceGrantConsumer`] and [`Dispatcher`]: consume-or-pass-through chain
//! - [`VehicleAccessManager`]: lock, unlock, ignition
//! - [`TelematicsManager`]: odometer and fuel level
//! - [`ChangeSubject`]: change stream with a replayable current state
//! - [`Runtime`]: orchestration loop, single writer for all session state

mod consumer;
mod error;
mod runtime;
mod subject;
pub mod telematics;
pub mod vehicle_access;

pub use consumer::{Consumption, Dispatcher, ServiceGrantConsumer};
pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeCommand, ServiceGrantRequester};
pub use subject::{ChangeSubject, SubjectConfig};
pub use telematics::TelematicsManager;
pub use vehicle_access::VehicleAccessManager;
