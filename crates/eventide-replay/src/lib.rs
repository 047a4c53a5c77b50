//! Eventide Replay - Consumers of the event log
//!
//! This crate builds on the `EventLog` contract:
//! - Bus: emit / on / once / off / replay over any log
//! - TimeTravel: Entity state reconstructed as of any moment
//! - Cdc: Cursor-stable polling feed for external consumers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod cdc;
pub mod time_travel;

pub use bus::{EventBus, ReplayFilter};
pub use cdc::{CdcConfig, CdcStream};
pub use time_travel::{AsOfOptions, ChangeKind, EntityState, FieldChange, TimeTraveler};
