//! Portamon - live particle counter monitor
//!
//! Plots log-scale readings from a serial particle counter. Several monitors may run
//! side by side, one per instrument; they agree on a common y-axis through a small
//! shared-memory protocol with no coordinator process.
//!
//! # Modules
//!
//! - [`axis`] - Whole-decade axis bounds from series min/max
//! - [`ingest`] - Line parsing, log transform and series state
//! - [`shm`] - Named shared segments, semaphores and slots
//! - [`sync`] - Publish/merge of axis bounds across instances
//! - [`rendezvous`] - Leaderless init/teardown barriers
//! - [`lifecycle`] - Start and stop of an instance within its group
//! - [`monitor`] - Session state, instrument source, loop and terminal view
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod axis;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod instance;
pub mod lifecycle;
pub mod memory;
pub mod monitor;
pub mod quantity;
pub mod rendezvous;
pub mod shm;
pub mod sync;

pub use axis::AxisBounds;
pub use config::Config;
pub use error::ShmError;
pub use ingest::{DataIngestionEngine, Reading, Series, SeriesGroup};
pub use instance::{Instance, MAX_INSTANCES};
pub use lifecycle::Lifecycle;
pub use memory::MemoryBoard;
pub use monitor::{Command, Monitor, Panel, PlotFrame};
pub use quantity::{Mode, Quantity};
pub use rendezvous::{Rendezvous, Signal, SignalBoard};
pub use shm::SharedRegionManager;
pub use sync::{CrossInstanceAxisSync, SlotBoard};
