//! Process lifecycle across the group
//!
//! `start` maps every segment and passes the init barrier; `stop` passes the teardown
//! barrier and releases everything. Between the two the caller runs the session loop.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::ShmError;
use crate::instance::Instance;
use crate::rendezvous::Rendezvous;
use crate::shm::SharedRegionManager;

/// Where the group's segments live and how patiently to wait for peers
#[derive(Debug, Clone)]
pub struct Lifecycle {
    prefix: String,
    poll: Duration,
    rendezvous: Rendezvous,
}

impl Lifecycle {
    pub fn new(prefix: impl Into<String>, poll: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            poll,
            rendezvous: Rendezvous::new(poll),
        }
    }

    /// Use a custom barrier schedule
    pub fn with_rendezvous(mut self, rendezvous: Rendezvous) -> Self {
        self.rendezvous = rendezvous;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Open all segments, then wait for every instance to initialize
    pub fn start(&self, instance: Instance) -> Result<SharedRegionManager, ShmError> {
        debug!(%instance, prefix = %self.prefix, "Lifecycle::start: called");
        let manager = SharedRegionManager::open(instance, &self.prefix, self.poll)?;
        info!(%instance, "Waiting for all instances to start");
        manager.barrier_init(&self.rendezvous)?;
        Ok(manager)
    }

    /// Wait for every instance to quit, then release and unlink all segments
    pub fn stop(&self, manager: SharedRegionManager) -> Result<(), ShmError> {
        let instance = manager.instance();
        debug!(%instance, "Lifecycle::stop: called");
        info!(%instance, "Waiting for all instances to quit");
        manager.barrier_teardown(&self.rendezvous)
    }
}
