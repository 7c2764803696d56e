//! Engine simulation
//!
//! The engine model, its gear table, and the lock-guarded handle the
//! simulation loop and the telemetry workers share.

mod gears;
mod model;

pub use gears::GearTable;
pub use model::{EngineModel, EngineState, Phase, SendMode, REBOUND_EPSILON};

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, SimError};

/// Engine model shared between the simulation thread and the telemetry
/// workers.
///
/// Every access takes the lock for the duration of one snapshot or one
/// mutation only. Never hold it across I/O.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<EngineModel>>,
}

impl SharedEngine {
    /// Wrap `model` for sharing
    pub fn new(model: EngineModel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineModel>> {
        self.inner.lock().map_err(|_| SimError::StatePoisoned)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<EngineState> {
        Ok(self.lock()?.state())
    }

    /// Run `f` with exclusive access to the model
    pub fn update<R>(&self, f: impl FnOnce(&mut EngineModel) -> R) -> Result<R> {
        let mut model = self.lock()?;
        Ok(f(&mut model))
    }
}
