//! Assertion faults raised by the timeline.
//!
//! A fault never aborts an operation half-way: the offending input is dropped
//! and reported here.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use causerie_shared::{DescriptorId, TwincodeId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Descriptor {descriptor} from {sender}, which is neither local nor a peer of this conversation")]
    UnknownSender {
        descriptor: DescriptorId,
        sender: TwincodeId,
    },

    #[error("Typing signal from {0}, which is not a peer of this conversation")]
    UnknownTypist(TwincodeId),
}

/// Diagnostics collaborator.
pub trait Diagnostics: Send + Sync {
    fn report(&self, fault: &Fault);
}

/// Logs faults with `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, fault: &Fault) {
        tracing::error!(fault = %fault, "Timeline assertion fault");
    }
}

/// Keeps every reported fault; handy for embedding tests.
#[derive(Debug, Default, Clone)]
pub struct CollectingDiagnostics {
    faults: Arc<Mutex<Vec<Fault>>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&self, fault: &Fault) {
        tracing::error!(fault = %fault, "Timeline assertion fault");
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(fault.clone());
        }
    }
}
