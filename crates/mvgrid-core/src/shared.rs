//! Lock-protected registry for concurrent readers and writers.
//!
//! Every mutation holds the write lock for its whole check-then-write
//! sequence, and metric reads hold a read lock, so a reader sees a cable
//! system either before or after a structural change, never in between.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::GridResult;
use crate::metrics::CableSystemMetrics;
use crate::registry::GridRegistry;
use crate::CableSystemId;

/// Cheaply cloneable handle to one shared [`GridRegistry`].
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<GridRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: GridRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&GridRegistry) -> R) -> R {
        f(&*self.inner.read())
    }

    /// Run a single mutation under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut GridRegistry) -> GridResult<R>) -> GridResult<R> {
        f(&mut *self.inner.write())
    }

    /// Apply a batch of mutations all-or-nothing.
    ///
    /// The closure runs against a staged copy; the copy replaces the live
    /// registry only when the closure returns `Ok`.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut GridRegistry) -> GridResult<R>,
    ) -> GridResult<R> {
        let mut guard = self.inner.write();
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        *guard = staged;
        debug!("transaction committed");
        Ok(out)
    }

    pub fn metrics(&self, cable_system: CableSystemId) -> GridResult<CableSystemMetrics> {
        self.inner.read().metrics(cable_system)
    }

    /// Clone of the current state, for long-running read-only work.
    pub fn snapshot(&self) -> GridRegistry {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CableSystem, GridError, Operator, OperatorId, Subsection, SubsectionId, Substation,
        SubstationId,
    };
    use std::thread;

    fn shared() -> SharedRegistry {
        let mut g = GridRegistry::new();
        g.register_operator(Operator::new(OperatorId::new(1), "Op")).unwrap();
        g.register_substation(Substation::main(SubstationId::new(1), OperatorId::new(1), "A"))
            .unwrap();
        g.register_cable_system(CableSystem::new(
            CableSystemId::new(1),
            OperatorId::new(1),
            "K1",
            SubstationId::new(1),
            SubstationId::new(1),
        ))
        .unwrap();
        SharedRegistry::new(g)
    }

    #[test]
    fn test_failed_transaction_leaves_state_unchanged() {
        let reg = shared();
        let cs = CableSystemId::new(1);
        let result = reg.transaction(|g| {
            g.add_subsection(cs, Subsection::new(SubsectionId::new(1), 1.0))?;
            g.add_subsection(cs, Subsection::new(SubsectionId::new(1), 2.0))
        });
        assert!(matches!(result, Err(GridError::DuplicateSubsection { .. })));
        assert_eq!(reg.metrics(cs).unwrap().number_of_subsections, 0);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let reg = shared();
        let cs = CableSystemId::new(1);
        reg.transaction(|g| {
            g.add_subsection(cs, Subsection::new(SubsectionId::new(1), 1.0))?;
            g.add_subsection(cs, Subsection::new(SubsectionId::new(2), 2.0))
        })
        .unwrap();
        assert_eq!(reg.metrics(cs).unwrap().number_of_subsections, 2);
    }

    #[test]
    fn test_readers_see_whole_mutations() {
        let reg = shared();
        let cs = CableSystemId::new(1);
        let writer = {
            let reg = reg.clone();
            thread::spawn(move || {
                for i in 1..=200 {
                    reg.write(|g| g.add_subsection(cs, Subsection::new(SubsectionId::new(i), 0.5)))
                        .unwrap();
                }
            })
        };
        let reader = {
            let reg = reg.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let m = reg.metrics(cs).unwrap();
                    let expected = m.number_of_subsections as f64 * 0.5;
                    assert!((m.length.value() - expected).abs() < 1e-9);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(reg.metrics(cs).unwrap().number_of_subsections, 200);
    }
}
