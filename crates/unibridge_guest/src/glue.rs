//! The glue table received from the host.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use unibridge_core::GlueTable;

static GLUE: Lazy<RwLock<Option<GlueTable>>> = Lazy::new(|| RwLock::new(None));

/// Stores the table for the current load cycle.
pub fn install(glue: GlueTable) {
    *GLUE.write() = Some(glue);
}

/// Forgets the table. Calls made after this fail softly.
pub fn uninstall() {
    *GLUE.write() = None;
}

pub fn is_installed() -> bool {
    GLUE.read().is_some()
}

/// A copy of the installed table, so no lock is held while the host runs.
pub fn glue() -> Option<GlueTable> {
    *GLUE.read()
}
