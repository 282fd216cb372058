//! Demo native module: spins the object it is attached to and shows the
//! frame rate on a text label.

pub mod math;
pub mod spinner;

pub use spinner::Spinner;

unibridge_guest::export_behaviour!(Spinner::new);
