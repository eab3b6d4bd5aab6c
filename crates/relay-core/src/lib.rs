//! Ambient utilities shared across the relay workspace: a cheap interned
//! string type, a generic owned-or-borrowed helper, bidirectional copy,
//! and telemetry bootstrap. Nothing here is specific to proxy protocols.

pub mod bow;
pub mod copy;
pub mod prelude;
pub mod telemetry;

pub use arcstr::ArcStr as Strng;
pub use bow::OwnedOrBorrowed;
