//! Realization collaborators.
//!
//! The engine never provisions anything itself: every node is handed, with
//! its concrete properties, to a [`Realizer`].

mod http;
mod realizer;
mod simulated;

pub use http::HttpRealizer;
pub use realizer::{Realizer, ResolvedProperties};
pub use simulated::SimulatedRealizer;
