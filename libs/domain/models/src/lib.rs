//! Shared entity and wire-contract types for the device fleet version manager.
//!
//! Every other crate in the workspace (`vm-store`, `vm-dvp`, `vm-differ`,
//! `vm-manager`) depends on this one for its vocabulary; it has no
//! dependency back on any of them.

pub mod entities;
pub mod glob;
pub mod state;
pub mod wire;

pub mod prelude {
    pub use crate::entities::*;
    pub use crate::glob::baseline_allows;
    pub use crate::state::DeviceState;
    pub use crate::wire::*;
}
