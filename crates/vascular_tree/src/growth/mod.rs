//! Macrocell-driven growth of a vascular tree.
//!
//! - [`MacrocellTree`]: a vessel tree plus the macrocells it perfuses, grown in birth/death
//!   cycles.
//! - [`CellList`] and [`Locations`]: macrocells and the candidate sites they may occupy.
//! - [`lattice`]: the hexagonal lobule lattice and its portal tracts.
//! - [`bifurcation`]: where an existing vessel splits to feed a new cell.
//! - [`events`]: progress reporting while growing.
pub mod balanced;
pub mod bifurcation;
pub mod builder;
pub mod cells;
pub mod events;
pub mod lattice;
pub mod locations;
pub mod macrocell;

pub use builder::{GrowthConfig, MacrocellTree, Subcycle};
pub use cells::CellList;
pub use events::{EventSink, FnSink, GrowthEvent, VecSink};
pub use locations::{LocationStrategy, Locations};
pub use macrocell::{CellType, Macrocell};
