//! World-side state of the mining core: chunked block storage, regions and mines.

mod access;
mod chunk;
mod mine;
mod mine_manager;
pub mod persist;
mod region;
mod region_store;
mod registry;

pub use access::*;
pub use chunk::*;
pub use mine::*;
pub use mine_manager::*;
pub use persist::{Loaded, RecordFileStore, SnapshotStore};
pub use region::*;
pub use region_store::*;
pub use registry::*;
