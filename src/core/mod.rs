//! # Core Module
//!
//! Shared-ownership lock wrappers used throughout the terrain engine.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking.
//!   Backs every per-chunk artifact lock that worker threads touch.
//! - `StResource`: Single-threaded reference-counted resource. Backs the render
//!   context so GPU work can never leave the thread that created it.
//!
//! ## Usage
//! ```rust
//! use voxel_terrain::core::{MtResource, StResource};
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//!
//! let local = StResource::new(vec![1, 2]);
//! local.get_mut().push(3);
//! assert_eq!(local.get().len(), 3);
//! ```

pub mod mt_resource;
pub mod st_resource;

pub use mt_resource::MtResource;
pub use st_resource::StResource;
