//! Background tasks run by the chunk store.

pub mod geometry_task;

pub use geometry_task::GeometryTask;
