//! Application-facing services built on the storage and sync layers.

mod tracker;

pub use tracker::TrackerService;
