//! Scene host adapters
//!
//! Implementations of [`crate::core::host::SceneHost`] shipped with the crate.

pub mod memory;

pub use memory::InMemorySceneHost;
