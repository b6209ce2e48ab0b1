//! Network topologies built from graph layers.

pub mod srgan;

pub use srgan::{Generator, SrganConfig, srgan_generator};
