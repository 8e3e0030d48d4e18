//! Implementations of umbra modules backed by the host.

pub mod audio;
pub mod movie;
pub mod save;
