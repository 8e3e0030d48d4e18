//! Emulator modules.
//!
//! Modules provide the system core with specific functionality, such as rendering or input, but do
//! not perform any sort of emulation themselves.

pub mod audio;
pub mod input;
pub mod render;
pub mod rsp;
pub mod save;
