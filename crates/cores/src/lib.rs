//! CPU cores for umbra.
//!
//! Three cores implement [`CpuCore`](umbra::cores::CpuCore) and produce the same architectural
//! state for the same program:
//! - [`interpreter::Interpreter`], which decodes every instruction as it runs it
//! - [`cached::CachedInterpreter`], which keeps decoded instructions until their page is written
//! - [`jit::Core`], which compiles blocks of code with [`r4kjit`]

pub mod cached;
pub mod interpreter;
pub mod jit;

mod table;

pub use r4kjit;
