use crate::system::mem::SP_MEM_LEN;

/// Memories visible to the RSP while running a task.
pub struct RspMemory<'a> {
    pub dmem: &'a mut [u8; SP_MEM_LEN],
    pub imem: &'a mut [u8; SP_MEM_LEN],
    pub rdram: &'a mut [u8],
    /// Value of SP_PC when the RSP was started.
    pub pc: u32,
}

/// Result of running an RSP task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RspTask {
    /// How many CPU cycles the task takes to complete.
    pub cycles: u64,
    /// RDP commands the task left in `[start, end)` of DMEM, if any.
    pub dp_commands: Option<(u32, u32)>,
}

/// Trait for high level emulation of RSP tasks.
pub trait RspModule: Send {
    /// Runs the task currently loaded in the RSP memories to completion.
    fn run(&mut self, mem: RspMemory<'_>) -> RspTask;
}

/// An implementation of [`RspModule`] which does nothing: every task completes immediately.
#[derive(Debug, Clone, Copy)]
pub struct NopRspModule;

impl RspModule for NopRspModule {
    fn run(&mut self, _: RspMemory<'_>) -> RspTask {
        RspTask::default()
    }
}
