//! Exception kinds and vectors.

use strum::{FromRepr, IntoStaticStr};

use crate::mmu::{Access, FaultKind, MemoryFault};

/// Exception codes, as stored in the ExcCode field of Cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum ExceptionCode {
    Interrupt = 0,
    TlbModification = 1,
    TlbLoad = 2,
    TlbStore = 3,
    AddressLoad = 4,
    AddressStore = 5,
    InstructionBus = 6,
    DataBus = 7,
    Syscall = 8,
    Breakpoint = 9,
    ReservedInstruction = 10,
    CoprocessorUnusable = 11,
    Overflow = 12,
    Trap = 13,
    FloatingPoint = 15,
    Watch = 23,
}

/// Which vector offset an exception uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    General,
    /// TLB refill in 32-bit addressing mode.
    TlbRefill,
    /// TLB refill in 64-bit addressing mode.
    XtlbRefill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exception {
    pub code: ExceptionCode,
    pub coprocessor: u8,
    pub vector: Vector,
}

impl Exception {
    pub const fn new(code: ExceptionCode) -> Self {
        Self {
            code,
            coprocessor: 0,
            vector: Vector::General,
        }
    }

    pub const fn unusable(coprocessor: u8) -> Self {
        Self {
            code: ExceptionCode::CoprocessorUnusable,
            coprocessor,
            vector: Vector::General,
        }
    }
}

impl From<MemoryFault> for Exception {
    fn from(fault: MemoryFault) -> Self {
        let store = fault.access == Access::Store;
        let code = match fault.kind {
            FaultKind::Miss | FaultKind::Invalid if store => ExceptionCode::TlbStore,
            FaultKind::Miss | FaultKind::Invalid => ExceptionCode::TlbLoad,
            FaultKind::Modified => ExceptionCode::TlbModification,
            FaultKind::AddressError if store => ExceptionCode::AddressStore,
            FaultKind::AddressError => ExceptionCode::AddressLoad,
        };

        let vector = match fault.kind {
            FaultKind::Miss if fault.extended => Vector::XtlbRefill,
            FaultKind::Miss => Vector::TlbRefill,
            _ => Vector::General,
        };

        Self {
            code,
            coprocessor: 0,
            vector,
        }
    }
}
