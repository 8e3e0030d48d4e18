//! Virtual memory accesses on behalf of the CPU.

use vr4300::{
    Address,
    exception::{Exception, ExceptionCode},
    mmu::{Access, MemoryFault},
};

use crate::{Primitive, system::System};

impl System {
    fn fault(&mut self, fault: MemoryFault) -> Exception {
        self.cpu.cop0.record_fault(&fault);
        fault.into()
    }

    /// Translates a virtual address. On failure, the fault side state (BadVAddr, Context, ...) is
    /// recorded and the exception to raise is returned.
    #[inline(always)]
    pub fn translate(&mut self, vaddr: u64, access: Access) -> Result<Address, Exception> {
        self.cpu
            .translate(vaddr, access)
            .map_err(|fault| self.fault(fault))
    }

    /// Translates and checks the alignment of an access of `size` bytes.
    #[inline(always)]
    pub fn translate_aligned(
        &mut self,
        vaddr: u64,
        size: u64,
        access: Access,
    ) -> Result<Address, Exception> {
        self.cpu
            .check_alignment(vaddr, size, access)
            .map_err(|fault| self.fault(fault))?;

        self.translate(vaddr, access)
    }

    /// Loads a primitive from a virtual address.
    #[inline(always)]
    pub fn load<P: Primitive>(&mut self, vaddr: u64) -> Result<P, Exception> {
        let addr = self.translate_aligned(vaddr, size_of::<P>() as u64, Access::Load)?;
        Ok(self.read(addr))
    }

    /// Stores a primitive to a virtual address.
    #[inline(always)]
    pub fn store<P: Primitive>(&mut self, vaddr: u64, value: P) -> Result<(), Exception> {
        let addr = self.translate_aligned(vaddr, size_of::<P>() as u64, Access::Store)?;
        self.write(addr, value);
        Ok(())
    }

    /// Fetches the instruction at `pc`, returning its physical address along with it.
    #[inline(always)]
    pub fn fetch(&mut self, pc: u64) -> Result<(Address, u32), Exception> {
        let addr = self.translate_aligned(pc, 4, Access::Fetch)?;
        Ok((addr, self.read(addr)))
    }

    /// Raises an exception caused by the instruction currently executing.
    #[inline(always)]
    pub fn raise(&mut self, exception: Exception) {
        let pc = self.cpu.old_pc;
        self.cpu.raise(exception, pc);
    }

    /// Services a pending interrupt before the instruction at `pc` executes.
    pub fn service_interrupt(&mut self) {
        let pc = self.cpu.pc;
        tracing::trace!(
            ip = self.cpu.cop0.cause.ip(),
            pc = format_args!("{pc:016X}"),
            "servicing interrupt"
        );

        self.cpu.raise(Exception::new(ExceptionCode::Interrupt), pc);
    }
}

#[cfg(test)]
mod test {
    use crate::system::{Config, System};
    use vr4300::{exception::Vector, mmu::FaultKind};

    use super::*;

    fn system() -> System {
        let mut sys = System::new(Default::default(), Config::default());
        sys.cpu.cop0.status.set_erl(false);
        sys.cpu.cop0.status.set_bev(false);
        sys
    }

    #[test]
    fn kseg_load_and_store() {
        let mut sys = system();
        sys.store::<u32>(0xFFFF_FFFF_8000_0100, 0xDEAD_BEEF).unwrap();
        assert_eq!(sys.load::<u16>(0xFFFF_FFFF_A000_0102).unwrap(), 0xBEEF);
        assert_eq!(sys.bus.mem.rdram[0x100..0x104], [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn misaligned_load_records_bad_vaddr() {
        let mut sys = system();
        let exception = sys.load::<u32>(0xFFFF_FFFF_8000_0102).unwrap_err();
        assert_eq!(exception.code, ExceptionCode::AddressLoad);
        assert_eq!(sys.cpu.cop0.bad_vaddr, 0xFFFF_FFFF_8000_0102);
    }

    #[test]
    fn tlb_miss_uses_refill_vector() {
        let mut sys = system();
        sys.cpu.jump_to(0xFFFF_FFFF_8000_1000);
        sys.cpu.begin_step();
        sys.cpu.advance_pc();

        let exception = sys.store::<u8>(0x0040_2000, 1).unwrap_err();
        assert_eq!(exception.code, ExceptionCode::TlbStore);
        assert_eq!(exception.vector, Vector::TlbRefill);
        assert_eq!(sys.cpu.cop0.bad_vaddr, 0x0040_2000);

        sys.raise(exception);
        assert_eq!(sys.cpu.pc, 0xFFFF_FFFF_8000_0000);
        assert_eq!(sys.cpu.cop0.epc, 0xFFFF_FFFF_8000_1000);
    }

    #[test]
    fn fetch_fault_kind() {
        let mut sys = system();
        let fault = sys.cpu.translate(0x1000, Access::Fetch).unwrap_err();
        assert_eq!(fault.kind, FaultKind::Miss);
        assert!(sys.fetch(0xFFFF_FFFF_8000_0002).is_err());
    }
}
