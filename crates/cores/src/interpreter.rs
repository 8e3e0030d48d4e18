//! The reference interpreter.

mod alu;
mod branch;
mod cop0;
mod cop1;
mod memory;

use umbra::{
    Address, Cycles,
    cores::{CpuCore, Executed},
    system::System,
    vr4300::{
        exception::{Exception, ExceptionCode},
        ins::{CopOp, Ins, Opcode, RegImm, Special},
        mmu::Access,
    },
};

type Result<T = ()> = std::result::Result<T, Exception>;

/// An instruction handler. Guest faults are returned as the exception to raise.
pub type Handler = fn(&mut System, Ins) -> Result;

fn reserved(_: &mut System, _: Ins) -> Result {
    Err(Exception::new(ExceptionCode::ReservedInstruction))
}

/// Cop2 does not exist on the N64: it can be marked usable, but does nothing.
fn cop2(sys: &mut System, _: Ins) -> Result {
    if sys.cpu.cop_usable(2) {
        Err(Exception::new(ExceptionCode::ReservedInstruction))
    } else {
        Err(Exception::unusable(2))
    }
}

fn special(ins: Ins) -> Handler {
    let Some(special) = ins.special() else {
        return reserved;
    };

    match special {
        Special::Sll => alu::sll,
        Special::Srl => alu::srl,
        Special::Sra => alu::sra,
        Special::Sllv => alu::sllv,
        Special::Srlv => alu::srlv,
        Special::Srav => alu::srav,
        Special::Jr => branch::jr,
        Special::Jalr => branch::jalr,
        Special::Syscall => alu::syscall,
        Special::Break => alu::brk,
        Special::Sync => alu::sync,
        Special::Mfhi => alu::mfhi,
        Special::Mthi => alu::mthi,
        Special::Mflo => alu::mflo,
        Special::Mtlo => alu::mtlo,
        Special::Dsllv => alu::dsllv,
        Special::Dsrlv => alu::dsrlv,
        Special::Dsrav => alu::dsrav,
        Special::Mult => alu::mult,
        Special::Multu => alu::multu,
        Special::Div => alu::div,
        Special::Divu => alu::divu,
        Special::Dmult => alu::dmult,
        Special::Dmultu => alu::dmultu,
        Special::Ddiv => alu::ddiv,
        Special::Ddivu => alu::ddivu,
        Special::Add => alu::add,
        Special::Addu => alu::addu,
        Special::Sub => alu::sub,
        Special::Subu => alu::subu,
        Special::And => alu::and,
        Special::Or => alu::or,
        Special::Xor => alu::xor,
        Special::Nor => alu::nor,
        Special::Slt => alu::slt,
        Special::Sltu => alu::sltu,
        Special::Dadd => alu::dadd,
        Special::Daddu => alu::daddu,
        Special::Dsub => alu::dsub,
        Special::Dsubu => alu::dsubu,
        Special::Tge => alu::tge,
        Special::Tgeu => alu::tgeu,
        Special::Tlt => alu::tlt,
        Special::Tltu => alu::tltu,
        Special::Teq => alu::teq,
        Special::Tne => alu::tne,
        Special::Dsll => alu::dsll,
        Special::Dsrl => alu::dsrl,
        Special::Dsra => alu::dsra,
        Special::Dsll32 => alu::dsll32,
        Special::Dsrl32 => alu::dsrl32,
        Special::Dsra32 => alu::dsra32,
    }
}

fn regimm(ins: Ins) -> Handler {
    let Some(regimm) = ins.regimm() else {
        return reserved;
    };

    match regimm {
        RegImm::Bltz => branch::bltz,
        RegImm::Bgez => branch::bgez,
        RegImm::Bltzl => branch::bltzl,
        RegImm::Bgezl => branch::bgezl,
        RegImm::Tgei => alu::tgei,
        RegImm::Tgeiu => alu::tgeiu,
        RegImm::Tlti => alu::tlti,
        RegImm::Tltiu => alu::tltiu,
        RegImm::Teqi => alu::teqi,
        RegImm::Tnei => alu::tnei,
        RegImm::Bltzal => branch::bltzal,
        RegImm::Bgezal => branch::bgezal,
        RegImm::Bltzall => branch::bltzall,
        RegImm::Bgezall => branch::bgezall,
    }
}

/// Resolves the handler of an instruction. Unknown encodings resolve to a handler raising a
/// Reserved Instruction exception.
pub fn decode(ins: Ins) -> Handler {
    let Some(op) = ins.opcode() else {
        return reserved;
    };

    match op {
        Opcode::Special => special(ins),
        Opcode::RegImm => regimm(ins),
        Opcode::J => branch::j,
        Opcode::Jal => branch::jal,
        Opcode::Beq => branch::beq,
        Opcode::Bne => branch::bne,
        Opcode::Blez => branch::blez,
        Opcode::Bgtz => branch::bgtz,
        Opcode::Addi => alu::addi,
        Opcode::Addiu => alu::addiu,
        Opcode::Slti => alu::slti,
        Opcode::Sltiu => alu::sltiu,
        Opcode::Andi => alu::andi,
        Opcode::Ori => alu::ori,
        Opcode::Xori => alu::xori,
        Opcode::Lui => alu::lui,
        Opcode::Cop0 => cop0::cop0,
        Opcode::Cop1 => cop1::cop1,
        Opcode::Cop2 | Opcode::Lwc2 | Opcode::Ldc2 | Opcode::Swc2 | Opcode::Sdc2 => cop2,
        Opcode::Beql => branch::beql,
        Opcode::Bnel => branch::bnel,
        Opcode::Blezl => branch::blezl,
        Opcode::Bgtzl => branch::bgtzl,
        Opcode::Daddi => alu::daddi,
        Opcode::Daddiu => alu::daddiu,
        Opcode::Ldl => memory::ldl,
        Opcode::Ldr => memory::ldr,
        Opcode::Lb => memory::lb,
        Opcode::Lh => memory::lh,
        Opcode::Lwl => memory::lwl,
        Opcode::Lw => memory::lw,
        Opcode::Lbu => memory::lbu,
        Opcode::Lhu => memory::lhu,
        Opcode::Lwr => memory::lwr,
        Opcode::Lwu => memory::lwu,
        Opcode::Sb => memory::sb,
        Opcode::Sh => memory::sh,
        Opcode::Swl => memory::swl,
        Opcode::Sw => memory::sw,
        Opcode::Sdl => memory::sdl,
        Opcode::Sdr => memory::sdr,
        Opcode::Swr => memory::swr,
        Opcode::Cache => memory::cache,
        Opcode::Ll => memory::ll,
        Opcode::Lwc1 => memory::lwc1,
        Opcode::Lld => memory::lld,
        Opcode::Ldc1 => memory::ldc1,
        Opcode::Ld => memory::ld,
        Opcode::Sc => memory::sc,
        Opcode::Swc1 => memory::swc1,
        Opcode::Scd => memory::scd,
        Opcode::Sdc1 => memory::sdc1,
        Opcode::Sd => memory::sd,
    }
}

/// Executes an instruction whose PC has already been advanced past.
#[inline(always)]
pub fn execute(sys: &mut System, ins: Ins) -> Result {
    decode(ins)(sys, ins)
}

/// Runs a single step of the CPU: services a pending interrupt, or fetches the instruction at PC
/// and runs it with `exec`, which receives the physical address of the instruction.
///
/// A step always takes a single cycle.
#[inline(always)]
pub(crate) fn step_with<F>(sys: &mut System, exec: F) -> Executed
where
    F: FnOnce(&mut System, Address) -> Result,
{
    const STEP: Executed = Executed {
        instructions: 1,
        cycles: Cycles(1),
    };

    sys.cpu.begin_step();
    sys.tick(1);

    if sys.cpu.should_service_interrupt() {
        sys.service_interrupt();
        return STEP;
    }

    let pc = sys.cpu.pc;
    let addr = match sys.translate_aligned(pc, 4, Access::Fetch) {
        Ok(addr) => addr,
        Err(exception) => {
            sys.cpu.raise(exception, pc);
            return STEP;
        }
    };

    sys.cpu.advance_pc();
    if let Err(exception) = exec(sys, addr) {
        sys.raise(exception);
    }

    STEP
}

/// Runs a single step of the CPU, decoding the instruction at PC.
pub fn step(sys: &mut System) -> Executed {
    step_with(sys, |sys, addr| {
        let ins = Ins(sys.read(addr));
        execute(sys, ins)
    })
}

/// Runs steps until `cycles` have been executed or an exit is requested.
#[inline(always)]
pub(crate) fn exec_with(
    sys: &mut System,
    cycles: Cycles,
    mut step: impl FnMut(&mut System) -> Executed,
) -> Executed {
    sys.exit_requested = false;

    let mut executed = Executed::default();
    while executed.cycles < cycles {
        executed += step(sys);
        if sys.exit_requested {
            break;
        }
    }

    executed
}

/// The interpreter core. Decodes every instruction as it runs it.
#[derive(Debug, Default)]
pub struct Interpreter;

impl CpuCore for Interpreter {
    fn exec(&mut self, sys: &mut System, cycles: Cycles) -> Executed {
        exec_with(sys, cycles, step)
    }

    fn step(&mut self, sys: &mut System) -> Executed {
        step(sys)
    }
}

#[cfg(test)]
mod test {
    use umbra::{
        system::Config,
        vr4300::cop1::{RoundingMode, flags},
    };

    use super::*;

    const BASE: u64 = 0xFFFF_FFFF_8000_1000;

    fn system(program: &[u32]) -> System {
        let mut sys = System::new(Default::default(), Config::default());
        sys.cpu.cop0.status.set_erl(false);
        sys.cpu.cop0.status.set_bev(false);
        sys.cpu.cop0.status.set_cu1(true);
        sys.cpu.cop0.status.set_fr(true);

        for (i, word) in program.iter().enumerate() {
            sys.write(Address(0x1000 + 4 * i as u32), *word);
        }

        sys.cpu.jump_to(BASE);
        sys
    }

    fn run(sys: &mut System, steps: usize) {
        for _ in 0..steps {
            step(sys);
        }
    }

    #[test]
    fn add_overflow_raises_without_writing() {
        let mut sys = system(&[
            0x0022_1820, // add r3, r1, r2
        ]);
        sys.cpu.gpr[1] = 0x7FFF_FFFF;
        sys.cpu.gpr[2] = 1;
        sys.cpu.gpr[3] = 0xAAAA;

        run(&mut sys, 1);
        assert_eq!(sys.cpu.gpr[3], 0xAAAA);
        assert_eq!(sys.cpu.cop0.cause.code(), ExceptionCode::Overflow as u8);
        assert_eq!(sys.cpu.cop0.epc, BASE);
        assert_eq!(sys.cpu.pc, 0xFFFF_FFFF_8000_0180);
    }

    #[test]
    fn division_corner_cases() {
        let mut sys = system(&[
            0x0022_001A, // div r1, r2
            0x0000_1812, // mflo r3
            0x0000_2010, // mfhi r4
            0x0025_001A, // div r1, r5
            0x0000_3012, // mflo r6
            0x0000_3810, // mfhi r7
            0x0022_001B, // divu r1, r2
            0x0000_4012, // mflo r8
        ]);
        sys.cpu.gpr[1] = 0xFFFF_FFFF_8000_0000; // i32::MIN
        sys.cpu.gpr[2] = 0;
        sys.cpu.gpr[5] = u64::MAX; // -1

        run(&mut sys, 8);

        // by zero: negative dividend gives 1
        assert_eq!(sys.cpu.gpr[3], 1);
        assert_eq!(sys.cpu.gpr[4], 0xFFFF_FFFF_8000_0000);

        // MIN / -1
        assert_eq!(sys.cpu.gpr[6], 0xFFFF_FFFF_8000_0000);
        assert_eq!(sys.cpu.gpr[7], 0);

        // unsigned by zero
        assert_eq!(sys.cpu.gpr[8], u64::MAX);
    }

    #[test]
    fn sra_uses_doubleword() {
        let mut sys = system(&[
            0x0001_1103, // sra r2, r1, 4
        ]);
        sys.cpu.gpr[1] = 0x0000_0001_0000_0000;

        run(&mut sys, 1);
        assert_eq!(sys.cpu.gpr[2], 0x1000_0000);
    }

    #[test]
    fn unaligned_word_merges() {
        let mut sys = system(&[
            0x8822_0001, // lwl r2, 1(r1)
            0x9822_0004, // lwr r2, 4(r1)
        ]);
        sys.write(Address(0x2000), 0x1122_3344u32);
        sys.write(Address(0x2004), 0x5566_7788u32);
        sys.cpu.gpr[1] = 0xFFFF_FFFF_8000_2000;
        sys.cpu.gpr[2] = 0xFFFF_FFFF_FFFF_FFFF;

        run(&mut sys, 1);
        assert_eq!(sys.cpu.gpr[2], 0x2233_44FF);

        run(&mut sys, 1);
        assert_eq!(sys.cpu.gpr[2], 0x2233_4455);
    }

    #[test]
    fn unaligned_word_stores() {
        let mut sys = system(&[
            0xA822_0001, // swl r2, 1(r1)
            0xB822_0006, // swr r2, 6(r1)
        ]);
        sys.write(Address(0x2000), 0xAAAA_AAAAu32);
        sys.write(Address(0x2004), 0xBBBB_BBBBu32);
        sys.cpu.gpr[1] = 0xFFFF_FFFF_8000_2000;
        sys.cpu.gpr[2] = 0x1122_3344;

        run(&mut sys, 2);
        assert_eq!(sys.read::<u32>(Address(0x2000)), 0xAA11_2233);
        assert_eq!(sys.read::<u32>(Address(0x2004)), 0x2233_44BB);
    }

    #[test]
    fn unaligned_doubleword_merges() {
        let mut sys = system(&[
            0x6822_0003, // ldl r2, 3(r1)
            0x6C22_000A, // ldr r2, 10(r1)
        ]);
        sys.write(Address(0x2000), 0x0011_2233_4455_6677u64);
        sys.write(Address(0x2008), 0x8899_AABB_CCDD_EEFFu64);
        sys.cpu.gpr[1] = 0xFFFF_FFFF_8000_2000;

        run(&mut sys, 2);
        assert_eq!(sys.cpu.gpr[2], 0x3344_5566_7788_99AA);
    }

    #[test]
    fn likely_branch_nullifies_slot() {
        let mut sys = system(&[
            0x5420_0002, // bnel r1, r0, +2
            0x2402_0001, // addiu r2, r0, 1
            0x2403_0001, // addiu r3, r0, 1
        ]);

        run(&mut sys, 2);
        assert_eq!(sys.cpu.gpr[2], 0);
        assert_eq!(sys.cpu.gpr[3], 1);
    }

    #[test]
    fn exception_in_delay_slot() {
        let mut sys = system(&[
            0x1000_0004, // beq r0, r0, +4
            0x0000_000C, // syscall
        ]);

        run(&mut sys, 2);
        assert!(sys.cpu.cop0.cause.bd());
        assert_eq!(sys.cpu.cop0.epc, BASE);
        assert_eq!(sys.cpu.cop0.cause.code(), ExceptionCode::Syscall as u8);
    }

    #[test]
    fn reserved_instruction() {
        let mut sys = system(&[0xEC00_0000]);
        run(&mut sys, 1);
        assert_eq!(
            sys.cpu.cop0.cause.code(),
            ExceptionCode::ReservedInstruction as u8
        );
    }

    #[test]
    fn cop1_unusable_first() {
        let mut sys = system(&[
            0x4602_0800, // add.s f0, f1, f2
        ]);
        sys.cpu.cop0.status.set_cu1(false);

        run(&mut sys, 1);
        assert_eq!(
            sys.cpu.cop0.cause.code(),
            ExceptionCode::CoprocessorUnusable as u8
        );
        assert_eq!(sys.cpu.cop0.cause.ce().value(), 1);
    }

    #[test]
    fn fpu_division_by_zero_flags_and_traps() {
        let mut sys = system(&[
            0x4622_0003, // div.d f0, f0, f2
            0x4622_0003, // div.d f0, f0, f2
        ]);
        sys.cpu.cop1.fpr[0] = 1.0f64.to_bits();
        sys.cpu.cop1.fpr[2] = 0.0f64.to_bits();

        run(&mut sys, 1);
        assert_eq!(f64::from_bits(sys.cpu.cop1.fpr[0]), f64::INFINITY);
        assert_eq!(sys.cpu.cop1.fcr31.flags().value(), flags::DIV_BY_ZERO);

        // enable the trap and try again with a finite dividend
        sys.cpu.cop1.fpr[0] = 2.0f64.to_bits();
        sys.cpu.cop1.write_control(31, (flags::DIV_BY_ZERO as u32) << 7);

        run(&mut sys, 1);
        assert_eq!(f64::from_bits(sys.cpu.cop1.fpr[0]), 2.0);
        assert_eq!(
            sys.cpu.cop0.cause.code(),
            ExceptionCode::FloatingPoint as u8
        );
    }

    #[test]
    fn fpu_rounding_mode() {
        let mut sys = system(&[
            0x4600_0024, // cvt.w.s f0, f0
        ]);
        sys.cpu.cop1.fpr[0] = 2.5f32.to_bits() as u64;
        sys.cpu.cop1.fcr31.set_rounding_mode(RoundingMode::Up);

        run(&mut sys, 1);
        assert_eq!(sys.cpu.cop1.fpr[0] as u32, 3);
        assert_eq!(sys.cpu.cop1.fcr31.cause().value(), flags::INEXACT);
    }

    #[test]
    fn fpu_compare_and_branch() {
        let mut sys = system(&[
            0x4602_003C, // c.lt.s f0, f2
            0x4501_0002, // bc1t +2
            0x0000_0000, // nop
            0x2403_0001, // addiu r3, r0, 1 (skipped)
            0x2404_0001, // addiu r4, r0, 1
        ]);
        sys.cpu.cop1.fpr[0] = 1.0f32.to_bits() as u64;
        sys.cpu.cop1.fpr[2] = 2.0f32.to_bits() as u64;

        run(&mut sys, 4);
        assert!(sys.cpu.cop1.fcr31.condition());
        assert_eq!(sys.cpu.gpr[3], 0);
        assert_eq!(sys.cpu.gpr[4], 1);
    }

    #[test]
    fn interrupt_serviced_before_fetch() {
        let mut sys = system(&[
            0x2402_0001, // addiu r2, r0, 1
        ]);
        sys.cpu.cop0.status.set_ie(true);
        sys.cpu.cop0.status.set_im(0x01);
        sys.cpu.cop0.cause.set_ip(0x01);

        run(&mut sys, 1);
        assert_eq!(sys.cpu.gpr[2], 0);
        assert_eq!(sys.cpu.cop0.cause.code(), ExceptionCode::Interrupt as u8);
        assert_eq!(sys.cpu.cop0.epc, BASE);
    }

    #[test]
    fn fetch_fault_reports_pc() {
        let mut sys = system(&[]);
        sys.cpu.jump_to(0x0000_4000);

        run(&mut sys, 1);
        assert_eq!(sys.cpu.cop0.bad_vaddr, 0x4000);
        assert_eq!(sys.cpu.cop0.epc, 0x4000);
        assert_eq!(sys.cpu.pc, 0xFFFF_FFFF_8000_0000);
    }

    #[test]
    fn exec_stops_on_device_write() {
        let mut sys = system(&[
            0x3C01_A430, // lui r1, 0xA430
            0xAC20_000C, // sw r0, 0xC(r1)
            0x0000_0000, // nop
        ]);

        let executed = Interpreter.exec(&mut sys, Cycles(100));
        assert_eq!(executed.instructions, 2);
    }
}
