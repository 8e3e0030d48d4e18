//! Runs small hand-assembled programs on every core and checks they agree.

use cores::{cached::CachedInterpreter, interpreter::Interpreter};
use umbra::{
    Address, Cycles, Umbra,
    cores::{CpuCore, Executed},
    system::{Config, Modules},
    vr4300::{cop0::EntryLo, exception::ExceptionCode, tlb::TlbEntry},
};

const ENTRY: u64 = 0xFFFF_FFFF_8000_1000;

/// Words to place at a physical address.
type Segment<'a> = (u32, &'a [u32]);

#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    executed: Executed,
    gpr: [u64; 32],
    hi: u64,
    lo: u64,
    pc: u64,
    next_pc: u64,
    count: u32,
    cause: u32,
    epc: u64,
    bad_vaddr: u64,
    context: u64,
    entry_hi: u64,
    fpr: [u64; 32],
    fcr31: u32,
    rdram: Vec<u8>,
}

fn machine<C: CpuCore>(core: C, segments: &[Segment]) -> Umbra<C> {
    let mut umbra = Umbra::new(core, Modules::default(), Config::default());
    let sys = &mut umbra.system;

    let status = &mut sys.cpu.cop0.status;
    status.set_erl(false);
    status.set_exl(false);
    status.set_bev(false);
    status.set_ie(false);
    status.set_cu1(true);
    status.set_fr(true);

    for &(base, words) in segments {
        for (i, word) in words.iter().enumerate() {
            sys.write(Address(base + 4 * i as u32), *word);
        }
    }

    sys.cpu.jump_to(ENTRY);
    umbra
}

fn snapshot<C>(umbra: &Umbra<C>, executed: Executed) -> Snapshot {
    let cpu = &umbra.system.cpu;
    Snapshot {
        executed,
        gpr: cpu.gpr,
        hi: cpu.hi,
        lo: cpu.lo,
        pc: cpu.pc,
        next_pc: cpu.next_pc,
        count: cpu.cop0.count(),
        cause: cpu.cop0.cause.to_bits(),
        epc: cpu.cop0.epc,
        bad_vaddr: cpu.cop0.bad_vaddr,
        context: cpu.cop0.context,
        entry_hi: cpu.cop0.entry_hi,
        fpr: cpu.cop1.fpr,
        fcr31: cpu.cop1.fcr31.to_bits(),
        rdram: umbra.system.bus.mem.rdram[..0x4000].to_vec(),
    }
}

fn run<C: CpuCore>(core: C, segments: &[Segment], cycles: u64) -> Snapshot {
    run_with(core, segments, cycles, |_| ())
}

fn run_with<C: CpuCore>(
    core: C,
    segments: &[Segment],
    cycles: u64,
    setup: impl Fn(&mut Umbra<C>),
) -> Snapshot {
    let mut umbra = machine(core, segments);
    setup(&mut umbra);

    let executed = umbra.exec(Cycles(cycles));
    snapshot(&umbra, executed)
}

/// Runs the program on every core, checks that they end up in the same state and returns it.
fn run_all(
    segments: &[Segment],
    cycles: u64,
    setup: impl Fn(&mut umbra::system::System),
) -> Snapshot {
    let reference = run_with(Interpreter, segments, cycles, |u| setup(&mut u.system));

    let cached = run_with(CachedInterpreter::new(), segments, cycles, |u| setup(&mut u.system));
    assert_eq!(reference, cached, "cached interpreter diverged");

    #[cfg(target_arch = "x86_64")]
    {
        let core = cores::jit::Core::new(Default::default()).unwrap();
        let jit = run_with(core, segments, cycles, |u| setup(&mut u.system));
        assert_eq!(reference, jit, "jit diverged");
    }

    reference
}

const MAIN: &[u32] = &[
    0x3C01_8000, // 000: lui r1, 0x8000
    0x3421_2000, // 004: ori r1, r1, 0x2000
    0x2402_000A, // 008: addiu r2, r0, 10
    0x2403_0000, // 00C: addiu r3, r0, 0
    0x0062_1821, // 010: addu r3, r3, r2
    0xAC23_0000, // 014: sw r3, 0(r1)
    0x2421_0004, // 018: addiu r1, r1, 4
    0x2442_FFFF, // 01C: addiu r2, r2, -1
    0x1440_FFFB, // 020: bne r2, r0, 010
    0x0000_0000, // 024: nop
    0x0C00_0440, // 028: jal 1100
    0x2404_0003, // 02C: addiu r4, r0, 3
    0x3C05_8000, // 030: lui r5, 0x8000
    0x88A6_2001, // 034: lwl r6, 0x2001(r5)
    0x98A6_2004, // 038: lwr r6, 0x2004(r5)
    0x0064_0018, // 03C: mult r3, r4
    0x0000_3812, // 040: mflo r7
    0x00E0_001A, // 044: div r7, r0
    0x0000_4010, // 048: mfhi r8
    0x5004_0002, // 04C: beql r0, r4, 058
    0x2409_0001, // 050: addiu r9, r0, 1
    0xFCA7_3000, // 054: sd r7, 0x3000(r5)
    0xDCAA_3000, // 058: ld r10, 0x3000(r5)
    0x0000_000C, // 05C: syscall
    0x3C0C_3FF0, // 060: lui r12, 0x3FF0
    0x000C_603C, // 064: dsll32 r12, r12, 0
    0x44AC_0000, // 068: dmtc1 r12, f0
    0x240D_0003, // 06C: addiu r13, r0, 3
    0x448D_1000, // 070: mtc1 r13, f2
    0x4680_10A1, // 074: cvt.d.w f2, f2
    0x4622_0103, // 078: div.d f4, f0, f2
    0x444E_F800, // 07C: cfc1 r14, $31
    0x442F_2000, // 080: dmfc1 r15, f4
    0x1000_FFFF, // 084: beq r0, r0, 084
    0x0000_0000, // 088: nop
];

const FUNC: &[u32] = &[
    0x03E0_0008, // jr r31
    0x2410_0007, // addiu r16, r0, 7
];

/// Skips the instruction which raised the exception.
const SKIPPING_HANDLER: &[u32] = &[
    0x400B_7000, // mfc0 r11, epc
    0x256B_0004, // addiu r11, r11, 4
    0x408B_7000, // mtc0 r11, epc
    0x0000_0000, // nop
    0x4200_0018, // eret
];

const SPIN: &[u32] = &[
    0x1000_FFFF, // beq r0, r0, -1
    0x0000_0000, // nop
];

#[test]
fn engines_agree_on_mixed_program() {
    let segments = [
        (0x1000, MAIN),
        (0x1100, FUNC),
        (0x0180, SKIPPING_HANDLER),
    ];
    let state = run_all(&segments, 2000, |_| ());

    // loop
    assert_eq!(state.gpr[1], 0xFFFF_FFFF_8000_2028);
    assert_eq!(state.gpr[2], 0);
    assert_eq!(state.gpr[3], 55);
    assert_eq!(state.rdram[0x2000..0x2004], 10u32.to_be_bytes());
    assert_eq!(state.rdram[0x2004..0x2008], 19u32.to_be_bytes());
    assert_eq!(state.rdram[0x2024..0x2028], 55u32.to_be_bytes());

    // call, with the delay slot executed before the callee
    assert_eq!(state.gpr[31], 0xFFFF_FFFF_8000_1030);
    assert_eq!(state.gpr[4], 3);
    assert_eq!(state.gpr[16], 7);

    // unaligned merges
    assert_eq!(state.gpr[6], 0x0A00);

    // multiplication and division by zero
    assert_eq!(state.gpr[7], 165);
    assert_eq!(state.gpr[8], 165);
    assert_eq!(state.lo, u64::MAX);

    // nullified delay slot
    assert_eq!(state.gpr[9], 0);
    assert_eq!(state.gpr[10], 165);

    // syscall handler
    assert_eq!(state.gpr[11], 0xFFFF_FFFF_8000_1060);
    assert_eq!(state.epc, 0xFFFF_FFFF_8000_1060);

    // fpu
    assert_eq!(state.gpr[15], (1.0f64 / 3.0).to_bits());
    assert_ne!(state.gpr[14] & (1 << 2), 0, "inexact flag");

    // spinning at the end
    assert!(state.pc == 0xFFFF_FFFF_8000_1084 || state.pc == 0xFFFF_FFFF_8000_1088);
    assert_eq!(state.gpr[0], 0);
}

#[test]
fn engines_agree_on_cycle_counts() {
    let segments = [(0x1000, SPIN)];
    for cycles in [1, 2, 3, 17, 128, 129, 1000] {
        let state = run_all(&segments, cycles, |_| ());
        assert!(state.executed.cycles >= Cycles(cycles));
    }
}

#[test]
fn zero_register_is_never_written() {
    let program = [
        0x2400_0005, // addiu r0, r0, 5
        0x0000_0825, // or r1, r0, r0
        0x3C00_FFFF, // lui r0, 0xFFFF
        0x0000_1025, // or r2, r0, r0
        0x1000_FFFF, // beq r0, r0, -1
        0x0000_0000, // nop
    ];

    let state = run_all(&[(0x1000, &program[..])], 100, |_| ());
    assert_eq!(state.gpr[0], 0);
    assert_eq!(state.gpr[1], 0);
    assert_eq!(state.gpr[2], 0);
}

#[test]
fn tlb_miss_uses_refill_vector() {
    let program = [
        0x3C01_1000, // lui r1, 0x1000
        0x8C22_0000, // lw r2, 0(r1)
        0x2403_0001, // addiu r3, r0, 1
    ];

    let state = run_all(&[(0x1000, &program[..]), (0x0000, SPIN)], 100, |_| ());
    assert_eq!(
        (state.cause >> 2) & 0x1F,
        ExceptionCode::TlbLoad as u32,
        "exception code"
    );
    assert_eq!(state.bad_vaddr, 0x1000_0000);
    assert_eq!(state.epc, ENTRY + 4);
    assert_eq!(state.gpr[3], 0);
    assert_eq!(state.pc & !7, 0xFFFF_FFFF_8000_0000);
}

#[test]
fn timer_interrupt_is_taken_at_the_same_instruction() {
    let program = [
        0x2401_0001, // addiu r1, r0, 1
        0x0022_0821, // addu r1, r1, r2
        0x0022_1021, // addu r2, r1, r2
        0x1000_FFFC, // beq r0, r0, -4
        0x0000_0000, // nop
    ];

    let state = run_all(&[(0x1000, &program[..]), (0x0180, SPIN)], 500, |sys| {
        sys.cpu.cop0.compare = sys.cpu.cop0.count().wrapping_add(77);
        sys.cpu.cop0.status.set_im(0x80);
        sys.cpu.cop0.status.set_ie(true);
    });

    assert_eq!((state.cause >> 2) & 0x1F, ExceptionCode::Interrupt as u32);
    assert_ne!(state.cause & (1 << 15), 0, "timer pending");
    assert_eq!(state.pc & !7, 0xFFFF_FFFF_8000_0180);
}

#[test]
fn self_modifying_code_is_picked_up() {
    // overwrites the instruction at 0x1010 with `addiu r3, r0, 2`, then runs it
    let program = [
        0x3C01_2403, // 000: lui r1, 0x2403
        0x3421_0002, // 004: ori r1, r1, 2
        0x3C02_8000, // 008: lui r2, 0x8000
        0xAC41_1010, // 00C: sw r1, 0x1010(r2)
        0x2403_0001, // 010: addiu r3, r0, 1
        0x1000_FFFF, // 014: beq r0, r0, -1
        0x0000_0000, // 018: nop
    ];

    let state = run_all(&[(0x1000, &program[..])], 200, |_| ());
    assert_eq!(state.gpr[3], 2);
}

#[test]
fn runs_are_deterministic() {
    let segments = [
        (0x1000, MAIN),
        (0x1100, FUNC),
        (0x0180, SKIPPING_HANDLER),
    ];

    let first = run(Interpreter, &segments, 20_000);
    let second = run(Interpreter, &segments, 20_000);
    assert_eq!(first, second);

    #[cfg(target_arch = "x86_64")]
    {
        let first = run(cores::jit::Core::new(Default::default()).unwrap(), &segments, 20_000);
        let second = run(cores::jit::Core::new(Default::default()).unwrap(), &segments, 20_000);
        assert_eq!(first, second);
    }
}

#[test]
fn tlb_faults_pick_their_vector() {
    const REFILL: u64 = 0xFFFF_FFFF_8000_0000;
    const GENERAL: u64 = 0xFFFF_FFFF_8000_0180;

    // pfn 3, cacheable, with the given valid and dirty bits
    let lo = |valid: bool, dirty: bool| {
        EntryLo::from_bits((3 << 6) | (3 << 3) | ((dirty as u32) << 2) | ((valid as u32) << 1))
    };

    struct Case {
        vaddr: u32,
        store: bool,
        entry: Option<TlbEntry>,
        /// Exception code and vector, or `None` if the access succeeds.
        fault: Option<(ExceptionCode, u64)>,
    }

    let mapped = |valid, dirty| {
        Some(TlbEntry::new(
            0,
            0x0040_0000,
            lo(valid, dirty),
            lo(false, false),
        ))
    };
    let cases = [
        // miss on the first page, with the reset TLB
        Case {
            vaddr: 0x0000_0010,
            store: false,
            entry: None,
            fault: Some((ExceptionCode::TlbLoad, REFILL)),
        },
        Case {
            vaddr: 0x0000_1000,
            store: true,
            entry: None,
            fault: Some((ExceptionCode::TlbStore, REFILL)),
        },
        // invalid even page
        Case {
            vaddr: 0x0040_0010,
            store: false,
            entry: mapped(false, false),
            fault: Some((ExceptionCode::TlbLoad, GENERAL)),
        },
        // store to a clean page
        Case {
            vaddr: 0x0040_0010,
            store: true,
            entry: mapped(true, false),
            fault: Some((ExceptionCode::TlbModification, GENERAL)),
        },
        // hit
        Case {
            vaddr: 0x0040_0010,
            store: true,
            entry: mapped(true, true),
            fault: None,
        },
    ];

    for case in cases {
        let access = if case.store { 0xAC22_0000 } else { 0x8C22_0000 };
        let program = [
            0x3C01_0000 | (case.vaddr >> 16), // lui r1, hi
            access | (case.vaddr & 0xFFFF),   // lw/sw r2, lo(r1)
            0x2403_0001,                      // addiu r3, r0, 1
            0x1000_FFFF,                      // beq r0, r0, -1
            0x0000_0000,                      // nop
        ];

        let segments = [(0x1000, &program[..]), (0x0000, SPIN), (0x0180, SPIN)];
        let state = run_all(&segments, 100, |sys| {
            sys.cpu.gpr[2] = 0x55;
            if let Some(entry) = case.entry {
                sys.cpu.cop0.tlb.set_entry(0, entry);
            }
        });

        let vaddr = case.vaddr as u64;
        match case.fault {
            Some((code, vector)) => {
                assert_eq!(state.pc & !7, vector, "vector for {vaddr:08X}");
                assert_eq!((state.cause >> 2) & 0x1F, code as u32, "code for {vaddr:08X}");
                assert_eq!(state.epc, ENTRY + 4);
                assert_eq!(state.bad_vaddr, vaddr);
                assert_eq!(state.context & 0x7F_FFF0, (vaddr >> 13) << 4);
                assert_eq!(state.entry_hi & !0xFF, vaddr & !0x1FFF);
                assert_eq!(state.gpr[3], 0);
            }
            None => {
                assert!(state.pc == ENTRY + 12 || state.pc == ENTRY + 16);
                assert_eq!(state.gpr[3], 1);
                assert_eq!(state.rdram[0x3010..0x3014], 0x55u32.to_be_bytes());
            }
        }
    }
}

const FPU_BRANCHES: &[u32] = &[
    0x3C01_3F80, // 000: lui r1, 0x3F80
    0x4481_0000, // 004: mtc1 r1, f0
    0x2402_0005, // 008: addiu r2, r0, 5
    0x4480_1000, // 00C: mtc1 r0, f2
    0x2403_0000, // 010: addiu r3, r0, 0
    0x4600_103C, // 014: c.lt.s f2, f0
    0x4501_0001, // 018: bc1t 020
    0x2463_0001, // 01C: addiu r3, r3, 1
    0x2442_FFFF, // 020: addiu r2, r2, -1
    0x4600_1032, // 024: c.eq.s f2, f0
    0x4502_0001, // 028: bc1fl 030
    0x2484_0001, // 02C: addiu r4, r4, 1
    0x4503_0002, // 030: bc1tl 03C
    0x24A5_0001, // 034: addiu r5, r5, 1
    0x1440_FFF6, // 038: bne r2, r0, 014
    0x0000_0000, // 03C: nop
    0x1000_FFFF, // 040: beq r0, r0, 040
    0x0000_0000, // 044: nop
];

#[test]
fn engines_agree_on_fpu_branches() {
    let segments = [(0x1000, FPU_BRANCHES)];
    for cycles in [7, 20, 33, 64, 200] {
        run_all(&segments, cycles, |_| ());
    }

    let state = run_all(&segments, 200, |_| ());
    assert_eq!(state.gpr[2], 0);
    assert_eq!(state.gpr[3], 5, "bc1t delay slot");
    assert_eq!(state.gpr[4], 5, "bc1fl taken delay slot");
    assert_eq!(state.gpr[5], 0, "bc1tl nullified delay slot");
    assert!(state.pc == ENTRY + 0x40 || state.pc == ENTRY + 0x44);
}

#[test]
fn fpu_branch_needs_cop1() {
    let program = [
        0x2401_0001, // addiu r1, r0, 1
        0x4501_0001, // bc1t +1
        0x2402_0001, // addiu r2, r0, 1
        0x1000_FFFF, // beq r0, r0, -1
        0x0000_0000, // nop
    ];

    let segments = [(0x1000, &program[..]), (0x0180, SPIN)];
    let state = run_all(&segments, 50, |sys| sys.cpu.cop0.status.set_cu1(false));

    assert_eq!(state.gpr[1], 1);
    assert_eq!(state.gpr[2], 0);
    assert_eq!(
        (state.cause >> 2) & 0x1F,
        ExceptionCode::CoprocessorUnusable as u32
    );
    assert_eq!((state.cause >> 28) & 3, 1, "coprocessor number");
    assert_eq!(state.epc, ENTRY + 4);
    assert_eq!(state.pc & !7, 0xFFFF_FFFF_8000_0180);
}
