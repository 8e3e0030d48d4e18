//! Instruction encoding.

use bitos::BitUtils;
use strum::{FromRepr, IntoStaticStr};

/// Primary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Opcode {
    Special = 0x00,
    RegImm = 0x01,
    J = 0x02,
    Jal = 0x03,
    Beq = 0x04,
    Bne = 0x05,
    Blez = 0x06,
    Bgtz = 0x07,
    Addi = 0x08,
    Addiu = 0x09,
    Slti = 0x0A,
    Sltiu = 0x0B,
    Andi = 0x0C,
    Ori = 0x0D,
    Xori = 0x0E,
    Lui = 0x0F,
    Cop0 = 0x10,
    Cop1 = 0x11,
    Cop2 = 0x12,
    Beql = 0x14,
    Bnel = 0x15,
    Blezl = 0x16,
    Bgtzl = 0x17,
    Daddi = 0x18,
    Daddiu = 0x19,
    Ldl = 0x1A,
    Ldr = 0x1B,
    Lb = 0x20,
    Lh = 0x21,
    Lwl = 0x22,
    Lw = 0x23,
    Lbu = 0x24,
    Lhu = 0x25,
    Lwr = 0x26,
    Lwu = 0x27,
    Sb = 0x28,
    Sh = 0x29,
    Swl = 0x2A,
    Sw = 0x2B,
    Sdl = 0x2C,
    Sdr = 0x2D,
    Swr = 0x2E,
    Cache = 0x2F,
    Ll = 0x30,
    Lwc1 = 0x31,
    Lwc2 = 0x32,
    Lld = 0x34,
    Ldc1 = 0x35,
    Ldc2 = 0x36,
    Ld = 0x37,
    Sc = 0x38,
    Swc1 = 0x39,
    Swc2 = 0x3A,
    Scd = 0x3C,
    Sdc1 = 0x3D,
    Sdc2 = 0x3E,
    Sd = 0x3F,
}

/// Functions of the SPECIAL opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Special {
    Sll = 0x00,
    Srl = 0x02,
    Sra = 0x03,
    Sllv = 0x04,
    Srlv = 0x06,
    Srav = 0x07,
    Jr = 0x08,
    Jalr = 0x09,
    Syscall = 0x0C,
    Break = 0x0D,
    Sync = 0x0F,
    Mfhi = 0x10,
    Mthi = 0x11,
    Mflo = 0x12,
    Mtlo = 0x13,
    Dsllv = 0x14,
    Dsrlv = 0x16,
    Dsrav = 0x17,
    Mult = 0x18,
    Multu = 0x19,
    Div = 0x1A,
    Divu = 0x1B,
    Dmult = 0x1C,
    Dmultu = 0x1D,
    Ddiv = 0x1E,
    Ddivu = 0x1F,
    Add = 0x20,
    Addu = 0x21,
    Sub = 0x22,
    Subu = 0x23,
    And = 0x24,
    Or = 0x25,
    Xor = 0x26,
    Nor = 0x27,
    Slt = 0x2A,
    Sltu = 0x2B,
    Dadd = 0x2C,
    Daddu = 0x2D,
    Dsub = 0x2E,
    Dsubu = 0x2F,
    Tge = 0x30,
    Tgeu = 0x31,
    Tlt = 0x32,
    Tltu = 0x33,
    Teq = 0x34,
    Tne = 0x36,
    Dsll = 0x38,
    Dsrl = 0x3A,
    Dsra = 0x3B,
    Dsll32 = 0x3C,
    Dsrl32 = 0x3E,
    Dsra32 = 0x3F,
}

/// Functions of the REGIMM opcode, selected by the `rt` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum RegImm {
    Bltz = 0x00,
    Bgez = 0x01,
    Bltzl = 0x02,
    Bgezl = 0x03,
    Tgei = 0x08,
    Tgeiu = 0x09,
    Tlti = 0x0A,
    Tltiu = 0x0B,
    Teqi = 0x0C,
    Tnei = 0x0E,
    Bltzal = 0x10,
    Bgezal = 0x11,
    Bltzall = 0x12,
    Bgezall = 0x13,
}

/// Coprocessor operations, selected by the `rs` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum CopOp {
    Mf = 0x00,
    Dmf = 0x01,
    Cf = 0x02,
    Mt = 0x04,
    Dmt = 0x05,
    Ct = 0x06,
    Bc = 0x08,
    /// Single precision float.
    S = 0x10,
    /// Double precision float.
    D = 0x11,
    /// 32-bit fixed point.
    W = 0x14,
    /// 64-bit fixed point.
    L = 0x15,
}

/// Cop0 functions, when the `co` bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Cop0Function {
    Tlbr = 0x01,
    Tlbwi = 0x02,
    Tlbwr = 0x06,
    Tlbp = 0x08,
    Eret = 0x18,
}

/// Cop1 arithmetic functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Cop1Function {
    Add = 0x00,
    Sub = 0x01,
    Mul = 0x02,
    Div = 0x03,
    Sqrt = 0x04,
    Abs = 0x05,
    Mov = 0x06,
    Neg = 0x07,
    RoundL = 0x08,
    TruncL = 0x09,
    CeilL = 0x0A,
    FloorL = 0x0B,
    RoundW = 0x0C,
    TruncW = 0x0D,
    CeilW = 0x0E,
    FloorW = 0x0F,
    CvtS = 0x20,
    CvtD = 0x21,
    CvtW = 0x24,
    CvtL = 0x25,
}

/// A VR4300 instruction.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct Ins(pub u32);

impl std::fmt::Debug for Ins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:08X})", self.mnemonic(), self.0)
    }
}

impl Ins {
    pub const NOP: Self = Self(0);

    #[inline(always)]
    pub fn op(self) -> u8 {
        self.0.bits(26, 32) as u8
    }

    #[inline(always)]
    pub fn rs(self) -> usize {
        self.0.bits(21, 26) as usize
    }

    #[inline(always)]
    pub fn rt(self) -> usize {
        self.0.bits(16, 21) as usize
    }

    #[inline(always)]
    pub fn rd(self) -> usize {
        self.0.bits(11, 16) as usize
    }

    #[inline(always)]
    pub fn sa(self) -> u32 {
        self.0.bits(6, 11)
    }

    #[inline(always)]
    pub fn funct(self) -> u8 {
        self.0.bits(0, 6) as u8
    }

    #[inline(always)]
    pub fn imm(self) -> u16 {
        self.0 as u16
    }

    /// The immediate, sign extended to 64 bits.
    #[inline(always)]
    pub fn simm(self) -> u64 {
        self.0 as u16 as i16 as i64 as u64
    }

    #[inline(always)]
    pub fn target(self) -> u32 {
        self.0.bits(0, 26)
    }

    /// The format field of a coprocessor instruction (same bits as `rs`).
    #[inline(always)]
    pub fn fmt(self) -> u8 {
        self.rs() as u8
    }

    #[inline(always)]
    pub fn ft(self) -> usize {
        self.rt()
    }

    #[inline(always)]
    pub fn fs(self) -> usize {
        self.rd()
    }

    #[inline(always)]
    pub fn fd(self) -> usize {
        self.sa() as usize
    }

    /// Whether bit 25 (the `co` bit of coprocessor instructions) is set.
    #[inline(always)]
    pub fn co(self) -> bool {
        self.0.bit(25)
    }

    #[inline(always)]
    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_repr(self.op())
    }

    #[inline(always)]
    pub fn special(self) -> Option<Special> {
        Special::from_repr(self.funct())
    }

    #[inline(always)]
    pub fn regimm(self) -> Option<RegImm> {
        RegImm::from_repr(self.rt() as u8)
    }

    #[inline(always)]
    pub fn cop_op(self) -> Option<CopOp> {
        CopOp::from_repr(self.fmt())
    }

    /// Target of a branch at `pc`.
    #[inline(always)]
    pub fn branch_target(self, pc: u64) -> u64 {
        pc.wrapping_add(4).wrapping_add(self.simm() << 2)
    }

    /// Target of a jump at `pc`.
    #[inline(always)]
    pub fn jump_target(self, pc: u64) -> u64 {
        (pc.wrapping_add(4) & !0x0FFF_FFFF) | ((self.target() as u64) << 2)
    }

    /// Whether this instruction is followed by a delay slot.
    pub fn has_delay_slot(self) -> bool {
        match self.opcode() {
            Some(
                Opcode::J
                | Opcode::Jal
                | Opcode::Beq
                | Opcode::Bne
                | Opcode::Blez
                | Opcode::Bgtz
                | Opcode::Beql
                | Opcode::Bnel
                | Opcode::Blezl
                | Opcode::Bgtzl,
            ) => true,
            Some(Opcode::Special) => matches!(self.special(), Some(Special::Jr | Special::Jalr)),
            Some(Opcode::RegImm) => matches!(
                self.regimm(),
                Some(
                    RegImm::Bltz
                        | RegImm::Bgez
                        | RegImm::Bltzl
                        | RegImm::Bgezl
                        | RegImm::Bltzal
                        | RegImm::Bgezal
                        | RegImm::Bltzall
                        | RegImm::Bgezall
                )
            ),
            Some(Opcode::Cop1) => {
                self.cop_op() == Some(CopOp::Bc) && self.rt() < 4
            }
            _ => false,
        }
    }

    /// Whether this instruction ends a block: anything that may transfer control.
    pub fn ends_block(self) -> bool {
        if self.has_delay_slot() {
            return true;
        }

        match self.opcode() {
            Some(Opcode::Special) => matches!(
                self.special(),
                Some(
                    Special::Syscall
                        | Special::Break
                        | Special::Tge
                        | Special::Tgeu
                        | Special::Tlt
                        | Special::Tltu
                        | Special::Teq
                        | Special::Tne
                )
            ),
            Some(Opcode::RegImm) => self.regimm().is_some(),
            Some(Opcode::Cop0) => true,
            _ => false,
        }
    }

    /// A short name for the instruction, for diagnostics.
    pub fn mnemonic(self) -> &'static str {
        match self.opcode() {
            Some(Opcode::Special) => self.special().map_or("special?", Into::into),
            Some(Opcode::RegImm) => self.regimm().map_or("regimm?", Into::into),
            Some(Opcode::Cop0) if self.co() => {
                Cop0Function::from_repr(self.funct()).map_or("cop0?", Into::into)
            }
            Some(Opcode::Cop1) if self.co() => {
                Cop1Function::from_repr(self.funct()).map_or("cop1", Into::into)
            }
            Some(op @ (Opcode::Cop0 | Opcode::Cop1 | Opcode::Cop2)) => {
                self.cop_op().map_or(op.into(), Into::into)
            }
            Some(op) => op.into(),
            None => "reserved",
        }
    }
}
