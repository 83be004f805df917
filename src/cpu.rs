// Fetch/decode/execute loop for the single emulated hart, plus the CSR
// dispatch table and trap-raising logic. This is the RV32IMA analogue of
// the teacher's `processor.rs` step function, but table-driven through
// `decode::Instruction` rather than re-decoding inline at each step.

use crate::cpustate::{CpuState, Privilege};
use crate::decode::{self, AluOp, AmoOp, BranchOp, CsrOp, Instruction, Width};
use crate::mmio::{self, Devices};
use crate::ram::{RamImage, MMIO_BASE};

pub mod status {
    pub const NORMAL: u32 = 0;
    pub const WFI_IDLE: u32 = 1;
    pub const BREAKPOINT: u32 = 3;
    pub const RESTART: u32 = 0x7777;
    pub const POWEROFF: u32 = 0x5555;
}

/// Guest store address that special-cases power management, checked ahead
/// of the generic MMIO bridge (the bridge never sees these two values).
const SYSCON_ADDR: u32 = 0x1100_0000;
const SYSCON_RESTART: u32 = 0x7777;
const SYSCON_POWEROFF: u32 = 0x5555;

mod cause {
    pub const INSTRUCTION_MISALIGNED: u32 = 0;
    pub const INSTRUCTION_ACCESS_FAULT: u32 = 1;
    pub const ILLEGAL_INSTRUCTION: u32 = 2;
    pub const BREAKPOINT: u32 = 3;
    pub const LOAD_ACCESS_FAULT: u32 = 5;
    pub const STORE_ACCESS_FAULT: u32 = 7;
    pub const ECALL_FROM_U: u32 = 8;
    pub const ECALL_FROM_S: u32 = 9;
    pub const ECALL_FROM_M: u32 = 11;
    pub const MACHINE_TIMER: u32 = 0x8000_0007;
}

mod csrno {
    pub const MSTATUS: u32 = 0x300;
    pub const MISA: u32 = 0x301;
    pub const MIE: u32 = 0x304;
    pub const MTVEC: u32 = 0x305;
    pub const MSCRATCH: u32 = 0x340;
    pub const MEPC: u32 = 0x341;
    pub const MCAUSE: u32 = 0x342;
    pub const MTVAL: u32 = 0x343;
    pub const MIP: u32 = 0x344;
    pub const CYCLE: u32 = 0xC00;
    pub const TIME: u32 = 0xC01;
    pub const CYCLEH: u32 = 0xC80;
    pub const TIMEH: u32 = 0xC81;
    /// Non-standard: placed in the custom read/write CSR range (0x7C0-0x7FF)
    /// since the spec leaves the exact numbers up to the implementer.
    pub const TIMERMATCHL: u32 = 0x7C0;
    pub const TIMERMATCHH: u32 = 0x7C1;
}

const MIE_MTIE: u32 = 1 << 7;
const MIP_MTIP: u32 = 1 << 7;

fn width_size(width: Width) -> u32 {
    match width {
        Width::Byte | Width::ByteUnsigned => 1,
        Width::Half | Width::HalfUnsigned => 2,
        Width::Word => 4,
    }
}

fn alu(op: AluOp, a: u32, b: u32) -> u32 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Sll => a << (b & 0x1F),
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::SltU => (a < b) as u32,
        AluOp::Xor => a ^ b,
        AluOp::Srl => a >> (b & 0x1F),
        AluOp::Sra => ((a as i32) >> (b & 0x1F)) as u32,
        AluOp::Or => a | b,
        AluOp::And => a & b,
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::MulH => (((a as i32 as i64) * (b as i32 as i64)) >> 32) as u32,
        AluOp::MulHSU => (((a as i32 as i64) * (b as i64)) >> 32) as u32,
        AluOp::MulHU => (((a as u64) * (b as u64)) >> 32) as u32,
        AluOp::Div => {
            if b == 0 {
                u32::MAX
            } else if a as i32 == i32::MIN && b as i32 == -1 {
                a
            } else {
                ((a as i32).wrapping_div(b as i32)) as u32
            }
        }
        AluOp::DivU => {
            if b == 0 {
                u32::MAX
            } else {
                a / b
            }
        }
        AluOp::Rem => {
            if b == 0 {
                a
            } else if a as i32 == i32::MIN && b as i32 == -1 {
                0
            } else {
                ((a as i32).wrapping_rem(b as i32)) as u32
            }
        }
        AluOp::RemU => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
    }
}

fn branch_taken(op: BranchOp, a: u32, b: u32) -> bool {
    match op {
        BranchOp::Eq => a == b,
        BranchOp::Ne => a != b,
        BranchOp::Lt => (a as i32) < (b as i32),
        BranchOp::Ge => (a as i32) >= (b as i32),
        BranchOp::LtU => a < b,
        BranchOp::GeU => a >= b,
    }
}

/// Outcome of executing one instruction. `Continue(true)` means the
/// instruction already set `pc` itself (a taken jump or branch); the caller
/// must not also advance it by 4.
enum Control {
    Continue(bool),
    Trap { cause: u32, tval: u32 },
    Stop(u32),
}

fn csr_read(state: &CpuState, devices: &mut Devices<'_>, csr: u32) -> u32 {
    match csr {
        csrno::MSTATUS => state.mstatus,
        csrno::MISA => state.misa,
        csrno::MIE => state.mie,
        csrno::MTVEC => state.mtvec,
        csrno::MSCRATCH => state.mscratch,
        csrno::MEPC => state.mepc,
        csrno::MCAUSE => state.mcause,
        csrno::MTVAL => state.mtval,
        csrno::MIP => state.mip,
        csrno::CYCLE | csrno::TIME => state.cyclel,
        csrno::CYCLEH | csrno::TIMEH => state.cycleh,
        csrno::TIMERMATCHL => state.timermatchl,
        csrno::TIMERMATCHH => state.timermatchh,
        _ => mmio::other_csr_read(devices, csr).unwrap_or(0),
    }
}

fn csr_write(state: &mut CpuState, ram: &RamImage, devices: &mut Devices<'_>, csr: u32, value: u32) {
    match csr {
        csrno::MSTATUS => state.mstatus = value,
        csrno::MISA => {} // read-only
        csrno::MIE => state.mie = value,
        csrno::MTVEC => state.mtvec = value,
        csrno::MSCRATCH => state.mscratch = value,
        csrno::MEPC => state.mepc = value,
        csrno::MCAUSE => state.mcause = value,
        csrno::MTVAL => state.mtval = value,
        csrno::MIP => state.mip = value,
        csrno::CYCLE => state.cyclel = value,
        csrno::CYCLEH => state.cycleh = value,
        csrno::TIME | csrno::TIMEH => {} // read-only aliases of the cycle counter
        csrno::TIMERMATCHL => state.timermatchl = value,
        csrno::TIMERMATCHH => state.timermatchh = value,
        _ => mmio::other_csr_write(devices, ram, csr, value),
    }
}

fn load(ram: &RamImage, devices: &mut Devices<'_>, width: Width, addr: u32) -> Result<u32, ()> {
    if ram.contains(addr, width_size(width) as usize) {
        return Ok(match width {
            Width::Byte => ram.read_u8(addr) as i8 as i32 as u32,
            Width::ByteUnsigned => ram.read_u8(addr) as u32,
            Width::Half => ram.read_u16(addr) as i16 as i32 as u32,
            Width::HalfUnsigned => ram.read_u16(addr) as u32,
            Width::Word => ram.read_u32(addr),
        });
    }
    if addr >= MMIO_BASE {
        let raw = mmio::control_load(devices, addr);
        return Ok(match width {
            Width::Byte => raw as u8 as i8 as i32 as u32,
            Width::ByteUnsigned => raw as u8 as u32,
            Width::Half => raw as u16 as i16 as i32 as u32,
            Width::HalfUnsigned => raw as u16 as u32,
            Width::Word => raw,
        });
    }
    Err(())
}

fn store(ram: &mut RamImage, devices: &mut Devices<'_>, width: Width, addr: u32, value: u32) -> Result<(), u32> {
    if addr == SYSCON_ADDR && (value == SYSCON_POWEROFF || value == SYSCON_RESTART) {
        return Err(value);
    }
    if ram.contains(addr, width_size(width) as usize) {
        match width {
            Width::Byte | Width::ByteUnsigned => ram.write_u8(addr, value as u8),
            Width::Half | Width::HalfUnsigned => ram.write_u16(addr, value as u16),
            Width::Word => ram.write_u32(addr, value),
        }
        return Ok(());
    }
    if addr >= MMIO_BASE {
        mmio::control_store(devices, addr, value);
        return Ok(());
    }
    Err(0) // caller turns this into a store access-fault trap
}

fn execute(state: &mut CpuState, ram: &mut RamImage, devices: &mut Devices<'_>, pc: u32, instr: Instruction) -> Control {
    match instr {
        Instruction::Lui { rd, imm } => {
            state.set_reg(rd, imm as u32);
            Control::Continue(false)
        }
        Instruction::Auipc { rd, imm } => {
            state.set_reg(rd, pc.wrapping_add(imm as u32));
            Control::Continue(false)
        }
        Instruction::Jal { rd, imm } => {
            let target = pc.wrapping_add(imm as u32);
            if target & 0x3 != 0 {
                return Control::Trap { cause: cause::INSTRUCTION_MISALIGNED, tval: target };
            }
            state.set_reg(rd, pc.wrapping_add(4));
            state.pc = target;
            Control::Continue(true)
        }
        Instruction::Jalr { rd, rs1, imm } => {
            let target = state.reg(rs1).wrapping_add(imm as u32) & !1u32;
            if target & 0x3 != 0 {
                return Control::Trap { cause: cause::INSTRUCTION_MISALIGNED, tval: target };
            }
            state.set_reg(rd, pc.wrapping_add(4));
            state.pc = target;
            Control::Continue(true)
        }
        Instruction::Branch { op, rs1, rs2, imm } => {
            if branch_taken(op, state.reg(rs1), state.reg(rs2)) {
                let target = pc.wrapping_add(imm as u32);
                if target & 0x3 != 0 {
                    return Control::Trap { cause: cause::INSTRUCTION_MISALIGNED, tval: target };
                }
                state.pc = target;
                return Control::Continue(true);
            }
            Control::Continue(false)
        }
        Instruction::Load { width, rd, rs1, imm } => {
            let addr = state.reg(rs1).wrapping_add(imm as u32);
            match load(ram, devices, width, addr) {
                Ok(value) => {
                    state.set_reg(rd, value);
                    Control::Continue(false)
                }
                Err(()) => Control::Trap { cause: cause::LOAD_ACCESS_FAULT, tval: addr },
            }
        }
        Instruction::Store { width, rs1, rs2, imm } => {
            let addr = state.reg(rs1).wrapping_add(imm as u32);
            match store(ram, devices, width, addr, state.reg(rs2)) {
                Ok(()) => Control::Continue(false),
                Err(0) => Control::Trap { cause: cause::STORE_ACCESS_FAULT, tval: addr },
                Err(syscon) => Control::Stop(syscon),
            }
        }
        Instruction::AluImm { op, rd, rs1, imm } => {
            state.set_reg(rd, alu(op, state.reg(rs1), imm as u32));
            Control::Continue(false)
        }
        Instruction::Alu { op, rd, rs1, rs2 } => {
            state.set_reg(rd, alu(op, state.reg(rs1), state.reg(rs2)));
            Control::Continue(false)
        }
        Instruction::Fence | Instruction::FenceI => Control::Continue(false),
        Instruction::Ecall => {
            let cause = match state.privilege() {
                Privilege::User => cause::ECALL_FROM_U,
                Privilege::Supervisor => cause::ECALL_FROM_S,
                Privilege::Machine => cause::ECALL_FROM_M,
            };
            Control::Trap { cause, tval: 0 }
        }
        Instruction::Ebreak => {
            state.enter_trap(cause::BREAKPOINT, 0, pc);
            Control::Stop(status::BREAKPOINT)
        }
        Instruction::Mret => {
            state.mret();
            Control::Continue(true)
        }
        Instruction::Sret => {
            state.sret();
            Control::Continue(true)
        }
        Instruction::Wfi => {
            state.set_wfi(true);
            Control::Continue(false)
        }
        Instruction::Csr { op, rd, rs1, csr } => {
            let old = csr_read(state, devices, csr);
            let operand = state.reg(rs1);
            let new = match op {
                CsrOp::ReadWrite => operand,
                CsrOp::ReadSet => old | operand,
                CsrOp::ReadClear => old & !operand,
            };
            csr_write(state, ram, devices, csr, new);
            state.set_reg(rd, old);
            Control::Continue(false)
        }
        Instruction::CsrImm { op, rd, uimm, csr } => {
            let old = csr_read(state, devices, csr);
            let new = match op {
                CsrOp::ReadWrite => uimm,
                CsrOp::ReadSet => old | uimm,
                CsrOp::ReadClear => old & !uimm,
            };
            csr_write(state, ram, devices, csr, new);
            state.set_reg(rd, old);
            Control::Continue(false)
        }
        Instruction::Amo { op, rd, rs1, rs2 } => execute_amo(state, ram, op, rd, rs1, rs2),
        Instruction::Illegal => Control::Trap { cause: cause::ILLEGAL_INSTRUCTION, tval: 0 },
    }
}

fn execute_amo(state: &mut CpuState, ram: &mut RamImage, op: AmoOp, rd: usize, rs1: usize, rs2: usize) -> Control {
    let addr = state.reg(rs1);
    if !ram.contains(addr, 4) {
        return Control::Trap { cause: cause::LOAD_ACCESS_FAULT, tval: addr };
    }
    match op {
        AmoOp::LrW => {
            let value = ram.read_u32(addr);
            state.set_reservation(Some(addr));
            state.set_reg(rd, value);
        }
        AmoOp::ScW => {
            if state.reservation() == Some(addr) {
                ram.write_u32(addr, state.reg(rs2));
                state.set_reg(rd, 0);
            } else {
                state.set_reg(rd, 1);
            }
            state.clear_reservation();
        }
        _ => {
            let old = ram.read_u32(addr);
            let operand = state.reg(rs2);
            let new = match op {
                AmoOp::Swap => operand,
                AmoOp::Add => old.wrapping_add(operand),
                AmoOp::Xor => old ^ operand,
                AmoOp::And => old & operand,
                AmoOp::Or => old | operand,
                AmoOp::Min => (old as i32).min(operand as i32) as u32,
                AmoOp::Max => (old as i32).max(operand as i32) as u32,
                AmoOp::MinU => old.min(operand),
                AmoOp::MaxU => old.max(operand),
                AmoOp::LrW | AmoOp::ScW => unreachable!(),
            };
            ram.write_u32(addr, new);
            state.set_reg(rd, old);
            state.clear_reservation();
        }
    }
    Control::Continue(false)
}

fn timer_interrupt_ready(state: &CpuState) -> bool {
    state.mie_enabled() && state.mie & MIE_MTIE != 0 && state.mip & MIP_MTIP != 0
}

/// Run at most `budget` instructions. Returns the status code from the
/// `{Normal, WfiIdle, Breakpoint, Restart, PowerOff, Fault}` set and the
/// number of instructions actually retired.
pub fn run_budget(state: &mut CpuState, ram: &mut RamImage, devices: &mut Devices<'_>, budget: u32) -> (u32, u32) {
    let mut retired = 0;
    while retired < budget {
        let cycle = state.cycle().wrapping_add(1);
        state.set_cycle(cycle);
        if cycle >= state.timermatch() {
            state.mip |= MIP_MTIP;
        }

        if timer_interrupt_ready(state) {
            let pc = state.pc;
            state.enter_trap(cause::MACHINE_TIMER, 0, pc);
            retired += 1;
            continue;
        }

        if state.wfi_pending() {
            return (status::WFI_IDLE, retired);
        }

        let pc = state.pc;
        if !ram.contains(pc, 4) {
            state.enter_trap(cause::INSTRUCTION_ACCESS_FAULT, pc, pc);
            retired += 1;
            continue;
        }
        let word = ram.read_u32(pc);
        let instr = decode::decode(word);
        match execute(state, ram, devices, pc, instr) {
            Control::Continue(false) => state.pc = pc.wrapping_add(4),
            Control::Continue(true) => {}
            Control::Trap { cause, tval } => state.enter_trap(cause, tval, pc),
            Control::Stop(code) => return (code, retired + 1),
        }
        retired += 1;
    }
    (status::NORMAL, retired)
}
