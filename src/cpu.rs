//! The BR16 processor: register file, PC, SP, flags, and the
//! fetch–decode–execute loop.
//!
//! The CPU owns no memory; `step` and `run` borrow a [`Memory`] for the
//! duration of the call. Execution is strictly sequential, one instruction
//! per step, until a HALT or an unknown opcode sets the halted bit.

use std::fmt;
use std::io::Write;

use crate::alu::{self, Flags};
use crate::isa::{self, Opcode, PROGRAM_START, STACK_END};
use crate::mem::Memory;

pub struct Cpu {
    /// General-purpose registers R0..R7
    reg: [u16; 8],
    pc: u16,
    sp: u16,
    flags: Flags,
    halted: bool,
    /// Monotonic count of executed instructions
    executed: u64,
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Cpu {
            reg: [0; 8],
            pc: 0,
            sp: 0,
            flags: Flags::default(),
            halted: false,
            executed: 0,
        };
        cpu.reset();
        cpu
    }

    /// Registers cleared, PC at the code segment base, SP at the top of
    /// memory, flags clear, not halted, count zeroed.
    pub fn reset(&mut self) {
        self.reg = [0; 8];
        self.pc = PROGRAM_START;
        self.sp = STACK_END;
        self.flags = Flags::default();
        self.halted = false;
        self.executed = 0;
    }

    pub fn reg(&self, r: usize) -> u16 {
        self.reg[r & 0x7]
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn instruction_count(&self) -> u64 {
        self.executed
    }

    /// Cooperative stop; `run` returns after the current instruction.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Step until halted.
    pub fn run<W: Write>(&mut self, mem: &mut Memory<W>) {
        while !self.halted {
            self.step(mem);
        }
    }

    /// Execute a single instruction. No-op once halted.
    pub fn step<W: Write>(&mut self, mem: &mut Memory<W>) {
        if self.halted {
            return;
        }

        let current_pc = self.pc;
        let word = mem.read_word(current_pc);
        self.pc = current_pc.wrapping_add(2);

        match Opcode::from_code(isa::opcode(word)) {
            Some(op) => {
                // Two-word instructions carry their absolute address in the
                // next word; PC moves past it before the opcode acts.
                let operand = if op.has_operand_word() {
                    let addr = mem.read_word(self.pc);
                    self.pc = self.pc.wrapping_add(2);
                    addr
                } else {
                    0
                };
                self.execute(op, word, operand, mem);
            }
            None => {
                eprintln!(
                    "Unknown opcode 0x{:02x} at 0x{current_pc:04x}",
                    isa::opcode(word)
                );
                self.halted = true;
            }
        }

        self.executed += 1;
    }

    fn execute<W: Write>(&mut self, op: Opcode, word: u16, operand: u16, mem: &mut Memory<W>) {
        let rd = isa::rd(word) as usize;
        let rs = isa::rs(word) as usize;
        let rt = (isa::rt(word) & 0x7) as usize;
        let imm4 = isa::imm4(word);
        let imm7 = isa::imm7(word);

        match op {
            Opcode::Nop => {
                // Doubles as a register copy when the fields differ
                if rd != rs {
                    self.reg[rd] = self.reg[rs];
                }
            }
            Opcode::Movi => self.reg[rd] = isa::sign_extend(imm7, 7),
            Opcode::LoadInd => self.reg[rd] = mem.read_word(self.reg[rs]),
            Opcode::LoadDir => self.reg[rd] = mem.read_word(operand),
            Opcode::StoreInd => mem.write_word(self.reg[rd], self.reg[rs]),
            Opcode::StoreDir => mem.write_word(operand, self.reg[rs]),

            Opcode::Add => self.alu_to(rd, alu::add(self.reg[rs], self.reg[rt])),
            Opcode::Addi => self.alu_to(rd, alu::add(self.reg[rs], isa::sign_extend(imm4, 4))),
            Opcode::Sub => self.alu_to(rd, alu::sub(self.reg[rs], self.reg[rt])),
            Opcode::Subi => self.alu_to(rd, alu::sub(self.reg[rs], isa::sign_extend(imm4, 4))),
            Opcode::Mul => self.alu_to(rd, alu::mul(self.reg[rs], self.reg[rt])),
            Opcode::Div => self.alu_to(rd, alu::div(self.reg[rs], self.reg[rt])),
            Opcode::Inc => self.alu_to(rd, alu::add(self.reg[rd], 1)),
            Opcode::Dec => self.alu_to(rd, alu::sub(self.reg[rd], 1)),

            Opcode::And => self.alu_to(rd, alu::and(self.reg[rs], self.reg[rt])),
            Opcode::Andi => self.alu_to(rd, alu::and(self.reg[rs], imm4)),
            Opcode::Or => self.alu_to(rd, alu::or(self.reg[rs], self.reg[rt])),
            Opcode::Ori => self.alu_to(rd, alu::or(self.reg[rs], imm4)),
            Opcode::Xor => self.alu_to(rd, alu::xor(self.reg[rs], self.reg[rt])),
            Opcode::Not => self.alu_to(rd, alu::not(self.reg[rs])),

            Opcode::Shl => self.alu_to(rd, alu::shl(self.reg[rs], self.reg[rt])),
            Opcode::Shli => self.alu_to(rd, alu::shl(self.reg[rs], imm4)),
            Opcode::Shr => self.alu_to(rd, alu::shr(self.reg[rs], self.reg[rt])),
            Opcode::Shri => self.alu_to(rd, alu::shr(self.reg[rs], imm4)),

            Opcode::Cmp => self.flags = alu::compare(self.reg[rs], self.reg[rt]),
            Opcode::Cmpi => self.flags = alu::compare(self.reg[rs], isa::sign_extend(imm4, 4)),

            Opcode::Jmp => self.pc = operand,
            Opcode::Jz => self.branch(operand, self.flags.zero()),
            Opcode::Jnz => self.branch(operand, !self.flags.zero()),
            Opcode::Jc => self.branch(operand, self.flags.carry()),
            Opcode::Jnc => self.branch(operand, !self.flags.carry()),
            Opcode::Jn => self.branch(operand, self.flags.negative()),
            Opcode::Call => {
                // PC already points past the operand: that is the return address
                self.push(mem, self.pc);
                self.pc = operand;
            }
            Opcode::Ret => self.pc = self.pop(mem),

            Opcode::Push => self.push(mem, self.reg[rs]),
            Opcode::Pop => self.reg[rd] = self.pop(mem),

            Opcode::Halt => self.halted = true,
        }
    }

    #[inline]
    fn alu_to(&mut self, rd: usize, (result, flags): (u16, Flags)) {
        self.reg[rd] = result;
        self.flags = flags;
    }

    #[inline]
    fn branch(&mut self, target: u16, taken: bool) {
        if taken {
            self.pc = target;
        }
    }

    /// Decrement SP by a word, then write.
    fn push<W: Write>(&mut self, mem: &mut Memory<W>, value: u16) {
        self.sp = self.sp.wrapping_sub(2);
        mem.write_word(self.sp, value);
    }

    /// Read at SP, then increment by a word.
    fn pop<W: Write>(&mut self, mem: &mut Memory<W>) -> u16 {
        let value = mem.read_word(self.sp);
        self.sp = self.sp.wrapping_add(2);
        value
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.reg.iter().enumerate() {
            write!(f, "R{i}=0x{value:04x} ")?;
        }
        write!(f, "PC=0x{:04x} SP=0x{:04x}", self.pc, self.sp)
    }
}

/// Render the instruction at `addr` as text, returning the line and the
/// number of bytes it occupies (2, or 4 with an address operand).
pub fn disassemble<W: Write>(mem: &Memory<W>, addr: u16) -> (String, u16) {
    let word = mem.read_word(addr);
    let code = isa::opcode(word);

    let Some(op) = Opcode::from_code(code) else {
        return (format!("0x{addr:04x}: {word:04x}  ??? (0x{code:02x})"), 2);
    };

    let rd = isa::rd(word);
    let rs = isa::rs(word);
    let rt = isa::rt(word) & 0x7;
    let imm4 = isa::sign_extend(isa::imm4(word), 4) as i16;
    let uimm4 = isa::imm4(word);
    let imm7 = isa::sign_extend(isa::imm7(word), 7) as i16;
    let operand = mem.read_word(addr.wrapping_add(2));

    let mnemonic = op.mnemonic();
    use crate::isa::Form;
    let (operands, len) = match op.form() {
        Form::Nop => {
            if rd == rs {
                (String::new(), 2)
            } else {
                (format!(" R{rd}, R{rs}"), 2)
            }
        }
        Form::RdImm7 => (format!(" R{rd}, {imm7}"), 2),
        Form::RdIndRs => (format!(" R{rd}, [R{rs}]"), 2),
        Form::RdAbs => (format!(" R{rd}, 0x{operand:04x}"), 4),
        Form::IndRdRs => (format!(" [R{rd}], R{rs}"), 2),
        Form::AbsRs => (format!(" 0x{operand:04x}, R{rs}"), 4),
        Form::Reg3 => (format!(" R{rd}, R{rs}, R{rt}"), 2),
        Form::RegImmS => (format!(" R{rd}, R{rs}, {imm4}"), 2),
        Form::RegImmU => (format!(" R{rd}, R{rs}, {uimm4}"), 2),
        Form::RdRs => (format!(" R{rd}, R{rs}"), 2),
        Form::Rd => (format!(" R{rd}"), 2),
        Form::Rs => (format!(" R{rs}"), 2),
        Form::RsRt => (format!(" R{rs}, R{rt}"), 2),
        Form::RsImm => (format!(" R{rs}, {imm4}"), 2),
        Form::Abs => (format!(" 0x{operand:04x}"), 4),
        Form::None => (String::new(), 2),
    };

    (format!("0x{addr:04x}: {word:04x}  {mnemonic}{operands}"), len)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::{encode, encode_imm7};

    fn machine() -> (Cpu, Memory<Vec<u8>>) {
        (Cpu::new(), Memory::with_output(Vec::new()))
    }

    /// Place words at address 0 and return the memory.
    fn load(mem: &mut Memory<Vec<u8>>, words: &[u16]) {
        let mut addr = 0u16;
        for w in words {
            mem.write_word(addr, *w);
            addr += 2;
        }
    }

    #[test]
    fn reset_contract() {
        let (mut cpu, mut mem) = machine();
        load(&mut mem, &[encode_imm7(Opcode::Movi, 0, 42), encode(Opcode::Halt, 0, 0, 0)]);
        cpu.run(&mut mem);
        assert!(cpu.halted());
        assert_eq!(cpu.instruction_count(), 2);

        cpu.reset();
        let snapshot = (cpu.reg, cpu.pc, cpu.sp, cpu.flags, cpu.halted, cpu.executed);
        cpu.reset();
        assert_eq!(
            snapshot,
            (cpu.reg, cpu.pc, cpu.sp, cpu.flags, cpu.halted, cpu.executed)
        );
        assert_eq!(cpu.pc(), 0x0000);
        assert_eq!(cpu.sp(), 0xFFFF);
        assert_eq!(cpu.reg(3), 0);
        assert!(!cpu.halted());
    }

    #[test]
    fn movi_sign_extends() {
        let (mut cpu, mut mem) = machine();
        load(&mut mem, &[encode_imm7(Opcode::Movi, 1, (-5i16 as u16) & 0x7F)]);
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(1) as i16, -5);
    }

    #[test]
    fn nop_move_overload() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode_imm7(Opcode::Movi, 2, 9),
                // Same fields: plain no-op
                encode(Opcode::Nop, 1, 1, 0),
                // Different fields: copy R2 into R5
                encode(Opcode::Nop, 5, 2, 0),
            ],
        );
        cpu.step(&mut mem);
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(1), 0);
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(5), 9);
    }

    #[test]
    fn loads_and_stores() {
        let (mut cpu, mut mem) = machine();
        mem.write_word(0x8000, 0xBEEF);
        load(
            &mut mem,
            &[
                // R1 <- mem[0x8000] direct
                encode(Opcode::LoadDir, 1, 0, 0),
                0x8000,
                // Build 0x8000 in R2
                encode_imm7(Opcode::Movi, 2, 0x10),
                encode(Opcode::Shli, 2, 2, 11),
                // mem[R2] <- R1
                encode(Opcode::StoreInd, 2, 1, 0),
                // R3 <- mem[R2]
                encode(Opcode::LoadInd, 3, 2, 0),
                // mem[0x9000] <- R3 direct
                encode(Opcode::StoreDir, 0, 3, 0),
                0x9000,
            ],
        );
        for _ in 0..6 {
            cpu.step(&mut mem);
        }
        assert_eq!(cpu.reg(1), 0xBEEF);
        assert_eq!(cpu.reg(2), 0x8000);
        assert_eq!(cpu.reg(3), 0xBEEF);
        assert_eq!(mem.read_word(0x9000), 0xBEEF);
    }

    #[test]
    fn immediate_extension_rules() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode_imm7(Opcode::Movi, 1, 8),
                // ADDI sign-extends: 8 + (-1) = 7
                encode(Opcode::Addi, 2, 1, 0xF),
                // ANDI zero-extends: 7 & 0xF = 7
                encode(Opcode::Andi, 3, 2, 0xF),
                // ORI zero-extends
                encode(Opcode::Ori, 4, 3, 0x8),
            ],
        );
        for _ in 0..4 {
            cpu.step(&mut mem);
        }
        assert_eq!(cpu.reg(2), 7);
        assert_eq!(cpu.reg(3), 7);
        assert_eq!(cpu.reg(4), 0xF);
    }

    #[test]
    fn inc_dec_use_alu_flags() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode(Opcode::Dec, 1, 0, 0),
                encode(Opcode::Inc, 1, 0, 0),
            ],
        );
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(1), 0xFFFF);
        assert!(cpu.flags().negative() && cpu.flags().carry());
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(1), 0);
        assert!(cpu.flags().zero() && cpu.flags().carry());
    }

    #[test]
    fn div_by_zero_continues() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode_imm7(Opcode::Movi, 1, 7),
                encode(Opcode::Div, 0, 1, 2),
                encode_imm7(Opcode::Movi, 3, 1),
            ],
        );
        cpu.step(&mut mem);
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(0), 0xFFFF);
        assert!(cpu.flags().overflow());
        assert!(!cpu.halted());
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(3), 1);
    }

    #[test]
    fn branch_not_taken_lands_after_operand() {
        let (mut cpu, mut mem) = machine();
        // Flags clear: JZ is not taken, PC must end up at current_pc + 4
        load(&mut mem, &[encode(Opcode::Jz, 0, 0, 0), 0x0040]);
        cpu.step(&mut mem);
        assert_eq!(cpu.pc(), 0x0004);
    }

    #[test]
    fn branch_taken_overwrites_pc() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                // CMP R0, R0 sets Zero
                encode(Opcode::Cmp, 0, 0, 0),
                encode(Opcode::Jz, 0, 0, 0),
                0x0040,
            ],
        );
        cpu.step(&mut mem);
        cpu.step(&mut mem);
        assert_eq!(cpu.pc(), 0x0040);
    }

    #[test]
    fn jmp_is_unconditional() {
        let (mut cpu, mut mem) = machine();
        load(&mut mem, &[encode(Opcode::Jmp, 0, 0, 0), 0x0100]);
        cpu.step(&mut mem);
        assert_eq!(cpu.pc(), 0x0100);
    }

    #[test]
    fn call_pushes_return_address() {
        let (mut cpu, mut mem) = machine();
        load(&mut mem, &[encode(Opcode::Call, 0, 0, 0), 0x0020]);
        mem.write_word(0x0020, encode(Opcode::Ret, 0, 0, 0));
        cpu.step(&mut mem);
        assert_eq!(cpu.pc(), 0x0020);
        assert_eq!(cpu.sp(), 0xFFFD);
        assert_eq!(mem.read_word(0xFFFD), 0x0004);
        cpu.step(&mut mem);
        assert_eq!(cpu.pc(), 0x0004);
        assert_eq!(cpu.sp(), 0xFFFF);
    }

    #[test]
    fn push_pop_roundtrip() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode_imm7(Opcode::Movi, 1, 0x2A),
                encode(Opcode::Push, 0, 1, 0),
                encode(Opcode::Pop, 4, 0, 0),
            ],
        );
        cpu.step(&mut mem);
        cpu.step(&mut mem);
        assert_eq!(cpu.sp(), 0xFFFD);
        cpu.step(&mut mem);
        assert_eq!(cpu.reg(4), 0x2A);
        assert_eq!(cpu.sp(), 0xFFFF);
    }

    #[test]
    fn non_alu_instructions_leave_flags_alone() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                // CMP R0, R0 sets Zero; nothing below may change it
                encode(Opcode::Cmp, 0, 0, 0),
                encode_imm7(Opcode::Movi, 1, 5),
                encode(Opcode::Push, 0, 1, 0),
                encode(Opcode::Pop, 2, 0, 0),
                encode(Opcode::Nop, 3, 1, 0),
            ],
        );
        cpu.step(&mut mem);
        let flags = cpu.flags();
        for _ in 0..4 {
            cpu.step(&mut mem);
        }
        assert_eq!(cpu.flags(), flags);
    }

    #[test]
    fn halt_sticks() {
        let (mut cpu, mut mem) = machine();
        load(&mut mem, &[encode(Opcode::Halt, 0, 0, 0)]);
        cpu.step(&mut mem);
        assert!(cpu.halted());
        let count = cpu.instruction_count();
        cpu.step(&mut mem);
        cpu.step(&mut mem);
        assert_eq!(cpu.instruction_count(), count);
    }

    #[test]
    fn unknown_opcode_halts() {
        let (mut cpu, mut mem) = machine();
        // 0x0F is unassigned
        load(&mut mem, &[0x0F << 10]);
        cpu.step(&mut mem);
        assert!(cpu.halted());
        assert_eq!(cpu.instruction_count(), 1);
    }

    #[test]
    fn writes_to_code_are_visible_to_fetch() {
        let (mut cpu, mut mem) = machine();
        load(
            &mut mem,
            &[
                // Build HALT's encoding (0x2000) and store it over the
                // next instruction slot
                encode_imm7(Opcode::Movi, 1, 0x20),
                encode(Opcode::Shli, 1, 1, 8),
                // mem[0x0008] <- R1 (= HALT word)
                encode(Opcode::StoreDir, 0, 1, 0),
                0x0008,
                0x0000, // will be overwritten before fetch
            ],
        );
        cpu.run(&mut mem);
        assert!(cpu.halted());
        assert_eq!(cpu.instruction_count(), 4);
    }

    #[test]
    fn disassembly_lengths_and_text() {
        let (_, mut mem) = machine();
        load(
            &mut mem,
            &[
                encode(Opcode::Jz, 0, 0, 0),
                0x0020,
                encode(Opcode::Add, 1, 2, 3),
                encode_imm7(Opcode::Movi, 4, (-3i16 as u16) & 0x7F),
            ],
        );
        let (text, len) = disassemble(&mem, 0);
        assert_eq!(len, 4);
        assert!(text.contains("JZ 0x0020"));

        let (text, len) = disassemble(&mem, 4);
        assert_eq!(len, 2);
        assert!(text.contains("ADD R1, R2, R3"));

        let (text, _) = disassemble(&mem, 6);
        assert!(text.contains("MOVI R4, -3"));
    }
}
