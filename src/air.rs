//! Assembly intermediate representation.
//!
//! The parser lowers each source line to an [`AirStmt`] with its byte
//! address already assigned; [`Air::backpatch`] then resolves forward label
//! references, and [`Air::assemble`] emits the flat little-endian image.

use miette::{bail, Result};

use crate::isa::{self, Opcode, MEMORY_SIZE};
use crate::symbol::{Label, LabelTable, Register};

/// The parsed program: statements plus the label table built in pass 1.
pub struct Air {
    ast: Vec<AsmLine>,
    labels: LabelTable,
}

impl Air {
    pub fn new() -> Self {
        Air {
            ast: Vec::new(),
            labels: LabelTable::default(),
        }
    }

    /// Record a label at an address. Returns false if the name was taken.
    pub fn insert_label(&mut self, name: &str, addr: u16) -> bool {
        self.labels.insert(name.to_string(), addr).is_none()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn add_stmt(&mut self, line: u32, addr: u16, stmt: AirStmt) {
        self.ast.push(AsmLine { line, addr, stmt });
    }

    pub fn get(&self, idx: usize) -> &AsmLine {
        &self.ast[idx]
    }

    pub fn len(&self) -> usize {
        self.ast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ast.is_empty()
    }

    /// Fill remaining label references from the symbol table.
    pub fn backpatch(&mut self) -> Result<()> {
        for stmt in self.ast.iter_mut() {
            stmt.backpatch(&self.labels)?;
        }
        Ok(())
    }

    /// Emit the byte image, zero-filled up to the highest emitted address.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        let mut image = Vec::new();
        for stmt in &self.ast {
            let bytes = stmt.emit();
            let start = stmt.addr as usize;
            let end = start + bytes.len();
            if end > MEMORY_SIZE {
                bail!(
                    code = "asm::too_large",
                    "Statement on line {} runs past the end of the address space",
                    stmt.line
                );
            }
            if image.len() < end {
                image.resize(end, 0);
            }
            image[start..end].copy_from_slice(&bytes);
        }
        Ok(image)
    }
}

impl Default for Air {
    fn default() -> Self {
        Air::new()
    }
}

/// A single statement with its source line and assigned byte address.
#[derive(PartialEq, Eq, Debug)]
pub struct AsmLine {
    pub line: u32,
    pub addr: u16,
    pub stmt: AirStmt,
}

/// One statement, grouped by operand shape. Immediates are stored as the
/// raw field bit pattern; range checking happened in the parser.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AirStmt {
    /// `NOP`, or a register copy when the operands differ
    Nop { dest: Register, src: Register },
    /// Load a sign-extended 7-bit immediate
    MovImm { dest: Register, imm: u16 },
    /// Load the word at the address held in a register
    LoadInd { dest: Register, addr: Register },
    /// Load the word at an absolute address
    LoadDir { dest: Register, addr: Label },
    /// Store through the address held in a register
    StoreInd { addr: Register, src: Register },
    /// Store to an absolute address
    StoreDir { addr: Label, src: Register },
    /// Three-register ALU operation
    Reg3 {
        op: Opcode,
        dest: Register,
        a: Register,
        b: Register,
    },
    /// Register/immediate ALU operation
    RegImm {
        op: Opcode,
        dest: Register,
        src: Register,
        imm: u16,
    },
    /// Bitwise complement
    Not { dest: Register, src: Register },
    /// INC or DEC of a single register
    Step { op: Opcode, dest: Register },
    /// Flag-only register comparison
    Cmp { a: Register, b: Register },
    /// Flag-only comparison against a sign-extended immediate
    CmpImm { a: Register, imm: u16 },
    /// Absolute jump, conditional jump, or call
    Jump { op: Opcode, addr: Label },
    Push { src: Register },
    Pop { dest: Register },
    Return,
    Halt,
    /// `.word`
    RawWord { val: u16 },
    /// `.byte`
    RawByte { val: u8 },
    /// `.ascii`
    Bytes { bytes: Vec<u8> },
}

impl AirStmt {
    /// Opcode of an instruction statement; data directives have none.
    pub fn opcode(&self) -> Option<Opcode> {
        let op = match self {
            AirStmt::Nop { .. } => Opcode::Nop,
            AirStmt::MovImm { .. } => Opcode::Movi,
            AirStmt::LoadInd { .. } => Opcode::LoadInd,
            AirStmt::LoadDir { .. } => Opcode::LoadDir,
            AirStmt::StoreInd { .. } => Opcode::StoreInd,
            AirStmt::StoreDir { .. } => Opcode::StoreDir,
            AirStmt::Reg3 { op, .. }
            | AirStmt::RegImm { op, .. }
            | AirStmt::Step { op, .. }
            | AirStmt::Jump { op, .. } => *op,
            AirStmt::Not { .. } => Opcode::Not,
            AirStmt::Cmp { .. } => Opcode::Cmp,
            AirStmt::CmpImm { .. } => Opcode::Cmpi,
            AirStmt::Push { .. } => Opcode::Push,
            AirStmt::Pop { .. } => Opcode::Pop,
            AirStmt::Return => Opcode::Ret,
            AirStmt::Halt => Opcode::Halt,
            AirStmt::RawWord { .. } | AirStmt::RawByte { .. } | AirStmt::Bytes { .. } => {
                return None
            }
        };
        Some(op)
    }

    /// Bytes this statement occupies in the image. Drives pass-1 address
    /// assignment, so it must agree with [`AirStmt::emit`].
    pub fn size(&self) -> usize {
        match self {
            AirStmt::RawByte { .. } => 1,
            AirStmt::RawWord { .. } => 2,
            AirStmt::Bytes { bytes } => bytes.len(),
            _ => match self.opcode() {
                Some(op) if op.has_operand_word() => 4,
                _ => 2,
            },
        }
    }

    /// Little-endian bytes of this statement. Label operands must have
    /// been backpatched.
    pub fn emit(&self) -> Vec<u8> {
        let reg = |r: &Register| *r as u16;
        let word = match self {
            AirStmt::Nop { dest, src } => isa::encode(Opcode::Nop, reg(dest), reg(src), 0),
            AirStmt::MovImm { dest, imm } => isa::encode_imm7(Opcode::Movi, reg(dest), *imm),
            AirStmt::LoadInd { dest, addr } => {
                isa::encode(Opcode::LoadInd, reg(dest), reg(addr), 0)
            }
            AirStmt::StoreInd { addr, src } => {
                isa::encode(Opcode::StoreInd, reg(addr), reg(src), 0)
            }
            AirStmt::Reg3 { op, dest, a, b } => isa::encode(*op, reg(dest), reg(a), reg(b)),
            AirStmt::RegImm { op, dest, src, imm } => isa::encode(*op, reg(dest), reg(src), *imm),
            AirStmt::Not { dest, src } => isa::encode(Opcode::Not, reg(dest), reg(src), 0),
            AirStmt::Step { op, dest } => isa::encode(*op, reg(dest), 0, 0),
            AirStmt::Cmp { a, b } => isa::encode(Opcode::Cmp, 0, reg(a), reg(b)),
            AirStmt::CmpImm { a, imm } => isa::encode(Opcode::Cmpi, 0, reg(a), *imm),
            AirStmt::Push { src } => isa::encode(Opcode::Push, 0, reg(src), 0),
            AirStmt::Pop { dest } => isa::encode(Opcode::Pop, reg(dest), 0, 0),
            AirStmt::Return => isa::encode(Opcode::Ret, 0, 0, 0),
            AirStmt::Halt => isa::encode(Opcode::Halt, 0, 0, 0),

            AirStmt::LoadDir { dest, addr } => {
                let word = isa::encode(Opcode::LoadDir, reg(dest), 0, 0);
                return two_words(word, addr.addr());
            }
            AirStmt::StoreDir { addr, src } => {
                let word = isa::encode(Opcode::StoreDir, 0, reg(src), 0);
                return two_words(word, addr.addr());
            }
            AirStmt::Jump { op, addr } => {
                return two_words(isa::encode(*op, 0, 0, 0), addr.addr());
            }

            AirStmt::RawWord { val } => return val.to_le_bytes().to_vec(),
            AirStmt::RawByte { val } => return vec![*val],
            AirStmt::Bytes { bytes } => return bytes.clone(),
        };
        word.to_le_bytes().to_vec()
    }
}

fn two_words(opcode_word: u16, addr: u16) -> Vec<u8> {
    let mut bytes = opcode_word.to_le_bytes().to_vec();
    bytes.extend_from_slice(&addr.to_le_bytes());
    bytes
}

impl AsmLine {
    /// Fill this statement's label reference from the symbol table.
    fn backpatch(&mut self, table: &LabelTable) -> Result<()> {
        let label = match &mut self.stmt {
            AirStmt::LoadDir { addr, .. }
            | AirStmt::StoreDir { addr, .. }
            | AirStmt::Jump { addr, .. } => addr,
            _ => return Ok(()),
        };
        *label = label.clone().filled(table, self.line)?;
        Ok(())
    }

    pub fn emit(&self) -> Vec<u8> {
        self.stmt.emit()
    }
}
