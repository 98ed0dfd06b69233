/*! Wire format of bytecode programs.

```text
offset  size  field
     0     4  magic, "RIFT"
     4     4  endianness marker, 0x01020304 in the writer's byte order
     8     4  format version
    12     4  flags
    16     4  instruction count
    20     4  group count
    24     4  pattern length, including the terminating nul, 0 if absent
    28   20n  instructions
     ..    ..  pattern, nul-terminated
     ..     4  class pool length
     ..    ..  class pool
```

Every instruction is an opcode byte, three padding bytes and four 32-bit
operand words. All the 32-bit fields use the byte order recorded by the
marker, readers swap them when it differs from their own.
*/

use bstr::ByteSlice;
use log::debug;

use crate::automaton::StateFlags;
use crate::bytecode::{ClassPool, Instr, Program};
use crate::errors::Error;
use crate::flags::Flags;

/// Magic bytes at the start of every serialized program.
pub const MAGIC: &[u8; 4] = b"RIFT";

/// Current version of the format.
pub const VERSION: u32 = 1;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 28;

/// Size of each instruction in bytes.
pub const INSTR_SIZE: usize = 20;

const MARKER: u32 = 0x01020304;

/// Byte order of the 32-bit fields of a serialized program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The other byte order.
    pub fn swapped(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    fn encode(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    fn decode(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

pub(super) fn write(program: &Program, order: ByteOrder) -> Result<Vec<u8>, Error> {
    let pattern_len = match program.pattern() {
        Some(pattern) => len_u32(pattern.len() + 1)?,
        None => 0,
    };
    let classes = program.classes().as_str();

    let mut out = Vec::with_capacity(
        HEADER_SIZE
            + program.len() * INSTR_SIZE
            + pattern_len as usize
            + 4
            + classes.len(),
    );

    let put = |out: &mut Vec<u8>, value: u32| out.extend_from_slice(&order.encode(value));

    out.extend_from_slice(MAGIC);
    put(&mut out, MARKER);
    put(&mut out, VERSION);
    put(&mut out, program.flags().bits());
    put(&mut out, len_u32(program.len())?);
    put(&mut out, len_u32(program.group_count())?);
    put(&mut out, pattern_len);

    for instr in program.instructions() {
        out.push(instr.opcode());
        out.extend_from_slice(&[0, 0, 0]);
        for word in encode_operands(instr) {
            put(&mut out, word);
        }
    }

    if let Some(pattern) = program.pattern() {
        out.extend_from_slice(pattern.as_bytes());
        out.push(0);
    }

    put(&mut out, len_u32(classes.len())?);
    out.extend_from_slice(classes.as_bytes());

    debug!(
        "serialized bytecode program: {} instructions, {} bytes, {:?}",
        program.len(),
        out.len(),
        order
    );

    Ok(out)
}

pub(super) fn read(bytes: &[u8], max_groups: usize) -> Result<Program, Error> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::invalid_bytecode("truncated header"));
    }
    if &bytes[..4] != MAGIC {
        return Err(Error::invalid_bytecode("not a bytecode program"));
    }

    let marker: [u8; 4] = [bytes[4], bytes[5], bytes[6], bytes[7]];
    let order = if ByteOrder::Little.decode(marker) == MARKER {
        ByteOrder::Little
    } else if ByteOrder::Big.decode(marker) == MARKER {
        ByteOrder::Big
    } else {
        return Err(Error::invalid_bytecode("invalid endianness marker"));
    };

    let mut reader = Reader { bytes, pos: 8, order };

    let version = reader.u32()?;
    if version == 0 || version > VERSION {
        return Err(Error::invalid_bytecode(format!(
            "unsupported bytecode version {}",
            version
        )));
    }

    let flags = Flags::from_bits(reader.u32()?)
        .ok_or_else(|| Error::invalid_bytecode("unknown flags"))?;
    let count = reader.u32()? as usize;
    let group_count = reader.u32()? as usize;
    let pattern_len = reader.u32()? as usize;

    if group_count > max_groups {
        return Err(Error::invalid_bytecode(format!(
            "program declares {} capture groups, the maximum is {}",
            group_count, max_groups
        )));
    }

    let body_len = count
        .checked_mul(INSTR_SIZE)
        .ok_or_else(|| Error::invalid_bytecode("too many instructions"))?;
    if reader.remaining() < body_len {
        return Err(Error::invalid_bytecode("truncated instructions"));
    }

    let mut program = Program::with_capacity(count);
    program.set_group_count(group_count);
    program.set_flags(flags);

    for _ in 0..count {
        let opcode = reader.take(4)?[0];
        let words = [reader.u32()?, reader.u32()?, reader.u32()?, reader.u32()?];
        program.push(decode_instr(opcode, words)?)?;
    }

    let mut declared_groups = 0;

    if pattern_len > 0 {
        let raw = reader.take(pattern_len)?;
        let nul = raw
            .find_byte(0)
            .ok_or_else(|| Error::invalid_bytecode("pattern is not nul-terminated"))?;
        let pattern = raw[..nul]
            .to_str()
            .map_err(|_| Error::invalid_bytecode("pattern is not valid UTF-8"))?;
        program.set_pattern(Some(pattern));
        if let Ok(tree) = crate::re::parse(pattern, flags) {
            declared_groups = tree.group_count();
            program.set_group_names(tree.group_names().to_vec());
        }
    }

    // Groups that no instruction refers to are only legitimate when the
    // pattern declares them, as in `(a){0}b`.
    let referenced_groups = program
        .instructions()
        .iter()
        .filter_map(|instr| match *instr {
            Instr::SaveStart(g) | Instr::SaveEnd(g) | Instr::Backref { group: g, .. } => {
                Some(g as usize)
            }
            _ => None,
        })
        .max()
        .unwrap_or(0);

    if group_count > referenced_groups.max(declared_groups) {
        return Err(Error::invalid_bytecode(format!(
            "program declares {} capture groups but uses {}",
            group_count, referenced_groups
        )));
    }

    let pool_len = reader.u32()? as usize;
    let pool = reader
        .take(pool_len)?
        .to_str()
        .map_err(|_| Error::invalid_bytecode("class pool is not valid UTF-8"))?;

    let mut classes = ClassPool::from_data(pool.to_string());
    for instr in program.instructions() {
        if let Instr::MatchClass { offset, len } = *instr {
            classes.register(offset, len)?;
        }
    }
    program.set_classes(classes);

    if reader.remaining() > 0 {
        return Err(Error::invalid_bytecode("trailing bytes after program"));
    }

    debug!(
        "deserialized bytecode program: {} instructions, {:?}",
        program.len(),
        order
    );

    Ok(program)
}

fn len_u32(len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| Error::limit_exceeded("program too large to serialize"))
}

fn encode_operands(instr: &Instr) -> [u32; 4] {
    match *instr {
        Instr::Nop | Instr::Accept | Instr::Fail => [0; 4],
        Instr::MatchChar { c, case_insensitive } => {
            [c as u32, case_insensitive as u32, 0, 0]
        }
        Instr::MatchClass { offset, len } => [offset, len, 0, 0],
        Instr::MatchAny { dotall } => [dotall as u32, 0, 0, 0],
        Instr::Jump(t) => [t, 0, 0, 0],
        Instr::Split(a, b) => [a, b, 0, 0],
        Instr::SaveStart(g) | Instr::SaveEnd(g) => [g, 0, 0, 0],
        Instr::RepeatStart { min, max, greedy, end } => [min, max, greedy as u32, end],
        Instr::RepeatEnd { start } => [start, 0, 0, 0],
        Instr::Boundary(flags) => [flags.bits(), 0, 0, 0],
        Instr::Backref { group, case_insensitive } => {
            [group, case_insensitive as u32, 0, 0]
        }
        Instr::Lookahead { body, next, behind }
        | Instr::NegLookahead { body, next, behind } => [body, next, behind as u32, 0],
    }
}

fn decode_instr(opcode: u8, w: [u32; 4]) -> Result<Instr, Error> {
    let flag = |value: u32| match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::invalid_bytecode(format!(
            "invalid boolean operand {} for opcode {:#04x}",
            value, opcode
        ))),
    };

    let instr = match opcode {
        Instr::NOP => Instr::Nop,
        Instr::MATCH_CHAR => Instr::MatchChar {
            c: char::from_u32(w[0]).ok_or_else(|| {
                Error::invalid_bytecode(format!("invalid character {:#x}", w[0]))
            })?,
            case_insensitive: flag(w[1])?,
        },
        Instr::MATCH_CLASS => Instr::MatchClass { offset: w[0], len: w[1] },
        Instr::MATCH_ANY => Instr::MatchAny { dotall: flag(w[0])? },
        Instr::JUMP => Instr::Jump(w[0]),
        Instr::SPLIT => Instr::Split(w[0], w[1]),
        Instr::SAVE_START => Instr::SaveStart(w[0]),
        Instr::SAVE_END => Instr::SaveEnd(w[0]),
        Instr::REPEAT_START => Instr::RepeatStart {
            min: w[0],
            max: w[1],
            greedy: flag(w[2])?,
            end: w[3],
        },
        Instr::REPEAT_END => Instr::RepeatEnd { start: w[0] },
        Instr::BOUNDARY => Instr::Boundary(
            StateFlags::from_bits(w[0])
                .ok_or_else(|| Error::invalid_bytecode("unknown assertion flags"))?,
        ),
        Instr::BACKREF => Instr::Backref { group: w[0], case_insensitive: flag(w[1])? },
        Instr::LOOKAHEAD => {
            Instr::Lookahead { body: w[0], next: w[1], behind: flag(w[2])? }
        }
        Instr::NEG_LOOKAHEAD => {
            Instr::NegLookahead { body: w[0], next: w[1], behind: flag(w[2])? }
        }
        Instr::ACCEPT => Instr::Accept,
        Instr::FAIL => Instr::Fail,
        _ => {
            return Err(Error::invalid_bytecode(format!(
                "unknown opcode {:#04x}",
                opcode
            )))
        }
    };

    Ok(instr)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::invalid_bytecode("truncated program"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(self.order.decode([b[0], b[1], b[2], b[3]]))
    }
}
