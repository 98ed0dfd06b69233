/*! Portable bytecode for compiled patterns.

A [`Program`] is a flat sequence of fixed-size instructions executed by a
backtracking interpreter. Programs are produced by lowering the syntax tree
of a pattern, or the automaton when no syntax tree is available, and can be
serialized to a byte stream that is portable across hosts with different
endianness. See [`serialize`] for the layout of the stream.

Instructions refer to each other by index. Character classes are not
stored in the instructions themselves, [`Instr::MatchClass`] refers to a
byte range within the program's [`ClassPool`], which holds the spec of every
class used by the program:

```text
00000: SAVE_START 1
00001: MATCH_CLASS [a-z]
00002: SPLIT 00001, 00003
00003: SAVE_END 1
00004: ACCEPT
```
*/

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;

use crate::automaton::matcher::Matcher;
use crate::automaton::{Automaton, StateFlags};
use crate::config::EngineConfig;
use crate::errors::Error;
use crate::flags::Flags;
use crate::pattern::Pattern;
use crate::re::ast::SyntaxTree;

mod lower;
mod serialize;
mod vm;

#[cfg(test)]
mod tests;

pub use serialize::ByteOrder;
pub use serialize::{HEADER_SIZE, INSTR_SIZE, MAGIC, VERSION};

/// Value of the `max` operand of [`Instr::RepeatStart`] for unbounded
/// repetitions.
pub const UNBOUNDED: u32 = u32::MAX;

/// Instructions executed by the bytecode interpreter.
///
/// Operands that refer to other instructions are absolute indexes within
/// the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instr {
    /// Does nothing. Removed by [`Program::optimize`].
    Nop,

    /// Matches a character.
    MatchChar { c: char, case_insensitive: bool },

    /// Matches a character class. The class spec is the `len` bytes that
    /// start at `offset` in the class pool.
    MatchClass { offset: u32, len: u32 },

    /// Matches any character, newlines only if `dotall` is true.
    MatchAny { dotall: bool },

    /// Continues at the given instruction.
    Jump(u32),

    /// Continues at the first instruction, and at the second one if that
    /// fails.
    Split(u32, u32),

    /// Opens a capture group. Only the first entry counts, the group spans
    /// from its first entry to its last exit.
    SaveStart(u32),

    /// Closes a capture group.
    SaveEnd(u32),

    /// Starts a counted repetition of the instructions between this one and
    /// the [`Instr::RepeatEnd`] at `end`. `max` is [`UNBOUNDED`] for
    /// repetitions without upper bound.
    RepeatStart { min: u32, max: u32, greedy: bool, end: u32 },

    /// Ends an iteration of the repetition started at `start`.
    RepeatEnd { start: u32 },

    /// Zero-width assertions that must hold at the current position.
    Boundary(StateFlags),

    /// Matches the text captured by a group.
    Backref { group: u32, case_insensitive: bool },

    /// Succeeds if the instructions starting at `body`, which end with
    /// [`Instr::Accept`], match at the current position. Execution
    /// continues at `next`. Lookbehinds require the body to end at the
    /// current position.
    Lookahead { body: u32, next: u32, behind: bool },

    /// Like [`Instr::Lookahead`] but succeeds if the body doesn't match.
    NegLookahead { body: u32, next: u32, behind: bool },

    /// Match found. Inside a lookaround body it ends the body.
    Accept,

    /// Fails the current path.
    Fail,
}

impl Instr {
    pub const NOP: u8 = 0x00;
    pub const MATCH_CHAR: u8 = 0x01;
    pub const MATCH_CLASS: u8 = 0x02;
    pub const MATCH_ANY: u8 = 0x03;
    pub const JUMP: u8 = 0x04;
    pub const SPLIT: u8 = 0x05;
    pub const SAVE_START: u8 = 0x06;
    pub const SAVE_END: u8 = 0x07;
    pub const REPEAT_START: u8 = 0x08;
    pub const REPEAT_END: u8 = 0x09;
    pub const BOUNDARY: u8 = 0x0A;
    pub const BACKREF: u8 = 0x0B;
    pub const LOOKAHEAD: u8 = 0x0C;
    pub const NEG_LOOKAHEAD: u8 = 0x0D;
    pub const ACCEPT: u8 = 0x0E;
    pub const FAIL: u8 = 0x0F;

    /// Opcode of the instruction.
    pub fn opcode(&self) -> u8 {
        match self {
            Instr::Nop => Instr::NOP,
            Instr::MatchChar { .. } => Instr::MATCH_CHAR,
            Instr::MatchClass { .. } => Instr::MATCH_CLASS,
            Instr::MatchAny { .. } => Instr::MATCH_ANY,
            Instr::Jump(_) => Instr::JUMP,
            Instr::Split(_, _) => Instr::SPLIT,
            Instr::SaveStart(_) => Instr::SAVE_START,
            Instr::SaveEnd(_) => Instr::SAVE_END,
            Instr::RepeatStart { .. } => Instr::REPEAT_START,
            Instr::RepeatEnd { .. } => Instr::REPEAT_END,
            Instr::Boundary(_) => Instr::BOUNDARY,
            Instr::Backref { .. } => Instr::BACKREF,
            Instr::Lookahead { .. } => Instr::LOOKAHEAD,
            Instr::NegLookahead { .. } => Instr::NEG_LOOKAHEAD,
            Instr::Accept => Instr::ACCEPT,
            Instr::Fail => Instr::FAIL,
        }
    }

    /// Name of the instruction as shown in listings.
    pub fn name(&self) -> &'static str {
        match self {
            Instr::Nop => "NOP",
            Instr::MatchChar { .. } => "MATCH_CHAR",
            Instr::MatchClass { .. } => "MATCH_CLASS",
            Instr::MatchAny { .. } => "MATCH_ANY",
            Instr::Jump(_) => "JUMP",
            Instr::Split(_, _) => "SPLIT",
            Instr::SaveStart(_) => "SAVE_START",
            Instr::SaveEnd(_) => "SAVE_END",
            Instr::RepeatStart { .. } => "REPEAT_START",
            Instr::RepeatEnd { .. } => "REPEAT_END",
            Instr::Boundary(_) => "BOUNDARY",
            Instr::Backref { .. } => "BACKREF",
            Instr::Lookahead { .. } => "LOOKAHEAD",
            Instr::NegLookahead { .. } => "NEG_LOOKAHEAD",
            Instr::Accept => "ACCEPT",
            Instr::Fail => "FAIL",
        }
    }

    /// Instructions this one can continue at, other than the next one.
    fn targets(&self) -> impl Iterator<Item = u32> {
        let (a, b) = match *self {
            Instr::Jump(t) => (Some(t), None),
            Instr::Split(a, b) => (Some(a), Some(b)),
            Instr::Lookahead { body, next, .. }
            | Instr::NegLookahead { body, next, .. } => (Some(body), Some(next)),
            Instr::RepeatStart { end, .. } => (Some(end), None),
            Instr::RepeatEnd { start } => (Some(start), None),
            _ => (None, None),
        };
        a.into_iter().chain(b)
    }

    /// Applies `f` to every operand that refers to another instruction.
    fn remap_targets<F: Fn(u32) -> u32>(&mut self, f: F) {
        match self {
            Instr::Jump(t) => *t = f(*t),
            Instr::Split(a, b) => {
                *a = f(*a);
                *b = f(*b);
            }
            Instr::Lookahead { body, next, .. }
            | Instr::NegLookahead { body, next, .. } => {
                *body = f(*body);
                *next = f(*next);
            }
            Instr::RepeatStart { end, .. } => *end = f(*end),
            Instr::RepeatEnd { start } => *start = f(*start),
            _ => {}
        }
    }
}

/// Class specs referenced by the [`Instr::MatchClass`] instructions of a
/// program.
///
/// Specs are stored back to back in a single string, identical specs are
/// stored once. The matcher for each referenced range is built when the
/// range is added, so the interpreter never parses a spec.
#[derive(Debug, Clone, Default)]
pub struct ClassPool {
    data: String,
    interned: FxHashMap<String, (u32, u32)>,
    matchers: FxHashMap<(u32, u32), Matcher>,
}

impl ClassPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool with the given contents. The ranges used by the
    /// program must be registered with [`ClassPool::register`].
    pub(crate) fn from_data(data: String) -> Self {
        Self { data, ..Default::default() }
    }

    /// The contents of the pool.
    pub fn as_str(&self) -> &str {
        self.data.as_str()
    }

    /// Size of the pool in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The spec stored at the given range.
    pub fn get(&self, offset: u32, len: u32) -> Option<&str> {
        let start = offset as usize;
        let end = start.checked_add(len as usize)?;
        self.data.get(start..end)
    }

    /// Adds a spec to the pool and returns its range.
    pub(crate) fn intern(&mut self, spec: &str) -> Result<(u32, u32), Error> {
        if let Some(range) = self.interned.get(spec) {
            return Ok(*range);
        }
        let matcher = Matcher::parse(spec)?;
        let offset = u32::try_from(self.data.len())
            .map_err(|_| Error::limit_exceeded("class pool too large"))?;
        let len = u32::try_from(spec.len())
            .map_err(|_| Error::limit_exceeded("class spec too large"))?;
        self.data.push_str(spec);
        self.interned.insert(spec.to_string(), (offset, len));
        self.matchers.insert((offset, len), matcher);
        Ok((offset, len))
    }

    /// Builds the matcher for a range of a pool created with
    /// [`ClassPool::from_data`].
    pub(crate) fn register(&mut self, offset: u32, len: u32) -> Result<(), Error> {
        if self.matchers.contains_key(&(offset, len)) {
            return Ok(());
        }
        if len == 0 {
            return Err(Error::invalid_bytecode("empty class reference"));
        }
        let spec = self.get(offset, len).ok_or_else(|| {
            Error::invalid_bytecode(format!(
                "class reference {}+{} out of pool bounds",
                offset, len
            ))
        })?;
        let matcher = Matcher::parse(spec)
            .map_err(|err| Error::invalid_bytecode(err.message().to_string()))?;
        self.interned.insert(spec.to_string(), (offset, len));
        self.matchers.insert((offset, len), matcher);
        Ok(())
    }

    pub(crate) fn matcher(&self, offset: u32, len: u32) -> Option<&Matcher> {
        self.matchers.get(&(offset, len))
    }
}

/// A compiled bytecode program.
///
/// Programs are immutable once built and can be shared between threads.
/// Cloning a program shares its class pool.
#[derive(Debug, Clone)]
pub struct Program {
    instrs: Vec<Instr>,
    group_count: usize,
    group_names: Vec<Option<String>>,
    flags: Flags,
    pattern: Option<String>,
    classes: Arc<ClassPool>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty program with room for `capacity` instructions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instrs: Vec::with_capacity(capacity),
            group_count: 0,
            group_names: Vec::new(),
            flags: Flags::empty(),
            pattern: None,
            classes: Arc::new(ClassPool::new()),
        }
    }

    /// Compiles a pattern to bytecode.
    ///
    /// Deterministic automata are lowered directly, other patterns are
    /// lowered from their syntax tree when they have one. Fails with
    /// [`crate::ErrorKind::UnsupportedOperation`] for atomic groups,
    /// possessive repetitions, conditionals and `(*COMMIT)`.
    pub fn from_pattern(pattern: &Pattern) -> Result<Program, Error> {
        let mut program = match pattern.ast() {
            Some(tree) if !pattern.automaton().is_deterministic() => {
                lower::from_ast(tree)?
            }
            _ => lower::from_automaton(pattern.automaton())?,
        };
        program.flags = pattern.effective_flags();
        program.pattern = pattern.source().map(str::to_string);
        program.group_names = pattern.group_names().to_vec();
        program.group_count = program.group_count.max(pattern.group_count());
        debug!(
            "bytecode program with {} instructions for pattern {:?}",
            program.len(),
            program.pattern
        );
        Ok(program)
    }

    /// Lowers a syntax tree to bytecode.
    pub fn from_ast(tree: &SyntaxTree) -> Result<Program, Error> {
        let mut program = lower::from_ast(tree)?;
        program.flags = tree.flags();
        program.group_names = tree.group_names().to_vec();
        Ok(program)
    }

    /// Lowers an automaton to bytecode.
    pub fn from_automaton(automaton: &Automaton) -> Result<Program, Error> {
        let mut program = lower::from_automaton(automaton)?;
        program.flags = automaton.flags();
        Ok(program)
    }

    /// Instructions of the program.
    pub fn instructions(&self) -> &[Instr] {
        self.instrs.as_slice()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// True if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Number of instructions the program can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.instrs.capacity()
    }

    /// Appends an instruction and returns its index.
    pub fn push(&mut self, instr: Instr) -> Result<u32, Error> {
        let index = u32::try_from(self.instrs.len())
            .map_err(|_| Error::limit_exceeded("too many instructions"))?;
        self.instrs.push(instr);
        Ok(index)
    }

    /// Adds a class spec to the pool and returns the instruction that
    /// matches it.
    pub fn add_class(&mut self, spec: &str) -> Result<Instr, Error> {
        let (offset, len) = Arc::make_mut(&mut self.classes).intern(spec)?;
        Ok(Instr::MatchClass { offset, len })
    }

    /// The class pool.
    pub fn classes(&self) -> &ClassPool {
        &self.classes
    }

    /// Number of capture groups.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Sets the number of capture groups.
    pub fn set_group_count(&mut self, group_count: usize) {
        self.group_count = group_count;
    }

    /// Flags the program was compiled with.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Sets the flags of the program.
    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    /// Source of the pattern the program was compiled from.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Sets the source of the pattern the program was compiled from.
    pub fn set_pattern(&mut self, pattern: Option<&str>) {
        self.pattern = pattern.map(str::to_string);
    }

    /// Name of the group with the given number, starting at 1.
    pub fn group_name(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.group_names.get(i))
            .and_then(|name| name.as_deref())
    }

    pub(crate) fn set_group_names(&mut self, names: Vec<Option<String>>) {
        self.group_names = names;
    }

    pub(crate) fn set_classes(&mut self, classes: ClassPool) {
        self.classes = Arc::new(classes);
    }

    /// Checks that the program can be executed safely.
    ///
    /// Every instruction target must be within the program, every group
    /// between 1 and the number of groups, and every class reference must
    /// point to a valid spec in the pool. Repetition instructions must come
    /// in pairs that refer to each other.
    pub fn validate(&self) -> Result<(), Error> {
        if self.instrs.is_empty() {
            return Err(Error::invalid_bytecode("program has no instructions"));
        }

        let len = self.instrs.len();

        for (i, instr) in self.instrs.iter().enumerate() {
            if let Some(target) = instr.targets().find(|t| *t as usize >= len) {
                return Err(Error::invalid_bytecode(format!(
                    "{} at {:05x} targets {:05x}, outside the program",
                    instr.name(),
                    i,
                    target
                )));
            }

            match *instr {
                Instr::SaveStart(group)
                | Instr::SaveEnd(group)
                | Instr::Backref { group, .. } => {
                    if group == 0 || group as usize > self.group_count {
                        return Err(Error::invalid_bytecode(format!(
                            "{} at {:05x} refers to group {}, the program has {}",
                            instr.name(),
                            i,
                            group,
                            self.group_count
                        )));
                    }
                }
                Instr::MatchClass { offset, len } => {
                    if len == 0 || self.classes.matcher(offset, len).is_none() {
                        return Err(Error::invalid_bytecode(format!(
                            "MATCH_CLASS at {:05x} has an invalid class reference",
                            i
                        )));
                    }
                }
                Instr::RepeatStart { min, max, end, .. } => {
                    if min > max || end as usize <= i {
                        return Err(Error::invalid_bytecode(format!(
                            "malformed REPEAT_START at {:05x}",
                            i
                        )));
                    }
                    match self.instrs[end as usize] {
                        Instr::RepeatEnd { start } if start as usize == i => {}
                        _ => {
                            return Err(Error::invalid_bytecode(format!(
                                "REPEAT_START at {:05x} without matching REPEAT_END",
                                i
                            )))
                        }
                    }
                }
                Instr::RepeatEnd { start } => match self.instrs[start as usize] {
                    Instr::RepeatStart { end, .. } if end as usize == i => {}
                    _ => {
                        return Err(Error::invalid_bytecode(format!(
                            "REPEAT_END at {:05x} without matching REPEAT_START",
                            i
                        )))
                    }
                },
                Instr::Boundary(flags) => {
                    if flags.is_empty() || !StateFlags::ASSERTIONS.contains(flags) {
                        return Err(Error::invalid_bytecode(format!(
                            "BOUNDARY at {:05x} has invalid assertions",
                            i
                        )));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Removes the `NOP` instructions, rewriting the targets of the
    /// remaining ones. Returns the number of instructions removed.
    ///
    /// Targets pointing to a `NOP` are moved to the first instruction
    /// after it. If that is the end of the program a `FAIL` instruction is
    /// appended.
    pub fn optimize(&mut self) -> Result<usize, Error> {
        let before = self.instrs.len();

        // remap[i] is the new index of the first instruction that is not a
        // NOP at or after i.
        let mut remap = Vec::with_capacity(before + 1);
        let mut next = 0_u32;
        for instr in &self.instrs {
            remap.push(next);
            if *instr != Instr::Nop {
                next += 1;
            }
        }
        remap.push(next);

        if next as usize == before {
            return Ok(0);
        }

        let needs_fail = self
            .instrs
            .iter()
            .filter(|instr| **instr != Instr::Nop)
            .flat_map(|instr| instr.targets())
            .any(|t| remap.get(t as usize).is_some_and(|r| *r == next));

        let mut instrs = Vec::with_capacity(next as usize + 1);
        for instr in self.instrs.iter().filter(|instr| **instr != Instr::Nop) {
            let mut instr = *instr;
            instr.remap_targets(|t| remap.get(t as usize).copied().unwrap_or(t));
            instrs.push(instr);
        }
        if needs_fail {
            instrs.push(Instr::Fail);
        }

        self.instrs = instrs;

        let removed = before - next as usize;
        debug!("bytecode optimization removed {} NOP instructions", removed);
        Ok(removed)
    }

    /// Serializes the program with the byte order of the host.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        self.serialize_as(ByteOrder::native())
    }

    /// Serializes the program with the given byte order.
    pub fn serialize_as(&self, order: ByteOrder) -> Result<Vec<u8>, Error> {
        serialize::write(self, order)
    }

    /// Deserializes and validates a program.
    ///
    /// Programs with more capture groups than the default
    /// [`EngineConfig::max_capture_groups`] are rejected, use
    /// [`Program::deserialize_with_config`] for other limits.
    pub fn deserialize<B: AsRef<[u8]>>(bytes: B) -> Result<Program, Error> {
        Self::deserialize_with_config(bytes, &EngineConfig::default())
    }

    /// Like [`Program::deserialize`], with the limits of `config`.
    pub fn deserialize_with_config<B: AsRef<[u8]>>(
        bytes: B,
        config: &EngineConfig,
    ) -> Result<Program, Error> {
        let program = serialize::read(bytes.as_ref(), config.max_capture_groups)?;
        program.validate()?;
        Ok(program)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (addr, instr) in self.instrs.iter().enumerate() {
            write!(f, "{:05x}: {}", addr, instr.name())?;
            match *instr {
                Instr::Nop | Instr::Accept | Instr::Fail => {}
                Instr::MatchChar { c, case_insensitive } => {
                    write!(f, " {:?}", c)?;
                    if case_insensitive {
                        write!(f, " nocase")?;
                    }
                }
                Instr::MatchClass { offset, len } => {
                    match self.classes.get(offset, len) {
                        Some(spec) => write!(f, " {}", spec)?,
                        None => write!(f, " <{}+{}>", offset, len)?,
                    }
                }
                Instr::MatchAny { dotall } => {
                    if dotall {
                        write!(f, " dotall")?;
                    }
                }
                Instr::Jump(t) => write!(f, " {:05x}", t)?,
                Instr::Split(a, b) => write!(f, " {:05x}, {:05x}", a, b)?,
                Instr::SaveStart(g) | Instr::SaveEnd(g) => write!(f, " {}", g)?,
                Instr::RepeatStart { min, max, greedy, end } => {
                    if max == UNBOUNDED {
                        write!(f, " {{{},}}", min)?;
                    } else {
                        write!(f, " {{{},{}}}", min, max)?;
                    }
                    if !greedy {
                        write!(f, " lazy")?;
                    }
                    write!(f, " {:05x}", end)?;
                }
                Instr::RepeatEnd { start } => write!(f, " {:05x}", start)?,
                Instr::Boundary(flags) => {
                    write!(f, " {}", flags.iter_names().map(|(name, _)| name).join("|"))?;
                }
                Instr::Backref { group, case_insensitive } => {
                    write!(f, " {}", group)?;
                    if case_insensitive {
                        write!(f, " nocase")?;
                    }
                }
                Instr::Lookahead { body, next, behind }
                | Instr::NegLookahead { body, next, behind } => {
                    write!(f, " {:05x}, {:05x}", body, next)?;
                    if behind {
                        write!(f, " behind")?;
                    }
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
