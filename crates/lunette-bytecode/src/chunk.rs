//! Lua 5.4 binary chunk deserialization (undump) and serialization (dump).
//!
//! Layout follows PUC Lua 5.4 `luac` output: a packed header, one byte of
//! file-level upvalue count, then the entry function encoded recursively.

use tracing::debug;

use crate::error::{HeaderField, UndumpError};
use crate::opcode::Instruction;
use crate::proto::{
    AbsLineInfo, Constant, DebugInfo, LocalVar, Proto, UpvalDesc, ANONYMOUS_VAR,
};
use crate::reader::{write_string, write_varuint, Reader};

// Lua 5.4 binary header constants
pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const LUAC_VERSION: u8 = 0x54;
pub const LUAC_FORMAT: u8 = 0;
pub const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
pub const INSTRUCTION_SIZE: u8 = 4;
pub const LUA_INTEGER_SIZE: u8 = 8;
pub const LUA_NUMBER_SIZE: u8 = 8;
pub const LUAC_INT: i64 = 0x5678;
pub const LUAC_NUM: f64 = 370.5;

/// Deepest function nesting accepted while decoding.
pub const MAX_NESTING: usize = 200;

/// A constant's type tag: base kind in the low nibble, variant above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueTag(pub u8);

impl ValueTag {
    pub const NIL: ValueTag = ValueTag(0x00);
    pub const FALSE: ValueTag = ValueTag(0x01);
    pub const TRUE: ValueTag = ValueTag(0x11);
    pub const INTEGER: ValueTag = ValueTag(0x03);
    pub const FLOAT: ValueTag = ValueTag(0x13);
    pub const SHORT_STRING: ValueTag = ValueTag(0x04);
    pub const LONG_STRING: ValueTag = ValueTag(0x14);

    pub fn base(self) -> u8 {
        self.0 & 0x0f
    }

    pub fn variant(self) -> u8 {
        self.0 >> 4
    }
}

/// The fixed-layout chunk preamble.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub magic: u32,
    /// Version byte, format byte, then the six LUAC_DATA bytes.
    pub version: u64,
    pub instruction_size: u8,
    pub integer_size: u8,
    pub float_size: u8,
    pub sanity_int: i64,
    pub sanity_float: f64,
}

impl Header {
    /// Encoded size in bytes.
    pub const SIZE: usize = 31;

    /// The header `luac` 5.4 writes on a 64-bit little-endian host.
    pub fn lua54() -> Self {
        let mut version = [0u8; 8];
        version[0] = LUAC_VERSION;
        version[1] = LUAC_FORMAT;
        version[2..].copy_from_slice(LUAC_DATA);
        Header {
            magic: u32::from_le_bytes(*LUA_SIGNATURE),
            version: u64::from_le_bytes(version),
            instruction_size: INSTRUCTION_SIZE,
            integer_size: LUA_INTEGER_SIZE,
            float_size: LUA_NUMBER_SIZE,
            sanity_int: LUAC_INT,
            sanity_float: LUAC_NUM,
        }
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self, UndumpError> {
        Ok(Header {
            magic: reader.read_fixed()?,
            version: reader.read_fixed()?,
            instruction_size: reader.read_byte()?,
            integer_size: reader.read_byte()?,
            float_size: reader.read_byte()?,
            sanity_int: reader.read_fixed()?,
            sanity_float: reader.read_fixed()?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.instruction_size);
        out.push(self.integer_size);
        out.push(self.float_size);
        out.extend_from_slice(&self.sanity_int.to_le_bytes());
        out.extend_from_slice(&self.sanity_float.to_le_bytes());
    }

    pub fn version_number(&self) -> u8 {
        self.version as u8
    }

    pub fn format(&self) -> u8 {
        (self.version >> 8) as u8
    }

    /// The 48 data-check bits above the version and format bytes.
    pub fn data_check(&self) -> u64 {
        self.version >> 16
    }

    /// Check every field against the Lua 5.4 literals, in layout order.
    pub fn validate(&self) -> Result<(), UndumpError> {
        let expected = Header::lua54();
        check(HeaderField::Magic, expected.magic, self.magic)?;
        check(
            HeaderField::Version,
            expected.version_number(),
            self.version_number(),
        )?;
        check(HeaderField::Format, expected.format(), self.format())?;
        check(
            HeaderField::DataCheck,
            expected.data_check(),
            self.data_check(),
        )?;
        check(
            HeaderField::InstructionSize,
            expected.instruction_size,
            self.instruction_size,
        )?;
        check(
            HeaderField::IntegerSize,
            expected.integer_size,
            self.integer_size,
        )?;
        check(HeaderField::FloatSize, expected.float_size, self.float_size)?;
        check(HeaderField::SanityInt, expected.sanity_int, self.sanity_int)?;
        // Compare bits so a NaN in the file is still a mismatch.
        if self.sanity_float.to_bits() != expected.sanity_float.to_bits() {
            return Err(UndumpError::BadHeader {
                field: HeaderField::SanityFloat,
                expected: expected.sanity_float.to_string(),
                found: self.sanity_float.to_string(),
            });
        }
        Ok(())
    }
}

fn check<T>(field: HeaderField, expected: T, found: T) -> Result<(), UndumpError>
where
    T: PartialEq + std::fmt::LowerHex,
{
    if expected == found {
        Ok(())
    } else {
        Err(UndumpError::BadHeader {
            field,
            expected: format!("{expected:#x}"),
            found: format!("{found:#x}"),
        })
    }
}

/// A complete precompiled unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub header: Header,
    /// Number of upvalues the entry function expects (`_ENV` first).
    pub upvalue_count: u8,
    pub main: Proto,
}

impl Chunk {
    /// Wrap a prototype with the canonical header.
    pub fn new(main: Proto) -> Self {
        Chunk {
            header: Header::lua54(),
            upvalue_count: main.upvalues.len() as u8,
            main,
        }
    }

    /// Decode a chunk image. Bytes after the entry function are ignored.
    pub fn undump(data: &[u8]) -> Result<Chunk, UndumpError> {
        Self::undump_from(&mut Reader::new(data))
    }

    /// Decode a chunk image that must end exactly after the entry function.
    pub fn undump_exact(data: &[u8]) -> Result<Chunk, UndumpError> {
        let mut reader = Reader::new(data);
        let chunk = Self::undump_from(&mut reader)?;
        match reader.remaining() {
            0 => Ok(chunk),
            remaining => Err(UndumpError::TrailingBytes { remaining }),
        }
    }

    fn undump_from(reader: &mut Reader<'_>) -> Result<Chunk, UndumpError> {
        let header = Header::read(reader)?;
        header.validate()?;
        let upvalue_count = reader.read_byte()?;
        let main = read_function(reader, &header, None, 0)?;
        debug!(
            source = main.source_name(),
            upvalues = upvalue_count,
            protos = main.total_protos(),
            instructions = main.code.len(),
            "loaded binary chunk"
        );
        Ok(Chunk {
            header,
            upvalue_count,
            main,
        })
    }

    /// Serialize back into the binary layout.
    pub fn dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Header::SIZE + 1);
        self.header.write(&mut out);
        out.push(self.upvalue_count);
        write_function(&mut out, &self.header, &self.main, None);
        out
    }
}

fn read_function(
    reader: &mut Reader<'_>,
    header: &Header,
    parent_source: Option<&str>,
    depth: usize,
) -> Result<Proto, UndumpError> {
    if depth > MAX_NESTING {
        return Err(UndumpError::NestingTooDeep { limit: MAX_NESTING });
    }

    let source = reader
        .read_string()?
        .or_else(|| parent_source.map(str::to_owned));
    let line_defined = reader.read_varuint()?;
    let last_line_defined = reader.read_varuint()?;
    let num_params = reader.read_byte()?;
    let is_vararg = reader.read_byte()?;
    let max_stack_size = reader.read_byte()?;

    let code_len = reader.read_count()?;
    let code = reader.read_array::<Instruction>(code_len)?;

    let num_constants = reader.read_count()?;
    let mut constants = Vec::with_capacity(num_constants);
    for _ in 0..num_constants {
        constants.push(read_constant(reader, header)?);
    }

    let num_upvalues = reader.read_count()?;
    let mut upvalues = Vec::with_capacity(num_upvalues);
    for _ in 0..num_upvalues {
        upvalues.push(UpvalDesc {
            in_stack: reader.read_byte()? != 0,
            index: reader.read_byte()?,
            kind: reader.read_byte()?,
        });
    }

    let num_protos = reader.read_count()?;
    let mut protos = Vec::with_capacity(num_protos);
    for _ in 0..num_protos {
        protos.push(read_function(reader, header, source.as_deref(), depth + 1)?);
    }

    let debug = read_debug(reader)?;

    Ok(Proto {
        source,
        line_defined,
        last_line_defined,
        num_params,
        is_vararg,
        max_stack_size,
        code,
        constants,
        upvalues,
        protos,
        debug,
    })
}

fn read_constant(reader: &mut Reader<'_>, header: &Header) -> Result<Constant, UndumpError> {
    let offset = reader.position();
    let tag = ValueTag(reader.read_byte()?);
    let k = match tag {
        ValueTag::NIL => Constant::Nil,
        ValueTag::FALSE => Constant::Boolean(false),
        ValueTag::TRUE => Constant::Boolean(true),
        ValueTag::INTEGER => Constant::Integer(if header.integer_size == 4 {
            reader.read_fixed::<i32>()? as i64
        } else {
            reader.read_fixed::<i64>()?
        }),
        ValueTag::FLOAT => Constant::Float(if header.float_size == 4 {
            reader.read_fixed::<f32>()? as f64
        } else {
            reader.read_fixed::<f64>()?
        }),
        ValueTag::SHORT_STRING | ValueTag::LONG_STRING => {
            Constant::String(reader.read_string()?.unwrap_or_default())
        }
        ValueTag(tag) => return Err(UndumpError::UnknownConstantTag { tag, offset }),
    };
    Ok(k)
}

fn read_debug(reader: &mut Reader<'_>) -> Result<DebugInfo, UndumpError> {
    let line_len = reader.read_count()?;
    let line_info = reader.read_slice(line_len)?.to_vec();

    let num_abs = reader.read_count()?;
    let mut abs_line_info = Vec::with_capacity(num_abs);
    for _ in 0..num_abs {
        abs_line_info.push(AbsLineInfo {
            pc: reader.read_varuint()?,
            line: reader.read_varuint()?,
        });
    }

    let num_locals = reader.read_count()?;
    let mut local_vars = Vec::with_capacity(num_locals);
    for _ in 0..num_locals {
        local_vars.push(LocalVar {
            name: reader
                .read_string()?
                .unwrap_or_else(|| ANONYMOUS_VAR.to_owned()),
            start_pc: reader.read_varuint()?,
            end_pc: reader.read_varuint()?,
        });
    }

    let num_names = reader.read_count()?;
    let mut upvalue_names = Vec::with_capacity(num_names);
    for _ in 0..num_names {
        upvalue_names.push(
            reader
                .read_string()?
                .unwrap_or_else(|| ANONYMOUS_VAR.to_owned()),
        );
    }

    Ok(DebugInfo {
        line_info,
        abs_line_info,
        local_vars,
        upvalue_names,
    })
}

// ─── Dumper ─────────────────────────────────────────────────────────────

fn write_function(out: &mut Vec<u8>, header: &Header, proto: &Proto, parent_source: Option<&str>) {
    // Same source as parent: write absent to save space
    let source = proto.source.as_deref();
    if parent_source.is_some() && source == parent_source {
        write_string(out, None);
    } else {
        write_string(out, source);
    }

    write_varuint(out, proto.line_defined);
    write_varuint(out, proto.last_line_defined);
    out.push(proto.num_params);
    out.push(proto.is_vararg);
    out.push(proto.max_stack_size);

    write_varuint(out, proto.code.len() as u64);
    for inst in &proto.code {
        out.extend_from_slice(&inst.0.to_le_bytes());
    }

    write_varuint(out, proto.constants.len() as u64);
    for k in &proto.constants {
        write_constant(out, header, k);
    }

    write_varuint(out, proto.upvalues.len() as u64);
    for uv in &proto.upvalues {
        out.push(uv.in_stack as u8);
        out.push(uv.index);
        out.push(uv.kind);
    }

    write_varuint(out, proto.protos.len() as u64);
    for child in &proto.protos {
        write_function(out, header, child, source);
    }

    let debug = &proto.debug;
    write_varuint(out, debug.line_info.len() as u64);
    out.extend_from_slice(&debug.line_info);

    write_varuint(out, debug.abs_line_info.len() as u64);
    for abs in &debug.abs_line_info {
        write_varuint(out, abs.pc);
        write_varuint(out, abs.line);
    }

    write_varuint(out, debug.local_vars.len() as u64);
    for var in &debug.local_vars {
        write_string(out, Some(&var.name));
        write_varuint(out, var.start_pc);
        write_varuint(out, var.end_pc);
    }

    write_varuint(out, debug.upvalue_names.len() as u64);
    for name in &debug.upvalue_names {
        write_string(out, Some(name));
    }
}

fn write_constant(out: &mut Vec<u8>, header: &Header, k: &Constant) {
    match k {
        Constant::Nil => out.push(ValueTag::NIL.0),
        Constant::Boolean(false) => out.push(ValueTag::FALSE.0),
        Constant::Boolean(true) => out.push(ValueTag::TRUE.0),
        Constant::Integer(i) => {
            out.push(ValueTag::INTEGER.0);
            if header.integer_size == 4 {
                out.extend_from_slice(&(*i as i32).to_le_bytes());
            } else {
                out.extend_from_slice(&i.to_le_bytes());
            }
        }
        Constant::Float(f) => {
            out.push(ValueTag::FLOAT.0);
            if header.float_size == 4 {
                out.extend_from_slice(&(*f as f32).to_le_bytes());
            } else {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
        Constant::String(s) => {
            // luac's short-string limit
            let tag = if s.len() <= 40 {
                ValueTag::SHORT_STRING
            } else {
                ValueTag::LONG_STRING
            };
            out.push(tag.0);
            write_string(out, Some(s));
        }
    }
}
