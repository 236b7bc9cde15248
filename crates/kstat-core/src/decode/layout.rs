//! Native struct layouts, separated from the code that reads them.
//!
//! A [`Layout`] is a static list of [`Slot`]s written in the same order as
//! the C declaration it mirrors. Offsets are never written by hand: the
//! layout is compiled against a [`DataModel`], which knows how wide and how
//! aligned each C type is on that kernel. Supporting another word size means
//! adding a data model, not touching the tables or the decode driver.
//!
//! ```text
//!  static Layout ──compile(DataModel)──▶ CompiledLayout ──decode(bytes)──▶ Vec<Field>
//!                                              │
//!                                              └──────── BlobWriter (mocks, tests)
//! ```

use crate::decode::DecodeError;
use crate::model::{Field, FieldType, Numeric};

/// C data model of the kernel that produced a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataModel {
    /// 32-bit `long` and pointers; 64-bit integers 4-byte aligned (i386).
    Ilp32,
    /// 64-bit `long` and pointers, naturally aligned.
    Lp64,
}

impl DataModel {
    /// Data model of the running process, which matches the kernel's.
    #[cfg(target_pointer_width = "64")]
    pub const NATIVE: DataModel = DataModel::Lp64;
    #[cfg(not(target_pointer_width = "64"))]
    pub const NATIVE: DataModel = DataModel::Ilp32;

    pub fn size_of(self, ctype: CType) -> usize {
        match ctype {
            CType::Char(n) => n,
            CType::UChar => 1,
            CType::Int | CType::UInt => 4,
            CType::LongLong | CType::ULongLong => 8,
            CType::Long | CType::ULong | CType::Pointer => self.word(),
        }
    }

    pub fn align_of(self, ctype: CType) -> usize {
        match ctype {
            CType::Char(_) | CType::UChar => 1,
            CType::Int | CType::UInt => 4,
            CType::LongLong | CType::ULongLong => match self {
                DataModel::Ilp32 => 4,
                DataModel::Lp64 => 8,
            },
            CType::Long | CType::ULong | CType::Pointer => self.word(),
        }
    }

    fn word(self) -> usize {
        match self {
            DataModel::Ilp32 => 4,
            DataModel::Lp64 => 8,
        }
    }
}

/// C member types appearing in kstat structs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CType {
    /// `char[n]`, NUL-terminated or NUL-padded text.
    Char(usize),
    UChar,
    /// `int` / `int32_t`.
    Int,
    /// `uint_t` / `uint32_t`.
    UInt,
    /// `longlong_t` / `int64_t` / `hrtime_t`.
    LongLong,
    /// `u_longlong_t` / `uint64_t`.
    ULongLong,
    Long,
    ULong,
    Pointer,
}

impl CType {
    /// Field type a member of this C type is reported as by default.
    pub fn default_field_type(self) -> FieldType {
        match self {
            CType::Char(_) => FieldType::Char,
            CType::UChar | CType::UInt => FieldType::UInt32,
            CType::Int => FieldType::Int32,
            CType::LongLong | CType::Long => FieldType::Int64,
            CType::ULongLong | CType::ULong | CType::Pointer => FieldType::UInt64,
        }
    }

    fn is_signed(self) -> bool {
        matches!(self, CType::Int | CType::LongLong | CType::Long)
    }
}

/// One member of a struct declaration.
#[derive(Clone, Copy, Debug)]
pub enum Slot {
    /// Emitted under `name` with the C type's default field type.
    Field(&'static str, CType),
    /// Emitted under `name` as an explicit field type.
    Typed(&'static str, CType, FieldType),
    /// Occupies space but is not emitted.
    Skip(CType),
}

/// A native struct declaration.
#[derive(Debug)]
pub struct Layout {
    /// C name of the struct, used in error messages.
    pub name: &'static str,
    pub slots: &'static [Slot],
}

impl Layout {
    /// Assigns offsets to every slot under `model`.
    pub fn compile(&self, model: DataModel) -> CompiledLayout {
        let mut offset = 0usize;
        let mut max_align = 1usize;
        let mut members = Vec::with_capacity(self.slots.len());

        for slot in self.slots {
            let (name, ctype, field_type) = match *slot {
                Slot::Field(name, ctype) => (Some(name), ctype, ctype.default_field_type()),
                Slot::Typed(name, ctype, field_type) => (Some(name), ctype, field_type),
                Slot::Skip(ctype) => (None, ctype, ctype.default_field_type()),
            };
            let align = model.align_of(ctype);
            max_align = max_align.max(align);
            offset = align_up(offset, align);
            if let Some(name) = name {
                members.push(Member {
                    name,
                    offset,
                    ctype,
                    size: model.size_of(ctype),
                    field_type,
                });
            }
            offset += model.size_of(ctype);
        }

        CompiledLayout {
            name: self.name,
            model,
            size: align_up(offset, max_align),
            members,
        }
    }
}

/// An emitted member with its resolved position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: &'static str,
    pub offset: usize,
    pub ctype: CType,
    pub size: usize,
    pub field_type: FieldType,
}

/// A [`Layout`] resolved for one data model.
#[derive(Clone, Debug)]
pub struct CompiledLayout {
    pub name: &'static str,
    pub model: DataModel,
    /// `sizeof` the struct, including trailing padding.
    pub size: usize,
    pub members: Vec<Member>,
}

impl CompiledLayout {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Decodes every emitted member of one struct at the start of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Field>, DecodeError> {
        self.check_len(bytes)?;
        Ok(self
            .members
            .iter()
            .map(|m| read_member(bytes, m))
            .collect())
    }

    /// Fails with `Truncated` when `bytes` cannot hold the whole struct.
    pub fn check_len(&self, bytes: &[u8]) -> Result<(), DecodeError> {
        if bytes.len() < self.size {
            return Err(DecodeError::Truncated {
                what: self.name,
                needed: self.size,
                actual: bytes.len(),
            });
        }
        Ok(())
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// Reads one member. The caller has already checked the length.
pub(crate) fn read_member(bytes: &[u8], m: &Member) -> Field {
    let raw = &bytes[m.offset..m.offset + m.size];
    if let CType::Char(_) = m.ctype {
        return Field::text(m.name, m.field_type, c_text(raw));
    }
    let n = read_scalar(raw, m.ctype.is_signed());
    Field::numeric(m.name, m.field_type, convert(n, m.field_type))
}

/// Reads a native-endian integer of 1, 4 or 8 bytes.
pub(crate) fn read_scalar(raw: &[u8], signed: bool) -> Numeric {
    match (raw.len(), signed) {
        (1, _) => Numeric::Unsigned(raw[0] as u64),
        (4, true) => Numeric::Signed(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64),
        (4, false) => {
            Numeric::Unsigned(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64)
        }
        (_, signed) => {
            let mut buf = [0u8; 8];
            let n = raw.len().min(8);
            buf[..n].copy_from_slice(&raw[..n]);
            if signed {
                Numeric::Signed(i64::from_ne_bytes(buf))
            } else {
                Numeric::Unsigned(u64::from_ne_bytes(buf))
            }
        }
    }
}

/// Narrows or reinterprets a value to the width its field type reports.
pub(crate) fn convert(n: Numeric, field_type: FieldType) -> Numeric {
    match field_type {
        FieldType::Int32 => Numeric::Signed(n.as_i64() as i32 as i64),
        FieldType::UInt32 => Numeric::Unsigned(n.as_u64() as u32 as u64),
        FieldType::Int64 => Numeric::Signed(n.as_i64()),
        _ => Numeric::Unsigned(n.as_u64()),
    }
}

/// Copies a C character array up to its first NUL.
pub(crate) fn c_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Builds native blobs for a compiled layout, addressing members by name.
///
/// Used by the mock chain to fabricate kernel data; writing goes through
/// the same offsets the decoder reads.
#[derive(Clone, Debug)]
pub struct BlobWriter<'a> {
    layout: &'a CompiledLayout,
    buf: Vec<u8>,
}

impl<'a> BlobWriter<'a> {
    /// A zero-filled struct.
    pub fn new(layout: &'a CompiledLayout) -> Self {
        Self {
            layout,
            buf: vec![0; layout.size],
        }
    }

    /// Stores `value` in the named member, truncated to its width.
    pub fn set(&mut self, name: &str, value: i64) -> &mut Self {
        self.set_u64(name, value as u64)
    }

    pub fn set_u64(&mut self, name: &str, value: u64) -> &mut Self {
        if let Some(m) = self.layout.member(name) {
            let bytes = value.to_ne_bytes();
            let dst = &mut self.buf[m.offset..m.offset + m.size];
            match m.size {
                1 => dst[0] = value as u8,
                4 => dst.copy_from_slice(&(value as u32).to_ne_bytes()),
                _ => dst.copy_from_slice(&bytes[..m.size.min(8)]),
            }
        } else {
            debug_assert!(false, "{} has no member {}", self.layout.name, name);
        }
        self
    }

    /// Stores text in a `char[n]` member, NUL-padded and truncated to fit.
    pub fn set_text(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some(m) = self.layout.member(name) {
            let dst = &mut self.buf[m.offset..m.offset + m.size];
            dst.fill(0);
            let n = value.len().min(m.size.saturating_sub(1));
            dst[..n].copy_from_slice(&value.as_bytes()[..n]);
        } else {
            debug_assert!(false, "{} has no member {}", self.layout.name, name);
        }
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }
}
