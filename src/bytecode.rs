//! Low-level class-file primitives: a bounds-checked big-endian cursor and the
//! constant pool.

use crate::error::{IndexError, IndexResult};

pub const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> IndexResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                IndexError::parse(format!(
                    "unexpected end of data: need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> IndexResult<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u1(&mut self) -> IndexResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u2(&mut self) -> IndexResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u4(&mut self) -> IndexResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i4(&mut self) -> IndexResult<i32> {
        Ok(self.u4()? as i32)
    }

    pub fn u8(&mut self) -> IndexResult<u64> {
        let hi = self.u4()? as u64;
        let lo = self.u4()? as u64;
        Ok((hi << 32) | lo)
    }

    /// Reads a `u4` length followed by that many bytes.
    pub fn sized_block(&mut self) -> IndexResult<&'a [u8]> {
        let len = self.u4()? as usize;
        self.bytes(len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Slot 0 and the upper half of long/double entries.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

/// Resolved `owner.name:descriptor` triple of a field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn parse(reader: &mut ByteReader<'_>) -> IndexResult<Self> {
        let count = reader.u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.u1()?;
            let constant = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.bytes(len)?)?)
                }
                3 => Constant::Integer(reader.i4()?),
                4 => Constant::Float(f32::from_bits(reader.u4()?)),
                5 => Constant::Long(reader.u8()? as i64),
                6 => Constant::Double(f64::from_bits(reader.u8()?)),
                7 => Constant::Class(reader.u2()?),
                8 => Constant::String(reader.u2()?),
                9 => Constant::FieldRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                10 => Constant::MethodRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                12 => Constant::NameAndType {
                    name: reader.u2()?,
                    descriptor: reader.u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.u1()?,
                    reference: reader.u2()?,
                },
                16 => Constant::MethodType(reader.u2()?),
                17 => Constant::Dynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: reader.u2()?,
                    name_and_type: reader.u2()?,
                },
                19 => Constant::Module(reader.u2()?),
                20 => Constant::Package(reader.u2()?),
                other => {
                    return Err(IndexError::parse(format!(
                        "unknown constant pool tag {other} at entry {}",
                        entries.len()
                    )));
                }
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        if entries.len() != count.max(1) {
            return Err(IndexError::parse(
                "constant pool ends with a half long/double entry",
            ));
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> IndexResult<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(IndexError::parse(format!(
                "invalid constant pool index {index}"
            ))),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, index: u16) -> IndexResult<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: u16) -> IndexResult<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    /// Like [`class_name`](Self::class_name) but treats index 0 as "no class".
    pub fn optional_class_name(&self, index: u16) -> IndexResult<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub fn name_and_type(&self, index: u16) -> IndexResult<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    pub fn field_ref(&self, index: u16) -> IndexResult<MemberRef<'_>> {
        match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => self.member(*class, *name_and_type),
            other => Err(mismatch(index, "Fieldref", other)),
        }
    }

    /// Resolves both `Methodref` and `InterfaceMethodref` entries.
    pub fn method_ref(&self, index: u16) -> IndexResult<MemberRef<'_>> {
        match self.get(index)? {
            Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => self.member(*class, *name_and_type),
            other => Err(mismatch(index, "Methodref", other)),
        }
    }

    fn member(&self, class: u16, name_and_type: u16) -> IndexResult<MemberRef<'_>> {
        let owner = self.class_name(class)?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner,
            name,
            descriptor,
        })
    }
}

fn mismatch(index: u16, expected: &str, found: &Constant) -> IndexError {
    IndexError::parse(format!(
        "constant pool entry {index} should be {expected}, found {found:?}"
    ))
}

/// Decodes the JVM's modified UTF-8: `0xC0 0x80` for NUL and surrogate pairs
/// encoded as two three-byte sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> IndexResult<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        if b0 & 0x80 == 0 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push(((b0 & 0x1F) << 6) | b1);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push(((b0 & 0x0F) << 12) | (b1 << 6) | b2);
            i += 3;
        } else {
            return Err(IndexError::parse(format!(
                "invalid modified UTF-8 lead byte {b0:#04x}"
            )));
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], at: usize) -> IndexResult<u16> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(IndexError::parse("truncated modified UTF-8 sequence")),
    }
}
