//! Minimal class-file assembler for fixtures.
//!
//! Emits just enough structure for the indexer: constant pool, members,
//! `Code` bodies from a tiny instruction set, and visible annotations. Stack
//! maps are never written, so the output would not pass the JVM verifier.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_SUPER: u16 = 0x0020;

#[derive(Debug, Clone)]
pub enum Insn {
    Return,
    AconstNull,
    Pop,
    GetStatic(&'static str, &'static str, &'static str),
    GetField(&'static str, &'static str, &'static str),
    PutField(&'static str, &'static str, &'static str),
    InvokeVirtual(&'static str, &'static str, &'static str),
    InvokeSpecial(&'static str, &'static str, &'static str),
    InvokeStatic(&'static str, &'static str, &'static str),
    InvokeInterface(&'static str, &'static str, &'static str),
    /// `ldc` of a class constant.
    Ldc(&'static str),
    /// `tableswitch` with every target pointing at the next instruction.
    TableSwitch(i32, i32),
}

#[derive(Debug, Clone)]
pub enum ElementValue {
    Int(i32),
    String(&'static str),
    Enum(&'static str, &'static str),
    Class(&'static str),
    Array(Vec<ElementValue>),
    Annotation(&'static str, Vec<(&'static str, ElementValue)>),
}

type AnnotationSpec = (&'static str, Vec<(&'static str, ElementValue)>);

#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(i) = self.index.get(&entry) {
            return *i;
        }
        self.entries.push(entry.clone());
        let i = self.entries.len() as u16;
        self.index.insert(entry, i);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut e = vec![1];
        e.extend_from_slice(&(s.len() as u16).to_be_bytes());
        e.extend_from_slice(s.as_bytes());
        self.add(e)
    }

    fn int(&mut self, v: i32) -> u16 {
        let mut e = vec![3];
        e.extend_from_slice(&v.to_be_bytes());
        self.add(e)
    }

    fn class(&mut self, name: &str) -> u16 {
        let n = self.utf8(name);
        let mut e = vec![7];
        e.extend_from_slice(&n.to_be_bytes());
        self.add(e)
    }

    fn name_and_type(&mut self, name: &str, desc: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(desc);
        let mut e = vec![12];
        e.extend_from_slice(&n.to_be_bytes());
        e.extend_from_slice(&d.to_be_bytes());
        self.add(e)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, desc: &str) -> u16 {
        let c = self.class(owner);
        let nt = self.name_and_type(name, desc);
        let mut e = vec![tag];
        e.extend_from_slice(&c.to_be_bytes());
        e.extend_from_slice(&nt.to_be_bytes());
        self.add(e)
    }
}

struct Member {
    access: u16,
    name: &'static str,
    descriptor: &'static str,
    code: Option<Vec<Insn>>,
    annotations: Vec<AnnotationSpec>,
}

pub struct ClassFile {
    name: &'static str,
    super_name: Option<&'static str>,
    access: u16,
    interfaces: Vec<&'static str>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    annotations: Vec<AnnotationSpec>,
}

impl ClassFile {
    pub fn new(name: &'static str, super_name: &'static str) -> Self {
        Self {
            name,
            super_name: Some(super_name),
            access: ACC_PUBLIC | ACC_SUPER,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn interface(&mut self, name: &'static str) -> &mut Self {
        self.interfaces.push(name);
        self
    }

    pub fn field(&mut self, access: u16, name: &'static str, descriptor: &'static str) -> &mut Self {
        self.fields.push(Member {
            access,
            name,
            descriptor,
            code: None,
            annotations: Vec::new(),
        });
        self
    }

    pub fn method(
        &mut self,
        access: u16,
        name: &'static str,
        descriptor: &'static str,
        code: Vec<Insn>,
    ) -> &mut Self {
        self.methods.push(Member {
            access,
            name,
            descriptor,
            code: Some(code),
            annotations: Vec::new(),
        });
        self
    }

    /// Annotates the most recently added method.
    pub fn method_annotation(
        &mut self,
        descriptor: &'static str,
        members: Vec<(&'static str, ElementValue)>,
    ) -> &mut Self {
        if let Some(m) = self.methods.last_mut() {
            m.annotations.push((descriptor, members));
        }
        self
    }

    pub fn class_annotation(
        &mut self,
        descriptor: &'static str,
        members: Vec<(&'static str, ElementValue)>,
    ) -> &mut Self {
        self.annotations.push((descriptor, members));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let mut body = Vec::new();

        let this = pool.class(self.name);
        let sup = self.super_name.map(|s| pool.class(s)).unwrap_or(0);
        put_u2(&mut body, self.access);
        put_u2(&mut body, this);
        put_u2(&mut body, sup);
        put_u2(&mut body, self.interfaces.len() as u16);
        for i in &self.interfaces {
            let idx = pool.class(i);
            put_u2(&mut body, idx);
        }

        for members in [&self.fields, &self.methods] {
            put_u2(&mut body, members.len() as u16);
            for m in members.iter() {
                write_member(&mut pool, &mut body, m);
            }
        }

        let mut attrs = Vec::new();
        if !self.annotations.is_empty() {
            attrs.push(annotations_attribute(&mut pool, &self.annotations));
        }
        put_u2(&mut body, attrs.len() as u16);
        for a in attrs {
            body.extend(a);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, 61);
        put_u2(&mut out, pool.entries.len() as u16 + 1);
        for e in &pool.entries {
            out.extend_from_slice(e);
        }
        out.extend(body);
        out
    }
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn attribute(pool: &mut Pool, name: &str, data: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    put_u2(&mut out, pool.utf8(name));
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend(data);
    out
}

fn write_member(pool: &mut Pool, out: &mut Vec<u8>, m: &Member) {
    put_u2(out, m.access);
    put_u2(out, pool.utf8(m.name));
    put_u2(out, pool.utf8(m.descriptor));

    let mut attrs = Vec::new();
    if let Some(code) = &m.code {
        let bytes = assemble(pool, code);
        let mut data = Vec::new();
        put_u2(&mut data, 8);
        put_u2(&mut data, 8);
        data.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        data.extend(bytes);
        put_u2(&mut data, 0);
        put_u2(&mut data, 0);
        attrs.push(attribute(pool, "Code", data));
    }
    if !m.annotations.is_empty() {
        attrs.push(annotations_attribute(pool, &m.annotations));
    }
    put_u2(out, attrs.len() as u16);
    for a in attrs {
        out.extend(a);
    }
}

fn assemble(pool: &mut Pool, code: &[Insn]) -> Vec<u8> {
    let mut out = Vec::new();
    for insn in code {
        let (op, idx) = match insn {
            Insn::Return => {
                out.push(0xb1);
                continue;
            }
            Insn::AconstNull => {
                out.push(0x01);
                continue;
            }
            Insn::Pop => {
                out.push(0x57);
                continue;
            }
            Insn::GetStatic(o, n, d) => (0xb2, pool.member(9, o, n, d)),
            Insn::GetField(o, n, d) => (0xb4, pool.member(9, o, n, d)),
            Insn::PutField(o, n, d) => (0xb5, pool.member(9, o, n, d)),
            Insn::InvokeVirtual(o, n, d) => (0xb6, pool.member(10, o, n, d)),
            Insn::InvokeSpecial(o, n, d) => (0xb7, pool.member(10, o, n, d)),
            Insn::InvokeStatic(o, n, d) => (0xb8, pool.member(10, o, n, d)),
            Insn::InvokeInterface(o, n, d) => {
                out.push(0xb9);
                put_u2(&mut out, pool.member(11, o, n, d));
                out.push(1);
                out.push(0);
                continue;
            }
            Insn::Ldc(name) => (0x13, pool.class(name)),
            Insn::TableSwitch(low, high) => {
                let pc = out.len();
                out.push(0xaa);
                while out.len() % 4 != 0 {
                    out.push(0);
                }
                let entries = (high - low + 1) as usize;
                let end = (out.len() + 12 + entries * 4 - pc) as i32;
                out.extend_from_slice(&end.to_be_bytes());
                out.extend_from_slice(&low.to_be_bytes());
                out.extend_from_slice(&high.to_be_bytes());
                for _ in 0..entries {
                    out.extend_from_slice(&end.to_be_bytes());
                }
                continue;
            }
        };
        out.push(op);
        put_u2(&mut out, idx);
    }
    out
}

fn annotations_attribute(pool: &mut Pool, annotations: &[AnnotationSpec]) -> Vec<u8> {
    let mut data = Vec::new();
    put_u2(&mut data, annotations.len() as u16);
    for (desc, members) in annotations {
        write_annotation(pool, &mut data, desc, members);
    }
    attribute(pool, "RuntimeVisibleAnnotations", data)
}

fn write_annotation(
    pool: &mut Pool,
    out: &mut Vec<u8>,
    desc: &str,
    members: &[(&'static str, ElementValue)],
) {
    put_u2(out, pool.utf8(desc));
    put_u2(out, members.len() as u16);
    for (name, value) in members {
        put_u2(out, pool.utf8(name));
        write_element(pool, out, value);
    }
}

fn write_element(pool: &mut Pool, out: &mut Vec<u8>, value: &ElementValue) {
    match value {
        ElementValue::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.int(*v));
        }
        ElementValue::String(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        ElementValue::Enum(desc, constant) => {
            out.push(b'e');
            put_u2(out, pool.utf8(desc));
            put_u2(out, pool.utf8(constant));
        }
        ElementValue::Class(desc) => {
            out.push(b'c');
            put_u2(out, pool.utf8(desc));
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for v in values {
                write_element(pool, out, v);
            }
        }
        ElementValue::Annotation(desc, members) => {
            out.push(b'@');
            write_annotation(pool, out, desc, members);
        }
    }
}

/// Builds an in-memory jar from `(entry name, content)` pairs.
pub fn jar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in bytes {
        crc ^= u32::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// A single stored entry whose central directory record claims, through a
/// zip64 extra field, an uncompressed size of `u64::MAX`. The real content
/// and its checksum are intact.
pub fn jar_with_oversized_entry(name: &str, content: &[u8]) -> Vec<u8> {
    let crc = crc32(content);
    let len = content.len() as u32;
    let mut out = Vec::new();

    out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x0021u16.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(content);

    let central_start = out.len() as u32;
    out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x0021u16.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&12u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&0x0001u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&u64::MAX.to_le_bytes());
    let central_len = out.len() as u32 - central_start;

    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&central_len.to_le_bytes());
    out.extend_from_slice(&central_start.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}
