//! Class-file walker.
//!
//! One linear pass over the class file feeds a [`ClassRecordBuilder`]; the
//! builder is finalized into an immutable [`ClassRecord`] once the last
//! attribute has been read. Method bodies are scanned instruction by
//! instruction and only field access, method calls and class-literal loads
//! produce references.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;
use zip::ZipArchive;

use crate::annotation::{Annotation, AnnotationValue, Scalar};
use crate::bytecode::{ByteReader, Constant, ConstantPool, MAGIC, MemberRef};
use crate::descriptor::{self, OBJECT};
use crate::error::{IndexError, IndexResult};
use crate::record::{ClassRecord, FieldInfo, MethodInfo, RefKind, Reference, access};

const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const CODE: &str = "Code";
const CONSTRUCTOR: &str = "<init>";

pub type AnnotationFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Rejects reflection-metadata markers emitted by the Kotlin and Scala compilers.
pub fn default_annotation_filter(descriptor: &str) -> bool {
    !descriptor.ends_with("kotlin/Metadata;") && !descriptor.contains("scala/reflect/")
}

#[derive(Clone)]
pub struct IndexOptions {
    pub collect_references: bool,
    /// Called with the raw type descriptor of every annotation before it is
    /// decoded; `false` skips it.
    pub annotation_filter: AnnotationFilter,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            collect_references: true,
            annotation_filter: Arc::new(default_annotation_filter),
        }
    }
}

impl IndexOptions {
    pub fn without_references() -> Self {
        Self {
            collect_references: false,
            ..Self::default()
        }
    }
}

impl fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexOptions")
            .field("collect_references", &self.collect_references)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Class,
    Field,
    Method,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Target::Class => "class",
            Target::Field => "field",
            Target::Method => "method",
        }
    }
}

/// Accumulates one class while the walker moves through the file.
#[derive(Debug)]
pub struct ClassRecordBuilder {
    record: ClassRecord,
    raw_super: Option<String>,
    collect_references: bool,
}

impl ClassRecordBuilder {
    pub fn new(
        name: &str,
        access_flags: u16,
        raw_super: Option<&str>,
        interfaces: Vec<String>,
        collect_references: bool,
    ) -> Self {
        let mut record = ClassRecord::new(name);
        record.access = access_flags;
        record.super_class = raw_super.filter(|s| *s != OBJECT).map(str::to_string);
        record.interfaces = interfaces;
        Self {
            record,
            raw_super: raw_super.map(str::to_string),
            collect_references,
        }
    }

    fn annotation_references(&mut self, target: Target, annotations: &[Annotation]) {
        if !self.collect_references {
            return;
        }
        for annotation in annotations {
            self.record.add_reference(Reference::new(
                annotation.type_name.clone(),
                annotation.usage_key(target.as_str()),
                RefKind::Annotation,
            ));
        }
    }

    pub fn add_field(&mut self, field: FieldInfo) {
        self.annotation_references(Target::Field, &field.annotations);
        self.record.fields.insert(field.name.clone(), field);
    }

    pub fn add_method(&mut self, method: MethodInfo) {
        self.annotation_references(Target::Method, &method.annotations);
        self.record.methods.insert(method.key(), method);
    }

    pub fn add_class_annotations(&mut self, annotations: Vec<Annotation>) {
        self.annotation_references(Target::Class, &annotations);
        self.record.annotations.extend(annotations);
    }

    pub fn field_insn(&mut self, field: MemberRef<'_>) {
        self.record
            .add_reference(Reference::new(field.owner, field.name, RefKind::Field));
    }

    pub fn method_insn(&mut self, method: MemberRef<'_>) -> IndexResult<()> {
        self.record.add_reference(Reference::new(
            method.owner,
            format!("{}{}", method.name, method.descriptor),
            RefKind::Method,
        ));
        for arg in descriptor::method_arguments(method.descriptor)? {
            if descriptor::is_primitive_element(arg) {
                continue;
            }
            let owner = descriptor::element_type(arg);
            if owner == OBJECT {
                continue;
            }
            self.record.add_reference(Reference::new(
                owner,
                descriptor::internal_name(arg),
                RefKind::Parameter,
            ));
        }
        Ok(())
    }

    pub fn class_literal(&mut self, name: &str) {
        if descriptor::is_primitive_element(name) {
            return;
        }
        self.record.add_reference(Reference::new(
            descriptor::element_type(name),
            format!("{name}.class"),
            RefKind::Class,
        ));
    }

    /// Whether `owner` is the superclass as written in the class file,
    /// `java/lang/Object` included.
    fn is_super(&self, owner: &str) -> bool {
        self.raw_super.as_deref() == Some(owner)
    }

    pub fn finish(self) -> ClassRecord {
        self.record
    }
}

/// Indexes one class file. Package and module descriptors yield `Ok(None)`.
pub fn index_class(bytes: &[u8], options: &IndexOptions) -> IndexResult<Option<ClassRecord>> {
    let mut r = ByteReader::new(bytes);
    let magic = r.u4()?;
    if magic != MAGIC {
        return Err(IndexError::parse(format!("bad class magic {magic:#010x}")));
    }
    r.skip(4)?; // minor, major

    let pool = ConstantPool::parse(&mut r)?;
    let access_flags = r.u2()?;
    let name = pool.class_name(r.u2()?)?;
    if access_flags & access::MODULE != 0
        || name.ends_with("package-info")
        || name.ends_with("module-info")
    {
        return Ok(None);
    }
    let super_name = pool.optional_class_name(r.u2()?)?;

    let interface_count = r.u2()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(r.u2()?)?.to_string());
    }

    let mut builder = ClassRecordBuilder::new(
        name,
        access_flags,
        super_name,
        interfaces,
        options.collect_references,
    );

    for _ in 0..r.u2()? {
        let field = read_field(&mut r, &pool, options)?;
        builder.add_field(field);
    }
    for _ in 0..r.u2()? {
        let method = read_method(&mut r, &pool, options, &mut builder)?;
        builder.add_method(method);
    }

    let mut class_annotations = Vec::new();
    for _ in 0..r.u2()? {
        let attr_name = pool.utf8(r.u2()?)?;
        let body = r.sized_block()?;
        if attr_name == RUNTIME_VISIBLE_ANNOTATIONS {
            class_annotations.extend(read_annotations(body, &pool, options)?);
        }
    }
    builder.add_class_annotations(class_annotations);

    Ok(Some(builder.finish()))
}

fn read_field(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    options: &IndexOptions,
) -> IndexResult<FieldInfo> {
    let access_flags = r.u2()?;
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();
    let mut annotations = Vec::new();
    for _ in 0..r.u2()? {
        let attr_name = pool.utf8(r.u2()?)?;
        let body = r.sized_block()?;
        if attr_name == RUNTIME_VISIBLE_ANNOTATIONS {
            annotations.extend(read_annotations(body, pool, options)?);
        }
    }
    Ok(FieldInfo {
        name,
        descriptor,
        access: access_flags,
        annotations,
    })
}

fn read_method(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    options: &IndexOptions,
    builder: &mut ClassRecordBuilder,
) -> IndexResult<MethodInfo> {
    let access_flags = r.u2()?;
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();
    let mut annotations = Vec::new();
    for _ in 0..r.u2()? {
        let attr_name = pool.utf8(r.u2()?)?;
        let body = r.sized_block()?;
        match attr_name {
            RUNTIME_VISIBLE_ANNOTATIONS => {
                annotations.extend(read_annotations(body, pool, options)?)
            }
            CODE if options.collect_references => {
                read_code(body, pool, name == CONSTRUCTOR, builder)?
            }
            _ => {}
        }
    }
    Ok(MethodInfo {
        name,
        descriptor,
        access: access_flags,
        annotations,
    })
}

fn read_code(
    body: &[u8],
    pool: &ConstantPool,
    constructor: bool,
    builder: &mut ClassRecordBuilder,
) -> IndexResult<()> {
    let mut r = ByteReader::new(body);
    r.skip(4)?; // max_stack, max_locals
    let code = r.sized_block()?;
    walk_instructions(code, pool, constructor, builder)
}

fn walk_instructions(
    code: &[u8],
    pool: &ConstantPool,
    constructor: bool,
    builder: &mut ClassRecordBuilder,
) -> IndexResult<()> {
    let mut r = ByteReader::new(code);
    let mut super_call_pending = constructor;

    while r.remaining() > 0 {
        let pc = r.position();
        let opcode = r.u1()?;
        match opcode {
            // getstatic, putstatic, getfield, putfield
            0xb2..=0xb5 => builder.field_insn(pool.field_ref(r.u2()?)?),
            // invokevirtual, invokespecial, invokestatic
            0xb6..=0xb8 => {
                let method = pool.method_ref(r.u2()?)?;
                if opcode == 0xb7
                    && super_call_pending
                    && method.name == CONSTRUCTOR
                    && builder.is_super(method.owner)
                {
                    super_call_pending = false;
                    continue;
                }
                builder.method_insn(method)?;
            }
            // invokeinterface
            0xb9 => {
                builder.method_insn(pool.method_ref(r.u2()?)?)?;
                r.skip(2)?;
            }
            // ldc, ldc_w
            0x12 | 0x13 => {
                let index = if opcode == 0x12 {
                    r.u1()? as u16
                } else {
                    r.u2()?
                };
                if let Constant::Class(name) = pool.get(index)? {
                    builder.class_literal(pool.utf8(*name)?);
                }
            }
            // tableswitch
            0xaa => {
                skip_padding(&mut r, pc)?;
                r.skip(4)?;
                let low = r.i4()?;
                let high = r.i4()?;
                if high < low {
                    return Err(IndexError::parse(format!(
                        "tableswitch at {pc} has high {high} < low {low}"
                    )));
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                r.skip(entries * 4)?;
            }
            // lookupswitch
            0xab => {
                skip_padding(&mut r, pc)?;
                r.skip(4)?;
                let pairs = r.i4()?;
                if pairs < 0 {
                    return Err(IndexError::parse(format!(
                        "lookupswitch at {pc} has {pairs} pairs"
                    )));
                }
                r.skip(pairs as usize * 8)?;
            }
            // wide
            0xc4 => {
                let widened = r.u1()?;
                r.skip(if widened == 0x84 { 4 } else { 2 })?;
            }
            other => {
                let operands = operand_len(other).ok_or_else(|| {
                    IndexError::parse(format!("unknown opcode {other:#04x} at {pc}"))
                })?;
                r.skip(operands)?;
            }
        }
    }
    Ok(())
}

fn skip_padding(r: &mut ByteReader<'_>, pc: usize) -> IndexResult<()> {
    r.skip((4 - (pc + 1) % 4) % 4)
}

/// Operand byte count of every fixed-length opcode.
fn operand_len(opcode: u8) -> Option<usize> {
    Some(match opcode {
        0x00..=0x0f => 0,
        0x10 => 1,
        0x11 => 2,
        0x14 => 2,
        0x15..=0x19 => 1,
        0x1a..=0x35 => 0,
        0x36..=0x3a => 1,
        0x3b..=0x83 => 0,
        0x84 => 2,
        0x85..=0x98 => 0,
        0x99..=0xa8 => 2,
        0xa9 => 1,
        0xac..=0xb1 => 0,
        0xba => 4,
        0xbb => 2,
        0xbc => 1,
        0xbd => 2,
        0xbe | 0xbf => 0,
        0xc0 | 0xc1 => 2,
        0xc2 | 0xc3 => 0,
        0xc5 => 3,
        0xc6 | 0xc7 => 2,
        0xc8 | 0xc9 => 4,
        _ => return None,
    })
}

fn read_annotations(
    body: &[u8],
    pool: &ConstantPool,
    options: &IndexOptions,
) -> IndexResult<Vec<Annotation>> {
    let mut r = ByteReader::new(body);
    let count = r.u2()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if let Some(annotation) = read_annotation(&mut r, pool, options)? {
            out.push(annotation);
        }
    }
    Ok(out)
}

/// Reads one annotation structure; a filtered type is consumed and dropped.
fn read_annotation(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    options: &IndexOptions,
) -> IndexResult<Option<Annotation>> {
    let descriptor = pool.utf8(r.u2()?)?;
    let keep = (options.annotation_filter)(descriptor);
    let mut annotation = Annotation::new(descriptor);
    for _ in 0..r.u2()? {
        let name = pool.utf8(r.u2()?)?;
        if let Some(value) = read_element_value(r, pool, options)? {
            annotation.members.insert(name.to_string(), value);
        }
    }
    Ok(keep.then_some(annotation))
}

fn read_element_value(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    options: &IndexOptions,
) -> IndexResult<Option<AnnotationValue>> {
    let tag = r.u1()?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => {
            let Constant::Integer(v) = *pool.get(r.u2()?)? else {
                return Err(IndexError::parse("annotation constant should be Integer"));
            };
            let scalar = match tag {
                b'B' => Scalar::Byte(v as i8),
                b'C' => Scalar::Char(char::from_u32(v as u32).unwrap_or(char::REPLACEMENT_CHARACTER)),
                b'S' => Scalar::Short(v as i16),
                b'Z' => Scalar::Boolean(v != 0),
                _ => Scalar::Int(v),
            };
            AnnotationValue::Scalar { value: scalar }
        }
        b'J' | b'F' | b'D' | b's' => {
            let scalar = match (tag, pool.get(r.u2()?)?) {
                (b'J', Constant::Long(v)) => Scalar::Long(*v),
                (b'F', Constant::Float(v)) => Scalar::Float(*v),
                (b'D', Constant::Double(v)) => Scalar::Double(*v),
                (b's', Constant::Utf8(v)) => Scalar::String(v.clone()),
                (_, other) => {
                    return Err(IndexError::parse(format!(
                        "annotation element '{}' points at {other:?}",
                        tag as char
                    )));
                }
            };
            AnnotationValue::Scalar { value: scalar }
        }
        b'e' => {
            let type_descriptor = pool.utf8(r.u2()?)?;
            let constant = pool.utf8(r.u2()?)?;
            AnnotationValue::enum_constant(type_descriptor, constant)
        }
        b'c' => AnnotationValue::class_literal(pool.utf8(r.u2()?)?),
        b'@' => match read_annotation(r, pool, options)? {
            Some(annotation) => AnnotationValue::Annotation { annotation },
            None => return Ok(None),
        },
        b'[' => {
            let count = r.u2()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                if let Some(v) = read_element_value(r, pool, options)? {
                    values.push(v);
                }
            }
            AnnotationValue::List { values }
        }
        other => {
            return Err(IndexError::parse(format!(
                "unknown annotation element tag {other:#04x}"
            )));
        }
    };
    Ok(Some(value))
}

/// Whether a jar entry takes part in indexing.
pub fn is_indexable_entry(name: &str) -> bool {
    name.ends_with(".class") && !name.starts_with("META-INF/")
}

/// Indexes every class of a jar. The first malformed class fails the whole jar.
pub fn index_jar(bytes: &[u8], options: &IndexOptions) -> IndexResult<Vec<ClassRecord>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut records = Vec::new();
    let mut buf = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !is_indexable_entry(entry.name()) {
            continue;
        }
        buf.clear();
        entry.read_to_end(&mut buf)?;
        let record = index_class(&buf, options)
            .map_err(|e| IndexError::parse(format!("{}: {e}", entry.name())))?;
        records.extend(record);
    }
    Ok(records)
}
