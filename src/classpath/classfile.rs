//! Minimal JVM classfile reader.
//!
//! Two levels of detail: [`parse_summary`] reads just enough to classify a
//! class during a classpath scan (name, access flags), and [`parse_class_file`]
//! additionally decodes fields and methods so a declaration stub can be
//! rendered for decompiled-source requests.

use thiserror::Error;

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error)]
pub enum ClassfileError {
    #[error("truncated classfile at offset {0}")]
    Truncated(usize),
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unknown constant pool tag {0}")]
    UnknownTag(u8),
    #[error("constant pool index {0} out of range")]
    BadPoolIndex(u16),
}

/// What a classfile declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    pub fn from_access_flags(flags: u16) -> Self {
        if flags & ACC_ANNOTATION != 0 {
            ClassKind::Annotation
        } else if flags & ACC_ENUM != 0 {
            ClassKind::Enum
        } else if flags & ACC_INTERFACE != 0 {
            ClassKind::Interface
        } else {
            ClassKind::Class
        }
    }
}

/// Header-level facts, enough for symbol indexing.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    /// Binary name with dots, e.g. `java.util.List`.
    pub binary_name: String,
    pub access_flags: u16,
    pub kind: ClassKind,
}

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

impl MemberInfo {
    pub fn is_synthetic(&self) -> bool {
        self.access_flags & ACC_SYNTHETIC != 0 || self.name.contains('$')
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }
}

/// Full structural view of one classfile.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub binary_name: String,
    pub access_flags: u16,
    pub kind: ClassKind,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, ClassfileError> {
        let v = *self
            .bytes
            .get(self.pos)
            .ok_or(ClassfileError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16, ClassfileError> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, ClassfileError> {
        Ok(u32::from_be_bytes([
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
        ]))
    }

    fn skip(&mut self, n: usize) -> Result<(), ClassfileError> {
        if self.pos + n > self.bytes.len() {
            return Err(ClassfileError::Truncated(self.pos));
        }
        self.pos += n;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassfileError> {
        if self.pos + n > self.bytes.len() {
            return Err(ClassfileError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Constant pool restricted to what we resolve: UTF-8 entries and class
/// references.
struct ConstantPool {
    utf8: Vec<Option<String>>,
    class_name_index: Vec<Option<u16>>,
}

impl ConstantPool {
    fn parse(reader: &mut Reader) -> Result<Self, ClassfileError> {
        let count = reader.u16()? as usize;
        let mut utf8 = vec![None; count];
        let mut class_name_index = vec![None; count];
        let mut i = 1;
        while i < count {
            let tag = reader.u8()?;
            match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.take(len)?;
                    utf8[i] = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                7 => class_name_index[i] = Some(reader.u16()?),
                8 | 16 | 19 | 20 => reader.skip(2)?,
                15 => reader.skip(3)?,
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => reader.skip(4)?,
                5 | 6 => {
                    reader.skip(8)?;
                    i += 1; // longs and doubles take two pool slots
                }
                other => return Err(ClassfileError::UnknownTag(other)),
            }
            i += 1;
        }
        Ok(ConstantPool {
            utf8,
            class_name_index,
        })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassfileError> {
        self.utf8
            .get(index as usize)
            .and_then(|s| s.as_deref())
            .ok_or(ClassfileError::BadPoolIndex(index))
    }

    fn class_name(&self, index: u16) -> Result<String, ClassfileError> {
        let name_index = self
            .class_name_index
            .get(index as usize)
            .and_then(|i| *i)
            .ok_or(ClassfileError::BadPoolIndex(index))?;
        Ok(self.utf8(name_index)?.replace('/', "."))
    }
}

/// Parse just the pieces a classpath scan needs.
pub fn parse_summary(bytes: &[u8]) -> Result<ClassSummary, ClassfileError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(ClassfileError::BadMagic(magic));
    }
    reader.skip(4)?; // minor + major version
    let pool = ConstantPool::parse(&mut reader)?;
    let access_flags = reader.u16()?;
    let this_class = reader.u16()?;
    let binary_name = pool.class_name(this_class)?;
    Ok(ClassSummary {
        binary_name,
        access_flags,
        kind: ClassKind::from_access_flags(access_flags),
    })
}

/// Parse the full structure needed for a declaration stub.
pub fn parse_class_file(bytes: &[u8]) -> Result<ClassFile, ClassfileError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(ClassfileError::BadMagic(magic));
    }
    reader.skip(4)?;
    let pool = ConstantPool::parse(&mut reader)?;
    let access_flags = reader.u16()?;
    let this_class = reader.u16()?;
    let super_class = reader.u16()?;
    let binary_name = pool.class_name(this_class)?;
    let superclass = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class)?)
    };

    let interface_count = reader.u16()? as usize;
    let mut interfaces = Vec::with_capacity(interface_count);
    for _ in 0..interface_count {
        let index = reader.u16()?;
        interfaces.push(pool.class_name(index)?);
    }

    let fields = parse_members(&mut reader, &pool)?;
    let methods = parse_members(&mut reader, &pool)?;

    Ok(ClassFile {
        binary_name,
        access_flags,
        kind: ClassKind::from_access_flags(access_flags),
        superclass,
        interfaces,
        fields,
        methods,
    })
}

fn parse_members(reader: &mut Reader, pool: &ConstantPool) -> Result<Vec<MemberInfo>, ClassfileError> {
    let count = reader.u16()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access_flags = reader.u16()?;
        let name = pool.utf8(reader.u16()?)?.to_string();
        let descriptor = pool.utf8(reader.u16()?)?.to_string();
        let attribute_count = reader.u16()? as usize;
        for _ in 0..attribute_count {
            reader.skip(2)?;
            let len = reader.u32()? as usize;
            reader.skip(len)?;
        }
        members.push(MemberInfo {
            access_flags,
            name,
            descriptor,
        });
    }
    Ok(members)
}

// ---- descriptors ----

/// Source-style type for a field descriptor, e.g. `[Ljava/lang/String;` →
/// `java.lang.String[]`.
pub fn field_type(descriptor: &str) -> String {
    let (ty, _) = parse_one_type(descriptor);
    ty
}

/// Parameter and return types of a method descriptor.
pub fn method_types(descriptor: &str) -> (Vec<String>, String) {
    let inner = descriptor
        .strip_prefix('(')
        .and_then(|d| d.split_once(')'))
        .unwrap_or(("", "V"));
    let mut params = Vec::new();
    let mut rest = inner.0;
    while !rest.is_empty() {
        let (ty, consumed) = parse_one_type(rest);
        if consumed == 0 {
            break;
        }
        params.push(ty);
        rest = &rest[consumed..];
    }
    let (ret, _) = parse_one_type(inner.1);
    (params, ret)
}

fn parse_one_type(descriptor: &str) -> (String, usize) {
    let mut chars = descriptor.chars();
    match chars.next() {
        Some('B') => ("byte".to_string(), 1),
        Some('C') => ("char".to_string(), 1),
        Some('D') => ("double".to_string(), 1),
        Some('F') => ("float".to_string(), 1),
        Some('I') => ("int".to_string(), 1),
        Some('J') => ("long".to_string(), 1),
        Some('S') => ("short".to_string(), 1),
        Some('Z') => ("boolean".to_string(), 1),
        Some('V') => ("void".to_string(), 1),
        Some('L') => match descriptor.find(';') {
            Some(end) => (descriptor[1..end].replace('/', "."), end + 1),
            None => ("java.lang.Object".to_string(), descriptor.len()),
        },
        Some('[') => {
            let (inner, consumed) = parse_one_type(&descriptor[1..]);
            (format!("{inner}[]"), consumed + 1)
        }
        _ => ("java.lang.Object".to_string(), 0),
    }
}

// ---- stub rendering ----

/// A rendered declaration stub for a decompiled-source document.
#[derive(Debug, Clone)]
pub struct DeclarationStub {
    pub text: String,
    /// Zero-based line of the class declaration.
    pub declaration_line: u32,
    /// Member name → zero-based line of its declaration in `text`.
    pub member_lines: Vec<(String, u32)>,
}

/// Render a Java-like declaration skeleton: header comment, class
/// declaration, public fields and method signatures with empty bodies.
pub fn render_stub(class: &ClassFile) -> DeclarationStub {
    let simple = class
        .binary_name
        .rsplit('.')
        .next()
        .unwrap_or(&class.binary_name);
    let package = class.binary_name.rsplit_once('.').map(|(p, _)| p);

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("// Decompiled from {}", class.binary_name));
    if let Some(pkg) = package {
        lines.push(format!("package {pkg};"));
    }
    lines.push(String::new());

    let keyword = match class.kind {
        ClassKind::Class => "class",
        ClassKind::Interface => "interface",
        ClassKind::Enum => "enum",
        ClassKind::Annotation => "@interface",
    };
    let mut decl = String::new();
    if class.access_flags & ACC_ABSTRACT != 0 && class.kind == ClassKind::Class {
        decl.push_str("abstract ");
    }
    decl.push_str(keyword);
    decl.push(' ');
    decl.push_str(simple);
    if let Some(superclass) = &class.superclass {
        if superclass != "java.lang.Object" {
            decl.push_str(" extends ");
            decl.push_str(superclass);
        }
    }
    if !class.interfaces.is_empty() {
        decl.push_str(" implements ");
        decl.push_str(&class.interfaces.join(", "));
    }
    decl.push_str(" {");
    let declaration_line = lines.len() as u32;
    lines.push(decl);

    let mut member_lines = Vec::new();
    for field in class.fields.iter().filter(|f| !f.is_synthetic()) {
        let mut line = String::from("    ");
        if field.is_static() {
            line.push_str("static ");
        }
        line.push_str(&field_type(&field.descriptor));
        line.push(' ');
        line.push_str(&field.name);
        line.push(';');
        member_lines.push((field.name.clone(), lines.len() as u32));
        lines.push(line);
    }

    for method in class.methods.iter().filter(|m| !m.is_synthetic()) {
        let (params, ret) = method_types(&method.descriptor);
        let mut line = String::from("    ");
        if method.is_static() {
            line.push_str("static ");
        }
        let display_name = if method.name == "<init>" {
            simple.to_string()
        } else {
            format!("{ret} {}", method.name)
        };
        line.push_str(&display_name);
        line.push('(');
        line.push_str(&params.join(", "));
        line.push_str(") {}");
        let key = if method.name == "<init>" {
            simple.to_string()
        } else {
            method.name.clone()
        };
        member_lines.push((key, lines.len() as u32));
        lines.push(line);
    }

    lines.push("}".to_string());
    DeclarationStub {
        text: lines.join("\n") + "\n",
        declaration_line,
        member_lines,
    }
}

#[cfg(test)]
mod tests {
    use crate::classpath::test_support::ClassFileBuilder;
    use super::*;

    #[test]
    fn summary_reads_name_and_kind() {
        let bytes = ClassFileBuilder::new("com.example.Widget", 0x0021).build();
        let summary = parse_summary(&bytes).unwrap();
        assert_eq!(summary.binary_name, "com.example.Widget");
        assert_eq!(summary.kind, ClassKind::Class);

        let bytes = ClassFileBuilder::new("com.example.Marker", 0x0600 | ACC_ANNOTATION).build();
        assert_eq!(
            parse_summary(&bytes).unwrap().kind,
            ClassKind::Annotation
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = parse_summary(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap_err();
        assert!(matches!(err, ClassfileError::BadMagic(_)));
    }

    #[test]
    fn full_parse_reads_members() {
        let bytes = ClassFileBuilder::new("com.example.Widget", 0x0021)
            .super_class("java.lang.Object")
            .interface("java.io.Serializable")
            .field(0x0001, "name", "Ljava/lang/String;")
            .field(ACC_STATIC | 0x0001, "COUNT", "I")
            .method(0x0001, "<init>", "()V")
            .method(0x0001, "resize", "(II)Lcom/example/Widget;")
            .method(ACC_SYNTHETIC, "access$000", "()V")
            .build();
        let class = parse_class_file(&bytes).unwrap();
        assert_eq!(class.binary_name, "com.example.Widget");
        assert_eq!(class.superclass.as_deref(), Some("java.lang.Object"));
        assert_eq!(class.interfaces, vec!["java.io.Serializable".to_string()]);
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.methods.len(), 3);
    }

    #[test]
    fn descriptor_types() {
        assert_eq!(field_type("I"), "int");
        assert_eq!(field_type("[Ljava/lang/String;"), "java.lang.String[]");
        let (params, ret) = method_types("(I[JLjava/util/List;)Ljava/lang/String;");
        assert_eq!(params, vec!["int", "long[]", "java.util.List"]);
        assert_eq!(ret, "java.lang.String");
    }

    #[test]
    fn stub_skips_synthetic_members() {
        let bytes = ClassFileBuilder::new("com.example.Widget", 0x0021)
            .super_class("java.lang.Object")
            .field(0x0001, "name", "Ljava/lang/String;")
            .method(0x0001, "resize", "(II)V")
            .method(ACC_SYNTHETIC, "access$000", "()V")
            .build();
        let class = parse_class_file(&bytes).unwrap();
        let stub = render_stub(&class);

        assert!(stub.text.contains("class Widget {"));
        assert!(stub.text.contains("java.lang.String name;"));
        assert!(stub.text.contains("void resize(int, int) {}"));
        assert!(!stub.text.contains("access$000"));
        assert!(stub.member_lines.iter().any(|(n, _)| n == "resize"));
        // Object superclass is implied, not rendered.
        assert!(!stub.text.contains("extends java.lang.Object"));
    }
}
