//! Builders for synthetic classfiles and jars, shared by unit and
//! integration tests.

use std::io::Write;
use std::path::Path;

use zip::write::FileOptions;
use zip::ZipWriter;

const MAGIC: u32 = 0xCAFE_BABE;

/// Builds a minimal but structurally valid classfile: real constant pool,
/// no code attributes.
pub struct ClassFileBuilder {
    pool: Vec<PoolEntry>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16, u16)>,
    methods: Vec<(u16, u16, u16)>,
}

enum PoolEntry {
    Utf8(String),
    Class(u16),
}

impl ClassFileBuilder {
    pub fn new(binary_name: &str, access_flags: u16) -> Self {
        let mut builder = ClassFileBuilder {
            pool: Vec::new(),
            access_flags,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        builder.this_class = builder.class_entry(binary_name);
        builder
    }

    pub fn super_class(mut self, binary_name: &str) -> Self {
        self.super_class = self.class_entry(binary_name);
        self
    }

    pub fn interface(mut self, binary_name: &str) -> Self {
        let entry = self.class_entry(binary_name);
        self.interfaces.push(entry);
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.fields.push((access, name, descriptor));
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.push((access, name, descriptor));
        self
    }

    fn utf8(&mut self, value: &str) -> u16 {
        self.pool.push(PoolEntry::Utf8(value.to_string()));
        self.pool.len() as u16
    }

    fn class_entry(&mut self, binary_name: &str) -> u16 {
        let name_index = self.utf8(&binary_name.replace('.', "/"));
        self.pool.push(PoolEntry::Class(name_index));
        self.pool.len() as u16
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)
        out.extend_from_slice(&(self.pool.len() as u16 + 1).to_be_bytes());
        for entry in &self.pool {
            match entry {
                PoolEntry::Utf8(s) => {
                    out.push(1);
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                PoolEntry::Class(index) => {
                    out.push(7);
                    out.extend_from_slice(&index.to_be_bytes());
                }
            }
        }
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        for list in [&self.fields, &self.methods] {
            out.extend_from_slice(&(list.len() as u16).to_be_bytes());
            for (access, name, descriptor) in list {
                out.extend_from_slice(&access.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&descriptor.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes()); // no attributes
            }
        }
        out
    }
}

/// Write a jar containing plain public classes with the given binary names.
pub fn write_jar(path: &Path, class_names: &[&str]) {
    let file = std::fs::File::create(path).expect("create jar");
    let mut jar = ZipWriter::new(file);
    for name in class_names {
        let entry = format!("{}.class", name.replace('.', "/"));
        jar.start_file(entry, FileOptions::default())
            .expect("start jar entry");
        let bytes = ClassFileBuilder::new(name, 0x0021).build();
        jar.write_all(&bytes).expect("write class bytes");
    }
    jar.finish().expect("finish jar");
}
