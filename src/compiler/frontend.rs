//! Declaration-level Groovy frontend.
//!
//! A deliberately shallow implementation of the compilation contract: it
//! recognises packages, imports, class declarations with their members, and
//! the body statements the analysis core navigates (locals, calls, property
//! access, constructor calls). It does not evaluate anything and type-checks
//! only what can be decided from declarations.
//!
//! The analysis core is written against the [`CompilationUnit`] trait, so a
//! full compiler frontend can replace this module without touching the core.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Position, Range, Url};
use tracing::debug;
use walkdir::WalkDir;

use crate::compiler::ast::{
    AstNode, ClassData, ExprData, ExprKind, FieldData, ImportData, MethodData, Modifiers,
    NodeKind, ParameterData, PropertyData, VariableData,
};
use crate::compiler::errors::{CompilationError, CompileFault, ErrorCollector};
use crate::compiler::{
    ClassLoaderDescriptor, CompilationUnit, CompilationUnitFactory, CompilePhase, ModuleAst,
};
use crate::lsp::backend::contents_tracker::FileContentsTracker;

/// Simple names resolvable without a classpath: the default-import packages
/// every Groovy source sees. Kept small on purpose; anything outside it that
/// fails project and import resolution is reported unresolved.
const WELL_KNOWN_SIMPLE_NAMES: &[&str] = &[
    "Object", "String", "Integer", "Long", "Short", "Byte", "Double", "Float", "Boolean",
    "Character", "Number", "CharSequence", "Comparable", "Iterable", "Runnable", "Thread",
    "Exception", "RuntimeException", "IllegalArgumentException", "IllegalStateException",
    "Throwable", "Error", "Math", "System", "StringBuilder", "Class", "Void", "BigDecimal",
    "BigInteger", "List", "ArrayList", "LinkedList", "Map", "HashMap", "LinkedHashMap",
    "TreeMap", "Set", "HashSet", "LinkedHashSet", "TreeSet", "Collection", "Collections",
    "Arrays", "Optional", "Iterator", "Date", "File", "IOException", "Closure", "GString",
    "Specification",
];

const PRIMITIVE_NAMES: &[&str] = &[
    "void", "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*package\s+([A-Za-z_$][\w.$]*)").unwrap());
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*import\s+(static\s+)?([A-Za-z_$][\w.$]*?)(\.\*)?\s*;?\s*$").unwrap()
});
static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*((?:(?:public|private|protected|static|final|abstract)\s+)*)(class|interface|enum|trait|@interface)\s+([A-Za-z_$][\w$]*)([^{]*)\{",
    )
    .unwrap()
});
static EXTENDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"extends\s+([A-Za-z_$][\w.$]*)").unwrap());
static IMPLEMENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"implements\s+([A-Za-z_$][\w.$<>,\s]*)").unwrap());
static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*((?:(?:public|private|protected|static|final|abstract|synchronized)\s+)*)(def|[A-Za-z_$][\w.$]*(?:<[^>]*>)?(?:\[\])?)\s+([a-zA-Z_$][\w$]*)\s*\(([^)]*)\)\s*\{?\s*$",
    )
    .unwrap()
});
static FEATURE_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*((?:(?:public|private|protected|static|final)\s+)*)def\s+(?:"([^"]+)"|'([^']+)')\s*\(\s*\)\s*\{?\s*$"#).unwrap()
});
static CTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*((?:(?:public|private|protected)\s+)*)([A-Z][\w$]*)\s*\(([^)]*)\)\s*\{?\s*$")
        .unwrap()
});
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*((?:(?:public|private|protected|static|final|transient|volatile)\s+)*)(def|[A-Za-z_$][\w.$]*(?:<[^>]*>)?(?:\[\])?)\s+([a-z_$][\w$]*)\s*(=.*)?$",
    )
    .unwrap()
});
static LOCAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(def|final|[A-Za-z_$][\w.$]*(?:<[^>]*>)?(?:\[\])?)\s+([a-z_$][\w$]*)\s*=\s*(.+)$",
    )
    .unwrap()
});
static NEW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"new\s+([A-Za-z_$][\w.$]*)\s*\(").unwrap());
static RECEIVER_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z_$][\w$]*)\.([a-zA-Z_$][\w$]*)\s*\(").unwrap());
static PROPERTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z_$][\w$]*)\.([a-z_$][\w$]*)\b").unwrap());

/// Factory for [`BasicCompilationUnit`], bound to the scope's extra
/// classpath entries.
pub struct BasicGroovyFrontend {
    extra_classpath: Vec<String>,
}

impl BasicGroovyFrontend {
    pub fn new(extra_classpath: Vec<String>) -> Self {
        BasicGroovyFrontend { extra_classpath }
    }
}

impl CompilationUnitFactory for BasicGroovyFrontend {
    fn create(
        &self,
        root: &Path,
        tracker: &FileContentsTracker,
        _forced_invalidations: &HashSet<Url>,
    ) -> anyhow::Result<Box<dyn CompilationUnit>> {
        let mut sources: HashMap<Url, Arc<String>> = HashMap::new();

        for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("groovy") {
                if let Ok(uri) = Url::from_file_path(path) {
                    match std::fs::read_to_string(path) {
                        Ok(text) => {
                            sources.insert(uri, Arc::new(text));
                        }
                        Err(e) => debug!("skipping unreadable source {}: {e}", path.display()),
                    }
                }
            }
        }
        // Open buffers override the on-disk view.
        for uri in tracker.open_uris() {
            if uri_under_root(&uri, root) {
                if let Some(text) = tracker.contents(&uri) {
                    sources.insert(uri, text);
                }
            }
        }

        let mut classpath_urls: Vec<String> = self.extra_classpath.clone();
        if let Ok(root_url) = Url::from_directory_path(root) {
            classpath_urls.push(root_url.to_string());
        }

        Ok(Box::new(BasicCompilationUnit {
            classpath_urls,
            sources: sources.into_iter().collect(),
            modules: Vec::new(),
            collector: ErrorCollector::new(),
        }))
    }
}

fn uri_under_root(uri: &Url, root: &Path) -> bool {
    uri.to_file_path()
        .map(|p| p.starts_with(root))
        .unwrap_or(false)
}

pub struct BasicCompilationUnit {
    classpath_urls: Vec<String>,
    sources: Vec<(Url, Arc<String>)>,
    modules: Vec<ModuleAst>,
    collector: ErrorCollector,
}

impl CompilationUnit for BasicCompilationUnit {
    fn compile(&mut self, phase: CompilePhase) -> Result<(), CompileFault> {
        self.collector = ErrorCollector::new();
        self.modules.clear();

        for (uri, text) in &self.sources {
            let module = parse_module(uri, text, &mut self.collector);
            self.modules.push(module);
        }

        if phase >= CompilePhase::Canonicalization {
            resolve_modules(&self.modules, &mut self.collector);
        }

        if self.collector.has_fatal() {
            Err(CompileFault::Failed)
        } else {
            Ok(())
        }
    }

    fn modules(&self) -> Vec<ModuleAst> {
        self.modules.clone()
    }

    fn classloader(&self) -> ClassLoaderDescriptor {
        ClassLoaderDescriptor::new(self.classpath_urls.clone())
    }

    fn target_directory(&self) -> Option<PathBuf> {
        None
    }

    fn source_units(&self) -> Vec<Url> {
        self.sources.iter().map(|(uri, _)| uri.clone()).collect()
    }

    fn error_collector(&self) -> ErrorCollector {
        self.collector.clone()
    }
}

// ---- lexical masking ----

/// Replace comment and string interiors with spaces, preserving offsets and
/// string delimiters, so line regexes only ever see code.
fn mask_non_code(text: &str, uri: &Url, collector: &mut ErrorCollector) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Single,
        Double,
        TripleSingle,
        TripleDouble,
    }
    let bytes: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = State::Code;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match c {
                '/' if next == Some('/') => {
                    state = State::LineComment;
                    out.push(' ');
                }
                '/' if next == Some('*') => {
                    state = State::BlockComment;
                    out.push(' ');
                }
                '\'' if next == Some('\'') && bytes.get(i + 2) == Some(&'\'') => {
                    state = State::TripleSingle;
                    out.push('\'');
                    out.push(' ');
                    out.push(' ');
                    i += 3;
                    continue;
                }
                '"' if next == Some('"') && bytes.get(i + 2) == Some(&'"') => {
                    state = State::TripleDouble;
                    out.push('"');
                    out.push(' ');
                    out.push(' ');
                    i += 3;
                    continue;
                }
                '\'' => {
                    state = State::Single;
                    out.push('\'');
                }
                '"' => {
                    state = State::Double;
                    out.push('"');
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = State::Code;
                    out.push(' ');
                    out.push(' ');
                    i += 2;
                    continue;
                }
                out.push(if c == '\n' { '\n' } else { ' ' });
            }
            State::Single | State::Double => {
                let quote = if state == State::Single { '\'' } else { '"' };
                if c == '\\' {
                    out.push(' ');
                    if next.is_some() {
                        out.push(' ');
                        i += 2;
                        continue;
                    }
                } else if c == quote {
                    state = State::Code;
                    out.push(quote);
                } else if c == '\n' {
                    // Unterminated single-line string.
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::TripleSingle | State::TripleDouble => {
                let quote = if state == State::TripleSingle { '\'' } else { '"' };
                if c == quote && next == Some(quote) && bytes.get(i + 2) == Some(&quote) {
                    state = State::Code;
                    out.push(' ');
                    out.push(' ');
                    out.push(quote);
                    i += 3;
                    continue;
                }
                out.push(if c == '\n' { '\n' } else { ' ' });
            }
        }
        i += 1;
    }

    if matches!(state, State::TripleSingle | State::TripleDouble) {
        let last = text.lines().count().saturating_sub(1) as u32;
        collector.push(CompilationError::fatal(
            "unterminated string literal",
            uri.clone(),
            Range::new(Position::new(last, 0), Position::new(last, 1)),
        ));
    }
    out
}

// ---- parsing ----

struct Line<'a> {
    no: u32,
    masked: &'a str,
    original: &'a str,
}

fn parse_module(uri: &Url, text: &str, collector: &mut ErrorCollector) -> ModuleAst {
    let masked = mask_non_code(text, uri, collector);
    let masked_lines: Vec<&str> = masked.split('\n').collect();
    let original_lines: Vec<&str> = text.split('\n').collect();
    let lines: Vec<Line> = masked_lines
        .iter()
        .enumerate()
        .map(|(i, m)| Line {
            no: i as u32,
            masked: m,
            original: original_lines.get(i).copied().unwrap_or(""),
        })
        .collect();

    check_brace_balance(uri, &lines, collector);

    let mut package = None;
    let mut nodes: Vec<Arc<AstNode>> = Vec::new();
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        if depth == 0 {
            if let Some(caps) = PACKAGE_RE.captures(line.masked) {
                package = Some(caps[1].to_string());
                depth += brace_delta(line.masked);
                i += 1;
                continue;
            }
            if let Some(caps) = IMPORT_RE.captures(line.masked) {
                let is_static = caps.get(1).is_some();
                let is_star = caps.get(3).is_some();
                let name = caps[2].to_string();
                nodes.push(AstNode::new(
                    NodeKind::Import(ImportData {
                        name,
                        is_star,
                        is_static,
                    }),
                    Some(line_range(line)),
                    vec![],
                ));
                depth += brace_delta(line.masked);
                i += 1;
                continue;
            }
            if let Some(caps) = CLASS_RE.captures(line.masked) {
                let end = find_block_end(&lines, i);
                let class = parse_class(&lines, i, end, &caps, package.as_deref());
                nodes.push(class);
                depth += brace_delta(line.masked);
                // Skip to the class body end; the body was parsed above.
                for skipped in &lines[i + 1..=end.min(lines.len() - 1)] {
                    depth += brace_delta(skipped.masked);
                }
                i = end + 1;
                continue;
            }
            // Loose script statement.
            parse_statement_into(&mut nodes, line);
        }
        depth += brace_delta(line.masked);
        i += 1;
    }

    ModuleAst {
        uri: uri.clone(),
        package,
        nodes,
    }
}

fn check_brace_balance(uri: &Url, lines: &[Line], collector: &mut ErrorCollector) {
    let mut depth: i32 = 0;
    for line in lines {
        depth += brace_delta(line.masked);
        if depth < 0 {
            collector.push(CompilationError::fatal(
                "unexpected token: }",
                uri.clone(),
                line_range(line),
            ));
            return;
        }
    }
    if depth > 0 {
        let last = lines.last().map(|l| l.no).unwrap_or(0);
        collector.push(CompilationError::fatal(
            "unexpected end of file, unclosed block",
            uri.clone(),
            Range::new(Position::new(last, 0), Position::new(last, 1)),
        ));
    }
}

fn brace_delta(masked: &str) -> i32 {
    masked.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// Index of the line on which the block opened at `start` closes.
fn find_block_end(lines: &[Line], start: usize) -> usize {
    let mut depth = 0;
    for (i, line) in lines.iter().enumerate().skip(start) {
        depth += brace_delta(line.masked);
        if i >= start && depth <= 0 && line.masked.contains('}') {
            return i;
        }
    }
    lines.len().saturating_sub(1)
}

fn line_range(line: &Line) -> Range {
    let text = line.original.trim_end();
    let start = (text.len() - text.trim_start().len()) as u32;
    Range::new(
        Position::new(line.no, start),
        Position::new(line.no, text.len() as u32),
    )
}

fn parse_class(
    lines: &[Line],
    start: usize,
    end: usize,
    caps: &regex::Captures,
    package: Option<&str>,
) -> Arc<AstNode> {
    let modifiers_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let keyword = &caps[2];
    let simple_name = caps[3].to_string();
    let tail = caps.get(4).map(|m| m.as_str()).unwrap_or("");

    let superclass = EXTENDS_RE.captures(tail).map(|c| c[1].to_string());
    let interfaces: Vec<String> = IMPLEMENTS_RE
        .captures(tail)
        .map(|c| {
            c[1].split(',')
                .map(|s| s.trim().trim_end_matches('{').trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let fqn = match package {
        Some(pkg) => format!("{pkg}.{simple_name}"),
        None => simple_name.clone(),
    };

    let mut children: Vec<Arc<AstNode>> = Vec::new();
    // Extends/implements clauses are type references worth navigating from.
    let header = &lines[start];
    if let Some(sup) = &superclass {
        if let Some(range) = name_range_in_line(header, sup) {
            children.push(AstNode::new(
                NodeKind::Expression(ExprData {
                    kind: ExprKind::ClassRef { name: sup.clone() },
                    inferred_type: None,
                }),
                Some(range),
                vec![],
            ));
        }
    }
    for interface in &interfaces {
        if let Some(range) = name_range_in_line(header, interface) {
            children.push(AstNode::new(
                NodeKind::Expression(ExprData {
                    kind: ExprKind::ClassRef {
                        name: interface.clone(),
                    },
                    inferred_type: None,
                }),
                Some(range),
                vec![],
            ));
        }
    }

    let mut depth = brace_delta(lines[start].masked);
    let mut i = start + 1;
    while i < lines.len() && i < end {
        let line = &lines[i];
        if depth == 1 {
            if let Some(member) = parse_member(lines, i, end, &simple_name) {
                let (node, body_end) = member;
                children.push(node);
                for skipped in &lines[i..=body_end.min(lines.len() - 1)] {
                    depth += brace_delta(skipped.masked);
                }
                i = body_end + 1;
                continue;
            }
        }
        depth += brace_delta(line.masked);
        i += 1;
    }

    let end_line = &lines[end.min(lines.len() - 1)];
    let close_col = end_line.masked.rfind('}').map(|c| c + 1).unwrap_or(0) as u32;
    let range = Range::new(
        Position::new(lines[start].no, leading_indent(lines[start].original)),
        Position::new(end_line.no, close_col.max(1)),
    );

    AstNode::new(
        NodeKind::Class(ClassData {
            name: fqn,
            superclass,
            interfaces,
            is_interface: keyword == "interface" || keyword == "trait",
            is_enum: keyword == "enum",
            is_annotation: keyword == "@interface",
            is_script: false,
            modifiers: parse_modifiers(modifiers_text),
        }),
        Some(range),
        children,
    )
}

fn leading_indent(original: &str) -> u32 {
    (original.len() - original.trim_start().len()) as u32
}

type ParsedMember = (Arc<AstNode>, usize);

fn parse_member(
    lines: &[Line],
    i: usize,
    class_end: usize,
    class_simple_name: &str,
) -> Option<ParsedMember> {
    let line = &lines[i];
    let trimmed = line.masked.trim();
    if trimmed.is_empty() || trimmed == "}" {
        return None;
    }

    if let Some(caps) = FEATURE_METHOD_RE.captures(line.original) {
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Some(parse_method_like(
            lines,
            i,
            class_end,
            name,
            "java.lang.Object".to_string(),
            parse_modifiers(&caps[1]),
            "",
            false,
        ));
    }

    if let Some(caps) = CTOR_RE.captures(line.masked) {
        if &caps[2] == class_simple_name {
            let params = caps[3].to_string();
            return Some(parse_method_like(
                lines,
                i,
                class_end,
                class_simple_name.to_string(),
                class_simple_name.to_string(),
                parse_modifiers(&caps[1]),
                &params,
                true,
            ));
        }
    }

    if let Some(caps) = METHOD_RE.captures(line.masked) {
        let return_type = if &caps[2] == "def" {
            "java.lang.Object".to_string()
        } else {
            caps[2].to_string()
        };
        let name = caps[3].to_string();
        let params = caps[4].to_string();
        return Some(parse_method_like(
            lines,
            i,
            class_end,
            name,
            return_type,
            parse_modifiers(&caps[1]),
            &params,
            false,
        ));
    }

    if let Some(caps) = FIELD_RE.captures(line.masked) {
        let type_name = if &caps[2] == "def" {
            "java.lang.Object".to_string()
        } else {
            caps[2].to_string()
        };
        let name = caps[3].to_string();
        let modifiers_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let modifiers = parse_modifiers(modifiers_text);
        let has_visibility = ["public", "private", "protected"]
            .iter()
            .any(|v| modifiers_text.split_whitespace().any(|w| w == *v));
        let node = if has_visibility {
            AstNode::new(
                NodeKind::Field(FieldData {
                    name,
                    type_name,
                    modifiers,
                }),
                Some(line_range(line)),
                vec![],
            )
        } else {
            AstNode::new(
                NodeKind::Property(PropertyData {
                    name,
                    type_name,
                    modifiers,
                }),
                Some(line_range(line)),
                vec![],
            )
        };
        return Some((node, i));
    }

    None
}

#[allow(clippy::too_many_arguments)]
fn parse_method_like(
    lines: &[Line],
    start: usize,
    class_end: usize,
    name: String,
    return_type: String,
    modifiers: Modifiers,
    params: &str,
    is_constructor: bool,
) -> ParsedMember {
    let header = &lines[start];
    let mut children: Vec<Arc<AstNode>> = params
        .split(',')
        .filter_map(|p| parse_parameter(header, p))
        .collect();

    let has_body = header.masked.contains('{');
    let body_end = if has_body {
        find_block_end(lines, start).min(class_end)
    } else {
        start
    };

    for line in lines.iter().take(body_end).skip(start + 1) {
        parse_statement_into(&mut children, line);
    }

    let end_line = &lines[body_end.min(lines.len() - 1)];
    let end_col = if has_body {
        end_line.masked.rfind('}').map(|c| c + 1).unwrap_or(1) as u32
    } else {
        end_line.original.trim_end().len() as u32
    };
    let range = Range::new(
        Position::new(header.no, leading_indent(header.original)),
        Position::new(end_line.no, end_col.max(1)),
    );

    let data = MethodData {
        name,
        return_type,
        modifiers,
    };
    let kind = if is_constructor {
        NodeKind::Constructor(data)
    } else {
        NodeKind::Method(data)
    };
    (AstNode::new(kind, Some(range), children), body_end)
}

fn parse_parameter(header: &Line, raw: &str) -> Option<Arc<AstNode>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut parts = raw.split_whitespace();
    let first = parts.next()?;
    let (type_name, name) = match parts.next() {
        Some(second) => {
            let t = if first == "def" || first == "final" {
                "java.lang.Object".to_string()
            } else {
                first.to_string()
            };
            (t, second.to_string())
        }
        None => ("java.lang.Object".to_string(), first.to_string()),
    };
    let name = name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '$');
    if name.is_empty() {
        return None;
    }
    let range = name_range_in_line(header, name);
    Some(AstNode::new(
        NodeKind::Parameter(ParameterData {
            name: name.to_string(),
            type_name,
        }),
        range,
        vec![],
    ))
}

/// Parse one body or script line into variable declarations and the
/// expressions worth indexing.
fn parse_statement_into(out: &mut Vec<Arc<AstNode>>, line: &Line) {
    let masked = line.masked;
    if masked.trim().is_empty() {
        return;
    }

    if let Some(caps) = LOCAL_RE.captures(masked) {
        let type_token = caps[1].to_string();
        let name = caps[2].to_string();
        let rhs_start = caps.get(3).unwrap().start();
        let rhs_original = safe_slice(line.original, rhs_start);

        let children = parse_expressions(line, rhs_start);
        let inferred = children
            .iter()
            .find_map(|c| match &c.kind {
                NodeKind::Expression(e) => match &e.kind {
                    ExprKind::ConstructorCall { type_name } => Some(type_name.clone()),
                    _ => None,
                },
                _ => None,
            })
            .or_else(|| infer_literal_type(rhs_original.trim()));

        let declared = if type_token == "def" || type_token == "final" {
            None
        } else {
            Some(type_token)
        };
        let name_match = caps.get(2).unwrap();
        out.push(AstNode::new(
            NodeKind::Variable(VariableData {
                name,
                declared_type: declared,
                inferred_type: inferred,
            }),
            Some(span_in_line(line, name_match.start(), name_match.end())),
            children,
        ));
        return;
    }

    out.extend(parse_expressions(line, 0));
}

/// Method calls, constructor calls and property accesses found on a line
/// from `from` onward.
fn parse_expressions(line: &Line, from: usize) -> Vec<Arc<AstNode>> {
    let masked = line.masked;
    let region = safe_slice(masked, from);
    let mut out = Vec::new();
    let mut call_name_spans: Vec<(usize, usize)> = Vec::new();

    for caps in RECEIVER_CALL_RE.captures_iter(region) {
        let receiver_match = caps.get(1).unwrap();
        let method_match = caps.get(2).unwrap();
        let receiver_start = from + receiver_match.start();
        let method_end = from + method_match.end();
        call_name_spans.push((from + method_match.start(), method_end));

        let receiver = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::VariableRef {
                    name: receiver_match.as_str().to_string(),
                },
                inferred_type: None,
            }),
            Some(span_in_line(line, receiver_start, from + receiver_match.end())),
            vec![],
        );
        let mut children = vec![receiver];
        children.extend(parse_arguments(line, method_end));
        let call_end = masked[method_end..]
            .find(')')
            .map(|o| method_end + o + 1)
            .unwrap_or(masked.len());
        out.push(AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::MethodCall {
                    name: method_match.as_str().to_string(),
                    has_receiver: true,
                },
                inferred_type: None,
            }),
            Some(span_in_line(line, receiver_start, call_end)),
            children,
        ));
    }

    if let Some(new_caps) = NEW_RE.captures(region) {
        let m = new_caps.get(1).unwrap();
        out.push(AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::ConstructorCall {
                    type_name: m.as_str().to_string(),
                },
                inferred_type: None,
            }),
            Some(span_in_line(line, from + m.start(), from + m.end())),
            vec![],
        ));
    }

    // Bare `receiver.property` accesses; names already claimed by a call
    // are skipped.
    for caps in PROPERTY_RE.captures_iter(region) {
        let receiver_match = caps.get(1).unwrap();
        let property_match = caps.get(2).unwrap();
        let property_start = from + property_match.start();
        let property_end = from + property_match.end();
        if call_name_spans
            .iter()
            .any(|(start, end)| property_start < *end && *start < property_end)
        {
            continue;
        }
        let followed_by_call = masked[property_end..]
            .chars()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| c == '(');
        if followed_by_call {
            continue;
        }
        let receiver = AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::VariableRef {
                    name: receiver_match.as_str().to_string(),
                },
                inferred_type: None,
            }),
            Some(span_in_line(
                line,
                from + receiver_match.start(),
                from + receiver_match.end(),
            )),
            vec![],
        );
        out.push(AstNode::new(
            NodeKind::Expression(ExprData {
                kind: ExprKind::PropertyAccess {
                    name: property_match.as_str().to_string(),
                },
                inferred_type: None,
            }),
            Some(span_in_line(line, from + receiver_match.start(), property_end)),
            vec![receiver],
        ));
    }

    out
}

/// Arguments of a call whose opening parenthesis follows `after` on the
/// line. Closure arguments come back as closure nodes, identifiers as
/// variable references, everything else as literal text.
fn parse_arguments(line: &Line, after: usize) -> Vec<Arc<AstNode>> {
    let masked = line.masked;
    let open = match masked[after..].find('(') {
        Some(o) => after + o,
        None => return Vec::new(),
    };
    let mut depth = 0;
    let mut close = masked.len();
    for (i, c) in masked[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = open + i;
                    break;
                }
            }
            _ => {}
        }
    }
    let interior = &masked[open + 1..close.min(masked.len())];
    if interior.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut start = 0;
    let mut paren = 0;
    for (i, c) in interior.char_indices() {
        match c {
            '(' | '[' | '{' => paren += 1,
            ')' | ']' | '}' => paren -= 1,
            ',' if paren == 0 => {
                args.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push((start, interior.len()));

    args.into_iter()
        .filter_map(|(s, e)| {
            let abs_start = open + 1 + s;
            let abs_end = open + 1 + e;
            let original = safe_slice_range(line.original, abs_start, abs_end);
            let trimmed = original.trim();
            if trimmed.is_empty() {
                return None;
            }
            let kind = if trimmed.starts_with('{') {
                ExprKind::Closure
            } else if is_identifier(trimmed) {
                ExprKind::VariableRef {
                    name: trimmed.to_string(),
                }
            } else {
                ExprKind::Literal {
                    text: trimmed.to_string(),
                }
            };
            Some(AstNode::new(
                NodeKind::Expression(ExprData {
                    kind,
                    inferred_type: None,
                }),
                Some(span_in_line(line, abs_start, abs_end)),
                vec![],
            ))
        })
        .collect()
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c == '$' || if i == 0 { c.is_alphabetic() } else { c.is_alphanumeric() })
}

fn infer_literal_type(rhs: &str) -> Option<String> {
    if rhs == "true" || rhs == "false" {
        return Some("boolean".to_string());
    }
    if rhs.starts_with('"') || rhs.starts_with('\'') {
        return Some("java.lang.String".to_string());
    }
    if !rhs.is_empty() && rhs.chars().all(|c| c.is_ascii_digit()) {
        return Some("int".to_string());
    }
    if rhs.parse::<f64>().is_ok() {
        return Some("java.math.BigDecimal".to_string());
    }
    if rhs.starts_with('[') {
        return Some(if rhs.contains(':') {
            "java.util.Map".to_string()
        } else {
            "java.util.List".to_string()
        });
    }
    None
}

fn name_range_in_line(line: &Line, name: &str) -> Option<Range> {
    let simple = name.rsplit('.').next().unwrap_or(name);
    line.masked
        .find(simple)
        .map(|start| span_in_line(line, start, start + simple.len()))
}

fn span_in_line(line: &Line, start: usize, end: usize) -> Range {
    Range::new(
        Position::new(line.no, start as u32),
        Position::new(line.no, end as u32),
    )
}

fn safe_slice(text: &str, from: usize) -> &str {
    if from <= text.len() {
        &text[from..]
    } else {
        ""
    }
}

fn safe_slice_range(text: &str, from: usize, to: usize) -> &str {
    let to = to.min(text.len());
    if from <= to {
        &text[from..to]
    } else {
        ""
    }
}

fn parse_modifiers(text: &str) -> Modifiers {
    let words: Vec<&str> = text.split_whitespace().collect();
    Modifiers {
        is_static: words.contains(&"static"),
        is_abstract: words.contains(&"abstract"),
        is_final: words.contains(&"final"),
        is_synthetic: false,
        is_deprecated: false,
    }
}

// ---- resolution checks ----

fn resolve_modules(modules: &[ModuleAst], collector: &mut ErrorCollector) {
    // Name table over everything this unit parsed.
    let mut classes: HashMap<String, Arc<AstNode>> = HashMap::new();
    let mut simple_names: HashMap<String, String> = HashMap::new();
    for module in modules {
        for node in &module.nodes {
            collect_classes(node, &mut classes, &mut simple_names);
        }
    }

    for module in modules {
        let imports: Vec<ImportData> = module
            .nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Import(i) => Some(i.clone()),
                _ => None,
            })
            .collect();
        for node in &module.nodes {
            check_node(
                node, module, &classes, &simple_names, &imports, collector, None,
            );
        }
    }
}

fn collect_classes(
    node: &Arc<AstNode>,
    classes: &mut HashMap<String, Arc<AstNode>>,
    simple_names: &mut HashMap<String, String>,
) {
    if let NodeKind::Class(data) = &node.kind {
        classes.entry(data.name.clone()).or_insert_with(|| node.clone());
        simple_names
            .entry(data.simple_name().to_string())
            .or_insert_with(|| data.name.clone());
    }
    for child in &node.children {
        collect_classes(child, classes, simple_names);
    }
}

#[allow(clippy::too_many_arguments)]
fn check_node(
    node: &Arc<AstNode>,
    module: &ModuleAst,
    classes: &HashMap<String, Arc<AstNode>>,
    simple_names: &HashMap<String, String>,
    imports: &[ImportData],
    collector: &mut ErrorCollector,
    locals: Option<&HashMap<String, String>>,
) {
    match &node.kind {
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::ClassRef { name } | ExprKind::ConstructorCall { type_name: name } => {
                check_type_reference(name, node, module, classes, simple_names, imports, collector);
            }
            ExprKind::MethodCall {
                name,
                has_receiver: true,
            } => {
                if let (Some(locals), Some(receiver)) = (locals, node.children.first()) {
                    if let NodeKind::Expression(rexpr) = &receiver.kind {
                        if let ExprKind::VariableRef { name: var } = &rexpr.kind {
                            if let Some(type_written) = locals.get(var) {
                                check_call_target(
                                    name,
                                    type_written,
                                    node,
                                    module,
                                    classes,
                                    simple_names,
                                    imports,
                                    collector,
                                );
                            }
                        }
                    }
                }
            }
            _ => {}
        },
        NodeKind::Variable(v) => {
            if let Some(declared) = &v.declared_type {
                if declared
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase())
                {
                    check_type_reference(
                        declared,
                        node,
                        module,
                        classes,
                        simple_names,
                        imports,
                        collector,
                    );
                }
            }
        }
        NodeKind::Method(_) | NodeKind::Constructor(_) => {
            // Track local variable types for call-target checks in this body.
            let mut locals: HashMap<String, String> = HashMap::new();
            for param in node.parameters() {
                if let NodeKind::Parameter(p) = &param.kind {
                    locals.insert(p.name.clone(), p.type_name.clone());
                }
            }
            for child in &node.children {
                if let NodeKind::Variable(v) = &child.kind {
                    if let Some(t) = v.declared_type.as_ref().or(v.inferred_type.as_ref()) {
                        locals.insert(v.name.clone(), t.clone());
                    }
                }
                check_node(
                    child,
                    module,
                    classes,
                    simple_names,
                    imports,
                    collector,
                    Some(&locals),
                );
            }
            return;
        }
        _ => {}
    }
    for child in &node.children {
        check_node(child, module, classes, simple_names, imports, collector, locals);
    }
}

fn resolve_written_type(
    written: &str,
    module: &ModuleAst,
    classes: &HashMap<String, Arc<AstNode>>,
    simple_names: &HashMap<String, String>,
    imports: &[ImportData],
) -> Option<String> {
    let written = written.trim_end_matches("[]");
    if written.contains('.') {
        return Some(written.to_string());
    }
    for import in imports {
        if import.simple_name() == Some(written) {
            return Some(import.name.clone());
        }
    }
    if let Some(pkg) = &module.package {
        let candidate = format!("{pkg}.{written}");
        if classes.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    if classes.contains_key(written) {
        return Some(written.to_string());
    }
    simple_names.get(written).cloned()
}

#[allow(clippy::too_many_arguments)]
fn check_type_reference(
    written: &str,
    node: &Arc<AstNode>,
    module: &ModuleAst,
    classes: &HashMap<String, Arc<AstNode>>,
    simple_names: &HashMap<String, String>,
    imports: &[ImportData],
    collector: &mut ErrorCollector,
) {
    let bare = written.trim_end_matches("[]");
    if PRIMITIVE_NAMES.contains(&bare) || WELL_KNOWN_SIMPLE_NAMES.contains(&bare) {
        return;
    }
    if bare.contains('.') {
        // Qualified names outside the project are assumed to be classpath
        // types; a real frontend would consult the classloader here.
        return;
    }
    if resolve_written_type(bare, module, classes, simple_names, imports).is_some() {
        return;
    }
    if let Some(range) = node.range {
        collector.push(CompilationError::fatal(
            format!("unable to resolve class {bare}"),
            module.uri.clone(),
            range,
        ));
    }
}

#[allow(clippy::too_many_arguments)]
fn check_call_target(
    method_name: &str,
    receiver_type_written: &str,
    call: &Arc<AstNode>,
    module: &ModuleAst,
    classes: &HashMap<String, Arc<AstNode>>,
    simple_names: &HashMap<String, String>,
    imports: &[ImportData],
    collector: &mut ErrorCollector,
) {
    let Some(fqn) =
        resolve_written_type(receiver_type_written, module, classes, simple_names, imports)
    else {
        return;
    };
    let Some(class) = classes.get(&fqn) else {
        return; // External type; the shallow frontend cannot check it.
    };

    let arg_count = call.children.len().saturating_sub(1);
    let mut candidates: Vec<&Arc<AstNode>> = Vec::new();
    collect_methods(class, classes, simple_names, method_name, &mut candidates);

    if candidates.is_empty() {
        if let Some(range) = call.range {
            collector.push(CompilationError::fatal(
                format!(
                    "unable to resolve method {method_name} for class {}",
                    class.class_data().map(|c| c.name.as_str()).unwrap_or(&fqn)
                ),
                module.uri.clone(),
                range,
            ));
        }
        return;
    }

    let compatible = candidates.iter().any(|m| {
        let params: Vec<&Arc<AstNode>> = m.parameters().collect();
        params.len() == arg_count
            && params.iter().zip(call.children.iter().skip(1)).all(|(p, a)| {
                argument_compatible(p, a)
            })
    });
    if !compatible {
        if let Some(range) = call.range {
            collector.push(CompilationError::fatal(
                format!(
                    "unable to resolve method {method_name} for argument types in class {fqn}"
                ),
                module.uri.clone(),
                range,
            ));
        }
    }
}

fn collect_methods<'a>(
    class: &'a Arc<AstNode>,
    classes: &'a HashMap<String, Arc<AstNode>>,
    simple_names: &'a HashMap<String, String>,
    name: &str,
    out: &mut Vec<&'a Arc<AstNode>>,
) {
    for member in &class.children {
        if let NodeKind::Method(m) = &member.kind {
            if m.name == name {
                out.push(member);
            }
        }
    }
    if let Some(data) = class.class_data() {
        if let Some(superclass) = &data.superclass {
            let fqn = if superclass.contains('.') {
                superclass.clone()
            } else {
                simple_names.get(superclass.as_str()).cloned().unwrap_or_else(|| superclass.clone())
            };
            if let Some(parent) = classes.get(&fqn) {
                collect_methods(parent, classes, simple_names, name, out);
            }
        }
    }
}

/// A `null` argument can never satisfy a primitive parameter; everything
/// else passes the shallow check.
fn argument_compatible(param: &Arc<AstNode>, arg: &Arc<AstNode>) -> bool {
    let param_type = match &param.kind {
        NodeKind::Parameter(p) => p.type_name.as_str(),
        _ => return true,
    };
    let is_null = matches!(
        &arg.kind,
        NodeKind::Expression(e) if matches!(&e.kind, ExprKind::Literal { text } if text.trim() == "null")
    );
    !(is_null && PRIMITIVE_NAMES.contains(&param_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn parse(name: &str, text: &str) -> (ModuleAst, ErrorCollector) {
        let mut collector = ErrorCollector::new();
        let module = parse_module(&uri(name), text, &mut collector);
        (module, collector)
    }

    #[test]
    fn parses_package_imports_and_class() {
        let source = indoc! {r#"
            package com.example

            import java.util.List
            import com.example.util.*

            class Greeter extends Base implements Runnable {
                String name
                private int count = 0

                String greet(String who) {
                    def message = "hello"
                    return message
                }
            }
        "#};
        let (module, collector) = parse("greeter", source);
        assert!(collector.is_empty(), "unexpected errors: {:?}", collector.errors());
        assert_eq!(module.package.as_deref(), Some("com.example"));

        let imports: Vec<_> = module
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Import(_)))
            .collect();
        assert_eq!(imports.len(), 2);

        let class = module.nodes.iter().find(|n| n.is_class()).unwrap();
        let data = class.class_data().unwrap();
        assert_eq!(data.name, "com.example.Greeter");
        assert_eq!(data.superclass.as_deref(), Some("Base"));
        assert_eq!(data.interfaces, vec!["Runnable".to_string()]);

        let method = class
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::Method(_)))
            .unwrap();
        assert_eq!(method.name(), Some("greet"));
        assert_eq!(method.parameters().count(), 1);
        // Property (no visibility) and field (private).
        assert!(class
            .children
            .iter()
            .any(|c| matches!(&c.kind, NodeKind::Property(p) if p.name == "name")));
        assert!(class
            .children
            .iter()
            .any(|c| matches!(&c.kind, NodeKind::Field(f) if f.name == "count")));
    }

    #[test]
    fn local_with_constructor_call_is_inferred() {
        let source = indoc! {r#"
            class Holder {
                void fill() {
                    def box = new Box()
                    box.pack(1)
                }
            }
        "#};
        let (module, _) = parse("holder", source);
        let class = module.nodes.iter().find(|n| n.is_class()).unwrap();
        let method = class
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::Method(_)))
            .unwrap();
        let local = method
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::Variable(_)))
            .unwrap();
        match &local.kind {
            NodeKind::Variable(v) => {
                assert_eq!(v.name, "box");
                assert_eq!(v.inferred_type.as_deref(), Some("Box"));
            }
            _ => unreachable!(),
        }
        let call = method
            .children
            .iter()
            .find(|c| {
                matches!(&c.kind, NodeKind::Expression(e) if matches!(&e.kind, ExprKind::MethodCall { .. }))
            })
            .unwrap();
        assert_eq!(call.name(), Some("pack"));
        assert_eq!(call.children.len(), 2); // receiver + one argument
    }

    #[test]
    fn unbalanced_braces_are_fatal() {
        let (_, collector) = parse("broken", "class A {\n  void m() {\n}\n");
        assert!(collector.has_fatal());
    }

    #[test]
    fn unresolved_class_reported_at_canonicalization() {
        let mut collector = ErrorCollector::new();
        let module = parse_module(
            &uri("user"),
            indoc! {r#"
                class User {
                    void go() {
                        Missing thing = new Missing()
                    }
                }
            "#},
            &mut collector,
        );
        resolve_modules(&[module], &mut collector);
        assert!(collector
            .errors()
            .iter()
            .any(|e| e.message.contains("unable to resolve class Missing")));
    }

    #[test]
    fn null_argument_against_primitive_parameter_is_an_error() {
        let mut collector = ErrorCollector::new();
        let a = parse_module(
            &uri("a"),
            indoc! {r#"
                class A {
                    int foo(int n) {
                        return n
                    }
                }
            "#},
            &mut collector,
        );
        let c = parse_module(
            &uri("c"),
            indoc! {r#"
                class C {
                    void go() {
                        A a = new A()
                        a.foo(null)
                    }
                }
            "#},
            &mut collector,
        );
        resolve_modules(&[a, c], &mut collector);
        assert!(collector
            .errors()
            .iter()
            .any(|e| e.message.contains("unable to resolve method foo")));
    }

    #[test]
    fn string_parameter_accepts_null() {
        let mut collector = ErrorCollector::new();
        let a = parse_module(
            &uri("a"),
            indoc! {r#"
                class A {
                    int foo(String s) {
                        return 1
                    }
                }
            "#},
            &mut collector,
        );
        let c = parse_module(
            &uri("c"),
            indoc! {r#"
                class C {
                    void go() {
                        A a = new A()
                        a.foo(null)
                    }
                }
            "#},
            &mut collector,
        );
        resolve_modules(&[a, c], &mut collector);
        assert!(collector.is_empty(), "unexpected: {:?}", collector.errors());
    }

    #[test]
    fn spock_feature_method_name_is_the_string_literal() {
        let source = indoc! {r#"
            class CalcSpec extends Specification {
                def "adds two numbers"() {
                    expect:
                    1 + 1 == 2
                }
            }
        "#};
        let (module, _) = parse("spec", source);
        let class = module.nodes.iter().find(|n| n.is_class()).unwrap();
        let feature = class
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::Method(_)))
            .unwrap();
        assert_eq!(feature.name(), Some("adds two numbers"));
    }

    #[test]
    fn comments_and_strings_do_not_produce_nodes() {
        let source = indoc! {r#"
            class A {
                // def ghost = new Ghost()
                void m() {
                    def s = "new NotReal() and x.call()"
                }
            }
        "#};
        let (module, collector) = parse("masked", source);
        assert!(collector.is_empty());
        let class = module.nodes.iter().find(|n| n.is_class()).unwrap();
        let method = class
            .children
            .iter()
            .find(|c| matches!(c.kind, NodeKind::Method(_)))
            .unwrap();
        assert!(!method.children.iter().any(|c| matches!(
            &c.kind,
            NodeKind::Expression(e) if matches!(&e.kind, ExprKind::ConstructorCall { .. } | ExprKind::MethodCall { .. })
        )));
    }
}
