//! Compilation error collection and the compile fault taxonomy.
//!
//! The frontend reports user-source problems through an [`ErrorCollector`]
//! carried by the compilation unit; aborts surface as [`CompileFault`] at the
//! orchestrator boundary and are converted to logs there, never propagated
//! across the transport.

use thiserror::Error;
use tower_lsp::lsp_types::{Range, Url};

/// A single message produced while compiling user source.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationError {
    pub message: String,
    /// Source the message points at. Messages without a usable locator are
    /// dropped by the diagnostic handler.
    pub uri: Option<Url>,
    pub range: Option<Range>,
    /// Fatal messages become `Error` diagnostics, the rest `Warning`.
    pub fatal: bool,
}

impl CompilationError {
    pub fn fatal(message: impl Into<String>, uri: Url, range: Range) -> Self {
        CompilationError {
            message: message.into(),
            uri: Some(uri),
            range: Some(range),
            fatal: true,
        }
    }

    pub fn warning(message: impl Into<String>, uri: Url, range: Range) -> Self {
        CompilationError {
            message: message.into(),
            uri: Some(uri),
            range: Some(range),
            fatal: false,
        }
    }
}

/// Accumulates [`CompilationError`]s across one compile round.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Vec<CompilationError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        ErrorCollector::default()
    }

    pub fn push(&mut self, error: CompilationError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[CompilationError] {
        &self.errors
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| e.fatal)
    }

    /// Whether any fatal message points at the given source.
    pub fn has_fatal_for(&self, uri: &Url) -> bool {
        self.errors
            .iter()
            .any(|e| e.fatal && e.uri.as_ref() == Some(uri))
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

/// One frame of a frontend stack trace, kept for bug-pattern matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub class_path: String,
    pub method: String,
}

/// Abnormal outcomes of a compile call.
///
/// All variants are recoverable: the orchestrator converts them to log lines
/// and the server keeps serving requests from the previous good state.
#[derive(Debug, Error)]
pub enum CompileFault {
    /// Expected failure for incomplete source; details are in the unit's
    /// error collector.
    #[error("compilation failed")]
    Failed,

    /// Internal frontend error.
    #[error("compiler bug: {message}")]
    CompilerBug {
        frames: Vec<StackFrame>,
        message: String,
    },

    /// A classpath class could not be loaded while compiling.
    #[error("linkage error: class {class_name} not found")]
    Linkage { class_name: String },
}

/// Pattern describing a known-benign frontend bug.
///
/// A [`CompileFault::CompilerBug`] matches when any stack frame matches the
/// class-path substring and method, and the exception message contains the
/// given fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugPattern {
    pub class_path_substring: String,
    pub method: String,
    pub message_contains: String,
}

impl BugPattern {
    pub fn matches(&self, frames: &[StackFrame], message: &str) -> bool {
        message.contains(&self.message_contains)
            && frames.iter().any(|f| {
                f.class_path.contains(&self.class_path_substring) && f.method == self.method
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Position;

    fn uri() -> Url {
        Url::parse("file:///tmp/a.groovy").unwrap()
    }

    fn range() -> Range {
        Range::new(Position::new(0, 0), Position::new(0, 4))
    }

    #[test]
    fn collector_tracks_fatal_per_uri() {
        let mut collector = ErrorCollector::new();
        collector.push(CompilationError::warning("odd spacing", uri(), range()));
        assert!(!collector.has_fatal());

        collector.push(CompilationError::fatal("unexpected token", uri(), range()));
        assert!(collector.has_fatal());
        assert!(collector.has_fatal_for(&uri()));
        assert!(!collector.has_fatal_for(&Url::parse("file:///tmp/b.groovy").unwrap()));
    }

    #[test]
    fn bug_pattern_requires_frame_and_message() {
        let pattern = BugPattern {
            class_path_substring: "codehaus/groovy/control".to_string(),
            method: "visitClass".to_string(),
            message_contains: "unexpected NullPointerException".to_string(),
        };
        let frames = vec![
            StackFrame {
                class_path: "org/codehaus/groovy/control/ResolveVisitor".to_string(),
                method: "visitClass".to_string(),
            },
            StackFrame {
                class_path: "org/codehaus/groovy/control/CompilationUnit".to_string(),
                method: "compile".to_string(),
            },
        ];

        assert!(pattern.matches(&frames, "unexpected NullPointerException in resolver"));
        assert!(!pattern.matches(&frames, "some other message"));
        assert!(!pattern.matches(&frames[1..], "unexpected NullPointerException"));
    }
}
