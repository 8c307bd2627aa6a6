pub mod classpath;
pub mod compiler;
pub mod logging;
pub mod lsp;
