//! Placeholder injection and restore: buffer byte-identity and version
//! accounting around completion and signature-help recompiles.

mod common;

use common::Workspace;
use groovy_language_server::lsp::backend::scope::Placeholder;
use tower_lsp::lsp_types::Position;

#[test]
fn completion_placeholder_roundtrip_leaves_buffer_identical() {
    let ws = Workspace::new();
    let uri = ws.open(
        "x.groovy",
        "class X {\n    void m() {\n        def result = obj.\n    }\n}\n",
    );
    ws.scope.recompile(None);

    let before = ws.tracker.contents(&uri).unwrap();
    let version_before = ws.tracker.version(&uri).unwrap();

    let fork = ws
        .scope
        .placeholder_recompile(&uri, Position::new(2, 25), Placeholder::Completion)
        .expect("placeholder recompile");
    assert!(!fork.is_empty());

    // Byte-identical contents, version bumped twice: inject + restore.
    assert_eq!(ws.tracker.contents(&uri).unwrap(), before);
    assert_eq!(ws.tracker.version(&uri).unwrap(), version_before + 2);
}

#[test]
fn signature_help_placeholder_roundtrip() {
    let ws = Workspace::new();
    let uri = ws.open(
        "y.groovy",
        "class Y {\n    void call(int a, int b) {\n    }\n    void go() {\n        call(1, \n    }\n}\n",
    );
    ws.scope.recompile(None);

    let before = ws.tracker.contents(&uri).unwrap();
    let version_before = ws.tracker.version(&uri).unwrap();

    ws.scope
        .placeholder_recompile(&uri, Position::new(4, 16), Placeholder::SignatureHelp)
        .expect("placeholder recompile");

    assert_eq!(ws.tracker.contents(&uri).unwrap(), before);
    assert_eq!(ws.tracker.version(&uri).unwrap(), version_before + 2);
}

#[test]
fn live_index_is_untouched_by_placeholder_fork() {
    let ws = Workspace::new();
    let uri = ws.open(
        "z.groovy",
        "class Z {\n    void m() {\n        def result = this.\n    }\n}\n",
    );
    ws.scope.recompile(None);
    let live = ws.scope.ast_index();

    let fork = ws
        .scope
        .placeholder_recompile(&uri, Position::new(2, 26), Placeholder::Completion)
        .expect("fork");

    // The fork is its own object; the scope still serves the old snapshot.
    assert!(!std::sync::Arc::ptr_eq(&fork, &ws.scope.ast_index()));
    assert!(std::sync::Arc::ptr_eq(&live, &ws.scope.ast_index()));
    assert!(live.class_by_name("Z").is_some());
}
