//! Formatter properties: the nested-closure shape, idempotence, and the
//! newline/whitespace invariants, including a randomised pass.

use groovy_language_server::lsp::features::formatting::{format_edits, format_source};
use indoc::indoc;
use quickcheck::{quickcheck, TestResult};

#[test]
fn nested_closures_format_to_four_space_scheme() {
    let input = "class A{void m(){list.each{x->\nprintln(x)\n}}}\n";
    let expected = indoc! {"
        class A {
            void m() {
                list.each { x->
                    println(x)
                }
            }
        }
    "};
    let formatted = format_source(input);
    assert_eq!(formatted, expected);
    assert_eq!(format_source(&formatted), formatted, "format is a fixpoint");
}

#[test]
fn formatted_output_ends_with_exactly_one_newline() {
    for input in [
        "class A {\n}",
        "class A {\n}\n\n\n",
        "println 1",
        "// only a comment",
    ] {
        let formatted = format_source(input);
        assert!(formatted.ends_with('\n'), "missing newline for {input:?}");
        assert!(
            !formatted.ends_with("\n\n"),
            "extra trailing newlines for {input:?}"
        );
    }
}

#[test]
fn no_line_keeps_trailing_whitespace() {
    let formatted = format_source("class A {   \n    int x = 1\t\t\n}   \n");
    for line in formatted.lines() {
        assert_eq!(line, line.trim_end());
    }
}

#[test]
fn no_run_of_three_blank_lines_survives() {
    let formatted = format_source("class A {\n}\n\n\n\n\n\nclass B {\n}\n");
    assert!(!formatted.contains("\n\n\n\n"));
}

#[test]
fn string_interiors_are_never_altered() {
    let input = indoc! {r#"
        class A {
            def sql = """
              select   *
                from t
            """
            def pattern = ~/a{2,3}/
        }
    "#};
    let formatted = format_source(input);
    assert!(formatted.contains("  select   *"));
    assert!(formatted.contains("    from t"));
    assert!(formatted.contains("a{2,3}"));
}

#[test]
fn idempotence_on_ascii_code_shaped_inputs() {
    fn prop(tokens: Vec<u8>) -> TestResult {
        // Build input from a small alphabet that exercises the lexer.
        const ALPHABET: &[&str] = &[
            "class A", "{", "}", "\n", " ", "def x = 1", "foo(a,b)", "// note", "'s'",
            "\"d\"", "if(x)", "[1, 2]",
        ];
        let input: String = tokens
            .iter()
            .map(|t| ALPHABET[*t as usize % ALPHABET.len()])
            .collect();
        let once = format_source(&input);
        let twice = format_source(&once);
        if once == twice {
            TestResult::passed()
        } else {
            TestResult::error(format!("not idempotent for {input:?}"))
        }
    }
    quickcheck(prop as fn(Vec<u8>) -> TestResult);
}

#[test]
fn minimal_edit_covers_only_changed_lines() {
    let original = "class A {\n    int x = 1\n}\nclass B{\n}\n";
    let formatted = format_source(original);
    let edits = format_edits(original, &formatted);
    assert_eq!(edits.len(), 1);
    // The well-formatted prefix (lines 0..3) is outside the edit.
    assert_eq!(edits[0].range.start.line, 3);
}
