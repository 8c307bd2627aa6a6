//! Whole-document formatter.
//!
//! A character-level lexer classifies every character (code, comments, the
//! five string flavours, gstring expressions, slashy regexes); everything
//! else is guarded by that classification so string and comment interiors
//! are never touched. Formatting then runs in two passes: brace-driven
//! line splitting, and per-line trimming/re-indenting with spacing fixes.
//! The emitted edit is line-minimal: matching leading and trailing lines
//! are left alone.

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Position, Range, TextEdit};

const INDENT: &str = "    ";

static CLOSURE_PARAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[A-Za-z_$][\w$]*(?:\s*,\s*[A-Za-z_$][\w$]*)*\s*)?->").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    Single,
    Double,
    TripleSingle,
    TripleDouble,
    GStringExpr,
    SlashRegex,
    DollarSlashRegex,
}

impl LexState {
    fn is_code(self) -> bool {
        matches!(self, LexState::Code | LexState::GStringExpr)
    }

    /// States whose interior lines must be preserved verbatim.
    fn preserves_lines(self) -> bool {
        matches!(
            self,
            LexState::BlockComment
                | LexState::TripleSingle
                | LexState::TripleDouble
                | LexState::SlashRegex
                | LexState::DollarSlashRegex
        )
    }
}

/// Character classification plus the lexer state at the start of each line.
fn classify(text: &str) -> (Vec<(char, LexState)>, Vec<LexState>) {
    let chars: Vec<char> = text.chars().collect();
    let mut classes = Vec::with_capacity(chars.len());
    let mut line_starts = vec![LexState::Code];

    let mut state = LexState::Code;
    // Where a gstring expression returns to, and its brace depth.
    let mut gstring_return = LexState::Double;
    let mut gstring_depth = 0u32;
    let mut i = 0;

    // The last significant code char decides whether `/` opens a regex.
    let mut last_code_char: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let next2 = chars.get(i + 2).copied();

        match state {
            LexState::Code => match c {
                '/' if next == Some('/') => {
                    state = LexState::LineComment;
                    classes.push((c, state));
                }
                '/' if next == Some('*') => {
                    state = LexState::BlockComment;
                    classes.push((c, state));
                }
                '$' if next == Some('/') => {
                    state = LexState::DollarSlashRegex;
                    classes.push((c, state));
                }
                '/' if regex_can_start(last_code_char) => {
                    state = LexState::SlashRegex;
                    classes.push((c, state));
                }
                '\'' if next == Some('\'') && next2 == Some('\'') => {
                    state = LexState::TripleSingle;
                    classes.push(('\'', state));
                    classes.push(('\'', state));
                    classes.push(('\'', state));
                    i += 3;
                    continue;
                }
                '"' if next == Some('"') && next2 == Some('"') => {
                    state = LexState::TripleDouble;
                    classes.push(('"', state));
                    classes.push(('"', state));
                    classes.push(('"', state));
                    i += 3;
                    continue;
                }
                '\'' => {
                    state = LexState::Single;
                    classes.push((c, state));
                }
                '"' => {
                    state = LexState::Double;
                    classes.push((c, state));
                }
                _ => {
                    if !c.is_whitespace() {
                        last_code_char = Some(c);
                    }
                    classes.push((c, LexState::Code));
                }
            },
            LexState::LineComment => {
                if c == '\n' {
                    state = LexState::Code;
                    classes.push((c, LexState::Code));
                } else {
                    classes.push((c, LexState::LineComment));
                }
            }
            LexState::BlockComment => {
                if c == '*' && next == Some('/') {
                    classes.push((c, LexState::BlockComment));
                    classes.push(('/', LexState::BlockComment));
                    state = LexState::Code;
                    i += 2;
                    continue;
                }
                classes.push((c, LexState::BlockComment));
            }
            LexState::Single => {
                if c == '\\' && next.is_some() {
                    classes.push((c, state));
                    classes.push((next.expect("checked"), state));
                    i += 2;
                    continue;
                }
                classes.push((c, state));
                if c == '\'' || c == '\n' {
                    state = LexState::Code;
                }
            }
            LexState::Double => {
                if c == '\\' && next.is_some() {
                    classes.push((c, state));
                    classes.push((next.expect("checked"), state));
                    i += 2;
                    continue;
                }
                if c == '$' && next == Some('{') {
                    gstring_return = LexState::Double;
                    gstring_depth = 0;
                    state = LexState::GStringExpr;
                    classes.push((c, LexState::GStringExpr));
                    classes.push(('{', LexState::GStringExpr));
                    i += 2;
                    continue;
                }
                classes.push((c, state));
                if c == '"' || c == '\n' {
                    state = LexState::Code;
                }
            }
            LexState::TripleSingle => {
                if c == '\'' && next == Some('\'') && next2 == Some('\'') {
                    classes.push(('\'', state));
                    classes.push(('\'', state));
                    classes.push(('\'', state));
                    state = LexState::Code;
                    i += 3;
                    continue;
                }
                classes.push((c, state));
            }
            LexState::TripleDouble => {
                if c == '"' && next == Some('"') && next2 == Some('"') {
                    classes.push(('"', state));
                    classes.push(('"', state));
                    classes.push(('"', state));
                    state = LexState::Code;
                    i += 3;
                    continue;
                }
                if c == '$' && next == Some('{') {
                    gstring_return = LexState::TripleDouble;
                    gstring_depth = 0;
                    state = LexState::GStringExpr;
                    classes.push((c, LexState::GStringExpr));
                    classes.push(('{', LexState::GStringExpr));
                    i += 2;
                    continue;
                }
                classes.push((c, state));
            }
            LexState::GStringExpr => {
                classes.push((c, LexState::GStringExpr));
                match c {
                    '{' => gstring_depth += 1,
                    '}' => {
                        if gstring_depth == 0 {
                            state = gstring_return;
                        } else {
                            gstring_depth -= 1;
                        }
                    }
                    _ => {}
                }
            }
            LexState::SlashRegex => {
                if c == '\\' && next.is_some() {
                    classes.push((c, state));
                    classes.push((next.expect("checked"), state));
                    i += 2;
                    continue;
                }
                classes.push((c, state));
                if c == '/' {
                    state = LexState::Code;
                }
            }
            LexState::DollarSlashRegex => {
                if c == '/' && next == Some('$') {
                    classes.push((c, state));
                    classes.push(('$', state));
                    state = LexState::Code;
                    i += 2;
                    continue;
                }
                classes.push((c, state));
            }
        }

        if c == '\n' {
            line_starts.push(state);
        }
        i += 1;
    }

    (classes, line_starts)
}

fn regex_can_start(last_code_char: Option<char>) -> bool {
    match last_code_char {
        None => true,
        Some(c) => matches!(
            c,
            '(' | '[' | '{' | ',' | '=' | ':' | '!' | '&' | '|' | '?' | ';' | '+' | '-' | '*' | '~'
        ),
    }
}

/// Format a whole document. Idempotent: formatting the output again yields
/// the same text.
pub fn format_source(text: &str) -> String {
    let split = split_braces(text);
    reindent(&split)
}

/// Pass 1: put `{`-opened blocks and `}` closers on their own lines, with
/// the closure-parameter form `{ x ->` kept intact.
fn split_braces(text: &str) -> String {
    let (classes, _) = classify(text);
    let mut out = String::with_capacity(text.len() + 64);
    let mut line_has_content = false;
    let mut i = 0;

    while i < classes.len() {
        let (c, state) = classes[i];
        if c == '\n' {
            out.push('\n');
            line_has_content = false;
            i += 1;
            continue;
        }
        if state != LexState::Code {
            out.push(c);
            line_has_content = line_has_content || !c.is_whitespace();
            i += 1;
            continue;
        }
        match c {
            '{' => {
                if line_has_content && !out.ends_with([' ', '\t', '(']) {
                    out.push(' ');
                }
                out.push('{');
                line_has_content = true;
                i += 1;
                // Decide what to do with the rest of this input line.
                let rest: String = classes[i..]
                    .iter()
                    .take_while(|(rc, _)| *rc != '\n')
                    .map(|(rc, _)| *rc)
                    .collect();
                let rest_trimmed = rest.trim_start();
                if rest_trimmed.is_empty() {
                    continue;
                }
                let rest_offset = rest.len() - rest_trimmed.len();
                let first_rest_state = classes[i + rest_offset].1;
                if first_rest_state == LexState::LineComment {
                    continue; // trailing comment stays attached
                }
                while i < classes.len() && classes[i].0 != '\n' && classes[i].0.is_whitespace() {
                    i += 1;
                }
                if CLOSURE_PARAMS.is_match(rest_trimmed) {
                    out.push(' ');
                } else {
                    out.push('\n');
                    line_has_content = false;
                }
            }
            '}' => {
                if line_has_content {
                    out.push('\n');
                }
                out.push('}');
                line_has_content = true;
                i += 1;
                // A directly following closer moves to its own line.
                let mut j = i;
                while j < classes.len() && classes[j].0 != '\n' && classes[j].0.is_whitespace() {
                    j += 1;
                }
                if j < classes.len() && classes[j].0 == '}' && classes[j].1 == LexState::Code {
                    out.push('\n');
                    line_has_content = false;
                    i = j;
                }
            }
            _ => {
                out.push(c);
                line_has_content = line_has_content || !c.is_whitespace();
                i += 1;
            }
        }
    }
    out
}

/// Pass 2: trim and re-indent each line, apply spacing fixes, collapse
/// blank-line runs, normalise the trailing newline.
fn reindent(text: &str) -> String {
    let (classes, line_starts) = classify(text);

    // Slice classes into lines.
    let mut lines: Vec<Vec<(char, LexState)>> = vec![Vec::new()];
    for &(c, state) in &classes {
        if c == '\n' {
            lines.push(Vec::new());
        } else {
            lines.last_mut().expect("non-empty").push((c, state));
        }
    }

    let mut out_lines: Vec<String> = Vec::new();
    let mut depth: i32 = 0;
    let mut blank_run = 0;

    for (line_no, line) in lines.iter().enumerate() {
        let start_state = line_starts
            .get(line_no)
            .copied()
            .unwrap_or(LexState::Code);

        let line_text: String = line.iter().map(|(c, _)| *c).collect();

        if start_state.preserves_lines() {
            // Interior of a multi-line string or comment: verbatim.
            out_lines.push(line_text);
            blank_run = 0;
            depth += brace_depth_delta(line);
            continue;
        }

        let trimmed = line_text.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out_lines.push(String::new());
            }
            continue;
        }
        blank_run = 0;

        let leading_ws = line_text.len() - line_text.trim_start().len();
        let content: Vec<(char, LexState)> = line[leading_ws..]
            .iter()
            .copied()
            .collect();

        let closers = content
            .iter()
            .take_while(|(c, state)| state.is_code() && (*c == '}' || *c == ']'))
            .count() as i32;
        let mut level = (depth - closers).max(0);
        if trimmed.starts_with('.') || trimmed.starts_with("?.") || trimmed.starts_with("*.") {
            level += 1;
        }

        let fixed = fix_spacing(&content);
        let mut rendered = INDENT.repeat(level as usize);
        rendered.push_str(fixed.trim_end());
        out_lines.push(rendered);

        depth = (depth + brace_depth_delta(line)).max(0);
    }

    // Exactly one trailing newline.
    while out_lines.last().is_some_and(|l| l.is_empty()) {
        out_lines.pop();
    }
    let mut result = out_lines.join("\n");
    result.push('\n');
    result
}

/// Indentation depth only ever moves on code-state braces and brackets.
fn brace_depth_delta(line: &[(char, LexState)]) -> i32 {
    line.iter().fold(0, |acc, (c, state)| {
        if !state.is_code() {
            return acc;
        }
        match c {
            '{' | '[' => acc + 1,
            '}' | ']' => acc - 1,
            _ => acc,
        }
    })
}

/// Comma and keyword-parenthesis spacing, applied to code characters only.
fn fix_spacing(content: &[(char, LexState)]) -> String {
    const PAREN_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch"];

    let mut spaced = String::with_capacity(content.len() + 8);
    let mut skip_ws_after_comma = false;
    for (idx, (c, state)) in content.iter().enumerate() {
        if skip_ws_after_comma {
            if c.is_whitespace() {
                continue;
            }
            skip_ws_after_comma = false;
        }
        if *state == LexState::Code {
            match c {
                ',' => {
                    while spaced.ends_with(' ') {
                        spaced.pop();
                    }
                    spaced.push(',');
                    let next = content[idx + 1..]
                        .iter()
                        .find(|(nc, _)| !nc.is_whitespace());
                    if next.is_some_and(|(nc, _)| !matches!(nc, ')' | ']')) {
                        spaced.push(' ');
                    }
                    skip_ws_after_comma = true;
                    continue;
                }
                '(' => {
                    let word: String = spaced
                        .chars()
                        .rev()
                        .take_while(|ch| ch.is_ascii_alphabetic())
                        .collect::<String>()
                        .chars()
                        .rev()
                        .collect();
                    if PAREN_KEYWORDS.contains(&word.as_str()) {
                        let before = spaced.len() - word.len();
                        let boundary = spaced[..before]
                            .chars()
                            .next_back()
                            .map(|ch| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
                            .unwrap_or(true);
                        if boundary {
                            spaced.push(' ');
                        }
                    }
                    spaced.push('(');
                    continue;
                }
                _ => {}
            }
        }
        spaced.push(*c);
    }
    spaced
}

/// Line-minimal edit between the original and formatted text: matching
/// leading and trailing lines are excluded from the replacement.
pub fn format_edits(original: &str, formatted: &str) -> Vec<TextEdit> {
    if original == formatted {
        return Vec::new();
    }
    let original_lines: Vec<&str> = original.split('\n').collect();
    let formatted_lines: Vec<&str> = formatted.split('\n').collect();

    let mut prefix = 0;
    while prefix < original_lines.len()
        && prefix < formatted_lines.len()
        && original_lines[prefix] == formatted_lines[prefix]
    {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < original_lines.len() - prefix
        && suffix < formatted_lines.len() - prefix
        && original_lines[original_lines.len() - 1 - suffix]
            == formatted_lines[formatted_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let replacement: Vec<&str> =
        formatted_lines[prefix..formatted_lines.len() - suffix].to_vec();
    let mut new_text = replacement.join("\n");
    if suffix > 0 {
        new_text.push('\n');
    }

    vec![TextEdit {
        range: Range::new(
            Position::new(prefix as u32, 0),
            Position::new((original_lines.len() - suffix) as u32, 0),
        ),
        new_text,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn nested_closures_split_and_indent() {
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
        assert_eq!(format_source(input), expected);
    }

    #[test]
    fn formatting_is_idempotent() {
        let samples = [
            "class A{void m(){list.each{x->\nprintln(x)\n}}}\n",
            "class A {\n    int x = 1\n\n\n\n    int y = 2\n}\n",
            "def m(a,b ,c) {\n  if(a) {\n    b\n  }\n}\n",
            "class S {\n    def text = '''\n   keep   me\n'''\n}\n",
        ];
        for sample in samples {
            let once = format_source(sample);
            let twice = format_source(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn blank_runs_collapse_to_two() {
        let input = "class A {\n}\n\n\n\n\nclass B {\n}\n";
        let formatted = format_source(input);
        assert!(!formatted.contains("\n\n\n\n"));
        assert!(formatted.contains("}\n\n\nclass B") || formatted.contains("}\n\nclass B"));
    }

    #[test]
    fn trailing_newline_is_exactly_one() {
        assert!(format_source("class A {\n}").ends_with("}\n"));
        assert!(!format_source("class A {\n}\n\n\n").ends_with("\n\n"));
    }

    #[test]
    fn strings_and_comments_are_untouched() {
        let input = indoc! {r#"
            class A {
                def s = "a,b{c}"
                // def t = {unformatted}
                def u = '''
                  raw , { } text
                '''
            }
        "#};
        let formatted = format_source(input);
        assert!(formatted.contains(r#""a,b{c}""#));
        assert!(formatted.contains("// def t = {unformatted}"));
        assert!(formatted.contains("  raw , { } text"));
    }

    #[test]
    fn comma_and_keyword_spacing() {
        let formatted = format_source("def m(a,b ,c) {\nif(a) {\nb\n}\n}\n");
        assert!(formatted.contains("def m(a, b, c) {"));
        assert!(formatted.contains("if (a) {"));
    }

    #[test]
    fn no_trailing_whitespace_anywhere() {
        let formatted = format_source("class A {   \n    int x = 1   \n}\n");
        for line in formatted.lines() {
            assert_eq!(line, line.trim_end());
        }
    }

    #[test]
    fn minimal_edit_preserves_matching_lines() {
        let original = "class A {\nint x\n}\nclass B {\n}\n";
        let formatted = format_source(original);
        let edits = format_edits(original, &formatted);
        assert_eq!(edits.len(), 1);
        // The first line is already formatted, so it is outside the edit.
        assert!(edits[0].range.start.line >= 1);
    }

    #[test]
    fn already_formatted_yields_no_edits() {
        let original = "class A {\n    int x = 1\n}\n";
        let formatted = format_source(original);
        assert_eq!(formatted, original);
        assert!(format_edits(original, &formatted).is_empty());
    }
}
