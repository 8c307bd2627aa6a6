//! Semantic tokens, full and range variants.
//!
//! Walks the per-file node list and emits one token per named node. AST
//! columns sometimes point at a preceding keyword or type instead of the
//! identifier, so the identifier is located by scanning the source line;
//! the AST column is the fallback. Overlapping tokens are deduplicated
//! (shorter wins, then legend priority) before delta encoding.

use std::sync::Arc;

use tower_lsp::lsp_types::{
    Range, SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens,
    SemanticTokensLegend, Url,
};

use crate::compiler::ast::{AstNode, ExprKind, NodeKind};
use crate::lsp::backend::ast_index::AstIndex;
use crate::lsp::backend::contents_tracker::line_at;
use crate::lsp::features::find_identifier;

pub const TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::NAMESPACE,
    SemanticTokenType::TYPE,
    SemanticTokenType::CLASS,
    SemanticTokenType::INTERFACE,
    SemanticTokenType::ENUM,
    SemanticTokenType::PARAMETER,
    SemanticTokenType::VARIABLE,
    SemanticTokenType::PROPERTY,
    SemanticTokenType::FUNCTION,
    SemanticTokenType::METHOD,
    SemanticTokenType::DECORATOR,
    SemanticTokenType::ENUM_MEMBER,
    SemanticTokenType::KEYWORD,
    SemanticTokenType::TYPE_PARAMETER,
];

pub const TOKEN_MODIFIERS: &[SemanticTokenModifier] = &[
    SemanticTokenModifier::DECLARATION,
    SemanticTokenModifier::STATIC,
    SemanticTokenModifier::READONLY,
    SemanticTokenModifier::DEPRECATED,
    SemanticTokenModifier::ABSTRACT,
    SemanticTokenModifier::DEFAULT_LIBRARY,
];

const TYPE_NAMESPACE: u32 = 0;
const TYPE_CLASS: u32 = 2;
const TYPE_INTERFACE: u32 = 3;
const TYPE_ENUM: u32 = 4;
const TYPE_PARAMETER: u32 = 5;
const TYPE_VARIABLE: u32 = 6;
const TYPE_PROPERTY: u32 = 7;
const TYPE_METHOD: u32 = 9;
const TYPE_DECORATOR: u32 = 10;

const MOD_DECLARATION: u32 = 1 << 0;
const MOD_STATIC: u32 = 1 << 1;
const MOD_READONLY: u32 = 1 << 2;
const MOD_ABSTRACT: u32 = 1 << 4;

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: TOKEN_MODIFIERS.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawToken {
    line: u32,
    column: u32,
    length: u32,
    token_type: u32,
    modifiers: u32,
}

pub fn semantic_tokens_full(
    index: &AstIndex,
    uri: &Url,
    source: Option<&Arc<String>>,
) -> SemanticTokens {
    build(index, uri, source, None)
}

/// Range variant: nodes whose line span does not intersect the request are
/// skipped before any per-node work.
pub fn semantic_tokens_range(
    index: &AstIndex,
    uri: &Url,
    source: Option<&Arc<String>>,
    range: Range,
) -> SemanticTokens {
    build(index, uri, source, Some(range))
}

fn build(
    index: &AstIndex,
    uri: &Url,
    source: Option<&Arc<String>>,
    clip: Option<Range>,
) -> SemanticTokens {
    let mut raw: Vec<RawToken> = Vec::new();
    if let Some(nodes) = index.nodes(uri) {
        for node in nodes.iter() {
            let Some(range) = node.range else { continue };
            if let Some(clip) = clip {
                if range.end.line < clip.start.line || range.start.line > clip.end.line {
                    continue;
                }
            }
            if let Some(token) = token_for(node, source) {
                raw.push(token);
            }
        }
    }
    SemanticTokens {
        result_id: None,
        data: encode(dedupe(raw)),
    }
}

fn token_for(node: &Arc<AstNode>, source: Option<&Arc<String>>) -> Option<RawToken> {
    let (token_type, modifiers) = classify(node)?;
    let name = display_name(node)?;
    let range = node.range?;

    // The range may start at a keyword or type; prefer the identifier's
    // real column from the source line.
    let column = source
        .and_then(|text| line_at(text, range.start.line))
        .and_then(|line| find_identifier(line, &name))
        .map(|c| c as u32)
        .unwrap_or(range.start.character);

    Some(RawToken {
        line: range.start.line,
        column,
        length: name.chars().count() as u32,
        token_type,
        modifiers,
    })
}

fn display_name(node: &Arc<AstNode>) -> Option<String> {
    match &node.kind {
        NodeKind::Class(data) => Some(data.simple_name().to_string()),
        NodeKind::Import(data) => Some(data.name.clone()),
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::ClassRef { name } | ExprKind::ConstructorCall { type_name: name } => {
                Some(name.rsplit('.').next().unwrap_or(name).to_string())
            }
            _ => node.name().map(str::to_string),
        },
        _ => node.name().map(str::to_string),
    }
}

fn classify(node: &Arc<AstNode>) -> Option<(u32, u32)> {
    match &node.kind {
        NodeKind::Class(data) => {
            let token_type = if data.is_annotation {
                TYPE_DECORATOR
            } else if data.is_interface {
                TYPE_INTERFACE
            } else if data.is_enum {
                TYPE_ENUM
            } else {
                TYPE_CLASS
            };
            let mut modifiers = MOD_DECLARATION;
            if data.modifiers.is_abstract {
                modifiers |= MOD_ABSTRACT;
            }
            Some((token_type, modifiers))
        }
        NodeKind::Method(m) | NodeKind::Constructor(m) => {
            let mut modifiers = MOD_DECLARATION;
            if m.modifiers.is_static {
                modifiers |= MOD_STATIC;
            }
            if m.modifiers.is_abstract {
                modifiers |= MOD_ABSTRACT;
            }
            Some((TYPE_METHOD, modifiers))
        }
        NodeKind::Field(f) => {
            let mut modifiers = MOD_DECLARATION;
            if f.modifiers.is_static {
                modifiers |= MOD_STATIC;
            }
            if f.modifiers.is_final {
                modifiers |= MOD_READONLY;
            }
            Some((TYPE_PROPERTY, modifiers))
        }
        NodeKind::Property(p) => {
            let mut modifiers = MOD_DECLARATION;
            if p.modifiers.is_static {
                modifiers |= MOD_STATIC;
            }
            if p.modifiers.is_final {
                modifiers |= MOD_READONLY;
            }
            Some((TYPE_PROPERTY, modifiers))
        }
        NodeKind::Parameter(_) => Some((TYPE_PARAMETER, MOD_DECLARATION)),
        NodeKind::Variable(_) => Some((TYPE_VARIABLE, MOD_DECLARATION)),
        NodeKind::Import(_) => Some((TYPE_NAMESPACE, 0)),
        NodeKind::Expression(expr) => match &expr.kind {
            ExprKind::VariableRef { .. } => Some((TYPE_VARIABLE, 0)),
            ExprKind::MethodCall { .. } => Some((TYPE_METHOD, 0)),
            ExprKind::PropertyAccess { .. } => Some((TYPE_PROPERTY, 0)),
            ExprKind::ClassRef { .. } | ExprKind::ConstructorCall { .. } => {
                Some((TYPE_CLASS, 0))
            }
            ExprKind::Closure | ExprKind::Literal { .. } => None,
        },
    }
}

/// Sort by position, then drop overlaps: the shorter token wins, ties go to
/// the higher-priority (lower index) legend type.
fn dedupe(mut raw: Vec<RawToken>) -> Vec<RawToken> {
    raw.sort_by_key(|t| (t.line, t.column, t.length, t.token_type));
    let mut result: Vec<RawToken> = Vec::with_capacity(raw.len());
    for token in raw {
        if let Some(last) = result.last() {
            let overlaps = last.line == token.line && token.column < last.column + last.length;
            if overlaps {
                let replace = token.length < last.length
                    || (token.length == last.length && token.token_type < last.token_type);
                if replace {
                    *result.last_mut().expect("non-empty") = token;
                }
                continue;
            }
        }
        result.push(token);
    }
    result
}

fn encode(raw: Vec<RawToken>) -> Vec<SemanticToken> {
    let mut data = Vec::with_capacity(raw.len());
    let mut previous_line = 0u32;
    let mut previous_column = 0u32;
    for token in raw {
        let delta_line = token.line - previous_line;
        let delta_start = if delta_line == 0 {
            token.column - previous_column
        } else {
            token.column
        };
        data.push(SemanticToken {
            delta_line,
            delta_start,
            length: token.length,
            token_type: token.token_type,
            token_modifiers_bitset: token.modifiers,
        });
        previous_line = token.line;
        previous_column = token.column;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{ClassData, MethodData, Modifiers, ParameterData};
    use tower_lsp::lsp_types::Position;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}.groovy")).unwrap()
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Option<Range> {
        Some(Range::new(Position::new(sl, sc), Position::new(el, ec)))
    }

    fn sample_index() -> (AstIndex, Url) {
        let mut index = AstIndex::new();
        let param = AstNode::new(
            NodeKind::Parameter(ParameterData {
                name: "who".to_string(),
                type_name: "String".to_string(),
            }),
            span(1, 16, 1, 26),
            vec![],
        );
        // Method range starts at the return type, not the identifier.
        let method = AstNode::new(
            NodeKind::Method(MethodData {
                name: "greet".to_string(),
                return_type: "String".to_string(),
                modifiers: Modifiers {
                    is_static: true,
                    ..Modifiers::default()
                },
            }),
            span(1, 4, 2, 5),
            vec![param],
        );
        let class = AstNode::new(
            NodeKind::Class(ClassData {
                name: "Greeter".to_string(),
                superclass: None,
                interfaces: vec![],
                is_interface: false,
                is_enum: false,
                is_annotation: false,
                is_script: false,
                modifiers: Modifiers::default(),
            }),
            span(0, 0, 3, 1),
            vec![method],
        );
        let u = uri("greeter");
        index.register_module(&u, None, &[class]);
        (index, u)
    }

    #[test]
    fn identifier_column_comes_from_source_line() {
        let (index, u) = sample_index();
        let source = Arc::new(
            "class Greeter {\n    static String greet(String who) {\n    }\n}\n".to_string(),
        );
        let tokens = semantic_tokens_full(&index, &u, Some(&source));
        assert_eq!(tokens.data.len(), 3);

        // class Greeter: line 0, identifier at col 6.
        assert_eq!(tokens.data[0].delta_line, 0);
        assert_eq!(tokens.data[0].delta_start, 6);
        assert_eq!(tokens.data[0].length, 7);
        assert_eq!(tokens.data[0].token_type, TYPE_CLASS);
        assert_eq!(tokens.data[0].token_modifiers_bitset, MOD_DECLARATION);

        // greet: next line, col 18, static declaration.
        assert_eq!(tokens.data[1].delta_line, 1);
        assert_eq!(tokens.data[1].delta_start, 18);
        assert_eq!(tokens.data[1].token_type, TYPE_METHOD);
        assert_eq!(
            tokens.data[1].token_modifiers_bitset,
            MOD_DECLARATION | MOD_STATIC
        );

        // who: same line as greet, delta from col 18 to 31.
        assert_eq!(tokens.data[2].delta_line, 0);
        assert_eq!(tokens.data[2].delta_start, 13);
        assert_eq!(tokens.data[2].token_type, TYPE_PARAMETER);
    }

    #[test]
    fn range_variant_clips_lines() {
        let (index, u) = sample_index();
        let tokens = semantic_tokens_range(
            &index,
            &u,
            None,
            Range::new(Position::new(5, 0), Position::new(9, 0)),
        );
        assert!(tokens.data.is_empty());
    }

    #[test]
    fn overlapping_tokens_prefer_shorter() {
        let raw = vec![
            RawToken {
                line: 0,
                column: 0,
                length: 10,
                token_type: TYPE_CLASS,
                modifiers: 0,
            },
            RawToken {
                line: 0,
                column: 0,
                length: 5,
                token_type: TYPE_METHOD,
                modifiers: 0,
            },
        ];
        let deduped = dedupe(raw);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].length, 5);
    }
}
