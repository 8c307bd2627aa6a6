//! LSP request handlers: scope selection, provider dispatch, locking.
//!
//! The lock policy lives here and nowhere else. Writes (open, change,
//! save) and the placeholder-driven requests (completion, signature help)
//! go through the scope's recompile lock; read-only providers clone the
//! current AST index reference and run lock-free, which the index's
//! copy-on-write snapshots make safe. A provider never surfaces an error
//! over the transport: failures degrade to empty results with a log line.

use std::sync::Arc;

use serde::Deserialize;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::request::{
    GotoImplementationParams, GotoImplementationResponse, GotoTypeDefinitionParams,
    GotoTypeDefinitionResponse,
};
use tower_lsp::lsp_types::*;
use tower_lsp::LanguageServer;
use tracing::{debug, info};

use crate::lsp::backend::scope::{Placeholder, ProjectScope};
use crate::lsp::backend::state::{GroovyBackend, ServerSettings};
use crate::lsp::features;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompiledSourceParams {
    pub uri: Url,
}

impl GroovyBackend {
    /// Serve the text of a `groovy-lsp-decompiled://` document.
    pub async fn decompiled_source(
        &self,
        params: DecompiledSourceParams,
    ) -> Result<Option<String>> {
        Ok(self.decompiled.get(&params.uri).map(|text| text.clone()))
    }

    async fn run_blocking<T, F>(&self, scope: Arc<ProjectScope>, task: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<ProjectScope>) -> Option<T> + Send + 'static,
    {
        match tokio::task::spawn_blocking(move || task(scope)).await {
            Ok(result) => result,
            Err(e) => {
                debug!("background provider task failed: {e}");
                None
            }
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for GroovyBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let mut roots = Vec::new();
        if let Some(folders) = &params.workspace_folders {
            roots.extend(folders.iter().filter_map(|f| f.uri.to_file_path().ok()));
        }
        #[allow(deprecated)]
        if let Some(root_uri) = &params.root_uri {
            if let Ok(path) = root_uri.to_file_path() {
                roots.push(path);
            }
        }
        *self.workspace_roots.write() = roots;

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "groovy-language-server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string(), "@".to_string()]),
                    ..CompletionOptions::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                definition_provider: Some(OneOf::Left(true)),
                type_definition_provider: Some(TypeDefinitionProviderCapability::Simple(true)),
                implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
                references_provider: Some(OneOf::Left(true)),
                document_highlight_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                })),
                document_formatting_provider: Some(OneOf::Left(true)),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: features::semantic_tokens::legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: Some(true),
                            work_done_progress_options: WorkDoneProgressOptions::default(),
                        },
                    ),
                ),
                inlay_hint_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("groovy language server initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        let roots: Vec<_> = self.scopes.iter().map(|e| e.key().clone()).collect();
        for root in roots {
            self.drop_scope(&root);
        }
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let groovy = &params.settings["groovy"];
        let string_list = |value: &serde_json::Value| -> Vec<String> {
            value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        let settings = ServerSettings {
            classpath: string_list(&groovy["classpath"]),
            rejected_packages: string_list(&groovy["memory"]["rejectedPackages"]),
        };
        info!(
            "configuration changed: {} classpath entries, {} rejected packages",
            settings.classpath.len(),
            settings.rejected_packages.len()
        );
        self.apply_settings(settings);
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.tracker.open(uri.clone(), params.text_document.text);
        if let Some(scope) = self.scope_for(&uri) {
            scope.mark_open(uri.clone());
        }
        self.recompile_and_publish(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        self.tracker.change(&uri, &params.content_changes);
        self.recompile_and_publish(&uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.recompile_and_publish(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.tracker.close(&uri);
        if let Some(scope) = self.existing_scope_for(&uri) {
            if scope.mark_closed(&uri) {
                let root = scope.root().to_path_buf();
                self.drop_scope(&root);
            }
        }
        self.tracker.remove(&uri);
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;
        let Some(scope) = self.scope_for(&uri) else {
            return Ok(None);
        };
        let decompiled = self.decompiled.clone();
        let result = self
            .run_blocking(scope, move |scope| {
                let index = scope.ast_index();
                let classpath = scope.classpath();
                features::definition::definition(
                    &index,
                    &uri,
                    position,
                    classpath.as_ref(),
                    &decompiled,
                )
            })
            .await;
        Ok(result)
    }

    async fn goto_type_definition(
        &self,
        params: GotoTypeDefinitionParams,
    ) -> Result<Option<GotoTypeDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;
        let Some(scope) = self.scope_for(&uri) else {
            return Ok(None);
        };
        let decompiled = self.decompiled.clone();
        let result = self
            .run_blocking(scope, move |scope| {
                let index = scope.ast_index();
                let classpath = scope.classpath();
                features::type_definition::type_definition(
                    &index,
                    &uri,
                    position,
                    classpath.as_ref(),
                    &decompiled,
                )
            })
            .await;
        Ok(result)
    }

    async fn goto_implementation(
        &self,
        params: GotoImplementationParams,
    ) -> Result<Option<GotoImplementationResponse>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let locations = features::implementation::implementation(&scope.ast_index(), &uri, position);
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(GotoImplementationResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let locations = features::references::references(
            &scope.ast_index(),
            &uri,
            position,
            params.context.include_declaration,
        );
        Ok((!locations.is_empty()).then_some(locations))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let highlights =
            features::references::document_highlight(&scope.ast_index(), &uri, position);
        Ok((!highlights.is_empty()).then_some(highlights))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        Ok(features::hover::hover(&scope.ast_index(), &uri, position))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(scope) = self.scope_for(&uri) else {
            return Ok(None);
        };
        let source = self.tracker.contents(&uri);
        let items = self
            .run_blocking(scope, move |scope| {
                let fork = scope.placeholder_recompile(&uri, position, Placeholder::Completion)?;
                let classpath = scope.classpath();
                let request = features::completion::CompletionRequest {
                    index: &fork,
                    uri: &uri,
                    position,
                    source,
                    classpath: classpath.as_ref(),
                };
                Some(features::completion::completion(&request))
            })
            .await
            .unwrap_or_default();
        Ok((!items.is_empty()).then(|| CompletionResponse::Array(items)))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(scope) = self.scope_for(&uri) else {
            return Ok(None);
        };
        let source = self.tracker.contents(&uri);
        let help = self
            .run_blocking(scope, move |scope| {
                let fork =
                    scope.placeholder_recompile(&uri, position, Placeholder::SignatureHelp)?;
                let classpath = scope.classpath();
                let request = features::signature_help::SignatureHelpRequest {
                    index: &fork,
                    uri: &uri,
                    position,
                    source,
                    classpath: classpath.as_ref(),
                };
                features::signature_help::signature_help(&request)
            })
            .await;
        Ok(help)
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.scope_for(&uri) else {
            return Ok(None);
        };
        let text = self.tracker.contents(&uri);
        let diagnostics = params.context.diagnostics;
        let actions = self
            .run_blocking(scope, move |scope| {
                let index = scope.ast_index();
                let classpath = scope.classpath();
                Some(features::code_actions::code_actions(
                    &index,
                    &uri,
                    &diagnostics,
                    classpath.as_ref(),
                    text.as_ref(),
                ))
            })
            .await
            .unwrap_or_default();
        Ok((!actions.is_empty()).then_some(actions))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let range = features::rename::prepare_rename(
            &scope.ast_index(),
            &self.tracker,
            &uri,
            params.position,
        );
        Ok(range.map(PrepareRenameResponse::Range))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        Ok(features::rename::rename(
            &scope.ast_index(),
            &self.tracker,
            &uri,
            position,
            &params.new_name,
        ))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let symbols = features::document_symbol::document_symbols(&scope.ast_index(), &uri);
        Ok((!symbols.is_empty()).then(|| DocumentSymbolResponse::Nested(symbols)))
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        let mut results = Vec::new();
        for entry in self.scopes.iter() {
            results.extend(features::workspace_symbol::workspace_symbols(
                &entry.value().ast_index(),
                &params.query,
            ));
        }
        Ok((!results.is_empty()).then_some(results))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let source = self.tracker.contents(&uri);
        let tokens = features::semantic_tokens::semantic_tokens_full(
            &scope.ast_index(),
            &uri,
            source.as_ref(),
        );
        Ok(Some(SemanticTokensResult::Tokens(tokens)))
    }

    async fn semantic_tokens_range(
        &self,
        params: SemanticTokensRangeParams,
    ) -> Result<Option<SemanticTokensRangeResult>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let source = self.tracker.contents(&uri);
        let tokens = features::semantic_tokens::semantic_tokens_range(
            &scope.ast_index(),
            &uri,
            source.as_ref(),
            params.range,
        );
        Ok(Some(SemanticTokensRangeResult::Tokens(tokens)))
    }

    async fn inlay_hint(&self, params: InlayHintParams) -> Result<Option<Vec<InlayHint>>> {
        let uri = params.text_document.uri;
        let Some(scope) = self.existing_scope_for(&uri) else {
            return Ok(None);
        };
        let hints =
            features::inlay_hints::inlay_hints(&scope.ast_index(), &uri, params.range);
        Ok((!hints.is_empty()).then_some(hints))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        let Some(text) = self.tracker.contents(&uri) else {
            return Ok(None);
        };
        let formatted = features::formatting::format_source(&text);
        let edits = features::formatting::format_edits(&text, &formatted);
        Ok((!edits.is_empty()).then_some(edits))
    }
}
