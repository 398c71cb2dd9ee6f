//! Entry points used by the binary

use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::Result;
use crate::editor::BufferApplicator;
use crate::lsp::{ApplyEditHandler, ApplyReport, LanguageServer, Registrar};
use crate::workspace::{file_uri, Document, DocumentHandle, SessionRegistry, INITIAL_VERSION};

/// Documents touched by a run, after it ended
pub struct Outcome {
    pub documents: Vec<DocumentHandle>,
    /// Files written back to disk
    pub saved: Vec<PathBuf>,
}

/// Accept either bare request params or a whole JSON-RPC request
pub fn request_params(value: Value) -> Value {
    match value {
        Value::Object(mut request) if request.contains_key("method") => {
            request.remove("params").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Apply one saved `workspace/applyEdit` request to files on disk
pub async fn replay(
    params: Value,
    files: &[PathBuf],
    language_id: &str,
) -> Result<(ApplyReport, Vec<DocumentHandle>)> {
    let registry = Arc::new(SessionRegistry::new());
    let documents = open_sessions(&registry, files, language_id, None).await?;

    let handler = ApplyEditHandler::new(&registry, Arc::new(BufferApplicator));
    let report = handler.apply(request_params(params));
    Ok((report, documents))
}

/// Serve `workspace/applyEdit` from the configured server until `shutdown` resolves
/// or the server exits
pub async fn serve(
    config: &Config,
    files: &[PathBuf],
    shutdown: impl Future<Output = ()>,
) -> Result<Outcome> {
    let registry = Arc::new(SessionRegistry::new());
    let registrar = Registrar::new(registry.clone(), Arc::new(BufferApplicator));
    let tracking = registrar.spawn();

    let mut server = LanguageServer::start(&config.server)?;
    let connection = server.connection().clone();

    let documents = open_sessions(
        &registry,
        files,
        &config.server.language_id,
        Some(connection.clone()),
    )
    .await?;

    let root_uri = file_uri(&workspace_root(&documents)?)?;
    let capabilities = connection.initialize(&root_uri).await?;
    debug!("Server capabilities: {:?}", capabilities);

    tokio::select! {
        _ = shutdown => info!("Shutting down"),
        status = server.wait() => warn!("Language server exited: {:?}", status),
    }

    let mut saved = Vec::new();
    if config.write_back {
        for document in &documents {
            if document.version()? > INITIAL_VERSION && document.save().await? {
                if let Some(path) = document.path() {
                    info!("Wrote {}", path.display());
                    saved.push(path.to_path_buf());
                }
            }
        }
    }

    server.shutdown().await?;
    tracking.abort();
    Ok(Outcome { documents, saved })
}

async fn open_sessions(
    registry: &SessionRegistry,
    files: &[PathBuf],
    language_id: &str,
    connection: Option<Arc<crate::lsp::ServerConnection>>,
) -> Result<Vec<DocumentHandle>> {
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let id = registry.add_session(file.clone(), connection.clone());
        let document = Document::open(file, language_id).await?;
        registry.attach_document(id, document.clone());
        documents.push(document);
    }
    Ok(documents)
}

/// Directory of the first document, or the current directory
fn workspace_root(documents: &[DocumentHandle]) -> Result<PathBuf> {
    match documents
        .first()
        .and_then(|document| document.path())
        .and_then(Path::parent)
    {
        Some(root) => Ok(root.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}
