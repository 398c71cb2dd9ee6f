use async_trait::async_trait;
use lsp_types::ServerCapabilities;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::{LspError, Result};
use crate::config::ServerConfig;
use super::transport::{read_message, write_message};
use super::types::{
    Message, NotificationMessage, RequestId, RequestMessage, ResponseMessage, INTERNAL_ERROR,
    METHOD_NOT_FOUND,
};

/// Handler for a request the server sends to us
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Value) -> Result<Value>;
}

/// Where the server is in its initialization
#[derive(Debug, Clone)]
enum ServerState {
    Starting,
    Initialized(Box<ServerCapabilities>),
    Closed,
}

struct Shared {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Result<Value>>>>,
    handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    state: watch::Sender<ServerState>,
    next_id: AtomicI64,
}

/// JSON-RPC connection to one language server
pub struct ServerConnection {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerConnection {
    /// Run a connection over an arbitrary byte stream pair
    pub fn new<R, W>(reader: R, writer: W) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ServerState::Starting);
        let shared = Arc::new(Shared {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            state,
            next_id: AtomicI64::new(1),
        });

        let writer_task = tokio::spawn(write_loop(writer, outgoing_rx));
        let reader_task = tokio::spawn(read_loop(shared.clone(), BufReader::new(reader)));

        Arc::new(Self {
            shared,
            tasks: vec![reader_task, writer_task],
        })
    }

    /// Send a request and wait for its result
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = RequestId::Number(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.shared.pending_insert(id.clone(), tx);

        if matches!(*self.shared.state.borrow(), ServerState::Closed) {
            self.shared.pending_remove(&id);
            return Err(LspError::ConnectionClosed);
        }

        let message = serde_json::to_string(&RequestMessage::new(id.clone(), method, params))?;
        if self.shared.outgoing.send(message).is_err() {
            self.shared.pending_remove(&id);
            return Err(LspError::ConnectionClosed);
        }

        rx.await.map_err(|_| LspError::ConnectionClosed)?
    }

    /// Send a notification
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = serde_json::to_string(&NotificationMessage::new(method, params))?;
        self.shared
            .outgoing
            .send(message)
            .map_err(|_| LspError::ConnectionClosed)
    }

    /// Install (or replace) the handler for a server-to-client request
    pub fn on_request(&self, method: &str, handler: Arc<dyn RequestHandler>) {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method.to_string(), handler);
    }

    pub fn has_handler(&self, method: &str) -> bool {
        self.shared
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(method)
    }

    /// Perform the LSP handshake and publish the server's capabilities
    pub async fn initialize(&self, root_uri: &str) -> Result<ServerCapabilities> {
        let result = self
            .request(
                "initialize",
                json!({
                    "processId": std::process::id(),
                    "rootUri": root_uri,
                    "capabilities": {
                        "workspace": {
                            "applyEdit": true,
                            "workspaceEdit": { "documentChanges": true }
                        },
                        "textDocument": {
                            "synchronization": {
                                "dynamicRegistration": false,
                                "didSave": false
                            }
                        }
                    },
                    "workspaceFolders": [{ "uri": root_uri, "name": "workspace" }]
                }),
            )
            .await?;

        let capabilities = result
            .get("capabilities")
            .cloned()
            .ok_or_else(|| LspError::InvalidMessage("initialize result has no capabilities".into()))?;
        let capabilities: ServerCapabilities = serde_json::from_value(capabilities)?;

        self.notify("initialized", json!({}))?;
        self.mark_initialized(capabilities.clone());
        Ok(capabilities)
    }

    /// Publish capabilities for a server initialized by other means
    pub fn mark_initialized(&self, capabilities: ServerCapabilities) {
        info!("Language server initialized");
        self.shared
            .state
            .send_replace(ServerState::Initialized(Box::new(capabilities)));
    }

    /// Wait for the server's capabilities; `None` if the connection closes first
    pub async fn server_initialized(&self) -> Option<ServerCapabilities> {
        let mut state = self.shared.state.subscribe();
        let state = state
            .wait_for(|state| !matches!(state, ServerState::Starting))
            .await
            .ok()?;
        match &*state {
            ServerState::Initialized(capabilities) => Some((**capabilities).clone()),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.shared.state.borrow(), ServerState::Closed)
    }

    /// Ask the server to shut down and exit
    pub async fn shutdown(&self) -> Result<()> {
        self.request("shutdown", Value::Null).await?;
        self.notify("exit", Value::Null)
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Shared {
    fn pending_insert(&self, id: RequestId, tx: oneshot::Sender<Result<Value>>) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
    }

    fn pending_remove(&self, id: &RequestId) -> Option<oneshot::Sender<Result<Value>>> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    fn handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .cloned()
    }

    fn close(&self) {
        self.state.send_replace(ServerState::Closed);
        let pending: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(LspError::ConnectionClosed));
        }
    }

    fn send(&self, response: ResponseMessage) {
        match serde_json::to_string(&response) {
            Ok(message) => {
                if self.outgoing.send(message).is_err() {
                    warn!("Dropping response, writer is gone");
                }
            }
            Err(e) => error!("Failed to serialize response: {}", e),
        }
    }

    async fn dispatch(&self, message: Message) {
        match message {
            Message::Response(response) => {
                let Some(id) = response.id else {
                    warn!("Response without id: {:?}", response.error);
                    return;
                };
                let Some(tx) = self.pending_remove(&id) else {
                    warn!("Unknown request ID: {}", id);
                    return;
                };
                let result = match response.error {
                    Some(error) => Err(LspError::Server(error)),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(result);
            }
            Message::Request(request) => {
                // Requests are answered one at a time, in arrival order
                let response = match self.handler(&request.method) {
                    Some(handler) => match handler.handle(request.params).await {
                        Ok(result) => ResponseMessage::success(request.id, result),
                        Err(e) => {
                            warn!("Handler for {} failed: {}", request.method, e);
                            ResponseMessage::failure(request.id, INTERNAL_ERROR, e.to_string())
                        }
                    },
                    None => {
                        debug!("No handler for server request {}", request.method);
                        ResponseMessage::failure(
                            request.id,
                            METHOD_NOT_FOUND,
                            format!("Unhandled method {}", request.method),
                        )
                    }
                };
                self.send(response);
            }
            Message::Notification(notification) => {
                debug!("Notification: {}", notification.method);
            }
        }
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: BufReader<R>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(raw)) => match serde_json::from_str::<Message>(&raw) {
                Ok(message) => shared.dispatch(message).await,
                Err(e) => warn!("Ignoring undecodable message: {}", e),
            },
            Ok(None) => {
                debug!("Language server closed the connection");
                break;
            }
            Err(e) => {
                error!("Failed to read from language server: {}", e);
                break;
            }
        }
    }
    shared.close();
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            error!("Failed to write to language server: {}", e);
            break;
        }
    }
}

/// A language server process speaking LSP over stdio
pub struct LanguageServer {
    connection: Arc<ServerConnection>,
    process: Child,
}

impl LanguageServer {
    /// Start the configured language server process
    pub fn start(config: &ServerConfig) -> Result<Self> {
        let command = config.command.as_str();
        info!("Starting LSP server: {} {:?}", command, config.args);

        let mut process = Command::new(command)
            .args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::SpawnFailed(format!("{}: {}", command, e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed("Failed to get stdout".to_string()))?;

        Ok(Self {
            connection: ServerConnection::new(stdout, stdin),
            process,
        })
    }

    pub fn connection(&self) -> &Arc<ServerConnection> {
        &self.connection
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.process.wait().await?)
    }

    /// Graceful shutdown, killing the process if it does not exit in time
    pub async fn shutdown(mut self) -> Result<()> {
        if !self.connection.is_closed() {
            if let Err(e) = self.connection.shutdown().await {
                warn!("Failed to shut down language server: {}", e);
            }
        }

        tokio::select! {
            status = self.process.wait() => {
                debug!("LSP server exited with status: {:?}", status);
            }
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                warn!("LSP server didn't exit within 5s, killing");
                self.process.kill().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{BufReader as TokioBufReader, DuplexStream, ReadHalf, WriteHalf};

    /// Server side of an in-memory connection
    struct FakeServer {
        reader: TokioBufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        async fn send(&mut self, value: Value) {
            write_message(&mut self.writer, &value.to_string()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let raw = read_message(&mut self.reader).await.unwrap().unwrap();
            serde_json::from_str(&raw).unwrap()
        }
    }

    fn connect() -> (Arc<ServerConnection>, FakeServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        (
            ServerConnection::new(client_read, client_write),
            FakeServer {
                reader: TokioBufReader::new(server_read),
                writer: server_write,
            },
        )
    }

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, params: Value) -> Result<Value> {
            Ok(json!({ "echo": params }))
        }
    }

    #[tokio::test]
    async fn test_request_response() {
        let (connection, mut server) = connect();

        let request = tokio::spawn({
            let connection = connection.clone();
            async move { connection.request("test/ping", json!({ "n": 1 })).await }
        });

        let message = server.recv().await;
        assert_eq!(message["method"], "test/ping");
        server
            .send(json!({ "jsonrpc": "2.0", "id": message["id"], "result": "pong" }))
            .await;

        assert_eq!(request.await.unwrap().unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_server_error_response() {
        let (connection, mut server) = connect();

        let request = tokio::spawn({
            let connection = connection.clone();
            async move { connection.request("test/fail", Value::Null).await }
        });

        let message = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": message["id"],
                "error": { "code": -32600, "message": "bad" }
            }))
            .await;

        match request.await.unwrap() {
            Err(LspError::Server(error)) => assert_eq!(error.code, -32600),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inbound_request_routing() {
        let (connection, mut server) = connect();

        server
            .send(json!({ "jsonrpc": "2.0", "id": 1, "method": "custom/echo", "params": 5 }))
            .await;
        let response = server.recv().await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        connection.on_request("custom/echo", Arc::new(Echo));
        assert!(connection.has_handler("custom/echo"));

        server
            .send(json!({ "jsonrpc": "2.0", "id": 2, "method": "custom/echo", "params": 5 }))
            .await;
        let response = server.recv().await;
        assert_eq!(response, json!({ "jsonrpc": "2.0", "id": 2, "result": { "echo": 5 } }));
    }

    #[tokio::test]
    async fn test_initialize_publishes_capabilities() {
        let (connection, mut server) = connect();

        let waiter = tokio::spawn({
            let connection = connection.clone();
            async move { connection.server_initialized().await }
        });

        let initialize = tokio::spawn({
            let connection = connection.clone();
            async move { connection.initialize("file:///project").await }
        });

        let request = server.recv().await;
        assert_eq!(request["method"], "initialize");
        assert_eq!(request["params"]["capabilities"]["workspace"]["applyEdit"], true);
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {
                    "capabilities": {
                        "executeCommandProvider": { "commands": ["fix.all"] }
                    }
                }
            }))
            .await;

        let initialized = server.recv().await;
        assert_eq!(initialized["method"], "initialized");

        let capabilities = initialize.await.unwrap().unwrap();
        assert_eq!(
            capabilities.execute_command_provider.map(|p| p.commands),
            Some(vec!["fix.all".to_string()])
        );

        let published = waiter.await.unwrap().unwrap();
        assert!(published.execute_command_provider.is_some());
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_waiters() {
        let (connection, server) = connect();

        let request = tokio::spawn({
            let connection = connection.clone();
            async move { connection.request("test/never", Value::Null).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(server);

        assert!(matches!(
            request.await.unwrap(),
            Err(LspError::ConnectionClosed)
        ));
        assert!(connection.server_initialized().await.is_none());
        assert!(connection.is_closed());
        assert!(matches!(
            connection.request("test/after", Value::Null).await,
            Err(LspError::ConnectionClosed)
        ));
    }
}
