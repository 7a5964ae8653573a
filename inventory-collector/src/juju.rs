//! Juju controller client.
//!
//! Speaks the Juju JSON-RPC API over a TLS websocket:
//!
//! ```text
//! wss://<endpoint>/api                     controller connection
//! wss://<endpoint>/model/<uuid>/api        model connection
//!
//! -> {"request-id": 1, "type": "Admin", "version": 3, "request": "Login", "params": {..}}
//! <- {"request-id": 1, "response": {..}}
//! <- {"request-id": 1, "error": "..", "error-code": ".."}
//! ```
//!
//! Only the controller CA certificate from the configuration is trusted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, RootCertStore, pki_types::ServerName};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use inventory_common::ControllerConfig;

use crate::controller::{ControllerConnection, ControllerConnector, ModelConnection, ModelRef};
use crate::error::ControllerError;

/// Client version announced at login.
const CLIENT_VERSION: &str = "3.4.0";

type Socket = WebSocketStream<TlsStream<TcpStream>>;
type CallResult<T> = std::result::Result<T, ControllerError>;

/// Facade versions this client knows how to call.
const ADMIN_VERSION: u32 = 3;
const MODEL_MANAGER_VERSIONS: &[u32] = &[5, 6, 7, 8, 9, 10];
const CLIENT_VERSIONS: &[u32] = &[1, 2, 3, 4, 5, 6, 7, 8];
const BUNDLE_VERSIONS: &[u32] = &[1, 2, 3, 4, 5, 6, 7, 8];

/// Connector for a Juju controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct JujuConnector;

impl JujuConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ControllerConnector for JujuConnector {
    type Connection = JujuController;

    async fn connect(&self, config: &ControllerConfig) -> CallResult<JujuController> {
        let tls = TlsSettings::new(&config.ca_cert, &config.tls_server_name)?;
        let mut rpc = RpcConnection::open(&config.endpoint, "/api", &tls).await?;
        let facades = rpc.login(&config.username, &config.password).await?;

        Ok(JujuController {
            rpc,
            facades,
            config: config.clone(),
            tls,
        })
    }
}

/// Controller-level connection.
pub struct JujuController {
    rpc: RpcConnection,
    facades: FacadeVersions,
    config: ControllerConfig,
    tls: TlsSettings,
}

#[async_trait]
impl ControllerConnection for JujuController {
    type Model = JujuModel;

    async fn list_models(&mut self) -> CallResult<Vec<ModelRef>> {
        let version = self.facades.best("ModelManager", MODEL_MANAGER_VERSIONS)?;
        let response = self
            .rpc
            .call(
                "ModelManager",
                version,
                "ListModels",
                json!({ "tag": user_tag(&self.config.username) }),
            )
            .await?;

        parse_user_models(response)
    }

    async fn open_model(&mut self, model: &ModelRef) -> CallResult<JujuModel> {
        let path = format!("/model/{}/api", model.uuid);
        let mut rpc = RpcConnection::open(&self.config.endpoint, &path, &self.tls).await?;
        let facades = rpc
            .login(&self.config.username, &self.config.password)
            .await?;

        Ok(JujuModel { rpc, facades })
    }

    async fn disconnect(self) -> CallResult<()> {
        self.rpc.close().await
    }
}

/// Model-level connection.
pub struct JujuModel {
    rpc: RpcConnection,
    facades: FacadeVersions,
}

#[async_trait]
impl ModelConnection for JujuModel {
    async fn status(&mut self) -> CallResult<Value> {
        let version = self.facades.best("Client", CLIENT_VERSIONS)?;
        self.rpc
            .call("Client", version, "FullStatus", json!({ "patterns": [] }))
            .await
    }

    async fn export_bundle(&mut self) -> CallResult<String> {
        let version = self.facades.best("Bundle", BUNDLE_VERSIONS)?;
        let response = self
            .rpc
            .call("Bundle", version, "ExportBundle", json!({}))
            .await?;

        parse_string_result(response)
    }

    async fn disconnect(self) -> CallResult<()> {
        self.rpc.close().await
    }
}

/// TLS client settings trusting a single controller CA.
#[derive(Clone)]
struct TlsSettings {
    config: Arc<rustls::ClientConfig>,
    server_name: ServerName<'static>,
}

impl TlsSettings {
    fn new(ca_cert: &str, server_name: &str) -> CallResult<Self> {
        let mut roots = RootCertStore::empty();
        let mut reader = ca_cert.as_bytes();
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert =
                cert.map_err(|e| ControllerError::Tls(format!("invalid CA certificate: {}", e)))?;
            roots
                .add(cert)
                .map_err(|e| ControllerError::Tls(format!("invalid CA certificate: {}", e)))?;
        }
        if roots.is_empty() {
            return Err(ControllerError::Tls(
                "no certificate found in ca_cert".to_string(),
            ));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ControllerError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ControllerError::Tls(format!("invalid server name: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            server_name,
        })
    }
}

/// One websocket carrying sequential RPC calls.
struct RpcConnection {
    socket: Socket,
    next_id: u64,
}

impl RpcConnection {
    async fn open(endpoint: &str, path: &str, tls: &TlsSettings) -> CallResult<Self> {
        let tcp = TcpStream::connect(endpoint)
            .await
            .map_err(|e| ControllerError::Transport(format!("{}: {}", endpoint, e)))?;

        let stream = TlsConnector::from(tls.config.clone())
            .connect(tls.server_name.clone(), tcp)
            .await
            .map_err(|e| ControllerError::Tls(e.to_string()))?;

        let url = format!("wss://{}{}", endpoint, path);
        let (socket, _) = tokio_tungstenite::client_async(url.as_str(), stream).await?;

        debug!(url = %url, "Websocket established");

        Ok(Self { socket, next_id: 1 })
    }

    async fn login(&mut self, username: &str, password: &str) -> CallResult<FacadeVersions> {
        let response = self
            .call(
                "Admin",
                ADMIN_VERSION,
                "Login",
                json!({
                    "auth-tag": user_tag(username),
                    "credentials": password,
                    "nonce": "",
                    "macaroons": [],
                    "client-version": CLIENT_VERSION,
                }),
            )
            .await?;

        if response.get("discharge-required").is_some() {
            return Err(ControllerError::api(
                "login requires a macaroon discharge, which is not supported",
            ));
        }

        FacadeVersions::from_login(&response)
    }

    async fn call(
        &mut self,
        facade: &str,
        version: u32,
        request: &str,
        params: Value,
    ) -> CallResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({
            "request-id": id,
            "type": facade,
            "version": version,
            "request": request,
            "params": params,
        });
        trace!(facade, version, request, id, "RPC call");
        self.socket.send(Message::Text(body.to_string().into())).await?;

        loop {
            let message = self.socket.next().await.ok_or_else(|| {
                ControllerError::Transport("connection closed by controller".to_string())
            })??;

            let reply: RpcReply = match message {
                Message::Text(text) => serde_json::from_str(text.as_str())?,
                Message::Binary(data) => serde_json::from_slice(&data)?,
                Message::Close(_) => {
                    return Err(ControllerError::Transport(
                        "connection closed by controller".to_string(),
                    ));
                }
                _ => continue,
            };

            if reply.request_id != Some(id) {
                continue;
            }

            return reply.into_result();
        }
    }

    async fn close(mut self) -> CallResult<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(rename = "request-id")]
    request_id: Option<u64>,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "error-code")]
    error_code: Option<String>,
}

impl RpcReply {
    fn into_result(self) -> CallResult<Value> {
        match self.error {
            Some(message) if !message.is_empty() => Err(ControllerError::Api {
                message,
                code: self.error_code.filter(|c| !c.is_empty()),
            }),
            _ => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}

/// Facade versions advertised by the server at login.
#[derive(Debug, Default)]
struct FacadeVersions(HashMap<String, Vec<u32>>);

impl FacadeVersions {
    fn from_login(response: &Value) -> CallResult<Self> {
        #[derive(Deserialize)]
        struct Facade {
            name: String,
            versions: Vec<u32>,
        }

        let facades: Vec<Facade> = match response.get("facades") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };

        Ok(Self(
            facades.into_iter().map(|f| (f.name, f.versions)).collect(),
        ))
    }

    /// Highest version supported by both sides.
    fn best(&self, facade: &str, known: &[u32]) -> CallResult<u32> {
        self.0
            .get(facade)
            .and_then(|versions| versions.iter().filter(|v| known.contains(v)).max())
            .copied()
            .ok_or_else(|| {
                ControllerError::Protocol(format!(
                    "controller offers no supported version of facade {}",
                    facade
                ))
            })
    }
}

fn user_tag(username: &str) -> String {
    format!("user-{}", username)
}

fn parse_user_models(response: Value) -> CallResult<Vec<ModelRef>> {
    #[derive(Deserialize)]
    struct UserModels {
        #[serde(rename = "user-models", default)]
        user_models: Vec<UserModel>,
    }

    #[derive(Deserialize)]
    struct UserModel {
        model: ModelInfo,
    }

    #[derive(Deserialize)]
    struct ModelInfo {
        name: String,
        uuid: String,
    }

    let parsed: UserModels = serde_json::from_value(response)?;
    Ok(parsed
        .user_models
        .into_iter()
        .map(|m| ModelRef::new(m.model.name, m.model.uuid))
        .collect())
}

/// Unwrap a `StringResult`, surfacing an embedded error as an API error.
fn parse_string_result(response: Value) -> CallResult<String> {
    #[derive(Deserialize)]
    struct ErrorInfo {
        message: String,
        #[serde(default)]
        code: Option<String>,
    }

    #[derive(Deserialize)]
    struct StringResult {
        #[serde(default)]
        result: String,
        #[serde(default)]
        error: Option<ErrorInfo>,
    }

    let parsed: StringResult = serde_json::from_value(response)?;
    match parsed.error {
        Some(error) => Err(ControllerError::Api {
            message: error.message,
            code: error.code.filter(|c| !c.is_empty()),
        }),
        None => Ok(parsed.result),
    }
}
