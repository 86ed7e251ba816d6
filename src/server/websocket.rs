use crate::agent::SearchAgent;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use super::session::{ ready_message, ChatSession };

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{ TcpListener, TcpStream };

use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::protocol::{ Message, WebSocketConfig };
use tokio_tungstenite::tungstenite::Error as WsError;
use url::form_urlencoded;

use futures::{ future, SinkExt, StreamExt };
use log::{ info, warn, error };
use uuid::Uuid;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

/// Frames and reassembled messages over `MAX_MESSAGE_SIZE` are refused while
/// reading, before they are buffered.
pub fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_SIZE),
        max_frame_size: Some(MAX_MESSAGE_SIZE),
        ..Default::default()
    }
}

fn encode(msg: ServerMessage) -> Result<Message, WsError> {
    serde_json
        ::to_string(&msg)
        .map(Message::Text)
        .map_err(|e| WsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Checks the `key` query parameter against the configured server key.
pub fn is_authorized(query: Option<&str>, required_api_key: Option<&str>) -> bool {
    let secret = match required_api_key {
        Some(k) if !k.is_empty() => k,
        _ => {
            return true;
        }
    };
    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    params.get("key").map(|k| k == secret).unwrap_or(false)
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<SearchAgent>,
    api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();

        tokio::spawn(async move {
            if let Err(e) = process_connection(peer, stream, agent_clone, required_api_key).await {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection(
    peer: SocketAddr,
    stream: TcpStream,
    agent: Arc<SearchAgent>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if is_authorized(req.uri().query(), required_api_key.as_deref()) {
            return Ok(response);
        }
        warn!("Rejected unauthorized connection from {}", peer);
        let mut res = ErrorResponse::new(Some("invalid or missing key".into()));
        *res.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::UNAUTHORIZED;
        Err(res)
    };

    let websocket = accept_hdr_async_with_config(stream, auth_callback, Some(ws_config())).await?;
    handle_connection(peer, websocket, agent).await;
    Ok(())
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: tokio_tungstenite::WebSocketStream<S>,
    agent: Arc<SearchAgent>
)
    where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin
{
    let (tx, mut rx) = websocket.split();
    let mut tx = tx.with(|msg: ServerMessage| future::ready(encode(msg)));
    let mut session = ChatSession::new(Uuid::new_v4().to_string());
    info!("Assigned conversation ID {} to {}", session.id(), peer);

    if let Err(e) = tx.send(ready_message()).await {
        error!("Failed to send ready message to {}: {}", peer, e);
        return;
    }

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    WsError::Capacity(ref cap) => {
                        warn!("Message from {} exceeds size limit of {} bytes: {}", peer, MAX_MESSAGE_SIZE, cap);
                        let error_msg = ServerMessage::Error {
                            message: "Message too large".to_string(),
                        };
                        if tx.send(error_msg).await.is_err() {
                            error!("Failed to send size limit error to {}", peer);
                        }
                    }
                    | WsError::ConnectionClosed
                    | WsError::Protocol(_)
                    | WsError::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    WsError::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::ConnectionReset => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let client_message = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_message) => client_message,
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        };
                        if let Err(e) = tx.send(error_msg).await {
                            error!("Error sending parse error to {}: {}", peer, e);
                            break;
                        }
                        continue;
                    }
                };
                if let Err(e) = session.handle(&agent, client_message, &mut tx).await {
                    error!("Error sending reply to {}: {}", peer, e);
                    break;
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
            }
            Message::Frame(_) => {}
        }
    }
    info!(
        "WebSocket connection closed for {} (Conv ID: {}, {} turn(s))",
        peer,
        session.id(),
        session.history().len()
    );
}
