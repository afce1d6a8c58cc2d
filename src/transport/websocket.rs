//! WebSocket transport
//!
//! Accepts connections, decodes each text frame into a [`ClientMessage`],
//! runs it against the [`Broker`] and answers with one [`ServerMessage`].
//! Frames on a connection are handled in order. A malformed frame gets a
//! `400` error frame and the connection stays open.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::Broker;
use crate::broker::message::NewMessage;
use crate::transport::message::{
    ClientMessage, STATUS_BAD_REQUEST, STATUS_CREATED, STATUS_OK, ServerMessage,
};
use crate::utils::error::{BrokerError, ErrorKind, Result};

pub async fn start_websocket_server(addr: &str, broker: Broker) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, broker).await
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, broker: Broker) -> std::io::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, broker.clone()));
            }
            Err(e) => warn!("Failed to accept connection: {e}"),
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Broker) {
    let connection_id = format!("conn-{}", Uuid::new_v4());

    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    debug!(%peer, %connection_id, "connected");

    while let Some(frame) = ws_stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%connection_id, "read error: {e}");
                break;
            }
        };

        let reply = match frame {
            WsMessage::Text(text) => handle_text(&broker, text.as_str()),
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                error!(%connection_id, "Failed to serialize response: {e}");
                continue;
            }
        };
        if let Err(e) = ws_stream.send(WsMessage::text(json)).await {
            warn!(%connection_id, "Failed to send response: {e}");
            break;
        }
    }

    debug!(%connection_id, "disconnected");
}

/// Decodes one text frame and handles it.
pub fn handle_text(broker: &Broker, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => handle_request(broker, request),
        Err(err) => {
            warn!(
                "Invalid client message: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            ServerMessage::Error {
                status: STATUS_BAD_REQUEST,
                error: "INVALID_ARGUMENT".to_string(),
                message: format!("malformed request: {err}"),
            }
        }
    }
}

/// Runs one request against the broker.
pub fn handle_request(broker: &Broker, request: ClientMessage) -> ServerMessage {
    match request {
        ClientMessage::CreateTopic { name } => respond(broker.create_topic(&name), |topic| {
            ServerMessage::Topic {
                status: STATUS_CREATED,
                topic,
            }
        }),
        ClientMessage::ListTopics => respond(broker.list_topics(), |topics| {
            ServerMessage::Topics {
                status: STATUS_OK,
                topics,
            }
        }),
        ClientMessage::Subscribe { topic_id } => {
            respond(broker.subscribe(topic_id), |subscription| {
                ServerMessage::Subscription {
                    status: STATUS_CREATED,
                    subscription,
                }
            })
        }
        ClientMessage::ListSubscriptions { topic_id } => {
            respond(broker.list_subscriptions(topic_id), |subscriptions| {
                ServerMessage::Subscriptions {
                    status: STATUS_OK,
                    subscriptions,
                }
            })
        }
        ClientMessage::Publish {
            topic_id,
            payload,
            expires_after,
            status,
        } => {
            let message = NewMessage {
                payload,
                expires_after,
                status: status.unwrap_or_default(),
            };
            respond(broker.publish(topic_id, message), |copies| {
                ServerMessage::Published {
                    status: STATUS_CREATED,
                    copies: copies.len(),
                    message: "message has been published".to_string(),
                }
            })
        }
        ClientMessage::Pull { subscription_id } => {
            respond(broker.pull(subscription_id), |messages| {
                ServerMessage::Messages {
                    status: STATUS_OK,
                    messages,
                }
            })
        }
        ClientMessage::ListMessages {
            subscription_id,
            exclude,
        } => respond(broker.list_messages(subscription_id, exclude), |messages| {
            ServerMessage::Messages {
                status: STATUS_OK,
                messages,
            }
        }),
        ClientMessage::Acknowledge {
            subscription_id,
            message_ids,
        } => respond(
            broker.acknowledge(subscription_id, &message_ids),
            |report| ServerMessage::Acknowledged {
                status: STATUS_OK,
                acknowledged: report.acknowledged,
                submitted: report.submitted,
                message: report.to_string(),
            },
        ),
    }
}

fn respond<T>(result: Result<T>, ok: impl FnOnce(T) -> ServerMessage) -> ServerMessage {
    match result {
        Ok(value) => ok(value),
        Err(err) => error_frame(&err),
    }
}

fn error_frame(err: &BrokerError) -> ServerMessage {
    match err.kind() {
        ErrorKind::Internal => error!("request failed: {err}"),
        _ => debug!("request rejected: {err}"),
    }
    ServerMessage::Error {
        status: err.status_code(),
        error: err.error_code().to_string(),
        message: err.to_string(),
    }
}
