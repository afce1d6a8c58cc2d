//! Client for the postbox WebSocket protocol
//!
//! `PostboxClient` sends one request frame at a time and waits for its
//! response, so calls on one client are strictly ordered. Open several
//! clients for concurrent producers or consumers.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::{DeliveryStatus, MessageId};
use crate::broker::topic::{SubscriptionId, TopicId};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::ClientError;

pub struct PostboxClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PostboxClient {
    /// Connect to a server, e.g. `ws://127.0.0.1:8080`.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Sends a request and waits for the matching response frame.
    pub async fn request(&mut self, request: &ClientMessage) -> Result<ServerMessage, ClientError> {
        let text = serde_json::to_string(request)?;
        self.stream.send(WsMessage::text(text)).await?;

        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
                WsMessage::Close(_) => break,
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }

    pub async fn create_topic(&mut self, name: &str) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::CreateTopic {
            name: name.to_string(),
        })
        .await
    }

    pub async fn list_topics(&mut self) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::ListTopics).await
    }

    pub async fn subscribe(&mut self, topic_id: TopicId) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::Subscribe { topic_id }).await
    }

    pub async fn publish(
        &mut self,
        topic_id: TopicId,
        payload: &str,
        expires_after: Option<u64>,
    ) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::Publish {
            topic_id,
            payload: payload.to_string(),
            expires_after,
            status: None,
        })
        .await
    }

    pub async fn pull(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::Pull { subscription_id }).await
    }

    pub async fn list_messages(
        &mut self,
        subscription_id: SubscriptionId,
        exclude: Option<DeliveryStatus>,
    ) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::ListMessages {
            subscription_id,
            exclude,
        })
        .await
    }

    pub async fn acknowledge(
        &mut self,
        subscription_id: SubscriptionId,
        message_ids: Vec<MessageId>,
    ) -> Result<ServerMessage, ClientError> {
        self.request(&ClientMessage::Acknowledge {
            subscription_id,
            message_ids,
        })
        .await
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
