//! Per-connection handler: turns inbound frames into topic operations.
//!
//! Every connection gets its own [`ConnectionHandler`], run by the
//! transport's read task. Frames from one connection are therefore handled
//! strictly in order, and a publish holds up its sender's next frame until
//! the fan-out finishes.
//!
//! | Frame         | Action                                   | Reply  |
//! |---------------|------------------------------------------|--------|
//! | `Subscribe`   | subscribe to the topic, creating it      | `Ok`   |
//! | `Unsubscribe` | unsubscribe if subscribed                | `Ok`   |
//! | `Publish`     | fan out to the topic's subscribers       | `Ok`   |
//! | `Close`       | close the connection                     | none   |
//! | `Connect`/`Ok`| unsupported; close the connection        | none   |
//!
//! The `Ok` reply means "frame processed", not "operation succeeded": it is
//! sent even when the body failed to decode.

use std::future::Future;
use std::sync::Arc;

use pubwire_protocol::{
    Codec, Frame, MessageType, ProtocolError, PublishMsg, SubscribeMsg,
    UnsubscribeMsg,
};
use pubwire_topic::ClientId;
use pubwire_transport::{FrameHandler, TransportHandle};

use crate::server::BrokerState;

pub(crate) struct ConnectionHandler<C: Codec> {
    client_id: ClientId,
    state: Arc<BrokerState<C>>,
}

impl<C: Codec> ConnectionHandler<C> {
    pub(crate) fn new(client_id: ClientId, state: Arc<BrokerState<C>>) -> Self {
        Self { client_id, state }
    }

    async fn dispatch(&self, conn: TransportHandle, frame: Frame) {
        let client_id = self.client_id;
        tracing::debug!(
            %client_id,
            kind = %frame.kind,
            len = frame.body.len(),
            "dispatching frame"
        );

        let result = match frame.kind {
            MessageType::Subscribe => self.on_subscribe(&frame.body),
            MessageType::Unsubscribe => self.on_unsubscribe(&frame.body),
            MessageType::Publish => self.on_publish(&frame.body).await,
            MessageType::Close => {
                tracing::debug!(%client_id, "client sent close");
                conn.close().await;
                return;
            }
            MessageType::Connect | MessageType::Ok => {
                tracing::warn!(
                    %client_id,
                    kind = %frame.kind,
                    "unsupported message type, closing"
                );
                conn.close().await;
                return;
            }
        };

        if let Err(e) = result {
            tracing::warn!(
                %client_id,
                kind = %frame.kind,
                error = %e,
                "failed to handle frame body"
            );
        }

        if let Err(e) = conn.write(&Frame::ok()).await {
            tracing::debug!(%client_id, error = %e, "failed to send ack");
        }
    }

    fn on_subscribe(&self, body: &[u8]) -> Result<(), ProtocolError> {
        let msg: SubscribeMsg = self.state.codec.decode(body)?;

        // The record was registered on accept and stays until teardown.
        let Some(subscriber) = self.state.clients.get(self.client_id.0) else {
            return Ok(());
        };
        self.state.topics.subscribe(&msg.topic, &subscriber);
        Ok(())
    }

    fn on_unsubscribe(&self, body: &[u8]) -> Result<(), ProtocolError> {
        let msg: UnsubscribeMsg = self.state.codec.decode(body)?;
        self.state.topics.unsubscribe(&msg.topic, self.client_id);
        Ok(())
    }

    async fn on_publish(&self, body: &[u8]) -> Result<(), ProtocolError> {
        let msg: PublishMsg = self.state.codec.decode(body)?;
        let report = self
            .state
            .topics
            .publish(&msg.topic, &self.state.codec, &msg.data)
            .await?;

        tracing::debug!(
            client_id = %self.client_id,
            topic = %msg.topic,
            delivered = report.delivered,
            failed = report.failed.len(),
            "publish handled"
        );
        Ok(())
    }
}

impl<C: Codec> FrameHandler for ConnectionHandler<C> {
    fn handle(
        &self,
        conn: TransportHandle,
        frame: Frame,
    ) -> impl Future<Output = ()> + Send {
        self.dispatch(conn, frame)
    }
}
