/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Owner of the bidirectional P4Runtime stream.
//!
//! Two tokio tasks pump the stream: the writer drains the outbound queue
//! into the gRPC sink, the reader decodes responses onto the inbound queue.
//! When the reader exits it drops its end of the inbound queue, so a closed
//! queue is the end-of-stream marker.

use futures::{Sink, SinkExt, Stream, StreamExt};

use grpcio::WriteFlags;

use proto::p4runtime::{StreamMessageRequest, StreamMessageResponse};

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tracing::{event, Level};

use crate::error::{P4Error, Result};
use crate::message::{MessageKind, StreamMessage};

/// Upper bound on half-closing the sink, so that a wedged transport cannot
/// hang teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct StreamChannel {
    outbound: mpsc::UnboundedSender<StreamMessageRequest>,
    inbound: mpsc::UnboundedReceiver<StreamMessage>,
    stop: watch::Sender<bool>,
    pumps: Option<(JoinHandle<()>, JoinHandle<()>)>,
    ended: bool,
}

impl StreamChannel {
    /// Starts pumping the two halves of an open stream.  Must be called
    /// from within a tokio runtime.
    pub fn open<S, R>(sink: S, source: R) -> Self
    where
        S: Sink<(StreamMessageRequest, WriteFlags), Error = grpcio::Error> + Send + Unpin + 'static,
        R: Stream<Item = grpcio::Result<StreamMessageResponse>> + Send + Unpin + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);

        let mut writer = WriterPump {
            sink,
            outbound: outbound_rx,
            stop: stop_rx.clone(),
        };
        let mut reader = ReaderPump {
            source,
            inbound: inbound_tx,
            stop: stop_rx,
        };
        let writer = tokio::spawn(async move { writer.run().await });
        let reader = tokio::spawn(async move { reader.run().await });

        StreamChannel {
            outbound,
            inbound,
            stop,
            pumps: Some((writer, reader)),
            ended: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.pumps.is_some()
    }

    /// True once the reader has stopped and every message it delivered has
    /// been consumed.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Queues `message` for the writer without waiting for it to be sent.
    pub fn send(&self, message: StreamMessage) -> Result<()> {
        if !self.is_open() {
            return Err(P4Error::StreamClosed);
        }
        let request = message.to_request()?;
        self.outbound.send(request).map_err(|_| P4Error::StreamClosed)
    }

    /// Waits up to `timeout` for the next inbound message.
    ///
    /// The first message to arrive is returned whatever its kind; `expected`
    /// only affects logging.  Returns `None` on timeout, or at once when the
    /// stream has ended.
    pub async fn get_message(
        &mut self,
        expected: Option<MessageKind>,
        timeout: Duration,
    ) -> Option<StreamMessage> {
        if self.ended {
            return None;
        }
        let message = match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                event!(Level::DEBUG, "stream channel ended");
                self.ended = true;
                return None;
            }
            Err(_) => return None,
        };
        if let Some(kind) = expected {
            if message.kind() != kind {
                event!(Level::DEBUG, "expected {:?} message, received {:?}", kind, message.kind());
            }
        }
        Some(message)
    }

    /// Stops both pumps and waits for them.  Closing twice is harmless.
    pub async fn close(&mut self) {
        let (writer, reader) = match self.pumps.take() {
            Some(pumps) => pumps,
            None => return,
        };

        // Both pumps also stop if every receiver is gone, so a failed
        // send is not an error.
        let _ = self.stop.send(true);
        for (name, handle) in [("writer", writer), ("reader", reader)] {
            if let Err(e) = handle.await {
                event!(Level::ERROR, "stream {name} task failed ({e})");
            }
        }
        self.inbound.close();
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if self.pumps.is_some() {
            let _ = self.stop.send(true);
        }
    }
}

struct WriterPump<S> {
    sink: S,
    outbound: mpsc::UnboundedReceiver<StreamMessageRequest>,
    stop: watch::Receiver<bool>,
}

impl<S> WriterPump<S>
where
    S: Sink<(StreamMessageRequest, WriteFlags), Error = grpcio::Error> + Unpin,
{
    async fn run(&mut self) {
        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                request = self.outbound.recv() => match request {
                    // A device that stops reading must not keep the send
                    // pending past a stop request.
                    Some(request) => tokio::select! {
                        _ = self.stop.changed() => break,
                        sent = self.sink.send((request, WriteFlags::default())) => {
                            if let Err(e) = sent {
                                event!(Level::ERROR, "could not write to stream channel ({e})");
                            }
                        }
                    },
                    None => break,
                },
            }
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => event!(Level::WARN, "could not half-close stream channel ({e})"),
            Err(_) => event!(Level::WARN, "timed out half-closing stream channel"),
        }
    }
}

struct ReaderPump<R> {
    source: R,
    inbound: mpsc::UnboundedSender<StreamMessage>,
    stop: watch::Receiver<bool>,
}

impl<R> ReaderPump<R>
where
    R: Stream<Item = grpcio::Result<StreamMessageResponse>> + Unpin,
{
    async fn run(&mut self) {
        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                response = self.source.next() => match response {
                    Some(Ok(response)) => {
                        let message = StreamMessage::from(&response);
                        event!(Level::TRACE, "received {:?} message", message.kind());
                        if self.inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        event!(Level::ERROR, "stream channel read failed ({e})");
                        break;
                    }
                    None => {
                        event!(Level::INFO, "device closed the stream channel");
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Arbitration, ElectionId};
    use futures::channel::mpsc as fmpsc;
    use futures::sink::SinkMapErr;
    use proto::p4runtime::{MasterArbitrationUpdate, PacketIn};
    use tracing_test::traced_test;

    type TestSink = SinkMapErr<
        fmpsc::UnboundedSender<(StreamMessageRequest, WriteFlags)>,
        fn(fmpsc::SendError) -> grpcio::Error,
    >;

    fn to_grpc_error(_: fmpsc::SendError) -> grpcio::Error {
        grpcio::Error::RemoteStopped
    }

    struct Device {
        requests: fmpsc::UnboundedReceiver<(StreamMessageRequest, WriteFlags)>,
        responses: fmpsc::UnboundedSender<grpcio::Result<StreamMessageResponse>>,
    }

    fn open() -> (StreamChannel, Device) {
        let (req_tx, requests) = fmpsc::unbounded();
        let (responses, resp_rx) = fmpsc::unbounded();
        let sink: TestSink = req_tx.sink_map_err(to_grpc_error as fn(_) -> _);
        (StreamChannel::open(sink, resp_rx), Device { requests, responses })
    }

    fn packet_in(payload: u8) -> StreamMessageResponse {
        let mut packet = PacketIn::new();
        packet.set_payload(vec![payload]);
        let mut response = StreamMessageResponse::new();
        response.set_packet(packet);
        response
    }

    #[tokio::test]
    async fn outbound_is_fifo() {
        let (mut channel, mut device) = open();
        for i in 0..5u32 {
            channel
                .send(StreamMessage::DigestAck { digest_id: i, list_id: 0 })
                .unwrap();
        }
        for i in 0..5u32 {
            let (request, _) = device.requests.next().await.unwrap();
            assert_eq!(request.get_digest_ack().digest_id, i);
        }
        channel.close().await;
    }

    #[tokio::test]
    async fn concurrent_senders_keep_their_own_order() {
        let (mut channel, mut device) = open();
        let shared = &channel;
        let senders = (0..4u32).map(move |sender| async move {
            for seq in 0..25u64 {
                shared
                    .send(StreamMessage::DigestAck { digest_id: sender, list_id: seq })
                    .unwrap();
                tokio::task::yield_now().await;
            }
        });
        futures::future::join_all(senders).await;

        let mut next = [0u64; 4];
        for _ in 0..100 {
            let (request, _) = device.requests.next().await.unwrap();
            let ack = request.get_digest_ack();
            assert_eq!(ack.list_id, next[ack.digest_id as usize]);
            next[ack.digest_id as usize] += 1;
        }
        assert_eq!(next, [25; 4]);
        channel.close().await;
    }

    #[tokio::test]
    async fn close_does_not_wait_on_a_stalled_device() {
        // A zero-capacity channel nobody drains: the second send never
        // completes.
        let (req_tx, _requests) = fmpsc::channel::<(StreamMessageRequest, WriteFlags)>(0);
        let (_responses, resp_rx) = fmpsc::unbounded::<grpcio::Result<StreamMessageResponse>>();
        let sink = req_tx.sink_map_err(to_grpc_error as fn(_) -> _);
        let mut channel = StreamChannel::open(sink, resp_rx);
        for i in 0..3u32 {
            channel
                .send(StreamMessage::DigestAck { digest_id: i, list_id: 0 })
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closed = tokio::time::timeout(Duration::from_secs(5), channel.close()).await;
        assert!(closed.is_ok());
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn inbound_in_transport_order() {
        let (mut channel, device) = open();
        for i in 0..3 {
            device.responses.unbounded_send(Ok(packet_in(i))).unwrap();
        }
        for i in 0..3 {
            match channel.get_message(Some(MessageKind::Packet), Duration::from_secs(1)).await {
                Some(StreamMessage::Packet(p)) => assert_eq!(p.payload, vec![i]),
                other => panic!("unexpected {:?}", other),
            }
        }
        channel.close().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn get_message_returns_first_message_of_any_kind() {
        let (mut channel, device) = open();
        device.responses.unbounded_send(Ok(packet_in(1))).unwrap();
        let message = channel
            .get_message(Some(MessageKind::Arbitration), Duration::from_secs(1))
            .await;
        assert_eq!(message.map(|m| m.kind()), Some(MessageKind::Packet));
        assert!(logs_contain("expected Arbitration message, received Packet"));
        channel.close().await;
    }

    #[tokio::test]
    async fn get_message_times_out() {
        let (mut channel, _device) = open();
        let started = tokio::time::Instant::now();
        assert!(channel.get_message(None, Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!channel.is_ended());
        channel.close().await;
    }

    #[tokio::test]
    async fn end_of_stream_is_observed() {
        let (mut channel, device) = open();
        let mut update = MasterArbitrationUpdate::new();
        update.set_device_id(1);
        let mut response = StreamMessageResponse::new();
        response.set_arbitration(update);
        device.responses.unbounded_send(Ok(response)).unwrap();
        drop(device);

        // Messages delivered before the end are still available.
        let first = channel.get_message(None, Duration::from_secs(1)).await;
        assert_eq!(first.map(|m| m.kind()), Some(MessageKind::Arbitration));
        assert!(channel.get_message(None, Duration::from_secs(5)).await.is_none());
        assert!(channel.is_ended());
        channel.close().await;
    }

    #[tokio::test]
    async fn read_error_ends_stream() {
        let (mut channel, device) = open();
        device
            .responses
            .unbounded_send(Err(grpcio::Error::RemoteStopped))
            .unwrap();
        assert!(channel.get_message(None, Duration::from_secs(5)).await.is_none());
        assert!(channel.is_ended());
        channel.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_sends() {
        let (mut channel, mut device) = open();
        channel.close().await;
        channel.close().await;
        assert!(!channel.is_open());
        let arb = StreamMessage::Arbitration(Arbitration::request(1, ElectionId(1)));
        assert!(matches!(channel.send(arb), Err(P4Error::StreamClosed)));
        // The writer half-closed the sink on its way out.
        assert!(device.requests.next().await.is_none());
    }

    #[tokio::test]
    async fn inbound_only_messages_are_rejected() {
        let (mut channel, _device) = open();
        assert!(matches!(
            channel.send(StreamMessage::Unset),
            Err(P4Error::InvalidMessage(_))
        ));
        channel.close().await;
    }
}
