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

//! The RPC surface a session needs from a device.
//!
//! [`GrpcTransport`] talks to a real device through the generated grpcio
//! client.  Anything else that implements [`DeviceTransport`], such as an
//! in-process fake device, can stand in for it.

use futures::{executor, Sink, Stream, TryStreamExt};

use grpcio::{CallOption, ChannelBuilder, ClientDuplexReceiver, ClientDuplexSender, EnvBuilder, WriteFlags};

use proto::p4runtime::{
    CapabilitiesRequest,
    CapabilitiesResponse,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    ReadRequest,
    ReadResponse,
    SetForwardingPipelineConfigRequest,
    StreamMessageRequest,
    StreamMessageResponse,
    WriteRequest,
};
use proto::p4runtime_grpc::P4RuntimeClient;

use std::sync::Arc;
use std::time::Duration;

use tracing::{event, Level};

use crate::error::{P4Error, Result};

pub trait DeviceTransport: Send + Sync {
    /// Outbound half of the bidirectional stream.
    type StreamSink: Sink<(StreamMessageRequest, WriteFlags), Error = grpcio::Error>
        + Send
        + Unpin
        + 'static;
    /// Inbound half of the bidirectional stream.
    type StreamSource: Stream<Item = grpcio::Result<StreamMessageResponse>> + Send + Unpin + 'static;

    fn write(&self, request: &WriteRequest) -> Result<()>;

    /// Issues a read and collects every streamed response.
    fn read(&self, request: &ReadRequest) -> Result<Vec<ReadResponse>>;

    fn set_pipeline_config(&self, request: &SetForwardingPipelineConfigRequest) -> Result<()>;

    fn get_pipeline_config(
        &self,
        request: &GetForwardingPipelineConfigRequest,
    ) -> Result<GetForwardingPipelineConfigResponse>;

    fn capabilities(&self) -> Result<CapabilitiesResponse>;

    fn stream_channel(&self) -> Result<(Self::StreamSink, Self::StreamSource)>;
}

/// Insecure gRPC connection to a P4Runtime server.
pub struct GrpcTransport {
    client: P4RuntimeClient,
    rpc_timeout: Option<Duration>,
}

impl GrpcTransport {
    pub fn new(client: P4RuntimeClient, rpc_timeout: Option<Duration>) -> Self {
        GrpcTransport { client, rpc_timeout }
    }

    /// Opens a channel to `target` (e.g. `localhost:50001`).  The channel
    /// connects lazily, so an unreachable target surfaces on the first RPC.
    pub fn connect(target: &str, rpc_timeout: Option<Duration>) -> Self {
        event!(Level::DEBUG, "connecting to P4Runtime server at {target}");
        let env = Arc::new(EnvBuilder::new().build());
        let ch = ChannelBuilder::new(env).connect(target);
        GrpcTransport::new(P4RuntimeClient::new(ch), rpc_timeout)
    }

    fn call_opt(&self) -> CallOption {
        match self.rpc_timeout {
            Some(timeout) => CallOption::default().timeout(timeout),
            None => CallOption::default(),
        }
    }
}

impl DeviceTransport for GrpcTransport {
    type StreamSink = ClientDuplexSender<StreamMessageRequest>;
    type StreamSource = ClientDuplexReceiver<StreamMessageResponse>;

    fn write(&self, request: &WriteRequest) -> Result<()> {
        self.client
            .write_opt(request, self.call_opt())
            .map(|_| ())
            .map_err(|e| P4Error::rpc("Write", e))
    }

    fn read(&self, request: &ReadRequest) -> Result<Vec<ReadResponse>> {
        let receiver = self
            .client
            .read_opt(request, self.call_opt())
            .map_err(|e| P4Error::rpc("Read", e))?;
        executor::block_on(receiver.try_collect::<Vec<_>>()).map_err(|e| P4Error::rpc("Read", e))
    }

    fn set_pipeline_config(&self, request: &SetForwardingPipelineConfigRequest) -> Result<()> {
        self.client
            .set_forwarding_pipeline_config_opt(request, self.call_opt())
            .map(|_| ())
            .map_err(|e| P4Error::rpc("SetForwardingPipelineConfig", e))
    }

    fn get_pipeline_config(
        &self,
        request: &GetForwardingPipelineConfigRequest,
    ) -> Result<GetForwardingPipelineConfigResponse> {
        self.client
            .get_forwarding_pipeline_config_opt(request, self.call_opt())
            .map_err(|e| P4Error::rpc("GetForwardingPipelineConfig", e))
    }

    fn capabilities(&self) -> Result<CapabilitiesResponse> {
        self.client
            .capabilities_opt(&CapabilitiesRequest::new(), self.call_opt())
            .map_err(|e| P4Error::rpc("Capabilities", e))
    }

    fn stream_channel(&self) -> Result<(Self::StreamSink, Self::StreamSource)> {
        // The stream outlives any single call, so no deadline applies here.
        self.client
            .stream_channel_opt(CallOption::default())
            .map_err(|e| P4Error::rpc("StreamChannel", e))
    }
}
