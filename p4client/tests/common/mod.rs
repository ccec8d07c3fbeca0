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

//! An in-process P4Runtime device for driving `Session` in tests.

#![allow(dead_code)]

use futures::channel::mpsc;
use futures::sink::SinkMapErr;
use futures::{SinkExt, StreamExt};

use grpcio::{RpcStatus, RpcStatusCode, WriteFlags};

use p4client::{DeviceTransport, P4Error};

use proto::p4info::P4Info;
use proto::p4runtime::{
    CapabilitiesResponse,
    Entity,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    MasterArbitrationUpdate,
    PacketIn,
    ReadRequest,
    ReadResponse,
    SetForwardingPipelineConfigRequest,
    StreamMessageRequest,
    StreamMessageResponse,
    Update_Type,
    WriteRequest,
};
use proto::status::Status;

use protobuf::RepeatedField;

use std::sync::{Arc, Mutex, MutexGuard};

type RequestSink = SinkMapErr<
    mpsc::UnboundedSender<(StreamMessageRequest, WriteFlags)>,
    fn(mpsc::SendError) -> grpcio::Error,
>;
type ResponseSource = mpsc::UnboundedReceiver<grpcio::Result<StreamMessageResponse>>;

fn remote_stopped(_: mpsc::SendError) -> grpcio::Error {
    grpcio::Error::RemoteStopped
}

/// How the device answers an arbitration request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arbitrate {
    Master,
    Slave,
    /// Never answers.
    Silent,
    /// Sends a packet-in before the (master) answer.
    PacketFirst,
}

impl Default for Arbitrate {
    fn default() -> Self {
        Arbitrate::Master
    }
}

#[derive(Default)]
pub struct DeviceState {
    pub arbitrate: Arbitrate,
    pub fail_writes: Option<RpcStatusCode>,
    pub writes: Vec<WriteRequest>,
    pub reads: Vec<ReadRequest>,
    pub pipelines: Vec<SetForwardingPipelineConfigRequest>,
    pub stream_requests: Vec<StreamMessageRequest>,
    pub table_entries: Vec<Entity>,
    pub counters: Vec<Entity>,
    pub direct_counters: Vec<Entity>,
    pub p4info: Option<P4Info>,
    responder: Option<mpsc::UnboundedSender<grpcio::Result<StreamMessageResponse>>>,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(arbitrate: Arbitrate) -> Self {
        let device = FakeDevice::default();
        device.state().arbitrate = arbitrate;
        device
    }

    pub fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    /// Pushes an unsolicited message down the open stream.
    pub fn push(&self, response: StreamMessageResponse) {
        let state = self.state();
        let responder = state.responder.as_ref().expect("stream not open");
        responder.unbounded_send(Ok(response)).unwrap();
    }

    /// Ends the stream from the device side.
    pub fn hang_up(&self) {
        self.state().responder = None;
    }
}

pub fn arbitration_response(device_id: u64, code: i32) -> StreamMessageResponse {
    let mut status = Status::new();
    status.set_code(code);
    if code != 0 {
        status.set_message("a controller with a higher election id is master".into());
    }
    let mut update = MasterArbitrationUpdate::new();
    update.set_device_id(device_id);
    update.set_status(status);
    let mut response = StreamMessageResponse::new();
    response.set_arbitration(update);
    response
}

pub fn packet_in(payload: &[u8]) -> StreamMessageResponse {
    let mut packet = PacketIn::new();
    packet.set_payload(payload.to_vec());
    let mut response = StreamMessageResponse::new();
    response.set_packet(packet);
    response
}

fn same_key(a: &Entity, b: &Entity) -> bool {
    let (a, b) = (a.get_table_entry(), b.get_table_entry());
    a.table_id == b.table_id
        && a.get_field_match() == b.get_field_match()
        && a.is_default_action == b.is_default_action
}

fn failure(what: &'static str, code: RpcStatusCode) -> P4Error {
    P4Error::rpc(what, grpcio::Error::RpcFailure(RpcStatus::new(code)))
}

impl DeviceTransport for FakeDevice {
    type StreamSink = RequestSink;
    type StreamSource = ResponseSource;

    fn write(&self, request: &WriteRequest) -> p4client::Result<()> {
        let mut state = self.state();
        state.writes.push(request.clone());
        if let Some(code) = state.fail_writes {
            return Err(failure("Write", code));
        }
        for update in request.get_updates() {
            let entity = update.get_entity().clone();
            state.table_entries.retain(|e| !same_key(e, &entity));
            match update.get_field_type() {
                Update_Type::INSERT | Update_Type::MODIFY => state.table_entries.push(entity),
                _ => {}
            }
        }
        Ok(())
    }

    fn read(&self, request: &ReadRequest) -> p4client::Result<Vec<ReadResponse>> {
        let mut state = self.state();
        state.reads.push(request.clone());

        // One response per requested entity, like a device streaming results.
        let mut responses = Vec::new();
        for filter in request.get_entities() {
            let entities: Vec<Entity> = if filter.has_table_entry() {
                let table_id = filter.get_table_entry().table_id;
                state
                    .table_entries
                    .iter()
                    .filter(|e| table_id == 0 || e.get_table_entry().table_id == table_id)
                    .cloned()
                    .collect()
            } else if filter.has_counter_entry() {
                let ce = filter.get_counter_entry();
                state
                    .counters
                    .iter()
                    .filter(|e| {
                        let c = e.get_counter_entry();
                        (ce.counter_id == 0 || c.counter_id == ce.counter_id)
                            && (!ce.has_index() || c.get_index().index == ce.get_index().index)
                    })
                    .cloned()
                    .collect()
            } else if filter.has_direct_counter_entry() {
                let table_id = filter.get_direct_counter_entry().get_table_entry().table_id;
                state
                    .direct_counters
                    .iter()
                    .filter(|e| {
                        table_id == 0
                            || e.get_direct_counter_entry().get_table_entry().table_id == table_id
                    })
                    .cloned()
                    .collect()
            } else {
                return Err(failure("Read", RpcStatusCode::UNIMPLEMENTED));
            };
            let mut response = ReadResponse::new();
            response.set_entities(RepeatedField::from_vec(entities));
            responses.push(response);
        }
        Ok(responses)
    }

    fn set_pipeline_config(&self, request: &SetForwardingPipelineConfigRequest) -> p4client::Result<()> {
        let mut state = self.state();
        state.pipelines.push(request.clone());
        state.p4info = Some(request.get_config().get_p4info().clone());
        Ok(())
    }

    fn get_pipeline_config(
        &self,
        _request: &GetForwardingPipelineConfigRequest,
    ) -> p4client::Result<GetForwardingPipelineConfigResponse> {
        let mut response = GetForwardingPipelineConfigResponse::new();
        if let Some(ref p4info) = self.state().p4info {
            response.mut_config().set_p4info(p4info.clone());
        }
        Ok(response)
    }

    fn capabilities(&self) -> p4client::Result<CapabilitiesResponse> {
        let mut response = CapabilitiesResponse::new();
        response.set_p4runtime_api_version("1.3.0".into());
        Ok(response)
    }

    fn stream_channel(&self) -> p4client::Result<(RequestSink, ResponseSource)> {
        let (request_tx, mut request_rx) = mpsc::unbounded::<(StreamMessageRequest, WriteFlags)>();
        let (response_tx, response_rx) = mpsc::unbounded();
        self.state().responder = Some(response_tx);

        // Replies go through the shared responder so that `hang_up` can end
        // the stream.
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some((request, _)) = request_rx.next().await {
                let (arbitrate, responder) = {
                    let mut state = state.lock().unwrap();
                    state.stream_requests.push(request.clone());
                    (state.arbitrate, state.responder.clone())
                };
                if !request.has_arbitration() {
                    continue;
                }
                let responder = match responder {
                    Some(responder) => responder,
                    None => return,
                };
                let device_id = request.get_arbitration().device_id;
                let replies = match arbitrate {
                    Arbitrate::Master => vec![arbitration_response(device_id, 0)],
                    Arbitrate::Slave => vec![arbitration_response(device_id, 6)],
                    Arbitrate::Silent => vec![],
                    Arbitrate::PacketFirst => {
                        vec![packet_in(b"early"), arbitration_response(device_id, 0)]
                    }
                };
                for reply in replies {
                    if responder.unbounded_send(Ok(reply)).is_err() {
                        return;
                    }
                }
            }
        });

        let sink: RequestSink = request_tx.sink_map_err(remote_stopped as fn(_) -> _);
        Ok((sink, response_rx))
    }
}
