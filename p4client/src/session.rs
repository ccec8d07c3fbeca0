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

//! A controller's session with one P4Runtime device.

use proto::p4info::P4Info;
use proto::p4runtime::{
    Entity,
    ForwardingPipelineConfig,
    ForwardingPipelineConfig_Cookie,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigRequest_ResponseType,
    ReadRequest,
    SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigRequest_Action,
    Update_Type,
    WriteRequest,
};

use protobuf::RepeatedField;

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{event, Level};

use crate::arbitration::{handshake, Role, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::config::SessionConfig;
use crate::counter::{CounterEntry, CounterFilter, DirectCounterEntry, DirectCounterFilter};
use crate::entry::{FieldWidths, TableEntry, TableEntryFilter, WireWidths};
use crate::error::{P4Error, Result};
use crate::message::{ElectionId, Metadata, Packet, StreamMessage};
use crate::pipeline::{load_p4info, Pipeline};
use crate::stream::StreamChannel;
use crate::transport::{DeviceTransport, GrpcTransport};

/// Unary operations run synchronously on the caller's thread; stream
/// operations need a tokio runtime and a prior [`setup`](Session::setup).
pub struct Session<T: DeviceTransport = GrpcTransport> {
    transport: Option<T>,
    device_id: u64,
    election_id: ElectionId,
    role: Role,
    channel: Option<StreamChannel>,
    handshake_timeout: Duration,
    cookie: Option<u64>,
    pipeline: Option<Pipeline>,
}

impl Session<GrpcTransport> {
    /// Opens an insecure gRPC channel as described by `config`.
    pub fn connect(config: &SessionConfig) -> Self {
        let transport = GrpcTransport::connect(&config.target, config.rpc_timeout());
        let mut session = Session::new(transport, config.device_id, config.election_id);
        session.handshake_timeout = config.handshake_timeout();
        session.cookie = config.cookie;
        session
    }
}

impl<T: DeviceTransport> Session<T> {
    pub fn new(transport: T, device_id: u64, election_id: ElectionId) -> Self {
        Session {
            transport: Some(transport),
            device_id,
            election_id,
            role: Role::Unknown,
            channel: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            cookie: None,
            pipeline: None,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Cookie attached to pipelines pushed from now on.
    pub fn set_cookie(&mut self, cookie: Option<u64>) {
        self.cookie = cookie;
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&self) -> Result<&T> {
        self.transport.as_ref().ok_or(P4Error::NotConnected)
    }

    fn channel(&self) -> Result<&StreamChannel> {
        self.channel.as_ref().ok_or(P4Error::NotConnected)
    }

    fn widths(&self) -> &dyn FieldWidths {
        match self.pipeline {
            Some(ref pipeline) => pipeline,
            None => &WireWidths,
        }
    }

    /// Opens the stream channel and arbitrates for mastership.  On failure
    /// the channel is closed again and the session stays usable for a retry.
    pub async fn setup(&mut self) -> Result<Role> {
        if self.channel.is_some() {
            return Ok(self.role);
        }
        let (sink, source) = self.transport()?.stream_channel()?;
        let mut channel = StreamChannel::open(sink, source);
        match handshake(&mut channel, self.device_id, self.election_id, self.handshake_timeout).await {
            Ok(role) => {
                self.role = role;
                self.channel = Some(channel);
                Ok(role)
            }
            Err(e) => {
                event!(Level::ERROR, "arbitration with device {} failed ({e})", self.device_id);
                channel.close().await;
                Err(e)
            }
        }
    }

    /// Closes the stream channel and releases the transport.  Calling it
    /// again does nothing.
    pub async fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        if self.transport.take().is_some() {
            event!(Level::DEBUG, "session with device {} torn down", self.device_id);
        }
        self.role = Role::Unknown;
    }

    /// Installs the pipeline described by a P4Info file (`*.txt` for text
    /// format, binary otherwise) and a target-specific device config blob.
    pub fn push_config(&mut self, p4info_path: &Path, device_config_path: &Path) -> Result<()> {
        let transport = self.transport()?;
        let p4info = load_p4info(p4info_path)?;
        let device_config = fs::read(device_config_path).map_err(|source| P4Error::Io {
            path: device_config_path.into(),
            source,
        })?;

        let pipeline = Pipeline::from(&p4info);
        let mut config = ForwardingPipelineConfig::new();
        config.set_p4info(p4info);
        config.set_p4_device_config(device_config);
        if let Some(cookie) = self.cookie {
            let mut cookie_jar = ForwardingPipelineConfig_Cookie::new();
            cookie_jar.set_cookie(cookie);
            config.set_cookie(cookie_jar);
        }

        let mut request = SetForwardingPipelineConfigRequest::new();
        request.set_device_id(self.device_id);
        request.set_election_id(self.election_id.to_wire());
        request.set_action(SetForwardingPipelineConfigRequest_Action::VERIFY_AND_COMMIT);
        request.set_config(config);
        transport.set_pipeline_config(&request)?;

        event!(Level::INFO, "pushed pipeline {} to device {}", p4info_path.display(), self.device_id);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Pushes the pipeline files named in `config`.
    pub fn push_configured_pipeline(&mut self, config: &SessionConfig) -> Result<()> {
        match (&config.p4info, &config.device_config) {
            (Some(p4info), Some(device_config)) => self.push_config(p4info, device_config),
            _ => Err(P4Error::Parse {
                path: config.p4info.clone().unwrap_or_default(),
                message: "session config names no p4info and device_config".into(),
            }),
        }
    }

    /// Fetches the P4Info of the pipeline currently installed on the device.
    pub fn get_info(&self) -> Result<P4Info> {
        let mut request = GetForwardingPipelineConfigRequest::new();
        request.set_device_id(self.device_id);
        request.set_response_type(GetForwardingPipelineConfigRequest_ResponseType::P4INFO_AND_COOKIE);

        let response = self.transport()?.get_pipeline_config(&request)?;
        let config = response.get_config();
        if !config.has_p4info() {
            return Err(P4Error::NoPipeline(self.device_id));
        }
        Ok(config.get_p4info().clone())
    }

    /// The installed pipeline, fetched on first use and then cached.  Reads
    /// use it to recover declared bit widths.
    pub fn get_pipeline(&mut self) -> Result<&Pipeline> {
        if self.pipeline.is_none() {
            let p4info = self.get_info()?;
            self.pipeline = Some(Pipeline::from(&p4info));
        }
        self.pipeline.as_ref().ok_or(P4Error::NoPipeline(self.device_id))
    }

    fn write(&self, update_type: Update_Type, entries: &[TableEntry]) -> Result<()> {
        let transport = self.transport()?;
        if entries.is_empty() {
            return Ok(());
        }
        let updates = entries
            .iter()
            .map(|e| e.to_update(update_type))
            .collect::<Result<Vec<_>>>()?;

        let mut request = WriteRequest::new();
        request.set_device_id(self.device_id);
        request.set_election_id(self.election_id.to_wire());
        request.set_updates(RepeatedField::from_vec(updates));
        transport.write(&request)?;

        event!(Level::DEBUG, "{:?} of {} entries on device {}", update_type, entries.len(), self.device_id);
        Ok(())
    }

    /// Inserts entries in a single write.  A default action can only be
    /// modified, so such entries are rejected before anything is sent.
    pub fn insert_entries(&self, entries: &[TableEntry]) -> Result<()> {
        if let Some(entry) = entries.iter().find(|e| e.action.is_default) {
            return Err(P4Error::DefaultActionInsert { table_id: entry.table_id });
        }
        self.write(Update_Type::INSERT, entries)
    }

    pub fn modify_entries(&self, entries: &[TableEntry]) -> Result<()> {
        self.write(Update_Type::MODIFY, entries)
    }

    pub fn delete_entries(&self, entries: &[TableEntry]) -> Result<()> {
        self.write(Update_Type::DELETE, entries)
    }

    fn read(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        let mut request = ReadRequest::new();
        request.set_device_id(self.device_id);
        request.set_entities(RepeatedField::from_vec(entities));

        let responses = self.transport()?.read(&request)?;
        Ok(responses
            .into_iter()
            .flat_map(|mut r| r.take_entities().into_vec())
            .collect())
    }

    /// Reads table entries.  The device is asked for the filter's table;
    /// the action id is checked locally.
    pub fn read_entries(&self, filter: &TableEntryFilter) -> Result<Vec<TableEntry>> {
        let widths = self.widths();
        let mut entries = Vec::new();
        for entity in self.read(vec![filter.to_wire()])? {
            let entry = TableEntry::from_wire(&entity, widths)?;
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn read_direct_counters(&self, filter: &DirectCounterFilter) -> Result<Vec<DirectCounterEntry>> {
        let widths = self.widths();
        self.read(vec![filter.to_wire()])?
            .iter()
            .map(|entity| DirectCounterEntry::from_wire(entity, widths))
            .collect()
    }

    pub fn read_indirect_counters(&self, filter: &CounterFilter) -> Result<Vec<CounterEntry>> {
        self.read(vec![filter.to_wire()])?
            .iter()
            .map(CounterEntry::from_wire)
            .collect()
    }

    /// Reads every cell of every counter `pipeline` declares, in one read.
    pub fn read_all_indirect_counters(&self, pipeline: &Pipeline) -> Result<Vec<CounterEntry>> {
        let filters: Vec<Entity> = pipeline
            .counter_ids()
            .into_iter()
            .map(|id| CounterFilter::all(id).to_wire())
            .collect();
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        self.read(filters)?.iter().map(CounterEntry::from_wire).collect()
    }

    /// The P4Runtime API version the device implements.
    pub fn api_version(&self) -> Result<String> {
        Ok(self.transport()?.capabilities()?.p4runtime_api_version)
    }

    pub fn send_packet(&self, payload: Vec<u8>, metadata: Vec<Metadata>) -> Result<()> {
        self.channel()?
            .send(StreamMessage::Packet(Packet { payload, metadata }))
    }

    pub fn ack_digest(&self, digest_id: u32, list_id: u64) -> Result<()> {
        self.channel()?
            .send(StreamMessage::DigestAck { digest_id, list_id })
    }

    /// Next unsolicited message from the device (packet-in, digest,
    /// arbitration update, stream error), or `None` after `timeout`.
    pub async fn next_message(&mut self, timeout: Duration) -> Result<Option<StreamMessage>> {
        let channel = self.channel.as_mut().ok_or(P4Error::NotConnected)?;
        if channel.is_ended() {
            return Err(P4Error::StreamClosed);
        }
        Ok(channel.get_message(None, timeout).await)
    }
}
