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

//! Messages exchanged over the P4Runtime stream channel.

use proto::p4runtime::{
    DigestListAck,
    MasterArbitrationUpdate,
    PacketMetadata,
    PacketOut,
    StreamMessageRequest,
    StreamMessageResponse,
    StreamMessageResponse_oneof_update,
    Uint128,
};
use proto::status;

use protobuf::RepeatedField;

use serde::{de, Deserialize, Deserializer};

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{P4Error, Result};

/// 128-bit controller election id; the highest id connected wins mastership.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElectionId(pub u128);

/// Configuration files may spell an election id as a number or as a string
/// in any form `FromStr` accepts.
#[derive(Deserialize)]
#[serde(untagged)]
enum ElectionIdRepr {
    Number(u64),
    Text(String),
}

impl ElectionId {
    pub fn new(high: u64, low: u64) -> Self {
        ElectionId(((high as u128) << 64) | low as u128)
    }

    pub fn high(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub fn low(&self) -> u64 {
        self.0 as u64
    }

    pub fn to_wire(&self) -> Uint128 {
        let mut uint128 = Uint128::new();
        uint128.set_high(self.high());
        uint128.set_low(self.low());
        uint128
    }

    pub fn from_wire(uint128: &Uint128) -> Self {
        ElectionId::new(uint128.high, uint128.low)
    }
}

/// Accepts `"high,low"` or a single decimal number.
impl FromStr for ElectionId {
    type Err = P4Error;

    fn from_str(s: &str) -> Result<Self> {
        let err = || P4Error::ElectionId(s.into());
        match s.split_once(',') {
            Some((high, low)) => {
                let high = high.trim().parse::<u64>().map_err(|_| err())?;
                let low = low.trim().parse::<u64>().map_err(|_| err())?;
                Ok(ElectionId::new(high, low))
            }
            None => s.trim().parse::<u128>().map(ElectionId).map_err(|_| err()),
        }
    }
}

impl<'de> Deserialize<'de> for ElectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match ElectionIdRepr::deserialize(deserializer)? {
            ElectionIdRepr::Number(n) => Ok(ElectionId(n as u128)),
            ElectionIdRepr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

impl Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.high(), self.low())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arbitration {
    pub device_id: u64,
    pub election_id: ElectionId,
    pub role: Option<String>,
    pub status: Option<Status>,
}

impl Arbitration {
    pub fn request(device_id: u64, election_id: ElectionId) -> Self {
        Arbitration { device_id, election_id, role: None, status: None }
    }
}

impl From<&MasterArbitrationUpdate> for Arbitration {
    fn from(upd: &MasterArbitrationUpdate) -> Self {
        Arbitration {
            device_id: upd.device_id,
            election_id: ElectionId::from_wire(upd.get_election_id()),
            role: if upd.has_role() {
                Some(upd.get_role().name.clone())
            } else {
                None
            },
            status: if upd.has_status() {
                let s = upd.get_status();
                Some(Status { code: s.code, message: s.message.clone() })
            } else {
                None
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub id: u32,
    pub value: Vec<u8>,
}

/// A packet-out (towards the device) or packet-in (from it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub metadata: Vec<Metadata>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
    pub digest_id: u32,
    pub list_id: u64,
    pub data_count: usize,
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Arbitration,
    Packet,
    DigestAck,
    Digest,
    Error,
    Unset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Arbitration(Arbitration),
    Packet(Packet),
    DigestAck { digest_id: u32, list_id: u64 },
    // Only ever received.
    Digest(Digest),
    Error(Status),
    Unset,
}

impl StreamMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            StreamMessage::Arbitration(_) => MessageKind::Arbitration,
            StreamMessage::Packet(_) => MessageKind::Packet,
            StreamMessage::DigestAck { .. } => MessageKind::DigestAck,
            StreamMessage::Digest(_) => MessageKind::Digest,
            StreamMessage::Error(_) => MessageKind::Error,
            StreamMessage::Unset => MessageKind::Unset,
        }
    }

    /// Builds the wire request for an outbound message.
    pub fn to_request(&self) -> Result<StreamMessageRequest> {
        let mut request = StreamMessageRequest::new();
        match self {
            StreamMessage::Arbitration(arb) => {
                let mut update = MasterArbitrationUpdate::new();
                update.set_device_id(arb.device_id);
                update.set_election_id(arb.election_id.to_wire());
                if let Some(ref name) = arb.role {
                    let mut role = proto::p4runtime::Role::new();
                    role.set_name(name.clone());
                    update.set_role(role);
                }
                if let Some(ref s) = arb.status {
                    let mut wire_status = status::Status::new();
                    wire_status.set_code(s.code);
                    wire_status.set_message(s.message.clone());
                    update.set_status(wire_status);
                }
                request.set_arbitration(update);
            }
            StreamMessage::Packet(packet) => {
                let metadata = packet
                    .metadata
                    .iter()
                    .map(|m| {
                        let mut pm = PacketMetadata::new();
                        pm.set_metadata_id(m.id);
                        pm.set_value(m.value.clone());
                        pm
                    })
                    .collect();
                let mut packet_out = PacketOut::new();
                packet_out.set_payload(packet.payload.clone());
                packet_out.set_metadata(RepeatedField::from_vec(metadata));
                request.set_packet(packet_out);
            }
            StreamMessage::DigestAck { digest_id, list_id } => {
                let mut ack = DigestListAck::new();
                ack.set_digest_id(*digest_id);
                ack.set_list_id(*list_id);
                request.set_digest_ack(ack);
            }
            other => {
                return Err(P4Error::InvalidMessage(format!(
                    "{:?} messages cannot be sent to the device",
                    other.kind()
                )))
            }
        }
        Ok(request)
    }
}

impl From<&StreamMessageResponse> for StreamMessage {
    fn from(response: &StreamMessageResponse) -> Self {
        use StreamMessageResponse_oneof_update::*;
        match response.update {
            Some(arbitration(ref upd)) => StreamMessage::Arbitration(upd.into()),
            Some(packet(ref p)) => StreamMessage::Packet(Packet {
                payload: p.payload.clone(),
                metadata: p
                    .get_metadata()
                    .iter()
                    .map(|m| Metadata { id: m.metadata_id, value: m.value.clone() })
                    .collect(),
            }),
            Some(digest(ref d)) => StreamMessage::Digest(Digest {
                digest_id: d.digest_id,
                list_id: d.list_id,
                data_count: d.get_data().len(),
                timestamp: d.timestamp,
            }),
            Some(error(ref e)) => StreamMessage::Error(Status {
                code: e.canonical_code,
                message: e.message.clone(),
            }),
            Some(idle_timeout_notification(_)) | Some(other(_)) | None => StreamMessage::Unset,
        }
    }
}
