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

//! Mastership arbitration.

use std::fmt::{self, Display};
use std::time::Duration;

use tokio::time::Instant;

use tracing::{event, Level};

use crate::error::{P4Error, Result};
use crate::message::{Arbitration, ElectionId, MessageKind, StreamMessage};
use crate::stream::StreamChannel;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Unknown,
    /// May write to the device.
    Master,
    /// Read-only; some other controller holds a higher election id.
    Slave,
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Unknown => "unknown",
            Role::Master => "master",
            Role::Slave => "slave",
        };
        write!(f, "{}", s)
    }
}

/// The device reports OK to the master and an error status to everyone
/// else.  A missing status counts as OK.
pub fn role_from_arbitration(arbitration: &Arbitration) -> Role {
    match arbitration.status {
        Some(ref status) if !status.is_ok() => Role::Slave,
        _ => Role::Master,
    }
}

/// Sends one arbitration request and waits up to `timeout` for the answer.
/// Other messages that arrive first are skipped.
pub async fn handshake(
    channel: &mut StreamChannel,
    device_id: u64,
    election_id: ElectionId,
    timeout: Duration,
) -> Result<Role> {
    event!(Level::DEBUG, "requesting mastership of device {device_id} with election id {election_id}");
    channel.send(StreamMessage::Arbitration(Arbitration::request(device_id, election_id)))?;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(P4Error::HandshakeTimeout(timeout));
        }
        match channel.get_message(Some(MessageKind::Arbitration), remaining).await {
            Some(StreamMessage::Arbitration(arbitration)) => {
                let role = role_from_arbitration(&arbitration);
                if let Some(ref status) = arbitration.status {
                    if !status.is_ok() {
                        event!(Level::INFO, "device {device_id} denied mastership ({})", status.message);
                    }
                }
                event!(Level::INFO, "arbitration with device {device_id} complete, role {role}");
                return Ok(role);
            }
            Some(other) => {
                event!(Level::DEBUG, "skipping {:?} message during arbitration", other.kind());
            }
            None if channel.is_ended() => return Err(P4Error::StreamClosed),
            None => return Err(P4Error::HandshakeTimeout(timeout)),
        }
    }
}
