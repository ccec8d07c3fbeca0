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

use grpcio::RpcStatusCode;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong in a P4Runtime session.
#[derive(Debug, Error)]
pub enum P4Error {
    #[error("{}: could not read file ({source})", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: could not parse ({message})", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid election id {0:?} (expected \"high,low\" or a decimal number)")]
    ElectionId(String),

    #[error("invalid table entry ({0})")]
    InvalidEntry(String),

    #[error("invalid stream message ({0})")]
    InvalidMessage(String),

    #[error("table {table_id}: default action can only be modified, not inserted")]
    DefaultActionInsert { table_id: u32 },

    #[error("{what} failed ({code:?}: {message})")]
    Rpc {
        what: &'static str,
        code: RpcStatusCode,
        message: String,
    },

    #[error("device {0} has no forwarding pipeline")]
    NoPipeline(u64),

    #[error("no arbitration response within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("stream channel is closed")]
    StreamClosed,

    #[error("session is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, P4Error>;

impl P4Error {
    /// Wraps a transport failure of the RPC named `what`, keeping its status code.
    pub fn rpc(what: &'static str, err: grpcio::Error) -> Self {
        match err {
            grpcio::Error::RpcFailure(status) => P4Error::Rpc {
                what,
                code: status.code(),
                message: status.message().to_string(),
            },
            other => P4Error::Rpc {
                what,
                code: RpcStatusCode::UNKNOWN,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        P4Error::InvalidEntry(message.into())
    }

    /// Status code of a failed RPC, if this error came from one.
    pub fn status_code(&self) -> Option<RpcStatusCode> {
        match self {
            P4Error::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_failure_keeps_status() {
        let status = grpcio::RpcStatus::with_message(
            RpcStatusCode::PERMISSION_DENIED,
            "not master".to_string(),
        );
        let err = P4Error::rpc("Write", grpcio::Error::RpcFailure(status));
        assert_eq!(err.status_code(), Some(RpcStatusCode::PERMISSION_DENIED));
        assert!(err.to_string().contains("not master"));
    }

    #[test]
    fn non_status_failure_is_unknown() {
        let err = P4Error::rpc("Read", grpcio::Error::RemoteStopped);
        assert_eq!(err.status_code(), Some(RpcStatusCode::UNKNOWN));
        assert_eq!(P4Error::StreamClosed.status_code(), None);
    }
}
