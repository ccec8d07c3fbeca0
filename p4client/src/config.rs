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

use serde::Deserialize;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{P4Error, Result};
use crate::message::ElectionId;

/// Connection parameters for a [`Session`](crate::Session), usually read
/// from a JSON file.  Every field has a default.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// gRPC address of the device, `host:port`.
    pub target: String,
    pub device_id: u64,
    /// A JSON number, or a string holding `"high,low"` or a decimal number.
    pub election_id: ElectionId,
    pub handshake_timeout_ms: u64,
    /// Deadline applied to each unary RPC; none by default.
    pub rpc_timeout_ms: Option<u64>,
    /// Pipeline pushed by `Session::push_configured_pipeline`.
    pub p4info: Option<PathBuf>,
    pub device_config: Option<PathBuf>,
    pub cookie: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            target: "localhost:50001".into(),
            device_id: 1,
            election_id: ElectionId::new(0, 1),
            handshake_timeout_ms: 2000,
            rpc_timeout_ms: None,
            p4info: None,
            device_config: None,
            cookie: None,
        }
    }
}

impl SessionConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| P4Error::Io {
            path: path.into(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| P4Error::Parse {
            path: path.into(),
            message: e.to_string(),
        })
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.target, "localhost:50001");
        assert_eq!(config.election_id, ElectionId(1));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(2));
        assert_eq!(config.rpc_timeout(), None);
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(
            &path,
            r#"{
                "target": "10.0.0.2:9559",
                "device_id": 0,
                "election_id": "1,5",
                "rpc_timeout_ms": 500,
                "p4info": "vlan.p4info.txt",
                "device_config": "vlan.json"
            }"#,
        )
        .unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.target, "10.0.0.2:9559");
        assert_eq!(config.device_id, 0);
        assert_eq!(config.election_id, ElectionId::new(1, 5));
        assert_eq!(config.rpc_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.p4info, Some(PathBuf::from("vlan.p4info.txt")));
        assert_eq!(config.cookie, None);
    }

    #[test]
    fn election_id_as_number_or_string() {
        let config: SessionConfig = serde_json::from_str(r#"{"election_id": 7}"#).unwrap();
        assert_eq!(config.election_id, ElectionId(7));
        let config: SessionConfig = serde_json::from_str(r#"{"election_id": "7"}"#).unwrap();
        assert_eq!(config.election_id, ElectionId(7));
        let config: SessionConfig = serde_json::from_str(r#"{"election_id": "1,0"}"#).unwrap();
        assert_eq!(config.election_id, ElectionId::new(1, 0));
        assert!(serde_json::from_str::<SessionConfig>(r#"{"election_id": -1}"#).is_err());
        assert!(serde_json::from_str::<SessionConfig>(r#"{"election_id": true}"#).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"election_id": "one,two"}"#).unwrap();
        assert!(matches!(SessionConfig::from_file(&path), Err(P4Error::Parse { .. })));

        fs::write(&path, r#"{"grpc_addr": "localhost:1"}"#).unwrap();
        assert!(matches!(SessionConfig::from_file(&path), Err(P4Error::Parse { .. })));

        let missing = dir.path().join("missing.json");
        assert!(matches!(SessionConfig::from_file(&missing), Err(P4Error::Io { .. })));
    }
}
