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

//! Control-plane client for P4Runtime devices.
//!
//! A [`Session`] connects to one device, arbitrates for mastership over the
//! bidirectional stream channel, installs a forwarding pipeline and manages
//! table entries and counters:
//!
//! ```no_run
//! # async fn example() -> p4client::Result<()> {
//! use p4client::{Action, Match, Param, Session, SessionConfig, TableEntry};
//! use std::path::Path;
//!
//! let mut session = Session::connect(&SessionConfig::default());
//! session.setup().await?;
//! session.push_config(Path::new("vlan.p4info.txt"), Path::new("vlan.json"))?;
//!
//! let pipeline = session.get_pipeline()?.clone();
//! let table_id = pipeline.table_id("vlan_incoming_exact").unwrap_or_default();
//! let action_id = pipeline.action_id("vlan_incoming_forward").unwrap_or_default();
//! let entry = TableEntry::new(table_id, Action::new(action_id, vec![Param::new(1, 11, 9)]))
//!     .with_match(Match::exact(1, 9, 11));
//! session.insert_entries(&[entry])?;
//! session.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod arbitration;
pub mod codec;
pub mod config;
pub mod counter;
pub mod entry;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod stream;
pub mod transport;

pub use arbitration::{role_from_arbitration, Role};
pub use codec::{decode_value, encode_value};
pub use config::SessionConfig;
pub use counter::{CounterData, CounterEntry, CounterFilter, DirectCounterEntry, DirectCounterFilter};
pub use entry::{Action, FieldWidths, Match, MatchKind, Param, TableEntry, TableEntryFilter, WireWidths};
pub use error::{P4Error, Result};
pub use message::{ElectionId, MessageKind, StreamMessage};
pub use pipeline::Pipeline;
pub use session::Session;
pub use stream::StreamChannel;
pub use transport::{DeviceTransport, GrpcTransport};
