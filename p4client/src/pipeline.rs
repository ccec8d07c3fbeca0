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

//! In-memory index of a P4Info document.
//!
//! The device only speaks in numeric ids.  A [`Pipeline`] maps the names a
//! P4 program uses to those ids and remembers the bit width of every match
//! field and action parameter, which the entry translator needs to produce
//! canonical byte strings.

use itertools::Itertools;

use proto::p4info;

use protobuf::Message;

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use tracing::{event, Level};

use crate::entry::FieldWidths;
use crate::error::{P4Error, Result};

#[derive(Clone, Debug, Default)]
pub struct Preamble {
    pub id: u32,
    pub name: String,
    pub alias: String,
    pub annotations: Vec<String>,
}

impl From<&p4info::Preamble> for Preamble {
    fn from(p: &p4info::Preamble) -> Self {
        Preamble {
            id: p.id,
            name: p.name.clone(),
            alias: p.alias.clone(),
            annotations: p.get_annotations().to_vec(),
        }
    }
}

impl Preamble {
    fn matches(&self, name: &str) -> bool {
        self.name == name || (!self.alias.is_empty() && self.alias == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchType {
    Unspecified,
    Exact,
    Lpm,
    Ternary,
    Range,
    Optional,
    Other(String),
}

impl MatchType {
    /// Whether entries matching on a field of this type need a priority.
    pub fn needs_priority(&self) -> bool {
        matches!(self, MatchType::Ternary | MatchType::Range | MatchType::Optional)
    }
}

impl Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MatchType::*;
        let s = match self {
            Unspecified => "unspecified",
            Exact => "exact",
            Lpm => "LPM",
            Ternary => "ternary",
            Range => "range",
            Optional => "optional",
            Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug)]
pub struct MatchField {
    pub id: u32,
    pub name: String,
    pub bit_width: usize,
    pub match_type: MatchType,
}

impl From<&p4info::MatchField> for MatchField {
    fn from(mf: &p4info::MatchField) -> Self {
        use p4info::MatchField_MatchType::*;
        MatchField {
            id: mf.id,
            name: mf.name.clone(),
            bit_width: mf.bitwidth.max(0) as usize,
            match_type: match mf.get_match_type() {
                EXACT => MatchType::Exact,
                LPM => MatchType::Lpm,
                TERNARY => MatchType::Ternary,
                RANGE => MatchType::Range,
                OPTIONAL => MatchType::Optional,
                UNSPECIFIED => {
                    if mf.has_other_match_type() {
                        MatchType::Other(mf.get_other_match_type().into())
                    } else {
                        MatchType::Unspecified
                    }
                }
            },
        }
    }
}

impl Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}: bit<{}> {}-match", self.name, self.bit_width, self.match_type)
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub id: u32,
    pub name: String,
    pub bit_width: usize,
}

impl From<&p4info::Action_Param> for Param {
    fn from(ap: &p4info::Action_Param) -> Self {
        Param {
            id: ap.id,
            name: ap.name.clone(),
            bit_width: ap.bitwidth.max(0) as usize,
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: bit<{}>", self.name, self.bit_width)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Action {
    pub preamble: Preamble,
    pub params: Vec<Param>,
}

impl From<&p4info::Action> for Action {
    fn from(a: &p4info::Action) -> Self {
        Action {
            preamble: a.get_preamble().into(),
            params: a.get_params().iter().map(|x| x.into()).collect(),
        }
    }
}

impl Action {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action {}({})", self.preamble.name, self.params.iter().join(", "))
    }
}

#[derive(Clone, Debug)]
pub struct ActionRef {
    pub action: Action,
    pub may_be_default: bool, // Allowed as the default action?
    pub may_be_entry: bool,   // Allowed as an entry's action?
}

impl ActionRef {
    fn new_from_proto(ar: &p4info::ActionRef, actions: &HashMap<u32, Action>) -> Option<Self> {
        let action = match actions.get(&ar.id) {
            Some(action) => action.clone(),
            None => {
                event!(Level::WARN, "P4Info references unknown action {}", ar.id);
                return None;
            }
        };
        Some(ActionRef {
            action,
            may_be_default: ar.scope != p4info::ActionRef_Scope::TABLE_ONLY,
            may_be_entry: ar.scope != p4info::ActionRef_Scope::DEFAULT_ONLY,
        })
    }
}

impl Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.may_be_entry {
            write!(f, "default-only ")?;
        } else if !self.may_be_default {
            write!(f, "not-default ")?;
        }
        write!(f, "{}", self.action)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Table {
    pub preamble: Preamble,
    pub match_fields: Vec<MatchField>,
    pub actions: Vec<ActionRef>,
    pub const_default_action: Option<u32>,
    pub max_entries: Option<u64>,
    pub idle_notify: bool,
    pub is_const_table: bool,
    pub direct_resources: Vec<u32>,
}

impl Table {
    fn new_from_proto(t: &p4info::Table, actions: &HashMap<u32, Action>) -> Self {
        Table {
            preamble: t.get_preamble().into(),
            match_fields: t.get_match_fields().iter().map(|x| x.into()).collect(),
            actions: t
                .get_action_refs()
                .iter()
                .filter_map(|x| ActionRef::new_from_proto(x, actions))
                .collect(),
            const_default_action: match t.const_default_action_id {
                0 => None,
                id => Some(id),
            },
            max_entries: if t.size > 0 {
                Some(t.size as u64)
            } else {
                None
            },
            idle_notify: t.idle_timeout_behavior
                == p4info::Table_IdleTimeoutBehavior::NOTIFY_CONTROL,
            is_const_table: t.is_const_table,
            direct_resources: t.get_direct_resource_ids().to_vec(),
        }
    }

    pub fn match_field(&self, name: &str) -> Option<&MatchField> {
        self.match_fields.iter().find(|mf| mf.name == name)
    }

    /// Whether entries in this table must carry a priority.
    pub fn needs_priority(&self) -> bool {
        self.match_fields.iter().any(|mf| mf.match_type.needs_priority())
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}:", self.preamble.name)?;
        for mf in &self.match_fields {
            write!(f, "\t{}", mf)?;
        }
        for ar in &self.actions {
            write!(f, "\t{}", ar)?;
        }
        if let Some(max_entries) = self.max_entries {
            write!(f, "\tsize: {}", max_entries)?;
        }
        if let Some(id) = self.const_default_action {
            match self.actions.iter().find(|ar| ar.action.preamble.id == id) {
                Some(ar) => write!(f, "\tconst default action {}", ar.action.preamble.name)?,
                None => write!(f, "\tconst default action {}", id)?,
            }
        }
        if self.is_const_table {
            write!(f, "\tconst table")?;
        }
        if self.idle_notify {
            write!(f, "\tidle notify")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterUnit {
    Unspecified,
    Bytes,
    Packets,
    Both,
}

impl From<p4info::CounterSpec_Unit> for CounterUnit {
    fn from(unit: p4info::CounterSpec_Unit) -> Self {
        use p4info::CounterSpec_Unit::*;
        match unit {
            UNSPECIFIED => CounterUnit::Unspecified,
            BYTES => CounterUnit::Bytes,
            PACKETS => CounterUnit::Packets,
            BOTH => CounterUnit::Both,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Counter {
    pub preamble: Preamble,
    pub unit: CounterUnit,
    pub size: i64,
}

impl From<&p4info::Counter> for Counter {
    fn from(c: &p4info::Counter) -> Self {
        Counter {
            preamble: c.get_preamble().into(),
            unit: c.get_spec().get_unit().into(),
            size: c.size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirectCounter {
    pub preamble: Preamble,
    pub unit: CounterUnit,
    pub table_id: u32,
}

impl From<&p4info::DirectCounter> for DirectCounter {
    fn from(c: &p4info::DirectCounter) -> Self {
        DirectCounter {
            preamble: c.get_preamble().into(),
            unit: c.get_spec().get_unit().into(),
            table_id: c.direct_table_id,
        }
    }
}

/// Index over the tables, actions and counters of one forwarding pipeline.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    pub tables: Vec<Table>,
    pub actions: Vec<Action>,
    pub counters: Vec<Counter>,
    pub direct_counters: Vec<DirectCounter>,
}

impl From<&p4info::P4Info> for Pipeline {
    fn from(p4i: &p4info::P4Info) -> Self {
        let actions: HashMap<u32, Action> = p4i
            .get_actions()
            .iter()
            .map(|x| (x.get_preamble().id, x.into()))
            .collect();
        let tables: Vec<Table> = p4i
            .get_tables()
            .iter()
            .map(|x| Table::new_from_proto(x, &actions))
            .collect();
        Pipeline {
            tables,
            actions: p4i.get_actions().iter().map(|x| x.into()).collect(),
            counters: p4i.get_counters().iter().map(|x| x.into()).collect(),
            direct_counters: p4i.get_direct_counters().iter().map(|x| x.into()).collect(),
        }
    }
}

impl Pipeline {
    pub fn table(&self, id: u32) -> Option<&Table> {
        self.tables.iter().find(|t| t.preamble.id == id)
    }

    pub fn action(&self, id: u32) -> Option<&Action> {
        self.actions.iter().find(|a| a.preamble.id == id)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.preamble.matches(name))
    }

    pub fn action_by_name(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.preamble.matches(name))
    }

    /// Id of the table called `name` (fully qualified or alias).
    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.table_by_name(name).map(|t| t.preamble.id)
    }

    pub fn action_id(&self, name: &str) -> Option<u32> {
        self.action_by_name(name).map(|a| a.preamble.id)
    }

    pub fn counter_id(&self, name: &str) -> Option<u32> {
        self.counters
            .iter()
            .find(|c| c.preamble.matches(name))
            .map(|c| c.preamble.id)
    }

    /// Ids of every indirect counter, in declaration order.
    pub fn counter_ids(&self) -> Vec<u32> {
        self.counters.iter().map(|c| c.preamble.id).collect()
    }

    /// The direct counter attached to table `table_id`, if any.
    pub fn direct_counter_for(&self, table_id: u32) -> Option<&DirectCounter> {
        self.direct_counters.iter().find(|c| c.table_id == table_id)
    }
}

impl FieldWidths for Pipeline {
    fn match_width(&self, table_id: u32, field_id: u32) -> Option<usize> {
        self.table(table_id)?
            .match_fields
            .iter()
            .find(|mf| mf.id == field_id)
            .map(|mf| mf.bit_width)
    }

    fn param_width(&self, action_id: u32, param_id: u32) -> Option<usize> {
        self.action(action_id)?
            .params
            .iter()
            .find(|p| p.id == param_id)
            .map(|p| p.bit_width)
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            writeln!(f, "{}", table)?;
        }
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        for counter in &self.counters {
            writeln!(f, "counter {}: {:?}, size {}", counter.preamble.name, counter.unit, counter.size)?;
        }
        Ok(())
    }
}

/// Reads a P4Info file.  Files named `*.txt` are parsed as protobuf text
/// format, anything else as binary protobuf.
pub fn load_p4info(path: &Path) -> Result<p4info::P4Info> {
    let data = fs::read(path).map_err(|source| P4Error::Io {
        path: path.into(),
        source,
    })?;

    let parse_error = |message: String| P4Error::Parse {
        path: path.into(),
        message,
    };
    if path.extension().map_or(false, |ext| ext == "txt") {
        let text = String::from_utf8(data).map_err(|e| parse_error(e.to_string()))?;
        protobuf::text_format::parse_from_str(&text).map_err(|e| parse_error(e.to_string()))
    } else {
        p4info::P4Info::parse_from_bytes(&data).map_err(|e| parse_error(e.to_string()))
    }
}
