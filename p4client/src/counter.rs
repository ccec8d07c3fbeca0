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

//! Counter read results and the filters that select them.

use proto::p4runtime::{self, Entity};

use crate::entry::{FieldWidths, Match};
use crate::error::{P4Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterData {
    pub byte_count: i64,
    pub packet_count: i64,
}

impl From<&p4runtime::CounterData> for CounterData {
    fn from(d: &p4runtime::CounterData) -> Self {
        CounterData {
            byte_count: d.byte_count,
            packet_count: d.packet_count,
        }
    }
}

/// One cell of an indirect counter array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterEntry {
    pub counter_id: u32,
    pub index: Option<i64>,
    pub data: CounterData,
}

impl CounterEntry {
    pub fn from_wire(entity: &Entity) -> Result<Self> {
        if !entity.has_counter_entry() {
            return Err(P4Error::invalid("entity is not a counter entry"));
        }
        let ce = entity.get_counter_entry();
        Ok(CounterEntry {
            counter_id: ce.counter_id,
            index: if ce.has_index() {
                Some(ce.get_index().index)
            } else {
                None
            },
            data: ce.get_data().into(),
        })
    }
}

/// The counter attached to one table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectCounterEntry {
    pub table_id: u32,
    pub matches: Vec<Match>,
    pub priority: Option<i32>,
    pub data: CounterData,
}

impl DirectCounterEntry {
    pub fn from_wire(entity: &Entity, widths: &dyn FieldWidths) -> Result<Self> {
        if !entity.has_direct_counter_entry() {
            return Err(P4Error::invalid("entity is not a direct counter entry"));
        }
        let dce = entity.get_direct_counter_entry();
        let te = dce.get_table_entry();
        let matches = te
            .get_field_match()
            .iter()
            .map(|fm| Match::from_wire(te.table_id, fm, widths))
            .collect::<Result<Vec<_>>>()?;
        Ok(DirectCounterEntry {
            table_id: te.table_id,
            matches,
            priority: if te.priority != 0 { Some(te.priority) } else { None },
            data: dce.get_data().into(),
        })
    }
}

/// Selects indirect counter cells.  Counter id 0 reads every counter; no
/// index reads every cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterFilter {
    pub counter_id: u32,
    pub index: Option<i64>,
}

impl CounterFilter {
    pub fn all(counter_id: u32) -> Self {
        CounterFilter { counter_id, index: None }
    }

    pub fn cell(counter_id: u32, index: i64) -> Self {
        CounterFilter { counter_id, index: Some(index) }
    }

    pub fn to_wire(&self) -> Entity {
        let mut counter_entry = p4runtime::CounterEntry::new();
        counter_entry.set_counter_id(self.counter_id);
        if let Some(index) = self.index {
            let mut wire_index = p4runtime::Index::new();
            wire_index.set_index(index);
            counter_entry.set_index(wire_index);
        }
        let mut entity = Entity::new();
        entity.set_counter_entry(counter_entry);
        entity
    }
}

/// Selects direct counters by owning table; 0 reads every table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectCounterFilter {
    pub table_id: u32,
}

impl DirectCounterFilter {
    pub fn new(table_id: u32) -> Self {
        DirectCounterFilter { table_id }
    }

    pub fn to_wire(&self) -> Entity {
        let mut table_entry = p4runtime::TableEntry::new();
        table_entry.set_table_id(self.table_id);
        let mut direct_counter_entry = p4runtime::DirectCounterEntry::new();
        direct_counter_entry.set_table_entry(table_entry);
        let mut entity = Entity::new();
        entity.set_direct_counter_entry(direct_counter_entry);
        entity
    }
}
