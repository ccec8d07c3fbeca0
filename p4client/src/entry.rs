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

//! Table entries and their translation to and from P4Runtime entities.

use proto::p4runtime::{
    self,
    Entity,
    FieldMatch,
    FieldMatch_Exact,
    FieldMatch_LPM,
    FieldMatch_Optional,
    FieldMatch_Range,
    FieldMatch_Ternary,
    FieldMatch_oneof_field_match_type,
    TableAction,
    TableAction_oneof_type,
    Update,
    Update_Type,
};

use protobuf::RepeatedField;

use crate::codec::{decode_value, encode_value};
use crate::error::{P4Error, Result};

/// Source of declared bit widths for match fields and action parameters.
///
/// Returning `None` makes the translator fall back to the width of the
/// bytes on the wire.
pub trait FieldWidths {
    fn match_width(&self, table_id: u32, field_id: u32) -> Option<usize>;
    fn param_width(&self, action_id: u32, param_id: u32) -> Option<usize>;
}

/// Infers every width from the wire, as `8 * byte_len`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WireWidths;

impl FieldWidths for WireWidths {
    fn match_width(&self, _table_id: u32, _field_id: u32) -> Option<usize> {
        None
    }

    fn param_width(&self, _action_id: u32, _param_id: u32) -> Option<usize> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    Exact { value: u64 },
    Ternary { value: u64, mask: u64 },
    Lpm { value: u64, prefix_len: i32 },
    Range { low: u64, high: u64 },
    Optional { value: u64 },
    /// Architecture-specific match, carried as an opaque `Any`.
    Other { type_url: String, value: Vec<u8> },
}

impl MatchKind {
    pub fn needs_priority(&self) -> bool {
        matches!(
            self,
            MatchKind::Ternary { .. } | MatchKind::Range { .. } | MatchKind::Optional { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub field_id: u32,
    pub bitwidth: usize,
    pub kind: MatchKind,
}

impl Match {
    pub fn exact(field_id: u32, bitwidth: usize, value: u64) -> Self {
        Match { field_id, bitwidth, kind: MatchKind::Exact { value } }
    }

    pub fn ternary(field_id: u32, bitwidth: usize, value: u64, mask: u64) -> Self {
        Match { field_id, bitwidth, kind: MatchKind::Ternary { value, mask } }
    }

    pub fn lpm(field_id: u32, bitwidth: usize, value: u64, prefix_len: i32) -> Self {
        Match { field_id, bitwidth, kind: MatchKind::Lpm { value, prefix_len } }
    }

    pub fn range(field_id: u32, bitwidth: usize, low: u64, high: u64) -> Self {
        Match { field_id, bitwidth, kind: MatchKind::Range { low, high } }
    }

    pub fn optional(field_id: u32, bitwidth: usize, value: u64) -> Self {
        Match { field_id, bitwidth, kind: MatchKind::Optional { value } }
    }

    /// An architecture-specific match.  The value is opaque, so its bit
    /// width is always 0.
    pub fn other<S: Into<String>>(field_id: u32, type_url: S, value: Vec<u8>) -> Self {
        Match {
            field_id,
            bitwidth: 0,
            kind: MatchKind::Other { type_url: type_url.into(), value },
        }
    }

    fn to_wire(&self) -> Result<FieldMatch> {
        let mut field_match = FieldMatch::new();
        field_match.set_field_id(self.field_id);
        let width = self.bitwidth;

        match self.kind {
            MatchKind::Exact { value } => {
                let mut exact_match = FieldMatch_Exact::new();
                exact_match.set_value(encode_value(value, width)?);
                field_match.set_exact(exact_match);
            }
            MatchKind::Ternary { value, mask } => {
                let mut ternary_match = FieldMatch_Ternary::new();
                ternary_match.set_value(encode_value(value, width)?);
                ternary_match.set_mask(encode_value(mask, width)?);
                field_match.set_ternary(ternary_match);
            }
            MatchKind::Lpm { value, prefix_len } => {
                if prefix_len < 0 || prefix_len as usize > width {
                    return Err(P4Error::invalid(format!(
                        "field {}: prefix length {} out of range for {} bits",
                        self.field_id, prefix_len, width
                    )));
                }
                let mut lpm_match = FieldMatch_LPM::new();
                lpm_match.set_value(encode_value(value, width)?);
                lpm_match.set_prefix_len(prefix_len);
                field_match.set_lpm(lpm_match);
            }
            MatchKind::Range { low, high } => {
                if low > high {
                    return Err(P4Error::invalid(format!(
                        "field {}: range low {} exceeds high {}",
                        self.field_id, low, high
                    )));
                }
                let mut range_match = FieldMatch_Range::new();
                range_match.set_low(encode_value(low, width)?);
                range_match.set_high(encode_value(high, width)?);
                field_match.set_range(range_match);
            }
            MatchKind::Optional { value } => {
                let mut optional_match = FieldMatch_Optional::new();
                optional_match.set_value(encode_value(value, width)?);
                field_match.set_optional(optional_match);
            }
            MatchKind::Other { ref type_url, ref value } => {
                let mut other = protobuf::well_known_types::Any::new();
                other.set_type_url(type_url.clone());
                other.set_value(value.clone());
                field_match.set_other(other);
            }
        }

        Ok(field_match)
    }

    pub(crate) fn from_wire(table_id: u32, fm: &FieldMatch, widths: &dyn FieldWidths) -> Result<Self> {
        use FieldMatch_oneof_field_match_type::*;

        let field_id = fm.field_id;
        let width_of = |len: usize| widths.match_width(table_id, field_id).unwrap_or(len * 8);
        let (bitwidth, kind) = match fm.field_match_type {
            Some(exact(ref m)) => (
                width_of(m.value.len()),
                MatchKind::Exact { value: decode_value(&m.value)? },
            ),
            Some(ternary(ref m)) => (
                width_of(m.value.len().max(m.mask.len())),
                MatchKind::Ternary {
                    value: decode_value(&m.value)?,
                    mask: decode_value(&m.mask)?,
                },
            ),
            Some(lpm(ref m)) => (
                width_of(m.value.len()),
                MatchKind::Lpm {
                    value: decode_value(&m.value)?,
                    prefix_len: m.prefix_len,
                },
            ),
            Some(range(ref m)) => (
                width_of(m.low.len().max(m.high.len())),
                MatchKind::Range {
                    low: decode_value(&m.low)?,
                    high: decode_value(&m.high)?,
                },
            ),
            Some(optional(ref m)) => (
                width_of(m.value.len()),
                MatchKind::Optional { value: decode_value(&m.value)? },
            ),
            Some(other(ref any)) => (
                0,
                MatchKind::Other {
                    type_url: any.type_url.clone(),
                    value: any.value.clone(),
                },
            ),
            None => {
                return Err(P4Error::invalid(format!(
                    "field {}: match has no match kind",
                    field_id
                )))
            }
        };
        Ok(Match { field_id, bitwidth, kind })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub id: u32,
    pub value: u64,
    pub bitwidth: usize,
}

impl Param {
    pub fn new(id: u32, value: u64, bitwidth: usize) -> Self {
        Param { id, value, bitwidth }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub action_id: u32,
    pub is_default: bool,
    pub params: Vec<Param>,
}

impl Action {
    pub fn new(action_id: u32, params: Vec<Param>) -> Self {
        Action { action_id, is_default: false, params }
    }

    /// An action that replaces the table's default action.
    pub fn default_action(action_id: u32, params: Vec<Param>) -> Self {
        Action { action_id, is_default: true, params }
    }

    fn to_wire(&self) -> Result<p4runtime::Action> {
        let mut runtime_action = p4runtime::Action::new();
        runtime_action.set_action_id(self.action_id);

        let params_vec = self
            .params
            .iter()
            .map(|p| {
                let mut runtime_param = p4runtime::Action_Param::new();
                runtime_param.set_param_id(p.id);
                runtime_param.set_value(encode_value(p.value, p.bitwidth)?);
                Ok(runtime_param)
            })
            .collect::<Result<Vec<_>>>()?;
        runtime_action.set_params(RepeatedField::from_vec(params_vec));

        Ok(runtime_action)
    }

    fn from_wire(a: &p4runtime::Action, is_default: bool, widths: &dyn FieldWidths) -> Result<Self> {
        let action_id = a.action_id;
        let params = a
            .get_params()
            .iter()
            .map(|p| {
                Ok(Param {
                    id: p.param_id,
                    value: decode_value(&p.value)?,
                    bitwidth: widths
                        .param_width(action_id, p.param_id)
                        .unwrap_or(p.value.len() * 8),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Action { action_id, is_default, params })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableEntry {
    pub table_id: u32,
    pub action: Action,
    pub matches: Vec<Match>,
    /// Required exactly when some match is ternary, range or optional.
    pub priority: Option<i32>,
    /// Idle timeout; 0 means the entry never expires.
    pub timeout_ns: i64,
}

impl TableEntry {
    pub fn new(table_id: u32, action: Action) -> Self {
        TableEntry {
            table_id,
            action,
            matches: Vec::new(),
            priority: None,
            timeout_ns: 0,
        }
    }

    pub fn with_match(mut self, m: Match) -> Self {
        self.matches.push(m);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout_ns(mut self, timeout_ns: i64) -> Self {
        self.timeout_ns = timeout_ns;
        self
    }

    pub fn needs_priority(&self) -> bool {
        self.matches.iter().any(|m| m.kind.needs_priority())
    }

    fn validate(&self) -> Result<()> {
        let table_id = self.table_id;
        if self.action.is_default && !self.matches.is_empty() {
            return Err(P4Error::invalid(format!(
                "table {}: default action entry must not have matches",
                table_id
            )));
        }
        if !self.action.is_default && self.matches.is_empty() {
            return Err(P4Error::invalid(format!(
                "table {}: entry without matches would be a wildcard",
                table_id
            )));
        }
        match (self.needs_priority(), self.priority) {
            (true, None) => Err(P4Error::invalid(format!(
                "table {}: ternary, range and optional matches need a priority",
                table_id
            ))),
            (true, Some(p)) if p <= 0 => Err(P4Error::invalid(format!(
                "table {}: priority {} must be positive",
                table_id, p
            ))),
            (false, Some(p)) => Err(P4Error::invalid(format!(
                "table {}: priority {} given but no match needs one",
                table_id, p
            ))),
            _ => Ok(()),
        }
    }

    /// Builds the wire entity for this entry, validating it first.
    pub fn to_wire(&self) -> Result<Entity> {
        self.validate()?;

        let field_matches = self
            .matches
            .iter()
            .map(Match::to_wire)
            .collect::<Result<Vec<_>>>()?;

        let mut table_action = TableAction::new();
        table_action.set_action(self.action.to_wire()?);

        let mut table_entry = p4runtime::TableEntry::new();
        table_entry.set_table_id(self.table_id);
        table_entry.set_field_match(RepeatedField::from_vec(field_matches));
        table_entry.set_action(table_action);
        if let Some(priority) = self.priority {
            table_entry.set_priority(priority);
        }
        if self.action.is_default {
            table_entry.set_is_default_action(true);
        } else {
            table_entry.set_idle_timeout_ns(self.timeout_ns);
        }

        let mut entity = Entity::new();
        entity.set_table_entry(table_entry);
        Ok(entity)
    }

    /// Wraps the entry in an update of kind `update_type`.
    pub fn to_update(&self, update_type: Update_Type) -> Result<Update> {
        let mut update = Update::new();
        update.set_field_type(update_type);
        update.set_entity(self.to_wire()?);
        Ok(update)
    }

    /// Translates a table-entry entity read back from the device.
    pub fn from_wire(entity: &Entity, widths: &dyn FieldWidths) -> Result<Self> {
        if !entity.has_table_entry() {
            return Err(P4Error::invalid("entity is not a table entry"));
        }
        let te = entity.get_table_entry();
        let table_id = te.table_id;

        let action = match te.get_action().field_type {
            Some(TableAction_oneof_type::action(ref a)) => {
                Action::from_wire(a, te.is_default_action, widths)?
            }
            Some(_) => {
                return Err(P4Error::invalid(format!(
                    "table {}: action profile actions are not supported",
                    table_id
                )))
            }
            None => {
                return Err(P4Error::invalid(format!("table {}: entry has no action", table_id)))
            }
        };
        let matches = te
            .get_field_match()
            .iter()
            .map(|fm| Match::from_wire(table_id, fm, widths))
            .collect::<Result<Vec<_>>>()?;

        Ok(TableEntry {
            table_id,
            action,
            matches,
            priority: if te.priority != 0 { Some(te.priority) } else { None },
            timeout_ns: te.idle_timeout_ns,
        })
    }
}

/// Read criteria for table entries.  An id of 0 matches everything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableEntryFilter {
    pub table_id: u32,
    pub action_id: u32,
}

impl TableEntryFilter {
    pub fn new(table_id: u32, action_id: u32) -> Self {
        TableEntryFilter { table_id, action_id }
    }

    /// The entity sent in a read request.  Only the table id narrows the
    /// device-side search; the action is filtered locally.
    pub fn to_wire(&self) -> Entity {
        let mut table_entry = p4runtime::TableEntry::new();
        table_entry.set_table_id(self.table_id);
        let mut entity = Entity::new();
        entity.set_table_entry(table_entry);
        entity
    }

    pub fn matches(&self, entry: &TableEntry) -> bool {
        (self.table_id == 0 || entry.table_id == self.table_id)
            && (self.action_id == 0 || entry.action.action_id == self.action_id)
    }
}
