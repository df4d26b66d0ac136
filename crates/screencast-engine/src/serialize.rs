//! Storage-safe representation of recorded changes.
//!
//! Everything written to disk goes through the `*Record` types below: flat
//! `{line, character}` positions, ranges as `[start, end]` pairs and
//! selections carrying `start`/`end`/`active`/`anchor`. Reading is lenient
//! about shape (every field is optional at the serde level) so that a single
//! damaged change surfaces as a [`CorruptChangeError`] for that record
//! instead of failing the whole project map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::{Change, EditOp, Position, Range, Selection};
use crate::error::CorruptChangeError;
use crate::project::{Breakpoint, ProjectData, ProjectMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<PositionRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// `start` and `end` are derived from `anchor`/`active`; they are written for
/// readers that expect them and ignored on the way back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<PositionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<PositionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<PositionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PositionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<Vec<EditRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<SelectionRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Kept as raw JSON so each change is rehydrated on its own
    #[serde(default)]
    pub changes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default)]
    pub initial_content: String,
    #[serde(default)]
    pub breakpoints: Vec<BreakpointRecord>,
}

pub type ProjectMapRecord = BTreeMap<String, ProjectRecord>;

/// Reconstruct a native [`Change`].
///
/// Implemented for the stored forms and for `Change` itself, where it is the
/// identity, so rehydrating twice is the same as rehydrating once.
pub trait Rehydrate {
    fn rehydrate(&self) -> Result<Change, CorruptChangeError>;
}

impl Rehydrate for Change {
    fn rehydrate(&self) -> Result<Change, CorruptChangeError> {
        Ok(self.clone())
    }
}

impl Rehydrate for ChangeRecord {
    fn rehydrate(&self) -> Result<Change, CorruptChangeError> {
        let edits = self
            .edits
            .as_ref()
            .ok_or_else(|| CorruptChangeError::missing("edits"))?
            .iter()
            .enumerate()
            .map(|(i, edit)| rehydrate_edit(edit, &format!("edits[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        let selections = self
            .selections
            .as_ref()
            .ok_or_else(|| CorruptChangeError::missing("selections"))?
            .iter()
            .enumerate()
            .map(|(i, selection)| rehydrate_selection(selection, &format!("selections[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Change { edits, selections })
    }
}

impl Rehydrate for Value {
    fn rehydrate(&self) -> Result<Change, CorruptChangeError> {
        let record: ChangeRecord = serde_json::from_value(self.clone())
            .map_err(|e| CorruptChangeError::new("change", e.to_string()))?;
        record.rehydrate()
    }
}

fn rehydrate_position(
    record: Option<&PositionRecord>,
    field: &str,
) -> Result<Position, CorruptChangeError> {
    let record = record.ok_or_else(|| CorruptChangeError::missing(field))?;
    let line = record
        .line
        .ok_or_else(|| CorruptChangeError::missing(format!("{field}.line")))?;
    let character = record
        .character
        .ok_or_else(|| CorruptChangeError::missing(format!("{field}.character")))?;
    Ok(Position { line, character })
}

fn rehydrate_range(
    record: Option<&Vec<PositionRecord>>,
    field: &str,
) -> Result<Range, CorruptChangeError> {
    let record = record.ok_or_else(|| CorruptChangeError::missing(field))?;
    let [start, end] = record.as_slice() else {
        return Err(CorruptChangeError::new(
            field,
            format!("expected 2 positions, found {}", record.len()),
        ));
    };
    let start = rehydrate_position(Some(start), &format!("{field}[0]"))?;
    let end = rehydrate_position(Some(end), &format!("{field}[1]"))?;
    if end < start {
        return Err(CorruptChangeError::new(field, "end precedes start"));
    }
    Ok(Range { start, end })
}

fn rehydrate_edit(record: &EditRecord, field: &str) -> Result<EditOp, CorruptChangeError> {
    Ok(EditOp {
        range: rehydrate_range(record.range.as_ref(), &format!("{field}.range"))?,
        range_offset: record
            .range_offset
            .ok_or_else(|| CorruptChangeError::missing(format!("{field}.rangeOffset")))?,
        range_length: record
            .range_length
            .ok_or_else(|| CorruptChangeError::missing(format!("{field}.rangeLength")))?,
        text: record
            .text
            .clone()
            .ok_or_else(|| CorruptChangeError::missing(format!("{field}.text")))?,
    })
}

fn rehydrate_selection(
    record: &SelectionRecord,
    field: &str,
) -> Result<Selection, CorruptChangeError> {
    Ok(Selection {
        anchor: rehydrate_position(record.anchor.as_ref(), &format!("{field}.anchor"))?,
        active: rehydrate_position(record.active.as_ref(), &format!("{field}.active"))?,
    })
}

fn position_record(position: Position) -> PositionRecord {
    PositionRecord {
        line: Some(position.line),
        character: Some(position.character),
    }
}

/// Flatten a native change into its stored form
pub fn serialize(change: &Change) -> ChangeRecord {
    ChangeRecord {
        edits: Some(
            change
                .edits
                .iter()
                .map(|edit| EditRecord {
                    range: Some(vec![
                        position_record(edit.range.start),
                        position_record(edit.range.end),
                    ]),
                    range_offset: Some(edit.range_offset),
                    range_length: Some(edit.range_length),
                    text: Some(edit.text.clone()),
                })
                .collect(),
        ),
        selections: Some(
            change
                .selections
                .iter()
                .map(|selection| SelectionRecord {
                    start: Some(position_record(selection.start())),
                    end: Some(position_record(selection.end())),
                    active: Some(position_record(selection.active)),
                    anchor: Some(position_record(selection.anchor)),
                })
                .collect(),
        ),
    }
}

pub fn project_to_record(data: &ProjectData) -> Result<ProjectRecord, serde_json::Error> {
    let breakpoints = data
        .breakpoints
        .iter()
        .map(|breakpoint| {
            Ok(BreakpointRecord {
                id: breakpoint.id.clone(),
                name: breakpoint.name.clone(),
                content: breakpoint.content.clone(),
                changes: breakpoint
                    .changes
                    .iter()
                    .map(|change| serde_json::to_value(serialize(change)))
                    .collect::<Result<_, _>>()?,
            })
        })
        .collect::<Result<_, serde_json::Error>>()?;

    Ok(ProjectRecord {
        initial_content: data.initial_content.clone(),
        breakpoints,
    })
}

/// Rehydrate a stored project, skipping (and returning) changes that fail.
pub fn project_from_record(record: ProjectRecord) -> (ProjectData, Vec<CorruptChangeError>) {
    let mut errors = Vec::new();
    let breakpoints = record
        .breakpoints
        .into_iter()
        .map(|breakpoint| {
            let changes = breakpoint
                .changes
                .iter()
                .filter_map(|value| match value.rehydrate() {
                    Ok(change) => Some(change),
                    Err(e) => {
                        errors.push(e);
                        None
                    }
                })
                .collect();
            Breakpoint {
                id: breakpoint.id,
                name: breakpoint.name,
                content: breakpoint.content,
                changes,
            }
        })
        .collect::<Vec<_>>();

    let mut data = ProjectData {
        initial_content: record.initial_content,
        breakpoints,
    };
    // A project always has its seed breakpoint
    if data.breakpoints.is_empty() {
        data.breakpoints = ProjectData::new(data.initial_content.clone()).breakpoints;
    }
    (data, errors)
}

pub fn map_to_value(map: &ProjectMap) -> Result<Value, serde_json::Error> {
    let record = map
        .iter()
        .map(|(id, data)| Ok((id.clone(), project_to_record(data)?)))
        .collect::<Result<ProjectMapRecord, serde_json::Error>>()?;
    serde_json::to_value(record)
}
