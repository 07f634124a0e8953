//! Splits resume sections into placeable entries.
//!
//! An entry's `id` joins the measurement pass to the packing pass, so it must
//! be derived only from the section key and the entry's original index.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::models::resume::HEADER_SECTION;
use crate::models::{Column, ResumeDocument};

/// Sections rendered as one visual block that must never be split.
pub const UNBREAKABLE_SECTIONS: &[&str] = &["books", "hobbies", "myTime"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub section_key: String,
    /// Index into the section's backing array; 0 for unbreakable and single sections.
    pub index: usize,
    pub data: Value,
    pub is_unbreakable: bool,
    pub is_single: bool,
}

pub fn entry_id(section_key: &str, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{section_key}-{i}"),
        None => section_key.to_string(),
    }
}

pub fn is_unbreakable(section_key: &str) -> bool {
    UNBREAKABLE_SECTIONS.contains(&section_key)
}

/// True for values with nothing to render: null, blank strings, and
/// arrays/objects containing only such values.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(fields) => fields.values().all(is_empty_value),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Entries of one section, in array order. Empty items are skipped but keep
/// their original index so the editor's indices stay valid.
pub fn section_entries(section_key: &str, value: &Value) -> Vec<Entry> {
    if is_empty_value(value) {
        return Vec::new();
    }

    if is_unbreakable(section_key) {
        return vec![Entry {
            id: entry_id(section_key, None),
            section_key: section_key.to_string(),
            index: 0,
            data: value.clone(),
            is_unbreakable: true,
            is_single: false,
        }];
    }

    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| !is_empty_value(item))
            .map(|(i, item)| Entry {
                id: entry_id(section_key, Some(i)),
                section_key: section_key.to_string(),
                index: i,
                data: item.clone(),
                is_unbreakable: false,
                is_single: false,
            })
            .collect(),
        _ => vec![Entry {
            id: entry_id(section_key, None),
            section_key: section_key.to_string(),
            index: 0,
            data: value.clone(),
            is_unbreakable: false,
            is_single: true,
        }],
    }
}

/// Entries for the sections of `keys`, in order, honouring visibility.
/// A key listed twice only contributes once.
pub fn entries_for_keys<'a, I>(document: &ResumeDocument, keys: I) -> Vec<Entry>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| key.as_str() != HEADER_SECTION)
        .filter(|key| seen.insert(*key))
        .filter(|key| document.is_visible(key))
        .filter_map(|key| document.section(key).map(|value| section_entries(key, value)))
        .flatten()
        .collect()
}

/// Entries of one column of the two-column template. A section listed in
/// both columns stays in the left one.
pub fn column_entries(document: &ResumeDocument, column: Column) -> Vec<Entry> {
    match column {
        Column::Left => entries_for_keys(document, document.layout.keys(Column::Left)),
        Column::Right => entries_for_keys(
            document,
            document
                .layout
                .keys(Column::Right)
                .iter()
                .filter(|key| !document.layout.left.contains(key)),
        ),
    }
}

/// Entries for the single-column template: left sections then right sections.
pub fn ordered_entries(document: &ResumeDocument) -> Vec<Entry> {
    entries_for_keys(
        document,
        document.layout.left.iter().chain(document.layout.right.iter()),
    )
}

/// Id of the entry that a page slot `(section_key, index)` refers to.
pub fn slot_entry_id(document: &ResumeDocument, section_key: &str, index: usize) -> String {
    match document.section(section_key) {
        Some(Value::Array(_)) if !is_unbreakable(section_key) => entry_id(section_key, Some(index)),
        _ => entry_id(section_key, None),
    }
}

/// Smallest entry index per section, i.e. the fragment that carries the title.
pub fn first_indices(entries: &[Entry]) -> HashMap<String, usize> {
    let mut firsts = HashMap::new();
    for entry in entries {
        firsts
            .entry(entry.section_key.clone())
            .and_modify(|i: &mut usize| *i = (*i).min(entry.index))
            .or_insert(entry.index);
    }
    firsts
}
