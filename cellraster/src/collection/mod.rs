//! Ordered, uniquely named collections of intensity images or label masks.
//!
//! An [`ImageCollection`] is an explicit ordered map from entry name to an
//! [`ImageKind`] plus per-entry [`EntryMetadata`]. Every mutating operation
//! re-runs [`ImageCollection::validate`] and rolls back if the result would
//! violate an invariant:
//!
//! - names are non-empty and unique
//! - `image_id` metadata values are unique where present
//! - all entries are of the same kind (intensity or label)
//! - intensity entries share one channel list, in the same order

pub mod image;

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

pub use self::image::{ImageKind, LabelMask, MultiChannelImage};
use crate::error::{CellrasterError, Result};
use crate::image_size::PixelShape;

/// Per-entry metadata; `image_id` joins an entry to rows of the cell table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub image_id: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl EntryMetadata {
    pub fn with_image_id(image_id: impl Into<String>) -> Self {
        Self {
            image_id: Some(image_id.into()),
            fields: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub name: String,
    pub image: ImageKind,
    pub metadata: EntryMetadata,
}

impl ImageEntry {
    pub fn new(name: impl Into<String>, image: ImageKind) -> Self {
        Self {
            name: name.into(),
            image,
            metadata: EntryMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identifier used to join against the cell table: the `image_id`
    /// metadata value, falling back to the entry name.
    pub fn join_id(&self) -> &str {
        self.metadata.image_id.as_deref().unwrap_or(&self.name)
    }
}

/// Ways to address an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey {
    Name(String),
    ImageId(String),
    Index(usize),
}

impl From<&str> for EntryKey {
    fn from(name: &str) -> Self {
        EntryKey::Name(name.to_string())
    }
}

impl From<usize> for EntryKey {
    fn from(index: usize) -> Self {
        EntryKey::Index(index)
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKey::Name(name) => write!(f, "image named '{name}'"),
            EntryKey::ImageId(id) => write!(f, "image with image_id '{id}'"),
            EntryKey::Index(i) => write!(f, "image at position {i}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCollection {
    entries: Vec<ImageEntry>,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ImageEntry>) -> Result<Self> {
        let collection = Self { entries };
        collection.validate()?;
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// True when the collection holds label masks.
    pub fn is_label(&self) -> bool {
        self.entries.first().is_some_and(|e| e.image.is_label())
    }

    /// Channel names shared by all intensity entries.
    pub fn channel_names(&self) -> Option<&[String]> {
        self.entries
            .first()
            .and_then(|e| e.image.as_intensity())
            .map(|image| image.channel_names())
    }

    /// Largest width and height over all entries.
    pub fn max_shape(&self) -> PixelShape {
        self.entries
            .iter()
            .fold(PixelShape::default(), |acc, e| acc.union(&e.image.shape()))
    }

    /// Position of the entry addressed by `key`.
    pub fn resolve(&self, key: &EntryKey) -> Option<usize> {
        match key {
            EntryKey::Name(name) => self.entries.iter().position(|e| &e.name == name),
            EntryKey::ImageId(id) => self
                .entries
                .iter()
                .position(|e| e.metadata.image_id.as_deref() == Some(id.as_str())),
            EntryKey::Index(i) => (*i < self.entries.len()).then_some(*i),
        }
    }

    /// Subset in the requested order.
    pub fn get(&self, keys: &[EntryKey]) -> Result<Self> {
        let entries = keys
            .iter()
            .map(|key| {
                self.resolve(key)
                    .map(|i| self.entries[i].clone())
                    .ok_or_else(|| CellrasterError::NotFound(key.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    /// Append a new entry.
    pub fn push(&mut self, entry: ImageEntry) -> Result<()> {
        self.entries.push(entry);
        if let Err(e) = self.validate() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replace, insert or delete the entry addressed by `key`.
    ///
    /// - `None` deletes the entry.
    /// - By name, the entry keeps the addressed name; an unknown name appends.
    /// - By `image_id`, the entry keeps the name it replaces.
    /// - By position, the assigned entry's own name takes over the slot.
    pub fn set_entry(&mut self, key: &EntryKey, entry: Option<ImageEntry>) -> Result<()> {
        let position = self.resolve(key);
        match (position, entry) {
            (Some(i), None) => {
                let removed = self.entries.remove(i);
                debug!("removed entry '{}'", removed.name);
                Ok(())
            }
            (None, None) => Err(CellrasterError::NotFound(key.to_string())),
            (None, Some(mut entry)) => match key {
                EntryKey::Name(name) => {
                    entry.name = name.clone();
                    self.push(entry)
                }
                _ => Err(CellrasterError::NotFound(key.to_string())),
            },
            (Some(i), Some(mut entry)) => {
                if !matches!(key, EntryKey::Index(_)) {
                    entry.name = self.entries[i].name.clone();
                }
                let previous = std::mem::replace(&mut self.entries[i], entry);
                if let Err(e) = self.validate() {
                    self.entries[i] = previous;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Check every collection invariant, naming the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut image_ids = HashSet::new();
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(CellrasterError::Schema("empty image name".to_string()));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(CellrasterError::Schema(format!(
                    "duplicate image name '{}'",
                    entry.name
                )));
            }
            if let Some(id) = entry.metadata.image_id.as_deref() {
                if !image_ids.insert(id) {
                    return Err(CellrasterError::Schema(format!(
                        "duplicate image_id '{id}'"
                    )));
                }
            }
        }

        let Some(first) = self.entries.first() else {
            return Ok(());
        };
        for entry in &self.entries[1..] {
            match (&first.image, &entry.image) {
                (ImageKind::Intensity(a), ImageKind::Intensity(b)) => {
                    if a.channel_names() != b.channel_names() {
                        return Err(CellrasterError::Schema(format!(
                            "channel mismatch: '{}' has channels {:?} but '{}' has {:?}",
                            entry.name,
                            b.channel_names(),
                            first.name,
                            a.channel_names()
                        )));
                    }
                }
                (ImageKind::Label(_), ImageKind::Label(_)) => {}
                _ => {
                    return Err(CellrasterError::Schema(format!(
                        "'{}' mixes label masks and intensity images in one collection",
                        entry.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Apply `f` to every entry, keeping names and metadata, and validate the
    /// rebuilt collection.
    pub fn map<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&ImageEntry) -> Result<ImageKind>,
    {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                Ok(ImageEntry {
                    name: entry.name.clone(),
                    image: f(entry)?,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    /// Keep only the named channels, in the requested order.
    pub fn get_channels(&self, names: &[String]) -> Result<Self> {
        self.map(|entry| Ok(ImageKind::Intensity(intensity(entry)?.select_channels(names)?)))
    }

    /// Rename the channels of every entry.
    pub fn set_channel_names(&self, names: &[String]) -> Result<Self> {
        self.map(|entry| {
            Ok(ImageKind::Intensity(
                intensity(entry)?.with_channel_names(names.to_vec())?,
            ))
        })
    }

    /// Multiply every intensity by `factor`.
    pub fn scale_images(&self, factor: f64) -> Result<Self> {
        self.map(|entry| {
            Ok(ImageKind::Intensity(
                intensity(entry)?.map_channels(|_, v| v * factor),
            ))
        })
    }
}

impl<'a> IntoIterator for &'a ImageCollection {
    type Item = &'a ImageEntry;
    type IntoIter = std::slice::Iter<'a, ImageEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn intensity(entry: &ImageEntry) -> Result<&MultiChannelImage> {
    entry.image.as_intensity().ok_or_else(|| {
        CellrasterError::Schema(format!(
            "'{}' is a label mask; channel operations need intensity images",
            entry.name
        ))
    })
}

/// Pairwise concatenate the channels of two equally long collections.
///
/// Names and metadata come from `a`. Fails with `Schema` on a length or pixel
/// size mismatch, or when a channel name of `b` already exists in `a`.
pub fn merge_channels(a: &ImageCollection, b: &ImageCollection) -> Result<ImageCollection> {
    if a.len() != b.len() {
        return Err(CellrasterError::Schema(format!(
            "cannot merge channels of collections with {} and {} images",
            a.len(),
            b.len()
        )));
    }
    let entries = a
        .iter()
        .zip(b.iter())
        .map(|(left, right)| {
            let merged = intensity(left)?.concat_channels(intensity(right)?)?;
            Ok(ImageEntry {
                name: left.name.clone(),
                image: ImageKind::Intensity(merged),
                metadata: left.metadata.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    ImageCollection::from_entries(entries)
}
