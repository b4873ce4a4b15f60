//! The set of scanned files for one build graph.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use super::file::{File, FileId};

/// All scanned files, addressable by [`FileId`] or by root-relative path.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    files: Vec<File>,
    by_path: HashMap<String, FileId>,
}

impl SourceSet {
    pub fn new() -> Self {
        SourceSet::default()
    }

    /// Add a file, replacing any previous record with the same path.
    pub fn insert(&mut self, file: File) -> FileId {
        if let Some(&id) = self.by_path.get(&file.path) {
            self.files[id.0] = file;
            return id;
        }
        let id = FileId(self.files.len());
        self.by_path.insert(file.path.clone(), id);
        self.files.push(file);
        id
    }

    /// Find a file by root-relative path.
    pub fn lookup(&self, path: &str) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: FileId) -> &File {
        &self.files[id.0]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut File {
        &mut self.files[id.0]
    }

    /// Files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &File)> {
        self.files.iter().enumerate().map(|(i, f)| (FileId(i), f))
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len()).map(FileId)
    }

    /// First implementation file sharing a header's stem, if scanned.
    pub fn sibling_of(&self, id: FileId) -> Option<FileId> {
        self.get(id)
            .sibling_candidates()
            .iter()
            .find_map(|candidate| self.lookup(candidate))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Index<FileId> for SourceSet {
    type Output = File;

    fn index(&self, id: FileId) -> &File {
        self.get(id)
    }
}

impl IndexMut<FileId> for SourceSet {
    fn index_mut(&mut self, id: FileId) -> &mut File {
        self.get_mut(id)
    }
}
