//! Parent-chain path resolution for journal entries

use super::record::JournalEntry;
use crate::types::JournalError;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Entry id of an NTFS volume's root directory
pub const VOLUME_ROOT_ID: u64 = 0x5_0000_0000_0005;

/// A journal entry with its volume-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub entry_id: u64,
    pub path: PathBuf,
    pub is_folder: bool,
}

struct Node {
    name: String,
    parent_id: u64,
    is_folder: bool,
}

/// Resolves entry ids to volume-relative paths
pub struct PathResolver {
    root_id: u64,
    nodes: HashMap<u64, Node>,
    order: Vec<u64>,
    folder_paths: HashMap<u64, PathBuf>,
}

impl PathResolver {
    pub fn new(root_id: u64) -> Self {
        Self {
            root_id,
            nodes: HashMap::new(),
            order: Vec::new(),
            folder_paths: HashMap::new(),
        }
    }

    pub fn insert(&mut self, entry: JournalEntry) {
        if entry.entry_id == self.root_id {
            return;
        }
        if self.nodes.contains_key(&entry.entry_id) {
            return;
        }
        self.order.push(entry.entry_id);
        self.nodes.insert(
            entry.entry_id,
            Node {
                name: entry.name,
                parent_id: entry.parent_id,
                is_folder: entry.is_folder,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve every inserted entry, in insertion order
    pub fn resolve_all(mut self) -> Result<Vec<ResolvedEntry>, JournalError> {
        let order = std::mem::take(&mut self.order);
        let mut resolved = Vec::with_capacity(order.len());

        for entry_id in order {
            let Some(node) = self.nodes.get(&entry_id) else {
                continue;
            };
            let is_folder = node.is_folder;
            let path = if is_folder {
                self.folder_path(entry_id)?
            } else {
                let parent_id = node.parent_id;
                let name = node.name.clone();
                self.parent_path(entry_id, parent_id)?.join(name)
            };
            resolved.push(ResolvedEntry {
                entry_id,
                path,
                is_folder,
            });
        }

        Ok(resolved)
    }

    fn parent_path(&mut self, child_id: u64, parent_id: u64) -> Result<PathBuf, JournalError> {
        if parent_id == self.root_id {
            return Ok(PathBuf::new());
        }
        if !self.nodes.contains_key(&parent_id) {
            return Err(JournalError::BrokenChain {
                entry_id: child_id,
                parent_id,
            });
        }
        self.folder_path(parent_id)
    }

    /// Walk upward from `folder_id` until the root or an already-resolved folder,
    /// then fill in paths on the way back down.
    fn folder_path(&mut self, folder_id: u64) -> Result<PathBuf, JournalError> {
        if let Some(path) = self.folder_paths.get(&folder_id) {
            return Ok(path.clone());
        }

        let limit = self.nodes.len();
        let mut chain: Vec<u64> = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut child = folder_id;
        let mut current = folder_id;

        let mut base = loop {
            if current == self.root_id {
                break PathBuf::new();
            }
            if let Some(path) = self.folder_paths.get(&current) {
                break path.clone();
            }
            if !visited.insert(current) || chain.len() > limit {
                return Err(JournalError::CyclicChain {
                    entry_id: folder_id,
                });
            }
            let node = self.nodes.get(&current).ok_or(JournalError::BrokenChain {
                entry_id: child,
                parent_id: current,
            })?;
            chain.push(current);
            child = current;
            current = node.parent_id;
        };

        for id in chain.into_iter().rev() {
            if let Some(node) = self.nodes.get(&id) {
                base.push(&node.name);
            }
            self.folder_paths.insert(id, base.clone());
        }

        Ok(base)
    }
}

/// Resolve a complete enumeration into volume-relative paths
pub fn resolve_entries<I>(entries: I, root_id: u64) -> Result<Vec<ResolvedEntry>, JournalError>
where
    I: IntoIterator<Item = Result<JournalEntry, JournalError>>,
{
    let mut resolver = PathResolver::new(root_id);
    for entry in entries {
        resolver.insert(entry?);
    }
    resolver.resolve_all()
}
