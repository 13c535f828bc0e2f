//! Source locations and the interned file table.

use rustc_hash::FxHashMap;

use crate::ir::id::SrcFileId;

/// A position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcLoc {
    /// The interned source file.
    pub file: SrcFileId,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
    /// Byte offset into the file.
    pub byte_pos: u32,
}

impl SrcLoc {
    /// Creates a source location.
    #[must_use]
    pub fn new(file: SrcFileId, line: u32, col: u32, byte_pos: u32) -> Self {
        SrcLoc {
            file,
            line,
            col,
            byte_pos,
        }
    }
}

/// Interns source file names and hands out stable [`SrcFileId`]s.
#[derive(Debug, Default)]
pub struct SourceMap {
    ids: FxHashMap<String, SrcFileId>,
    names: Vec<String>,
}

impl SourceMap {
    /// Creates an empty source map.
    #[must_use]
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Returns the id for `name`, interning it on first use.
    ///
    /// Ids start at 1; `SrcFileId(0)` is never handed out.
    pub fn intern(&mut self, name: &str) -> SrcFileId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        self.names.push(name.to_string());
        let id = SrcFileId(self.names.len() as u32);
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Looks up the name of an interned file.
    #[must_use]
    pub fn name(&self, id: SrcFileId) -> Option<&str> {
        if id.0 == 0 {
            return None;
        }
        self.names.get(id.0 as usize - 1).map(String::as_str)
    }

    /// Number of interned files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when no files have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut map = SourceMap::new();
        let a = map.intern("a.c");
        let b = map.intern("b.c");
        assert_ne!(a, b);
        assert_eq!(map.intern("a.c"), a);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_name_lookup() {
        let mut map = SourceMap::new();
        let a = map.intern("main.c");
        assert_eq!(map.name(a), Some("main.c"));
        assert_eq!(map.name(SrcFileId(0)), None);
        assert_eq!(map.name(SrcFileId(99)), None);
    }
}
