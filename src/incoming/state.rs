// {{{ Copyright (c) Paul R. Tagliamonte <paultag@debian.org>, 2024
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE. }}}

use super::{IncomingError, IncomingRule};

/// The scanned view of one incoming directory: the discovered file
/// names, plus two parallel bit rows remembering which of them were
/// handled and which should be deleted once the run is over.
#[derive(Clone, Debug)]
pub struct IncomingState {
    files: Vec<String>,
    processed: Vec<bool>,
    delete: Vec<bool>,
}

impl IncomingState {
    /// Scan the rule's incoming directory, and make sure its staging
    /// directory exists. Dot-files and anything with a path separator
    /// in its name are ignored.
    pub(crate) fn open(rule: &IncomingRule) -> Result<Self, IncomingError> {
        std::fs::create_dir_all(&rule.tempdir).map_err(IncomingError::Io)?;

        let mut files = vec![];
        for entry in std::fs::read_dir(&rule.directory).map_err(IncomingError::Io)? {
            let entry = entry.map_err(IncomingError::Io)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                tracing::warn!(directory = %rule.directory.display(),
                    "ignoring a file with a non-UTF-8 name");
                continue;
            };
            if name.starts_with('.') || name.contains('/') {
                continue;
            }
            files.push(name.to_owned());
        }
        // directory order is arbitrary; sorted order keeps runs
        // reproducible
        files.sort();

        let count = files.len();
        Ok(IncomingState {
            files,
            processed: vec![false; count],
            delete: vec![false; count],
        })
    }

    /// The discovered file names.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub(crate) fn basename(&self, ofs: usize) -> &str {
        &self.files[ofs]
    }

    /// Index of `basename` within the scanned files, if present.
    pub(crate) fn find(&self, basename: &str) -> Option<usize> {
        self.files.iter().position(|name| name == basename)
    }

    pub(crate) fn mark_processed(&mut self, ofs: usize) {
        self.processed[ofs] = true;
    }

    pub(crate) fn mark_delete(&mut self, ofs: usize) {
        self.delete[ofs] = true;
    }

    /// Unlink every file marked for deletion from the incoming
    /// directory. A failing unlink is logged and doesn't stop the rest.
    pub(crate) fn delete_marked(&mut self, rule: &IncomingRule) {
        for (ofs, marked) in self.delete.iter_mut().enumerate() {
            if !*marked {
                continue;
            }
            *marked = false;
            let path = rule.directory.join(&self.files[ofs]);
            tracing::debug!(path = %path.display(), "deleting");
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err,
                    "could not delete file from the incoming directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incoming::{CleanupFlags, PermitFlags};
    use std::path::Path;

    fn rule(dir: &Path, tempdir: &Path) -> IncomingRule {
        IncomingRule {
            name: "test".to_owned(),
            directory: dir.to_owned(),
            tempdir: tempdir.to_owned(),
            allow: vec![],
            default_into: Some("unstable".to_owned()),
            permit: PermitFlags::default(),
            cleanup: CleanupFlags::default(),
        }
    }

    #[test]
    fn scan_skips_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.changes"), "").unwrap();
        std::fs::write(dir.path().join("a.deb"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();

        let tempdir = dir.path().join("tmp");
        let state = IncomingState::open(&rule(dir.path(), &tempdir)).unwrap();
        assert_eq!(&["a.deb".to_owned(), "b.changes".to_owned()], state.files());
        assert!(tempdir.is_dir());
    }

    #[test]
    fn delete_marked_removes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "").unwrap();
        std::fs::write(dir.path().join("b"), "").unwrap();

        let tempdir = dir.path().join("tmp");
        let rule = rule(dir.path(), &tempdir);
        let mut state = IncomingState::open(&rule).unwrap();
        let ofs = state.find("a").unwrap();
        state.mark_delete(ofs);
        state.delete_marked(&rule);

        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("b").exists());
    }
}

// vim: foldmethod=marker
