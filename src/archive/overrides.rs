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

//! Per-package override tables.
//!
//! An override file lets the archive operator pin the section, priority
//! and maintainer of a package regardless of what the upload declares.
//! The classic line format is `package priority section [maintainer]`.

use std::collections::HashMap;

/// Error conditions which may be encountered when parsing an override
/// file.
#[derive(Clone, Debug, PartialEq)]
pub enum OverrideError {
    /// A line didn't have at least `package priority section`.
    Malformed(String),
}
crate::errors::error_enum!(OverrideError);

/// The override values for one package.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverrideEntry {
    /// Section to force, if any.
    pub section: Option<String>,

    /// Priority to force, if any.
    pub priority: Option<String>,

    /// Maintainer to force into the index record, if any.
    pub maintainer: Option<String>,
}

/// A lookup table from package name to [OverrideEntry].
#[derive(Clone, Debug, Default)]
pub struct OverrideTable {
    entries: HashMap<String, OverrideEntry>,
}

impl OverrideTable {
    /// Parse a classic override file. `_` in the priority or section
    /// column means "leave alone"; empty lines and `#` comments are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self, OverrideError> {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let (Some(package), Some(priority), Some(section)) =
                (words.next(), words.next(), words.next())
            else {
                return Err(OverrideError::Malformed(line.to_owned()));
            };
            let maintainer = {
                let rest: Vec<&str> = words.collect();
                if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(" "))
                }
            };
            entries.insert(
                package.to_owned(),
                OverrideEntry {
                    section: (section != "_").then(|| section.to_owned()),
                    priority: (priority != "_").then(|| priority.to_owned()),
                    maintainer,
                },
            );
        }
        Ok(OverrideTable { entries })
    }

    /// Look up the override for a package, if one is configured.
    pub fn lookup(&self, package: &str) -> Option<&OverrideEntry> {
        self.entries.get(package)
    }

    /// Number of packages with overrides.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no package has an override.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}


// vim: foldmethod=marker
