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

//! Uploader policies: who is allowed to feed a distribution.
//!
//! The policy file grammar is a list of `allow` statements:
//!
//! ```text
//! allow * by key 1234ABCD5678EF90
//! allow * by unsigned
//! allow * by anybody
//! ```
//!
//! Only the `*` condition (allow everything) is understood; finer
//! conditions are rejected at parse time rather than silently granted.

/// What an `allow` statement grants.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadPermissions {
    /// Every upload is allowed.
    pub allow_all: bool,
}

/// Error conditions which may be encountered when parsing an uploaders
/// policy file.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadersError {
    /// A statement wasn't of the `allow <condition> by <who>` form.
    Malformed(String),

    /// A condition other than `*` was used.
    UnsupportedCondition(String),

    /// The `by` clause named something other than `key`, `unsigned` or
    /// `anybody`.
    UnknownGrantee(String),
}
crate::errors::error_enum!(UploadersError);

/// The uploader policy of one distribution.
#[derive(Clone, Debug, Default)]
pub struct Uploaders {
    anybody: Option<UploadPermissions>,
    unsigned: Option<UploadPermissions>,
    by_key: Vec<(String, UploadPermissions)>,
}

// Key identifiers come in different lengths (16 hex key id, 40 hex v4
// fingerprint); compare case-insensitively and let the shorter one act
// as a suffix pattern of the longer.
fn key_matches(pattern: &str, key: &str) -> bool {
    let pattern = pattern.to_ascii_uppercase();
    let key = key.to_ascii_uppercase();
    if pattern.len() <= key.len() {
        key.ends_with(&pattern)
    } else {
        pattern.ends_with(&key)
    }
}

impl Uploaders {
    /// Parse an uploaders policy file.
    pub fn parse(text: &str) -> Result<Self, UploadersError> {
        let mut ret = Uploaders::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let ["allow", condition, "by", grantee @ ..] = words.as_slice() else {
                return Err(UploadersError::Malformed(line.to_owned()));
            };
            if *condition != "*" {
                return Err(UploadersError::UnsupportedCondition(condition.to_string()));
            }
            let permissions = UploadPermissions { allow_all: true };
            match grantee {
                ["anybody"] => ret.anybody = Some(permissions),
                ["unsigned"] => ret.unsigned = Some(permissions),
                ["key", keyid] => ret.by_key.push((keyid.to_string(), permissions)),
                _ => return Err(UploadersError::UnknownGrantee(line.to_owned())),
            }
        }
        Ok(ret)
    }

    /// An [Uploaders] that allows a specific key. Handy for building
    /// policies in code.
    pub fn allowing_key(keyid: &str) -> Self {
        Uploaders {
            by_key: vec![(keyid.to_owned(), UploadPermissions { allow_all: true })],
            ..Default::default()
        }
    }

    /// The permissions applying to an unsigned (or unverifiable) upload.
    pub fn unsigned_permissions(&self) -> Option<&UploadPermissions> {
        self.unsigned.as_ref().or(self.anybody.as_ref())
    }

    /// The permissions applying to an upload signed by `key`.
    pub fn key_permissions(&self, key: &str) -> Option<&UploadPermissions> {
        for (pattern, permissions) in &self.by_key {
            if key_matches(pattern, key) {
                return Some(permissions);
            }
        }
        self.anybody.as_ref()
    }
}


// vim: foldmethod=marker
