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

use crate::control::{self, Paragraph};
use std::path::{Path, PathBuf};

/// Things a rule may explicitly permit that would otherwise end a
/// manifest's processing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PermitFlags {
    /// Do not error out on files a manifest lists but no destination
    /// needs.
    pub unused_files: bool,

    /// Let one manifest install into every distribution its
    /// `Distribution` field matches, instead of just the first.
    pub multiple_distributions: bool,

    /// Install an upload even when the destination index already has a
    /// newer version of the package; without this it is skipped.
    pub older_version: bool,
}

/// When files in the incoming directory get deleted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupFlags {
    /// Delete unused files after successfully processing the used ones.
    pub unused_files: bool,

    /// Delete everything a manifest references when it is not accepted.
    pub on_deny: bool,

    /// Reserved: restrict `on_deny` deletion to files owned by the
    /// manifest's owner. Recognized nowhere; the config parser rejects
    /// it, so this is never set.
    pub on_deny_check_owner: bool,

    /// Delete everything a manifest references when an error occurs
    /// after it was accepted.
    pub on_error: bool,
}

/// One incoming rule: which directory to scan, where to stage files,
/// and which distributions uploads may be routed into.
#[derive(Clone, Debug)]
pub struct IncomingRule {
    /// Identifier the rule is selected by.
    pub name: String,

    /// The directory uploads arrive in.
    pub directory: PathBuf,

    /// The staging directory; ideally on the same filesystem as the
    /// pool, so installing can hardlink.
    pub tempdir: PathBuf,

    /// Mapping from the distribution names manifests declare to local
    /// distribution codenames, in match order.
    pub allow: Vec<(String, String)>,

    /// Distribution to try when nothing in `allow` matched.
    pub default_into: Option<String>,

    /// What this rule permits.
    pub permit: PermitFlags,

    /// What this rule cleans up.
    pub cleanup: CleanupFlags,
}

/// Error conditions which may be encountered when parsing an incoming
/// rule file.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleError {
    /// The file isn't made of deb822 paragraphs.
    Parse(control::Error),

    /// A rule is missing one of `Name`, `TempDir` or `IncomingDir`.
    MissingField(&'static str),

    /// Two rules in one file share a `Name`.
    DuplicateName(String),

    /// A `Permit` or `Cleanup` value isn't one this implementation
    /// wires up. The flags the original knew but never implemented
    /// (`downgrade`, `on_deny_check_owner`) land here on purpose.
    UnknownFlag {
        /// Which field the value appeared in.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A boolean field had something other than a truth value.
    BadTruth {
        /// Which field the value appeared in.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A rule has neither `Allow` nor `Default`, so nothing could ever
    /// be let in.
    NothingAllowed(String),

    /// No rule with the requested name exists in the file.
    NotFound(String),
}
crate::errors::error_enum!(RuleError);

fn parse_truth(field: &'static str, value: &str) -> Result<bool, RuleError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(RuleError::BadTruth {
            field,
            value: value.to_owned(),
        }),
    }
}

fn resolve_dir(basedir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        basedir.join(path)
    }
}

impl IncomingRule {
    /// Parse every rule in a rule file. Relative directories resolve
    /// against `basedir`.
    pub fn parse_all(text: &str, basedir: &Path) -> Result<Vec<IncomingRule>, RuleError> {
        let paragraphs = Paragraph::parse_all(text).map_err(RuleError::Parse)?;
        let mut rules: Vec<IncomingRule> = vec![];

        for paragraph in paragraphs {
            let name = paragraph
                .value("Name")
                .ok_or(RuleError::MissingField("Name"))?;
            if rules.iter().any(|rule| rule.name == name) {
                return Err(RuleError::DuplicateName(name));
            }
            let tempdir = paragraph
                .value("TempDir")
                .ok_or(RuleError::MissingField("TempDir"))?;
            let directory = paragraph
                .value("IncomingDir")
                .ok_or(RuleError::MissingField("IncomingDir"))?;

            let allow = paragraph
                .words("Allow")
                .unwrap_or_default()
                .into_iter()
                .map(|word| match word.split_once('|') {
                    Some((upstream, local)) => (upstream.to_owned(), local.to_owned()),
                    None => (word.clone(), word),
                })
                .collect::<Vec<_>>();
            let default_into = paragraph.value("Default");

            let mut permit = PermitFlags::default();
            for word in paragraph.words("Permit").unwrap_or_default() {
                match word.as_str() {
                    "unused_files" => permit.unused_files = true,
                    "older_version" => permit.older_version = true,
                    _ => {
                        return Err(RuleError::UnknownFlag {
                            field: "Permit",
                            value: word,
                        })
                    }
                }
            }
            if let Some(value) = paragraph.value("Multiple") {
                permit.multiple_distributions = parse_truth("Multiple", &value)?;
            }

            let mut cleanup = CleanupFlags::default();
            for word in paragraph.words("Cleanup").unwrap_or_default() {
                match word.as_str() {
                    "unused_files" => cleanup.unused_files = true,
                    "on_deny" => cleanup.on_deny = true,
                    "on_error" => cleanup.on_error = true,
                    _ => {
                        return Err(RuleError::UnknownFlag {
                            field: "Cleanup",
                            value: word,
                        })
                    }
                }
            }

            if allow.is_empty() && default_into.is_none() {
                return Err(RuleError::NothingAllowed(name));
            }

            rules.push(IncomingRule {
                name,
                directory: resolve_dir(basedir, &directory),
                tempdir: resolve_dir(basedir, &tempdir),
                allow,
                default_into,
                permit,
                cleanup,
            });
        }
        Ok(rules)
    }

    /// Parse a rule file and pick out the rule named `name`.
    pub fn parse_named(text: &str, name: &str, basedir: &Path) -> Result<IncomingRule, RuleError> {
        let mut rules = Self::parse_all(text, basedir)?;
        match rules.iter().position(|rule| rule.name == name) {
            Some(idx) => Ok(rules.swap_remove(idx)),
            None => Err(RuleError::NotFound(name.to_owned())),
        }
    }
}


// vim: foldmethod=marker
