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

//! Parsing for the pieces of an upload manifest (a `.changes` file) that
//! describe the uploaded files themselves: the `Files` list, the
//! `Checksums-*` lists, and the naming convention the listed files
//! follow.

use std::str::FromStr;

/// Error conditions which may be encountered when parsing the file lists
/// of a `.changes` file.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ChangesParseError {
    /// A file line didn't have the expected number of fields, or a file
    /// name didn't follow the `name_version_architecture` convention its
    /// extension demands.
    Malformed,

    /// A file size wasn't a number.
    InvalidSize,
}
crate::errors::error_enum!(ChangesParseError);

/// What kind of thing one file of an upload is, going by its name and,
/// for byhand files, its declared section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// The upload manifest itself. Always the first file of a candidate,
    /// never listed inside its own `Files` field.
    Changes,

    /// A binary package.
    Deb,

    /// A binary package destined for the installer.
    Udeb,

    /// A source package description.
    Dsc,

    /// A file marked for manual handling. The pipeline stages nothing and
    /// installs nothing for these.
    Byhand,

    /// Anything else -- source tarballs, diffs, buildinfo files. These
    /// only get staged when a source package pulls them in.
    Unknown,
}

impl FileKind {
    /// True for the file kinds that turn into a package of their own.
    pub fn is_package(&self) -> bool {
        matches!(self, FileKind::Deb | FileKind::Udeb | FileKind::Dsc)
    }

    /// True for binary packages.
    pub fn is_binary(&self) -> bool {
        matches!(self, FileKind::Deb | FileKind::Udeb)
    }
}

/// Name parts carried by a file's name. Binary packages are named
/// `name_version_architecture.deb`; source descriptions
/// `name_version.dsc`.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMeta {
    /// What the name looks like.
    pub kind: FileKind,

    /// Leading name part, if the name follows the underscore convention.
    pub name: Option<String>,

    /// Architecture part for binary packages; `source` for source
    /// descriptions.
    pub architecture: Option<String>,
}

/// Classify a file by its basename.
///
/// Binary and source-description names must follow their naming
/// convention; anything with an unrecognized extension is
/// [FileKind::Unknown] and passes through unparsed.
pub fn classify_basename(basename: &str) -> Result<FileMeta, ChangesParseError> {
    // `.udeb` first: every `.udeb` name also ends in `.deb`
    if let Some(stem) = basename
        .strip_suffix(".udeb")
        .or_else(|| basename.strip_suffix(".deb"))
    {
        let kind = if basename.ends_with(".udeb") {
            FileKind::Udeb
        } else {
            FileKind::Deb
        };
        let [name, _version, architecture]: [&str; 3] = stem
            .split('_')
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| ChangesParseError::Malformed)?;
        if name.is_empty() || architecture.is_empty() {
            return Err(ChangesParseError::Malformed);
        }
        return Ok(FileMeta {
            kind,
            name: Some(name.to_owned()),
            architecture: Some(architecture.to_owned()),
        });
    }

    if let Some(stem) = basename.strip_suffix(".dsc") {
        let Some((name, _version)) = stem.split_once('_') else {
            return Err(ChangesParseError::Malformed);
        };
        if name.is_empty() {
            return Err(ChangesParseError::Malformed);
        }
        return Ok(FileMeta {
            kind: FileKind::Dsc,
            name: Some(name.to_owned()),
            architecture: Some("source".to_owned()),
        });
    }

    Ok(FileMeta {
        kind: FileKind::Unknown,
        name: basename.split('_').next().map(str::to_owned),
        architecture: None,
    })
}

/// One line of the primary `Files` field: md5, size, section, priority
/// and the file name.
#[derive(Clone, Debug, PartialEq)]
pub struct FileLine {
    /// MD5 digest as listed.
    pub md5: String,

    /// File size, in bytes, as listed.
    pub size: u64,

    /// Section the file is targeted for. May be `-`, and may be `byhand`.
    pub section: String,

    /// Priority of the file. May be `-`.
    pub priority: String,

    /// Name of the file, relative to the manifest.
    pub basename: String,
}

impl FromStr for FileLine {
    type Err = ChangesParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let [md5, size, section, priority, basename] = line
            .split_whitespace()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| ChangesParseError::Malformed)?;

        Ok(FileLine {
            md5: md5.to_owned(),
            size: size.parse().map_err(|_| ChangesParseError::InvalidSize)?,
            section: section.to_owned(),
            priority: priority.to_owned(),
            basename: basename.to_owned(),
        })
    }
}

/// One line of a `Checksums-*` field (or of the `Files` field of a
/// `.dsc`): digest, size and the file name.
#[derive(Clone, Debug, PartialEq)]
pub struct ChecksumLine {
    /// Digest as listed; the algorithm comes from the field the line
    /// lives in.
    pub digest: String,

    /// File size, in bytes, as listed.
    pub size: u64,

    /// Name of the file.
    pub basename: String,
}

impl FromStr for ChecksumLine {
    type Err = ChangesParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let [digest, size, basename] = line
            .split_whitespace()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| ChangesParseError::Malformed)?;

        Ok(ChecksumLine {
            digest: digest.to_owned(),
            size: size.parse().map_err(|_| ChangesParseError::InvalidSize)?,
            basename: basename.to_owned(),
        })
    }
}

/// The conventional basename under which a manifest itself is kept when a
/// distribution tracks uploads: `source_version_arch1[+arch2...].changes`.
pub fn changes_basename(source: &str, version: &str, architectures: &[String]) -> String {
    format!("{}_{}_{}.changes", source, version, architectures.join("+"))
}


// vim: foldmethod=marker
