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

//! Reading of `.deb` binary package archives and their embedded control
//! metadata.

use crate::{
    control::{names, Paragraph},
    version::Version,
};
use std::path::Path;

/// Error conditions which may be encountered when reading the control
/// headers out of a binary package.
#[derive(Debug)]
pub enum BinaryReadError {
    /// Underlying i/o error.
    Io(std::io::Error),

    /// The file isn't a readable binary package.
    Malformed,

    /// The control paragraph lacks a required field.
    MissingField(&'static str),

    /// A version field doesn't parse.
    InvalidVersion(crate::version::Error),

    /// The `Source` field is garbled.
    InvalidSource,
}
crate::errors::error_enum!(BinaryReadError);

/// The headers of one binary package, as far as the upload pipeline
/// cares: identity, provenance and the full control paragraph the index
/// record is built from.
#[derive(Clone, Debug)]
pub struct DebHeaders {
    /// Binary package name.
    pub name: String,

    /// Binary package version.
    pub version: Version,

    /// Name of the source package this binary was built from. Defaults
    /// to the binary name when the control paragraph doesn't say.
    pub source: String,

    /// Version of that source package. Differs from `version` for
    /// binary-only rebuilds.
    pub source_version: Version,

    /// Architecture the binary was built for.
    pub architecture: String,

    /// Declared section, if any.
    pub section: Option<String>,

    /// Declared priority, if any.
    pub priority: Option<String>,

    /// The whole control paragraph.
    pub control: Paragraph,
}

impl DebHeaders {
    /// Extract [DebHeaders] from a control paragraph. The `Source` field
    /// may carry a version in parentheses; absent pieces default to the
    /// binary's own name and version.
    pub fn from_control(control: Paragraph) -> Result<Self, BinaryReadError> {
        let name = control
            .value("Package")
            .ok_or(BinaryReadError::MissingField("Package"))?;
        let version: Version = control
            .value("Version")
            .ok_or(BinaryReadError::MissingField("Version"))?
            .parse()
            .map_err(BinaryReadError::InvalidVersion)?;
        let architecture = control
            .value("Architecture")
            .ok_or(BinaryReadError::MissingField("Architecture"))?;

        let (source, source_version) = match control.value("Source") {
            Some(value) => {
                let (source, source_version) = names::split_name_and_version(&value)
                    .map_err(|_| BinaryReadError::InvalidSource)?;
                let source_version = match source_version {
                    Some(raw) => raw.parse().map_err(BinaryReadError::InvalidVersion)?,
                    None => version.clone(),
                };
                (source.to_owned(), source_version)
            }
            None => (name.clone(), version.clone()),
        };

        Ok(DebHeaders {
            name,
            version,
            source,
            source_version,
            architecture,
            section: control.value("Section"),
            priority: control.value("Priority"),
            control,
        })
    }
}

/// Something that can pull the control headers out of a `.deb` or
/// `.udeb` on disk. The actual ar/tar unpacking lives behind this trait;
/// the pipeline only consumes the result.
pub trait BinaryReader {
    /// Read the control headers of the binary package at `path`.
    fn deb_headers(&self, path: &Path) -> Result<DebHeaders, BinaryReadError>;
}


// vim: foldmethod=marker
