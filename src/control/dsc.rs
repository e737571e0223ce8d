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

//! Parsing of Debian source package description (`.dsc`) files, including
//! their optional OpenPGP clearsign wrapper and checksummed file lists.

use super::{
    changes::ChecksumLine,
    paragraph::Paragraph,
    signed::strip_clearsign,
};
use crate::{
    checksums::{ChecksumError, ChecksumType, Checksums},
    version::Version,
};
use std::path::Path;

/// Error conditions which may be encountered when working with a [Dsc]
/// file.
#[derive(Debug)]
pub enum DscParseError {
    /// Underlying i/o error.
    Io(std::io::Error),

    /// The file wasn't UTF-8 text.
    NotText,

    /// The paragraph structure was broken, or a file line within it was.
    Malformed,

    /// A required field is absent.
    MissingField(&'static str),

    /// The `Version` field doesn't parse.
    InvalidVersion(crate::version::Error),

    /// Two of the file lists disagree on a file's size.
    SizeMismatch,

    /// A digest in one of the file lists was unusable, or disagreed with
    /// one listed earlier.
    InvalidChecksum(ChecksumError),
}
crate::errors::error_enum!(DscParseError);

/// A source package description (a `.dsc` file), reduced to what the
/// upload pipeline needs: the source name and version, the reconciled
/// table of files making up the source package, and the raw paragraph
/// for building the eventual index record from.
///
/// A `.dsc` is usually clearsigned. The signature is *not* checked here;
/// trust in a source upload hangs off the manifest that referenced it,
/// whose digests of this very file have been verified by the time this
/// parser runs.
#[derive(Clone, Debug)]
pub struct Dsc {
    /// Name of the source package.
    pub name: String,

    /// Version of the source package.
    pub version: Version,

    /// The files making up the source package, with every digest the
    /// `.dsc` lists for them. The `.dsc` itself is not in this table;
    /// the pipeline splices it in when computing pool locations.
    pub files: Vec<(String, Checksums)>,

    /// The body paragraph, signature layer removed.
    pub paragraph: Paragraph,
}

impl Dsc {
    /// Read and parse a `.dsc` file from disk.
    pub fn read(path: &Path) -> Result<Self, DscParseError> {
        let raw = std::fs::read(path).map_err(DscParseError::Io)?;
        let text = String::from_utf8(raw).map_err(|_| DscParseError::NotText)?;
        Self::parse(&text)
    }

    /// Parse a `.dsc` from text, clearsigned or not.
    pub fn parse(text: &str) -> Result<Self, DscParseError> {
        let body = strip_clearsign(text).unwrap_or_else(|| text.to_owned());
        let paragraph = Paragraph::parse(&body).map_err(|_| DscParseError::Malformed)?;

        let name = paragraph
            .value("Source")
            .ok_or(DscParseError::MissingField("Source"))?;
        let version: Version = paragraph
            .value("Version")
            .ok_or(DscParseError::MissingField("Version"))?
            .parse()
            .map_err(DscParseError::InvalidVersion)?;

        let mut files: Vec<(String, Checksums)> = vec![];
        let lines = paragraph
            .extra_lines("Files")
            .ok_or(DscParseError::MissingField("Files"))?;
        for line in lines {
            let line: ChecksumLine = line.parse().map_err(|_| DscParseError::Malformed)?;
            let mut checksums = Checksums::new(line.size);
            checksums
                .set(ChecksumType::Md5, &line.digest)
                .map_err(DscParseError::InvalidChecksum)?;
            files.push((line.basename, checksums));
        }
        if files.is_empty() {
            return Err(DscParseError::MissingField("Files"));
        }

        for cs in ChecksumType::EXTENDED {
            let Some(lines) = paragraph.extra_lines(cs.manifest_field()) else {
                continue;
            };
            for line in lines {
                let line: ChecksumLine = line.parse().map_err(|_| DscParseError::Malformed)?;
                let Some((_, checksums)) =
                    files.iter_mut().find(|(basename, _)| *basename == line.basename)
                else {
                    tracing::warn!(file = %line.basename, field = cs.manifest_field(),
                        "ignoring file listed in a checksum field but not in 'Files'");
                    continue;
                };
                if checksums.size() != line.size {
                    return Err(DscParseError::SizeMismatch);
                }
                checksums
                    .set(cs, &line.digest)
                    .map_err(DscParseError::InvalidChecksum)?;
            }
        }

        Ok(Dsc {
            name,
            version,
            files,
            paragraph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const PLAIN: &str = indoc! {"
        Format: 3.0 (quilt)
        Source: bar
        Binary: bar
        Architecture: any
        Version: 1.0-1
        Maintainer: A Maintainer <am@example.org>
        Standards-Version: 4.6.2
        Checksums-Sha256:
         9a271f2a916b0b6ee6cecb2426f0b3206ef074578be55d9bc94f6f3fe3ab86aa 4 bar_1.0.orig.tar.gz
         82e35a63ceba37e9646434c5dd412ea577147f1e4a41ccde1614253187e3dbf9 7 bar_1.0-1.debian.tar.xz
        Files:
         8b1a9953c4611296a827abf8c47804d7 4 bar_1.0.orig.tar.gz
         e807f1fcf82d132f9bb018ca6738a19f 7 bar_1.0-1.debian.tar.xz
    "};

    #[test]
    fn parses_plain() {
        let dsc = Dsc::parse(PLAIN).unwrap();
        assert_eq!("bar", dsc.name);
        assert_eq!("1.0-1", dsc.version.to_string());
        assert_eq!(2, dsc.files.len());

        let (basename, checksums) = &dsc.files[0];
        assert_eq!("bar_1.0.orig.tar.gz", basename);
        assert_eq!(4, checksums.size());
        assert!(checksums.has(ChecksumType::Md5));
        assert!(checksums.has(ChecksumType::Sha256));
        assert!(!checksums.has(ChecksumType::Sha1));
    }

    #[test]
    fn parses_clearsigned() {
        let mut text = String::from("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n");
        text.push_str(PLAIN);
        text.push_str("-----BEGIN PGP SIGNATURE-----\nnotactuallyasignature\n-----END PGP SIGNATURE-----\n");

        let dsc = Dsc::parse(&text).unwrap();
        assert_eq!("bar", dsc.name);
        // the signature armor must not leak into the paragraph
        assert!(dsc.paragraph.value("Hash").is_none());
    }

    #[test]
    fn size_mismatch_is_fatal() {
        let text = PLAIN.replace(
            "9a271f2a916b0b6ee6cecb2426f0b3206ef074578be55d9bc94f6f3fe3ab86aa 4",
            "9a271f2a916b0b6ee6cecb2426f0b3206ef074578be55d9bc94f6f3fe3ab86aa 5",
        );
        assert!(matches!(
            Dsc::parse(&text),
            Err(DscParseError::SizeMismatch)
        ));
    }

    #[test]
    fn unknown_file_in_checksum_list_is_skipped() {
        let text = PLAIN.replace(
            "82e35a63ceba37e9646434c5dd412ea577147f1e4a41ccde1614253187e3dbf9 7 bar_1.0-1.debian.tar.xz",
            "82e35a63ceba37e9646434c5dd412ea577147f1e4a41ccde1614253187e3dbf9 7 bar_9.9.fake.tar.xz",
        );
        let dsc = Dsc::parse(&text).unwrap();
        let (_, checksums) = &dsc.files[1];
        assert!(!checksums.has(ChecksumType::Sha256));
    }

    #[test]
    fn missing_source_field() {
        assert!(matches!(
            Dsc::parse("Version: 1.0\nFiles:\n abc 1 x\n"),
            Err(DscParseError::MissingField("Source"))
        ));
    }
}

// vim: foldmethod=marker
