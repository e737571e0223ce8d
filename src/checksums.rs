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

//! The `checksums` module tracks file digests across every algorithm the
//! archive understands.
//!
//! Upload metadata routinely describes the same file several times over --
//! the `Files` field carries an md5, the `Checksums-Sha1` and
//! `Checksums-Sha256` fields carry stronger digests, and a `.dsc` repeats
//! the game for the source files it ships. A [Checksums] value is the merged
//! view of all of that: digests may be *added* as more metadata is read, but
//! a digest that is already known can never be replaced by a disagreeing
//! one.

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

/// Digest algorithms understood by the archive.
///
/// The set is a closed enumeration so that a [Checksums] can keep one
/// array slot per algorithm, which keeps merging O(algorithms).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChecksumType {
    /// MD5. Antiquated, but the primary file list of an upload manifest
    /// is still keyed on it.
    Md5,

    /// SHA-1. Mostly broken, carried for compatibility.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// All supported algorithms, in manifest field order.
    pub const ALL: [ChecksumType; 3] = [ChecksumType::Md5, ChecksumType::Sha1, ChecksumType::Sha256];

    /// Algorithms beyond the primary md5 list, i.e. those with their own
    /// `Checksums-*` field in upload metadata.
    pub const EXTENDED: [ChecksumType; 2] = [ChecksumType::Sha1, ChecksumType::Sha256];

    /// Name of the field carrying this digest in a `.changes` or `.dsc`
    /// paragraph.
    pub fn manifest_field(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "Files",
            ChecksumType::Sha1 => "Checksums-Sha1",
            ChecksumType::Sha256 => "Checksums-Sha256",
        }
    }

    /// Name of the field carrying this digest in a binary index record.
    pub fn index_field(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "MD5sum",
            ChecksumType::Sha1 => "SHA1",
            ChecksumType::Sha256 => "SHA256",
        }
    }

    /// Length of this digest as ASCII hex.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumType::Md5 => 32,
            ChecksumType::Sha1 => 40,
            ChecksumType::Sha256 => 64,
        }
    }

    fn slot(self) -> usize {
        match self {
            ChecksumType::Md5 => 0,
            ChecksumType::Sha1 => 1,
            ChecksumType::Sha256 => 2,
        }
    }
}

/// Error conditions which may be encountered when working with a
/// [Checksums].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ChecksumError {
    /// A digest string was empty.
    Empty,

    /// A digest string was of the wrong length for its algorithm. Digests
    /// are ASCII encoded hex, exactly twice the raw hash length.
    BadLength,

    /// A digest string contained something that isn't hex.
    InvalidEncoding,

    /// Two descriptions of the same file disagree -- on the size, or on
    /// the digest of an algorithm both of them carry.
    Disagreement,
}
crate::errors::error_enum!(ChecksumError);

/// Size plus the known digests of one file.
#[derive(Clone, Debug, PartialEq)]
pub struct Checksums {
    size: u64,
    digests: [Option<String>; 3],
}

impl Checksums {
    /// A [Checksums] knowing only the file size.
    pub fn new(size: u64) -> Self {
        Checksums {
            size,
            digests: [None, None, None],
        }
    }

    /// File size, in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Digest for the given algorithm, as lowercase ASCII hex, if known.
    pub fn digest(&self, cs: ChecksumType) -> Option<&str> {
        self.digests[cs.slot()].as_deref()
    }

    /// True if a digest for the given algorithm is known.
    pub fn has(&self, cs: ChecksumType) -> bool {
        self.digests[cs.slot()].is_some()
    }

    /// True if a digest is known for every supported algorithm.
    pub fn is_complete(&self) -> bool {
        self.digests.iter().all(|digest| digest.is_some())
    }

    /// Record a digest. Setting an algorithm that is already known is only
    /// permitted when the value agrees; anything else is a
    /// [ChecksumError::Disagreement].
    pub fn set(&mut self, cs: ChecksumType, digest: &str) -> Result<(), ChecksumError> {
        if digest.is_empty() {
            return Err(ChecksumError::Empty);
        }
        if digest.len() != cs.hex_len() {
            return Err(ChecksumError::BadLength);
        }
        if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChecksumError::InvalidEncoding);
        }
        let digest = digest.to_ascii_lowercase();
        match &self.digests[cs.slot()] {
            Some(known) if *known != digest => Err(ChecksumError::Disagreement),
            Some(_) => Ok(()),
            None => {
                self.digests[cs.slot()] = Some(digest);
                Ok(())
            }
        }
    }

    /// Compare against another description of (supposedly) the same file.
    ///
    /// Returns whether `other` would improve us -- that is, whether it
    /// knows at least one algorithm we don't. A size mismatch, or a
    /// mismatch on any algorithm known to both sides, is a
    /// [ChecksumError::Disagreement].
    pub fn check(&self, other: &Checksums) -> Result<bool, ChecksumError> {
        if self.size != other.size {
            return Err(ChecksumError::Disagreement);
        }
        let mut improves = false;
        for cs in ChecksumType::ALL {
            match (self.digest(cs), other.digest(cs)) {
                (Some(ours), Some(theirs)) if ours != theirs => {
                    return Err(ChecksumError::Disagreement);
                }
                (None, Some(_)) => improves = true,
                _ => {}
            }
        }
        Ok(improves)
    }

    /// Merge in the algorithms `other` knows and we don't, after checking
    /// agreement on everything shared. Returns whether anything was added.
    /// Merging is monotone: an algorithm, once known, is never dropped or
    /// replaced.
    pub fn combine(&mut self, other: &Checksums) -> Result<bool, ChecksumError> {
        let improves = self.check(other)?;
        if improves {
            for cs in ChecksumType::ALL {
                if !self.has(cs) {
                    if let Some(theirs) = other.digest(cs) {
                        self.digests[cs.slot()] = Some(theirs.to_owned());
                    }
                }
            }
        }
        Ok(improves)
    }
}

/// Copy `src` to `dst`, computing every supported digest in the same
/// single pass over the data. Returns the complete [Checksums] of the
/// copied content.
pub fn copy_and_digest(src: &Path, dst: &Path) -> Result<Checksums, std::io::Error> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dst)?;

    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut size: u64 = 0;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        writer.write_all(chunk)?;
        size += n as u64;
    }
    writer.sync_all()?;

    let mut ret = Checksums::new(size);
    for (cs, digest) in [
        (ChecksumType::Md5, hex::encode(md5.finalize())),
        (ChecksumType::Sha1, hex::encode(sha1.finalize())),
        (ChecksumType::Sha256, hex::encode(sha256.finalize())),
    ] {
        // lengths and encoding are ours, this can not fail
        let _ = ret.set(cs, &digest);
    }
    Ok(ret)
}


// vim: foldmethod=marker
