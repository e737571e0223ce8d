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

//! The `version` module implements parsing, validation and ordering of
//! Debian package version numbers.

// This is a from-docs implementation of the comparison algorithm described
// in `deb-version(5)`. The upload pipeline needs it twice over: once to
// validate the version grammar of incoming metadata, and once so that
// index backends (and their test stand-ins) can decide whether an upload
// is older than what is already published.

use std::{cmp::Ordering, str::FromStr};

/// Debian package version number, in the form of
/// `[epoch:]upstream-version[-debian-revision]`.
///
/// Ordering follows the `deb-version(5)` algorithm, so `1.0~rc1` sorts
/// before `1.0`, and `2.0.9` before `2.0.10`. Equality is defined through
/// the ordering, not through the spelling: `1.0-0` and `1.00-0` compare
/// equal even though they render differently.
#[derive(Clone, Debug)]
pub struct Version {
    epoch: Option<u64>,
    upstream_version: String,
    debian_revision: Option<String>,
}

/// Error conditions which may be encountered when parsing a String
/// into a [Version].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Error {
    /// Returned when the string provided to [Version] is empty.
    Empty,

    /// The Version had an invalid epoch. An epoch must be a (small)
    /// unsigned integer.
    InvalidEpoch,

    /// The `upstream_version` component of the [Version] is empty.
    NoUpstreamVersion,

    /// The `debian_revision` component of the [Version] is present but
    /// empty (a trailing `-`).
    NoDebianRevision,

    /// The `upstream_version` contains chars which are not permitted.
    InvalidUpstreamVersion,

    /// The `debian_revision` contains chars which are not permitted.
    InvalidDebianRevision,
}
crate::errors::error_enum!(Error);

impl Version {
    /// Epoch of the Version, if one was given.
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Upstream part of the Version.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// Debian revision of the Version, if one was given.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }

    /// Render the Version the way it appears inside file names: without
    /// the epoch. Pool file names never carry the epoch, even though the
    /// index records do.
    pub fn without_epoch(&self) -> String {
        match &self.debian_revision {
            Some(revision) => format!("{}-{}", self.upstream_version, revision),
            None => self.upstream_version.clone(),
        }
    }

    fn check(&self) -> Result<(), Error> {
        if self.upstream_version.is_empty() {
            return Err(Error::NoUpstreamVersion);
        }
        for ch in self.upstream_version.chars() {
            let ok = ch.is_ascii_alphanumeric()
                || ch == '.'
                || ch == '+'
                || ch == '~'
                || (ch == ':' && self.epoch.is_some())
                || (ch == '-' && self.debian_revision.is_some());
            if !ok {
                return Err(Error::InvalidUpstreamVersion);
            }
        }
        if let Some(revision) = &self.debian_revision {
            if revision.is_empty() {
                return Err(Error::NoDebianRevision);
            }
            for ch in revision.chars() {
                if !(ch.is_ascii_alphanumeric() || ch == '.' || ch == '+' || ch == '~') {
                    return Err(Error::InvalidDebianRevision);
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(version: &str) -> Result<Self, Error> {
        if version.is_empty() {
            return Err(Error::Empty);
        }

        let (epoch, rest) = match version.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch.parse::<u64>().map_err(|_| Error::InvalidEpoch)?;
                (Some(epoch), rest)
            }
            None => (None, version),
        };

        let (upstream_version, debian_revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, Some(revision)),
            None => (rest, None),
        };

        let ret = Version {
            epoch,
            upstream_version: upstream_version.to_owned(),
            debian_revision: debian_revision.map(|v| v.to_owned()),
        };
        ret.check()?;
        Ok(ret)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.upstream_version)?;
        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

// `deb-version(5)` assigns every byte a sort weight: the tilde sorts
// before everything (even the end of the string), digits are handled
// numerically elsewhere, letters sort before non-letters.
fn order(ch: u8) -> i64 {
    match ch {
        0 => 0,
        b'~' => -1,
        ch if ch.is_ascii_digit() => 0,
        ch if ch.is_ascii_alphabetic() => ch.into(),
        ch => i64::from(ch) + 256,
    }
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let at = |i: usize| a.get(i).copied().unwrap_or(0);
    let bt = |i: usize| b.get(i).copied().unwrap_or(0);
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // non-digit run, byte by byte
        while (i < a.len() && !at(i).is_ascii_digit()) || (j < b.len() && !bt(j).is_ascii_digit())
        {
            let cmp = order(at(i)).cmp(&order(bt(j)));
            if cmp != Ordering::Equal {
                return cmp;
            }
            i += 1;
            j += 1;
        }

        // digit run, numerically: strip leading zeros, then the first
        // differing digit decides unless one side has more digits left
        while at(i) == b'0' {
            i += 1;
        }
        while bt(j) == b'0' {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while at(i).is_ascii_digit() && bt(j).is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = at(i).cmp(&bt(j));
            }
            i += 1;
            j += 1;
        }
        if at(i).is_ascii_digit() {
            return Ordering::Greater;
        }
        if bt(j).is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let cmp = self.epoch.unwrap_or(0).cmp(&other.epoch.unwrap_or(0));
        if cmp != Ordering::Equal {
            return cmp;
        }
        let cmp = verrevcmp(&self.upstream_version, &other.upstream_version);
        if cmp != Ordering::Equal {
            return cmp;
        }
        verrevcmp(
            self.debian_revision.as_deref().unwrap_or(""),
            other.debian_revision.as_deref().unwrap_or(""),
        )
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}


// vim: foldmethod=marker
