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

//! The `archive` module describes the archive the incoming queue feeds
//! into: the [Distribution]s packages land in, and the storage backend
//! -- pool, indexes and tracking -- consumed through the [Archive]
//! trait.
//!
//! The backend is a trait because the storage engine is somebody else's
//! problem: the pipeline only needs the handful of operations below, and
//! each of them is expected to be atomic on its own. What the pipeline
//! brings to the table is the dry-run-then-commit discipline layered on
//! top, so that a failing upload never leaves half a package behind.

pub mod binary;
pub mod distribution;
pub mod overrides;
pub mod pool;
pub mod uploaders;

pub use binary::{BinaryReadError, BinaryReader, DebHeaders};
pub use distribution::{Distribution, DistributionOverrides, TrackingPolicy};
pub use overrides::{OverrideEntry, OverrideTable};
pub use uploaders::{UploadPermissions, Uploaders};

use crate::{checksums::Checksums, control::Paragraph, version::Version};
use std::path::Path;

/// The kind of a package record, which selects the index it is published
/// through and the extension of its pool file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PackageKind {
    /// Binary package.
    Deb,

    /// Installer binary package.
    Udeb,

    /// Source package.
    Dsc,
}

impl PackageKind {
    /// File extension for pool files of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            PackageKind::Deb => "deb",
            PackageKind::Udeb => "udeb",
            PackageKind::Dsc => "dsc",
        }
    }
}

/// Answer from [Archive::pool_can_add]: what the pool knows about a
/// filekey.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolAnswer {
    /// Nothing is registered under this filekey; the file has to be
    /// brought in.
    Absent,

    /// A file with exactly these checksums is already registered under
    /// this filekey. Nothing to do but reference it.
    Present,

    /// A *different* file is already registered under this filekey.
    Collision,
}

/// Answer from [Archive::check_add]: whether an index would accept this
/// name and version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckAnswer {
    /// The package can go in.
    Addable,

    /// The index already carries this version (or a newer one, absent
    /// the permit); adding would be a no-op and should be skipped.
    Skip,
}

/// File classes recorded in the tracking database.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackedKind {
    /// Files belonging to a source package.
    Source,

    /// Files belonging to a binary package.
    Binary,

    /// The upload manifest itself.
    Changes,
}

/// Error conditions reported by an [Archive] backend.
#[derive(Debug)]
pub enum ArchiveError {
    /// Underlying i/o error.
    Io(std::io::Error),

    /// Anything else the backend wants to complain about.
    Backend(String),
}
crate::errors::error_enum!(ArchiveError);

/// The storage backend of the archive: a content-addressed pool of
/// files, per-distribution package indexes, and an optional tracking
/// database remembering which files belong to which source upload.
///
/// The original threads a single database handle through every call, and
/// this trait keeps that shape: one object, three groups of operations.
pub trait Archive {
    /// Ask whether `filekey` could be registered with the given
    /// checksums. This must not change anything.
    fn pool_can_add(
        &mut self,
        filekey: &str,
        checksums: &Checksums,
    ) -> Result<PoolAnswer, ArchiveError>;

    /// Hardlink (or copy) `tempfile` into the pool at `filekey` and
    /// register it. Registering a filekey that is already present with
    /// identical content must succeed, since two distributions of one
    /// upload may install the same file.
    fn pool_hardlink_and_add(
        &mut self,
        tempfile: &Path,
        filekey: &str,
        checksums: &Checksums,
    ) -> Result<(), ArchiveError>;

    /// Drop the registration of `filekey` and delete the pool file if
    /// nothing references it anymore.
    fn pool_delete_and_remove(&mut self, filekey: &str) -> Result<(), ArchiveError>;

    /// Dry-run an index addition: would `name` at `version` go into the
    /// index of (`codename`, `component`, `kind`)? `permit_older` makes
    /// an upload older than the published version addable instead of
    /// skipped.
    fn check_add(
        &mut self,
        codename: &str,
        component: &str,
        kind: PackageKind,
        name: &str,
        version: &Version,
        permit_older: bool,
    ) -> Result<CheckAnswer, ArchiveError>;

    /// Add a package record to an index. Each call is its own
    /// transaction: when it returns Ok the record is durable, when it
    /// returns Err nothing changed.
    #[allow(clippy::too_many_arguments)]
    fn add_package(
        &mut self,
        codename: &str,
        component: &str,
        kind: PackageKind,
        name: &str,
        version: &Version,
        control: &Paragraph,
        filekeys: &[String],
    ) -> Result<(), ArchiveError>;

    /// Record that `filekeys` belong to the source package `source` at
    /// `version` within `codename`. Only invoked for distributions whose
    /// [TrackingPolicy] enables tracking; implementations batch rows per
    /// source package.
    fn tracking_add(
        &mut self,
        codename: &str,
        source: &str,
        version: &Version,
        kind: TrackedKind,
        filekeys: &[String],
    ) -> Result<(), ArchiveError>;
}

/// Recipient of the "this upload went in" notification, invoked once per
/// distribution after a successful commit. Typically feeds a mail
/// script or an archive changelog.
pub trait UploadLogger {
    /// An upload was accepted into `codename`.
    #[allow(clippy::too_many_arguments)]
    fn changes_accepted(
        &mut self,
        codename: &str,
        source: &str,
        version: &Version,
        control: &Paragraph,
        changes_path: &Path,
        changes_filekey: Option<&str>,
    );

    /// Block until every queued notification has been delivered. Called
    /// once all manifests of a run have been processed, before the
    /// incoming directory is cleaned.
    fn wait(&mut self) {}
}

// vim: foldmethod=marker
