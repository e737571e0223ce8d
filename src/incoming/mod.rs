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

//! The `incoming` module is the heart of the crate: the state machine
//! that turns a directory of submitted uploads into committed archive
//! changes.
//!
//! For every `.changes` file in the incoming directory, the
//! [IncomingProcessor]:
//!
//! 1. stages the manifest, reads its signature layer and parses it,
//! 2. resolves destination distributions from the rule's `Allow` table
//!    and checks the signer against each destination's uploader policy,
//! 3. stages every referenced package file, reconciling declared and
//!    computed checksums,
//! 4. builds one install plan per destination: components, pool
//!    filekeys, rewritten index records, pool deduplication,
//! 5. dry-runs every index addition, then commits: hardlinks into the
//!    pool, adds index records, updates tracking, notifies the logger,
//! 6. marks files for deletion according to the rule's cleanup policy.
//!
//! One manifest failing doesn't end the run; staged temp copies are
//! removed on every exit path; and a failure during commit rolls the
//! pool back so a rejected upload leaves no trace.

mod candidate;
mod install;
mod permissions;
mod prepare;
mod rule;
mod state;

pub use rule::{CleanupFlags, IncomingRule, PermitFlags, RuleError};
pub use state::IncomingState;

use crate::{
    archive::{distribution, Archive, ArchiveError, BinaryReadError, BinaryReader, Distribution, UploadLogger},
    control::{dsc::DscParseError, signed::SignedReadError, signed::SignedReader},
};
use candidate::UnparsedCandidate;
use std::sync::atomic::{AtomicBool, Ordering};

const CHANGES_SUFFIX: &str = ".changes";

/// What processing an incoming queue (or a single manifest) amounted
/// to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IncomingStatus {
    /// At least one upload was committed.
    Accepted,

    /// Everything was already there, or there was nothing to look at.
    NothingDone,
}

/// Error conditions which may end the processing of a manifest (or of
/// the whole queue).
#[derive(Debug)]
pub enum IncomingError {
    /// Underlying i/o error.
    Io(std::io::Error),

    /// The signature layer of a manifest couldn't be read at all.
    Signature(SignedReadError),

    /// Bad manifest content: missing fields, grammar violations, broken
    /// file lists, 8-bit file names, or a manifest carrying only
    /// invalid signatures.
    Malformed(String),

    /// Two descriptions of a file disagree, or a staged file doesn't
    /// match what its manifest declares. Carries the offending basename
    /// or filekey.
    ChecksumMismatch(String),

    /// A file the manifest references is nowhere to be found. Carries
    /// the basename.
    Missing(String),

    /// No destination distribution would accept the upload. Carries the
    /// manifest basename.
    PermissionDenied(String),

    /// Archive policy stands in the way: architectures no destination
    /// carries, components a file may not go to, unused files, or two
    /// packages fighting over one filekey.
    Conflict(String),

    /// The interrupt flag was raised; the in-flight commit has been
    /// rolled back.
    Interrupted,

    /// The pool, index or tracking backend failed.
    Backend(ArchiveError),
}
crate::errors::error_enum!(IncomingError);

impl From<std::io::Error> for IncomingError {
    fn from(err: std::io::Error) -> Self {
        IncomingError::Io(err)
    }
}

impl From<SignedReadError> for IncomingError {
    fn from(err: SignedReadError) -> Self {
        IncomingError::Signature(err)
    }
}

impl From<ArchiveError> for IncomingError {
    fn from(err: ArchiveError) -> Self {
        IncomingError::Backend(err)
    }
}

impl From<BinaryReadError> for IncomingError {
    fn from(err: BinaryReadError) -> Self {
        match err {
            BinaryReadError::Io(err) => IncomingError::Io(err),
            err => IncomingError::Malformed(err.to_string()),
        }
    }
}

impl From<DscParseError> for IncomingError {
    fn from(err: DscParseError) -> Self {
        match err {
            DscParseError::Io(err) => IncomingError::Io(err),
            DscParseError::SizeMismatch | DscParseError::InvalidChecksum(_) => {
                IncomingError::ChecksumMismatch(err.to_string())
            }
            err => IncomingError::Malformed(err.to_string()),
        }
    }
}

/// The incoming queue processor: one rule, one set of configured
/// distributions, and the collaborators everything is committed
/// through.
pub struct IncomingProcessor<'a> {
    rule: &'a IncomingRule,
    distributions: &'a [Distribution],
    archive: &'a mut dyn Archive,
    binaries: &'a dyn BinaryReader,
    signatures: &'a dyn SignedReader,
    logger: &'a mut dyn UploadLogger,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> IncomingProcessor<'a> {
    /// Wire up a processor.
    pub fn new(
        rule: &'a IncomingRule,
        distributions: &'a [Distribution],
        archive: &'a mut dyn Archive,
        binaries: &'a dyn BinaryReader,
        signatures: &'a dyn SignedReader,
        logger: &'a mut dyn UploadLogger,
    ) -> Self {
        IncomingProcessor {
            rule,
            distributions,
            archive,
            binaries,
            signatures,
            logger,
            interrupt: None,
        }
    }

    /// Watch `flag`; when it goes true, commits are cut short (with
    /// rollback) at the next boundary and processing ends with
    /// [IncomingError::Interrupted].
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Process the rule's incoming directory: every `.changes` file, or
    /// just the one named by `only`. Manifests fail independently; the
    /// last failure is reported after the whole directory has been
    /// worked through and marked files have been deleted.
    pub fn process(&mut self, only: Option<&str>) -> Result<IncomingStatus, IncomingError> {
        for target in self
            .rule
            .allow
            .iter()
            .map(|(_, target)| target)
            .chain(self.rule.default_into.as_ref())
        {
            if distribution::find(self.distributions, target).is_none() {
                return Err(IncomingError::Conflict(format!(
                    "rule '{}' references unknown distribution '{}'",
                    self.rule.name, target
                )));
            }
        }

        let mut state = IncomingState::open(self.rule)?;
        let mut status = IncomingStatus::NothingDone;
        let mut failure = None;

        for ofs in 0..state.files().len() {
            let basename = state.basename(ofs);
            if !basename.ends_with(CHANGES_SUFFIX) || basename.len() <= CHANGES_SUFFIX.len() {
                continue;
            }
            if only.is_some_and(|name| name != basename) {
                continue;
            }
            let basename = basename.to_owned();
            match self.process_changes(&mut state, ofs) {
                Ok(IncomingStatus::Accepted) => status = IncomingStatus::Accepted,
                Ok(IncomingStatus::NothingDone) => {}
                Err(err) => {
                    tracing::error!(changes = %basename, error = %err,
                        "processing failed");
                    failure = Some(err);
                }
            }
        }

        self.logger.wait();
        state.delete_marked(self.rule);

        match failure {
            Some(err) => Err(err),
            None => Ok(status),
        }
    }

    fn process_changes(
        &mut self,
        state: &mut IncomingState,
        ofs: usize,
    ) -> Result<IncomingStatus, IncomingError> {
        let unparsed = UnparsedCandidate::read(state, self.rule, ofs, self.signatures)?;
        let broken = unparsed.broken;
        let mut candidate = unparsed.parse(state)?;
        candidate.early_checks(state)?;

        self.resolve_destinations(state, &mut candidate)?;

        let result = if broken {
            tracing::error!(changes = state.basename(ofs),
                "manifest is signed with only invalid signatures; if this was not \
                 corruption but willful modification, remove the signatures and try again");
            Err(IncomingError::Malformed(format!(
                "'{}' is signed with only invalid signatures",
                state.basename(ofs)
            )))
        } else {
            self.candidate_add(state, &mut candidate)
        };

        if result.is_err() && self.rule.cleanup.on_error {
            state.mark_delete(candidate.ofs);
            for file in &candidate.files {
                state.mark_delete(file.ofs);
            }
        }
        self.logger.wait();
        state.mark_processed(ofs);
        result
    }
}

// vim: foldmethod=marker
