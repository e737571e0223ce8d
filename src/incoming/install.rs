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

//! The committing half of accepting a candidate: the check-add dry run
//! across every destination, the hardlink-into-pool phase with its
//! rollback, and the per-distribution index/tracking/logger commit.

use super::{
    candidate::Candidate, IncomingError, IncomingProcessor, IncomingState, IncomingStatus,
};
use crate::{
    archive::{PackageKind, TrackedKind},
    control::changes::FileKind,
    version::Version,
};
use std::collections::HashSet;

impl IncomingProcessor<'_> {
    /// Take a candidate whose destinations have been resolved all the
    /// way to a committed upload (or an error that left no trace).
    pub(crate) fn candidate_add(
        &mut self,
        state: &mut IncomingState,
        candidate: &mut Candidate,
    ) -> Result<IncomingStatus, IncomingError> {
        self.check_architecture_availability(state, candidate)?;

        // when we get here the upload is allowed in; read the parts and
        // check everything we only know now
        self.read_files(state, candidate)?;

        for d_idx in 0..candidate.perdistribution.len() {
            self.prepare_for_distribution(state, candidate, d_idx)?;
        }

        for file in &candidate.files {
            if !file.used && !self.rule.permit.unused_files {
                let changes = state.basename(candidate.ofs);
                let basename = state.basename(file.ofs);
                tracing::error!(changes, file = basename,
                    "manifest lists a file nothing needs (Permit: unused_files to ignore, \
                     Cleanup: unused_files to also delete)");
                return Err(IncomingError::Conflict(format!(
                    "'{}' contains unused file '{}'",
                    changes, basename
                )));
            }
        }

        // two packages producing the same filekey within one
        // distribution would fight over the pool entry
        for per in &candidate.perdistribution {
            let mut seen = HashSet::new();
            for package in &per.packages {
                for filekey in &package.filekeys {
                    if !seen.insert(filekey.as_str()) {
                        return Err(IncomingError::Conflict(format!(
                            "two packages of '{}' both produce '{}'",
                            state.basename(candidate.ofs),
                            filekey
                        )));
                    }
                }
            }
        }

        // additional test run to see if anything could go wrong, or if
        // there are already newer versions
        let mut somethingtodo = false;
        for d_idx in 0..candidate.perdistribution.len() {
            if self.check_add_into(candidate, d_idx)? {
                somethingtodo = true;
            } else {
                candidate.perdistribution[d_idx].skip = true;
            }
        }
        if !somethingtodo {
            tracing::info!(changes = state.basename(candidate.ofs),
                "skipping: all packages are already present");
            for file in &candidate.files {
                if file.used || self.rule.cleanup.unused_files {
                    state.mark_delete(file.ofs);
                }
            }
            return Ok(IncomingStatus::NothingDone);
        }

        self.add_files(candidate)?;
        if self.interrupted() {
            self.remove_files(candidate, None);
            return Err(IncomingError::Interrupted);
        }

        for d_idx in 0..candidate.perdistribution.len() {
            if candidate.perdistribution[d_idx].skip {
                continue;
            }
            self.add_into(state, candidate, d_idx)?;
        }

        for file in &candidate.files {
            if file.used || self.rule.cleanup.unused_files {
                state.mark_delete(file.ofs);
            }
        }
        Ok(IncomingStatus::Accepted)
    }

    // Dry-run one distribution. Returns whether anything would be done;
    // packages already present get their skip flag.
    fn check_add_into(
        &mut self,
        candidate: &mut Candidate,
        d_idx: usize,
    ) -> Result<bool, IncomingError> {
        let distributions = self.distributions;
        let into = &distributions[candidate.perdistribution[d_idx].into];
        let permit_older = self.rule.permit.older_version;
        let mut somethingtodo = false;

        for p_idx in 0..candidate.perdistribution[d_idx].packages.len() {
            let Some((kind, name, version, component)) =
                package_identity(candidate, d_idx, p_idx)?
            else {
                continue;
            };
            match self
                .archive
                .check_add(&into.codename, &component, kind, &name, &version, permit_older)?
            {
                crate::archive::CheckAnswer::Addable => somethingtodo = true,
                crate::archive::CheckAnswer::Skip => {
                    candidate.perdistribution[d_idx].packages[p_idx].skip = true;
                }
            }
        }
        Ok(somethingtodo)
    }

    // Hardlink every staged file into the pool. On failure everything
    // added so far -- across all distributions -- is taken out again.
    fn add_files(&mut self, candidate: &Candidate) -> Result<(), IncomingError> {
        for (d_idx, per) in candidate.perdistribution.iter().enumerate() {
            if per.skip {
                continue;
            }
            for (p_idx, package) in per.packages.iter().enumerate() {
                if package.skip {
                    continue;
                }
                for (k, filekey) in package.filekeys.iter().enumerate() {
                    let Some(f_idx) = package.files[k] else {
                        continue;
                    };
                    let file = &candidate.files[f_idx];
                    let (Some(temp), Some(checksums)) = (&file.temp, &file.checksums) else {
                        return Err(IncomingError::Malformed(format!(
                            "'{}' was never staged",
                            filekey
                        )));
                    };
                    if let Err(err) =
                        self.archive
                            .pool_hardlink_and_add(temp.path(), filekey, checksums)
                    {
                        // the failing filekey was not added, so it is
                        // not taken out either
                        self.remove_files(candidate, Some((d_idx, p_idx, k)));
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(())
    }

    // Take pool entries out again, in the same order they went in,
    // stopping (exclusively) at `stop`.
    pub(crate) fn remove_files(
        &mut self,
        candidate: &Candidate,
        stop: Option<(usize, usize, usize)>,
    ) {
        for (d_idx, per) in candidate.perdistribution.iter().enumerate() {
            if per.skip {
                continue;
            }
            for (p_idx, package) in per.packages.iter().enumerate() {
                if package.skip {
                    continue;
                }
                for (k, filekey) in package.filekeys.iter().enumerate() {
                    if let Some((sd, sp, sk)) = stop {
                        if d_idx == sd && p_idx == sp && k >= sk {
                            return;
                        }
                    }
                    if package.files[k].is_none() {
                        continue;
                    }
                    if let Err(err) = self.archive.pool_delete_and_remove(filekey) {
                        tracing::warn!(%filekey, error = %err,
                            "could not take file back out of the pool");
                    }
                }
            }
        }
    }

    // Take out the pool entries of every package from `from` onward --
    // the ones whose index additions have not been committed.
    fn remove_files_from(&mut self, candidate: &Candidate, from: (usize, usize)) {
        for (d_idx, per) in candidate.perdistribution.iter().enumerate() {
            if per.skip {
                continue;
            }
            for (p_idx, package) in per.packages.iter().enumerate() {
                if package.skip {
                    continue;
                }
                if d_idx < from.0 || (d_idx == from.0 && p_idx < from.1) {
                    continue;
                }
                for (k, filekey) in package.filekeys.iter().enumerate() {
                    if package.files[k].is_none() {
                        continue;
                    }
                    if let Err(err) = self.archive.pool_delete_and_remove(filekey) {
                        tracing::warn!(%filekey, error = %err,
                            "could not take file back out of the pool");
                    }
                }
            }
        }
    }

    // Commit one distribution: index records, tracking rows, logger.
    fn add_into(
        &mut self,
        state: &IncomingState,
        candidate: &mut Candidate,
        d_idx: usize,
    ) -> Result<(), IncomingError> {
        if self.interrupted() {
            self.remove_files_from(candidate, (d_idx, 0));
            return Err(IncomingError::Interrupted);
        }

        let distributions = self.distributions;
        let into = &distributions[candidate.perdistribution[d_idx].into];
        let tracking = into.tracking.enabled;
        let mut changes_filekey: Option<String> = None;

        for p_idx in 0..candidate.perdistribution[d_idx].packages.len() {
            let (master, skip) = {
                let package = &candidate.perdistribution[d_idx].packages[p_idx];
                (package.master, package.skip)
            };
            if skip {
                tracing::info!(
                    file = state.basename(candidate.files[master].ofs),
                    codename = %into.codename,
                    "not installing: already present with an equal or newer version"
                );
                continue;
            }

            let result = match candidate.files[master].kind {
                FileKind::Changes => {
                    let package = &candidate.perdistribution[d_idx].packages[p_idx];
                    let mut result = Ok(());
                    if tracking {
                        result = self.archive.tracking_add(
                            &into.codename,
                            &candidate.source,
                            &candidate.sourceversion,
                            TrackedKind::Changes,
                            &package.filekeys,
                        );
                    }
                    if result.is_ok() {
                        changes_filekey = package.filekeys.first().cloned();
                    }
                    result
                }
                kind => {
                    let package = &candidate.perdistribution[d_idx].packages[p_idx];
                    let (Some(component), Some(control)) =
                        (&package.component, &package.control)
                    else {
                        return Err(IncomingError::Malformed(format!(
                            "package of '{}' was never prepared",
                            state.basename(candidate.ofs)
                        )));
                    };
                    let identity: Option<(PackageKind, &str, &Version, TrackedKind)> = match kind {
                        FileKind::Dsc => candidate.files[master].dsc.as_ref().map(|dsc| {
                            (PackageKind::Dsc, dsc.name.as_str(), &dsc.version, TrackedKind::Source)
                        }),
                        FileKind::Deb => candidate.files[master].deb.as_ref().map(|deb| {
                            (PackageKind::Deb, deb.name.as_str(), &deb.version, TrackedKind::Binary)
                        }),
                        FileKind::Udeb => candidate.files[master].deb.as_ref().map(|deb| {
                            (PackageKind::Udeb, deb.name.as_str(), &deb.version, TrackedKind::Binary)
                        }),
                        _ => None,
                    };
                    let Some((kind, name, version, tracked)) = identity else {
                        return Err(IncomingError::Malformed(format!(
                            "package of '{}' was never read",
                            state.basename(candidate.ofs)
                        )));
                    };
                    let mut result = self.archive.add_package(
                        &into.codename,
                        component,
                        kind,
                        name,
                        version,
                        control,
                        &package.filekeys,
                    );
                    if result.is_ok() && tracking {
                        result = self.archive.tracking_add(
                            &into.codename,
                            &candidate.source,
                            &candidate.sourceversion,
                            tracked,
                            &package.filekeys,
                        );
                    }
                    result
                }
            };

            if let Err(err) = result {
                self.remove_files_from(candidate, (d_idx, p_idx));
                return Err(err.into());
            }
        }

        let Some(temp) = &candidate.files[0].temp else {
            return Err(IncomingError::Malformed(format!(
                "'{}' was never staged",
                state.basename(candidate.ofs)
            )));
        };
        self.logger.changes_accepted(
            &into.codename,
            &candidate.source,
            &candidate.changesversion,
            &candidate.control,
            temp.path(),
            changes_filekey.as_deref(),
        );
        Ok(())
    }
}

// Kind, name, version and component of one real package; [None] for the
// manifest pseudo-package, which no index ever sees.
fn package_identity(
    candidate: &Candidate,
    d_idx: usize,
    p_idx: usize,
) -> Result<Option<(PackageKind, String, Version, String)>, IncomingError> {
    let package = &candidate.perdistribution[d_idx].packages[p_idx];
    let file = &candidate.files[package.master];
    let identity = match file.kind {
        FileKind::Dsc => file
            .dsc
            .as_ref()
            .map(|dsc| (PackageKind::Dsc, dsc.name.clone(), dsc.version.clone())),
        FileKind::Deb => file
            .deb
            .as_ref()
            .map(|deb| (PackageKind::Deb, deb.name.clone(), deb.version.clone())),
        FileKind::Udeb => file
            .deb
            .as_ref()
            .map(|deb| (PackageKind::Udeb, deb.name.clone(), deb.version.clone())),
        _ => return Ok(None),
    };
    let Some((kind, name, version)) = identity else {
        return Err(IncomingError::Malformed(
            "package was never read".to_owned(),
        ));
    };
    let Some(component) = package.component.clone() else {
        return Err(IncomingError::Malformed(
            "package was never prepared".to_owned(),
        ));
    };
    Ok(Some((kind, name, version, component)))
}

// vim: foldmethod=marker
