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

//! The preparation half of accepting a candidate: reading the staged
//! package files, and turning every (file, distribution) pair into a
//! [CandidatePackage] with its component, pool filekeys and rewritten
//! index record.

use super::{
    candidate::{stage_file, Candidate, CandidatePackage},
    IncomingError, IncomingProcessor, IncomingState,
};
use crate::{
    archive::{pool, PackageKind, PoolAnswer},
    checksums::{ChecksumType, Checksums},
    control::{changes::changes_basename, changes::FileKind, dsc::Dsc, names},
};

fn resolve_field(
    what: &str,
    overridden: Option<String>,
    declared: Option<&str>,
    package: &str,
) -> Result<String, IncomingError> {
    match overridden.or_else(|| declared.map(str::to_owned)) {
        Some(value) if value != "-" => Ok(value),
        _ => Err(IncomingError::Malformed(format!(
            "no {} found for '{}'",
            what, package
        ))),
    }
}

impl IncomingProcessor<'_> {
    /// Every architecture the manifest claims must be carried by every
    /// destination, and an `all`-only upload needs at least one
    /// destination binary architecture to land on.
    pub(crate) fn check_architecture_availability(
        &self,
        state: &IncomingState,
        candidate: &Candidate,
    ) -> Result<(), IncomingError> {
        let distributions = self.distributions;
        let changes = state.basename(candidate.ofs);
        let mut check_all = false;
        let mut have_binary = false;

        for architecture in &candidate.architectures {
            if architecture == "all" {
                check_all = true;
                continue;
            }
            for per in &candidate.perdistribution {
                let into = &distributions[per.into];
                if into.architectures.iter().any(|a| a == architecture) {
                    continue;
                }
                tracing::error!(changes, %architecture, codename = %into.codename,
                    "architecture not found in destination distribution");
                return Err(IncomingError::Conflict(format!(
                    "'{}' lists architecture '{}' not found in distribution '{}'",
                    changes, architecture, into.codename
                )));
            }
            if architecture != "source" {
                have_binary = true;
            }
        }

        if check_all && !have_binary {
            for per in &candidate.perdistribution {
                let into = &distributions[per.into];
                if into.architectures.iter().any(|a| a != "source") {
                    continue;
                }
                return Err(IncomingError::Conflict(format!(
                    "'{}' lists architecture 'all' but no binary architecture found in distribution '{}'",
                    changes, into.codename
                )));
            }
        }
        Ok(())
    }

    /// Stage and read every package file of the candidate: binaries get
    /// their headers pulled and cross-checked against the manifest,
    /// source descriptions get parsed and spliced into their own file
    /// list.
    pub(crate) fn read_files(
        &self,
        state: &IncomingState,
        candidate: &mut Candidate,
    ) -> Result<(), IncomingError> {
        let changes = state.basename(candidate.ofs).to_owned();
        for idx in 1..candidate.files.len() {
            if candidate.files[idx].section.as_deref() == Some("byhand") {
                // spares every later stage from looking at it
                candidate.files[idx].kind = FileKind::Byhand;
                continue;
            }
            if !candidate.files[idx].kind.is_package() {
                continue;
            }
            stage_file(state, self.rule, &changes, &mut candidate.files[idx])?;
            if candidate.files[idx].kind.is_binary() {
                self.read_deb(state, candidate, idx)?;
            } else {
                self.read_dsc(state, candidate, idx)?;
            }
        }
        Ok(())
    }

    fn read_deb(
        &self,
        state: &IncomingState,
        candidate: &mut Candidate,
        idx: usize,
    ) -> Result<(), IncomingError> {
        let changes = state.basename(candidate.ofs).to_owned();
        let basename = state.basename(candidate.files[idx].ofs).to_owned();

        let headers = {
            let file = &candidate.files[idx];
            let Some(temp) = &file.temp else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' was never staged",
                    basename
                )));
            };
            self.binaries.deb_headers(temp.path())?
        };

        let file = &candidate.files[idx];
        let malformed = |what: &str, declared: &str, found: &str| {
            tracing::error!(%changes, file = %basename, what, declared, found,
                "manifest and package contents do not match");
            IncomingError::Malformed(format!(
                "{} '{}' of '{}' does not match '{}' within the file",
                what, declared, basename, found
            ))
        };

        if file.name.as_deref() != Some(headers.name.as_str()) {
            return Err(malformed(
                "name",
                file.name.as_deref().unwrap_or(""),
                &headers.name,
            ));
        }
        if file.architecture.as_deref() != Some(headers.architecture.as_str()) {
            return Err(malformed(
                "architecture",
                file.architecture.as_deref().unwrap_or(""),
                &headers.architecture,
            ));
        }
        if candidate.source != headers.source {
            return Err(malformed("source", &candidate.source, &headers.source));
        }
        if candidate.sourceversion.to_string() != headers.source_version.to_string() {
            return Err(malformed(
                "source version",
                &candidate.sourceversion.to_string(),
                &headers.source_version.to_string(),
            ));
        }
        if !candidate.binaries.iter().any(|name| *name == headers.name) {
            tracing::error!(%changes, file = %basename, name = %headers.name,
                "binary is not listed in the manifest's Binary field");
            return Err(IncomingError::Malformed(format!(
                "name '{}' of binary '{}' is not listed in the Binary header of '{}'",
                headers.name, basename, changes
            )));
        }
        let grammar =
            |err| IncomingError::Malformed(format!("'{}': bad name in headers: {}", basename, err));
        names::check_package_name(&headers.name).map_err(grammar)?;
        names::check_source_name(&headers.source).map_err(grammar)?;
        names::check_filename_part(&headers.architecture).map_err(grammar)?;

        candidate.files[idx].deb = Some(headers);
        Ok(())
    }

    fn read_dsc(
        &self,
        state: &IncomingState,
        candidate: &mut Candidate,
        idx: usize,
    ) -> Result<(), IncomingError> {
        let basename = state.basename(candidate.files[idx].ofs).to_owned();
        let mut dsc = {
            let file = &candidate.files[idx];
            let Some(temp) = &file.temp else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' was never staged",
                    basename
                )));
            };
            Dsc::read(temp.path())?
        };

        // the dsc takes part in its own file list, under the name the
        // pool will know it by, with the checksums the manifest (plus
        // the staging copy) established for it
        let Some(checksums) = candidate.files[idx].checksums.clone() else {
            return Err(IncomingError::Malformed(format!(
                "'{}' has no checksums",
                basename
            )));
        };
        let own_basename = format!("{}_{}.dsc", dsc.name, dsc.version.without_epoch());
        dsc.files.insert(0, (own_basename, checksums));

        candidate.files[idx].dsc = Some(dsc);
        Ok(())
    }

    /// Build the install plan for one destination: a [CandidatePackage]
    /// per package file, plus the manifest pseudo-package when the
    /// destination tracks uploads.
    pub(crate) fn prepare_for_distribution(
        &mut self,
        state: &IncomingState,
        candidate: &mut Candidate,
        d_idx: usize,
    ) -> Result<(), IncomingError> {
        let dist_idx = candidate.perdistribution[d_idx].into;
        let mut packages = vec![];

        for file_idx in 1..candidate.files.len() {
            let package = match candidate.files[file_idx].kind {
                FileKind::Deb | FileKind::Udeb => {
                    self.prepare_binary(state, candidate, dist_idx, file_idx)?
                }
                FileKind::Dsc => self.prepare_dsc(state, candidate, dist_idx, file_idx)?,
                _ => continue,
            };
            packages.push(package);
        }

        let tracking = self.distributions[dist_idx].tracking;
        if tracking.enabled && tracking.include_changes {
            packages.push(self.prepare_changes_record(state, candidate, &packages)?);
        }

        candidate.perdistribution[d_idx].packages = packages;
        Ok(())
    }

    fn prepare_binary(
        &mut self,
        state: &IncomingState,
        candidate: &Candidate,
        dist_idx: usize,
        file_idx: usize,
    ) -> Result<CandidatePackage, IncomingError> {
        let distributions = self.distributions;
        let into = &distributions[dist_idx];
        let changes = state.basename(candidate.ofs);
        let basename = state.basename(candidate.files[file_idx].ofs);

        let file = &candidate.files[file_idx];
        let Some(headers) = &file.deb else {
            return Err(IncomingError::Malformed(format!(
                "'{}' was never read",
                basename
            )));
        };
        let Some(checksums) = &file.checksums else {
            return Err(IncomingError::Malformed(format!(
                "'{}' has no checksums",
                basename
            )));
        };

        let kind = if file.kind == FileKind::Udeb {
            PackageKind::Udeb
        } else {
            PackageKind::Deb
        };
        let table = match kind {
            PackageKind::Udeb => &into.overrides.udeb,
            _ => &into.overrides.deb,
        };
        let entry = table.lookup(&headers.name);

        let section = resolve_field(
            "section",
            entry.and_then(|e| e.section.clone()),
            file.section.as_deref(),
            &headers.name,
        )?;
        let priority = resolve_field(
            "priority",
            entry.and_then(|e| e.priority.clone()),
            file.priority.as_deref(),
            &headers.name,
        )?;
        let Some(component) = into.guess_component(&section).map(str::to_owned) else {
            return Err(IncomingError::Conflict(format!(
                "distribution '{}' has no components",
                into.codename
            )));
        };
        if kind == PackageKind::Udeb && !into.udeb_components.iter().any(|c| *c == component) {
            tracing::error!(changes, file = basename, %component,
                codename = %into.codename,
                "component is not listed in UDebComponents");
            return Err(IncomingError::Conflict(format!(
                "cannot put '{}' of '{}' into component '{}': not in UDebComponents of '{}'",
                basename, changes, component, into.codename
            )));
        }

        let pool_basename =
            pool::binary_basename(&headers.name, &headers.version, &headers.architecture, kind);
        let filekey = pool::filekey(&component, &headers.source, &pool_basename);
        let backing = match self.archive.pool_can_add(&filekey, checksums)? {
            PoolAnswer::Absent => Some(file_idx),
            PoolAnswer::Present => None,
            PoolAnswer::Collision => {
                tracing::error!(changes, %filekey,
                    "pool already carries a different file under this name");
                return Err(IncomingError::ChecksumMismatch(filekey));
            }
        };

        let mut control = headers.control.clone();
        control.set("Section", &section);
        control.set("Priority", &priority);
        if let Some(maintainer) = entry.and_then(|e| e.maintainer.clone()) {
            control.set("Maintainer", &maintainer);
        }
        control.set("Filename", &filekey);
        control.set("Size", &checksums.size().to_string());
        for cs in ChecksumType::ALL {
            if let Some(digest) = checksums.digest(cs) {
                control.set(cs.index_field(), digest);
            }
        }

        Ok(CandidatePackage {
            master: file_idx,
            component: Some(component),
            filekeys: vec![filekey],
            files: vec![backing],
            control: Some(control),
            directory: None,
            skip: false,
        })
    }

    fn prepare_dsc(
        &mut self,
        state: &IncomingState,
        candidate: &mut Candidate,
        dist_idx: usize,
        file_idx: usize,
    ) -> Result<CandidatePackage, IncomingError> {
        let distributions = self.distributions;
        let into = &distributions[dist_idx];
        let changes = state.basename(candidate.ofs).to_owned();
        let basename = state.basename(candidate.files[file_idx].ofs).to_owned();

        if candidate.is_bin_nmu {
            tracing::error!(%changes, file = %basename,
                "source package in an upload that looks like a binary-only rebuild");
            return Err(IncomingError::Malformed(format!(
                "source package '{}' in '{}', which looks like a binary-only rebuild ('{}' and '{}' differ)",
                basename, changes, candidate.sourceversion, candidate.changesversion
            )));
        }

        let (dsc_name, mut dsc_files, dsc_paragraph, declared_section,
            declared_priority, dsc_checksums) = {
            let file = &candidate.files[file_idx];
            let Some(dsc) = &file.dsc else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' was never read",
                    basename
                )));
            };
            let Some(checksums) = &file.checksums else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' has no checksums",
                    basename
                )));
            };

            let mismatch = |what: &str, declared: &str, found: &str| {
                tracing::error!(%changes, file = %basename, what, declared, found,
                    "manifest and source description do not match");
                IncomingError::Malformed(format!(
                    "{} '{}' of '{}' does not match '{}' within the file",
                    what, declared, basename, found
                ))
            };
            if file.name.as_deref() != Some(dsc.name.as_str()) {
                return Err(mismatch(
                    "name",
                    file.name.as_deref().unwrap_or(""),
                    &dsc.name,
                ));
            }
            if candidate.source != dsc.name {
                return Err(mismatch("source", &candidate.source, &dsc.name));
            }
            if candidate.sourceversion.to_string() != dsc.version.to_string() {
                return Err(mismatch(
                    "source version",
                    &candidate.sourceversion.to_string(),
                    &dsc.version.to_string(),
                ));
            }
            names::check_source_name(&dsc.name).map_err(|err| {
                IncomingError::Malformed(format!("'{}': bad source name: {}", basename, err))
            })?;
            for (file_basename, _) in &dsc.files {
                names::check_filename_part(file_basename).map_err(|err| {
                    IncomingError::Malformed(format!(
                        "'{}': bad file name '{}': {}",
                        basename, file_basename, err
                    ))
                })?;
            }

            (
                dsc.name.clone(),
                dsc.files.clone(),
                dsc.paragraph.clone(),
                file.section.clone(),
                file.priority.clone(),
                checksums.clone(),
            )
        };

        let entry = into.overrides.dsc.lookup(&dsc_name);
        let section = resolve_field(
            "section",
            entry.and_then(|e| e.section.clone()),
            declared_section.as_deref(),
            &dsc_name,
        )?;
        let priority = resolve_field(
            "priority",
            entry.and_then(|e| e.priority.clone()),
            declared_priority.as_deref(),
            &dsc_name,
        )?;
        let Some(component) = into.guess_component(&section).map(str::to_owned) else {
            return Err(IncomingError::Conflict(format!(
                "distribution '{}' has no components",
                into.codename
            )));
        };

        let directory = pool::source_dir(&component, &dsc_name);
        let filekeys: Vec<String> = dsc_files
            .iter()
            .map(|(file_basename, _)| format!("{}/{}", directory, file_basename))
            .collect();
        let mut backing: Vec<Option<usize>> = vec![None; filekeys.len()];

        backing[0] = match self.archive.pool_can_add(&filekeys[0], &dsc_checksums)? {
            PoolAnswer::Absent => Some(file_idx),
            PoolAnswer::Present => None,
            PoolAnswer::Collision => {
                return Err(IncomingError::ChecksumMismatch(filekeys[0].clone()));
            }
        };
        for j in 1..filekeys.len() {
            let (file_basename, listed) = &mut dsc_files[j];
            let file_basename = file_basename.clone();
            backing[j] =
                self.prepare_source_file(state, candidate, &basename, &filekeys[j], &file_basename, listed)?;
        }

        let mut control = dsc_paragraph;
        control.rename("Source", "Package");
        control.set("Section", &section);
        control.set("Priority", &priority);
        if let Some(maintainer) = entry.and_then(|e| e.maintainer.clone()) {
            control.set("Maintainer", &maintainer);
        }
        control.set("Directory", &directory);
        for cs in ChecksumType::ALL {
            let mut lines = String::new();
            for (file_basename, checksums) in &dsc_files {
                if let Some(digest) = checksums.digest(cs) {
                    lines.push_str(&format!(
                        "\n{} {} {}",
                        digest,
                        checksums.size(),
                        file_basename
                    ));
                }
            }
            if lines.is_empty() {
                control.remove(cs.manifest_field());
            } else {
                control.set(cs.manifest_field(), &lines);
            }
        }

        // later phases (and the record above) want the merged view
        if let Some(dsc) = &mut candidate.files[file_idx].dsc {
            dsc.files = dsc_files;
        }

        Ok(CandidatePackage {
            master: file_idx,
            component: Some(component),
            filekeys,
            files: backing,
            control: Some(control),
            directory: Some(directory),
            skip: false,
        })
    }

    // One secondary file of a source package: find it in the upload (by
    // name, or failing that by content), reconcile its checksums with
    // what the dsc listed, and decide whether the pool already has it.
    fn prepare_source_file(
        &mut self,
        state: &IncomingState,
        candidate: &mut Candidate,
        dsc_basename: &str,
        filekey: &str,
        basename: &str,
        listed: &mut Checksums,
    ) -> Result<Option<usize>, IncomingError> {
        let changes = state.basename(candidate.ofs).to_owned();

        let found = candidate
            .files
            .iter()
            .position(|f| f.checksums.is_some() && state.basename(f.ofs) == basename);
        let f_idx = match found {
            Some(idx) => idx,
            None => match self.archive.pool_can_add(filekey, listed)? {
                PoolAnswer::Present => return Ok(None),
                PoolAnswer::Collision => {
                    return Err(IncomingError::ChecksumMismatch(filekey.to_owned()));
                }
                PoolAnswer::Absent => {
                    // no file by this name; look for a differently-named
                    // file with the same characteristics
                    let found = candidate.files.iter().position(|f| {
                        f.checksums
                            .as_ref()
                            .is_some_and(|cs| cs.check(listed).is_ok())
                    });
                    match found {
                        Some(idx) => idx,
                        None => {
                            tracing::error!(%changes, file = basename, needed_for = dsc_basename,
                                "file is needed, not yet registered in the pool, and not part of the upload");
                            return Err(IncomingError::Missing(basename.to_owned()));
                        }
                    }
                }
            },
        };

        {
            let Some(checksums) = candidate.files[f_idx].checksums.as_mut() else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' has no checksums",
                    basename
                )));
            };
            match checksums.check(listed) {
                Err(_) => {
                    tracing::error!(%changes, file = basename, dsc = dsc_basename,
                        "conflicting checksums listed in the manifest and the source description");
                    return Err(IncomingError::ChecksumMismatch(basename.to_owned()));
                }
                Ok(true) => {
                    // put the additional digests from the dsc next to
                    // those from the manifest, so a file matching one
                    // list but not the other is caught
                    let _ = checksums.combine(listed);
                }
                Ok(false) => {}
            }
        }

        let answer = {
            let Some(checksums) = candidate.files[f_idx].checksums.as_ref() else {
                return Err(IncomingError::Malformed(format!(
                    "'{}' has no checksums",
                    basename
                )));
            };
            self.archive.pool_can_add(filekey, checksums)?
        };
        let ret = match answer {
            PoolAnswer::Present => {
                // only not needed because it is already there
                candidate.files[f_idx].used = true;
                None
            }
            PoolAnswer::Collision => {
                return Err(IncomingError::ChecksumMismatch(filekey.to_owned()));
            }
            PoolAnswer::Absent => {
                stage_file(state, self.rule, &changes, &mut candidate.files[f_idx])?;
                Some(f_idx)
            }
        };

        // bring the dsc's view up to full strength for the index record
        if !listed.is_complete() {
            if let Some(checksums) = candidate.files[f_idx].checksums.as_ref() {
                let _ = listed.combine(checksums);
            }
        }
        Ok(ret)
    }

    // The pseudo-package recording the manifest itself, for
    // distributions that track uploads.
    fn prepare_changes_record(
        &mut self,
        state: &IncomingState,
        candidate: &Candidate,
        packages: &[CandidatePackage],
    ) -> Result<CandidatePackage, IncomingError> {
        let component = packages
            .iter()
            .find_map(|package| package.component.clone())
            .unwrap_or_else(|| "strange".to_owned());

        let file = &candidate.files[0];
        let Some(checksums) = &file.checksums else {
            return Err(IncomingError::Malformed(format!(
                "'{}' was never staged",
                state.basename(candidate.ofs)
            )));
        };
        let basename = changes_basename(
            &candidate.source,
            &candidate.changesversion.without_epoch(),
            &candidate.architectures,
        );
        let filekey = pool::filekey(&component, &candidate.source, &basename);
        let backing = match self.archive.pool_can_add(&filekey, checksums)? {
            PoolAnswer::Absent => Some(0),
            PoolAnswer::Present => None,
            PoolAnswer::Collision => {
                return Err(IncomingError::ChecksumMismatch(filekey));
            }
        };

        Ok(CandidatePackage {
            master: 0,
            component: Some(component),
            filekeys: vec![filekey],
            files: vec![backing],
            control: None,
            directory: None,
            skip: false,
        })
    }
}

// vim: foldmethod=marker
