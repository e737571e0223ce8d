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

use super::{IncomingError, IncomingRule, IncomingState};
use crate::{
    archive::DebHeaders,
    checksums::{self, ChecksumType, Checksums},
    control::{
        changes::{classify_basename, ChecksumLine, FileKind, FileLine},
        dsc::Dsc,
        names,
        signed::SignedReader,
        Paragraph,
    },
    version::Version,
};
use std::path::{Path, PathBuf};

/// A staged copy in the rule's temp directory. Dropping the value
/// unlinks the file, whichever way processing ends.
#[derive(Debug)]
pub(crate) struct TempCopy {
    path: PathBuf,
}

impl TempCopy {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// One file belonging to a candidate: the manifest itself at index 0,
/// then one entry per `Files` line.
#[derive(Debug)]
pub(crate) struct CandidateFile {
    /// Index of the basename within [IncomingState].
    pub ofs: usize,

    /// What the file is.
    pub kind: FileKind,

    /// Section declared in the manifest; [None] for the manifest row.
    pub section: Option<String>,

    /// Priority declared in the manifest; [None] for the manifest row.
    pub priority: Option<String>,

    /// Architecture derived from the file name; [None] for the manifest
    /// row and unclassifiable files.
    pub architecture: Option<String>,

    /// Package name derived from the file name.
    pub name: Option<String>,

    /// Everything known about the file's digests so far. Grows
    /// monotonically as metadata and staged copies are reconciled.
    pub checksums: Option<Checksums>,

    /// At least one destination needs this file.
    pub used: bool,

    /// The staged copy, once the file has been pulled into the temp
    /// directory.
    pub temp: Option<TempCopy>,

    /// Parsed binary headers, once staged and read.
    pub deb: Option<DebHeaders>,

    /// Parsed source description, once staged and read.
    pub dsc: Option<Dsc>,
}

impl CandidateFile {
    fn new(ofs: usize, kind: FileKind) -> Self {
        CandidateFile {
            ofs,
            kind,
            section: None,
            priority: None,
            architecture: None,
            name: None,
            checksums: None,
            used: false,
            temp: None,
            deb: None,
            dsc: None,
        }
    }
}

/// One package a candidate wants to install into one distribution. The
/// manifest itself becomes a pseudo-package when the destination tracks
/// uploads.
#[derive(Debug)]
pub(crate) struct CandidatePackage {
    /// Index of the file this package is built around.
    pub master: usize,

    /// Component the package goes to. Always set for real packages.
    pub component: Option<String>,

    /// Pool locations this package installs, in order.
    pub filekeys: Vec<String>,

    /// For every filekey, the candidate file backing it -- or [None]
    /// when the pool already has an identical file and nothing needs to
    /// move.
    pub files: Vec<Option<usize>>,

    /// The rewritten index record. [None] for the manifest
    /// pseudo-package.
    pub control: Option<Paragraph>,

    /// Pool directory of a source package.
    pub directory: Option<String>,

    /// Dry-run found the package already present; don't install it.
    pub skip: bool,
}

/// The install plan for one destination distribution.
#[derive(Debug)]
pub(crate) struct PerDistribution {
    /// Index into the configured distribution set.
    pub into: usize,

    /// Dry-run found nothing at all to do for this distribution.
    pub skip: bool,

    /// The packages to install.
    pub packages: Vec<CandidatePackage>,
}

/// A manifest that has been staged and had its signature layer read,
/// but not yet been parsed.
pub(crate) struct UnparsedCandidate {
    ofs: usize,
    control: Paragraph,
    keys: Vec<String>,
    allkeys: Vec<String>,
    file0: CandidateFile,

    /// Signatures were present but none verified.
    pub broken: bool,
}

/// One manifest under processing, files flattened into an arena that
/// packages refer into by index.
pub(crate) struct Candidate {
    /// Index of the manifest within [IncomingState].
    pub ofs: usize,

    /// The manifest body.
    pub control: Paragraph,

    /// Key identifiers with a verified signature on the manifest.
    pub keys: Vec<String>,

    /// Key identifiers of every signature on the manifest.
    pub allkeys: Vec<String>,

    /// Source package name.
    pub source: String,

    /// Source version; differs from `changesversion` for binary-only
    /// rebuilds.
    pub sourceversion: Version,

    /// Version of the upload itself.
    pub changesversion: Version,

    /// The source version and upload version differ.
    pub is_bin_nmu: bool,

    /// Distribution names the manifest asks for.
    pub distributions: Vec<String>,

    /// Architectures the manifest claims to carry.
    pub architectures: Vec<String>,

    /// Binary package names the manifest claims to carry.
    pub binaries: Vec<String>,

    /// The manifest (index 0) and every file it lists.
    pub files: Vec<CandidateFile>,

    /// One install plan per destination distribution.
    pub perdistribution: Vec<PerDistribution>,
}

/// Stage one candidate file into the rule's temp directory, verifying
/// and merging checksums along the way. Calling this again for an
/// already staged file is a no-op.
pub(crate) fn stage_file(
    state: &IncomingState,
    rule: &IncomingRule,
    changes: &str,
    file: &mut CandidateFile,
) -> Result<(), IncomingError> {
    if file.used && file.temp.is_some() {
        return Ok(());
    }
    let basename = state.basename(file.ofs);
    if !basename.is_ascii() {
        tracing::error!(changes, file = basename,
            "invalid filename: contains 8-bit characters");
        return Err(IncomingError::Malformed(format!(
            "invalid filename '{}' listed in '{}'",
            basename, changes
        )));
    }

    let temppath = rule.tempdir.join(basename);
    let origpath = rule.directory.join(basename);
    let _ = std::fs::remove_file(&temppath);
    let read = checksums::copy_and_digest(&origpath, &temppath).map_err(IncomingError::Io)?;
    // from here on the copy is cleaned up on every path
    let temp = TempCopy { path: temppath };

    match &mut file.checksums {
        None => file.checksums = Some(read),
        Some(declared) => match declared.check(&read) {
            Err(_) => {
                tracing::error!(changes, file = basename, expected = ?declared, read = ?read,
                    "file does not match the checksums the manifest declares");
                return Err(IncomingError::ChecksumMismatch(basename.to_owned()));
            }
            Ok(true) => {
                // verified identical on everything shared, so this can
                // only add algorithms
                let _ = declared.combine(&read);
            }
            Ok(false) => {}
        },
    }
    file.temp = Some(temp);
    file.used = true;
    Ok(())
}

impl UnparsedCandidate {
    /// Stage the manifest at `ofs` and run it through the signature
    /// reader.
    pub(crate) fn read(
        state: &IncomingState,
        rule: &IncomingRule,
        ofs: usize,
        signatures: &dyn SignedReader,
    ) -> Result<Self, IncomingError> {
        let mut file0 = CandidateFile::new(ofs, FileKind::Changes);
        stage_file(state, rule, state.basename(ofs), &mut file0)?;

        let Some(temp) = &file0.temp else {
            return Err(IncomingError::Malformed(
                "manifest copy vanished while staging".to_owned(),
            ));
        };
        let block = signatures.read_signed(temp.path())?;
        let control = Paragraph::parse(block.body.trim_start_matches('\n')).map_err(|err| {
            tracing::error!(changes = state.basename(ofs), error = %err,
                "manifest body is not a well-formed paragraph");
            IncomingError::Malformed(format!(
                "'{}' is not a well-formed control paragraph",
                state.basename(ofs)
            ))
        })?;

        Ok(UnparsedCandidate {
            ofs,
            control,
            keys: block.valid_keys,
            allkeys: block.all_keys,
            file0,
            broken: block.broken,
        })
    }

    /// Extract the manifest's fields and file table, checking grammar
    /// and cross-list consistency.
    pub(crate) fn parse(self, state: &IncomingState) -> Result<Candidate, IncomingError> {
        let changes = state.basename(self.ofs);
        let control = self.control;

        let missing =
            |field: &str| IncomingError::Malformed(format!("'{}': missing '{}' field", changes, field));

        let source_field = control.value("Source").ok_or_else(|| missing("Source"))?;
        let (source, source_version_text) = names::split_name_and_version(&source_field)
            .map_err(|err| {
                IncomingError::Malformed(format!("'{}': bad 'Source' field: {}", changes, err))
            })?;
        names::check_source_name(source).map_err(|err| {
            IncomingError::Malformed(format!("'{}': malformed source name: {}", changes, err))
        })?;
        let source = source.to_owned();

        let binaries = control.words("Binary").ok_or_else(|| missing("Binary"))?;
        let architectures = control
            .words("Architecture")
            .ok_or_else(|| missing("Architecture"))?;
        let changesversion: Version = control
            .value("Version")
            .ok_or_else(|| missing("Version"))?
            .parse()
            .map_err(|err| {
                IncomingError::Malformed(format!("'{}': malformed version: {}", changes, err))
            })?;
        let (sourceversion, is_bin_nmu) = match source_version_text {
            Some(raw) => {
                let version: Version = raw.parse().map_err(|err| {
                    IncomingError::Malformed(format!(
                        "'{}': malformed source version: {}",
                        changes, err
                    ))
                })?;
                let differs = version != changesversion;
                (version, differs)
            }
            None => (changesversion.clone(), false),
        };
        let distributions = control
            .words("Distribution")
            .ok_or_else(|| missing("Distribution"))?;
        if distributions.is_empty() {
            return Err(missing("Distribution"));
        }

        let mut files = vec![self.file0];
        let file_lines = control.extra_lines("Files").ok_or_else(|| missing("Files"))?;
        for line in file_lines {
            let line: FileLine = line.parse().map_err(|err| {
                IncomingError::Malformed(format!("'{}': bad file line: {}", changes, err))
            })?;
            let Some(ofs) = state.find(&line.basename) else {
                tracing::error!(changes, file = %line.basename,
                    "file not found in the incoming directory");
                return Err(IncomingError::Missing(line.basename));
            };
            let meta = classify_basename(&line.basename).map_err(|err| {
                IncomingError::Malformed(format!(
                    "'{}': bad file name '{}': {}",
                    changes, line.basename, err
                ))
            })?;
            let mut checksums = Checksums::new(line.size);
            checksums.set(ChecksumType::Md5, &line.md5).map_err(|err| {
                IncomingError::Malformed(format!(
                    "'{}': bad md5 for '{}': {}",
                    changes, line.basename, err
                ))
            })?;

            let mut file = CandidateFile::new(ofs, meta.kind);
            file.section = Some(line.section);
            file.priority = Some(line.priority);
            file.architecture = meta.architecture;
            file.name = meta.name;
            file.checksums = Some(checksums);
            files.push(file);
        }
        if files.len() <= 1 {
            return Err(IncomingError::Malformed(format!(
                "'{}': empty 'Files' section",
                changes
            )));
        }

        for cs in ChecksumType::EXTENDED {
            let Some(lines) = control.extra_lines(cs.manifest_field()) else {
                continue;
            };
            for line in lines {
                let line: ChecksumLine = line.parse().map_err(|err| {
                    IncomingError::Malformed(format!(
                        "'{}': bad {} line: {}",
                        changes,
                        cs.manifest_field(),
                        err
                    ))
                })?;
                let Some(file) = files[1..]
                    .iter_mut()
                    .find(|file| state.basename(file.ofs) == line.basename)
                else {
                    tracing::warn!(changes, file = %line.basename, field = cs.manifest_field(),
                        "ignoring file listed in a checksum field but not in 'Files'");
                    continue;
                };
                let Some(checksums) = &mut file.checksums else {
                    continue;
                };
                if checksums.size() != line.size {
                    tracing::error!(changes, file = %line.basename, field = cs.manifest_field(),
                        "different size listed here than in 'Files'");
                    return Err(IncomingError::Malformed(format!(
                        "'{}': different sizes listed for '{}'",
                        changes, line.basename
                    )));
                }
                checksums.set(cs, &line.digest).map_err(|err| {
                    IncomingError::Malformed(format!(
                        "'{}': bad digest for '{}': {}",
                        changes, line.basename, err
                    ))
                })?;
            }
        }

        Ok(Candidate {
            ofs: self.ofs,
            control,
            keys: self.keys,
            allkeys: self.allkeys,
            source,
            sourceversion,
            changesversion,
            is_bin_nmu,
            distributions,
            architectures,
            binaries,
            files,
            perdistribution: vec![],
        })
    }
}

impl Candidate {
    /// Cheap checks that only need the parsed manifest: every package
    /// file's architecture must be one the manifest declares.
    pub(crate) fn early_checks(&self, state: &IncomingState) -> Result<(), IncomingError> {
        for file in &self.files {
            if !file.kind.is_package() {
                continue;
            }
            let architecture = file.architecture.as_deref().unwrap_or("");
            if self.architectures.iter().any(|a| a == architecture) {
                continue;
            }
            tracing::error!(changes = state.basename(self.ofs),
                file = state.basename(file.ofs), architecture,
                "architecture not listed in the manifest's Architecture field");
            return Err(IncomingError::Malformed(format!(
                "'{}' is not listed in the Architecture header of '{}' but '{}' looks like it",
                architecture,
                state.basename(self.ofs),
                state.basename(file.ofs),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incoming::{CleanupFlags, PermitFlags};
    use indoc::indoc;

    struct Unsigned;

    impl SignedReader for Unsigned {
        fn read_signed(
            &self,
            path: &Path,
        ) -> Result<crate::control::signed::SignedBlock, crate::control::signed::SignedReadError>
        {
            let body = std::fs::read_to_string(path)
                .map_err(crate::control::signed::SignedReadError::Io)?;
            Ok(crate::control::signed::SignedBlock {
                body,
                valid_keys: vec![],
                all_keys: vec![],
                broken: false,
            })
        }
    }

    const CHANGES: &str = indoc! {"
        Format: 1.8
        Source: foo
        Binary: foo
        Architecture: amd64
        Version: 1.0-1
        Distribution: unstable
        Files:
         5d41402abc4b2a76b9719d911017c592 5 devel optional foo_1.0-1_amd64.deb
        Checksums-Sha256:
         2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824 5 foo_1.0-1_amd64.deb
    "};

    fn setup(changes: &str) -> (tempfile::TempDir, IncomingRule, IncomingState) {
        let dir = tempfile::tempdir().unwrap();
        let incoming = dir.path().join("incoming");
        std::fs::create_dir(&incoming).unwrap();
        std::fs::write(incoming.join("foo_1.0-1.changes"), changes).unwrap();
        std::fs::write(incoming.join("foo_1.0-1_amd64.deb"), "hello").unwrap();

        let rule = IncomingRule {
            name: "test".to_owned(),
            directory: incoming,
            tempdir: dir.path().join("tmp"),
            allow: vec![("unstable".to_owned(), "unstable".to_owned())],
            default_into: None,
            permit: PermitFlags::default(),
            cleanup: CleanupFlags::default(),
        };
        let state = IncomingState::open(&rule).unwrap();
        (dir, rule, state)
    }

    fn read_candidate(
        rule: &IncomingRule,
        state: &IncomingState,
    ) -> Result<Candidate, IncomingError> {
        let ofs = state.find("foo_1.0-1.changes").unwrap();
        UnparsedCandidate::read(state, rule, ofs, &Unsigned)?.parse(state)
    }

    #[test]
    fn parse_fills_candidate() {
        let (_dir, rule, state) = setup(CHANGES);
        let candidate = read_candidate(&rule, &state).unwrap();

        assert_eq!("foo", candidate.source);
        assert_eq!(candidate.sourceversion, candidate.changesversion);
        assert!(!candidate.is_bin_nmu);
        assert_eq!(vec!["unstable".to_owned()], candidate.distributions);
        assert_eq!(2, candidate.files.len());

        let file = &candidate.files[1];
        assert_eq!(FileKind::Deb, file.kind);
        assert_eq!(Some("foo"), file.name.as_deref());
        assert_eq!(Some("amd64"), file.architecture.as_deref());
        let checksums = file.checksums.as_ref().unwrap();
        assert!(checksums.has(ChecksumType::Md5));
        assert!(checksums.has(ChecksumType::Sha256));

        candidate.early_checks(&state).unwrap();
    }

    #[test]
    fn bin_nmu_is_detected() {
        let (_dir, rule, state) =
            setup(&CHANGES.replace("Source: foo", "Source: foo (1.0-1)").replace("Version: 1.0-1", "Version: 1.0-1+b1"));
        let candidate = read_candidate(&rule, &state).unwrap();
        assert!(candidate.is_bin_nmu);
        assert_eq!("1.0-1", candidate.sourceversion.to_string());
        assert_eq!("1.0-1+b1", candidate.changesversion.to_string());
    }

    #[test]
    fn missing_field_is_malformed() {
        let (_dir, rule, state) = setup(&CHANGES.replace("Distribution: unstable\n", ""));
        assert!(matches!(
            read_candidate(&rule, &state),
            Err(IncomingError::Malformed(_))
        ));
    }

    #[test]
    fn listed_file_absent_from_directory() {
        let (_dir, rule, state) = setup(&CHANGES.replace(
            "foo_1.0-1_amd64.deb\nChecksums",
            "foo_9.9-9_amd64.deb\nChecksums",
        ));
        assert!(matches!(
            read_candidate(&rule, &state),
            Err(IncomingError::Missing(_))
        ));
    }

    #[test]
    fn size_disagreement_between_lists() {
        let (_dir, rule, state) = setup(&CHANGES.replace(
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824 5",
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824 6",
        ));
        assert!(matches!(
            read_candidate(&rule, &state),
            Err(IncomingError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_architecture_fails_early_checks() {
        let (_dir, rule, state) = setup(&CHANGES.replace("Architecture: amd64", "Architecture: source"));
        let candidate = read_candidate(&rule, &state).unwrap();
        assert!(matches!(
            candidate.early_checks(&state),
            Err(IncomingError::Malformed(_))
        ));
    }

    #[test]
    fn staging_is_idempotent_and_checks_digests() {
        let (_dir, rule, state) = setup(CHANGES);
        let mut candidate = read_candidate(&rule, &state).unwrap();

        stage_file(&state, &rule, "foo_1.0-1.changes", &mut candidate.files[1]).unwrap();
        let staged = candidate.files[1].temp.as_ref().unwrap().path().to_owned();
        assert!(staged.exists());
        // the computed sha1 was merged in alongside the declared digests
        assert!(candidate.files[1]
            .checksums
            .as_ref()
            .unwrap()
            .is_complete());

        // second call: no-op
        stage_file(&state, &rule, "foo_1.0-1.changes", &mut candidate.files[1]).unwrap();

        // dropping the candidate removes the staged copies
        drop(candidate);
        assert!(!staged.exists());
    }

    #[test]
    fn staging_rejects_checksum_mismatch() {
        // manifest says "hello" (5 bytes, md5 5d41...), file has other bytes
        let (dir, rule, state) = setup(CHANGES);
        std::fs::write(rule.directory.join("foo_1.0-1_amd64.deb"), "HELLO").unwrap();
        let mut candidate = read_candidate(&rule, &state).unwrap();

        assert!(matches!(
            stage_file(&state, &rule, "foo_1.0-1.changes", &mut candidate.files[1]),
            Err(IncomingError::ChecksumMismatch(_))
        ));
        // the bad staged copy did not stick around
        assert!(!dir.path().join("tmp").join("foo_1.0-1_amd64.deb").exists());
    }
}

// vim: foldmethod=marker
