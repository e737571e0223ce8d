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

//! End-to-end runs of the incoming queue processor against an in-memory
//! archive backend backed by real directories.

use deb_incoming::{
    archive::{
        Archive, ArchiveError, BinaryReader, CheckAnswer, DebHeaders, Distribution, PackageKind,
        PoolAnswer, TrackedKind, UploadLogger, Uploaders,
    },
    checksums::{self, ChecksumType, Checksums},
    control::{
        signed::{SignedBlock, SignedReadError, SignedReader},
        Paragraph,
    },
    incoming::{IncomingError, IncomingProcessor, IncomingRule, IncomingStatus},
    version::Version,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

const KEY: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

// ---------------------------------------------------------------- mocks

#[derive(Debug)]
struct MockArchive {
    root: PathBuf,
    pool: HashMap<String, Checksums>,
    refcounts: HashMap<String, usize>,
    hardlinked: Vec<String>,
    indexes: HashMap<(String, String, &'static str), HashMap<String, Version>>,
    index_adds: Vec<IndexAdd>,
    tracking: Vec<(String, String, TrackedKind, Vec<String>)>,
    fail_add_package_for: Option<String>,
}

#[derive(Debug)]
struct IndexAdd {
    codename: String,
    component: String,
    kind: &'static str,
    name: String,
    version: String,
    control: String,
    filekeys: Vec<String>,
}

fn kind_key(kind: PackageKind) -> &'static str {
    match kind {
        PackageKind::Deb => "deb",
        PackageKind::Udeb => "udeb",
        PackageKind::Dsc => "dsc",
    }
}

impl MockArchive {
    fn new(root: &Path) -> Self {
        MockArchive {
            root: root.to_owned(),
            pool: HashMap::new(),
            refcounts: HashMap::new(),
            hardlinked: vec![],
            indexes: HashMap::new(),
            index_adds: vec![],
            tracking: vec![],
            fail_add_package_for: None,
        }
    }

    fn seed_pool(&mut self, filekey: &str, checksums: Checksums, content: &str) {
        let path = self.root.join(filekey);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        self.pool.insert(filekey.to_owned(), checksums);
        self.refcounts.insert(filekey.to_owned(), 1);
    }

    fn seed_index(&mut self, codename: &str, component: &str, kind: &'static str, name: &str, version: &str) {
        self.indexes
            .entry((codename.to_owned(), component.to_owned(), kind))
            .or_default()
            .insert(name.to_owned(), version.parse().unwrap());
    }

    fn pool_path(&self, filekey: &str) -> PathBuf {
        self.root.join(filekey)
    }
}

impl Archive for MockArchive {
    fn pool_can_add(
        &mut self,
        filekey: &str,
        checksums: &Checksums,
    ) -> Result<PoolAnswer, ArchiveError> {
        match self.pool.get(filekey) {
            None => Ok(PoolAnswer::Absent),
            Some(known) if known.check(checksums).is_ok() => Ok(PoolAnswer::Present),
            Some(_) => Ok(PoolAnswer::Collision),
        }
    }

    fn pool_hardlink_and_add(
        &mut self,
        tempfile: &Path,
        filekey: &str,
        checksums: &Checksums,
    ) -> Result<(), ArchiveError> {
        if let Some(known) = self.pool.get(filekey) {
            if known.check(checksums).is_err() {
                return Err(ArchiveError::Backend(format!(
                    "collision on '{}'",
                    filekey
                )));
            }
            return Ok(());
        }
        let dest = self.root.join(filekey);
        std::fs::create_dir_all(dest.parent().unwrap()).map_err(ArchiveError::Io)?;
        std::fs::hard_link(tempfile, &dest).map_err(ArchiveError::Io)?;
        self.pool.insert(filekey.to_owned(), checksums.clone());
        self.refcounts.insert(filekey.to_owned(), 0);
        self.hardlinked.push(filekey.to_owned());
        Ok(())
    }

    fn pool_delete_and_remove(&mut self, filekey: &str) -> Result<(), ArchiveError> {
        self.pool.remove(filekey);
        self.refcounts.remove(filekey);
        let _ = std::fs::remove_file(self.root.join(filekey));
        Ok(())
    }

    fn check_add(
        &mut self,
        codename: &str,
        component: &str,
        kind: PackageKind,
        name: &str,
        version: &Version,
        permit_older: bool,
    ) -> Result<CheckAnswer, ArchiveError> {
        let key = (codename.to_owned(), component.to_owned(), kind_key(kind));
        match self.indexes.get(&key).and_then(|index| index.get(name)) {
            None => Ok(CheckAnswer::Addable),
            Some(existing) if existing < version => Ok(CheckAnswer::Addable),
            Some(existing) if existing == version => Ok(CheckAnswer::Skip),
            Some(_) if permit_older => Ok(CheckAnswer::Addable),
            Some(_) => Ok(CheckAnswer::Skip),
        }
    }

    fn add_package(
        &mut self,
        codename: &str,
        component: &str,
        kind: PackageKind,
        name: &str,
        version: &Version,
        control: &Paragraph,
        filekeys: &[String],
    ) -> Result<(), ArchiveError> {
        if self.fail_add_package_for.as_deref() == Some(name) {
            return Err(ArchiveError::Backend(format!("refusing to add '{}'", name)));
        }
        self.indexes
            .entry((codename.to_owned(), component.to_owned(), kind_key(kind)))
            .or_default()
            .insert(name.to_owned(), version.clone());
        for filekey in filekeys {
            *self.refcounts.entry(filekey.to_owned()).or_insert(0) += 1;
        }
        self.index_adds.push(IndexAdd {
            codename: codename.to_owned(),
            component: component.to_owned(),
            kind: kind_key(kind),
            name: name.to_owned(),
            version: version.to_string(),
            control: control.to_string(),
            filekeys: filekeys.to_vec(),
        });
        Ok(())
    }

    fn tracking_add(
        &mut self,
        codename: &str,
        source: &str,
        _version: &Version,
        kind: TrackedKind,
        filekeys: &[String],
    ) -> Result<(), ArchiveError> {
        self.tracking.push((
            codename.to_owned(),
            source.to_owned(),
            kind,
            filekeys.to_vec(),
        ));
        Ok(())
    }
}

// The fake binary packages in these tests *are* their control
// paragraphs.
struct ParagraphDebs;

impl BinaryReader for ParagraphDebs {
    fn deb_headers(
        &self,
        path: &Path,
    ) -> Result<DebHeaders, deb_incoming::archive::BinaryReadError> {
        let text = std::fs::read_to_string(path)
            .map_err(deb_incoming::archive::BinaryReadError::Io)?;
        let control = Paragraph::parse(&text)
            .map_err(|_| deb_incoming::archive::BinaryReadError::Malformed)?;
        DebHeaders::from_control(control)
    }
}

// Signature stub: hands back the file as the body, with whatever key
// story the test wants to tell.
struct StubSignatures {
    valid_keys: Vec<String>,
    all_keys: Vec<String>,
    broken: bool,
}

impl StubSignatures {
    fn unsigned() -> Self {
        StubSignatures {
            valid_keys: vec![],
            all_keys: vec![],
            broken: false,
        }
    }

    fn signed_by(key: &str) -> Self {
        StubSignatures {
            valid_keys: vec![key.to_owned()],
            all_keys: vec![key.to_owned()],
            broken: false,
        }
    }
}

impl SignedReader for StubSignatures {
    fn read_signed(&self, path: &Path) -> Result<SignedBlock, SignedReadError> {
        let body = std::fs::read_to_string(path).map_err(SignedReadError::Io)?;
        Ok(SignedBlock {
            body,
            valid_keys: self.valid_keys.clone(),
            all_keys: self.all_keys.clone(),
            broken: self.broken,
        })
    }
}

#[derive(Default)]
struct RecordingLogger {
    accepted: Vec<(String, String, String, Option<String>)>,
}

impl UploadLogger for RecordingLogger {
    fn changes_accepted(
        &mut self,
        codename: &str,
        source: &str,
        version: &Version,
        _control: &Paragraph,
        _changes_path: &Path,
        changes_filekey: Option<&str>,
    ) {
        self.accepted.push((
            codename.to_owned(),
            source.to_owned(),
            version.to_string(),
            changes_filekey.map(str::to_owned),
        ));
    }
}

// ------------------------------------------------------------- fixture

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    incoming: PathBuf,
    rule: IncomingRule,
    archive: MockArchive,
    logger: RecordingLogger,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_owned();
        let incoming = root.join("incoming");
        std::fs::create_dir(&incoming).unwrap();

        let rule = IncomingRule::parse_named(
            "Name: default\nIncomingDir: incoming\nTempDir: tmp\nAllow: stable\n",
            "default",
            &root,
        )
        .unwrap();
        let archive = MockArchive::new(&root.join("archive"));

        Fixture {
            _dir: dir,
            root,
            incoming,
            rule,
            archive,
            logger: RecordingLogger::default(),
        }
    }

    // Drop a payload into incoming/ and learn its checksums.
    fn payload(&self, name: &str, content: &str) -> Checksums {
        let path = self.incoming.join(name);
        std::fs::write(&path, content).unwrap();
        let scratch = self.root.join(".digest-scratch");
        let checksums = checksums::copy_and_digest(&path, &scratch).unwrap();
        std::fs::remove_file(&scratch).unwrap();
        checksums
    }

    fn process(
        &mut self,
        distributions: &[Distribution],
        signatures: &dyn SignedReader,
    ) -> Result<IncomingStatus, IncomingError> {
        let mut processor = IncomingProcessor::new(
            &self.rule,
            distributions,
            &mut self.archive,
            &ParagraphDebs,
            signatures,
            &mut self.logger,
        );
        processor.process(None)
    }
}

fn stable() -> Distribution {
    let mut dist = Distribution::new("stable");
    dist.architectures = vec!["source".to_owned(), "amd64".to_owned()];
    dist
}

fn deb_content(package: &str, version: &str, source: &str, architecture: &str) -> String {
    format!(
        "Package: {}\nVersion: {}\nSource: {}\nArchitecture: {}\nDescription: a test package\n",
        package, version, source, architecture
    )
}

fn file_line(checksums: &Checksums, section: &str, priority: &str, name: &str) -> String {
    format!(
        " {} {} {} {} {}",
        checksums.digest(ChecksumType::Md5).unwrap(),
        checksums.size(),
        section,
        priority,
        name
    )
}

fn checksum_line(checksums: &Checksums, cs: ChecksumType, name: &str) -> String {
    format!(
        " {} {} {}",
        checksums.digest(cs).unwrap(),
        checksums.size(),
        name
    )
}

// ------------------------------------------------------------ scenarios

// Happy path: one signed upload, one distribution, one binary package.
#[test]
fn accepts_single_binary_upload() {
    let mut fixture = Fixture::new();
    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\nChecksums-Sha256:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
            checksum_line(&deb, ChecksumType::Sha256, "foo_1.0-1_amd64.deb"),
        ),
    );

    let mut dist = stable();
    dist.uploaders = Some(Uploaders::allowing_key(KEY));
    let status = fixture
        .process(&[dist], &StubSignatures::signed_by(KEY))
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);

    // the deb was hardlinked into the pool under its filekey
    let filekey = "pool/main/f/foo/foo_1.0-1_amd64.deb";
    assert!(fixture.archive.pool_path(filekey).exists());
    assert_eq!(vec![filekey.to_owned()], fixture.archive.hardlinked);

    // and indexed into stable/main
    let add = &fixture.archive.index_adds[0];
    assert_eq!(("stable", "main", "deb"), (add.codename.as_str(), add.component.as_str(), add.kind));
    assert_eq!(("foo", "1.0-1"), (add.name.as_str(), add.version.as_str()));
    assert!(add.control.contains(&format!("Filename: {}", filekey)));
    assert!(add.control.contains("Section: devel"));
    assert!(add.control.contains("SHA256: "));

    // both incoming files are gone, the logger spoke once
    assert!(!fixture.incoming.join("foo_1.0-1_amd64.deb").exists());
    assert!(!fixture.incoming.join("foo_1.0-1_amd64.changes").exists());
    assert_eq!(1, fixture.logger.accepted.len());
    assert_eq!(
        ("stable", "foo", "1.0-1"),
        (
            fixture.logger.accepted[0].0.as_str(),
            fixture.logger.accepted[0].1.as_str(),
            fixture.logger.accepted[0].2.as_str(),
        )
    );

    // nothing staged is left behind
    assert_eq!(0, std::fs::read_dir(fixture.root.join("tmp")).unwrap().count());
}

// A `.dsc` disagreeing with the manifest about a tarball's sha256 sinks
// the whole upload, and the pool stays untouched.
#[test]
fn rejects_checksum_disagreement_between_changes_and_dsc() {
    let mut fixture = Fixture::new();
    let orig = fixture.payload("bar_1.0.orig.tar.gz", "orig tarball bytes");
    let bad_sha256 = "0000000000000000000000000000000000000000000000000000000000000000";
    let dsc = fixture.payload(
        "bar_1.0-1.dsc",
        &format!(
            "Source: bar\nVersion: 1.0-1\nChecksums-Sha256:\n {} {} bar_1.0.orig.tar.gz\nFiles:\n {} {} bar_1.0.orig.tar.gz\n",
            bad_sha256,
            orig.size(),
            orig.digest(ChecksumType::Md5).unwrap(),
            orig.size(),
        ),
    );
    fixture.payload(
        "bar_1.0-1.changes",
        &format!(
            "Source: bar\nBinary: bar\nArchitecture: source\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n{}\nChecksums-Sha256:\n{}\n{}\n",
            file_line(&dsc, "devel", "optional", "bar_1.0-1.dsc"),
            file_line(&orig, "devel", "optional", "bar_1.0.orig.tar.gz"),
            checksum_line(&dsc, ChecksumType::Sha256, "bar_1.0-1.dsc"),
            checksum_line(&orig, ChecksumType::Sha256, "bar_1.0.orig.tar.gz"),
        ),
    );

    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::ChecksumMismatch(_))));

    // nothing reached the pool or any index
    assert!(fixture.archive.pool.is_empty());
    assert!(fixture.archive.index_adds.is_empty());

    // without on_error cleanup, the files stay put
    assert!(fixture.incoming.join("bar_1.0-1.dsc").exists());
    assert!(fixture.incoming.join("bar_1.0.orig.tar.gz").exists());
    assert!(fixture.incoming.join("bar_1.0-1.changes").exists());
}

#[test]
fn on_error_cleanup_deletes_rejected_upload() {
    let mut fixture = Fixture::new();
    fixture.rule.cleanup.on_error = true;

    let orig = fixture.payload("bar_1.0.orig.tar.gz", "orig tarball bytes");
    let bad_sha256 = "0000000000000000000000000000000000000000000000000000000000000000";
    let dsc = fixture.payload(
        "bar_1.0-1.dsc",
        &format!(
            "Source: bar\nVersion: 1.0-1\nChecksums-Sha256:\n {} {} bar_1.0.orig.tar.gz\nFiles:\n {} {} bar_1.0.orig.tar.gz\n",
            bad_sha256,
            orig.size(),
            orig.digest(ChecksumType::Md5).unwrap(),
            orig.size(),
        ),
    );
    fixture.payload(
        "bar_1.0-1.changes",
        &format!(
            "Source: bar\nBinary: bar\nArchitecture: source\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n{}\n",
            file_line(&dsc, "devel", "optional", "bar_1.0-1.dsc"),
            file_line(&orig, "devel", "optional", "bar_1.0.orig.tar.gz"),
        ),
    );

    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(result.is_err());
    assert!(!fixture.incoming.join("bar_1.0-1.dsc").exists());
    assert!(!fixture.incoming.join("bar_1.0.orig.tar.gz").exists());
    assert!(!fixture.incoming.join("bar_1.0-1.changes").exists());
}

// A source upload shipping a tarball the pool already has: the tarball
// is neither staged nor hardlinked, but the new source record still
// references it.
#[test]
fn deduplicates_against_the_pool() {
    let mut fixture = Fixture::new();
    let tarball_content = "the very same tarball";
    let orig = fixture.payload("baz_2.0.orig.tar.gz", tarball_content);
    let tarball_filekey = "pool/main/b/baz/baz_2.0.orig.tar.gz";
    fixture
        .archive
        .seed_pool(tarball_filekey, orig.clone(), tarball_content);

    let debian = fixture.payload("baz_2.0-2.debian.tar.xz", "debian packaging bytes");
    let dsc = fixture.payload(
        "baz_2.0-2.dsc",
        &format!(
            "Source: baz\nVersion: 2.0-2\nFiles:\n {} {} baz_2.0.orig.tar.gz\n {} {} baz_2.0-2.debian.tar.xz\n",
            orig.digest(ChecksumType::Md5).unwrap(),
            orig.size(),
            debian.digest(ChecksumType::Md5).unwrap(),
            debian.size(),
        ),
    );
    fixture.payload(
        "baz_2.0-2.changes",
        &format!(
            "Source: baz\nBinary: baz\nArchitecture: source\nVersion: 2.0-2\n\
             Distribution: stable\nFiles:\n{}\n{}\n{}\n",
            file_line(&dsc, "devel", "optional", "baz_2.0-2.dsc"),
            file_line(&orig, "devel", "optional", "baz_2.0.orig.tar.gz"),
            file_line(&debian, "devel", "optional", "baz_2.0-2.debian.tar.xz"),
        ),
    );

    let status = fixture
        .process(&[stable()], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);

    // only the two new files were brought in
    let mut hardlinked = fixture.archive.hardlinked.clone();
    hardlinked.sort();
    assert_eq!(
        vec![
            "pool/main/b/baz/baz_2.0-2.debian.tar.xz".to_owned(),
            "pool/main/b/baz/baz_2.0-2.dsc".to_owned(),
        ],
        hardlinked,
    );

    // the source record references the pre-existing tarball, whose
    // refcount went up
    let add = &fixture.archive.index_adds[0];
    assert_eq!("dsc", add.kind);
    assert!(add.filekeys.contains(&tarball_filekey.to_owned()));
    assert_eq!(2, fixture.archive.refcounts[tarball_filekey]);
    assert!(add.control.contains("Package: baz"));
    assert!(add.control.contains("Directory: pool/main/b/baz"));
}

// Unsigned upload against a distribution with an uploader policy:
// rejected, and `on_deny` cleans out everything it referenced.
#[test]
fn denies_unsigned_upload_and_cleans_up() {
    let mut fixture = Fixture::new();
    fixture.rule.cleanup.on_deny = true;

    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        ),
    );

    let mut dist = stable();
    dist.uploaders = Some(Uploaders::allowing_key(KEY));
    let result = fixture.process(&[dist], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::PermissionDenied(_))));

    assert!(fixture.archive.pool.is_empty());
    assert!(!fixture.incoming.join("foo_1.0-1_amd64.deb").exists());
    assert!(!fixture.incoming.join("foo_1.0-1_amd64.changes").exists());
}

// `Distribution: unstable experimental`, both allowed, multiple
// distributions not permitted: only the first match is fed.
#[test]
fn multiple_distributions_need_the_permit() {
    let mut fixture = Fixture::new();
    fixture.rule.allow = vec![
        ("unstable".to_owned(), "unstable".to_owned()),
        ("experimental".to_owned(), "experimental".to_owned()),
    ];

    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    let changes_text = format!(
        "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
         Distribution: unstable experimental\nFiles:\n{}\n",
        file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
    );
    fixture.payload("foo_1.0-1_amd64.changes", &changes_text);

    let mut unstable = Distribution::new("unstable");
    unstable.architectures = vec!["source".to_owned(), "amd64".to_owned()];
    let mut experimental = Distribution::new("experimental");
    experimental.architectures = vec!["source".to_owned(), "amd64".to_owned()];

    let status = fixture
        .process(
            &[unstable.clone(), experimental.clone()],
            &StubSignatures::unsigned(),
        )
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);
    assert_eq!(1, fixture.archive.index_adds.len());
    assert_eq!("unstable", fixture.archive.index_adds[0].codename);

    // with the permit, the same upload goes into both
    let mut fixture = Fixture::new();
    fixture.rule.allow = vec![
        ("unstable".to_owned(), "unstable".to_owned()),
        ("experimental".to_owned(), "experimental".to_owned()),
    ];
    fixture.rule.permit.multiple_distributions = true;
    fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload("foo_1.0-1_amd64.changes", &changes_text);

    let status = fixture
        .process(&[unstable, experimental], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);
    let mut codenames: Vec<&str> = fixture
        .archive
        .index_adds
        .iter()
        .map(|add| add.codename.as_str())
        .collect();
    codenames.sort();
    assert_eq!(vec!["experimental", "unstable"], codenames);
}

// The index already has a newer version: the dry run skips the package,
// the manifest amounts to nothing, and its files are taken out of the
// queue.
#[test]
fn skips_older_version_without_permit() {
    let mut fixture = Fixture::new();
    fixture.archive.seed_index("stable", "main", "deb", "qux", "2.0");

    let deb = fixture.payload(
        "qux_1.0_amd64.deb",
        &deb_content("qux", "1.0", "qux", "amd64"),
    );
    fixture.payload(
        "qux_1.0_amd64.changes",
        &format!(
            "Source: qux\nBinary: qux\nArchitecture: amd64\nVersion: 1.0\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "qux_1.0_amd64.deb"),
        ),
    );

    let status = fixture
        .process(&[stable()], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::NothingDone, status);

    // nothing was installed
    assert!(fixture.archive.hardlinked.is_empty());
    assert!(fixture.archive.index_adds.is_empty());
    assert_eq!(
        "2.0",
        fixture.archive.indexes[&("stable".to_owned(), "main".to_owned(), "deb")]["qux"]
            .to_string()
    );
    assert!(fixture.logger.accepted.is_empty());

    // the files the manifest used are taken out of the queue anyway
    assert!(!fixture.incoming.join("qux_1.0_amd64.deb").exists());
    assert!(!fixture.incoming.join("qux_1.0_amd64.changes").exists());
}

// Same situation with the `older_version` permit: the older upload goes
// in.
#[test]
fn older_version_permit_installs_anyway() {
    let mut fixture = Fixture::new();
    fixture.rule.permit.older_version = true;
    fixture.archive.seed_index("stable", "main", "deb", "qux", "2.0");

    let deb = fixture.payload(
        "qux_1.0_amd64.deb",
        &deb_content("qux", "1.0", "qux", "amd64"),
    );
    fixture.payload(
        "qux_1.0_amd64.changes",
        &format!(
            "Source: qux\nBinary: qux\nArchitecture: amd64\nVersion: 1.0\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "qux_1.0_amd64.deb"),
        ),
    );

    let status = fixture
        .process(&[stable()], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);
    assert_eq!(1, fixture.archive.index_adds.len());
}

// An architecture no destination carries is policy conflict, not a
// crash.
#[test]
fn rejects_architecture_no_destination_carries() {
    let mut fixture = Fixture::new();
    let deb = fixture.payload(
        "foo_1.0-1_armel.deb",
        &deb_content("foo", "1.0-1", "foo", "armel"),
    );
    fixture.payload(
        "foo_1.0-1_armel.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: armel\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_armel.deb"),
        ),
    );

    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::Conflict(_))));
    assert!(fixture.archive.pool.is_empty());
}

// An unused file is fatal without the permit, waved through with it,
// and deleted with the cleanup flag on top.
#[test]
fn unused_files_follow_permit_and_cleanup() {
    let mut fixture = Fixture::new();
    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    let stray = fixture.payload("foo_1.0-1_amd64.buildinfo", "buildinfo bytes");
    let changes_text = format!(
        "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
         Distribution: stable\nFiles:\n{}\n{}\n",
        file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        file_line(&stray, "devel", "optional", "foo_1.0-1_amd64.buildinfo"),
    );
    fixture.payload("foo_1.0-1_amd64.changes", &changes_text);

    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::Conflict(_))));

    // permit it, and ask for the leftovers to be cleaned up
    let mut fixture = Fixture::new();
    fixture.rule.permit.unused_files = true;
    fixture.rule.cleanup.unused_files = true;
    fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload("foo_1.0-1_amd64.buildinfo", "buildinfo bytes");
    fixture.payload("foo_1.0-1_amd64.changes", &changes_text);

    let status = fixture
        .process(&[stable()], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);
    assert!(!fixture.incoming.join("foo_1.0-1_amd64.buildinfo").exists());
}

// Tracking with include_changes: the manifest itself lands in the pool
// and is recorded, and the logger learns its filekey.
#[test]
fn tracking_records_the_manifest_itself() {
    let mut fixture = Fixture::new();
    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        ),
    );

    let mut dist = stable();
    dist.tracking.enabled = true;
    dist.tracking.include_changes = true;

    let status = fixture
        .process(&[dist], &StubSignatures::unsigned())
        .unwrap();
    assert_eq!(IncomingStatus::Accepted, status);

    let changes_filekey = "pool/main/f/foo/foo_1.0-1_amd64.changes";
    assert!(fixture.archive.pool_path(changes_filekey).exists());
    assert!(fixture
        .archive
        .tracking
        .iter()
        .any(|(_, source, kind, filekeys)| source == "foo"
            && *kind == TrackedKind::Changes
            && filekeys.contains(&changes_filekey.to_owned())));
    assert!(fixture
        .archive
        .tracking
        .iter()
        .any(|(_, _, kind, _)| *kind == TrackedKind::Binary));
    assert_eq!(
        Some(changes_filekey.to_owned()),
        fixture.logger.accepted[0].3
    );
}

// A backend failure during the index phase rolls the pool back; a
// rejected manifest leaves no new filekeys behind.
#[test]
fn index_failure_rolls_back_pool_files() {
    let mut fixture = Fixture::new();
    fixture.archive.fail_add_package_for = Some("foo".to_owned());

    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        ),
    );

    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::Backend(_))));
    assert!(fixture.archive.pool.is_empty());
    assert!(!fixture
        .archive
        .pool_path("pool/main/f/foo/foo_1.0-1_amd64.deb")
        .exists());
    assert!(fixture.logger.accepted.is_empty());
}

// A raised interrupt flag stops the commit and rolls back, like any
// other failure.
#[test]
fn interrupt_rolls_back_the_commit() {
    let mut fixture = Fixture::new();
    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        ),
    );

    let interrupt = AtomicBool::new(true);
    let distributions = [stable()];
    let signatures = StubSignatures::unsigned();
    let mut processor = IncomingProcessor::new(
        &fixture.rule,
        &distributions,
        &mut fixture.archive,
        &ParagraphDebs,
        &signatures,
        &mut fixture.logger,
    )
    .with_interrupt(&interrupt);

    let result = processor.process(None);
    assert!(matches!(result, Err(IncomingError::Interrupted)));
    assert!(fixture.archive.pool.is_empty());
    assert!(fixture.archive.index_adds.is_empty());
}

// One bad manifest doesn't keep the next one from being accepted.
#[test]
fn one_failure_does_not_stop_the_run() {
    let mut fixture = Fixture::new();

    // "aaa" sorts first and is broken: it references a file that isn't
    // there
    fixture.payload(
        "aaa_1.0_amd64.changes",
        "Source: aaa\nBinary: aaa\nArchitecture: amd64\nVersion: 1.0\n\
         Distribution: stable\nFiles:\n \
         d41d8cd98f00b204e9800998ecf8427e 0 devel optional aaa_1.0_amd64.deb\n",
    );
    let deb = fixture.payload(
        "foo_1.0-1_amd64.deb",
        &deb_content("foo", "1.0-1", "foo", "amd64"),
    );
    fixture.payload(
        "foo_1.0-1_amd64.changes",
        &format!(
            "Source: foo\nBinary: foo\nArchitecture: amd64\nVersion: 1.0-1\n\
             Distribution: stable\nFiles:\n{}\n",
            file_line(&deb, "devel", "optional", "foo_1.0-1_amd64.deb"),
        ),
    );

    // the run reports the failure, but foo went in regardless
    let result = fixture.process(&[stable()], &StubSignatures::unsigned());
    assert!(matches!(result, Err(IncomingError::Missing(_))));
    assert_eq!(1, fixture.archive.index_adds.len());
    assert_eq!("foo", fixture.archive.index_adds[0].name);
}

// vim: foldmethod=marker
