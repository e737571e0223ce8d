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

//! Reading of (possibly) OpenPGP signed control files, using the
//! [sequoia_openpgp] crate so nobody here has to touch the really error
//! prone low-level API directly.
//!
//! The upload pipeline never *requires* a signature at this layer -- an
//! unsigned manifest is handed through with empty key sets, and whether
//! that is acceptable is a policy question answered much later, against
//! the destination distribution's uploader rules. What this layer does
//! guarantee is an honest account of the signatures it saw: which keys
//! verified, which keys were claimed, and whether every claimed
//! signature failed.

use sequoia_openpgp::{
    cert::CertParser,
    packet::Signature,
    parse::{
        stream::{MessageLayer, MessageStructure, VerificationError, VerificationHelper, VerifierBuilder},
        Parse,
    },
    policy::StandardPolicy,
    Cert, Fingerprint, KeyHandle, Result as SequoiaResult,
};
use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};

const CLEARSIGN_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// The result of reading a (possibly) signed control file.
#[derive(Clone, Debug)]
pub struct SignedBlock {
    /// The cleartext body -- the signed content for a signed file, the
    /// whole file otherwise.
    pub body: String,

    /// Key identifiers (fingerprints, as uppercase hex) whose signatures
    /// verified against the configured keyrings.
    pub valid_keys: Vec<String>,

    /// Key identifiers of *every* signature on the file, verified or
    /// not.
    pub all_keys: Vec<String>,

    /// True when the file carries signatures but not one of them
    /// verified.
    pub broken: bool,
}

/// Error conditions which may be encountered when reading a signed
/// control file.
#[derive(Debug)]
pub enum SignedReadError {
    /// Underlying i/o error.
    Io(std::io::Error),

    /// The file (or its signed body) wasn't UTF-8 text.
    NotText,

    /// Underlying issue with the [sequoia_openpgp] crate.
    OpenPgp(anyhow::Error),
}
crate::errors::error_enum!(SignedReadError);

/// Something that can read a control file which may carry OpenPGP
/// signatures, producing the body plus an account of the signatures.
///
/// The upload pipeline consumes this as a trait so tests (and archives
/// with their own ideas about key management) can substitute their own
/// implementation; [OpenPgpVerifier] is the stock one.
pub trait SignedReader {
    /// Read the file at `path` and peel off the signature layer.
    fn read_signed(&self, path: &Path) -> Result<SignedBlock, SignedReadError>;
}

/// Builder-pattern to create an [OpenPgpVerifier] from a set of keyring
/// files.
#[derive(Clone, Debug, Default)]
pub struct OpenPgpVerifierBuilder {
    keyrings: Vec<PathBuf>,
}

/// The stock [SignedReader]: verifies clearsigned control files against
/// OpenPGP keyrings.
#[derive(Clone)]
pub struct OpenPgpVerifier {
    keys: HashMap<Fingerprint, Cert>,
}

impl OpenPgpVerifierBuilder {
    /// Use the provided keyring. This appends to the set of known keys
    /// rather than replacing it.
    pub fn with_keyring(mut self, path: &Path) -> Self {
        self.keyrings.push(path.to_owned());
        self
    }

    /// Build the [OpenPgpVerifier].
    pub fn build(self) -> Result<OpenPgpVerifier, SignedReadError> {
        let mut keys = HashMap::new();
        for keyring in self.keyrings {
            for cert in CertParser::from_file(keyring).map_err(SignedReadError::OpenPgp)? {
                let cert = cert.map_err(SignedReadError::OpenPgp)?;
                keys.insert(cert.fingerprint(), cert.clone());
                for key in cert.keys() {
                    keys.insert(key.key().fingerprint(), cert.clone());
                }
            }
        }
        Ok(OpenPgpVerifier { keys })
    }
}

// Prefer the fingerprint subpackets; fall back to the short issuer key
// ids for signatures that don't carry any.
fn issuer_strings(sig: &Signature) -> Vec<String> {
    let fingerprints: Vec<String> = sig
        .issuer_fingerprints()
        .map(|fingerprint| fingerprint.to_hex())
        .collect();
    if !fingerprints.is_empty() {
        return fingerprints;
    }
    sig.issuers().map(|keyid| keyid.to_hex()).collect()
}

fn push_unique(keys: &mut Vec<String>, value: String) {
    if !keys.contains(&value) {
        keys.push(value);
    }
}

impl OpenPgpVerifier {
    /// Return a new [OpenPgpVerifierBuilder].
    pub fn build() -> OpenPgpVerifierBuilder {
        Default::default()
    }

    fn verify(&self, message: &[u8]) -> Result<SignedBlock, SignedReadError> {
        let policy = &StandardPolicy::new();

        struct Helper<'a> {
            verifier: &'a OpenPgpVerifier,
            valid: Vec<String>,
            all: Vec<String>,
        }

        impl VerificationHelper for &mut Helper<'_> {
            fn get_certs(&mut self, _ids: &[KeyHandle]) -> SequoiaResult<Vec<Cert>> {
                Ok(self.verifier.keys.values().cloned().collect())
            }

            fn check(&mut self, structure: MessageStructure) -> SequoiaResult<()> {
                for layer in structure.into_iter() {
                    let MessageLayer::SignatureGroup { results } = layer else {
                        continue;
                    };
                    for result in results {
                        match result {
                            Ok(good) => {
                                for key in issuer_strings(good.sig) {
                                    push_unique(&mut self.all, key.clone());
                                    push_unique(&mut self.valid, key);
                                }
                            }
                            Err(err) => {
                                let sig = match err {
                                    VerificationError::MalformedSignature { sig, .. } => sig,
                                    VerificationError::MissingKey { sig, .. } => sig,
                                    VerificationError::UnboundKey { sig, .. } => sig,
                                    VerificationError::BadKey { sig, .. } => sig,
                                    VerificationError::BadSignature { sig, .. } => sig,
                                    _ => continue,
                                };
                                for key in issuer_strings(sig) {
                                    push_unique(&mut self.all, key);
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
        }

        let mut helper = Helper {
            verifier: self,
            valid: vec![],
            all: vec![],
        };

        let mut verifier = VerifierBuilder::from_bytes(message)
            .map_err(SignedReadError::OpenPgp)?
            .with_policy(policy, None, &mut helper)
            .map_err(SignedReadError::OpenPgp)?;

        let mut content = vec![];
        verifier
            .read_to_end(&mut content)
            .map_err(SignedReadError::Io)?;

        let Helper { valid, all, .. } = helper;
        let broken = valid.is_empty() && !all.is_empty();
        Ok(SignedBlock {
            body: String::from_utf8(content).map_err(|_| SignedReadError::NotText)?,
            valid_keys: valid,
            all_keys: all,
            broken,
        })
    }
}

impl SignedReader for OpenPgpVerifier {
    fn read_signed(&self, path: &Path) -> Result<SignedBlock, SignedReadError> {
        let raw = std::fs::read(path).map_err(SignedReadError::Io)?;
        let text = String::from_utf8(raw).map_err(|_| SignedReadError::NotText)?;

        if !text.trim_start().starts_with(CLEARSIGN_HEADER) {
            return Ok(SignedBlock {
                body: text,
                valid_keys: vec![],
                all_keys: vec![],
                broken: false,
            });
        }

        match self.verify(text.as_bytes()) {
            Ok(block) => Ok(block),
            Err(err) => {
                // The signature layer is unusable. Salvage the body so
                // diagnostics can still name the upload; the empty key
                // sets plus `broken` keep it from being accepted.
                tracing::warn!(path = %path.display(), error = %err,
                    "signature layer could not be parsed");
                match strip_clearsign(&text) {
                    Some(body) => Ok(SignedBlock {
                        body,
                        valid_keys: vec![],
                        all_keys: vec![],
                        broken: true,
                    }),
                    None => Err(err),
                }
            }
        }
    }
}

/// Extract the body of a clearsigned text without touching the
/// signature. Returns [None] if the input doesn't look clearsigned.
pub(crate) fn strip_clearsign(text: &str) -> Option<String> {
    let mut lines = text.lines();

    loop {
        let line = lines.next()?;
        if line.trim() == CLEARSIGN_HEADER {
            break;
        }
        if !line.trim().is_empty() {
            return None;
        }
    }
    // armor headers ("Hash: SHA256") run until the first empty line
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
    }

    let mut body = String::new();
    for line in lines {
        if line.trim() == SIGNATURE_HEADER {
            return Some(body);
        }
        // dash-escaped lines
        let line = line.strip_prefix("- ").unwrap_or(line);
        body.push_str(line);
        body.push('\n');
    }
    None
}


// vim: foldmethod=marker
