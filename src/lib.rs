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

#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! The `deb-incoming` crate processes the incoming upload queue of a
//! Debian-style package archive.
//!
//! An upload is a signed manifest (a `.changes` file) plus the files it
//! references, dropped into an incoming directory. This crate takes it
//! from there: scan the directory, verify signatures and uploader
//! permissions, reconcile checksums across every list that mentions a
//! file, stage copies, deduplicate against the content-addressed pool,
//! dry-run the index additions, and finally commit -- hardlinks into
//! the pool, records into the per-distribution indexes, rows into the
//! tracking database -- with rollback on every failure path.
//!
//! The interesting entry point is [incoming::IncomingProcessor]. The
//! archive's storage engine stays behind the [archive::Archive] trait;
//! binary package parsing stays behind [archive::BinaryReader]; OpenPGP
//! verification ships in-crate ([control::signed::OpenPgpVerifier]) but
//! is likewise consumed as a trait, so none of it is load-bearing for
//! testing the pipeline.
//!
//! # A quick tour
//!
//! - [incoming] -- the queue processor itself: rules, directory state,
//!   candidates, permission checks, preparation, install and cleanup.
//! - [archive] -- the model of the destination archive: distributions,
//!   uploader policies, override tables, filekey calculation, and the
//!   backend traits.
//! - [control] -- deb822 paragraphs, manifest file lists, source
//!   descriptions, the OpenPGP layer, and name grammars.
//! - [checksums] -- multi-algorithm digest bookkeeping with monotone
//!   merging.
//! - [version] -- Debian version parsing and ordering.

pub mod archive;
pub mod checksums;
pub mod control;
pub mod incoming;
pub mod version;

mod errors;

// vim: foldmethod=marker
