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

//! Filekey calculation: where inside the content-addressed pool a file
//! logically lives.
//!
//! A filekey is a relative path of the form
//! `pool/<component>/<prefix>/<source>/<basename>`. The prefix is the
//! first letter of the source package, except for the `lib*` packages,
//! which are so numerous they get their own `lib<letter>` shelves.
//! Everything feeding into a filekey has been through the grammars in
//! [crate::control::names] first.

use super::PackageKind;
use crate::version::Version;

/// The pool sharding prefix for a source package name: `libfoo` files
/// under `libf/`, everything else under its first letter.
pub fn source_prefix(source: &str) -> &str {
    if source.starts_with("lib") && source.len() > 3 {
        &source[..4]
    } else {
        &source[..1]
    }
}

/// The pool directory all files of a source package share within one
/// component.
pub fn source_dir(component: &str, source: &str) -> String {
    format!("pool/{}/{}/{}", component, source_prefix(source), source)
}

/// The filekey for `basename` filed under a source package's pool
/// directory.
pub fn filekey(component: &str, source: &str, basename: &str) -> String {
    format!("{}/{}", source_dir(component, source), basename)
}

/// The conventional basename of a binary package file:
/// `name_version_architecture.deb` (or `.udeb`), version without its
/// epoch.
pub fn binary_basename(
    name: &str,
    version: &Version,
    architecture: &str,
    kind: PackageKind,
) -> String {
    format!(
        "{}_{}_{}.{}",
        name,
        version.without_epoch(),
        architecture,
        kind.extension()
    )
}


// vim: foldmethod=marker
