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

//! Name grammars for the identifiers that end up in pool paths and index
//! records. Everything the archive writes to disk is derived from these,
//! so they are checked before anything else gets to look at the values.

/// Error conditions which may be encountered when validating a package,
/// source or file name.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NameError {
    /// The name is empty.
    Empty,

    /// Package and source names must be at least two characters.
    TooShort,

    /// The name must start with a lowercase letter or digit.
    InvalidStart,

    /// The name contains a character outside its grammar.
    InvalidCharacter,
}
crate::errors::error_enum!(NameError);

fn check_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() < 2 {
        return Err(NameError::TooShort);
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(NameError::InvalidStart);
    }
    for ch in chars {
        let ok = ch.is_ascii_lowercase() || ch.is_ascii_digit() || "+-.".contains(ch);
        if !ok {
            return Err(NameError::InvalidCharacter);
        }
    }
    Ok(())
}

/// Check a source package name: lowercase alphanumerics plus `+-.`,
/// starting with an alphanumeric, at least two characters long.
pub fn check_source_name(name: &str) -> Result<(), NameError> {
    check_name(name)
}

/// Check a binary package name. The grammar is the same as for source
/// package names.
pub fn check_package_name(name: &str) -> Result<(), NameError> {
    check_name(name)
}

/// Check a string destined to become part of a file name within the
/// pool: printable ASCII only, and no path separators.
pub fn check_filename_part(part: &str) -> Result<(), NameError> {
    if part.is_empty() {
        return Err(NameError::Empty);
    }
    for ch in part.chars() {
        if !ch.is_ascii_graphic() || ch == '/' {
            return Err(NameError::InvalidCharacter);
        }
    }
    Ok(())
}

/// Split a `Source`-style field value of the form `name [(version)]` into
/// its name and optional version text. The upload pipeline uses the
/// version part to spot binary-only rebuilds, where the source version
/// differs from the upload version.
pub fn split_name_and_version(value: &str) -> Result<(&str, Option<&str>), NameError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NameError::Empty);
    }
    let Some((name, version)) = value.split_once(' ') else {
        return Ok((value, None));
    };
    let version = version.trim();
    if !version.starts_with('(') || !version.ends_with(')') || version.len() < 3 {
        return Err(NameError::InvalidCharacter);
    }
    Ok((name, Some(&version[1..version.len() - 1])))
}


// vim: foldmethod=marker
