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

use pest::{error::Error as PestError, iterators::Pair, Parser};

mod grammar {
    #[derive(pest_derive::Parser)]
    #[grammar = "control/deb822.pest"]
    pub(super) struct Deb822Parser;
}
use grammar::{Deb822Parser, Rule};

/// One Key/Value pair of a [Paragraph].
///
/// The value is stored line-wise: `lines[0]` is whatever followed the
/// colon (possibly empty), the rest are the continuation lines. Every
/// line is stored trimmed; [Paragraph] re-indents on output.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    key: String,
    lines: Vec<String>,
}

impl Field {
    /// Key name of the Field.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value with line structure flattened out, leading and trailing
    /// whitespace removed.
    pub fn value(&self) -> String {
        self.lines.join("\n").trim().to_owned()
    }
}

/// A single deb822 paragraph: an ordered series of Key/Value [Field]s.
///
/// This is the working representation for everything the upload pipeline
/// touches -- manifest bodies, `.dsc` bodies, rule files, and the
/// rewritten records it hands to index backends. Mutation is limited to
/// [Paragraph::set] and [Paragraph::remove]; [std::fmt::Display] renders
/// the paragraph back out in field order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Paragraph {
    fields: Vec<Field>,
}

/// Error conditions which may be encountered when parsing a [Paragraph].
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Error parsing the formatted paragraph, along with where in the
    /// input it all went wrong.
    Parse((String, pest::error::InputLocation)),

    /// Something wasn't properly encoded within the Paragraph.
    Malformed,
}
crate::errors::error_enum!(Error);

impl From<PestError<Rule>> for Error {
    fn from(err: PestError<Rule>) -> Self {
        Error::Parse((err.variant.message().into(), err.location))
    }
}

impl TryFrom<Pair<'_, Rule>> for Field {
    type Error = Error;

    fn try_from(token: Pair<'_, Rule>) -> Result<Self, Error> {
        let mut key: Option<String> = None;
        let mut lines = vec![];

        for part in token.into_inner() {
            match part.as_rule() {
                Rule::field_name => {
                    key = Some(part.as_str().to_owned());
                }
                Rule::line_rest | Rule::cont_line => {
                    lines.push(part.as_str().trim().to_owned());
                }
                _ => continue,
            };
        }

        let Some(key) = key else {
            return Err(Error::Malformed);
        };
        if lines.is_empty() {
            lines.push(String::new());
        }

        Ok(Field { key, lines })
    }
}

impl TryFrom<Pair<'_, Rule>> for Paragraph {
    type Error = Error;

    fn try_from(token: Pair<'_, Rule>) -> Result<Self, Error> {
        let mut ret = Self { fields: vec![] };
        for token in token.into_inner() {
            if token.as_rule() == Rule::field {
                ret.fields.push(token.try_into()?);
            }
        }
        Ok(ret)
    }
}

impl Paragraph {
    /// Parse exactly one deb822 paragraph. Leading and trailing blank
    /// lines are tolerated; a second paragraph is not.
    pub fn parse(paragraph: &str) -> Result<Self, Error> {
        let tokens = Deb822Parser::parse(Rule::single_paragraph, paragraph)?;
        let Some(token) = tokens.into_iter().next() else {
            return Err(Error::Malformed);
        };
        for token in token.into_inner() {
            if token.as_rule() == Rule::paragraph {
                return token.try_into();
            }
        }
        Err(Error::Malformed)
    }

    /// Parse a whole file of blank-line separated paragraphs. An input
    /// with nothing in it yields no paragraphs.
    pub fn parse_all(file: &str) -> Result<Vec<Self>, Error> {
        if file.trim().is_empty() {
            return Ok(vec![]);
        }
        let tokens = Deb822Parser::parse(Rule::file, file)?;
        let Some(token) = tokens.into_iter().next() else {
            return Err(Error::Malformed);
        };
        let mut ret = vec![];
        for token in token.into_inner() {
            if token.as_rule() == Rule::paragraph {
                ret.push(token.try_into()?);
            }
        }
        Ok(ret)
    }

    /// Iterate over all [Field]s, in paragraph order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Look up a Field by its exact key name.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Flattened value of the named field, if present.
    pub fn value(&self, key: &str) -> Option<String> {
        self.field(key).map(Field::value)
    }

    /// The part of the named field's value that sat on the same line as
    /// the key.
    pub fn first_line(&self, key: &str) -> Option<&str> {
        self.field(key).map(|field| field.lines[0].as_str())
    }

    /// The continuation lines of the named field, skipping empty ones.
    /// This is how the list-shaped fields (`Files`, `Checksums-*`) carry
    /// their entries.
    pub fn extra_lines(&self, key: &str) -> Option<impl Iterator<Item = &str>> {
        self.field(key).map(|field| {
            field
                .lines
                .iter()
                .skip(1)
                .map(String::as_str)
                .filter(|line| !line.is_empty())
        })
    }

    /// The whitespace-separated words of the named field, across all of
    /// its lines.
    pub fn words(&self, key: &str) -> Option<Vec<String>> {
        self.field(key).map(|field| {
            field
                .lines
                .iter()
                .flat_map(|line| line.split_whitespace())
                .map(str::to_owned)
                .collect()
        })
    }

    /// Set the named field, replacing its value if the key is already
    /// present, appending the field at the end otherwise. Embedded
    /// newlines become continuation lines.
    pub fn set(&mut self, key: &str, value: &str) {
        let lines: Vec<String> = value
            .split('\n')
            .map(|line| line.trim().to_owned())
            .collect();
        match self.fields.iter_mut().find(|field| field.key == key) {
            Some(field) => field.lines = lines,
            None => self.fields.push(Field {
                key: key.to_owned(),
                lines,
            }),
        }
    }

    /// Rename a field in place, keeping its position and value.
    /// Returns whether the field existed.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.fields.iter_mut().find(|field| field.key == from) {
            Some(field) => {
                field.key = to.to_owned();
                true
            }
            None => false,
        }
    }

    /// Drop the named field. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|field| field.key != key);
        self.fields.len() != before
    }
}

impl std::fmt::Display for Paragraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        for field in &self.fields {
            if field.lines[0].is_empty() && field.lines.len() > 1 {
                writeln!(f, "{}:", field.key)?;
            } else {
                writeln!(f, "{}: {}", field.key, field.lines[0])?;
            }
            for line in &field.lines[1..] {
                if line.is_empty() {
                    writeln!(f, " .")?;
                } else {
                    writeln!(f, " {}", line)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let paragraph = Paragraph::parse("Source: hello\nVersion: 2.10-3\n").unwrap();
        assert_eq!(Some("hello".to_owned()), paragraph.value("Source"));
        assert_eq!(Some("2.10-3".to_owned()), paragraph.value("Version"));
        assert_eq!(None, paragraph.value("Binary"));
    }

    #[test]
    fn continuation_lines() {
        let paragraph = Paragraph::parse(
            "Files:\n abc 1 sect opt one.deb\n def 2 sect opt two.deb\nSource: hello\n",
        )
        .unwrap();
        let lines: Vec<_> = paragraph.extra_lines("Files").unwrap().collect();
        assert_eq!(
            vec!["abc 1 sect opt one.deb", "def 2 sect opt two.deb"],
            lines
        );
        assert_eq!(Some("hello".to_owned()), paragraph.value("Source"));
    }

    #[test]
    fn comments_are_skipped() {
        let paragraph =
            Paragraph::parse("# leading comment\nSource: hello\n# inner\nVersion: 1.0\n").unwrap();
        assert_eq!(2, paragraph.iter().count());
    }

    #[test]
    fn words_span_lines() {
        let paragraph = Paragraph::parse("Binary: hello\n hello-doc hello-dbg\n").unwrap();
        assert_eq!(
            Some(vec![
                "hello".to_owned(),
                "hello-doc".to_owned(),
                "hello-dbg".to_owned()
            ]),
            paragraph.words("Binary"),
        );
    }

    #[test]
    fn rejects_two_paragraphs() {
        assert!(Paragraph::parse("A: 1\n\nB: 2\n").is_err());
    }

    #[test]
    fn parse_all_splits_paragraphs() {
        let paragraphs = Paragraph::parse_all("A: 1\n\nB: 2\n\n\nC: 3\n").unwrap();
        assert_eq!(3, paragraphs.len());
        assert_eq!(Some("2".to_owned()), paragraphs[1].value("B"));
    }

    #[test]
    fn parse_all_empty() {
        assert_eq!(0, Paragraph::parse_all("").unwrap().len());
        assert_eq!(0, Paragraph::parse_all("\n\n").unwrap().len());
    }

    #[test]
    fn set_and_render() {
        let mut paragraph = Paragraph::parse("Package: hello\nVersion: 1.0\n").unwrap();
        paragraph.set("Version", "2.0");
        paragraph.set("Filename", "pool/main/h/hello/hello_2.0_amd64.deb");
        paragraph.set("Files", "\nabc 1 one\ndef 2 two");
        assert_eq!(
            "Package: hello\n\
             Version: 2.0\n\
             Filename: pool/main/h/hello/hello_2.0_amd64.deb\n\
             Files:\n abc 1 one\n def 2 two\n",
            paragraph.to_string(),
        );
    }

    #[test]
    fn render_reparses() {
        let mut paragraph = Paragraph::default();
        paragraph.set("Package", "hello");
        paragraph.set("Description", "example\nlong text here");
        let rendered = paragraph.to_string();
        let reparsed = Paragraph::parse(&rendered).unwrap();
        assert_eq!(paragraph, reparsed);
    }

    #[test]
    fn remove() {
        let mut paragraph = Paragraph::parse("A: 1\nB: 2\n").unwrap();
        assert!(paragraph.remove("A"));
        assert!(!paragraph.remove("A"));
        assert_eq!(None, paragraph.value("A"));
    }
}

// vim: foldmethod=marker
