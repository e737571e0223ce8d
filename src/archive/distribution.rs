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

//! Distributions (suites) within the archive and the per-distribution
//! overrides and tracking policy that govern how uploads are accepted
//! into them.

use super::{overrides::OverrideTable, uploaders::Uploaders};

/// Whether and how a distribution remembers which files belong to which
/// source upload.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackingPolicy {
    /// Tracking rows are recorded at all.
    pub enabled: bool,

    /// The upload manifest itself is kept in the pool and recorded, too.
    pub include_changes: bool,
}

/// The per-package override tables of one distribution, one per package
/// kind.
#[derive(Clone, Debug, Default)]
pub struct DistributionOverrides {
    /// Overrides applied to binary packages.
    pub deb: OverrideTable,

    /// Overrides applied to installer binary packages.
    pub udeb: OverrideTable,

    /// Overrides applied to source packages.
    pub dsc: OverrideTable,
}

/// One destination repository: a codename plus everything the upload
/// pipeline needs to know to decide whether and where a package may land
/// in it.
#[derive(Clone, Debug)]
pub struct Distribution {
    /// Codename the distribution goes by (`unstable`, `bookworm`, ...).
    pub codename: String,

    /// Components of the distribution, most preferred first. The first
    /// one doubles as the fallback when a section gives no hint.
    pub components: Vec<String>,

    /// The subset of components installer packages may go to.
    pub udeb_components: Vec<String>,

    /// Architectures carried by this distribution, including `source`
    /// if source uploads are accepted.
    pub architectures: Vec<String>,

    /// Uploader policy. [None] means anybody may upload.
    pub uploaders: Option<Uploaders>,

    /// Tracking behavior.
    pub tracking: TrackingPolicy,

    /// Override tables.
    pub overrides: DistributionOverrides,
}

impl Distribution {
    /// A distribution with the given codename, one `main` component and
    /// no restrictions. Intended as a starting point for configuration
    /// loaders (and tests).
    pub fn new(codename: &str) -> Self {
        Distribution {
            codename: codename.to_owned(),
            components: vec!["main".to_owned()],
            udeb_components: vec![],
            architectures: vec![],
            uploaders: None,
            tracking: TrackingPolicy::default(),
            overrides: DistributionOverrides::default(),
        }
    }

    /// Derive the component a file belongs to from its section.
    ///
    /// A section naming a component (`contrib`) or prefixed by one
    /// (`contrib/net`) picks that component; anything else falls back
    /// to the first configured component. Returns [None] only when the
    /// distribution has no components at all.
    pub fn guess_component(&self, section: &str) -> Option<&str> {
        for component in &self.components {
            if section == *component {
                return Some(component);
            }
        }
        if let Some((prefix, _)) = section.split_once('/') {
            for component in &self.components {
                if prefix == *component {
                    return Some(component);
                }
            }
        }
        self.components.first().map(String::as_str)
    }
}

/// Find a distribution by codename within a configured set.
pub fn find<'a>(distributions: &'a [Distribution], codename: &str) -> Option<&'a Distribution> {
    distributions
        .iter()
        .find(|distribution| distribution.codename == codename)
}

/// Find the index of a distribution by codename within a configured set.
pub fn find_index(distributions: &[Distribution], codename: &str) -> Option<usize> {
    distributions
        .iter()
        .position(|distribution| distribution.codename == codename)
}


// vim: foldmethod=marker
