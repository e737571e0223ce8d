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

use super::{
    candidate::{Candidate, PerDistribution},
    IncomingError, IncomingProcessor, IncomingState,
};
use crate::archive::{distribution, Distribution};

impl IncomingProcessor<'_> {
    /// Route the manifest's `Distribution` names through the rule's
    /// `Allow` table (and `Default`), keeping the destinations whose
    /// uploader policy accepts the signer. With the
    /// `multiple_distributions` permit unset, the first name that lands
    /// somewhere wins.
    ///
    /// When nothing accepts the upload, the `on_deny` cleanup flag gets
    /// its due and the manifest is rejected.
    pub(crate) fn resolve_destinations(
        &self,
        state: &mut IncomingState,
        candidate: &mut Candidate,
    ) -> Result<(), IncomingError> {
        let mut tried = false;

        'names: for name in &candidate.distributions {
            for (pattern, target) in &self.rule.allow {
                if pattern != name {
                    continue;
                }
                tried = true;
                let Some(idx) = distribution::find_index(self.distributions, target) else {
                    return Err(IncomingError::Conflict(format!(
                        "rule '{}' references unknown distribution '{}'",
                        self.rule.name, target
                    )));
                };
                if self.permitted(state, candidate, idx) {
                    if !candidate.perdistribution.iter().any(|per| per.into == idx) {
                        candidate.perdistribution.push(PerDistribution {
                            into: idx,
                            skip: false,
                            packages: vec![],
                        });
                    }
                    break;
                }
            }
            if !candidate.perdistribution.is_empty() && !self.rule.permit.multiple_distributions {
                break 'names;
            }
        }

        if candidate.perdistribution.is_empty() {
            if let Some(target) = &self.rule.default_into {
                tried = true;
                if let Some(idx) = distribution::find_index(self.distributions, target) {
                    if self.permitted(state, candidate, idx) {
                        candidate.perdistribution.push(PerDistribution {
                            into: idx,
                            skip: false,
                            packages: vec![],
                        });
                    }
                }
            }
        }

        if candidate.perdistribution.is_empty() {
            let changes = state.basename(candidate.ofs).to_owned();
            if tried {
                tracing::error!(%changes, "no distribution accepting this upload");
            } else {
                tracing::error!(%changes, "no distribution found for this upload");
            }
            if self.rule.cleanup.on_deny {
                state.mark_delete(candidate.ofs);
                // the owner-checking variant is reserved and never set,
                // so this always deletes the referenced files too
                if !self.rule.cleanup.on_deny_check_owner {
                    for file in &candidate.files {
                        state.mark_delete(file.ofs);
                    }
                }
            }
            return Err(IncomingError::PermissionDenied(changes));
        }
        Ok(())
    }

    // Does the uploader policy of this distribution let the candidate
    // in? On the way to "no", log the keys that would have been good
    // enough had their signatures verified.
    fn permitted(&self, state: &IncomingState, candidate: &Candidate, idx: usize) -> bool {
        let distributions = self.distributions;
        let into: &Distribution = &distributions[idx];

        let Some(uploaders) = &into.uploaders else {
            // no rules means allowed
            return true;
        };

        if candidate.keys.is_empty() {
            if let Some(permissions) = uploaders.unsigned_permissions() {
                if permissions.allow_all {
                    return true;
                }
            }
        } else {
            for key in &candidate.keys {
                if let Some(permissions) = uploaders.key_permissions(key) {
                    if permissions.allow_all {
                        return true;
                    }
                }
            }
        }

        if !candidate.allkeys.is_empty() && candidate.allkeys.len() != candidate.keys.len() {
            for key in &candidate.allkeys {
                let allowed = uploaders
                    .key_permissions(key)
                    .map(|permissions| permissions.allow_all)
                    .unwrap_or(false);
                if allowed {
                    tracing::warn!(changes = state.basename(candidate.ofs),
                        codename = %into.codename, %key,
                        "would have been accepted if this signature was checkable and valid");
                }
            }
        }

        false
    }
}

// vim: foldmethod=marker
