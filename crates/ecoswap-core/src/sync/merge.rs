//! Three-way merge for concurrently edited listings.
//!
//! The merge base is the last remote-acknowledged snapshot of the
//! record. A field goes to whichever side diverged from the base; if
//! both sides changed the same field the merge stops and the caller
//! records a manual conflict.

use crate::models::Listing;

/// Result of merging a local edit against a newer remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Non-overlapping edits combined. `local_fields` names the fields
    /// taken from the local side; empty means the local edit was a no-op
    /// and the remote record can be adopted as-is.
    Merged {
        listing: Listing,
        local_fields: Vec<&'static str>,
    },
    /// Both sides changed the same field.
    Conflict {
        field: &'static str,
        local_value: String,
        remote_value: String,
    },
}

/// Merge `local` and `remote` against their common `base`.
///
/// The merged listing starts from the remote record (adopting its
/// version and timestamps) and overlays the fields only the local side
/// changed. Bookkeeping fields never merge.
#[must_use]
pub fn merge_listing(base: &Listing, local: &Listing, remote: &Listing) -> MergeOutcome {
    let mut merged = remote.clone();
    let mut local_fields = Vec::new();

    macro_rules! merge_field {
        ($field:ident, $name:literal) => {
            if local.$field != base.$field {
                if remote.$field != base.$field && remote.$field != local.$field {
                    return MergeOutcome::Conflict {
                        field: $name,
                        local_value: render(&local.$field),
                        remote_value: render(&remote.$field),
                    };
                }
                merged.$field = local.$field.clone();
                local_fields.push($name);
            }
        };
    }

    merge_field!(title, "title");
    merge_field!(description, "description");
    merge_field!(category, "category");
    merge_field!(status, "status");
    merge_field!(photo_urls, "photo_urls");
    merge_field!(location, "location");

    MergeOutcome::Merged {
        listing: merged,
        local_fields,
    }
}

fn render<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingLocation, ListingStatus};
    use pretty_assertions::assert_eq;

    fn base() -> Listing {
        let mut listing = Listing::new("owner-1", "Bike", "City bike", "sports");
        listing.version = 3;
        listing.is_dirty = false;
        listing
    }

    #[test]
    fn non_overlapping_edits_merge() {
        let base = base();

        let mut local = base.clone();
        local.title = "Bike (red)".to_string();

        let mut remote = base.clone();
        remote.description = "City bike, new tires".to_string();
        remote.version = 4;

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Merged {
                listing,
                local_fields,
            } => {
                assert_eq!(listing.title, "Bike (red)");
                assert_eq!(listing.description, "City bike, new tires");
                assert_eq!(listing.version, 4);
                assert_eq!(local_fields, vec!["title"]);
            }
            MergeOutcome::Conflict { field, .. } => panic!("unexpected conflict on {field}"),
        }
    }

    #[test]
    fn same_field_divergence_is_a_conflict() {
        let base = base();

        let mut local = base.clone();
        local.title = "Bike (red)".to_string();

        let mut remote = base.clone();
        remote.title = "Bike (blue)".to_string();
        remote.version = 4;

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Conflict {
                field,
                local_value,
                remote_value,
            } => {
                assert_eq!(field, "title");
                assert_eq!(local_value, "\"Bike (red)\"");
                assert_eq!(remote_value, "\"Bike (blue)\"");
            }
            MergeOutcome::Merged { .. } => panic!("expected conflict"),
        }
    }

    #[test]
    fn identical_edits_are_not_conflicts() {
        let base = base();

        let mut local = base.clone();
        local.status = ListingStatus::Completed;

        let mut remote = base.clone();
        remote.status = ListingStatus::Completed;
        remote.version = 4;

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Merged {
                listing,
                local_fields,
            } => {
                assert_eq!(listing.status, ListingStatus::Completed);
                // Converged on its own, no local overlay needed.
                assert!(local_fields.is_empty());
            }
            MergeOutcome::Conflict { field, .. } => panic!("unexpected conflict on {field}"),
        }
    }

    #[test]
    fn local_noop_adopts_remote() {
        let base = base();
        let local = base.clone();

        let mut remote = base.clone();
        remote.photo_urls = vec!["https://cdn/a.jpg".to_string()];
        remote.version = 4;

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Merged {
                listing,
                local_fields,
            } => {
                assert_eq!(listing, remote);
                assert!(local_fields.is_empty());
            }
            MergeOutcome::Conflict { field, .. } => panic!("unexpected conflict on {field}"),
        }
    }

    #[test]
    fn location_edits_merge_like_other_fields() {
        let base = base();

        let mut local = base.clone();
        local.location = Some(ListingLocation {
            lat: 52.52,
            lon: 13.405,
            fix_at: 1_000,
        });

        let mut remote = base.clone();
        remote.title = "Bike, lightly used".to_string();
        remote.version = 4;

        match merge_listing(&base, &local, &remote) {
            MergeOutcome::Merged {
                listing,
                local_fields,
            } => {
                assert_eq!(listing.location, local.location);
                assert_eq!(listing.title, "Bike, lightly used");
                assert_eq!(local_fields, vec!["location"]);
            }
            MergeOutcome::Conflict { field, .. } => panic!("unexpected conflict on {field}"),
        }
    }
}
