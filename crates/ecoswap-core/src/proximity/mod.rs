//! Proximity matching over locally cached listings.
//!
//! Pure computation: the caller supplies the device fix and the
//! candidate listings (usually `list_active_located`), and gets back a
//! ranked, restartable result set. A stale fix is refused outright
//! rather than silently producing misleading distances.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{Listing, LocationFix};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tunables for one proximity query.
#[derive(Debug, Clone)]
pub struct ProximityOptions {
    /// Inclusive search radius in kilometers
    pub radius_km: f64,
    /// Oldest acceptable device fix
    pub max_fix_age: Duration,
}

impl Default for ProximityOptions {
    fn default() -> Self {
        Self {
            radius_km: 10.0,
            max_fix_age: Duration::from_secs(5 * 60),
        }
    }
}

/// One listing within range, with its great-circle distance.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyListing {
    pub listing: Listing,
    pub distance_km: f64,
}

/// Ranked proximity results. Iteration can restart from the top any
/// number of times.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NearbyMatches {
    ranked: Vec<NearbyListing>,
}

impl NearbyMatches {
    /// Matches in ascending distance order.
    pub fn iter(&self) -> impl Iterator<Item = &NearbyListing> {
        self.ranked.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

impl IntoIterator for NearbyMatches {
    type Item = NearbyListing;
    type IntoIter = std::vec::IntoIter<NearbyListing>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranked.into_iter()
    }
}

/// Rank located listings around the device.
///
/// Fails with [`Error::StaleLocation`] when the fix is older than
/// `options.max_fix_age` at `now`. Listings without a location never
/// reach here (the repository filters them); ties on distance order by
/// listing id so ranking is deterministic.
pub fn nearby(
    fix: &LocationFix,
    listings: &[Listing],
    options: &ProximityOptions,
    now: i64,
) -> Result<NearbyMatches> {
    let max_age_ms = i64::try_from(options.max_fix_age.as_millis()).unwrap_or(i64::MAX);
    if !fix.is_fresh(max_age_ms, now) {
        return Err(Error::StaleLocation {
            age_ms: fix.age_ms(now),
            max_age_ms,
        });
    }

    let mut ranked: Vec<NearbyListing> = listings
        .iter()
        .filter_map(|listing| {
            let location = listing.location?;
            let distance_km = haversine_km(fix.lat, fix.lon, location.lat, location.lon);
            (distance_km <= options.radius_km).then(|| NearbyListing {
                listing: listing.clone(),
                distance_km,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.listing.id.cmp(&b.listing.id))
    });

    Ok(NearbyMatches { ranked })
}

/// Great-circle distance between two coordinates, in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Human-readable distance for feed rows.
#[must_use]
pub fn format_distance_label(distance_km: f64) -> String {
    if distance_km < 1.0 {
        "<1 km away".to_string()
    } else if distance_km < 10.0 {
        format!("{distance_km:.1} km away")
    } else {
        format!("{distance_km:.0} km away")
    }
}
