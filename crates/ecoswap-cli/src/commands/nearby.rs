use ecoswap_core::db::{ListingRepository, SharedDatabase, SqliteListingRepository};
use ecoswap_core::models::LocationFix;
use ecoswap_core::proximity::{self, ProximityOptions};
use ecoswap_core::util::now_ms;
use serde::Serialize;

use crate::commands::common::{settings, validate_coordinates};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct NearbyItem {
    id: String,
    title: String,
    category: String,
    distance_km: f64,
    label: String,
}

pub async fn run(
    store: &SharedDatabase,
    lat: f64,
    lon: f64,
    radius_km: f64,
    json: bool,
) -> Result<(), CliError> {
    validate_coordinates(lat, lon)?;
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(CliError::InvalidCoordinates(format!(
            "radius {radius_km} must be a positive number of kilometers"
        )));
    }

    let listings = {
        let db = store.lock().await;
        SqliteListingRepository::new(db.connection()).list_active_located()?
    };

    let now = now_ms();
    // A fix captured on the command line is fresh by construction.
    let fix = LocationFix::new(lat, lon, 0.0, now);
    let options = ProximityOptions {
        radius_km,
        max_fix_age: settings().location_max_age,
    };

    let matches = proximity::nearby(&fix, &listings, &options, now)?;

    if json {
        let items: Vec<_> = matches
            .iter()
            .map(|nearby| NearbyItem {
                id: nearby.listing.id.to_string(),
                title: nearby.listing.title.clone(),
                category: nearby.listing.category.clone(),
                distance_km: nearby.distance_km,
                label: proximity::format_distance_label(nearby.distance_km),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No active listings within {radius_km} km.");
        return Ok(());
    }

    for nearby in matches.iter() {
        let id = nearby.listing.id.to_string();
        let short_id = id.chars().take(13).collect::<String>();
        println!(
            "{short_id:<13}  {:<28} {}",
            nearby.listing.title,
            proximity::format_distance_label(nearby.distance_km),
        );
    }
    Ok(())
}
