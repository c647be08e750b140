use ecoswap_core::db::{ListingRepository, SharedDatabase, SqliteListingRepository};
use ecoswap_core::models::ListingLocation;
use ecoswap_core::util::now_ms;
use ecoswap_core::Listing;

use crate::commands::common::{
    format_listing_lines, listing_to_item, parse_listing_id, validate_coordinates,
};
use crate::error::CliError;

pub async fn add(
    store: &SharedDatabase,
    owner: &str,
    title: &str,
    description: &str,
    category: &str,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<(), CliError> {
    let mut listing = Listing::new(owner, title, description, category);

    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            validate_coordinates(lat, lon)?;
            listing.location = Some(ListingLocation {
                lat,
                lon,
                fix_at: now_ms(),
            });
        }
        (None, None) => {}
        _ => {
            return Err(CliError::InvalidCoordinates(
                "--lat and --lon must be given together".to_string(),
            ));
        }
    }

    {
        let db = store.lock().await;
        SqliteListingRepository::new(db.connection()).insert(&listing)?;
    }

    println!("Created listing {} (pending push)", listing.id);
    Ok(())
}

pub async fn list(store: &SharedDatabase, limit: usize, json: bool) -> Result<(), CliError> {
    let listings = {
        let db = store.lock().await;
        SqliteListingRepository::new(db.connection()).list(limit, 0)?
    };

    if json {
        let items: Vec<_> = listings.iter().map(listing_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No listings cached. Run `ecoswap sync` to pull the marketplace.");
        return Ok(());
    }

    for line in format_listing_lines(&listings) {
        println!("{line}");
    }
    Ok(())
}

pub async fn remove(store: &SharedDatabase, id: &str) -> Result<(), CliError> {
    let listing_id = parse_listing_id(id)?;

    {
        let db = store.lock().await;
        SqliteListingRepository::new(db.connection()).soft_delete(&listing_id)?;
    }

    println!("Removed listing {listing_id} (pending push)");
    Ok(())
}
