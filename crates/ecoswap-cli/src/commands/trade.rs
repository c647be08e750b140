use ecoswap_core::db::{SharedDatabase, SqliteTradeRepository, TradeRepository};
use ecoswap_core::trade::TradeResolver;
use ecoswap_core::util::now_ms;
use ecoswap_core::Trade;

use crate::commands::common::{
    format_timestamp, format_trade_lines, parse_listing_id, parse_trade_id, settings, trade_to_item,
};
use crate::error::CliError;

pub async fn propose(
    store: SharedDatabase,
    listing_id: &str,
    proposer: &str,
) -> Result<(), CliError> {
    let listing_id = parse_listing_id(listing_id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.propose(&listing_id, proposer).await?;

    println!("Proposed trade {} on listing {listing_id}", trade.id);
    if trade.proof_required {
        println!("This trade will require proof photos from both parties.");
    }
    Ok(())
}

pub async fn accept(store: SharedDatabase, id: &str, actor: &str) -> Result<(), CliError> {
    let trade_id = parse_trade_id(id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.accept(&trade_id, actor).await?;
    print_transition(&trade);
    Ok(())
}

pub async fn decline(store: SharedDatabase, id: &str, actor: &str) -> Result<(), CliError> {
    let trade_id = parse_trade_id(id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.decline(&trade_id, actor).await?;
    print_transition(&trade);
    Ok(())
}

pub async fn withdraw(store: SharedDatabase, id: &str, actor: &str) -> Result<(), CliError> {
    let trade_id = parse_trade_id(id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.withdraw(&trade_id, actor).await?;
    print_transition(&trade);
    Ok(())
}

pub async fn complete(store: SharedDatabase, id: &str) -> Result<(), CliError> {
    let trade_id = parse_trade_id(id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.try_complete(&trade_id).await?;
    print_transition(&trade);
    Ok(())
}

pub async fn dispute(store: SharedDatabase, id: &str, actor: &str) -> Result<(), CliError> {
    let trade_id = parse_trade_id(id)?;
    let resolver = TradeResolver::new(store, settings());

    let trade = resolver.dispute(&trade_id, actor).await?;
    print_transition(&trade);
    Ok(())
}

pub async fn sweep(store: SharedDatabase) -> Result<(), CliError> {
    let resolver = TradeResolver::new(store, settings());

    let settled = resolver.expire_overdue(now_ms()).await?;
    if settled.is_empty() {
        println!("No trades with overdue proof windows.");
        return Ok(());
    }

    for trade in &settled {
        println!("Trade {} -> {}", trade.id, trade.state.as_str());
    }
    Ok(())
}

pub async fn list(store: &SharedDatabase, listing_id: &str, json: bool) -> Result<(), CliError> {
    let listing_id = parse_listing_id(listing_id)?;

    let trades = {
        let db = store.lock().await;
        SqliteTradeRepository::new(db.connection()).list_by_listing(&listing_id.as_str())?
    };

    if json {
        let items: Vec<_> = trades.iter().map(trade_to_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if trades.is_empty() {
        println!("No trades for listing {listing_id}.");
        return Ok(());
    }

    for line in format_trade_lines(&trades) {
        println!("{line}");
    }
    Ok(())
}

fn print_transition(trade: &Trade) {
    println!("Trade {} is now {}", trade.id, trade.state.as_str());
    if let Some(deadline) = trade.grace_deadline {
        println!("Proof window closes {}", format_timestamp(deadline));
    }
}
