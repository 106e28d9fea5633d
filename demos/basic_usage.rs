// ============================================================================
// Basic Usage Example
// ============================================================================

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use venue_core::interfaces::{MatchingEventKind, TradeEvent};
use venue_core::prelude::*;

fn main() -> Result<(), VenueError> {
    println!("=== Venue Core Example ===\n");

    let symbol = Symbol::new("BTC-USD");

    // Fund a few accounts
    let ledger = Arc::new(InMemoryLedger::new());
    for i in 0..5 {
        ledger.deposit(&AccountId::new(format!("seller_{i}")), "BTC", Decimal::from(2));
        ledger.deposit(&AccountId::new(format!("buyer_{i}")), "USD", Decimal::from(100_000));
    }
    ledger.deposit(&AccountId::new("taker"), "USD", Decimal::from(200_000));

    let bus = Arc::new(EventBus::new(1024));
    let feed = bus.subscribe("console");

    let context = EngineContext::builder()
        .with_config(VenueConfig::spot())
        .with_ledger(ledger.clone())
        .with_event_sink(bus.clone())
        .build()?;

    println!("Created venue with background settlement\n");

    // Add sell orders at different prices
    println!("Adding sell orders...");
    for i in 0i64..5 {
        context.submit_order(OrderIntent::limit(
            format!("seller_{i}"),
            symbol.clone(),
            Side::Sell,
            Decimal::from(50_000 + i * 100),
            Decimal::ONE,
        ))?;
    }

    // Add buy orders
    println!("Adding buy orders...");
    for i in 0i64..5 {
        context.submit_order(OrderIntent::limit(
            format!("buyer_{i}"),
            symbol.clone(),
            Side::Buy,
            Decimal::from(49_900 - i * 100),
            Decimal::ONE,
        ))?;
    }

    // Get order book snapshot
    println!("\n=== Order Book Snapshot ===");
    let snapshot = context.snapshot(&symbol, Some(5))?;

    println!("\nBids:");
    for (price, qty) in &snapshot.bids {
        println!("  {} @ {}", qty, price);
    }

    println!("\nAsks:");
    for (price, qty) in &snapshot.asks {
        println!("  {} @ {}", qty, price);
    }

    println!("\nSpread: {:?}", snapshot.spread);
    println!("Mid Price: {:?}", snapshot.mid_price);

    // Immediate-or-cancel buy crossing the first three ask levels
    println!("\n=== Submitting IOC Order ===");
    let report = context.submit_order(
        OrderIntent::limit(
            "taker",
            symbol.clone(),
            Side::Buy,
            Decimal::from(50_200),
            Decimal::from(2),
        )
        .with_time_in_force(TimeInForce::ImmediateOrCancel),
    )?;
    println!("Outcome: {:?}", report.match_result.outcome);

    context.wait_for_settlement();

    println!("\nEvents received:");
    while let Some(event) = feed.recv_timeout(Duration::from_millis(10)) {
        match event {
            VenueEvent::Matching(event) => {
                if let MatchingEventKind::TradeExecuted(trade) = event.kind {
                    println!(
                        "  #{} Trade: {} @ {} (qty: {})",
                        event.sequence, trade.id, trade.price, trade.quantity
                    );
                }
            },
            VenueEvent::Trade(TradeEvent::Settled(trade)) => {
                println!(
                    "  Settled {} (maker fee {}, taker fee {})",
                    trade.id, trade.maker_fee, trade.taker_fee
                );
            },
            _ => {},
        }
    }

    let taker = AccountId::new("taker");
    println!(
        "\nTaker balances: {} BTC, {} USD",
        ledger.balance(&taker, "BTC").available,
        ledger.balance(&taker, "USD").available
    );

    // Final snapshot
    println!("\n=== Final Order Book ===");
    let final_snapshot = context.snapshot(&symbol, None)?;
    println!("Bids: {} levels", final_snapshot.bids.len());
    println!("Asks: {} levels", final_snapshot.asks.len());
    println!("Spread: {:?}", final_snapshot.spread);

    let stats = context.stats();
    println!(
        "Resting orders: {}, trades executed: {}, dropped events: {}",
        stats.total_resting_orders,
        stats.total_trades_executed,
        bus.total_dropped()
    );

    context.shutdown();
    Ok(())
}
