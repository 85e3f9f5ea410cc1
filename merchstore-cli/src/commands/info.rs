//! Info command - balance, inventory and coin history in one view

use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::output;
use merchstore_core::TransactionView;

pub fn run(session: &Session) -> Result<()> {
    let caller = session.caller()?;
    let snapshot = session.block_on(session.ctx.ledger_service.account_snapshot(caller.id))?;

    if session.json {
        return output::print_ok(&snapshot);
    }

    println!("{}", caller.name.bold());
    println!("  Coins: {}", output::format_coins(snapshot.coins).bold());
    println!();

    println!("{}", "Inventory".bold());
    if snapshot.inventory.is_empty() {
        println!("  (empty)");
    } else {
        let mut table = output::create_table();
        table.set_header(vec!["Item", "Quantity"]);
        for (name, quantity) in snapshot.inventory.sorted() {
            table.add_row(vec![name, quantity.to_string()]);
        }
        println!("{}", table);
    }
    println!();

    print_views(session, "Received", &snapshot.coin_history.received, "From");
    print_views(session, "Sent", &snapshot.coin_history.sent, "To");
    Ok(())
}

fn print_views(session: &Session, title: &str, views: &[TransactionView], counterparty: &str) {
    println!("{}", title.bold());
    if views.is_empty() {
        println!("  (none)");
        println!();
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", counterparty, "Amount"]);
    for view in views {
        table.add_row(vec![
            output::format_time(&view.created_at),
            session.account_name(view.counterparty),
            output::format_coins(view.amount),
        ]);
    }
    println!("{}", table);
    println!();
}
