//! History command - coin transfers involving the caller, newest first

use anyhow::Result;
use comfy_table::{Cell, CellAlignment, Color};

use super::Session;
use crate::output;
use merchstore_core::domain::Direction;

pub fn run(session: &Session) -> Result<()> {
    let caller = session.caller()?;
    let history = session.block_on(session.ctx.ledger_service.coin_history(caller.id))?;

    if session.json {
        return output::print_ok(&history);
    }

    if history.is_empty() {
        output::info("No coin transfers yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["#", "Time", "Direction", "Counterparty", "Amount"]);
    for view in &history {
        let (sign, color) = match view.direction {
            Direction::Received => ("+", Color::Green),
            Direction::Sent => ("-", Color::Red),
        };
        table.add_row(vec![
            Cell::new(view.transaction_id),
            Cell::new(output::format_time(&view.created_at)),
            Cell::new(view.direction.as_str()),
            Cell::new(session.account_name(view.counterparty)),
            Cell::new(format!("{}{}", sign, output::format_coins(view.amount)))
                .fg(color)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{}", table);
    Ok(())
}
