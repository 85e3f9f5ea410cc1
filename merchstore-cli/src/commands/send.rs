//! Send command - transfer coins to another user

use anyhow::Result;

use super::Session;
use crate::output;

pub fn run(session: &Session, to: &str, amount: i64) -> Result<()> {
    let caller = session.caller()?;
    let tx = session.block_on(session.ctx.ledger_service.transfer_coins(caller.id, amount, to))?;

    if session.json {
        return output::print_ok(&tx);
    }

    output::success(&format!(
        "Sent {} coins to {}",
        output::format_coins(tx.amount),
        to
    ));
    println!("  Transaction #{} at {}", tx.id, output::format_time(&tx.created_at));
    Ok(())
}
