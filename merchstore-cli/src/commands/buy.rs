//! Buy command - purchase one catalog item

use std::collections::HashMap;

use anyhow::Result;

use super::Session;
use crate::output;
use merchstore_core::OperationResult;

pub fn run(session: &Session, item: &str) -> Result<()> {
    let caller = session.caller()?;
    session.block_on(session.ctx.ledger_service.buy_item(caller.id, item))?;

    if session.json {
        let context = HashMap::from([("item".to_string(), serde_json::json!(item))]);
        return output::print_json(&OperationResult::ok_with_context((), context));
    }

    output::success(&format!("Bought 1 {}", item));
    Ok(())
}
