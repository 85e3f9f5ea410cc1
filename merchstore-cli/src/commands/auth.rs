//! Auth command - sign in, creating the account on first use

use anyhow::Result;
use colored::Colorize;

use super::Session;
use crate::output;

pub fn run(session: &Session) -> Result<()> {
    let account = session.caller()?;

    if session.json {
        return output::print_ok(&account);
    }

    output::success(&format!("Signed in as {}", account.name));
    println!(
        "  Account #{}, {} coins",
        account.id,
        output::format_coins(account.coins).bold()
    );
    Ok(())
}
