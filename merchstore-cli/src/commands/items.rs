//! Items command - list the catalog

use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

use super::Session;
use crate::output;
use merchstore_core::ports::CatalogLookup;

pub fn run(session: &Session) -> Result<()> {
    let mut items = session.ctx.repository.list_items()?;
    items.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));

    if session.json {
        return output::print_ok(&items);
    }

    let mut table = output::create_table();
    table.set_header(vec!["Item", "Price"]);
    for item in &items {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(output::format_coins(item.price)).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{}", table);
    Ok(())
}
