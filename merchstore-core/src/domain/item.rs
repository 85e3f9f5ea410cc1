//! Catalog item domain model

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// A merchandise item that can be bought with coins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub price: i64,
}

impl Item {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("item name cannot be empty"));
        }
        if self.price < 0 {
            return Err(Error::validation(format!(
                "item {} has negative price {}",
                self.name, self.price
            )));
        }
        Ok(())
    }
}
