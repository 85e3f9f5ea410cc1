//! Account domain model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::transaction::TransactionView;

/// Store-assigned account identifier
pub type AccountId = i64;

/// Items owned by an account, keyed by item-type name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    items: HashMap<String, i64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of an item type, merging into an existing entry
    pub fn add(&mut self, item_type: &str, quantity: i64) {
        *self.items.entry(item_type.to_string()).or_insert(0) += quantity;
    }

    /// Owned quantity of an item type (0 if never bought)
    pub fn quantity(&self, item_type: &str) -> i64 {
        self.items.get(item_type).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Entries sorted by item name, for stable display
    pub fn sorted(&self) -> Vec<(String, i64)> {
        let mut entries: Vec<(String, i64)> =
            self.items.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// A user's coin balance, inventory and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Argon2 PHC string, never the plain password
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub coins: i64,
    pub inventory: Inventory,
}

impl Account {
    /// Debit coins, refusing to go below zero
    pub fn debit(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(Error::InvalidAmount(amount));
        }
        if self.coins < amount {
            return Err(Error::InsufficientFunds {
                balance: self.coins,
                required: amount,
            });
        }
        self.coins -= amount;
        Ok(())
    }

    /// Credit coins
    pub fn credit(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(Error::InvalidAmount(amount));
        }
        self.coins = self
            .coins
            .checked_add(amount)
            .ok_or_else(|| Error::validation("balance overflow"))?;
        Ok(())
    }
}

/// Account data before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub password_hash: String,
    pub coins: i64,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, password_hash: impl Into<String>, coins: i64) -> Self {
        Self {
            name: name.into(),
            password_hash: password_hash.into(),
            coins,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("account name cannot be empty"));
        }
        if self.coins < 0 {
            return Err(Error::validation("initial balance cannot be negative"));
        }
        Ok(())
    }
}

/// Coin movements of one account, split by direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinHistory {
    pub received: Vec<TransactionView>,
    pub sent: Vec<TransactionView>,
}

/// What an account owner sees about themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub coins: i64,
    pub inventory: Inventory,
    pub coin_history: CoinHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(coins: i64) -> Account {
        Account {
            id: 1,
            name: "alice".to_string(),
            password_hash: String::new(),
            coins,
            inventory: Inventory::new(),
        }
    }

    #[test]
    fn test_inventory_merges_existing_entry() {
        let mut inventory = Inventory::new();
        inventory.add("cup", 1);
        inventory.add("pen", 1);
        inventory.add("cup", 1);

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.quantity("cup"), 2);
        assert_eq!(inventory.quantity("pen"), 1);
        assert_eq!(inventory.quantity("book"), 0);
    }

    #[test]
    fn test_inventory_json_is_a_plain_map() {
        let mut inventory = Inventory::new();
        inventory.add("cup", 3);
        let json = serde_json::to_string(&inventory).unwrap();
        assert_eq!(json, r#"{"cup":3}"#);

        let back: Inventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inventory);
    }

    #[test]
    fn test_debit_refuses_overdraft() {
        let mut a = account(100);
        let err = a.debit(101).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { balance: 100, required: 101 }));
        assert_eq!(a.coins, 100);

        a.debit(100).unwrap();
        assert_eq!(a.coins, 0);
    }

    #[test]
    fn test_credit_rejects_negative() {
        let mut a = account(0);
        assert!(matches!(a.credit(-5), Err(Error::InvalidAmount(-5))));
        a.credit(250).unwrap();
        assert_eq!(a.coins, 250);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut a = account(10);
        a.password_hash = "$argon2id$secret".to_string();
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("argon2id"));
    }

    #[test]
    fn test_new_account_validation() {
        assert!(NewAccount::new("bob", "h", 100).validate().is_ok());
        assert!(NewAccount::new("  ", "h", 100).validate().is_err());
        assert!(NewAccount::new("bob", "h", -1).validate().is_err());
    }
}
