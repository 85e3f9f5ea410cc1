//! Coin transfer domain model

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::result::{Error, Result};

/// An immutable record of a completed peer-to-peer coin transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Project this transfer from the point of view of `account_id`
    ///
    /// Returns `None` when the account took no part in it.
    pub fn view_for(&self, account_id: AccountId) -> Option<TransactionView> {
        let (direction, counterparty) = if self.from_account == account_id {
            (Direction::Sent, self.to_account)
        } else if self.to_account == account_id {
            (Direction::Received, self.from_account)
        } else {
            return None;
        };

        Some(TransactionView {
            transaction_id: self.id,
            counterparty,
            direction,
            amount: self.amount,
            created_at: self.created_at,
        })
    }

    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account == account_id || self.to_account == account_id
    }
}

/// A transfer before the log assigns it an id
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Stamped with the current time at microsecond precision, which is what
    /// the relational store keeps
    pub fn new(from_account: AccountId, to_account: AccountId, amount: i64) -> Self {
        Self {
            from_account,
            to_account,
            amount,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(Error::InvalidAmount(self.amount));
        }
        Ok(())
    }

    pub fn into_transaction(self, id: i64) -> Transaction {
        Transaction {
            id,
            from_account: self.from_account,
            to_account: self.to_account,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}

/// Which side of a transfer the viewer was on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

/// One transfer as seen by one of its participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: i64,
    pub counterparty: AccountId,
    pub direction: Direction,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Sort newest first; ties on timestamp fall back to the log id
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
