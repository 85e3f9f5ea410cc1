//! Doctor service - ledger consistency checks

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::ports::Repository;

/// Doctor service for health checks
pub struct DoctorService<R: Repository> {
    repository: Arc<R>,
}

impl<R: Repository> DoctorService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();
        let accounts = self.repository.list_accounts()?;

        // Negative balances (the schema forbids them, so any hit means tampering)
        let negative: Vec<serde_json::Value> = accounts
            .iter()
            .filter(|a| a.coins < 0)
            .map(|a| json!({"account_id": a.id, "name": a.name, "coins": a.coins}))
            .collect();
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                negative,
                "error",
                "No account has a negative balance".to_string(),
                |n| format!("{} account(s) have a negative balance", n),
            ),
        );

        // Orphaned transactions
        let orphans: Vec<serde_json::Value> = self
            .repository
            .find_orphaned_transactions()?
            .iter()
            .map(|t| {
                json!({
                    "transaction_id": t.id,
                    "from_account": t.from_account,
                    "to_account": t.to_account
                })
            })
            .collect();
        checks.insert(
            "orphaned_transactions".to_string(),
            CheckResult::from_findings(
                orphans,
                "error",
                "No orphaned transactions found".to_string(),
                |n| format!("{} transaction(s) reference missing accounts", n),
            ),
        );

        // Inventory entries must count at least one item
        let bad_inventory: Vec<serde_json::Value> = accounts
            .iter()
            .flat_map(|a| {
                a.inventory
                    .iter()
                    .filter(|(_, qty)| *qty <= 0)
                    .map(move |(item, qty)| {
                        json!({"account_id": a.id, "item": item, "quantity": qty})
                    })
            })
            .collect();
        checks.insert(
            "inventory_quantities".to_string(),
            CheckResult::from_findings(
                bad_inventory,
                "error",
                "All inventory quantities are positive".to_string(),
                |n| format!("{} inventory entr(ies) have a non-positive quantity", n),
            ),
        );

        // Catalog
        let items = self.repository.list_items()?;
        let bad_prices: Vec<serde_json::Value> = items
            .iter()
            .filter(|i| i.price < 0)
            .map(|i| json!({"item": i.name, "price": i.price}))
            .collect();
        let catalog_check = if items.is_empty() {
            CheckResult {
                status: "warning".to_string(),
                message: "Catalog is empty, nothing can be bought".to_string(),
                details: None,
            }
        } else {
            CheckResult::from_findings(
                bad_prices,
                "error",
                format!("{} catalog item(s) with valid prices", items.len()),
                |n| format!("{} catalog item(s) have a negative price", n),
            )
        };
        checks.insert("catalog_prices".to_string(), catalog_check);

        // Coin supply is informational
        let total: i64 = accounts.iter().map(|a| a.coins).sum();
        checks.insert(
            "coin_supply".to_string(),
            CheckResult {
                status: "pass".to_string(),
                message: format!("{} coin(s) held across {} account(s)", total, accounts.len()),
                details: Some(vec![json!({"total_coins": total, "accounts": accounts.len()})]),
            },
        );

        // Calculate summary
        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        severity: &str,
        clean_message: String,
        describe: impl FnOnce(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            Self {
                status: "pass".to_string(),
                message: clean_message,
                details: None,
            }
        } else {
            Self {
                status: severity.to_string(),
                message: describe(findings.len()),
                details: Some(findings),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryRepository;
    use crate::domain::{Item, NewAccount, NewTransaction};
    use crate::ports::{AccountStore, TransactionLog};

    #[test]
    fn test_clean_ledger_passes() {
        let repo = Arc::new(MemoryRepository::new());
        let a = repo.create_account(&NewAccount::new("a", "h", 70)).unwrap();
        let b = repo.create_account(&NewAccount::new("b", "h", 30)).unwrap();
        repo.append_transaction(&NewTransaction::new(a, b, 30)).unwrap();
        repo.seed_item(&Item::new("cup", 20)).unwrap();

        let result = DoctorService::new(repo).run_checks().unwrap();

        assert!(result.is_healthy());
        assert_eq!(result.summary.warnings, 0);
        assert_eq!(result.checks["coin_supply"].message, "100 coin(s) held across 2 account(s)");
    }

    #[test]
    fn test_orphans_reported() {
        let repo = Arc::new(MemoryRepository::new());
        let a = repo.create_account(&NewAccount::new("a", "h", 10)).unwrap();
        repo.append_transaction(&NewTransaction::new(a, 404, 5)).unwrap();

        let result = DoctorService::new(repo).run_checks().unwrap();

        let orphans = &result.checks["orphaned_transactions"];
        assert_eq!(orphans.status, "error");
        assert_eq!(orphans.details.as_ref().unwrap()[0]["to_account"], 404);
        assert!(!result.is_healthy());
        // Empty catalog is only a warning
        assert_eq!(result.checks["catalog_prices"].status, "warning");
    }
}
