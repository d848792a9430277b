//! Simulation scenarios.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marketsettle_common::{Currency, Money, ProductId, Trade};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};
use marketsettle_registry::Fixture;

/// A simulation scenario: a marketplace and the steps played against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Marketplace the steps run against.
    pub market: Fixture,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A trade named so later steps can refer to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTrade {
    pub label: String,
    pub product: String,
    pub buyer: String,
    pub seller: String,
    pub bank: String,
}

impl ScenarioTrade {
    pub fn new(label: &str, product: &str, buyer: &str, seller: &str, bank: &str) -> Self {
        Self {
            label: label.to_string(),
            product: product.to_string(),
            buyer: buyer.to_string(),
            seller: seller.to_string(),
            bank: bank.to_string(),
        }
    }

    pub fn to_trade(&self) -> Trade {
        Trade::new(
            self.product.as_str(),
            self.buyer.as_str(),
            self.seller.as_str(),
            self.bank.as_str(),
        )
    }
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Submit one trade and wait for its outcome.
    Submit(ScenarioTrade),
    /// Submit several trades at once.
    SubmitConcurrent { trades: Vec<ScenarioTrade> },
    /// Submit an earlier trade again under its original id.
    Resubmit { label: String },
    /// Fail every update to an account until faults are cleared.
    InjectFault { account: String, cause: String },
    /// Clear every injected fault.
    ClearFaults,
    /// Assert a condition.
    Assert(AssertCondition),
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Trade settled.
    Settled { label: String },
    /// Trade was rejected with the given error code.
    Rejected { label: String, code: String },
    /// Trade faulted during persistence.
    Faulted { label: String },
    /// Exactly `count` of the labelled trades settled.
    SettledCount { labels: Vec<String>, count: usize },
    /// Account balance equals.
    BalanceEquals { account: String, amount: Decimal },
    /// Product is owned by the participant.
    OwnerEquals { product: String, owner: String },
    /// Total money per currency is unchanged since the market was loaded.
    MoneyConserved,
}

impl Scenario {
    /// Load a scenario by name, or from a JSON file when `name` is a path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "simple-trade" => Ok(Self::simple_trade()),
            "insufficient-funds" => Ok(Self::insufficient_funds()),
            "missing-seller-account" => Ok(Self::missing_seller_account()),
            "disjoint-trades" => Ok(Self::disjoint_trades()),
            "contended-buyer" => Ok(Self::contended_buyer()),
            "failure-recovery" => Ok(Self::failure_recovery()),
            _ if Path::new(name).is_file() => Self::from_file(Path::new(name)),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Names of the built-in scenarios.
    pub fn builtin() -> &'static [&'static str] {
        &[
            "simple-trade",
            "insufficient-funds",
            "missing-seller-account",
            "disjoint-trades",
            "contended-buyer",
            "failure-recovery",
        ]
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Alice buys Bob's product for 500.
    fn simple_trade() -> Self {
        Self {
            name: "simple-trade".to_string(),
            description: "Buyer pays seller, product changes owner".to_string(),
            market: two_party_market(dec(1000)),
            steps: vec![
                ScenarioStep::Submit(ScenarioTrade::new("t1", "product1", "alice", "bob", "bank")),
                ScenarioStep::Assert(AssertCondition::Settled {
                    label: "t1".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "alice_account".to_string(),
                    amount: dec(500),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "bob_account".to_string(),
                    amount: dec(500),
                }),
                ScenarioStep::Assert(AssertCondition::OwnerEquals {
                    product: "product1".to_string(),
                    owner: "alice".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::MoneyConserved),
            ],
        }
    }

    /// Alice holds 100 and cannot afford the product.
    fn insufficient_funds() -> Self {
        Self {
            name: "insufficient-funds".to_string(),
            description: "Rejected trade leaves every record untouched".to_string(),
            market: two_party_market(dec(100)),
            steps: vec![
                ScenarioStep::Submit(ScenarioTrade::new("t1", "product1", "alice", "bob", "bank")),
                ScenarioStep::Assert(AssertCondition::Rejected {
                    label: "t1".to_string(),
                    code: "INSUFFICIENT_FUNDS".to_string(),
                }),
                ScenarioStep::Resubmit {
                    label: "t1".to_string(),
                },
                ScenarioStep::Assert(AssertCondition::Rejected {
                    label: "t1".to_string(),
                    code: "INSUFFICIENT_FUNDS".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "alice_account".to_string(),
                    amount: dec(100),
                }),
                ScenarioStep::Assert(AssertCondition::OwnerEquals {
                    product: "product1".to_string(),
                    owner: "bob".to_string(),
                }),
            ],
        }
    }

    /// Bob has no account at the bank.
    fn missing_seller_account() -> Self {
        let mut market = two_party_market(dec(1000));
        market.accounts.retain(|a| a.owner.as_str() != "bob");
        for bank in &mut market.banks {
            bank.accounts.retain(|a| a.as_str() != "bob_account");
        }

        Self {
            name: "missing-seller-account".to_string(),
            description: "Seller without an account at the trade's bank".to_string(),
            market,
            steps: vec![
                ScenarioStep::Submit(ScenarioTrade::new("t1", "product1", "alice", "bob", "bank")),
                ScenarioStep::Assert(AssertCondition::Rejected {
                    label: "t1".to_string(),
                    code: "ACCOUNT_NOT_FOUND".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "alice_account".to_string(),
                    amount: dec(1000),
                }),
            ],
        }
    }

    /// Two trades with no entity in common settle side by side.
    fn disjoint_trades() -> Self {
        Self {
            name: "disjoint-trades".to_string(),
            description: "Concurrent trades over disjoint entities".to_string(),
            market: four_party_market(dec(1000)),
            steps: vec![
                ScenarioStep::SubmitConcurrent {
                    trades: vec![
                        ScenarioTrade::new("t1", "product1", "alice", "bob", "bank"),
                        ScenarioTrade::new("t2", "product2", "carol", "dave", "bank"),
                    ],
                },
                ScenarioStep::Assert(AssertCondition::Settled {
                    label: "t1".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::Settled {
                    label: "t2".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "alice_account".to_string(),
                    amount: dec(500),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "carol_account".to_string(),
                    amount: dec(700),
                }),
                ScenarioStep::Assert(AssertCondition::MoneyConserved),
            ],
        }
    }

    /// Alice can afford one of Bob's two products, not both.
    fn contended_buyer() -> Self {
        Self {
            name: "contended-buyer".to_string(),
            description: "Concurrent trades drawing on one buyer account".to_string(),
            market: four_party_market(dec(600)),
            steps: vec![
                ScenarioStep::SubmitConcurrent {
                    trades: vec![
                        ScenarioTrade::new("t1", "product1", "alice", "bob", "bank"),
                        ScenarioTrade::new("t2", "product3", "alice", "bob", "bank"),
                    ],
                },
                ScenarioStep::Assert(AssertCondition::SettledCount {
                    labels: vec!["t1".to_string(), "t2".to_string()],
                    count: 1,
                }),
                ScenarioStep::Assert(AssertCondition::MoneyConserved),
            ],
        }
    }

    /// A storage fault faults the trade; a fresh trade settles once cleared.
    fn failure_recovery() -> Self {
        Self {
            name: "failure-recovery".to_string(),
            description: "Persistence fault, rollback, then retry".to_string(),
            market: two_party_market(dec(1000)),
            steps: vec![
                ScenarioStep::InjectFault {
                    account: "bob_account".to_string(),
                    cause: "storage offline".to_string(),
                },
                ScenarioStep::Submit(ScenarioTrade::new("t1", "product1", "alice", "bob", "bank")),
                ScenarioStep::Assert(AssertCondition::Faulted {
                    label: "t1".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::BalanceEquals {
                    account: "alice_account".to_string(),
                    amount: dec(1000),
                }),
                ScenarioStep::Assert(AssertCondition::OwnerEquals {
                    product: "product1".to_string(),
                    owner: "bob".to_string(),
                }),
                ScenarioStep::ClearFaults,
                ScenarioStep::Submit(ScenarioTrade::new("t2", "product1", "alice", "bob", "bank")),
                ScenarioStep::Assert(AssertCondition::Settled {
                    label: "t2".to_string(),
                }),
                ScenarioStep::Assert(AssertCondition::MoneyConserved),
            ],
        }
    }
}

fn dec(units: i64) -> Decimal {
    Decimal::from(units)
}

fn usd(value: Decimal) -> Money {
    Money::new(value, Currency::usd())
}

/// Alice buys, Bob sells `product1` at 500. Both bank at `bank`.
fn two_party_market(alice_balance: Decimal) -> Fixture {
    let mut bob = Participant::seller("bob", "Bob", "Seller");
    bob.list_product(&ProductId::new("product1"));

    let accounts = vec![
        BankAccount::new("alice_account", "alice", "bank", usd(alice_balance)),
        BankAccount::new("bob_account", "bob", "bank", usd(dec(0))),
    ];

    Fixture {
        participants: vec![Participant::buyer("alice", "Alice", "Buyer"), bob],
        banks: vec![Bank::new("bank", "Bank").with_accounts(accounts.iter().map(|a| a.id.clone()))],
        accounts,
        products: vec![Product::listed("product1", "product 1 name", usd(dec(500)), "bob")],
    }
}

/// Adds Carol (1000) buying from Dave, who lists `product2` at 300. Bob
/// also lists `product3` at 400.
fn four_party_market(alice_balance: Decimal) -> Fixture {
    let mut market = two_party_market(alice_balance);

    let mut dave = Participant::seller("dave", "Dave", "Seller");
    dave.list_product(&ProductId::new("product2"));
    for participant in &mut market.participants {
        if participant.id.as_str() == "bob" {
            participant.list_product(&ProductId::new("product3"));
        }
    }
    market.participants.push(Participant::buyer("carol", "Carol", "Buyer"));
    market.participants.push(dave);

    for account in [
        BankAccount::new("carol_account", "carol", "bank", usd(dec(1000))),
        BankAccount::new("dave_account", "dave", "bank", usd(dec(0))),
    ] {
        for bank in &mut market.banks {
            bank.link(account.id.clone());
        }
        market.accounts.push(account);
    }

    market.products.push(Product::listed("product2", "product 2 name", usd(dec(300)), "dave"));
    market.products.push(Product::listed("product3", "product 3 name", usd(dec(400)), "bob"));
    market
}
