//! Shared marketplace for tests.

use marketsettle_common::{Currency, Money, ProductId};
use marketsettle_ledger::{Bank, BankAccount, Participant, Product};
use marketsettle_registry::Fixture;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub(crate) fn usd(value: Decimal) -> Money {
    Money::new(value, Currency::usd())
}

/// Alice and Carol buy, Bob and Dave sell, all banking at `bank`.
///
/// Bob lists `product1` (500) and `product3` (400), Dave lists `product2`
/// (300). Carol holds 1000, sellers hold nothing.
pub(crate) fn marketplace(alice_balance: Decimal) -> Fixture {
    let mut bob = Participant::seller("bob", "Bob", "B");
    bob.list_product(&ProductId::new("product1"));
    bob.list_product(&ProductId::new("product3"));
    let mut dave = Participant::seller("dave", "Dave", "D");
    dave.list_product(&ProductId::new("product2"));

    let accounts = vec![
        BankAccount::new("alice_account", "alice", "bank", usd(alice_balance)),
        BankAccount::new("bob_account", "bob", "bank", usd(dec!(0))),
        BankAccount::new("carol_account", "carol", "bank", usd(dec!(1000))),
        BankAccount::new("dave_account", "dave", "bank", usd(dec!(0))),
    ];

    Fixture {
        participants: vec![
            Participant::buyer("alice", "Alice", "A"),
            bob,
            Participant::buyer("carol", "Carol", "C"),
            dave,
        ],
        banks: vec![Bank::new("bank", "bank").with_accounts(accounts.iter().map(|a| a.id.clone()))],
        accounts,
        products: vec![
            Product::listed("product1", "product 1 name", usd(dec!(500)), "bob"),
            Product::listed("product2", "product 2 name", usd(dec!(300)), "dave"),
            Product::listed("product3", "product 3 name", usd(dec!(400)), "bob"),
        ],
    }
}
