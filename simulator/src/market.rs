//! Randomly generated marketplaces.

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

use marketsettle_common::{Currency, Money, ParticipantId, ProductId};
use marketsettle_ledger::{Bank, BankAccount, Participant, ParticipantRole, Product};
use marketsettle_registry::Fixture;

const FIRST_NAMES: [&str; 10] = [
    "Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace", "Heidi", "Ivan", "Judy",
];

/// Shape of a generated marketplace.
#[derive(Debug, Clone)]
pub struct MarketShape {
    pub buyers: usize,
    pub sellers: usize,
    pub banks: usize,
    pub products_per_seller: usize,
    /// Opening buyer balances are drawn from this range, in whole units.
    pub buyer_balance: (u64, u64),
    /// Product prices are drawn from this range, in whole units.
    pub price: (u64, u64),
}

impl Default for MarketShape {
    fn default() -> Self {
        Self {
            buyers: 6,
            sellers: 3,
            banks: 2,
            products_per_seller: 4,
            buyer_balance: (500, 5_000),
            price: (50, 1_500),
        }
    }
}

/// Builds marketplaces for simulation runs.
pub struct MarketFactory;

impl MarketFactory {
    /// Generate a marketplace.
    ///
    /// Every participant holds one USD account at every bank. Sellers open
    /// with nothing and list their products at random prices.
    pub fn generate<R: Rng>(shape: &MarketShape, rng: &mut R) -> Fixture {
        let mut participants = Vec::with_capacity(shape.buyers + shape.sellers);
        let mut products = Vec::new();

        for i in 0..shape.buyers {
            participants.push(Participant::buyer(
                format!("buyer{}", i + 1),
                name_for(i),
                "Buyer",
            ));
        }

        for i in 0..shape.sellers {
            let mut seller =
                Participant::seller(format!("seller{}", i + 1), name_for(shape.buyers + i), "Seller");
            for p in 0..shape.products_per_seller {
                let id = ProductId::new(format!("product{}_{}", i + 1, p + 1));
                let price = usd(rng.gen_range(shape.price.0..=shape.price.1));
                seller.list_product(&id);
                products.push(Product::listed(
                    id.clone(),
                    format!("{} name", id),
                    price,
                    seller.id.clone(),
                ));
            }
            participants.push(seller);
        }

        let mut banks = Vec::with_capacity(shape.banks);
        let mut accounts = Vec::new();
        for b in 0..shape.banks {
            let bank_id = format!("bank{}", b + 1);
            let mut bank = Bank::new(bank_id.as_str(), format!("Bank {}", b + 1));

            // Banks list their accounts in no particular order
            let mut holders: Vec<&Participant> = participants.iter().collect();
            holders.shuffle(rng);

            for holder in holders {
                let opening = if holder.role == ParticipantRole::Buyer {
                    usd(rng.gen_range(shape.buyer_balance.0..=shape.buyer_balance.1))
                } else {
                    usd(0)
                };
                let account = BankAccount::new(
                    format!("{}_{}_account", holder.id, bank_id),
                    holder.id.clone(),
                    bank_id.as_str(),
                    opening,
                );
                bank.link(account.id.clone());
                accounts.push(account);
            }
            banks.push(bank);
        }

        Fixture {
            participants,
            banks,
            accounts,
            products,
        }
    }
}

/// Pick a participant other than `owner`.
pub fn pick_counterparty<'a, R: Rng>(
    participants: &'a [ParticipantId],
    owner: &ParticipantId,
    rng: &mut R,
) -> Option<&'a ParticipantId> {
    let others: Vec<&ParticipantId> = participants.iter().filter(|p| *p != owner).collect();
    others.choose(rng).copied()
}

fn name_for(i: usize) -> String {
    match FIRST_NAMES.get(i) {
        Some(name) => name.to_string(),
        None => format!("Trader {}", i + 1),
    }
}

fn usd(units: u64) -> Money {
    Money::new(Decimal::from(units), Currency::usd())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_market_is_consistent() {
        let shape = MarketShape::default();
        let fixture = MarketFactory::generate(&shape, &mut StdRng::seed_from_u64(7));

        fixture.verify().unwrap();
        assert_eq!(fixture.participants.len(), 9);
        assert_eq!(fixture.products.len(), 12);
        assert_eq!(fixture.accounts.len(), 18);
        assert!(fixture.banks.iter().all(|b| b.accounts.len() == 9));
    }

    #[test]
    fn test_same_seed_same_market() {
        let shape = MarketShape::default();
        let a = MarketFactory::generate(&shape, &mut StdRng::seed_from_u64(42));
        let b = MarketFactory::generate(&shape, &mut StdRng::seed_from_u64(42));

        let prices = |f: &Fixture| f.products.iter().map(|p| p.price.clone()).collect::<Vec<_>>();
        let balances = |f: &Fixture| {
            f.accounts
                .iter()
                .map(|a| (a.id.clone(), a.balance.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(prices(&a), prices(&b));
        assert_eq!(balances(&a), balances(&b));
    }

    #[test]
    fn test_sellers_open_empty() {
        let fixture = MarketFactory::generate(&MarketShape::default(), &mut StdRng::seed_from_u64(1));

        for account in &fixture.accounts {
            if account.owner.as_str().starts_with("seller") {
                assert!(account.balance.is_zero());
            } else {
                assert!(account.balance.is_positive());
            }
        }
    }

    #[test]
    fn test_counterparty_is_never_owner() {
        let participants: Vec<ParticipantId> =
            ["a", "b", "c"].iter().map(|p| ParticipantId::new(*p)).collect();
        let owner = ParticipantId::new("b");
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let picked = pick_counterparty(&participants, &owner, &mut rng).unwrap();
            assert_ne!(picked, &owner);
        }
        assert!(pick_counterparty(&participants[1..2], &owner, &mut rng).is_none());
    }
}
