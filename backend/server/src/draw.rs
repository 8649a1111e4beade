//! # Weighted Draw
//!
//! One uniform draw over the weight sum, then walk the table.
//!
//! ## Default Table
//!
//! | Amount | Weight |
//! |---|---|
//! | 100.000đ | 70 |
//! | 200.000đ | 30 |
use anyhow::{Context, bail};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prize {
    pub amount: u64,
    pub weight: u32,
    pub message: String,
}

impl Prize {
    pub fn new(amount: u64, weight: u32, message: &str) -> Self {
        Self {
            amount,
            weight,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrizeTable {
    prizes: Vec<Prize>,
    total: u64,
}

impl PrizeTable {
    pub fn new(prizes: Vec<Prize>) -> anyhow::Result<Self> {
        let total = prizes.iter().map(|p| p.weight as u64).sum();

        if total == 0 {
            bail!("Prize table needs at least one prize with a positive weight");
        }

        Ok(Self { prizes, total })
    }

    /// `amount:weight` pairs separated by commas, e.g. `100000:70,200000:30`.
    ///
    /// Amounts already in the default table keep their message.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let prizes = input
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (amount, weight) = pair
                    .split_once(':')
                    .with_context(|| format!("Expected amount:weight, got {pair}"))?;

                let amount: u64 = amount
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid prize amount {amount}"))?;
                let weight: u32 = weight
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid prize weight {weight}"))?;

                let message = defaults
                    .get(amount)
                    .map(|p| p.message.as_str())
                    .unwrap_or_default();

                Ok(Prize::new(amount, weight, message))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::new(prizes)
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &Prize {
        let mut roll = rng.gen_range(0..self.total);

        for prize in &self.prizes {
            let weight = prize.weight as u64;
            if roll < weight {
                return prize;
            }
            roll -= weight;
        }

        // unreachable while total is the sum of weights
        &self.prizes[self.prizes.len() - 1]
    }

    pub fn get(&self, amount: u64) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.amount == amount)
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self {
            prizes: vec![
                Prize::new(100_000, 70, "Năm 2026 bung lụa – Mua iPhone giá quá đã!"),
                Prize::new(200_000, 30, "Phát tài phát lộc – Chốt máy là hết sẩy!"),
            ],
            total: 100,
        }
    }
}
