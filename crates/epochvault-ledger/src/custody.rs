//! Custody interface and the in-memory reference implementation.
//!
//! Moving assets and shares is the job of an external transfer layer. The
//! vault only ever talks to it through [`Custody::apply`], handing over the
//! complete list of movements a single operation needs. Implementations must
//! apply a batch entirely or not at all.

use std::collections::HashMap;

use epochvault_types::{Amount, Movement, Party, Result, Unit, VaultError};

/// External unit-of-value collaborator.
pub trait Custody {
    /// Current balance of `unit` held by `party`.
    fn balance(&self, party: Party, unit: Unit) -> Amount;

    /// Total shares in existence.
    fn share_supply(&self) -> Amount;

    /// Apply every movement in order, or none of them.
    ///
    /// # Errors
    /// Returns [`VaultError::InsufficientBalance`] if any debit would go
    /// negative at its point in the sequence; custody is left unchanged.
    fn apply(&mut self, movements: &[Movement]) -> Result<()>;
}

/// Hash-map backed custody with atomic batch application.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    /// Per-(party, unit) balances.
    balances: HashMap<(Party, Unit), Amount>,
    /// Shares minted minus shares burned.
    share_supply: Amount,
}

impl InMemoryCustody {
    /// Create an empty custody ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit assets from outside the system (funding an account, or a
    /// strategy reporting gains).
    pub fn fund(&mut self, party: Party, amount: Amount) {
        let entry = self.balances.entry((party, Unit::Asset)).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Remove assets from the system (a strategy reporting losses).
    ///
    /// # Errors
    /// Returns `InsufficientBalance` if `party` holds less than `amount`.
    pub fn burn_assets(&mut self, party: Party, amount: Amount) -> Result<()> {
        let entry = self.balances.entry((party, Unit::Asset)).or_default();
        if *entry < amount {
            return Err(VaultError::InsufficientBalance {
                party,
                unit: Unit::Asset,
                needed: amount,
                available: *entry,
            });
        }
        *entry -= amount;
        Ok(())
    }

    /// Sum of `unit` over every party.
    #[must_use]
    pub fn total(&self, unit: Unit) -> Amount {
        self.balances
            .iter()
            .filter(|((_, u), _)| *u == unit)
            .map(|(_, amount)| *amount)
            .sum()
    }

    fn staged(&self, staged: &HashMap<(Party, Unit), Amount>, party: Party, unit: Unit) -> Amount {
        staged
            .get(&(party, unit))
            .copied()
            .unwrap_or_else(|| self.balance(party, unit))
    }

    fn stage_debit(
        &self,
        staged: &mut HashMap<(Party, Unit), Amount>,
        party: Party,
        unit: Unit,
        amount: Amount,
    ) -> Result<()> {
        let current = self.staged(staged, party, unit);
        if current < amount {
            return Err(VaultError::InsufficientBalance {
                party,
                unit,
                needed: amount,
                available: current,
            });
        }
        staged.insert((party, unit), current - amount);
        Ok(())
    }

    fn stage_credit(
        &self,
        staged: &mut HashMap<(Party, Unit), Amount>,
        party: Party,
        unit: Unit,
        amount: Amount,
    ) -> Result<()> {
        let current = self.staged(staged, party, unit);
        let next = current
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow {
                context: "InMemoryCustody::credit",
            })?;
        staged.insert((party, unit), next);
        Ok(())
    }
}

impl Custody for InMemoryCustody {
    fn balance(&self, party: Party, unit: Unit) -> Amount {
        self.balances.get(&(party, unit)).copied().unwrap_or(0)
    }

    fn share_supply(&self) -> Amount {
        self.share_supply
    }

    fn apply(&mut self, movements: &[Movement]) -> Result<()> {
        // Stage every change first; nothing touches `self` until the whole
        // batch has validated.
        let mut staged: HashMap<(Party, Unit), Amount> = HashMap::new();
        let mut supply = self.share_supply;

        for movement in movements {
            match *movement {
                Movement::Transfer {
                    unit,
                    from,
                    to,
                    amount,
                } => {
                    self.stage_debit(&mut staged, from, unit, amount)?;
                    self.stage_credit(&mut staged, to, unit, amount)?;
                }
                Movement::Mint { to, amount } => {
                    self.stage_credit(&mut staged, to, Unit::Share, amount)?;
                    supply = supply
                        .checked_add(amount)
                        .ok_or(VaultError::ArithmeticOverflow {
                            context: "InMemoryCustody::mint",
                        })?;
                }
                Movement::Burn { from, amount } => {
                    self.stage_debit(&mut staged, from, Unit::Share, amount)?;
                    supply = supply.checked_sub(amount).ok_or_else(|| {
                        VaultError::SupplyInvariantViolation {
                            reason: format!("burning {amount} shares exceeds supply {supply}"),
                        }
                    })?;
                }
            }
        }

        self.balances.extend(staged);
        self.share_supply = supply;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use epochvault_types::AccountId;

    use super::*;

    fn alice() -> Party {
        Party::Account(AccountId::from_bytes([1; 16]))
    }

    #[test]
    fn fund_increases_balance() {
        let mut c = InMemoryCustody::new();
        c.fund(alice(), 1_000);
        assert_eq!(c.balance(alice(), Unit::Asset), 1_000);
        assert_eq!(c.balance(alice(), Unit::Share), 0);
    }

    #[test]
    fn transfer_moves_balance() {
        let mut c = InMemoryCustody::new();
        c.fund(alice(), 1_000);
        c.apply(&[Movement::assets(alice(), Party::PendingSilo, 400)])
            .unwrap();
        assert_eq!(c.balance(alice(), Unit::Asset), 600);
        assert_eq!(c.balance(Party::PendingSilo, Unit::Asset), 400);
        assert_eq!(c.total(Unit::Asset), 1_000);
    }

    #[test]
    fn mint_and_burn_track_supply() {
        let mut c = InMemoryCustody::new();
        c.apply(&[
            Movement::Mint {
                to: Party::ClaimableSilo,
                amount: 500,
            },
            Movement::shares(Party::ClaimableSilo, alice(), 200),
            Movement::Burn {
                from: alice(),
                amount: 50,
            },
        ])
        .unwrap();
        assert_eq!(c.share_supply(), 450);
        assert_eq!(c.balance(alice(), Unit::Share), 150);
        assert_eq!(c.balance(Party::ClaimableSilo, Unit::Share), 300);
        assert_eq!(c.total(Unit::Share), c.share_supply());
    }

    #[test]
    fn failing_batch_changes_nothing() {
        let mut c = InMemoryCustody::new();
        c.fund(alice(), 100);
        let err = c
            .apply(&[
                Movement::assets(alice(), Party::Vault, 60),
                Movement::Mint {
                    to: alice(),
                    amount: 10,
                },
                // Only 40 left at this point in the sequence.
                Movement::assets(alice(), Party::Vault, 60),
            ])
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { needed: 60, available: 40, .. }));
        assert_eq!(c.balance(alice(), Unit::Asset), 100);
        assert_eq!(c.balance(Party::Vault, Unit::Asset), 0);
        assert_eq!(c.balance(alice(), Unit::Share), 0);
        assert_eq!(c.share_supply(), 0);
    }

    #[test]
    fn later_movements_see_earlier_credits() {
        let mut c = InMemoryCustody::new();
        c.fund(alice(), 10);
        c.apply(&[
            Movement::assets(alice(), Party::Vault, 10),
            Movement::assets(Party::Vault, Party::ClaimableSilo, 10),
        ])
        .unwrap();
        assert_eq!(c.balance(Party::ClaimableSilo, Unit::Asset), 10);
    }

    #[test]
    fn burn_assets_insufficient() {
        let mut c = InMemoryCustody::new();
        c.fund(alice(), 5);
        assert!(c.burn_assets(alice(), 6).is_err());
        c.burn_assets(alice(), 5).unwrap();
        assert_eq!(c.balance(alice(), Unit::Asset), 0);
    }
}
