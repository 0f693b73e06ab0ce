//! Input checks shared by the services.

use common::Money;

use crate::DomainError;

/// Largest accepted price or payment amount: one billion in currency units.
pub(crate) const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;
/// Largest accepted quantity on one line item.
pub(crate) const MAX_QUANTITY: u32 = 1_000_000;
/// Largest stock level, and largest single operator adjustment.
pub(crate) const MAX_STOCK: i64 = 1_000_000_000_000;

/// Checks that `value` is between `min` and `max` characters long.
pub(crate) fn length(field: &str, value: &str, min: usize, max: usize) -> Result<(), DomainError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub(crate) fn max_length(field: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn at_most_max(field: &str, amount: Money) -> Result<(), DomainError> {
    if amount.cents() > MAX_AMOUNT_CENTS {
        return Err(DomainError::validation(format!(
            "{field} must be at most {}",
            Money::from_cents(MAX_AMOUNT_CENTS)
        )));
    }
    Ok(())
}

pub(crate) fn non_negative(field: &str, amount: Money) -> Result<(), DomainError> {
    if amount.is_negative() {
        return Err(DomainError::validation(format!("{field} must not be negative")));
    }
    at_most_max(field, amount)
}

pub(crate) fn positive(field: &str, amount: Money) -> Result<(), DomainError> {
    if amount.is_negative() || amount.is_zero() {
        return Err(DomainError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    at_most_max(field, amount)
}

pub(crate) fn quantity(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(DomainError::validation(format!(
            "quantity must be between 1 and {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

pub(crate) fn stock(stock: i64) -> Result<(), DomainError> {
    if !(0..=MAX_STOCK).contains(&stock) {
        return Err(DomainError::validation(format!(
            "stock must be between 0 and {MAX_STOCK}"
        )));
    }
    Ok(())
}

pub(crate) fn stock_delta(delta: i64) -> Result<(), DomainError> {
    if !(-MAX_STOCK..=MAX_STOCK).contains(&delta) {
        return Err(DomainError::validation(format!(
            "stock adjustment must be between -{MAX_STOCK} and {MAX_STOCK}"
        )));
    }
    Ok(())
}

/// Sum of `quantity * unit_price` over the lines, rejected when it does not
/// fit in an amount.
pub(crate) fn order_total(
    lines: impl IntoIterator<Item = (u32, Money)>,
) -> Result<Money, DomainError> {
    lines
        .into_iter()
        .try_fold(Money::zero(), |total, (quantity, unit_price)| {
            unit_price
                .checked_multiply(quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
        })
        .ok_or_else(|| DomainError::validation("order total is too large"))
}

pub(crate) fn rating(rating: u8) -> Result<(), DomainError> {
    if !(1..=5).contains(&rating) {
        return Err(DomainError::validation("rating must be between 1 and 5"));
    }
    Ok(())
}

/// One `@` with something on both sides.
pub(crate) fn email(value: &str) -> Result<(), DomainError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    };
    if !valid || value.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!("invalid email: {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_characters() {
        assert!(length("name", "ñu", 2, 100).is_ok());
        assert!(length("name", "a", 2, 100).is_err());
        assert!(length("name", &"x".repeat(101), 2, 100).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(email("ana@example.com").is_ok());
        assert!(email("ana.example.com").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("ana@").is_err());
        assert!(email("a@b@c").is_err());
        assert!(email("ana @example.com").is_err());
    }

    #[test]
    fn amounts_and_ratings() {
        assert!(positive("amount", Money::zero()).is_err());
        assert!(positive("amount", Money::from_cents(1)).is_ok());
        assert!(non_negative("price", Money::zero()).is_ok());
        assert!(non_negative("price", Money::from_cents(-1)).is_err());
        assert!(rating(0).is_err());
        assert!(rating(5).is_ok());
        assert!(rating(6).is_err());
        assert!(quantity(0).is_err());
    }

    #[test]
    fn amounts_are_capped() {
        assert!(non_negative("price", Money::from_cents(MAX_AMOUNT_CENTS)).is_ok());
        assert!(non_negative("price", Money::from_cents(MAX_AMOUNT_CENTS + 1)).is_err());
        assert!(positive("amount", Money::from_cents(i64::MAX)).is_err());
        assert!(quantity(MAX_QUANTITY).is_ok());
        assert!(quantity(MAX_QUANTITY + 1).is_err());
        assert!(stock(-1).is_err());
        assert!(stock(MAX_STOCK + 1).is_err());
        assert!(stock_delta(i64::MIN).is_err());
        assert!(stock_delta(-MAX_STOCK).is_ok());
    }

    #[test]
    fn order_total_rejects_overflow() {
        let total = order_total([(2, Money::from_cents(150)), (1, Money::from_cents(25))]);
        assert_eq!(total.unwrap().cents(), 325);

        assert!(order_total([(2, Money::from_cents(i64::MAX / 2 + 1))]).is_err());
        assert!(
            order_total([
                (1, Money::from_cents(i64::MAX)),
                (1, Money::from_cents(1)),
            ])
            .is_err()
        );
    }
}
