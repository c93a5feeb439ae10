// src/common/money.rs

use rust_decimal::{Decimal, RoundingStrategy};
use validator::ValidationError;

/// Teto aceito para qualquer valor vindo do cliente (preço, taxa, cobrança).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Arredonda valores monetários para 2 casas (meio para longe do zero).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Valor monetário de entrada: entre 0 e `MAX_AMOUNT`.
pub fn validate_amount(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() && !val.is_zero() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    if *val > MAX_AMOUNT {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor excede o limite permitido.".into());
        return Err(err);
    }
    Ok(())
}

/// Cobrança: estritamente positiva e dentro do teto.
pub fn validate_charge(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_zero() || val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor da cobrança deve ser maior que zero.".into());
        return Err(err);
    }
    validate_amount(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::from_str("10.005").unwrap()), Decimal::from_str("10.01").unwrap());
        assert_eq!(round_money(Decimal::from_str("10.004").unwrap()), Decimal::from_str("10.00").unwrap());
        assert_eq!(round_money(Decimal::from(3)), Decimal::from(3));
    }

    #[test]
    fn amounts_are_bounded() {
        assert!(validate_amount(&Decimal::ZERO).is_ok());
        assert!(validate_amount(&MAX_AMOUNT).is_ok());
        assert!(validate_amount(&Decimal::from(-1)).is_err());
        assert!(validate_amount(&Decimal::MAX).is_err());
    }

    #[test]
    fn charges_must_be_positive() {
        assert!(validate_charge(&Decimal::new(1, 2)).is_ok());
        assert!(validate_charge(&Decimal::ZERO).is_err());
        assert!(validate_charge(&Decimal::from(-5)).is_err());
        assert!(validate_charge(&Decimal::MAX).is_err());
    }
}
