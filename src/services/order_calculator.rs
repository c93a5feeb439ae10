// src/services/order_calculator.rs

//! Totais do pedido.
//!
//! - Subtotal: soma dos `total` dos itens que ainda contam (fora approved/refunded/rejected).
//! - Pedido externo: `tax` é a taxa de transporte fixa, nunca muda com reembolso parcial.
//! - Pedido interno: `tax` é recalculado pela alíquota implícita `tax / subtotal` anterior.
//! - `total = subtotal + tax`, tudo arredondado para 2 casas.
//!
//! O recálculo parte sempre da lista completa e atual de itens, nunca de subtrações
//! incrementais.

use rust_decimal::Decimal;

use crate::{
    common::{error::AppError, money::round_money},
    models::order::{OrderItem, OrderTotals},
};

fn out_of_range() -> AppError {
    AppError::InvalidPayload("valor do pedido fora do limite".to_string())
}

pub fn line_total(price: Decimal, quantity: i32) -> Result<Decimal, AppError> {
    price
        .checked_mul(Decimal::from(quantity))
        .map(round_money)
        .ok_or_else(out_of_range)
}

/// Totais na criação do pedido (checkout).
pub fn checkout_totals(
    line_totals: &[Decimal],
    is_external: bool,
    tax_rate: Decimal,
    transport_fee: Decimal,
) -> Result<OrderTotals, AppError> {
    let sum = line_totals
        .iter()
        .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(*line))
        .ok_or_else(out_of_range)?;
    let subtotal = round_money(sum);
    let tax = if is_external {
        round_money(transport_fee)
    } else {
        round_money(subtotal.checked_mul(tax_rate).ok_or_else(out_of_range)?)
    };
    let total = subtotal.checked_add(tax).ok_or_else(out_of_range)?;

    Ok(OrderTotals {
        subtotal,
        tax,
        total: round_money(total),
    })
}

/// Recalcula o trio a partir dos itens atuais e dos totais gravados antes.
pub fn recompute_totals(items: &[OrderItem], is_external: bool, previous: OrderTotals) -> OrderTotals {
    let subtotal = round_money(
        items
            .iter()
            .filter(|item| !item.refund_status.leaves_totals())
            .map(|item| item.total)
            .sum(),
    );

    let tax = if is_external {
        previous.tax
    } else {
        let rate = if previous.subtotal.is_zero() {
            Decimal::ZERO
        } else {
            previous.tax / previous.subtotal
        };
        round_money(subtotal * rate)
    };

    OrderTotals {
        subtotal,
        tax,
        total: round_money(subtotal + tax),
    }
}

/// Todos os itens saíram do total (o pedido inteiro foi reembolsado/rejeitado).
pub fn all_items_closed(items: &[OrderItem]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.refund_status.leaves_totals())
}
