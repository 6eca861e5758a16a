//! Market orders.
//!
//! A market order is escrowed in full, swept against the opposite book at any price and
//! never rests: whatever is left when the book runs out is refunded to the sender.

use crate::context::MarketContext;
use crate::decimal::{capped_amount, to_fixed, to_fixed_down};
use crate::error::{StoreError, MSG_CANNOT_BE_FILLED};
use crate::expiration::sweep_expired;
use crate::ledger::TokenLedger;
use crate::matching::{fill_record, finish_pass, settle_resting_buy, settle_resting_sell};
use crate::metrics;
use crate::order_book::OrderBook;
use crate::store::Repository;
use crate::types::Side;
use log::info;
use rust_decimal::Decimal;

/// Spends `budget` settlement tokens on `symbol`, cheapest asks first.
pub fn market_buy<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    symbol: &str,
    budget: Decimal,
    token_dp: u32,
) -> Result<(), StoreError> {
    let asks = OrderBook::new(Side::Sell);
    let peg = ctx.peg();
    let peg_dp = ctx.peg_dp();
    let sender = ctx.sender;
    let page_size = ctx.config.page_size;
    let mut remaining = to_fixed(budget, peg_dp);
    let mut volume = Decimal::ZERO;
    let mut offset = 0;

    sweep_expired(ctx, Side::Sell)?;

    while remaining > Decimal::ZERO {
        let page = asks.page(ctx.repo, symbol, None, page_size, offset)?;
        if page.is_empty() {
            break;
        }
        let mut kept = 0;
        for sell in page {
            if remaining <= Decimal::ZERO {
                break;
            }
            let quantity = remaining
                .checked_div(sell.price)
                .map(|q| to_fixed_down(q, token_dp))
                .unwrap_or(Decimal::ZERO);

            if quantity > Decimal::ZERO && quantity <= sell.quantity {
                // whole budget goes to this maker
                ctx.pay(sender, symbol, quantity);
                ctx.pay(&sell.account, peg, remaining);
                let trade = fill_record(ctx, Side::Buy, sender, &sell.account, &sell, quantity, remaining);
                settle_resting_sell(ctx, sell, quantity, token_dp)?;
                metrics::record_trade(ctx, trade)?;
                volume += remaining;
                remaining = Decimal::ZERO;
            } else if quantity > Decimal::ZERO {
                let amount = capped_amount(sell.price, sell.quantity, remaining, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                ctx.pay(sender, symbol, sell.quantity);
                ctx.pay(&sell.account, peg, amount);
                asks.remove(ctx.repo, &sell)?;
                remaining = to_fixed(remaining - amount, peg_dp);
                let trade = fill_record(ctx, Side::Buy, sender, &sell.account, &sell, sell.quantity, amount);
                metrics::record_trade(ctx, trade)?;
                volume += amount;
            } else {
                // budget buys less than one unit at this price
                kept += 1;
            }
        }
        offset += kept;
    }

    if remaining > Decimal::ZERO {
        info!("market buy refund tx_id={} to={} quantity={}", ctx.tx_id, sender, remaining);
        ctx.pay(sender, peg, remaining);
    }
    finish_pass(ctx, symbol, volume)
}

/// Sells `quantity` of `symbol`, highest bids first.
pub fn market_sell<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    symbol: &str,
    quantity: Decimal,
    token_dp: u32,
) -> Result<(), StoreError> {
    let bids = OrderBook::new(Side::Buy);
    let peg = ctx.peg();
    let peg_dp = ctx.peg_dp();
    let sender = ctx.sender;
    let page_size = ctx.config.page_size;
    let mut remaining = to_fixed(quantity, token_dp);
    let mut volume = Decimal::ZERO;
    let mut offset = 0;

    sweep_expired(ctx, Side::Buy)?;

    while remaining > Decimal::ZERO {
        let page = bids.page(ctx.repo, symbol, None, page_size, offset)?;
        if page.is_empty() {
            break;
        }
        let mut kept = 0;
        for buy in page {
            if remaining <= Decimal::ZERO {
                break;
            }
            let locked = buy.tokens_locked.unwrap_or(Decimal::ZERO);
            if remaining <= buy.quantity {
                let amount = capped_amount(buy.price, remaining, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                let filled = remaining;
                ctx.pay(&buy.account, symbol, filled);
                ctx.pay(sender, peg, amount);
                let trade = fill_record(ctx, Side::Sell, &buy.account, sender, &buy, filled, amount);
                settle_resting_buy(ctx, buy, filled, amount, token_dp)?;
                metrics::record_trade(ctx, trade)?;
                volume += amount;
                remaining = Decimal::ZERO;
            } else {
                let amount = capped_amount(buy.price, buy.quantity, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                ctx.pay(&buy.account, symbol, buy.quantity);
                ctx.pay(sender, peg, amount);
                let unlock = to_fixed(locked - amount, peg_dp);
                if unlock > Decimal::ZERO {
                    ctx.pay(&buy.account, peg, unlock);
                }
                bids.remove(ctx.repo, &buy)?;
                remaining = to_fixed(remaining - buy.quantity, token_dp);
                let trade = fill_record(ctx, Side::Sell, &buy.account, sender, &buy, buy.quantity, amount);
                metrics::record_trade(ctx, trade)?;
                volume += amount;
            }
        }
        offset += kept;
    }

    if remaining > Decimal::ZERO {
        info!("market sell refund tx_id={} to={} quantity={}", ctx.tx_id, sender, remaining);
        ctx.pay(sender, symbol, remaining);
    }
    finish_pass(ctx, symbol, volume)
}
