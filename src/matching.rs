//! Limit-order matching.
//!
//! [`match_buy_order`] and [`match_sell_order`] run a taker that has already been escrowed
//! and inserted into its own book against the opposite book. Makers are visited in
//! price-time priority, one page at a time, and every fill settles at the maker's price.
//! Amounts in the settlement token are rounded to nearest unless that would overdraw the
//! escrow backing them, in which case they are rounded down.

use crate::context::MarketContext;
use crate::decimal::{capped_amount, to_fixed};
use crate::error::{StoreError, MSG_CANNOT_BE_FILLED};
use crate::execution::TradeRecord;
use crate::expiration::sweep_expired;
use crate::ledger::TokenLedger;
use crate::metrics;
use crate::order_book::OrderBook;
use crate::store::Repository;
use crate::types::{Order, Side};
use log::info;
use rust_decimal::Decimal;

/// Trade history row for a fill against `maker` at the maker's price.
pub(crate) fn fill_record<R: Repository, L: TokenLedger>(
    ctx: &MarketContext<'_, R, L>,
    taker_side: Side,
    buyer: &str,
    seller: &str,
    maker: &Order,
    quantity: Decimal,
    volume: Decimal,
) -> TradeRecord {
    info!(
        "fill tx_id={} side={} buyer={} seller={} symbol={} quantity={} price={} volume={}",
        ctx.tx_id,
        taker_side.as_str(),
        buyer,
        seller,
        maker.symbol,
        quantity,
        maker.price,
        volume
    );
    TradeRecord {
        row_id: None,
        side: taker_side,
        buyer: buyer.to_string(),
        seller: seller.to_string(),
        symbol: maker.symbol.clone(),
        quantity,
        price: maker.price,
        volume,
        timestamp: ctx.now,
    }
}

/// Takes `filled` units out of a resting sell order. The order is kept only while what
/// is left is still worth at least the dust threshold; otherwise it is deleted and any
/// leftover units go back to the seller.
pub(crate) fn settle_resting_sell<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    mut sell: Order,
    filled: Decimal,
    token_dp: u32,
) -> Result<(), StoreError> {
    let book = OrderBook::new(Side::Sell);
    let left = to_fixed(sell.quantity - filled, token_dp);
    let value = to_fixed(sell.price * left, ctx.peg_dp());
    if left > Decimal::ZERO && value >= ctx.dust() {
        sell.quantity = left;
        return book.update(ctx.repo, &sell);
    }
    if left > Decimal::ZERO {
        ctx.pay(&sell.account, &sell.symbol, left);
    }
    book.remove(ctx.repo, &sell)
}

/// Takes `filled` units and `spent` settlement tokens out of a resting buy order, with the
/// same dust rule as [`settle_resting_sell`]; a deleted order's leftover escrow is unlocked.
pub(crate) fn settle_resting_buy<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    mut buy: Order,
    filled: Decimal,
    spent: Decimal,
    token_dp: u32,
) -> Result<(), StoreError> {
    let book = OrderBook::new(Side::Buy);
    let peg_dp = ctx.peg_dp();
    let left = to_fixed(buy.quantity - filled, token_dp);
    let locked = to_fixed(buy.tokens_locked.unwrap_or(Decimal::ZERO) - spent, peg_dp);
    let value = to_fixed(buy.price * left, peg_dp);
    if left > Decimal::ZERO && value >= ctx.dust() {
        buy.quantity = left;
        buy.tokens_locked = Some(locked);
        return book.update(ctx.repo, &buy);
    }
    if locked > Decimal::ZERO {
        let peg = ctx.peg();
        ctx.pay(&buy.account, peg, locked);
    }
    book.remove(ctx.repo, &buy)
}

/// Unfilled remainder of a taker: persisted and reported as resting, or already gone.
fn finish_taker<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    side: Side,
    taker: Order,
    volume: Decimal,
) -> Result<(), StoreError> {
    if taker.quantity > Decimal::ZERO {
        OrderBook::new(side).update(ctx.repo, &taker)?;
        info!(
            "resting {} tx_id={} symbol={} quantity={} price={}",
            side.as_str(),
            taker.tx_id,
            taker.symbol,
            taker.quantity,
            taker.price
        );
        ctx.report.resting = Some(taker.clone());
    }
    finish_pass(ctx, &taker.symbol, volume)
}

/// Metrics refresh closing every matching pass.
pub(crate) fn finish_pass<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    symbol: &str,
    volume: Decimal,
) -> Result<(), StoreError> {
    if volume > Decimal::ZERO {
        metrics::update_volume(ctx.repo, ctx.config, ctx.now, symbol, volume, true)?;
    }
    metrics::update_ask(ctx.repo, symbol)?;
    metrics::update_bid(ctx.repo, symbol)
}

/// Matches a resting buy taker against the sell book up to its limit price.
pub fn match_buy_order<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    mut buy: Order,
    token_dp: u32,
) -> Result<(), StoreError> {
    let asks = OrderBook::new(Side::Sell);
    let bids = OrderBook::new(Side::Buy);
    let peg = ctx.peg();
    let peg_dp = ctx.peg_dp();
    let page_size = ctx.config.page_size;
    let mut volume = Decimal::ZERO;
    let mut offset = 0;

    sweep_expired(ctx, Side::Sell)?;

    while buy.quantity > Decimal::ZERO {
        let page = asks.page(ctx.repo, &buy.symbol, Some(buy.price), page_size, offset)?;
        if page.is_empty() {
            break;
        }
        // makers from this page still in the book; the next page starts after them
        let mut kept = 0;
        for sell in page {
            if buy.quantity <= Decimal::ZERO {
                break;
            }
            let locked = buy.tokens_locked.unwrap_or(Decimal::ZERO);
            if buy.quantity <= sell.quantity {
                let amount = capped_amount(sell.price, buy.quantity, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                let filled = buy.quantity;
                ctx.pay(&buy.account, &buy.symbol, filled);
                ctx.pay(&sell.account, peg, amount);
                let trade = fill_record(ctx, Side::Buy, &buy.account, &sell.account, &sell, filled, amount);
                settle_resting_sell(ctx, sell, filled, token_dp)?;

                let unlock = to_fixed(locked - amount, peg_dp);
                if unlock > Decimal::ZERO {
                    ctx.pay(&buy.account, peg, unlock);
                }
                metrics::record_trade(ctx, trade)?;
                volume += amount;

                buy.quantity = Decimal::ZERO;
                buy.tokens_locked = Some(Decimal::ZERO);
                bids.remove(ctx.repo, &buy)?;
            } else {
                let amount = capped_amount(sell.price, sell.quantity, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                ctx.pay(&buy.account, &buy.symbol, sell.quantity);
                ctx.pay(&sell.account, peg, amount);
                asks.remove(ctx.repo, &sell)?;

                buy.tokens_locked = Some(to_fixed(locked - amount, peg_dp));
                buy.quantity = to_fixed(buy.quantity - sell.quantity, token_dp);
                if to_fixed(buy.price * buy.quantity, peg_dp) < ctx.dust() {
                    let refund = buy.tokens_locked.unwrap_or(Decimal::ZERO);
                    if refund > Decimal::ZERO {
                        ctx.pay(&buy.account, peg, refund);
                    }
                    buy.quantity = Decimal::ZERO;
                    buy.tokens_locked = Some(Decimal::ZERO);
                    bids.remove(ctx.repo, &buy)?;
                }

                let trade = fill_record(ctx, Side::Buy, &buy.account, &sell.account, &sell, sell.quantity, amount);
                metrics::record_trade(ctx, trade)?;
                volume += amount;
            }
        }
        offset += kept;
    }

    finish_taker(ctx, Side::Buy, buy, volume)
}

/// Matches a resting sell taker against the buy book down to its limit price.
pub fn match_sell_order<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    mut sell: Order,
    token_dp: u32,
) -> Result<(), StoreError> {
    let asks = OrderBook::new(Side::Sell);
    let bids = OrderBook::new(Side::Buy);
    let peg = ctx.peg();
    let peg_dp = ctx.peg_dp();
    let page_size = ctx.config.page_size;
    let mut volume = Decimal::ZERO;
    let mut offset = 0;

    sweep_expired(ctx, Side::Buy)?;

    while sell.quantity > Decimal::ZERO {
        let page = bids.page(ctx.repo, &sell.symbol, Some(sell.price), page_size, offset)?;
        if page.is_empty() {
            break;
        }
        let mut kept = 0;
        for buy in page {
            if sell.quantity <= Decimal::ZERO {
                break;
            }
            let locked = buy.tokens_locked.unwrap_or(Decimal::ZERO);
            if sell.quantity <= buy.quantity {
                let amount = capped_amount(buy.price, sell.quantity, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                let filled = sell.quantity;
                ctx.pay(&buy.account, &sell.symbol, filled);
                ctx.pay(&sell.account, peg, amount);
                let trade = fill_record(ctx, Side::Sell, &buy.account, &sell.account, &buy, filled, amount);
                settle_resting_buy(ctx, buy, filled, amount, token_dp)?;
                metrics::record_trade(ctx, trade)?;
                volume += amount;

                sell.quantity = Decimal::ZERO;
                asks.remove(ctx.repo, &sell)?;
            } else {
                let amount = capped_amount(buy.price, buy.quantity, locked, peg_dp);
                if amount <= Decimal::ZERO {
                    ctx.assert_failed(MSG_CANNOT_BE_FILLED);
                    kept += 1;
                    continue;
                }
                ctx.pay(&buy.account, &sell.symbol, buy.quantity);
                ctx.pay(&sell.account, peg, amount);
                let unlock = to_fixed(locked - amount, peg_dp);
                if unlock > Decimal::ZERO {
                    ctx.pay(&buy.account, peg, unlock);
                }
                bids.remove(ctx.repo, &buy)?;

                sell.quantity = to_fixed(sell.quantity - buy.quantity, token_dp);
                if to_fixed(sell.price * sell.quantity, peg_dp) < ctx.dust() {
                    if sell.quantity > Decimal::ZERO {
                        ctx.pay(&sell.account, &sell.symbol, sell.quantity);
                    }
                    sell.quantity = Decimal::ZERO;
                    asks.remove(ctx.repo, &sell)?;
                }

                let trade = fill_record(ctx, Side::Sell, &buy.account, &sell.account, &buy, buy.quantity, amount);
                metrics::record_trade(ctx, trade)?;
                volume += amount;
            }
        }
        offset += kept;
    }

    finish_taker(ctx, Side::Sell, sell, volume)
}
