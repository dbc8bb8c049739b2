//! 訂購增量拆批

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// 訂購增量拆批器
pub struct IncrementSplitter;

impl IncrementSplitter {
    /// 將需求拆成整數個增量批，加上一個餘量批
    ///
    /// 增量為 0（或負數）時不拆批。
    pub fn split(quantity: Decimal, increment: Decimal) -> Vec<Decimal> {
        if quantity <= Decimal::ZERO {
            return Vec::new();
        }
        if increment <= Decimal::ZERO || quantity <= increment {
            return vec![quantity];
        }

        let full = (quantity / increment).floor();
        let remainder = quantity - full * increment;
        let full_count = full.to_usize().unwrap_or(0);

        let mut batches = vec![increment; full_count];
        if remainder > Decimal::ZERO {
            batches.push(remainder);
        }
        batches
    }
}
