//! Outlier filtering over one model's selling prices
//!
//! Incidental numbers on a product page (savings amounts, EMI figures) are
//! sometimes captured as prices. When the spread of a price set is wider
//! than `spread_factor`, values far below the median are dropped and the
//! set is re-evaluated. The pass never leaves fewer than `min_retained`
//! values.

use tracing::info;

use crate::infrastructure::config::PricingConfig;

/// Items kept and dropped by one filter run, each in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome<T> {
    pub kept: Vec<T>,
    pub dropped: Vec<T>,
}

#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    spread_factor: f64,
    median_divisor: f64,
    min_retained: usize,
}

impl OutlierFilter {
    pub fn new(spread_factor: f64, median_divisor: f64, min_retained: usize) -> Self {
        Self {
            spread_factor,
            median_divisor,
            min_retained: min_retained.max(1),
        }
    }

    pub fn from_config(pricing: &PricingConfig) -> Self {
        Self::new(
            pricing.outlier_spread_factor,
            pricing.outlier_median_divisor,
            pricing.outlier_min_retained,
        )
    }

    /// Filter plain prices.
    pub fn filter(&self, prices: &[u64]) -> FilterOutcome<u64> {
        self.filter_by(prices.to_vec(), |p| *p)
    }

    /// Filter items by a price key.
    pub fn filter_by<T, F>(&self, items: Vec<T>, key: F) -> FilterOutcome<T>
    where
        F: Fn(&T) -> u64,
    {
        let floor = self.min_retained.max(2);
        let mut kept = items;
        let mut dropped = Vec::new();

        while kept.len() >= floor && self.spread_too_wide(&kept, &key) {
            let cutoff = median(kept.iter().map(&key).collect()) / self.median_divisor;
            let survivors = kept.iter().filter(|item| key(item) as f64 >= cutoff).count();
            if survivors == kept.len() || survivors < self.min_retained {
                break;
            }

            let (low, high): (Vec<T>, Vec<T>) = kept.into_iter().partition(|item| (key(item) as f64) < cutoff);
            for item in &low {
                info!("🔍 Dropping outlier price {} (below {:.0})", key(item), cutoff);
            }
            dropped.extend(low);
            kept = high;
        }

        FilterOutcome { kept, dropped }
    }

    fn spread_too_wide<T>(&self, items: &[T], key: &impl Fn(&T) -> u64) -> bool {
        let (min, max) = items.iter().map(key).fold((u64::MAX, 0), |(lo, hi), v| (lo.min(v), hi.max(v)));
        items.len() >= 2 && max as f64 > self.spread_factor * min as f64
    }
}

fn median(mut values: Vec<u64>) -> f64 {
    values.sort_unstable();
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2] as f64
    } else {
        (values[n / 2 - 1] + values[n / 2]) as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn filter() -> OutlierFilter {
        OutlierFilter::from_config(&PricingConfig::default())
    }

    #[test]
    fn test_savings_amount_is_dropped() {
        let outcome = filter().filter(&[500, 69_900, 71_000, 79_900]);
        assert_eq!(outcome.kept, vec![69_900, 71_000, 79_900]);
        assert_eq!(outcome.dropped, vec![500]);
    }

    #[test]
    fn test_narrow_spread_is_untouched() {
        let outcome = filter().filter(&[69_900, 79_900, 84_900]);
        assert_eq!(outcome.kept.len(), 3);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_never_drops_below_floor() {
        let outcome = filter().filter(&[4_000, 70_000]);
        assert_eq!(outcome.kept, vec![4_000, 70_000]);

        let single = filter().filter(&[4_000]);
        assert_eq!(single.kept, vec![4_000]);
    }

    #[test]
    fn test_iterates_until_spread_is_narrow() {
        // median 12_000 drops 1_000; then median 12_500 drops 4_000
        let outcome = filter().filter(&[1_000, 4_000, 12_000, 13_000, 14_000]);
        assert_eq!(outcome.dropped, vec![1_000, 4_000]);
        assert_eq!(outcome.kept, vec![12_000, 13_000, 14_000]);
    }

    #[test]
    fn test_filter_by_keeps_items_in_order() {
        let items = vec![("a", 70_000), ("b", 600), ("c", 72_000)];
        let outcome = filter().filter_by(items, |(_, p)| *p);
        assert_eq!(outcome.kept, vec![("a", 70_000), ("c", 72_000)]);
    }

    proptest! {
        #[test]
        fn filtering_conserves_items_and_respects_floor(prices in prop::collection::vec(3_000u64..200_000, 0..12)) {
            let outcome = filter().filter(&prices);
            prop_assert_eq!(outcome.kept.len() + outcome.dropped.len(), prices.len());
            if prices.len() >= 2 {
                prop_assert!(outcome.kept.len() >= 2);
            }
            let kept_min = outcome.kept.iter().min().copied().unwrap_or(0);
            prop_assert!(outcome.dropped.iter().all(|d| *d <= kept_min));
        }
    }
}
