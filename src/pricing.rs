//! Package price calculation.
//!
//! All arithmetic happens in integer cents; the margin multiplication is the
//! only floating-point step and its result is rounded to whole cents before
//! any further rounding, so binary-fraction residue never reaches the final
//! price.

/// Price for a package of `meal_count` meals spread over `delivery_count`
/// deliveries, in cents.
///
/// Negative inputs are clamped to zero. A zero meal or delivery count prices
/// to zero. Otherwise the margin total is rounded up to the next whole
/// currency unit and one cent is subtracted, so every positive price ends in
/// `.99`.
pub fn price_cents(
    meal_count: i64,
    delivery_count: i64,
    meal_unit_cents: i64,
    delivery_unit_cents: i64,
    margin_fraction: f64,
) -> i64 {
    let meal_count = meal_count.max(0);
    let delivery_count = delivery_count.max(0);
    let meal_unit_cents = meal_unit_cents.max(0);
    let delivery_unit_cents = delivery_unit_cents.max(0);
    let margin_fraction = margin_fraction.max(0.0);

    if meal_count == 0 || delivery_count == 0 {
        return 0;
    }

    let base_cents = meal_count * meal_unit_cents + delivery_count * delivery_unit_cents;
    let with_margin_cents = (base_cents as f64 * (1.0 + margin_fraction)).round() as i64;
    if with_margin_cents <= 0 {
        return 0;
    }

    (with_margin_cents as u64).div_ceil(100) as i64 * 100 - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_verified_example() {
        // 3 meals at 6.00 + 3 deliveries at 2.50, 17% margin -> 29.99
        assert_eq!(price_cents(3, 3, 600, 250, 0.17), 2999);
    }

    #[test]
    fn zero_counts_price_to_zero() {
        assert_eq!(price_cents(0, 5, 600, 250, 0.17), 0);
        assert_eq!(price_cents(5, 0, 600, 250, 0.17), 0);
        assert_eq!(price_cents(0, 0, 600, 250, 0.17), 0);
    }

    #[test]
    fn negative_inputs_clamp_to_zero() {
        assert_eq!(price_cents(-3, 3, 600, 250, 0.17), 0);
        assert_eq!(price_cents(3, -1, 600, 250, 0.17), 0);
        assert_eq!(price_cents(3, 3, -600, -250, 0.17), 0);
    }

    #[test]
    fn positive_prices_end_in_99() {
        for meals in 1..=20 {
            for deliveries in 1..=10 {
                let price = price_cents(meals, deliveries, 600, 250, 0.17);
                assert_eq!(price % 100, 99, "m={meals} d={deliveries} -> {price}");
            }
        }
    }

    #[test]
    fn deterministic() {
        let a = price_cents(7, 3, 600, 250, 0.17);
        let b = price_cents(7, 3, 600, 250, 0.17);
        assert_eq!(a, b);
    }

    #[test]
    fn exact_unit_boundary_rounds_down_to_99() {
        // 100.00 * 1.20 = 120.00 exactly: still rounds to 119.99, not 120.99.
        assert_eq!(price_cents(1, 1, 5000, 5000, 0.2), 11999);
    }

    #[test]
    fn margin_is_clamped_not_discounted() {
        // Negative margin behaves like zero margin.
        assert_eq!(
            price_cents(2, 2, 600, 250, -0.5),
            price_cents(2, 2, 600, 250, 0.0)
        );
    }
}
