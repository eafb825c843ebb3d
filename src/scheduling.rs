//! Expansion of a purchased package into a calendar of deliveries with
//! per-delivery meal assignments.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use utoipa::ToSchema;

/// One entry of the selected-meal multiset, in selection order.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SelectedMeal {
    pub meal_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelivery {
    pub date: NaiveDate,
    pub meal_ids: Vec<i32>,
}

/// Expands a package into chronologically ordered deliveries starting at
/// `today + 2` days, one day apart.
///
/// Standard packages get exactly one meal per delivery until the selection is
/// exhausted. Custom packages (name carries an "in D days" marker) spread the
/// meals as evenly as possible across `D` deliveries, the first `total % D`
/// deliveries receiving one extra meal. No more than `D` deliveries are ever
/// produced for a custom package, even if meals remain unassigned.
pub fn schedule(
    package_name: &str,
    selected_meals: &[SelectedMeal],
    today: NaiveDate,
) -> Vec<PlannedDelivery> {
    let first_date = today + Duration::days(2);
    let mut walker = MealWalker::new(selected_meals);
    let total = walker.remaining();
    let mut deliveries = Vec::new();

    match parse_day_span(package_name) {
        // Custom package: even spread across D days, remainder up front.
        Some(day_span) => {
            let per_day = total / day_span;
            let extra_days = total % day_span;
            for day in 0..day_span {
                if walker.remaining() == 0 {
                    break;
                }
                let take = per_day + if day < extra_days { 1 } else { 0 };
                deliveries.push(PlannedDelivery {
                    date: first_date + Duration::days(day),
                    meal_ids: walker.take(take),
                });
            }
        }
        // Standard package: one meal per day.
        None => {
            for day in 0..total {
                deliveries.push(PlannedDelivery {
                    date: first_date + Duration::days(day),
                    meal_ids: walker.take(1),
                });
            }
        }
    }

    deliveries
}

/// Finds an "in D days" marker in a package name. Absent marker means a
/// standard package.
pub fn parse_day_span(package_name: &str) -> Option<i64> {
    let lowered = package_name.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    tokens.windows(3).find_map(|window| {
        if window[0] == "in" && (window[2] == "days" || window[2] == "day") {
            window[1].parse::<i64>().ok().filter(|days| *days > 0)
        } else {
            None
        }
    })
}

/// Walks the selected-meal list in original order, consuming one unit of
/// count at a time.
struct MealWalker {
    queue: Vec<(i32, i64)>,
    index: usize,
}

impl MealWalker {
    fn new(selected: &[SelectedMeal]) -> Self {
        let queue = selected
            .iter()
            .filter(|m| m.quantity > 0)
            .map(|m| (m.meal_id, m.quantity as i64))
            .collect();
        Self { queue, index: 0 }
    }

    fn remaining(&self) -> i64 {
        self.queue[self.index..].iter().map(|(_, count)| count).sum()
    }

    fn take(&mut self, n: i64) -> Vec<i32> {
        let mut taken = Vec::new();
        for _ in 0..n {
            let Some((meal_id, count)) = self.queue.get_mut(self.index) else {
                break;
            };
            taken.push(*meal_id);
            *count -= 1;
            if *count == 0 {
                self.index += 1;
            }
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meals(counts: &[(i32, i32)]) -> Vec<SelectedMeal> {
        counts
            .iter()
            .map(|(meal_id, quantity)| SelectedMeal {
                meal_id: *meal_id,
                quantity: *quantity,
            })
            .collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    #[test]
    fn standard_package_one_meal_per_day() {
        // meals A x2, B x1 -> three deliveries of one meal: A, A, B
        let plan = schedule("Week Starter", &meals(&[(1, 2), (2, 1)]), today());

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].date, today() + Duration::days(2));
        assert_eq!(plan[1].date, today() + Duration::days(3));
        assert_eq!(plan[2].date, today() + Duration::days(4));
        assert_eq!(plan[0].meal_ids, vec![1]);
        assert_eq!(plan[1].meal_ids, vec![1]);
        assert_eq!(plan[2].meal_ids, vec![2]);
    }

    #[test]
    fn custom_package_spreads_remainder_up_front() {
        // 7 meals in 3 days -> sizes [3, 2, 2]
        let plan = schedule(
            "Custom box in 3 days",
            &meals(&[(1, 4), (2, 3)]),
            today(),
        );

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].meal_ids, vec![1, 1, 1]);
        assert_eq!(plan[1].meal_ids, vec![1, 2]);
        assert_eq!(plan[2].meal_ids, vec![2, 2]);
    }

    #[test]
    fn custom_package_dates_are_consecutive() {
        let plan = schedule("Custom in 3 days", &meals(&[(1, 6)]), today());
        let dates: Vec<NaiveDate> = plan.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            vec![
                today() + Duration::days(2),
                today() + Duration::days(3),
                today() + Duration::days(4),
            ]
        );
    }

    #[test]
    fn custom_package_stops_when_meals_run_out() {
        // 2 meals over 5 days: only 2 deliveries come out.
        let plan = schedule("Custom in 5 days", &meals(&[(9, 2)]), today());
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].meal_ids, vec![9]);
        assert_eq!(plan[1].meal_ids, vec![9]);
    }

    #[test]
    fn custom_package_never_exceeds_day_span() {
        let plan = schedule("Custom in 2 days", &meals(&[(1, 9)]), today());
        assert_eq!(plan.len(), 2);
        // Even spread: 5 then 4; the ninth meal is not spilled into a third day.
        assert_eq!(plan[0].meal_ids.len(), 5);
        assert_eq!(plan[1].meal_ids.len(), 4);
    }

    #[test]
    fn meal_order_follows_selection_order() {
        let plan = schedule("Custom in 2 days", &meals(&[(3, 1), (1, 2), (2, 1)]), today());
        let flattened: Vec<i32> = plan.iter().flat_map(|d| d.meal_ids.clone()).collect();
        assert_eq!(flattened, vec![3, 1, 1, 2]);
    }

    #[test]
    fn zero_and_negative_quantities_are_skipped() {
        let plan = schedule("Weekly", &meals(&[(1, 0), (2, -2), (3, 1)]), today());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].meal_ids, vec![3]);
    }

    #[test]
    fn day_span_parsing() {
        assert_eq!(parse_day_span("Custom box in 3 days"), Some(3));
        assert_eq!(parse_day_span("IN 10 DAYS special"), Some(10));
        assert_eq!(parse_day_span("everything in 1 day"), Some(1));
        assert_eq!(parse_day_span("in zero days"), None);
        assert_eq!(parse_day_span("in -2 days"), None);
        assert_eq!(parse_day_span("Week Starter"), None);
    }

    #[test]
    fn empty_selection_yields_no_deliveries() {
        assert!(schedule("Weekly", &[], today()).is_empty());
        assert!(schedule("Custom in 3 days", &[], today()).is_empty());
    }
}
