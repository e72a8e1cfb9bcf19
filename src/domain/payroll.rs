use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{ApiError, ApiResult};

/// The figures HR enters for a slip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlipFigures {
    pub base_salary: f64,
    pub allowance: f64,
    pub overtime: f64,
    pub bonus: f64,
    pub deductions: f64,
}

impl SlipFigures {
    pub fn net(&self) -> f64 {
        self.base_salary + self.allowance + self.overtime + self.bonus - self.deductions
    }

    pub fn validate(&self) -> ApiResult<()> {
        let fields = [
            ("base_salary", self.base_salary),
            ("allowance", self.allowance),
            ("overtime", self.overtime),
            ("bonus", self.bonus),
            ("deductions", self.deductions),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ApiError::validation(format!(
                    "{name} must be a non-negative amount"
                )));
            }
        }
        Ok(())
    }
}

/// First and last day of the month containing `any_day`.
pub fn period_bounds(any_day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = any_day.with_day(1).unwrap_or(any_day);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month
        .map(|n| n - Duration::days(1))
        .unwrap_or(first);
    (first, last)
}

/// Rupiah formatting used on slips: `Rp 4.500.000`.
pub fn format_rupiah(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_is_plain_sum() {
        let f = SlipFigures {
            base_salary: 4_500_000.0,
            allowance: 300_000.0,
            overtime: 150_000.0,
            bonus: 0.0,
            deductions: 50_000.0,
        };
        assert_eq!(f.net(), 4_900_000.0);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn negative_figures_rejected() {
        let f = SlipFigures {
            deductions: -1.0,
            ..Default::default()
        };
        assert!(f.validate().is_err());
        let f = SlipFigures {
            bonus: f64::NAN,
            ..Default::default()
        };
        assert!(f.validate().is_err());
    }

    #[test]
    fn month_bounds() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(period_bounds(d(2026, 2, 17)), (d(2026, 2, 1), d(2026, 2, 28)));
        assert_eq!(period_bounds(d(2024, 2, 1)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(period_bounds(d(2026, 12, 31)), (d(2026, 12, 1), d(2026, 12, 31)));
    }

    #[test]
    fn rupiah_grouping() {
        assert_eq!(format_rupiah(4_900_000.0), "Rp 4.900.000");
        assert_eq!(format_rupiah(950.4), "Rp 950");
        assert_eq!(format_rupiah(1_000.0), "Rp 1.000");
        assert_eq!(format_rupiah(-25_000.0), "-Rp 25.000");
    }
}
