//! Yearly totals: amounts per major category, month and expense type.

use crate::directory::compare_labels;
use crate::model::{ExpenseRecord, ExpenseType};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MONTHS: std::ops::RangeInclusive<u8> = 1..=12;

/// One amount per expense type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeAmounts {
    pub both: i64,
    pub hodol: i64,
    pub doldol: i64,
}

impl TypeAmounts {
    pub fn get(&self, expense_type: ExpenseType) -> i64 {
        match expense_type {
            ExpenseType::Both => self.both,
            ExpenseType::Hodol => self.hodol,
            ExpenseType::Doldol => self.doldol,
        }
    }

    pub fn add(&mut self, expense_type: ExpenseType, amount: i64) {
        match expense_type {
            ExpenseType::Both => self.both += amount,
            ExpenseType::Hodol => self.hodol += amount,
            ExpenseType::Doldol => self.doldol += amount,
        }
    }

    pub fn total(&self) -> i64 {
        self.both + self.hodol + self.doldol
    }

    fn merge(&mut self, other: &TypeAmounts) {
        self.both += other.both;
        self.hodol += other.hodol;
        self.doldol += other.doldol;
    }
}

/// The year of one major category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MajorSummary {
    pub major: String,
    /// Keyed by month, every month from 1 to 12 present.
    pub by_month: BTreeMap<u8, TypeAmounts>,
    pub total: TypeAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// In the order of the majors passed to [`summarize`].
    pub majors: Vec<MajorSummary>,
    pub totals_by_month: BTreeMap<u8, TypeAmounts>,
    pub grand_total: TypeAmounts,
    /// Months whose total across all types is positive.
    pub used_months: Vec<u8>,
}

/// One line of the breakdown of a major category by minor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinorLine {
    pub minor: String,
    pub amounts: TypeAmounts,
}

fn empty_months() -> BTreeMap<u8, TypeAmounts> {
    MONTHS.map(|m| (m, TypeAmounts::default())).collect()
}

/// Sums `records` for each of `majors`. Records whose major is not listed, or whose month is out
/// of range, are left out of every total.
pub fn summarize<S: AsRef<str>>(majors: &[S], records: &[ExpenseRecord]) -> Summary {
    let mut totals_by_month = empty_months();
    let mut summaries = Vec::with_capacity(majors.len());

    for major in majors {
        let major = major.as_ref();
        let mut by_month = empty_months();
        let mut total = TypeAmounts::default();
        for record in records
            .iter()
            .filter(|r| r.major_category.as_deref() == Some(major))
        {
            let Some(month) = by_month.get_mut(&record.month) else {
                continue;
            };
            let amount = record.amount.unwrap_or_default();
            month.add(record.expense_type, amount);
            total.add(record.expense_type, amount);
        }
        for (month, amounts) in &by_month {
            if let Some(totals) = totals_by_month.get_mut(month) {
                totals.merge(amounts);
            }
        }
        summaries.push(MajorSummary {
            major: major.to_string(),
            by_month,
            total,
        });
    }

    let mut grand_total = TypeAmounts::default();
    for amounts in totals_by_month.values() {
        grand_total.merge(amounts);
    }
    let used_months = totals_by_month
        .iter()
        .filter(|(_, t)| t.total() > 0)
        .map(|(m, _)| *m)
        .collect();

    Summary {
        majors: summaries,
        totals_by_month,
        grand_total,
        used_months,
    }
}

/// Breaks `major` down by minor category for one month, or for the whole year when `month` is
/// `None`. Lines are ordered by label.
pub fn minor_breakdown(records: &[ExpenseRecord], major: &str, month: Option<u8>) -> Vec<MinorLine> {
    let mut lines: Vec<MinorLine> = Vec::new();
    let matching = records
        .iter()
        .filter(|r| r.major_category.as_deref() == Some(major))
        .filter(|r| month.map_or(MONTHS.contains(&r.month), |m| r.month == m));
    for record in matching {
        let minor = record.minor_category.clone().unwrap_or_default();
        let amount = record.amount.unwrap_or_default();
        match lines.iter_mut().find(|l| l.minor == minor) {
            Some(line) => line.amounts.add(record.expense_type, amount),
            None => {
                let mut amounts = TypeAmounts::default();
                amounts.add(record.expense_type, amount);
                lines.push(MinorLine { minor, amounts });
            }
        }
    }
    lines.sort_by(|a, b| compare_labels(&a.minor, &b.minor));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExpenseId;

    fn record(
        month: u8,
        expense_type: ExpenseType,
        amount: Option<i64>,
        major: &str,
        minor: &str,
    ) -> ExpenseRecord {
        ExpenseRecord {
            id: Some(ExpenseId::new(format!("{month}-{major}-{minor}"))),
            month,
            expense_type,
            date: None,
            amount,
            major_category: Some(major.into()),
            minor_category: Some(minor.into()),
            note: String::new(),
        }
    }

    fn records() -> Vec<ExpenseRecord> {
        vec![
            record(5, ExpenseType::Both, Some(1000), "Food", "Cafe"),
            record(5, ExpenseType::Hodol, Some(500), "Food", "Groceries"),
            record(5, ExpenseType::Both, Some(200), "Food", "Groceries"),
            record(6, ExpenseType::Doldol, Some(3000), "Home", "Rent"),
            record(6, ExpenseType::Both, None, "Home", "Rent"),
            record(7, ExpenseType::Both, Some(999), "Unlisted", "x"),
        ]
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&["Food", "Home"], &records());
        let food = &summary.majors[0];
        assert_eq!(food.major, "Food");
        assert_eq!(
            food.by_month[&5],
            TypeAmounts {
                both: 1200,
                hodol: 500,
                doldol: 0
            }
        );
        assert_eq!(food.total.total(), 1700);
        assert_eq!(summary.majors[1].total.doldol, 3000);
        assert_eq!(summary.totals_by_month[&6].total(), 3000);
        assert_eq!(summary.totals_by_month[&7].total(), 0);
        assert_eq!(summary.grand_total.total(), 4700);
        assert_eq!(summary.used_months, vec![5, 6]);
        assert_eq!(summary.totals_by_month.len(), 12);
    }

    #[test]
    fn test_summarize_nothing() {
        let summary = summarize::<&str>(&[], &records());
        assert!(summary.majors.is_empty());
        assert!(summary.used_months.is_empty());
        assert_eq!(summary.grand_total, TypeAmounts::default());
    }

    #[test]
    fn test_minor_breakdown() {
        let lines = minor_breakdown(&records(), "Food", Some(5));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].minor, "Cafe");
        assert_eq!(lines[1].amounts.total(), 700);
        assert!(minor_breakdown(&records(), "Food", Some(6)).is_empty());
        let year = minor_breakdown(&records(), "Home", None);
        assert_eq!(year[0].amounts.get(ExpenseType::Doldol), 3000);
    }
}
