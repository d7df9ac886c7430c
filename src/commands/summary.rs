use crate::api::{self, Mode};
use crate::args::SummaryArgs;
use crate::auth::AuthGate;
use crate::commands::Out;
use crate::directory::CategoryDirectory;
use crate::formula::format_amount;
use crate::summary::{minor_breakdown, summarize, MinorLine, Summary, TypeAmounts};
use crate::{Config, Result};
use serde::Serialize;

/// What `hodol summary` produces: the yearly table, or one major broken down by minor.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SummaryOut {
    Year(Summary),
    Breakdown(Vec<MinorLine>),
}

/// Totals every expense of the year by major category, in directory order.
pub async fn summary(config: Config, mode: Mode, args: &SummaryArgs) -> Result<Out<SummaryOut>> {
    let store = api::store(&config, mode)?;
    let records = store.list_expenses(None, None).await?;

    if let Some(major) = args.major() {
        let lines = minor_breakdown(&records, major, args.month());
        let scope = args
            .month()
            .map(|m| format!("month {m}"))
            .unwrap_or_else(|| "the year".to_string());
        let mut message = vec![format!("{major} by minor category for {scope}")];
        message.extend(
            lines
                .iter()
                .map(|line| format!("{:<16}{}", line.minor, amounts(&line.amounts))),
        );
        let message = message.join("\n");
        return Ok(Out::new(message, SummaryOut::Breakdown(lines)));
    }

    let mut directory = CategoryDirectory::new(store, AuthGate::new(config.token()));
    directory.load().await?;
    let summary = summarize(&directory.major_categories(), &records);

    let mut message = vec![format!("Yearly total {}", amounts(&summary.grand_total))];
    for major in &summary.majors {
        message.push(format!("{:<16}{}", major.major, amounts(&major.total)));
    }
    for month in &summary.used_months {
        if let Some(totals) = summary.totals_by_month.get(month) {
            message.push(format!("month {month:>2}        {}", amounts(totals)));
        }
    }
    Ok(Out::new(message.join("\n"), SummaryOut::Year(summary)))
}

fn amounts(amounts: &TypeAmounts) -> String {
    format!(
        "{:>12} (both {}, hodol {}, doldol {})",
        format_amount(amounts.total()),
        format_amount(amounts.both),
        format_amount(amounts.hodol),
        format_amount(amounts.doldol)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_yearly_summary() {
        let env = TestEnv::new().await;
        let out = summary(env.config(), Mode::Test, &SummaryArgs::new(None, None))
            .await
            .unwrap();
        let Some(SummaryOut::Year(year)) = out.structure() else {
            panic!("expected the yearly summary");
        };
        assert_eq!(year.grand_total.total(), 298_050);
        assert_eq!(year.used_months, vec![5, 6]);
        assert_eq!(year.majors[0].major, "Food");
        assert_eq!(year.majors[0].total.both, 101_300);
        assert_eq!(year.majors[0].total.hodol, 4_800);

        let lines: Vec<&str> = out.message().lines().collect();
        assert_eq!(lines.len(), 1 + year.majors.len() + year.used_months.len());
        assert!(lines[0].starts_with("Yearly total"));
        assert!(lines[1].starts_with("Food"));
        assert!(lines.last().unwrap().starts_with("month  6"));
    }

    #[tokio::test]
    async fn test_breakdown_for_one_month() {
        let env = TestEnv::new().await;
        let args = SummaryArgs::new(Some("Food".into()), Some(5));
        let out = summary(env.config(), Mode::Test, &args).await.unwrap();
        let Some(SummaryOut::Breakdown(lines)) = out.structure() else {
            panic!("expected a breakdown");
        };
        let minors: Vec<&str> = lines.iter().map(|l| l.minor.as_str()).collect();
        assert_eq!(minors, vec!["Cafe", "Groceries"]);
        assert_eq!(lines[1].amounts.both, 54_000);

        let message: Vec<&str> = out.message().lines().collect();
        assert_eq!(message.len(), 3);
        assert_eq!(message[0], "Food by minor category for month 5");
        assert!(message[1].starts_with("Cafe "));
        assert!(message[2].starts_with("Groceries "));
    }
}
