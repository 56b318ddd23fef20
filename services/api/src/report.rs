use rust_decimal::Decimal;
use site_scanner::screening::feasibility::ScenarioOutcome;
use site_scanner::screening::views::{ScenarioView, SiteSummaryRow};
use site_scanner::screening::{ParcelId, ScreeningError};

pub(crate) fn render_summary(rows: &[SiteSummaryRow], failures: &[(ParcelId, String)]) {
    println!("Site screening summary");
    if rows.is_empty() {
        println!("No sites screened successfully.");
    }

    for row in rows {
        println!(
            "\n#{} {} ({}) - {}",
            row.rank, row.address, row.parcel_id, row.strategy_label
        );
        match &row.reason {
            Some(reason) => println!(
                "  {} | constraints {} ({})",
                row.recommendation_label, row.constraint_status, reason
            ),
            None => println!(
                "  {} | constraints {} | score {:.3}",
                row.recommendation_label, row.constraint_status, row.rank_score
            ),
        }

        if let (Some(months), Some(margin), Some(profit), Some(roe)) = (
            row.holding_months,
            row.margin_pct,
            row.profit,
            row.annualized_roe_pct,
        ) {
            println!(
                "  best {months} months: profit {} | margin {margin:.1}% | annualised ROE {roe:.1}%",
                money(profit)
            );
        }
        if let Some(value) = row.value_per_unit {
            println!("  end value per unit {}", money(value));
        }
        for flag in &row.flags {
            println!("  ! {flag}");
        }
        for alternative in &row.alternatives {
            println!("  also screened {alternative}");
        }
    }

    if !failures.is_empty() {
        println!("\nFailed parcels");
        for (parcel, error) in failures {
            println!("- {parcel}: {error}");
        }
    }
}

pub(crate) fn failure_lines<'a>(
    failures: impl Iterator<Item = (&'a ParcelId, &'a ScreeningError)>,
) -> Vec<(ParcelId, String)> {
    failures
        .map(|(parcel, error)| (parcel.clone(), error.to_string()))
        .collect()
}

pub(crate) fn render_sweep(outcomes: &[ScenarioOutcome], best: Option<usize>) {
    println!("Holding period sweep");
    println!(
        "{:>7} {:>14} {:>8} {:>10} {:>12} {:>8}",
        "months", "profit", "margin", "ann. ROE", "finance", "risk"
    );
    for (index, outcome) in outcomes.iter().enumerate() {
        let view = ScenarioView::from(outcome);
        let marker = if Some(index) == best { " *" } else { "" };
        println!(
            "{:>7} {:>14} {:>7.1}% {:>9.1}% {:>12} {:>8}{marker}",
            view.holding_months,
            money(view.profit),
            view.margin_pct,
            view.annualized_roe_pct,
            money(view.finance),
            if view.holding_risk { "yes" } else { "no" },
        );
    }
}

fn money(value: Decimal) -> String {
    let rounded = value.round_dp(0);
    let digits = rounded.abs().to_string();
    let mut grouped = String::new();
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(Decimal::new(45147312, 2)), "$451,473");
        assert_eq!(money(Decimal::new(-1250, 0)), "-$1,250");
        assert_eq!(money(Decimal::ZERO), "$0");
    }
}
