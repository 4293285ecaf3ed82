use std::fmt::Write as _;

use crate::service::OwnerListing;

/// Renders rows as left-aligned text columns separated by two spaces.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let clean = value.replace(['\n', '\r', '\t'], " ");
            let pad = width.saturating_sub(clean.chars().count());
            format!("{clean}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

pub fn render_owners(owners: &[OwnerListing]) -> String {
    let headers = ["owner_id", "processed_at", "total_clients", "mean_income"]
        .map(str::to_string)
        .to_vec();
    let rows = owners
        .iter()
        .map(|owner| {
            vec![
                owner.user_id.clone(),
                owner.processed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                owner.total_clients.to_string(),
                format!("{:.2}", owner.mean_income),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}
