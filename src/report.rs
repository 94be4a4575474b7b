// 📋 Plain-text tables for the benchmark log

use std::collections::BTreeMap;
use std::fmt::Debug;

use rust_decimal::Decimal;

use crate::model::{Combination, Goods};

/// Render rows under a header with each column padded to its widest cell.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(headers.to_vec()));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

pub fn goods_table(goods: &[Goods]) -> String {
    let rows: Vec<Vec<String>> = goods
        .iter()
        .map(|g| vec![g.name().to_string(), g.price().to_string()])
        .collect();
    render_table(&["Goods", "Price"], &rows)
}

pub fn revenue_table(key_header: &str, revenue: &BTreeMap<String, Decimal>) -> String {
    let rows: Vec<Vec<String>> = revenue
        .iter()
        .map(|(key, sum)| vec![key.clone(), sum.to_string()])
        .collect();
    render_table(&[key_header, "Revenue"], &rows)
}

pub fn top_table(combinations: &[Combination]) -> String {
    let rows: Vec<Vec<String>> = combinations
        .iter()
        .map(|c| vec![c.goods.join(", "), c.count.to_string()])
        .collect();
    render_table(&["Goods", "Bills"], &rows)
}

/// "match" / "MISMATCH" summary for a pair of backend answers.
pub fn parity<T: PartialEq + Debug>(row: &T, column: &T) -> String {
    if row == column {
        "match".to_string()
    } else {
        format!("MISMATCH (row={:?}, column={:?})", row, column)
    }
}
