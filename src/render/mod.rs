use crate::table::table::Table;

pub enum RenderStyle {
    /// Minimal grid with `=` rules.
    Simple,
    /// Boxed grid with `+---+` rules, like a SQL shell.
    SqlStyle,
}

/// Format the table's current rows as a textual grid, in display order.
///
/// Pure function of the table's state: column width is the maximum of the
/// header width and the widest stringified cell. A table without rows
/// renders as a header-only grid; a table always has at least its primary
/// column, so there is never an empty header row.
pub fn render(table: &Table, style: RenderStyle) -> String {
    let headers: Vec<String> = table
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let rows: Vec<Vec<String>> = table
        .iter_rows()
        .map(|row| row.cells().iter().map(|cell| cell.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let total: usize = widths.iter().sum();
    let count = widths.len();
    let separator = match style {
        RenderStyle::Simple => format!(" {} ", "=".repeat(total + 3 * count - 1)),
        RenderStyle::SqlStyle => format!("+-{}-+", "-".repeat(total + 3 * count - 3)),
    };

    let format_line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = vec![separator.clone(), format_line(&headers), separator.clone()];
    for row in &rows {
        lines.push(format_line(row));
    }
    lines.push(separator);

    lines.join("\n")
}
