//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| {
            Cell::new(h.to_uppercase())
                .set_alignment(CellAlignment::Left)
        }));
    table
}

/// Render the table to string with a count header.
pub fn render_list(entity_name: &str, table: Table, total: usize) -> String {
    if total == 0 {
        return format!("No {}s found.", entity_name);
    }
    let count_line = format!(
        "{} {}:",
        total,
        if total == 1 {
            entity_name.to_string()
        } else {
            format!("{}s", entity_name)
        }
    );
    format!("{}\n{}", count_line, table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_list_counts() {
        let mut table = list_table(&["user", "keys"]);
        table.add_row(vec!["alice", "active"]);

        let rendered = render_list("user", table, 1);
        assert!(rendered.starts_with("1 user:"));
        assert!(rendered.contains("USER"));
        assert!(rendered.contains("alice"));

        assert_eq!(render_list("user", list_table(&["user"]), 0), "No users found.");
    }
}
