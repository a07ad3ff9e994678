//! Jira table recovery and conversion.
//!
//! Jira exports tables one row per line, a row being complete only if
//! it both starts and ends with `|`. Malformed exports split a single
//! logical row over several physical lines; those fragments are
//! re-joined here before the row is converted to a markdown table row.

/// Converts Jira tables in a text blob to markdown tables.
///
/// Re-joins rows that were broken over multiple lines (cell newlines
/// become `<br>`), turns the `||`-delimited header row into a
/// `|`-delimited one and synthesizes the `| --- |` separator line.
///
/// If a row never finds its closing `|` the table is considered broken:
/// the original text is returned unchanged unless `force_repair` is
/// set, in which case the joined lines are kept and a header is
/// inferred from the first complete single-delimited row.
pub(crate) fn convert_tables(text: &str, force_repair: bool) -> String {
    let mut lines: Vec<Option<String>> = text.lines().map(|l| Some(l.to_string())).collect();
    let line_count = lines.len();

    // Re-concatenate mistakenly broken rows.
    let mut i = 0;
    while i < line_count {
        let mut j = 0;
        let starts_row = lines[i]
            .as_deref()
            .is_some_and(|l| l.starts_with('|'));

        if starts_row {
            while i + j < line_count - 1 && !lines[i].as_deref().is_some_and(|l| l.ends_with('|')) {
                j += 1;
                let fragment = lines[i + j].take().unwrap_or_default();
                if let Some(row) = lines[i].as_mut() {
                    row.push_str("<br>");
                    row.push_str(&fragment);
                }
            }

            // Input exhausted without a closing delimiter: the table is
            // unrecoverable unless force repair is on.
            let closed = lines[i].as_deref().is_some_and(|l| l.ends_with('|'));
            if !closed && !force_repair {
                return text.to_string();
            }
        }

        i += j + 1;
    }

    let mut lines: Vec<String> = lines.into_iter().flatten().collect();
    let mut found_header = false;

    // Convert the ||-delimited header into |-delimited and insert the
    // | --- | separator line below it.
    for line in &mut lines {
        if line.len() >= 4 && line.starts_with("||") && line.ends_with("||") {
            found_header = true;
            let columns = delimiter_pairs(line).saturating_sub(1);
            let mut converted = line.replace("||", "|");
            converted.push('\n');
            converted.push_str(&separator_row(columns));
            *line = converted;
        }
    }

    // No explicit header: infer one from the first complete row.
    if force_repair && !found_header {
        if let Some(line) = lines
            .iter_mut()
            .find(|l| l.len() >= 2 && l.starts_with('|') && l.ends_with('|'))
        {
            let columns = (delimiter_pairs(line) * 2).saturating_sub(1);
            line.push('\n');
            line.push_str(&separator_row(columns));
        }
    }

    lines.join("\n")
}

/// Counts complete pairs of `|` characters in a row.
fn delimiter_pairs(line: &str) -> usize {
    line.chars().filter(|c| *c == '|').count() / 2
}

/// Builds a `| --- | --- |` separator row with the given cell count.
fn separator_row(columns: usize) -> String {
    let mut row = "| --- ".repeat(columns);
    row.push('|');
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_table_gets_header_separator() {
        let text = "||Name||Role||\n|alice|dev|\n|bob|ops|";
        let converted = convert_tables(text, false);

        assert_eq!(
            converted,
            "|Name|Role|\n| --- | --- |\n|alice|dev|\n|bob|ops|"
        );
    }

    #[test]
    fn single_line_rows_are_structurally_unchanged() {
        let text = "|alice|dev|\n|bob|ops|";
        assert_eq!(convert_tables(text, false), text);
    }

    #[test]
    fn broken_row_is_rejoined_with_line_break() {
        let text = "||Name||Notes||\n|alice|first\nsecond|\n|bob|ok|";
        let converted = convert_tables(text, false);

        assert_eq!(
            converted,
            "|Name|Notes|\n| --- | --- |\n|alice|first<br>second|\n|bob|ok|"
        );
    }

    #[test]
    fn unclosed_table_is_left_untouched_without_force_repair() {
        let text = "||Name||Notes||\n|alice|first\nsecond\nthird";
        assert_eq!(convert_tables(text, false), text);
    }

    #[test]
    fn unclosed_table_is_joined_with_force_repair() {
        let text = "|alice|first\nsecond";
        let converted = convert_tables(text, true);
        assert!(converted.starts_with("|alice|first<br>second"));
    }

    #[test]
    fn force_repair_infers_header_from_first_row() {
        let text = "|alice|dev|\n|bob|ops|";
        let converted = convert_tables(text, true);

        // |a|d| has four pipes -> two pairs -> three inferred cells.
        assert_eq!(
            converted,
            "|alice|dev|\n| --- | --- | --- |\n|bob|ops|"
        );
    }

    #[test]
    fn text_without_tables_passes_through() {
        let text = "plain paragraph\nwith two lines";
        assert_eq!(convert_tables(text, false), text);
    }

    #[test]
    fn header_separator_has_one_divider_per_column() {
        let text = "||a||b||c||";
        let converted = convert_tables(text, false);
        assert_eq!(converted, "|a|b|c|\n| --- | --- | --- |");
        assert_eq!(converted.matches("---").count(), 3);
    }
}
