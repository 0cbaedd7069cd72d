//! HTML rendering of a report table.
//!
//! The output is a self-contained page handed to the image renderer.

use crate::table::ReportTable;

const STYLE: &str = r#"
body { font-family: "Helvetica Neue", Arial, sans-serif; background: #ffffff; margin: 16px; }
h2 { font-size: 16px; color: #222222; margin: 0 0 8px 0; }
table { border-collapse: collapse; font-size: 13px; }
th { background: #2f4858; color: #ffffff; padding: 6px 10px; text-align: center; }
td { padding: 5px 10px; border-bottom: 1px solid #e0e0e0; }
td.label { text-align: left; font-weight: 600; }
td.date { text-align: center; color: #555555; }
td.num { text-align: right; font-variant-numeric: tabular-nums; }
tr:nth-child(even) td { background: #f5f7f8; }
"#;

/// Generate the complete HTML page for a table.
pub fn generate_html(table: &ReportTable) -> String {
    let mut output = String::new();

    output.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    output.push_str(&format!("<style>{}</style>\n", STYLE));
    output.push_str("</head>\n<body>\n");
    output.push_str(&format!(
        "<h2>Application User Data for {}</h2>\n",
        table.target_date.format("%Y-%m-%d")
    ));
    output.push_str(&generate_table(table));
    output.push_str("</body>\n</html>\n");

    output
}

fn generate_table(table: &ReportTable) -> String {
    let mut section = String::new();

    section.push_str("<table>\n<thead>\n<tr>");
    for header in table.headers() {
        section.push_str(&format!("<th>{}</th>", escape(&header)));
    }
    section.push_str("</tr>\n</thead>\n<tbody>\n");

    for row in &table.rows {
        section.push_str("<tr>");
        section.push_str(&format!("<td class=\"label\">{}</td>", escape(&row.label)));
        section.push_str(&format!(
            "<td class=\"date\">{}</td>",
            row.end_date.format("%Y-%m-%d")
        ));
        for value in &row.values {
            section.push_str(&format!("<td class=\"num\">{}</td>", group_thousands(*value)));
        }
        section.push_str("</tr>\n");
    }

    section.push_str("</tbody>\n</table>\n");
    section
}

/// Escape text for HTML element content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format an integer with `,` thousands separators.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0 {
        grouped.insert(0, '-');
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ReportRow;
    use chrono::NaiveDate;

    fn create_test_table() -> ReportTable {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        ReportTable {
            target_date: date,
            companies: vec!["Acme & Sons".to_string(), "Globex".to_string()],
            rows: vec![ReportRow {
                label: "Active Users: Daily".to_string(),
                end_date: date,
                values: vec![1234567, 12],
            }],
        }
    }

    #[test]
    fn test_generate_html() {
        let html = generate_html(&create_test_table());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Application User Data for 2024-01-02"));
        assert!(html.contains("<th>Acme &amp; Sons</th>"));
        assert!(html.contains("<td class=\"label\">Active Users: Daily</td>"));
        assert!(html.contains("1,234,567"));
        assert!(html.contains("<td class=\"num\">12</td>"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(123456), "123,456");
        assert_eq!(group_thousands(-1234567), "-1,234,567");
    }
}
