use std::fmt::Write;

use crate::models::{
    format_total_days, Cell, CellCategory, MatrixRow, MatrixView, Selectors, SortSpec,
    METADATA_HEADERS,
};

const STYLE: &str = "\
body { font-family: sans-serif; margin: 1.5rem; }
.matrix-table { border-collapse: collapse; font-size: 0.85rem; }
.matrix-table th, .matrix-table td { border: 1px solid #ddd; padding: 4px 6px; }
.matrix-table td { white-space: nowrap; }
.matrix-table th { background: #f4f4f4; position: sticky; top: 0; }
.student-name { font-weight: 600; }
.pill { border-radius: 10px; padding: 2px 8px; }
.pill.transition { background: #d4f5dd; color: #116329; }
.pill.no-change { background: #eeeeee; color: #555555; }
";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn scope_line(selectors: &Selectors, sort: SortSpec) -> String {
    format!(
        "District: {} | Mandal: {} | School: {} | Sorted by {} ({})",
        selectors.district,
        selectors.mandal,
        selectors.school,
        sort.field.label(),
        sort.order.label()
    )
}

fn metadata_cells(row: &MatrixRow) -> [String; 5] {
    [
        row.student.clone(),
        row.grade.clone(),
        format_total_days(row.total_days),
        row.start_milestone.clone(),
        row.current_milestone.clone(),
    ]
}

pub fn build_html(view: &MatrixView, selectors: &Selectors, sort: SortSpec) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html lang=\"en\">");
    let _ = writeln!(output, "<head>");
    let _ = writeln!(output, "<meta charset=\"utf-8\">");
    let _ = writeln!(output, "<title>Milestone Progress Matrix</title>");
    let _ = writeln!(output, "<style>\n{STYLE}</style>");
    let _ = writeln!(output, "</head>");
    let _ = writeln!(output, "<body>");
    let _ = writeln!(output, "<h1>Milestone Progress Matrix</h1>");
    let _ = writeln!(
        output,
        "<p class=\"scope\">{}</p>",
        escape_html(&scope_line(selectors, sort))
    );
    let _ = writeln!(output, "<table class=\"matrix-table\">");

    let _ = write!(output, "<thead><tr>");
    for label in METADATA_HEADERS {
        let _ = write!(output, "<th>{label}</th>");
    }
    for label in view.header_labels().iter().skip(METADATA_HEADERS.len()) {
        let _ = write!(output, "<th>{}</th>", escape_html(label));
    }
    let _ = writeln!(output, "</tr></thead>");

    let _ = writeln!(output, "<tbody>");
    for row in &view.rows {
        let [student, rest @ ..] = metadata_cells(row);
        let _ = write!(
            output,
            "<tr><td class=\"student-name\">{}</td>",
            escape_html(&student)
        );
        for value in rest {
            let _ = write!(output, "<td>{}</td>", escape_html(&value));
        }
        for cell in &row.cells {
            match cell {
                Cell::Empty => output.push_str("<td></td>"),
                Cell::Observed { category, text } => {
                    let _ = write!(
                        output,
                        "<td><span class=\"pill {}\">{}</span></td>",
                        category.css_class(),
                        escape_html(text)
                    );
                }
            }
        }
        let _ = writeln!(output, "</tr>");
    }
    let _ = writeln!(output, "</tbody>");
    let _ = writeln!(output, "</table>");
    let _ = writeln!(output, "</body>");
    let _ = writeln!(output, "</html>");

    output
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|")
}

pub fn build_markdown(view: &MatrixView, selectors: &Selectors, sort: SortSpec) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Milestone Progress Matrix");
    let _ = writeln!(output, "{}", scope_line(selectors, sort));
    let _ = writeln!(output);

    if view.rows.is_empty() {
        let _ = writeln!(output, "No students match these filters.");
        return output;
    }

    let headers = view.header_labels();
    let _ = writeln!(output, "| {} |", headers.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(headers.len()));

    for row in &view.rows {
        let mut values: Vec<String> = metadata_cells(row)
            .iter()
            .map(|value| escape_markdown(value))
            .collect();
        // Transitions are bolded; an observation without movement text shows "-".
        values.extend(row.cells.iter().map(|cell| match cell {
            Cell::Empty => String::new(),
            Cell::Observed { text, .. } if text.is_empty() => "-".to_string(),
            Cell::Observed {
                category: CellCategory::Transition,
                text,
            } => format!("**{}**", escape_markdown(text)),
            Cell::Observed { text, .. } => escape_markdown(text),
        }));
        let _ = writeln!(output, "| {} |", values.join(" | "));
    }

    output
}
