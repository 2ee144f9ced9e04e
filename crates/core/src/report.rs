use tabled::builder::Builder;
use tabled::settings::style::HorizontalLine;
use tabled::settings::Style;
use tracing::warn;

use crate::model::{QuotaRecord, ReportKind, TableStyle, BYTES_PER_GIB};
use crate::normalize::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    User,
    Path,
    Alias,
    Filesystem,
    BlocksUsed,
    BlocksSoft,
    BlocksHard,
    BlocksGrace,
    FilesUsed,
    FilesSoft,
    FilesHard,
    FilesGrace,
    BlocksPct,
    FilesPct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Units {
    Raw,
    Gib,
}

const FULL_HEADERS: &[(Field, &str)] = &[
    (Field::User, "User"),
    (Field::Path, "Path"),
    (Field::Alias, "Alias"),
    (Field::Filesystem, "Fs"),
    (Field::BlocksUsed, "Used (Bytes)"),
    (Field::BlocksSoft, "Soft (Bytes)"),
    (Field::BlocksHard, "Hard (Bytes)"),
    (Field::BlocksGrace, "Grace (Days)"),
    (Field::FilesUsed, "Files (N)"),
    (Field::FilesSoft, "Soft (N)"),
    (Field::FilesHard, "Hard (N)"),
    (Field::FilesGrace, "Grace (Days)"),
    (Field::BlocksPct, "Bytes (%)"),
    (Field::FilesPct, "Files (%)"),
];

const SHORT_HEADERS: &[(Field, &str)] = &[
    (Field::User, "User"),
    (Field::Path, "Path"),
    (Field::BlocksPct, "Quota Used (%)"),
    (Field::BlocksUsed, "Blocks Used (GB)"),
    (Field::FilesUsed, "Total Files (#)"),
];

const LOGIN_HEADERS: &[(Field, &str)] = &[
    (Field::Alias, "Storage"),
    (Field::BlocksUsed, "Used (GB)"),
    (Field::BlocksHard, "Limit (GB)"),
    (Field::FilesUsed, "Files (#)"),
    (Field::BlocksPct, "Quota Used (%)"),
];

pub fn render_report(kind: ReportKind, records: &[QuotaRecord], style: TableStyle) -> String {
    match kind {
        ReportKind::Full => full_report(records, style),
        ReportKind::Short => short_report(records, style),
        ReportKind::Login => login_report(records, style, true),
    }
}

pub fn full_report(records: &[QuotaRecord], style: TableStyle) -> String {
    project(records, FULL_HEADERS, Units::Raw, true, style)
}

pub fn short_report(records: &[QuotaRecord], style: TableStyle) -> String {
    project(records, SHORT_HEADERS, Units::Gib, true, style)
}

pub fn login_report(records: &[QuotaRecord], style: TableStyle, with_header: bool) -> String {
    project(records, LOGIN_HEADERS, Units::Gib, with_header, style)
}

/// Keeps records whose `blocks_pct` exceeds 100. Records without a
/// percentage cannot be judged and are dropped with a warning.
pub fn only_over_quota(records: &[QuotaRecord]) -> Vec<QuotaRecord> {
    records
        .iter()
        .filter(|record| {
            if record.blocks_pct.is_none() {
                warn!(
                    "no usage percentage for {} on {}; skipping",
                    record.user, record.path
                );
            }
            record.is_over_quota()
        })
        .cloned()
        .collect()
}

pub fn to_gib(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GIB)
}

fn project(
    records: &[QuotaRecord],
    headers: &[(Field, &str)],
    units: Units,
    with_header: bool,
    style: TableStyle,
) -> String {
    let header = with_header.then(|| {
        headers
            .iter()
            .map(|(_, label)| label.to_string())
            .collect::<Vec<_>>()
    });
    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|(field, _)| cell(record, *field, units))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_table(header, rows, style)
}

fn cell(record: &QuotaRecord, field: Field, units: Units) -> String {
    let bytes = |value: Option<u64>| match units {
        Units::Raw => count(value),
        Units::Gib => value.map(|v| format!("{:.2}", to_gib(v))).unwrap_or_default(),
    };
    match field {
        Field::User => record.user.clone(),
        Field::Path => record.path.clone(),
        Field::Alias => record.alias.clone(),
        Field::Filesystem => record.filesystem.to_string(),
        Field::BlocksUsed => bytes(record.blocks_used),
        Field::BlocksSoft => bytes(record.blocks_soft),
        Field::BlocksHard => bytes(record.blocks_hard),
        Field::BlocksGrace => count(record.blocks_grace_days),
        Field::FilesUsed => count(record.files_used),
        Field::FilesSoft => count(record.files_soft),
        Field::FilesHard => count(record.files_hard),
        Field::FilesGrace => count(record.files_grace_days),
        Field::BlocksPct => percent(record.blocks_pct),
        Field::FilesPct => percent(record.files_pct),
    }
}

fn count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn percent(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn render_table(header: Option<Vec<String>>, rows: Vec<Vec<String>>, style: TableStyle) -> String {
    match style {
        TableStyle::Html => render_html(header, rows),
        _ => render_text(header, rows, style),
    }
}

fn render_text(header: Option<Vec<String>>, rows: Vec<Vec<String>>, style: TableStyle) -> String {
    let has_header = header.is_some();
    let mut builder = Builder::default();
    if let Some(header) = header {
        builder.push_record(header);
    }
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    match style {
        // Header underline styles fall back to blank when there is no header.
        TableStyle::Plain => table.with(Style::blank()),
        TableStyle::Simple | TableStyle::Psql | TableStyle::Html if !has_header => {
            table.with(Style::blank())
        }
        TableStyle::Simple => table.with(
            Style::blank().horizontals([(1, HorizontalLine::new('-').intersection(' '))]),
        ),
        TableStyle::Psql | TableStyle::Html => table.with(Style::psql()),
        TableStyle::Github => table.with(Style::markdown()),
        TableStyle::Grid => table.with(Style::ascii()),
        TableStyle::Rounded => table.with(Style::rounded()),
    };
    table.to_string()
}

fn render_html(header: Option<Vec<String>>, rows: Vec<Vec<String>>) -> String {
    let mut out = String::from("<table>\n");
    if let Some(header) = header {
        out.push_str("<thead>\n<tr>");
        for label in header {
            out.push_str(&format!("<th>{}</th>", escape_html(&label)));
        }
        out.push_str("</tr>\n</thead>\n");
    }
    out.push_str("<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for value in row {
            out.push_str(&format!("<td>{}</td>", escape_html(&value)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>");
    out
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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

#[cfg(test)]
mod tests {
    use super::{full_report, login_report, only_over_quota, short_report, to_gib};
    use crate::model::{FilesystemKind, QuotaRecord, TableStyle};

    const GIB: u64 = 1024 * 1024 * 1024;

    fn record(user: &str, path: &str, used: u64, soft: u64, pct: Option<f64>) -> QuotaRecord {
        QuotaRecord {
            user: user.to_string(),
            path: path.to_string(),
            alias: format!("{path} storage"),
            filesystem: FilesystemKind::Xfs,
            blocks_used: Some(used),
            blocks_soft: Some(soft),
            blocks_hard: Some(soft),
            blocks_grace_days: Some(0),
            files_used: Some(1234),
            files_soft: Some(0),
            files_hard: Some(0),
            files_grace_days: Some(0),
            blocks_pct: pct,
            files_pct: None,
        }
    }

    #[test]
    fn short_report_converts_bytes_to_gib() {
        let records = vec![record("alice", "/home", 3 * GIB / 2, 2 * GIB, Some(75.0))];
        let text = short_report(&records, TableStyle::Plain);
        assert!(text.contains("Quota Used (%)"));
        assert!(text.contains("1.50"));
        assert!(text.contains("1234"));
        assert!(text.contains("75.00"));
        assert!(!text.contains(&(3 * GIB / 2).to_string()));
    }

    #[test]
    fn full_report_keeps_raw_units() {
        let records = vec![record("alice", "/home", 3 * GIB / 2, 2 * GIB, Some(75.0))];
        let text = full_report(&records, TableStyle::Github);
        assert!(text.contains(&(3 * GIB / 2).to_string()));
        assert!(text.contains("| User"));
        assert!(text.contains("xfs"));
    }

    #[test]
    fn login_report_header_is_optional() {
        let records = vec![record("alice", "/home", GIB, 2 * GIB, Some(50.0))];
        let with_header = login_report(&records, TableStyle::Plain, true);
        let without_header = login_report(&records, TableStyle::Plain, false);
        assert!(with_header.contains("Storage"));
        assert!(!without_header.contains("Storage"));
        assert!(without_header.contains("/home storage"));
        assert!(without_header.contains("2.00"));
    }

    #[test]
    fn simple_and_psql_styles_differ() {
        let records = vec![record("alice", "/home", GIB, 2 * GIB, Some(50.0))];
        let simple = short_report(&records, TableStyle::Simple);
        let psql = short_report(&records, TableStyle::Psql);
        assert_ne!(simple, psql);

        let underline = simple.lines().nth(1).expect("underline row");
        assert!(underline.trim_start().starts_with("---"));
        assert!(!simple.contains('|'));
        assert!(!simple.contains('+'));
        assert!(psql.contains('|'));
        assert!(psql.lines().nth(1).expect("separator row").contains('+'));
    }

    #[test]
    fn html_output_escapes_cells() {
        let records = vec![record("a<b", "/home", GIB, 2 * GIB, Some(50.0))];
        let html = short_report(&records, TableStyle::Html);
        assert!(html.starts_with("<table>"));
        assert!(html.contains("<th>User</th>"));
        assert!(html.contains("<td>a&lt;b</td>"));
    }

    #[test]
    fn over_quota_filter_drops_unknown_and_ok_records() {
        let records = vec![
            record("alice", "/home", 120, 100, Some(120.0)),
            record("alice", "/data", 40, 100, Some(40.0)),
            record("bob", "/home", 40, 0, None),
            record("carol", "/home", 100, 100, Some(100.0)),
        ];
        let full = only_over_quota(&records);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].path, "/home");
        assert_eq!(full[0].user, "alice");
    }

    #[test]
    fn gib_conversion_rounds() {
        assert_eq!(to_gib(GIB), 1.0);
        assert_eq!(to_gib(GIB / 3), 0.33);
        assert_eq!(to_gib(0), 0.0);
    }
}
