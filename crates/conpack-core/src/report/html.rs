use std::fmt::Write;

use crate::model::MappingRecord;

const MAX_DESCRIPTION_CHARS: usize = 150;

/// Searchable HTML table of every mapping of a job, sorted by control id.
pub fn render_mappings_html(job_id: &str, records: &[MappingRecord]) -> String {
    let mut sorted: Vec<&MappingRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.control_id
            .cmp(&b.control_id)
            .then_with(|| a.rule_identifier.cmp(&b.rule_identifier))
    });

    let unique_controls = count_distinct(sorted.iter().map(|r| r.control_id.as_str()));
    let unique_rules = count_distinct(sorted.iter().map(|r| r.rule_identifier.as_str()));
    let job = escape(job_id);

    let mut html = String::with_capacity(4096 + sorted.len() * 256);
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Control Mappings Report - {job}</title>
    <style>
        body {{ font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; color: #333; background: #f5f5f5; padding: 20px; }}
        .stats {{ display: flex; gap: 16px; margin: 16px 0; }}
        .stat-card {{ background: #fff; padding: 12px 20px; border-radius: 6px; }}
        .stat-card .value {{ font-size: 1.6em; font-weight: bold; }}
        .search-box {{ width: 100%; padding: 8px; margin-bottom: 12px; }}
        table {{ width: 100%; border-collapse: collapse; background: #fff; }}
        th, td {{ text-align: left; padding: 8px; border-bottom: 1px solid #eee; vertical-align: top; }}
        .control-id {{ font-weight: bold; }}
        .control-description {{ font-size: 0.85em; color: #666; }}
        .config-rule {{ font-family: monospace; }}
    </style>
</head>
<body>
    <h1>Control Mappings Report</h1>
    <p>Job: {job}</p>
    <div class="stats">
        <div class="stat-card"><div class="label">Total Mappings</div><div class="value">{total}</div></div>
        <div class="stat-card"><div class="label">Unique Controls</div><div class="value">{unique_controls}</div></div>
        <div class="stat-card"><div class="label">Config Rules</div><div class="value">{unique_rules}</div></div>
    </div>
    <input type="text" class="search-box" id="searchBox" placeholder="Search by control ID, config rule, or explanation...">
    <table id="mappingsTable">
        <thead>
            <tr><th style="width: 15%">Control ID</th><th style="width: 25%">Config Rule</th><th style="width: 60%">Relevance Explanation</th></tr>
        </thead>
        <tbody>
"#,
        total = sorted.len(),
    );

    for record in &sorted {
        let explanation = if record.relevance_explanation.is_empty() {
            "No explanation provided"
        } else {
            record.relevance_explanation.as_str()
        };
        let _ = write!(
            html,
            r#"            <tr>
                <td><div class="control-id">{}</div><div class="control-description">{}</div></td>
                <td><span class="config-rule">{}</span></td>
                <td class="explanation">{}</td>
            </tr>
"#,
            escape(&record.control_id),
            escape(&truncate(&record.control_description, MAX_DESCRIPTION_CHARS)),
            escape(&record.rule_identifier),
            escape(explanation),
        );
    }

    html.push_str(
        r#"        </tbody>
    </table>
    <script>
        const searchBox = document.getElementById('searchBox');
        const rows = document.querySelectorAll('#mappingsTable tbody tr');
        searchBox.addEventListener('input', function () {
            const term = this.value.toLowerCase();
            rows.forEach(row => {
                row.style.display = row.textContent.toLowerCase().includes(term) ? '' : 'none';
            });
        });
    </script>
</body>
</html>
"#,
    );
    html
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.collect::<std::collections::BTreeSet<_>>().len()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
