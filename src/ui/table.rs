use tabled::builder::Builder;
use tabled::settings::{Padding, Style};

use crate::ui::widgets::TableSpec;

/// Borderless table; trailing padding is trimmed from every line.
pub fn render_table(spec: &TableSpec) -> String {
    let mut builder = Builder::default();
    if !spec.headers.is_empty() {
        builder.push_record(spec.headers.iter().map(String::as_str));
    }
    for row in &spec.rows {
        builder.push_record(row.iter().map(String::as_str));
    }
    let mut table = builder.build();
    table.with(Style::blank());
    table.with(Padding::new(0, 2, 0, 0));
    table
        .to_string()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<&str>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_without_trailing_spaces() {
        let rendered = render_table(&TableSpec::new(
            vec!["job".to_owned(), "command".to_owned()],
            vec![
                vec!["alpha".to_owned(), "python3 scrape.py".to_owned()],
                vec!["b".to_owned(), "true".to_owned()],
            ],
        ));
        let lines = rendered.lines().collect::<Vec<&str>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("job"));
        assert_eq!(lines[1].find("python3"), lines[2].find("true"));
        assert!(lines.iter().all(|line| !line.ends_with(' ')));
    }
}
