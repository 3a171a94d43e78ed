//! Appendix labeling.
//!
//! Assigns `Appendix A./B./C.` labels to the Evidence check, Glossary,
//! and Manifest sections, in that fixed order, and maintains a single
//! "See appendices:" anchor line above the References heading. Both
//! transforms are idempotent: labels are normalized from scratch on each
//! run, and the anchor line is replaced rather than duplicated.

/// Appendix sections in label order.
const APPENDIX_ORDER: &[&str] = &["Evidence check", "Glossary", "Manifest"];

/// Prefix of the anchor line maintained above References.
const ANCHOR_PREFIX: &str = "See appendices:";

/// Labels appendix headings and refreshes the anchor line. Idempotent.
#[must_use]
pub fn label_appendices(markdown: &str) -> String {
    // Which appendix sections exist, in label order.
    let present: Vec<&str> = APPENDIX_ORDER
        .iter()
        .filter(|name| find_appendix_heading(markdown, name).is_some())
        .copied()
        .collect();

    if present.is_empty() {
        return markdown.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut skip_blank = false;
    for line in markdown.lines() {
        // Drop any previous anchor line (and its separator blank); both
        // are re-inserted below.
        if skip_blank {
            skip_blank = false;
            if line.trim().is_empty() {
                continue;
            }
        }
        if line.trim_start().starts_with(ANCHOR_PREFIX) {
            skip_blank = true;
            continue;
        }
        lines.push(relabel_line(line, &present));
    }

    // Build the anchor line and place it right before References.
    let anchor = format!(
        "{ANCHOR_PREFIX} {}.",
        present
            .iter()
            .enumerate()
            .map(|(index, name)| format!("Appendix {} ({name})", letter(index)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    if let Some(at) = lines.iter().position(|l| {
        super::validate::heading_text(l)
            .is_some_and(|h| h.eq_ignore_ascii_case("references"))
    }) {
        lines.insert(at, String::new());
        lines.insert(at, anchor);
    }

    let mut out = lines.join("\n");
    if markdown.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Rewrites a heading line to its canonical appendix label, leaving
/// everything else untouched.
fn relabel_line(line: &str, present: &[&str]) -> String {
    let Some(heading) = super::validate::heading_text(line) else {
        return line.to_string();
    };
    let bare = strip_label(heading);
    for (index, name) in present.iter().enumerate() {
        if bare.eq_ignore_ascii_case(name) {
            let hashes: String = line.trim_start().chars().take_while(|&c| c == '#').collect();
            return format!("{hashes} Appendix {}. {name}", letter(index));
        }
    }
    line.to_string()
}

/// Removes an existing `Appendix X.` prefix from a heading.
fn strip_label(heading: &str) -> &str {
    let Some(rest) = heading.strip_prefix("Appendix ") else {
        return heading;
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.split_once('.').map(|(_, tail)| tail) else {
        return heading;
    };
    rest.trim()
}

fn find_appendix_heading<'a>(markdown: &'a str, name: &str) -> Option<&'a str> {
    markdown.lines().find(|line| {
        super::validate::heading_text(line)
            .is_some_and(|h| strip_label(h).eq_ignore_ascii_case(name))
    })
}

const fn letter(index: usize) -> char {
    match index {
        0 => 'A',
        1 => 'B',
        _ => 'C',
    }
}
