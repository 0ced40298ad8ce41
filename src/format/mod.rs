//! Text rendering for the human-facing command output.
//!
//! JSON output paths serialize the model types directly; everything here
//! is for terminals: status/priority badges, the list table, the `show`
//! panel, and the dependency tree.

use crate::model::{Dependency, DependencyType, Issue, Status};
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use unicode_width::UnicodeWidthStr;

/// Fallback width when the terminal does not report one.
const DEFAULT_WIDTH: usize = 100;

/// Current terminal width for truncation decisions.
#[must_use]
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_WIDTH)
}

/// Truncate a title to `max` display columns, appending an ellipsis.
#[must_use]
pub fn truncate_title(title: &str, max: usize) -> String {
    if UnicodeWidthStr::width(title) <= max {
        return title.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for c in title.chars() {
        let char_width = UnicodeWidthStr::width(c.to_string().as_str());
        if width + char_width + 1 > max {
            break;
        }
        out.push(c);
        width += char_width;
    }
    out.push('…');
    out
}

/// `[P0]`..`[P4]` with urgency colouring.
#[must_use]
pub fn priority_badge(priority: crate::model::Priority, use_color: bool) -> String {
    let plain = format!("[P{}]", priority.0);
    if !use_color {
        return plain;
    }
    match priority.0 {
        0 => plain.red().bold().to_string(),
        1 => plain.red().to_string(),
        2 => plain.yellow().to_string(),
        3 => plain.blue().to_string(),
        _ => plain.dimmed().to_string(),
    }
}

/// Status rendered in the usual traffic-light palette.
#[must_use]
pub fn status_badge(status: Status, use_color: bool) -> String {
    let plain = status.as_str();
    if !use_color {
        return plain.to_string();
    }
    match status {
        Status::Open => plain.green().to_string(),
        Status::InProgress => plain.yellow().to_string(),
        Status::Closed => plain.dimmed().to_string(),
    }
}

/// One list row: `TEAM-12  [P1] [bug] open  Title`.
#[must_use]
pub fn issue_line(issue: &Issue, use_color: bool, max_width: Option<usize>) -> String {
    let type_badge = issue
        .issue_type
        .map_or_else(String::new, |t| format!("[{t}] "));
    let prefix_plain = format!(
        "{}  [P{}] {}{}  ",
        issue.identifier, issue.priority.0, type_badge, issue.status
    );
    let title = max_width.map_or_else(
        || issue.title.clone(),
        |width| {
            let budget = width.saturating_sub(UnicodeWidthStr::width(prefix_plain.as_str()));
            truncate_title(&issue.title, budget)
        },
    );

    format!(
        "{}  {} {}{}  {}",
        issue.identifier.bold_if(use_color),
        priority_badge(issue.priority, use_color),
        type_badge,
        status_badge(issue.status, use_color),
        title
    )
}

trait BoldIf {
    fn bold_if(&self, enabled: bool) -> String;
}

impl BoldIf for String {
    fn bold_if(&self, enabled: bool) -> String {
        if enabled {
            self.bold().to_string()
        } else {
            self.clone()
        }
    }
}

/// Multi-line panel for `show`.
#[must_use]
pub fn issue_panel(
    issue: &Issue,
    deps_out: &[Dependency],
    deps_in: &[Dependency],
    use_color: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        issue.identifier.bold_if(use_color),
        issue.title
    );
    let _ = writeln!(
        out,
        "  status: {}   priority: {}   type: {}",
        status_badge(issue.status, use_color),
        priority_badge(issue.priority, use_color),
        issue.issue_type.map_or("-".to_string(), |t| t.to_string()),
    );
    if let Some(assignee) = &issue.assignee {
        let _ = writeln!(out, "  assignee: {assignee}");
    }
    let _ = writeln!(
        out,
        "  created: {}   updated: {}",
        issue.created_at.format("%Y-%m-%d %H:%M"),
        issue.updated_at.format("%Y-%m-%d %H:%M"),
    );
    if let Some(closed_at) = issue.closed_at {
        let _ = writeln!(out, "  closed: {}", closed_at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(description) = &issue.description {
        let _ = writeln!(out);
        for line in description.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    if !deps_out.is_empty() {
        let _ = writeln!(out);
        for dep in deps_out {
            let verb = match dep.dep_type {
                DependencyType::Blocks => "blocks",
                DependencyType::Related => "related to",
                DependencyType::ParentChild => "child of",
                DependencyType::DiscoveredFrom => "discovered from",
            };
            let _ = writeln!(out, "  → {verb} {}", dep.depends_on_id);
        }
    }
    if !deps_in.is_empty() {
        if deps_out.is_empty() {
            let _ = writeln!(out);
        }
        for dep in deps_in {
            let verb = match dep.dep_type {
                DependencyType::Blocks => "blocked by",
                DependencyType::Related => "related to",
                DependencyType::ParentChild => "parent of",
                DependencyType::DiscoveredFrom => "discovered",
            };
            let _ = writeln!(out, "  ← {verb} {}", dep.issue_id);
        }
    }
    out
}

/// Render the dependency tree of `root`: depth-first over outgoing
/// `blocks` and `parent-child` edges, cycles cut by a per-call visited
/// set, `[READY]` on open issues with no open incoming blockers.
#[must_use]
pub fn dep_tree(
    root: &str,
    issues: &HashMap<String, Issue>,
    deps: &[Dependency],
    use_color: bool,
) -> String {
    let mut children: HashMap<&str, Vec<&Dependency>> = HashMap::new();
    for dep in deps {
        if matches!(
            dep.dep_type,
            DependencyType::Blocks | DependencyType::ParentChild
        ) {
            children.entry(dep.issue_id.as_str()).or_default().push(dep);
        }
    }

    // Open incoming blockers per issue, for the [READY] annotation.
    let mut open_blockers: HashSet<&str> = HashSet::new();
    for dep in deps {
        if dep.dep_type == DependencyType::Blocks {
            let blocker_open = issues
                .get(&dep.issue_id)
                .map_or(true, |blocker| blocker.status != Status::Closed);
            if blocker_open {
                open_blockers.insert(dep.depends_on_id.as_str());
            }
        }
    }

    let mut out = String::new();
    let mut visited = HashSet::new();
    walk(
        root,
        0,
        None,
        &children,
        issues,
        &open_blockers,
        &mut visited,
        &mut out,
        use_color,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn walk(
    id: &str,
    depth: usize,
    via: Option<DependencyType>,
    children: &HashMap<&str, Vec<&Dependency>>,
    issues: &HashMap<String, Issue>,
    open_blockers: &HashSet<&str>,
    visited: &mut HashSet<String>,
    out: &mut String,
    use_color: bool,
) {
    let indent = "  ".repeat(depth);
    let edge = match via {
        Some(DependencyType::ParentChild) => "◦ ",
        Some(_) => "→ ",
        None => "",
    };

    if !visited.insert(id.to_string()) {
        let _ = writeln!(out, "{indent}{edge}{id} (cycle)");
        return;
    }

    let line = match issues.get(id) {
        Some(issue) => {
            let ready = issue.status == Status::Open && !open_blockers.contains(id);
            let marker = if ready {
                if use_color {
                    " [READY]".green().to_string()
                } else {
                    " [READY]".to_string()
                }
            } else {
                String::new()
            };
            format!(
                "{indent}{edge}{} [{}] {}{marker}",
                issue.identifier, issue.status, issue.title
            )
        }
        None => format!("{indent}{edge}{id} (not cached)"),
    };
    let _ = writeln!(out, "{line}");

    if let Some(edges) = children.get(id) {
        for dep in edges {
            walk(
                &dep.depends_on_id,
                depth + 1,
                Some(dep.dep_type),
                children,
                issues,
                open_blockers,
                visited,
                out,
                use_color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("short", 10), "short");
        let truncated = truncate_title("a very long title indeed", 10);
        assert!(truncated.ends_with('…'));
        assert!(UnicodeWidthStr::width(truncated.as_str()) <= 10);
    }

    #[test]
    fn test_badges_plain() {
        assert_eq!(priority_badge(Priority::URGENT, false), "[P0]");
        assert_eq!(status_badge(Status::InProgress, false), "in_progress");
    }

    #[test]
    fn test_dep_tree_marks_ready_and_cycles() {
        let mut issues = HashMap::new();
        for (id, title) in [("TEAM-1", "root"), ("TEAM-2", "leaf")] {
            issues.insert(id.to_string(), Issue::new(id, title));
        }
        let deps = vec![
            Dependency::new("TEAM-1", "TEAM-2", DependencyType::Blocks),
            // A cycle back to the root.
            Dependency::new("TEAM-2", "TEAM-1", DependencyType::Blocks),
        ];

        let rendered = dep_tree("TEAM-1", &issues, &deps, false);
        // Root is open with no open incoming blockers... except TEAM-2
        // blocks it via the cycle, so only TEAM-2 is never ready either.
        assert!(rendered.contains("TEAM-1"));
        assert!(rendered.contains("(cycle)"));
    }

    #[test]
    fn test_dep_tree_ready_annotation() {
        let mut issues = HashMap::new();
        issues.insert("TEAM-1".to_string(), Issue::new("TEAM-1", "blocker"));
        issues.insert("TEAM-2".to_string(), Issue::new("TEAM-2", "blocked"));
        let deps = vec![Dependency::new("TEAM-1", "TEAM-2", DependencyType::Blocks)];

        let rendered = dep_tree("TEAM-1", &issues, &deps, false);
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].contains("[READY]"), "unblocked root is ready");
        assert!(!lines[1].contains("[READY]"), "blocked child is not");
    }

    #[test]
    fn test_issue_panel_includes_relations() {
        let issue = Issue::new("TEAM-3", "panel");
        let out_deps = vec![Dependency::new("TEAM-3", "TEAM-4", DependencyType::Blocks)];
        let in_deps = vec![Dependency::new("TEAM-5", "TEAM-3", DependencyType::Blocks)];
        let panel = issue_panel(&issue, &out_deps, &in_deps, false);
        assert!(panel.contains("blocks TEAM-4"));
        assert!(panel.contains("blocked by TEAM-5"));
    }
}
