//! Tables for `list`, `search`, `patch choose` and install summaries.

use std::collections::BTreeMap;

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};
use glix_core::install::InstallReport;
use glix_core::store::InstalledVersion;
use glix_schema::{Arch, BatchCounts, VersionId, VersionInfo};

fn base(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn mark(ok: bool) -> Cell {
    if ok {
        Cell::new("✓").fg(Color::Green)
    } else {
        Cell::new("✗").fg(Color::Red)
    }
}

/// Installed versions with their payload locations.
pub fn installed(records: &[InstalledVersion]) -> Table {
    let mut table = base(vec!["Version", "Libc", "Interpreter", "Debug", "Source", "Added"]);
    for r in records {
        let added = r
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(r.version.as_str()).fg(Color::Cyan),
            Cell::new(r.library_path.display()),
            Cell::new(
                r.interpreter_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            mark(r.debug_path.is_some()),
            mark(r.source_path.is_some()),
            Cell::new(added).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Numbered list for interactive selection (1-based).
pub fn choices(records: &[InstalledVersion]) -> Table {
    let mut table = base(vec!["#", "Version"]);
    for (i, r) in records.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(r.version.as_str()).fg(Color::Cyan),
        ]);
    }
    table
}

/// Package availability per version for one architecture.
pub fn availability(
    results: &BTreeMap<VersionId, VersionInfo>,
    arch: Arch,
    packages: &[String],
) -> Table {
    let mut header = vec!["Version", "Arch"];
    header.extend(packages.iter().map(String::as_str));
    let mut table = base(header);

    for (version, info) in results {
        let mut row = vec![
            Cell::new(version.as_str()).fg(Color::Cyan),
            Cell::new(arch.as_str()),
        ];
        if let Some(err) = &info.error {
            row.push(Cell::new(err).fg(Color::Red));
        } else {
            row.extend(packages.iter().map(|p| {
                mark(
                    info.package(arch.build_label(), p)
                        .is_some_and(glix_schema::PackageInfo::is_available),
                )
            }));
        }
        table.add_row(row);
    }
    table
}

/// Per-stage counts of an install run.
pub fn install_summary(report: &InstallReport) -> Table {
    let mut table = base(vec!["Stage", "Attempted", "Succeeded", "Failed"]);
    let rows: [(&str, BatchCounts); 3] = [
        ("Download", report.downloads),
        ("Extract", report.extractions),
        ("Register", report.registrations),
    ];
    for (stage, counts) in rows {
        table.add_row(vec![
            Cell::new(stage),
            Cell::new(counts.attempted).set_alignment(CellAlignment::Right),
            Cell::new(counts.succeeded)
                .fg(Color::Green)
                .set_alignment(CellAlignment::Right),
            Cell::new(counts.failed)
                .fg(if counts.failed == 0 {
                    Color::DarkGrey
                } else {
                    Color::Red
                })
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
