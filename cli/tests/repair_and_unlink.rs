#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for repair, restore and unlink.

mod common;

use std::fs;

use common::TestContextBuilder;
use tmplsync_cli::config::LinkMode;
use tmplsync_cli::engine::repair::RepairOptions;
use tmplsync_cli::engine::{CompileOptions, LinkOptions, RemoveOptions};
use tmplsync_cli::resources::helpers::fs::is_broken_symlink;

fn build() -> common::IntegrationTestContext {
    TestContextBuilder::new()
        .with_project_config("[project]\nname = \"shop\"\n")
        .with_template("commands/deploy.md.tmpl", "deploy {{project.name}}\n")
        .with_template("commands/test.md.tmpl", "test {{project.name}}\n")
        .with_template("agents/reviewer.md.tmpl", "reviewer\n")
        .with_template("skills/audit/SKILL.md", "audit\n")
        .build()
}

/// N links broken out-of-band are all fixed by one repair and none remain.
#[cfg(unix)]
#[test]
fn repair_fixes_every_broken_link() {
    let ctx = build();
    let engine = ctx.engine(LinkMode::Symlink);
    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    engine.link(&ctx.project, LinkOptions::default()).unwrap();

    let layout = engine.layout(&ctx.project);
    fs::remove_file(layout.dir().join("commands/deploy.md")).unwrap();
    fs::remove_file(layout.dir().join("commands/test.md")).unwrap();
    fs::remove_file(layout.dir().join("skills/audit/SKILL.md")).unwrap();
    assert_eq!(engine.status(&ctx.project).unwrap().broken, 3);

    let report = engine.repair(&ctx.project, RepairOptions::default()).unwrap();
    assert_eq!(report.fixed.len(), 3);
    assert!(report.removed.is_empty());
    assert!(report.success());

    let status = engine.status(&ctx.project).unwrap();
    assert_eq!(status.broken, 0);
    assert_eq!(status.linked, 4);
    assert_eq!(ctx.read(".claude/commands/deploy.md"), "deploy shop\n");
    assert!(!is_broken_symlink(&ctx.project_path(".claude/skills/audit/SKILL.md")));
}

/// Repair on a healthy tree changes nothing.
#[cfg(unix)]
#[test]
fn repair_on_healthy_tree_is_a_no_op() {
    let ctx = build();
    let engine = ctx.engine(LinkMode::Symlink);
    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    engine.link(&ctx.project, LinkOptions::default()).unwrap();
    let report = engine.repair(&ctx.project, RepairOptions::default()).unwrap();
    assert!(report.fixed.is_empty());
    assert!(report.removed.is_empty());
}

/// Restore writes back deleted managed files and keeps everything else.
#[test]
fn restore_brings_back_deleted_files() {
    let ctx = build();
    let engine = ctx.engine(LinkMode::Copy);
    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    engine.link(&ctx.project, LinkOptions::default()).unwrap();
    fs::remove_file(ctx.project_path(".claude/agents/reviewer.md")).unwrap();
    ctx.write(".claude/commands/test.md", "edited\n");

    let report = engine.restore(&ctx.project, false).unwrap();
    assert_eq!(report.restored, vec![ctx.project_path(".claude/agents/reviewer.md")]);
    assert!(report.errors.is_empty());
    assert_eq!(ctx.read(".claude/agents/reviewer.md"), "reviewer\n");
    assert_eq!(ctx.read(".claude/commands/test.md"), "edited\n");
}

/// Unlink leaves a project that no longer depends on the cache.
#[cfg(unix)]
#[test]
fn unlink_with_purge_detaches_project() {
    let ctx = build();
    let engine = ctx.engine(LinkMode::Symlink);
    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    engine.link(&ctx.project, LinkOptions::default()).unwrap();

    let report = engine
        .remove(
            &ctx.project,
            RemoveOptions {
                dry_run: false,
                purge_cache: true,
            },
        )
        .unwrap();
    assert_eq!(report.frozen.len(), 4);
    assert!(report.purged);
    assert!(!engine.layout(&ctx.project).dir().exists());
    assert_eq!(ctx.read(".claude/commands/deploy.md"), "deploy shop\n");

    let status = engine.status(&ctx.project).unwrap();
    assert!(!status.compiled);
    assert_eq!((status.linked, status.broken, status.real), (0, 0, 4));
}

/// After unlinking, a fresh compile and link treat the frozen files as
/// unmodified and adopt them again.
#[cfg(unix)]
#[test]
fn relink_after_unlink_adopts_frozen_files() {
    let ctx = build();
    let engine = ctx.engine(LinkMode::Symlink);
    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    engine.link(&ctx.project, LinkOptions::default()).unwrap();
    engine
        .remove(
            &ctx.project,
            RemoveOptions {
                dry_run: false,
                purge_cache: true,
            },
        )
        .unwrap();

    engine.compile(&ctx.project, CompileOptions::default()).unwrap();
    let report = engine.link(&ctx.project, LinkOptions::default()).unwrap();
    assert_eq!(report.created, 4);
    assert_eq!(engine.status(&ctx.project).unwrap().linked, 4);
}
