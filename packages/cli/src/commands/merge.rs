use crate::config::{parse_principal, Config};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use pagetree_diff::{merge as merge_trees, MergeReport, Outcome};
use pagetree_dom::{AllowAll, MemoryStore, MutationEngine, NodeSnapshot, Principal, Tree};
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Snapshot JSON of the existing page
    pub existing: PathBuf,

    /// Snapshot JSON of the desired page
    pub target: PathBuf,

    /// Acting principal recorded as owner of created nodes
    #[arg(short, long)]
    pub principal: Option<String>,

    /// Write the merged snapshot here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only print the operations, do not write the result
    #[arg(long)]
    pub dry_run: bool,
}

pub fn merge(args: MergeArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let principal = parse_principal(args.principal.as_deref().unwrap_or(&config.principal));

    println!("🔀 {} Pagetree Merge", "Starting".green().bold());
    println!("   Existing: {}", args.existing.display());
    println!("   Target:   {}", args.target.display());
    println!();

    let existing = NodeSnapshot::from_json(&fs::read_to_string(&args.existing)?)?;
    let target = NodeSnapshot::from_json(&fs::read_to_string(&args.target)?)?;

    let (merged, report) = merge_snapshots(&existing, &target, &config, principal)?;
    print_report(&report);

    if args.dry_run {
        return Ok(());
    }

    let json = merged.to_json_pretty()?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            println!();
            println!("✨ {} Merged page written to {}", "Done".green().bold(), path.display());
        }
        None => {
            println!();
            println!("{}", json);
        }
    }

    Ok(())
}

/// Merge `target` into `existing` and return the resulting page
pub fn merge_snapshots(
    existing: &NodeSnapshot,
    target: &NodeSnapshot,
    config: &Config,
    principal: Principal,
) -> Result<(NodeSnapshot, MergeReport)> {
    let mut existing_tree = Tree::new();
    let existing_root = existing_tree.import_snapshot(existing)?;
    let mut target_tree = Tree::new();
    let target_root = target_tree.import_snapshot(target)?;

    let mut store = MemoryStore::new();
    let report = {
        let mut engine = MutationEngine::new(&mut existing_tree, &mut store, &AllowAll, principal)
            .with_config(config.mutation_config());
        merge_trees(
            &mut engine,
            existing_root,
            &target_tree,
            target_root,
            &config.diff_config(),
        )?
    };

    Ok((existing_tree.export_snapshot(existing_root)?, report))
}

fn print_report(report: &MergeReport) {
    for entry in &report.entries {
        match entry.outcome {
            Outcome::Applied => println!("   {} {}", "✓".green(), entry.operation),
            Outcome::Skipped { reason } => {
                println!("   {} {} ({})", "-".yellow(), entry.operation, reason)
            }
        }
    }
    println!();
    println!(
        "   {} applied, {} skipped",
        report.applied_count().to_string().green(),
        report.skipped_count().to_string().yellow()
    );
}
