use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use segfs::cli::Cli;
use segfs::{DebugNode, LevelSummary, ListEntry, SegFs};

fn main() -> ExitCode {
    env_logger::builder().format_timestamp_nanos().init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures.
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Segment files live in the current working directory.
    let fs = match SegFs::open(".") {
        Ok(fs) => fs,
        Err(err) => {
            eprintln!("segfs: failed to initialize filesystem: {err}");
            return ExitCode::from(1);
        }
    };

    // Operational failures (path not found, file already exists, ...) are
    // diagnostics, not process failures.
    if let Err(err) = run(&fs, &cli) {
        eprintln!("segfs: {err:#}");
    }
    ExitCode::SUCCESS
}

fn run(fs: &SegFs, cli: &Cli) -> anyhow::Result<()> {
    if cli.list {
        print_listing(&fs.list()?);
    } else if let Some(fs_path) = cli.add.as_deref() {
        let local = cli
            .local_file
            .as_ref()
            .context("-a requires a local file via -f")?;
        let mut src = File::open(local)
            .with_context(|| format!("failed to open local file {}", local.display()))?;
        fs.add_file(fs_path, &mut src)?;
    } else if let Some(fs_path) = cli.remove.as_deref() {
        fs.remove_path(fs_path)?;
    } else if let Some(fs_path) = cli.extract.as_deref() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        fs.extract_file(fs_path, &mut out)?;
        out.flush()?;
    } else if let Some(fs_path) = cli.debug.as_deref() {
        println!("debugging path: {fs_path}");
        print_debug(&fs.debug_path(fs_path)?);
    }
    Ok(())
}

fn print_listing(entries: &[ListEntry]) {
    println!("/");
    for entry in entries {
        let indent = "  ".repeat(entry.depth);
        if entry.is_dir {
            println!("{indent}{}/", entry.name);
        } else {
            println!("{indent}{}", entry.name);
        }
    }
}

fn print_debug(nodes: &[DebugNode]) {
    for node in nodes {
        match node {
            DebugNode::Directory { name, entries } => {
                println!("directory '{name}':");
                for (entry_name, inode_num) in entries {
                    println!("  '{entry_name}' {inode_num}");
                }
            }
            DebugNode::File {
                name,
                size,
                direct,
                indirect,
                double_indirect,
                triple_indirect,
            } => {
                println!();
                println!("file '{name}':");
                println!("  size: {size} bytes");
                println!("  blocks summary:");
                print_level("direct blocks", Some(direct));
                print_level("indirect blocks", indirect.as_ref());
                if double_indirect.is_some() {
                    print_level("double indirect blocks", double_indirect.as_ref());
                }
                if triple_indirect.is_some() {
                    print_level("triple indirect blocks", triple_indirect.as_ref());
                }
            }
            DebugNode::Missing { name } => {
                println!("component not found: {name}");
            }
        }
    }
}

fn print_level(label: &str, summary: Option<&LevelSummary>) {
    match summary {
        Some(summary) if summary.count > 0 => {
            let first = summary.first.unwrap_or(0);
            let last = summary.last.unwrap_or(0);
            match summary.via {
                Some(via) => println!(
                    "    {label}: {} (from {first} to {last}) via block {via}",
                    summary.count
                ),
                None => println!("    {label}: {} (from {first} to {last})", summary.count),
            }
        }
        _ => println!("    {label}: 0"),
    }
}
