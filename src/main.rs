use std::fs;
use std::io::Read;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use logmend::classify::{self, LogAnalysis, Severity};
use logmend::cli::Args;
use logmend::config::Config;
use logmend::knowledge::{KnowledgeBase, KnowledgeItem};
use logmend::store::SolutionRecord;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let db_path = args.db.clone().unwrap_or_else(|| config.db_path.clone());
    let limit = args.limit.unwrap_or(config.limit);

    let mut kb = KnowledgeBase::open(&db_path)?;

    if let Some(path) = &args.import {
        let raw = fs::read_to_string(path)?;
        let payload: serde_json::Value = serde_json::from_str(&raw)?;
        let imported = kb.import_data(&payload)?;
        println!(
            "{} {} solution(s) from {}",
            "imported".bright_green(),
            imported,
            path.display()
        );
    }

    if let Some(path) = &args.add_knowledge {
        let raw = fs::read_to_string(path)?;
        let items: Vec<KnowledgeItem> = serde_json::from_str(&raw)?;
        let added = kb.add_knowledge(&items)?;
        println!(
            "{} {} of {} knowledge item(s)",
            "harvested".bright_green(),
            added,
            items.len()
        );
    }

    if let Some(path) = &args.export {
        let payload = kb.export_data();
        fs::write(path, serde_json::to_string_pretty(&payload)?)?;
        println!(
            "{} {} solution(s) to {}",
            "exported".bright_green(),
            payload.metadata.total_solutions,
            path.display()
        );
    }

    if args.stats {
        print_stats(&kb);
    }

    let Some(log) = &args.log else {
        let managed = args.import.is_some()
            || args.export.is_some()
            || args.add_knowledge.is_some()
            || args.stats;
        if !managed {
            eprintln!("nothing to do: pass a log file (\"-\" for stdin) or a store management flag");
            std::process::exit(2);
        }
        return Ok(());
    };

    let content = read_log(log)?;
    let analysis = classify::analyze(&content);
    let solutions = kb.get_solutions(&analysis.error_type, &analysis.context, limit);

    if args.json {
        let out = serde_json::json!({
            "analysis": analysis,
            "solutions": solutions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_analysis(&analysis);
        print_solutions(&solutions);
    }

    if !args.no_learn {
        kb.learn(
            Some(&content),
            &analysis,
            args.feedback.as_deref(),
            args.solution_applied.as_deref(),
            args.solution_worked,
        )?;
    }

    Ok(())
}

fn read_log(source: &str) -> Result<String, std::io::Error> {
    if source == "-" {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        Ok(content)
    } else {
        fs::read_to_string(source)
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "critical".bright_red().bold(),
        Severity::High => "high".bright_red(),
        Severity::Medium => "medium".bright_yellow(),
        Severity::Low => "low".bright_green(),
    }
}

fn print_analysis(analysis: &LogAnalysis) {
    println!("{}", "── analysis ──────────────────────────────".bright_cyan());
    println!(
        "{} {}   {} {}   {} {}",
        "error:".bold(),
        analysis.error_type.bright_magenta(),
        "tech:".bold(),
        analysis.technology.bright_blue(),
        "severity:".bold(),
        severity_label(analysis.severity)
    );
    if !analysis.error_message.is_empty() {
        println!("{} {}", "message:".bold(), analysis.error_message);
    }
    if !analysis.root_causes.is_empty() {
        println!("{}", "likely causes:".bold());
        for cause in &analysis.root_causes {
            println!("  - {}", cause);
        }
    }
    if !analysis.code_snippets.file_references.is_empty() {
        println!("{}", "referenced files:".bold());
        for file_ref in &analysis.code_snippets.file_references {
            println!("  {}:{}", file_ref.path, file_ref.line);
        }
    }
}

fn print_solutions(solutions: &[SolutionRecord]) {
    println!("{}", "── solutions ─────────────────────────────".bright_cyan());
    if solutions.is_empty() {
        println!("{}", "no stored solutions match yet; feedback will teach me".dimmed());
        return;
    }
    for (rank, solution) in solutions.iter().enumerate() {
        let rate = format!("{:.0}%", solution.success_rate * 100.0);
        println!(
            "{} {} {}",
            format!("{}.", rank + 1).bold(),
            rate.bright_green(),
            solution.solution
        );
        if !solution.source.is_empty() {
            println!("   {}", solution.source.dimmed());
        }
    }
}

fn print_stats(kb: &KnowledgeBase) {
    let store = kb.store();
    println!("{}", "── store ─────────────────────────────────".bright_cyan());
    println!("{} {}", "solutions:".bold(), store.solutions.len());

    let mut error_types: Vec<(&String, &u64)> = store.error_type_counts.iter().collect();
    error_types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !error_types.is_empty() {
        println!("{}", "error types seen:".bold());
        for (tag, count) in error_types {
            println!("  {:>6}  {}", count, tag);
        }
    }

    let mut technologies: Vec<(&String, &u64)> = store.technology_counts.iter().collect();
    technologies.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !technologies.is_empty() {
        println!("{}", "technologies seen:".bold());
        for (tag, count) in technologies {
            println!("  {:>6}  {}", count, tag);
        }
    }
}
