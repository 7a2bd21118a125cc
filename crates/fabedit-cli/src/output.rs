//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use fabedit_core::display::{type_icon, DisplayInfo};
use fabedit_core::stats::{BundleStats, GlobalStats};
use fabedit_core::{Entity, Severity, ValidationReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print a single entity with its decoded CustomData
    pub fn print_entity(&self, entity: &Entity, info: &DisplayInfo, bundles: &[&str]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", entity.item_id());
                println!("Class:       {} {}", type_icon(entity.item_class()), entity.item_class());
                println!("Name:        {}", entity.display_name().unwrap_or(""));
                let tags = entity.tags();
                if !tags.is_empty() {
                    println!("Tags:        {}", tags.join(", "));
                }
                if entity.is_bundle() {
                    let members = entity.member_ids();
                    println!("Members:     {}", members.len());
                    for id in members {
                        println!("  - {}", id);
                    }
                }
                if !bundles.is_empty() {
                    println!("In bundles:  {}", bundles.join(", "));
                }

                let summary = info.summary();
                if !summary.is_empty() {
                    println!();
                    println!("── CustomData ──");
                    for (label, value) in summary {
                        println!("{:<16} {}", format!("{}:", label), value);
                    }
                }
            }
            OutputFormat::Json => {
                self.print_json(&serde_json::json!({
                    "entity": entity,
                    "display": info,
                    "bundles": bundles,
                }));
            }
            OutputFormat::Quiet => {
                println!("{}", entity.item_id());
            }
        }
    }

    /// Print a list of entities
    pub fn print_entities(&self, entities: &[&Entity]) {
        match self.format {
            OutputFormat::Human => {
                if entities.is_empty() {
                    println!("No items found.");
                    return;
                }
                for entity in entities {
                    println!(
                        "{} {:<24} | {:<12} | {}",
                        type_icon(entity.item_class()),
                        truncate(entity.item_id(), 24),
                        truncate(entity.item_class(), 12),
                        truncate(entity.display_name().unwrap_or(""), 40)
                    );
                }
                println!("\n{} item(s)", entities.len());
            }
            OutputFormat::Json => self.print_json(entities),
            OutputFormat::Quiet => {
                for entity in entities {
                    println!("{}", entity.item_id());
                }
            }
        }
    }

    /// Print bundles with their member counts
    pub fn print_bundles(&self, bundles: &[(&Entity, BundleStats)]) {
        match self.format {
            OutputFormat::Human => {
                if bundles.is_empty() {
                    println!("No bundles found.");
                    return;
                }
                for (bundle, stats) in bundles {
                    println!(
                        "{} {:<20} | {:<24} | {} item(s), power {}",
                        type_icon(bundle.item_class()),
                        truncate(bundle.item_id(), 20),
                        truncate(bundle.display_name().unwrap_or(""), 24),
                        stats.item_count,
                        stats.total_power
                    );
                }
                println!("\n{} bundle(s)", bundles.len());
            }
            OutputFormat::Json => {
                let json: Vec<_> = bundles
                    .iter()
                    .map(|(bundle, stats)| {
                        serde_json::json!({
                            "ItemId": bundle.item_id(),
                            "DisplayName": bundle.display_name(),
                            "members": bundle.member_ids(),
                            "stats": stats,
                        })
                    })
                    .collect();
                self.print_json(&json);
            }
            OutputFormat::Quiet => {
                for (bundle, _) in bundles {
                    println!("{}", bundle.item_id());
                }
            }
        }
    }

    /// Print a validation report
    pub fn print_report(&self, report: &ValidationReport) {
        match self.format {
            OutputFormat::Human => {
                if report.is_clean() {
                    println!("✓ No issues found.");
                    return;
                }
                for issue in &report.issues {
                    let marker = match issue.severity {
                        Severity::Error => "✗",
                        Severity::Warning => "⚠",
                    };
                    let fix = if issue.can_auto_fix { " (fixable)" } else { "" };
                    println!(
                        "{} [{}] {} #{}: {}{}",
                        marker, issue.rule, issue.item_id, issue.position, issue.message, fix
                    );
                }
                println!(
                    "\n{} error(s), {} warning(s) across {} item(s)",
                    report.error_count(),
                    report.warning_count(),
                    report.affected_items()
                );
            }
            OutputFormat::Json => self.print_json(report),
            OutputFormat::Quiet => {
                for issue in &report.issues {
                    println!("{}", issue.id);
                }
            }
        }
    }

    pub fn print_bundle_stats(&self, bundle_id: &str, stats: &BundleStats) {
        match self.format {
            OutputFormat::Human => {
                println!("Bundle:      {}", bundle_id);
                println!("Items:       {}", stats.item_count);
                println!("Power:       {}", stats.total_power);
                println!("Balance:     {}", stats.total_balance);
                println!("Avg level:   {:.1}", stats.avg_level);
                println!(
                    "By class:    {} player, {} staff, {} team, {} tactic, {} location",
                    stats.player_count,
                    stats.staff_count,
                    stats.team_count,
                    stats.tactic_count,
                    stats.location_count
                );
            }
            OutputFormat::Json => self.print_json(stats),
            OutputFormat::Quiet => println!("{}", stats.item_count),
        }
    }

    pub fn print_global_stats(&self, stats: &GlobalStats) {
        match self.format {
            OutputFormat::Human => {
                println!("Bundles:     {}", stats.bundle_count);
                println!("Items:       {}", stats.total_entities);
                println!("Assigned:    {}", stats.assigned_entities);
                println!("Unassigned:  {}", stats.unassigned_entities);
                println!("Avg power:   {:.1}", stats.avg_power);
                println!("Balance:     {}", stats.total_balance);
            }
            OutputFormat::Json => self.print_json(stats),
            OutputFormat::Quiet => println!("{}", stats.total_entities),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Truncate a string to max characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_output_flags() {
        let output = Output::new(OutputFormat::Json);
        assert!(!output.is_quiet());
        assert!(!output.should_prompt());
        assert!(Output::new(OutputFormat::Human).should_prompt());
        assert!(Output::new(OutputFormat::Quiet).is_quiet());
    }
}
