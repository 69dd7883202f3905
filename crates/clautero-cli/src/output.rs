use std::io::Write;
use std::path::Path;

use clautero_core::config_file;
use clautero_core::{BackfillReport, Config, ConfigError, ConfigFile, Outcome, PassReport};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn outcome_label(outcome: &Outcome, color: ColorMode) -> String {
    match outcome {
        Outcome::Summarized => {
            if color.enabled() {
                "SUMMARIZED".green().bold().to_string()
            } else {
                "SUMMARIZED".to_string()
            }
        }
        Outcome::Error(kind) => {
            let label = format!("ERROR ({})", kind);
            if color.enabled() {
                label.red().bold().to_string()
            } else {
                label
            }
        }
        Outcome::Denied(kind) => {
            let label = format!("DENIED ({})", kind);
            if color.enabled() {
                label.yellow().to_string()
            } else {
                label
            }
        }
    }
}

/// Print the outcome of a single item.
pub fn print_outcome(
    w: &mut dyn Write,
    key: &str,
    outcome: &Outcome,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "{}: {}", key, outcome_label(outcome, color))
}

/// Print one line per processed item followed by the pass totals.
pub fn print_pass_report(
    w: &mut dyn Write,
    report: &PassReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.found == 0 {
        writeln!(w, "No items to summarize.")?;
        return Ok(());
    }

    for (i, (key, outcome)) in report.outcomes.iter().enumerate() {
        write!(w, "[{}/{}] ", i + 1, report.processed())?;
        print_outcome(w, key, outcome, color)?;
    }

    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "  Found:      {}", report.found)?;
        writeln!(w, "  Summarized: {}", report.summarized.to_string().green())?;
        writeln!(w, "  Error:      {}", report.errored.to_string().red())?;
        writeln!(w, "  Denied:     {}", report.denied.to_string().yellow())?;
    } else {
        writeln!(w, "SUMMARY")?;
        writeln!(w, "  Found:      {}", report.found)?;
        writeln!(w, "  Summarized: {}", report.summarized)?;
        writeln!(w, "  Error:      {}", report.errored)?;
        writeln!(w, "  Denied:     {}", report.denied)?;
    }
    if report.found > report.processed() {
        writeln!(
            w,
            "({} more left for the next pass)",
            report.found - report.processed()
        )?;
    }
    Ok(())
}

pub fn print_backfill_report(
    w: &mut dyn Write,
    report: &BackfillReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.tagged.is_empty() {
        writeln!(w, "No untagged items.")?;
        return Ok(());
    }
    let line = format!("Tagged {} item(s) with TODO", report.tagged.len());
    if color.enabled() {
        writeln!(w, "{}", line.cyan())?;
    } else {
        writeln!(w, "{}", line)?;
    }
    for key in &report.tagged {
        writeln!(w, "  {}", key)?;
    }
    Ok(())
}

/// Print where configuration was read from, the merged values with secrets
/// redacted, and whether they resolve to a usable runtime config.
pub fn print_config(
    w: &mut dyn Write,
    explicit: Option<&Path>,
    file: &ConfigFile,
    resolved: &Result<Config, ConfigError>,
    color: ColorMode,
) -> std::io::Result<()> {
    let source = match explicit {
        Some(path) => path.display().to_string(),
        None => {
            let platform = config_file::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(no platform config dir)".to_string());
            format!("{} overlaid by ./clautero.toml", platform)
        }
    };
    if color.enabled() {
        writeln!(w, "{} {}", "Config:".bold(), source)?;
    } else {
        writeln!(w, "Config: {}", source)?;
    }
    writeln!(w)?;

    let rendered = toml::to_string_pretty(&file.redacted())
        .unwrap_or_else(|e| format!("# cannot render config: {}\n", e));
    write!(w, "{}", rendered)?;
    writeln!(w)?;

    match resolved {
        Ok(config) => {
            let line = format!(
                "OK: backend {:?}, model {}, storage {}",
                config.backend,
                config.model_name,
                config.file_path.display()
            );
            if color.enabled() {
                writeln!(w, "{}", line.green())
            } else {
                writeln!(w, "{}", line)
            }
        }
        Err(e) => {
            let line = format!("INVALID: {}", e);
            if color.enabled() {
                writeln!(w, "{}", line.red().bold())
            } else {
                writeln!(w, "{}", line)
            }
        }
    }
}
