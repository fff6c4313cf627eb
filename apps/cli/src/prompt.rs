//! Stdin prompts: paper picker and the interactive domain selector.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bcorag_core::{
    DomainRegistry, DomainSelector, EXIT_TOKEN, QueryResult, Selection, resolve_selection,
};
use bcorag_shared::BcoRagError;
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};

/// Print `prompt` and read one trimmed line. `None` at end of input.
fn read_line(input: &mut dyn BufRead, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Papers (`.pdf`, `.txt`, `.md`) in `dir`, sorted by name.
pub(crate) fn list_papers(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| eyre!("cannot read papers directory '{}': {e}", dir.display()))?;

    let mut papers: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    matches!(ext.as_str(), "pdf" | "txt" | "md")
                })
                .unwrap_or(false)
        })
        .collect();
    papers.sort();
    Ok(papers)
}

/// Ask the user to pick a paper from `dir`. `None` means exit.
pub(crate) fn pick_paper(dir: &Path) -> Result<Option<PathBuf>> {
    let papers = list_papers(dir)?;
    if papers.is_empty() {
        return Err(eyre!("no papers found in '{}'", dir.display()));
    }

    println!("\nPapers in {}:", dir.display());
    for (i, paper) in papers.iter().enumerate() {
        let name = paper
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("  {:>2}) {name}", i + 1);
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        let prompt = format!("Paper number (or '{EXIT_TOKEN}'): ");
        let Some(answer) = read_line(&mut input, &prompt)? else {
            return Ok(None);
        };
        if answer.eq_ignore_ascii_case(EXIT_TOKEN) {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=papers.len()).contains(&n) => return Ok(Some(papers[n - 1].clone())),
            _ => println!("Unrecognized selection '{answer}', try again."),
        }
    }
}

/// Build the spinner used while indexing and querying.
pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Interactive domain selector reading from stdin.
pub(crate) struct StdinSelector {
    spinner: Option<ProgressBar>,
}

impl StdinSelector {
    pub(crate) fn new() -> Self {
        Self { spinner: None }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl DomainSelector for StdinSelector {
    fn select(&mut self, registry: &DomainRegistry) -> Option<Selection> {
        println!("\nDomains:");
        for d in registry.all() {
            println!("  [{:>3}] {}", d.selection_code, d.user_label);
        }

        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        match read_line(
            &mut input,
            &format!("Domain name or code (or '{EXIT_TOKEN}'): "),
        ) {
            Ok(Some(line)) => Some(resolve_selection(registry, &line)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read selection");
                None
            }
        }
    }

    fn on_unrecognized(&mut self, token: &str) {
        println!("Unrecognized selection '{token}', try again.");
    }

    fn on_dispatch(&mut self, domain: &str) {
        self.spinner = Some(spinner(format!("Generating the {domain} domain...")));
    }

    fn on_generated(&mut self, result: &QueryResult) {
        self.stop_spinner();
        println!("\n{}\n", result.raw_text);
        println!("Successfully generated the {} domain.", result.domain);
        println!("  Text: {}", result.raw_path.display());
        match &result.structured_path {
            Some(path) => println!("  JSON: {}", path.display()),
            None => println!("  JSON: not written (response was not valid JSON)"),
        }
    }

    fn on_failed(&mut self, domain: &str, error: &BcoRagError) {
        self.stop_spinner();
        eprintln!("Failed to generate the {domain} domain: {error}");
    }
}
