use colored::*;
use regex::Regex;
use std::sync::LazyLock;

static UNDEFINED_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"undefined reference to [`']([A-Za-z_][A-Za-z0-9_:]*)").unwrap());

pub struct FeedbackAnalyzer;

impl FeedbackAnalyzer {
    /// Turns raw compiler or linker output into a hint about what to change in
    /// `cxgraph.toml`, when the failure is one we recognize.
    pub fn analyze(output: &str) -> Option<String> {
        // 1. Missing entry point
        if output.contains("undefined reference to `main'")
            || output.contains("entry point must be defined")
        {
            return Some(format!(
                "Your project is missing a {} function.\nCheck {} in {} or add a sketch (.ino).",
                "main()".bold().yellow(),
                "roots".bold().green(),
                "cxgraph.toml".bold().yellow()
            ));
        }

        // 2. A definition that was never pulled into the build set
        if let Some(caps) = UNDEFINED_REFERENCE_RE.captures(output) {
            let symbol = &caps[1];
            return Some(format!(
                "The linker could not find {}.\nIf it is defined in a file nothing includes or declares, add a {} rule:\n\n  {}\n  target = \"src/main.cpp\"\n  path = \"path/to/definition.cpp\"",
                symbol.bold().yellow(),
                "[[forced_sources]]".bold().green(),
                "[[forced_sources]]".dimmed()
            ));
        }

        // 3. Missing header
        if output.contains("fatal error: ") && output.contains("No such file or directory") {
            return Some(format!(
                "It looks like a {} error.\nAdd the header's directory to {} in cxgraph.toml.",
                "Missing Header".bold().red(),
                "extra_include_dirs".bold().yellow()
            ));
        }

        None
    }
}
