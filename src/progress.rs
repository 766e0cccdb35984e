//! Member-by-member progress reporting.
//!
//! A bar is drawn on stderr, only when it is a terminal and not quiet.
//! Without a bar, extraction in verbose mode lists member names on stderr.
//! Compression never lists names. Stdout stays free for command results.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

pub struct Progress {
    bar: Option<ProgressBar>,
    list_members: bool,
}

impl Progress {
    /// Percentage bar over a known number of members.
    pub fn counted(len: u64, quiet: bool, verbose: bool) -> Self {
        let bar = Self::visible(quiet).then(|| {
            let style = ProgressStyle::with_template("Done: {percent:>3}% {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(len).with_style(style)
        });
        Self {
            bar,
            list_members: verbose,
        }
    }

    /// Spinner for extractions of unknown length.
    pub fn uncounted(quiet: bool, verbose: bool) -> Self {
        Self {
            bar: Self::spinner(quiet, "{spinner} {wide_msg}"),
            list_members: verbose,
        }
    }

    /// Spinner while packing a tree.
    pub fn adding(quiet: bool) -> Self {
        Self {
            bar: Self::spinner(quiet, "{spinner} adding {wide_msg}"),
            list_members: false,
        }
    }

    fn spinner(quiet: bool, template: &str) -> Option<ProgressBar> {
        Self::visible(quiet).then(|| {
            let style = ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            ProgressBar::new_spinner().with_style(style)
        })
    }

    fn visible(quiet: bool) -> bool {
        !quiet && std::io::stderr().is_terminal()
    }

    /// Whether a member name is printed when no bar is drawn.
    fn lists_members(&self) -> bool {
        self.bar.is_none() && self.list_members
    }

    pub fn member(&self, name: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(name.to_string());
            bar.inc(1);
        } else if self.lists_members() {
            eprintln!("{name}");
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_never_draws() {
        assert!(Progress::counted(3, true, false).bar.is_none());
        assert!(Progress::uncounted(true, true).bar.is_none());
        assert!(Progress::adding(true).bar.is_none());
    }

    #[test]
    fn compression_never_lists_names() {
        assert!(!Progress::adding(true).lists_members());
        assert!(!Progress::adding(false).lists_members());
    }

    #[test]
    fn verbose_extraction_lists_names_without_bar() {
        assert!(Progress::counted(3, true, true).lists_members());
        assert!(Progress::uncounted(true, true).lists_members());
        assert!(!Progress::uncounted(true, false).lists_members());
    }
}
