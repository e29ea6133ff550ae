//! Terminal rendering of a mirror session
//!
//! Completed files scroll above a progress bar that stays at the bottom,
//! with the status line as its message.

use crate::events::{Dashboard, MirrorEvent};
use crossterm::{
    cursor,
    style::{Color, Stylize},
    ExecutableCommand,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io;
use std::time::{Duration, Instant};

pub struct ConsoleProgress {
    bar: ProgressBar,
    dashboard: Dashboard,
    start_time: Instant,
    show_files: bool,
}

impl ConsoleProgress {
    pub fn new(show_files: bool) -> Self {
        let _ = io::stdout().execute(cursor::Hide);
        Self::with_bar(ProgressBar::new(100), show_files)
    }

    /// A display that draws nothing, for non-interactive runs
    pub fn hidden() -> Self {
        Self::with_bar(
            ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden()),
            false,
        )
    }

    fn with_bar(bar: ProgressBar, show_files: bool) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold} [{bar:30.green/white}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            dashboard: Dashboard::new(),
            start_time: Instant::now(),
            show_files,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn apply(&mut self, event: &MirrorEvent) {
        self.dashboard.apply(event);
        match event {
            MirrorEvent::Title(title) => self.bar.set_prefix(title.clone()),
            MirrorEvent::Status(_) | MirrorEvent::Progress(_) => self.refresh(),
            MirrorEvent::FileFinished(index) => {
                if let Some(row) = self.dashboard.roster.get(*index) {
                    self.print_file_op("Fetched", &row.relative_path);
                }
                self.refresh();
            }
            MirrorEvent::FilesAppended(_) | MirrorEvent::RosterReset(_) => self.refresh(),
            MirrorEvent::Finished => self.finish_success(),
            MirrorEvent::Failed(message) => self.finish_error(message),
        }
    }

    fn refresh(&self) {
        let d = &self.dashboard;
        self.bar.set_position(d.progress.percent.round() as u64);
        self.bar.set_message(format!(
            "{} / {} ({}/{} files) {}",
            d.progress.current_size,
            d.progress.maximum_size,
            d.finished_files(),
            d.roster.len(),
            d.status.as_str().with(Color::Cyan)
        ));
    }

    /// Print a file operation above the progress line
    fn print_file_op(&self, operation: &str, path: &str) {
        if self.show_files {
            self.bar.suspend(|| {
                println!(
                    "  {} {}",
                    operation.with(Color::Green).bold(),
                    path.with(Color::Cyan)
                );
            });
        }
    }

    /// Close the bar when the session ends without a finished notification
    pub fn finish_idle(&self) {
        if !self.bar.is_finished() {
            if let Some(message) = &self.dashboard.failure {
                self.finish_error(message);
            } else {
                self.finish_success();
            }
        }
    }

    fn finish_success(&self) {
        let elapsed = self.start_time.elapsed();
        self.bar.finish_with_message(format!(
            "{} {} files ({}) in {:.1}s",
            "Finished".with(Color::Green).bold(),
            self.dashboard.finished_files(),
            self.dashboard.progress.maximum_size,
            elapsed.as_secs_f64()
        ));
        cleanup();
    }

    fn finish_error(&self, msg: &str) {
        self.bar
            .abandon_with_message(format!("{} {}", "Failed".with(Color::Red).bold(), msg));
        cleanup();
    }
}

fn cleanup() {
    let _ = io::stdout().execute(cursor::Show);
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        cleanup();
    }
}
