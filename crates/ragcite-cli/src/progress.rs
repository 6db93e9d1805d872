//! Progress reporting on stderr

use std::io::{self, Write};

/// Simple progress reporter for CLI commands
pub struct ProgressReporter {
    total: usize,
    processed: usize,
    enabled: bool,
}

impl ProgressReporter {
    pub fn new(total: usize, enabled: bool) -> Self {
        Self {
            total,
            processed: 0,
            enabled,
        }
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            eprint!("\r[{}/{}] {:<50}", self.processed + 1, self.total, msg);
            io::stderr().flush().ok();
        }
    }

    pub fn increment(&mut self) {
        self.processed += 1;
    }

    pub fn finish(&self) {
        if self.enabled {
            eprintln!("\rDone ({}/{}){:<50}", self.processed, self.total, "");
        }
    }
}
