//! `fs` operations and their terminal output.

use std::io::Write;

use rhfs_protocol::RemoteDataService;
use rhfs_transfer::{
    SpeedCalculator, TransferClient, TransferProgress, format_rate, format_status,
};

use crate::cli::FsCommand;

/// Runs one `fs` operation, writing user-facing output to `out`.
///
/// Returns `false` when the operation finished but not every part of it
/// succeeded (a failed path in `-rm`).
pub fn run_fs<S: RemoteDataService>(
    client: &TransferClient<S>,
    command: &FsCommand,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    match command {
        FsCommand::Ls { path } => {
            let entries = client.ls(path)?;
            writeln!(out, "Found {} items", entries.len())?;
            for entry in &entries {
                writeln!(out, "{}", format_status(entry))?;
            }
            Ok(true)
        }
        FsCommand::Put { local, remote } => {
            let mut printer = ProgressPrinter::new();
            let mut render_err = None;
            let target = client.put(local, remote.as_deref(), |p| {
                if let Err(e) = printer.update(out, p) {
                    render_err.get_or_insert(e);
                }
            })?;
            if let Some(e) = render_err {
                return Err(e.into());
            }
            tracing::info!(remote = %target, "upload complete");
            Ok(true)
        }
        FsCommand::Get { remote, local } => {
            let mut printer = ProgressPrinter::new();
            let mut render_err = None;
            let target = client.get(remote, local.as_deref(), |p| {
                if let Err(e) = printer.update(out, p) {
                    render_err.get_or_insert(e);
                }
            })?;
            if let Some(e) = render_err {
                return Err(e.into());
            }
            tracing::info!(local = %target.display(), "download complete");
            Ok(true)
        }
        FsCommand::Rm { paths, recursive } => {
            let mut all_deleted = true;
            for outcome in client.rm(paths, *recursive) {
                if outcome.deleted() {
                    writeln!(out, "Deleted: {}", outcome.path)?;
                } else {
                    all_deleted = false;
                    writeln!(out, "Failed Deleting: {}", outcome.path)?;
                }
            }
            Ok(all_deleted)
        }
    }
}

/// Renders `\r<transferred>/<total> <pct>% <rate>` and ends the line once
/// the transfer is complete.
struct ProgressPrinter {
    speed: SpeedCalculator,
    last: u64,
    done: bool,
}

impl ProgressPrinter {
    fn new() -> Self {
        let speed = SpeedCalculator::default();
        speed.add_sample(0);
        Self {
            speed,
            last: 0,
            done: false,
        }
    }

    fn update(&mut self, out: &mut impl Write, progress: TransferProgress) -> std::io::Result<()> {
        if self.done {
            return Ok(());
        }
        self.speed
            .add_sample(progress.transferred.saturating_sub(self.last));
        self.last = progress.transferred;

        write!(
            out,
            "\r{}/{} {:.0}% {}",
            progress.transferred,
            progress.total,
            progress.percent(),
            format_rate(self.speed.bytes_per_second())
        )?;
        if progress.is_complete() {
            self.done = true;
            writeln!(out)?;
        }
        out.flush()
    }
}
