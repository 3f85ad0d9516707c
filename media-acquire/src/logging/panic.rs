//! Panic reporting.
//!
//! Release builds abort on panic, which can drop buffered output from the
//! non-blocking file writer. The hook therefore writes the record straight
//! into today's log file as well as through `tracing`.

use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::LOG_FILE_NAME;

/// Install the hook, chaining to the previously installed one.
pub fn install_panic_hook(log_dir: &Path) {
    let log_dir = log_dir.to_path_buf();
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = panic_record(info);
            tracing::error!(target: "media_acquire::panic", "{record}");
            if cfg!(panic = "abort") {
                let _ = append_to_todays_log(&log_dir, &record);
            }
        }));
        previous(info);
    }));
}

fn append_to_todays_log(log_dir: &Path, record: &str) -> std::io::Result<()> {
    let path: PathBuf = log_dir.join(format!(
        "{}.{}",
        LOG_FILE_NAME,
        Local::now().format("%Y-%m-%d")
    ));
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{record}")?;
    file.flush()
}

fn panic_record(info: &PanicHookInfo<'_>) -> String {
    let location = info
        .location()
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "<unknown>".to_string());
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");

    format!(
        "{} PANIC thread={} location={} payload={}\nBacktrace:\n{}",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
        thread_name,
        location,
        payload_text(info.payload()),
        Backtrace::force_capture()
    )
}

fn payload_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string payload>".to_string()
    }
}
