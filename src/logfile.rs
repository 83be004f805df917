// A `log::Log` implementation that appends every record to `rvlog.txt`,
// flushing after each write. Installed once by `Session::setup`; UART
// traffic and debug-CSR output reach it through ordinary `log::info!`/
// `log::trace!` calls in `mmio.rs`, alongside whatever `RUST_LOG` filtering
// the embedding binary configures via `env_logger` for its own console
// output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use log::{Log, Metadata, Record};

pub struct FileLogger {
    file: Mutex<File>,
}

impl FileLogger {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileLogger { file: Mutex::new(file) })
    }
}

impl Log for FileLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(file, "[{}] {}", record.level(), record.args());
        let _ = file.flush();
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}
