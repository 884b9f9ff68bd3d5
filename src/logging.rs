use crate::config::LogFlags;
use anyhow::Context;
use env_logger::{Builder, Env, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

/// Copies log output to stdout and a file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Installs the logger. Messages at `info` and above are printed, or at `debug` and
/// above with `--debug`; `RUST_LOG` overrides both. With `--log`, messages are also
/// appended to the given file.
pub fn setup(flags: &LogFlags) -> anyhow::Result<()> {
    let level = if flags.debug { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    if let Some(path) = &flags.log {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }
    builder.try_init()?;
    Ok(())
}
