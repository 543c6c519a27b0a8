use std::io::{self, Write};

use async_trait::async_trait;
use env_logger::{Builder, Env};
use pingora::{
    server::{ListenFds, ShutdownWatch},
    services::Service,
};
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::config;

/// `env_logger` target that hands each formatted record to the file writer task.
pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender.send(buf.to_vec()).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Background service appending log records to the configured file.
pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    /// Installs the global logger. `RUST_LOG` overrides the `info` default.
    pub fn init_env_logger(&self) {
        let writer = self.create_async_writer();
        Builder::from_env(Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(writer)))
            .init();
    }

    async fn open(&self) -> io::Result<BufWriter<tokio::fs::File>> {
        let log_file_path = &self.config.path;

        if let Some(parent) = std::path::Path::new(log_file_path).parent() {
            if !parent.as_os_str().is_empty() && metadata(parent).await.is_err() {
                create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_file_path)
            .await?;
        Ok(BufWriter::new(file))
    }
}

#[async_trait]
impl Service for Logger {
    async fn start_service(&mut self, _fds: Option<ListenFds>, mut shutdown: ShutdownWatch) {
        let mut file = match self.open().await {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", self.config.path);
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("Shutdown signal received, stopping write log");
                        break;
                    }
                },

                data = self.receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                eprintln!("Failed to write to log file: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // Drain what was logged before shutdown.
        while let Ok(data) = self.receiver.try_recv() {
            if let Err(e) = file.write_all(&data).await {
                eprintln!("Failed to write to log file: {e}");
                break;
            }
        }

        if let Err(e) = file.flush().await {
            eprintln!("Failed to flush log file: {e}");
        }
    }

    fn name(&self) -> &'static str {
        "log sync"
    }

    fn threads(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(path: &std::path::Path) -> Logger {
        Logger::new(config::Log {
            path: path.to_string_lossy().into_owned(),
        })
    }

    #[test]
    fn test_async_writer_forwards_records() {
        let mut logger = logger(std::path::Path::new("unused.log"));
        let mut writer = logger.create_async_writer();

        assert_eq!(6, writer.write(b"hello\n").unwrap());
        writer.flush().unwrap();
        assert_eq!(b"hello\n".to_vec(), logger.receiver.try_recv().unwrap());
    }

    #[test]
    fn test_async_writer_closed_channel() {
        let logger = logger(std::path::Path::new("unused.log"));
        let mut writer = logger.create_async_writer();
        drop(logger);

        let err = writer.write(b"lost").unwrap_err();
        assert_eq!(io::ErrorKind::Other, err.kind());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oker-web.log");

        let logger = logger(&path);
        let mut file = logger.open().await.unwrap();
        file.write_all(b"line\n").await.unwrap();
        file.flush().await.unwrap();

        assert_eq!("line\n", std::fs::read_to_string(&path).unwrap());
    }
}
