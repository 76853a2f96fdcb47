//! Serial transport behind a narrow async seam.

use std::io;

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::config::LinkConfig;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Serial(#[from] io::Error),
    #[error("open timed out")]
    OpenTimeout,
    #[error("write timed out")]
    WriteTimeout,
}

/// Byte-level view of one open board connection.
#[async_trait]
pub trait RawLink: Send {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    async fn flush(&mut self) -> io::Result<()>;
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Opens links by port name.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    async fn connect(&self, port: &str) -> Result<Box<dyn RawLink>, LinkError>;
}

/// A real USB-to-serial bridge connection.
pub struct SerialLink {
    port: SerialPort,
}

#[async_trait]
impl RawLink for SerialLink {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.port, buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.port).await
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.discard_input_buffer()
    }
}

pub struct SerialLinkFactory {
    config: LinkConfig,
}

impl SerialLinkFactory {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LinkFactory for SerialLinkFactory {
    async fn connect(&self, port: &str) -> Result<Box<dyn RawLink>, LinkError> {
        tracing::info!("Opening {} at {} baud", port, self.config.baud);
        let port = SerialPort::open(port, self.config.baud)?;
        Ok(Box::new(SerialLink { port }))
    }
}

/// Sends one newline-terminated command line, bounded by the I/O timeout.
pub async fn write_command(
    link: &mut dyn RawLink,
    config: &LinkConfig,
    command: &str,
) -> Result<(), LinkError> {
    let framed = format!("{command}\n");
    match timeout(config.io_timeout(), async {
        link.write_all(framed.as_bytes()).await?;
        link.flush().await
    })
    .await
    {
        Ok(result) => Ok(result?),
        Err(_) => Err(LinkError::WriteTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLink {
        written: Vec<u8>,
        flushed: bool,
    }

    #[async_trait]
    impl RawLink for RecordingLink {
        async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            self.flushed = true;
            Ok(())
        }

        fn discard_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct StalledLink;

    #[async_trait]
    impl RawLink for StalledLink {
        async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }

        async fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn discard_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenLink;

    #[async_trait]
    impl RawLink for BrokenLink {
        async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        async fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "bridge detached"))
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn discard_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_command_appends_newline_and_flushes() {
        let mut link = RecordingLink::default();
        write_command(&mut link, &LinkConfig::default(), "HASH 5000")
            .await
            .unwrap();
        assert_eq!(link.written, b"HASH 5000\n");
        assert!(link.flushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_command_times_out_on_stalled_link() {
        let mut link = StalledLink;
        let err = write_command(&mut link, &LinkConfig::default(), "PING")
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::WriteTimeout));
    }

    #[tokio::test]
    async fn test_write_command_propagates_io_errors() {
        let mut link = BrokenLink;
        let err = write_command(&mut link, &LinkConfig::default(), "PING")
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Serial(_)));
    }
}
