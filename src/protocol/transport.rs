//! Channel transports.
//! Both channels work over any byte stream, TCP streams are used in server mode.

use crate::protocol::Event;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;

/// Frame an event payload: `<length>\n<payload>\n`, length includes trailing newline.
pub fn frame(payload: &str) -> Vec<u8> {
    let mut buf = format!("{}\n", payload.len() + 1).into_bytes();
    buf.extend_from_slice(payload.as_bytes());
    buf.push(b'\n');
    buf
}

/// Server side of the event channel.
pub struct EventChannel {
    writer: Box<dyn Write + Send>,
}

impl EventChannel {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    /// Write a single framed event.
    pub fn send(&mut self, event: &Event) -> io::Result<()> {
        let payload = event.to_string();
        log::trace!(target: "protocol", "-> {payload:?}");
        self.writer.write_all(&frame(&payload))?;
        self.writer.flush()
    }
}

/// Client side of the event channel, decodes framed payloads.
pub struct EventReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read next event payload. Return [`None`] if the stream is closed.
    pub fn read_event(&mut self) -> io::Result<Option<String>> {
        let mut header = String::new();
        if self.reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        let len: usize = header
            .trim_end_matches(['\r', '\n'])
            .parse()
            .map_err(|e| invalid_data(format!("malformed event length {header:?}: {e}")))?;
        if len == 0 {
            return Err(invalid_data("zero length event frame".to_string()));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        if buf.pop() != Some(b'\n') {
            return Err(invalid_data("event frame is not newline terminated".to_string()));
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| invalid_data(e.to_string()))
    }
}

impl EventReader<BufReader<TcpStream>> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self::new(BufReader::new(stream))
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Server side of the command channel.
pub struct CommandChannel {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    stream: Option<TcpStream>,
}

impl CommandChannel {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
            stream: None,
        }
    }

    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        Ok(Self {
            stream: Some(stream),
            ..Self::new(reader, writer)
        })
    }

    /// Return a handle that can shut the channel down from another thread,
    /// a blocked [`CommandChannel::read_command`] returns [`None`] after shutdown.
    pub fn shutdown_handle(&self) -> Option<TcpStream> {
        self.stream.as_ref().and_then(|s| s.try_clone().ok())
    }

    /// Read next command line without line terminator. Return [`None`] at end of stream.
    pub fn read_command(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        log::trace!(target: "protocol", "<- {line:?}");
        Ok(Some(line))
    }

    pub fn reply(&mut self, reply: &str) -> io::Result<()> {
        log::trace!(target: "protocol", "-> {reply:?}");
        writeln!(self.writer, "{reply}")?;
        self.writer.flush()
    }
}
