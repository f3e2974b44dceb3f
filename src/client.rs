//! Client
//!
//! Blocking client for the line protocol, used by the CLI and by tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{ArborError, Result};
use crate::protocol::{
    decode_command, decode_reply, encode_command, parse_request, read_line, write_line, Command,
    Entry,
};

/// A connection to one node
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to a node
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| ArborError::Connection(format!("connecting: {}", e)))?;
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound how long a read may block (None = forever)
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> Result<String> {
        let reply = self.request(&Command::Get {
            key: key.to_string(),
        })?;
        let entry: Entry = decode_reply(&reply)?;
        Ok(entry.value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<Entry> {
        let reply = self.request(&Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        decode_reply(&reply)
    }

    pub fn get_all(&mut self) -> Result<Vec<Entry>> {
        let reply = self.request(&Command::GetAll)?;
        decode_reply(&reply)
    }

    /// Join the node as a child and return the bootstrap snapshot
    ///
    /// Afterwards the node forwards its writes on this connection; read them
    /// with [`Client::read_line`].
    pub fn join(&mut self) -> Result<Vec<Entry>> {
        let reply = self.request(&Command::Join)?;
        match parse_request(&reply).and_then(|r| decode_command(&r)) {
            Ok(Command::Recover { entries }) => Ok(entries),
            Ok(other) => Err(ArborError::ProtocolFormat(format!(
                "expected RECOVER, got {}",
                other.method()
            ))),
            // Not a command line; probably an error reply
            Err(_) => decode_reply(&reply),
        }
    }

    /// Push a snapshot to the node (no reply is sent)
    pub fn recover(&mut self, entries: Vec<Entry>) -> Result<()> {
        let line = encode_command(&Command::Recover { entries })?;
        self.send_line(&line)
    }

    /// Send a raw line and return the raw reply line
    pub fn send_raw(&mut self, line: &str) -> Result<String> {
        self.send_line(line)?;
        self.read_line()?
            .ok_or_else(|| ArborError::Connection("server closed the connection".to_string()))
    }

    /// Send a raw line without waiting for a reply
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.writer, line)
    }

    /// Read the next line; `None` once the server closed the connection
    pub fn read_line(&mut self) -> Result<Option<String>> {
        read_line(&mut self.reader)
    }

    fn request(&mut self, command: &Command) -> Result<String> {
        let line = encode_command(command)?;
        self.send_raw(&line)
    }
}
