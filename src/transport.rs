use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::instrument::Qdac2Error;

/// Raw SCPI socket port of QDAC-II
pub const SCPI_PORT: u16 = 5025;


/// Command/response channel to an instrument
///
/// Commands are plain SCPI text without line terminator. Both calls are
/// blocking and must be answered in issue order. `sleep_s` is part of the
/// transport so that simulated transports can record waits instead of
/// actually waiting.
pub trait Transport {

    /// Send a command that produces no response
    fn write(&mut self, command: &str) -> Result<(), Qdac2Error>;

    /// Send a command and wait for its response
    fn query(&mut self, command: &str) -> Result<String, Qdac2Error>;

    /// Block for `seconds`
    fn sleep_s(&mut self, seconds: f64) {
        if seconds > 0.0 {
            spin_sleep::sleep(Duration::from_secs_f64(seconds));
        }
    }
}


/// SCPI over a raw TCP socket
pub struct TcpTransport {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {

    /// Connect to `addr` (eg. `"192.168.8.200:5025"`). `timeout` applies to
    /// the connection attempt as well as to every read and write.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, Qdac2Error> {
        let mut last_err: Option<std::io::Error> = None;

        for sockaddr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sockaddr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    let reader = BufReader::new(stream.try_clone()?);
                    log::debug!("Connected to {}", sockaddr);
                    return Ok(TcpTransport { writer: stream, reader });
                },
                Err(err) => { last_err = Some(err); }
            }
        }

        Err(Qdac2Error::IOError(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "No address to connect to")
        })))
    }
}

impl Transport for TcpTransport {

    fn write(&mut self, command: &str) -> Result<(), Qdac2Error> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, Qdac2Error> {
        self.write(command)?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(Qdac2Error::InvalidResponse(
                format!("Connection closed while waiting for \"{}\"", command)));
        }

        Ok(response.trim_end().to_string())
    }
}
