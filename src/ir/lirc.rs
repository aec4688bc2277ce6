//! lircd socket client.
//!
//! lircd takes one command per line and answers each with a packet:
//!
//! ```text
//! BEGIN
//! SEND_ONCE amplifier KEY_MUTE
//! SUCCESS            (or ERROR)
//! DATA               (optional)
//! 1
//! unknown remote: "amplifier"
//! END
//! ```
//!
//! It also broadcasts `BEGIN / SIGHUP / END` to every client when its
//! configuration is reloaded. Such packets, and replies whose echoed command
//! does not match the one just sent (left over from an attempt that timed
//! out), are skipped. So are lines outside a packet, which is where a read
//! that timed out halfway through a reply leaves the stream.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use super::{Transport, TransportError};

/// Socket read/write timeout. Expiry surfaces as a transient error.
const IO_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

pub struct LircTransport {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl LircTransport {
    pub fn connect(path: &str) -> io::Result<Self> {
        Self::from_stream(UnixStream::connect(path)?)
    }

    fn from_stream(stream: UnixStream) -> io::Result<Self> {
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { writer: stream, reader })
    }
}

impl Transport for LircTransport {
    fn execute(&mut self, command: &str) -> Result<(), TransportError> {
        self.writer.write_all(format!("{command}\n").as_bytes())?;
        read_reply(&mut self.reader, command)
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Packet {
    Sighup,
    Reply {
        command: String,
        success: bool,
        data: Vec<String>,
    },
}

/// Reads packets until the reply to `command` arrives.
fn read_reply<R: BufRead>(reader: &mut R, command: &str) -> Result<(), TransportError> {
    loop {
        match read_packet(reader)? {
            Packet::Sighup => log::debug!("ir: lircd reloaded its configuration"),
            Packet::Reply { command: echoed, .. } if echoed != command => {
                log::debug!("ir: skipping stale reply to {echoed:?}");
            }
            Packet::Reply { success: true, .. } => return Ok(()),
            Packet::Reply { data, .. } => {
                let reason = if data.is_empty() { "no reason given".to_owned() } else { data.join("; ") };
                return Err(TransportError::Rejected(reason));
            }
        }
    }
}

fn read_packet<R: BufRead>(reader: &mut R) -> Result<Packet, TransportError> {
    // A read that timed out mid-packet leaves the rest of that packet queued.
    let mut first = next_line(reader)?;
    while first != "BEGIN" {
        log::debug!("ir: skipping {first:?} while waiting for BEGIN");
        first = next_line(reader)?;
    }

    let command = next_line(reader)?;
    if command == "SIGHUP" {
        let end = next_line(reader)?;
        if end != "END" {
            return Err(TransportError::Protocol(format!("expected END, got {end:?}")));
        }
        return Ok(Packet::Sighup);
    }

    let mut success = None;
    let mut data = Vec::new();
    loop {
        let line = next_line(reader)?;
        match line.as_str() {
            "END" => break,
            "SUCCESS" => success = Some(true),
            "ERROR" => success = Some(false),
            "DATA" => {
                let count = next_line(reader)?;
                let count: usize = count
                    .parse()
                    .map_err(|_| TransportError::Protocol(format!("bad DATA length {count:?}")))?;
                for _ in 0..count {
                    data.push(next_line(reader)?);
                }
            }
            other => {
                return Err(TransportError::Protocol(format!("unexpected line {other:?}")));
            }
        }
    }

    let success = success.ok_or_else(|| TransportError::Protocol("reply without status".into()))?;
    Ok(Packet::Reply { command, success, data })
}

fn next_line<R: BufRead>(reader: &mut R) -> Result<String, TransportError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "lircd closed the socket").into());
    }
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;

    const CMD: &str = "SEND_ONCE amplifier KEY_MUTE";

    fn reply(text: &str) -> Result<(), TransportError> {
        read_reply(&mut Cursor::new(text.as_bytes()), CMD)
    }

    #[test]
    fn success_reply_is_ok() {
        assert!(reply("BEGIN\nSEND_ONCE amplifier KEY_MUTE\nSUCCESS\nEND\n").is_ok());
    }

    #[test]
    fn error_reply_carries_data() {
        let err = reply(
            "BEGIN\nSEND_ONCE amplifier KEY_MUTE\nERROR\nDATA\n1\nunknown remote: \"amplifier\"\nEND\n",
        )
        .unwrap_err();
        match err {
            TransportError::Rejected(reason) => assert!(reason.contains("unknown remote")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sighup_and_stale_replies_are_skipped() {
        let text = "BEGIN\nSIGHUP\nEND\n\
                    BEGIN\nSEND_START amplifier KEY_VOLUMEUP\nSUCCESS\nEND\n\
                    BEGIN\nSEND_ONCE amplifier KEY_MUTE\nSUCCESS\nEND\n";
        assert!(reply(text).is_ok());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        assert!(reply("BEGIN\r\nSEND_ONCE amplifier KEY_MUTE\r\nSUCCESS\r\nEND\r\n").is_ok());
    }

    #[test]
    fn tail_of_a_timed_out_reply_is_skipped() {
        let text = "CCESS\nEND\n\
                    BEGIN\nSEND_ONCE amplifier KEY_MUTE\nSUCCESS\nEND\n";
        assert!(reply(text).is_ok());
    }

    #[test]
    fn partial_reply_then_retry_resynchronises() {
        let mut reader = Cursor::new(
            "BEGIN\nSEND_ONCE amplifier KEY_MUTE\nSUCCESS\nEND\n\
             BEGIN\nSEND_ONCE amplifier KEY_MUTE\nSUCCESS\nEND\n"
                .as_bytes(),
        );
        // First attempt gave up after reading the opening line.
        assert_eq!(next_line(&mut reader).unwrap(), "BEGIN");
        assert!(read_reply(&mut reader, CMD).is_ok());
    }

    #[test]
    fn text_without_begin_runs_into_eof() {
        let err = reply("HELLO\n").unwrap_err();
        assert!(matches!(&err, TransportError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(
            reply("BEGIN\nSEND_ONCE amplifier KEY_MUTE\nEND\n"),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            reply("BEGIN\nSEND_ONCE amplifier KEY_MUTE\nERROR\nDATA\nmany\nEND\n"),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn truncated_reply_is_not_transient() {
        let err = reply("BEGIN\nSEND_ONCE amplifier KEY_MUTE\n").unwrap_err();
        assert!(matches!(&err, TransportError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(!err.is_transient());
    }

    #[test]
    fn transport_round_trips_over_a_socket() {
        let (client, server) = UnixStream::pair().unwrap();
        let daemon = thread::spawn(move || {
            let mut reader = BufReader::new(server.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut server = server;
            write!(server, "BEGIN\n{}SUCCESS\nEND\n", line).unwrap();
            line
        });

        let mut transport = LircTransport::from_stream(client).unwrap();
        transport.execute(CMD).unwrap();
        assert_eq!(daemon.join().unwrap(), format!("{CMD}\n"));
    }

    #[test]
    fn silent_daemon_times_out_transiently() {
        let (client, _server) = UnixStream::pair().unwrap();
        let mut transport = LircTransport::from_stream(client).unwrap();
        let err = transport.execute(CMD).unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
