//! TCP transport for routing operations.
//!
//! A [`Connection`] wraps a TCP stream and moves a single [`Message`]
//! frame in one direction: the sender opens the connection, writes the
//! frame and closes, the receiver reads until end of stream. Replies are
//! addressed at the origin carried inside the message and travel on
//! connections of their own.
//!
//! The [`Server`] accepts peer connections and, on a bounded worker pool,
//! reads the one operation each connection carries and hands the parsed
//! message to a [`MessageHandler`]. Transport and parse failures on the
//! inbound path end at the server's log; the sending peer learns nothing
//! about them.
//!
//! [`Connection`]: struct.Connection.html
//! [`Message`]: ../message/enum.Message.html
//! [`Server`]: struct.Server.html
//! [`MessageHandler`]: trait.MessageHandler.html

use crate::message::Message;
use std::io;
use std::io::prelude::*;
use std::net::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use threadpool::ThreadPool;

/// Number of worker threads executing inbound operations.
pub const DEFAULT_WORKERS: usize = 10;

/// A connection between two peers to exchange a single [`Message`] frame
///
/// [`Message`]: ../message/enum.Message.html
pub struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Connection {
    /// Opens a TCP connection to a remote peer.
    ///
    /// `timeout_ms` is the timeout in milliseconds for connecting as well as
    /// for read and write operations on the established stream.
    pub fn open<A: ToSocketAddrs>(addr: A, timeout_ms: u64) -> io::Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);

        let socket_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address given"))?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let buffer = Vec::with_capacity(Message::MAX_LENGTH);

        Self { stream, buffer }
    }

    /// Receives a message from the remote peer.
    ///
    /// This blocks until the peer has closed its half of the connection.
    pub fn receive(&mut self) -> io::Result<Message> {
        self.buffer.clear();
        self.stream.read_to_end(&mut self.buffer)?;

        Message::parse(self.buffer.as_slice())
    }

    /// Sends a message to the remote peer.
    pub fn send(&mut self, msg: &Message) -> io::Result<()> {
        msg.write_bytes(&mut self.buffer)?;

        self.stream.write_all(self.buffer.as_slice())
    }
}

/// Executes inbound operations against the local peer
///
/// The server calls [`handle_message`] on one of its worker threads, so an
/// implementation must be safe to invoke concurrently.
///
/// [`handle_message`]: #tymethod.handle_message
pub trait MessageHandler {
    /// Runs a single operation that arrived from a peer.
    fn handle_message(&self, msg: Message);
}

/// Accepts peer connections and feeds their operations to a handler
pub struct Server<H> {
    handler: Arc<H>,
}

impl<H> Server<H>
where
    H: MessageHandler + Send + Sync + 'static,
{
    /// Creates a server dispatching inbound operations to `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Binds to the given address and serves until the process exits.
    ///
    /// Accepting runs on a dedicated thread whose handle is returned;
    /// `num_workers` bounds how many inbound operations are read and
    /// executed in parallel.
    pub fn listen<A: ToSocketAddrs>(
        self,
        addr: A,
        num_workers: usize,
    ) -> io::Result<thread::JoinHandle<()>> {
        let listener = TcpListener::bind(addr)?;

        let handle = thread::spawn(move || {
            let pool = ThreadPool::new(num_workers);

            for result in listener.incoming() {
                let handler = Arc::clone(&self.handler);

                pool.execute(move || {
                    let received = result
                        .map(Connection::from_stream)
                        .and_then(|mut con| con.receive());

                    match received {
                        Ok(msg) => handler.handle_message(msg),
                        Err(error) => {
                            log::error!("Could not read an inbound operation: {}", error)
                        }
                    }
                });
            }
        });

        Ok(handle)
    }
}
