//! TCP server speaking the line protocol, one thread per connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use nubdb_core::Result;

use crate::command::Dispatcher;

/// Bind and serve until the process exits. Each accepted connection gets
/// its own thread; they all share one dispatcher.
pub fn serve(dispatcher: Arc<Dispatcher>, bind_addr: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((bind_addr, port))?;
    info!(bind_addr, port, "listening");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let dispatcher = Arc::clone(&dispatcher);

        thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || {
                info!(%peer, "client connected");
                if let Err(e) = handle_connection(stream, &dispatcher) {
                    warn!(%peer, error = %e, "connection error");
                } else {
                    info!(%peer, "client disconnected");
                }
            })?;
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, dispatcher: &Dispatcher) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break; // client hung up
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatcher.dispatch(&line);
        writer.write_all(response.render().as_bytes())?;
        writer.write_all(b"\n")?;

        if response.is_goodbye() {
            break;
        }
    }
    Ok(())
}
