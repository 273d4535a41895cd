//! Live reload over WebSocket.
//!
//! Pages built in development carry a small client that connects to
//! `ws://<host>:<reload_port>` and reloads on a `reload` message. The server
//! side accepts connections on its own thread and broadcasts after every
//! successful rebuild; dead clients are dropped on the next broadcast.

use crate::log;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
    net::{IpAddr, SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};
use tungstenite::{Message, WebSocket};

/// Client snippet, `__PORT__` replaced at injection.
const CLIENT: &str = include_str!("embed/reload.html");

/// Script tag that connects back to the reload server on `port`.
pub fn client_script(port: u16) -> String {
    CLIENT.replace("__PORT__", &port.to_string())
}

/// Connected browsers.
#[derive(Clone, Default)]
pub struct ReloadServer {
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
}

impl ReloadServer {
    /// Bind `interface:port` and accept clients in the background.
    pub fn start(interface: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(interface, port);
        let listener =
            TcpListener::bind(addr).with_context(|| format!("Failed to bind reload server on {addr}"))?;
        let server = Self::default();

        let clients = Arc::clone(&server.clients);
        thread::spawn(move || {
            for stream in listener.incoming().filter_map(Result::ok) {
                match tungstenite::accept(stream) {
                    Ok(socket) => clients.lock().push(socket),
                    Err(err) => log!("reload"; "handshake failed: {err}"),
                }
            }
        });

        log!("reload"; "ws://{addr}");
        Ok(server)
    }

    /// Tell every connected page to reload.
    pub fn notify_reload(&self) {
        let mut clients = self.clients.lock();
        clients.retain_mut(|socket| socket.send(Message::text("reload")).is_ok());
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}
