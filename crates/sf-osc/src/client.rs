//! OSC client with a verified write-then-read primitive
//!
//! The control link is plain UDP: sets are fire-and-forget datagrams and the
//! host answers queries on a separate reply port. A dedicated listener thread
//! receives every reply, keeps the latest one per address, and wakes whichever
//! caller is blocked waiting on a matching reply via a condvar.
//!
//! [`OscClient::verified_set`] layers delivery confidence on top: send the
//! set, read the value back, compare within tolerance, and back off
//! exponentially on a miss. Exhausted retries are reported, never raised —
//! the set almost certainly went through, it just could not be confirmed.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rosc::OscType;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{OscError, OscResult};

/// Tolerance for float readback comparison, in normalized space.
pub const NORMALIZED_TOLERANCE: f32 = 0.02;

/// Connection configuration for the control link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host running the live set (and its loader script)
    pub host: String,
    /// Port the host listens on for commands and queries
    pub command_port: u16,
    /// Port the host sends replies to (0 = ephemeral, useful in tests)
    pub reply_port: u16,
    /// Port of the device loader script
    pub loader_port: u16,
    /// Listener socket read timeout; bounds shutdown latency
    pub recv_timeout_ms: u64,
    /// Cap on a single condvar wait slice while a caller blocks on a reply
    pub wait_slice_ms: u64,
    /// How long to wait for the loader's text reply
    pub loader_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            command_port: 11000,
            reply_port: 11001,
            loader_port: 11002,
            recv_timeout_ms: 500,
            wait_slice_ms: 200,
            loader_timeout_ms: 3000,
        }
    }
}

/// Retry/backoff policy for [`OscClient::verified_set`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum set attempts
    pub retries: u32,
    /// Initial backoff before the first readback
    pub base_delay_ms: u64,
    /// Backoff cap
    pub max_delay_ms: u64,
    /// Timeout for each readback query
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            timeout_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the readback of the given attempt (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

/// Outcome of a set operation.
///
/// `success` means the datagram went out; `verified` means a readback matched
/// the target. An unverified success is how exhausted retries are reported.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub success: bool,
    pub verified: bool,
    pub attempts: u32,
    /// Last readback value, in wire units
    pub actual: Option<OscType>,
}

/// Latest reply seen for one address.
struct Reply {
    at: Instant,
    args: Vec<OscType>,
}

struct Shared {
    running: AtomicBool,
    replies: Mutex<HashMap<String, Reply>>,
    available: Condvar,
}

/// UDP control client for the live host.
///
/// All methods take `&self`; the client may be shared across caller threads.
pub struct OscClient {
    config: ClientConfig,
    socket: UdpSocket,
    command_addr: SocketAddr,
    loader_addr: SocketAddr,
    shared: Arc<Shared>,
}

impl OscClient {
    /// Bind the reply socket and start the background reply listener.
    pub fn new(config: ClientConfig) -> OscResult<Self> {
        let bind_addr = sock_addr(&config.host, config.reply_port)?;
        let command_addr = sock_addr(&config.host, config.command_port)?;
        let loader_addr = sock_addr(&config.host, config.loader_port)?;

        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(config.recv_timeout_ms)))?;

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            replies: Mutex::new(HashMap::new()),
            available: Condvar::new(),
        });

        let listener_socket = socket.try_clone()?;
        let listener_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("sf-osc-listener".to_string())
            .spawn(move || reply_loop(listener_socket, listener_shared))?;

        log::info!(
            "[Osc] listening for replies on {}, commands to {}",
            socket.local_addr()?,
            command_addr
        );

        Ok(Self {
            config,
            socket,
            command_addr,
            loader_addr,
            shared,
        })
    }

    /// Address the reply socket actually bound to.
    pub fn local_addr(&self) -> OscResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send a fire-and-forget command datagram.
    pub fn send(&self, addr: &str, args: Vec<OscType>) -> OscResult<()> {
        let bytes = codec::encode_message(addr, args)?;
        // Sent from the reply socket so the host answers on the reply port.
        self.socket.send_to(&bytes, self.command_addr)?;
        Ok(())
    }

    /// Cheap liveness check: can we put a datagram on the wire at all.
    pub fn test_connection(&self) -> bool {
        self.send("/live/test", vec![]).is_ok()
    }

    /// Send a query and block for a matching reply.
    ///
    /// Reply address patterns vary by host version; the query address itself
    /// and `<addr>/response` are both accepted. Only replies that arrived
    /// after this query was sent count. Returns `Ok(None)` on timeout —
    /// an unanswered query is not a transport failure.
    pub fn query(
        &self,
        addr: &str,
        args: Vec<OscType>,
        timeout: Duration,
    ) -> OscResult<Option<(String, Vec<OscType>)>> {
        let sent_at = Instant::now();
        self.send(addr, args)?;

        let accept = [addr.to_string(), format!("{addr}/response")];
        let deadline = sent_at + timeout;
        let mut replies = self.shared.replies.lock();
        loop {
            for a in &accept {
                if let Some(reply) = replies.get(a) {
                    if reply.at >= sent_at {
                        return Ok(Some((a.clone(), reply.args.clone())));
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let slice = (deadline - now).min(Duration::from_millis(self.config.wait_slice_ms));
            let _ = self.shared.available.wait_for(&mut replies, slice);
        }
    }

    /// Send a set datagram once without querying. Never verified.
    pub fn set(&self, addr: &str, args: Vec<OscType>) -> OscResult<SetOutcome> {
        self.send(addr, args)?;
        Ok(SetOutcome {
            success: true,
            verified: false,
            attempts: 1,
            actual: None,
        })
    }

    /// SET → GET → compare loop with exponential backoff.
    ///
    /// Each attempt sends the set, waits out the backoff, and reads the value
    /// back. The first matching readback returns immediately. Exhausted
    /// retries return `success = true, verified = false` — only transport
    /// failures are raised.
    pub fn verified_set(
        &self,
        set_addr: &str,
        set_args: Vec<OscType>,
        get_addr: &str,
        get_args: Vec<OscType>,
        expected: OscType,
        policy: &RetryPolicy,
    ) -> OscResult<SetOutcome> {
        let retries = policy.retries.max(1);
        let mut last_actual = None;

        for attempt in 1..=retries {
            self.send(set_addr, set_args.clone())?;
            thread::sleep(policy.backoff(attempt));

            let reply = self.query(
                get_addr,
                get_args.clone(),
                Duration::from_millis(policy.timeout_ms),
            )?;

            if let Some((_, args)) = reply {
                if let Some(actual) = codec::last_numeric_arg(&args) {
                    if codec::value_matches(&actual, &expected, NORMALIZED_TOLERANCE) {
                        return Ok(SetOutcome {
                            success: true,
                            verified: true,
                            attempts: attempt,
                            actual: Some(actual),
                        });
                    }
                    last_actual = Some(actual);
                }
            }
            log::debug!(
                "[Osc] verify miss on {} (attempt {}/{})",
                get_addr,
                attempt,
                retries
            );
        }

        Ok(SetOutcome {
            success: true,
            verified: false,
            attempts: retries,
            actual: last_actual,
        })
    }

    // ---- mixer helpers -------------------------------------------------

    /// Set a track's mixer volume (normalized 0.0–1.0).
    pub fn set_track_volume(&self, track: usize, volume: f32, verify: bool) -> OscResult<SetOutcome> {
        let t = OscType::Int(track as i32);
        if !verify {
            return self.set("/live/track/set/volume", vec![t, OscType::Float(volume)]);
        }
        self.verified_set(
            "/live/track/set/volume",
            vec![t.clone(), OscType::Float(volume)],
            "/live/track/get/volume",
            vec![t],
            OscType::Float(volume),
            &RetryPolicy::default(),
        )
    }

    /// Read a track's mixer volume.
    pub fn get_track_volume(&self, track: usize) -> OscResult<Option<f32>> {
        let reply = self.query(
            "/live/track/get/volume",
            vec![OscType::Int(track as i32)],
            Duration::from_millis(RetryPolicy::default().timeout_ms),
        )?;
        Ok(reply.and_then(|(_, args)| codec::last_numeric(&args)))
    }

    /// Set a track's pan (-1.0..1.0).
    pub fn set_track_pan(&self, track: usize, pan: f32, verify: bool) -> OscResult<SetOutcome> {
        let t = OscType::Int(track as i32);
        if !verify {
            return self.set("/live/track/set/panning", vec![t, OscType::Float(pan)]);
        }
        self.verified_set(
            "/live/track/set/panning",
            vec![t.clone(), OscType::Float(pan)],
            "/live/track/get/panning",
            vec![t],
            OscType::Float(pan),
            &RetryPolicy::default(),
        )
    }

    /// Mute or unmute a track.
    pub fn set_track_mute(&self, track: usize, muted: bool, verify: bool) -> OscResult<SetOutcome> {
        let t = OscType::Int(track as i32);
        let m = OscType::Int(muted as i32);
        if !verify {
            return self.set("/live/track/set/mute", vec![t, m]);
        }
        self.verified_set(
            "/live/track/set/mute",
            vec![t.clone(), m.clone()],
            "/live/track/get/mute",
            vec![t],
            m,
            &RetryPolicy::default(),
        )
    }

    // ---- loader endpoint -----------------------------------------------

    /// Ask the loader script to instantiate a device on a track.
    ///
    /// Instantiation itself is asynchronous on the host side; callers poll
    /// for readiness afterwards (see the control crate).
    pub fn load_device(&self, track: usize, name: &str, position: i32) -> OscResult<()> {
        let bytes = codec::encode_message(
            "/loader/device/load",
            vec![
                OscType::Int(track as i32),
                OscType::String(name.to_string()),
                OscType::Int(position),
            ],
        )?;
        self.loader_request(&bytes)
    }

    /// Ask the loader script to delete a device.
    pub fn delete_device(&self, track: usize, device: usize) -> OscResult<()> {
        let bytes = codec::encode_loader_delete(track as i32, device as i32);
        self.loader_request(&bytes)
    }

    /// One-shot request/reply exchange with the loader script, which answers
    /// with a bare text datagram containing "success" or an error string.
    fn loader_request(&self, bytes: &[u8]) -> OscResult<()> {
        let sock = UdpSocket::bind(sock_addr(&self.config.host, 0)?)?;
        sock.set_read_timeout(Some(Duration::from_millis(self.config.loader_timeout_ms)))?;
        sock.send_to(bytes, self.loader_addr)?;

        let mut buf = [0u8; 4096];
        match sock.recv_from(&mut buf) {
            Ok((n, _)) => {
                let reply = String::from_utf8_lossy(&buf[..n])
                    .trim_end_matches('\0')
                    .trim()
                    .to_string();
                if reply.to_lowercase().contains("success") {
                    Ok(())
                } else {
                    Err(OscError::Loader(reply))
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Err(OscError::LoaderTimeout(self.config.loader_timeout_ms))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for OscClient {
    fn drop(&mut self) {
        // Listener exits on its next read-timeout tick.
        self.shared.running.store(false, Ordering::Release);
    }
}

fn reply_loop(socket: UdpSocket, shared: Arc<Shared>) {
    let mut buf = [0u8; 65536];
    while shared.running.load(Ordering::Acquire) {
        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                log::warn!("[Osc] reply socket error: {}", e);
                continue;
            }
        };

        let (addr, args) = match codec::decode_message(&buf[..n]) {
            Ok(parsed) => parsed,
            // Stray non-OSC traffic on the reply port is ignored.
            Err(_) => continue,
        };

        let mut replies = shared.replies.lock();
        replies.insert(
            addr,
            Reply {
                at: Instant::now(),
                args,
            },
        );
        shared.available.notify_all();
    }
}

fn sock_addr(host: &str, port: u16) -> OscResult<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .map_err(|_| OscError::Address(format!("{host}:{port}")))
}
