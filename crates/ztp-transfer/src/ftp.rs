//! Passive-mode FTP client
//!
//! Just enough of RFC 959 to log in, list a directory and retrieve a file:
//! `USER`/`PASS`, `TYPE I`, `PASV`, `NLST`, `RETR` and `QUIT`. Every operation
//! opens its own control connection, so a dropped session never poisons the
//! next call.

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Result, TransferError};
use crate::server::TransferServer;

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;

static PASV_ADDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})")
        .expect("PASV address pattern compiles")
});

/// FTP connection settings
#[derive(Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Limit for connecting and for each reply or data read
    pub timeout: Duration,
}

impl FtpConfig {
    /// Anonymous login to `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_FTP_PORT,
            username: "anonymous".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    message: String,
}

fn parse_code(line: &str) -> Result<u16> {
    line.get(..3)
        .and_then(|code| code.parse().ok())
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| TransferError::MalformedReply(line.to_string()))
}

/// Data address announced in a `227` reply
fn parse_pasv(message: &str) -> Result<SocketAddrV4> {
    let malformed = || TransferError::MalformedReply(message.to_string());
    let caps = PASV_ADDR.captures(message).ok_or_else(malformed)?;

    let mut fields = [0u8; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = caps[i + 1].parse().map_err(|_| malformed())?;
    }
    let ip = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
    let port = u16::from(fields[4]) << 8 | u16::from(fields[5]);
    Ok(SocketAddrV4::new(ip, port))
}

fn expect(command: &str, reply: Reply, accepted: &[u16]) -> Result<Reply> {
    if accepted.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(TransferError::Command {
            command: command.to_string(),
            code: reply.code,
            message: reply.message,
        })
    }
}

/// 550 on a path means it does not exist
fn not_found(err: TransferError, path: &str) -> TransferError {
    match err {
        TransferError::Command { code: 550, .. } => TransferError::NotFound(path.to_string()),
        other => other,
    }
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl Session {
    async fn open(config: &FtpConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = timeout(config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransferError::Timeout(format!("connection to {addr}")))?
            .map_err(|source| TransferError::ConnectionFailed {
                addr: addr.clone(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(reader),
            writer,
            timeout: config.timeout,
        };

        let greeting = session.read_reply("greeting").await?;
        expect("greeting", greeting, &[220])?;

        let reply = session
            .command(&format!("USER {}", config.username), "USER")
            .await?;
        if reply.code == 331 {
            let reply = session
                .command(&format!("PASS {}", config.password), "PASS")
                .await?;
            expect("PASS", reply, &[202, 230])?;
        } else {
            expect("USER", reply, &[230])?;
        }

        let reply = session.command("TYPE I", "TYPE").await?;
        expect("TYPE", reply, &[200])?;

        debug!(addr = %addr, user = %config.username, "FTP session opened");
        Ok(session)
    }

    async fn read_line(&mut self, waiting_for: &str) -> Result<String> {
        let mut line = String::new();
        let read = timeout(self.timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| TransferError::Timeout(waiting_for.to_string()))??;
        if read == 0 {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control connection closed",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read one reply, folding `123-` continuation lines into its message
    async fn read_reply(&mut self, waiting_for: &str) -> Result<Reply> {
        let first = self.read_line(waiting_for).await?;
        let code = parse_code(&first)?;
        let mut message = first.get(4..).unwrap_or_default().to_string();

        if first.as_bytes().get(3) == Some(&b'-') {
            let last = format!("{code} ");
            loop {
                let line = self.read_line(waiting_for).await?;
                message.push('\n');
                match line.strip_prefix(&last) {
                    Some(rest) => {
                        message.push_str(rest);
                        break;
                    }
                    None => message.push_str(&line),
                }
            }
        }

        trace!(code, message = %message, "FTP reply");
        Ok(Reply { code, message })
    }

    async fn command(&mut self, line: &str, label: &str) -> Result<Reply> {
        trace!(command = label, "FTP command");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.read_reply(label).await
    }

    async fn passive(&mut self) -> Result<TcpStream> {
        let reply = self.command("PASV", "PASV").await?;
        let reply = expect("PASV", reply, &[227])?;
        let addr = parse_pasv(&reply.message)?;
        timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransferError::Timeout(format!("data connection to {addr}")))?
            .map_err(|source| TransferError::ConnectionFailed {
                addr: addr.to_string(),
                source,
            })
    }

    /// Run a command that answers over a data connection
    async fn transfer(&mut self, line: &str, label: &str) -> Result<Vec<u8>> {
        let mut data = self.passive().await?;
        let reply = self.command(line, label).await?;
        expect(label, reply, &[125, 150])?;

        let mut buf = Vec::new();
        timeout(self.timeout, data.read_to_end(&mut buf))
            .await
            .map_err(|_| TransferError::Timeout(format!("{label} data")))??;
        drop(data);

        let reply = self.read_reply(label).await?;
        expect(label, reply, &[226, 250])?;
        Ok(buf)
    }

    async fn quit(mut self) {
        if let Err(e) = self.command("QUIT", "QUIT").await {
            trace!(error = %e, "QUIT failed");
        }
    }
}

/// [`TransferServer`] speaking FTP
#[derive(Debug, Clone)]
pub struct FtpTransferServer {
    config: FtpConfig,
}

impl FtpTransferServer {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransferServer for FtpTransferServer {
    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let mut session = Session::open(&self.config).await?;
        let result = session.transfer(&format!("NLST {dir}"), "NLST").await;
        session.quit().await;

        let listing = result.map_err(|e| not_found(e, dir))?;
        Ok(String::from_utf8_lossy(&listing)
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.rsplit('/').next().unwrap_or(name).to_string())
            .collect())
    }

    async fn download_file(&self, path: &str) -> Result<Bytes> {
        let mut session = Session::open(&self.config).await?;
        let result = session.transfer(&format!("RETR {path}"), "RETR").await;
        session.quit().await;

        let data = result.map_err(|e| not_found(e, path))?;
        debug!(path, bytes = data.len(), "FTP download complete");
        Ok(Bytes::from(data))
    }
}
