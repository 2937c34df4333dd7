//! Device to device file transfer
//!
//! Thumbnails and uploads travel over a separate TCP socket, TLS wrapped when the TV says
//! so. Every file is framed as
//!
//! ```text
//! [4 bytes BE: header_len]
//! [header_len bytes: JSON FileHeader]
//! [fileLength bytes: raw file data]
//! ```
//!
//! Downloads may carry several files on one socket, numbered by `num` out of `total`.

use crate::connection::insecure_tls;
use crate::constants::{D2D_VERSION, MAX_D2D_FILE_LEN, MAX_D2D_HEADER_LEN};
use crate::error::{Error, Result};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Downloaded files keyed by `"{fileID}.{fileType}"`
pub type Files = BTreeMap<String, Vec<u8>>;

/// Where to open the D2D socket, taken from a correlated reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnInfo {
    pub ip: String,
    #[serde(deserialize_with = "lenient_u16")]
    pub port: u16,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub secured: bool,
    /// Security key that must be echoed in an upload header
    #[serde(default)]
    pub key: Option<String>,
}

impl ConnInfo {
    /// Decode `conn_info`, which the TV sends as a JSON string
    pub fn from_value(value: &Value) -> Result<ConnInfo> {
        let decoded = match value {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        decoded.map_err(|e| Error::malformed(format!("conn_info: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub num: u64,
    #[serde(
        default,
        deserialize_with = "lenient_opt_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub total: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub file_length: u64,
    #[serde(rename = "fileID", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FileHeader {
    /// Header for a single file upload
    pub fn upload(file_length: u64, file_type: &str, sec_key: Option<String>) -> Self {
        Self {
            num: 0,
            total: Some(1),
            file_length,
            file_id: None,
            file_name: Some("dummy".into()),
            file_type: normalize_file_type(file_type),
            sec_key,
            version: Some(D2D_VERSION.into()),
        }
    }

    pub fn file_key(&self) -> String {
        let id = self
            .file_id
            .as_deref()
            .or_else(|| self.file_name.as_deref())
            .unwrap_or_default();
        format!("{}.{}", id, self.file_type)
    }
}

/// Lower case, `jpeg` becomes `jpg`
pub fn normalize_file_type(file_type: &str) -> String {
    let file_type = file_type.trim_start_matches('.').to_lowercase();
    if file_type == "jpeg" {
        "jpg".into()
    } else {
        file_type
    }
}

/// Length prefix and JSON header
pub fn encode_header(header: &FileHeader) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(header)?;
    let len = u32::try_from(json.len())
        .map_err(|_| Error::malformed("D2D header too long"))?;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// A complete frame: prefix, header and payload
pub fn encode_frame(header: &FileHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = encode_header(header)?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn decode_header(raw: &[u8]) -> Result<FileHeader> {
    serde_json::from_slice(raw).map_err(|e| Error::malformed(format!("D2D header: {}", e)))
}

fn header_len(prefix: [u8; 4]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_D2D_HEADER_LEN {
        return Err(Error::malformed(format!("D2D header of {} bytes", len)));
    }
    Ok(len)
}

/// Declared payload size, refused before anything is allocated for it
fn file_len(header: &FileHeader) -> Result<usize> {
    let len = header.file_length;
    if len > MAX_D2D_FILE_LEN {
        return Err(Error::malformed(format!(
            "D2D file {} declares {} bytes",
            header.file_key(),
            len
        )));
    }
    usize::try_from(len).map_err(|_| Error::malformed(format!("D2D file of {} bytes", len)))
}

fn short_read(e: std::io::Error, what: &str) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::connection_failure(format!("D2D socket closed while reading {}", what))
    } else {
        e.into()
    }
}

/// Progress through a multi-file download
///
/// The batch ends with the file numbered `total - 1`. `total` is re-read from every header,
/// the latest value wins. Numbers the TV skips are not waited for.
#[derive(Debug)]
pub struct Batch {
    total: u64,
    last_num: Option<u64>,
    files: Files,
}

impl Batch {
    /// `expected` stands in for `total` until a header provides one
    pub fn new(expected: u64) -> Self {
        Self {
            total: expected.max(1),
            last_num: None,
            files: Files::new(),
        }
    }

    pub fn done(&self) -> bool {
        self.last_num.map_or(false, |num| num.saturating_add(1) >= self.total)
    }

    pub fn push(&mut self, header: &FileHeader, payload: Vec<u8>) {
        if let Some(total) = header.total {
            self.total = total;
        }
        self.last_num = Some(header.num);
        log::debug!(
            "D2D file {} ({}/{}) {} bytes",
            header.file_key(),
            header.num.saturating_add(1),
            self.total,
            payload.len()
        );
        self.files.insert(header.file_key(), payload);
    }

    pub fn into_files(self) -> Files {
        self.files
    }
}

/// Read one framed file
pub async fn read_file<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(FileHeader, Vec<u8>)> {
    let mut prefix = [0u8; 4];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| short_read(e, "header length"))?;

    let mut raw = vec![0u8; header_len(prefix)?];
    reader
        .read_exact(&mut raw)
        .await
        .map_err(|e| short_read(e, "header"))?;
    let header = decode_header(&raw)?;

    let mut payload = vec![0u8; file_len(&header)?];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| short_read(e, "file data"))?;

    Ok((header, payload))
}

/// Write one framed file
pub async fn write_file<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &FileHeader,
    payload: &[u8],
) -> Result<()> {
    writer.write_all(&encode_header(header)?).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

trait D2dIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> D2dIo for T {}

async fn within<T, E, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(std::io::Error::new(ErrorKind::TimedOut, "D2D socket timed out").into()),
    }
}

async fn connect(conn_info: &ConnInfo, limit: Duration) -> Result<Box<dyn D2dIo>> {
    log::debug!(
        "Opening D2D socket to {}:{} (secured: {})",
        conn_info.ip,
        conn_info.port,
        conn_info.secured
    );
    let tcp = within(limit, TcpStream::connect((conn_info.ip.as_str(), conn_info.port))).await?;
    if !conn_info.secured {
        return Ok(Box::new(tcp));
    }
    let connector = tokio_native_tls::TlsConnector::from(insecure_tls()?);
    let tls = within(limit, connector.connect(&conn_info.ip, tcp)).await?;
    Ok(Box::new(tls))
}

/// Download every file the TV offers on `conn_info`
pub async fn fetch_files(conn_info: &ConnInfo, expected: u64, limit: Duration) -> Result<Files> {
    let mut stream = connect(conn_info, limit).await?;
    let mut batch = Batch::new(expected);
    while !batch.done() {
        let (header, payload) = within(limit, read_file(&mut stream)).await?;
        batch.push(&header, payload);
    }
    let _ = stream.shutdown().await;
    Ok(batch.into_files())
}

/// Upload one file, echoing the key from `conn_info`
pub async fn send_file(
    conn_info: &ConnInfo,
    payload: &[u8],
    file_type: &str,
    limit: Duration,
) -> Result<()> {
    let header = FileHeader::upload(payload.len() as u64, file_type, conn_info.key.clone());
    let mut stream = connect(conn_info, limit).await?;
    within(limit, write_file(&mut stream, &header, payload)).await?;
    let _ = stream.shutdown().await;
    log::debug!("D2D upload of {} bytes done", payload.len());
    Ok(())
}

/// Same transfers over std sockets
pub mod blocking {
    use super::{
        decode_header, file_len, header_len, short_read, Batch, ConnInfo, FileHeader, Files,
    };
    use crate::connection::insecure_tls;
    use crate::error::{Error, Result};

    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream, ToSocketAddrs};
    use std::time::Duration;

    trait D2dIo: Read + Write + Send {}
    impl<T: Read + Write + Send> D2dIo for T {}

    /// Read one framed file
    pub fn read_file<R: Read>(reader: &mut R) -> Result<(FileHeader, Vec<u8>)> {
        let mut prefix = [0u8; 4];
        reader
            .read_exact(&mut prefix)
            .map_err(|e| short_read(e, "header length"))?;

        let mut raw = vec![0u8; header_len(prefix)?];
        reader.read_exact(&mut raw).map_err(|e| short_read(e, "header"))?;
        let header = decode_header(&raw)?;

        let mut payload = vec![0u8; file_len(&header)?];
        reader
            .read_exact(&mut payload)
            .map_err(|e| short_read(e, "file data"))?;

        Ok((header, payload))
    }

    /// Write one framed file
    pub fn write_file<W: Write>(writer: &mut W, header: &FileHeader, payload: &[u8]) -> Result<()> {
        writer.write_all(&super::encode_header(header)?)?;
        writer.write_all(payload)?;
        writer.flush()?;
        Ok(())
    }

    fn tcp_connect(conn_info: &ConnInfo, limit: Duration) -> Result<TcpStream> {
        let addr = (conn_info.ip.as_str(), conn_info.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::connection_failure(format!("could not resolve {}", conn_info.ip)))?;
        let tcp = TcpStream::connect_timeout(&addr, limit)?;
        tcp.set_read_timeout(Some(limit))?;
        tcp.set_write_timeout(Some(limit))?;
        Ok(tcp)
    }

    fn connect(conn_info: &ConnInfo, limit: Duration) -> Result<(Box<dyn D2dIo>, TcpStream)> {
        let tcp = tcp_connect(conn_info, limit)?;
        let handle = tcp.try_clone()?;
        if !conn_info.secured {
            return Ok((Box::new(tcp), handle));
        }
        let tls = insecure_tls()?
            .connect(&conn_info.ip, tcp)
            .map_err(|e| match e {
                native_tls::HandshakeError::Failure(e) => Error::from(e),
                native_tls::HandshakeError::WouldBlock(_) => {
                    Error::connection_failure("D2D TLS handshake timed out")
                }
            })?;
        Ok((Box::new(tls), handle))
    }

    pub fn fetch_files(conn_info: &ConnInfo, expected: u64, limit: Duration) -> Result<Files> {
        let (mut stream, tcp) = connect(conn_info, limit)?;
        let mut batch = Batch::new(expected);
        while !batch.done() {
            let (header, payload) = read_file(&mut stream)?;
            batch.push(&header, payload);
        }
        let _ = tcp.shutdown(Shutdown::Both);
        Ok(batch.into_files())
    }

    pub fn send_file(
        conn_info: &ConnInfo,
        payload: &[u8],
        file_type: &str,
        limit: Duration,
    ) -> Result<()> {
        let header = FileHeader::upload(payload.len() as u64, file_type, conn_info.key.clone());
        let (mut stream, tcp) = connect(conn_info, limit)?;
        write_file(&mut stream, &header, payload)?;
        let _ = tcp.shutdown(Shutdown::Write);
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(u64),
    Bool(bool),
    Text(String),
}

impl Lenient {
    fn to_u64<E: de::Error>(&self) -> std::result::Result<u64, E> {
        match self {
            Lenient::Int(n) => Ok(*n),
            Lenient::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got '{}'", s))),
            Lenient::Bool(b) => Err(E::custom(format!("expected a number, got {}", b))),
        }
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    Lenient::deserialize(deserializer)?.to_u64()
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    match Option::<Lenient>::deserialize(deserializer)? {
        Some(value) => value.to_u64().map(Some),
        None => Ok(None),
    }
}

fn lenient_u16<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    let n = lenient_u64(deserializer)?;
    u16::try_from(n).map_err(|_| de::Error::custom(format!("port out of range: {}", n)))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Bool(b)) => b,
        Some(Lenient::Int(n)) => n != 0,
        Some(Lenient::Text(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}
