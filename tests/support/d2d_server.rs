use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One D2D file as the TV frames it
pub fn d2d_frame(header: &Value, payload: &[u8]) -> Vec<u8> {
    let header = header.to_string();
    let mut buf = (header.len() as u32).to_be_bytes().to_vec();
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Single connection D2D socket
///
/// Downloads write the prepared bytes and close. Uploads read until the client closes.
pub struct D2dServer {
    pub port: u16,
    pub secured: bool,
    handle: JoinHandle<Vec<u8>>,
}

impl D2dServer {
    pub async fn download(bytes: Vec<u8>, secured: bool) -> D2dServer {
        Self::serve(Some(bytes), secured).await
    }

    pub async fn upload(secured: bool) -> D2dServer {
        Self::serve(None, secured).await
    }

    async fn serve(outgoing: Option<Vec<u8>>, secured: bool) -> D2dServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = if secured { Some(tls_acceptor()) } else { None };

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            match acceptor {
                Some(acceptor) => {
                    let stream = acceptor.accept(stream).await.unwrap();
                    exchange(stream, outgoing).await
                }
                None => exchange(stream, outgoing).await,
            }
        });
        log::info!(target: "test::d2d_server::serve", "D2D socket on port {}", port);

        D2dServer {
            port,
            secured,
            handle,
        }
    }

    /// `conn_info` as the TV sends it, a JSON string
    pub fn conn_info(&self, key: Option<&str>) -> Value {
        let mut info = json!({
            "ip": "127.0.0.1",
            "port": self.port.to_string(),
            "secured": self.secured,
        });
        if let Some(key) = key {
            info["key"] = json!(key);
        }
        Value::String(info.to_string())
    }

    /// Bytes the client wrote
    pub async fn received(self) -> Vec<u8> {
        self.handle.await.unwrap()
    }
}

async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, outgoing: Option<Vec<u8>>) -> Vec<u8> {
    if let Some(bytes) = outgoing {
        stream.write_all(&bytes).await.unwrap();
        let _ = stream.shutdown().await;
        return Vec::new();
    }

    let mut received = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
        }
    }
    received
}

fn tls_acceptor() -> tokio_native_tls::TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec![
        "127.0.0.1".to_string(),
        "localhost".to_string(),
    ])
    .unwrap();
    let pkey = cert.serialize_private_key_pem();
    let cert = cert.serialize_pem().unwrap();

    let identity = native_tls::Identity::from_pkcs8(cert.as_bytes(), pkey.as_bytes()).unwrap();
    native_tls::TlsAcceptor::new(identity).unwrap().into()
}
