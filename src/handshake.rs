use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use thiserror::Error;
use tracing::debug;

/// TLS 交握過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Failed to resolve {0}")]
    Resolve(String),
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] openssl::error::ErrorStack),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("Peer presented no certificate")]
    NoPeerCertificate,
}

type Result<T> = std::result::Result<T, HandshakeError>;

/// 與遠端主機進行 TLS 交握並取得葉憑證到期時間（OpenSSL 文字格式）的行為。
pub trait HandshakeT: Send + Sync {
    fn peer_not_after(&self, hostname: &str, port: u16) -> Result<String>;
}

/// 使用 OpenSSL 的實際 TLS 交握。
///
/// 不驗證憑證鏈也不比對主機名稱，只為取得對方出示的葉憑證。
#[derive(Debug, Clone)]
pub struct TlsHandshake {
    timeout: Duration,
}

impl TlsHandshake {
    /// 預設的連線與讀寫逾時。
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 依序嘗試解析出的每個位址，回傳第一個成功建立的連線。
    fn connect(&self, hostname: &str, port: u16) -> Result<TcpStream> {
        let target = format!("{}:{}", hostname, port);
        let addrs: Vec<SocketAddr> = (hostname, port)
            .to_socket_addrs()
            .map_err(|_| HandshakeError::Resolve(target.clone()))?
            .collect();

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                        .map_err(|source| HandshakeError::Connect {
                            addr: addr.to_string(),
                            source,
                        })?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(HandshakeError::Connect {
                        addr: addr.to_string(),
                        source: e,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(HandshakeError::Resolve(target)))
    }
}

impl Default for TlsHandshake {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

impl HandshakeT for TlsHandshake {
    fn peer_not_after(&self, hostname: &str, port: u16) -> Result<String> {
        let tcp = self.connect(hostname, port)?;

        let mut builder = SslConnector::builder(SslMethod::tls())?;
        builder.set_verify(SslVerifyMode::NONE);
        let connector = builder.build();

        let mut stream = connector
            .configure()?
            .use_server_name_indication(true)
            .verify_hostname(false)
            .connect(hostname, tcp)
            .map_err(|e| HandshakeError::Tls(e.to_string()))?;

        let not_after = stream
            .ssl()
            .peer_certificate()
            .map(|cert| cert.not_after().to_string());

        // 無論結果如何都送出 close_notify，stream 離開作用域時關閉連線
        if let Err(e) = stream.shutdown() {
            debug!("TLS shutdown with {}:{} failed: {}", hostname, port, e);
        }

        not_after.ok_or(HandshakeError::NoPeerCertificate)
    }
}

/// 模擬交握實作，回傳固定的到期時間文字，通常用於測試。
#[derive(Debug, Clone)]
pub struct MockHandshake {
    not_after: Option<String>,
}

impl MockHandshake {
    pub fn new(not_after: impl Into<String>) -> Self {
        Self {
            not_after: Some(not_after.into()),
        }
    }

    /// 建立一個永遠交握失敗的模擬實作。
    pub fn failing() -> Self {
        Self { not_after: None }
    }
}

impl HandshakeT for MockHandshake {
    fn peer_not_after(&self, _hostname: &str, _port: u16) -> Result<String> {
        self.not_after
            .clone()
            .ok_or_else(|| HandshakeError::Tls("mock handshake failure".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{net::TcpListener, thread};

    use openssl::{
        asn1::Asn1Time,
        bn::BigNum,
        hash::MessageDigest,
        pkey::{PKey, Private},
        rsa::Rsa,
        ssl::SslAcceptor,
        x509::{X509NameBuilder, X509},
    };

    use super::*;

    /// 建立到期時間為指定 Unix 時間戳的自簽憑證。
    pub(crate) fn self_signed(not_after_unix: i64) -> (X509, PKey<Private>) {
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "localhost").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(not_after_unix).unwrap())
            .unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        (builder.build(), pkey)
    }

    /// 在本機啟動只接受一次連線的 TLS 伺服器，回傳其連接埠。
    pub(crate) fn serve_once(cert: X509, key: PKey<Private>) -> u16 {
        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_private_key(&key).unwrap();
        acceptor.set_certificate(&cert).unwrap();
        acceptor.check_private_key().unwrap();
        let acceptor = acceptor.build();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let _ = acceptor.accept(stream);
            }
        });
        port
    }

    #[test]
    fn test_tls_handshake_reads_peer_not_after() {
        let (cert, key) = self_signed(1_900_000_000);
        let port = serve_once(cert, key);

        let not_after = TlsHandshake::default()
            .peer_not_after("127.0.0.1", port)
            .unwrap();
        assert_eq!(not_after, "Mar 17 17:46:40 2030 GMT");
    }

    #[test]
    fn test_tls_handshake_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TlsHandshake::new(Duration::from_secs(1)).peer_not_after("127.0.0.1", port);
        assert!(matches!(result, Err(HandshakeError::Connect { .. })));
    }

    #[test]
    fn test_tls_handshake_peer_hangs_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let _ = listener.accept();
        });

        let result = TlsHandshake::new(Duration::from_secs(1)).peer_not_after("127.0.0.1", port);
        assert!(matches!(result, Err(HandshakeError::Tls(_))));
    }

    #[test]
    fn test_mock_handshake() {
        let mock = MockHandshake::new("Dec 12 23:38:45 2022 GMT");
        assert_eq!(
            mock.peer_not_after("test", 443).unwrap(),
            "Dec 12 23:38:45 2022 GMT"
        );
        assert!(MockHandshake::failing()
            .peer_not_after("test", 443)
            .is_err());
    }
}
