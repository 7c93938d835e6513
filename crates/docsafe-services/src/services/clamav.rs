use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use docsafe_core::{ContentStream, ScanEngine, ScanVerdict};
use futures::StreamExt;
use std::str;
use std::time::{Duration, Instant};

/// ClamAV engine over clamd's TCP protocol.
///
/// Always fails closed: connection failures, unparseable responses, timeouts
/// and oversized content all produce [`ScanVerdict::Error`], which the worker
/// retries and eventually dead-letters. Nothing is ever passed as clean
/// without a clean response from clamd.
#[derive(Clone)]
pub struct ClamAVService {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
    /// Largest content accepted; clamd rejects streams above its StreamMaxLength.
    max_scan_bytes: u64,
}

impl ClamAVService {
    /// Create a new ClamAVService.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_limits(host, port, 30, 100 * 1024 * 1024)
    }

    /// Create with a custom scan timeout and size ceiling.
    pub fn with_limits(host: String, port: u16, timeout_secs: u64, max_scan_bytes: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
            max_scan_bytes,
        }
    }

    /// Read the whole stream, refusing content above `max_scan_bytes`.
    async fn collect(&self, mut content: ContentStream) -> Result<Vec<u8>, String> {
        let mut data = Vec::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| format!("Failed to read content: {}", e))?;
            if (data.len() + chunk.len()) as u64 > self.max_scan_bytes {
                return Err(format!(
                    "Content exceeds scan limit of {} bytes",
                    self.max_scan_bytes
                ));
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Scan in-memory data using sync API inside spawn_blocking to avoid !Send tokio futures.
    pub async fn scan_bytes(&self, data: Vec<u8>) -> ScanVerdict {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, size_bytes = data.len(), "Starting ClamAV scan");
        let host = self.host.clone();
        let port = self.port;

        let timeout_secs = self.timeout_secs;
        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let address = format!("{}:{}", host, port);
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                match clamav_client::scan_buffer(data.as_slice(), connection, None) {
                    Ok(response_bytes) => match clean(&response_bytes) {
                        Ok(true) => {
                            tracing::info!(
                                duration_ms = start.elapsed().as_millis(),
                                "File scan completed: clean"
                            );
                            ScanVerdict::Clean
                        }
                        Ok(false) => {
                            let signature = signature_name(&response_bytes);
                            tracing::warn!(
                                duration_ms = start.elapsed().as_millis(),
                                signature = %signature,
                                "File scan detected malware"
                            );
                            ScanVerdict::Infected(signature)
                        }
                        Err(e) => {
                            let error_msg = format!("Failed to parse ClamAV response: {}", e);
                            tracing::error!(error = %error_msg, "Failed to parse ClamAV response");
                            ScanVerdict::Error(error_msg)
                        }
                    },
                    Err(e) => {
                        let error_msg = format!("ClamAV scan error: {}", e);
                        tracing::error!(error = %error_msg, "ClamAV scan failed");
                        ScanVerdict::Error(error_msg)
                    }
                }
            }),
        )
        .await;

        match result {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                let error_msg = format!("ClamAV scan task join error: {}", e);
                tracing::error!(error = %error_msg, "ClamAV scan panicked");
                ScanVerdict::Error(error_msg)
            }
            Err(_) => {
                let error_msg = format!("ClamAV scan timeout (exceeded {} seconds)", timeout_secs);
                tracing::error!(error = %error_msg, "ClamAV scan timeout");
                ScanVerdict::Error(error_msg)
            }
        }
    }
}

/// Extract the signature from a clamd `stream: <name> FOUND` response.
fn signature_name(response: &[u8]) -> String {
    let response_str = match str::from_utf8(response) {
        Ok(s) => s.trim().trim_end_matches('\0'),
        Err(_) => return "unknown".to_string(),
    };
    if !response_str.contains("FOUND") {
        return "unknown".to_string();
    }
    response_str
        .split(':')
        .nth(1)
        .unwrap_or("unknown")
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_string()
}

#[async_trait]
impl ScanEngine for ClamAVService {
    async fn scan_stream(&self, content: ContentStream) -> ScanVerdict {
        match self.collect(content).await {
            Ok(data) => self.scan_bytes(data).await,
            Err(error_msg) => {
                tracing::error!(error = %error_msg, "ClamAV scan aborted before submission");
                ScanVerdict::Error(error_msg)
            }
        }
    }

    fn name(&self) -> &'static str {
        "clamav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream(chunks: Vec<std::io::Result<Bytes>>) -> ContentStream {
        Box::pin(futures::stream::iter(chunks))
    }

    #[test]
    fn clamav_constructors() {
        let svc = ClamAVService::new("localhost".to_string(), 3310);
        assert_eq!(svc.timeout_secs, 30);
        let custom = ClamAVService::with_limits("localhost".to_string(), 3310, 60, 1024);
        assert_eq!(custom.max_scan_bytes, 1024);
        assert_eq!(custom.name(), "clamav");
    }

    #[test]
    fn signature_name_from_found_response() {
        assert_eq!(
            signature_name(b"stream: Win.Test.EICAR_HDB-1 FOUND\0"),
            "Win.Test.EICAR_HDB-1"
        );
        assert_eq!(signature_name(b"stream: OK\0"), "unknown");
        assert_eq!(signature_name(&[0xff, 0xfe]), "unknown");
    }

    #[tokio::test]
    async fn oversized_content_is_an_error() {
        let svc = ClamAVService::with_limits("localhost".to_string(), 3310, 5, 8);
        let verdict = svc
            .scan_stream(stream(vec![
                Ok(Bytes::from_static(b"12345")),
                Ok(Bytes::from_static(b"67890")),
            ]))
            .await;
        assert!(matches!(verdict, ScanVerdict::Error(msg) if msg.contains("scan limit")));
    }

    #[tokio::test]
    async fn unreadable_content_is_an_error() {
        let svc = ClamAVService::new("localhost".to_string(), 3310);
        let verdict = svc
            .scan_stream(stream(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            ]))
            .await;
        assert!(matches!(verdict, ScanVerdict::Error(msg) if msg.contains("reset")));
    }

    #[tokio::test]
    async fn unreachable_daemon_fails_closed() {
        // Port 1 on loopback is not a clamd instance.
        let svc = ClamAVService::with_limits("127.0.0.1".to_string(), 1, 5, 1024);
        let verdict = svc
            .scan_stream(stream(vec![Ok(Bytes::from_static(b"hello"))]))
            .await;
        assert!(matches!(verdict, ScanVerdict::Error(_)));
    }
}
