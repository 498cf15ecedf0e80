use std::time::Duration;

use forage_core::error::SourceError;

use crate::config::InatConfig;

/// Blocking client with the configured timeout and user agent.
pub fn build_client(config: &InatConfig) -> Result<reqwest::blocking::Client, SourceError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn get_text(
    client: &reqwest::blocking::Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .query(params)
        .header("Accept", "application/json")
        .send()
        .map_err(|e| SourceError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    let body = response
        .text()
        .map_err(|e| SourceError::Transport(format!("response read failed: {e}")))?;
    tracing::trace!(url, bytes = body.len(), "response received");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_default_config() {
        assert!(build_client(&InatConfig::default()).is_ok());
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let config = InatConfig {
            timeout_seconds: 1,
            ..Default::default()
        };
        let client = build_client(&config).unwrap();
        let err = get_text(&client, "http://127.0.0.1:9/observations", &[]).unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[test]
    fn error_status_is_reported_with_its_code() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/observations", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            stream
                .write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .unwrap();
        });

        let client = build_client(&InatConfig::default()).unwrap();
        let err = get_text(&client, &url, &[("per_page", "1".to_string())]).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, SourceError::Status(503)), "got {err:?}");
    }
}
