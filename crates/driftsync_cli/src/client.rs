//! Blocking HTTP client backed by reqwest.

use driftsync_engine::{HttpClient, HttpResponse};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

/// An [`HttpClient`] that performs real network requests.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("driftsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn read(response: Response) -> Result<HttpResponse, String> {
    let status = response.status().as_u16();
    let body = response.bytes().map_err(|e| e.to_string())?;
    Ok(HttpResponse::new(status, body.to_vec()))
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| e.to_string())?;
        read(response)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse, String> {
        let mut request = self.client.post(url).timeout(timeout).body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().map_err(|e| e.to_string())?;
        read(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn refused_connection_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ReqwestClient::new().unwrap();
        let result = client.get(
            &format!("http://127.0.0.1:{port}/health"),
            Duration::from_secs(2),
        );
        assert!(result.is_err());
    }
}
